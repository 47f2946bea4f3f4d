//! Deadlines and cancellation for engine calls
//!
//! Every connection acquisition and backend round-trip made by the engine runs
//! under a [`Context`]. When the deadline passes or the caller cancels, the
//! pending await is dropped and the batch stops; writes already applied for
//! earlier instances stay committed.
//!
//! ```rust
//! use redistructs::context::Context;
//! use std::time::Duration;
//!
//! let ctx = Context::with_timeout(Duration::from_secs(1));
//! assert!(!ctx.is_done());
//!
//! let (ctx, handle) = Context::with_cancel();
//! handle.cancel();
//! assert!(ctx.is_done());
//! ```

use crate::error::{Error, Result};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Deadline and cancellation scope for one engine call
#[derive(Clone, Debug, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

/// Cancels every [`Context`] derived from it
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signal cancellation
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Context {
    /// Context without deadline or cancellation
    pub fn background() -> Self {
        Self::default()
    }

    /// Context that expires after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Context that expires at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: None,
        }
    }

    /// Cancellable context plus the handle that cancels it
    pub fn with_cancel() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                deadline: None,
                cancel: Some(rx),
            },
            CancelHandle { tx },
        )
    }

    /// Same cancellation, tighter deadline
    pub fn timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Self {
            deadline: Some(self.deadline.map_or(deadline, |d| d.min(deadline))),
            cancel: self.cancel.clone(),
        }
    }

    /// Deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True once cancelled or past the deadline
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// The error this context would produce right now
    pub fn err(&self) -> Option<Error> {
        if self.cancel.as_ref().is_some_and(|rx| *rx.borrow()) {
            return Some(Error::Cancelled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Some(Error::DeadlineExceeded),
            _ => None,
        }
    }

    /// Drive `fut` to completion unless the context ends first
    pub async fn run<T, E, F>(&self, fut: F) -> Result<std::result::Result<T, E>>
    where
        F: Future<Output = std::result::Result<T, E>>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }

        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(tokio::time::Instant::from_std(d)).await,
                None => std::future::pending::<()>().await,
            }
        };

        let cancelled = async {
            match self.cancel.clone() {
                Some(mut rx) => loop {
                    if *rx.borrow_and_update() {
                        break;
                    }
                    // Sender dropped: cancellation can no longer happen
                    if rx.changed().await.is_err() {
                        std::future::pending::<()>().await;
                    }
                },
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Err(Error::Cancelled),
            _ = deadline => Err(Error::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_background_runs_to_completion() {
        let ctx = Context::background();
        let out = ctx.run(async { Ok::<_, ()>(7) }).await.unwrap();
        assert_eq!(out, Ok(7));
    }

    #[tokio::test]
    async fn test_deadline_interrupts_slow_future() {
        let ctx = Context::with_timeout(Duration::from_millis(20));
        let res = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, ()>(())
            })
            .await;
        assert!(matches!(res, Err(Error::DeadlineExceeded)));
        assert!(ctx.is_done());
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_future() {
        let (ctx, handle) = Context::with_cancel();
        let task = tokio::spawn({
            let ctx = ctx.clone();
            async move {
                ctx.run(std::future::pending::<std::result::Result<(), ()>>())
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();
        let res = task.await.unwrap();
        assert!(matches!(res, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_already_cancelled_skips_future() {
        let (ctx, handle) = Context::with_cancel();
        handle.cancel();
        let polled = std::sync::atomic::AtomicBool::new(false);
        let res = ctx
            .run(async {
                polled.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok::<_, ()>(())
            })
            .await;
        assert!(matches!(res, Err(Error::Cancelled)));
        assert!(!polled.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn test_child_timeout_keeps_earlier_deadline() {
        let parent = Context::with_timeout(Duration::from_millis(10));
        let child = parent.timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
    }
}
