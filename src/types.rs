//! Core value types shared by models and the engine

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Backend representation used for a model's primary record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreType {
    /// Opaque blob produced by the model's serializer, stored as a string value
    Serialized,
    /// One hash field per exposed struct field
    Hash,
    /// Scalar string value taken from a designated field
    String,
}

impl StoreType {
    /// Short lowercase name used in logs and errors
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreType::Serialized => "serialized",
            StoreType::Hash => "hash",
            StoreType::String => "string",
        }
    }
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered numeric value stored as a sorted-set score
///
/// Backends keep scores as IEEE doubles. Integers are accepted only when
/// that conversion is exact (any magnitude up to 2^53, and larger values
/// with enough trailing zero bits), so distinct integers never collapse onto
/// one score. Nanosecond unix timestamps usually fail this; index them at
/// microsecond or millisecond resolution instead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Score {
    /// Integer score (ids, unix timestamps)
    Int(i64),
    /// Unsigned integer score above `i64::MAX`
    Unsigned(u64),
    /// Floating point score
    Float(f64),
}

impl Score {
    /// Score as the backend sees it
    pub fn as_f64(&self) -> f64 {
        match *self {
            Score::Int(v) => v as f64,
            Score::Unsigned(v) => v as f64,
            Score::Float(v) => v,
        }
    }

    /// Whether the backend can store and order this score without loss
    ///
    /// NaN and infinities have no order; integers must survive the
    /// conversion to a double unchanged.
    pub fn is_valid(&self) -> bool {
        match *self {
            Score::Int(v) => exact_in_f64(v.unsigned_abs()),
            Score::Unsigned(v) => exact_in_f64(v),
            Score::Float(v) => v.is_finite(),
        }
    }
}

/// Whether `v` converts to `f64` without rounding
fn exact_in_f64(v: u64) -> bool {
    v == 0 || 64 - v.leading_zeros() - v.trailing_zeros() <= f64::MANTISSA_DIGITS
}

macro_rules! score_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Score {
            fn from(v: $t) -> Self {
                Score::Int(v as i64)
            }
        })*
    };
}

score_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for Score {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(i) => Score::Int(i),
            Err(_) => Score::Unsigned(v),
        }
    }
}

impl From<usize> for Score {
    fn from(v: usize) -> Self {
        Score::from(v as u64)
    }
}

impl From<f32> for Score {
    fn from(v: f32) -> Self {
        Score::Float(v as f64)
    }
}

impl From<f64> for Score {
    fn from(v: f64) -> Self {
        Score::Float(v)
    }
}

/// Named scores declared by a model instance
pub type ScoreMap = BTreeMap<String, Score>;

/// Expiry policy declared by a model instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiry {
    /// Use the engine configuration's default TTL
    #[default]
    Default,
    /// Never expire, regardless of configuration
    Never,
    /// Expire after the given duration
    After(Duration),
}

impl Expiry {
    /// Resolve against the configured default; `None` means no expiry
    pub fn resolve(self, default_ttl: Option<Duration>) -> Option<Duration> {
        match self {
            Expiry::Default => default_ttl.filter(|d| !d.is_zero()),
            Expiry::Never => None,
            Expiry::After(d) if d.is_zero() => None,
            Expiry::After(d) => Some(d),
        }
    }
}

impl From<Duration> for Expiry {
    fn from(d: Duration) -> Self {
        if d.is_zero() {
            Expiry::Never
        } else {
            Expiry::After(d)
        }
    }
}
