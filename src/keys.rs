//! Key composition for primary records and score indices
//!
//! ```text
//! [<prefix><d>]<type><d><primary_key>          primary record
//! [<prefix><d>]<type><d>idx<d><score_name>     ZSET(score -> primary_key)
//! ```
//!
//! The type segment comes from the model's type name, fixed when the engine
//! is built. Index keys are shared by every instance of the type; members are
//! the raw primary keys. Primary keys beginning with `idx<d>` are rejected so
//! that no record key can name an index.

use crate::error::{Error, Result};

const INDEX_SEGMENT: &str = "idx";

/// Builds backend keys for one model type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBuilder {
    /// Everything before the primary key, delimiter included
    base: String,
    delimiter: String,
}

impl KeyBuilder {
    /// Create a builder for `type_name`, optionally namespaced by `prefix`
    pub fn new(prefix: &str, type_name: &str, delimiter: &str) -> Result<Self> {
        if delimiter.is_empty() {
            return Err(Error::InvalidKey("key delimiter is empty".to_string()));
        }
        if type_name.is_empty() {
            return Err(Error::InvalidKey("type prefix is empty".to_string()));
        }

        let base = if prefix.is_empty() {
            format!("{}{}", type_name, delimiter)
        } else {
            format!("{}{}{}{}", prefix, delimiter, type_name, delimiter)
        };

        Ok(Self {
            base,
            delimiter: delimiter.to_string(),
        })
    }

    /// Builder keyed by the name of `M`
    pub fn for_type<M>(prefix: &str, delimiter: &str) -> Result<Self> {
        Self::new(prefix, &type_segment::<M>(), delimiter)
    }

    /// Primary record key for `primary_key`
    pub fn primary_key(&self, primary_key: &str) -> Result<String> {
        if primary_key.is_empty() {
            return Err(Error::InvalidKey(format!(
                "empty primary key under {}",
                self.base
            )));
        }
        if primary_key
            .strip_prefix(INDEX_SEGMENT)
            .is_some_and(|rest| rest.starts_with(self.delimiter.as_str()))
        {
            return Err(Error::InvalidKey(format!(
                "primary key {:?} under {} collides with the index namespace",
                primary_key, self.base
            )));
        }
        Ok(format!("{}{}", self.base, primary_key))
    }

    /// Sorted-set key for the score named `score_name`
    pub fn index_key(&self, score_name: &str) -> Result<String> {
        if score_name.is_empty() {
            return Err(Error::InvalidKey(format!(
                "empty score name under {}",
                self.base
            )));
        }
        Ok(format!(
            "{}{}{}{}",
            self.base, INDEX_SEGMENT, self.delimiter, score_name
        ))
    }
}

/// Lowercased last path segment of `M`'s type name, generics stripped
pub fn type_segment<M>() -> String {
    let full = std::any::type_name::<M>();
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Post;
    #[allow(dead_code)]
    struct Wrapper<T>(T);

    #[test]
    fn test_primary_and_index_keys() {
        let keys = KeyBuilder::new("", "post", "/").unwrap();
        assert_eq!(keys.primary_key("1").unwrap(), "post/1");
        assert_eq!(keys.index_key("recent").unwrap(), "post/idx/recent");
    }

    #[test]
    fn test_prefix_namespaces_keys() {
        let keys = KeyBuilder::new("app", "post", ":").unwrap();
        assert_eq!(keys.primary_key("7").unwrap(), "app:post:7");
        assert_eq!(keys.index_key("id").unwrap(), "app:post:idx:id");
    }

    #[test]
    fn test_empty_parts_are_invalid() {
        assert!(matches!(
            KeyBuilder::new("", "post", ""),
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(KeyBuilder::new("", "", ":"), Err(Error::InvalidKey(_))));

        let keys = KeyBuilder::new("", "post", ":").unwrap();
        assert!(matches!(keys.primary_key(""), Err(Error::InvalidKey(_))));
        assert!(matches!(keys.index_key(""), Err(Error::InvalidKey(_))));
    }

    #[test]
    fn test_primary_key_cannot_name_an_index() {
        let keys = KeyBuilder::new("", "tag", ":").unwrap();
        let err = keys.primary_key("idx:rank").unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));
        assert!(keys.primary_key("idx:").is_err());

        // Only the exact `idx<d>` lead is reserved
        assert_eq!(keys.primary_key("idx").unwrap(), "tag:idx");
        assert_eq!(keys.primary_key("idxrank").unwrap(), "tag:idxrank");
        assert_eq!(keys.primary_key("idx/rank").unwrap(), "tag:idx/rank");
        assert_eq!(keys.primary_key("a:idx:rank").unwrap(), "tag:a:idx:rank");
    }

    #[test]
    fn test_type_segment() {
        assert_eq!(type_segment::<Post>(), "post");
        assert_eq!(type_segment::<Wrapper<Post>>(), "wrapper");
        let keys = KeyBuilder::for_type::<Post>("", "/").unwrap();
        assert_eq!(keys.primary_key("3").unwrap(), "post/3");
    }
}
