//! Storage-mode dispatch between models and backend records
//!
//! A [`Record`] is the backend-level shape of one primary record. The storage
//! mode is selected once per instance: [`Record::encode`] asks the model for
//! the matching representation, [`Record::write_ops`] turns it into backend
//! writes, and [`Record::read`] / [`Record::decode`] reverse the process.
//!
//! # Layout per mode
//!
//! ```text
//! Serialized  SET  <key> <model.serialized()>
//! Hash        DEL  <key>; HSET <key> f1 v1 f2 v2 ...; PEXPIRE <key> <ttl>
//! String      SET  <key> <model.scalar()>
//! ```

use crate::engine::traits::{Connection, WriteOp};
use crate::error::{CodecError, StoreError};
use crate::model::Model;
use crate::types::StoreType;

use serde::de::value::MapDeserializer;
use serde::de::{self, DeserializeOwned, Deserializer, IntoDeserializer, Visitor};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Primary record in backend form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Serialized blob stored as a string value
    Blob(Vec<u8>),
    /// Hash field/value pairs
    Hash(Vec<(String, Vec<u8>)>),
    /// Scalar string value
    Scalar(Vec<u8>),
}

impl Record {
    /// Encode `model` in the representation `mode` calls for
    pub fn encode<M: Model>(mode: StoreType, model: &M) -> Result<Self, CodecError> {
        match mode {
            StoreType::Serialized => model.serialized().map(Record::Blob),
            StoreType::Hash => {
                let fields = model.to_fields()?;
                if fields.is_empty() {
                    return Err(CodecError::Serialize(
                        "hash record has no fields".to_string(),
                    ));
                }
                Ok(Record::Hash(fields))
            },
            StoreType::String => model.scalar().map(Record::Scalar),
        }
    }

    /// Rebuild a model from a record read back from the backend
    pub fn decode<M: Model>(self) -> Result<M, CodecError> {
        match self {
            Record::Blob(bytes) => M::deserialized(&bytes),
            Record::Hash(fields) => M::from_fields(fields.into_iter().collect()),
            Record::Scalar(bytes) => M::from_scalar(&bytes),
        }
    }

    /// Storage mode this record belongs to
    pub fn store_type(&self) -> StoreType {
        match self {
            Record::Blob(_) => StoreType::Serialized,
            Record::Hash(_) => StoreType::Hash,
            Record::Scalar(_) => StoreType::String,
        }
    }

    /// Backend writes that replace whatever `key` held before
    ///
    /// A `None` TTL leaves the key persistent, clearing any earlier expiry.
    pub fn write_ops(self, key: &str, ttl: Option<Duration>) -> Vec<WriteOp> {
        match self {
            Record::Blob(value) | Record::Scalar(value) => vec![WriteOp::Set {
                key: key.to_string(),
                value,
                ttl,
            }],
            Record::Hash(fields) => {
                let mut ops = Vec::with_capacity(3);
                ops.push(WriteOp::Del {
                    key: key.to_string(),
                });
                ops.push(WriteOp::HSet {
                    key: key.to_string(),
                    fields,
                });
                if let Some(ttl) = ttl {
                    ops.push(WriteOp::Expire {
                        key: key.to_string(),
                        ttl,
                    });
                }
                ops
            },
        }
    }

    /// Read the record at `key`; `None` when the key does not exist
    pub async fn read<C: Connection>(
        mode: StoreType,
        conn: &mut C,
        key: &str,
    ) -> Result<Option<Self>, StoreError> {
        match mode {
            StoreType::Serialized => Ok(conn.get(key).await?.map(Record::Blob)),
            StoreType::String => Ok(conn.get(key).await?.map(Record::Scalar)),
            StoreType::Hash => {
                let fields = conn.hgetall(key).await?;
                if fields.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(Record::Hash(fields.into_iter().collect())))
                }
            },
        }
    }
}

/// Serialize any serde type to a JSON blob
pub fn to_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(value).map_err(|e| CodecError::Serialize(e.to_string()))
}

/// Deserialize a JSON blob produced by [`to_json_bytes`]
pub fn from_json_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::Deserialize(e.to_string()))
}

/// Flatten a struct into hash fields
///
/// Each top-level field becomes one hash field named after its serde name
/// (so `#[serde(rename = "...")]` picks the stored name). Strings are stored
/// as their raw bytes and every other value as JSON text, so the hash reads
/// naturally from any Redis client. `None` fields are omitted.
pub fn fields_from_serde<T: Serialize>(value: &T) -> Result<Vec<(String, Vec<u8>)>, CodecError> {
    let json = serde_json::to_value(value).map_err(|e| CodecError::Serialize(e.to_string()))?;
    let serde_json::Value::Object(map) = json else {
        return Err(CodecError::Serialize(
            "hash storage requires a struct with named fields".to_string(),
        ));
    };

    map.into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(name, v)| match v {
            serde_json::Value::String(text) => Ok((name, text.into_bytes())),
            other => serde_json::to_vec(&other)
                .map(|bytes| (name, bytes))
                .map_err(|e| CodecError::Serialize(e.to_string())),
        })
        .collect()
}

/// Rebuild a struct from hash fields written by [`fields_from_serde`]
///
/// Decoding is driven by the target field types: string-like fields take
/// the raw bytes, everything else is parsed as JSON.
pub fn serde_from_fields<T: DeserializeOwned>(
    fields: HashMap<String, Vec<u8>>,
) -> Result<T, CodecError> {
    let entries = fields
        .iter()
        .map(|(name, bytes)| (name.as_str(), FieldValue(bytes.as_slice())));
    let map: MapDeserializer<'_, _, serde_json::Error> = MapDeserializer::new(entries);
    T::deserialize(map).map_err(|e| CodecError::Deserialize(e.to_string()))
}

/// One stored hash field value
struct FieldValue<'de>(&'de [u8]);

impl<'de> FieldValue<'de> {
    fn text(&self) -> Result<&'de str, serde_json::Error> {
        std::str::from_utf8(self.0).map_err(de::Error::custom)
    }
}

impl<'de> IntoDeserializer<'de, serde_json::Error> for FieldValue<'de> {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

macro_rules! forward_to_json {
    ($($method:ident)*) => {
        $(fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
            let mut json = serde_json::Deserializer::from_slice(self.0);
            let value = (&mut json).$method(visitor)?;
            json.end()?;
            Ok(value)
        })*
    };
}

impl<'de> Deserializer<'de> for FieldValue<'de> {
    type Error = serde_json::Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        match serde_json::from_slice::<serde_json::Value>(self.0) {
            Ok(value) => value.deserialize_any(visitor),
            Err(_) => visitor.visit_borrowed_str(self.text()?),
        }
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_borrowed_str(self.text()?)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_str(visitor)
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_str(visitor)
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_str(visitor)
    }

    // Omitted fields are `None`; a stored field is always `Some`
    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_unit(visitor)
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_map(visitor)
    }

    // Unit variants are stored as their raw name, data-carrying ones as JSON
    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        let text = self.text()?;
        if text.trim_start().starts_with('{') {
            let mut json = serde_json::Deserializer::from_slice(self.0);
            let value = (&mut json).deserialize_enum(name, variants, visitor)?;
            json.end()?;
            Ok(value)
        } else {
            let variant: de::value::BorrowedStrDeserializer<'de, serde_json::Error> =
                de::value::BorrowedStrDeserializer::new(text);
            visitor.visit_enum(variant)
        }
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }

    forward_to_json! {
        deserialize_bool deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64
        deserialize_i128 deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64
        deserialize_u128 deserialize_f32 deserialize_f64 deserialize_bytes
        deserialize_byte_buf deserialize_unit deserialize_seq deserialize_map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        #[serde(rename = "user_id")]
        id: u64,
        name: String,
        score: f64,
        nickname: Option<String>,
    }

    impl Model for Profile {
        fn store_type(&self) -> StoreType {
            StoreType::Hash
        }

        fn primary_key(&self) -> String {
            self.id.to_string()
        }

        fn to_fields(&self) -> Result<Vec<(String, Vec<u8>)>, CodecError> {
            fields_from_serde(self)
        }

        fn from_fields(fields: HashMap<String, Vec<u8>>) -> Result<Self, CodecError> {
            serde_from_fields(fields)
        }
    }

    fn profile() -> Profile {
        Profile {
            id: 9,
            name: "42".to_string(),
            score: 1.25,
            nickname: None,
        }
    }

    #[test]
    fn test_hash_fields_use_serde_names() {
        let fields = fields_from_serde(&profile()).unwrap();
        let names: Vec<&str> = fields.iter().map(|(n, _)| n.as_str()).collect();
        assert!(names.contains(&"user_id"));
        assert!(names.contains(&"name"));
        assert!(!names.contains(&"nickname"));
    }

    #[test]
    fn test_hash_strings_stored_raw() {
        let fields: HashMap<String, Vec<u8>> = fields_from_serde(&profile())
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(fields["name"], b"42".to_vec());
        assert_eq!(fields["user_id"], b"9".to_vec());
        assert_eq!(fields["score"], b"1.25".to_vec());
    }

    #[test]
    fn test_hash_fields_written_by_other_clients() {
        #[derive(Debug, PartialEq, Deserialize)]
        enum Status {
            Active,
        }

        #[derive(Debug, PartialEq, Deserialize)]
        struct Handle(String);

        #[derive(Debug, PartialEq, Deserialize)]
        struct Account {
            title: String,
            handle: Handle,
            status: Status,
            visits: u32,
            verified: bool,
            tags: Vec<String>,
            note: Option<String>,
            motto: Option<String>,
        }

        let fields: HashMap<String, Vec<u8>> = [
            ("title", "hello world"),
            ("handle", "true"),
            ("status", "Active"),
            ("visits", "12"),
            ("verified", "true"),
            ("tags", r#"["a","b"]"#),
            ("motto", "null"),
            ("extra", "ignored"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
        .collect();

        let account: Account = serde_from_fields(fields).unwrap();
        assert_eq!(
            account,
            Account {
                title: "hello world".to_string(),
                handle: Handle("true".to_string()),
                status: Status::Active,
                visits: 12,
                verified: true,
                tags: vec!["a".to_string(), "b".to_string()],
                note: None,
                motto: Some("null".to_string()),
            }
        );
    }

    #[test]
    fn test_hash_non_numeric_into_number_fails() {
        let fields: HashMap<String, Vec<u8>> = fields_from_serde(&profile())
            .unwrap()
            .into_iter()
            .map(|(k, v)| if k == "score" { (k, b"high".to_vec()) } else { (k, v) })
            .collect();
        assert!(matches!(
            serde_from_fields::<Profile>(fields),
            Err(CodecError::Deserialize(_))
        ));
    }

    #[test]
    fn test_hash_record_decodes_numeric_looking_strings() {
        let record = Record::encode(StoreType::Hash, &profile()).unwrap();
        assert_eq!(record.store_type(), StoreType::Hash);
        let back: Profile = record.decode().unwrap();
        assert_eq!(back, profile());
    }

    #[test]
    fn test_unsupported_mode_reports_codec_error() {
        let err = Record::encode(StoreType::Serialized, &profile()).unwrap_err();
        assert!(matches!(err, CodecError::Unsupported("serialized")));
    }

    #[test]
    fn test_missing_field_fails_decode() {
        let mut fields: HashMap<String, Vec<u8>> = fields_from_serde(&profile())
            .unwrap()
            .into_iter()
            .collect();
        fields.remove("name");
        let err = serde_from_fields::<Profile>(fields).unwrap_err();
        assert!(matches!(err, CodecError::Deserialize(_)));
    }

    #[test]
    fn test_hash_write_ops_replace_and_expire() {
        let record = Record::Hash(vec![("a".to_string(), b"1".to_vec())]);
        let ops = record.write_ops("profile:9", Some(Duration::from_secs(3)));
        assert_eq!(ops.len(), 3);
        assert!(matches!(&ops[0], WriteOp::Del { key } if key == "profile:9"));
        assert!(matches!(&ops[2], WriteOp::Expire { ttl, .. } if *ttl == Duration::from_secs(3)));

        let ops = Record::Blob(b"x".to_vec()).write_ops("k", None);
        assert_eq!(
            ops,
            vec![WriteOp::Set {
                key: "k".to_string(),
                value: b"x".to_vec(),
                ttl: None
            }]
        );
    }

    #[test]
    fn test_json_blob_helpers() {
        let bytes = to_json_bytes(&profile()).unwrap();
        let back: Profile = from_json_bytes(&bytes).unwrap();
        assert_eq!(back, profile());
        assert!(from_json_bytes::<Profile>(b"not json").is_err());
    }
}
