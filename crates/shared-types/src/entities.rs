//! # Core Entities
//!
//! `KVEntry` is the unit of "export data": a key/value pair mirrored between
//! the chain's verified store and the controller's swing-store.
//!
//! ## JSON Encoding
//!
//! An entry is encoded as a JSON array:
//!
//! - `["key", "value"]` when a value is present
//! - `["key"]` when the value is absent
//!
//! An absent value is not the same thing as an empty string value; it marks a
//! deleted or incomplete entry on the controller side.

use std::fmt;

use serde::de::{self, IgnoredAny, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::KVEntryError;

/// A key with an optional string value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KVEntry {
    key: String,
    value: Option<String>,
}

impl KVEntry {
    /// Create an entry, rejecting empty keys.
    pub fn new(key: impl Into<String>, value: Option<String>) -> Result<Self, KVEntryError> {
        let key = key.into();
        if key.is_empty() {
            return Err(KVEntryError::EmptyKey);
        }
        Ok(Self { key, value })
    }

    /// Create an entry carrying a value.
    pub fn with_value(key: impl Into<String>, value: impl Into<String>) -> Result<Self, KVEntryError> {
        Self::new(key, Some(value.into()))
    }

    /// Create an entry whose value is absent.
    pub fn without_value(key: impl Into<String>) -> Result<Self, KVEntryError> {
        Self::new(key, None)
    }

    /// The entry key. Never empty.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The entry value, if any.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Whether a value is present (an empty string counts as present).
    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// Split into key and value.
    pub fn into_parts(self) -> (String, Option<String>) {
        (self.key, self.value)
    }
}

impl Serialize for KVEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.value.is_some() { 2 } else { 1 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.key)?;
        if let Some(value) = &self.value {
            seq.serialize_element(value)?;
        }
        seq.end()
    }
}

struct KVEntryVisitor;

impl<'de> Visitor<'de> for KVEntryVisitor {
    type Value = KVEntry;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a [key] or [key, value] array")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<KVEntry, A::Error> {
        let key: String = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        // `null` in value position decodes as an absent value
        let value: Option<String> = seq.next_element::<Option<String>>()?.flatten();
        if seq.next_element::<IgnoredAny>()?.is_some() {
            return Err(de::Error::invalid_length(3, &self));
        }
        KVEntry::new(key, value).map_err(de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for KVEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(KVEntryVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_key_rejected() {
        assert_eq!(KVEntry::without_value(""), Err(KVEntryError::EmptyKey));
        assert_eq!(KVEntry::with_value("", "v"), Err(KVEntryError::EmptyKey));
    }

    #[test]
    fn test_absent_value_differs_from_empty_value() {
        let absent = KVEntry::without_value("k").unwrap();
        let empty = KVEntry::with_value("k", "").unwrap();
        assert_ne!(absent, empty);
        assert!(!absent.has_value());
        assert!(empty.has_value());
        assert_eq!(empty.value(), Some(""));
    }

    #[test]
    fn test_serialize_shapes() {
        let with = KVEntry::with_value("a.b", "1").unwrap();
        let without = KVEntry::without_value("a.c").unwrap();
        assert_eq!(serde_json::to_string(&with).unwrap(), r#"["a.b","1"]"#);
        assert_eq!(serde_json::to_string(&without).unwrap(), r#"["a.c"]"#);
    }

    #[test]
    fn test_deserialize_null_value_is_absent() {
        let entry: KVEntry = serde_json::from_str(r#"["key", null]"#).unwrap();
        assert_eq!(entry.key(), "key");
        assert_eq!(entry.value(), None);
    }

    #[test]
    fn test_deserialize_rejects_malformed_arrays() {
        assert!(serde_json::from_str::<KVEntry>("[]").is_err());
        assert!(serde_json::from_str::<KVEntry>(r#"[""]"#).is_err());
        assert!(serde_json::from_str::<KVEntry>(r#"["k","v","extra"]"#).is_err());
        assert!(serde_json::from_str::<KVEntry>(r#"[null]"#).is_err());
        assert!(serde_json::from_str::<KVEntry>(r#"["k", 5]"#).is_err());
        assert!(serde_json::from_str::<KVEntry>(r#"{"key":"k"}"#).is_err());
    }
}
