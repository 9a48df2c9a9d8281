//! Metadata for objects and properties.
//!
//! Metadata is stored as ordered key-value pairs of strings and is used to
//! describe interpretations and other attributes. Keys are write-once: a
//! second `set` of the same key is a contract violation.

use crate::util::{Error, Result};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;

/// Metadata storage - ordered key-value pairs of strings.
///
/// Uses SmallVec optimization for the common case of few entries.
#[derive(Clone, Default, PartialEq)]
pub struct MetaData {
    entries: SmallVec<[(String, String); 4]>,
}

impl MetaData {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a metadata value. Keys are write-once; setting an existing key
    /// fails with [`Error::DuplicateMetaDataKey`].
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let key = key.into();
        if self.contains(&key) {
            return Err(Error::DuplicateMetaDataKey(key));
        }
        self.entries.push((key, value.into()));
        Ok(())
    }

    /// Get a metadata value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Check if a key exists.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Get the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over key-value pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Serialize to the on-disk metadata string format:
    /// "key=value;key2=value2;..." with backslash escaping.
    pub fn serialize(&self) -> String {
        let mut result = String::new();
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                result.push(';');
            }
            result.push_str(&escape_metadata_string(k));
            result.push('=');
            result.push_str(&escape_metadata_string(v));
        }
        result
    }

    /// Parse from the on-disk metadata string format.
    ///
    /// Disk data is outside this library's control, so duplicate keys are
    /// tolerated here: the first occurrence wins.
    pub fn parse(s: &str) -> Self {
        let mut meta = Self::new();

        if s.is_empty() {
            return meta;
        }

        for part in split_metadata(s) {
            if let Some(eq_pos) = find_unescaped(part, b'=') {
                let key = unescape_metadata_string(&part[..eq_pos]);
                let value = unescape_metadata_string(&part[eq_pos + 1..]);
                if !key.is_empty() {
                    let _ = meta.set(key, value);
                }
            }
        }

        meta
    }

    // === Well-known keys ===

    /// Interpretation key (e.g., "point", "vector", "normal").
    pub const INTERPRETATION_KEY: &'static str = "interpretation";

    /// Archive-level key for the writing application.
    pub const APPLICATION_KEY: &'static str = "_sv_application";

    /// Archive-level key for the write date.
    pub const DATE_KEY: &'static str = "_sv_writtenOn";

    /// Archive-level key for a user description.
    pub const DESCRIPTION_KEY: &'static str = "_sv_description";

    /// Get interpretation.
    pub fn interpretation(&self) -> Option<&str> {
        self.get(Self::INTERPRETATION_KEY)
    }
}

impl fmt::Debug for MetaData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

impl From<HashMap<String, String>> for MetaData {
    fn from(map: HashMap<String, String>) -> Self {
        let mut meta = Self::new();
        for (k, v) in map {
            let _ = meta.set(k, v);
        }
        meta
    }
}

/// Escape special characters in metadata strings.
fn escape_metadata_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            ';' => result.push_str("\\;"),
            '=' => result.push_str("\\="),
            _ => result.push(c),
        }
    }
    result
}

/// Unescape special characters in metadata strings.
fn unescape_metadata_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                match next {
                    '\\' | ';' | '=' => {
                        result.push(next);
                        chars.next();
                    }
                    _ => result.push(c),
                }
            } else {
                result.push(c);
            }
        } else {
            result.push(c);
        }
    }
    result
}

/// Find first unescaped occurrence of a character.
fn find_unescaped(s: &str, ch: u8) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == ch {
            let mut backslashes = 0;
            let mut j = i;
            while j > 0 && bytes[j - 1] == b'\\' {
                backslashes += 1;
                j -= 1;
            }
            if backslashes % 2 == 0 {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

/// Split metadata string by semicolons, respecting escapes.
fn split_metadata(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;
    let bytes = s.as_bytes();

    while i < bytes.len() {
        if bytes[i] == b';' {
            let mut backslashes = 0;
            let mut j = i;
            while j > 0 && bytes[j - 1] == b'\\' {
                backslashes += 1;
                j -= 1;
            }
            if backslashes % 2 == 0 {
                parts.push(&s[start..i]);
                start = i + 1;
            }
        }
        i += 1;
    }

    if start < s.len() {
        parts.push(&s[start..]);
    }

    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_basic() {
        let mut meta = MetaData::new();
        meta.set("key1", "value1").unwrap();
        meta.set("key2", "value2").unwrap();

        assert_eq!(meta.get("key1"), Some("value1"));
        assert_eq!(meta.get("key2"), Some("value2"));
        assert_eq!(meta.get("key3"), None);
        assert_eq!(meta.len(), 2);
    }

    #[test]
    fn test_metadata_write_once() {
        let mut meta = MetaData::new();
        meta.set("key", "value1").unwrap();
        let err = meta.set("key", "value2").unwrap_err();

        assert!(matches!(err, Error::DuplicateMetaDataKey(_)));
        assert_eq!(meta.get("key"), Some("value1"));
        assert_eq!(meta.len(), 1);
    }

    #[test]
    fn test_metadata_serialize() {
        let mut meta = MetaData::new();
        meta.set("interpretation", "point").unwrap();
        meta.set("role", "deform").unwrap();

        let s = meta.serialize();
        assert!(s.contains("interpretation=point"));
        assert!(s.contains("role=deform"));
    }

    #[test]
    fn test_metadata_parse() {
        let meta = MetaData::parse("interpretation=point;role=deform");

        assert_eq!(meta.interpretation(), Some("point"));
        assert_eq!(meta.get("role"), Some("deform"));
    }

    #[test]
    fn test_metadata_parse_keeps_first_duplicate() {
        let meta = MetaData::parse("k=first;k=second");
        assert_eq!(meta.get("k"), Some("first"));
        assert_eq!(meta.len(), 1);
    }

    #[test]
    fn test_metadata_escape() {
        let mut meta = MetaData::new();
        meta.set("key=with;special", "value=with;special").unwrap();

        let s = meta.serialize();
        let parsed = MetaData::parse(&s);

        assert_eq!(parsed.get("key=with;special"), Some("value=with;special"));
    }

    #[test]
    fn test_metadata_roundtrip_order() {
        let mut meta = MetaData::new();
        meta.set("b", "2").unwrap();
        meta.set("a", "1").unwrap();
        let parsed = MetaData::parse(&meta.serialize());
        let keys: Vec<_> = parsed.iter().map(|(k, _)| k.to_owned()).collect();
        assert_eq!(keys, ["b", "a"]);
    }
}
