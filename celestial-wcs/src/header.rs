use celestial_headers::{Header, KeywordValue};

use crate::error::{WcsError, WcsResult};

pub trait KeywordProvider {
    fn get_value(&self, key: &str) -> Option<&KeywordValue>;

    fn get_string(&self, key: &str) -> Option<String> {
        self.get_value(key)?.as_string().map(|s| s.to_string())
    }

    fn get_float(&self, key: &str) -> Option<f64> {
        self.get_value(key)?.as_real()
    }

    fn get_int(&self, key: &str) -> Option<i64> {
        self.get_value(key)?.as_integer()
    }

    fn require_float(&self, key: &str) -> WcsResult<f64> {
        self.get_float(key)
            .ok_or_else(|| WcsError::missing_keyword(key))
    }

    fn require_string(&self, key: &str) -> WcsResult<String> {
        self.get_string(key)
            .ok_or_else(|| WcsError::missing_keyword(key))
    }
}

impl KeywordProvider for Header {
    fn get_value(&self, key: &str) -> Option<&KeywordValue> {
        self.get_keyword_value(key)
    }
}

/// Ordered keyword → value updates, as produced by a correction and merged
/// into a header with [`KeywordMap::apply_to`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeywordMap {
    entries: Vec<(String, KeywordValue)>,
}

impl KeywordMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<KeywordValue>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        self
    }

    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.set(key, KeywordValue::String(value.into()))
    }

    pub fn set_float(&mut self, key: impl Into<String>, value: f64) -> &mut Self {
        self.set(key, KeywordValue::Real(value))
    }

    pub fn set_int(&mut self, key: impl Into<String>, value: i64) -> &mut Self {
        self.set(key, KeywordValue::Integer(value))
    }

    pub fn extend(&mut self, other: KeywordMap) -> &mut Self {
        for (key, value) in other.entries {
            self.set(key, value);
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &KeywordValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes every entry into `header`, updating existing cards in place.
    pub fn apply_to(&self, header: &mut Header) {
        for (key, value) in &self.entries {
            tracing::trace!(keyword = %key, %value, "merge");
            header.set(key, value.clone());
        }
    }
}

impl KeywordProvider for KeywordMap {
    fn get_value(&self, key: &str) -> Option<&KeywordValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}
