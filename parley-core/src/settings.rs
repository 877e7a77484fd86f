//! Thread-safe settings storage.
//!
//! Settings buckets are string-keyed maps shared by handle: cloning a
//! [`Settings`] yields another view onto the same map, so a plugin reading
//! its bucket observes writes made through the network. Nesting is explicit
//! via [`Settings::entry_map`] — reads never mutate.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

/// Raised when required settings are absent at registration time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("the setting(s) {} are not set", keys.join(", "))]
pub struct MissingSettings {
    pub keys: Vec<String>,
}

/// A single setting value.
#[derive(Debug, Clone)]
pub enum SettingValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Map(Settings),
}

impl SettingValue {
    /// The string form, when this value is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The integer form, when this value is an integer.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The boolean form, when this value is a boolean.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The nested map, when this value is a map.
    #[must_use]
    pub fn as_map(&self) -> Option<Settings> {
        match self {
            Self::Map(m) => Some(m.clone()),
            _ => None,
        }
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Settings> for SettingValue {
    fn from(value: Settings) -> Self {
        Self::Map(value)
    }
}

/// A shared, thread-safe settings map.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    inner: Arc<DashMap<String, SettingValue>>,
}

impl Settings {
    /// Create an empty settings map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a settings map from key/value pairs.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<SettingValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        let settings = Self::new();
        for (key, value) in pairs {
            settings.set(key, value);
        }
        settings
    }

    /// Look up a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<SettingValue> {
        self.inner.get(key).map(|entry| entry.value().clone())
    }

    /// Set a value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<SettingValue>) {
        self.inner.insert(key.into(), value.into());
    }

    /// Set a value only when the key is absent.
    pub fn set_default(&self, key: impl Into<String>, value: impl Into<SettingValue>) {
        self.inner.entry(key.into()).or_insert_with(|| value.into());
    }

    /// Check whether a key is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    /// Remove a key, returning its value when present.
    pub fn remove(&self, key: &str) -> Option<SettingValue> {
        self.inner.remove(key).map(|(_, value)| value)
    }

    /// Get the nested map under `key`, inserting an empty one when absent.
    ///
    /// Replaces a non-map value at `key` with a fresh map.
    pub fn entry_map(&self, key: impl Into<String>) -> Settings {
        let mut entry = self
            .inner
            .entry(key.into())
            .or_insert_with(|| SettingValue::Map(Settings::new()));

        if let SettingValue::Map(map) = entry.value() {
            return map.clone();
        }

        let map = Settings::new();
        *entry.value_mut() = SettingValue::Map(map.clone());
        map
    }

    /// Guarantee that `keys` are all present.
    ///
    /// # Errors
    ///
    /// Returns [`MissingSettings`] listing every absent key.
    pub fn require(&self, keys: &[&str]) -> Result<(), MissingSettings> {
        let missing: Vec<String> = keys
            .iter()
            .filter(|key| !self.contains(key))
            .map(|key| (*key).to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(MissingSettings { keys: missing })
        }
    }

    /// Copy every entry of `other` into this map.
    pub fn merge(&self, other: &Settings) {
        for entry in other.inner.iter() {
            self.inner.insert(entry.key().clone(), entry.value().clone());
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check whether the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get() {
        let settings = Settings::new();
        settings.set("nickname", "parley");
        settings.set("port", 6667i64);
        settings.set("verbose", true);

        assert_eq!(settings.get("nickname").unwrap().as_str(), Some("parley"));
        assert_eq!(settings.get("port").unwrap().as_int(), Some(6667));
        assert_eq!(settings.get("verbose").unwrap().as_bool(), Some(true));
        assert!(settings.get("absent").is_none());
    }

    #[test]
    fn clones_share_state() {
        let settings = Settings::new();
        let view = settings.clone();

        settings.set("key", "value");
        assert_eq!(view.get("key").unwrap().as_str(), Some("value"));
    }

    #[test]
    fn set_default_does_not_overwrite() {
        let settings = Settings::new();
        settings.set("nickname", "configured");
        settings.set_default("nickname", "fallback");
        settings.set_default("username", "fallback");

        assert_eq!(settings.get("nickname").unwrap().as_str(), Some("configured"));
        assert_eq!(settings.get("username").unwrap().as_str(), Some("fallback"));
    }

    #[test]
    fn entry_map_nests_explicitly() {
        let settings = Settings::new();
        let nested = settings.entry_map("channels");
        nested.set("#parley", true);

        // Reads do not vivify: a plain get on an absent key stays absent.
        assert!(settings.get("absent").is_none());
        assert_eq!(
            settings
                .entry_map("channels")
                .get("#parley")
                .unwrap()
                .as_bool(),
            Some(true)
        );
    }

    #[test]
    fn require_lists_every_missing_key() {
        let settings = Settings::new();
        settings.set("api_key", "k");

        assert!(settings.require(&["api_key"]).is_ok());

        let err = settings.require(&["api_key", "api_secret", "region"]).unwrap_err();
        assert_eq!(err.keys, vec!["api_secret".to_string(), "region".to_string()]);
    }

    #[test]
    fn merge_copies_entries() {
        let target = Settings::new();
        target.set("kept", "yes");

        let source = Settings::from_pairs([("added", "value")]);
        target.merge(&source);

        assert_eq!(target.get("kept").unwrap().as_str(), Some("yes"));
        assert_eq!(target.get("added").unwrap().as_str(), Some("value"));
        assert_eq!(target.len(), 2);
    }
}
