//! Prefix-addressable configuration groups.
//!
//! A [`ConfigurationGroup`] is an immutable snapshot of flattened, dotted
//! property keys (`soapclient.def.billing.pool.max_total_connections`) mapped
//! to their raw string values. Groups never change after construction; a
//! sub-group produced by [`ConfigurationGroup::break_out`] is a new snapshot
//! whose keys have the prefix stripped.
use std::{collections::BTreeMap, fmt, str::FromStr};

/// Result type alias for configuration lookups
pub type ConfigurationResult<T> = Result<T, ConfigurationError>;

/// Raised when a value is present but cannot be coerced to the expected type.
///
/// Absence is never an error; every accessor returns `Ok(None)` for a missing key.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Invalid value '{value}' for '{key}': expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },

    #[error("Invalid configuration for '{key}': {message}")]
    Invalid { key: String, message: String },
}

/// Immutable key/value snapshot addressed by dotted prefixes.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConfigurationGroup {
    /// Full dotted path of this group inside the source (empty for the root)
    path: String,
    entries: BTreeMap<String, String>,
}

impl ConfigurationGroup {
    /// Create a group rooted at `path` from already flattened entries.
    pub fn new<I, K, V>(path: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            path: path.into(),
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Create a root group (empty path).
    pub fn root<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new("", entries)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Raw value lookup.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_string)
    }

    /// Parse an integer value. Surrounding whitespace is ignored.
    pub fn get_integer<T>(&self, key: &str) -> ConfigurationResult<Option<T>>
    where
        T: FromStr,
    {
        self.get(key)
            .map(|raw| {
                raw.trim()
                    .parse::<T>()
                    .map_err(|_| self.invalid(key, raw, "an integer"))
            })
            .transpose()
    }

    /// Parse a boolean value (`true` / `false`, case-insensitive).
    pub fn get_bool(&self, key: &str) -> ConfigurationResult<Option<bool>> {
        self.get(key)
            .map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(self.invalid(key, raw, "a boolean")),
            })
            .transpose()
    }

    /// Extract the sub-group of every key starting with `prefix.`.
    ///
    /// Returns `None` when no key shares the prefix, so an absent block is
    /// never confused with an empty one.
    pub fn break_out(&self, prefix: &str) -> Option<ConfigurationGroup> {
        let prefix = prefix.trim_end_matches('.');
        if prefix.is_empty() {
            return if self.entries.is_empty() {
                None
            } else {
                Some(self.clone())
            };
        }
        let needle = format!("{prefix}.");
        let entries: BTreeMap<String, String> = self
            .entries
            .range(needle.clone()..)
            .take_while(|(k, _)| k.starts_with(&needle))
            .map(|(k, v)| (k[needle.len()..].to_string(), v.clone()))
            .collect();

        if entries.is_empty() {
            None
        } else {
            Some(Self {
                path: self.full_key(prefix),
                entries,
            })
        }
    }

    /// Distinct first path segments, e.g. the client ids below a prefix group.
    pub fn sections(&self) -> Vec<String> {
        let mut sections: Vec<String> = self
            .entries
            .keys()
            .filter_map(|k| k.split_once('.').map(|(head, _)| head.to_string()))
            .collect();
        sections.dedup();
        sections
    }

    /// Fully qualified key for error reporting.
    pub fn full_key(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{key}", self.path)
        }
    }

    fn invalid(&self, key: &str, raw: &str, expected: &'static str) -> ConfigurationError {
        ConfigurationError::InvalidValue {
            key: self.full_key(key),
            value: raw.to_string(),
            expected,
        }
    }
}

// Values may hold credentials, so only keys are shown.
impl fmt::Debug for ConfigurationGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationGroup")
            .field("path", &self.path)
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
