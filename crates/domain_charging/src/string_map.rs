//! Set-valued filters with inclusion and exclusion entries

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::constants::{INFIELD_SEP, NEGATIVE_PREFIX};

/// A filter over string keys: `true` includes a key, `false` excludes it
///
/// Parsed from `;`-separated lists where a leading `!` marks an exclusion,
/// e.g. `"DST_FR;!DST_FR_MOBILE"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StringMap(BTreeMap<String, bool>);

impl StringMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a `;`-separated list, ignoring empty entries
    pub fn parse(list: &str) -> Self {
        let mut map = BTreeMap::new();
        for entry in list.split(INFIELD_SEP).map(str::trim).filter(|e| !e.is_empty()) {
            match entry.strip_prefix(NEGATIVE_PREFIX) {
                Some(excluded) if !excluded.is_empty() => {
                    map.insert(excluded.to_string(), false);
                }
                Some(_) => {}
                None => {
                    map.insert(entry.to_string(), true);
                }
            }
        }
        Self(map)
    }

    /// Builds a map including every given key
    pub fn including<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(keys.into_iter().map(|k| (k.into(), true)).collect())
    }

    pub fn insert(&mut self, key: impl Into<String>, include: bool) {
        self.0.insert(key.into(), include);
    }

    pub fn remove(&mut self, key: &str) -> Option<bool> {
        self.0.remove(key)
    }

    /// The key is present as an inclusion
    pub fn includes(&self, key: &str) -> bool {
        self.0.get(key).copied().unwrap_or(false)
    }

    /// The key is present as an exclusion
    pub fn excludes(&self, key: &str) -> bool {
        self.0.get(key).map(|include| !include).unwrap_or(false)
    }

    /// Returns the rule for `key`, if any
    pub fn get(&self, key: &str) -> Option<bool> {
        self.0.get(key).copied()
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Whether `key` passes this filter
    ///
    /// An empty filter admits everything. A key with an explicit rule follows
    /// it. An unknown key is admitted only when every rule is an exclusion.
    pub fn admits(&self, key: &str) -> bool {
        match self.0.get(key) {
            Some(include) => *include,
            None => self.0.is_empty() || self.is_all_exclusions(),
        }
    }

    /// Every rule of `other` is present with the same polarity in `self`
    pub fn contains_all(&self, other: &StringMap) -> bool {
        other.0.iter().all(|(k, v)| self.0.get(k) == Some(v))
    }

    /// True when there is at least one rule and none of them is an inclusion
    pub fn is_all_exclusions(&self) -> bool {
        !self.0.is_empty() && self.0.values().all(|include| !include)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Included keys in sorted order
    pub fn included_keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter(|(_, include)| **include).map(|(k, _)| k.as_str())
    }

    /// All keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl fmt::Display for StringMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, include) in &self.0 {
            if !first {
                write!(f, "{}", INFIELD_SEP)?;
            }
            first = false;
            if !include {
                write!(f, "{}", NEGATIVE_PREFIX)?;
            }
            f.write_str(key)?;
        }
        Ok(())
    }
}

impl<S: Into<String>> FromIterator<(S, bool)> for StringMap {
    fn from_iter<I: IntoIterator<Item = (S, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
