//! Core domain types used throughout the registry.
//!
//! Identifiers are plain strings with no enforced charset; emptiness is the
//! only thing the service checks. Payloads stay raw bytes all the way into
//! the store and are only rendered as text when a listing is serialized.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::hash_map;
use std::collections::HashMap;
use std::fmt;

/// Kind identifier - names one namespace of targets (e.g. "hosts", "jobs").
///
/// # Example
/// ```
/// use targetd_common::Kind;
///
/// let kind = Kind::from("hosts");
/// assert_eq!(kind.as_str(), "hosts");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kind(String);

impl Kind {
    /// Creates a new Kind from a string.
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    /// Returns the kind as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Kind {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Kind {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Target key - identifies one entry within a kind.
///
/// Keys are unique per kind only; the same key under two kinds names two
/// unrelated entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetKey(String);

impl TargetKey {
    /// Creates a new TargetKey from a string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for TargetKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TargetKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque payload attached to a target.
///
/// # Rust Learning Note
///
/// The payload is a byte vector, not a `String`. Nothing in the core checks
/// that it is valid UTF-8; [`Payload::to_text`] does a lossy conversion at
/// the point where a listing turns into JSON.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Payload(Vec<u8>);

impl Payload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Renders the payload as text, replacing invalid UTF-8 with U+FFFD.
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

/// Snapshot of every entry in one namespace.
///
/// Iteration order is unspecified and must not be relied upon.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Listing {
    entries: HashMap<TargetKey, Payload>,
}

impl Listing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: TargetKey, payload: Payload) -> Option<Payload> {
        self.entries.insert(key, payload)
    }

    pub fn get(&self, key: &TargetKey) -> Option<&Payload> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, TargetKey, Payload> {
        self.entries.iter()
    }

    /// Builds the flat `{"key": "payload", ...}` object returned by `list`.
    pub fn to_json(&self) -> Map<String, Value> {
        self.entries
            .iter()
            .map(|(key, payload)| (key.as_str().to_string(), Value::String(payload.to_text())))
            .collect()
    }
}

impl FromIterator<(TargetKey, Payload)> for Listing {
    fn from_iter<I: IntoIterator<Item = (TargetKey, Payload)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Listing {
    type Item = (TargetKey, Payload);
    type IntoIter = hash_map::IntoIter<TargetKey, Payload>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
