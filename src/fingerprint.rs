//! Configuration values and deterministic fingerprinting

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A scalar configuration value.
///
/// Untagged serde representation so configurations can be fed from plain
/// JSON objects produced by external collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The type tag keeps Int(1) and Str("1") from serializing identically.
        match self {
            ConfigValue::Bool(v) => write!(f, "bool:{v}"),
            ConfigValue::Int(v) => write!(f, "i64:{v}"),
            ConfigValue::Float(v) => write!(f, "f64:{v}"),
            ConfigValue::Str(v) => write!(f, "str:{v}"),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::Str(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::Str(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Int(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        ConfigValue::Float(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

/// An order-irrelevant mapping from string keys to scalar values.
///
/// Two configurations are equal iff their sorted key/value serialization is
/// byte-identical; `BTreeMap` iteration is already key-sorted, which makes
/// the fingerprint independent of insertion order.
pub type Config = BTreeMap<String, ConfigValue>;

/// Stable identifier derived from a configuration, optionally combined with
/// a logical name. Deterministic across calls and process restarts; not a
/// security boundary.
///
/// # Examples
///
/// ```
/// use handlepool::{Config, ConfigValue, Fingerprint};
///
/// let mut a = Config::new();
/// a.insert("model".into(), ConfigValue::Str("gpt-4".into()));
/// a.insert("temperature".into(), ConfigValue::Float(0.7));
///
/// let mut b = Config::new();
/// b.insert("temperature".into(), ConfigValue::Float(0.7));
/// b.insert("model".into(), ConfigValue::Str("gpt-4".into()));
///
/// assert_eq!(Fingerprint::of(&a), Fingerprint::of(&b));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a configuration on its own (resource pool keys).
    pub fn of(config: &Config) -> Self {
        Self(hash_hex(canonical(config).as_bytes()))
    }

    /// Fingerprint a (name, configuration) pair (registry ids).
    ///
    /// The name is length-prefixed onto the canonical serialization before
    /// hashing, so identical configs under different names never collide,
    /// even for names containing separator characters.
    pub fn of_named(name: &str, config: &Config) -> Self {
        let mut input = String::new();
        push_token(&mut input, name);
        input.push_str(&canonical(config));
        Self(hash_hex(input.as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn canonical(config: &Config) -> String {
    let mut out = String::new();
    for (key, value) in config {
        push_token(&mut out, key);
        push_token(&mut out, &value.to_string());
    }
    out
}

/// Length-prefixed so separator characters embedded in keys or values
/// cannot reproduce another config's serialization.
fn push_token(out: &mut String, token: &str) {
    out.push_str(&token.len().to_string());
    out.push(':');
    out.push_str(token);
}

fn hash_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}
