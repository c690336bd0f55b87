//! Purpose: Scalar values and the insertion-ordered `Metadata` mapping.
//! Exports: `Scalar`, `Metadata`, `Truthy`.
//! Role: In-memory form of catalog metadata; wire form lives in `codec`.
//! Invariants: Iteration order is insertion order; replacing a key keeps its slot.
//! Invariants: Keys are unique.
use super::tags::ScalarKind;
use serde_json::Value;
use std::fmt;

/// Presence test for catalog fields: zero, empty and `false` count as absent.
pub trait Truthy {
    fn is_truthy(&self) -> bool;
}

impl Truthy for String {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

impl Truthy for str {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

impl Truthy for i64 {
    fn is_truthy(&self) -> bool {
        *self != 0
    }
}

impl Truthy for f64 {
    fn is_truthy(&self) -> bool {
        *self != 0.0
    }
}

impl<T> Truthy for Vec<T> {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

impl Truthy for Value {
    fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(flag) => *flag,
            Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
            Value::String(text) => !text.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Object(map) => !map.is_empty(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    Integer(i64),
    Decimal(f64),
    String(String),
}

impl Scalar {
    pub fn kind(&self) -> ScalarKind {
        match self {
            Scalar::Integer(_) => ScalarKind::Integer,
            Scalar::Decimal(_) => ScalarKind::Decimal,
            Scalar::String(_) => ScalarKind::String,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Decimal(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(value) => Some(value),
            _ => None,
        }
    }
}

impl Truthy for Scalar {
    fn is_truthy(&self) -> bool {
        match self {
            Scalar::Integer(value) => value.is_truthy(),
            Scalar::Decimal(value) => value.is_truthy(),
            Scalar::String(value) => value.is_truthy(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Integer(value) => write!(f, "{value}"),
            Scalar::Decimal(value) => write!(f, "{value}"),
            Scalar::String(value) => f.write_str(value),
        }
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Integer(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Integer(value.into())
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Decimal(value)
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::String(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::String(value.to_string())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Metadata {
    entries: Vec<(String, Scalar)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Scalar> {
        self.position(key).map(|idx| &self.entries[idx].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Insert or replace; returns the previous value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Scalar>) -> Option<Scalar> {
        let key = key.into();
        let value = value.into();
        match self.position(&key) {
            Some(idx) => Some(std::mem::replace(&mut self.entries[idx].1, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Scalar> {
        self.position(key)
            .map(|idx| self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(entry, _)| entry == key)
    }
}

impl Truthy for Metadata {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

impl<K: Into<String>, V: Into<Scalar>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = Metadata::new();
        metadata.extend(iter);
        metadata
    }
}

impl<K: Into<String>, V: Into<Scalar>> Extend<(K, V)> for Metadata {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl IntoIterator for Metadata {
    type Item = (String, Scalar);
    type IntoIter = std::vec::IntoIter<(String, Scalar)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (idx, (key, value)) in self.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            match value {
                Scalar::String(text) => write!(f, "{key}: {text:?}")?,
                other => write!(f, "{key}: {other}")?,
            }
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::{Metadata, Scalar, Truthy};
    use serde_json::json;

    #[test]
    fn insert_preserves_first_position_on_replace() {
        let mut md = Metadata::new();
        md.insert("nRun", 6201);
        md.insert("quality", "GOOD");
        md.insert("nRun", 6202);
        let keys: Vec<_> = md.keys().collect();
        assert_eq!(keys, ["nRun", "quality"]);
        assert_eq!(md.get("nRun"), Some(&Scalar::Integer(6202)));
    }

    #[test]
    fn remove_shifts_remaining_entries() {
        let mut md: Metadata = [("a", 1), ("b", 2), ("c", 3)].into_iter().collect();
        assert_eq!(md.remove("b"), Some(Scalar::Integer(2)));
        assert_eq!(md.remove("b"), None);
        assert_eq!(md.len(), 2);
        let keys: Vec<_> = md.keys().collect();
        assert_eq!(keys, ["a", "c"]);
    }

    #[test]
    fn equality_is_order_sensitive() {
        let left: Metadata = [("a", 1), ("b", 2)].into_iter().collect();
        let right: Metadata = [("b", 2), ("a", 1)].into_iter().collect();
        assert_ne!(left, right);
    }

    #[test]
    fn display_quotes_strings_only() {
        let mut md = Metadata::new();
        md.insert("nRun", 6201);
        md.insert("quality", "GO");
        md.insert("ratio", 0.5);
        assert_eq!(md.to_string(), r#"{nRun: 6201, quality: "GO", ratio: 0.5}"#);
    }

    #[test]
    fn truthiness_follows_empty_and_zero() {
        assert!(!Scalar::Integer(0).is_truthy());
        assert!(!Scalar::Decimal(0.0).is_truthy());
        assert!(!Scalar::String(String::new()).is_truthy());
        assert!(Scalar::Integer(-1).is_truthy());
        assert!(!Metadata::new().is_truthy());
        assert!(!json!(null).is_truthy());
        assert!(!json!(false).is_truthy());
        assert!(!json!(0.0).is_truthy());
        assert!(!json!([]).is_truthy());
        assert!(!json!({}).is_truthy());
        assert!(json!({"a": 0}).is_truthy());
    }
}
