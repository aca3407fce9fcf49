//! Generic key/value property store persisted with the savegame.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

/// Ordered name/value store. Values are kept in their savegame text form and
/// parsed on access.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataHandler {
    values: BTreeMap<String, String>,
}

impl DataHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Display>(&mut self, name: &str, value: T) {
        self.values.insert(name.to_string(), value.to_string());
    }

    pub fn set_raw(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Parsed value, or `None` if it is missing or does not parse as `T`.
    pub fn get<T: FromStr>(&self, name: &str) -> Option<T> {
        self.values.get(name).and_then(|v| v.parse().ok())
    }

    pub fn get_raw(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_access() {
        let mut data = DataHandler::new();
        data.set("NextItemId", 42u32);
        data.set("Rotation", 90.5f32);
        data.set_raw("Name", "tank");

        assert_eq!(data.get::<u32>("NextItemId"), Some(42));
        assert_eq!(data.get::<f32>("Rotation"), Some(90.5));
        assert_eq!(data.get::<u32>("Name"), None);
        assert_eq!(data.get_raw("Name"), Some("tank"));
        assert_eq!(data.iter().next(), Some(("Name", "tank")));
    }
}
