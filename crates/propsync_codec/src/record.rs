//! Named, timestamped record.

use crate::value::Value;
use serde::Serialize;

/// One entry of a record pack.
///
/// A record without a value is valid: it names a property without
/// carrying data, which is how partially initialized objects are listed
/// when asking the cloud for values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// Fully resolved record name (`"parent:child"` for object fields).
    pub name: String,
    /// Record value, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Unix timestamp in seconds, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl Record {
    /// Creates a record carrying a value.
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            timestamp: None,
        }
    }

    /// Creates a record that only carries a name.
    pub fn name_only(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            timestamp: None,
        }
    }

    /// Sets the timestamp.
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Splits the name into its base name and optional field name.
    ///
    /// `"light:hue"` yields `("light", Some("hue"))`, `"led"` yields
    /// `("led", None)`.
    pub fn split_name(&self) -> (&str, Option<&str>) {
        match self.name.split_once(':') {
            Some((base, field)) => (base, Some(field)),
            None => (&self.name, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_name() {
        assert_eq!(Record::new("led", true).split_name(), ("led", None));
        assert_eq!(
            Record::new("light:hue", 5).split_name(),
            ("light", Some("hue"))
        );
        assert_eq!(Record::name_only("r:m").split_name(), ("r", Some("m")));
    }

    #[test]
    fn builder() {
        let record = Record::new("temp", 21.5).with_timestamp(1_700_000_000);
        assert_eq!(record.value, Some(Value::Float(21.5)));
        assert_eq!(record.timestamp, Some(1_700_000_000));
        assert!(Record::name_only("x").value.is_none());
    }
}
