use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use txstate_storage::StorageError;

/// Serializer settings shared by every log a factory creates, so that
/// application payload types encode the same way across entities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializerSettings {
    /// Emit indented JSON in text fields.
    pub pretty: bool,
}

/// Converts payloads and metadata to and from the text stored in document
/// fields.
#[derive(Debug, Clone, Default)]
pub struct PayloadSerializer {
    settings: SerializerSettings,
}

impl PayloadSerializer {
    pub fn new(settings: SerializerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SerializerSettings {
        &self.settings
    }

    pub fn encode<V: Serialize + ?Sized>(&self, value: &V) -> Result<String, StorageError> {
        let text = if self.settings.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        text.map_err(|e| StorageError::Serialization(e.to_string()))
    }

    pub fn decode<V: DeserializeOwned>(&self, text: &str) -> Result<V, StorageError> {
        serde_json::from_str(text).map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Ledger {
        owner: String,
        balances: BTreeMap<String, i64>,
    }

    #[test]
    fn test_custom_type_round_trips() {
        let s = PayloadSerializer::default();
        let mut ledger = Ledger {
            owner: "alice".to_string(),
            ..Default::default()
        };
        ledger.balances.insert("usd".to_string(), 120);
        let text = s.encode(&ledger).unwrap();
        assert_eq!(s.decode::<Ledger>(&text).unwrap(), ledger);
    }

    #[test]
    fn test_pretty_setting_changes_layout_only() {
        let compact = PayloadSerializer::default();
        let pretty = PayloadSerializer::new(SerializerSettings { pretty: true });
        let value = serde_json::json!({"a": [1, 2]});
        let c = compact.encode(&value).unwrap();
        let p = pretty.encode(&value).unwrap();
        assert!(!c.contains('\n'));
        assert!(p.contains('\n'));
        assert_eq!(
            compact.decode::<serde_json::Value>(&p).unwrap(),
            pretty.decode::<serde_json::Value>(&c).unwrap()
        );
    }

    #[test]
    fn test_decode_garbage_is_serialization_error() {
        let s = PayloadSerializer::default();
        let err = s.decode::<Ledger>("{not json").unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }
}
