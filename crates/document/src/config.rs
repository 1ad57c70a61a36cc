//! Store configuration for the document backend.
//!
//! Options are usually read from a TOML file:
//!
//! ```toml
//! connection_string = "file:///var/lib/txstate"
//! collection_prefix = "Transactions_"
//! abort_policy = "strict"
//!
//! [serializer]
//! pretty = false
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use txstate_storage::{AbortPolicy, StorageError};

use crate::serializer::SerializerSettings;

/// Prefix applied to the logical store name when none is configured.
pub const DEFAULT_COLLECTION_PREFIX: &str = "Transactions_";

fn default_collection_prefix() -> String {
    DEFAULT_COLLECTION_PREFIX.to_string()
}

/// Options for one logical transactional store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreOptions {
    /// `memory://[label]` or `file://<directory>`.
    pub connection_string: String,
    #[serde(default = "default_collection_prefix")]
    pub collection_prefix: String,
    #[serde(default)]
    pub abort_policy: AbortPolicy,
    #[serde(default)]
    pub serializer: SerializerSettings,
}

impl StoreOptions {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            collection_prefix: default_collection_prefix(),
            abort_policy: AbortPolicy::default(),
            serializer: SerializerSettings::default(),
        }
    }

    pub fn with_abort_policy(mut self, policy: AbortPolicy) -> Self {
        self.abort_policy = policy;
        self
    }

    pub fn with_serializer(mut self, settings: SerializerSettings) -> Self {
        self.serializer = settings;
        self
    }

    pub fn from_toml_str(content: &str) -> Result<Self, StorageError> {
        toml::from_str(content)
            .map_err(|e| StorageError::Configuration(format!("could not parse options: {e}")))
    }

    /// Read and parse a TOML options file from `path`.
    pub fn from_path(path: &Path) -> Result<Self, StorageError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StorageError::Configuration(format!("could not read '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn connection(&self) -> Result<Connection, StorageError> {
        self.connection_string.parse()
    }

    /// The collection a store named `store_name` lives in.
    pub fn collection_name(&self, store_name: &str) -> Result<String, StorageError> {
        if store_name.is_empty() {
            return Err(StorageError::Configuration(
                "store name must not be empty".to_string(),
            ));
        }
        let name = format!("{}{}", self.collection_prefix, store_name);
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            || name.starts_with('.')
        {
            return Err(StorageError::Configuration(format!(
                "invalid collection name '{name}': use ASCII letters, digits, '_', '-' or '.'"
            )));
        }
        Ok(name)
    }
}

/// A parsed connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connection {
    /// Private in-process database; the label only appears in logs.
    Memory { label: String },
    /// One directory per collection under `root`.
    File { root: PathBuf },
}

impl FromStr for Connection {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(label) = s.strip_prefix("memory://") {
            return Ok(Connection::Memory {
                label: label.to_string(),
            });
        }
        if let Some(path) = s.strip_prefix("file://") {
            if path.is_empty() {
                return Err(StorageError::Configuration(
                    "file:// connection string needs a directory".to_string(),
                ));
            }
            return Ok(Connection::File {
                root: PathBuf::from(path),
            });
        }
        Err(StorageError::Configuration(format!(
            "unsupported connection string '{s}' (expected memory:// or file://)"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_defaults() {
        let opts = StoreOptions::from_toml_str(r#"connection_string = "memory://""#).unwrap();
        assert_eq!(opts.collection_prefix, DEFAULT_COLLECTION_PREFIX);
        assert_eq!(opts.abort_policy, AbortPolicy::Permissive);
        assert!(!opts.serializer.pretty);
    }

    #[test]
    fn test_toml_full() {
        let opts = StoreOptions::from_toml_str(
            r#"
            connection_string = "file:///tmp/txstate"
            collection_prefix = "Tx_"
            abort_policy = "strict"

            [serializer]
            pretty = true
            "#,
        )
        .unwrap();
        assert_eq!(opts.abort_policy, AbortPolicy::Strict);
        assert!(opts.serializer.pretty);
        assert_eq!(opts.collection_name("accounts").unwrap(), "Tx_accounts");
        assert_eq!(
            opts.connection().unwrap(),
            Connection::File {
                root: PathBuf::from("/tmp/txstate")
            }
        );
    }

    #[test]
    fn test_toml_missing_connection_string() {
        let err = StoreOptions::from_toml_str("collection_prefix = \"x\"").unwrap_err();
        assert!(matches!(err, StorageError::Configuration(_)));
    }

    #[test]
    fn test_toml_unknown_abort_policy() {
        let err = StoreOptions::from_toml_str(
            "connection_string = \"memory://\"\nabort_policy = \"lenient\"",
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::Configuration(_)));
    }

    #[test]
    fn test_connection_strings() {
        assert_eq!(
            "memory://tests".parse::<Connection>().unwrap(),
            Connection::Memory {
                label: "tests".to_string()
            }
        );
        assert!("file://".parse::<Connection>().is_err());
        assert!("mongodb://localhost".parse::<Connection>().is_err());
        assert!("".parse::<Connection>().is_err());
    }

    #[test]
    fn test_collection_name_is_deterministic_prefix() {
        let opts = StoreOptions::new("memory://");
        assert_eq!(opts.collection_name("orders").unwrap(), "Transactions_orders");
        assert_eq!(
            opts.collection_name("orders").unwrap(),
            opts.collection_name("orders").unwrap()
        );
    }

    #[test]
    fn test_collection_name_rejects_bad_names() {
        let opts = StoreOptions::new("memory://");
        assert!(opts.collection_name("").is_err());
        assert!(opts.collection_name("a/b").is_err());
        let mut bare = opts.clone();
        bare.collection_prefix = String::new();
        assert!(bare.collection_name("..").is_err());
    }
}
