//! Persisted record shapes and entity addressing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub const PRODUCTS_TABLE: &str = "products";
pub const BATCHES_TABLE: &str = "batches";
pub const LOGS_TABLE: &str = "logs";

/// Composite primary key of a versioned content entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKey {
    Product {
        product_code: String,
    },
    Batch {
        product_code: String,
        batch_code: String,
    },
}

impl EntityKey {
    pub fn product(product_code: &str) -> Self {
        EntityKey::Product {
            product_code: product_code.to_string(),
        }
    }

    pub fn batch(product_code: &str, batch_code: &str) -> Self {
        EntityKey::Batch {
            product_code: product_code.to_string(),
            batch_code: batch_code.to_string(),
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            EntityKey::Product { .. } => PRODUCTS_TABLE,
            EntityKey::Batch { .. } => BATCHES_TABLE,
        }
    }

    pub fn pk(&self) -> String {
        match self {
            EntityKey::Product { product_code } => product_code.clone(),
            EntityKey::Batch {
                product_code,
                batch_code,
            } => format!("{}|{}", product_code, batch_code),
        }
    }

    pub fn product_code(&self) -> &str {
        match self {
            EntityKey::Product { product_code } | EntityKey::Batch { product_code, .. } => {
                product_code
            }
        }
    }

    pub fn batch_code(&self) -> Option<&str> {
        match self {
            EntityKey::Product { .. } => None,
            EntityKey::Batch { batch_code, .. } => Some(batch_code),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.table(), self.pk())
    }
}

/// Product metadata as stored in the `products` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub pk: String,
    pub product_code: String,
    #[serde(default)]
    pub invented_name: Option<String>,
    #[serde(default)]
    pub name_medicinal_product: Option<String>,
    #[serde(default)]
    pub version: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Batch metadata as stored in the `batches` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecord {
    pub pk: String,
    pub product_code: String,
    pub batch_code: String,
    #[serde(default)]
    pub expiry_date: Option<String>,
    #[serde(default)]
    pub epi_leaflet_version: Option<u64>,
    #[serde(default)]
    pub version: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Before/after description of a mutation, recorded in the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Diff {
    pub old_value: Value,
    pub new_value: Value,
}

/// One append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: String,
    pub message_id: Option<String>,
    pub sender_id: Option<String>,
    pub message_type: String,
    pub action: String,
    pub item_code: String,
    pub domain: Option<String>,
    /// Anchoring identifier of the content commit this entry describes.
    pub anchor_id: Option<String>,
    pub existed_before: bool,
    pub before: Value,
    pub diff: Option<Diff>,
    pub success: bool,
    pub error: Option<String>,
    #[serde(rename = "__timestamp")]
    pub timestamp: u64,
}

/// Helper to get the current system time in milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
