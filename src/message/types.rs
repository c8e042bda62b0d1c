//! Inbound message envelope.
//!
//! A message is a header plus a body discriminated by `messageType`. Each body
//! variant has its own typed struct, so parsing a message is also the first
//! schema check: a missing required field never reaches a handler.

use crate::error::{MappingError, MappingResult};
use crate::records::types::EntityKey;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What the sender wants done with the addressed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Add,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Add => "add",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

/// Discriminant of [`MessageBody`], used for routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Product,
    Batch,
    Leaflet,
    Smpc,
    ProductPhoto,
}

impl MessageKind {
    /// The wire value of `messageType`.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Product => "product",
            MessageKind::Batch => "batch",
            MessageKind::Leaflet => "leaflet",
            MessageKind::Smpc => "smpc",
            MessageKind::ProductPhoto => "ProductPhoto",
        }
    }

    /// Leaflet-like kinds are stored under a folder named after the kind.
    pub fn leaflet_type(&self) -> Option<&'static str> {
        match self {
            MessageKind::Leaflet => Some("leaflet"),
            MessageKind::Smpc => Some("smpc"),
            _ => None,
        }
    }
}

/// Envelope metadata shared by every message kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageHeader {
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub receiver_id: Option<String>,
    #[serde(default)]
    pub message_date_time: Option<String>,
    #[serde(default)]
    pub message_type_version: Option<Value>,
}

/// A file shipped alongside a leaflet XML, base64 encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedFile {
    pub filename: String,
    pub file_content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetails {
    #[serde(default)]
    pub invented_name: Option<String>,
    #[serde(default)]
    pub name_medicinal_product: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDetails {
    /// `YYMMDD`, day `00` meaning "end of month".
    #[serde(default)]
    pub expiry_date: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductMessage {
    pub action: Action,
    pub product_code: String,
    #[serde(default)]
    pub product: ProductDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMessage {
    pub action: Action,
    pub product_code: String,
    pub batch_code: String,
    #[serde(default)]
    pub batch: BatchDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafletMessage {
    pub action: Action,
    pub product_code: String,
    #[serde(default)]
    pub batch_code: Option<String>,
    pub language: String,
    #[serde(default)]
    pub xml_file_content: Option<String>,
    #[serde(default)]
    pub other_files_content: Vec<AttachedFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPhotoMessage {
    #[serde(default = "default_photo_action")]
    pub action: Action,
    pub product_code: String,
    pub image_data: String,
}

fn default_photo_action() -> Action {
    Action::Update
}

/// Message body, tagged by `messageType`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "messageType")]
pub enum MessageBody {
    #[serde(rename = "product")]
    Product(ProductMessage),
    #[serde(rename = "batch")]
    Batch(BatchMessage),
    #[serde(rename = "leaflet")]
    Leaflet(LeafletMessage),
    #[serde(rename = "smpc")]
    Smpc(LeafletMessage),
    #[serde(rename = "ProductPhoto", alias = "productPhoto")]
    ProductPhoto(ProductPhotoMessage),
}

/// A parsed inbound message. Never mutated after parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(flatten)]
    pub header: MessageHeader,
    #[serde(flatten)]
    pub body: MessageBody,
}

impl Message {
    /// Parses a message from its JSON representation.
    ///
    /// Any structural problem (unknown `messageType`, missing required field,
    /// wrong field type) is reported as a [`MappingError::Validation`].
    pub fn from_value(value: Value) -> MappingResult<Self> {
        serde_json::from_value(value).map_err(|e| MappingError::Validation(e.to_string()))
    }

    pub fn from_slice(bytes: &[u8]) -> MappingResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| MappingError::Validation(e.to_string()))
    }

    pub fn kind(&self) -> MessageKind {
        match &self.body {
            MessageBody::Product(_) => MessageKind::Product,
            MessageBody::Batch(_) => MessageKind::Batch,
            MessageBody::Leaflet(_) => MessageKind::Leaflet,
            MessageBody::Smpc(_) => MessageKind::Smpc,
            MessageBody::ProductPhoto(_) => MessageKind::ProductPhoto,
        }
    }

    pub fn action(&self) -> Action {
        match &self.body {
            MessageBody::Product(m) => m.action,
            MessageBody::Batch(m) => m.action,
            MessageBody::Leaflet(m) | MessageBody::Smpc(m) => m.action,
            MessageBody::ProductPhoto(m) => m.action,
        }
    }

    pub fn product_code(&self) -> &str {
        match &self.body {
            MessageBody::Product(m) => &m.product_code,
            MessageBody::Batch(m) => &m.product_code,
            MessageBody::Leaflet(m) | MessageBody::Smpc(m) => &m.product_code,
            MessageBody::ProductPhoto(m) => &m.product_code,
        }
    }

    pub fn batch_code(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Batch(m) => Some(&m.batch_code),
            MessageBody::Leaflet(m) | MessageBody::Smpc(m) => m.batch_code.as_deref(),
            _ => None,
        }
    }

    pub fn language(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Leaflet(m) | MessageBody::Smpc(m) => Some(&m.language),
            _ => None,
        }
    }

    /// The entity whose content and version this message touches.
    pub fn entity_key(&self) -> EntityKey {
        match self.batch_code() {
            Some(batch_code) => EntityKey::batch(self.product_code(), batch_code),
            None => EntityKey::product(self.product_code()),
        }
    }

    /// The leaflet body, for leaflet-like kinds.
    pub fn leaflet(&self) -> Option<&LeafletMessage> {
        match &self.body {
            MessageBody::Leaflet(m) | MessageBody::Smpc(m) => Some(m),
            _ => None,
        }
    }
}
