//! HTTP Protocol Definitions
//!
//! Endpoint paths and the DTOs exchanged with message senders and operators.

use crate::error::MappingError;
use crate::mapping::MappingReport;
use crate::records::types::AuditLogEntry;
use serde::{Deserialize, Serialize};

pub const ENDPOINT_MESSAGE: &str = "/mappingEngine/:domain/:subdomain/message";
pub const ENDPOINT_LOGS: &str = "/mappingEngine/:domain/logs";
pub const ENDPOINT_LANGUAGES: &str = "/mappingEngine/:domain/languages/:product_code";
pub const ENDPOINT_HEALTH: &str = "/health";

pub const UNKNOWN_DOMAIN_CODE: &str = "UNKNOWN_DOMAIN";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl From<&MappingError> for ErrorResponse {
    fn from(e: &MappingError) -> Self {
        Self {
            error: e.to_string(),
            code: e.code().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum MessageResponse {
    Mapped(MappingReport),
    Failed(ErrorResponse),
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LogsResponse {
    Entries(Vec<AuditLogEntry>),
    Failed(ErrorResponse),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeafletLanguages {
    pub leaflet_type: String,
    pub languages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LanguagesResponse {
    pub product_code: String,
    pub leaflets: Vec<LeafletLanguages>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub domain: String,
    pub subdomain: String,
    pub mappings: usize,
}
