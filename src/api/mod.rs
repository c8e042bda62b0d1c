//! HTTP API Module
//!
//! The axum surface of a mapping node: message intake, audit log and language
//! lookups, and a health probe.
//!
//! ## Submodules
//! - **`protocol`**: Endpoint paths and DTOs.
//! - **`handlers`**: axum handlers backed by a shared `MappingEngine`.

pub mod handlers;
pub mod protocol;

use crate::mapping::MappingEngine;
use axum::{
    Extension, Router,
    routing::{get, put},
};
use handlers::*;
use protocol::*;
use std::sync::Arc;

/// Builds the node's router around `engine`.
pub fn router(engine: Arc<MappingEngine>) -> Router {
    Router::new()
        .route(ENDPOINT_MESSAGE, put(handle_message))
        .route(ENDPOINT_LOGS, get(handle_get_logs))
        .route(ENDPOINT_LANGUAGES, get(handle_get_languages))
        .route(ENDPOINT_HEALTH, get(handle_health))
        .layer(Extension(engine))
}
