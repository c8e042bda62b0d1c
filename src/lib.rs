//! Leaflet Mapping Engine Library
//!
//! Routes typed product, batch, leaflet and photo messages to handlers that write
//! versioned content trees, and keeps the replicas' fixed-URL alias registries in
//! step with every successful commit.
//!
//! ## Architecture Modules
//! - **`message`**: Parsed message envelope and the `messageType`-tagged body union.
//! - **`mapping`**: Registry, handlers and the engine that dispatches messages.
//! - **`content`**: The per-entity file-tree content store capability.
//! - **`records`**: Product and batch records, version counters and the audit log.
//! - **`fixed_url`**: Canonical alias paths, replica discovery, propagation with
//!   sequential fallback, and post-commit scheduling.
//! - **`api`**: The axum HTTP surface of a mapping node.
//! - **`config`**: Command-line and environment configuration.

pub mod api;
pub mod config;
pub mod content;
pub mod error;
pub mod fixed_url;
pub mod mapping;
pub mod message;
pub mod records;

pub use error::{MappingError, MappingResult};
