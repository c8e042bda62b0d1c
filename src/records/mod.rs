//! Entity Records Module
//!
//! Persisted metadata for products and batches, their version counters, and the
//! append-only audit trail of mappings.
//!
//! ## Submodules
//! - **`types`**: Entity keys, record shapes, diffs and audit entries.
//! - **`store`**: The `EntityStore` capability and its DashMap-backed implementation.
//! - **`version`**: Optimistic per-entity version increments.
//! - **`audit`**: Best-effort audit logging.

pub mod audit;
pub mod store;
pub mod types;
pub mod version;
