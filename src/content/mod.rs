//! Content Store Module
//!
//! The file-tree content capability mappings write into.
//!
//! ## Core Concepts
//! - **Handle**: One versioned tree per entity (product or batch), addressed by an anchoring identifier.
//! - **Staging**: Each open gets a private staging area. Its writes and deletes are visible only to
//!   that mapping and become durable on commit.
//! - **Store**: Opens handles by entity key.

pub mod memory;
pub mod store;

pub use store::{ContentHandle, ContentStore, EntryType};
