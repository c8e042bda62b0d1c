//! Mapping Module
//!
//! Turns validated inbound messages into content-store mutations, record updates,
//! version bumps and audit entries.
//!
//! ## Dispatch Lifecycle
//! 1. **Routing**: The `MappingRegistry` picks the first rule whose route accepts the
//!    message's kind and action. No match is reported as `NoMatchingHandler`.
//! 2. **Validation**: The handler checks the message without touching any store.
//! 3. **Mutation**: The handler writes the entity's content tree and commits it. The
//!    commit schedules alias propagation in the background.
//! 4. **Versioning**: The entity's version counter is bumped exactly once.
//! 5. **Audit**: A log entry with the diff is appended.
//!
//! ## Submodules
//! - **`engine`**: Owns the collaborators and audits failed dispatches.
//! - **`registry`**: Ordered (route, handler) rules and the dispatch sequence.
//! - **`handler`**: The `MessageHandler` contract and per-dispatch context.
//! - **`product`**, **`leaflet`**, **`photo`**: The stock mappings.
//! - **`validation`**: Identifier, file and markup checks shared by handlers.
//! - **`languages`**: Per-engine cache of the languages each entity has leaflets in.

pub mod engine;
pub mod handler;
pub mod languages;
pub mod leaflet;
pub mod photo;
pub mod product;
pub mod registry;
pub mod validation;

pub use engine::MappingEngine;
pub use handler::{MappingContext, MappingOptions, MessageHandler, Mutation};
pub use registry::{MappingRegistry, MappingReport, Route};

#[cfg(test)]
mod tests;
