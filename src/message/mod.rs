//! Inbound Message Module
//!
//! Defines the message envelope accepted by the mapping engine. Messages arrive as
//! JSON, are parsed once into a [`types::Message`], and are shared read-only with the
//! handler that maps them.
//!
//! ## Submodules
//! - **`types`**: Envelope header, the `messageType`-tagged body union, and per-kind payloads.

pub mod types;

pub use types::{Action, Message, MessageBody, MessageKind};
