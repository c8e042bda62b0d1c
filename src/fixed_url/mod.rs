//! Fixed URL Module
//!
//! Keeps the replicas' alias registries in step with the content store. After a
//! mapping commits, the aliases of the resources it touched are (un)registered on
//! the replicas serving the content's logical domain.
//!
//! ## Architecture Overview
//! 1. **Addressing**: `path` turns a resource descriptor into a canonical, order-independent path.
//! 2. **Discovery**: `resolver` derives the logical domain from an anchoring identifier and lists its replicas.
//! 3. **Propagation**: `propagator` calls replicas one at a time until one accepts.
//! 4. **Scheduling**: `interceptor` runs an alias plan after a successful commit, off the caller's path.
//!
//! ## Submodules
//! - **`types`**: Actions, descriptors, plans, replica endpoints.
//! - **`path`**: Canonical path builder.
//! - **`resolver`**: Replica discovery capability and resolver.
//! - **`propagator`**: Sequential-fallback HTTP propagation.
//! - **`service`**: The `AliasSync` seam combining resolver and propagator.
//! - **`interceptor`**: Commit composition and detached plan execution.

pub mod interceptor;
pub mod path;
pub mod propagator;
pub mod resolver;
pub mod service;
pub mod types;
