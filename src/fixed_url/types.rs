//! Fixed URL Data Types
//!
//! Describes which alias to (un)register and where. A descriptor is domain-free; the
//! logical domain is only known once the content handle's anchoring identifier has
//! been resolved, so canonical paths are built late.

use super::path::CanonicalPath;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether an alias is being created or removed on the replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AliasAction {
    Register,
    Unregister,
}

impl AliasAction {
    /// Path prefix of the replica endpoint handling this action.
    pub fn root(&self) -> &'static str {
        match self {
            AliasAction::Register => "/registerFixedUrl/",
            AliasAction::Unregister => "/unregisterFixedUrl/",
        }
    }
}

/// Family of resources that can be aliased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Leaflet,
    GtinOwner,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Leaflet => "leaflet",
            ResourceKind::GtinOwner => "gtinOwner",
        }
    }

    /// First path segment of the aliased relative URL.
    pub fn root_segment(&self) -> &'static str {
        match self {
            ResourceKind::Leaflet => "leaflets",
            ResourceKind::GtinOwner => "gtinOwner",
        }
    }
}

/// The logical address of one aliased resource, minus its domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasDescriptor {
    pub kind: ResourceKind,
    pub params: Vec<(String, Option<String>)>,
}

impl AliasDescriptor {
    /// Alias of one leaflet language, on a product (`batch_number == None`) or on a batch.
    pub fn leaflet(
        leaflet_type: &str,
        gtin: &str,
        language: &str,
        batch_number: Option<&str>,
        expiry: Option<&str>,
    ) -> Self {
        Self {
            kind: ResourceKind::Leaflet,
            params: vec![
                ("leaflet_type".to_string(), Some(leaflet_type.to_string())),
                ("gtin".to_string(), Some(gtin.to_string())),
                ("language".to_string(), Some(language.to_string())),
                ("batchNumber".to_string(), batch_number.map(str::to_string)),
                ("expiry".to_string(), expiry.map(str::to_string)),
            ],
        }
    }

    pub fn gtin_owner(gtin: &str) -> Self {
        Self {
            kind: ResourceKind::GtinOwner,
            params: vec![("gtin".to_string(), Some(gtin.to_string()))],
        }
    }

    pub fn canonical_path(&self, action: AliasAction, domain: &str) -> CanonicalPath {
        CanonicalPath::build(
            action,
            self.kind,
            domain,
            self.params.iter().map(|(k, v)| (k.as_str(), v.as_deref())),
        )
    }
}

/// One alias call to make against a domain's replicas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasStep {
    pub action: AliasAction,
    pub descriptor: AliasDescriptor,
}

/// Ordered alias calls scheduled after a commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasPlan {
    pub steps: Vec<AliasStep>,
}

impl AliasPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, descriptor: AliasDescriptor) -> Self {
        self.steps.push(AliasStep {
            action: AliasAction::Register,
            descriptor,
        });
        self
    }

    pub fn unregister(mut self, descriptor: AliasDescriptor) -> Self {
        self.steps.push(AliasStep {
            action: AliasAction::Unregister,
            descriptor,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Base URL of one replica hosting a domain's alias registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplicaEndpoint(pub String);

impl ReplicaEndpoint {
    pub fn url_for(&self, path: &CanonicalPath) -> String {
        format!("{}{}", self.0.trim_end_matches('/'), path.as_str())
    }
}

impl fmt::Display for ReplicaEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Replicas of one logical domain, in the order discovery returned them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaSet {
    pub domain: String,
    pub endpoints: Vec<ReplicaEndpoint>,
}

/// The replica that accepted an alias call and how many calls it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationOutcome {
    pub replica: ReplicaEndpoint,
    pub attempts: usize,
}
