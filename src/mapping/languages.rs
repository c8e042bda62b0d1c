//! Working-language cache.
//!
//! Remembers which languages each entity has leaflets in, as last observed by a
//! leaflet mapping. Owned by the engine instance. Concurrent mappings may overwrite
//! each other's view, so this is for display only.

use crate::records::types::EntityKey;

use dashmap::DashMap;

#[derive(Default)]
pub struct LanguageCache {
    entries: DashMap<(EntityKey, String), Vec<String>>,
}

impl LanguageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entity: &EntityKey, leaflet_type: &str, languages: Vec<String>) {
        self.entries
            .insert((entity.clone(), leaflet_type.to_string()), languages);
    }

    pub fn languages(&self, entity: &EntityKey, leaflet_type: &str) -> Vec<String> {
        self.entries
            .get(&(entity.clone(), leaflet_type.to_string()))
            .map(|langs| langs.value().clone())
            .unwrap_or_default()
    }

    /// Every (leaflet type, languages) pair recorded for an entity.
    pub fn all_for(&self, entity: &EntityKey) -> Vec<(String, Vec<String>)> {
        let mut all: Vec<(String, Vec<String>)> = self
            .entries
            .iter()
            .filter(|entry| &entry.key().0 == entity)
            .map(|entry| (entry.key().1.clone(), entry.value().clone()))
            .collect();
        all.sort();
        all
    }
}
