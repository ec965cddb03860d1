//! Registry of preset effects the actuator can play

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// One preset effect and how long a single repetition lasts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectInfo {
    pub id: String,
    pub duration_ms: u64,
}

impl EffectInfo {
    pub fn new(id: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            id: id.into(),
            duration_ms,
        }
    }
}

/// Preset ids shipped with the platform, used when no catalog is configured
pub fn default_effects() -> Vec<EffectInfo> {
    vec![
        EffectInfo::new("haptic.clock.timer", 2000),
        EffectInfo::new("haptic.fail", 60),
        EffectInfo::new("haptic.charging", 100),
        EffectInfo::new("haptic.long_press.heavy", 80),
        EffectInfo::new("haptic.long_press.medium", 60),
        EffectInfo::new("haptic.long_press.light", 40),
        EffectInfo::new("haptic.slide.light", 20),
        EffectInfo::new("haptic.threshold", 40),
    ]
}

/// Read-only lookup from effect id to playback metadata
///
/// Built once at service start and shared behind an `Arc`; nothing mutates it
/// afterwards so support queries are pure.
#[derive(Debug, Clone, Default)]
pub struct EffectCatalog {
    effects: HashMap<String, EffectInfo>,
}

impl EffectCatalog {
    pub fn new(entries: impl IntoIterator<Item = EffectInfo>) -> Self {
        let mut effects = HashMap::new();
        for entry in entries {
            if entry.id.is_empty() {
                warn!("Skipping catalog entry with empty effect id");
                continue;
            }
            if entry.duration_ms == 0 {
                warn!("Skipping effect {} with zero duration", entry.id);
                continue;
            }
            if let Some(previous) = effects.insert(entry.id.clone(), entry) {
                warn!("Effect {} registered twice, keeping the last entry", previous.id);
            }
        }
        debug!("Effect catalog holds {} effects", effects.len());
        Self { effects }
    }

    /// Playback metadata for `effect_id`, `None` when it is not registered
    pub fn lookup(&self, effect_id: &str) -> Option<&EffectInfo> {
        self.effects.get(effect_id)
    }

    /// Whether `effect_id` is registered
    ///
    /// Unknown ids are simply unsupported, never an error.
    pub fn is_supported(&self, effect_id: &str) -> bool {
        self.effects.contains_key(effect_id)
    }

    /// Registered ids in lexical order
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.effects.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

/// Small builder used by tests and the daemon to extend the default catalog
pub struct EffectCatalogBuilder {
    entries: Vec<EffectInfo>,
}

impl Default for EffectCatalogBuilder {
    fn default() -> Self {
        Self {
            entries: default_effects(),
        }
    }
}

impl EffectCatalogBuilder {
    /// Builder without the built-in effects
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds or replaces an effect; later entries win on duplicate ids
    pub fn with_effect(mut self, id: impl Into<String>, duration_ms: u64) -> Self {
        self.entries.push(EffectInfo::new(id, duration_ms));
        self
    }

    pub fn build(self) -> EffectCatalog {
        EffectCatalog::new(self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_knows_clock_timer() {
        let catalog = EffectCatalogBuilder::default().build();
        assert!(catalog.is_supported("haptic.clock.timer"));
        assert!(!catalog.is_supported("haptic.xxx.yyy"));
        assert!(!catalog.is_supported(""));
        assert_eq!(
            catalog.lookup("haptic.clock.timer").map(|e| e.duration_ms),
            Some(2000)
        );
    }

    #[test]
    fn invalid_entries_are_dropped() {
        let catalog = EffectCatalogBuilder::empty()
            .with_effect("", 10)
            .with_effect("haptic.zero", 0)
            .with_effect("haptic.ok", 10)
            .build();
        assert_eq!(catalog.ids(), vec!["haptic.ok".to_string()]);
    }

    #[test]
    fn support_query_is_stable() {
        let catalog = EffectCatalogBuilder::default().build();
        for _ in 0..3 {
            assert!(catalog.is_supported("haptic.fail"));
            assert!(!catalog.is_supported("haptic.unknown"));
        }
    }
}
