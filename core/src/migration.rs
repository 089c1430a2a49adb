//! Savegame schema migrations.
//!
//! A registry of single-step migrations keyed by source version. Each step
//! turns the JSON envelope of version N into version N + 1; loading chains
//! steps until the payload reaches CURRENT_VERSION.
//!
//! RULE: Never edit a registered step. A schema change adds a new step
//! and bumps CURRENT_VERSION.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::error::SaveGameError;

/// Schema version written by this build.
pub const CURRENT_VERSION: u32 = 2;

/// Transforms a version-N envelope into a version-(N + 1) envelope.
pub type MigrationFn = fn(Map<String, Value>) -> Result<Map<String, Value>, SaveGameError>;

pub struct MigrationRegistry {
    migrations: BTreeMap<u32, MigrationFn>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self { migrations: BTreeMap::new() }
    }

    /// Every step this build knows about.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(1, v1_to_v2);
        registry
    }

    pub fn register(&mut self, from_version: u32, migrate: MigrationFn) {
        self.migrations.insert(from_version, migrate);
    }

    pub fn can_migrate(&self, from: u32, to: u32) -> bool {
        if from >= to {
            return from == to;
        }
        (from..to).all(|v| self.migrations.contains_key(&v))
    }

    /// Chain steps from `from` to `to`. The returned envelope carries `to` as its version.
    pub fn migrate(
        &self,
        envelope: Map<String, Value>,
        from: u32,
        to: u32,
    ) -> Result<Map<String, Value>, SaveGameError> {
        if !self.can_migrate(from, to) {
            return Err(SaveGameError::UnsupportedVersion(u64::from(from)));
        }
        let mut current = envelope;
        for version in from..to {
            let step = self
                .migrations
                .get(&version)
                .ok_or(SaveGameError::UnsupportedVersion(u64::from(version)))?;
            current = step(current)?;
            current.insert("version".into(), json!(version + 1));
            log::debug!("savegame: migrated envelope from v{version} to v{}", version + 1);
        }
        Ok(current)
    }

    pub fn step_count(&self) -> usize {
        self.migrations.len()
    }
}

impl Default for MigrationRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// v1 saves only carried tick, cash and reputation. v2 adds the team,
/// products, research and achievements, all starting empty.
fn v1_to_v2(mut envelope: Map<String, Value>) -> Result<Map<String, Value>, SaveGameError> {
    let failed = |reason: &str| SaveGameError::Migration { from: 1, to: 2, reason: reason.to_string() };

    let state = envelope
        .get_mut("state")
        .ok_or_else(|| failed("missing state"))?
        .as_object_mut()
        .ok_or_else(|| failed("state is not an object"))?;

    state.entry("team").or_insert_with(|| json!({ "members": [] }));
    state.entry("products").or_insert_with(|| json!([]));
    state.entry("research").or_insert_with(|| {
        json!({ "unlocked": [], "active": null, "progress": 0.0, "backlog": [] })
    });
    state.entry("achievements").or_insert_with(|| json!([]));
    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v1_envelope() -> Map<String, Value> {
        match json!({ "version": 1, "state": { "tick": 7, "cash": 12.5, "reputation": 51.0 } }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn v1_gains_empty_collections() {
        let migrated = MigrationRegistry::standard().migrate(v1_envelope(), 1, 2).unwrap();
        assert_eq!(migrated["version"], json!(2));
        assert_eq!(migrated["state"]["team"], json!({ "members": [] }));
        assert_eq!(migrated["state"]["products"], json!([]));
        assert_eq!(migrated["state"]["research"]["active"], Value::Null);
        assert_eq!(migrated["state"]["tick"], json!(7));
    }

    #[test]
    fn same_version_is_a_no_op() {
        let envelope = v1_envelope();
        let out = MigrationRegistry::standard().migrate(envelope.clone(), 1, 1).unwrap();
        assert_eq!(out, envelope);
    }

    #[test]
    fn missing_step_is_unsupported() {
        let registry = MigrationRegistry::standard();
        assert!(!registry.can_migrate(0, 2));
        assert!(!registry.can_migrate(3, 2));
        assert!(matches!(
            registry.migrate(v1_envelope(), 0, 2),
            Err(SaveGameError::UnsupportedVersion(0))
        ));
    }

    #[test]
    fn envelope_without_state_fails_migration() {
        let mut envelope = v1_envelope();
        envelope.remove("state");
        assert!(matches!(
            MigrationRegistry::standard().migrate(envelope, 1, 2),
            Err(SaveGameError::Migration { from: 1, to: 2, .. })
        ));
    }

    #[test]
    fn registry_chains_steps_in_order() {
        fn add_marker(mut envelope: Map<String, Value>) -> Result<Map<String, Value>, SaveGameError> {
            let steps = envelope.get("steps").and_then(Value::as_u64).unwrap_or(0);
            envelope.insert("steps".into(), json!(steps + 1));
            Ok(envelope)
        }
        let mut registry = MigrationRegistry::new();
        registry.register(2, add_marker);
        registry.register(3, add_marker);
        let out = registry.migrate(Map::new(), 2, 4).unwrap();
        assert_eq!(out["steps"], json!(2));
        assert_eq!(out["version"], json!(4));
        assert_eq!(registry.step_count(), 2);
    }
}
