//! Read and re-run surface for adapters (HTTP handlers, UI presenters).
//!
//! RULE: Readers only ever see a fully computed snapshot. Re-runs build a
//! private engine, run it to completion, and then swap the published
//! snapshot in one step. At most one re-run is in flight at a time.

use std::{
    collections::BTreeMap,
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use serde::{Deserialize, Serialize};

use crate::{
    config::{AssetCatalog, EconomyConfig, SimulationProfile},
    engine::SimEngine,
    error::{SimError, SimResult},
    event::{KpiRecord, LogEntry},
    savegame,
    state::GameState,
    types::{new_run_id, AssetId, RunId},
};

/// Economic levers a caller may change for a re-run. Unset fields keep the
/// service's base configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RerunOverrides {
    pub seed:                Option<u64>,
    pub ticks:               Option<u64>,
    pub operating_costs:     Option<f64>,
    pub starting_cash:       Option<f64>,
    pub starting_reputation: Option<f64>,
    pub price_overrides:     BTreeMap<AssetId, f64>,
}

impl RerunOverrides {
    fn apply(&self, economy: &EconomyConfig) -> EconomyConfig {
        let mut economy = economy.clone();
        if let Some(costs) = self.operating_costs {
            economy.operating_costs = costs;
        }
        if let Some(cash) = self.starting_cash {
            economy.starting_cash = cash;
        }
        if let Some(reputation) = self.starting_reputation {
            economy.starting_reputation = reputation;
        }
        economy
            .price_overrides
            .extend(self.price_overrides.iter().map(|(id, price)| (id.clone(), *price)));
        economy
    }
}

/// One fully computed simulation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSnapshot {
    pub run_id:    RunId,
    pub seed:      u64,
    pub state:     GameState,
    pub history:   Vec<KpiRecord>,
    pub event_log: Vec<LogEntry>,
}

pub struct SimulationService {
    catalog:    Arc<AssetCatalog>,
    seed:       u64,
    ticks:      u64,
    economy:    EconomyConfig,
    published:  Mutex<Arc<SimulationSnapshot>>,
    rerun_gate: Mutex<()>,
}

impl SimulationService {
    /// Run the base configuration once and publish the result.
    pub fn new(catalog: Arc<AssetCatalog>, seed: u64, ticks: u64, economy: EconomyConfig) -> SimResult<Self> {
        let snapshot = simulate(&catalog, seed, ticks, &economy)?;
        Ok(Self {
            catalog,
            seed,
            ticks,
            economy,
            published: Mutex::new(Arc::new(snapshot)),
            rerun_gate: Mutex::new(()),
        })
    }

    pub fn from_profile(catalog: Arc<AssetCatalog>, profile: &SimulationProfile) -> SimResult<Self> {
        Self::new(catalog, profile.seed, profile.ticks, profile.economy.clone())
    }

    pub fn snapshot(&self) -> Arc<SimulationSnapshot> {
        Arc::clone(&self.published())
    }

    pub fn state(&self) -> GameState {
        self.published().state.clone()
    }

    pub fn kpi_history(&self) -> Vec<KpiRecord> {
        self.published().history.clone()
    }

    /// Re-run from tick 0 with `overrides` and publish the result.
    pub fn rerun(&self, overrides: &RerunOverrides) -> SimResult<Arc<SimulationSnapshot>> {
        let _gate = lock(&self.rerun_gate);
        let seed = overrides.seed.unwrap_or(self.seed);
        let ticks = overrides.ticks.unwrap_or(self.ticks);
        let economy = overrides.apply(&self.economy);
        let snapshot = Arc::new(simulate(&self.catalog, seed, ticks, &economy)?);
        *self.published() = Arc::clone(&snapshot);
        Ok(snapshot)
    }

    /// Publish the state stored at `path`. A save that does not fit the
    /// catalog is rejected and the current snapshot stays in place.
    pub fn load_save(&self, path: &Path) -> SimResult<Arc<SimulationSnapshot>> {
        let _gate = lock(&self.rerun_gate);
        let state = savegame::load_game(path)?;
        state.validate_against(&self.catalog).map_err(|e| {
            log::warn!("rejected save {}: {e}", path.display());
            e
        })?;
        let snapshot = Arc::new(SimulationSnapshot {
            run_id:    new_run_id(),
            seed:      self.seed,
            state,
            history:   Vec::new(),
            event_log: Vec::new(),
        });
        *self.published() = Arc::clone(&snapshot);
        Ok(snapshot)
    }

    fn published(&self) -> MutexGuard<'_, Arc<SimulationSnapshot>> {
        lock(&self.published)
    }
}

/// Poisoning is ignored: the guarded value is always a complete snapshot.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn simulate(catalog: &Arc<AssetCatalog>, seed: u64, ticks: u64, economy: &EconomyConfig) -> SimResult<SimulationSnapshot> {
    if ticks == 0 {
        return Err(SimError::config("Simulation requires at least one tick"));
    }
    let run_id = new_run_id();
    let mut engine = SimEngine::build(run_id.clone(), seed, Arc::clone(catalog), economy.clone())?;
    engine.run_ticks(ticks)?;
    Ok(SimulationSnapshot {
        run_id,
        seed,
        state:     engine.state().clone(),
        history:   engine.kpi_history().to_vec(),
        event_log: engine.event_log().cloned().collect(),
    })
}
