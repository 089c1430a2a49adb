//! Subsystem trait and per-tick context.
//!
//! RULE: Every subsystem implements SimSubsystem.
//! The engine calls update() on each registered subsystem
//! in registration order, every tick.
//! Execution order is fixed and documented in engine.rs.

use crate::{
    config::{AssetCatalog, EconomyConfig},
    error::SimResult,
    event::SimEvent,
    rng::RandomSource,
    state::GameState,
    types::Tick,
};

/// Read-only inputs shared by every subsystem for one tick.
#[derive(Debug, Clone, Copy)]
pub struct TickContext<'a> {
    pub tick:    Tick,
    pub catalog: &'a AssetCatalog,
    pub economy: &'a EconomyConfig,
}

/// What a subsystem hands back: the next state and the events it emitted.
#[derive(Debug, Clone)]
pub struct SubsystemOutput {
    pub state:  GameState,
    pub events: Vec<SimEvent>,
}

impl SubsystemOutput {
    pub fn unchanged(state: &GameState) -> Self {
        Self { state: state.clone(), events: Vec::new() }
    }
}

/// The contract every subsystem must fulfill.
pub trait SimSubsystem: Send {
    /// Unique stable name for this subsystem.
    fn name(&self) -> &'static str;

    /// Called once per tick by the engine.
    ///
    /// - `state`:     the snapshot produced by the previous subsystem
    /// - `ctx`:       tick number, catalog and economy parameters
    /// - `events_in`: events emitted by earlier subsystems this tick
    /// - `rng`:       this subsystem's namespaced stream for this tick
    ///
    /// Returns the next state plus the events to add to the tick's log.
    fn update(
        &self,
        state:     &GameState,
        ctx:       &TickContext<'_>,
        events_in: &[SimEvent],
        rng:       &mut RandomSource,
    ) -> SimResult<SubsystemOutput>;
}
