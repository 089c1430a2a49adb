//! Shared primitive types used across the entire simulation.

/// A simulation tick. One tick = one in-game day.
pub type Tick = u64;

/// A stable catalog identifier (role, product, market, research node, event).
pub type AssetId = String;

/// The canonical run identifier used by the run journal.
pub type RunId = String;

/// Fresh random run identifier. Run ids never feed the simulation itself.
pub fn new_run_id() -> RunId {
    uuid::Uuid::new_v4().to_string()
}
