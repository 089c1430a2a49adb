//! Simulation clock. Owns the monotonic tick counter.

use serde::{Deserialize, Serialize};

use crate::types::Tick;

/// How the simulation reads the current tick.
pub trait TimeProvider {
    fn current_tick(&self) -> Tick;
}

/// Monotonic tick counter. Only ever moves forward.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TickClock {
    tick: Tick,
}

impl TickClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting from `tick` (used after loading a save).
    pub fn starting_at(tick: Tick) -> Self {
        Self { tick }
    }

    /// Advance by `steps` ticks. Returns the new tick number.
    pub fn advance(&mut self, steps: Tick) -> Tick {
        self.tick = self.tick.saturating_add(steps);
        self.tick
    }
}

impl TimeProvider for TickClock {
    fn current_tick(&self) -> Tick {
        self.tick
    }
}

/// Wall-clock pacing presets for `TickLoop::run`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SimSpeed {
    Normal,       // 1 tick per 0.5 s
    Accelerated,  // 1 tick per 0.1 s
    FastForward,  // 1 tick per 0.02 s
}

impl SimSpeed {
    /// Seconds of wall-clock time per tick.
    pub fn tick_duration(&self) -> f64 {
        match self {
            SimSpeed::Normal      => 0.5,
            SimSpeed::Accelerated => 0.1,
            SimSpeed::FastForward => 0.02,
        }
    }
}
