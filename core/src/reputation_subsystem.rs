//! Reputation subsystem.
//!
//! Reputation drifts by ±0.5 per tick plus a small jitter: up when this
//! tick's cashflow was non-negative, down otherwise. The score is clamped
//! to [0.0, 100.0].
//!
//! Execution: after cashflow.
//! Depends on: reads events_in for CashflowApplied.

use crate::{
    cashflow_subsystem::cash_delta_from,
    error::SimResult,
    event::SimEvent,
    rng::RandomSource,
    state::GameState,
    subsystem::{SimSubsystem, SubsystemOutput, TickContext},
};

const DRIFT: f64 = 0.5;
const JITTER_WIDTH: f64 = 0.2;

#[derive(Debug, Default)]
pub struct ReputationSubsystem;

impl ReputationSubsystem {
    pub fn new() -> Self {
        Self
    }
}

impl SimSubsystem for ReputationSubsystem {
    fn name(&self) -> &'static str {
        "reputation"
    }

    fn update(
        &self,
        state:     &GameState,
        ctx:       &TickContext<'_>,
        events_in: &[SimEvent],
        rng:       &mut RandomSource,
    ) -> SimResult<SubsystemOutput> {
        let tick = ctx.tick;
        let cash_delta = cash_delta_from(events_in).unwrap_or(0.0);
        let direction = if cash_delta >= 0.0 { 1.0 } else { -1.0 };
        let jitter = (rng.random() - 0.5) * JITTER_WIDTH;

        let prev = state.reputation;
        let next = state.apply_reputation_delta(direction * DRIFT + jitter);
        let actual_delta = next.reputation - prev;

        if actual_delta < -0.5 {
            log::debug!("tick={tick} reputation drop: {prev:.1} -> {:.1} ({actual_delta:+.2})", next.reputation);
        } else {
            log::debug!("tick={tick} reputation: {:.1} ({actual_delta:+.2})", next.reputation);
        }

        Ok(SubsystemOutput {
            events: vec![SimEvent::ReputationUpdated {
                tick,
                delta:      actual_delta,
                reputation: next.reputation,
            }],
            state: next,
        })
    }
}
