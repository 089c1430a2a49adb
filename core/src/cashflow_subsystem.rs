//! Cashflow subsystem.
//!
//! cash_delta = Σ(adoption × price) − Σ salaries − operating_costs.
//! Cash is floored at zero; a studio can run dry but never into debt.
//!
//! Execution: after demand, so revenue reflects this tick's adoption.

use crate::{
    error::SimResult,
    event::SimEvent,
    rng::RandomSource,
    state::GameState,
    subsystem::{SimSubsystem, SubsystemOutput, TickContext},
};

#[derive(Debug, Default)]
pub struct CashflowSubsystem;

impl CashflowSubsystem {
    pub fn new() -> Self {
        Self
    }
}

impl SimSubsystem for CashflowSubsystem {
    fn name(&self) -> &'static str {
        "cashflow"
    }

    fn update(
        &self,
        state:      &GameState,
        ctx:        &TickContext<'_>,
        _events_in: &[SimEvent],
        _rng:       &mut RandomSource,
    ) -> SimResult<SubsystemOutput> {
        let tick = ctx.tick;
        let revenue = state.total_revenue();
        let mut salaries = 0.0;
        for member in &state.team.members {
            salaries += ctx.catalog.role(&member.role_id)?.salary;
        }
        let operating_costs = ctx.economy.operating_costs;
        let cash_delta = revenue - salaries - operating_costs;
        let next = state.apply_cash_delta(cash_delta);

        log::debug!(
            "tick={tick} cashflow: revenue={revenue:.2} salaries={salaries:.2} delta={cash_delta:+.2} cash={:.2}",
            next.cash
        );

        Ok(SubsystemOutput {
            state: next,
            events: vec![SimEvent::CashflowApplied {
                tick,
                revenue,
                salaries,
                operating_costs,
                cash_delta,
            }],
        })
    }
}

/// The cash delta announced earlier in the tick, if any.
pub fn cash_delta_from(events_in: &[SimEvent]) -> Option<f64> {
    events_in.iter().find_map(|event| match event {
        SimEvent::CashflowApplied { cash_delta, .. } => Some(*cash_delta),
        _ => None,
    })
}
