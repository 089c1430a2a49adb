//! Hiring subsystem.
//!
//! Keeps every product at its minimum staffing. For each product in state
//! order and each required role in id order, attempts hires until the
//! shortfall is closed. An attempt fails with probability equal to the
//! role's hiring_difficulty; a failure ends hiring for that role this tick.
//!
//! Head counts are shared: two products needing two engineers are both
//! satisfied by the same two people.
//!
//! Execution: first in registration order.

use crate::{
    error::SimResult,
    event::SimEvent,
    rng::RandomSource,
    state::{GameState, TeamMember},
    subsystem::{SimSubsystem, SubsystemOutput, TickContext},
};

/// Skill every new hire starts with.
pub const STARTING_SKILL: f64 = 0.4;

#[derive(Debug, Default)]
pub struct HiringSubsystem;

impl HiringSubsystem {
    pub fn new() -> Self {
        Self
    }
}

impl SimSubsystem for HiringSubsystem {
    fn name(&self) -> &'static str {
        "hiring"
    }

    fn update(
        &self,
        state:      &GameState,
        ctx:        &TickContext<'_>,
        _events_in: &[SimEvent],
        rng:        &mut RandomSource,
    ) -> SimResult<SubsystemOutput> {
        let tick = ctx.tick;
        let mut team = state.team.clone();
        let mut events = Vec::new();

        for product_state in &state.products {
            let product = ctx.catalog.product(&product_state.product_id)?;
            for (role_id, required) in &product.required_roles {
                let role = ctx.catalog.role(role_id)?;
                while team.count_role(role_id) < *required as usize {
                    if rng.random() < role.hiring_difficulty {
                        log::debug!("tick={tick} hiring: no {role_id} candidate accepted");
                        break;
                    }
                    team = team.add_member(TeamMember::new(role_id.clone(), STARTING_SKILL));
                    events.push(SimEvent::MemberHired {
                        tick,
                        role_id:    role_id.clone(),
                        product_id: product.id.clone(),
                    });
                }
            }
        }

        if !events.is_empty() {
            log::debug!("tick={tick} hiring: {} new members, team size {}", events.len(), team.len());
        }

        Ok(SubsystemOutput { state: state.with_team(team), events })
    }
}
