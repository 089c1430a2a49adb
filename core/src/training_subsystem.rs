//! Training subsystem.
//!
//! Every member gains `role.training_rate + training_bonus` progress per
//! tick. Reaching 1.0 converts into a fixed skill gain and restarts
//! training from zero.
//!
//! Execution: after hiring, before research. The training bonus comes from
//! research unlocked before this tick.

use crate::{
    error::SimResult,
    event::SimEvent,
    research_subsystem::ResearchBonuses,
    rng::RandomSource,
    state::{GameState, TeamState},
    subsystem::{SimSubsystem, SubsystemOutput, TickContext},
};

/// Skill gained when a member completes a training cycle.
pub const SKILL_GAIN: f64 = 0.05;

#[derive(Debug, Default)]
pub struct TrainingSubsystem;

impl TrainingSubsystem {
    pub fn new() -> Self {
        Self
    }
}

impl SimSubsystem for TrainingSubsystem {
    fn name(&self) -> &'static str {
        "training"
    }

    fn update(
        &self,
        state:      &GameState,
        ctx:        &TickContext<'_>,
        _events_in: &[SimEvent],
        _rng:       &mut RandomSource,
    ) -> SimResult<SubsystemOutput> {
        let tick = ctx.tick;
        let bonus = ResearchBonuses::aggregate(ctx.catalog, &state.research)?.training;
        let mut members = Vec::with_capacity(state.team.len());
        let mut events = Vec::new();

        for member in &state.team.members {
            let role = ctx.catalog.role(&member.role_id)?;
            let mut progressed = member.advance_training(role.training_rate + bonus);
            if progressed.training_progress >= 1.0 {
                progressed = progressed.reset_training().gain_skill(SKILL_GAIN);
                events.push(SimEvent::TrainingCompleted {
                    tick,
                    role_id: progressed.role_id.clone(),
                    skill:   progressed.skill,
                });
            }
            members.push(progressed);
        }

        if !events.is_empty() {
            log::debug!("tick={tick} training: {} members levelled up", events.len());
        }

        Ok(SubsystemOutput {
            state: state.with_team(TeamState { members }),
            events,
        })
    }
}
