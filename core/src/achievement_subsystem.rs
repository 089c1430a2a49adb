//! Achievement subsystem and the platform unlock hook.
//!
//! Definitions are evaluated in definition order against the state the
//! reputation subsystem produced. An id already recorded in the state is
//! never evaluated again, so the first unlock wins even when the
//! condition stays true on later ticks.
//!
//! Execution: last in registration order.

use std::collections::BTreeSet;

use crate::{
    error::{SimError, SimResult},
    event::SimEvent,
    rng::RandomSource,
    state::{AchievementSnapshot, GameState},
    subsystem::{SimSubsystem, SubsystemOutput, TickContext},
};

pub type AchievementCondition = fn(&GameState) -> bool;

#[derive(Debug, Clone)]
pub struct AchievementDefinition {
    pub id:          &'static str,
    pub name:        &'static str,
    pub description: &'static str,
    pub condition:   AchievementCondition,
}

pub fn default_definitions() -> Vec<AchievementDefinition> {
    vec![
        AchievementDefinition {
            id:          "first_hire",
            name:        "Recruiter",
            description: "Hire your first team member.",
            condition:   |state| !state.team.is_empty(),
        },
        AchievementDefinition {
            id:          "cash_milestone",
            name:        "First Funding",
            description: "Reach at least 50k cash reserves.",
            condition:   |state| state.cash >= 50_000.0,
        },
        AchievementDefinition {
            id:          "research_unlock",
            name:        "Breakthrough",
            description: "Complete your first research project.",
            condition:   |state| !state.research.unlocked.is_empty(),
        },
    ]
}

/// Storefront or platform integration notified of unlocks.
/// Injected into the engine; failures are logged, never fatal.
pub trait PlatformAchievements: Send {
    fn unlock(&mut self, achievement_id: &str) -> anyhow::Result<()>;
}

pub struct AchievementSubsystem {
    definitions: Vec<AchievementDefinition>,
}

impl AchievementSubsystem {
    pub fn new(definitions: Vec<AchievementDefinition>) -> SimResult<Self> {
        if definitions.is_empty() {
            return Err(SimError::config("At least one achievement definition is required"));
        }
        let mut ids = BTreeSet::new();
        for definition in &definitions {
            if !ids.insert(definition.id) {
                return Err(SimError::config(format!(
                    "Achievement identifiers must be unique: {}",
                    definition.id
                )));
            }
        }
        Ok(Self { definitions })
    }

    pub fn with_defaults() -> Self {
        Self { definitions: default_definitions() }
    }

    pub fn definitions(&self) -> &[AchievementDefinition] {
        &self.definitions
    }

    /// Newly satisfied achievements for `state`, sorted by unlock tick.
    pub fn evaluate(&self, state: &GameState) -> Vec<AchievementSnapshot> {
        let mut unlocked: Vec<AchievementSnapshot> = self
            .definitions
            .iter()
            .filter(|d| !state.has_achievement(d.id))
            .filter(|d| (d.condition)(state))
            .map(|d| AchievementSnapshot {
                id:            d.id.to_string(),
                name:          d.name.to_string(),
                description:   d.description.to_string(),
                unlocked_tick: state.tick,
            })
            .collect();
        unlocked.sort_by_key(|a| a.unlocked_tick);
        unlocked
    }
}

impl SimSubsystem for AchievementSubsystem {
    fn name(&self) -> &'static str {
        "achievements"
    }

    fn update(
        &self,
        state:      &GameState,
        ctx:        &TickContext<'_>,
        _events_in: &[SimEvent],
        _rng:       &mut RandomSource,
    ) -> SimResult<SubsystemOutput> {
        let unlocked = self.evaluate(state);
        if unlocked.is_empty() {
            return Ok(SubsystemOutput::unchanged(state));
        }

        let events = unlocked
            .iter()
            .map(|a| {
                log::info!("tick={} achievements: unlocked {} ({})", ctx.tick, a.name, a.id);
                SimEvent::AchievementUnlocked { tick: ctx.tick, achievement_id: a.id.clone() }
            })
            .collect();

        Ok(SubsystemOutput { state: state.add_achievements(&unlocked), events })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{AssetCatalog, EconomyConfig},
        state::{TeamMember, TeamState},
    };

    fn state() -> GameState {
        GameState::initial(&AssetCatalog::default_test(), &EconomyConfig::default())
    }

    #[test]
    fn definitions_must_exist_and_be_unique() {
        assert!(AchievementSubsystem::new(vec![]).is_err());
        let mut doubled = default_definitions();
        doubled.push(doubled[0].clone());
        assert!(AchievementSubsystem::new(doubled).is_err());
    }

    #[test]
    fn satisfied_conditions_unlock_at_current_tick() {
        let tracker = AchievementSubsystem::with_defaults();
        let hired = state()
            .with_tick(5)
            .with_team(TeamState::default().add_member(TeamMember::new("engineer", 0.4)));
        let unlocked = tracker.evaluate(&hired);
        assert_eq!(unlocked.len(), 1);
        assert_eq!(unlocked[0].id, "first_hire");
        assert_eq!(unlocked[0].unlocked_tick, 5);
    }

    #[test]
    fn recorded_achievements_are_not_re_emitted() {
        let tracker = AchievementSubsystem::with_defaults();
        let catalog = AssetCatalog::default_test();
        let economy = EconomyConfig::default();
        let hired = state()
            .with_tick(5)
            .with_team(TeamState::default().add_member(TeamMember::new("engineer", 0.4)));

        let ctx = TickContext { tick: 5, catalog: &catalog, economy: &economy };
        let first = tracker.update(&hired, &ctx, &[], &mut RandomSource::new(0)).unwrap();
        assert_eq!(first.events.len(), 1);

        let later = first.state.with_tick(6);
        let ctx = TickContext { tick: 6, catalog: &catalog, economy: &economy };
        let second = tracker.update(&later, &ctx, &[], &mut RandomSource::new(0)).unwrap();
        assert!(second.events.is_empty());
        assert_eq!(second.state.achievements[0].unlocked_tick, 5);
    }

    #[test]
    fn cash_milestone_needs_fifty_thousand() {
        let tracker = AchievementSubsystem::with_defaults();
        assert!(tracker.evaluate(&state().apply_cash_delta(49_999.0)).is_empty());
        let unlocked = tracker.evaluate(&state().apply_cash_delta(50_000.0));
        assert_eq!(unlocked[0].id, "cash_milestone");
    }
}
