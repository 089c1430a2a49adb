//! Research subsystem and research bonus aggregation.
//!
//! Each tick the team produces research points (skill weighted by role)
//! which advance the active node by `points / cost`. When no node is
//! active the next one is chosen from the backlog in queue order; if the
//! backlog has nothing researchable, the cheapest researchable catalog
//! node is taken (ties broken by id).
//!
//! Completing a node unlocks it and immediately activates the next one.
//!
//! Execution: after training, before events.

use std::collections::BTreeSet;

use crate::{
    config::AssetCatalog,
    error::SimResult,
    event::SimEvent,
    rng::RandomSource,
    state::{GameState, ResearchState, TeamState},
    subsystem::{SimSubsystem, SubsystemOutput, TickContext},
    types::AssetId,
};

/// Summed unlock bonuses of every unlocked node. Absent fields count as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResearchBonuses {
    pub quality:  f64,
    pub demand:   f64,
    pub training: f64,
}

impl ResearchBonuses {
    pub fn aggregate(catalog: &AssetCatalog, research: &ResearchState) -> SimResult<Self> {
        let mut bonuses = Self::default();
        for node_id in &research.unlocked {
            let unlocks = &catalog.research_node(node_id)?.unlocks;
            bonuses.quality += unlocks.quality_bonus.unwrap_or(0.0);
            bonuses.demand += unlocks.demand_bonus.unwrap_or(0.0);
            bonuses.training += unlocks.training_bonus.unwrap_or(0.0);
        }
        Ok(bonuses)
    }
}

/// Research points the team produces this tick.
pub fn research_points(catalog: &AssetCatalog, team: &TeamState) -> SimResult<f64> {
    let mut points = 0.0;
    for member in &team.members {
        points += member.skill * catalog.role(&member.role_id)?.research_weight();
    }
    Ok(points)
}

fn prerequisites_met(catalog: &AssetCatalog, unlocked: &BTreeSet<AssetId>, node_id: &str) -> bool {
    catalog
        .research
        .get(node_id)
        .is_some_and(|node| node.prerequisites.iter().all(|p| unlocked.contains(p)))
}

/// Pick the next node to research, or None if nothing is researchable.
pub fn select_next_node(catalog: &AssetCatalog, research: &ResearchState) -> Option<AssetId> {
    let unlocked = &research.unlocked;

    let from_backlog = research
        .backlog
        .iter()
        .filter(|id| !unlocked.contains(*id))
        .find(|id| prerequisites_met(catalog, unlocked, id));
    if let Some(id) = from_backlog {
        return Some(id.clone());
    }

    catalog
        .research
        .values()
        .filter(|node| !unlocked.contains(&node.id))
        .filter(|node| prerequisites_met(catalog, unlocked, &node.id))
        .min_by(|a, b| a.cost.cmp(&b.cost).then_with(|| a.id.cmp(&b.id)))
        .map(|node| node.id.clone())
}

#[derive(Debug, Default)]
pub struct ResearchSubsystem;

impl ResearchSubsystem {
    pub fn new() -> Self {
        Self
    }
}

impl SimSubsystem for ResearchSubsystem {
    fn name(&self) -> &'static str {
        "research"
    }

    fn update(
        &self,
        state:      &GameState,
        ctx:        &TickContext<'_>,
        _events_in: &[SimEvent],
        _rng:       &mut RandomSource,
    ) -> SimResult<SubsystemOutput> {
        let tick = ctx.tick;
        let points = research_points(ctx.catalog, &state.team)?;
        if points <= 0.0 {
            return Ok(SubsystemOutput::unchanged(state));
        }

        let mut research = state.research.clone();
        let mut events = Vec::new();

        let active_id = match &research.active {
            Some(id) => id.clone(),
            None => match select_next_node(ctx.catalog, &research) {
                Some(id) => {
                    research = research.with_active(Some(id.clone()));
                    events.push(SimEvent::ResearchStarted { tick, node_id: id.clone() });
                    id
                }
                None => return Ok(SubsystemOutput::unchanged(state)),
            },
        };

        let node = ctx.catalog.research_node(&active_id)?;
        let delta = (points / f64::from(node.cost)).min(1.0);
        research = research.advance(delta);
        log::debug!(
            "tick={tick} research: {active_id} +{delta:.4} -> {:.4}",
            research.progress
        );

        if research.progress >= 1.0 {
            research = research.complete(&active_id);
            log::info!("tick={tick} research: unlocked {}", node.name);
            events.push(SimEvent::ResearchCompleted {
                tick,
                node_id: active_id.clone(),
                name:    node.name.clone(),
            });
            if let Some(next) = select_next_node(ctx.catalog, &research) {
                research = research.with_active(Some(next.clone()));
                events.push(SimEvent::ResearchStarted { tick, node_id: next });
            }
        }

        Ok(SubsystemOutput { state: state.with_research(research), events })
    }
}
