//! Market event subsystem.
//!
//! Draws one catalog event per tick by cumulative-weight roulette over the
//! events in id order. Its effects last for this tick only: the demand
//! multiplier and quality penalty are picked up by the demand subsystem
//! from the emitted MarketEventOccurred, the reputation bonus is applied
//! here straight away.
//!
//! Execution: after research, before demand.

use crate::{
    config::EventConfig,
    error::SimResult,
    event::SimEvent,
    rng::RandomSource,
    state::GameState,
    subsystem::{SimSubsystem, SubsystemOutput, TickContext},
};

/// Effects of the event drawn for a tick. Neutral when nothing was drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventEffects {
    pub demand_multiplier: f64,
    pub quality_penalty:   f64,
    pub reputation_bonus:  f64,
}

impl Default for EventEffects {
    fn default() -> Self {
        Self {
            demand_multiplier: 1.0,
            quality_penalty:   0.0,
            reputation_bonus:  0.0,
        }
    }
}

impl EventEffects {
    pub fn of(event: &EventConfig) -> Self {
        Self {
            demand_multiplier: event.effect("demand_multiplier").unwrap_or(1.0),
            quality_penalty:   event.effect("quality_penalty").unwrap_or(0.0),
            reputation_bonus:  event.effect("reputation_bonus").unwrap_or(0.0),
        }
    }

    /// Effects announced earlier in the tick, or neutral ones.
    pub fn from_events(events_in: &[SimEvent]) -> Self {
        events_in
            .iter()
            .find_map(|event| match event {
                SimEvent::MarketEventOccurred {
                    demand_multiplier,
                    quality_penalty,
                    reputation_bonus,
                    ..
                } => Some(Self {
                    demand_multiplier: *demand_multiplier,
                    quality_penalty:   *quality_penalty,
                    reputation_bonus:  *reputation_bonus,
                }),
                _ => None,
            })
            .unwrap_or_default()
    }
}

/// Roulette selection over `events` (already in id order) with `roll` in [0, total_weight).
fn select<'a>(events: &[&'a EventConfig], roll: f64) -> Option<&'a EventConfig> {
    let mut accumulated = 0.0;
    for event in events {
        accumulated += event.weight;
        if roll <= accumulated {
            return Some(event);
        }
    }
    None
}

#[derive(Debug, Default)]
pub struct MarketEventSubsystem;

impl MarketEventSubsystem {
    pub fn new() -> Self {
        Self
    }
}

impl SimSubsystem for MarketEventSubsystem {
    fn name(&self) -> &'static str {
        "events"
    }

    fn update(
        &self,
        state:      &GameState,
        ctx:        &TickContext<'_>,
        _events_in: &[SimEvent],
        rng:        &mut RandomSource,
    ) -> SimResult<SubsystemOutput> {
        let tick = ctx.tick;
        // BTreeMap values are already sorted by id.
        let events: Vec<&EventConfig> = ctx.catalog.events.values().collect();
        let total_weight: f64 = events.iter().map(|e| e.weight).sum();
        if total_weight <= 0.0 {
            return Ok(SubsystemOutput::unchanged(state));
        }

        let roll = rng.random() * total_weight;
        let Some(selected) = select(&events, roll) else {
            return Ok(SubsystemOutput::unchanged(state));
        };

        let effects = EventEffects::of(selected);
        log::debug!(
            "tick={tick} events: {} (demand x{:.2}, quality -{:.2}, reputation +{:.1})",
            selected.id,
            effects.demand_multiplier,
            effects.quality_penalty,
            effects.reputation_bonus,
        );

        let next = if effects.reputation_bonus != 0.0 {
            state.apply_reputation_delta(effects.reputation_bonus)
        } else {
            state.clone()
        };

        Ok(SubsystemOutput {
            state: next,
            events: vec![SimEvent::MarketEventOccurred {
                tick,
                event_id:          selected.id.clone(),
                name:              selected.name.clone(),
                demand_multiplier: effects.demand_multiplier,
                quality_penalty:   effects.quality_penalty,
                reputation_bonus:  effects.reputation_bonus,
            }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AssetCatalog, EconomyConfig};
    use std::collections::BTreeMap;

    fn event(id: &str, weight: f64) -> EventConfig {
        EventConfig { id: id.into(), name: id.into(), weight, effects: BTreeMap::new() }
    }

    #[test]
    fn roulette_picks_first_bucket_covering_roll() {
        let a = event("a", 1.0);
        let b = event("b", 3.0);
        let events = vec![&a, &b];
        assert_eq!(select(&events, 0.0).unwrap().id, "a");
        assert_eq!(select(&events, 1.0).unwrap().id, "a");
        assert_eq!(select(&events, 1.01).unwrap().id, "b");
        assert_eq!(select(&events, 3.99).unwrap().id, "b");
    }

    #[test]
    fn missing_effects_are_neutral() {
        let effects = EventEffects::of(&event("calm", 1.0));
        assert_eq!(effects, EventEffects::default());
        assert_eq!(EventEffects::from_events(&[]), EventEffects::default());
    }

    #[test]
    fn draw_is_reproducible_and_announced() {
        let catalog = AssetCatalog::default_test();
        let economy = EconomyConfig::default();
        let state = GameState::initial(&catalog, &economy);
        let ctx = TickContext { tick: 9, catalog: &catalog, economy: &economy };
        let sub = MarketEventSubsystem::new();

        let a = sub.update(&state, &ctx, &[], &mut RandomSource::new(5)).unwrap();
        let b = sub.update(&state, &ctx, &[], &mut RandomSource::new(5)).unwrap();
        assert_eq!(a.events, b.events);
        assert_eq!(a.events.len(), 1);

        let effects = EventEffects::from_events(&a.events);
        assert!((a.state.reputation - (50.0 + effects.reputation_bonus)).abs() < 1e-12);
    }

    #[test]
    fn empty_event_catalog_is_a_no_op() {
        let mut catalog = AssetCatalog::default_test();
        catalog.events.clear();
        let economy = EconomyConfig::default();
        let state = GameState::initial(&catalog, &economy);
        let ctx = TickContext { tick: 1, catalog: &catalog, economy: &economy };
        let out = MarketEventSubsystem::new()
            .update(&state, &ctx, &[], &mut RandomSource::new(1))
            .unwrap();
        assert!(out.events.is_empty());
        assert_eq!(out.state, state);
    }
}
