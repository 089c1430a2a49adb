//! Demand subsystem: product quality and adoption.
//!
//! Quality is rebuilt every tick from the product's base quality, the
//! research quality bonus and the staffing of its required roles, then
//! reduced by this tick's event penalty. Adoption grows by
//!
//!   tam × (base_demand + demand_bonus) × price × quality × reputation
//!       × event multiplier × jitter
//!
//! and is capped at the market's tam.
//!
//! Execution: after events, before cashflow. Reads MarketEventOccurred
//! from events_in; research bonuses include nodes unlocked this tick.

use crate::{
    config::{AssetCatalog, MarketConfig, ProductConfig},
    error::SimResult,
    event::SimEvent,
    market_event_subsystem::EventEffects,
    research_subsystem::ResearchBonuses,
    rng::RandomSource,
    state::{clamp, GameState, ProductState, TeamState},
    subsystem::{SimSubsystem, SubsystemOutput, TickContext},
    types::Tick,
};

/// Half-width of the adoption jitter around 1.0.
const ADOPTION_JITTER: f64 = 0.025;

/// Quality from base, research bonus and team skill, clamped to [0, 1].
pub fn compute_quality(
    catalog:       &AssetCatalog,
    product:       &ProductConfig,
    team:          &TeamState,
    quality_bonus: f64,
) -> SimResult<f64> {
    let role_count = product.required_roles.len().max(1) as f64;
    let mut quality = product.base_quality + quality_bonus;
    for (role_id, required) in &product.required_roles {
        let role = catalog.role(role_id)?;
        quality += team.average_skill(role_id) * role.productivity * (f64::from(*required) / role_count);
    }
    Ok(clamp(quality, 0.0, 1.0))
}

/// New adoption for one product. `jitter_roll` is a draw in [0, 1).
pub fn project_adoption(
    market:            &MarketConfig,
    product:           &ProductState,
    reputation:        f64,
    demand_bonus:      f64,
    demand_multiplier: f64,
    jitter_roll:       f64,
) -> u64 {
    let base_share = market.base_demand + demand_bonus;
    let price_factor = (1.0 - product.price / (market.price_elasticity * 100.0).max(1.0)).max(0.1);
    let quality_factor = product.quality.max(0.0);
    let reputation_factor = 0.5 + reputation / 100.0;
    let random_factor = 1.0 + (jitter_roll - 0.5) * (ADOPTION_JITTER * 2.0);

    let growth = market.tam as f64
        * base_share
        * price_factor
        * quality_factor
        * reputation_factor
        * demand_multiplier
        * random_factor;
    // `as` truncates toward zero and saturates, which is the intended rounding.
    let growth = if growth.is_finite() { growth.max(0.0) as u64 } else { 0 };
    product.adoption.saturating_add(growth).min(market.tam)
}

#[derive(Debug, Default)]
pub struct DemandSubsystem;

impl DemandSubsystem {
    pub fn new() -> Self {
        Self
    }

    fn product_rng(rng: &RandomSource, product_id: &str, tick: Tick) -> RandomSource {
        rng.namespaced(&format!("{product_id}:{tick}"))
    }
}

impl SimSubsystem for DemandSubsystem {
    fn name(&self) -> &'static str {
        "demand"
    }

    fn update(
        &self,
        state:     &GameState,
        ctx:       &TickContext<'_>,
        events_in: &[SimEvent],
        rng:       &mut RandomSource,
    ) -> SimResult<SubsystemOutput> {
        let tick = ctx.tick;
        let bonuses = ResearchBonuses::aggregate(ctx.catalog, &state.research)?;
        let effects = EventEffects::from_events(events_in);

        let mut next = state.clone();
        let mut events = Vec::with_capacity(state.products.len());

        for product in &state.products {
            let config = ctx.catalog.product(&product.product_id)?;
            let market = ctx.catalog.market(&config.target_market)?;

            let mut quality = compute_quality(ctx.catalog, config, &state.team, bonuses.quality)?;
            if effects.quality_penalty != 0.0 {
                quality = (quality - effects.quality_penalty).max(0.0);
            }
            let updated = product.with_quality(quality);

            let jitter_roll = Self::product_rng(rng, &product.product_id, tick).random();
            let adoption = project_adoption(
                market,
                &updated,
                next.reputation,
                bonuses.demand,
                effects.demand_multiplier,
                jitter_roll,
            );
            let growth = adoption - product.adoption.min(adoption);
            let updated = updated.with_adoption(adoption);

            log::debug!(
                "tick={tick} demand: {} quality={:.3} adoption={adoption} (+{growth})",
                product.product_id,
                updated.quality,
            );
            events.push(SimEvent::ProductUpdated {
                tick,
                product_id: product.product_id.clone(),
                quality:    updated.quality,
                adoption,
                growth,
            });
            next = next.update_product(updated);
        }

        Ok(SubsystemOutput { state: next, events })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::EconomyConfig, state::TeamMember};

    fn market(tam: u64) -> MarketConfig {
        MarketConfig {
            id:               "m".into(),
            name:             "M".into(),
            tam,
            base_demand:      0.1,
            price_elasticity: 1.0,
        }
    }

    fn product(adoption: u64, price: f64, quality: f64) -> ProductState {
        ProductState { product_id: "p".into(), quality, adoption, price }
    }

    #[test]
    fn adoption_follows_growth_formula() {
        // growth: 1000 × 0.1 × (1 - 10/100) × 0.5 × (0.5 + 0.5) × 1.0 × 1.0 = 45, on top of 10 adopted
        let adoption = project_adoption(&market(1_000), &product(10, 10.0, 0.5), 50.0, 0.0, 1.0, 0.5);
        assert_eq!(adoption, 55);
    }

    #[test]
    fn adoption_is_capped_at_tam() {
        let adoption = project_adoption(&market(100), &product(95, 0.0, 1.0), 100.0, 0.5, 3.0, 0.99);
        assert_eq!(adoption, 100);
    }

    #[test]
    fn negative_multiplier_never_shrinks_adoption() {
        let adoption = project_adoption(&market(1_000), &product(40, 0.0, 1.0), 50.0, 0.0, -2.0, 0.5);
        assert_eq!(adoption, 40);
    }

    #[test]
    fn price_factor_has_a_floor() {
        let cheap = project_adoption(&market(10_000), &product(0, 1_000.0, 1.0), 50.0, 0.0, 1.0, 0.5);
        // 10000 × 0.1 × 0.1 × 1.0 × 1.0 = 100
        assert_eq!(cheap, 100);
    }

    #[test]
    fn quality_uses_role_skill_and_research() {
        let catalog = AssetCatalog::default_test();
        let config = catalog.product("qa_tool").unwrap();
        let team = TeamState::default()
            .add_member(TeamMember::new("engineer", 0.5))
            .add_member(TeamMember::new("designer", 0.5));
        // 0.25 + 0.05 + 0.5×0.4×0.5 + 0.5×0.6×0.5
        let quality = compute_quality(&catalog, config, &team, 0.05).unwrap();
        assert!((quality - 0.55).abs() < 1e-12);
    }

    #[test]
    fn event_penalty_lowers_quality_with_floor() {
        let catalog = AssetCatalog::default_test();
        let economy = EconomyConfig::default();
        let state = GameState::initial(&catalog, &economy);
        let ctx = TickContext { tick: 1, catalog: &catalog, economy: &economy };
        let outage = SimEvent::MarketEventOccurred {
            tick:              1,
            event_id:          "outage".into(),
            name:              "Outage".into(),
            demand_multiplier: 1.0,
            quality_penalty:   0.9,
            reputation_bonus:  0.0,
        };
        let out = DemandSubsystem::new()
            .update(&state, &ctx, &[outage], &mut RandomSource::new(3))
            .unwrap();
        assert!(out.state.products.iter().all(|p| p.quality == 0.0));
        assert!(out.state.products.iter().all(|p| p.adoption == 0));
        assert_eq!(out.events.len(), 2);
    }

    #[test]
    fn products_draw_from_independent_streams() {
        let rng = RandomSource::new(11);
        let mut a = DemandSubsystem::product_rng(&rng, "chatbot", 3);
        let mut b = DemandSubsystem::product_rng(&rng, "qa_tool", 3);
        assert_ne!(a.random(), b.random());
    }
}
