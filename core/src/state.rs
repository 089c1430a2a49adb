//! The immutable game state and its value-typed parts.
//!
//! RULE: A GameState is never mutated in place. Every transition takes
//! `&self` and returns a new snapshot, so a subsystem can only publish
//! changes by handing a new state back to the engine.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    config::{AssetCatalog, EconomyConfig},
    error::{SaveGameError, SimError, SimResult},
    types::{AssetId, Tick},
};

pub const REPUTATION_MIN: f64 = 0.0;
pub const REPUTATION_MAX: f64 = 100.0;

pub(crate) fn clamp(value: f64, lower: f64, upper: f64) -> f64 {
    if value.is_nan() {
        return lower;
    }
    value.max(lower).min(upper)
}

// ── Team ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
    pub role_id:           AssetId,
    pub skill:             f64,
    #[serde(default)]
    pub training_progress: f64,
}

impl TeamMember {
    pub fn new(role_id: impl Into<AssetId>, skill: f64) -> Self {
        Self {
            role_id:           role_id.into(),
            skill:             clamp(skill, 0.0, 1.0),
            training_progress: 0.0,
        }
    }

    pub fn gain_skill(&self, delta: f64) -> Self {
        Self { skill: clamp(self.skill + delta, 0.0, 1.0), ..self.clone() }
    }

    pub fn advance_training(&self, delta: f64) -> Self {
        Self {
            training_progress: clamp(self.training_progress + delta, 0.0, 1.0),
            ..self.clone()
        }
    }

    pub fn reset_training(&self) -> Self {
        Self { training_progress: 0.0, ..self.clone() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamState {
    #[serde(default)]
    pub members: Vec<TeamMember>,
}

impl TeamState {
    pub fn add_member(&self, member: TeamMember) -> Self {
        let mut members = self.members.clone();
        members.push(member);
        Self { members }
    }

    pub fn members_by_role<'a>(&'a self, role_id: &'a str) -> impl Iterator<Item = &'a TeamMember> + 'a {
        self.members.iter().filter(move |m| m.role_id == role_id)
    }

    pub fn count_role(&self, role_id: &str) -> usize {
        self.members_by_role(role_id).count()
    }

    /// Mean skill of a role, or 0.0 when nobody holds it.
    pub fn average_skill(&self, role_id: &str) -> f64 {
        let (total, count) = self
            .members_by_role(role_id)
            .fold((0.0, 0usize), |(total, count), m| (total + m.skill, count + 1));
        if count == 0 {
            0.0
        } else {
            total / count as f64
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

// ── Products ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductState {
    pub product_id: AssetId,
    pub quality:    f64,
    #[serde(default)]
    pub adoption:   u64,
    #[serde(default)]
    pub price:      f64,
}

impl ProductState {
    pub fn with_quality(&self, quality: f64) -> Self {
        Self { quality: clamp(quality, 0.0, 1.0), ..self.clone() }
    }

    pub fn with_adoption(&self, adoption: u64) -> Self {
        Self { adoption, ..self.clone() }
    }

    pub fn revenue(&self) -> f64 {
        self.adoption as f64 * self.price
    }
}

// ── Research ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchState {
    #[serde(default)]
    pub unlocked: BTreeSet<AssetId>,
    #[serde(default)]
    pub active:   Option<AssetId>,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub backlog:  Vec<AssetId>,
}

impl ResearchState {
    /// Fresh research state with every catalog node queued in id order.
    pub fn with_backlog(backlog: Vec<AssetId>) -> Self {
        Self { backlog, ..Self::default() }
    }

    /// Switch the active node. Progress always restarts at zero.
    pub fn with_active(&self, node_id: Option<AssetId>) -> Self {
        Self { active: node_id, progress: 0.0, ..self.clone() }
    }

    pub fn advance(&self, delta: f64) -> Self {
        Self { progress: clamp(self.progress + delta, 0.0, 1.0), ..self.clone() }
    }

    pub fn complete(&self, node_id: &str) -> Self {
        let mut unlocked = self.unlocked.clone();
        unlocked.insert(node_id.to_string());
        Self {
            unlocked,
            active:   None,
            progress: 0.0,
            backlog:  self.backlog.iter().filter(|id| *id != node_id).cloned().collect(),
        }
    }

    pub fn enqueue(&self, node_id: &str) -> Self {
        if self.unlocked.contains(node_id) || self.backlog.iter().any(|id| id == node_id) {
            return self.clone();
        }
        let mut backlog = self.backlog.clone();
        backlog.push(node_id.to_string());
        Self { backlog, ..self.clone() }
    }

    pub fn is_unlocked(&self, node_id: &str) -> bool {
        self.unlocked.contains(node_id)
    }
}

// ── Achievements ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementSnapshot {
    pub id:            AssetId,
    pub name:          String,
    pub description:   String,
    pub unlocked_tick: Tick,
}

// ── Game state ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub tick:         Tick,
    pub cash:         f64,
    pub reputation:   f64,
    #[serde(default)]
    pub team:         TeamState,
    #[serde(default)]
    pub products:     Vec<ProductState>,
    #[serde(default)]
    pub research:     ResearchState,
    #[serde(default)]
    pub achievements: Vec<AchievementSnapshot>,
}

impl GameState {
    /// The tick-0 state: empty team, every catalog product at its base
    /// quality, every research node in the backlog.
    pub fn initial(catalog: &AssetCatalog, economy: &EconomyConfig) -> Self {
        let products = catalog
            .products
            .values()
            .map(|p| ProductState {
                product_id: p.id.clone(),
                quality:    clamp(p.base_quality, 0.0, 1.0),
                adoption:   0,
                price:      economy.price_overrides.get(&p.id).copied().unwrap_or(p.base_price),
            })
            .collect();
        Self {
            tick:         0,
            cash:         economy.starting_cash.max(0.0),
            reputation:   clamp(economy.starting_reputation, REPUTATION_MIN, REPUTATION_MAX),
            team:         TeamState::default(),
            products,
            research:     ResearchState::with_backlog(catalog.research.keys().cloned().collect()),
            achievements: Vec::new(),
        }
    }

    pub fn with_tick(&self, tick: Tick) -> Self {
        Self { tick, ..self.clone() }
    }

    /// Cash never drops below zero and never overflows to infinity.
    pub fn apply_cash_delta(&self, delta: f64) -> Self {
        let cash = if delta.is_finite() { (self.cash + delta).clamp(0.0, f64::MAX) } else { self.cash };
        Self { cash, ..self.clone() }
    }

    pub fn apply_reputation_delta(&self, delta: f64) -> Self {
        Self {
            reputation: clamp(self.reputation + delta, REPUTATION_MIN, REPUTATION_MAX),
            ..self.clone()
        }
    }

    pub fn with_team(&self, team: TeamState) -> Self {
        Self { team, ..self.clone() }
    }

    pub fn with_products(&self, products: Vec<ProductState>) -> Self {
        Self { products, ..self.clone() }
    }

    /// Replace the product with the same id. Unknown ids leave the state unchanged.
    pub fn update_product(&self, product: ProductState) -> Self {
        let products = self
            .products
            .iter()
            .map(|p| if p.product_id == product.product_id { product.clone() } else { p.clone() })
            .collect();
        Self { products, ..self.clone() }
    }

    pub fn with_research(&self, research: ResearchState) -> Self {
        Self { research, ..self.clone() }
    }

    /// Append newly unlocked achievements. An id already recorded keeps its
    /// original unlock; the appended batch is ordered by unlock tick.
    pub fn add_achievements(&self, batch: &[AchievementSnapshot]) -> Self {
        let mut achievements = self.achievements.clone();
        let mut fresh: Vec<AchievementSnapshot> = Vec::new();
        for snapshot in batch {
            let known = achievements.iter().chain(fresh.iter()).any(|a| a.id == snapshot.id);
            if !known {
                fresh.push(snapshot.clone());
            }
        }
        fresh.sort_by_key(|a| a.unlocked_tick);
        achievements.extend(fresh);
        Self { achievements, ..self.clone() }
    }

    pub fn has_achievement(&self, achievement_id: &str) -> bool {
        self.achievements.iter().any(|a| a.id == achievement_id)
    }

    pub fn product(&self, product_id: &str) -> Option<&ProductState> {
        self.products.iter().find(|p| p.product_id == product_id)
    }

    pub fn product_ids(&self) -> Vec<AssetId> {
        self.products.iter().map(|p| p.product_id.clone()).collect()
    }

    pub fn total_adoption(&self) -> u64 {
        self.products.iter().map(|p| p.adoption).sum()
    }

    pub fn total_revenue(&self) -> f64 {
        self.products.iter().map(ProductState::revenue).sum()
    }

    pub fn average_quality(&self) -> f64 {
        if self.products.is_empty() {
            return 0.0;
        }
        self.products.iter().map(|p| p.quality).sum::<f64>() / self.products.len() as f64
    }

    /// Field-level invariants a decoded state must satisfy.
    pub fn validate(&self) -> Result<(), SaveGameError> {
        let invariant = |field: &str, reason: String| SaveGameError::Invariant {
            field: field.to_string(),
            reason,
        };

        if !(self.cash.is_finite() && self.cash >= 0.0) {
            return Err(invariant("cash", format!("{} must be a non-negative number", self.cash)));
        }
        if !in_range(self.reputation, REPUTATION_MIN, REPUTATION_MAX) {
            return Err(invariant("reputation", format!("{} is outside [0, 100]", self.reputation)));
        }

        for (i, member) in self.team.members.iter().enumerate() {
            if !in_range(member.skill, 0.0, 1.0) {
                return Err(invariant(&format!("team.members[{i}].skill"), format!("{} is outside [0, 1]", member.skill)));
            }
            if !in_range(member.training_progress, 0.0, 1.0) {
                return Err(invariant(
                    &format!("team.members[{i}].training_progress"),
                    format!("{} is outside [0, 1]", member.training_progress),
                ));
            }
        }

        let mut seen = BTreeSet::new();
        for product in &self.products {
            if !seen.insert(product.product_id.as_str()) {
                return Err(invariant("products", format!("duplicate product id {}", product.product_id)));
            }
            if !in_range(product.quality, 0.0, 1.0) {
                return Err(invariant(
                    &format!("products.{}.quality", product.product_id),
                    format!("{} is outside [0, 1]", product.quality),
                ));
            }
            if !(product.price.is_finite() && product.price >= 0.0) {
                return Err(invariant(
                    &format!("products.{}.price", product.product_id),
                    format!("{} must be a non-negative number", product.price),
                ));
            }
        }

        if !in_range(self.research.progress, 0.0, 1.0) {
            return Err(invariant("research.progress", format!("{} is outside [0, 1]", self.research.progress)));
        }
        if let Some(active) = &self.research.active {
            if self.research.unlocked.contains(active) {
                return Err(invariant("research.active", format!("{active} is already unlocked")));
            }
        }

        let mut seen = BTreeSet::new();
        for achievement in &self.achievements {
            if !seen.insert(achievement.id.as_str()) {
                return Err(invariant("achievements", format!("duplicate achievement id {}", achievement.id)));
            }
        }
        if self.achievements.windows(2).any(|w| w[0].unlocked_tick > w[1].unlocked_tick) {
            return Err(invariant("achievements", "must be ordered by unlock tick".to_string()));
        }

        Ok(())
    }

    /// Check that every referenced id exists and adoption stays within each market.
    pub fn validate_against(&self, catalog: &AssetCatalog) -> SimResult<()> {
        for product in &self.products {
            let market = catalog.market_for(&product.product_id)?;
            if product.adoption > market.tam {
                return Err(SimError::from(SaveGameError::Invariant {
                    field:  format!("products.{}.adoption", product.product_id),
                    reason: format!("{} exceeds market tam {}", product.adoption, market.tam),
                }));
            }
        }
        for member in &self.team.members {
            catalog.role(&member.role_id)?;
        }
        for node_id in self.research.unlocked.iter().chain(self.research.backlog.iter()) {
            catalog.research_node(node_id)?;
        }
        if let Some(active) = &self.research.active {
            catalog.research_node(active)?;
        }
        Ok(())
    }
}

fn in_range(value: f64, lower: f64, upper: f64) -> bool {
    value.is_finite() && value >= lower && value <= upper
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initial() -> GameState {
        GameState::initial(&AssetCatalog::default_test(), &EconomyConfig::default())
    }

    fn achievement(id: &str, tick: Tick) -> AchievementSnapshot {
        AchievementSnapshot {
            id:            id.into(),
            name:          id.into(),
            description:   String::new(),
            unlocked_tick: tick,
        }
    }

    #[test]
    fn initial_state_follows_catalog() {
        let state = initial();
        assert_eq!(state.tick, 0);
        assert_eq!(state.cash, 0.0);
        assert_eq!(state.reputation, 50.0);
        assert!(state.team.is_empty());
        assert_eq!(state.product_ids(), vec!["chatbot".to_string(), "qa_tool".to_string()]);
        assert_eq!(state.product("chatbot").unwrap().quality, 0.3);
        assert_eq!(
            state.research.backlog,
            vec!["data_pipeline".to_string(), "fine_tuning".to_string(), "mentoring".to_string()]
        );
        assert!(state.validate().is_ok());
    }

    #[test]
    fn price_overrides_apply_to_initial_products() {
        let mut economy = EconomyConfig::default();
        economy.price_overrides.insert("chatbot".into(), 0.9);
        let state = GameState::initial(&AssetCatalog::default_test(), &economy);
        assert_eq!(state.product("chatbot").unwrap().price, 0.9);
        assert_eq!(state.product("qa_tool").unwrap().price, 5.0);
    }

    #[test]
    fn transitions_leave_the_source_untouched() {
        let state = initial();
        let next = state.apply_cash_delta(100.0).with_tick(3);
        assert_eq!(state.cash, 0.0);
        assert_eq!(state.tick, 0);
        assert_eq!(next.cash, 100.0);
        assert_eq!(next.tick, 3);
    }

    #[test]
    fn cash_and_reputation_saturate() {
        let state = initial();
        assert_eq!(state.apply_cash_delta(-500.0).cash, 0.0);
        assert_eq!(state.apply_reputation_delta(80.0).reputation, 100.0);
        assert_eq!(state.apply_reputation_delta(-80.0).reputation, 0.0);
    }

    #[test]
    fn cash_saturates_at_the_largest_finite_value() {
        let rich = initial().apply_cash_delta(f64::MAX).apply_cash_delta(f64::MAX);
        assert_eq!(rich.cash, f64::MAX);
        assert!(rich.validate().is_ok());
        assert_eq!(rich.apply_cash_delta(f64::INFINITY).cash, f64::MAX);
    }

    #[test]
    fn member_training_and_skill_clamp() {
        let member = TeamMember::new("engineer", 0.98);
        assert_eq!(member.gain_skill(0.05).skill, 1.0);
        assert_eq!(member.advance_training(1.7).training_progress, 1.0);
        assert_eq!(member.advance_training(0.3).reset_training().training_progress, 0.0);
    }

    #[test]
    fn average_skill_is_zero_without_members() {
        let team = TeamState::default()
            .add_member(TeamMember::new("engineer", 0.4))
            .add_member(TeamMember::new("engineer", 0.6));
        assert!((team.average_skill("engineer") - 0.5).abs() < 1e-12);
        assert_eq!(team.average_skill("designer"), 0.0);
        assert_eq!(team.count_role("engineer"), 2);
    }

    #[test]
    fn research_complete_unlocks_and_drops_from_backlog() {
        let research = ResearchState::with_backlog(vec!["a".into(), "b".into()])
            .with_active(Some("a".into()))
            .advance(0.6);
        assert_eq!(research.progress, 0.6);
        let done = research.complete("a");
        assert!(done.is_unlocked("a"));
        assert_eq!(done.active, None);
        assert_eq!(done.progress, 0.0);
        assert_eq!(done.backlog, vec!["b".to_string()]);
        assert_eq!(done.enqueue("a").backlog, vec!["b".to_string()]);
        assert_eq!(done.enqueue("c").backlog, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn first_unlock_wins() {
        let state = initial().add_achievements(&[achievement("first_hire", 5)]);
        let again = state.add_achievements(&[achievement("first_hire", 6)]);
        assert_eq!(again.achievements.len(), 1);
        assert_eq!(again.achievements[0].unlocked_tick, 5);
    }

    #[test]
    fn achievement_batches_are_sorted_by_tick() {
        let state = initial().add_achievements(&[achievement("b", 9), achievement("a", 4)]);
        let ids: Vec<_> = state.achievements.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn update_product_replaces_by_id() {
        let state = initial();
        let chatbot = state.product("chatbot").unwrap().with_adoption(42);
        let next = state.update_product(chatbot);
        assert_eq!(next.product("chatbot").unwrap().adoption, 42);
        assert_eq!(next.product("qa_tool").unwrap().adoption, 0);
    }

    #[test]
    fn validate_rejects_out_of_range_reputation() {
        let mut state = initial();
        state.reputation = 120.0;
        assert!(matches!(
            state.validate(),
            Err(SaveGameError::Invariant { field, .. }) if field == "reputation"
        ));
    }

    #[test]
    fn validate_against_rejects_adoption_over_tam() {
        let catalog = AssetCatalog::default_test();
        let state = initial();
        let over = state.product("qa_tool").unwrap().with_adoption(2_001);
        let err = state.update_product(over).validate_against(&catalog).unwrap_err();
        assert!(matches!(err, SimError::SaveGame(SaveGameError::Invariant { .. })));
    }

    #[test]
    fn validate_against_rejects_unknown_products() {
        let catalog = AssetCatalog::default_test();
        let mut state = initial();
        state.products.push(ProductState {
            product_id: "ghost".into(),
            quality:    0.5,
            adoption:   0,
            price:      1.0,
        });
        assert!(matches!(state.validate_against(&catalog), Err(SimError::Configuration { .. })));
    }
}
