//! Static balancing data (the asset catalog) and run parameters.
//!
//! RULE: The catalog is validated once, before the first tick.
//! Subsystems reference entries by id and may assume every reference
//! resolves; an unresolved id mid-tick is a configuration bug.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Context;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    error::{SimError, SimResult},
    types::AssetId,
};

/// The only effect keys an event may carry.
pub const ALLOWED_EVENT_EFFECTS: [&str; 3] =
    ["demand_multiplier", "quality_penalty", "reputation_bonus"];

// ── Catalog entries ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RoleConfig {
    pub id: AssetId,
    pub name: String,
    /// Daily salary per member.
    pub salary: f64,
    /// Probability in [0, 1] that a hire attempt fails.
    pub hiring_difficulty: f64,
    /// Training progress gained per tick, in (0, 0.5].
    pub training_rate: f64,
    /// Contribution to product quality, in [0, 1].
    pub productivity: f64,
    /// Research points per unit of skill. Falls back to a role-based default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_weight: Option<f64>,
}

impl RoleConfig {
    pub fn research_weight(&self) -> f64 {
        self.research_weight.unwrap_or(match self.id.as_str() {
            "data_scientist" => 2.0,
            "engineer"       => 0.75,
            _                => 0.25,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProductConfig {
    pub id: AssetId,
    pub name: String,
    pub target_market: AssetId,
    pub base_quality: f64,
    /// List price per adopted user per tick.
    pub base_price: f64,
    /// Role id → minimum head count. Sorted, so hiring visits roles in a stable order.
    #[serde(default)]
    pub required_roles: BTreeMap<AssetId, u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MarketConfig {
    pub id: AssetId,
    pub name: String,
    /// Total addressable market: the adoption ceiling.
    pub tam: u64,
    pub base_demand: f64,
    pub price_elasticity: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ResearchUnlocks {
    #[serde(default)]
    pub quality_bonus: Option<f64>,
    #[serde(default)]
    pub demand_bonus: Option<f64>,
    #[serde(default)]
    pub training_bonus: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ResearchNode {
    pub id: AssetId,
    pub name: String,
    /// Research points needed to complete.
    pub cost: u32,
    #[serde(default)]
    pub unlocks: ResearchUnlocks,
    #[serde(default)]
    pub prerequisites: Vec<AssetId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EventConfig {
    pub id: AssetId,
    pub name: String,
    /// Relative frequency weight.
    pub weight: f64,
    #[serde(default)]
    pub effects: BTreeMap<String, f64>,
}

impl EventConfig {
    pub fn effect(&self, key: &str) -> Option<f64> {
        self.effects.get(key).copied()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RoleCatalogFile {
    roles: Vec<RoleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
struct ProductCatalogFile {
    products: Vec<ProductConfig>,
}

#[derive(Debug, Clone, Deserialize)]
struct MarketCatalogFile {
    markets: Vec<MarketConfig>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResearchCatalogFile {
    research: Vec<ResearchNode>,
}

#[derive(Debug, Clone, Deserialize)]
struct EventCatalogFile {
    events: Vec<EventConfig>,
}

// ── Asset catalog ──────────────────────────────────────────────────

/// All balancing data, keyed by id. BTreeMaps give a deterministic
/// iteration order (sorted by id) everywhere the kernel walks a catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetCatalog {
    pub roles:    BTreeMap<AssetId, RoleConfig>,
    pub products: BTreeMap<AssetId, ProductConfig>,
    pub markets:  BTreeMap<AssetId, MarketConfig>,
    pub research: BTreeMap<AssetId, ResearchNode>,
    pub events:   BTreeMap<AssetId, EventConfig>,
}

impl AssetCatalog {
    /// Build a catalog from entry lists, rejecting duplicate ids, then validate it.
    pub fn from_parts(
        roles:    Vec<RoleConfig>,
        products: Vec<ProductConfig>,
        markets:  Vec<MarketConfig>,
        research: Vec<ResearchNode>,
        events:   Vec<EventConfig>,
    ) -> SimResult<Self> {
        let catalog = Self {
            roles:    keyed("role", roles, |r| &r.id)?,
            products: keyed("product", products, |p| &p.id)?,
            markets:  keyed("market", markets, |m| &m.id)?,
            research: keyed("research", research, |n| &n.id)?,
            events:   keyed("event", events, |e| &e.id)?,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load from the data/ directory.
    /// In tests, use AssetCatalog::default_test().
    pub fn load(data_dir: &str) -> SimResult<Self> {
        let roles: RoleCatalogFile = read_json(&format!("{data_dir}/roles.json"))?;
        let products: ProductCatalogFile = read_json(&format!("{data_dir}/products.json"))?;
        let markets: MarketCatalogFile = read_json(&format!("{data_dir}/markets.json"))?;
        let research: ResearchCatalogFile = read_json(&format!("{data_dir}/research.json"))?;
        let events: EventCatalogFile = read_json(&format!("{data_dir}/events.json"))?;

        let catalog = Self::from_parts(
            roles.roles,
            products.products,
            markets.markets,
            research.research,
            events.events,
        )?;
        log::info!(
            "catalog loaded from {data_dir}: {} roles, {} products, {} markets, {} research nodes, {} events",
            catalog.roles.len(),
            catalog.products.len(),
            catalog.markets.len(),
            catalog.research.len(),
            catalog.events.len(),
        );
        Ok(catalog)
    }

    pub fn role(&self, role_id: &str) -> SimResult<&RoleConfig> {
        self.roles
            .get(role_id)
            .ok_or_else(|| SimError::config(format!("Unknown role referenced: {role_id}")))
    }

    pub fn product(&self, product_id: &str) -> SimResult<&ProductConfig> {
        self.products
            .get(product_id)
            .ok_or_else(|| SimError::config(format!("Unknown product referenced: {product_id}")))
    }

    pub fn market(&self, market_id: &str) -> SimResult<&MarketConfig> {
        self.markets
            .get(market_id)
            .ok_or_else(|| SimError::config(format!("Unknown market referenced: {market_id}")))
    }

    pub fn research_node(&self, node_id: &str) -> SimResult<&ResearchNode> {
        self.research
            .get(node_id)
            .ok_or_else(|| SimError::config(format!("Unknown research node referenced: {node_id}")))
    }

    /// The market a product sells into.
    pub fn market_for(&self, product_id: &str) -> SimResult<&MarketConfig> {
        let product = self.product(product_id)?;
        self.market(&product.target_market)
    }

    /// Check ids, ranges and cross references.
    pub fn validate(&self) -> SimResult<()> {
        if self.roles.is_empty() {
            return Err(SimError::config("At least one role must be defined"));
        }
        if self.products.is_empty() {
            return Err(SimError::config("At least one product must be defined"));
        }
        if self.markets.is_empty() {
            return Err(SimError::config("At least one market must be defined"));
        }

        for role in self.roles.values() {
            check_id("role", &role.id)?;
            check_range(&role.id, "salary", role.salary, 0.0, f64::MAX)?;
            check_range(&role.id, "hiring_difficulty", role.hiring_difficulty, 0.0, 1.0)?;
            check_range(&role.id, "productivity", role.productivity, 0.0, 1.0)?;
            if !(role.training_rate > 0.0 && role.training_rate <= 0.5) {
                return Err(SimError::config(format!(
                    "Role {} training_rate {} must be in (0, 0.5]",
                    role.id, role.training_rate
                )));
            }
            if let Some(weight) = role.research_weight {
                check_range(&role.id, "research_weight", weight, 0.0, f64::MAX)?;
            }
        }

        for market in self.markets.values() {
            check_id("market", &market.id)?;
            if market.tam == 0 {
                return Err(SimError::config(format!("Market {} must have a positive tam", market.id)));
            }
            check_range(&market.id, "base_demand", market.base_demand, 0.0, 1.0)?;
            check_range(&market.id, "price_elasticity", market.price_elasticity, 0.0, 5.0)?;
        }

        for product in self.products.values() {
            check_id("product", &product.id)?;
            check_range(&product.id, "base_quality", product.base_quality, 0.0, 1.0)?;
            check_range(&product.id, "base_price", product.base_price, 0.0, f64::MAX)?;
            if !self.markets.contains_key(&product.target_market) {
                return Err(SimError::config(format!(
                    "Product {} references unknown market {}",
                    product.id, product.target_market
                )));
            }
            for (role_id, count) in &product.required_roles {
                if !self.roles.contains_key(role_id) {
                    return Err(SimError::config(format!(
                        "Product {} requires unknown role {role_id}",
                        product.id
                    )));
                }
                if *count == 0 {
                    return Err(SimError::config(format!(
                        "Role requirement for {role_id} on product {} must be positive",
                        product.id
                    )));
                }
            }
        }

        for node in self.research.values() {
            check_id("research", &node.id)?;
            if node.cost == 0 {
                return Err(SimError::config(format!("Research node {} must have a positive cost", node.id)));
            }
            let unlocks = &node.unlocks;
            if let Some(bonus) = unlocks.quality_bonus {
                check_range(&node.id, "quality_bonus", bonus, 0.0, 1.0)?;
            }
            if let Some(bonus) = unlocks.demand_bonus {
                check_range(&node.id, "demand_bonus", bonus, 0.0, 1.0)?;
            }
            if let Some(bonus) = unlocks.training_bonus {
                check_range(&node.id, "training_bonus", bonus, 0.0, 0.5)?;
            }
            for prerequisite in &node.prerequisites {
                if !self.research.contains_key(prerequisite) {
                    return Err(SimError::config(format!(
                        "Research node {} references unknown prerequisite {prerequisite}",
                        node.id
                    )));
                }
            }
        }

        for event in self.events.values() {
            check_id("event", &event.id)?;
            if !(event.weight.is_finite() && event.weight > 0.0) {
                return Err(SimError::config(format!("Event {} weight must be positive", event.id)));
            }
            let invalid: BTreeSet<&str> = event
                .effects
                .keys()
                .map(String::as_str)
                .filter(|key| !ALLOWED_EVENT_EFFECTS.contains(key))
                .collect();
            if !invalid.is_empty() {
                return Err(SimError::config(format!(
                    "Event {} defines unsupported effects: {invalid:?}",
                    event.id
                )));
            }
            for (key, value) in &event.effects {
                if !value.is_finite() {
                    return Err(SimError::config(format!("Event {} effect {key} must be finite", event.id)));
                }
            }
        }

        Ok(())
    }

    /// Catalog with hardcoded defaults for use in unit tests.
    /// Mirrors data/*.json.
    pub fn default_test() -> Self {
        let role = |id: &str, name: &str, salary, hiring_difficulty, training_rate, productivity| RoleConfig {
            id: id.into(),
            name: name.into(),
            salary,
            hiring_difficulty,
            training_rate,
            productivity,
            research_weight: None,
        };
        let roles = vec![
            role("engineer", "ML Engineer", 120.0, 0.3, 0.05, 0.6),
            role("data_scientist", "Data Scientist", 150.0, 0.5, 0.04, 0.7),
            role("designer", "Product Designer", 90.0, 0.2, 0.06, 0.4),
        ];

        let products = vec![
            ProductConfig {
                id: "chatbot".into(),
                name: "Support Chatbot".into(),
                target_market: "consumer_ai".into(),
                base_quality: 0.3,
                base_price: 0.5,
                required_roles: BTreeMap::from([
                    ("data_scientist".into(), 1),
                    ("engineer".into(), 2),
                ]),
            },
            ProductConfig {
                id: "qa_tool".into(),
                name: "QA Assistant".into(),
                target_market: "enterprise_tools".into(),
                base_quality: 0.25,
                base_price: 5.0,
                required_roles: BTreeMap::from([
                    ("designer".into(), 1),
                    ("engineer".into(), 1),
                ]),
            },
        ];

        let markets = vec![
            MarketConfig {
                id: "consumer_ai".into(),
                name: "Consumer AI".into(),
                tam: 50_000,
                base_demand: 0.02,
                price_elasticity: 1.2,
            },
            MarketConfig {
                id: "enterprise_tools".into(),
                name: "Enterprise Tooling".into(),
                tam: 2_000,
                base_demand: 0.01,
                price_elasticity: 0.8,
            },
        ];

        let research = vec![
            ResearchNode {
                id: "data_pipeline".into(),
                name: "Data Pipeline".into(),
                cost: 20,
                unlocks: ResearchUnlocks { quality_bonus: Some(0.05), ..Default::default() },
                prerequisites: vec![],
            },
            ResearchNode {
                id: "fine_tuning".into(),
                name: "Fine-Tuning".into(),
                cost: 40,
                unlocks: ResearchUnlocks { demand_bonus: Some(0.01), quality_bonus: Some(0.05), ..Default::default() },
                prerequisites: vec!["data_pipeline".into()],
            },
            ResearchNode {
                id: "mentoring".into(),
                name: "Mentoring Program".into(),
                cost: 15,
                unlocks: ResearchUnlocks { training_bonus: Some(0.02), ..Default::default() },
                prerequisites: vec![],
            },
        ];

        let events = vec![
            EventConfig {
                id: "quiet_day".into(),
                name: "Quiet Day".into(),
                weight: 6.0,
                effects: BTreeMap::new(),
            },
            EventConfig {
                id: "viral_post".into(),
                name: "Viral Post".into(),
                weight: 1.0,
                effects: BTreeMap::from([
                    ("demand_multiplier".into(), 1.5),
                    ("reputation_bonus".into(), 1.0),
                ]),
            },
            EventConfig {
                id: "outage".into(),
                name: "Cloud Outage".into(),
                weight: 1.0,
                effects: BTreeMap::from([
                    ("demand_multiplier".into(), 0.8),
                    ("quality_penalty".into(), 0.1),
                ]),
            },
        ];

        Self {
            roles:    roles.into_iter().map(|r| (r.id.clone(), r)).collect(),
            products: products.into_iter().map(|p| (p.id.clone(), p)).collect(),
            markets:  markets.into_iter().map(|m| (m.id.clone(), m)).collect(),
            research: research.into_iter().map(|n| (n.id.clone(), n)).collect(),
            events:   events.into_iter().map(|e| (e.id.clone(), e)).collect(),
        }
    }
}

fn keyed<T>(
    kind: &str,
    entries: Vec<T>,
    id_of: impl Fn(&T) -> &AssetId,
) -> SimResult<BTreeMap<AssetId, T>> {
    let mut map = BTreeMap::new();
    for entry in entries {
        let id = id_of(&entry).clone();
        if map.insert(id.clone(), entry).is_some() {
            return Err(SimError::config(format!("Duplicate {kind} id detected: {id}")));
        }
    }
    Ok(map)
}

fn check_id(kind: &str, id: &str) -> SimResult<()> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SimError::config(format!(
            "Invalid {kind} id {id:?}: expected lowercase letters, digits and underscores"
        )))
    }
}

fn check_range(owner: &str, field: &str, value: f64, min: f64, max: f64) -> SimResult<()> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(SimError::config(format!(
            "{owner}.{field} = {value} is outside [{min}, {max}]"
        )))
    }
}

fn read_json<T: DeserializeOwned>(path: &str) -> SimResult<T> {
    let parsed: anyhow::Result<T> = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read {path}"))
        .and_then(|content| {
            serde_json::from_str(&content).with_context(|| format!("Cannot parse {path}"))
        });
    parsed.map_err(|e| SimError::config(format!("{e:#}")))
}

// ── Run parameters ─────────────────────────────────────────────────

/// Economic levers an adapter may override on a re-run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EconomyConfig {
    /// Fixed daily operating costs.
    pub operating_costs: f64,
    pub starting_cash: f64,
    pub starting_reputation: f64,
    /// Product id → launch price, replacing the catalog's base_price.
    pub price_overrides: BTreeMap<AssetId, f64>,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            operating_costs:     450.0,
            starting_cash:       0.0,
            starting_reputation: 50.0,
            price_overrides:     BTreeMap::new(),
        }
    }
}

impl EconomyConfig {
    pub fn validate(&self, catalog: &AssetCatalog) -> SimResult<()> {
        check_range("economy", "operating_costs", self.operating_costs, 0.0, f64::MAX)?;
        check_range("economy", "starting_cash", self.starting_cash, 0.0, f64::MAX)?;
        check_range("economy", "starting_reputation", self.starting_reputation, 0.0, 100.0)?;
        for (product_id, price) in &self.price_overrides {
            catalog.product(product_id)?;
            check_range(product_id, "price_override", *price, 0.0, f64::MAX)?;
        }
        Ok(())
    }
}

/// A named simulation setup, loaded from `profiles/<name>.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SimulationProfile {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub ticks: u64,
    pub seed: u64,
    #[serde(default)]
    pub economy: EconomyConfig,
}

impl SimulationProfile {
    pub fn load(path: &str) -> SimResult<Self> {
        let profile: Self = read_json(path)?;
        if profile.ticks == 0 {
            return Err(SimError::config(format!(
                "Profile {} must run at least one tick",
                profile.name
            )));
        }
        Ok(profile)
    }
}
