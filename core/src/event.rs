//! Intra-tick events, lifecycle notifications and per-tick records.
//!
//! RULE: Subsystems communicate ONLY through events and the state they
//! hand back. A subsystem may never call another subsystem's functions
//! directly; later subsystems read earlier ones' output from `events_in`.

use crate::{
    state::AchievementSnapshot,
    types::{AssetId, RunId, Tick},
};
use serde::{Deserialize, Serialize};

/// Every event emitted by a subsystem during a tick.
/// Variants may be added, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    // ── Team ───────────────────────────────────────
    MemberHired {
        tick: Tick,
        role_id: AssetId,
        product_id: AssetId,
    },
    TrainingCompleted {
        tick: Tick,
        role_id: AssetId,
        skill: f64,
    },

    // ── Research ───────────────────────────────────
    ResearchStarted {
        tick: Tick,
        node_id: AssetId,
    },
    ResearchCompleted {
        tick: Tick,
        node_id: AssetId,
        name: String,
    },

    // ── Market ─────────────────────────────────────
    MarketEventOccurred {
        tick: Tick,
        event_id: AssetId,
        name: String,
        demand_multiplier: f64,
        quality_penalty: f64,
        reputation_bonus: f64,
    },
    ProductUpdated {
        tick: Tick,
        product_id: AssetId,
        quality: f64,
        adoption: u64,
        growth: u64,
    },

    // ── Finance and standing ───────────────────────
    CashflowApplied {
        tick: Tick,
        revenue: f64,
        salaries: f64,
        operating_costs: f64,
        cash_delta: f64,
    },
    ReputationUpdated {
        tick: Tick,
        delta: f64,
        reputation: f64,
    },
    AchievementUnlocked {
        tick: Tick,
        achievement_id: AssetId,
    },
}

impl SimEvent {
    /// Stable name for the event_type column of the run journal.
    pub fn type_name(&self) -> &'static str {
        match self {
            SimEvent::MemberHired { .. }         => "member_hired",
            SimEvent::TrainingCompleted { .. }   => "training_completed",
            SimEvent::ResearchStarted { .. }     => "research_started",
            SimEvent::ResearchCompleted { .. }   => "research_completed",
            SimEvent::MarketEventOccurred { .. } => "market_event_occurred",
            SimEvent::ProductUpdated { .. }      => "product_updated",
            SimEvent::CashflowApplied { .. }     => "cashflow_applied",
            SimEvent::ReputationUpdated { .. }   => "reputation_updated",
            SimEvent::AchievementUnlocked { .. } => "achievement_unlocked",
        }
    }
}

/// Player-facing log lines for one tick: the market event first, then
/// research breakthroughs, then new hires.
pub fn log_entries(tick: Tick, tick_events: &[SimEvent]) -> Vec<LogEntry> {
    let mut entries = Vec::new();
    let mut completed: Vec<&str> = Vec::new();
    let mut hired = 0usize;

    for event in tick_events {
        match event {
            SimEvent::MarketEventOccurred {
                name,
                demand_multiplier,
                quality_penalty,
                reputation_bonus,
                ..
            } => {
                let mut parts = Vec::new();
                if *demand_multiplier != 1.0 {
                    parts.push(format!("Demand x{demand_multiplier:.2}"));
                }
                if *quality_penalty != 0.0 {
                    parts.push(format!("Quality -{quality_penalty:.2}"));
                }
                if *reputation_bonus != 0.0 {
                    parts.push(format!("Reputation +{reputation_bonus:.1}"));
                }
                let description = if parts.is_empty() {
                    "No immediate effects".to_string()
                } else {
                    parts.join(", ")
                };
                entries.push(LogEntry { tick, name: name.clone(), description });
            }
            SimEvent::ResearchCompleted { node_id, .. } => completed.push(node_id.as_str()),
            SimEvent::MemberHired { .. } => hired += 1,
            _ => {}
        }
    }

    if !completed.is_empty() {
        entries.push(LogEntry {
            tick,
            name:        "Research breakthrough".to_string(),
            description: format!("Unlocked: {}", completed.join(", ")),
        });
    }
    if hired > 0 {
        entries.push(LogEntry {
            tick,
            name:        "New hires".to_string(),
            description: format!("Added {hired} team members"),
        });
    }
    entries
}

/// Notifications the engine publishes to observers on the EventBus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    SimulationStarted {
        seed: u64,
    },
    TickProcessed {
        tick: Tick,
    },
    AchievementUnlocked {
        tick: Tick,
        achievement: AchievementSnapshot,
    },
    SimulationCompleted {
        tick: Tick,
    },
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub run_id: RunId,
    pub tick: Tick,
    pub subsystem: String,
    pub event_type: String,
    pub payload: String, // JSON-serialized SimEvent
}

/// Human-readable log line shown to the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub tick: Tick,
    pub name: String,
    pub description: String,
}

/// Per-tick KPI record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiRecord {
    pub tick: Tick,
    pub cash: f64,
    pub reputation: f64,
    pub revenue: f64,
    pub adoption: u64,
    pub avg_quality: f64,
    pub cash_delta: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_snake_case_tag() {
        let event = SimEvent::ResearchStarted { tick: 3, node_id: "mentoring".into() };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"research_started","tick":3,"node_id":"mentoring"}"#);
        assert_eq!(event.type_name(), "research_started");
    }

    #[test]
    fn log_lines_group_hires_and_breakthroughs() {
        let events = vec![
            SimEvent::MemberHired { tick: 2, role_id: "engineer".into(), product_id: "chatbot".into() },
            SimEvent::ResearchCompleted { tick: 2, node_id: "mentoring".into(), name: "Mentoring".into() },
            SimEvent::MarketEventOccurred {
                tick: 2,
                event_id: "viral_post".into(),
                name: "Viral Post".into(),
                demand_multiplier: 1.5,
                quality_penalty: 0.0,
                reputation_bonus: 1.0,
            },
            SimEvent::MemberHired { tick: 2, role_id: "designer".into(), product_id: "qa_tool".into() },
            SimEvent::CashflowApplied {
                tick: 2,
                revenue: 0.0,
                salaries: 0.0,
                operating_costs: 450.0,
                cash_delta: -450.0,
            },
        ];
        let lines = log_entries(2, &events);
        let descriptions: Vec<_> = lines.iter().map(|l| l.description.as_str()).collect();
        assert_eq!(
            descriptions,
            vec!["Demand x1.50, Reputation +1.0", "Unlocked: mentoring", "Added 2 team members"]
        );
    }
}
