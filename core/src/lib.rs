//! Deterministic simulation kernel for a company-building game.
//!
//! A fixed-step tick loop drives an immutable GameState through a fixed
//! pipeline of subsystems. Every random draw comes from a namespaced
//! sub-stream of the run seed, so a seed and a tick count fully determine
//! the outcome.

pub mod achievement_subsystem;
pub mod bus;
pub mod cashflow_subsystem;
pub mod clock;
pub mod config;
pub mod demand_subsystem;
pub mod engine;
pub mod error;
pub mod event;
pub mod hiring_subsystem;
pub mod market_event_subsystem;
pub mod migration;
pub mod research_subsystem;
pub mod reputation_subsystem;
pub mod rng;
pub mod savegame;
pub mod service;
pub mod state;
pub mod store;
pub mod subsystem;
pub mod tick_loop;
pub mod training_subsystem;
pub mod types;
