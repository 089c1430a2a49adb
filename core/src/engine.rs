//! The simulation engine: tick loop, subsystem pipeline, observers.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Hiring        minimum staffing per product
//!   2. Training      skill growth, with research training bonus
//!   3. Research      progress on the active node, unlocks
//!   4. Events        one weighted market event, reputation bonus
//!   5. Demand        quality and adoption per product
//!   6. Cashflow      revenue minus salaries and operating costs
//!   7. Reputation    drift from the cash delta
//!   8. Achievements  first-unlock-wins evaluation
//!
//! RULES:
//!   - Subsystems execute in registration order, every tick.
//!   - Each subsystem gets the snapshot the previous one returned.
//!   - No subsystem calls another subsystem's functions directly.
//!   - All randomness flows through the RngBank.
//!   - A tick either completes or leaves the live state untouched.
//!   - Observers are notified only after a tick has fully completed.

use std::{collections::VecDeque, path::Path, sync::Arc};

use crate::{
    achievement_subsystem::{AchievementSubsystem, PlatformAchievements},
    bus::{EventBus, LifecycleHandler, SubscriptionId},
    cashflow_subsystem::CashflowSubsystem,
    clock::SimSpeed,
    config::{AssetCatalog, EconomyConfig},
    demand_subsystem::DemandSubsystem,
    error::SimResult,
    event::{log_entries, EventLogEntry, KpiRecord, LifecycleEvent, LogEntry, SimEvent},
    hiring_subsystem::HiringSubsystem,
    market_event_subsystem::MarketEventSubsystem,
    research_subsystem::ResearchSubsystem,
    reputation_subsystem::ReputationSubsystem,
    rng::{RandomSource, RngBank, SubsystemSlot},
    savegame,
    state::GameState,
    store::SimStore,
    subsystem::{SimSubsystem, TickContext},
    tick_loop::{SleepFn, TickLoop, TimeSource},
    training_subsystem::TrainingSubsystem,
    types::{RunId, Tick},
};

/// Most recent player-facing log lines kept in memory.
pub const EVENT_LOG_CAPACITY: usize = 200;

const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

struct Journal {
    store:  SimStore,
    run_id: RunId,
}

/// Everything a tick reads and writes. Kept apart from the TickLoop so the
/// loop can drive it through a closure.
struct Pipeline {
    run_id:         RunId,
    catalog:        Arc<AssetCatalog>,
    economy:        EconomyConfig,
    state:          GameState,
    subsystems:     Vec<(SubsystemSlot, Box<dyn SimSubsystem>)>,
    record_history: bool,
    history:        Vec<KpiRecord>,
    event_log:      VecDeque<LogEntry>,
    journal:        Option<Journal>,
    platform:       Option<Box<dyn PlatformAchievements>>,
}

pub struct SimEngine {
    pub run_id: RunId,
    seed:       u64,
    started:    bool,
    tick_loop:  TickLoop,
    pipeline:   Pipeline,
    bus:        EventBus,
}

impl SimEngine {
    /// Engine with no subsystems registered. The state starts at tick 0.
    pub fn new(
        run_id:  RunId,
        seed:    u64,
        catalog: Arc<AssetCatalog>,
        economy: EconomyConfig,
    ) -> SimResult<Self> {
        catalog.validate()?;
        economy.validate(&catalog)?;
        let state = GameState::initial(&catalog, &economy);
        let tick_loop = TickLoop::new(RandomSource::new(seed), SimSpeed::Normal.tick_duration())?;
        Ok(Self {
            seed,
            started: false,
            tick_loop,
            bus: EventBus::new(),
            pipeline: Pipeline {
                run_id: run_id.clone(),
                catalog,
                economy,
                state,
                subsystems: Vec::new(),
                record_history: true,
                history: Vec::new(),
                event_log: VecDeque::with_capacity(EVENT_LOG_CAPACITY),
                journal: None,
                platform: None,
            },
            run_id,
        })
    }

    /// Build a fully wired engine with all subsystems registered.
    /// Call this instead of new() + manual register() calls.
    pub fn build(
        run_id:  RunId,
        seed:    u64,
        catalog: Arc<AssetCatalog>,
        economy: EconomyConfig,
    ) -> SimResult<Self> {
        let mut engine = SimEngine::new(run_id, seed, catalog, economy)?;

        // EXECUTION ORDER: fixed, documented, never reordered.
        engine.register(SubsystemSlot::Hiring, Box::new(HiringSubsystem::new()));
        engine.register(SubsystemSlot::Training, Box::new(TrainingSubsystem::new()));
        engine.register(SubsystemSlot::Research, Box::new(ResearchSubsystem::new()));
        engine.register(SubsystemSlot::Events, Box::new(MarketEventSubsystem::new()));
        engine.register(SubsystemSlot::Demand, Box::new(DemandSubsystem::new()));
        engine.register(SubsystemSlot::Cashflow, Box::new(CashflowSubsystem::new()));
        engine.register(SubsystemSlot::Reputation, Box::new(ReputationSubsystem::new()));
        engine.register(SubsystemSlot::Achievements, Box::new(AchievementSubsystem::with_defaults()));
        Ok(engine)
    }

    /// Register a subsystem. Call in the documented execution order.
    pub fn register(&mut self, slot: SubsystemSlot, subsystem: Box<dyn SimSubsystem>) {
        self.pipeline.subsystems.push((slot, subsystem));
    }

    /// Replace the tick length used by wall-clock pacing. The tick counter is kept.
    pub fn with_speed(mut self, speed: SimSpeed) -> SimResult<Self> {
        let tick = self.tick_loop.current_tick();
        self.tick_loop = TickLoop::new(RandomSource::new(self.seed), speed.tick_duration())?;
        self.tick_loop.reset_to(tick);
        Ok(self)
    }

    /// Inject the clock and sleep used by `step` and `run`.
    pub fn with_time(mut self, time_source: TimeSource, sleep: SleepFn) -> Self {
        self.tick_loop = self.tick_loop.with_time_source(time_source).with_sleep(sleep);
        self
    }

    pub fn set_platform(&mut self, platform: Box<dyn PlatformAchievements>) {
        self.pipeline.platform = Some(platform);
    }

    pub fn set_record_history(&mut self, enabled: bool) {
        self.pipeline.record_history = enabled;
    }

    /// Persist every event and KPI record of this run to `store`.
    pub fn attach_journal(&mut self, store: SimStore) -> SimResult<()> {
        store.migrate()?;
        store.insert_run(&self.run_id, self.seed, ENGINE_VERSION)?;
        self.pipeline.journal = Some(Journal { store, run_id: self.run_id.clone() });
        Ok(())
    }

    pub fn subscribe(&mut self, handler: LifecycleHandler) -> SubscriptionId {
        self.bus.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    // ── Queries ────────────────────────────────────────────────

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn state(&self) -> &GameState {
        &self.pipeline.state
    }

    pub fn catalog(&self) -> &Arc<AssetCatalog> {
        &self.pipeline.catalog
    }

    pub fn economy(&self) -> &EconomyConfig {
        &self.pipeline.economy
    }

    pub fn current_tick(&self) -> Tick {
        self.tick_loop.current_tick()
    }

    pub fn kpi_history(&self) -> &[KpiRecord] {
        &self.pipeline.history
    }

    pub fn event_log(&self) -> impl Iterator<Item = &LogEntry> {
        self.pipeline.event_log.iter()
    }

    /// Journaled events for a tick. Empty when no journal is attached.
    pub fn store_events_for_tick(&self, tick: Tick) -> SimResult<Vec<EventLogEntry>> {
        match &self.pipeline.journal {
            Some(journal) => journal.store.events_for_tick(&journal.run_id, tick),
            None => Ok(Vec::new()),
        }
    }

    // ── Driving ────────────────────────────────────────────────

    /// Publish SimulationStarted once, before the first tick.
    pub fn start(&mut self) {
        if !self.started {
            self.started = true;
            log::info!("simulation start: run={} seed={}", self.run_id, self.seed);
            self.bus.publish(&LifecycleEvent::SimulationStarted { seed: self.seed });
        }
    }

    /// Feed elapsed seconds to the tick loop and process every whole tick.
    pub fn advance_by(&mut self, elapsed: f64) -> SimResult<u64> {
        self.start();
        let pipeline = &mut self.pipeline;
        let bus = &mut self.bus;
        self.tick_loop
            .advance_by(elapsed, |tick, rng| pipeline.process_tick(tick, rng, bus))
    }

    /// Sample the injected clock once and process whatever is due.
    pub fn step(&mut self) -> SimResult<u64> {
        self.start();
        let pipeline = &mut self.pipeline;
        let bus = &mut self.bus;
        self.tick_loop.step(|tick, rng| pipeline.process_tick(tick, rng, bus))
    }

    /// Run `n` ticks back to back, ignoring wall-clock time.
    pub fn run_ticks(&mut self, n: u64) -> SimResult<()> {
        self.start();
        for _ in 0..n {
            let pipeline = &mut self.pipeline;
            let bus = &mut self.bus;
            self.tick_loop
                .tick_once(|tick, rng| pipeline.process_tick(tick, rng, bus))?;
        }
        self.complete();
        Ok(())
    }

    /// Run `n` ticks paced against the injected clock, sleeping between ticks.
    pub fn run(&mut self, n: u64) -> SimResult<()> {
        self.start();
        let pipeline = &mut self.pipeline;
        let bus = &mut self.bus;
        self.tick_loop
            .run(n, |tick, rng| pipeline.process_tick(tick, rng, bus))?;
        self.complete();
        Ok(())
    }

    /// Publish SimulationCompleted for the current tick.
    pub fn complete(&mut self) {
        let tick = self.pipeline.state.tick;
        log::info!(
            "simulation complete: run={} tick={tick} cash={:.2} reputation={:.2}",
            self.run_id,
            self.pipeline.state.cash,
            self.pipeline.state.reputation,
        );
        self.bus.publish(&LifecycleEvent::SimulationCompleted { tick });
    }

    /// Replace the live state. The state is checked against the catalog first;
    /// on failure the engine keeps its current state.
    pub fn load_state(&mut self, state: GameState) -> SimResult<()> {
        state.validate()?;
        state.validate_against(&self.pipeline.catalog)?;
        self.tick_loop.reset_to(state.tick);
        self.pipeline.history.clear();
        self.pipeline.event_log.clear();
        log::info!("loaded state at tick {}", state.tick);
        self.pipeline.state = state;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> SimResult<()> {
        savegame::save_game(path, &self.pipeline.state)?;
        Ok(())
    }

    pub fn load(&mut self, path: &Path) -> SimResult<()> {
        let state = savegame::load_game(path)?;
        self.load_state(state)
    }
}

impl Pipeline {
    /// Run every subsystem for `tick`. The live state is replaced only
    /// after the whole pipeline succeeded.
    fn process_tick(&mut self, tick: Tick, tick_rng: &RandomSource, bus: &mut EventBus) -> SimResult<()> {
        let ctx = TickContext { tick, catalog: &self.catalog, economy: &self.economy };
        let bank = RngBank::new(tick_rng.clone(), tick);

        let mut state = self.state.with_tick(tick);
        let mut tick_events: Vec<SimEvent> = Vec::new();
        let mut journaled: Vec<EventLogEntry> = Vec::new();

        // Execute each subsystem in registration order.
        // Each subsystem sees all events emitted so far this tick.
        for (slot, subsystem) in &self.subsystems {
            let mut rng = bank.for_subsystem(*slot);
            let output = subsystem.update(&state, &ctx, &tick_events, &mut rng)?;

            if let Some(journal) = &self.journal {
                for event in &output.events {
                    journaled.push(EventLogEntry {
                        id:         None,
                        run_id:     journal.run_id.clone(),
                        tick,
                        subsystem:  subsystem.name().to_string(),
                        event_type: event.type_name().to_string(),
                        payload:    serde_json::to_string(event)?,
                    });
                }
            }

            state = output.state;
            tick_events.extend(output.events);
        }

        let record = kpi_record(&state, &tick_events);
        if let Some(journal) = &self.journal {
            journal.store.record_tick(&journal.run_id, &journaled, &record)?;
        }

        log::debug!(
            "tick={tick} engine: cash={:.2} reputation={:.2} adoption={} events={}",
            state.cash,
            state.reputation,
            record.adoption,
            tick_events.len(),
        );

        self.state = state;
        if self.record_history {
            self.history.push(record);
        }
        for entry in log_entries(tick, &tick_events) {
            if self.event_log.len() == EVENT_LOG_CAPACITY {
                self.event_log.pop_front();
            }
            self.event_log.push_back(entry);
        }

        bus.publish(&LifecycleEvent::TickProcessed { tick });
        for event in &tick_events {
            if let SimEvent::AchievementUnlocked { achievement_id, .. } = event {
                self.announce_achievement(tick, achievement_id, bus);
            }
        }
        Ok(())
    }

    fn announce_achievement(&mut self, tick: Tick, achievement_id: &str, bus: &mut EventBus) {
        let Some(snapshot) = self.state.achievements.iter().find(|a| a.id == achievement_id) else {
            return;
        };
        if let Some(platform) = self.platform.as_mut() {
            if let Err(e) = platform.unlock(achievement_id) {
                log::warn!("tick={tick} achievements: platform unlock of {achievement_id} failed: {e:#}");
            }
        }
        bus.publish(&LifecycleEvent::AchievementUnlocked { tick, achievement: snapshot.clone() });
    }
}

fn kpi_record(state: &GameState, tick_events: &[SimEvent]) -> KpiRecord {
    let (revenue, cash_delta) = tick_events
        .iter()
        .find_map(|event| match event {
            SimEvent::CashflowApplied { revenue, cash_delta, .. } => Some((*revenue, *cash_delta)),
            _ => None,
        })
        .unwrap_or((state.total_revenue(), 0.0));
    KpiRecord {
        tick: state.tick,
        cash: state.cash,
        reputation: state.reputation,
        revenue,
        adoption: state.total_adoption(),
        avg_quality: state.average_quality(),
        cash_delta,
    }
}
