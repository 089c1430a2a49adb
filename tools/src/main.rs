//! sim-runner: headless runner for the tycoon simulation kernel.
//!
//! Usage:
//!   sim-runner --seed 42 --ticks 30
//!   sim-runner --profile seed_round --db run.db --save run.sav
//!   sim-runner --load run.sav --ticks 60 --output result.json

use anyhow::{Context, Result};
use serde::Serialize;
use std::{env, fs, path::Path, str::FromStr, sync::Arc};
use tycoon_core::{
    config::{AssetCatalog, EconomyConfig, SimulationProfile},
    engine::SimEngine,
    event::KpiRecord,
    savegame::{encode_savegame, SaveGame},
    store::SimStore,
    types::Tick,
};

const DEFAULT_SEED: u64 = 42;
const DEFAULT_TICKS: u64 = 30;

/// What adapters read back after a headless run.
#[derive(Debug, Serialize)]
struct SimulationResult {
    run_id:     String,
    seed:       u64,
    final_tick: Tick,
    cash:       f64,
    reputation: f64,
    summary:    KpiSummary,
}

#[derive(Debug, Serialize)]
struct KpiSummary {
    team_size:      usize,
    total_adoption: u64,
    total_revenue:  f64,
    avg_quality:    f64,
    achievements:   Vec<String>,
    research:       Vec<String>,
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    init_logging(flag(&args, "--log-level"));

    let data_dir = flag(&args, "--data-dir").unwrap_or("./data");
    let catalog = Arc::new(AssetCatalog::load(data_dir)?);

    let profile = match flag(&args, "--profile") {
        Some(name) => Some(SimulationProfile::load(&profile_path(data_dir, name))?),
        None => None,
    };
    let (mut seed, mut ticks, mut economy) = match &profile {
        Some(p) => (p.seed, p.ticks, p.economy.clone()),
        None => (DEFAULT_SEED, DEFAULT_TICKS, EconomyConfig::default()),
    };
    if let Some(value) = parse_arg(&args, "--seed")? {
        seed = value;
    }
    if let Some(value) = parse_arg(&args, "--ticks")? {
        ticks = value;
    }
    if let Some(value) = parse_arg(&args, "--operating-costs")? {
        economy.operating_costs = value;
    }

    let run_id = format!("run-{seed}-{}", chrono::Utc::now().format("%Y%m%dT%H%M%S"));
    eprintln!("tycoon sim-runner");
    eprintln!("  run_id:    {run_id}");
    eprintln!("  seed:      {seed}");
    eprintln!("  ticks:     {ticks}");
    eprintln!("  data_dir:  {data_dir}");
    if let Some(p) = &profile {
        eprintln!("  profile:   {}", p.name);
    }
    eprintln!();

    let mut engine = SimEngine::build(run_id.clone(), seed, catalog, economy)?;
    if let Some(db) = flag(&args, "--db") {
        let store = SimStore::open(db).with_context(|| format!("Cannot open journal {db}"))?;
        engine.attach_journal(store)?;
    }
    if let Some(path) = flag(&args, "--load") {
        engine
            .load(Path::new(path))
            .with_context(|| format!("Cannot load savegame {path}"))?;
    }

    engine.run_ticks(ticks)?;
    print_summary(&engine);

    if let Some(path) = flag(&args, "--save") {
        write_save(&engine, Path::new(path))?;
    }

    let result = build_result(&engine);
    let json = serde_json::to_string_pretty(&result)?;
    match flag(&args, "--output") {
        Some(path) => fs::write(path, &json).with_context(|| format!("Cannot write {path}"))?,
        None => println!("{json}"),
    }
    Ok(())
}

fn init_logging(level: Option<&str>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if let Some(level) = level {
        builder.parse_filters(level);
    }
    builder.init();
}

/// `--profile default` resolves under `<data_dir>/profiles/`; anything ending
/// in `.json` is taken as a path.
fn profile_path(data_dir: &str, name: &str) -> String {
    if name.ends_with(".json") {
        name.to_string()
    } else {
        format!("{data_dir}/profiles/{name}.json")
    }
}

/// The whole buffer goes to a sibling temp file first, then replaces `path`.
fn write_save(engine: &SimEngine, path: &Path) -> Result<()> {
    let bytes = encode_savegame(&SaveGame::from_state(engine.state()))?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &bytes).with_context(|| format!("Cannot write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("Cannot replace {}", path.display()))?;
    log::info!("saved tick {} to {} ({} bytes)", engine.state().tick, path.display(), bytes.len());
    Ok(())
}

fn build_result(engine: &SimEngine) -> SimulationResult {
    let state = engine.state();
    SimulationResult {
        run_id:     engine.run_id.clone(),
        seed:       engine.seed(),
        final_tick: state.tick,
        cash:       round2(state.cash),
        reputation: round2(state.reputation),
        summary: KpiSummary {
            team_size:      state.team.len(),
            total_adoption: state.total_adoption(),
            total_revenue:  round2(state.total_revenue()),
            avg_quality:    round2(state.average_quality()),
            achievements:   state.achievements.iter().map(|a| a.id.clone()).collect(),
            research:       state.research.unlocked.iter().cloned().collect(),
        },
    }
}

fn print_summary(engine: &SimEngine) {
    let state = engine.state();
    eprintln!("=== RUN SUMMARY ===");
    eprintln!("  final tick:     {}", state.tick);
    eprintln!("  cash:           {:.2}", state.cash);
    eprintln!("  reputation:     {:.2}", state.reputation);
    eprintln!("  team size:      {}", state.team.len());
    eprintln!("  adoption:       {}", state.total_adoption());

    eprintln!();
    eprintln!("=== KPI HISTORY (Last 5 Ticks) ===");
    let history = engine.kpi_history();
    if history.is_empty() {
        eprintln!("  (No ticks recorded)");
    } else {
        let recent: Vec<&KpiRecord> = history.iter().rev().take(5).collect();
        for k in recent.iter().rev() {
            eprintln!(
                "  tick {:>4} | Cash: ${:.0} | Delta: {:+.0} | Rep: {:.1} | Users: {}",
                k.tick, k.cash, k.cash_delta, k.reputation, k.adoption
            );
        }
    }

    let log: Vec<_> = engine.event_log().collect();
    if !log.is_empty() {
        eprintln!();
        eprintln!("=== EVENT LOG (Last 5) ===");
        for entry in log.iter().rev().take(5).rev() {
            eprintln!("  tick {:>4} | {}: {}", entry.tick, entry.name, entry.description);
        }
    }
    eprintln!();
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == name)
        .map(|w| w[1].as_str())
}

fn parse_arg<T>(args: &[String], name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    flag(args, name)
        .map(|raw| raw.parse::<T>().with_context(|| format!("Invalid value for {name}: {raw}")))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("sim-runner")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn parse_arg_reads_typed_flags() {
        let a = args(&["--seed", "7", "--operating-costs", "12.5"]);
        assert_eq!(parse_arg::<u64>(&a, "--seed").unwrap(), Some(7));
        assert_eq!(parse_arg::<f64>(&a, "--operating-costs").unwrap(), Some(12.5));
        assert_eq!(parse_arg::<u64>(&a, "--ticks").unwrap(), None);
    }

    #[test]
    fn parse_arg_rejects_garbage() {
        let a = args(&["--ticks", "many"]);
        assert!(parse_arg::<u64>(&a, "--ticks").is_err());
    }

    #[test]
    fn profile_names_resolve_under_data_dir() {
        assert_eq!(profile_path("./data", "default"), "./data/profiles/default.json");
        assert_eq!(profile_path("./data", "/tmp/custom.json"), "/tmp/custom.json");
    }

    #[test]
    fn result_rounds_to_cents() {
        assert_eq!(round2(1234.5678), 1234.57);
        assert_eq!(round2(50.0), 50.0);
    }

    #[test]
    fn save_replaces_target_without_leaving_temp_file() {
        let catalog = Arc::new(AssetCatalog::default_test());
        let mut engine =
            SimEngine::build("cli-test".into(), 5, catalog, EconomyConfig::default()).unwrap();
        engine.run_ticks(3).unwrap();

        let path = std::env::temp_dir().join(format!("sim-runner-{}.sav", std::process::id()));
        write_save(&engine, &path).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());

        let loaded = tycoon_core::savegame::load_game(&path).unwrap();
        assert_eq!(&loaded, engine.state());
        fs::remove_file(&path).unwrap();
    }
}
