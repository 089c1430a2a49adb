//! SQLite run journal.
//!
//! RULE: Only store.rs talks to the database.
//! The engine hands finished records to the store; subsystems never
//! see it and never execute SQL.

use chrono::Utc;
use rusqlite::{params, Connection};

use crate::{
    error::SimResult,
    event::{EventLogEntry, KpiRecord},
    types::Tick,
};

pub struct SimStore {
    conn: Connection,
}

impl SimStore {
    /// Open (or create) the journal database at `path`.
    pub fn open(path: &str) -> SimResult<Self> {
        let conn = Connection::open(path)?;
        if let Err(e) = conn.execute_batch("PRAGMA journal_mode=WAL;") {
            log::warn!("journal {path}: WAL unavailable, keeping default journal mode: {e}");
        }
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> SimResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> SimResult<()> {
        self.conn.execute_batch(include_str!("../../migrations/001_run_journal.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(&self, run_id: &str, seed: u64, version: &str) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO run (run_id, seed, version, started_at) VALUES (?1, ?2, ?3, ?4)",
            params![run_id, seed as i64, version, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn run_seed(&self, run_id: &str) -> SimResult<Option<u64>> {
        let mut stmt = self.conn.prepare("SELECT seed FROM run WHERE run_id = ?1")?;
        let mut rows = stmt.query_map(params![run_id], |row| row.get::<_, i64>(0))?;
        match rows.next() {
            Some(seed) => Ok(Some(seed? as u64)),
            None => Ok(None),
        }
    }

    // ── Tick commit ────────────────────────────────────────────

    /// Journal one tick: its events in order, then its KPI row. Either all
    /// rows land or none do.
    pub fn record_tick(&self, run_id: &str, events: &[EventLogEntry], kpi: &KpiRecord) -> SimResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        for entry in events {
            insert_event(&tx, entry)?;
        }
        insert_kpi(&tx, run_id, kpi)?;
        tx.commit()?;
        Ok(())
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> SimResult<()> {
        insert_event(&self.conn, entry)
    }

    pub fn events_for_tick(&self, run_id: &str, tick: Tick) -> SimResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, tick, subsystem, event_type, payload
             FROM event_log WHERE run_id = ?1 AND tick = ?2
             ORDER BY id ASC"
        )?;
        let entries = stmt.query_map(params![run_id, tick as i64], |row| {
            Ok(EventLogEntry {
                id:         Some(row.get(0)?),
                run_id:     row.get(1)?,
                tick:       row.get::<_, i64>(2)? as u64,
                subsystem:  row.get(3)?,
                event_type: row.get(4)?,
                payload:    row.get(5)?,
            })
        })?.collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // ── KPI history ────────────────────────────────────────────

    pub fn append_kpi(&self, run_id: &str, record: &KpiRecord) -> SimResult<()> {
        insert_kpi(&self.conn, run_id, record)
    }

    pub fn kpi_history(&self, run_id: &str) -> SimResult<Vec<KpiRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT tick, cash, reputation, revenue, adoption, avg_quality, cash_delta
             FROM kpi_history WHERE run_id = ?1
             ORDER BY tick ASC"
        )?;
        let records = stmt.query_map(params![run_id], |row| {
            Ok(KpiRecord {
                tick:        row.get::<_, i64>(0)? as u64,
                cash:        row.get(1)?,
                reputation:  row.get(2)?,
                revenue:     row.get(3)?,
                adoption:    row.get::<_, i64>(4)? as u64,
                avg_quality: row.get(5)?,
                cash_delta:  row.get(6)?,
            })
        })?.collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

// `Transaction` derefs to `Connection`, so these serve both paths.

fn insert_event(conn: &Connection, entry: &EventLogEntry) -> SimResult<()> {
    conn.execute(
        "INSERT INTO event_log (run_id, tick, subsystem, event_type, payload)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            entry.run_id,
            entry.tick as i64,
            entry.subsystem,
            entry.event_type,
            entry.payload,
        ],
    )?;
    Ok(())
}

fn insert_kpi(conn: &Connection, run_id: &str, record: &KpiRecord) -> SimResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO kpi_history
            (run_id, tick, cash, reputation, revenue, adoption, avg_quality, cash_delta)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            run_id,
            record.tick as i64,
            record.cash,
            record.reputation,
            record.revenue,
            record.adoption as i64,
            record.avg_quality,
            record.cash_delta,
        ],
    )?;
    Ok(())
}
