//! SQLite event journal.
//!
//! RULE: Only store.rs talks to the database.
//! The journal is an audit trail beside the JSON snapshot; the snapshot
//! stays the source of truth and the journal is never replayed into it.

use crate::{
    error::{ParkError, ParkResult},
    event::{EventLogEntry, ParkEvent},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection};
use std::{path::Path, sync::Mutex};

pub const JOURNAL_FILE: &str = "journal.db";

pub struct ParkStore {
    conn: Mutex<Connection>,
}

impl ParkStore {
    /// Open (or create) the journal at `path`.
    pub fn open(path: &Path) -> ParkResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode: readers never block the writer.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open an in-memory journal (no volume configured, and tests).
    pub fn in_memory() -> ParkResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Journal under `volume`, or in memory without one. Migrated.
    pub fn for_volume(volume: Option<&Path>) -> ParkResult<Self> {
        let store = match volume {
            Some(dir) => Self::open(&dir.join(JOURNAL_FILE))?,
            None => Self::in_memory()?,
        };
        store.migrate()?;
        Ok(store)
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> ParkResult<()> {
        let conn = self.conn.lock().map_err(|_| ParkError::LockPoisoned)?;
        conn.execute_batch(include_str!("../migrations/001_journal.sql"))?;
        Ok(())
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, sim_time: DateTime<Utc>, event: &ParkEvent) -> ParkResult<()> {
        let payload = serde_json::to_string(event)?;
        let conn = self.conn.lock().map_err(|_| ParkError::LockPoisoned)?;
        conn.execute(
            "INSERT INTO event_log (sim_time, event_type, payload) VALUES (?1, ?2, ?3)",
            params![sim_time.to_rfc3339(), event.type_name(), payload],
        )?;
        Ok(())
    }

    /// Most recent `limit` entries, oldest first.
    pub fn recent_events(&self, limit: usize) -> ParkResult<Vec<EventLogEntry>> {
        let conn = self.conn.lock().map_err(|_| ParkError::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, sim_time, event_type, payload FROM (
                 SELECT * FROM event_log ORDER BY id DESC LIMIT ?1
             ) ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![limit as i64], |row| {
                let raw_time: String = row.get(1)?;
                let sim_time = DateTime::parse_from_rfc3339(&raw_time)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e))
                    })?
                    .with_timezone(&Utc);
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    sim_time,
                    event_type: row.get(2)?,
                    payload: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn event_count(&self) -> ParkResult<i64> {
        let conn = self.conn.lock().map_err(|_| ParkError::LockPoisoned)?;
        let count = conn.query_row("SELECT COUNT(*) FROM event_log", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn event_count_by_type(&self, event_type: &str) -> ParkResult<i64> {
        let conn = self.conn.lock().map_err(|_| ParkError::LockPoisoned)?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM event_log WHERE event_type = ?1",
            params![event_type],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn append_and_read_back() {
        let store = ParkStore::for_volume(None).unwrap();
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        store.append_event(t, &ParkEvent::ParkOpened).unwrap();
        store
            .append_event(t, &ParkEvent::TransactionApplied { amount: 5.0 })
            .unwrap();

        assert_eq!(store.event_count().unwrap(), 2);
        assert_eq!(store.event_count_by_type("park_opened").unwrap(), 1);

        let events = store.recent_events(10).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sim_time, t);
        assert_eq!(
            events[1].decode().unwrap(),
            ParkEvent::TransactionApplied { amount: 5.0 }
        );
    }

    #[test]
    fn recent_events_keeps_newest() {
        let store = ParkStore::for_volume(None).unwrap();
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        for amount in 1..=5 {
            store
                .append_event(t, &ParkEvent::TransactionApplied { amount: amount as f64 })
                .unwrap();
        }
        let last_two = store.recent_events(2).unwrap();
        assert_eq!(last_two[0].decode().unwrap(), ParkEvent::TransactionApplied { amount: 4.0 });
        assert_eq!(last_two[1].decode().unwrap(), ParkEvent::TransactionApplied { amount: 5.0 });
    }
}
