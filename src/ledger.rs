//! Append-only cash drawer ledger.
//!
//! Records cash movements that are not sales: opening floats going in,
//! petty cash and supplier payouts going out. Entries are never updated
//! or deleted; a correction is a new entry. Every entry is tagged with
//! the register session that recorded it, so end-of-day reconciliation
//! can group by session.

use chrono::Utc;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::db::DbState;
use crate::error::{EngineError, Result};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Direction of a drawer movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawerEntryType {
    /// Cash added to the drawer (opening float, change top-up).
    FloatIn,
    /// Cash taken out (petty cash, supplier payout).
    PaidOut,
}

impl DrawerEntryType {
    pub fn as_str(self) -> &'static str {
        match self {
            DrawerEntryType::FloatIn => "float_in",
            DrawerEntryType::PaidOut => "paid_out",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "float_in" => Some(DrawerEntryType::FloatIn),
            "paid_out" => Some(DrawerEntryType::PaidOut),
            _ => None,
        }
    }
}

/// One immutable ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashDrawerEntry {
    pub id: String,
    pub session_id: String,
    pub entry_type: DrawerEntryType,
    /// Amount in cents, always positive; direction comes from `entry_type`.
    pub amount: i64,
    pub description: String,
    /// RFC 3339 timestamp.
    pub created_at: String,
}

/// Per-session drawer totals in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionTotals {
    pub float_in: i64,
    pub paid_out: i64,
    /// `float_in - paid_out`.
    pub net: i64,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Append a drawer entry. Validation runs before the insert, so a rejected
/// call writes nothing.
pub fn record(
    db: &DbState,
    session_id: &str,
    entry_type: DrawerEntryType,
    amount: i64,
    description: &str,
) -> Result<CashDrawerEntry> {
    if amount <= 0 {
        return Err(EngineError::Validation(format!(
            "amount must be positive cents (got {amount})"
        )));
    }
    let description = description.trim();
    if description.is_empty() {
        return Err(EngineError::Validation(
            "description must not be blank".into(),
        ));
    }
    let session_id = session_id.trim();
    if session_id.is_empty() {
        return Err(EngineError::Validation(
            "session id must not be blank".into(),
        ));
    }

    let entry = CashDrawerEntry {
        id: Uuid::new_v4().to_string(),
        session_id: session_id.to_string(),
        entry_type,
        amount,
        description: description.to_string(),
        created_at: Utc::now().to_rfc3339(),
    };

    let conn = db
        .conn
        .lock()
        .map_err(|e| EngineError::storage("ledger lock", e))?;
    conn.execute(
        "INSERT INTO drawer_ledger (id, session_id, entry_type, amount, description, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.id,
            entry.session_id,
            entry.entry_type.as_str(),
            entry.amount,
            entry.description,
            entry.created_at,
        ],
    )
    .map_err(|e| EngineError::storage("record drawer entry", e))?;

    info!(
        entry_id = %entry.id,
        session_id = %entry.session_id,
        entry_type = entry.entry_type.as_str(),
        amount = entry.amount,
        "Drawer entry recorded"
    );
    Ok(entry)
}

/// All entries for a session, in insertion order.
pub fn entries_for_session(db: &DbState, session_id: &str) -> Result<Vec<CashDrawerEntry>> {
    let conn = db
        .conn
        .lock()
        .map_err(|e| EngineError::storage("ledger lock", e))?;

    let mut stmt = conn
        .prepare(
            "SELECT id, session_id, entry_type, amount, description, created_at
             FROM drawer_ledger WHERE session_id = ?1 ORDER BY seq ASC",
        )
        .map_err(|e| EngineError::storage("prepare ledger query", e))?;

    let rows = stmt
        .query_map(params![session_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })
        .map_err(|e| EngineError::storage("ledger query", e))?;

    let mut entries = Vec::new();
    for row in rows {
        let (id, session_id, entry_type, amount, description, created_at) =
            row.map_err(|e| EngineError::storage("ledger row", e))?;
        let entry_type = DrawerEntryType::parse(&entry_type).ok_or_else(|| {
            EngineError::Storage(format!("unknown drawer entry type: {entry_type}"))
        })?;
        entries.push(CashDrawerEntry {
            id,
            session_id,
            entry_type,
            amount,
            description,
            created_at,
        });
    }
    Ok(entries)
}

/// Float-in/paid-out sums for a session. Unknown sessions report zeros.
pub fn session_totals(db: &DbState, session_id: &str) -> Result<SessionTotals> {
    let conn = db
        .conn
        .lock()
        .map_err(|e| EngineError::storage("ledger lock", e))?;

    let (float_in, paid_out) = conn
        .query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN entry_type = 'float_in' THEN amount END), 0),
                COALESCE(SUM(CASE WHEN entry_type = 'paid_out' THEN amount END), 0)
             FROM drawer_ledger WHERE session_id = ?1",
            params![session_id],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )
        .map_err(|e| EngineError::storage("ledger totals", e))?;

    Ok(SessionTotals {
        float_in,
        paid_out,
        net: float_in - paid_out,
    })
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use rusqlite::Connection;
    use std::path::PathBuf;
    use std::sync::Mutex;

    fn test_db_state() -> DbState {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        db::run_migrations_for_test(&conn);
        DbState {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        }
    }

    fn row_count(db_state: &DbState) -> i64 {
        let conn = db_state.conn.lock().expect("db lock");
        conn.query_row("SELECT COUNT(*) FROM drawer_ledger", [], |row| row.get(0))
            .expect("count rows")
    }

    #[test]
    fn test_record_rejects_bad_input() {
        let db_state = test_db_state();

        let zero = record(&db_state, "S1", DrawerEntryType::FloatIn, 0, "float")
            .expect_err("zero amount");
        assert!(matches!(zero, EngineError::Validation(_)));

        let negative = record(&db_state, "S1", DrawerEntryType::PaidOut, -500, "payout")
            .expect_err("negative amount");
        assert!(matches!(negative, EngineError::Validation(_)));

        let blank = record(&db_state, "S1", DrawerEntryType::FloatIn, 100, "   ")
            .expect_err("blank description");
        assert!(matches!(blank, EngineError::Validation(_)));

        let no_session = record(&db_state, "", DrawerEntryType::FloatIn, 100, "float")
            .expect_err("blank session");
        assert!(matches!(no_session, EngineError::Validation(_)));

        assert_eq!(row_count(&db_state), 0, "rejected calls must not write");
    }

    #[test]
    fn test_session_ledger_in_insertion_order() {
        let db_state = test_db_state();

        record(&db_state, "S1", DrawerEntryType::FloatIn, 500_000, "opening float")
            .expect("float in");
        record(&db_state, "S1", DrawerEntryType::PaidOut, 50_000, "window cleaner")
            .expect("paid out");

        let entries = entries_for_session(&db_state, "S1").expect("entries");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].entry_type, DrawerEntryType::FloatIn);
        assert_eq!(entries[0].amount, 500_000);
        assert_eq!(entries[1].entry_type, DrawerEntryType::PaidOut);
        assert_eq!(entries[1].description, "window cleaner");
        assert!(!entries[0].created_at.is_empty());

        let totals = session_totals(&db_state, "S1").expect("totals");
        assert_eq!(totals.float_in, 500_000);
        assert_eq!(totals.paid_out, 50_000);
        assert_eq!(totals.net, 450_000);
    }

    #[test]
    fn test_sessions_are_isolated() {
        let db_state = test_db_state();

        record(&db_state, "S1", DrawerEntryType::FloatIn, 1000, "S1 float").expect("record");
        record(&db_state, "S2", DrawerEntryType::FloatIn, 2000, "S2 float").expect("record");

        let s1 = entries_for_session(&db_state, "S1").expect("entries");
        assert_eq!(s1.len(), 1);
        assert_eq!(s1[0].session_id, "S1");

        let totals = session_totals(&db_state, "S2").expect("totals");
        assert_eq!(totals.float_in, 2000);
    }

    #[test]
    fn test_unknown_session_reports_zeros() {
        let db_state = test_db_state();

        let totals = session_totals(&db_state, "nope").expect("totals");
        assert_eq!(totals.float_in, 0);
        assert_eq!(totals.paid_out, 0);
        assert_eq!(totals.net, 0);
        assert!(entries_for_session(&db_state, "nope").expect("entries").is_empty());
    }
}
