//! PIN-based local authentication with bcrypt.
//!
//! Covers the two secrets a terminal carries: the entry PIN that opens a
//! register session and the override PIN that unlocks price edits. Hashes
//! are stored in the SQLite `local_settings` table (category "auth", keys
//! "entry_pin_hash" / "override_pin_hash"). Until a PIN is configured the
//! factory default `1234` is accepted, with a warning in the log. Failed
//! attempts never lock the terminal out; dialogs simply re-prompt.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::db::{self, DbState};
use crate::error::{EngineError, Result};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const SETTINGS_CATEGORY: &str = "auth";
const ENTRY_PIN_KEY: &str = "entry_pin_hash";
const OVERRIDE_PIN_KEY: &str = "override_pin_hash";

/// Factory default accepted while no PIN of that kind is configured.
const DEFAULT_PIN: &str = "1234";

// ---------------------------------------------------------------------------
// Roles and sessions
// ---------------------------------------------------------------------------

/// Operator role chosen at sign-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Cashier,
    Manager,
    Admin,
}

impl Role {
    /// Managers and admins skip the price-override prompt.
    pub fn is_privileged(self) -> bool {
        matches!(self, Role::Manager | Role::Admin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Cashier => "cashier",
            Role::Manager => "manager",
            Role::Admin => "admin",
        }
    }
}

/// An authenticated register session. Created once per sign-on; its id
/// tags cash drawer entries and checkouts for the host's audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct SessionContext {
    pub session_id: String,
    pub role: Role,
    pub signed_on_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// PIN verification
// ---------------------------------------------------------------------------

/// Validate PIN shape: numeric, at least 4 digits.
fn validate_pin(pin: &str, label: &str) -> Result<()> {
    if pin.len() < 4 {
        return Err(EngineError::Validation(format!(
            "{label} must be at least 4 digits"
        )));
    }
    if !pin.chars().all(|c| c.is_ascii_digit()) {
        return Err(EngineError::Validation(format!(
            "{label} must contain only digits"
        )));
    }
    Ok(())
}

/// Verify a PIN against the stored hash for `key`, falling back to the
/// factory default when no hash is configured yet.
fn verify_stored_pin(conn: &Connection, key: &str, label: &str, pin: &str) -> Result<()> {
    match db::get_setting(conn, SETTINGS_CATEGORY, key) {
        Some(hash) => {
            if bcrypt::verify(pin, &hash).unwrap_or(false) {
                Ok(())
            } else {
                warn!("{label} rejected");
                Err(EngineError::Authorization(format!("{label} rejected")))
            }
        }
        None => {
            if pin == DEFAULT_PIN {
                warn!("no {label} configured, accepting factory default");
                Ok(())
            } else {
                warn!("{label} rejected");
                Err(EngineError::Authorization(format!("{label} rejected")))
            }
        }
    }
}

/// Hash and store a PIN under the given settings key.
fn store_pin(db: &DbState, key: &str, label: &str, pin: &str) -> Result<()> {
    validate_pin(pin, label)?;

    let pin = Zeroizing::new(pin.to_owned());
    let hash = bcrypt::hash(pin.as_str(), bcrypt::DEFAULT_COST)
        .map_err(|e| EngineError::storage("hash PIN", e))?;

    let conn = db
        .conn
        .lock()
        .map_err(|e| EngineError::storage("settings lock", e))?;
    db::set_setting(&conn, SETTINGS_CATEGORY, key, &hash)?;
    info!("{label} updated");
    Ok(())
}

// ---------------------------------------------------------------------------
// Public operations
// ---------------------------------------------------------------------------

/// Verify the entry PIN without creating a session (screen unlock).
pub fn verify_entry_pin(db: &DbState, pin: &str) -> Result<()> {
    let pin = Zeroizing::new(pin.to_owned());
    let conn = db
        .conn
        .lock()
        .map_err(|e| EngineError::storage("settings lock", e))?;
    verify_stored_pin(&conn, ENTRY_PIN_KEY, "entry PIN", pin.as_str())
}

/// Verify the entry PIN and open a register session for `role`.
pub fn sign_on(db: &DbState, pin: &str, role: Role) -> Result<SessionContext> {
    verify_entry_pin(db, pin)?;

    let session = SessionContext {
        session_id: Uuid::new_v4().to_string(),
        role,
        signed_on_at: Utc::now(),
    };
    info!(session_id = %session.session_id, role = role.as_str(), "Sign-on successful");
    Ok(session)
}

/// Set the entry PIN (register sign-on and screen unlock).
pub fn set_entry_pin(db: &DbState, pin: &str) -> Result<()> {
    store_pin(db, ENTRY_PIN_KEY, "entry PIN", pin)
}

/// Set the override PIN (price-edit authorization). Kept separate from the
/// entry PIN so a manager can hand cashiers the register without handing
/// them price control.
pub fn set_override_pin(db: &DbState, pin: &str) -> Result<()> {
    store_pin(db, OVERRIDE_PIN_KEY, "override PIN", pin)
}

// ---------------------------------------------------------------------------
// Price override gate
// ---------------------------------------------------------------------------

/// Lock state guarding unit-price edits in the line edit dialog.
///
/// Cashiers start locked and must present the override PIN once per edit
/// dialog; managers and admins start unlocked. `relock` runs every time a
/// new edit dialog opens, so one authorization never outlives the dialog
/// it was typed for.
#[derive(Debug, Clone)]
pub struct PriceOverrideGate {
    locked: bool,
}

impl PriceOverrideGate {
    pub fn for_role(role: Role) -> Self {
        PriceOverrideGate {
            locked: !role.is_privileged(),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Reset to the role's initial state. Called when an edit dialog opens.
    pub fn relock(&mut self, role: Role) {
        self.locked = !role.is_privileged();
    }

    /// Verify the override PIN and unlock on success. A failed attempt
    /// leaves the gate locked and the dialog re-prompts.
    pub fn authorize(&mut self, db: &DbState, pin: &str) -> Result<()> {
        let pin = Zeroizing::new(pin.to_owned());
        let conn = db
            .conn
            .lock()
            .map_err(|e| EngineError::storage("settings lock", e))?;
        verify_stored_pin(&conn, OVERRIDE_PIN_KEY, "override PIN", pin.as_str())?;

        self.locked = false;
        info!("Price override authorized");
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
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

    /// Store a pre-computed low-cost hash so tests stay fast.
    fn store_test_hash(db_state: &DbState, key: &str, pin: &str) {
        let conn = db_state.conn.lock().expect("db lock");
        let hash = bcrypt::hash(pin, 4).expect("hash test pin");
        db::set_setting(&conn, SETTINGS_CATEGORY, key, &hash).expect("store hash");
    }

    #[test]
    fn default_pin_accepted_until_configured() {
        let db_state = test_db_state();

        let session = sign_on(&db_state, "1234", Role::Cashier).expect("default PIN sign-on");
        assert_eq!(session.role, Role::Cashier);
        assert!(!session.session_id.is_empty());

        let err = sign_on(&db_state, "9999", Role::Cashier).expect_err("wrong PIN");
        assert!(matches!(err, EngineError::Authorization(_)));
    }

    #[test]
    fn configured_entry_pin_replaces_default() {
        let db_state = test_db_state();
        store_test_hash(&db_state, ENTRY_PIN_KEY, "2468");

        let err = sign_on(&db_state, "1234", Role::Cashier).expect_err("default no longer valid");
        assert!(matches!(err, EngineError::Authorization(_)));

        sign_on(&db_state, "2468", Role::Manager).expect("configured PIN sign-on");
    }

    #[test]
    fn set_entry_pin_validates_shape() {
        let db_state = test_db_state();

        let short = set_entry_pin(&db_state, "12").expect_err("too short");
        assert!(matches!(short, EngineError::Validation(_)));

        let letters = set_entry_pin(&db_state, "12a4").expect_err("non-digits");
        assert!(matches!(letters, EngineError::Validation(_)));

        // Shape failures must not write a hash; the default still works
        sign_on(&db_state, "1234", Role::Cashier).expect("default remains active");
    }

    #[test]
    fn sessions_get_unique_ids() {
        let db_state = test_db_state();
        let a = sign_on(&db_state, "1234", Role::Cashier).expect("sign-on");
        let b = sign_on(&db_state, "1234", Role::Cashier).expect("sign-on");
        assert_ne!(a.session_id, b.session_id);
    }

    #[test]
    fn gate_initial_state_follows_role() {
        assert!(PriceOverrideGate::for_role(Role::Cashier).is_locked());
        assert!(!PriceOverrideGate::for_role(Role::Manager).is_locked());
        assert!(!PriceOverrideGate::for_role(Role::Admin).is_locked());
    }

    #[test]
    fn gate_authorize_and_relock_cycle() {
        let db_state = test_db_state();
        let mut gate = PriceOverrideGate::for_role(Role::Cashier);
        assert!(gate.is_locked());

        // Default override PIN while none is configured
        gate.authorize(&db_state, "1234").expect("default override");
        assert!(!gate.is_locked());

        // Opening the next edit dialog re-locks for a cashier
        gate.relock(Role::Cashier);
        assert!(gate.is_locked());

        // A failed attempt leaves the gate locked
        let err = gate.authorize(&db_state, "0000").expect_err("wrong PIN");
        assert!(matches!(err, EngineError::Authorization(_)));
        assert!(gate.is_locked());

        // Relock resets to the role's starting state, unlocked for managers
        gate.relock(Role::Manager);
        assert!(!gate.is_locked());
    }

    #[test]
    fn entry_and_override_pins_are_separate_secrets() {
        let db_state = test_db_state();
        store_test_hash(&db_state, ENTRY_PIN_KEY, "2468");
        store_test_hash(&db_state, OVERRIDE_PIN_KEY, "9753");

        // Entry PIN does not open the price gate
        let mut gate = PriceOverrideGate::for_role(Role::Cashier);
        let err = gate.authorize(&db_state, "2468").expect_err("entry PIN on gate");
        assert!(matches!(err, EngineError::Authorization(_)));
        assert!(gate.is_locked());

        gate.authorize(&db_state, "9753").expect("override PIN");
        assert!(!gate.is_locked());

        // Override PIN does not sign on
        let err = sign_on(&db_state, "9753", Role::Cashier).expect_err("override PIN on entry");
        assert!(matches!(err, EngineError::Authorization(_)));
        sign_on(&db_state, "2468", Role::Cashier).expect("entry PIN signs on");
    }
}
