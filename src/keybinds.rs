//! Keyboard shortcut map and dispatcher.
//!
//! Every terminal action reachable from the keyboard goes through one
//! [`KeybindMap`]. Key labels are host-defined strings ("F2", "F11")
//! compared ASCII case-insensitively. The map persists as JSON in the
//! `local_settings` table; a missing or corrupt row falls back to the
//! factory defaults so the terminal always has working keys.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::db::{self, DbState};
use crate::error::{EngineError, Result};

const SETTINGS_CATEGORY: &str = "keybinds";
const SETTINGS_KEY: &str = "map";

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Everything a shortcut key can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminalAction {
    /// Park the active sale (opens the hold prompt).
    Hold,
    /// Open the held-transactions list.
    Recall,
    /// Open the cashier menu (drawer entries, keybind settings).
    CashierMenu,
    /// Clear the active sale.
    Clear,
    /// Edit the selected line.
    Edit,
    /// Delete the selected line.
    Delete,
    /// Start checkout.
    Pay,
    /// Lock the terminal.
    Lock,
}

impl TerminalAction {
    pub const ALL: [TerminalAction; 8] = [
        TerminalAction::Hold,
        TerminalAction::Recall,
        TerminalAction::CashierMenu,
        TerminalAction::Clear,
        TerminalAction::Edit,
        TerminalAction::Delete,
        TerminalAction::Pay,
        TerminalAction::Lock,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TerminalAction::Hold => "hold",
            TerminalAction::Recall => "recall",
            TerminalAction::CashierMenu => "cashier-menu",
            TerminalAction::Clear => "clear",
            TerminalAction::Edit => "edit",
            TerminalAction::Delete => "delete",
            TerminalAction::Pay => "pay",
            TerminalAction::Lock => "lock",
        }
    }
}

// ---------------------------------------------------------------------------
// Keybind map
// ---------------------------------------------------------------------------

/// Action-to-key assignments, persisted as a JSON object keyed by action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeybindMap {
    bindings: HashMap<TerminalAction, String>,
}

impl Default for KeybindMap {
    fn default() -> Self {
        let mut map = KeybindMap {
            bindings: HashMap::new(),
        };
        for (action, key) in [
            (TerminalAction::Hold, "F2"),
            (TerminalAction::Recall, "F3"),
            (TerminalAction::Clear, "F4"),
            (TerminalAction::Lock, "F5"),
            (TerminalAction::Edit, "F7"),
            (TerminalAction::Delete, "F8"),
            (TerminalAction::Pay, "F9"),
            (TerminalAction::CashierMenu, "F11"),
        ] {
            map.bindings.insert(action, key.to_string());
        }
        map
    }
}

impl KeybindMap {
    /// Assign `key` to `action`, last write wins.
    ///
    /// If another action currently holds the key it is left unbound and
    /// returned, so the settings dialog can flag the collision.
    pub fn bind(&mut self, action: TerminalAction, key: &str) -> Option<TerminalAction> {
        let key = key.trim();

        let displaced = self
            .bindings
            .iter()
            .find(|&(a, k)| *a != action && k.eq_ignore_ascii_case(key))
            .map(|(a, _)| *a);

        if let Some(old) = displaced {
            self.bindings.remove(&old);
            warn!(
                action = old.as_str(),
                key, "Keybind displaced, action left unbound"
            );
        }

        self.bindings.insert(action, key.to_string());
        displaced
    }

    /// The key assigned to an action, if any.
    pub fn key_for(&self, action: TerminalAction) -> Option<&str> {
        self.bindings.get(&action).map(String::as_str)
    }

    /// The action a key triggers (ASCII case-insensitive), if bound.
    pub fn action_for(&self, key: &str) -> Option<TerminalAction> {
        self.bindings
            .iter()
            .find(|&(_, k)| k.eq_ignore_ascii_case(key))
            .map(|(a, _)| *a)
    }

    /// Load the persisted map, falling back to defaults on a missing row,
    /// corrupt JSON, or storage trouble. The terminal must never come up
    /// without working keys.
    pub fn load(db: &DbState) -> KeybindMap {
        let conn = match db.conn.lock() {
            Ok(c) => c,
            Err(e) => {
                error!("keybind settings lock failed: {e}");
                return KeybindMap::default();
            }
        };

        match db::get_setting(&conn, SETTINGS_CATEGORY, SETTINGS_KEY) {
            Some(json) => match serde_json::from_str::<KeybindMap>(&json) {
                Ok(map) => map,
                Err(e) => {
                    warn!("stored keybind map is corrupt ({e}), using defaults");
                    KeybindMap::default()
                }
            },
            None => KeybindMap::default(),
        }
    }

    /// Persist the map as JSON in `local_settings`.
    pub fn save(&self, db: &DbState) -> Result<()> {
        let json = serde_json::to_string(self)
            .map_err(|e| EngineError::storage("encode keybind map", e))?;
        let conn = db
            .conn
            .lock()
            .map_err(|e| EngineError::storage("settings lock", e))?;
        db::set_setting(&conn, SETTINGS_CATEGORY, SETTINGS_KEY, &json)?;
        info!("Keybind map saved");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Resolves raw key labels to actions, gated by one modal-context flag.
///
/// While any dialog or the lock screen is up, every shortcut is inert and
/// keys flow to the dialog's own input handling. There is no per-dialog
/// nuance; one flag covers all modal surfaces.
#[derive(Debug)]
pub struct KeybindDispatcher {
    map: KeybindMap,
    modal_open: bool,
}

impl KeybindDispatcher {
    pub fn new(map: KeybindMap) -> Self {
        KeybindDispatcher {
            map,
            modal_open: false,
        }
    }

    pub fn map(&self) -> &KeybindMap {
        &self.map
    }

    /// Swap in an edited map. Takes effect for the next key event.
    pub fn install(&mut self, map: KeybindMap) {
        self.map = map;
    }

    pub fn set_modal_open(&mut self, open: bool) {
        self.modal_open = open;
    }

    pub fn modal_open(&self) -> bool {
        self.modal_open
    }

    /// Resolve a key event. `None` when the key is unbound or a modal
    /// context is open.
    pub fn dispatch(&self, key: &str) -> Option<TerminalAction> {
        if self.modal_open {
            return None;
        }
        self.map.action_for(key)
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

    #[test]
    fn test_default_bindings() {
        let map = KeybindMap::default();
        assert_eq!(map.action_for("F2"), Some(TerminalAction::Hold));
        assert_eq!(map.action_for("F3"), Some(TerminalAction::Recall));
        assert_eq!(map.action_for("F4"), Some(TerminalAction::Clear));
        assert_eq!(map.action_for("F5"), Some(TerminalAction::Lock));
        assert_eq!(map.action_for("F7"), Some(TerminalAction::Edit));
        assert_eq!(map.action_for("F8"), Some(TerminalAction::Delete));
        assert_eq!(map.action_for("F9"), Some(TerminalAction::Pay));
        assert_eq!(map.action_for("F11"), Some(TerminalAction::CashierMenu));

        // Every action has a key out of the box
        for action in TerminalAction::ALL {
            assert!(map.key_for(action).is_some(), "{action:?} unbound");
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let map = KeybindMap::default();
        assert_eq!(map.action_for("f2"), Some(TerminalAction::Hold));
        assert_eq!(map.action_for("f11"), Some(TerminalAction::CashierMenu));
        assert_eq!(map.action_for("Enter"), None);
    }

    #[test]
    fn test_bind_collision_is_last_write_wins() {
        let mut map = KeybindMap::default();

        let displaced = map.bind(TerminalAction::Recall, "F2");
        assert_eq!(displaced, Some(TerminalAction::Hold));
        assert_eq!(map.action_for("F2"), Some(TerminalAction::Recall));
        assert_eq!(map.key_for(TerminalAction::Hold), None, "loser is unbound");
    }

    #[test]
    fn test_rebind_releases_old_key() {
        let mut map = KeybindMap::default();

        let displaced = map.bind(TerminalAction::Hold, "F6");
        assert_eq!(displaced, None);
        assert_eq!(map.key_for(TerminalAction::Hold), Some("F6"));
        assert_eq!(map.action_for("F2"), None, "old key is released");
    }

    #[test]
    fn test_dispatcher_modal_flag_gates_everything() {
        let mut dispatcher = KeybindDispatcher::new(KeybindMap::default());

        assert_eq!(dispatcher.dispatch("F2"), Some(TerminalAction::Hold));

        dispatcher.set_modal_open(true);
        assert_eq!(dispatcher.dispatch("F2"), None);
        assert_eq!(dispatcher.dispatch("F9"), None);

        dispatcher.set_modal_open(false);
        assert_eq!(dispatcher.dispatch("F9"), Some(TerminalAction::Pay));
    }

    #[test]
    fn test_install_swaps_map() {
        let mut dispatcher = KeybindDispatcher::new(KeybindMap::default());

        let mut edited = dispatcher.map().clone();
        edited.bind(TerminalAction::Pay, "F12");
        dispatcher.install(edited);

        assert_eq!(dispatcher.dispatch("F12"), Some(TerminalAction::Pay));
        assert_eq!(dispatcher.dispatch("F9"), None);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let db_state = test_db_state();

        let mut map = KeybindMap::default();
        map.bind(TerminalAction::Hold, "F6");
        map.save(&db_state).expect("save");

        let loaded = KeybindMap::load(&db_state);
        assert_eq!(loaded, map);
    }

    #[test]
    fn test_load_falls_back_to_defaults() {
        let db_state = test_db_state();

        // No row yet
        assert_eq!(KeybindMap::load(&db_state), KeybindMap::default());

        // Corrupt row
        {
            let conn = db_state.conn.lock().expect("db lock");
            db::set_setting(&conn, SETTINGS_CATEGORY, SETTINGS_KEY, "not json")
                .expect("store garbage");
        }
        assert_eq!(KeybindMap::load(&db_state), KeybindMap::default());
    }
}
