//! Terminal controller: the state machine behind the register screen.
//!
//! One controller exists per signed-on session. It owns the active sale,
//! the hold registry, the keybind dispatcher, and the price override gate,
//! and it is the only place dialog and lock state change. The host owns
//! rendering and raw input: it forwards key labels to [`handle_key`],
//! renders whatever [`dialog`] says, and drives dialog confirm/cancel
//! through the methods here.
//!
//! [`handle_key`]: TerminalController::handle_key
//! [`dialog`]: TerminalController::dialog

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::{self, PriceOverrideGate, SessionContext};
use crate::catalog::{Product, ProductCatalog};
use crate::db::DbState;
use crate::error::{EngineError, Result};
use crate::holds::{HeldTransaction, HoldRegistry};
use crate::keybinds::{KeybindDispatcher, KeybindMap, TerminalAction};
use crate::ledger::{self, CashDrawerEntry, DrawerEntryType, SessionTotals};
use crate::transaction::{ActiveTransaction, LineItem, LinePatch};

// ---------------------------------------------------------------------------
// Host-facing types
// ---------------------------------------------------------------------------

/// The modal surface currently on screen, if any.
///
/// At most one dialog is open at a time; opening another replaces it.
/// While a dialog is up (or the terminal is locked) the dispatcher treats
/// every shortcut as inert, so a key typed into a prompt never fires an
/// action underneath it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dialog {
    /// Customer-label prompt shown before parking the sale.
    HoldPrompt,
    /// Browsable list of held sales.
    HeldList,
    /// Candidate picker for a fuzzy catalog search. Never empty.
    FuzzySearch { candidates: Vec<Product> },
    /// Quantity/price/discount editor for one line.
    LineEdit { index: usize },
    /// Drawer entries and terminal settings.
    CashierMenu,
    /// Shortcut rebinding editor, backed by a draft of the live map.
    KeybindSettings,
}

/// What a raw key event amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Key is unbound or a modal context is open. The host lets the event
    /// reach normal input handling.
    PassThrough,
    /// A bound action ran. The host suppresses the key's default behavior.
    Handled(TerminalAction),
    /// A bound action fired but was refused (hold on an empty sale, edit
    /// with nothing selected). The key is still consumed; the host shows
    /// the error.
    Refused {
        action: TerminalAction,
        error: EngineError,
    },
    /// The pay key produced a checkout handoff for the payment workflow.
    Checkout(Checkout),
}

/// Finalized handoff for the external payment and receipt workflow.
///
/// The sale itself stays on the terminal until the host's payment flow
/// completes and calls [`TerminalController::clear_sale`]; abandoning the
/// checkout costs nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Checkout {
    pub checkout_id: String,
    /// Session that rang the sale, for the host's audit trail.
    pub session_id: String,
    pub items: Vec<LineItem>,
    /// Sale total in cents.
    pub total: i64,
}

/// A resolved catalog lookup, ready to apply to whatever sale is active.
///
/// Lookup and application are deliberately split: the async lookup may
/// resolve after the sale it was typed into was held or cleared, and the
/// result then lands on the current sale. Last writer wins; there is no
/// cancellation bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogLookup {
    /// Exact SKU or barcode hit.
    Exact(Product),
    /// Fuzzy candidates for the picker dialog. Never empty.
    Candidates(Vec<Product>),
    /// Nothing in the catalog matched.
    Miss { query: String },
}

/// How a search submission landed in the sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Exact match added or merged at this row.
    Added { index: usize },
    /// Candidates opened in the fuzzy-search dialog.
    PickerOpened { candidates: usize },
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// The register-session engine. Generic over the host's product catalog,
/// the only async boundary in the crate.
pub struct TerminalController<C: ProductCatalog> {
    db: Arc<DbState>,
    catalog: C,
    session: SessionContext,
    txn: ActiveTransaction,
    holds: HoldRegistry,
    dispatcher: KeybindDispatcher,
    gate: PriceOverrideGate,
    dialog: Option<Dialog>,
    /// Working copy edited by the keybind settings dialog. `Some` only
    /// while that dialog is open.
    draft_keybinds: Option<KeybindMap>,
    locked: bool,
}

impl<C: ProductCatalog> TerminalController<C> {
    /// Build a controller for a signed-on session. Keybinds come from the
    /// settings store (factory defaults when unset); the price gate starts
    /// in the role's initial state.
    pub fn new(db: Arc<DbState>, catalog: C, session: SessionContext) -> Self {
        let dispatcher = KeybindDispatcher::new(KeybindMap::load(&db));
        let gate = PriceOverrideGate::for_role(session.role);
        info!(
            session_id = %session.session_id,
            role = session.role.as_str(),
            "Terminal ready"
        );
        TerminalController {
            db,
            catalog,
            session,
            txn: ActiveTransaction::new(),
            holds: HoldRegistry::new(),
            dispatcher,
            gate,
            dialog: None,
            draft_keybinds: None,
            locked: false,
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Lines of the active sale, in insertion order.
    pub fn lines(&self) -> &[LineItem] {
        self.txn.lines()
    }

    /// Sale total in cents.
    pub fn total(&self) -> i64 {
        self.txn.total()
    }

    pub fn selection(&self) -> Option<usize> {
        self.txn.selection()
    }

    pub fn selected_line(&self) -> Option<&LineItem> {
        self.txn.selected_line()
    }

    pub fn dialog(&self) -> Option<&Dialog> {
        self.dialog.as_ref()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// The live shortcut map (not the settings-dialog draft).
    pub fn keybinds(&self) -> &KeybindMap {
        self.dispatcher.map()
    }

    pub fn price_gate_locked(&self) -> bool {
        self.gate.is_locked()
    }

    // -- modal state -------------------------------------------------------

    /// One authoritative modal flag: any dialog, or the lock screen.
    fn sync_modal_flag(&mut self) {
        self.dispatcher
            .set_modal_open(self.dialog.is_some() || self.locked);
    }

    fn open_dialog(&mut self, dialog: Dialog) {
        debug!(?dialog, "Dialog opened");
        self.draft_keybinds = None;
        self.dialog = Some(dialog);
        self.sync_modal_flag();
    }

    /// Close the open dialog, discarding any unsaved keybind draft. A
    /// no-op when nothing is open.
    pub fn close_dialog(&mut self) {
        if self.dialog.take().is_some() {
            self.draft_keybinds = None;
            self.sync_modal_flag();
        }
    }

    // -- key dispatch ------------------------------------------------------

    /// Feed one raw key event through the dispatcher and run whatever it
    /// resolves to.
    ///
    /// A refusal still consumes the key: the action fired and the engine
    /// said no, which is different from the key not being bound at all.
    pub fn handle_key(&mut self, key: &str) -> KeyOutcome {
        let Some(action) = self.dispatcher.dispatch(key) else {
            return KeyOutcome::PassThrough;
        };
        debug!(key, action = action.as_str(), "Shortcut dispatched");

        let result: Result<Option<Checkout>> = match action {
            TerminalAction::Hold => self.open_hold_prompt().map(|()| None),
            TerminalAction::Recall => {
                self.open_held_list();
                Ok(None)
            }
            TerminalAction::CashierMenu => {
                self.open_cashier_menu();
                Ok(None)
            }
            TerminalAction::Clear => {
                self.clear_sale();
                Ok(None)
            }
            TerminalAction::Edit => self
                .selected_index()
                .and_then(|index| self.begin_line_edit(index))
                .map(|()| None),
            TerminalAction::Delete => self
                .selected_index()
                .and_then(|index| self.remove_line(index))
                .map(|_| None),
            TerminalAction::Pay => self.pay(),
            TerminalAction::Lock => {
                self.lock();
                Ok(None)
            }
        };

        match result {
            Ok(Some(checkout)) => KeyOutcome::Checkout(checkout),
            Ok(None) => KeyOutcome::Handled(action),
            Err(error) => {
                warn!(action = action.as_str(), %error, "Shortcut refused");
                KeyOutcome::Refused { action, error }
            }
        }
    }

    fn selected_index(&self) -> Result<usize> {
        self.txn
            .selection()
            .ok_or_else(|| EngineError::NotFound("no line selected".into()))
    }

    // -- catalog search ----------------------------------------------------

    /// Resolve a search-box submission against the catalog: exact SKU or
    /// barcode first, fuzzy fallback on miss.
    ///
    /// Non-mutating. Pair with [`apply_lookup`] (or use [`submit_search`])
    /// so a lookup that resolves late still lands on whatever sale is
    /// active by then.
    ///
    /// [`apply_lookup`]: TerminalController::apply_lookup
    /// [`submit_search`]: TerminalController::submit_search
    pub async fn lookup(&self, query: &str) -> CatalogLookup {
        let query = query.trim();
        if let Some(product) = self.catalog.find(query).await {
            return CatalogLookup::Exact(product);
        }
        let candidates = self.catalog.search(query).await;
        if candidates.is_empty() {
            CatalogLookup::Miss {
                query: query.to_string(),
            }
        } else {
            CatalogLookup::Candidates(candidates)
        }
    }

    /// Apply a resolved lookup to the current sale. An exact hit adds one
    /// unit (merging into an existing row for the SKU); candidates open
    /// the picker dialog; a miss is `NotFound` and opens nothing.
    pub fn apply_lookup(&mut self, lookup: CatalogLookup) -> Result<SearchOutcome> {
        match lookup {
            CatalogLookup::Exact(product) => {
                let index = self.txn.add_or_merge(&product, 1)?;
                Ok(SearchOutcome::Added { index })
            }
            CatalogLookup::Candidates(candidates) => {
                let count = candidates.len();
                self.open_dialog(Dialog::FuzzySearch { candidates });
                Ok(SearchOutcome::PickerOpened { candidates: count })
            }
            CatalogLookup::Miss { query } => Err(EngineError::NotFound(format!(
                "no product matching \"{query}\""
            ))),
        }
    }

    /// Search-box submit: [`lookup`] immediately followed by
    /// [`apply_lookup`].
    ///
    /// [`lookup`]: TerminalController::lookup
    /// [`apply_lookup`]: TerminalController::apply_lookup
    pub async fn submit_search(&mut self, query: &str) -> Result<SearchOutcome> {
        let lookup = self.lookup(query).await;
        self.apply_lookup(lookup)
    }

    /// Take a row from the open fuzzy-search dialog into the sale. Closes
    /// the dialog on success and returns the affected row index.
    pub fn pick_candidate(&mut self, choice: usize) -> Result<usize> {
        let Some(Dialog::FuzzySearch { candidates }) = &self.dialog else {
            return Err(EngineError::Validation(
                "no fuzzy-search dialog open".into(),
            ));
        };
        let product = candidates.get(choice).cloned().ok_or_else(|| {
            EngineError::NotFound(format!(
                "no candidate at index {choice} ({} candidates)",
                candidates.len()
            ))
        })?;

        let index = self.txn.add_or_merge(&product, 1)?;
        self.close_dialog();
        Ok(index)
    }

    // -- line commands -----------------------------------------------------

    /// Move the selection cursor (row click or arrow handling in the host).
    pub fn select_line(&mut self, index: usize) -> Result<()> {
        self.txn.select(index)
    }

    /// Open the line editor for a row, selecting it.
    ///
    /// Re-locks the price gate for non-privileged roles: each edit dialog
    /// is its own authorization scope, whatever happened before it.
    pub fn begin_line_edit(&mut self, index: usize) -> Result<()> {
        self.txn.select(index)?;
        self.gate.relock(self.session.role);
        self.open_dialog(Dialog::LineEdit { index });
        Ok(())
    }

    /// Present the override PIN for the open line editor. A failed attempt
    /// leaves the gate locked; the dialog re-prompts.
    pub fn authorize_price_edit(&mut self, pin: &str) -> Result<()> {
        if !matches!(self.dialog, Some(Dialog::LineEdit { .. })) {
            return Err(EngineError::Validation("no line edit in progress".into()));
        }
        self.gate.authorize(&self.db, pin)
    }

    /// Apply the editor's patch to its line. Success closes the editor; a
    /// refusal leaves it open with the line untouched so the operator can
    /// correct the input or authorize.
    pub fn apply_line_edit(&mut self, patch: &LinePatch) -> Result<()> {
        let Some(Dialog::LineEdit { index }) = self.dialog else {
            return Err(EngineError::Validation("no line edit in progress".into()));
        };
        self.txn.update_line(index, patch, &self.gate)?;
        self.close_dialog();
        Ok(())
    }

    /// Delete a line outright (delete shortcut or a row button).
    pub fn remove_line(&mut self, index: usize) -> Result<LineItem> {
        self.txn.remove_line(index)
    }

    /// Throw away the active sale. Irreversible; hold it instead to keep
    /// it. Clearing an empty sale is a no-op.
    pub fn clear_sale(&mut self) {
        if !self.txn.is_empty() {
            info!(
                lines = self.txn.len(),
                total = self.txn.total(),
                "Sale cleared"
            );
        }
        self.txn.clear();
    }

    // -- hold / recall -----------------------------------------------------

    /// Open the hold prompt. Refused on an empty sale, with no dialog.
    pub fn open_hold_prompt(&mut self) -> Result<()> {
        if self.txn.is_empty() {
            return Err(EngineError::EmptyTransaction);
        }
        self.open_dialog(Dialog::HoldPrompt);
        Ok(())
    }

    /// Park the active sale under an optional customer label and start a
    /// fresh one. Closes the hold prompt when it was open.
    pub fn hold(&mut self, customer_label: Option<&str>) -> Result<i64> {
        let id = self.holds.hold(&mut self.txn, customer_label)?;
        if matches!(self.dialog, Some(Dialog::HoldPrompt)) {
            self.close_dialog();
        }
        Ok(id)
    }

    /// Open the held-sales list.
    pub fn open_held_list(&mut self) {
        self.open_dialog(Dialog::HeldList);
    }

    /// Swap a held sale in as the active transaction, selecting its first
    /// line. Replaces whatever sale was active; hold that one first to
    /// keep it. Closes the held list when it was open.
    pub fn recall(&mut self, id: i64) -> Result<()> {
        let held = self.holds.recall(id)?;
        self.txn = ActiveTransaction::from_items(held.items);
        if matches!(self.dialog, Some(Dialog::HeldList)) {
            self.close_dialog();
        }
        Ok(())
    }

    /// Live filter for the held list as the operator types.
    pub fn holds_matching<'a>(
        &'a self,
        query: &str,
    ) -> impl Iterator<Item = &'a HeldTransaction> + 'a {
        self.holds.search(query)
    }

    /// All held sales, oldest first.
    pub fn held_sales(&self) -> impl Iterator<Item = &HeldTransaction> {
        self.holds.iter()
    }

    pub fn held_count(&self) -> usize {
        self.holds.len()
    }

    // -- cashier menu / drawer ---------------------------------------------

    pub fn open_cashier_menu(&mut self) {
        self.open_dialog(Dialog::CashierMenu);
    }

    /// Record a non-sale cash movement against this session.
    pub fn record_drawer_entry(
        &self,
        entry_type: DrawerEntryType,
        amount: i64,
        description: &str,
    ) -> Result<CashDrawerEntry> {
        ledger::record(
            &self.db,
            &self.session.session_id,
            entry_type,
            amount,
            description,
        )
    }

    /// This session's drawer movements, in insertion order.
    pub fn drawer_entries(&self) -> Result<Vec<CashDrawerEntry>> {
        ledger::entries_for_session(&self.db, &self.session.session_id)
    }

    /// Drawer reconciliation totals for this session.
    pub fn drawer_totals(&self) -> Result<SessionTotals> {
        ledger::session_totals(&self.db, &self.session.session_id)
    }

    // -- keybind settings --------------------------------------------------

    /// Open the shortcut editor over a working copy of the live map.
    pub fn open_keybind_settings(&mut self) {
        self.open_dialog(Dialog::KeybindSettings);
        self.draft_keybinds = Some(self.dispatcher.map().clone());
    }

    /// The settings dialog's working copy, while it is open.
    pub fn draft_keybinds(&self) -> Option<&KeybindMap> {
        self.draft_keybinds.as_ref()
    }

    /// Capture a key for an action in the working copy. Live bindings stay
    /// untouched until [`save_keybinds`]. Returns the action the key was
    /// taken from, if the capture displaced one.
    ///
    /// [`save_keybinds`]: TerminalController::save_keybinds
    pub fn rebind_draft(&mut self, action: TerminalAction, key: &str) -> Result<Option<TerminalAction>> {
        let draft = self
            .draft_keybinds
            .as_mut()
            .ok_or_else(|| EngineError::Validation("keybind settings not open".into()))?;
        Ok(draft.bind(action, key))
    }

    /// Persist the working copy and swap it in atomically. On a storage
    /// failure nothing is installed and the dialog stays open for a retry.
    pub fn save_keybinds(&mut self) -> Result<()> {
        let draft = self
            .draft_keybinds
            .clone()
            .ok_or_else(|| EngineError::Validation("keybind settings not open".into()))?;
        draft.save(&self.db)?;
        self.dispatcher.install(draft);
        self.close_dialog();
        Ok(())
    }

    // -- checkout ----------------------------------------------------------

    /// Hand the sale to the external payment workflow.
    ///
    /// A zero total is a no-op (`Ok(None)`), not an error. The sale stays
    /// active until the host's flow completes and calls [`clear_sale`], so
    /// a cancelled payment loses nothing.
    ///
    /// [`clear_sale`]: TerminalController::clear_sale
    pub fn pay(&self) -> Result<Option<Checkout>> {
        let total = self.txn.total();
        if total == 0 {
            return Ok(None);
        }

        let checkout = Checkout {
            checkout_id: Uuid::new_v4().to_string(),
            session_id: self.session.session_id.clone(),
            items: self.txn.lines().to_vec(),
            total,
        };
        info!(
            checkout_id = %checkout.checkout_id,
            lines = checkout.items.len(),
            total,
            "Checkout handed off"
        );
        Ok(Some(checkout))
    }

    // -- lock screen -------------------------------------------------------

    /// Raise the lock screen. Any open dialog closes first; every shortcut
    /// is inert until [`unlock`].
    ///
    /// [`unlock`]: TerminalController::unlock
    pub fn lock(&mut self) {
        self.close_dialog();
        if !self.locked {
            info!(session_id = %self.session.session_id, "Terminal locked");
        }
        self.locked = true;
        self.sync_modal_flag();
    }

    /// Verify the entry PIN and drop the lock screen.
    pub fn unlock(&mut self, pin: &str) -> Result<()> {
        auth::verify_entry_pin(&self.db, pin)?;
        self.locked = false;
        self.sync_modal_flag();
        info!(session_id = %self.session.session_id, "Terminal unlocked");
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
