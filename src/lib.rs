//! tillkit - an embeddable point-of-sale terminal engine.
//!
//! tillkit is the state machine behind a register screen. The host owns
//! rendering and raw input; the engine owns the sale:
//!
//! - line items with merge/edit/delete semantics and a selection cursor
//! - hold/recall for parking a sale while another customer is served
//! - keyboard-shortcut dispatch gated by one authoritative modal flag
//! - PIN-gated price overrides (bcrypt-hashed, scoped to one edit dialog)
//! - an append-only cash drawer ledger in SQLite
//!
//! [`TerminalController`] is the type hosts construct and drive, one per
//! signed-on register session. Product lookups go through the
//! [`ProductCatalog`] trait, the engine's only async boundary; everything
//! else is synchronous and in-memory except the settings store and the
//! drawer ledger, which persist through [`DbState`].
//!
//! ```no_run
//! use std::{path::Path, sync::Arc};
//! use tillkit::{auth, db, KeyOutcome, MemoryCatalog, Role, TerminalController};
//!
//! fn main() -> tillkit::Result<()> {
//!     let db = Arc::new(db::init(Path::new("/var/lib/tillkit"))?);
//!     let session = auth::sign_on(&db, "1234", Role::Cashier)?;
//!     let mut terminal = TerminalController::new(db, MemoryCatalog::new(), session);
//!
//!     if let KeyOutcome::Checkout(checkout) = terminal.handle_key("F9") {
//!         // hand off to the payment workflow
//!         println!("charge {} cents", checkout.total);
//!     }
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod catalog;
pub mod db;
pub mod diagnostics;
mod error;
pub mod holds;
pub mod keybinds;
pub mod ledger;
pub mod terminal;
pub mod transaction;

pub use auth::{PriceOverrideGate, Role, SessionContext};
pub use catalog::{MemoryCatalog, Product, ProductCatalog};
pub use db::DbState;
pub use error::{EngineError, Result};
pub use holds::{HeldTransaction, HoldRegistry};
pub use keybinds::{KeybindDispatcher, KeybindMap, TerminalAction};
pub use ledger::{CashDrawerEntry, DrawerEntryType, SessionTotals};
pub use terminal::{
    CatalogLookup, Checkout, Dialog, KeyOutcome, SearchOutcome, TerminalController,
};
pub use transaction::{ActiveTransaction, LineItem, LinePatch};
