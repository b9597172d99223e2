//! Active transaction state: the sale being rung up right now.
//!
//! Holds the ordered line items, the selection cursor the UI highlights,
//! and every mutation the sale grid supports. All edits validate before
//! touching state, so a rejected call leaves the sale exactly as it was.
//! `line_total` is recomputed inside every mutation; nothing outside this
//! module ever writes it.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::PriceOverrideGate;
use crate::catalog::Product;
use crate::error::{EngineError, Result};

// ---------------------------------------------------------------------------
// Line items
// ---------------------------------------------------------------------------

/// One row of the sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Merge identity: adding the same SKU again grows this row.
    pub sku: String,
    pub name: String,
    /// Unit price in cents.
    pub unit_price: i64,
    pub quantity: u32,
    /// Per-unit discount in cents, never negative, never above `unit_price`.
    pub discount_amount: i64,
    /// Always `(unit_price - discount_amount) * quantity`.
    pub line_total: i64,
}

impl LineItem {
    fn recompute_total(&mut self) {
        self.line_total = (self.unit_price - self.discount_amount) * i64::from(self.quantity);
    }
}

/// Partial update for one line. `None` fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinePatch {
    pub quantity: Option<u32>,
    /// New unit price in cents. Requires an unlocked price gate.
    pub unit_price: Option<i64>,
    /// New per-unit discount in cents.
    pub discount_amount: Option<i64>,
}

// ---------------------------------------------------------------------------
// Active transaction
// ---------------------------------------------------------------------------

/// The in-progress sale: ordered lines plus the selection cursor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActiveTransaction {
    items: Vec<LineItem>,
    selection: Option<usize>,
}

impl ActiveTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a sale from snapshot lines (hold recall). Totals are
    /// recomputed and the selection lands on the first line.
    pub fn from_items(mut items: Vec<LineItem>) -> Self {
        for line in &mut items {
            line.recompute_total();
        }
        let selection = if items.is_empty() { None } else { Some(0) };
        ActiveTransaction { items, selection }
    }

    pub fn lines(&self) -> &[LineItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sale total in cents.
    pub fn total(&self) -> i64 {
        self.items.iter().map(|l| l.line_total).sum()
    }

    pub fn selection(&self) -> Option<usize> {
        self.selection
    }

    /// The currently highlighted line, if any.
    pub fn selected_line(&self) -> Option<&LineItem> {
        self.selection.and_then(|i| self.items.get(i))
    }

    /// Move the selection cursor to an existing row.
    pub fn select(&mut self, index: usize) -> Result<()> {
        if index >= self.items.len() {
            return Err(EngineError::NotFound(format!(
                "no line at index {index} (sale has {} lines)",
                self.items.len()
            )));
        }
        self.selection = Some(index);
        Ok(())
    }

    /// Add a product to the sale, or grow the existing row for its SKU.
    ///
    /// A merge keeps the row's current unit price and discount and only
    /// raises the quantity. Returns the affected row index; the selection
    /// cursor follows it.
    pub fn add_or_merge(&mut self, product: &Product, quantity: u32) -> Result<usize> {
        if quantity == 0 {
            return Err(EngineError::Validation(
                "quantity must be positive".into(),
            ));
        }

        let index = match self.items.iter().position(|l| l.sku == product.sku) {
            Some(i) => {
                let line = &mut self.items[i];
                line.quantity += quantity;
                line.recompute_total();
                debug!(sku = %product.sku, quantity = line.quantity, "Merged into existing line");
                i
            }
            None => {
                let mut line = LineItem {
                    sku: product.sku.clone(),
                    name: product.name.clone(),
                    unit_price: product.unit_price,
                    quantity,
                    discount_amount: 0,
                    line_total: 0,
                };
                line.recompute_total();
                self.items.push(line);
                debug!(sku = %product.sku, quantity, "Added new line");
                self.items.len() - 1
            }
        };

        self.selection = Some(index);
        Ok(index)
    }

    /// Apply a validated patch to one line.
    ///
    /// All checks run against the patched candidate values before anything
    /// is written, so a failed update leaves the line untouched. A patch
    /// that carries `unit_price` counts as a price edit and requires the
    /// gate to be unlocked, even if the value equals the current price.
    pub fn update_line(
        &mut self,
        index: usize,
        patch: &LinePatch,
        gate: &PriceOverrideGate,
    ) -> Result<()> {
        let line = self.items.get(index).ok_or_else(|| {
            EngineError::NotFound(format!(
                "no line at index {index} (sale has {} lines)",
                self.items.len()
            ))
        })?;

        if patch.unit_price.is_some() && gate.is_locked() {
            return Err(EngineError::Authorization(
                "price edits require override authorization".into(),
            ));
        }

        let quantity = patch.quantity.unwrap_or(line.quantity);
        let unit_price = patch.unit_price.unwrap_or(line.unit_price);
        let discount_amount = patch.discount_amount.unwrap_or(line.discount_amount);

        if quantity == 0 {
            return Err(EngineError::Validation(
                "quantity must be positive; remove the line instead".into(),
            ));
        }
        if unit_price < 0 {
            return Err(EngineError::Validation(format!(
                "unit price must not be negative (got {unit_price})"
            )));
        }
        if discount_amount < 0 {
            return Err(EngineError::Validation(format!(
                "discount must not be negative (got {discount_amount})"
            )));
        }
        if discount_amount > unit_price {
            return Err(EngineError::Validation(format!(
                "discount {discount_amount} exceeds unit price {unit_price}"
            )));
        }

        let line = &mut self.items[index];
        line.quantity = quantity;
        line.unit_price = unit_price;
        line.discount_amount = discount_amount;
        line.recompute_total();
        debug!(sku = %line.sku, "Updated line");
        Ok(())
    }

    /// Delete a line and return it.
    ///
    /// If the deleted line was selected, the cursor moves to the line that
    /// slid into its index, or the new last line, or clears when the sale
    /// is now empty. Lines above the deletion keep their selection.
    pub fn remove_line(&mut self, index: usize) -> Result<LineItem> {
        if index >= self.items.len() {
            return Err(EngineError::NotFound(format!(
                "no line at index {index} (sale has {} lines)",
                self.items.len()
            )));
        }

        let removed = self.items.remove(index);

        self.selection = if self.items.is_empty() {
            None
        } else {
            match self.selection {
                Some(sel) if sel == index => Some(index.min(self.items.len() - 1)),
                Some(sel) if sel > index => Some(sel - 1),
                other => other,
            }
        };

        debug!(sku = %removed.sku, "Removed line");
        Ok(removed)
    }

    /// Drop every line and the selection. Irreversible.
    pub fn clear(&mut self) {
        self.items.clear();
        self.selection = None;
    }
}

// ===========================================================================
// Tests
// ===========================================================================
