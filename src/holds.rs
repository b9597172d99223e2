//! Hold/recall registry: parked sales waiting for their customer.
//!
//! A hold snapshots the active transaction and clears it so the next
//! customer can be served. Recall is move-not-copy: the snapshot leaves
//! the registry the moment it is handed back, so a sale can never be
//! resumed on two lanes at once. Holds live in memory only and do not
//! survive an engine restart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EngineError, Result};
use crate::transaction::{ActiveTransaction, LineItem};

/// A parked sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeldTransaction {
    /// Millisecond-clock id, strictly increasing within one registry.
    pub id: i64,
    pub items: Vec<LineItem>,
    /// Optional label typed at hold time ("blue jacket", a name, a table).
    pub customer_label: Option<String>,
    /// Sale total in cents at the moment of the hold.
    pub total: i64,
    pub held_at: DateTime<Utc>,
}

impl HeldTransaction {
    /// Name of the first line, the fallback label in the held list.
    pub fn first_item_name(&self) -> &str {
        self.items.first().map(|l| l.name.as_str()).unwrap_or("")
    }
}

/// In-memory store of held transactions, insertion-ordered.
#[derive(Debug, Default)]
pub struct HoldRegistry {
    held: Vec<HeldTransaction>,
    last_id: i64,
}

impl HoldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Millisecond timestamps collide when two holds land in the same
    /// tick, so the id is bumped past the previous one when needed.
    fn next_id(&mut self) -> i64 {
        let mut id = Utc::now().timestamp_millis();
        if id <= self.last_id {
            id = self.last_id + 1;
        }
        self.last_id = id;
        id
    }

    /// Park the active sale and clear it. Fails on an empty sale, in
    /// which case neither the registry nor the sale changes.
    pub fn hold(
        &mut self,
        txn: &mut ActiveTransaction,
        customer_label: Option<&str>,
    ) -> Result<i64> {
        if txn.is_empty() {
            return Err(EngineError::EmptyTransaction);
        }

        let id = self.next_id();
        let entry = HeldTransaction {
            id,
            items: txn.lines().to_vec(),
            customer_label: customer_label
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            total: txn.total(),
            held_at: Utc::now(),
        };

        info!(hold_id = id, lines = entry.items.len(), total = entry.total, "Sale held");
        self.held.push(entry);
        txn.clear();
        Ok(id)
    }

    /// Take a held sale out of the registry. The entry is gone after
    /// this returns; a second recall of the same id is `NotFound`.
    pub fn recall(&mut self, id: i64) -> Result<HeldTransaction> {
        let pos = self
            .held
            .iter()
            .position(|h| h.id == id)
            .ok_or_else(|| EngineError::NotFound(format!("no held sale with id {id}")))?;

        let held = self.held.remove(pos);
        info!(hold_id = id, "Sale recalled");
        Ok(held)
    }

    /// Filtered view over held sales: case-insensitive substring match on
    /// the customer label or the first item's name. An empty query matches
    /// everything. Each call returns a fresh iterator, so the view can be
    /// restarted as the operator types.
    pub fn search<'a>(&'a self, query: &str) -> impl Iterator<Item = &'a HeldTransaction> + 'a {
        let needle = query.trim().to_lowercase();
        self.held.iter().filter(move |h| {
            h.customer_label
                .as_deref()
                .is_some_and(|l| l.to_lowercase().contains(&needle))
                || h.first_item_name().to_lowercase().contains(&needle)
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeldTransaction> {
        self.held.iter()
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Product;

    fn sale_with(skus: &[(&str, &str, i64)]) -> ActiveTransaction {
        let mut txn = ActiveTransaction::new();
        for (sku, name, price) in skus {
            let p = Product::new(sku, name, *price, None).expect("valid product");
            txn.add_or_merge(&p, 1).expect("add");
        }
        txn
    }

    #[test]
    fn test_hold_empty_sale_rejected() {
        let mut registry = HoldRegistry::new();
        let mut txn = ActiveTransaction::new();

        let err = registry.hold(&mut txn, None).expect_err("empty sale");
        assert!(matches!(err, EngineError::EmptyTransaction));
        assert!(registry.is_empty(), "failed hold must not park anything");
    }

    #[test]
    fn test_hold_then_recall_round_trip() {
        let mut registry = HoldRegistry::new();
        let mut txn = sale_with(&[("SKU-A", "Apple", 120), ("SKU-B", "Bread", 250)]);
        let original_lines = txn.lines().to_vec();
        let original_total = txn.total();

        let id = registry.hold(&mut txn, Some("blue jacket")).expect("hold");
        assert!(txn.is_empty(), "hold clears the active sale");
        assert_eq!(registry.len(), 1);

        let held = registry.recall(id).expect("recall");
        assert_eq!(held.items, original_lines);
        assert_eq!(held.total, original_total);
        assert_eq!(held.customer_label.as_deref(), Some("blue jacket"));
        assert!(registry.is_empty(), "recall removes the snapshot");

        // Move-not-copy: the same id cannot be recalled twice
        let err = registry.recall(id).expect_err("second recall");
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn test_ids_strictly_increase() {
        let mut registry = HoldRegistry::new();

        let mut ids = Vec::new();
        for _ in 0..5 {
            let mut txn = sale_with(&[("SKU-A", "Apple", 120)]);
            ids.push(registry.hold(&mut txn, None).expect("hold"));
        }

        for pair in ids.windows(2) {
            assert!(pair[1] > pair[0], "ids must strictly increase: {ids:?}");
        }
    }

    #[test]
    fn test_blank_label_stored_as_none() {
        let mut registry = HoldRegistry::new();
        let mut txn = sale_with(&[("SKU-A", "Apple", 120)]);

        let id = registry.hold(&mut txn, Some("   ")).expect("hold");
        let held = registry.recall(id).expect("recall");
        assert_eq!(held.customer_label, None);
    }

    #[test]
    fn test_search_by_label_and_first_item() {
        let mut registry = HoldRegistry::new();

        let mut a = sale_with(&[("SKU-A", "Apple", 120)]);
        registry.hold(&mut a, Some("Maria")).expect("hold");

        let mut b = sale_with(&[("SKU-B", "Bread", 250)]);
        registry.hold(&mut b, None).expect("hold");

        let by_label: Vec<_> = registry.search("maria").collect();
        assert_eq!(by_label.len(), 1);
        assert_eq!(by_label[0].customer_label.as_deref(), Some("Maria"));

        let by_item: Vec<_> = registry.search("BREAD").collect();
        assert_eq!(by_item.len(), 1);
        assert_eq!(by_item[0].first_item_name(), "Bread");

        // Empty query lists everything, and the view restarts per call
        assert_eq!(registry.search("").count(), 2);
        assert_eq!(registry.search("").count(), 2);

        assert_eq!(registry.search("nobody").count(), 0);
    }
}
