//! Product catalog abstraction for the terminal.
//!
//! The engine never talks to a product database directly. Hosts supply a
//! [`ProductCatalog`] implementation (REST client, local cache, anything
//! async) and the controller resolves search-box submissions through it.
//! [`MemoryCatalog`] is the in-process implementation used by kiosk builds
//! and tests.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

// ---------------------------------------------------------------------------
// Product
// ---------------------------------------------------------------------------

/// A sellable product as the catalog reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Stock-keeping unit, the merge identity for sale lines.
    pub sku: String,
    /// Display name shown on the sale grid and receipts.
    pub name: String,
    /// Unit price in cents.
    pub unit_price: i64,
    /// Scannable barcode, when the product has one.
    pub barcode: Option<String>,
}

impl Product {
    /// Build a validated product. Rejects blank SKU or name and negative
    /// prices so bad catalog rows never reach the sale.
    pub fn new(sku: &str, name: &str, unit_price: i64, barcode: Option<&str>) -> Result<Self> {
        let sku = sku.trim();
        if sku.is_empty() {
            return Err(EngineError::Validation("product SKU must not be blank".into()));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::Validation(
                "product name must not be blank".into(),
            ));
        }
        if unit_price < 0 {
            return Err(EngineError::Validation(format!(
                "product unit price must not be negative (got {unit_price})"
            )));
        }
        Ok(Product {
            sku: sku.to_string(),
            name: name.to_string(),
            unit_price,
            barcode: barcode.map(|b| b.trim().to_string()).filter(|b| !b.is_empty()),
        })
    }

    /// True when `key` matches this product's SKU or barcode exactly
    /// (ASCII case-insensitive).
    pub fn matches_key(&self, key: &str) -> bool {
        if self.sku.eq_ignore_ascii_case(key) {
            return true;
        }
        matches!(&self.barcode, Some(b) if b.eq_ignore_ascii_case(key))
    }
}

// ---------------------------------------------------------------------------
// Catalog trait
// ---------------------------------------------------------------------------

/// Async product lookup service.
///
/// `find` resolves an exact SKU or barcode; `search` is the fuzzy fallback
/// behind the candidate picker. Both are async because real catalogs sit
/// behind HTTP or IPC; the controller applies results whenever they arrive.
// The engine runs on one thread, so implementations need not return Send futures.
#[allow(async_fn_in_trait)]
pub trait ProductCatalog {
    /// Exact lookup by SKU or barcode. `None` on miss.
    async fn find(&self, key: &str) -> Option<Product>;

    /// Case-insensitive substring search over name, SKU, and barcode.
    /// An empty result means nothing matched.
    async fn search(&self, fragment: &str) -> Vec<Product>;
}

// ---------------------------------------------------------------------------
// In-memory catalog
// ---------------------------------------------------------------------------

/// Catalog backed by an in-process product list.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    products: Vec<Product>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a product, keyed by SKU.
    pub fn upsert(&mut self, product: Product) {
        match self.products.iter_mut().find(|p| p.sku == product.sku) {
            Some(existing) => *existing = product,
            None => self.products.push(product),
        }
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

impl ProductCatalog for MemoryCatalog {
    async fn find(&self, key: &str) -> Option<Product> {
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        self.products.iter().find(|p| p.matches_key(key)).cloned()
    }

    async fn search(&self, fragment: &str) -> Vec<Product> {
        let needle = fragment.trim().to_lowercase();
        if needle.is_empty() {
            return vec![];
        }
        self.products
            .iter()
            .filter(|p| {
                p.name.to_lowercase().contains(&needle)
                    || p.sku.to_lowercase().contains(&needle)
                    || p.barcode
                        .as_deref()
                        .is_some_and(|b| b.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn espresso() -> Product {
        Product::new("SKU-ESP", "Espresso", 250, Some("5901234123457")).expect("valid product")
    }

    fn latte() -> Product {
        Product::new("SKU-LAT", "Caffe Latte", 380, None).expect("valid product")
    }

    #[test]
    fn test_product_validation() {
        assert!(matches!(
            Product::new("", "Espresso", 250, None),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            Product::new("SKU-ESP", "   ", 250, None),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            Product::new("SKU-ESP", "Espresso", -1, None),
            Err(EngineError::Validation(_))
        ));

        // Blank barcode collapses to None
        let p = Product::new("SKU-ESP", "Espresso", 250, Some("  ")).expect("valid");
        assert_eq!(p.barcode, None);
    }

    #[test]
    fn test_matches_key_sku_and_barcode() {
        let p = espresso();
        assert!(p.matches_key("SKU-ESP"));
        assert!(p.matches_key("sku-esp"));
        assert!(p.matches_key("5901234123457"));
        assert!(!p.matches_key("SKU-LAT"));
    }

    #[tokio::test]
    async fn test_memory_catalog_find_exact() {
        let mut cat = MemoryCatalog::new();
        cat.upsert(espresso());
        cat.upsert(latte());

        let hit = cat.find("sku-esp").await.expect("exact hit");
        assert_eq!(hit.name, "Espresso");

        let by_barcode = cat.find("5901234123457").await.expect("barcode hit");
        assert_eq!(by_barcode.sku, "SKU-ESP");

        assert!(cat.find("SKU-MISSING").await.is_none());
        assert!(cat.find("   ").await.is_none());
    }

    #[tokio::test]
    async fn test_memory_catalog_search_substring() {
        let mut cat = MemoryCatalog::new();
        cat.upsert(espresso());
        cat.upsert(latte());

        let hits = cat.search("latte").await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].sku, "SKU-LAT");

        // Matches across name and SKU, case-insensitive
        let hits = cat.search("SKU-").await;
        assert_eq!(hits.len(), 2);

        assert!(cat.search("burger").await.is_empty());
        assert!(cat.search("").await.is_empty());
    }

    #[test]
    fn test_upsert_replaces_by_sku() {
        let mut cat = MemoryCatalog::new();
        cat.upsert(espresso());
        let repriced = Product::new("SKU-ESP", "Espresso", 270, None).expect("valid");
        cat.upsert(repriced);

        assert_eq!(cat.len(), 1);
    }
}
