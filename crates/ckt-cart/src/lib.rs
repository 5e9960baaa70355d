//! ckt-cart
//!
//! Client-resident cart. An ordered list of line items, persisted to
//! client-local storage after every mutation.
//!
//! # Merge rules
//! A line id is pipe-delimited; its first segment is the **category**.
//! Adding an item whose category is already in the cart:
//! - `shipping-to`: replaces that line wholesale (quantity forced to 1)
//! - anything else: accumulates quantity and amount into that line
//!
//! So at most one shipping line exists at any time.
//!
//! # Checkout eligibility
//! Enabled iff the cart has more than one line **and** one of them is the
//! shipping line.

mod storage;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub use storage::{ClientStorage, MemoryStorage, StorageError};

/// Storage key of the serialized cart.
pub const CART_STORAGE_KEY: &str = "cartItems";

/// Category of the singleton shipping line.
pub const SHIPPING_CATEGORY: &str = "shipping-to";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: String,
    /// Line total in cents (unit price * quantity).
    pub amount: i64,
    pub quantity: i64,
}

impl CartItem {
    pub fn category(&self) -> &str {
        category_of(&self.id)
    }

    pub fn is_shipping(&self) -> bool {
        self.category() == SHIPPING_CATEGORY
    }
}

/// First `|`-separated segment of a line id.
pub fn category_of(id: &str) -> &str {
    id.split('|').next().unwrap_or(id)
}

/// Address fields collected by the shipping form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShippingInfo {
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
    pub phone: String,
}

impl ShippingInfo {
    /// `shipping-to|name|address|city|state|zip|country|phone`
    pub fn line_id(&self) -> String {
        [
            SHIPPING_CATEGORY,
            self.name.as_str(),
            self.address.as_str(),
            self.city.as_str(),
            self.state.as_str(),
            self.zip.as_str(),
            self.country.as_str(),
            self.phone.as_str(),
        ]
        .join("|")
    }
}

/// One rendered cart row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartRow {
    pub id: String,
    /// Display lines; shipping rows spread the address over several.
    pub label: Vec<String>,
    pub price: String,
    /// `None` when the quantity is not user-editable (shipping).
    pub quantity: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartView {
    pub rows: Vec<CartRow>,
    pub total_cents: i64,
    pub total_label: String,
    pub checkout_enabled: bool,
}

/// `1234` -> `$12.34`
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}${}.{:02}", abs / 100, abs % 100)
}

/// Decimal dollars from a form field to cents, truncating.
fn dollars_to_cents(price: f64) -> i64 {
    if price.is_finite() {
        (price * 100.0) as i64
    } else {
        0
    }
}

fn parse_quantity(raw: Option<&str>) -> i64 {
    match raw.map(str::trim).and_then(|s| s.parse::<i64>().ok()) {
        Some(q) if q >= 1 => q,
        _ => 1,
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct CartStore<S: ClientStorage> {
    storage: S,
    items: Vec<CartItem>,
}

impl<S: ClientStorage> CartStore<S> {
    /// Restore the cart from storage. Missing or malformed data yields an
    /// empty cart.
    pub fn load(storage: S) -> Self {
        let mut store = Self {
            storage,
            items: Vec::new(),
        };
        store.reload();
        store
    }

    pub fn reload(&mut self) {
        self.items = match self.storage.get_item(CART_STORAGE_KEY) {
            None => Vec::new(),
            Some(raw) => match serde_json::from_str::<Option<Vec<CartItem>>>(&raw) {
                Ok(items) => items.unwrap_or_default(),
                Err(e) => {
                    warn!(error = %e, "stored cart is malformed; starting empty");
                    Vec::new()
                }
            },
        };
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_cents(&self) -> i64 {
        self.items.iter().fold(0i64, |acc, i| acc.saturating_add(i.amount))
    }

    pub fn has_shipping(&self) -> bool {
        self.items.iter().any(CartItem::is_shipping)
    }

    pub fn checkout_enabled(&self) -> bool {
        self.items.len() > 1 && self.has_shipping()
    }

    fn persist(&self) {
        let json = match serde_json::to_string(&self.items) {
            Ok(j) => j,
            Err(e) => {
                warn!(error = %e, "cart serialization failed");
                return;
            }
        };
        if let Err(e) = self.storage.set_item(CART_STORAGE_KEY, &json) {
            warn!(error = %e, "cart not persisted");
        }
    }

    // -----------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------

    /// Add `quantity` units at `unit_price_cents` each. Quantities below 1
    /// are treated as 1.
    pub fn add(&mut self, id: &str, unit_price_cents: i64, quantity: i64) {
        let quantity = quantity.max(1);
        let amount = unit_price_cents.saturating_mul(quantity);
        let category = category_of(id);

        match self.items.iter_mut().find(|i| i.category() == category) {
            Some(line) if category == SHIPPING_CATEGORY => {
                line.id = id.to_string();
                line.quantity = 1;
                line.amount = amount;
            }
            Some(line) => {
                line.quantity = line.quantity.saturating_add(quantity);
                line.amount = line.amount.saturating_add(amount);
            }
            None => self.items.push(CartItem {
                id: id.to_string(),
                amount,
                quantity,
            }),
        }
        self.persist();
    }

    /// Add from page inputs: price in dollars, quantity as typed. A missing or
    /// unparsable quantity (or one below 1) counts as 1.
    pub fn add_from_input(&mut self, id: &str, unit_price_dollars: f64, quantity_input: Option<&str>) {
        let quantity = parse_quantity(quantity_input);
        self.add(id, dollars_to_cents(unit_price_dollars), quantity);
    }

    /// Set the shipping line. An unparsable price is treated as 0.
    pub fn add_shipping(&mut self, info: &ShippingInfo, price_input: &str) {
        let price = match price_input.trim().parse::<f64>() {
            Ok(p) => p,
            Err(_) => {
                warn!(input = %price_input, "shipping price unparsable; using 0");
                0.0
            }
        };
        self.add(&info.line_id(), dollars_to_cents(price), 1);
    }

    /// Change the quantity of the line with exactly `id`.
    ///
    /// The unit price is recovered as `amount / quantity` with integer
    /// division, so a line whose amount is not a multiple of its quantity
    /// loses the remainder.
    pub fn update_quantity(&mut self, id: &str, new_quantity: i64) {
        let new_quantity = new_quantity.max(1);
        if let Some(line) = self.items.iter_mut().find(|i| i.id == id) {
            let unit = if line.quantity > 0 {
                line.amount / line.quantity
            } else {
                line.amount
            };
            line.quantity = new_quantity;
            line.amount = unit.saturating_mul(new_quantity);
        }
        self.persist();
    }

    pub fn update_quantity_input(&mut self, id: &str, raw: &str) {
        if raw.trim().parse::<i64>().is_err() {
            warn!(input = %raw, "quantity unparsable; using 1");
        }
        self.update_quantity(id, parse_quantity(Some(raw)));
    }

    pub fn remove(&mut self, id: &str) {
        self.items.retain(|i| i.id != id);
        self.persist();
    }

    /// Drop every line and delete the persisted cart record.
    pub fn empty(&mut self) {
        self.items.clear();
        self.storage.remove_item(CART_STORAGE_KEY);
    }

    /// Drop every line and wipe all client-local storage.
    pub fn clear_all(&mut self) {
        self.items.clear();
        self.storage.clear();
    }

    // -----------------------------------------------------------------
    // Display
    // -----------------------------------------------------------------

    pub fn view(&self) -> CartView {
        let rows = self
            .items
            .iter()
            .map(|item| {
                let parts: Vec<&str> = item.id.split('|').collect();
                let (label, quantity) = if item.is_shipping() && parts.len() >= 8 {
                    (
                        vec![
                            format!("{}:", parts[0]),
                            parts[1].to_string(),
                            parts[2].to_string(),
                            format!("{}, {} {}", parts[3], parts[4], parts[5]),
                            parts[6].to_string(),
                            parts[7].to_string(),
                        ],
                        None,
                    )
                } else {
                    (vec![item.id.clone()], Some(item.quantity))
                };
                CartRow {
                    id: item.id.clone(),
                    label,
                    price: format_cents(item.amount),
                    quantity,
                }
            })
            .collect();

        let total = self.total_cents();
        CartView {
            rows,
            total_cents: total,
            total_label: format!("Total: {}", format_cents(total)),
            checkout_enabled: self.checkout_enabled(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SHIP: &str = "shipping-to|Jane|1 Main St|Springfield|IL|62704|US|555-0100";

    fn cart() -> CartStore<MemoryStorage> {
        CartStore::load(MemoryStorage::new())
    }

    #[test]
    fn accumulating_past_i64_saturates() {
        let mut c = cart();
        c.add("sku-1", i64::MAX / 2, 1);
        c.add("sku-1", i64::MAX / 2, 2);
        assert_eq!(c.len(), 1);
        assert_eq!(c.items()[0].quantity, 3);
        assert_eq!(c.items()[0].amount, i64::MAX);

        c.add("sku-1", 1, i64::MAX);
        assert_eq!(c.items()[0].quantity, i64::MAX);

        c.add("sku-2", i64::MAX, 1);
        assert_eq!(c.total_cents(), i64::MAX);
    }

    #[test]
    fn distinct_categories_sum_to_total() {
        let mut c = cart();
        c.add("sku-1", 500, 2);
        c.add("sku-2", 250, 3);
        c.add("sku-3", 1999, 1);
        assert_eq!(c.len(), 3);
        assert_eq!(c.total_cents(), 1000 + 750 + 1999);
    }

    #[test]
    fn same_category_accumulates() {
        let mut c = cart();
        c.add("sku-1|red", 500, 1);
        c.add("sku-1|blue", 500, 2);
        assert_eq!(c.len(), 1);
        assert_eq!(c.items()[0].id, "sku-1|red");
        assert_eq!(c.items()[0].quantity, 3);
        assert_eq!(c.items()[0].amount, 1500);
    }

    #[test]
    fn shipping_line_is_replaced_not_accumulated() {
        let mut c = cart();
        c.add(SHIP, 1000, 1);
        c.add("shipping-to|Bob|2 Elm|Shelbyville|IL|62565|US|555-0199", 700, 4);
        assert_eq!(c.len(), 1);
        let line = &c.items()[0];
        assert!(line.id.contains("Bob"));
        assert_eq!(line.quantity, 1);
        assert_eq!(line.amount, 2800);
    }

    #[test]
    fn checkout_requires_shipping_and_more_than_one_line() {
        let mut c = cart();
        assert!(!c.checkout_enabled());
        c.add(SHIP, 1000, 1);
        assert!(!c.checkout_enabled(), "shipping only");
        c.remove(SHIP);
        c.add("sku-1", 500, 1);
        c.add("sku-2", 500, 1);
        assert!(!c.checkout_enabled(), "products only");
        c.add(SHIP, 1000, 1);
        assert!(c.checkout_enabled());
    }

    #[test]
    fn update_quantity_uses_truncating_unit_price() {
        let mut c = cart();
        c.add("sku-1", 333, 3);
        c.update_quantity("sku-1", 2);
        assert_eq!(c.items()[0].amount, 666);

        // 1000 / 3 = 333 per unit after truncation.
        let mut c = cart();
        c.storage()
            .set_item(
                CART_STORAGE_KEY,
                r#"[{"id":"odd","amount":1000,"quantity":3}]"#,
            )
            .unwrap();
        c.reload();
        c.update_quantity("odd", 3);
        assert_eq!(c.items()[0].amount, 999);
    }

    #[test]
    fn update_quantity_input_falls_back_to_one() {
        let mut c = cart();
        c.add("sku-1", 400, 5);
        c.update_quantity_input("sku-1", "abc");
        assert_eq!(c.items()[0].quantity, 1);
        assert_eq!(c.items()[0].amount, 400);
    }

    #[test]
    fn every_mutation_is_persisted() {
        let storage = MemoryStorage::new();
        let mut c = CartStore::load(storage.clone());
        c.add("sku-1", 500, 2);

        let restored = CartStore::load(storage.clone());
        assert_eq!(restored.items(), c.items());

        c.remove("sku-1");
        assert_eq!(storage.get_item(CART_STORAGE_KEY).as_deref(), Some("[]"));
    }

    #[test]
    fn malformed_storage_resets_to_empty() {
        let storage = MemoryStorage::new();
        storage.set_item(CART_STORAGE_KEY, "{not json").unwrap();
        let c = CartStore::load(storage);
        assert!(c.is_empty());
    }

    #[test]
    fn null_record_is_an_empty_cart() {
        let storage = MemoryStorage::new();
        storage.set_item(CART_STORAGE_KEY, "null").unwrap();
        assert!(CartStore::load(storage).is_empty());
    }

    #[test]
    fn add_from_input_converts_dollars_and_defaults_quantity() {
        let mut c = cart();
        c.add_from_input("sku-1", 12.5, Some("2"));
        c.add_from_input("sku-2", 3.0, Some("0"));
        c.add_from_input("sku-3", 1.0, None);
        c.add_from_input("sku-4", 1.0, Some("many"));
        let q: Vec<i64> = c.items().iter().map(|i| i.quantity).collect();
        assert_eq!(q, vec![2, 1, 1, 1]);
        assert_eq!(c.items()[0].amount, 2500);
    }

    #[test]
    fn add_shipping_builds_composite_id_and_tolerates_bad_price() {
        let info = ShippingInfo {
            name: "Jane".into(),
            address: "1 Main St".into(),
            city: "Springfield".into(),
            state: "IL".into(),
            zip: "62704".into(),
            country: "US".into(),
            phone: "555-0100".into(),
        };
        let mut c = cart();
        c.add_shipping(&info, "ten");
        assert_eq!(c.items()[0].id, SHIP);
        assert_eq!(c.items()[0].amount, 0);

        c.add_shipping(&info, "10.00");
        assert_eq!(c.len(), 1);
        assert_eq!(c.items()[0].amount, 1000);
    }

    #[test]
    fn empty_removes_only_cart_key_clear_all_wipes_everything() {
        let storage = MemoryStorage::new();
        storage.set_item("customer-note", "hello").unwrap();
        let mut c = CartStore::load(storage.clone());
        c.add("sku-1", 100, 1);

        c.empty();
        assert!(c.is_empty());
        assert_eq!(storage.get_item(CART_STORAGE_KEY), None);
        assert_eq!(storage.get_item("customer-note").as_deref(), Some("hello"));

        c.add("sku-1", 100, 1);
        c.clear_all();
        assert!(storage.is_empty());
    }

    #[test]
    fn view_renders_rows_total_and_flag() {
        let mut c = cart();
        c.add("sku-1", 500, 2);
        c.add(SHIP, 1000, 1);
        let v = c.view();

        assert_eq!(v.total_cents, 2000);
        assert_eq!(v.total_label, "Total: $20.00");
        assert!(v.checkout_enabled);

        assert_eq!(v.rows[0].label, vec!["sku-1"]);
        assert_eq!(v.rows[0].price, "$10.00");
        assert_eq!(v.rows[0].quantity, Some(2));

        assert_eq!(
            v.rows[1].label,
            vec![
                "shipping-to:",
                "Jane",
                "1 Main St",
                "Springfield, IL 62704",
                "US",
                "555-0100"
            ]
        );
        assert_eq!(v.rows[1].quantity, None);
    }

    #[test]
    fn format_cents_pads() {
        assert_eq!(format_cents(5), "$0.05");
        assert_eq!(format_cents(123456), "$1234.56");
        assert_eq!(format_cents(-250), "-$2.50");
    }
}
