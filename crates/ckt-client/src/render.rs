//! Page pieces that do not touch the DOM.

use serde_json::{json, Value};

use ckt_cart::{CartView, ShippingInfo};
use ckt_schemas::paths;
use ckt_session::StatusIcon;

// ---------------------------------------------------------------------------
// Element ids
// ---------------------------------------------------------------------------

pub mod ids {
    pub const CART_ITEMS: &str = "cart-items";
    pub const CART_TBODY: &str = "cart-tbody";
    pub const TOTAL_PRICE: &str = "total-price";
    pub const CHECKOUT_BUTTON: &str = "checkout-button";
    pub const CHECKOUT_DIALOG: &str = "stripecheckout";
    pub const SUBMIT: &str = "submit";
    pub const SPINNER: &str = "spinner";
    pub const BUTTON_TEXT: &str = "button-text";
    pub const PAYMENT_MESSAGE: &str = "payment-message";
    pub const PAYMENT_ELEMENT: &str = "payment-element";
    pub const DPM_CHECKER: &str = "dpm-integration-checker";

    pub const STATUS_ICON: &str = "status-icon";
    pub const STATUS_TEXT: &str = "status-text";
    pub const DETAILS_TABLE: &str = "details-table";
    pub const INTENT_ID: &str = "intent-id";
    pub const INTENT_STATUS: &str = "intent-status";
    pub const ORDER_LINK: &str = "order-details-link";

    /// Quantity input next to a product's add button.
    pub fn quantity_input(product_id: &str) -> String {
        format!("qty-{product_id}")
    }
}

/// Class toggled to hide an element.
pub const HIDDEN: &str = "hidden";

/// Shipping form field names, in composite-id order.
pub const SHIPPING_FIELDS: [&str; 7] = [
    "shipping-name",
    "shipping-address",
    "shipping-city",
    "shipping-state",
    "shipping-zip",
    "shipping-country",
    "shipping-phone",
];

pub const SHIPPING_PRICE_FIELD: &str = "shipping-price";

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Shop,
    Complete,
    Other,
}

impl Route {
    pub fn from_path(pathname: &str) -> Self {
        match pathname.trim_end_matches('/') {
            "" => Route::Shop,
            p if p == paths::COMPLETE => Route::Complete,
            _ => Route::Other,
        }
    }
}

// ---------------------------------------------------------------------------
// Cart table
// ---------------------------------------------------------------------------

pub const CART_HEAD: &str =
    "<tr><th>Item</th><th>Price</th><th>Quantity</th><th>Actions</th></tr>";

/// `<tr>` rows for the cart body. Inline handlers call back into the
/// exported `removeFromCart` / `updateItemQuantity`.
pub fn cart_rows_html(view: &CartView) -> String {
    let mut out = String::new();
    for row in &view.rows {
        let label = row
            .label
            .iter()
            .map(|l| escape_html(l))
            .collect::<Vec<_>>()
            .join("<br>");
        let id_arg = js_string_attr(&row.id);
        let quantity = match row.quantity {
            Some(q) => format!(
                "<input type=\"number\" value=\"{q}\" min=\"1\" \
                 onchange=\"wasm_bindgen.updateItemQuantity({id_arg}, this.value)\">"
            ),
            None => String::new(),
        };
        out.push_str(&format!(
            "<tr><td>{label}</td><td>{price}</td><td>{quantity}</td>\
             <td><button onclick=\"wasm_bindgen.removeFromCart({id_arg})\">Remove</button></td></tr>",
            price = escape_html(&row.price),
        ));
    }
    out
}

/// A JS string literal holding `s`, escaped for a double-quoted attribute.
fn js_string_attr(s: &str) -> String {
    let literal = serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string());
    escape_html(&literal)
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Shipping details from the form, looked up by field name.
pub fn shipping_from_form(mut field: impl FnMut(&str) -> String) -> ShippingInfo {
    let [name, address, city, state, zip, country, phone] = SHIPPING_FIELDS.map(|f| field(f));
    ShippingInfo {
        name,
        address,
        city,
        state,
        zip,
        country,
        phone,
    }
}

// ---------------------------------------------------------------------------
// Payment provider options
// ---------------------------------------------------------------------------

pub fn elements_options(client_secret: &str) -> Value {
    json!({ "clientSecret": client_secret })
}

pub fn payment_element_options() -> Value {
    json!({ "layout": "tabs" })
}

/// `confirmPayment` options without the `elements` handle, which is a live
/// JS object and is attached by the caller.
pub fn confirm_options(return_url: &str) -> Value {
    json!({ "confirmParams": { "return_url": return_url } })
}

// ---------------------------------------------------------------------------
// Status icons
// ---------------------------------------------------------------------------

const SUCCESS_ICON: &str = r#"<svg width="16" height="14" viewBox="0 0 16 14" fill="none" xmlns="http://www.w3.org/2000/svg"><path fill-rule="evenodd" clip-rule="evenodd" d="M15.4695 0.232963C15.8241 0.561287 15.8454 1.1149 15.5171 1.46949L6.14206 11.5945C5.97228 11.7778 5.73221 11.8799 5.48237 11.8748C5.23253 11.8698 4.99677 11.7582 4.83452 11.5681L0.459523 6.44311C0.145767 6.07557 0.18937 5.52327 0.556912 5.20951C0.924454 4.89575 1.47676 4.93936 1.79051 5.3069L5.52658 9.68343L14.233 0.280522C14.5613 -0.0740672 15.1149 -0.0953599 15.4695 0.232963Z" fill="white"/></svg>"#;

const ERROR_ICON: &str = r#"<svg width="16" height="16" viewBox="0 0 16 16" fill="none" xmlns="http://www.w3.org/2000/svg"><path fill-rule="evenodd" clip-rule="evenodd" d="M1.25628 1.25628C1.59799 0.914573 2.15201 0.914573 2.49372 1.25628L8 6.76256L13.5063 1.25628C13.848 0.914573 14.402 0.914573 14.7437 1.25628C15.0854 1.59799 15.0854 2.15201 14.7437 2.49372L9.23744 8L14.7437 13.5063C15.0854 13.848 15.0854 14.402 14.7437 14.7437C14.402 15.0854 13.848 15.0854 13.5063 14.7437L8 9.23744L2.49372 14.7437C2.15201 15.0854 1.59799 15.0854 1.25628 14.7437C0.914573 14.402 0.914573 13.848 1.25628 13.5063L6.76256 8L1.25628 2.49372C0.914573 2.15201 0.914573 1.59799 1.25628 1.25628Z" fill="white"/></svg>"#;

const INFO_ICON: &str = r#"<svg width="14" height="14" viewBox="0 0 14 14" fill="none" xmlns="http://www.w3.org/2000/svg"><path fill-rule="evenodd" clip-rule="evenodd" d="M10 1.5H4C2.61929 1.5 1.5 2.61929 1.5 4V10C1.5 11.3807 2.61929 12.5 4 12.5H10C11.3807 12.5 12.5 11.3807 12.5 10V4C12.5 2.61929 11.3807 1.5 10 1.5ZM4 0C1.79086 0 0 1.79086 0 4V10C0 12.2091 1.79086 14 4 14H10C12.2091 14 14 12.2091 14 10V4C14 1.79086 12.2091 0 10 0H4Z" fill="white"/><path fill-rule="evenodd" clip-rule="evenodd" d="M5.25 7C5.25 6.58579 5.58579 6.25 6 6.25H7.25C7.66421 6.25 8 6.58579 8 7V10.5C8 10.9142 7.66421 11.25 7.25 11.25C6.83579 11.25 6.5 10.9142 6.5 10.5V7.75H6C5.58579 7.75 5.25 7.41421 5.25 7Z" fill="white"/><path d="M5.75 4C5.75 3.31075 6.31075 2.75 7 2.75C7.68925 2.75 8.25 3.31075 8.25 4C8.25 4.68925 7.68925 5.25 7 5.25C6.31075 5.25 5.75 4.68925 5.75 4Z" fill="white"/></svg>"#;

pub fn icon_svg(icon: StatusIcon) -> &'static str {
    match icon {
        StatusIcon::Success => SUCCESS_ICON,
        StatusIcon::Info => INFO_ICON,
        StatusIcon::Error => ERROR_ICON,
    }
}
