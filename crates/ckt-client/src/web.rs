//! Browser glue: `localStorage`, `fetch`, Stripe.js and the DOM.
//!
//! Page markup calls the exported functions as `wasm_bindgen.<name>(..)`;
//! `start` runs once per page load and picks the page logic from the path.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use async_trait::async_trait;
use gloo_net::http::Request;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{
    Event, HtmlAnchorElement, HtmlDialogElement, HtmlElement, HtmlFormElement, HtmlInputElement,
    HtmlSelectElement, Location, Storage,
};

use ckt_cart::{CartStore, ClientStorage, StorageError};
use ckt_schemas::{
    paths, CreateIntentRequest, CreateIntentResponse, MessageResponse, PaymentIntentView,
    SubmitOrderRequest,
};
use ckt_session::{
    evaluate_completion, BackendError, CheckoutBackend, CheckoutFlow, CompletionView, PageOrigin,
    ProviderClient, ProviderClientError, StatusDisplay, StepOutcome,
};

use crate::publishable_key;
use crate::render::{
    cart_rows_html, confirm_options, elements_options, icon_svg, ids, payment_element_options,
    shipping_from_form, Route, CART_HEAD, HIDDEN, SHIPPING_PRICE_FIELD,
};

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// One formatted event, written to the console when dropped.
struct ConsoleLine(Vec<u8>);

impl io::Write for ConsoleLine {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ConsoleLine {
    fn drop(&mut self) {
        if !self.0.is_empty() {
            let line = String::from_utf8_lossy(&self.0);
            web_sys::console::log_1(&JsValue::from_str(line.trim_end()));
        }
    }
}

fn init_logging() {
    // No wall clock on wasm32-unknown-unknown.
    let _ = tracing_subscriber::fmt()
        .with_writer(|| ConsoleLine(Vec::new()))
        .without_time()
        .with_max_level(tracing::Level::INFO)
        .try_init();
}

fn js_message(v: &JsValue) -> String {
    v.as_string()
        .or_else(|| {
            js_sys::Reflect::get(v, &JsValue::from_str("message"))
                .ok()
                .and_then(|m| m.as_string())
        })
        .unwrap_or_else(|| format!("{v:?}"))
}

// ---------------------------------------------------------------------------
// localStorage
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct WebStorage(Storage);

impl WebStorage {
    pub fn local() -> Option<Self> {
        web_sys::window()?.local_storage().ok().flatten().map(Self)
    }
}

impl ClientStorage for WebStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.0.get_item(key).ok().flatten()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.0
            .set_item(key, value)
            .map_err(|e| StorageError(js_message(&e)))
    }

    fn remove_item(&self, key: &str) {
        if let Err(e) = self.0.remove_item(key) {
            warn!(key, error = %js_message(&e), "localStorage remove failed");
        }
    }

    fn clear(&self) {
        if let Err(e) = self.0.clear() {
            warn!(error = %js_message(&e), "localStorage clear failed");
        }
    }

    fn keys(&self) -> Vec<String> {
        let len = self.0.length().unwrap_or(0);
        (0..len).filter_map(|i| self.0.key(i).ok().flatten()).collect()
    }
}

// ---------------------------------------------------------------------------
// fetch
// ---------------------------------------------------------------------------

/// The daemon's JSON endpoints on the page's own origin.
pub struct FetchBackend;

impl FetchBackend {
    async fn post<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, BackendError> {
        let resp = Request::post(path)
            .json(body)
            .map_err(|e| BackendError::Decode(e.to_string()))?
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        if !resp.ok() {
            return Err(BackendError::Http {
                status: resp.status(),
            });
        }
        resp.json::<Resp>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[async_trait(?Send)]
impl CheckoutBackend for FetchBackend {
    async fn create_payment_intent(
        &self,
        req: &CreateIntentRequest,
    ) -> Result<CreateIntentResponse, BackendError> {
        self.post(paths::CREATE_PAYMENT_INTENT, req).await
    }

    async fn submit_order(&self, req: &SubmitOrderRequest) -> Result<MessageResponse, BackendError> {
        let resp: MessageResponse = self.post(paths::SUBMIT_ORDER, req).await?;
        info!(message = %resp.message, "order submitted");
        Ok(resp)
    }
}

// ---------------------------------------------------------------------------
// Stripe.js
// ---------------------------------------------------------------------------

#[wasm_bindgen]
extern "C" {
    type Stripe;
    type Elements;
    type PaymentElement;

    #[wasm_bindgen(catch, js_name = Stripe)]
    fn stripe_init(publishable_key: &str) -> Result<Stripe, JsValue>;

    #[wasm_bindgen(method, catch)]
    fn elements(this: &Stripe, options: &JsValue) -> Result<Elements, JsValue>;

    #[wasm_bindgen(method, js_name = confirmPayment)]
    fn confirm_payment(this: &Stripe, options: &JsValue) -> js_sys::Promise;

    #[wasm_bindgen(method, js_name = retrievePaymentIntent)]
    fn retrieve_payment_intent(this: &Stripe, client_secret: &str) -> js_sys::Promise;

    #[wasm_bindgen(method, catch)]
    fn create(this: &Elements, kind: &str, options: &JsValue) -> Result<PaymentElement, JsValue>;

    #[wasm_bindgen(method, catch)]
    fn mount(this: &PaymentElement, selector: &str) -> Result<(), JsValue>;
}

fn client_err(e: &JsValue) -> ProviderClientError {
    ProviderClientError::new(js_message(e))
}

fn to_js(v: &Value) -> Result<JsValue, ProviderClientError> {
    js_sys::JSON::parse(&v.to_string()).map_err(|e| client_err(&e))
}

/// `result.error.message` of a Stripe.js promise result, if it carries one.
fn result_error(result: &JsValue) -> Option<String> {
    let err = js_sys::Reflect::get(result, &JsValue::from_str("error")).ok()?;
    if err.is_undefined() || err.is_null() {
        return None;
    }
    Some(
        js_sys::Reflect::get(&err, &JsValue::from_str("message"))
            .ok()
            .and_then(|m| m.as_string())
            .unwrap_or_else(|| "unknown payment error".to_string()),
    )
}

pub struct StripeJs {
    stripe: Stripe,
    elements: RefCell<Option<Elements>>,
}

impl StripeJs {
    pub fn new(publishable_key: &str) -> Result<Self, ProviderClientError> {
        let stripe = stripe_init(publishable_key).map_err(|e| client_err(&e))?;
        Ok(Self {
            stripe,
            elements: RefCell::new(None),
        })
    }
}

#[async_trait(?Send)]
impl ProviderClient for StripeJs {
    async fn mount_payment_element(&self, client_secret: &str) -> Result<(), ProviderClientError> {
        let elements = self
            .stripe
            .elements(&to_js(&elements_options(client_secret))?)
            .map_err(|e| client_err(&e))?;
        let payment = elements
            .create("payment", &to_js(&payment_element_options())?)
            .map_err(|e| client_err(&e))?;
        payment
            .mount(&format!("#{}", ids::PAYMENT_ELEMENT))
            .map_err(|e| client_err(&e))?;
        self.elements.replace(Some(elements));
        Ok(())
    }

    async fn confirm_payment(&self, return_url: &str) -> Result<(), ProviderClientError> {
        let elements = self
            .elements
            .borrow()
            .clone()
            .ok_or_else(|| ProviderClientError::new("payment form is not mounted"))?;
        let options = to_js(&confirm_options(return_url))?;
        js_sys::Reflect::set(&options, &JsValue::from_str("elements"), &JsValue::from(elements))
            .map_err(|e| client_err(&e))?;

        let result = JsFuture::from(self.stripe.confirm_payment(&options))
            .await
            .map_err(|e| client_err(&e))?;
        match result_error(&result) {
            Some(message) => Err(ProviderClientError::new(message)),
            None => Ok(()),
        }
    }

    async fn retrieve_intent(
        &self,
        client_secret: &str,
    ) -> Result<PaymentIntentView, ProviderClientError> {
        let result = JsFuture::from(self.stripe.retrieve_payment_intent(client_secret))
            .await
            .map_err(|e| client_err(&e))?;
        if let Some(message) = result_error(&result) {
            return Err(ProviderClientError::new(message));
        }
        let intent = js_sys::Reflect::get(&result, &JsValue::from_str("paymentIntent"))
            .map_err(|e| client_err(&e))?;
        let text: String = js_sys::JSON::stringify(&intent)
            .map_err(|e| client_err(&e))?
            .into();
        serde_json::from_str(&text).map_err(|e| ProviderClientError::new(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// DOM helpers
// ---------------------------------------------------------------------------

fn element_as<T: JsCast>(id: &str) -> Option<T> {
    web_sys::window()?
        .document()?
        .get_element_by_id(id)?
        .dyn_into::<T>()
        .ok()
}

fn element(id: &str) -> Option<HtmlElement> {
    element_as::<HtmlElement>(id)
}

fn set_text(id: &str, text: &str) {
    if let Some(el) = element(id) {
        el.set_text_content(Some(text));
    }
}

fn hide(id: &str) {
    if let Some(el) = element(id) {
        let _ = el.class_list().add_1(HIDDEN);
    }
}

fn input_value(id: &str) -> Option<String> {
    element_as::<HtmlInputElement>(id).map(|i| i.value())
}

fn form_value(form: &HtmlFormElement, name: &str) -> String {
    let Ok(Some(el)) = form.query_selector(&format!("[name='{name}']")) else {
        return String::new();
    };
    if let Some(input) = el.dyn_ref::<HtmlInputElement>() {
        return input.value();
    }
    if let Some(select) = el.dyn_ref::<HtmlSelectElement>() {
        return select.value();
    }
    String::new()
}

fn show_message(message: &str) {
    if let Some(el) = element(ids::PAYMENT_MESSAGE) {
        el.set_inner_text(message);
        el.set_class_name("");
    }
}

fn hide_message() {
    if let Some(el) = element(ids::PAYMENT_MESSAGE) {
        el.set_inner_text("");
        el.set_class_name(HIDDEN);
    }
}

fn show_spinner(loading: bool) {
    let (spinner, text) = if loading { ("", HIDDEN) } else { (HIDDEN, "") };
    if let Some(el) = element(ids::SPINNER) {
        el.set_class_name(spinner);
    }
    if let Some(el) = element(ids::BUTTON_TEXT) {
        el.set_class_name(text);
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    init_logging();

    let Some(window) = web_sys::window() else {
        return;
    };
    let location = window.location();
    let pathname = location.pathname().unwrap_or_default();
    match Route::from_path(&pathname) {
        Route::Shop => boot_shop(&location),
        Route::Complete => spawn_local(complete_page(location.search().unwrap_or_default())),
        Route::Other => info!(%pathname, "no client logic for this page"),
    }
}

// ---------------------------------------------------------------------------
// Shop page
// ---------------------------------------------------------------------------

struct Shop {
    cart: RefCell<CartStore<WebStorage>>,
    /// `None` when Stripe.js did not load; the cart still works.
    flow: Option<CheckoutFlow<FetchBackend, StripeJs>>,
}

thread_local! {
    static SHOP: RefCell<Option<Rc<Shop>>> = const { RefCell::new(None) };
    static SUBMIT_HANDLER: RefCell<Option<Closure<dyn FnMut(Event)>>> = const { RefCell::new(None) };
}

fn shop() -> Option<Rc<Shop>> {
    let shop = SHOP.with(|s| s.borrow().clone());
    if shop.is_none() {
        warn!("shop page is not initialised");
    }
    shop
}

fn boot_shop(location: &Location) {
    let Some(storage) = WebStorage::local() else {
        error!("localStorage unavailable; cart disabled");
        return;
    };
    let origin = PageOrigin::new(
        &location.protocol().unwrap_or_default(),
        &location.hostname().unwrap_or_default(),
        &location.port().unwrap_or_default(),
    );
    let flow = match StripeJs::new(publishable_key()) {
        Ok(stripe) => Some(CheckoutFlow::new(FetchBackend, stripe, origin)),
        Err(e) => {
            error!(error = %e, "payment provider unavailable; checkout disabled");
            None
        }
    };

    let shop = Rc::new(Shop {
        cart: RefCell::new(CartStore::load(storage)),
        flow,
    });
    render_cart(&shop.cart.borrow());
    SHOP.with(|s| *s.borrow_mut() = Some(shop));
    attach_submit_handler();
    info!("shop page ready");
}

fn render_cart(cart: &CartStore<WebStorage>) {
    let view = cart.view();
    let Some(doc) = web_sys::window().and_then(|w| w.document()) else {
        return;
    };

    if doc.get_element_by_id(ids::CART_TBODY).is_none() {
        if let Some(container) = doc.get_element_by_id(ids::CART_ITEMS) {
            container.set_inner_html(&format!(
                "<table><thead>{CART_HEAD}</thead><tbody id=\"{}\"></tbody></table>",
                ids::CART_TBODY
            ));
        }
    }
    if let Some(tbody) = doc.get_element_by_id(ids::CART_TBODY) {
        tbody.set_inner_html(&cart_rows_html(&view));
    }
    set_text(ids::TOTAL_PRICE, &view.total_label);

    if let Some(button) = doc.get_element_by_id(ids::CHECKOUT_BUTTON) {
        let _ = if view.checkout_enabled {
            button.remove_attribute("disabled")
        } else {
            button.set_attribute("disabled", "true")
        };
    }
}

fn attach_submit_handler() {
    let Some(button) = element(ids::SUBMIT) else {
        return;
    };
    let handler = Closure::<dyn FnMut(Event)>::new(|event: Event| {
        event.prevent_default();
        spawn_local(pay());
    });
    if let Err(e) =
        button.add_event_listener_with_callback("click", handler.as_ref().unchecked_ref())
    {
        warn!(error = %js_message(&e), "pay button not wired");
        return;
    }
    SUBMIT_HANDLER.with(|h| *h.borrow_mut() = Some(handler));
}

#[wasm_bindgen(js_name = addToCart)]
pub fn add_to_cart(id: String, unit_price: f64) {
    let Some(shop) = shop() else {
        return;
    };
    let quantity = input_value(&ids::quantity_input(&id));
    let mut cart = shop.cart.borrow_mut();
    cart.add_from_input(&id, unit_price, quantity.as_deref());
    render_cart(&cart);
}

#[wasm_bindgen(js_name = removeFromCart)]
pub fn remove_from_cart(id: String) {
    let Some(shop) = shop() else {
        return;
    };
    let mut cart = shop.cart.borrow_mut();
    cart.remove(&id);
    render_cart(&cart);
}

#[wasm_bindgen(js_name = updateItemQuantity)]
pub fn update_item_quantity(id: String, quantity: String) {
    let Some(shop) = shop() else {
        return;
    };
    let mut cart = shop.cart.borrow_mut();
    cart.update_quantity_input(&id, &quantity);
    render_cart(&cart);
}

/// Form `onsubmit` handler; always returns `false` so the page stays put.
#[wasm_bindgen(js_name = addShippingInfo)]
pub fn add_shipping_info(event: Event, form: HtmlFormElement) -> bool {
    event.prevent_default();
    let Some(shop) = shop() else {
        return false;
    };
    let info = shipping_from_form(|name| form_value(&form, name));
    let price = form_value(&form, SHIPPING_PRICE_FIELD);
    let mut cart = shop.cart.borrow_mut();
    cart.add_shipping(&info, &price);
    render_cart(&cart);
    false
}

#[wasm_bindgen(js_name = emptyCart)]
pub fn empty_cart() {
    let Some(shop) = shop() else {
        return;
    };
    let mut cart = shop.cart.borrow_mut();
    cart.empty();
    render_cart(&cart);
}

#[wasm_bindgen(js_name = clearStorage)]
pub fn clear_storage() {
    let Some(shop) = shop() else {
        return;
    };
    let mut cart = shop.cart.borrow_mut();
    cart.clear_all();
    render_cart(&cart);
}

#[wasm_bindgen(js_name = goToCheckout)]
pub fn go_to_checkout() {
    let Some(shop) = shop() else {
        return;
    };
    if shop.flow.is_none() {
        warn!("checkout requested without a payment provider");
        return;
    }
    if let Some(dialog) = element_as::<HtmlDialogElement>(ids::CHECKOUT_DIALOG) {
        if let Err(e) = dialog.show_modal() {
            warn!(error = %js_message(&e), "checkout dialog did not open");
        }
    }
    hide_message();

    spawn_local(async move {
        let Some(flow) = shop.flow.as_ref() else {
            return;
        };
        let items = shop.cart.borrow().items().to_vec();
        match flow.open_checkout(&items).await {
            Ok(StepOutcome::Ready { dpm_checker_link }) => {
                if let Some(a) = element_as::<HtmlAnchorElement>(ids::DPM_CHECKER) {
                    a.set_href(&dpm_checker_link);
                }
            }
            Ok(StepOutcome::Message(message)) => show_message(&message),
            Ok(StepOutcome::Stale) => {}
            Err(e) => warn!(error = %e, "checkout not opened"),
        }
    });
}

#[wasm_bindgen(js_name = cancelCheckout)]
pub fn cancel_checkout() {
    let Some(shop) = shop() else {
        return;
    };
    if let Some(flow) = shop.flow.as_ref() {
        flow.cancel();
    }
    if let Some(dialog) = element_as::<HtmlDialogElement>(ids::CHECKOUT_DIALOG) {
        dialog.close();
    }
    if let Some(el) = element(ids::PAYMENT_ELEMENT) {
        el.set_inner_html("");
    }
    hide_message();
    show_spinner(false);
}

async fn pay() {
    let Some(shop) = shop() else {
        return;
    };
    let Some(flow) = shop.flow.as_ref() else {
        return;
    };
    show_spinner(true);
    match flow.submit_payment().await {
        Ok(StepOutcome::Message(message)) => show_message(&message),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "payment not submitted"),
    }
    show_spinner(false);
}

// ---------------------------------------------------------------------------
// Completion page
// ---------------------------------------------------------------------------

async fn complete_page(search: String) {
    let Some(storage) = WebStorage::local() else {
        error!("localStorage unavailable");
        render_error();
        return;
    };
    let stripe = match StripeJs::new(publishable_key()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "payment provider unavailable");
            render_error();
            return;
        }
    };

    let view = evaluate_completion(&search, &stripe, &FetchBackend, &storage).await;
    info!(outcome = ?view.outcome, submission = ?view.submission, "completion evaluated");
    render_completion(&view);
}

fn render_display(display: &StatusDisplay) {
    if let Some(icon) = element(ids::STATUS_ICON) {
        let _ = icon.style().set_property("background-color", display.color);
        icon.set_inner_html(icon_svg(display.icon));
    }
    set_text(ids::STATUS_TEXT, display.text);
}

fn render_error() {
    render_display(&StatusDisplay::error());
    hide(ids::DETAILS_TABLE);
    hide(ids::ORDER_LINK);
}

fn render_completion(view: &CompletionView) {
    render_display(&view.display);
    if !view.details_visible {
        hide(ids::DETAILS_TABLE);
        hide(ids::ORDER_LINK);
        return;
    }
    set_text(ids::INTENT_ID, view.intent_id.as_deref().unwrap_or_default());
    set_text(ids::INTENT_STATUS, view.raw_status.as_deref().unwrap_or_default());
    match (&view.order_link, element_as::<HtmlAnchorElement>(ids::ORDER_LINK)) {
        (Some(link), Some(a)) => a.set_href(link),
        (None, _) => hide(ids::ORDER_LINK),
        _ => {}
    }
}
