//! Page assembly.
//!
//! Pages are templates with `{{name}}` placeholders. The compiled client
//! module is embedded as standard base64 next to the loader glue its own
//! build produced, so a page is a single self-contained response.
//!
//! Templates and the stylesheet ship inside the binary and are replaced by the
//! on-disk copy under `pages_dir` whenever that copy is newer.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use ckt_assets::{AssetCache, AssetError, AssetId, ToolchainKind};
use ckt_config::ServerSettings;

pub const INDEX_HTML: &[u8] = include_bytes!("../assets/index.html");
pub const COMPLETE_HTML: &[u8] = include_bytes!("../assets/complete.html");
pub const CHECKOUT_CSS: &[u8] = include_bytes!("../assets/public/checkout.css");

/// Stylesheet name announced to the completion page.
pub const CSS_NAME: &str = "checkout.css";

/// Cache ids of everything a page is assembled from.
#[derive(Debug, Clone, Copy)]
pub struct PageIds {
    pub index: AssetId,
    pub complete: AssetId,
    pub css: AssetId,
    /// Client module; its glue is the loader script.
    pub client: AssetId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Index,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    Asset(AssetError),
    /// Template bytes are not UTF-8.
    Template(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Asset(e) => write!(f, "{e}"),
            RenderError::Template(msg) => write!(f, "template error: {msg}"),
        }
    }
}

impl std::error::Error for RenderError {}

impl From<AssetError> for RenderError {
    fn from(e: AssetError) -> Self {
        RenderError::Asset(e)
    }
}

/// Register pages, stylesheet and the client bundle.
///
/// The loader is whatever the selected toolchain writes to its loader path
/// during a build, so nothing is read here and a fresh checkout with no
/// build output yet still starts.
pub fn seed(cache: &mut AssetCache, settings: &ServerSettings) -> PageIds {
    let dir = &settings.pages_dir;
    let index = cache.insert_reloadable("index.html", dir.join("index.html"), INDEX_HTML);
    let complete = cache.insert_reloadable("complete.html", dir.join("complete.html"), COMPLETE_HTML);
    let css = cache.insert_reloadable(
        "public/checkout.css",
        dir.join("public").join(CSS_NAME),
        CHECKOUT_CSS,
    );

    let (toolchain, loader) = if settings.client_alt_toolchain {
        (ToolchainKind::Alt, &settings.loader_alt)
    } else {
        (ToolchainKind::Standard, &settings.loader_standard)
    };
    let client =
        cache.insert_compiled_with_glue("ckt_client.wasm", &settings.client_source, toolchain, loader);

    PageIds {
        index,
        complete,
        css,
        client,
    }
}

/// Assemble `page` from the current cache contents.
///
/// # Errors
/// [`RenderError::Asset`] with `NotReady` until the client bundle has been
/// built once.
pub fn render(cache: &AssetCache, ids: &PageIds, page: Page) -> Result<String, RenderError> {
    let template_id = match page {
        Page::Index => ids.index,
        Page::Complete => ids.complete,
    };
    let template = cache.get(template_id)?;
    let template = std::str::from_utf8(&template).map_err(|e| RenderError::Template(e.to_string()))?;

    let (wasm, loader) = cache.get_with_glue(ids.client)?;
    let loader = loader.unwrap_or_default();

    let mut values = vec![
        ("loader_js", String::from_utf8_lossy(&loader).into_owned()),
        ("wasm_base64", STANDARD.encode(&wasm)),
    ];
    if page == Page::Complete {
        let css = cache.get(ids.css)?;
        values.push(("css", String::from_utf8_lossy(&css).into_owned()));
        values.push(("css_name", CSS_NAME.to_string()));
    }

    Ok(substitute(template, &values))
}

/// Replace every `{{ key }}` whose key is in `values`. Unknown keys are left
/// as written; substituted text is never rescanned.
pub fn substitute(template: &str, values: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };
        let key = after[..close].trim();
        match values.iter().find(|(k, _)| *k == key) {
            Some((_, v)) => out.push_str(v),
            None => out.push_str(&rest[open..open + 2 + close + 2]),
        }
        rest = &after[close + 2..];
    }
    out.push_str(rest);
    out
}

/// Minimal white-on-black page for failures while assembling a page.
pub fn error_page(msg: &str) -> String {
    let mut escaped = String::with_capacity(msg.len());
    for c in msg.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\n' => escaped.push_str("<br>"),
            c => escaped.push(c),
        }
    }
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Error</title></head>\
         <body style='background-color: black; color: white;'><div>{escaped}</div></body></html>"
    )
}
