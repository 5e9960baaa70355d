//! Typed view over the merged config document.
//!
//! Every field has a default so an empty config yields a runnable server.
//! The pointers read here must match [`crate::CONSUMED_POINTERS`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use serde_json::Value;

/// What to do when an order for an already-stored intent id is submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicySetting {
    Overwrite,
    RejectExisting,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub bind: String,
    pub refresh_interval: Duration,
    /// Directory the embedded pages are re-read from when newer on disk.
    pub pages_dir: PathBuf,
    pub client_source: PathBuf,
    pub client_alt_toolchain: bool,
    /// Loader glue each toolchain writes during a build; picked up together
    /// with the module it was generated for.
    pub loader_standard: PathBuf,
    pub loader_alt: PathBuf,
    /// argv templates; `{source}` and `{embed}` are substituted per build.
    pub toolchain_standard: Vec<String>,
    pub toolchain_alt: Vec<String>,
    pub toolchain_env: BTreeMap<String, String>,
    pub orders_dir: PathBuf,
    pub orders_write_policy: WritePolicySetting,
    pub payment_api_base: String,
    pub payment_currency: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            refresh_interval: Duration::from_millis(1000),
            pages_dir: PathBuf::from("."),
            client_source: PathBuf::from("crates/ckt-client/src/lib.rs"),
            client_alt_toolchain: false,
            loader_standard: PathBuf::from("public/ckt_client.js"),
            loader_alt: PathBuf::from("public/ckt_client.js"),
            toolchain_standard: argv(&[
                "sh",
                "-c",
                CLIENT_BUILD_SCRIPT,
                "ckt-build",
                "{embed}",
                "",
            ]),
            toolchain_alt: argv(&[
                "sh",
                "-c",
                CLIENT_BUILD_SCRIPT,
                "ckt-build",
                "{embed}",
                "wasm-opt -Oz public/ckt_client_bg.wasm -o /dev/stdout",
            ]),
            toolchain_env: [("CARGO_TERM_COLOR", "never")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            orders_dir: PathBuf::from("./orders"),
            orders_write_policy: WritePolicySetting::Overwrite,
            payment_api_base: "https://api.stripe.com".to_string(),
            payment_currency: "usd".to_string(),
        }
    }
}

/// Builds the browser crate for wasm32, writes the bindgen glue next to the
/// other public assets and prints the module on stdout. `$1` is the
/// publishable key, `$2` an optional post-processing command that prints the
/// final module instead.
const CLIENT_BUILD_SCRIPT: &str = r#"set -e
CKT_PUBLISHABLE_KEY="$1" cargo build -q --release -p ckt-client --target wasm32-unknown-unknown >&2
wasm-bindgen --target no-modules --out-dir public --out-name ckt_client target/wasm32-unknown-unknown/release/ckt_client.wasm >&2
if [ -n "$2" ]; then eval "$2"; else cat public/ckt_client_bg.wasm; fi"#;

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

impl ServerSettings {
    /// Read settings from a merged config document, falling back to defaults
    /// for absent keys. Present keys of the wrong type are errors.
    pub fn from_config_json(cfg: &Value) -> Result<Self> {
        let mut s = Self::default();

        if let Some(v) = read_str(cfg, "/server/bind")? {
            s.bind = v;
        }
        if let Some(ms) = read_u64(cfg, "/assets/refresh_interval_ms")? {
            if ms == 0 {
                bail!("CONFIG_INVALID leaf=/assets/refresh_interval_ms: must be > 0");
            }
            s.refresh_interval = Duration::from_millis(ms);
        }
        if let Some(v) = read_str(cfg, "/assets/pages_dir")? {
            s.pages_dir = PathBuf::from(v);
        }
        if let Some(v) = read_str(cfg, "/assets/client/source")? {
            s.client_source = PathBuf::from(v);
        }
        if let Some(v) = read_bool(cfg, "/assets/client/alt_toolchain")? {
            s.client_alt_toolchain = v;
        }
        if let Some(v) = read_str(cfg, "/assets/loaders/standard")? {
            s.loader_standard = PathBuf::from(v);
        }
        if let Some(v) = read_str(cfg, "/assets/loaders/alt")? {
            s.loader_alt = PathBuf::from(v);
        }
        if let Some(v) = read_argv(cfg, "/assets/toolchains/standard")? {
            s.toolchain_standard = v;
        }
        if let Some(v) = read_argv(cfg, "/assets/toolchains/alt")? {
            s.toolchain_alt = v;
        }
        if let Some(v) = read_str_map(cfg, "/assets/toolchains/env")? {
            s.toolchain_env = v;
        }
        if let Some(v) = read_str(cfg, "/orders/dir")? {
            s.orders_dir = PathBuf::from(v);
        }
        if let Some(v) = read_str(cfg, "/orders/write_policy")? {
            s.orders_write_policy = match v.trim().to_ascii_lowercase().as_str() {
                "overwrite" => WritePolicySetting::Overwrite,
                "reject_existing" => WritePolicySetting::RejectExisting,
                other => bail!(
                    "CONFIG_INVALID leaf=/orders/write_policy: '{}'; expected overwrite | reject_existing",
                    other
                ),
            };
        }
        if let Some(v) = read_str(cfg, "/payment/api_base")? {
            s.payment_api_base = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = read_str(cfg, "/payment/currency")? {
            s.payment_currency = v.trim().to_ascii_lowercase();
        }

        Ok(s)
    }
}

fn read_str(cfg: &Value, ptr: &str) -> Result<Option<String>> {
    match cfg.pointer(ptr) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => bail!("CONFIG_INVALID leaf={ptr}: expected a string"),
    }
}

fn read_bool(cfg: &Value, ptr: &str) -> Result<Option<bool>> {
    match cfg.pointer(ptr) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => bail!("CONFIG_INVALID leaf={ptr}: expected a bool"),
    }
}

fn read_u64(cfg: &Value, ptr: &str) -> Result<Option<u64>> {
    match cfg.pointer(ptr) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => match v.as_u64() {
            Some(n) => Ok(Some(n)),
            None => bail!("CONFIG_INVALID leaf={ptr}: expected a non-negative integer"),
        },
    }
}

fn read_argv(cfg: &Value, ptr: &str) -> Result<Option<Vec<String>>> {
    match cfg.pointer(ptr) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for it in items {
                match it.as_str() {
                    Some(s) => out.push(s.to_string()),
                    None => bail!("CONFIG_INVALID leaf={ptr}: argv entries must be strings"),
                }
            }
            if out.is_empty() {
                bail!("CONFIG_INVALID leaf={ptr}: argv must name a program");
            }
            Ok(Some(out))
        }
        Some(_) => bail!("CONFIG_INVALID leaf={ptr}: expected a list of strings"),
    }
}

fn read_str_map(cfg: &Value, ptr: &str) -> Result<Option<BTreeMap<String, String>>> {
    match cfg.pointer(ptr) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => {
            let mut out = BTreeMap::new();
            for (k, v) in map {
                let val = match v {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => bail!("CONFIG_INVALID leaf={ptr}/{k}: expected a scalar"),
                };
                out.insert(k.clone(), val);
            }
            Ok(Some(out))
        }
        Some(_) => bail!("CONFIG_INVALID leaf={ptr}: expected a map"),
    }
}
