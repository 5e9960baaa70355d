//! ckt-config
//!
//! Layered YAML configuration for the checkout server, the declarative
//! command-line flag table, and payment-key resolution.
//!
//! Secrets never live in YAML: the loader rejects secret-looking literals and
//! keys come in only through flags or the environment (see [`flags`] and
//! [`keys`]).

pub mod flags;
pub mod keys;
mod settings;

pub use settings::{ServerSettings, WritePolicySetting};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Leading text of values that must come from flags or the environment.
const SECRET_PREFIXES: &[&str] = &[
    "sk_live",
    "sk_test",
    "rk_live",
    "rk_test",
    "whsec_",
    "pk_live",
    "pk_test",
    "-----BEGIN",
];

/// Config subtrees the server reads, as JSON pointers. A leaf under any of
/// these counts as used.
///
/// Keep in step with [`ServerSettings::from_config_json`].
pub const CONSUMED_POINTERS: &[&str] = &[
    "/server/bind",
    "/assets/refresh_interval_ms",
    "/assets/pages_dir",
    "/assets/client/source",
    "/assets/client/alt_toolchain",
    "/assets/loaders/standard",
    "/assets/loaders/alt",
    "/assets/toolchains/standard",
    "/assets/toolchains/alt",
    "/assets/toolchains/env",
    "/orders/dir",
    "/orders/write_policy",
    "/payment/api_base",
    "/payment/currency",
];

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// SHA-256 of `canonical_json`, hex.
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// An empty config: every setting takes its default.
    pub fn empty() -> Result<Self> {
        load_layered_yaml_from_strings(&[])
    }
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let docs = paths
        .iter()
        .map(|p| std::fs::read_to_string(p).with_context(|| format!("reading config layer {p}")))
        .collect::<Result<Vec<_>>>()?;
    let refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&refs)
}

/// Merge `yaml_docs` in order (later layers win, maps merge key by key),
/// reject secret literals and hash the result.
pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());
    for (i, raw) in yaml_docs.iter().enumerate() {
        let layer: serde_yaml::Value =
            serde_yaml::from_str(raw).with_context(|| format!("config layer {i} is not valid yaml"))?;
        if layer.is_null() {
            continue;
        }
        let layer = serde_json::to_value(layer)
            .with_context(|| format!("config layer {i} has no json form"))?;
        merge_layer(&mut merged, layer);
    }

    for (ptr, leaf) in leaves(&merged) {
        if leaf.as_str().is_some_and(looks_like_secret) {
            bail!("CONFIG_SECRET_DETECTED leaf={ptr} value=REDACTED");
        }
    }

    // serde_json maps are key-ordered, so this text is canonical.
    let canonical_json = serde_json::to_string(&merged).context("serializing merged config")?;
    let config_hash = hex::encode(Sha256::digest(canonical_json.as_bytes()));
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn merge_layer(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => {
            for (k, v) in layer {
                merge_layer(base.entry(k).or_insert(Value::Null), v);
            }
        }
        (slot, v) => *slot = v,
    }
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    t.len() >= 8 && SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

/// Every scalar with its JSON pointer, keys in map order. Empty maps and
/// lists contribute nothing.
fn leaves(v: &Value) -> Vec<(String, &Value)> {
    fn walk<'a>(v: &'a Value, ptr: &mut String, out: &mut Vec<(String, &'a Value)>) {
        let children: Vec<(String, &'a Value)> = match v {
            Value::Object(m) => m
                .iter()
                .map(|(k, v)| (k.replace('~', "~0").replace('/', "~1"), v))
                .collect(),
            Value::Array(a) => a.iter().enumerate().map(|(i, v)| (i.to_string(), v)).collect(),
            _ => {
                let p = if ptr.is_empty() { "/".to_string() } else { ptr.clone() };
                out.push((p, v));
                return;
            }
        };
        for (token, child) in children {
            let len = ptr.len();
            ptr.push('/');
            ptr.push_str(&token);
            walk(child, ptr, out);
            ptr.truncate(len);
        }
    }

    let mut out = Vec::new();
    walk(v, &mut String::new(), &mut out);
    out
}

// ---------------------------------------------------------------------------
// Unused-key guard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    pub leaf_count: usize,
    /// Sorted, unique.
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// `/a/b` covers `/a/b` and `/a/b/c`, never `/a/bc`.
fn covers(prefix: &str, leaf: &str) -> bool {
    prefix == "/"
        || leaf
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// List config leaves no server setting reads. Under
/// [`UnusedKeyPolicy::Fail`] any such leaf is an error.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let all = leaves(config_json);
    let mut unused: Vec<String> = all
        .iter()
        .map(|(ptr, _)| ptr)
        .filter(|ptr| !CONSUMED_POINTERS.iter().any(|c| covers(c, ptr)))
        .cloned()
        .collect();
    unused.sort();
    unused.dedup();

    if policy == UnusedKeyPolicy::Fail && !unused.is_empty() {
        let preview: Vec<&str> = unused.iter().take(12).map(String::as_str).collect();
        bail!(
            "CONFIG_UNUSED_KEYS: {} config key(s) are not read by the server: {}",
            unused.len(),
            preview.join(", ")
        );
    }

    Ok(UnusedKeyReport {
        leaf_count: all.len(),
        unused_leaf_pointers: unused,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn covers_respects_segment_boundary() {
        assert!(covers("/orders", "/orders/dir"));
        assert!(covers("/orders/dir", "/orders/dir"));
        assert!(!covers("/orders/dir", "/orders/directory"));
        assert!(covers("/", "/anything"));
    }

    #[test]
    fn later_layers_override_earlier_ones() {
        let loaded = load_layered_yaml_from_strings(&[
            "orders:\n  dir: ./a\n  write_policy: overwrite\n",
            "orders:\n  dir: ./b\n",
        ])
        .unwrap();
        assert_eq!(loaded.config_json["orders"]["dir"], "./b");
        assert_eq!(loaded.config_json["orders"]["write_policy"], "overwrite");
    }

    #[test]
    fn empty_documents_are_ignored() {
        let loaded = load_layered_yaml_from_strings(&["", "server:\n  bind: 127.0.0.1\n"]).unwrap();
        assert_eq!(loaded.config_json["server"]["bind"], "127.0.0.1");
    }

    #[test]
    fn short_strings_are_never_secrets() {
        assert!(!looks_like_secret("sk_"));
        assert!(looks_like_secret("sk_test_51Habcdef"));
    }

    #[test]
    fn leaves_escape_tokens_and_index_arrays() {
        let v = json!({"a/b": {"c~d": 1}, "list": ["x", {}, null], "empty": {}});
        let ptrs: Vec<String> = leaves(&v).into_iter().map(|(p, _)| p).collect();
        assert_eq!(ptrs, vec!["/a~1b/c~0d", "/list/0", "/list/2"]);
        assert!(leaves(&json!({})).is_empty());
        assert_eq!(leaves(&json!(3))[0].0, "/");
    }
}
