//! Config hash stability.
//!
//! GREEN when:
//! - loading the same layers twice yields the same `config_hash`;
//! - reordering keys within a YAML document does not change the hash;
//! - a changed value changes the hash;
//! - an overlay layer changes the hash of the merged document.

use ckt_config::load_layered_yaml_from_strings;

const BASE_YAML: &str = r#"
server:
  bind: "0.0.0.0"
assets:
  refresh_interval_ms: 1000
  client:
    source: "crates/ckt-client/src/lib.rs"
    alt_toolchain: true
orders:
  dir: "./orders"
"#;

/// Same content as BASE_YAML but with keys in a different order.
const BASE_YAML_REORDERED: &str = r#"
orders:
  dir: "./orders"
assets:
  client:
    alt_toolchain: true
    source: "crates/ckt-client/src/lib.rs"
  refresh_interval_ms: 1000
server:
  bind: "0.0.0.0"
"#;

const OVERLAY_YAML: &str = r#"
orders:
  write_policy: "reject_existing"
"#;

#[test]
fn same_input_same_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
}

#[test]
fn key_order_does_not_change_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
}

#[test]
fn different_value_different_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let changed = BASE_YAML.replace("1000", "250");
    let b = load_layered_yaml_from_strings(&[changed.as_str()]).unwrap();
    assert_ne!(a.config_hash, b.config_hash);
}

#[test]
fn overlay_changes_merged_hash() {
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let merged = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_ne!(base.config_hash, merged.config_hash);
    assert_eq!(merged.config_json["orders"]["dir"], "./orders");
    assert_eq!(merged.config_json["orders"]["write_policy"], "reject_existing");
}

#[test]
fn hash_is_hex_sha256() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash.len(), 64);
    assert!(a.config_hash.chars().all(|c| c.is_ascii_hexdigit()));
}
