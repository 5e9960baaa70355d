//! Unused-key guard.
//!
//! A leaf the server never reads is reported under `Warn` and is fatal under
//! `Fail`. Leaves below a consumed pointer (lists and maps alike) never count,
//! and the reported pointers come back sorted.

use ckt_config::{load_layered_yaml_from_strings, report_unused_keys, UnusedKeyPolicy};

#[test]
fn warn_mode_reports_unused_keys_without_error() {
    let yaml = r#"
orders:
  dir: ./orders

unused_section:
  foo: 123
  bar: 456
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).expect("config load must succeed");
    let report =
        report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn).expect("warn must not error");

    assert!(!report.is_clean());
    assert!(report
        .unused_leaf_pointers
        .contains(&"/unused_section/foo".to_string()));
    assert!(report
        .unused_leaf_pointers
        .contains(&"/unused_section/bar".to_string()));
    assert!(!report
        .unused_leaf_pointers
        .contains(&"/orders/dir".to_string()));
}

#[test]
fn fail_mode_errors_on_unused_keys() {
    let yaml = r#"
server:
  bind: 127.0.0.1
  workers: 4
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let err = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail)
        .unwrap_err()
        .to_string();
    assert!(err.contains("CONFIG_UNUSED_KEYS"), "got: {err}");
    assert!(err.contains("/server/workers"), "got: {err}");
}

#[test]
fn nested_consumed_prefixes_cover_lists_and_maps() {
    let yaml = r#"
assets:
  toolchains:
    standard: ["cargo", "build", "{source}"]
    env:
      CARGO_TERM_COLOR: never
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap();
    assert!(report.is_clean(), "unexpected: {:?}", report.unused_leaf_pointers);
}

#[test]
fn unused_pointers_are_sorted() {
    let yaml = r#"
zzz: 1
aaa: 2
mmm:
  x: 3
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn).unwrap();
    assert_eq!(report.unused_leaf_pointers, vec!["/aaa", "/mmm/x", "/zzz"]);
}
