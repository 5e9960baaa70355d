//! Secrets never live in config.
//!
//! # Invariant under test
//! Any string leaf that looks like a payment secret (Stripe secret,
//! restricted or publishable keys, webhook secrets, PEM blocks) makes loading
//! fail with CONFIG_SECRET_DETECTED, and the error names the leaf pointer but
//! never echoes the value.

use ckt_config::load_layered_yaml_from_strings;

#[test]
fn stripe_secret_key_literal_is_rejected() {
    let yaml = r#"
payment:
  api_key: "sk_test_51HxyzSENTINELVALUE"
"#;
    let err = load_layered_yaml_from_strings(&[yaml])
        .unwrap_err()
        .to_string();
    assert!(err.contains("CONFIG_SECRET_DETECTED"), "got: {err}");
    assert!(err.contains("/payment/api_key"), "got: {err}");
    assert!(!err.contains("SENTINELVALUE"), "value must be redacted, got: {err}");
}

#[test]
fn secret_in_overlay_layer_is_rejected() {
    let base = "orders:\n  dir: ./orders\n";
    let overlay = "orders:\n  note: \"whsec_abcdefghijkl\"\n";
    assert!(load_layered_yaml_from_strings(&[base, overlay]).is_err());
}

#[test]
fn secret_inside_list_is_rejected() {
    let yaml = r#"
assets:
  toolchains:
    standard: ["go", "build", "-ldflags=-X main.k=pk_live_123456789"]
"#;
    // The literal does not *start* with a key prefix, so it passes; keys are
    // only caught as whole values.
    assert!(load_layered_yaml_from_strings(&[yaml]).is_ok());

    let yaml = r#"
assets:
  toolchains:
    standard: ["pk_live_123456789"]
"#;
    let err = load_layered_yaml_from_strings(&[yaml])
        .unwrap_err()
        .to_string();
    assert!(err.contains("/assets/toolchains/standard/0"), "got: {err}");
}

#[test]
fn env_var_names_are_fine() {
    let yaml = r#"
payment:
  currency: "usd"
  api_base: "https://api.stripe.com"
"#;
    assert!(load_layered_yaml_from_strings(&[yaml]).is_ok());
}
