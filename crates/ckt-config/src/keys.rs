//! Payment-key resolution.
//!
//! This module is the single place where the active payment key pair is
//! chosen. Callers resolve once at startup and pass [`PaymentKeys`] into
//! constructors; nothing else reads key flags or env vars.
//!
//! # Mode-aware enforcement
//! - `TEST` (`--teststripekey`): test secret + publishable key are required.
//! - `LIVE` (default): live secret + publishable key are required.
//!
//! Errors name the missing flag and env var, never a value.

use anyhow::{bail, Result};

use crate::flags::{spec, ServerFlags};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode {
    Test,
    Live,
}

impl KeyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyMode::Test => "TEST",
            KeyMode::Live => "LIVE",
        }
    }
}

/// The key pair the server runs with. **Secret key is redacted in `Debug`.**
#[derive(Clone)]
pub struct PaymentKeys {
    pub mode: KeyMode,
    /// Server-side secret key; used only for provider API calls.
    pub secret_key: String,
    /// Publishable key; embedded into the compiled client artifact.
    pub publishable_key: String,
}

impl std::fmt::Debug for PaymentKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentKeys")
            .field("mode", &self.mode)
            .field("secret_key", &"<REDACTED>")
            .field("publishable_key", &self.publishable_key)
            .finish()
    }
}

/// Pick the key pair selected by `flags.use_test_keys` and require both
/// halves to be present.
pub fn resolve_payment_keys(flags: &ServerFlags) -> Result<PaymentKeys> {
    let (mode, sk, sk_flag, pk, pk_flag) = if flags.use_test_keys {
        (
            KeyMode::Test,
            flags.stripe_test_sk.as_deref(),
            "stripetestsk",
            flags.stripe_test_pk.as_deref(),
            "stripetestpk",
        )
    } else {
        (
            KeyMode::Live,
            flags.stripe_live_sk.as_deref(),
            "stripelivesk",
            flags.stripe_live_pk.as_deref(),
            "stripelivepk",
        )
    };

    let Some(secret_key) = sk.filter(|s| !s.trim().is_empty()) else {
        bail!("{}", missing(mode, sk_flag, "secret key"));
    };
    let Some(publishable_key) = pk.filter(|s| !s.trim().is_empty()) else {
        bail!("{}", missing(mode, pk_flag, "publishable key"));
    };

    Ok(PaymentKeys {
        mode,
        secret_key: secret_key.trim().to_string(),
        publishable_key: publishable_key.trim().to_string(),
    })
}

fn missing(mode: KeyMode, flag: &str, what: &str) -> String {
    let env = spec(flag).map(|s| s.env).unwrap_or("?");
    format!(
        "SECRETS_MISSING mode={}: required {} not set; pass --{} or set env var '{}'",
        mode.as_str(),
        what,
        flag,
        env
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(test: bool) -> ServerFlags {
        ServerFlags {
            use_test_keys: test,
            stripe_live_sk: Some("sk_live_abc".to_string()),
            stripe_live_pk: Some("pk_live_abc".to_string()),
            stripe_test_sk: Some("sk_test_abc".to_string()),
            stripe_test_pk: Some("pk_test_abc".to_string()),
            ..ServerFlags::default()
        }
    }

    #[test]
    fn live_pair_is_default() {
        let k = resolve_payment_keys(&flags(false)).unwrap();
        assert_eq!(k.mode, KeyMode::Live);
        assert_eq!(k.secret_key, "sk_live_abc");
        assert_eq!(k.publishable_key, "pk_live_abc");
    }

    #[test]
    fn test_flag_selects_test_pair() {
        let k = resolve_payment_keys(&flags(true)).unwrap();
        assert_eq!(k.mode, KeyMode::Test);
        assert_eq!(k.secret_key, "sk_test_abc");
    }

    #[test]
    fn missing_secret_names_flag_and_env_but_not_values() {
        let mut f = flags(true);
        f.stripe_test_sk = None;
        let msg = resolve_payment_keys(&f).unwrap_err().to_string();
        assert!(msg.contains("SECRETS_MISSING"), "got: {msg}");
        assert!(msg.contains("mode=TEST"), "got: {msg}");
        assert!(msg.contains("--stripetestsk"), "got: {msg}");
        assert!(msg.contains("STRIPETESTSK"), "got: {msg}");
        assert!(!msg.contains("pk_test_abc"), "got: {msg}");
    }

    #[test]
    fn blank_publishable_key_counts_as_missing() {
        let mut f = flags(false);
        f.stripe_live_pk = Some("   ".to_string());
        let msg = resolve_payment_keys(&f).unwrap_err().to_string();
        assert!(msg.contains("--stripelivepk"), "got: {msg}");
    }

    #[test]
    fn debug_never_prints_secret_key() {
        let k = resolve_payment_keys(&flags(false)).unwrap();
        let dbg = format!("{k:?}");
        assert!(!dbg.contains("sk_live_abc"), "got: {dbg}");
    }
}
