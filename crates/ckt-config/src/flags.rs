//! Declarative command-line flag table.
//!
//! Each server setting that can be given on the command line is described by
//! one [`FlagSpec`] row in [`SERVER_FLAGS`]: its long name, short letter,
//! environment variable, default, help text and the typed slot in
//! [`ServerFlags`] it fills. The binary builds its clap command from this
//! table and resolves values through [`ServerFlags::resolve`], so adding a
//! flag means adding a row and a slot, nothing else.
//!
//! Precedence per flag: explicit CLI value > environment variable > default.

use anyhow::{bail, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    Bool,
    Str,
    Int,
}

/// Typed destination of a flag value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagSlot {
    UseTestKeys,
    StripeLiveSk,
    StripeLivePk,
    StripeTestSk,
    StripeTestPk,
    WebPort,
    ConfigPaths,
    EnvFile,
}

#[derive(Debug, Clone, Copy)]
pub struct FlagSpec {
    /// Long flag name (`--<name>`), also the stable symbolic name.
    pub name: &'static str,
    pub short: char,
    /// Environment variable consulted when the flag is absent.
    pub env: &'static str,
    pub kind: FlagKind,
    /// Default in string form; empty means "unset".
    pub default: &'static str,
    pub description: &'static str,
    pub slot: FlagSlot,
    /// Never echoed in help defaults, errors or `Debug`.
    pub secret: bool,
}

impl FlagSpec {
    /// Help line shown by the binary: description plus the env var name.
    pub fn help(&self) -> String {
        format!("{} [env: {}]", self.description, self.env)
    }
}

pub const SERVER_FLAGS: &[FlagSpec] = &[
    FlagSpec {
        name: "teststripekey",
        short: 'a',
        env: "TESTSTRIPEKEY",
        kind: FlagKind::Bool,
        default: "false",
        description: "use stripe test api keys instead of live keys",
        slot: FlagSlot::UseTestKeys,
        secret: false,
    },
    FlagSpec {
        name: "stripelivesk",
        short: 'b',
        env: "STRIPELIVESK",
        kind: FlagKind::Str,
        default: "",
        description: "stripe live api secret key",
        slot: FlagSlot::StripeLiveSk,
        secret: true,
    },
    FlagSpec {
        name: "stripelivepk",
        short: 'c',
        env: "STRIPELIVEPK",
        kind: FlagKind::Str,
        default: "",
        description: "stripe live api publishable key",
        slot: FlagSlot::StripeLivePk,
        secret: false,
    },
    FlagSpec {
        name: "stripetestsk",
        short: 'd',
        env: "STRIPETESTSK",
        kind: FlagKind::Str,
        default: "",
        description: "stripe test api secret key",
        slot: FlagSlot::StripeTestSk,
        secret: true,
    },
    FlagSpec {
        name: "stripetestpk",
        short: 'e',
        env: "STRIPETESTPK",
        kind: FlagKind::Str,
        default: "",
        description: "stripe test api publishable key",
        slot: FlagSlot::StripeTestPk,
        secret: false,
    },
    FlagSpec {
        name: "webport",
        short: 'f',
        env: "WEBPORT",
        kind: FlagKind::Int,
        default: "8080",
        description: "port to serve on",
        slot: FlagSlot::WebPort,
        secret: false,
    },
    FlagSpec {
        name: "config",
        short: 'g',
        env: "CKT_CONFIG",
        kind: FlagKind::Str,
        default: "",
        description: "comma-separated yaml config layers, base first",
        slot: FlagSlot::ConfigPaths,
        secret: false,
    },
    // 'h' stays free for --help.
    FlagSpec {
        name: "envfile",
        short: 'i',
        env: "CKT_ENV_FILE",
        kind: FlagKind::Str,
        default: ".env.local",
        description: "environment file loaded before flags are resolved",
        slot: FlagSlot::EnvFile,
        secret: false,
    },
];

/// Look up a row by its symbolic name.
pub fn spec(name: &str) -> Option<&'static FlagSpec> {
    SERVER_FLAGS.iter().find(|s| s.name == name)
}

/// Resolved flag values. **Secret keys are redacted in `Debug` output.**
#[derive(Clone, Default)]
pub struct ServerFlags {
    pub use_test_keys: bool,
    pub stripe_live_sk: Option<String>,
    pub stripe_live_pk: Option<String>,
    pub stripe_test_sk: Option<String>,
    pub stripe_test_pk: Option<String>,
    pub web_port: u16,
    pub config_paths: Vec<String>,
    pub env_file: Option<String>,
}

impl std::fmt::Debug for ServerFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerFlags")
            .field("use_test_keys", &self.use_test_keys)
            .field(
                "stripe_live_sk",
                &self.stripe_live_sk.as_ref().map(|_| "<REDACTED>"),
            )
            .field("stripe_live_pk", &self.stripe_live_pk)
            .field(
                "stripe_test_sk",
                &self.stripe_test_sk.as_ref().map(|_| "<REDACTED>"),
            )
            .field("stripe_test_pk", &self.stripe_test_pk)
            .field("web_port", &self.web_port)
            .field("config_paths", &self.config_paths)
            .field("env_file", &self.env_file)
            .finish()
    }
}

impl ServerFlags {
    /// Resolve every row of [`SERVER_FLAGS`].
    ///
    /// `cli` returns the raw command-line value for a row (if given);
    /// `env` looks up an environment variable by name. Empty strings count
    /// as absent at every level.
    pub fn resolve<C, E>(cli: C, env: E) -> Result<Self>
    where
        C: Fn(&FlagSpec) -> Option<String>,
        E: Fn(&str) -> Option<String>,
    {
        let mut out = Self::default();
        for spec in SERVER_FLAGS {
            let raw = raw_value(spec, &cli, &env);
            out.assign(spec, raw.as_deref())?;
        }
        Ok(out)
    }

    fn assign(&mut self, spec: &FlagSpec, raw: Option<&str>) -> Result<()> {
        match spec.slot {
            FlagSlot::UseTestKeys => self.use_test_keys = parse_bool(spec, raw)?,
            FlagSlot::StripeLiveSk => self.stripe_live_sk = raw.map(str::to_string),
            FlagSlot::StripeLivePk => self.stripe_live_pk = raw.map(str::to_string),
            FlagSlot::StripeTestSk => self.stripe_test_sk = raw.map(str::to_string),
            FlagSlot::StripeTestPk => self.stripe_test_pk = raw.map(str::to_string),
            FlagSlot::WebPort => {
                let port = parse_int(spec, raw)?;
                self.web_port = u16::try_from(port).map_err(|_| {
                    anyhow::anyhow!("FLAG_INVALID --{}: {} is not a valid port", spec.name, port)
                })?;
            }
            FlagSlot::ConfigPaths => {
                self.config_paths = raw
                    .map(|r| {
                        r.split(',')
                            .map(str::trim)
                            .filter(|p| !p.is_empty())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
            }
            FlagSlot::EnvFile => self.env_file = raw.map(str::to_string),
        }
        Ok(())
    }
}

/// Resolve only the env-file row. The binary loads that file before calling
/// [`ServerFlags::resolve`] so its variables take part in resolution.
pub fn env_file_path<C, E>(cli: C, env: E) -> Option<String>
where
    C: Fn(&FlagSpec) -> Option<String>,
    E: Fn(&str) -> Option<String>,
{
    let spec = spec("envfile")?;
    raw_value(spec, &cli, &env)
}

fn raw_value<C, E>(spec: &FlagSpec, cli: &C, env: &E) -> Option<String>
where
    C: Fn(&FlagSpec) -> Option<String>,
    E: Fn(&str) -> Option<String>,
{
    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    non_empty(cli(spec))
        .or_else(|| non_empty(env(spec.env)))
        .or_else(|| non_empty(Some(spec.default.to_string())))
}

fn parse_bool(spec: &FlagSpec, raw: Option<&str>) -> Result<bool> {
    let Some(raw) = raw else {
        return Ok(false);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Ok(true),
        "0" | "f" | "false" | "no" | "off" => Ok(false),
        other => bail!(
            "FLAG_INVALID --{} (env {}): '{}' is not a bool",
            spec.name,
            spec.env,
            other
        ),
    }
}

fn parse_int(spec: &FlagSpec, raw: Option<&str>) -> Result<i64> {
    let Some(raw) = raw else {
        return Ok(0);
    };
    match raw.trim().parse::<i64>() {
        Ok(n) => Ok(n),
        Err(_) => bail!(
            "FLAG_INVALID --{} (env {}): '{}' is not an integer",
            spec.name,
            spec.env,
            raw.trim()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn no_cli(_: &FlagSpec) -> Option<String> {
        None
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn table_names_shorts_and_envs_are_unique() {
        let mut names = std::collections::HashSet::new();
        let mut shorts = std::collections::HashSet::new();
        let mut envs = std::collections::HashSet::new();
        for s in SERVER_FLAGS {
            assert!(names.insert(s.name), "duplicate name {}", s.name);
            assert!(shorts.insert(s.short), "duplicate short {}", s.short);
            assert!(envs.insert(s.env), "duplicate env {}", s.env);
            assert_ne!(s.short, 'h', "-h is reserved for help");
        }
    }

    #[test]
    fn defaults_apply_when_nothing_is_given() {
        let f = ServerFlags::resolve(no_cli, no_env).unwrap();
        assert!(!f.use_test_keys);
        assert_eq!(f.web_port, 8080);
        assert!(f.stripe_live_sk.is_none());
        assert!(f.config_paths.is_empty());
        assert_eq!(f.env_file.as_deref(), Some(".env.local"));
    }

    #[test]
    fn cli_beats_env_beats_default() {
        let env: HashMap<&str, &str> = [("WEBPORT", "9000"), ("TESTSTRIPEKEY", "true")].into();
        let env_fn = |k: &str| env.get(k).map(|v| v.to_string());

        let f = ServerFlags::resolve(no_cli, env_fn).unwrap();
        assert_eq!(f.web_port, 9000);
        assert!(f.use_test_keys);

        let cli = |s: &FlagSpec| (s.name == "webport").then(|| "7000".to_string());
        let f = ServerFlags::resolve(cli, env_fn).unwrap();
        assert_eq!(f.web_port, 7000);
    }

    #[test]
    fn empty_values_fall_through() {
        let cli = |s: &FlagSpec| (s.name == "webport").then(|| "".to_string());
        let env = |k: &str| (k == "WEBPORT").then(|| "8181".to_string());
        let f = ServerFlags::resolve(cli, env).unwrap();
        assert_eq!(f.web_port, 8181);
    }

    #[test]
    fn config_paths_split_on_commas() {
        let cli = |s: &FlagSpec| {
            (s.name == "config").then(|| "config/base.yaml, config/prod.yaml,".to_string())
        };
        let f = ServerFlags::resolve(cli, no_env).unwrap();
        assert_eq!(f.config_paths, vec!["config/base.yaml", "config/prod.yaml"]);
    }

    #[test]
    fn bad_values_name_the_flag() {
        let env = |k: &str| (k == "WEBPORT").then(|| "eighty".to_string());
        let err = ServerFlags::resolve(no_cli, env).unwrap_err().to_string();
        assert!(err.contains("--webport"), "got: {err}");

        let env = |k: &str| (k == "WEBPORT").then(|| "70000".to_string());
        assert!(ServerFlags::resolve(no_cli, env).is_err());
    }

    #[test]
    fn debug_redacts_secret_keys() {
        let env = |k: &str| (k == "STRIPETESTSK").then(|| "sk_test_verysecret".to_string());
        let f = ServerFlags::resolve(no_cli, env).unwrap();
        let dbg = format!("{f:?}");
        assert!(!dbg.contains("verysecret"), "got: {dbg}");
        assert!(dbg.contains("<REDACTED>"));
    }

    #[test]
    fn env_file_path_resolves_alone() {
        let env = |k: &str| (k == "CKT_ENV_FILE").then(|| "/etc/ckt.env".to_string());
        assert_eq!(env_file_path(no_cli, env).as_deref(), Some("/etc/ckt.env"));
    }
}
