//! External toolchain invocation.
//!
//! A [`Builder`] turns a source path into artifact bytes. The production
//! implementation, [`CommandBuilder`], runs one of two argv templates (the
//! standard or the alternate toolchain) and captures stdout as the artifact.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

/// Which toolchain an entry is compiled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolchainKind {
    Standard,
    Alt,
}

/// Everything a build needs. `embed` is the build-time value baked into the
/// artifact (the publishable payment key).
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub name: String,
    pub source: PathBuf,
    pub toolchain: ToolchainKind,
    pub embed: String,
}

#[derive(Debug)]
pub enum BuildError {
    /// The toolchain program could not be started.
    Spawn { program: String, source: std::io::Error },
    /// The toolchain ran and exited unsuccessfully.
    Failed { status: String, stderr: String },
    /// The toolchain exited cleanly but produced no bytes.
    EmptyOutput,
    /// The toolchain argv template is empty.
    NoProgram,
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::Spawn { program, source } => {
                write!(f, "failed to start toolchain '{program}': {source}")
            }
            BuildError::Failed { status, stderr } => {
                write!(f, "toolchain exited with {status}: {}", stderr.trim())
            }
            BuildError::EmptyOutput => write!(f, "toolchain produced an empty artifact"),
            BuildError::NoProgram => write!(f, "toolchain argv is empty"),
        }
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BuildError::Spawn { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Compiles one source into artifact bytes.
///
/// Implementations must be `Send + Sync`: the cache is shared between the
/// refresher task and request handlers.
#[async_trait]
pub trait Builder: Send + Sync {
    async fn build(&self, req: &BuildRequest) -> Result<Bytes, BuildError>;
}

/// argv template plus extra environment for one toolchain.
///
/// `{source}` and `{embed}` are substituted in every argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub argv: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl Toolchain {
    pub fn new(argv: Vec<String>, env: BTreeMap<String, String>) -> Self {
        Self { argv, env }
    }

    fn render(&self, source: &Path, embed: &str) -> Vec<String> {
        let source = source.to_string_lossy();
        self.argv
            .iter()
            .map(|a| a.replace("{source}", &source).replace("{embed}", embed))
            .collect()
    }
}

/// Runs the configured toolchain as a child process.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    standard: Toolchain,
    alt: Toolchain,
}

impl CommandBuilder {
    pub fn new(standard: Toolchain, alt: Toolchain) -> Self {
        Self { standard, alt }
    }

    fn toolchain(&self, kind: ToolchainKind) -> &Toolchain {
        match kind {
            ToolchainKind::Standard => &self.standard,
            ToolchainKind::Alt => &self.alt,
        }
    }
}

#[async_trait]
impl Builder for CommandBuilder {
    async fn build(&self, req: &BuildRequest) -> Result<Bytes, BuildError> {
        let tc = self.toolchain(req.toolchain);
        let argv = tc.render(&req.source, &req.embed);
        let (program, args) = argv.split_first().ok_or(BuildError::NoProgram)?;

        debug!(asset = %req.name, %program, toolchain = ?req.toolchain, "spawning toolchain");

        let output = tokio::process::Command::new(program)
            .args(args)
            .envs(&tc.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| BuildError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(BuildError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        if output.stdout.is_empty() {
            return Err(BuildError::EmptyOutput);
        }
        Ok(Bytes::from(output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Toolchain {
        Toolchain::new(
            vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            BTreeMap::new(),
        )
    }

    fn req(kind: ToolchainKind) -> BuildRequest {
        BuildRequest {
            name: "client.wasm".to_string(),
            source: PathBuf::from("client/src/lib.rs"),
            toolchain: kind,
            embed: "pk_test_123".to_string(),
        }
    }

    #[test]
    fn render_substitutes_placeholders() {
        let tc = Toolchain::new(
            vec![
                "cargo".to_string(),
                "--config=env.KEY=\"{embed}\"".to_string(),
                "{source}".to_string(),
            ],
            BTreeMap::new(),
        );
        let argv = tc.render(Path::new("a/lib.rs"), "pk_1");
        assert_eq!(argv, vec!["cargo", "--config=env.KEY=\"pk_1\"", "a/lib.rs"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stdout_becomes_the_artifact_and_toolchain_is_selected() {
        let b = CommandBuilder::new(sh("printf standard"), sh("printf alt"));
        assert_eq!(&b.build(&req(ToolchainKind::Standard)).await.unwrap()[..], b"standard");
        assert_eq!(&b.build(&req(ToolchainKind::Alt)).await.unwrap()[..], b"alt");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn toolchain_env_is_passed_through() {
        let mut tc = sh("printf \"$CKT_TARGET/$CKT_PROFILE\"");
        tc.env.insert("CKT_TARGET".to_string(), "wasm32".to_string());
        tc.env.insert("CKT_PROFILE".to_string(), "release".to_string());
        let b = CommandBuilder::new(tc.clone(), tc);
        assert_eq!(&b.build(&req(ToolchainKind::Standard)).await.unwrap()[..], b"wasm32/release");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_a_failure_with_stderr() {
        let b = CommandBuilder::new(sh("echo boom >&2; exit 3"), sh("true"));
        match b.build(&req(ToolchainKind::Standard)).await {
            Err(BuildError::Failed { stderr, .. }) => assert!(stderr.contains("boom")),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn empty_stdout_is_a_failure() {
        let b = CommandBuilder::new(sh("true"), sh("true"));
        assert!(matches!(
            b.build(&req(ToolchainKind::Alt)).await,
            Err(BuildError::EmptyOutput)
        ));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let tc = Toolchain::new(
            vec!["ckt-no-such-toolchain-binary".to_string()],
            BTreeMap::new(),
        );
        let b = CommandBuilder::new(tc.clone(), tc);
        assert!(matches!(
            b.build(&req(ToolchainKind::Standard)).await,
            Err(BuildError::Spawn { .. })
        ));
    }
}
