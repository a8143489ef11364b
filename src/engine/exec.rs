//! Running the external program on a work item.

use crate::config::Settings;
use crate::error::Result;
use crate::model::work::WorkItem;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, warn};

/// Default variable carrying the payload.
pub const DEFAULT_PAYLOAD_ENV: &str = "WORK_PAYLOAD";

/// Variable carrying the item key, when the item has one.
pub const KEY_ENV: &str = "WORK_KEY";

/// Why an execution did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionFailure {
    #[error("program exited with status {0}")]
    Exited(i32),
    #[error("program was terminated by a signal")]
    Signaled,
    #[error("program could not be started: {0}")]
    Spawn(String),
}

/// Outcome of one execution. Only success or failure matters to the
/// controller; output streams are inherited, not captured.
pub type ExecutionOutcome = std::result::Result<(), ExecutionFailure>;

/// Runs the unit of work.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, item: &WorkItem) -> ExecutionOutcome;
}

/// How the external program is invoked.
#[derive(Debug, Clone)]
pub struct ExecConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Variable the payload is exposed in. None disables it.
    pub payload_env: Option<String>,
    /// Append the payload as the last argument.
    pub payload_arg: bool,
    /// Extra variables always passed to the program.
    pub env: Vec<(String, String)>,
    /// Pass the host environment through.
    pub inherit_env: bool,
}

impl ExecConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            payload_env: Some(DEFAULT_PAYLOAD_ENV.to_string()),
            payload_arg: false,
            env: Vec::new(),
            inherit_env: true,
        }
    }

    pub fn args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Read `payload-env`, `payload-arg` and `inherit-env` from settings.
    /// An empty `payload-env` disables the variable.
    pub fn apply_settings(mut self, settings: &Settings) -> Result<Self> {
        if let Some(name) = settings.get("payload-env") {
            let name = name.trim();
            self.payload_env = (!name.is_empty() && name != "-").then(|| name.to_string());
        }
        self.payload_arg = settings.switch("payload-arg", self.payload_arg)?;
        self.inherit_env = settings.switch("inherit-env", self.inherit_env)?;
        Ok(self)
    }
}

/// Executor that spawns a child process per item.
pub struct ProcessExecutor {
    config: ExecConfig,
}

impl ProcessExecutor {
    pub fn new(config: ExecConfig) -> Self {
        Self { config }
    }

    fn command(&self, item: &WorkItem) -> Command {
        let config = &self.config;
        let mut cmd = Command::new(&config.program);
        cmd.args(&config.args);

        if !config.inherit_env {
            cmd.env_clear();
        }
        cmd.envs(config.env.iter().map(|(k, v)| (k, v)));

        let payload = payload_os(&item.payload);
        if item.payload.contains(&0) && (config.payload_env.is_some() || config.payload_arg) {
            warn!(key = ?item.key, "payload contains NUL bytes, dropped before handing it over");
        }
        if let Some(ref name) = config.payload_env {
            cmd.env(name, &payload);
        }
        if let Some(ref key) = item.key {
            cmd.env(KEY_ENV, key);
        }
        if config.payload_arg {
            cmd.arg(payload);
        }
        cmd
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    async fn execute(&self, item: &WorkItem) -> ExecutionOutcome {
        debug!(
            program = %self.config.program.display(),
            payload_bytes = item.payload.len(),
            "running program"
        );

        let status = self
            .command(item)
            .status()
            .await
            .map_err(|e| ExecutionFailure::Spawn(format!("{}: {e}", self.config.program.display())))?;

        if status.success() {
            Ok(())
        } else {
            match status.code() {
                Some(code) => Err(ExecutionFailure::Exited(code)),
                None => Err(ExecutionFailure::Signaled),
            }
        }
    }
}

/// Payload as an OS string, byte for byte on unix. Environment values and
/// arguments cannot carry NUL, so those bytes are dropped.
fn payload_os(payload: &[u8]) -> OsString {
    let bytes: Vec<u8> = payload.iter().copied().filter(|&b| b != 0).collect();
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStringExt;
        OsString::from_vec(bytes)
    }
    #[cfg(not(unix))]
    {
        OsString::from(String::from_utf8_lossy(&bytes).into_owned())
    }
}
