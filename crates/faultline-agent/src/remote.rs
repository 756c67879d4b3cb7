//! Running diagnostic commands on the target host.
//!
//! [`RemoteExecutionTool`] is what the agent calls. It checks the command
//! against a [`CommandPolicy`], runs it once through a [`RemoteShell`], and
//! folds every failure into the returned [`CommandResult`].

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use faultline_config::{CommandPolicyConfig, RemoteConfig};

use crate::error::{AgentError, Result};
use crate::types::CommandResult;

/// Exit status the OpenSSH client uses for its own failures.
///
/// The client exits with the remote command's status otherwise, so a remote
/// command that itself exits 255 is indistinguishable from a failed
/// connection and is reported as one.
const SSH_CLIENT_FAILURE: i32 = 255;

/// Shell convention for a process ended by signal `n`: `128 + n`.
const SIGNAL_EXIT_BASE: i32 = 128;

/// Raw output of a command that ran on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// A host that can run one command per call over a fresh connection.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// `user@host`, for prompts and logs.
    fn target(&self) -> String;

    /// Run `command`. `Err` means the connection failed or the deadline passed.
    async fn exec(&self, command: &str, deadline: Duration) -> Result<ShellOutput>;
}

pub type SharedShell = Arc<dyn RemoteShell>;

// ─────────────────────────────────────────────────────────────────────────────
// SSH Shell
// ─────────────────────────────────────────────────────────────────────────────

/// Connection settings for [`SshShell`].
#[derive(Debug, Clone)]
pub struct SshConfig {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub identity_file: Option<PathBuf>,
    pub connect_timeout: Duration,
    pub ssh_binary: String,
}

impl From<&RemoteConfig> for SshConfig {
    fn from(config: &RemoteConfig) -> Self {
        Self {
            host: config.host.clone(),
            user: config.user.clone(),
            port: config.port,
            identity_file: config.identity_file.clone(),
            connect_timeout: config.connect_timeout(),
            ssh_binary: config.ssh_binary.clone(),
        }
    }
}

/// Runs commands through the system OpenSSH client with key authentication.
///
/// Every call spawns a new `ssh` process, so nothing is pooled between calls.
/// The child is killed if the call is dropped or times out.
pub struct SshShell {
    config: SshConfig,
}

impl SshShell {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    fn command(&self, remote_command: &str) -> Command {
        let mut cmd = Command::new(&self.config.ssh_binary);
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!(
                "ConnectTimeout={}",
                self.config.connect_timeout.as_secs().max(1)
            ))
            .arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg("-p")
            .arg(self.config.port.to_string());
        if let Some(ref identity) = self.config.identity_file {
            cmd.arg("-i").arg(identity);
        }
        cmd.arg(self.target()).arg("--").arg(remote_command);

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    fn target(&self) -> String {
        format!("{}@{}", self.config.user, self.config.host)
    }

    async fn exec(&self, command: &str, deadline: Duration) -> Result<ShellOutput> {
        let mut cmd = self.command(command);

        let output = match timeout(deadline, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(AgentError::remote(format!("failed to start ssh: {e}"))),
            Err(_) => return Err(AgentError::remote(format!("timed out after {deadline:?}"))),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_code = match output.status.code() {
            Some(code) => code,
            None => {
                // No exit code means the local client was killed by a signal.
                // -1 is kept for connection failures.
                let signal = termination_signal(&output.status);
                if !stderr.is_empty() && !stderr.ends_with('\n') {
                    stderr.push('\n');
                }
                match signal {
                    Some(n) => stderr.push_str(&format!("ssh terminated by signal {n}")),
                    None => stderr.push_str("ssh terminated without an exit status"),
                }
                SIGNAL_EXIT_BASE + signal.unwrap_or(0)
            }
        };

        // See SSH_CLIENT_FAILURE: 255 is treated as a connection failure.
        if exit_code == SSH_CLIENT_FAILURE {
            return Err(AgentError::remote(stderr.trim().to_string()));
        }

        Ok(ShellOutput {
            exit_code,
            stdout,
            stderr,
        })
    }
}

#[cfg(unix)]
fn termination_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn termination_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

// ─────────────────────────────────────────────────────────────────────────────
// Command Policy
// ─────────────────────────────────────────────────────────────────────────────

/// Which model-generated commands may be sent to the host.
#[derive(Debug, Clone, Default)]
pub struct CommandPolicy {
    /// When non-empty, a command must start with one of these.
    allowed_prefixes: Vec<String>,
    /// Substrings that reject a command outright.
    blocked_patterns: Vec<String>,
}

impl From<&CommandPolicyConfig> for CommandPolicy {
    fn from(config: &CommandPolicyConfig) -> Self {
        Self {
            allowed_prefixes: config.allowed_prefixes.clone(),
            blocked_patterns: config.blocked_patterns.clone(),
        }
    }
}

impl CommandPolicy {
    pub fn new(allowed_prefixes: Vec<String>, blocked_patterns: Vec<String>) -> Self {
        Self {
            allowed_prefixes,
            blocked_patterns,
        }
    }

    /// `Err(reason)` if the command must not be sent.
    pub fn check(&self, command: &str) -> std::result::Result<(), String> {
        let cmd_lower = command.trim().to_lowercase();
        if cmd_lower.is_empty() {
            return Err("空命令".to_string());
        }

        // Blocked patterns first
        if let Some(blocked) = self
            .blocked_patterns
            .iter()
            .find(|p| cmd_lower.contains(&p.to_lowercase()))
        {
            return Err(format!("包含禁止的模式 '{blocked}'"));
        }

        if !self.allowed_prefixes.is_empty()
            && !self
                .allowed_prefixes
                .iter()
                .any(|p| cmd_lower.starts_with(&p.to_lowercase()))
        {
            return Err("不在允许的命令列表中".to_string());
        }

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Remote Execution Tool
// ─────────────────────────────────────────────────────────────────────────────

/// One-shot command execution on the configured host. Never fails; never
/// retries.
pub struct RemoteExecutionTool {
    shell: SharedShell,
    policy: CommandPolicy,
    exec_timeout: Duration,
}

impl RemoteExecutionTool {
    pub fn new(shell: SharedShell, policy: CommandPolicy, exec_timeout: Duration) -> Self {
        Self {
            shell,
            policy,
            exec_timeout,
        }
    }

    /// Build the SSH-backed tool from `[remote]` settings.
    pub fn from_config(config: &RemoteConfig) -> Self {
        Self::new(
            Arc::new(SshShell::new(SshConfig::from(config))),
            CommandPolicy::from(&config.policy),
            config.exec_timeout(),
        )
    }

    pub fn target(&self) -> String {
        self.shell.target()
    }

    pub async fn execute(&self, command: &str) -> CommandResult {
        if let Err(reason) = self.policy.check(command) {
            warn!(command, reason = %reason, "Command rejected by policy");
            return CommandResult::rejected(command, reason);
        }

        info!(target = %self.shell.target(), command, "Executing remote command");
        match self.shell.exec(command, self.exec_timeout).await {
            Ok(output) => {
                let result =
                    CommandResult::completed(command, output.exit_code, output.stdout, output.stderr);
                debug!(command, exit_code = result.exit_code, "Remote command finished");
                result
            }
            Err(e) => {
                let reason = match e {
                    AgentError::Remote(msg) => msg,
                    other => other.to_string(),
                };
                warn!(command, error = %reason, "Remote command failed");
                CommandResult::connection_failed(command, reason)
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scripted Shell
// ─────────────────────────────────────────────────────────────────────────────

/// Canned replies keyed by exact command, for tests.
#[cfg(any(test, feature = "testing"))]
#[derive(Default)]
pub struct ScriptedShell {
    replies: parking_lot::Mutex<std::collections::HashMap<String, std::result::Result<ShellOutput, String>>>,
    executed: parking_lot::Mutex<Vec<String>>,
    delay: Option<Duration>,
}

#[cfg(any(test, feature = "testing"))]
impl ScriptedShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, command: &str, exit_code: i32, stdout: &str, stderr: &str) -> Self {
        self.replies.lock().insert(
            command.to_string(),
            Ok(ShellOutput {
                exit_code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            }),
        );
        self
    }

    pub fn unreachable(self, command: &str, reason: &str) -> Self {
        self.replies
            .lock()
            .insert(command.to_string(), Err(reason.to_string()));
        self
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }
}

#[cfg(any(test, feature = "testing"))]
#[async_trait]
impl RemoteShell for ScriptedShell {
    fn target(&self) -> String {
        "root@scripted".to_string()
    }

    async fn exec(&self, command: &str, _deadline: Duration) -> Result<ShellOutput> {
        self.executed.lock().push(command.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.replies.lock().get(command) {
            Some(Ok(output)) => Ok(output.clone()),
            Some(Err(reason)) => Err(AgentError::remote(reason.clone())),
            None => Ok(ShellOutput {
                exit_code: 127,
                stdout: String::new(),
                stderr: format!("sh: {command}: command not found"),
            }),
        }
    }
}
