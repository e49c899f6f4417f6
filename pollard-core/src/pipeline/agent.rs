//! External reasoning agent invoked as a subprocess.
//!
//! The agent is opaque: it receives a prompt as its final argument and is
//! expected to print a JSON verdict on stdout. `AgentRunner` is the seam the
//! synthesizer talks to, so tests can substitute a scripted runner.

use crate::error::AgentError;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Agents that need an extra flag to run non-interactively.
const NON_INTERACTIVE_FLAGS: &[(&str, &str)] = &[("claude", "--print")];

/// Captured result of one successful agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Something that can answer a prompt within a deadline.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Short name recorded as `Synthesis::agent_used`.
    fn name(&self) -> &str;

    /// Run the agent once. Implementations must stop work when `timeout`
    /// elapses or `cancel` fires.
    async fn invoke(
        &self,
        prompt: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<AgentOutput, AgentError>;
}

/// Runs a configured command line, appending the prompt as the last argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessAgent {
    program: String,
    base_args: Vec<String>,
}

impl ProcessAgent {
    /// Parse a command such as `"claude"` or `"cursor --ask"`.
    pub fn from_command(command: &str) -> Result<Self, AgentError> {
        let mut parts = command.split_whitespace().map(String::from);
        let program = parts.next().ok_or(AgentError::EmptyCommand)?;
        Ok(Self {
            program,
            base_args: parts.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Full argument list for a prompt: `[flag] base-args... prompt`.
    pub fn build_args(&self, prompt: &str) -> Vec<String> {
        let mut args = Vec::with_capacity(self.base_args.len() + 2);
        let binary = Path::new(&self.program)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.program);
        if let Some((_, flag)) = NON_INTERACTIVE_FLAGS.iter().find(|(name, _)| *name == binary) {
            args.push((*flag).to_string());
        }
        args.extend(self.base_args.iter().cloned());
        args.push(prompt.to_string());
        args
    }
}

#[async_trait]
impl AgentRunner for ProcessAgent {
    fn name(&self) -> &str {
        &self.program
    }

    async fn invoke(
        &self,
        prompt: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<AgentOutput, AgentError> {
        debug!(
            program = %self.program,
            prompt_len = prompt.len(),
            timeout_ms = timeout.as_millis() as u64,
            "Spawning agent"
        );

        // The child inherits the current environment; dropping the wait
        // future (timeout or cancellation) kills it.
        let child = Command::new(&self.program)
            .args(self.build_args(prompt))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AgentError::Spawn {
                program: self.program.clone(),
                message: e.to_string(),
            })?;

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            res = tokio::time::timeout(timeout, child.wait_with_output()) => match res {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => {
                    return Err(AgentError::Spawn {
                        program: self.program.clone(),
                        message: format!("failed to wait for agent: {e}"),
                    });
                }
                Err(_) => {
                    warn!(program = %self.program, ?timeout, "Agent timed out");
                    return Err(AgentError::Timeout { timeout });
                }
            },
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let exit_code = output.status.code();

        if !output.status.success() {
            warn!(program = %self.program, ?exit_code, "Agent exited with non-zero status");
            return Err(AgentError::NonZeroExit {
                code: exit_code,
                stderr,
            });
        }
        if !stderr.is_empty() {
            debug!(program = %self.program, stderr = %stderr, "Agent wrote to stderr");
        }

        Ok(AgentOutput {
            stdout,
            stderr,
            exit_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_command_splits_args() {
        let agent = ProcessAgent::from_command("cursor --ask  --fast").unwrap();
        assert_eq!(agent.program(), "cursor");
        assert_eq!(agent.build_args("P"), vec!["--ask", "--fast", "P"]);
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(matches!(
            ProcessAgent::from_command("   "),
            Err(AgentError::EmptyCommand)
        ));
    }

    #[test]
    fn test_known_agent_gets_non_interactive_flag() {
        let agent = ProcessAgent::from_command("claude --model opus").unwrap();
        assert_eq!(
            agent.build_args("P"),
            vec!["--print", "--model", "opus", "P"]
        );
        let by_path = ProcessAgent::from_command("/usr/local/bin/claude").unwrap();
        assert_eq!(by_path.build_args("P"), vec!["--print", "P"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invoke_captures_stdout() {
        let agent = ProcessAgent::from_command("echo").unwrap();
        let out = agent
            .invoke("hello agent", Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello agent");
        assert_eq!(out.exit_code, Some(0));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invoke_non_zero_exit() {
        let agent = ProcessAgent::from_command("false").unwrap();
        let err = agent
            .invoke("ignored", Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::NonZeroExit { code: Some(1), .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invoke_times_out() {
        // `sleep 5 <prompt>`: the prompt is a second duration argument.
        let agent = ProcessAgent::from_command("sleep 5").unwrap();
        let start = std::time::Instant::now();
        let err = agent
            .invoke("5", Duration::from_millis(200), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let agent = ProcessAgent::from_command("pollard-no-such-agent-binary").unwrap();
        let err = agent
            .invoke("p", Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_stops_agent() {
        let agent = ProcessAgent::from_command("sleep").unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let err = agent
            .invoke("5", Duration::from_secs(10), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
    }
}
