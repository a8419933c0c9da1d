//! Process host: spawns a plugin entry file and exchanges one JSON line.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

const STDOUT_PREVIEW_CHARS: usize = 4_000;
const STDERR_PREVIEW_CHARS: usize = 2_000;

/// Process-level failures of one request/response exchange.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("no interpreter for entry file '{0}'")]
    NoInterpreter(String),
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("io error talking to plugin process: {0}")]
    Io(#[from] std::io::Error),
    #[error("plugin process timed out after {0:?}")]
    Timeout(Duration),
    #[error("plugin process exited with {status}. stderr={stderr}")]
    Exit { status: String, stderr: String },
    #[error("plugin response is not valid JSON: {error}. stdout={stdout}")]
    Protocol { error: String, stdout: String },
}

/// Spawns plugin entry processes and performs one-line JSON exchanges.
#[derive(Debug, Clone)]
pub struct ProcessHost {
    python_bin: String,
}

impl ProcessHost {
    pub fn new(python_bin: impl Into<String>) -> Self {
        Self {
            python_bin: python_bin.into(),
        }
    }

    /// Interpreter command for an entry file, chosen by extension.
    pub fn interpreter_for(&self, entry_file: &Path) -> Option<String> {
        match entry_file.extension().and_then(|e| e.to_str()) {
            Some("py") => Some(self.python_bin.clone()),
            Some("sh") => Some("sh".to_string()),
            _ => None,
        }
    }

    /// Spawn the entry process, write one request line, read the response.
    ///
    /// The child runs with the plugin directory as its working directory and
    /// only the sanitized environment from the plugin's
    /// [`PluginEnvironment`](crate::environment::PluginEnvironment). It is
    /// killed if dropped mid-exchange.
    pub async fn exchange(
        &self,
        entry_file: &Path,
        env: &HashMap<String, String>,
        request_line: &str,
        deadline: Duration,
    ) -> Result<String, HostError> {
        let interpreter = self.interpreter_for(entry_file).ok_or_else(|| {
            HostError::NoInterpreter(entry_file.to_string_lossy().into_owned())
        })?;

        let mut cmd = Command::new(&interpreter);
        cmd.arg(entry_file);
        if let Some(dir) = entry_file.parent() {
            cmd.current_dir(dir);
        }
        cmd.env_clear();
        cmd.envs(env);
        cmd.kill_on_drop(true);
        cmd.stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| HostError::Spawn {
            command: interpreter.clone(),
            source,
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(request_line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.shutdown().await?;
        }

        let output = match timeout(deadline, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => return Err(HostError::Timeout(deadline)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            return Err(HostError::Exit {
                status: output.status.to_string(),
                stderr: preview_text(&stderr, STDERR_PREVIEW_CHARS),
            });
        }

        // The protocol is one response line; anything a plugin prints before
        // it (progress noise on stdout) is skipped.
        let line = stdout
            .lines()
            .map(str::trim)
            .find(|line| line.starts_with('{'))
            .unwrap_or("")
            .to_string();
        if line.is_empty() {
            return Err(HostError::Protocol {
                error: "no JSON line on stdout".to_string(),
                stdout: preview_text(&stdout, STDOUT_PREVIEW_CHARS),
            });
        }
        Ok(line)
    }

    /// Like [`exchange`](Self::exchange), parsing the response line.
    pub async fn exchange_json<T: serde::de::DeserializeOwned>(
        &self,
        entry_file: &Path,
        env: &HashMap<String, String>,
        request_line: &str,
        deadline: Duration,
    ) -> Result<T, HostError> {
        let line = self.exchange(entry_file, env, request_line, deadline).await?;
        serde_json::from_str(&line).map_err(|e| HostError::Protocol {
            error: e.to_string(),
            stdout: preview_text(&line, STDOUT_PREVIEW_CHARS),
        })
    }
}

fn preview_text(input: &str, max_chars: usize) -> String {
    let char_count = input.chars().count();
    if char_count <= max_chars {
        return input.to_string();
    }
    let mut preview: String = input.chars().take(max_chars).collect();
    preview.push_str(&format!("... [truncated, total_chars={}]", char_count));
    preview
}
