//! Execution runner: invokes the external test-automation tool for one script.
//!
//! The tool is started as a parameterized subprocess (program, fixed args,
//! then the script path as its own argument). Its exit code alone decides
//! passed/failed; not being able to run it at all is a `RunnerError`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::RunnerConfig;
use crate::models::RunStatus;

/// Captured output is cut to this many bytes.
pub const MAX_OUTPUT_BYTES: usize = 4000;

const SCREENSHOT_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// The test tool could not produce a result.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to start test tool '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("test tool did not finish within {}s and was killed", .0.as_secs())]
    TimedOut(Duration),

    #[error("failed to collect test tool output: {0}")]
    Io(#[source] std::io::Error),
}

impl RunnerError {
    /// Wall-clock seconds spent before the failure, when known.
    pub fn elapsed_secs(&self) -> Option<i64> {
        match self {
            RunnerError::Spawn { .. } => Some(0),
            RunnerError::TimedOut(limit) => Some(limit.as_secs() as i64),
            RunnerError::Io(_) => None,
        }
    }
}

/// Result of one script execution.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// `Passed` or `Failed`
    pub status: RunStatus,
    pub duration_secs: i64,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    /// stdout followed by stderr, lossily decoded and truncated
    pub output: String,
    /// Key of the first failure screenshot, relative to the artifacts directory
    pub screenshot_ref: Option<String>,
    /// Key of the run video, relative to the artifacts directory
    pub video_ref: Option<String>,
}

/// Anything that can execute an automation script.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    async fn execute(&self, script_path: &str) -> Result<ExecutionResult, RunnerError>;
}

/// Runs scripts through the configured external tool.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    artifacts_dir: PathBuf,
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(config: &RunnerConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            working_dir: config.working_dir.clone(),
            artifacts_dir: config.artifacts_dir.clone(),
            timeout: config.timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn find_evidence(&self, script_path: &str) -> (Option<String>, Option<String>) {
        let Some(file_name) = Path::new(script_path).file_name().and_then(|n| n.to_str()) else {
            return (None, None);
        };

        let screenshot = first_screenshot(&self.artifacts_dir, file_name).await;

        let video_key = format!("videos/{}.mp4", file_name);
        let video = tokio::fs::try_exists(self.artifacts_dir.join(&video_key))
            .await
            .unwrap_or(false)
            .then_some(video_key);

        (screenshot, video)
    }
}

#[async_trait]
impl ScriptExecutor for ProcessRunner {
    async fn execute(&self, script_path: &str) -> Result<ExecutionResult, RunnerError> {
        let started = Instant::now();

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(script_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        debug!(program = %self.program, script = %script_path, "Starting test tool");

        let child = command.spawn().map_err(|source| RunnerError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        // Dropping the future on timeout drops the child, which kills it
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(RunnerError::Io)?,
            Err(_) => return Err(RunnerError::TimedOut(self.timeout)),
        };

        let duration_secs = started.elapsed().as_secs() as i64;
        let status = if output.status.success() {
            RunStatus::Passed
        } else {
            RunStatus::Failed
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        let (screenshot_ref, video_ref) = self.find_evidence(script_path).await;

        info!(
            script = %script_path,
            status = %status,
            exit_code = ?output.status.code(),
            duration_secs,
            "Test tool finished"
        );

        Ok(ExecutionResult {
            status,
            duration_secs,
            exit_code: output.status.code(),
            output: truncate_output(combined, MAX_OUTPUT_BYTES),
            screenshot_ref,
            video_ref,
        })
    }
}

async fn first_screenshot(artifacts_dir: &Path, file_name: &str) -> Option<String> {
    let dir = artifacts_dir.join("screenshots").join(file_name);
    let mut entries = tokio::fs::read_dir(&dir).await.ok()?;

    let mut images = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| SCREENSHOT_EXTENSIONS.contains(&e.to_lowercase().as_str()));
        if is_image && let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            images.push(name.to_string());
        }
    }

    images.sort();
    images
        .into_iter()
        .next()
        .map(|name| format!("screenshots/{}/{}", file_name, name))
}

/// Cut `text` to at most `max` bytes on a char boundary.
fn truncate_output(text: String, max: usize) -> String {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...[truncated]", &text[..end])
}
