//! Opt-in execution of generated scripts.
//!
//! Scripts are untrusted model output. They only ever run as a child
//! process of the configured interpreter, in a scratch directory of their
//! own, with a cleared environment (only `PATH` and `HOME` are forwarded)
//! and a hard timeout. The child is killed when the timeout fires.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::ExecutionConfig;
use crate::package::PackagedScript;

const FORWARDED_ENV: &[&str] = &["PATH", "HOME"];
const OUTPUT_TAIL_CHARS: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScriptOutcome {
    Passed,
    /// Non-zero exit; `code` is `None` when the child was killed by a signal.
    Failed { code: Option<i32> },
    TimedOut,
    SpawnError { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptRun {
    pub id: String,
    pub outcome: ScriptOutcome,
    pub stdout: String,
    pub stderr: String,
}

/// Runs every script in order. A failing script never stops the rest.
pub async fn run_scripts(scripts: &[PackagedScript], config: &ExecutionConfig) -> Vec<ScriptRun> {
    let limit = Duration::from_secs(config.timeout_secs);
    let mut runs = Vec::with_capacity(scripts.len());
    for script in scripts {
        let run = run_script(&script.id, &script.path, &config.interpreter, limit).await;
        match &run.outcome {
            ScriptOutcome::Passed => info!(id = %run.id, "script passed"),
            other => warn!(id = %run.id, outcome = ?other, "script did not pass"),
        }
        runs.push(run);
    }
    runs
}

/// Runs `interpreter <script>` inside a fresh scratch directory next to
/// the script.
pub async fn run_script(id: &str, script: &Path, interpreter: &str, limit: Duration) -> ScriptRun {
    let mut run = ScriptRun {
        id: id.to_string(),
        outcome: ScriptOutcome::Passed,
        stdout: String::new(),
        stderr: String::new(),
    };

    let (script, scratch) = match prepare(id, script) {
        Ok(paths) => paths,
        Err(e) => {
            run.outcome = ScriptOutcome::SpawnError {
                message: e.to_string(),
            };
            return run;
        }
    };

    let mut command = Command::new(interpreter);
    command
        .arg(&script)
        .current_dir(&scratch)
        .env_clear()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for key in FORWARDED_ENV {
        if let Ok(value) = std::env::var(key) {
            command.env(key, value);
        }
    }

    let output = match timeout(limit, command.output()).await {
        Err(_) => {
            run.outcome = ScriptOutcome::TimedOut;
            return run;
        }
        Ok(Err(e)) => {
            run.outcome = ScriptOutcome::SpawnError {
                message: format!("failed to run '{}': {}", interpreter, e),
            };
            return run;
        }
        Ok(Ok(output)) => output,
    };

    run.stdout = tail(&String::from_utf8_lossy(&output.stdout));
    run.stderr = tail(&String::from_utf8_lossy(&output.stderr));
    if !output.status.success() {
        run.outcome = ScriptOutcome::Failed {
            code: output.status.code(),
        };
    }
    run
}

fn prepare(id: &str, script: &Path) -> std::io::Result<(PathBuf, PathBuf)> {
    let script = std::fs::canonicalize(script)?;
    let parent = script.parent().unwrap_or_else(|| Path::new("."));
    let scratch = parent.join(".scratch").join(format!("test_case_{}", id));
    std::fs::create_dir_all(&scratch)?;
    Ok((script, scratch))
}

fn tail(text: &str) -> String {
    let count = text.chars().count();
    if count <= OUTPUT_TAIL_CHARS {
        text.to_string()
    } else {
        text.chars().skip(count - OUTPUT_TAIL_CHARS).collect()
    }
}
