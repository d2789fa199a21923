//! Helper processes: osascript, screencapture and the files they leave behind.

use crate::error::{AutomationError, AutomationResult};
use chrono::Utc;
use image::RgbImage;
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Multiplied by the attempt number between tries.
    pub backoff: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub const OSASCRIPT: RetryPolicy = RetryPolicy {
        attempts: 3,
        backoff: Duration::from_millis(120),
        timeout: Duration::from_millis(1500),
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Failure {
    code: String,
    message: String,
}

/// Runs `program` until it exits successfully with non-empty stdout, killing
/// any attempt that outlives `policy.timeout`. Returns trimmed stdout.
pub fn run_with_retry(program: &str, args: &[&str], policy: RetryPolicy) -> AutomationResult<String> {
    let max_attempts = policy.attempts.max(1);
    let mut last = Failure {
        code: "no_output".to_string(),
        message: format!("{program} returned empty output"),
    };

    for attempt in 1..=max_attempts {
        match run_once(program, args, policy.timeout) {
            Ok(stdout) => {
                debug!(program, attempt, "helper process succeeded");
                return Ok(stdout);
            }
            Err(failure) => {
                debug!(program, attempt, code = %failure.code, "helper process attempt failed");
                last = failure;
            }
        }
        if attempt < max_attempts {
            let backoff = policy.backoff.saturating_mul(attempt);
            thread::sleep(backoff.max(Duration::from_millis(10)));
        }
    }

    warn!(program, attempts = max_attempts, code = %last.code, "helper process gave up");
    Err(AutomationError::Platform(format!(
        "{program} failed after {max_attempts} attempts ({}): {}",
        last.code, last.message
    )))
}

fn run_once(program: &str, args: &[&str], timeout: Duration) -> Result<String, Failure> {
    let mut child = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| Failure {
            code: "spawn_failed".to_string(),
            message: err.to_string(),
        })?;

    match child.wait_timeout(timeout) {
        Ok(Some(_)) => {}
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Failure {
                code: "timeout".to_string(),
                message: format!("timed out after {}ms", timeout.as_millis()),
            });
        }
        Err(err) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Failure {
                code: "wait_failed".to_string(),
                message: err.to_string(),
            });
        }
    }

    let output = child.wait_with_output().map_err(|err| Failure {
        code: "wait_output_failed".to_string(),
        message: err.to_string(),
    })?;
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if !output.status.success() {
        let code = output.status.code().unwrap_or(1);
        return Err(Failure {
            code: format!("exit_{code}"),
            message: if stderr.is_empty() {
                format!("exited with status {code}")
            } else {
                stderr
            },
        });
    }
    if stdout.is_empty() {
        return Err(Failure {
            code: "empty_stdout".to_string(),
            message: "succeeded but printed nothing".to_string(),
        });
    }
    Ok(stdout)
}

/// Runs an AppleScript `on run argv` handler with `args` as argv.
pub fn run_osascript(script: &str, args: &[&str]) -> AutomationResult<String> {
    let mut argv = vec!["-e", script];
    if !args.is_empty() {
        argv.push("--");
        argv.extend_from_slice(args);
    }
    run_with_retry("osascript", &argv, RetryPolicy::OSASCRIPT)
}

pub fn command_exists(name: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {name} >/dev/null 2>&1"))
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Unique scratch file for one screen capture.
pub fn capture_path(dir: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%d-%H%M%S");
    let salt = rand::thread_rng().gen_range(1000..9999);
    dir.join(format!(
        "wechat-assist-capture-{stamp}-{}-{salt}.png",
        std::process::id()
    ))
}

/// Decodes a capture written by `screencapture` and removes the file.
pub fn take_capture(path: &Path) -> AutomationResult<RgbImage> {
    let decoded = image::open(path);
    if let Err(err) = fs::remove_file(path) {
        debug!(path = %path.display(), error = %err, "could not remove capture file");
    }
    decoded.map(|image| image.to_rgb8()).map_err(|err| {
        AutomationError::Platform(format!("failed to read capture {}: {err}", path.display()))
    })
}

/// First line of osascript output as a pid; `none` means no such process.
pub fn parse_pid(output: &str) -> AutomationResult<Option<i32>> {
    let line = output.lines().next().unwrap_or_default().trim();
    if line.is_empty() || line == "none" {
        return Ok(None);
    }
    line.parse::<i32>()
        .map(Some)
        .map_err(|_| AutomationError::Platform(format!("unexpected process lookup output {line:?}")))
}
