//! Subprocess boundary.
//!
//! Every unit of work is one shell command line run via `sh -c` in a working
//! directory. The engine only consumes the exit status and, in capture mode,
//! the combined stdout/stderr text.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;

use crate::environment::Flags;
use crate::error::{MatrixError, Result};

/// Where subprocess output goes. Exactly one destination per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Inherit the console.
    Stream,
    /// Collect stdout and stderr into the result.
    Capture,
    Discard,
}

impl OutputMode {
    pub fn from_flags(flags: &Flags) -> Self {
        if flags.capture_output {
            OutputMode::Capture
        } else if flags.verbose {
            OutputMode::Stream
        } else {
            OutputMode::Discard
        }
    }
}

/// A fully built command line ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub working_dir: PathBuf,
    pub command_line: String,
    pub output: OutputMode,
}

/// Outcome of one subprocess.
#[derive(Debug, Clone)]
pub struct ShellOutcome {
    pub exit_code: i32,
    pub success: bool,
    /// Present only in [`OutputMode::Capture`].
    pub output: Option<String>,
    pub duration: Duration,
}

#[async_trait]
pub trait Shell: Send + Sync {
    /// Run the invocation to completion. Errors mean the process could not
    /// be started; a non-zero exit is a normal outcome.
    async fn execute(&self, invocation: &Invocation) -> Result<ShellOutcome>;
}

/// Runs command lines through `sh -c` with tokio.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemShell;

#[async_trait]
impl Shell for SystemShell {
    async fn execute(&self, invocation: &Invocation) -> Result<ShellOutcome> {
        let start = Instant::now();
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&invocation.command_line)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null());

        match invocation.output {
            OutputMode::Stream => {
                command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            OutputMode::Capture => {
                command.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
            OutputMode::Discard => {
                command.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        let child = command.spawn().map_err(|e| {
            MatrixError::Shell(format!(
                "failed to spawn `{}` in {}: {e}",
                invocation.command_line,
                invocation.working_dir.display()
            ))
        })?;
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| MatrixError::Shell(format!("failed to wait for child: {e}")))?;

        let captured = match invocation.output {
            OutputMode::Capture => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                Some(text)
            }
            _ => None,
        };

        Ok(ShellOutcome {
            exit_code: output.status.code().unwrap_or(-1),
            success: output.status.success(),
            output: captured,
            duration: start.elapsed(),
        })
    }
}

/// Single-quote a value for `sh`.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Render `KEY='value'` pairs as a command-line prefix.
pub fn env_prefix(vars: &[(String, String)]) -> String {
    vars.iter()
        .map(|(k, v)| format!("{k}={}", quote(v)))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(line: &str, output: OutputMode) -> Invocation {
        Invocation {
            working_dir: std::env::temp_dir(),
            command_line: line.to_string(),
            output,
        }
    }

    #[tokio::test]
    async fn test_capture_collects_both_streams() {
        let outcome = SystemShell
            .execute(&invocation("echo out; echo err >&2", OutputMode::Capture))
            .await
            .expect("execute failed");
        assert!(outcome.success);
        let text = outcome.output.unwrap();
        assert!(text.contains("out"));
        assert!(text.contains("err"));
    }

    #[tokio::test]
    async fn test_failing_command_is_an_outcome() {
        let outcome = SystemShell
            .execute(&invocation("exit 3", OutputMode::Discard))
            .await
            .expect("execute failed");
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, 3);
        assert!(outcome.output.is_none());
    }

    #[tokio::test]
    async fn test_missing_working_dir_is_an_error() {
        let inv = Invocation {
            working_dir: PathBuf::from("/definitely/not/here"),
            command_line: "true".to_string(),
            output: OutputMode::Discard,
        };
        assert!(matches!(
            SystemShell.execute(&inv).await,
            Err(MatrixError::Shell(_))
        ));
    }

    #[test]
    fn test_output_mode_precedence() {
        let flags = Flags {
            verbose: true,
            capture_output: true,
            ..Default::default()
        };
        assert_eq!(OutputMode::from_flags(&flags), OutputMode::Capture);
        assert_eq!(
            OutputMode::from_flags(&Flags { verbose: true, ..Default::default() }),
            OutputMode::Stream
        );
        assert_eq!(OutputMode::from_flags(&Flags::default()), OutputMode::Discard);
    }

    #[test]
    fn test_quote_and_env_prefix() {
        assert_eq!(quote("it's"), r"'it'\''s'");
        let vars = vec![
            ("ADAPTER".to_string(), "sqlite".to_string()),
            ("TZ".to_string(), "utc".to_string()),
        ];
        assert_eq!(env_prefix(&vars), "ADAPTER='sqlite' TZ='utc'");
    }
}
