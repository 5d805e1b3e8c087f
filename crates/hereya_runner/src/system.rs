//! Process runner backed by `std::process`.
//!
//! Processes run to completion on the tokio blocking pool. Output is always
//! captured; when `stream_logs` is set on the command, lines are also echoed
//! (and handed to an optional [`LogHandler`]) as they arrive.

use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info};

use crate::config::CommandConfig;
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{CommandRunner, ExecutionResult};

/// A single line of process output.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub timestamp: chrono::DateTime<Utc>,
    pub stream: LogStream,
    pub message: String,
}

/// Output stream type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// Log handler callback type.
pub type LogHandler = Arc<dyn Fn(LogLine) + Send + Sync>;

/// System runner options.
#[derive(Debug, Clone)]
pub struct SystemRunnerOptions {
    /// Dry-run mode (log commands without executing)
    pub dry_run: bool,
    /// CI mode (timestamped log lines)
    pub ci_mode: bool,
    /// Return an error on non-zero exit codes
    pub fail_fast: bool,
}

impl Default for SystemRunnerOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            ci_mode: std::env::var("CI").is_ok(),
            fail_fast: true,
        }
    }
}

impl SystemRunnerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn ci_mode(mut self) -> Self {
        self.ci_mode = true;
        self
    }

    pub fn fail_fast(mut self, enabled: bool) -> Self {
        self.fail_fast = enabled;
        self
    }
}

/// Runner that spawns real processes.
#[derive(Clone)]
pub struct SystemRunner {
    options: SystemRunnerOptions,
    log_handler: Option<LogHandler>,
}

impl SystemRunner {
    pub fn new(options: SystemRunnerOptions) -> Self {
        Self {
            options,
            log_handler: None,
        }
    }

    /// Set a log handler for streamed output.
    pub fn with_log_handler(mut self, handler: LogHandler) -> Self {
        self.log_handler = Some(handler);
        self
    }

    /// Check if dry-run mode is enabled.
    pub fn is_dry_run(&self) -> bool {
        self.options.dry_run
    }

    fn build_command(config: &CommandConfig) -> Command {
        let mut cmd = Command::new(&config.program);
        cmd.args(&config.args);
        if let Some(dir) = &config.workdir {
            cmd.current_dir(dir);
        }
        cmd.envs(&config.env);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd
    }

    fn collect_stream<R>(
        reader: R,
        stream: LogStream,
        echo: bool,
        ci_mode: bool,
        handler: Option<LogHandler>,
    ) -> JoinHandle<String>
    where
        R: Read + Send + 'static,
    {
        std::thread::spawn(move || {
            let mut output = String::new();
            for line in BufReader::new(reader).lines().map_while(Result::ok) {
                output.push_str(&line);
                output.push('\n');
                if !echo {
                    continue;
                }
                let log_line = LogLine {
                    timestamp: Utc::now(),
                    stream,
                    message: line,
                };
                if ci_mode {
                    println!(
                        "[{}] [{}] {}",
                        log_line.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                        stream,
                        log_line.message
                    );
                } else if stream == LogStream::Stderr {
                    eprintln!("{}", log_line.message);
                } else {
                    println!("{}", log_line.message);
                }
                if let Some(handler) = &handler {
                    handler(log_line);
                }
            }
            output
        })
    }

    /// Execute a command, blocking until it exits.
    fn execute_blocking(
        config: &CommandConfig,
        ci_mode: bool,
        handler: Option<LogHandler>,
    ) -> RunnerResult<(i32, String, String)> {
        let mut child = Self::build_command(config)
            .spawn()
            .map_err(|e| RunnerError::SpawnFailed {
                program: config.program.clone(),
                message: e.to_string(),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::ExecutionFailed("stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunnerError::ExecutionFailed("stderr was not captured".to_string()))?;

        let stdout_handle = Self::collect_stream(
            stdout,
            LogStream::Stdout,
            config.stream_logs,
            ci_mode,
            handler.clone(),
        );
        let stderr_handle = Self::collect_stream(
            stderr,
            LogStream::Stderr,
            config.stream_logs,
            ci_mode,
            handler,
        );

        let status = child.wait().map_err(|e| {
            RunnerError::ExecutionFailed(format!("Failed to wait for process: {}", e))
        })?;

        let stdout_output = stdout_handle.join().unwrap_or_default();
        let stderr_output = stderr_handle.join().unwrap_or_default();

        Ok((status.code().unwrap_or(-1), stdout_output, stderr_output))
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(SystemRunnerOptions::default())
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn is_available(&self, program: &str) -> bool {
        if self.options.dry_run {
            return true;
        }
        let program = program.to_string();
        tokio::task::spawn_blocking(move || {
            Command::new(&program)
                .arg("--version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|s| s.success())
                .unwrap_or(false)
        })
        .await
        .unwrap_or(false)
    }

    async fn run(&self, config: &CommandConfig) -> RunnerResult<ExecutionResult> {
        let cmd_str = config.command_line();
        debug!("Command: {}", cmd_str);

        if self.options.dry_run {
            info!("[DRY-RUN] Would execute: {}", cmd_str);
            let now = Utc::now();
            return Ok(ExecutionResult {
                program: config.program.clone(),
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
                started_at: now,
                finished_at: now,
                duration_ms: 0,
            });
        }

        let started_at = Utc::now();
        let owned = config.clone();
        let ci_mode = self.options.ci_mode;
        let handler = self.log_handler.clone();
        let (exit_code, stdout, stderr) = tokio::task::spawn_blocking(move || {
            Self::execute_blocking(&owned, ci_mode, handler)
        })
        .await
        .map_err(|e| RunnerError::ExecutionFailed(format!("Process task panicked: {}", e)))??;
        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;

        if exit_code == 0 {
            debug!("{} completed in {}ms", config.program, duration_ms);
        } else {
            error!(
                "{} failed with exit code {} after {}ms",
                config.program, exit_code, duration_ms
            );
        }

        if self.options.fail_fast && exit_code != 0 {
            return Err(RunnerError::NonZeroExit {
                program: config.program.clone(),
                exit_code,
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(ExecutionResult {
            program: config.program.clone(),
            exit_code,
            stdout,
            stderr,
            started_at,
            finished_at,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_mode() {
        let runner = SystemRunner::new(SystemRunnerOptions::new().dry_run());
        assert!(runner.is_dry_run());
    }

    #[tokio::test]
    async fn test_dry_run_reports_every_program_available() {
        let runner = SystemRunner::new(SystemRunnerOptions::new().dry_run());
        assert!(runner.is_available("definitely-not-a-real-program-hereya").await);
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let runner = SystemRunner::default();
        assert!(!runner.is_available("definitely-not-a-real-program-hereya").await);
    }

    #[test]
    fn test_ci_mode_option() {
        let options = SystemRunnerOptions::new().ci_mode();
        assert!(options.ci_mode);
    }

    #[tokio::test]
    async fn test_dry_run_does_not_spawn() {
        let runner = SystemRunner::new(SystemRunnerOptions::new().dry_run());
        let config = CommandConfig::new("definitely-not-a-real-program-hereya");

        let result = runner.run(&config).await.unwrap();
        assert!(result.success());
        assert!(result.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_failure() {
        let runner = SystemRunner::default();
        let config = CommandConfig::new("definitely-not-a-real-program-hereya");

        let err = runner.run(&config).await.unwrap_err();
        assert!(matches!(err, RunnerError::SpawnFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_error_when_fail_fast() {
        let runner = SystemRunner::default();
        let config = CommandConfig::new("sh").args(["-c", "echo boom >&2; exit 3"]);

        let err = runner.run(&config).await.unwrap_err();
        match err {
            RunnerError::NonZeroExit {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, 3);
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_is_captured() {
        let runner = SystemRunner::new(SystemRunnerOptions::new().fail_fast(false));
        let config = CommandConfig::new("sh")
            .args(["-c", "echo \"$GREETING\"; exit 2"])
            .env("GREETING", "hello");

        let result = runner.run(&config).await.unwrap();
        assert_eq!(result.exit_code, 2);
        assert_eq!(result.stdout, "hello\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_log_handler_sees_streamed_lines() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let runner = SystemRunner::default().with_log_handler(Arc::new(move |line: LogLine| {
            sink.lock().push((line.stream, line.message));
        }));
        let config = CommandConfig::new("sh")
            .args(["-c", "echo planned; echo warned >&2"])
            .stream_logs(true);

        runner.run(&config).await.unwrap();

        let mut seen = seen.lock().clone();
        seen.sort_by_key(|(stream, _)| stream.to_string());
        assert_eq!(
            seen,
            vec![
                (LogStream::Stderr, "warned".to_string()),
                (LogStream::Stdout, "planned".to_string()),
            ]
        );
    }
}
