//! Process execution and diagnostic classification
//!
//! Runs a synthesized compiler command, streams its output line by line,
//! prefixes each line with the program name and routes it to the output
//! sink under the severity implied by the toolchain's indicator
//! substrings. A non-zero exit is a warning-level outcome; the caller
//! decides whether it is fatal.

use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use thiserror::Error;

use crate::cli::Output;
use crate::toolchain::CommandLine;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        source: io::Error,
    },

    #[error("IO error while reading process output: {0}")]
    Io(#[from] io::Error),

    #[error("Build cancelled")]
    Cancelled,
}

/// Cooperative cancellation flag, checked at step boundaries and at each
/// subprocess output line
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Final process status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    /// Warning-level outcome, not necessarily fatal to the pipeline
    NonZeroExit(i32),
}

/// Structured result of one executed command
#[derive(Debug)]
pub struct ProcessResult {
    pub exit_code: Option<i32>,
    /// Lines classified as errors / warnings
    pub errors: usize,
    pub warnings: usize,
    pub status: RunStatus,
}

/// Executes commands and classifies their combined output stream
pub struct ProcessRunner<'a> {
    output: &'a Output,
    error_indicator: Option<&'static str>,
    warning_indicator: Option<&'static str>,
    cancel: CancelToken,
}

impl<'a> ProcessRunner<'a> {
    pub fn new(
        output: &'a Output,
        error_indicator: Option<&'static str>,
        warning_indicator: Option<&'static str>,
    ) -> Self {
        Self {
            output,
            error_indicator,
            warning_indicator,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Launches the command and blocks until it exits
    ///
    /// stdout is streamed on the calling thread; stderr is drained
    /// concurrently (so neither pipe can fill up and deadlock the child)
    /// and classified through the same sink once the stream ends.
    pub fn execute(&self, cmd: &CommandLine) -> Result<ProcessResult, RunnerError> {
        if self.cancel.is_cancelled() {
            return Err(RunnerError::Cancelled);
        }

        let mut child = Command::new(&cmd.program)
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                program: cmd.program.clone(),
                source,
            })?;

        let prefix = program_name(&cmd.program);
        let mut errors = 0usize;
        let mut warnings = 0usize;

        let stderr_handle = child.stderr.take().map(|stderr| {
            thread::spawn(move || {
                BufReader::new(stderr)
                    .lines()
                    .map_while(Result::ok)
                    .collect::<Vec<String>>()
            })
        });

        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                let line = line?;
                if self.cancel.is_cancelled() {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(RunnerError::Cancelled);
                }
                self.classify(&prefix, &line, &mut errors, &mut warnings);
            }
        }

        // By the time stderr is replayed the process has already closed its
        // streams; its diagnostics are classified even if a cancellation
        // arrived meanwhile
        let stderr_lines = stderr_handle
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        for line in stderr_lines {
            self.classify(&prefix, &line, &mut errors, &mut warnings);
        }

        let status = child.wait()?;
        let exit_code = status.code();

        let run_status = match exit_code {
            Some(0) => {
                self.output
                    .info(&format!("Process '{prefix}' exited with code 0"));
                RunStatus::Success
            }
            Some(code) => {
                self.output
                    .warning(&format!("Process '{prefix}' exited with code {code}"));
                RunStatus::NonZeroExit(code)
            }
            // Terminated by signal: no exit code, still a failed run
            None => {
                self.output
                    .warning(&format!("Process '{prefix}' was terminated by a signal"));
                RunStatus::NonZeroExit(-1)
            }
        };

        Ok(ProcessResult {
            exit_code,
            errors,
            warnings,
            status: run_status,
        })
    }

    fn classify(&self, prefix: &str, line: &str, errors: &mut usize, warnings: &mut usize) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let message = format!("{prefix}: {line}");
        if self.matches(self.error_indicator, line) {
            *errors += 1;
            self.output.error(&message);
        } else if self.matches(self.warning_indicator, line) {
            *warnings += 1;
            self.output.warning(&message);
        } else {
            self.output.info(&message);
        }
    }

    /// A toolchain without an indicator classifies everything as info
    fn matches(&self, indicator: Option<&'static str>, line: &str) -> bool {
        indicator.is_some_and(|needle| line.contains(needle))
    }
}

/// Bare program name used as the per-line prefix
fn program_name(program: &str) -> String {
    Path::new(program)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(program)
        .to_string()
}
