//! Output sink: console plus append-only log file
//!
//! Every message carries a severity glyph and a timestamp:
//! `[ 2026-08-30 14:07:02 ][ ! ] message` — `!` error, `#` warning,
//! space for info. Print-only and log-only variants exist for startup and
//! exit bookkeeping, where one side of the sink is not wanted.

use chrono::Local;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy)]
enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    fn glyph(&self) -> char {
        match self {
            Severity::Error => '!',
            Severity::Warning => '#',
            Severity::Info => ' ',
        }
    }
}

/// Message sink shared by the whole invocation
#[derive(Debug)]
pub struct Output {
    log: Option<Mutex<File>>,
}

impl Output {
    /// A sink that only writes to the console (startup, before the log
    /// path is known)
    pub fn console_only() -> Self {
        Self { log: None }
    }

    /// A sink that writes to the console and appends to `path`, creating
    /// the log directory on demand
    pub fn with_log_file(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        Ok(Self {
            log: Some(Mutex::new(file)),
        })
    }

    pub fn info(&self, msg: &str) {
        self.send(Severity::Info, msg);
    }

    pub fn warning(&self, msg: &str) {
        self.send(Severity::Warning, msg);
    }

    pub fn error(&self, msg: &str) {
        self.send(Severity::Error, msg);
    }

    pub fn info_print_only(&self, msg: &str) {
        print_line(Severity::Info, &format_message(Severity::Info, msg));
    }

    pub fn info_log_only(&self, msg: &str) {
        self.log_line(&format_message(Severity::Info, msg));
    }

    pub fn warning_log_only(&self, msg: &str) {
        self.log_line(&format_message(Severity::Warning, msg));
    }

    fn send(&self, severity: Severity, msg: &str) {
        let formatted = format_message(severity, msg);
        print_line(severity, &formatted);
        self.log_line(&formatted);
    }

    fn log_line(&self, formatted: &str) {
        if let Some(log) = &self.log {
            if let Ok(mut file) = log.lock() {
                // A failing log write must not abort the build
                let _ = writeln!(file, "{formatted}");
                let _ = file.flush();
            }
        }
    }
}

fn format_message(severity: Severity, msg: &str) -> String {
    format!(
        "[ {} ][ {} ] {}",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        severity.glyph(),
        msg
    )
}

fn print_line(severity: Severity, formatted: &str) {
    match severity {
        Severity::Error | Severity::Warning => eprintln!("{formatted}"),
        Severity::Info => println!("{formatted}"),
    }
}
