//! Script logging and error reporting.
//!
//! Scripts log through `log(...)`, `errorLog(...)`, `print` and `debug`. Those
//! lines go to the host console, not to the `log` crate. Each instance has a
//! [`Reporter`] that prefixes errors with the instance identity, enforces the
//! per-dispatch log budget and keeps a short queue of structured diagnostics.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use rhai::Dynamic;

use crate::error::BridgeError;
use crate::host::Host;
use crate::script_diagnostics::ScriptDiagnostic;
use crate::value::join_for_log;

/// Diagnostics kept per instance before the oldest are dropped.
pub const MAX_DIAGNOSTICS: usize = 32;

/// Identity used before any source has been loaded.
pub const DEFAULT_IDENTITY: &str = "untitled";

/// Log level for script messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Error,
}

impl LogLevel {
    /// Prefix used by console hosts.
    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Info => "[INFO]",
            LogLevel::Error => "[ERROR]",
        }
    }
}

/// Per-dispatch cap on script log lines.
#[derive(Debug)]
pub struct LogBudget {
    limit: u32,
    count: Cell<u32>,
    warned: Cell<bool>,
}

impl LogBudget {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            count: Cell::new(0),
            warned: Cell::new(false),
        }
    }

    pub fn reset(&self) {
        self.count.set(0);
        self.warned.set(false);
    }

    /// Returns `Ok(())` if another line may be logged, `Err(true)` when this
    /// is the first refusal (caller warns once), `Err(false)` afterwards.
    fn take(&self) -> Result<(), bool> {
        if self.limit == 0 {
            return Ok(());
        }
        let count = self.count.get();
        self.count.set(count.saturating_add(1));
        if count < self.limit {
            return Ok(());
        }
        Err(!self.warned.replace(true))
    }
}

pub struct Reporter {
    host: Rc<dyn Host>,
    identity: RefCell<String>,
    diagnostics: RefCell<VecDeque<ScriptDiagnostic>>,
    budget: LogBudget,
}

impl Reporter {
    pub fn new(host: Rc<dyn Host>, max_logs_per_call: u32) -> Self {
        Self {
            host,
            identity: RefCell::new(DEFAULT_IDENTITY.to_string()),
            diagnostics: RefCell::new(VecDeque::new()),
            budget: LogBudget::new(max_logs_per_call),
        }
    }

    pub fn host(&self) -> &Rc<dyn Host> {
        &self.host
    }

    pub fn identity(&self) -> String {
        self.identity.borrow().clone()
    }

    pub fn set_identity(&self, identity: &str) {
        *self.identity.borrow_mut() = identity.to_string();
    }

    /// Start a new budget window (one dispatch or compilation).
    pub fn reset_budget(&self) {
        self.budget.reset();
    }

    pub fn info(&self, message: &str) {
        self.host.info(message);
    }

    pub fn error(&self, message: &str) {
        self.host.error(message);
    }

    /// Log a line on behalf of the script, respecting the budget. Never fails.
    pub fn script_log(&self, level: LogLevel, args: &[Dynamic]) {
        self.script_line(level, || join_for_log(args));
    }

    /// Same as [`Reporter::script_log`] for text that is already formatted
    /// (`print` and `debug`).
    pub fn script_text(&self, level: LogLevel, text: &str) {
        self.script_line(level, || text.to_string());
    }

    fn script_line(&self, level: LogLevel, message: impl FnOnce() -> String) {
        match self.budget.take() {
            Ok(()) => {
                let message = message();
                match level {
                    LogLevel::Info => self.host.info(&message),
                    LogLevel::Error => self.host.error(&message),
                }
            }
            Err(true) => {
                self.host.error(&format!(
                    "{}: script log limit exceeded ({} lines per call). Further logs dropped.",
                    self.identity.borrow(),
                    self.budget.limit
                ));
            }
            Err(false) => {}
        }
    }

    /// Report a non-fatal error: console line plus diagnostics queue.
    pub fn report(&self, err: &BridgeError) {
        let line = match err {
            // Already carries the identity.
            BridgeError::MissingFunction { .. } => err.to_string(),
            _ => format!("{}: {}", self.identity.borrow(), err),
        };
        self.host.error(&line);
        self.push_diagnostic(err.diagnostic());
    }

    fn push_diagnostic(&self, diagnostic: ScriptDiagnostic) {
        let mut queue = self.diagnostics.borrow_mut();
        if queue.len() >= MAX_DIAGNOSTICS {
            queue.pop_front();
        }
        queue.push_back(diagnostic);
    }

    pub fn take_diagnostics(&self) -> Vec<ScriptDiagnostic> {
        self.diagnostics.borrow_mut().drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::RecordingHost;

    fn reporter(limit: u32) -> (Rc<RecordingHost>, Reporter) {
        let host = Rc::new(RecordingHost::new());
        let reporter = Reporter::new(host.clone(), limit);
        (host, reporter)
    }

    #[test]
    fn test_log_level_prefix() {
        assert_eq!(LogLevel::Info.prefix(), "[INFO]");
        assert_eq!(LogLevel::Error.prefix(), "[ERROR]");
    }

    #[test]
    fn test_script_log_joins_with_spaces() {
        let (host, reporter) = reporter(100);
        reporter.script_log(
            LogLevel::Info,
            &[Dynamic::from("x"), Dynamic::from(1_i64), Dynamic::from(2.5_f64)],
        );
        reporter.script_log(LogLevel::Error, &[Dynamic::from("oops")]);
        assert_eq!(host.infos(), vec!["x 1 2.5".to_string()]);
        assert_eq!(host.errors(), vec!["oops".to_string()]);
    }

    #[test]
    fn test_budget_warns_once_and_resets() {
        let (host, reporter) = reporter(3);
        for _ in 0..10 {
            reporter.script_log(LogLevel::Info, &[Dynamic::from("spam")]);
        }
        assert_eq!(host.infos().len(), 3);
        assert_eq!(host.errors().len(), 1);

        reporter.reset_budget();
        reporter.script_log(LogLevel::Info, &[Dynamic::from("again")]);
        assert_eq!(host.infos().len(), 4);
    }

    #[test]
    fn test_zero_budget_is_unlimited() {
        let (host, reporter) = reporter(0);
        for _ in 0..500 {
            reporter.script_log(LogLevel::Info, &[]);
        }
        assert_eq!(host.infos().len(), 500);
        assert!(host.errors().is_empty());
    }

    #[test]
    fn test_report_prefixes_identity_and_queues() {
        let (host, reporter) = reporter(100);
        reporter.set_identity("counter.rhai");
        reporter.report(&BridgeError::BadArgument("inlet 9 out of range".into()));
        assert_eq!(
            host.errors(),
            vec!["counter.rhai: bad argument: inlet 9 out of range".to_string()]
        );
        assert_eq!(reporter.take_diagnostics().len(), 1);
        assert!(reporter.take_diagnostics().is_empty());
    }

    #[test]
    fn test_diagnostics_are_bounded() {
        let (_host, reporter) = reporter(100);
        for i in 0..(MAX_DIAGNOSTICS + 5) {
            reporter.report(&BridgeError::BadArgument(i.to_string()));
        }
        let diags = reporter.take_diagnostics();
        assert_eq!(diags.len(), MAX_DIAGNOSTICS);
        assert!(diags[0].message.ends_with(" 5"));
    }
}
