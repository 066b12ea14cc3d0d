//! Structured script diagnostics.
//!
//! Rhai provides rich error types (parse + runtime) with positions. Every
//! failure the bridge reports is also wrapped into a stable, JSON-serializable
//! diagnostic so a front end (or `scriptobj check`) can surface it without
//! scraping console text.

use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScriptDiagnosticKind {
    /// Syntax/parse errors (compile time).
    ParseError,
    /// Runtime errors in user code.
    RuntimeError,
    /// A message named a function the script does not define.
    MissingFunction,
    /// A host call carried an argument the bridge cannot act on.
    BadArgument,
    /// The script file could not be found or read.
    SourceError,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScriptPhase {
    Compile,
    Evaluate,
    Dispatch,
    Load,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ScriptLocation {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptDiagnostic {
    pub kind: ScriptDiagnosticKind,
    pub phase: ScriptPhase,
    pub message: String,
    pub location: Option<ScriptLocation>,
    /// Raw engine error string (useful for bug reports).
    #[serde(default)]
    pub raw: Option<String>,
}

impl ScriptDiagnostic {
    pub fn new(kind: ScriptDiagnosticKind, phase: ScriptPhase, message: impl Into<String>) -> Self {
        Self {
            kind,
            phase,
            message: message.into(),
            location: None,
            raw: None,
        }
    }
}

fn location_of(pos: rhai::Position) -> Option<ScriptLocation> {
    let line = pos.line()? as u32;
    if line == 0 {
        return None;
    }
    let column = pos.position().unwrap_or(0) as u32;
    Some(ScriptLocation {
        line,
        column: column.max(1),
    })
}

pub fn from_parse_error(err: &rhai::ParseError) -> ScriptDiagnostic {
    let raw = err.to_string();

    ScriptDiagnostic {
        kind: ScriptDiagnosticKind::ParseError,
        phase: ScriptPhase::Compile,
        message: raw.clone(),
        location: location_of(err.position()),
        raw: Some(raw),
    }
}

pub fn from_eval_error(phase: ScriptPhase, err: &rhai::EvalAltResult) -> ScriptDiagnostic {
    let raw = err.to_string();

    ScriptDiagnostic {
        kind: ScriptDiagnosticKind::RuntimeError,
        phase,
        message: raw.clone(),
        location: location_of(err.position()),
        raw: Some(raw),
    }
}
