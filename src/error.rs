use std::path::PathBuf;

use thiserror::Error;

use crate::script_diagnostics::{
    from_eval_error, from_parse_error, ScriptDiagnostic, ScriptDiagnosticKind, ScriptPhase,
};

/// Everything the bridge can report to the host console.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("compile error: {message}")]
    Compilation {
        message: String,
        diagnostic: ScriptDiagnostic,
    },

    #[error("runtime error: {message}")]
    Runtime {
        message: String,
        diagnostic: ScriptDiagnostic,
    },

    #[error("{instance}: no function '{function}' defined")]
    MissingFunction { instance: String, function: String },

    #[error("bad argument: {0}")]
    BadArgument(String),

    #[error("can't find script '{0}'")]
    NotFound(String),

    #[error("can't read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("construction failed: {0}")]
    Construction(String),

    #[error("{0} instance(s) still alive")]
    PlatformBusy(usize),
}

impl BridgeError {
    pub fn compilation(err: &rhai::ParseError) -> Self {
        let diagnostic = from_parse_error(err);
        Self::Compilation {
            message: diagnostic.message.clone(),
            diagnostic,
        }
    }

    pub fn runtime(phase: ScriptPhase, err: &rhai::EvalAltResult) -> Self {
        let diagnostic = from_eval_error(phase, err);
        Self::Runtime {
            message: diagnostic.message.clone(),
            diagnostic,
        }
    }

    /// Structured form for the diagnostics queue.
    pub fn diagnostic(&self) -> ScriptDiagnostic {
        match self {
            Self::Compilation { diagnostic, .. } | Self::Runtime { diagnostic, .. } => {
                diagnostic.clone()
            }
            Self::MissingFunction { .. } => ScriptDiagnostic::new(
                ScriptDiagnosticKind::MissingFunction,
                ScriptPhase::Dispatch,
                self.to_string(),
            ),
            Self::NotFound(_) | Self::Io { .. } => ScriptDiagnostic::new(
                ScriptDiagnosticKind::SourceError,
                ScriptPhase::Load,
                self.to_string(),
            ),
            Self::BadArgument(_) | Self::Construction(_) | Self::PlatformBusy(_) => {
                ScriptDiagnostic::new(
                    ScriptDiagnosticKind::BadArgument,
                    ScriptPhase::Dispatch,
                    self.to_string(),
                )
            }
        }
    }
}
