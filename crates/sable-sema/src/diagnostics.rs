// crates/sable-sema/src/diagnostics.rs
//! Diagnostic codes and the shared diagnostic sink.
//!
//! Two severities exist: hard errors (`CompilerError`, returned as `Err`,
//! aborting analysis of the current function) and accumulated diagnostics
//! (`Diagnostics`), which never halt analysis. Codes follow the numbering
//! scheme E3xxx for semantic analysis and E4xxx for memory-flow analysis;
//! warnings render with a W prefix.

use sable_frontend::Span;
use thiserror::Error;

/// Diagnostic severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// Static metadata for a diagnostic code.
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    pub code: u16,
    pub severity: Severity,
}

impl ErrorInfo {
    /// Format the code as "Exxxx" or "Wxxxx".
    pub fn code_string(&self) -> String {
        let prefix = if self.severity == Severity::Warning {
            "W"
        } else {
            "E"
        };
        format!("{}{:04}", prefix, self.code)
    }
}

macro_rules! error_info {
    ($name:ident, $code:expr, $severity:ident) => {
        pub const $name: ErrorInfo = ErrorInfo {
            code: $code,
            severity: Severity::$severity,
        };
    };
}

// Semantic analysis (E3xxx / W3xxx)
error_info!(SEMA_TYPE_MISMATCH, 3001, Error);
error_info!(SEMA_DUPLICATE_DECLARATION, 3002, Error);
error_info!(SEMA_SHADOWING, 3003, Error);
error_info!(SEMA_NOT_MUTATING, 3004, Error);
error_info!(SEMA_UNNECESSARY_CAST, 3005, Error);
error_info!(SEMA_CAST_ALWAYS_FAILS, 3006, Error);
error_info!(SEMA_MISSING_PROTOCOL_METHOD, 3008, Error);
error_info!(SEMA_PROMISE_VIOLATION, 3009, Error);
error_info!(SEMA_DUPLICATE_CONFORMANCE, 3010, Error);
error_info!(SEMA_NO_ENTRY_POINT, 3011, Error);
error_info!(SEMA_ENTRY_POINT_RETURN, 3012, Error);
error_info!(SEMA_MISSING_RETURN, 3013, Error);
error_info!(SEMA_SUPER_INIT, 3014, Error);
error_info!(SEMA_ESCAPING_SELF_CAPTURE, 3015, Error);
error_info!(SEMA_UNINITIALIZED, 3016, Error);
error_info!(SEMA_FINAL_OVERRIDE, 3017, Error);
error_info!(SEMA_VARIABLE_NOT_FOUND, 3018, Error);
error_info!(SEMA_TYPE_NOT_FOUND, 3019, Error);
error_info!(WARN_DEAD_CODE, 3101, Warning);
error_info!(WARN_AMBIGUOUS_TYPE, 3102, Warning);
error_info!(WARN_COMMON_TYPE_TOP, 3103, Warning);
error_info!(WARN_NO_INITIALIZERS, 3104, Warning);

// Memory-flow analysis (E4xxx)
error_info!(MF_DEINIT_ESCAPES, 4001, Error);
error_info!(MF_THIS_PROMISE, 4002, Error);
error_info!(MF_PARAM_PROMISE, 4003, Error);

/// A note attached to a diagnostic, pointing at a second source position
/// (e.g. "previous declaration is here").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub span: Span,
    pub message: String,
}

/// A rendered diagnostic with location, message and related notes.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub info: &'static ErrorInfo,
    pub span: Span,
    pub message: String,
    pub notes: Vec<Note>,
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        self.info.severity
    }
}

/// A hard compile error. Aborts analysis of the current function or
/// compilation unit; the package analyser records it and continues with
/// the next function in its queue.
#[derive(Debug, Clone, Error)]
#[error("{span}: {message}")]
pub struct CompilerError {
    /// The diagnostic code this error surfaces under when it is caught at
    /// a recovery boundary.
    pub info: &'static ErrorInfo,
    pub span: Span,
    pub message: String,
    pub notes: Vec<Note>,
}

impl CompilerError {
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            info: &SEMA_TYPE_MISMATCH,
            span,
            message: message.into(),
            notes: Vec::new(),
        }
    }

    pub fn with_info(mut self, info: &'static ErrorInfo) -> Self {
        self.info = info;
        self
    }

    pub fn with_note(mut self, span: Span, message: impl Into<String>) -> Self {
        self.notes.push(Note {
            span,
            message: message.into(),
        });
        self
    }
}

/// A failed variable lookup. Distinct from other hard errors so callers can
/// recognize the condition; treated as fatal at the point of use.
#[derive(Debug, Clone, Error)]
#[error("{span}: variable \"{name}\" not found")]
pub struct VariableNotFound {
    pub span: Span,
    pub name: String,
}

impl From<VariableNotFound> for CompilerError {
    fn from(err: VariableNotFound) -> Self {
        CompilerError::new(err.span, format!("Variable \"{}\" not found.", err.name))
            .with_info(&SEMA_VARIABLE_NOT_FOUND)
    }
}

pub type AnalysisResult<T> = Result<T, CompilerError>;

/// Shared sink for accumulated diagnostics. Non-fatal errors still fail the
/// compilation at the end, but analysis continues past them.
#[derive(Debug, Default)]
pub struct Diagnostics {
    list: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(
        &mut self,
        info: &'static ErrorInfo,
        span: Span,
        message: impl Into<String>,
    ) {
        self.list.push(Diagnostic {
            info,
            span,
            message: message.into(),
            notes: Vec::new(),
        });
    }

    pub fn emit_with_note(
        &mut self,
        info: &'static ErrorInfo,
        span: Span,
        message: impl Into<String>,
        note_span: Span,
        note: impl Into<String>,
    ) {
        self.list.push(Diagnostic {
            info,
            span,
            message: message.into(),
            notes: vec![Note {
                span: note_span,
                message: note.into(),
            }],
        });
    }

    /// Record a hard error that was caught at a recovery boundary. The
    /// error's own code is preserved.
    pub fn record_error(&mut self, err: CompilerError) {
        self.list.push(Diagnostic {
            info: err.info,
            span: err.span,
            message: err.message,
            notes: err.notes,
        });
    }

    pub fn has_errors(&self) -> bool {
        self.list
            .iter()
            .any(|d| d.severity() == Severity::Error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.list.iter()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_string_prefixes() {
        assert_eq!(SEMA_TYPE_MISMATCH.code_string(), "E3001");
        assert_eq!(WARN_DEAD_CODE.code_string(), "W3101");
    }

    #[test]
    fn sink_tracks_severity() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.emit(&WARN_DEAD_CODE, Span::none(), "Code will never be executed.");
        assert!(!diagnostics.has_errors());
        diagnostics.emit(&SEMA_SHADOWING, Span::none(), "shadowed");
        assert!(diagnostics.has_errors());
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn variable_not_found_converts() {
        let err: CompilerError = VariableNotFound {
            span: Span::none(),
            name: "x".into(),
        }
        .into();
        assert!(err.message.contains("\"x\""));
    }

    #[test]
    fn recovered_errors_keep_their_code() {
        let mut diagnostics = Diagnostics::new();
        let err: CompilerError = VariableNotFound {
            span: Span::none(),
            name: "x".into(),
        }
        .into();
        diagnostics.record_error(err);
        let recorded = diagnostics.iter().next().unwrap();
        assert_eq!(recorded.info.code_string(), "E3018");

        diagnostics.record_error(
            CompilerError::new(Span::none(), "previous declaration clashes")
                .with_info(&SEMA_DUPLICATE_DECLARATION),
        );
        let recorded = diagnostics.iter().nth(1).unwrap();
        assert_eq!(recorded.info.code_string(), "E3002");
    }
}
