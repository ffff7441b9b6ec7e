//! Runtime errors (spec §7). There is no `thiserror` dependency anywhere in
//! this workspace; `RuntimeError` implements `Display`/`std::error::Error`
//! by hand, the way the rest of this codebase's error types do.

use std::fmt;

use crate::loc::SourceLocation;

/// The three runtime error kinds spec §7 distinguishes, plus the context
/// needed to render the `path:line:col: error: message` diagnostic and,
/// for a failed `require`, the chain of call sites that led there.
#[derive(Debug, Clone)]
pub enum RuntimeError {
    /// An operation was applied to a value of the wrong type (e.g. `1 + {}`,
    /// calling a non-closure, indexing a non-container).
    Type {
        message: String,
        at: SourceLocation,
    },
    /// The operand types were right but the value was not (e.g. integer
    /// division or modulo by zero, a negative or non-integer array index).
    Value {
        message: String,
        at: SourceLocation,
    },
    /// A `require(...)` call failed to load, compile, or run the target
    /// file. `chain` records the require call sites from outermost to
    /// innermost, rendered as `caused by:` lines (spec §7).
    Require {
        message: String,
        at: SourceLocation,
        chain: Vec<SourceLocation>,
    },
}

impl RuntimeError {
    pub fn type_error(message: impl Into<String>, at: SourceLocation) -> Self {
        RuntimeError::Type {
            message: message.into(),
            at,
        }
    }

    pub fn value_error(message: impl Into<String>, at: SourceLocation) -> Self {
        RuntimeError::Value {
            message: message.into(),
            at,
        }
    }

    pub fn require_error(
        message: impl Into<String>,
        at: SourceLocation,
        chain: Vec<SourceLocation>,
    ) -> Self {
        RuntimeError::Require {
            message: message.into(),
            at,
            chain,
        }
    }

    pub fn location(&self) -> &SourceLocation {
        match self {
            RuntimeError::Type { at, .. }
            | RuntimeError::Value { at, .. }
            | RuntimeError::Require { at, .. } => at,
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::Type { message, at } => {
                write!(f, "{at}: error: {message}")
            }
            RuntimeError::Value { message, at } => {
                write!(f, "{at}: error: {message}")
            }
            RuntimeError::Require { message, at, chain } => {
                write!(f, "{at}: error: {message}")?;
                for site in chain {
                    write!(f, "\ncaused by: {site}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for RuntimeError {}
