//! Compile-time errors (spec §7). One variant per pipeline stage; no
//! `thiserror` here either — hand-rolled `Display`, matching the runtime
//! crate's error type.

use std::fmt;

use oyc_runtime::SourceLocation;

use crate::lexer::LexError;
use crate::parser::ParseError;

/// A semantic error caught during codegen: an undeclared name, too many
/// registers for one function body, an invalid `delete`/assignment target
/// that the parser couldn't reject on its own.
#[derive(Debug, Clone)]
pub struct SemanticError {
    pub message: String,
    pub at: SourceLocation,
}

impl fmt::Display for SemanticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.at, self.message)
    }
}

impl std::error::Error for SemanticError {}

#[derive(Debug, Clone)]
pub enum CompileError {
    Lex(LexError),
    Parse(ParseError),
    Semantic(SemanticError),
}

impl CompileError {
    pub fn location(&self, file: &std::path::Path) -> SourceLocation {
        match self {
            CompileError::Lex(e) => SourceLocation::new(file.to_path_buf(), e.line, e.column),
            CompileError::Parse(e) => e.at.clone(),
            CompileError::Semantic(e) => e.at.clone(),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Lex(e) => write!(f, "{e}"),
            CompileError::Parse(e) => write!(f, "{e}"),
            CompileError::Semantic(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<LexError> for CompileError {
    fn from(e: LexError) -> Self {
        CompileError::Lex(e)
    }
}

impl From<ParseError> for CompileError {
    fn from(e: ParseError) -> Self {
        CompileError::Parse(e)
    }
}

impl From<SemanticError> for CompileError {
    fn from(e: SemanticError) -> Self {
        CompileError::Semantic(e)
    }
}
