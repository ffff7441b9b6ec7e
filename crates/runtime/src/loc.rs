//! Source locations shared by the compiler's diagnostics and the VM's
//! runtime errors.
//!
//! Kept in the runtime crate (rather than duplicated in the compiler) because
//! a [`crate::error::RuntimeError`] needs to carry the same location type a
//! compiled [`crate::chunk::Prototype`] records per instruction.

use std::fmt;
use std::path::PathBuf;

/// A single point in a source file: a 1-indexed line and column.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(file: PathBuf, line: u32, column: u32) -> Self {
        SourceLocation { file, line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
    }
}
