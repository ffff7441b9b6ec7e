//! Lexer, parser, and bytecode codegen for the oyc scripting language.
//!
//! [`compile`] is the single entry point: source text in, a runnable
//! [`oyc_runtime::Prototype`] out, or a [`CompileError`] tagged with the
//! source location that caused it (spec §7).

pub mod ast;
pub mod codegen;
pub mod config;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod scope;
pub mod token;

use std::path::Path;
use std::rc::Rc;

use oyc_runtime::Prototype;

pub use config::CompilerConfig;
pub use error::{CompileError, SemanticError};
pub use lexer::LexError;
pub use parser::ParseError;

/// Compiles one source file into a top-level [`Prototype`]. `path` is
/// attached to every diagnostic and source location produced along the way,
/// and is what a `require()` call inside this source resolves relative to.
pub fn compile(source: &str, path: &Path, config: &CompilerConfig) -> Result<Rc<Prototype>, CompileError> {
    tracing::debug!(path = %path.display(), "compiling prototype");
    let tokens = lexer::Lexer::new(source).tokenize()?;
    let program = parser::Parser::new(tokens, path.to_path_buf()).parse_program()?;
    let proto = codegen::compile_program(&program, path.to_path_buf(), config.clone())?;
    codegen::check_register_budget(&proto, config)?;
    Ok(proto)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn compiled(src: &str) -> Rc<Prototype> {
        compile(src, &PathBuf::from("<test>"), &CompilerConfig::default()).unwrap()
    }

    #[test]
    fn compiles_an_empty_program() {
        let proto = compiled("");
        assert!(!proto.code.is_empty(), "should at least emit the implicit return");
    }

    #[test]
    fn compiles_arithmetic_and_a_trace_call() {
        let proto = compiled("auto x = 1 + 2 * 3;\ntrace(x);");
        assert!(proto.code.iter().any(|i| i.op == oyc_runtime::Op::Trace));
    }

    #[test]
    fn reports_undeclared_variable_as_semantic_error() {
        let err = compile("trace(y);", &PathBuf::from("<test>"), &CompilerConfig::default())
            .unwrap_err();
        assert!(matches!(err, CompileError::Semantic(_)));
    }

    #[test]
    fn reports_redeclaration_in_the_same_block_as_a_semantic_error() {
        let err = compile(
            "auto x = 1;\nauto x = 2;",
            &PathBuf::from("<test>"),
            &CompilerConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::Semantic(_)));
    }

    #[test]
    fn reports_lexer_errors_with_location() {
        let err = compile("auto x = @;", &PathBuf::from("f.oyc"), &CompilerConfig::default())
            .unwrap_err();
        assert!(matches!(err, CompileError::Lex(_)));
    }

    #[test]
    fn compiles_a_recursive_function() {
        let proto = compiled(
            "auto fact = (auto n) { if (n <= 1) { return 1; } return n * fact(n - 1); };\ntrace(fact(5));",
        );
        assert!(!proto.children.is_empty());
    }

    #[test]
    fn compiles_closures_over_a_loop_variable() {
        // the make_counters-style pattern (spec §9): each closure must
        // capture its own iteration's value via a fresh upvalue cell.
        let proto = compiled(
            "auto fns = [] {};\nauto i = 0;\nwhile (i < 3) {\n  auto n = i;\n  fns[i] = () { return n; };\n  i = i + 1;\n}",
        );
        assert!(!proto.children.is_empty());
    }
}
