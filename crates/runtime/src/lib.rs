//! Value system, bytecode, and register VM for the oyc scripting language.
//!
//! This crate has no notion of source syntax — it is handed compiled
//! [`chunk::Prototype`]s by `oyc-compiler` and runs them. The one exception
//! is [`require::Host`], the trait through which the VM asks its embedder
//! to read a file and print a line, since `require(...)` and `trace(...)`
//! are the language's only points of contact with the outside world.

pub mod array;
pub mod builtins;
pub mod chunk;
pub mod closure;
pub mod error;
pub mod loc;
pub mod require;
pub mod structobj;
pub mod value;
pub mod vm;

pub use array::ArrayObj;
pub use chunk::{CastKind, Instr, Op, Prototype, UpvalueSource};
pub use closure::ClosureObj;
pub use error::RuntimeError;
pub use loc::SourceLocation;
pub use require::Host;
pub use structobj::StructObj;
pub use value::{Key, Value};
pub use vm::{CompileFn, Vm};
