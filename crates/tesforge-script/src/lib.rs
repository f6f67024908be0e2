//! Script compiler for TES4-family plugins.
//!
//! Source text is compiled to the bytecode and metadata stored in `SCPT`
//! records (`SCHR`, `SCDA`, `SLSD`/`SCVR`, `SCRV`/`SCRO`). Names resolve
//! against three tables: the script's own locals, the symbols gathered from
//! the active plugin and its masters by [`CompileContext::setup`], and the
//! built-in function [`catalog`].
//!
//! ```no_run
//! use tesforge_script::{catalog, compile_result_script, CompileContext};
//!
//! let ctx = CompileContext::new(catalog::global()?);
//! let script = compile_result_script(&ctx, "short x\nset x to 2 + 3 * 4")?;
//! assert_eq!(script.locals.len(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod ast;
pub mod catalog;
pub mod compiler;
pub mod emit;
pub mod error;
pub mod lexer;
pub mod options;
mod parser;
pub mod symbols;

pub use catalog::Catalog;
pub use compiler::{
    compile_result_script, compile_script, compile_source, CompiledScript, Local, Reference, ScriptType,
};
pub use error::{CompileError, Diagnostic, Result};
pub use options::CompileOptions;
pub use symbols::{CompileContext, SymbolTable, VarKind};
