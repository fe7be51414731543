//! Component source transpiler.
//!
//! Turns author-written component source (JSX plus modern syntax, with a bare
//! top-level `return`) into a plain function body that the sandbox can
//! evaluate. The oxc parser handles the grammar; everything after parsing runs
//! over an owned IR so downstream consumers never touch the parser's arena.

pub mod ast;
pub mod codegen;
pub mod error;
mod jsx;
mod lower;
pub mod transpiler;

pub use codegen::{number_to_string, print_program, quote};
pub use error::TranspileError;
pub use transpiler::{parse_artifact, CompiledArtifact, TranspileOptions, Transpiler};
