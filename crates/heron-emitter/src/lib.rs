//! # Heron Emitter
//!
//! Single-pass bytecode emitter for the Heron stack VM. Consumes a parsed and
//! bound tree ([`ast`]) and produces a [`heron_bytecode::Script`] with its side
//! tables.
//!
//! ## Pipeline
//!
//! 1. The external parser and binder build an [`ast::Program`]
//! 2. [`Compiler::compile`] walks it once, emitting every unit eagerly or as a
//!    lazy placeholder
//! 3. [`Compiler::compile_lazy`] compiles deferred bodies on first call
//!
//! Stack depth is tracked per instruction during emission; the result can be
//! checked independently with [`heron_bytecode::verify_stack_depths`].

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod ast;
pub mod buffer;
pub mod compiler;
pub mod config;
pub mod control;
pub mod error;
pub mod jump;
pub mod scope;

mod class;
mod destructuring;
mod emitter;
mod expr;
mod function;
mod generator;
mod stmt;
mod try_stmt;
mod unwind;

pub use compiler::Compiler;
pub use config::EmitterConfig;
pub use emitter::{EmitOutput, LazyUnit};
pub use error::{EmitError, EmitResult, Warning, WarningKind};
