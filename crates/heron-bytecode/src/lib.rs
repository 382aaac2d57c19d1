//! # Heron Bytecode
//!
//! Output format of the Heron bytecode emitter: a stack-machine instruction
//! stream plus the side tables a runtime loader needs.
//!
//! ## Design Principles
//!
//! - **Stack-based**: Instructions pop operands from and push results to an
//!   operand stack; every opcode has a static stack effect
//! - **Relocatable**: Jumps use relative offsets, so the prologue and main
//!   sections can be concatenated after emission
//! - **Self-describing**: Scope, try-note, source-note and resume tables travel
//!   with the code
//! - **Checkable**: [`verify::verify_stack_depths`] proves depth balance
//!   without executing anything

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod constant;
pub mod error;
pub mod instruction;
pub mod notes;
pub mod operand;
pub mod scope;
pub mod script;
pub mod trynote;
pub mod verify;

pub use constant::{Constant, ConstantPool};
pub use error::BytecodeError;
pub use instruction::{
    BranchKind, CheckIsObjectKind, FunctionPrefixKind, GeneratorResumeKind, Instruction, Opcode,
    ThrowMsgKind,
};
pub use notes::{SourceNotes, SourcePosition, SrcNote, SrcNoteKind};
pub use operand::{
    ConstantIndex, EnvCoord, FunctionIndex, JumpOffset, LocalSlot, ResumeIndex, ScopeIndex,
};
pub use scope::{BindingKind, BindingLocation, BindingRecord, ScopeKind, ScopeNote, ScopeRecord};
pub use script::{FunctionRecord, LazyScript, Position, Script, ScriptFlags, ScriptKind};
pub use trynote::{TryNote, TryNoteKind, iter_close_partner};
pub use verify::{DepthMap, verify_stack_depths};
