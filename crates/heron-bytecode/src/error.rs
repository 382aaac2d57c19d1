//! Bytecode errors

use thiserror::Error;

/// Errors found while checking a compiled script
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BytecodeError {
    /// An instruction pops more values than the stack holds
    #[error("Stack underflow at offset {offset}: depth {depth}, needs {needs}")]
    StackUnderflow {
        /// Instruction offset
        offset: usize,
        /// Depth before the instruction
        depth: u32,
        /// Values popped by the instruction
        needs: u32,
    },

    /// Two paths reach an instruction with different depths
    #[error("Depth mismatch at offset {offset}: {expected} vs {found}")]
    DepthMismatch {
        /// Instruction offset
        offset: usize,
        /// Depth recorded first
        expected: u32,
        /// Depth of the conflicting path
        found: u32,
    },

    /// The recorded maximum is lower than a reachable depth
    #[error("Depth {depth} at offset {offset} exceeds recorded maximum {max}")]
    ExceedsMaxDepth {
        /// Instruction offset
        offset: usize,
        /// Reached depth
        depth: u32,
        /// Recorded maximum
        max: u32,
    },

    /// A jump still carries its placeholder offset
    #[error("Unpatched jump at offset {0}")]
    UnpatchedJump(usize),

    /// A jump leaves the code
    #[error("Jump at offset {0} targets outside the code")]
    JumpOutOfRange(usize),

    /// Control falls off the end of the code
    #[error("Control falls off the end after offset {0}")]
    FallsOffEnd(usize),

    /// A return leaves values on the stack
    #[error("Exit at offset {offset} with depth {depth}")]
    UnbalancedExit {
        /// Instruction offset
        offset: usize,
        /// Depth before the exit
        depth: u32,
    },

    /// A resume index points outside the code
    #[error("Invalid resume offset for index {0}")]
    InvalidResumeOffset(usize),

    /// Exception regions overlap without nesting
    #[error("Try notes are not properly nested")]
    TryNotesNotNested,

    /// An inline iterator close has no enclosing for-of region at its depth
    #[error("Iterator close at offset {0} has no matching for-of region")]
    UnpairedIterClose(u32),
}

/// Result type for bytecode operations
pub type Result<T> = std::result::Result<T, BytecodeError>;
