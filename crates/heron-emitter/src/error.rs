//! Emission errors and warnings

use thiserror::Error;

use crate::ast::Span;

/// Fatal emission errors. Any of these aborts the whole compilation unit.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EmitError {
    /// `break` with no enclosing loop, switch or matching label
    #[error("No break target{} at {}:{}", label_suffix(.label), .span.line, .span.column)]
    NoBreakTarget {
        /// Label, if any
        label: Option<String>,
        /// Source position
        span: Span,
    },

    /// `continue` with no enclosing loop or matching label
    #[error("No continue target{} at {}:{}", label_suffix(.label), .span.line, .span.column)]
    NoContinueTarget {
        /// Label, if any
        label: Option<String>,
        /// Source position
        span: Span,
    },

    /// `continue label` where the label does not name a loop
    #[error("Label '{label}' does not denote a loop at {}:{}", .span.line, .span.column)]
    ContinueToNonLoop {
        /// Label
        label: String,
        /// Source position
        span: Span,
    },

    /// Instruction stream exceeded the configured length
    #[error("Code too long (max {max} instructions)")]
    CodeTooLong {
        /// Configured limit
        max: usize,
    },

    /// Function declares more parameters than allowed
    #[error("Too many parameters ({count}, max {max})")]
    TooManyParameters {
        /// Declared parameters
        count: usize,
        /// Configured limit
        max: usize,
    },

    /// Constant pool overflow
    #[error("Too many constants (max {max})")]
    TooManyConstants {
        /// Configured limit
        max: usize,
    },

    /// Frame slot overflow
    #[error("Too many frame slots (max {max})")]
    TooManyFrameSlots {
        /// Configured limit
        max: usize,
    },

    /// Operand stack deeper than allowed
    #[error("Operand stack too deep (max {max})")]
    StackTooDeep {
        /// Configured limit
        max: u32,
    },

    /// Assignment to something that is not a reference
    #[error("Invalid assignment target at {}:{}", .span.line, .span.column)]
    InvalidAssignmentTarget {
        /// Source position
        span: Span,
    },

    /// Construct the emitter cannot lower
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

fn label_suffix(label: &Option<String>) -> String {
    label
        .as_ref()
        .map(|l| format!(" for label '{l}'"))
        .unwrap_or_default()
}

impl EmitError {
    /// Create an unsupported error
    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported(feature.into())
    }

    /// Create a missing break target error
    pub fn no_break_target(label: Option<&str>, span: Span) -> Self {
        Self::NoBreakTarget {
            label: label.map(str::to_string),
            span,
        }
    }

    /// Create a missing continue target error
    pub fn no_continue_target(label: Option<&str>, span: Span) -> Self {
        Self::NoContinueTarget {
            label: label.map(str::to_string),
            span,
        }
    }
}

/// Result type for emission
pub type EmitResult<T> = Result<T, EmitError>;

/// Kind of a non-fatal diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Expression statement without side effects
    UselessExpression,
    /// Directive contradicting the surrounding code
    ConflictingDirective,
}

/// Non-fatal diagnostic; the instruction stream is still produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// What was noticed
    pub kind: WarningKind,
    /// Where
    pub span: Span,
}

impl Warning {
    /// Create a warning
    pub fn new(kind: WarningKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = EmitError::no_break_target(Some("outer"), Span::new(3, 4));
        assert_eq!(err.to_string(), "No break target for label 'outer' at 3:4");
        let err = EmitError::no_continue_target(None, Span::new(1, 0));
        assert_eq!(err.to_string(), "No continue target at 1:0");
        assert_eq!(
            EmitError::unsupported("async yield*").to_string(),
            "Unsupported: async yield*"
        );
    }
}
