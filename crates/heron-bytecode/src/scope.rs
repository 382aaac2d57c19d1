//! Scope and binding tables
//!
//! One record per scope entered while compiling a script. The binding
//! storage recorded here is decided when the scope is entered and never
//! changes afterwards.

use serde::{Deserialize, Serialize};

use crate::operand::{LocalSlot, ScopeIndex};

/// Kind of a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeKind {
    /// Top level of a classic script
    Global,
    /// Top level of eval code
    Eval,
    /// Top level of a module
    Module,
    /// Parameters and vars of a function
    Function,
    /// Block, class body, switch body or loop head
    Block,
    /// Catch clause parameter scope
    Catch,
    /// Object environment of a `with` statement
    With,
    /// Per-iteration scope of an array comprehension
    Comprehension,
}

impl ScopeKind {
    /// Whether var declarations stop at this scope
    pub const fn is_var_scope(self) -> bool {
        matches!(self, Self::Global | Self::Eval | Self::Module | Self::Function)
    }
}

/// How a binding was declared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindingKind {
    /// `var`
    Var,
    /// `let`
    Let,
    /// `const`
    Const,
    /// Function declaration
    Function,
    /// Formal parameter
    Parameter,
    /// Catch parameter
    Catch,
    /// Class declaration (outer binding)
    Class,
    /// Emitter-internal binding (hidden class state, callee name)
    Synthetic,
}

impl BindingKind {
    /// Whether the binding has a temporal dead zone
    pub const fn is_lexical(self) -> bool {
        matches!(self, Self::Let | Self::Const | Self::Class)
    }

    /// Whether assignments to the binding throw
    pub const fn is_const(self) -> bool {
        matches!(self, Self::Const)
    }
}

/// Where a binding lives at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindingLocation {
    /// Actual argument slot of an unaliased simple parameter
    Argument(u16),
    /// Fixed frame slot
    Frame(LocalSlot),
    /// Slot in the scope's environment object
    Environment(u32),
    /// Property of the global object or global lexical scope
    Global,
    /// Looked up by name at runtime
    Dynamic,
}

/// A binding in a scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingRecord {
    /// Binding name
    pub name: Box<str>,
    /// Declaration kind
    pub kind: BindingKind,
    /// Storage
    pub location: BindingLocation,
}

/// A scope in the scope table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeRecord {
    /// Scope kind
    pub kind: ScopeKind,
    /// Enclosing scope in this script, `None` for the outermost one
    pub enclosing: Option<ScopeIndex>,
    /// Bindings in declaration order
    pub bindings: Vec<BindingRecord>,
    /// Whether entering the scope creates an environment object
    pub has_environment: bool,
    /// Number of environment slots
    pub environment_slots: u32,
    /// First frame slot used by this scope
    pub first_frame_slot: u32,
    /// One past the last frame slot used by this scope
    pub frame_slot_end: u32,
}

impl ScopeRecord {
    /// Find a binding by name
    pub fn binding(&self, name: &str) -> Option<&BindingRecord> {
        self.bindings.iter().find(|b| &*b.name == name)
    }
}

/// Code range during which a scope is the innermost one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeNote {
    /// Scope table entry
    pub scope: ScopeIndex,
    /// First instruction
    pub start: u32,
    /// Number of instructions
    pub length: u32,
    /// Index of the enclosing note
    pub parent: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_kinds() {
        assert!(BindingKind::Let.is_lexical());
        assert!(BindingKind::Class.is_lexical());
        assert!(!BindingKind::Var.is_lexical());
        assert!(BindingKind::Const.is_const());
        assert!(ScopeKind::Function.is_var_scope());
        assert!(!ScopeKind::Catch.is_var_scope());
    }
}
