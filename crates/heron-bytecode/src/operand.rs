//! Bytecode operands

use serde::{Deserialize, Serialize};

/// Index into the constant pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ConstantIndex(pub u32);

impl ConstantIndex {
    /// Create a new constant index
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get index value
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// Fixed frame slot holding an unaliased local binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct LocalSlot(pub u32);

impl LocalSlot {
    /// Create a new frame slot
    #[inline]
    pub const fn new(slot: u32) -> Self {
        Self(slot)
    }

    /// Get slot number
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// Environment coordinate: number of environment objects to skip, then a slot
/// in the reached environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvCoord {
    /// Environments to skip outward from the current one
    pub hops: u16,
    /// Slot within the reached environment
    pub slot: u32,
}

impl EnvCoord {
    /// Create a new coordinate
    #[inline]
    pub const fn new(hops: u16, slot: u32) -> Self {
        Self { hops, slot }
    }
}

/// Index into the script's scope table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ScopeIndex(pub u32);

impl ScopeIndex {
    /// Create a new scope index
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get index value
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// Index into the script's nested function list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct FunctionIndex(pub u32);

impl FunctionIndex {
    /// Create a new function index
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get index value
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// Relative jump offset, in instructions, from the jump itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct JumpOffset(pub i32);

impl JumpOffset {
    /// Placeholder stored in a jump until it is patched
    pub const UNPATCHED: JumpOffset = JumpOffset(0);

    /// Create a new jump offset
    #[inline]
    pub const fn new(offset: i32) -> Self {
        Self(offset)
    }

    /// Get offset value
    #[inline]
    pub const fn offset(self) -> i32 {
        self.0
    }

    /// Whether this is still the unpatched placeholder
    #[inline]
    pub const fn is_unpatched(self) -> bool {
        self.0 == 0
    }
}

/// Index into the resume-offset table (generator suspend points and
/// finally-block return points share the table)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ResumeIndex(pub u32);

impl ResumeIndex {
    /// Create a new resume index
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get index value
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpatched_jump() {
        assert!(JumpOffset::UNPATCHED.is_unpatched());
        assert!(!JumpOffset::new(-3).is_unpatched());
        assert_eq!(JumpOffset::new(7).offset(), 7);
    }

    #[test]
    fn test_env_coord() {
        let coord = EnvCoord::new(2, 5);
        assert_eq!(coord.hops, 2);
        assert_eq!(coord.slot, 5);
    }
}
