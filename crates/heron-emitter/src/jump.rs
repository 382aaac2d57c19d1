//! Jump fixup
//!
//! A [`JumpList`] collects forward jumps that share one destination. It is
//! consumed by [`CodeBuffer::patch`] or [`CodeBuffer::patch_to_here`], so a
//! list cannot be patched twice; the buffer counts open jumps so a list that
//! is never patched is caught when the unit is finished.

use smallvec::SmallVec;

use heron_bytecode::{Instruction, JumpOffset};

use crate::buffer::CodeBuffer;
use crate::error::EmitResult;

/// Pending forward jumps to one destination
#[derive(Debug, Default)]
#[must_use = "every jump list must be patched exactly once"]
pub struct JumpList {
    offsets: SmallVec<[u32; 2]>,
    depth: Option<u32>,
}

impl JumpList {
    /// Empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no jumps are pending
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Stack depth on the jumps' taken edges
    pub fn depth(&self) -> Option<u32> {
        self.depth
    }

    /// Merge another list into this one
    pub fn append(&mut self, other: JumpList) {
        if other.offsets.is_empty() {
            return;
        }
        debug_assert!(
            self.depth.is_none() || self.depth == other.depth,
            "merged jumps disagree on depth: {:?} vs {:?}",
            self.depth,
            other.depth
        );
        self.depth = self.depth.or(other.depth);
        self.offsets.extend(other.offsets);
    }
}

/// A known jump destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpTarget {
    /// Section-relative offset
    pub offset: u32,
    /// Stack depth expected on arrival
    pub depth: u32,
}

impl CodeBuffer {
    /// Emit a forward jump with a placeholder offset
    pub fn open_jump(&mut self, jump: Instruction) -> EmitResult<JumpList> {
        debug_assert!(jump.jump_offset().is_some(), "{jump} is not a jump");
        let depth = jump.branch_depth(self.depth()).unwrap_or(self.depth());
        let offset = self.emit(jump)?;
        self.open_jumps += 1;
        let mut offsets = SmallVec::new();
        offsets.push(offset);
        Ok(JumpList {
            offsets,
            depth: Some(depth),
        })
    }

    /// Capture the current offset as a jump destination, emitting a
    /// `JumpTarget` unless the previous instruction already is one.
    pub fn mark(&mut self) -> EmitResult<JumpTarget> {
        let depth = self.depth();
        let offset = match self.trailing_target() {
            Some(offset) => offset,
            None => self.emit(Instruction::JumpTarget)?,
        };
        self.set_reachable(true);
        Ok(JumpTarget { offset, depth })
    }

    /// Emit a loop head marker; loop heads are never coalesced
    pub fn mark_loop_head(&mut self, nesting: u8) -> EmitResult<JumpTarget> {
        let depth = self.depth();
        let offset = self.emit(Instruction::LoopHead { depth: nesting })?;
        Ok(JumpTarget { offset, depth })
    }

    /// Resolve every jump in `list` to `target`
    pub fn patch(&mut self, list: JumpList, target: JumpTarget) {
        debug_assert!(
            list.depth.is_none() || list.depth == Some(target.depth),
            "jump depth {:?} does not match target depth {}",
            list.depth,
            target.depth
        );
        for offset in &list.offsets {
            let relative = JumpOffset::new(target.offset as i32 - *offset as i32);
            let patched = self
                .instruction_mut(*offset)
                .is_some_and(|jump| jump.offset_is_unpatched() && jump.set_jump_offset(relative));
            debug_assert!(patched, "jump at {offset} patched twice or not a jump");
        }
        self.open_jumps -= list.offsets.len();
    }

    /// Resolve `list` to the current offset. When the current position is
    /// unreachable the depth is taken from the jumps.
    pub fn patch_to_here(&mut self, list: JumpList) -> EmitResult<Option<JumpTarget>> {
        let Some(depth) = list.depth else {
            return Ok(None);
        };
        if !self.is_reachable() {
            self.set_depth(depth);
        }
        let target = self.mark()?;
        self.patch(list, target);
        Ok(Some(target))
    }

    /// Emit a jump to an already known (earlier) target
    pub fn emit_backward_jump(&mut self, jump: Instruction, target: JumpTarget) -> EmitResult<()> {
        let mut jump = jump;
        debug_assert_eq!(
            jump.branch_depth(self.depth()),
            Some(target.depth),
            "loop tail depth differs from loop head"
        );
        let relative = JumpOffset::new(target.offset as i32 - self.offset() as i32);
        jump.set_jump_offset(relative);
        self.emit(jump)?;
        Ok(())
    }
}

trait UnpatchedExt {
    fn offset_is_unpatched(&self) -> bool;
}

impl UnpatchedExt for Instruction {
    fn offset_is_unpatched(&self) -> bool {
        self.jump_offset().is_some_and(JumpOffset::is_unpatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmitterConfig;

    fn buffer() -> CodeBuffer {
        CodeBuffer::new(&EmitterConfig::default(), 1, 0)
    }

    #[test]
    fn test_forward_patch() {
        let mut buf = buffer();
        buf.emit(Instruction::True).unwrap();
        let jump = buf.open_jump(Instruction::IfEq { offset: JumpOffset::UNPATCHED }).unwrap();
        assert_eq!(jump.depth(), Some(0));
        buf.emit(Instruction::Nop).unwrap();
        let target = buf.patch_to_here(jump).unwrap().unwrap();
        assert_eq!(target.offset, 3);
        assert_eq!(
            buf.instruction(1),
            Some(&Instruction::IfEq { offset: JumpOffset(2) })
        );
        assert_eq!(buf.open_jumps, 0);
    }

    #[test]
    fn test_adjacent_targets_coalesce() {
        let mut buf = buffer();
        let a = buf.mark().unwrap();
        let b = buf.mark().unwrap();
        assert_eq!(a, b);
        buf.emit(Instruction::Nop).unwrap();
        let c = buf.mark().unwrap();
        assert_ne!(a.offset, c.offset);
    }

    #[test]
    fn test_unreachable_adopts_jump_depth() {
        let mut buf = buffer();
        buf.emit(Instruction::Null).unwrap();
        let jump = buf.open_jump(Instruction::Goto { offset: JumpOffset::UNPATCHED }).unwrap();
        assert!(!buf.is_reachable());
        buf.set_depth(4);
        let target = buf.patch_to_here(jump).unwrap().unwrap();
        assert_eq!(target.depth, 1);
        assert_eq!(buf.depth(), 1);
    }

    #[test]
    fn test_merged_lists() {
        let mut buf = buffer();
        let mut list = JumpList::new();
        assert!(list.is_empty());
        list.append(buf.open_jump(Instruction::Goto { offset: JumpOffset::UNPATCHED }).unwrap());
        buf.set_reachable(true);
        list.append(buf.open_jump(Instruction::Goto { offset: JumpOffset::UNPATCHED }).unwrap());
        assert_eq!(buf.open_jumps, 2);
        buf.patch_to_here(list).unwrap();
        assert_eq!(buf.open_jumps, 0);
        assert_eq!(
            buf.instruction(0),
            Some(&Instruction::Goto { offset: JumpOffset(2) })
        );
    }

    #[test]
    fn test_backward_jump() {
        let mut buf = buffer();
        let head = buf.mark_loop_head(0).unwrap();
        buf.emit(Instruction::Nop).unwrap();
        buf.emit_backward_jump(Instruction::Goto { offset: JumpOffset::UNPATCHED }, head)
            .unwrap();
        assert_eq!(
            buf.instruction(2),
            Some(&Instruction::Goto { offset: JumpOffset(-2) })
        );
    }
}
