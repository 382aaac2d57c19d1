//! Static stack-depth verification
//!
//! Walks every path through a script using only the static stack effect of
//! each instruction. Entry points are the first instruction and the handler
//! of every try note with emitted handler code. `Gosub` continues both at its
//! finally block (operands kept) and after itself (operands popped);
//! `Retsub` ends a path. Every inline iterator close must sit inside the
//! for-of region it unwinds to.

use crate::error::{BytecodeError, Result};
use crate::instruction::Instruction;
use crate::script::Script;
use crate::trynote::{TryNoteKind, is_properly_nested, iter_close_partner};

/// Per-instruction depths computed by [`verify_stack_depths`]
#[derive(Debug, Clone)]
pub struct DepthMap {
    depths: Vec<Option<u32>>,
}

impl DepthMap {
    /// Depth before the instruction at `offset`, `None` if unreachable
    pub fn depth_at(&self, offset: usize) -> Option<u32> {
        self.depths.get(offset).copied().flatten()
    }

    /// Number of reachable instructions
    pub fn reachable(&self) -> usize {
        self.depths.iter().filter(|d| d.is_some()).count()
    }
}

/// Check depth balance and jump resolution of a script.
pub fn verify_stack_depths(script: &Script) -> Result<DepthMap> {
    let code = &script.code;
    let mut depths: Vec<Option<u32>> = vec![None; code.len()];
    let mut worklist: Vec<(usize, u32)> = Vec::new();

    if !code.is_empty() {
        worklist.push((0, 0));
    }
    if !is_properly_nested(&script.try_notes) {
        return Err(BytecodeError::TryNotesNotNested);
    }
    for (index, note) in script.try_notes.iter().enumerate() {
        if note.kind == TryNoteKind::ForOfIterClose
            && iter_close_partner(&script.try_notes, index).is_none()
        {
            return Err(BytecodeError::UnpairedIterClose(note.start));
        }
    }
    for note in &script.try_notes {
        if note.kind.has_handler() {
            worklist.push((note.end() as usize, note.depth + note.kind.handler_pushes()));
        }
    }
    for (index, offset) in script.resume_offsets.iter().enumerate() {
        if *offset as usize >= code.len() {
            return Err(BytecodeError::InvalidResumeOffset(index));
        }
    }

    while let Some((pc, depth)) = worklist.pop() {
        let Some(instruction) = code.get(pc) else {
            return Err(BytecodeError::JumpOutOfRange(pc));
        };
        match depths[pc] {
            Some(seen) if seen == depth => continue,
            Some(seen) => {
                return Err(BytecodeError::DepthMismatch {
                    offset: pc,
                    expected: seen,
                    found: depth,
                });
            }
            None => depths[pc] = Some(depth),
        }

        let uses = instruction.nuses();
        if depth < uses {
            return Err(BytecodeError::StackUnderflow {
                offset: pc,
                depth,
                needs: uses,
            });
        }
        let after = depth - uses + instruction.ndefs();
        if after > script.max_stack_depth || depth > script.max_stack_depth {
            return Err(BytecodeError::ExceedsMaxDepth {
                offset: pc,
                depth: after.max(depth),
                max: script.max_stack_depth,
            });
        }

        match instruction {
            Instruction::Return if depth != 1 => {
                return Err(BytecodeError::UnbalancedExit { offset: pc, depth });
            }
            Instruction::RetRval if depth != 0 => {
                return Err(BytecodeError::UnbalancedExit { offset: pc, depth });
            }
            _ => {}
        }

        if let Some(offset) = instruction.jump_offset() {
            if offset.is_unpatched() {
                return Err(BytecodeError::UnpatchedJump(pc));
            }
            let target = pc as i64 + i64::from(offset.offset());
            if target < 0 || target as usize >= code.len() {
                return Err(BytecodeError::JumpOutOfRange(pc));
            }
            let branch_depth = instruction.branch_depth(depth).unwrap_or(after);
            worklist.push((target as usize, branch_depth));
        }

        if !instruction.is_terminator() {
            if pc + 1 >= code.len() {
                return Err(BytecodeError::FallsOffEnd(pc));
            }
            worklist.push((pc + 1, after));
        }
    }

    Ok(DepthMap { depths })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::JumpOffset;
    use crate::trynote::TryNote;

    fn script(code: Vec<Instruction>, max: u32) -> Script {
        Script::builder()
            .code(Vec::new(), code)
            .max_stack_depth(max)
            .build()
    }

    #[test]
    fn test_balanced_if_else() {
        let s = script(
            vec![
                Instruction::True,
                Instruction::IfEq { offset: JumpOffset(3) },
                Instruction::Int32 { value: 1 },
                Instruction::Goto { offset: JumpOffset(3) },
                Instruction::JumpTarget,
                Instruction::Int32 { value: 2 },
                Instruction::JumpTarget,
                Instruction::SetRval,
                Instruction::RetRval,
            ],
            1,
        );
        let map = verify_stack_depths(&s).unwrap();
        assert_eq!(map.depth_at(4), Some(0));
        assert_eq!(map.depth_at(6), Some(1));
        assert_eq!(map.reachable(), 9);
    }

    #[test]
    fn test_mismatch_detected() {
        let s = script(
            vec![
                Instruction::True,
                Instruction::IfEq { offset: JumpOffset(3) },
                Instruction::Int32 { value: 1 },
                Instruction::Nop,
                Instruction::JumpTarget,
                Instruction::Throw,
            ],
            1,
        );
        assert!(matches!(
            verify_stack_depths(&s),
            Err(BytecodeError::DepthMismatch { offset: 4, .. })
        ));
    }

    #[test]
    fn test_unpatched_jump() {
        let s = script(
            vec![Instruction::Goto { offset: JumpOffset::UNPATCHED }, Instruction::RetRval],
            0,
        );
        assert_eq!(verify_stack_depths(&s).unwrap_err(), BytecodeError::UnpatchedJump(0));
    }

    #[test]
    fn test_underflow() {
        let s = script(vec![Instruction::Pop, Instruction::RetRval], 0);
        assert!(matches!(
            verify_stack_depths(&s),
            Err(BytecodeError::StackUnderflow { offset: 0, .. })
        ));
    }

    #[test]
    fn test_unbalanced_exit() {
        let s = script(vec![Instruction::Null, Instruction::RetRval], 1);
        assert!(matches!(
            verify_stack_depths(&s),
            Err(BytecodeError::UnbalancedExit { offset: 1, depth: 1 })
        ));
    }

    #[test]
    fn test_iter_close_needs_for_of_region() {
        let close = TryNote {
            kind: TryNoteKind::ForOfIterClose,
            depth: 0,
            start: 0,
            length: 1,
        };
        let code = vec![Instruction::Nop, Instruction::RetRval];
        let unpaired = Script::builder()
            .code(Vec::new(), code.clone())
            .try_notes(vec![close])
            .build();
        assert_eq!(
            verify_stack_depths(&unpaired).unwrap_err(),
            BytecodeError::UnpairedIterClose(0)
        );

        let for_of = TryNote {
            kind: TryNoteKind::ForOf,
            length: 2,
            ..close
        };
        let paired = Script::builder()
            .code(Vec::new(), code)
            .try_notes(vec![close, for_of])
            .build();
        assert!(verify_stack_depths(&paired).is_ok());
    }
}
