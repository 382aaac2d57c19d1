//! Non-local exits
//!
//! `break`, `continue` and `return` all go through [`Emitter::unwind_to`],
//! which walks the control stack from the innermost context outward and emits
//! the cleanup each crossed context needs: scope exits, iterator close for
//! for-of, enumerator release for for-in, and a `Gosub` into every crossed
//! finally block. Exceptions take the same paths at runtime through the try
//! notes instead.

use smallvec::SmallVec;
use tracing::trace;

use heron_bytecode::{CheckIsObjectKind, Instruction, JumpOffset, TryNoteKind};

use crate::control::{ControlId, ControlKind};
use crate::emitter::Emitter;
use crate::error::EmitResult;

/// Why control leaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExitKind {
    /// Leaves the target
    Break,
    /// Stays in the target loop
    Continue,
    /// Leaves the function
    Return,
}

/// Completion type of an iterator close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Completion {
    /// break, return, exhausted destructuring; errors from `return()` propagate
    Normal,
    /// An exception is pending; errors from `return()` are swallowed
    Throw,
}

impl Emitter {
    /// Emit the cleanup for leaving every context inside `target` (the whole
    /// function for `None`). Returns the depth before the cleanup; callers
    /// emit their jump and restore it.
    pub(crate) fn unwind_to(&mut self, target: Option<ControlId>, exit: ExitKind) -> EmitResult<u32> {
        let saved = self.code.depth();
        trace!(?target, ?exit, depth = saved, "non-local exit");

        let crossed: SmallVec<[ControlId; 8]> = self.controls.crossed(target).collect();
        let mut scope_level = self.scopes.depth();
        for id in crossed {
            let control = self.controls.get(id);
            let (kind, entry, scope_depth) = (control.kind, control.entry_depth, control.scope_depth);

            self.emit_scope_exits(scope_depth, scope_level)?;
            scope_level = scope_depth;
            self.pop_to(entry)?;

            match kind {
                ControlKind::ForOf { is_async } => self.emit_for_of_exit(is_async)?,
                ControlKind::ForIn => {
                    self.emit(Instruction::EndIter)?;
                }
                ControlKind::TryFinally => self.emit_gosub(id)?,
                _ => {}
            }
        }

        match target {
            Some(id) => {
                let control = self.controls.get(id);
                let (kind, entry, scope_depth) = (control.kind, control.entry_depth, control.scope_depth);
                self.emit_scope_exits(scope_depth, scope_level)?;
                self.pop_to(entry)?;
                if exit == ExitKind::Break {
                    match kind {
                        ControlKind::ForOf { is_async } => self.emit_for_of_exit(is_async)?,
                        ControlKind::ForIn => {
                            self.emit(Instruction::EndIter)?;
                        }
                        _ => {}
                    }
                    debug_assert_eq!(self.code.depth(), self.controls.get(id).break_depth());
                }
            }
            None => self.pop_to(0)?,
        }
        Ok(saved)
    }

    /// Whether `return` can leave with a plain `Return` (nothing to clean up)
    pub(crate) fn can_return_directly(&self) -> bool {
        self.code.depth() == 0
            && self.controls.crossed(None).all(|id| {
                let kind = self.controls.get(id).kind;
                kind.own_slots() == 0 && kind != ControlKind::TryFinally
            })
    }

    /// Run a finally block through `Gosub` and come back here
    pub(crate) fn emit_gosub(&mut self, id: ControlId) -> EmitResult<()> {
        let resume = self.alloc_resume();
        self.emit(Instruction::False)?;
        self.emit(Instruction::ResumeIndex { index: resume })?;
        let jump = self.open_jump(Instruction::Gosub {
            offset: JumpOffset::UNPATCHED,
        })?;
        self.controls.get_mut(id).gosubs.append(jump);
        self.bind_resume(resume)
    }

    /// `[next iter] -> []`: close a for-of iterator on break or return
    fn emit_for_of_exit(&mut self, is_async: bool) -> EmitResult<()> {
        let depth = self.code.depth();
        let start = self.code.offset();
        self.emit_iterator_close(Completion::Normal, is_async)?;
        let end = self.code.offset();
        self.add_try_note(TryNoteKind::ForOfIterClose, depth, start, end);
        self.emit(Instruction::Pop)?;
        Ok(())
    }

    /// `[iter] -> []`: call `iter.return()` if the iterator has one
    pub(crate) fn emit_iterator_close(&mut self, completion: Completion, is_async: bool) -> EmitResult<()> {
        let depth = self.code.depth();
        debug_assert!(depth >= 1, "iterator close needs the iterator on the stack");
        let try_start = match completion {
            Completion::Throw => Some(self.emit(Instruction::Try)?),
            Completion::Normal => None,
        };

        let name = self.atom("return")?;
        self.emit_all(&[
            Instruction::Dup,
            Instruction::GetProp { name },
            Instruction::IsNullOrUndefined,
        ])?;
        let missing = self.if_true()?;

        // [iter return] -> [result]
        self.emit_all(&[Instruction::Swap, Instruction::Call { argc: 0 }])?;
        if is_async {
            self.emit_await()?;
        }
        if completion == Completion::Normal {
            self.emit(Instruction::CheckIsObj {
                kind: CheckIsObjectKind::IteratorReturn,
            })?;
        }
        self.emit(Instruction::Pop)?;
        let done = self.goto()?;

        self.patch_to_here(missing)?;
        self.emit(Instruction::PopN { count: 2 })?;
        self.patch_to_here(done)?;

        if let Some(start) = try_start {
            // Exceptions from the close are dropped; the pending one wins
            let over = self.goto()?;
            let handler = self.code.offset();
            self.add_try_note(TryNoteKind::Catch, depth - 1, start, handler);
            self.code.set_depth(depth - 1);
            self.mark()?;
            self.emit_all(&[Instruction::Exception, Instruction::Pop])?;
            self.patch_to_here(over)?;
        }
        debug_assert_eq!(self.code.depth(), depth - 1);
        Ok(())
    }
}
