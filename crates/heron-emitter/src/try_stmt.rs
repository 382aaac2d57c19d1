//! Try statement lowering
//!
//! Layout of `try {A} catch (e) {B} finally {C}`:
//!
//! ```text
//!         Try
//!         A
//!         Goto normal
//! catch:  Exception; bind e; B          <- Catch note [Try, catch)
//! normal: False; ResumeIndex r; Gosub finally
//! r:      Goto after
//! finally:Finally; C; Retsub            <- Finally note [Try, finally)
//! after:
//! ```
//!
//! The finally block always runs with `[throwing value]` on the stack: the
//! runtime pushes `[true exception]` when unwinding into it, every `Gosub`
//! pushes `[false resumeIndex]`. `Retsub` rethrows or resumes accordingly.

use std::mem;

use heron_bytecode::{Instruction, ScopeKind, TryNoteKind};

use crate::ast::{Block, CatchClause};
use crate::control::{ControlId, ControlKind};
use crate::emitter::{Emitter, Flavor, Labels};
use crate::error::EmitResult;
use crate::jump::JumpList;

/// Shape of a try statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TryKind {
    TryCatch,
    TryFinally,
    TryCatchFinally,
}

impl TryKind {
    fn has_finally(self) -> bool {
        matches!(self, Self::TryFinally | Self::TryCatchFinally)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TryState {
    Start,
    Try,
    Catch,
    Finally,
    End,
}

/// Drives the emission of one try statement
///
/// Call order: [`emit_try`](Self::emit_try), then the protected block, then
/// optionally [`emit_catch`](Self::emit_catch) and the handler, then
/// optionally [`emit_finally`](Self::emit_finally) and the finally block,
/// then [`emit_end`](Self::emit_end).
#[derive(Debug)]
pub(crate) struct TryEmitter {
    kind: TryKind,
    state: TryState,
    depth: u32,
    start: u32,
    control: Option<ControlId>,
    normal: JumpList,
    after: JumpList,
}

impl TryEmitter {
    pub(crate) fn new(kind: TryKind) -> Self {
        Self {
            kind,
            state: TryState::Start,
            depth: 0,
            start: 0,
            control: None,
            normal: JumpList::new(),
            after: JumpList::new(),
        }
    }

    /// Open the protected region
    pub(crate) fn emit_try(&mut self, em: &mut Emitter) -> EmitResult<()> {
        debug_assert_eq!(self.state, TryState::Start);
        self.depth = em.code.depth();
        self.start = em.emit(Instruction::Try)?;
        if self.kind.has_finally() {
            self.control = Some(em.controls.push(
                ControlKind::TryFinally,
                self.depth,
                em.scopes.depth(),
                Labels::new(),
            ));
        }
        self.state = TryState::Try;
        Ok(())
    }

    /// Jump out of the block that just ended, if it falls through
    fn leave_block(&mut self, em: &mut Emitter) -> EmitResult<()> {
        if !em.code.is_reachable() {
            return Ok(());
        }
        let jump = em.goto()?;
        if self.kind.has_finally() {
            self.normal.append(jump);
        } else {
            self.after.append(jump);
        }
        Ok(())
    }

    /// Start the catch handler; the exception is pushed
    pub(crate) fn emit_catch(&mut self, em: &mut Emitter) -> EmitResult<()> {
        debug_assert_eq!(self.state, TryState::Try);
        self.leave_block(em)?;

        em.code.set_depth(self.depth);
        let handler = em.mark()?;
        em.add_try_note(TryNoteKind::Catch, self.depth, self.start, handler.offset);
        em.emit(Instruction::Exception)?;
        self.state = TryState::Catch;
        Ok(())
    }

    /// Route normal completion through the finally block and start it
    pub(crate) fn emit_finally(&mut self, em: &mut Emitter) -> EmitResult<()> {
        debug_assert!(matches!(self.state, TryState::Try | TryState::Catch));
        let Some(id) = self.control.take() else {
            debug_assert!(false, "finally without a TryFinally context");
            return Ok(());
        };

        let normal = mem::take(&mut self.normal);
        if em.code.is_reachable() || !normal.is_empty() {
            em.patch_to_here(normal)?;
            em.emit_gosub(id)?;
            self.after.append(em.goto()?);
        }

        let control = em.controls.pop(id);
        em.code.set_depth(self.depth + 2);
        let target = em.mark()?;
        em.add_try_note(TryNoteKind::Finally, self.depth, self.start, target.offset);
        em.patch(control.gosubs, target);
        em.emit(Instruction::Finally)?;
        self.state = TryState::Finally;
        Ok(())
    }

    /// Close the statement
    pub(crate) fn emit_end(&mut self, em: &mut Emitter) -> EmitResult<()> {
        match self.state {
            TryState::Catch => {}
            TryState::Finally => {
                if em.code.is_reachable() {
                    em.emit(Instruction::Retsub)?;
                }
            }
            state => debug_assert!(false, "try statement ended in state {state:?}"),
        }
        // An abrupt finally leaves its own depth behind; code after the
        // statement starts where the try began
        if !em.code.is_reachable() {
            em.code.set_depth(self.depth);
        }
        let after = mem::take(&mut self.after);
        em.patch_to_here(after)?;
        self.state = TryState::End;
        Ok(())
    }
}

impl Emitter {
    /// Compile a try statement
    pub(crate) fn emit_try_stmt(
        &mut self,
        block: &Block,
        handler: Option<&CatchClause>,
        finalizer: Option<&Block>,
    ) -> EmitResult<()> {
        let kind = match (handler.is_some(), finalizer.is_some()) {
            (true, false) => TryKind::TryCatch,
            (false, true) => TryKind::TryFinally,
            (true, true) => TryKind::TryCatchFinally,
            (false, false) => return self.emit_block(block),
        };

        let mut try_emitter = TryEmitter::new(kind);
        try_emitter.emit_try(self)?;
        self.emit_block(block)?;

        if let Some(handler) = handler {
            try_emitter.emit_catch(self)?;
            self.emit_catch_clause(handler)?;
        }

        if let Some(finalizer) = finalizer {
            try_emitter.emit_finally(self)?;
            self.emit_block(finalizer)?;
        }
        try_emitter.emit_end(self)
    }

    /// `[exception] -> []`, then the handler body
    fn emit_catch_clause(&mut self, clause: &CatchClause) -> EmitResult<()> {
        let scope = self.enter_optional_scope(ScopeKind::Catch, Some(&clause.scope))?;
        match &clause.param {
            Some(param) => self.emit_bind_pattern(param, Flavor::Initialize)?,
            None => {
                self.emit(Instruction::Pop)?;
            }
        }
        self.emit_block(&clause.body)?;
        self.leave_optional_scope(scope)
    }
}
