//! Generator and async lowering
//!
//! Every suspension point gets a fresh resume index whose offset is recorded
//! right after the suspending instruction. The runtime resumes there with
//! `[rval gen resumeKind]` on the stack; `CheckResumeKind` turns throw and
//! return resumptions back into exceptions and forced returns.

use heron_bytecode::{
    CheckIsObjectKind, GeneratorResumeKind, Instruction, LocalSlot, ResumeIndex, ThrowMsgKind,
};

use crate::ast::Expr;
use crate::emitter::Emitter;
use crate::error::{EmitError, EmitResult};
use crate::jump::JumpList;
use crate::unwind::{Completion, ExitKind};

impl Emitter {
    fn generator_slot(&self) -> EmitResult<LocalSlot> {
        self.unit
            .generator
            .ok_or_else(|| EmitError::unsupported("suspension outside a generator or async function"))
    }

    /// Create the generator (or async function) object and park it in a
    /// reserved frame slot. Runs in the prologue.
    pub(crate) fn emit_generator_object(&mut self) -> EmitResult<()> {
        let slot = self.scopes.reserve_slot()?;
        self.emit_all(&[
            Instruction::Generator,
            Instruction::SetLocal { slot },
            Instruction::Pop,
        ])?;
        self.unit.generator = Some(slot);
        Ok(())
    }

    /// First suspension of a generator, after the arguments are bound
    pub(crate) fn emit_initial_yield(&mut self) -> EmitResult<()> {
        let slot = self.generator_slot()?;
        let resume = self.alloc_resume();
        self.emit_all(&[
            Instruction::GetLocal { slot },
            Instruction::InitialYield { resume },
        ])?;
        self.bind_resume(resume)?;
        self.emit_all(&[Instruction::CheckResumeKind, Instruction::Pop])?;
        Ok(())
    }

    /// `[val] -> [rval]` through one suspension
    fn emit_suspend(&mut self, suspend: fn(ResumeIndex) -> Instruction) -> EmitResult<()> {
        let slot = self.generator_slot()?;
        let resume = self.alloc_resume();
        self.emit(Instruction::GetLocal { slot })?;
        self.emit(suspend(resume))?;
        self.bind_resume(resume)?;
        self.emit(Instruction::CheckResumeKind)?;
        Ok(())
    }

    /// `[val] -> [result]`
    pub(crate) fn emit_await(&mut self) -> EmitResult<()> {
        self.emit_suspend(|resume| Instruction::Await { resume })
    }

    /// `yield` / `yield expr`
    pub(crate) fn emit_yield(&mut self, argument: Option<&Expr>) -> EmitResult<()> {
        match argument {
            Some(argument) => self.emit_expr(argument)?,
            None => {
                self.emit(Instruction::Undefined)?;
            }
        }
        if self.unit.flags.is_async {
            self.emit_await()?;
        } else {
            self.emit(Instruction::IterResult { done: false })?;
        }
        self.emit_suspend(|resume| Instruction::Yield { resume })
    }

    /// `yield* expr`
    ///
    /// The loop keeps `[next iter received resumeKind]` on the stack and
    /// dispatches on the resume kind of the last suspension. Each of `next`,
    /// `throw` and `return` has its result checked for object-ness.
    pub(crate) fn emit_yield_star(&mut self, argument: &Expr) -> EmitResult<()> {
        let is_async = self.unit.flags.is_async;
        let base = self.code.depth();

        self.emit_expr(argument)?;
        self.emit(if is_async {
            Instruction::GetAsyncIterator
        } else {
            Instruction::GetIterator
        })?;
        let next = self.atom("next")?;
        self.emit_all(&[
            Instruction::Dup,
            Instruction::GetProp { name: next },
            Instruction::Swap,
            Instruction::Undefined,
            Instruction::ResumeKind {
                kind: GeneratorResumeKind::Next,
            },
        ])?;

        let head = self.loop_head()?;
        let to_throw = self.emit_resume_kind_test(GeneratorResumeKind::Throw)?;
        let to_return = self.emit_resume_kind_test(GeneratorResumeKind::Return)?;

        // next(received)
        self.emit_all(&[
            Instruction::Pop,
            Instruction::DupAt { n: 2 },
            Instruction::DupAt { n: 2 },
            Instruction::Pick { n: 2 },
            Instruction::Call { argc: 1 },
        ])?;
        if is_async {
            self.emit_await()?;
        }
        self.emit(Instruction::CheckIsObj {
            kind: CheckIsObjectKind::IteratorNext,
        })?;

        // [next iter result]
        let check_done = self.mark()?;
        let done_name = self.atom("done")?;
        self.emit_all(&[Instruction::Dup, Instruction::GetProp { name: done_name }])?;
        let finished = self.if_true()?;

        let yield_result = self.mark()?;
        if is_async {
            let value = self.atom("value")?;
            self.emit(Instruction::GetProp { name: value })?;
        }
        let slot = self.generator_slot()?;
        let resume = self.alloc_resume();
        self.emit_all(&[
            Instruction::GetLocal { slot },
            Instruction::Yield { resume },
        ])?;
        self.bind_resume(resume)?;
        self.emit_all(&[Instruction::Swap, Instruction::Pop])?;
        self.goto_back(head)?;

        // throw(received)
        self.patch_to_here(to_throw)?;
        let throw_name = self.atom("throw")?;
        self.emit_all(&[
            Instruction::Pop,
            Instruction::DupAt { n: 1 },
            Instruction::GetProp { name: throw_name },
            Instruction::IsNullOrUndefined,
        ])?;
        let no_throw = self.if_true()?;
        self.emit_all(&[
            Instruction::DupAt { n: 2 },
            Instruction::Pick { n: 2 },
            Instruction::Call { argc: 1 },
        ])?;
        if is_async {
            self.emit_await()?;
        }
        self.emit(Instruction::CheckIsObj {
            kind: CheckIsObjectKind::IteratorThrow,
        })?;
        self.goto_back(check_done)?;

        // The delegate has no throw(): close it, then report the protocol error
        self.patch_to_here(no_throw)?;
        self.emit(Instruction::PopN { count: 2 })?;
        self.emit_iterator_close(Completion::Normal, is_async)?;
        self.emit_all(&[
            Instruction::Pop,
            Instruction::ThrowMsg {
                kind: ThrowMsgKind::IteratorNoThrow,
            },
        ])?;

        // return(received)
        self.patch_to_here(to_return)?;
        let return_name = self.atom("return")?;
        self.emit_all(&[
            Instruction::Pop,
            Instruction::DupAt { n: 1 },
            Instruction::GetProp { name: return_name },
            Instruction::IsNullOrUndefined,
        ])?;
        let no_return = self.if_true()?;
        self.emit_all(&[
            Instruction::DupAt { n: 2 },
            Instruction::Pick { n: 2 },
            Instruction::Call { argc: 1 },
        ])?;
        if is_async {
            self.emit_await()?;
        }
        self.emit_all(&[
            Instruction::CheckIsObj {
                kind: CheckIsObjectKind::IteratorReturn,
            },
            Instruction::Dup,
            Instruction::GetProp { name: done_name },
        ])?;
        let not_done = self.if_false()?;
        let value = self.atom("value")?;
        self.emit(Instruction::GetProp { name: value })?;
        self.emit_forced_return()?;
        self.patch_to_here(not_done)?;
        self.goto_back(yield_result)?;

        // The delegate has no return(): finish with the received value
        self.patch_to_here(no_return)?;
        self.emit(Instruction::Pop)?;
        self.emit_forced_return()?;

        // [next iter result] -> [value]
        self.patch_to_here(finished)?;
        let value = self.atom("value")?;
        self.emit_all(&[
            Instruction::GetProp { name: value },
            Instruction::Unpick { n: 2 },
            Instruction::PopN { count: 2 },
        ])?;
        debug_assert_eq!(self.code.depth(), base + 1);
        Ok(())
    }

    /// `[resumeKind] -> [resumeKind]`, jumping away when it equals `kind`
    fn emit_resume_kind_test(
        &mut self,
        kind: GeneratorResumeKind,
    ) -> EmitResult<JumpList> {
        self.emit_all(&[
            Instruction::Dup,
            Instruction::ResumeKind { kind },
            Instruction::StrictEq,
        ])?;
        self.if_true()
    }

    /// `[.. value]`: return `value` from the generator, running every
    /// enclosing finally block first
    fn emit_forced_return(&mut self) -> EmitResult<()> {
        self.emit(Instruction::SetRval)?;
        let saved = self.unwind_to(None, ExitKind::Return)?;
        self.emit(Instruction::RetRval)?;
        self.code.set_depth(saved);
        Ok(())
    }
}
