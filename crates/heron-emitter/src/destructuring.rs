//! Destructuring lowering
//!
//! Patterns consume the value on top of the stack. Assignment targets that
//! are member expressions evaluate their reference (object, and key for
//! computed members) before the value is read; those values sit between the
//! pattern state and the value until the store, and every stack offset below
//! accounts for them.
//!
//! Array patterns keep `[next iter done]` on the stack. `done` is set before
//! each `next()` call and cleared once a value was read, so the cleanup
//! handler shared by all elements closes the iterator only when the failure
//! came from a default or a store, never from the iterator itself.

use heron_bytecode::{CheckIsObjectKind, Instruction, ThrowMsgKind, TryNoteKind};

use crate::ast::{
    ArrayPattern, Atom, Expr, ExprKind, MemberProp, ObjectPattern, Pattern, PropKey,
};
use crate::emitter::{Emitter, Flavor};
use crate::error::{EmitError, EmitResult};
use crate::jump::JumpList;
use crate::unwind::Completion;

/// An evaluated assignment reference
#[derive(Debug)]
pub(crate) enum Reference<'a> {
    /// Binding
    Name(&'a Atom),
    /// `obj.name`; the object is on the stack
    Prop(Atom),
    /// `obj[key]`; object and key are on the stack
    Elem,
    /// `f() = ...`: the call ran, the store throws
    Call,
    /// Nested pattern
    Pattern(&'a Pattern),
}

impl Reference<'_> {
    /// Stack values the reference occupies
    pub(crate) fn slots(&self) -> u16 {
        match self {
            Self::Prop(_) => 1,
            Self::Elem => 2,
            _ => 0,
        }
    }
}

impl Emitter {
    /// Evaluate the reference part of an assignment target
    pub(crate) fn emit_reference<'a>(&mut self, target: &'a Pattern) -> EmitResult<Reference<'a>> {
        match target {
            Pattern::Ident(ident) => Ok(Reference::Name(&ident.name)),
            Pattern::Array(_) | Pattern::Object(_) => Ok(Reference::Pattern(target)),
            Pattern::Member(expr) => self.emit_expr_reference(expr),
        }
    }

    /// Evaluate the reference of an expression used as an assignment target
    pub(crate) fn emit_expr_reference<'a>(&mut self, expr: &'a Expr) -> EmitResult<Reference<'a>> {
        match &expr.kind {
            ExprKind::Ident(ident) => Ok(Reference::Name(&ident.name)),
            ExprKind::Member { object, property } => {
                self.emit_expr(object)?;
                match property {
                    MemberProp::Named(name) => Ok(Reference::Prop(name.clone())),
                    MemberProp::Computed(key) => {
                        self.emit_expr(key)?;
                        Ok(Reference::Elem)
                    }
                }
            }
            ExprKind::Call { .. } => {
                self.emit_expr(expr)?;
                self.emit(Instruction::Pop)?;
                Ok(Reference::Call)
            }
            _ => Err(EmitError::InvalidAssignmentTarget { span: expr.span }),
        }
    }

    /// `[ref.. value] -> [value]`
    pub(crate) fn emit_store(&mut self, reference: Reference<'_>, flavor: Flavor) -> EmitResult<()> {
        match reference {
            Reference::Name(name) => self.emit_set_name(name, flavor),
            Reference::Prop(name) => {
                let name = self.atom(&name)?;
                self.emit(Instruction::SetProp { name })?;
                Ok(())
            }
            Reference::Elem => {
                self.emit(Instruction::SetElem)?;
                Ok(())
            }
            Reference::Call => {
                self.emit(Instruction::ThrowMsg {
                    kind: ThrowMsgKind::AssignToCall,
                })?;
                Ok(())
            }
            Reference::Pattern(pattern) => {
                self.emit(Instruction::Dup)?;
                self.emit_destructure(pattern, flavor)
            }
        }
    }

    /// `[value] -> []`: bind a pattern
    pub(crate) fn emit_bind_pattern(&mut self, pattern: &Pattern, flavor: Flavor) -> EmitResult<()> {
        match pattern {
            Pattern::Array(_) | Pattern::Object(_) => self.emit_destructure(pattern, flavor),
            _ => {
                let reference = self.emit_reference(pattern)?;
                if reference.slots() > 0 {
                    // The value was computed first; move it above the reference
                    self.emit(Instruction::Pick {
                        n: reference.slots() as u8,
                    })?;
                }
                self.emit_store(reference, flavor)?;
                self.emit(Instruction::Pop)?;
                Ok(())
            }
        }
    }

    /// `[value] -> []`: array or object pattern
    pub(crate) fn emit_destructure(&mut self, pattern: &Pattern, flavor: Flavor) -> EmitResult<()> {
        match pattern {
            Pattern::Array(array) => self.emit_array_pattern(array, flavor),
            Pattern::Object(object) => self.emit_object_pattern(object, flavor),
            _ => self.emit_bind_pattern(pattern, flavor),
        }
    }

    /// `[value] -> [value']`: replace `undefined` with the default
    pub(crate) fn emit_default(&mut self, default: &Expr, name: Option<&str>) -> EmitResult<()> {
        self.emit_all(&[Instruction::Dup, Instruction::Undefined, Instruction::StrictEq])?;
        let present = self.if_false()?;
        self.emit(Instruction::Pop)?;
        self.emit_named_expr(default, name)?;
        self.patch_to_here(present)
    }

    fn emit_array_pattern(&mut self, pattern: &ArrayPattern, flavor: Flavor) -> EmitResult<()> {
        let next = self.atom("next")?;
        self.emit_all(&[
            Instruction::GetIterator,
            Instruction::Dup,
            Instruction::GetProp { name: next },
            Instruction::Swap,
            Instruction::False,
        ])?;
        let state_depth = self.code.depth();
        let mut handlers = JumpList::new();

        for element in &pattern.elements {
            let start = self.emit(Instruction::TryDestructuring)?;
            match element {
                Some(element) => {
                    let reference = self.emit_reference(&element.target)?;
                    let k = reference.slots();
                    self.emit_iterator_step(k)?;
                    if let Some(default) = &element.default {
                        let name = match &element.target {
                            Pattern::Ident(ident) => Some(&*ident.name),
                            _ => None,
                        };
                        self.emit_default(default, name)?;
                    }
                    self.emit_store(reference, flavor)?;
                }
                None => self.emit_iterator_step(0)?,
            }
            self.emit(Instruction::Pop)?;
            self.close_destructuring_region(start, state_depth, &mut handlers)?;
        }

        if let Some(rest) = &pattern.rest {
            let start = self.emit(Instruction::TryDestructuring)?;
            let reference = self.emit_reference(rest)?;
            let k = reference.slots();
            self.emit_rest_elements(k)?;
            self.emit_store(reference, flavor)?;
            self.emit(Instruction::Pop)?;
            self.close_destructuring_region(start, state_depth, &mut handlers)?;
        }

        // [next iter done]
        let exhausted = self.if_true()?;
        self.emit_iterator_close(Completion::Normal, false)?;
        let end = self.goto()?;
        self.patch_to_here(exhausted)?;
        self.emit(Instruction::Pop)?;
        self.patch_to_here(end)?;
        self.emit(Instruction::Pop)?;

        if !handlers.is_empty() {
            let past = self.goto()?;
            self.patch_to_here(handlers)?;
            self.emit_destructuring_handler()?;
            self.patch_to_here(past)?;
        }
        Ok(())
    }

    /// `[next iter done ref..] -> [next iter done' ref.. value]`
    fn emit_iterator_step(&mut self, k: u16) -> EmitResult<()> {
        self.emit(Instruction::DupAt { n: k })?;
        let already_done = self.if_true()?;

        self.emit_set_done(k, true)?;
        self.emit_all(&[
            Instruction::DupAt { n: k + 2 },
            Instruction::DupAt { n: k + 2 },
            Instruction::Call { argc: 0 },
            Instruction::CheckIsObj {
                kind: CheckIsObjectKind::IteratorNext,
            },
            Instruction::Dup,
        ])?;
        let done = self.atom("done")?;
        self.emit(Instruction::GetProp { name: done })?;
        let exhausted = self.if_true()?;
        let value = self.atom("value")?;
        self.emit(Instruction::GetProp { name: value })?;
        self.emit_set_done(k + 1, false)?;
        let join = self.goto()?;

        self.patch_to_here(exhausted)?;
        self.emit(Instruction::Pop)?;
        self.patch_to_here(already_done)?;
        self.emit(Instruction::Undefined)?;
        self.patch_to_here(join)
    }

    /// Overwrite the `done` flag sitting `n` values below the top
    fn emit_set_done(&mut self, n: u16, done: bool) -> EmitResult<()> {
        let flag = if done {
            Instruction::True
        } else {
            Instruction::False
        };
        if n == 0 {
            self.emit_all(&[Instruction::Pop, flag])?;
        } else {
            let n = n as u8;
            self.emit_all(&[
                Instruction::Pick { n },
                Instruction::Pop,
                flag,
                Instruction::Unpick { n },
            ])?;
        }
        Ok(())
    }

    /// `[next iter done ref..] -> [next iter true ref.. array]`
    fn emit_rest_elements(&mut self, k: u16) -> EmitResult<()> {
        self.emit_all(&[Instruction::NewArray { length: 0 }, Instruction::Int32 { value: 0 }])?;
        self.emit(Instruction::DupAt { n: k + 2 })?;
        let already_done = self.if_true()?;
        self.emit_set_done(k + 2, true)?;

        let head = self.loop_head()?;
        self.emit_all(&[
            Instruction::DupAt { n: k + 4 },
            Instruction::DupAt { n: k + 4 },
            Instruction::Call { argc: 0 },
            Instruction::CheckIsObj {
                kind: CheckIsObjectKind::IteratorNext,
            },
            Instruction::Dup,
        ])?;
        let done = self.atom("done")?;
        self.emit(Instruction::GetProp { name: done })?;
        let exhausted = self.if_true()?;
        let value = self.atom("value")?;
        self.emit_all(&[Instruction::GetProp { name: value }, Instruction::InitElemInc])?;
        self.goto_back(head)?;

        self.patch_to_here(exhausted)?;
        self.emit(Instruction::Pop)?;
        self.patch_to_here(already_done)?;
        self.emit(Instruction::Pop)?;
        Ok(())
    }

    /// End a per-element cleanup region and route its handler to the shared one
    fn close_destructuring_region(
        &mut self,
        start: u32,
        depth: u32,
        handlers: &mut JumpList,
    ) -> EmitResult<()> {
        debug_assert_eq!(self.code.depth(), depth);
        let over = self.goto()?;
        let end = self.code.offset();
        self.add_try_note(TryNoteKind::Destructuring, depth, start, end);
        self.code.set_depth(depth);
        self.mark()?;
        handlers.append(self.goto()?);
        self.patch_to_here(over)
    }

    /// `[next iter done]` with an exception pending: close unless done, rethrow
    fn emit_destructuring_handler(&mut self) -> EmitResult<()> {
        self.emit_all(&[Instruction::Exception, Instruction::Swap])?;
        let rethrow = self.if_true()?;
        self.emit(Instruction::Swap)?;
        self.emit_iterator_close(Completion::Throw, false)?;
        self.emit(Instruction::Throw)?;
        self.patch_to_here(rethrow)?;
        self.emit(Instruction::Throw)?;
        Ok(())
    }

    fn emit_object_pattern(&mut self, pattern: &ObjectPattern, flavor: Flavor) -> EmitResult<()> {
        self.emit(Instruction::CheckObjCoercible)?;
        // Excluded keys for the rest property sit right above the source
        let r = u16::from(pattern.rest.is_some());
        if r == 1 {
            self.emit(Instruction::NewObject)?;
        }

        for property in &pattern.properties {
            let name = match (&property.key, &property.target) {
                (_, Pattern::Ident(ident)) => Some(&*ident.name),
                _ => None,
            };
            match &property.key {
                PropKey::Named(key) => {
                    let key = self.atom(key)?;
                    if r == 1 {
                        self.emit_all(&[
                            Instruction::Dup,
                            Instruction::Undefined,
                            Instruction::InitProp { name: key },
                            Instruction::Pop,
                        ])?;
                    }
                    let reference = self.emit_reference(&property.target)?;
                    let k = reference.slots();
                    self.emit_all(&[
                        Instruction::DupAt { n: k + r },
                        Instruction::GetProp { name: key },
                    ])?;
                    if let Some(default) = &property.default {
                        self.emit_default(default, name)?;
                    }
                    self.emit_store(reference, flavor)?;
                    self.emit(Instruction::Pop)?;
                }
                PropKey::Computed(key) => {
                    self.emit_expr(key)?;
                    self.emit(Instruction::ToPropertyKey)?;
                    if r == 1 {
                        self.emit_all(&[
                            Instruction::Dup,
                            Instruction::DupAt { n: 2 },
                            Instruction::Swap,
                            Instruction::Undefined,
                            Instruction::InitElem,
                            Instruction::Pop,
                        ])?;
                    }
                    let reference = self.emit_reference(&property.target)?;
                    let k = reference.slots();
                    self.emit_all(&[
                        Instruction::DupAt { n: k + 1 + r },
                        Instruction::DupAt { n: k + 1 },
                        Instruction::GetElem,
                    ])?;
                    if let Some(default) = &property.default {
                        self.emit_default(default, name)?;
                    }
                    self.emit_store(reference, flavor)?;
                    self.emit_all(&[Instruction::Pop, Instruction::Pop])?;
                }
            }
        }

        if let Some(rest) = &pattern.rest {
            // [source excluded ref..] -> [source excluded ref.. copy]
            let reference = self.emit_reference(rest)?;
            let k = reference.slots();
            self.emit_all(&[
                Instruction::NewObject,
                Instruction::DupAt { n: k + 2 },
                Instruction::DupAt { n: k + 2 },
                Instruction::CopyDataPropertiesExcluding,
            ])?;
            self.emit_store(reference, flavor)?;
            self.emit(Instruction::Pop)?;
        }

        self.pop_to(self.code.depth() - 1 - u32::from(r))
    }
}
