//! Statement lowering

use smallvec::smallvec;

use heron_bytecode::{
    CheckIsObjectKind, Instruction, JumpOffset, ScopeKind, ScriptKind, SrcNoteKind, TryNoteKind,
};

use crate::ast::{
    Atom, Block, DeclKind, Expr, ExprKind, ForHead, ForInit, Pattern, ScopeData, Span, Stmt,
    StmtKind, SwitchCase, VarDecl,
};
use crate::control::{ContinueLookup, ControlKind};
use crate::emitter::{Emitter, Flavor, Labels};
use crate::error::{EmitError, EmitResult, Warning, WarningKind};
use crate::jump::{JumpList, JumpTarget};
use crate::unwind::ExitKind;

impl Emitter {
    /// Compile a statement list
    pub(crate) fn emit_statements(&mut self, body: &[Stmt]) -> EmitResult<()> {
        for stmt in body {
            self.emit_stmt(stmt)?;
        }
        Ok(())
    }

    /// Compile a statement
    pub(crate) fn emit_stmt(&mut self, stmt: &Stmt) -> EmitResult<()> {
        self.emit_labeled_stmt(stmt, Labels::new())
    }

    /// Compile a statement carrying the labels written directly in front of it
    fn emit_labeled_stmt(&mut self, stmt: &Stmt, labels: Labels) -> EmitResult<()> {
        self.position(stmt.span);
        match &stmt.kind {
            StmtKind::Block(_)
            | StmtKind::Empty
            | StmtKind::Directive(_)
            | StmtKind::Labeled { .. }
            | StmtKind::FunctionDecl(_) => {}
            _ => {
                self.code.add_note(SrcNoteKind::Breakpoint);
            }
        }

        match &stmt.kind {
            StmtKind::Expr(expr) => self.emit_expr_stmt(expr, stmt.span),
            StmtKind::Directive(_) | StmtKind::Empty => Ok(()),
            StmtKind::VarDecl(decl) => self.emit_var_decl(decl),
            StmtKind::FunctionDecl(func) => self.emit_function_decl(func),
            StmtKind::ClassDecl(class) => self.emit_class_decl(class),
            StmtKind::Block(block) => self.emit_block(block),
            StmtKind::If {
                test,
                consequent,
                alternate,
            } => self.emit_if(test, consequent, alternate.as_deref()),
            StmtKind::While { test, body } => self.emit_while(test, body, labels),
            StmtKind::DoWhile { body, test } => self.emit_do_while(body, test, labels),
            StmtKind::For {
                head_scope,
                init,
                test,
                update,
                body,
            } => self.emit_for(
                head_scope.as_ref(),
                init.as_ref(),
                test.as_ref(),
                update.as_ref(),
                body,
                labels,
            ),
            StmtKind::ForIn {
                head_scope,
                head,
                object,
                body,
            } => self.emit_for_in(head_scope.as_ref(), head, object, body, labels),
            StmtKind::ForOf {
                head_scope,
                head,
                iterable,
                body,
                is_await,
            } => self.emit_for_of(head_scope.as_ref(), head, iterable, body, *is_await, labels),
            StmtKind::Break(label) => self.emit_break(label.as_ref(), stmt.span),
            StmtKind::Continue(label) => self.emit_continue(label.as_ref(), stmt.span),
            StmtKind::Return(argument) => self.emit_return(argument.as_ref()),
            StmtKind::Throw(argument) => {
                self.emit_expr(argument)?;
                self.emit(Instruction::Throw)?;
                Ok(())
            }
            StmtKind::Try {
                block,
                handler,
                finalizer,
            } => self.emit_try_stmt(block, handler.as_ref(), finalizer.as_ref()),
            StmtKind::Switch {
                discriminant,
                scope,
                cases,
            } => self.emit_switch(discriminant, scope.as_ref(), cases),
            StmtKind::Labeled { label, body } => self.emit_labeled(label, body, labels),
            StmtKind::With { object, body } => self.emit_with(object, body),
            StmtKind::Debugger => {
                self.emit(Instruction::Debugger)?;
                Ok(())
            }
        }
    }

    // ==================== Simple statements ====================

    /// Compile an expression statement
    fn emit_expr_stmt(&mut self, expr: &Expr, span: Span) -> EmitResult<()> {
        if self.unit.kind == ScriptKind::Eval {
            // Eval code returns the value of its last expression statement
            self.emit_expr(expr)?;
            self.emit(Instruction::SetRval)?;
            return Ok(());
        }

        if expr.is_side_effect_free() {
            self.warnings
                .push(Warning::new(WarningKind::UselessExpression, span));
        }
        match &expr.kind {
            ExprKind::Call { callee, args } => self.emit_call(callee, args, true)?,
            _ => self.emit_expr(expr)?,
        }
        self.emit(Instruction::Pop)?;
        Ok(())
    }

    /// Compile a `var`/`let`/`const` declaration
    pub(crate) fn emit_var_decl(&mut self, decl: &VarDecl) -> EmitResult<()> {
        let flavor = match decl.kind {
            DeclKind::Var => Flavor::Declare,
            DeclKind::Let | DeclKind::Const => Flavor::Initialize,
        };
        for declarator in &decl.declarators {
            match (&declarator.init, &declarator.target) {
                (Some(init), target) => {
                    let name = match target {
                        Pattern::Ident(ident) => Some(&*ident.name),
                        _ => None,
                    };
                    self.emit_named_expr(init, name)?;
                    self.emit_bind_pattern(target, flavor)?;
                }
                // `let x;` leaves the dead zone with undefined
                (None, Pattern::Ident(ident)) if decl.kind != DeclKind::Var => {
                    self.emit(Instruction::Undefined)?;
                    self.emit_set_name(&ident.name, Flavor::Initialize)?;
                    self.emit(Instruction::Pop)?;
                }
                (None, _) => {}
            }
        }
        Ok(())
    }

    /// Compile a block with its lexical scope
    pub(crate) fn emit_block(&mut self, block: &Block) -> EmitResult<()> {
        let scope = self.enter_optional_scope(ScopeKind::Block, block.scope.as_ref())?;
        self.hoist_functions(&block.body)?;
        self.emit_statements(&block.body)?;
        self.leave_optional_scope(scope)
    }

    /// Compile `if`
    fn emit_if(&mut self, test: &Expr, consequent: &Stmt, alternate: Option<&Stmt>) -> EmitResult<()> {
        // Compile condition
        self.emit_expr(test)?;
        let else_jump = self.if_false()?;
        self.emit_stmt(consequent)?;

        match alternate {
            Some(alternate) => {
                let end = if self.code.is_reachable() {
                    self.goto()?
                } else {
                    JumpList::new()
                };
                self.patch_to_here(else_jump)?;
                self.emit_stmt(alternate)?;
                self.patch_to_here(end)
            }
            None => self.patch_to_here(else_jump),
        }
    }

    /// Compile `with`
    fn emit_with(&mut self, object: &Expr, body: &Stmt) -> EmitResult<()> {
        self.emit_expr(object)?;
        let offset = self.main_offset();
        let scope = self.scopes.enter(ScopeKind::With, &[], &[], offset)?;
        self.emit(Instruction::EnterWith {
            scope: scope.index(),
        })?;
        self.emit_stmt(body)?;
        self.leave_scope(scope)
    }

    /// Compile a labeled statement
    fn emit_labeled(&mut self, label: &Atom, body: &Stmt, mut labels: Labels) -> EmitResult<()> {
        labels.push(label.clone());
        let id = self.controls.push(
            ControlKind::Label,
            self.code.depth(),
            self.scopes.depth(),
            smallvec![label.clone()],
        );
        self.emit_labeled_stmt(body, labels)?;
        let control = self.controls.pop(id);
        self.patch_to_here(control.breaks)
    }

    // ==================== Loops ====================

    /// Emit the closing backward jump and fill in the loop's source note
    ///
    /// A body that cannot fall through gets no back jump.
    fn close_loop(&mut self, note: Option<usize>, head: JumpTarget) -> EmitResult<()> {
        if !self.code.is_reachable() {
            return Ok(());
        }
        let back = self.code.offset();
        self.goto_back(head)?;
        self.code.update_note(
            note,
            SrcNoteKind::Loop {
                back_jump: back - head.offset,
            },
        );
        Ok(())
    }

    /// Compile `while`
    fn emit_while(&mut self, test: &Expr, body: &Stmt, labels: Labels) -> EmitResult<()> {
        let id = self.controls.push(
            ControlKind::Loop,
            self.code.depth(),
            self.scopes.depth(),
            labels,
        );
        let note = self.code.add_note(SrcNoteKind::Loop { back_jump: 0 });
        let head = self.loop_head()?;
        self.controls.get_mut(id).continue_target = Some(head);

        // Compile condition
        self.emit_expr(test)?;
        let mut exit = self.if_false()?;

        // Compile body
        self.emit_stmt(body)?;
        self.close_loop(note, head)?;
        self.add_try_note(TryNoteKind::Loop, head.depth, head.offset, self.code.offset());

        let control = self.controls.pop(id);
        exit.append(control.breaks);
        self.patch_to_here(exit)
    }

    /// Compile `do ... while`
    fn emit_do_while(&mut self, body: &Stmt, test: &Expr, labels: Labels) -> EmitResult<()> {
        let id = self.controls.push(
            ControlKind::Loop,
            self.code.depth(),
            self.scopes.depth(),
            labels,
        );
        let note = self.code.add_note(SrcNoteKind::Loop { back_jump: 0 });
        let head = self.loop_head()?;

        // Compile body
        self.emit_stmt(body)?;
        let continues = std::mem::take(&mut self.controls.get_mut(id).continues);
        self.patch_to_here(continues)?;

        // Compile condition
        self.emit_expr(test)?;
        if !self.code.is_reachable() {
            self.add_try_note(TryNoteKind::Loop, head.depth, head.offset, self.code.offset());
            let control = self.controls.pop(id);
            return self.patch_to_here(control.breaks);
        }
        let back = self.code.offset();
        self.code.emit_backward_jump(
            Instruction::IfNe {
                offset: JumpOffset::UNPATCHED,
            },
            head,
        )?;
        self.code.update_note(
            note,
            SrcNoteKind::Loop {
                back_jump: back - head.offset,
            },
        );
        self.add_try_note(TryNoteKind::Loop, head.depth, head.offset, self.code.offset());

        let control = self.controls.pop(id);
        self.patch_to_here(control.breaks)
    }

    /// Compile C-style `for`
    fn emit_for(
        &mut self,
        head_scope: Option<&ScopeData>,
        init: Option<&ForInit>,
        test: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
        labels: Labels,
    ) -> EmitResult<()> {
        let scope = self.enter_optional_scope(ScopeKind::Block, head_scope)?;
        match init {
            Some(ForInit::VarDecl(decl)) => self.emit_var_decl(decl)?,
            Some(ForInit::Expr(expr)) => {
                self.emit_expr(expr)?;
                self.emit(Instruction::Pop)?;
            }
            None => {}
        }

        let id = self.controls.push(
            ControlKind::Loop,
            self.code.depth(),
            self.scopes.depth(),
            labels,
        );
        let note = self.code.add_note(SrcNoteKind::Loop { back_jump: 0 });
        let head = self.loop_head()?;

        let mut exit = match test {
            Some(test) => {
                self.emit_expr(test)?;
                self.if_false()?
            }
            None => JumpList::new(),
        };

        // Compile body
        self.emit_stmt(body)?;
        let continues = std::mem::take(&mut self.controls.get_mut(id).continues);
        self.patch_to_here(continues)?;

        // Closures in the body captured this iteration's bindings
        if let Some(scope) = &scope
            && self.scopes.record(scope.index()).has_environment
        {
            self.emit(Instruction::FreshenLexicalEnv)?;
        }
        if let Some(update) = update {
            self.emit_expr(update)?;
            self.emit(Instruction::Pop)?;
        }
        self.close_loop(note, head)?;
        self.add_try_note(TryNoteKind::Loop, head.depth, head.offset, self.code.offset());

        let control = self.controls.pop(id);
        exit.append(control.breaks);
        self.patch_to_here(exit)?;
        self.leave_optional_scope(scope)
    }

    /// Bind the loop variable of `for-in`/`for-of`, consuming the value
    fn emit_for_head(&mut self, head: &ForHead, fresh_environment: bool) -> EmitResult<()> {
        if fresh_environment {
            self.emit(Instruction::FreshenLexicalEnv)?;
        }
        match head {
            ForHead::Decl { kind, target } => {
                let flavor = match kind {
                    DeclKind::Var => Flavor::Declare,
                    DeclKind::Let | DeclKind::Const => Flavor::Initialize,
                };
                self.emit_bind_pattern(target, flavor)
            }
            ForHead::Target(target) => self.emit_bind_pattern(target, Flavor::Assign),
        }
    }

    /// Compile `for (x in obj)`
    fn emit_for_in(
        &mut self,
        head_scope: Option<&ScopeData>,
        head: &ForHead,
        object: &Expr,
        body: &Stmt,
        labels: Labels,
    ) -> EmitResult<()> {
        let scope = self.enter_optional_scope(ScopeKind::Block, head_scope)?;
        let fresh = scope
            .as_ref()
            .is_some_and(|s| self.scopes.record(s.index()).has_environment);

        self.emit_expr(object)?;
        self.emit(Instruction::Iter)?;
        let id = self.controls.push(
            ControlKind::ForIn,
            self.code.depth(),
            self.scopes.depth(),
            labels,
        );
        let note = self.code.add_note(SrcNoteKind::Loop { back_jump: 0 });
        let head_target = self.loop_head()?;
        self.controls.get_mut(id).continue_target = Some(head_target);

        // [iter] -> [iter key]
        self.emit_all(&[Instruction::MoreIter, Instruction::IsNoIter])?;
        let exit = self.if_true()?;
        self.emit_for_head(head, fresh)?;

        // Compile body
        self.emit_stmt(body)?;
        self.close_loop(note, head_target)?;
        self.add_try_note(
            TryNoteKind::ForIn,
            head_target.depth,
            head_target.offset,
            self.code.offset(),
        );

        // [iter no-more-keys marker]
        self.patch_to_here(exit)?;
        self.emit_all(&[Instruction::Pop, Instruction::EndIter])?;

        let control = self.controls.pop(id);
        self.patch_to_here(control.breaks)?;
        self.leave_optional_scope(scope)
    }

    /// Compile `for (x of iterable)` and `for await`
    fn emit_for_of(
        &mut self,
        head_scope: Option<&ScopeData>,
        head: &ForHead,
        iterable: &Expr,
        body: &Stmt,
        is_await: bool,
        labels: Labels,
    ) -> EmitResult<()> {
        let scope = self.enter_optional_scope(ScopeKind::Block, head_scope)?;
        let fresh = scope
            .as_ref()
            .is_some_and(|s| self.scopes.record(s.index()).has_environment);

        self.emit_expr(iterable)?;
        self.emit_for_of_loop(is_await, labels, |this| {
            this.emit_for_head(head, fresh)?;
            this.emit_stmt(body)
        })?;
        self.leave_optional_scope(scope)
    }

    /// Iterate the value on top of the stack. `body` starts with the current
    /// value pushed and must consume it.
    ///
    /// `[iterable] -> []`
    pub(crate) fn emit_for_of_loop(
        &mut self,
        is_async: bool,
        labels: Labels,
        body: impl FnOnce(&mut Self) -> EmitResult<()>,
    ) -> EmitResult<()> {
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
        ])?;

        let id = self.controls.push(
            ControlKind::ForOf { is_async },
            self.code.depth(),
            self.scopes.depth(),
            labels,
        );
        let note = self.code.add_note(SrcNoteKind::Loop { back_jump: 0 });
        let head = self.loop_head()?;
        self.controls.get_mut(id).continue_target = Some(head);

        // [next iter] -> [next iter result]
        self.emit_all(&[Instruction::Dup2, Instruction::Call { argc: 0 }])?;
        if is_async {
            self.emit_await()?;
        }
        let done = self.atom("done")?;
        self.emit_all(&[
            Instruction::CheckIsObj {
                kind: CheckIsObjectKind::IteratorNext,
            },
            Instruction::Dup,
            Instruction::GetProp { name: done },
        ])?;
        let exit = self.if_true()?;
        let value = self.atom("value")?;
        self.emit(Instruction::GetProp { name: value })?;

        let body_start = self.code.offset();
        body(self)?;
        self.close_loop(note, head)?;
        self.add_try_note(TryNoteKind::ForOf, head.depth, body_start, self.code.offset());

        // [next iter result]
        self.patch_to_here(exit)?;
        self.emit(Instruction::PopN { count: 3 })?;

        let control = self.controls.pop(id);
        self.patch_to_here(control.breaks)
    }

    // ==================== Switch ====================

    /// Compile `switch`
    fn emit_switch(
        &mut self,
        discriminant: &Expr,
        scope: Option<&ScopeData>,
        cases: &[SwitchCase],
    ) -> EmitResult<()> {
        let base = self.code.depth();
        self.emit_expr(discriminant)?;
        let scope = self.enter_optional_scope(ScopeKind::Block, scope)?;
        for case in cases {
            self.hoist_functions(&case.body)?;
        }

        // [disc] -> [disc] per case test, jumping with [] on a match
        let mut case_jumps = Vec::with_capacity(cases.len());
        for case in cases {
            match &case.test {
                Some(test) => {
                    self.emit_expr(test)?;
                    case_jumps.push(self.open_jump(Instruction::Case {
                        offset: JumpOffset::UNPATCHED,
                    })?);
                }
                None => case_jumps.push(JumpList::new()),
            }
        }
        let mut default_jump = self.open_jump(Instruction::Default {
            offset: JumpOffset::UNPATCHED,
        })?;
        debug_assert_eq!(self.code.depth(), base);

        let id = self
            .controls
            .push(ControlKind::Switch, base, self.scopes.depth(), Labels::new());
        for (case, jumps) in cases.iter().zip(case_jumps) {
            let target = self.mark()?;
            match case.test {
                Some(_) => self.patch(jumps, target),
                None => self.patch(std::mem::take(&mut default_jump), target),
            }
            self.emit_statements(&case.body)?;
        }

        let mut control = self.controls.pop(id);
        control.breaks.append(default_jump);
        self.patch_to_here(control.breaks)?;
        self.leave_optional_scope(scope)
    }

    // ==================== Jumps ====================

    /// Compile `break`
    fn emit_break(&mut self, label: Option<&Atom>, span: Span) -> EmitResult<()> {
        let label = label.map(|l| &**l);
        let target = self
            .controls
            .find_break(label)
            .ok_or_else(|| EmitError::no_break_target(label, span))?;
        let saved = self.unwind_to(Some(target), ExitKind::Break)?;
        let jump = self.goto()?;
        self.controls.get_mut(target).breaks.append(jump);
        self.code.set_depth(saved);
        Ok(())
    }

    /// Compile `continue`
    fn emit_continue(&mut self, label: Option<&Atom>, span: Span) -> EmitResult<()> {
        let label = label.map(|l| &**l);
        let target = match self.controls.find_continue(label) {
            ContinueLookup::Found(id) => id,
            ContinueLookup::Missing => return Err(EmitError::no_continue_target(label, span)),
            ContinueLookup::NotALoop => {
                return Err(EmitError::ContinueToNonLoop {
                    label: label.unwrap_or_default().to_string(),
                    span,
                });
            }
        };
        let saved = self.unwind_to(Some(target), ExitKind::Continue)?;
        match self.controls.get(target).continue_target {
            Some(head) => self.goto_back(head)?,
            None => {
                let jump = self.goto()?;
                self.controls.get_mut(target).continues.append(jump);
            }
        }
        self.code.set_depth(saved);
        Ok(())
    }

    /// Compile `return`
    fn emit_return(&mut self, argument: Option<&Expr>) -> EmitResult<()> {
        let direct = self.can_return_directly();
        match argument {
            Some(argument) => self.emit_expr(argument)?,
            None if self.unit.flags.is_derived_constructor => {
                self.emit_all(&[Instruction::FunctionThis, Instruction::CheckThis])?;
            }
            None => {
                self.emit(Instruction::Undefined)?;
            }
        }

        if direct {
            self.emit(Instruction::Return)?;
            return Ok(());
        }
        self.emit(Instruction::SetRval)?;
        let saved = self.unwind_to(None, ExitKind::Return)?;
        self.emit(Instruction::RetRval)?;
        self.code.set_depth(saved);
        Ok(())
    }
}
