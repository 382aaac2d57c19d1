//! Expression lowering
//!
//! Every `emit_*` here leaves exactly one value on the stack.

use std::rc::Rc;

use heron_bytecode::{
    CheckIsObjectKind, Constant, FunctionPrefixKind, Instruction, JumpOffset, ScopeKind,
    SrcNoteKind,
};

use crate::ast::{
    Argument, ArrayElement, AssignOp, Atom, BinaryOp, Comprehension, Expr, ExprKind, FunctionNode,
    LogicalOp, MemberProp, MethodKind, Pattern, PropKey, Property, UnaryOp, UpdateOp,
};
use crate::control::ControlKind;
use crate::destructuring::Reference;
use crate::emitter::{Emitter, Flavor, Labels};
use crate::error::{EmitError, EmitResult};
use crate::function::FunctionContext;
use crate::scope::NameLocation;

impl Emitter {
    /// Compile an expression
    pub(crate) fn emit_expr(&mut self, expr: &Expr) -> EmitResult<()> {
        match &expr.kind {
            ExprKind::Number(value) => self.emit_number(*value),
            ExprKind::String(value) => self.emit_string(value),
            ExprKind::BigInt(digits) => {
                let idx = self.constant(Constant::bigint(&**digits))?;
                self.emit(Instruction::BigInt { idx })?;
                Ok(())
            }
            ExprKind::Bool(value) => {
                self.emit(if *value {
                    Instruction::True
                } else {
                    Instruction::False
                })?;
                Ok(())
            }
            ExprKind::Null => {
                self.emit(Instruction::Null)?;
                Ok(())
            }
            ExprKind::Undefined => {
                self.emit(Instruction::Undefined)?;
                Ok(())
            }
            ExprKind::RegExp { pattern, flags } => {
                let idx = self.constant(Constant::regexp(&**pattern, &**flags))?;
                self.emit(Instruction::RegExp { idx })?;
                Ok(())
            }
            ExprKind::Template { quasis, exprs } => self.emit_template(quasis, exprs),
            ExprKind::TaggedTemplate {
                tag,
                raw,
                cooked,
                exprs,
            } => self.emit_tagged_template(tag, raw, cooked, exprs),
            ExprKind::Ident(ident) => self.emit_get_name(&ident.name),
            ExprKind::This => self.emit_this(),
            ExprKind::NewTarget => {
                self.emit(Instruction::NewTarget)?;
                Ok(())
            }
            ExprKind::Array(elements) => self.emit_array(elements),
            ExprKind::Object(properties) => self.emit_object(properties),
            ExprKind::Function(func) => self.emit_function_object(func, FunctionContext::default()),
            ExprKind::Arrow(func) => {
                let context = self.arrow_context();
                self.emit_function_object(func, context)
            }
            ExprKind::Class(class) => self.emit_class(class),
            ExprKind::Unary { op, argument } => self.emit_unary(*op, argument),
            ExprKind::Update {
                op,
                prefix,
                target,
            } => self.emit_update(*op, *prefix, target),
            ExprKind::Binary { op, left, right } => {
                self.emit_expr(left)?;
                self.emit_expr(right)?;
                self.emit(binary_instruction(*op))?;
                Ok(())
            }
            ExprKind::Logical { op, left, right } => self.emit_logical(*op, left, right),
            ExprKind::Assign { op, target, value } => self.emit_assign(*op, target, value),
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => self.emit_conditional(test, consequent, alternate),
            ExprKind::Call { callee, args } => {
                self.position(expr.span);
                self.emit_call(callee, args, false)
            }
            ExprKind::New { callee, args } => {
                self.position(expr.span);
                self.emit_new(callee, args)
            }
            ExprKind::SuperCall(args) => self.emit_super_call(args),
            ExprKind::Member { object, property } => self.emit_member(object, property),
            ExprKind::Sequence(exprs) => self.emit_sequence(exprs),
            ExprKind::Yield { argument, delegate } => match (argument, delegate) {
                (Some(argument), true) => self.emit_yield_star(argument),
                (None, true) => Err(EmitError::unsupported("yield* without an operand")),
                (argument, false) => self.emit_yield(argument.as_deref()),
            },
            ExprKind::Await(argument) => {
                self.emit_expr(argument)?;
                self.emit_await()
            }
            ExprKind::Comprehension(comprehension) => self.emit_comprehension(comprehension),
        }
    }

    /// Compile an expression whose anonymous function or class value takes
    /// `name` as its name
    pub(crate) fn emit_named_expr(&mut self, expr: &Expr, name: Option<&str>) -> EmitResult<()> {
        match name {
            Some(name) if is_anonymous_function(expr) => {
                self.emit_expr(expr)?;
                self.emit_string(name)?;
                self.emit(Instruction::SetFunName {
                    prefix: FunctionPrefixKind::None,
                })?;
                Ok(())
            }
            _ => self.emit_expr(expr),
        }
    }

    /// Push the receiver of the current function
    fn emit_this(&mut self) -> EmitResult<()> {
        self.emit(Instruction::FunctionThis)?;
        if self.unit.flags.is_derived_constructor {
            self.emit(Instruction::CheckThis)?;
        }
        Ok(())
    }

    // ==================== Literals ====================

    /// Compile an untagged template
    fn emit_template(&mut self, quasis: &[Atom], exprs: &[Expr]) -> EmitResult<()> {
        let head = quasis.first().map_or("", |q| &**q);
        self.emit_string(head)?;
        for (index, expr) in exprs.iter().enumerate() {
            self.emit_expr(expr)?;
            self.emit_all(&[Instruction::ToString, Instruction::Add])?;
            if let Some(quasi) = quasis.get(index + 1).filter(|q| !q.is_empty()) {
                self.emit_string(quasi)?;
                self.emit(Instruction::Add)?;
            }
        }
        Ok(())
    }

    /// Compile a tagged template: the tag is called with the frozen template
    /// object and the substitutions
    fn emit_tagged_template(
        &mut self,
        tag: &Expr,
        raw: &[Atom],
        cooked: &[Option<Atom>],
        exprs: &[Expr],
    ) -> EmitResult<()> {
        self.emit_callee_and_this(tag)?;
        let idx = self.constant(Constant::TemplateObject {
            raw: raw.iter().map(|s| Box::from(&**s)).collect(),
            cooked: cooked
                .iter()
                .map(|s| s.as_deref().map(Box::from))
                .collect(),
        })?;
        self.emit(Instruction::TemplateObject { idx })?;
        for expr in exprs {
            self.emit_expr(expr)?;
        }
        let argc = self.argument_count(exprs.len() + 1)?;
        self.emit(Instruction::Call { argc })?;
        Ok(())
    }

    /// Compile an array literal
    fn emit_array(&mut self, elements: &[ArrayElement]) -> EmitResult<()> {
        let has_spread = elements
            .iter()
            .any(|e| matches!(e, ArrayElement::Spread(_)));

        if !has_spread {
            self.emit(Instruction::NewArray {
                length: elements.len() as u32,
            })?;
            for (index, element) in elements.iter().enumerate() {
                match element {
                    ArrayElement::Expr(expr) => self.emit_expr(expr)?,
                    _ => {
                        self.emit(Instruction::Hole)?;
                    }
                }
                self.emit(Instruction::InitElemArray {
                    index: index as u32,
                })?;
            }
            return Ok(());
        }

        // [array nextIndex]
        self.emit_all(&[
            Instruction::NewArray { length: 0 },
            Instruction::Int32 { value: 0 },
        ])?;
        for element in elements {
            match element {
                ArrayElement::Expr(expr) => {
                    self.emit_expr(expr)?;
                    self.emit(Instruction::InitElemInc)?;
                }
                ArrayElement::Hole => {
                    self.emit_all(&[Instruction::Hole, Instruction::InitElemInc])?;
                }
                ArrayElement::Spread(expr) => {
                    self.emit_expr(expr)?;
                    self.emit_spread()?;
                }
            }
        }
        self.emit(Instruction::Pop)?;
        Ok(())
    }

    /// Append every value of an iterable to an array under construction
    ///
    /// `[array index iterable] -> [array index']`
    pub(crate) fn emit_spread(&mut self) -> EmitResult<()> {
        let next = self.atom("next")?;
        self.emit_all(&[
            Instruction::GetIterator,
            Instruction::Dup,
            Instruction::GetProp { name: next },
            Instruction::Swap,
        ])?;
        let id = self.controls.push(
            ControlKind::Spread,
            self.code.depth(),
            self.scopes.depth(),
            Labels::new(),
        );
        let head = self.loop_head()?;

        let done = self.atom("done")?;
        self.emit_all(&[
            Instruction::Dup2,
            Instruction::Call { argc: 0 },
            Instruction::CheckIsObj {
                kind: CheckIsObjectKind::IteratorNext,
            },
            Instruction::Dup,
            Instruction::GetProp { name: done },
        ])?;
        let exit = self.if_true()?;
        let value = self.atom("value")?;
        self.emit(Instruction::GetProp { name: value })?;
        self.emit_append_to_array()?;
        self.goto_back(head)?;

        // [array index next iter result]
        self.patch_to_here(exit)?;
        self.emit(Instruction::PopN { count: 3 })?;
        let _ = self.controls.pop(id);
        Ok(())
    }

    /// `[array index next iter value] -> [array index' next iter]`
    pub(crate) fn emit_append_to_array(&mut self) -> EmitResult<()> {
        self.emit_all(&[
            Instruction::Pick { n: 4 },
            Instruction::Pick { n: 4 },
            Instruction::Pick { n: 2 },
            Instruction::InitElemInc,
            Instruction::Unpick { n: 3 },
            Instruction::Unpick { n: 3 },
        ])
    }

    /// Compile an object literal
    fn emit_object(&mut self, properties: &[Property]) -> EmitResult<()> {
        self.emit(Instruction::NewObject)?;
        for property in properties {
            match property {
                Property::KeyValue {
                    key: PropKey::Named(key),
                    value,
                } => {
                    self.emit_named_expr(value, Some(key))?;
                    let name = self.atom(key)?;
                    self.emit(Instruction::InitProp { name })?;
                }
                Property::KeyValue {
                    key: PropKey::Computed(key),
                    value,
                } => {
                    self.emit_expr(key)?;
                    self.emit(Instruction::ToPropertyKey)?;
                    self.emit_expr(value)?;
                    if is_anonymous_function(value) {
                        self.emit_all(&[
                            Instruction::DupAt { n: 1 },
                            Instruction::SetFunName {
                                prefix: FunctionPrefixKind::None,
                            },
                        ])?;
                    }
                    self.emit(Instruction::InitElem)?;
                }
                Property::Shorthand(ident) => {
                    self.emit_get_name(&ident.name)?;
                    let name = self.atom(&ident.name)?;
                    self.emit(Instruction::InitProp { name })?;
                }
                Property::Method { key, kind, func } => {
                    self.emit_method(key, *kind, func, 1)?;
                }
                Property::Spread(expr) => {
                    self.emit_expr(expr)?;
                    self.emit(Instruction::CopyDataProperties)?;
                }
            }
        }
        Ok(())
    }

    /// Define a method on the object `home_distance - 1` values below the
    /// top, counting the method itself once pushed.
    ///
    /// `[.. home ..] -> [.. home ..]`
    pub(crate) fn emit_method(
        &mut self,
        key: &PropKey,
        kind: MethodKind,
        func: &Rc<FunctionNode>,
        home_distance: u16,
    ) -> EmitResult<()> {
        let prefix = match kind {
            MethodKind::Method => FunctionPrefixKind::None,
            MethodKind::Getter => FunctionPrefixKind::Get,
            MethodKind::Setter => FunctionPrefixKind::Set,
        };
        match key {
            PropKey::Named(name) => {
                let context = FunctionContext {
                    name: Some(method_name(prefix, name)),
                    ..FunctionContext::default()
                };
                self.emit_function_object(func, context)?;
                self.emit_all(&[
                    Instruction::DupAt { n: home_distance },
                    Instruction::InitHomeObject,
                ])?;
                let name = self.atom(name)?;
                self.emit(match kind {
                    MethodKind::Method => Instruction::InitProp { name },
                    MethodKind::Getter => Instruction::InitPropGetter { name },
                    MethodKind::Setter => Instruction::InitPropSetter { name },
                })?;
            }
            PropKey::Computed(key) => {
                self.emit_expr(key)?;
                self.emit(Instruction::ToPropertyKey)?;
                self.emit_function_object(func, FunctionContext::default())?;
                self.emit_all(&[
                    Instruction::DupAt { n: home_distance + 1 },
                    Instruction::InitHomeObject,
                    Instruction::DupAt { n: 1 },
                    Instruction::SetFunName { prefix },
                ])?;
                self.emit(match kind {
                    MethodKind::Method => Instruction::InitElem,
                    MethodKind::Getter => Instruction::InitElemGetter,
                    MethodKind::Setter => Instruction::InitElemSetter,
                })?;
            }
        }
        Ok(())
    }

    // ==================== Operators ====================

    /// Compile a unary operator
    fn emit_unary(&mut self, op: UnaryOp, argument: &Expr) -> EmitResult<()> {
        let instruction = match op {
            UnaryOp::Not => Instruction::Not,
            UnaryOp::Neg => Instruction::Neg,
            UnaryOp::Pos => Instruction::Pos,
            UnaryOp::BitNot => Instruction::BitNot,
            UnaryOp::Typeof => Instruction::Typeof,
            UnaryOp::Void => Instruction::Void,
            UnaryOp::Delete => return self.emit_delete(argument),
        };
        self.emit_expr(argument)?;
        self.emit(instruction)?;
        Ok(())
    }

    /// Compile `delete`
    fn emit_delete(&mut self, argument: &Expr) -> EmitResult<()> {
        match &argument.kind {
            ExprKind::Ident(ident) => {
                let resolved = self.scopes.resolve(&ident.name);
                match resolved.location {
                    NameLocation::Global | NameLocation::Dynamic => {
                        let name = self.atom(&ident.name)?;
                        self.emit(Instruction::DelName { name })?;
                    }
                    // Declared bindings are not deletable
                    _ => {
                        self.emit(Instruction::False)?;
                    }
                }
            }
            ExprKind::Member {
                object,
                property: MemberProp::Named(name),
            } => {
                self.emit_expr(object)?;
                let name = self.atom(name)?;
                self.emit(Instruction::DelProp { name })?;
            }
            ExprKind::Member {
                object,
                property: MemberProp::Computed(key),
            } => {
                self.emit_expr(object)?;
                self.emit_expr(key)?;
                self.emit(Instruction::DelElem)?;
            }
            _ => {
                self.emit_expr(argument)?;
                self.emit_all(&[Instruction::Pop, Instruction::True])?;
            }
        }
        Ok(())
    }

    /// Compile `++`/`--`
    fn emit_update(&mut self, op: UpdateOp, prefix: bool, target: &Expr) -> EmitResult<()> {
        let step = match op {
            UpdateOp::Inc => Instruction::Inc,
            UpdateOp::Dec => Instruction::Dec,
        };
        let reference = self.emit_expr_reference(target)?;
        let k = reference.slots();
        self.emit_reference_get(&reference)?;
        self.emit(Instruction::ToNumeric)?;
        if !prefix {
            // Keep the old value below the reference
            self.emit(Instruction::Dup)?;
            if k > 0 {
                self.emit(Instruction::Unpick { n: k as u8 + 1 })?;
            }
        }
        self.emit(step)?;
        self.emit_store(reference, Flavor::Assign)?;
        if !prefix {
            self.emit(Instruction::Pop)?;
        }
        Ok(())
    }

    /// `[ref..] -> [ref.. value]`
    fn emit_reference_get(&mut self, reference: &Reference<'_>) -> EmitResult<()> {
        match reference {
            Reference::Name(name) => self.emit_get_name(name),
            Reference::Prop(name) => {
                let name = self.atom(name)?;
                self.emit_all(&[Instruction::Dup, Instruction::GetProp { name }])
            }
            Reference::Elem => self.emit_all(&[Instruction::Dup2, Instruction::GetElem]),
            Reference::Call => {
                self.emit(Instruction::Undefined)?;
                Ok(())
            }
            Reference::Pattern(_) => Err(EmitError::unsupported(
                "compound assignment to a destructuring pattern",
            )),
        }
    }

    /// Compile `&&`, `||`, `??`
    fn emit_logical(&mut self, op: LogicalOp, left: &Expr, right: &Expr) -> EmitResult<()> {
        self.emit_expr(left)?;
        let end = self.open_jump(short_circuit(op))?;
        self.emit(Instruction::Pop)?;
        self.emit_expr(right)?;
        self.patch_to_here(end)
    }

    /// Compile `a ? b : c`
    fn emit_conditional(&mut self, test: &Expr, consequent: &Expr, alternate: &Expr) -> EmitResult<()> {
        self.emit_expr(test)?;
        let else_jump = self.if_false()?;
        self.emit_expr(consequent)?;
        let end = self.goto()?;
        self.patch_to_here(else_jump)?;
        self.emit_expr(alternate)?;
        self.patch_to_here(end)
    }

    /// Compile assignment, compound and logical assignment
    fn emit_assign(&mut self, op: AssignOp, target: &Pattern, value: &Expr) -> EmitResult<()> {
        match (op, target) {
            (AssignOp::Assign, Pattern::Ident(ident)) => {
                self.emit_named_expr(value, Some(&ident.name))?;
                self.emit_set_name(&ident.name, Flavor::Assign)
            }
            (AssignOp::Assign, Pattern::Array(_) | Pattern::Object(_)) => {
                self.emit_expr(value)?;
                self.emit(Instruction::Dup)?;
                self.emit_destructure(target, Flavor::Assign)
            }
            (AssignOp::Assign, Pattern::Member(_)) => {
                let reference = self.emit_reference(target)?;
                self.emit_expr(value)?;
                self.emit_store(reference, Flavor::Assign)
            }
            (AssignOp::Binary(op), _) => {
                let reference = self.emit_reference(target)?;
                self.emit_reference_get(&reference)?;
                self.emit_expr(value)?;
                self.code.add_note(SrcNoteKind::AssignOp);
                self.emit(binary_instruction(op))?;
                self.emit_store(reference, Flavor::Assign)
            }
            (AssignOp::Logical(op), _) => {
                let name = match target {
                    Pattern::Ident(ident) => Some(&*ident.name),
                    _ => None,
                };
                let reference = self.emit_reference(target)?;
                let k = reference.slots();
                self.emit_reference_get(&reference)?;
                let short = self.open_jump(short_circuit(op))?;
                self.emit(Instruction::Pop)?;
                self.emit_named_expr(value, name)?;
                self.emit_store(reference, Flavor::Assign)?;
                if k == 0 {
                    return self.patch_to_here(short);
                }

                // [ref.. current] -> [current]
                let done = self.goto()?;
                self.patch_to_here(short)?;
                if k == 1 {
                    self.emit_all(&[Instruction::Swap, Instruction::Pop])?;
                } else {
                    self.emit_all(&[
                        Instruction::Unpick { n: k as u8 },
                        Instruction::PopN { count: k },
                    ])?;
                }
                self.patch_to_here(done)
            }
        }
    }

    /// Compile `a, b, c`
    fn emit_sequence(&mut self, exprs: &[Expr]) -> EmitResult<()> {
        let Some((last, rest)) = exprs.split_last() else {
            self.emit(Instruction::Undefined)?;
            return Ok(());
        };
        for expr in rest {
            self.emit_expr(expr)?;
            self.emit(Instruction::Pop)?;
        }
        self.emit_expr(last)
    }

    /// Compile a property read
    fn emit_member(&mut self, object: &Expr, property: &MemberProp) -> EmitResult<()> {
        self.emit_expr(object)?;
        match property {
            MemberProp::Named(name) => {
                let name = self.atom(name)?;
                self.emit(Instruction::GetProp { name })?;
            }
            MemberProp::Computed(key) => {
                self.emit_expr(key)?;
                self.emit(Instruction::GetElem)?;
            }
        }
        Ok(())
    }

    // ==================== Calls ====================

    fn argument_count(&self, count: usize) -> EmitResult<u16> {
        if count > self.config.max_parameters {
            return Err(EmitError::TooManyParameters {
                count,
                max: self.config.max_parameters,
            });
        }
        u16::try_from(count).map_err(|_| EmitError::TooManyParameters {
            count,
            max: usize::from(u16::MAX),
        })
    }

    /// `[] -> [callee this]`
    fn emit_callee_and_this(&mut self, callee: &Expr) -> EmitResult<()> {
        match &callee.kind {
            ExprKind::Member { object, property } => {
                self.emit_expr(object)?;
                self.emit(Instruction::Dup)?;
                match property {
                    MemberProp::Named(name) => {
                        let name = self.atom(name)?;
                        self.emit(Instruction::GetProp { name })?;
                    }
                    MemberProp::Computed(key) => {
                        self.emit_expr(key)?;
                        self.emit(Instruction::GetElem)?;
                    }
                }
                self.emit(Instruction::Swap)?;
            }
            _ => {
                self.emit_expr(callee)?;
                self.emit(Instruction::Undefined)?;
            }
        }
        Ok(())
    }

    /// Push the arguments. Returns the count, or `None` when they were
    /// collected into one array because of a spread.
    fn emit_arguments(&mut self, args: &[Argument]) -> EmitResult<Option<u16>> {
        if !args.iter().any(|a| matches!(a, Argument::Spread(_))) {
            let argc = self.argument_count(args.len())?;
            for arg in args {
                if let Argument::Expr(expr) = arg {
                    self.emit_expr(expr)?;
                }
            }
            return Ok(Some(argc));
        }

        self.emit_all(&[
            Instruction::NewArray { length: 0 },
            Instruction::Int32 { value: 0 },
        ])?;
        for arg in args {
            match arg {
                Argument::Expr(expr) => {
                    self.emit_expr(expr)?;
                    self.emit(Instruction::InitElemInc)?;
                }
                Argument::Spread(expr) => {
                    self.emit_expr(expr)?;
                    self.emit_spread()?;
                }
            }
        }
        self.emit(Instruction::Pop)?;
        Ok(None)
    }

    /// Compile a call; `ignores_result` marks calls whose value is dropped
    pub(crate) fn emit_call(
        &mut self,
        callee: &Expr,
        args: &[Argument],
        ignores_result: bool,
    ) -> EmitResult<()> {
        self.emit_callee_and_this(callee)?;
        let instruction = match self.emit_arguments(args)? {
            Some(argc) if ignores_result => Instruction::CallIgnoresRv { argc },
            Some(argc) => Instruction::Call { argc },
            None => Instruction::SpreadCall,
        };
        self.emit(instruction)?;
        Ok(())
    }

    /// Compile `new`
    fn emit_new(&mut self, callee: &Expr, args: &[Argument]) -> EmitResult<()> {
        self.emit_expr(callee)?;
        self.emit(Instruction::Dup)?;
        let instruction = match self.emit_arguments(args)? {
            Some(argc) => Instruction::New { argc },
            None => Instruction::SpreadNew,
        };
        self.emit(instruction)?;
        Ok(())
    }

    /// Compile `super(...)`: construct through the parent, bind `this`, then
    /// run the instance field initializer
    fn emit_super_call(&mut self, args: &[Argument]) -> EmitResult<()> {
        self.emit_all(&[Instruction::SuperFun, Instruction::NewTarget])?;
        let instruction = match self.emit_arguments(args)? {
            Some(argc) => Instruction::SuperCall { argc },
            None => Instruction::SpreadSuperCall,
        };
        self.emit_all(&[instruction, Instruction::InitThis])?;
        if self.unit.runs_field_initializer {
            self.emit_run_field_initializer()?;
        }
        Ok(())
    }

    // ==================== Comprehensions ====================

    /// Compile `[for (x of xs) if (c) body]`
    fn emit_comprehension(&mut self, comprehension: &Comprehension) -> EmitResult<()> {
        self.emit_all(&[
            Instruction::NewArray { length: 0 },
            Instruction::Int32 { value: 0 },
        ])?;
        let scope = self.enter_scope(ScopeKind::Comprehension, &comprehension.scope)?;
        let fresh = self.scopes.record(scope.index()).has_environment;

        self.emit_expr(&comprehension.iterable)?;
        self.emit_for_of_loop(false, Labels::new(), |this| {
            if fresh {
                this.emit(Instruction::FreshenLexicalEnv)?;
            }
            this.emit_set_name(&comprehension.binding.name, Flavor::Initialize)?;
            this.emit(Instruction::Pop)?;

            let skip = match &comprehension.filter {
                Some(filter) => {
                    this.emit_expr(filter)?;
                    Some(this.if_false()?)
                }
                None => None,
            };
            this.emit_expr(&comprehension.body)?;
            this.emit_append_to_array()?;
            match skip {
                Some(skip) => this.patch_to_here(skip),
                None => Ok(()),
            }
        })?;

        self.leave_scope(scope)?;
        self.emit(Instruction::Pop)?;
        Ok(())
    }
}

/// Jump taken when the left operand already decides the result
fn short_circuit(op: LogicalOp) -> Instruction {
    let offset = JumpOffset::UNPATCHED;
    match op {
        LogicalOp::And => Instruction::And { offset },
        LogicalOp::Or => Instruction::Or { offset },
        LogicalOp::Coalesce => Instruction::Coalesce { offset },
    }
}

fn binary_instruction(op: BinaryOp) -> Instruction {
    match op {
        BinaryOp::Add => Instruction::Add,
        BinaryOp::Sub => Instruction::Sub,
        BinaryOp::Mul => Instruction::Mul,
        BinaryOp::Div => Instruction::Div,
        BinaryOp::Mod => Instruction::Mod,
        BinaryOp::Pow => Instruction::Pow,
        BinaryOp::BitOr => Instruction::BitOr,
        BinaryOp::BitXor => Instruction::BitXor,
        BinaryOp::BitAnd => Instruction::BitAnd,
        BinaryOp::Lsh => Instruction::Lsh,
        BinaryOp::Rsh => Instruction::Rsh,
        BinaryOp::Ursh => Instruction::Ursh,
        BinaryOp::Eq => Instruction::Eq,
        BinaryOp::Ne => Instruction::Ne,
        BinaryOp::StrictEq => Instruction::StrictEq,
        BinaryOp::StrictNe => Instruction::StrictNe,
        BinaryOp::Lt => Instruction::Lt,
        BinaryOp::Le => Instruction::Le,
        BinaryOp::Gt => Instruction::Gt,
        BinaryOp::Ge => Instruction::Ge,
        BinaryOp::InstanceOf => Instruction::InstanceOf,
        BinaryOp::In => Instruction::In,
    }
}

/// Whether `expr` is a function or class without its own name, which takes
/// the name of the binding or key it is assigned to
pub(crate) fn is_anonymous_function(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Function(func) | ExprKind::Arrow(func) => func.name.is_none(),
        ExprKind::Class(class) => class.name.is_none(),
        _ => false,
    }
}

/// Name of a method defined with a literal key
pub(crate) fn method_name(prefix: FunctionPrefixKind, key: &str) -> Atom {
    match prefix {
        FunctionPrefixKind::None => key.into(),
        FunctionPrefixKind::Get => format!("get {key}").into(),
        FunctionPrefixKind::Set => format!("set {key}").into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_name() {
        assert_eq!(&*method_name(FunctionPrefixKind::None, "x"), "x");
        assert_eq!(&*method_name(FunctionPrefixKind::Get, "x"), "get x");
        assert_eq!(&*method_name(FunctionPrefixKind::Set, "size"), "set size");
    }

    #[test]
    fn test_short_circuit_jumps_are_placeholders() {
        for op in [LogicalOp::And, LogicalOp::Or, LogicalOp::Coalesce] {
            let jump = short_circuit(op);
            assert!(jump.jump_offset().is_some_and(|o| o.is_unpatched()));
        }
    }
}
