//! Function emitter
//!
//! A function body is compiled by a fresh [`Emitter`] that only sees an
//! immutable snapshot of the enclosing scope chain. [`FunctionEmitter`] walks
//! the phases of one body:
//!
//! ```text
//! prepare   prologue: function scope, var environment, captured parameters,
//!           callee binding, generator object, dead zone
//! params    defaults, destructuring and rest (non-simple lists only)
//! body      InitialYield, field initializer, hoisted functions, statements
//! end       implicit return
//! ```

use std::rc::Rc;

use heron_bytecode::{
    BindingKind, BindingLocation, EnvCoord, FunctionIndex, FunctionRecord, Instruction, LazyScript,
    Position, ScopeKind, ScriptFlags, ScriptKind,
};
use tracing::debug;

use crate::ast::{
    Atom, FunctionBody, FunctionKind, FunctionNode, Pattern, Program, ProgramKind, Stmt, StmtKind,
};
use crate::buffer::Section;
use crate::config::EmitterConfig;
use crate::emitter::{EmitOutput, Emitter, Flavor, LazyUnit};
use crate::error::{EmitError, EmitResult, Warning, WarningKind};
use crate::scope::{EnclosingScope, NameLocation, ScopeHandle};

/// What the definition site knows about a function beyond its node
#[derive(Debug, Clone, Default)]
pub(crate) struct FunctionContext {
    /// Name for a function whose node has none
    pub name: Option<Atom>,
    /// Constructor of a class with `extends`, or an arrow inside one
    pub derived: bool,
    /// Runs the instance field initializer, on entry or after `super()`
    pub runs_field_initializer: bool,
}

/// Flags of a function known before its body is compiled
pub(crate) fn function_flags(
    func: &FunctionNode,
    enclosing_strict: bool,
    context: &FunctionContext,
) -> ScriptFlags {
    let is_class_constructor = func.kind == FunctionKind::ClassConstructor;
    ScriptFlags {
        is_strict: enclosing_strict || func.strict || is_class_constructor,
        is_generator: func.is_generator,
        is_async: func.is_async,
        is_arrow: func.kind == FunctionKind::Arrow,
        is_method: matches!(
            func.kind,
            FunctionKind::Method
                | FunctionKind::Getter
                | FunctionKind::Setter
                | FunctionKind::ClassConstructor
        ),
        is_class_constructor,
        is_derived_constructor: is_class_constructor && context.derived,
        has_rest: func.rest.is_some(),
        has_parameter_expressions: !func.has_simple_params(),
        has_direct_eval: func.has_direct_eval,
    }
}

/// `(length, formal)` parameter counts; neither may exceed `max` nor the
/// 16-bit script fields
fn param_counts(func: &FunctionNode, max: usize) -> EmitResult<(u16, u16)> {
    let count = func.params.len();
    let max = max.min(usize::from(u16::MAX));
    if count > max {
        return Err(EmitError::TooManyParameters { count, max });
    }
    let too_many = |_| EmitError::TooManyParameters { count, max };
    let formal = u16::try_from(count).map_err(too_many)?;
    let length = u16::try_from(func.length()).map_err(too_many)?;
    Ok((length, formal))
}

fn starts_with_use_strict(body: &[Stmt]) -> bool {
    body.iter()
        .map_while(|stmt| match &stmt.kind {
            StmtKind::Directive(directive) => Some(directive),
            _ => None,
        })
        .any(|directive| &**directive == "use strict")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionState {
    Start,
    Prepared,
    Params,
    Body,
    End,
}

/// Drives the emission of one function body into a fresh unit
#[derive(Debug)]
struct FunctionEmitter<'a> {
    func: &'a FunctionNode,
    context: &'a FunctionContext,
    state: FunctionState,
    function_scope: Option<ScopeHandle>,
    body_scope: Option<ScopeHandle>,
}

impl<'a> FunctionEmitter<'a> {
    fn new(func: &'a FunctionNode, context: &'a FunctionContext) -> Self {
        Self {
            func,
            context,
            state: FunctionState::Start,
            function_scope: None,
            body_scope: None,
        }
    }

    /// Fill in the unit and emit the prologue
    fn prepare(&mut self, em: &mut Emitter, enclosing_strict: bool) -> EmitResult<()> {
        debug_assert_eq!(self.state, FunctionState::Start);
        let func = self.func;

        let (length, formal) = param_counts(func, em.config.max_parameters)?;
        em.unit.name = func.name.clone().or_else(|| self.context.name.clone());
        em.unit.kind = ScriptKind::Function;
        em.unit.flags = function_flags(func, enclosing_strict, self.context);
        em.unit.param_count = length;
        em.unit.formal_count = formal;
        em.unit.runs_field_initializer = self.context.runs_field_initializer;
        em.unit.in_derived_constructor = self.context.derived;

        if let FunctionBody::Block(body) = &func.body
            && !func.has_simple_params()
            && starts_with_use_strict(body)
        {
            em.warnings
                .push(Warning::new(WarningKind::ConflictingDirective, func.span));
        }
        if func.has_direct_eval && !em.is_strict() {
            em.scopes.force_environments();
        }

        em.code.switch_to(Section::Prologue);

        let simple: Vec<Atom> = if func.has_simple_params() {
            func.params
                .iter()
                .filter_map(|p| match &p.target {
                    Pattern::Ident(ident) => Some(ident.name.clone()),
                    _ => None,
                })
                .collect()
        } else {
            Vec::new()
        };
        let scope = em
            .scopes
            .enter(ScopeKind::Function, &func.scope.bindings, &simple, None)?;
        let record = em.scopes.record(scope.index());
        let has_environment = record.has_environment;

        // Captured simple parameters move from their argument slot into the
        // environment
        let captured: Vec<(u16, u32)> = record
            .bindings
            .iter()
            .filter(|b| b.kind == BindingKind::Parameter)
            .filter_map(|b| match b.location {
                BindingLocation::Environment(slot) => simple
                    .iter()
                    .rposition(|p| **p == *b.name)
                    .map(|index| (index as u16, slot)),
                _ => None,
            })
            .collect();
        if has_environment {
            em.emit(Instruction::PushVarEnv {
                scope: scope.index(),
            })?;
        }
        for (index, slot) in captured {
            em.emit_all(&[
                Instruction::GetArg { index },
                Instruction::SetAliasedVar {
                    coord: EnvCoord::new(0, slot),
                },
                Instruction::Pop,
            ])?;
        }

        // A named function expression sees itself under its own name
        if let Some(name) = &func.name {
            let self_binding = func
                .scope
                .bindings
                .iter()
                .any(|b| b.kind == BindingKind::Synthetic && b.name == *name);
            if self_binding {
                em.emit(Instruction::Callee)?;
                em.emit_set_name(name, Flavor::Initialize)?;
                em.emit(Instruction::Pop)?;
            }
        }

        if func.is_generator || func.is_async {
            em.emit_generator_object()?;
        }
        em.init_dead_zone(&scope)?;
        self.function_scope = Some(scope);

        em.code.switch_to(Section::Main);
        em.position(func.span);
        self.state = FunctionState::Prepared;
        Ok(())
    }

    /// Bind a non-simple parameter list
    fn emit_params(&mut self, em: &mut Emitter) -> EmitResult<()> {
        debug_assert_eq!(self.state, FunctionState::Prepared);
        let func = self.func;
        if !func.has_simple_params() {
            for (index, param) in func.params.iter().enumerate() {
                em.emit(Instruction::GetArg {
                    index: index as u16,
                })?;
                if let Some(default) = &param.default {
                    let name = match &param.target {
                        Pattern::Ident(ident) => Some(&*ident.name),
                        _ => None,
                    };
                    em.emit_default(default, name)?;
                }
                em.emit_bind_pattern(&param.target, Flavor::Initialize)?;
            }
            if let Some(rest) = &func.rest {
                em.emit(Instruction::Rest)?;
                em.emit_bind_pattern(rest, Flavor::Initialize)?;
            }
        }
        self.body_scope = em.enter_optional_scope(ScopeKind::Block, func.body_scope.as_ref())?;
        self.state = FunctionState::Params;
        Ok(())
    }

    /// Compile the body
    fn emit_body(&mut self, em: &mut Emitter) -> EmitResult<()> {
        debug_assert_eq!(self.state, FunctionState::Params);
        let func = self.func;
        if func.is_generator {
            em.emit_initial_yield()?;
        }
        if em.unit.runs_field_initializer && !em.unit.in_derived_constructor {
            em.emit(Instruction::FunctionThis)?;
            em.emit_run_field_initializer()?;
            em.emit(Instruction::Pop)?;
        }

        match &func.body {
            FunctionBody::Block(body) => {
                em.hoist_functions(body)?;
                em.emit_statements(body)?;
            }
            FunctionBody::Expr(expr) => {
                em.emit_expr(expr)?;
                em.emit(Instruction::Return)?;
            }
        }
        self.state = FunctionState::Body;
        Ok(())
    }

    /// Emit the implicit return and close the scopes
    fn emit_end(&mut self, em: &mut Emitter) -> EmitResult<()> {
        debug_assert_eq!(self.state, FunctionState::Body);
        if em.code.is_reachable() {
            if em.unit.flags.is_derived_constructor {
                em.emit_all(&[
                    Instruction::FunctionThis,
                    Instruction::CheckThis,
                    Instruction::Return,
                ])?;
            } else {
                em.emit(Instruction::RetRval)?;
            }
        }
        em.leave_optional_scope(self.body_scope.take())?;
        if let Some(scope) = self.function_scope.take() {
            em.leave_scope(scope)?;
        }
        self.state = FunctionState::End;
        Ok(())
    }
}

/// Compile a function body into its own script
pub(crate) fn compile_function(
    func: &FunctionNode,
    context: &FunctionContext,
    enclosing: Option<Rc<EnclosingScope>>,
    path: Vec<u32>,
    enclosing_strict: bool,
    config: EmitterConfig,
) -> EmitResult<EmitOutput> {
    let mut em = Emitter::new_unit(config, enclosing, path, func.span);
    let mut function = FunctionEmitter::new(func, context);
    function.prepare(&mut em, enclosing_strict)?;
    function.emit_params(&mut em)?;
    function.emit_body(&mut em)?;
    function.emit_end(&mut em)?;
    em.finish()
}

/// Compile a top-level script, module or eval unit
pub(crate) fn compile_program(program: &Program, config: EmitterConfig) -> EmitResult<EmitOutput> {
    let mut em = Emitter::new_unit(config, None, Vec::new(), program.span);
    let (unit_kind, scope_kind) = match program.kind {
        ProgramKind::Script => (ScriptKind::Global, ScopeKind::Global),
        ProgramKind::Module => (ScriptKind::Module, ScopeKind::Module),
        ProgramKind::Eval => (ScriptKind::Eval, ScopeKind::Eval),
    };
    em.unit.kind = unit_kind;
    em.unit.flags.is_strict =
        program.strict || config.strict || program.kind == ProgramKind::Module;
    debug!(kind = ?unit_kind, strict = em.unit.flags.is_strict, "compiling program");

    em.code.switch_to(Section::Prologue);
    let scope = em
        .scopes
        .enter(scope_kind, &program.scope.bindings, &[], None)?;
    let has_environment = em.scopes.record(scope.index()).has_environment;
    match scope_kind {
        ScopeKind::Global => {
            em.emit(Instruction::GlobalOrEvalDeclInstantiation {
                scope: scope.index(),
            })?;
        }
        ScopeKind::Eval => {
            em.emit_all(&[
                Instruction::PushVarEnv {
                    scope: scope.index(),
                },
                Instruction::GlobalOrEvalDeclInstantiation {
                    scope: scope.index(),
                },
            ])?;
        }
        _ if has_environment => {
            em.emit(Instruction::PushVarEnv {
                scope: scope.index(),
            })?;
        }
        _ => {}
    }
    em.init_dead_zone(&scope)?;
    em.code.switch_to(Section::Main);

    em.hoist_functions(&program.body)?;
    em.emit_statements(&program.body)?;
    if em.code.is_reachable() {
        em.emit(Instruction::RetRval)?;
    }
    em.leave_scope(scope)?;
    em.finish()
}

/// Compile a function body that was emitted as a lazy placeholder
pub(crate) fn compile_lazy(unit: &LazyUnit, config: EmitterConfig) -> EmitResult<EmitOutput> {
    debug!(path = ?unit.path, "compiling lazy function");
    compile_function(
        &unit.function,
        &FunctionContext::default(),
        unit.enclosing.clone(),
        unit.path.clone(),
        unit.strict,
        config,
    )
}

impl Emitter {
    fn is_lazy_candidate(&self, func: &FunctionNode, context: &FunctionContext) -> bool {
        self.config.lazy_functions
            && func.lazy
            && matches!(func.kind, FunctionKind::Normal | FunctionKind::Arrow)
            && context.name.is_none()
            && !context.derived
    }

    /// Context of an arrow defined here. `super()` in the arrow initializes
    /// the enclosing derived constructor's `this`, fields included.
    pub(crate) fn arrow_context(&self) -> FunctionContext {
        let derived = self.unit.in_derived_constructor;
        FunctionContext {
            name: None,
            derived,
            runs_field_initializer: derived && self.unit.runs_field_initializer,
        }
    }

    /// Append a finished nested unit to the function table
    pub(crate) fn add_compiled_function(&mut self, output: EmitOutput) -> FunctionIndex {
        self.warnings.extend(output.warnings);
        self.lazy.extend(output.lazy);
        self.functions
            .push(FunctionRecord::Compiled(Box::new(output.script)));
        FunctionIndex::new(self.functions.len() as u32 - 1)
    }

    /// Path of the next function table entry
    pub(crate) fn next_function_path(&self) -> Vec<u32> {
        let mut path = self.path.clone();
        path.push(self.functions.len() as u32);
        path
    }

    /// Compile `func` eagerly or as a lazy placeholder and add it to the
    /// function table
    pub(crate) fn add_function(
        &mut self,
        func: &Rc<FunctionNode>,
        context: &FunctionContext,
    ) -> EmitResult<FunctionIndex> {
        let enclosing = self.scopes.snapshot();
        let path = self.next_function_path();
        let strict = self.is_strict();

        if self.is_lazy_candidate(func, context) {
            let (param_count, _) = param_counts(func, self.config.max_parameters)?;
            debug!(name = func.name.as_deref(), ?path, "deferring function");
            self.functions.push(FunctionRecord::Lazy(LazyScript {
                name: func.name.as_deref().map(Box::from),
                start: Position::new(func.span.line, func.span.column),
                end: Position::new(func.end.line, func.end.column),
                flags: function_flags(func, strict, context),
                enclosing_scope: self.scopes.innermost(),
                param_count,
            }));
            self.lazy.push(LazyUnit {
                path,
                function: Rc::clone(func),
                enclosing,
                strict,
            });
            return Ok(FunctionIndex::new(self.functions.len() as u32 - 1));
        }

        let output = compile_function(func, context, enclosing, path, strict, self.config)?;
        Ok(self.add_compiled_function(output))
    }

    /// `[] -> [closure]`
    pub(crate) fn emit_function_object(
        &mut self,
        func: &Rc<FunctionNode>,
        context: FunctionContext,
    ) -> EmitResult<()> {
        let func = self.add_function(func, &context)?;
        self.emit(Instruction::Lambda { func })?;
        Ok(())
    }

    /// Instantiate the function declarations of a statement list at the top
    /// of its scope
    pub(crate) fn hoist_functions(&mut self, body: &[Stmt]) -> EmitResult<()> {
        for stmt in body {
            let StmtKind::FunctionDecl(func) = &stmt.kind else {
                continue;
            };
            let Some(name) = func.name.clone() else {
                return Err(EmitError::unsupported("function declaration without a name"));
            };
            self.hoisted.insert(Rc::as_ptr(func));
            self.emit_function_object(func, FunctionContext::default())?;

            let resolved = self.scopes.resolve(&name);
            let top_level = self.scopes.depth() == 1
                && matches!(self.unit.kind, ScriptKind::Global | ScriptKind::Eval);
            if top_level && matches!(resolved.location, NameLocation::Global | NameLocation::Dynamic)
            {
                self.emit(Instruction::DefFun)?;
            } else {
                self.emit_set_resolved(&name, resolved, Flavor::Initialize)?;
                self.emit(Instruction::Pop)?;
            }
        }
        Ok(())
    }

    /// Compile a function declaration in statement position
    pub(crate) fn emit_function_decl(&mut self, func: &Rc<FunctionNode>) -> EmitResult<()> {
        if self.hoisted.contains(&Rc::as_ptr(func)) {
            return self.emit_again(func);
        }

        // Declarations the binder left in a single-statement position
        let Some(name) = func.name.clone() else {
            return Err(EmitError::unsupported("function declaration without a name"));
        };
        self.emit_function_object(func, FunctionContext::default())?;
        self.emit_set_name(&name, Flavor::Initialize)?;
        self.emit(Instruction::Pop)?;
        Ok(())
    }

    /// Revisit a hoisted declaration where it is written. Sloppy-mode block
    /// functions copy their block binding into the var binding of the same
    /// name; nothing else happens, the closure already exists.
    fn emit_again(&mut self, func: &FunctionNode) -> EmitResult<()> {
        let Some(name) = &func.name else {
            return Ok(());
        };
        if self.is_strict() {
            return Ok(());
        }
        let in_block = self
            .scopes
            .innermost()
            .is_some_and(|index| !self.scopes.record(index).kind.is_var_scope());
        if !in_block {
            return Ok(());
        }
        let var = self.scopes.resolve_var(name);
        if !matches!(var.kind, Some(BindingKind::Var | BindingKind::Function) | None) {
            return Ok(());
        }
        self.emit_get_name(name)?;
        self.emit_set_resolved(name, var, Flavor::Declare)?;
        self.emit(Instruction::Pop)?;
        Ok(())
    }
}
