//! Tree builders and checks shared by the integration tests

#![allow(dead_code)]

use std::rc::Rc;

use heron_bytecode::{FunctionRecord, Script, verify_stack_depths};
use heron_emitter::ast::*;
use heron_emitter::{Compiler, EmitOutput, EmitResult, EmitterConfig};
use tracing_subscriber::EnvFilter;

pub const SP: Span = Span::new(1, 0);

/// Route emitter logs to the test writer; `RUST_LOG=heron_emitter=trace`
/// shows every non-local exit.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Expressions
// ============================================================================

pub fn num(value: f64) -> Expr {
    Expr::new(ExprKind::Number(value), SP)
}

pub fn string(value: &str) -> Expr {
    Expr::new(ExprKind::String(value.into()), SP)
}

pub fn ident(name: &str) -> Expr {
    Expr::ident(name, SP)
}

pub fn call(callee: Expr, args: Vec<Expr>) -> Expr {
    Expr::new(
        ExprKind::Call {
            callee: Box::new(callee),
            args: args.into_iter().map(Argument::Expr).collect(),
        },
        SP,
    )
}

pub fn member(object: Expr, name: &str) -> Expr {
    Expr::new(
        ExprKind::Member {
            object: Box::new(object),
            property: MemberProp::Named(name.into()),
        },
        SP,
    )
}

pub fn assign(target: Pattern, value: Expr) -> Expr {
    Expr::new(
        ExprKind::Assign {
            op: AssignOp::Assign,
            target: Box::new(target),
            value: Box::new(value),
        },
        SP,
    )
}

pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        SP,
    )
}

pub fn yield_expr(argument: Expr, delegate: bool) -> Expr {
    Expr::new(
        ExprKind::Yield {
            argument: Some(Box::new(argument)),
            delegate,
        },
        SP,
    )
}

pub fn function_expr(func: FunctionNode) -> Expr {
    Expr::new(ExprKind::Function(Rc::new(func)), SP)
}

// ============================================================================
// Patterns
// ============================================================================

pub fn pat(name: &str) -> Pattern {
    Pattern::ident(name, SP)
}

pub fn array_pattern(names: &[&str], rest: Option<&str>) -> Pattern {
    Pattern::Array(ArrayPattern {
        elements: names
            .iter()
            .map(|name| {
                Some(PatternElement {
                    target: pat(name),
                    default: None,
                })
            })
            .collect(),
        rest: rest.map(|name| Box::new(pat(name))),
    })
}

pub fn object_pattern(names: &[&str], rest: Option<&str>) -> Pattern {
    Pattern::Object(ObjectPattern {
        properties: names
            .iter()
            .map(|name| PatternProperty {
                key: PropKey::Named((*name).into()),
                target: pat(name),
                default: None,
            })
            .collect(),
        rest: rest.map(|name| Box::new(pat(name))),
    })
}

// ============================================================================
// Statements
// ============================================================================

pub fn stmt(kind: StmtKind) -> Stmt {
    Stmt::new(kind, SP)
}

pub fn expr_stmt(expr: Expr) -> Stmt {
    stmt(StmtKind::Expr(expr))
}

pub fn decl(kind: DeclKind, target: Pattern, init: Option<Expr>) -> Stmt {
    stmt(StmtKind::VarDecl(VarDecl {
        kind,
        declarators: vec![Declarator { target, init }],
    }))
}

pub fn block(scope: Option<ScopeData>, body: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::Block(Block { scope, body }))
}

pub fn while_true(body: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::While {
        test: Expr::new(ExprKind::Bool(true), SP),
        body: Box::new(block(None, body)),
    })
}

pub fn for_ever(body: Stmt) -> Stmt {
    stmt(StmtKind::For {
        head_scope: None,
        init: None,
        test: None,
        update: None,
        body: Box::new(body),
    })
}

pub fn for_of(name: &str, iterable: Expr, body: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::ForOf {
        head_scope: Some(ScopeData::new(vec![binding(name, BindingKind::Let, false)])),
        head: ForHead::Decl {
            kind: DeclKind::Let,
            target: pat(name),
        },
        iterable,
        body: Box::new(block(None, body)),
        is_await: false,
    })
}

pub fn try_finally(body: Vec<Stmt>, finalizer: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::Try {
        block: Block {
            scope: None,
            body,
        },
        handler: None,
        finalizer: Some(Block {
            scope: None,
            body: finalizer,
        }),
    })
}

pub fn try_catch(body: Vec<Stmt>, param: &str, handler: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::Try {
        block: Block {
            scope: None,
            body,
        },
        handler: Some(CatchClause {
            param: Some(pat(param)),
            scope: ScopeData::new(vec![binding(param, BindingKind::Catch, false)]),
            body: Block {
                scope: None,
                body: handler,
            },
        }),
        finalizer: None,
    })
}

pub fn labeled(label: &str, body: Stmt) -> Stmt {
    stmt(StmtKind::Labeled {
        label: label.into(),
        body: Box::new(body),
    })
}

pub fn break_stmt(label: Option<&str>) -> Stmt {
    stmt(StmtKind::Break(label.map(Into::into)))
}

pub fn continue_stmt(label: Option<&str>) -> Stmt {
    stmt(StmtKind::Continue(label.map(Into::into)))
}

pub fn return_stmt(argument: Option<Expr>) -> Stmt {
    stmt(StmtKind::Return(argument))
}

// ============================================================================
// Units
// ============================================================================

pub fn binding(name: &str, kind: BindingKind, closed_over: bool) -> BindingDecl {
    BindingDecl::new(name, kind, closed_over)
}

pub fn script(bindings: Vec<BindingDecl>, body: Vec<Stmt>) -> Program {
    Program {
        kind: ProgramKind::Script,
        strict: false,
        scope: ScopeData::new(bindings),
        body,
        span: SP,
    }
}

/// `function name(params) { body }` with simple parameters
pub fn function(
    name: Option<&str>,
    params: &[&str],
    locals: Vec<BindingDecl>,
    body: Vec<Stmt>,
) -> FunctionNode {
    let mut bindings: Vec<BindingDecl> = params
        .iter()
        .map(|p| binding(p, BindingKind::Parameter, false))
        .collect();
    bindings.extend(locals);
    FunctionNode {
        name: name.map(Into::into),
        kind: FunctionKind::Normal,
        is_generator: false,
        is_async: false,
        strict: false,
        params: params
            .iter()
            .map(|p| Param {
                target: pat(p),
                default: None,
            })
            .collect(),
        rest: None,
        scope: ScopeData::new(bindings),
        body_scope: None,
        body: FunctionBody::Block(body),
        has_direct_eval: false,
        lazy: false,
        span: SP,
        end: Span::new(1, 40),
    }
}

/// Script whose only statement is `(function () { body })`
pub fn in_function(func: FunctionNode) -> Program {
    script(Vec::new(), vec![expr_stmt(function_expr(func))])
}

// ============================================================================
// Compilation and checks
// ============================================================================

pub fn try_compile(program: &Program) -> EmitResult<EmitOutput> {
    init_tracing();
    Compiler::new().compile(program)
}

pub fn compile(program: &Program) -> EmitOutput {
    compile_with(EmitterConfig::default(), program)
}

pub fn compile_with(config: EmitterConfig, program: &Program) -> EmitOutput {
    init_tracing();
    let output = Compiler::with_config(config)
        .compile(program)
        .expect("program should compile");
    verify_tree(&output.script);
    output
}

/// Check depth balance of a script and every compiled nested function
pub fn verify_tree(script: &Script) {
    if let Err(err) = verify_stack_depths(script) {
        panic!("{err}\n{}", script.disassemble());
    }
    for record in &script.functions {
        if let FunctionRecord::Compiled(nested) = record {
            verify_tree(nested);
        }
    }
}

/// Compiled nested function by index
pub fn nested(script: &Script, index: usize) -> &Script {
    match &script.functions[index] {
        FunctionRecord::Compiled(script) => script,
        FunctionRecord::Lazy(lazy) => panic!("function {index} is lazy: {lazy:?}"),
    }
}

/// Instruction names of the whole code, prologue included
pub fn names(script: &Script) -> Vec<&'static str> {
    script.code.iter().map(|i| i.name()).collect()
}

/// Index of the first `name` at or after `from`
pub fn find_from(names: &[&str], from: usize, name: &str) -> Option<usize> {
    names[from..]
        .iter()
        .position(|n| *n == name)
        .map(|i| i + from)
}
