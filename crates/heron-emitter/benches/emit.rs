//! Emission throughput benchmarks
//!
//! Run with: cargo bench -p heron-emitter

use std::hint::black_box;
use std::rc::Rc;

use criterion::{Criterion, criterion_group, criterion_main};
use heron_emitter::ast::*;
use heron_emitter::{Compiler, EmitterConfig};

const SP: Span = Span::new(1, 0);

fn stmt(kind: StmtKind) -> Stmt {
    Stmt::new(kind, SP)
}

fn call(name: &str) -> Stmt {
    stmt(StmtKind::Expr(Expr::new(
        ExprKind::Call {
            callee: Box::new(Expr::ident(name, SP)),
            args: vec![Argument::Expr(Expr::ident("i", SP))],
        },
        SP,
    )))
}

fn block(body: Vec<Stmt>) -> Block {
    Block { scope: None, body }
}

/// `for (let v of xs) { try { <inner>; if (c) break; } finally { g(i); } }`
/// nested `depth` times
fn nested_loops(depth: usize) -> Stmt {
    let mut body = vec![call("f")];
    for level in (0..depth).rev() {
        let name: Atom = format!("v{level}").into();
        let exit = stmt(StmtKind::If {
            test: Expr::ident("c", SP),
            consequent: Box::new(stmt(StmtKind::Break(None))),
            alternate: None,
        });
        body.push(exit);
        let guarded = stmt(StmtKind::Try {
            block: block(body),
            handler: None,
            finalizer: Some(block(vec![call("g")])),
        });
        body = vec![stmt(StmtKind::ForOf {
            head_scope: Some(ScopeData::new(vec![BindingDecl::new(
                &name,
                BindingKind::Let,
                false,
            )])),
            head: ForHead::Decl {
                kind: DeclKind::Let,
                target: Pattern::ident(&name, SP),
            },
            iterable: Expr::ident("xs", SP),
            body: Box::new(stmt(StmtKind::Block(block(vec![guarded])))),
            is_await: false,
        })];
    }
    stmt(StmtKind::Block(block(body)))
}

/// `depth` nested loops inside each of `count` functions
fn program(count: usize, depth: usize, lazy: bool) -> Program {
    let functions = (0..count)
        .map(|n| {
            let func = FunctionNode {
                name: Some(format!("f{n}").into()),
                kind: FunctionKind::Normal,
                is_generator: false,
                is_async: false,
                strict: false,
                params: vec![Param {
                    target: Pattern::ident("i", SP),
                    default: None,
                }],
                rest: None,
                scope: ScopeData::new(vec![BindingDecl::new("i", BindingKind::Parameter, false)]),
                body_scope: None,
                body: FunctionBody::Block(vec![nested_loops(depth)]),
                has_direct_eval: false,
                lazy,
                span: SP,
                end: SP,
            };
            stmt(StmtKind::Expr(Expr::new(ExprKind::Function(Rc::new(func)), SP)))
        })
        .collect();
    Program {
        kind: ProgramKind::Script,
        strict: false,
        scope: ScopeData::default(),
        body: functions,
        span: SP,
    }
}

fn bench_nested_control_flow(c: &mut Criterion) {
    let compiler = Compiler::new();
    let shallow = program(50, 2, false);
    let deep = program(4, 24, false);

    c.bench_function("emit_50_functions_depth_2", |b| {
        b.iter(|| black_box(compiler.compile(black_box(&shallow))))
    });
    c.bench_function("emit_4_functions_depth_24", |b| {
        b.iter(|| black_box(compiler.compile(black_box(&deep))))
    });
}

fn bench_lazy_placeholders(c: &mut Criterion) {
    let compiler = Compiler::with_config(EmitterConfig::new().with_lazy_functions(true));
    let lazy = program(50, 8, true);

    c.bench_function("emit_50_lazy_placeholders", |b| {
        b.iter(|| black_box(compiler.compile(black_box(&lazy))))
    });
}

criterion_group!(benches, bench_nested_control_flow, bench_lazy_placeholders);
criterion_main!(benches);
