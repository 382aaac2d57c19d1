//! Generator, async and `yield*` tests

mod common;

use common::*;
use heron_bytecode::{CheckIsObjectKind, Instruction, Script, ThrowMsgKind};
use heron_emitter::EmitError;
use heron_emitter::ast::*;

fn generator(body: Vec<Stmt>) -> FunctionNode {
    FunctionNode {
        is_generator: true,
        ..function(Some("g"), &[], Vec::new(), body)
    }
}

fn async_function(body: Vec<Stmt>) -> FunctionNode {
    FunctionNode {
        is_async: true,
        ..function(Some("h"), &[], Vec::new(), body)
    }
}

fn compile_function(func: FunctionNode) -> Script {
    let output = compile(&in_function(func));
    nested(&output.script, 0).clone()
}

fn check_is_obj(script: &Script, kind: CheckIsObjectKind) -> usize {
    script
        .code
        .iter()
        .filter(|i| matches!(i, Instruction::CheckIsObj { kind: k } if *k == kind))
        .count()
}

/// Every resume offset sits right behind its suspending instruction
fn assert_resume_points(script: &Script) {
    for &offset in &script.resume_offsets {
        let offset = offset as usize;
        assert!(offset > 0);
        assert!(
            matches!(
                script.code[offset - 1],
                Instruction::InitialYield { .. }
                    | Instruction::Yield { .. }
                    | Instruction::Await { .. }
                    | Instruction::Gosub { .. }
            ),
            "resume offset {offset} follows {}",
            script.code[offset - 1]
        );
    }
}

// ============================================================================
// Generators
// ============================================================================

#[test]
fn test_generator_prologue_and_initial_yield() {
    let g = compile_function(generator(vec![expr_stmt(yield_expr(num(1.0), false))]));

    assert!(g.flags.is_generator);
    assert!(!g.flags.is_async);
    assert_eq!(g.count_of("Generator"), 1);
    assert_eq!(g.count_of("InitialYield"), 1);
    assert_eq!(g.count_of("Yield"), 1);
    assert_eq!(g.count_of("IterResult"), 1);
    assert_eq!(g.count_of("CheckResumeKind"), 2);

    // The generator object is created before any body code runs
    assert!(g.prologue().iter().any(|i| matches!(i, Instruction::Generator)));
    assert_eq!(g.resume_offsets.len(), 2);
    assert_resume_points(&g);
}

#[test]
fn test_yield_star_checks_every_protocol_result() {
    let g = compile_function(generator(vec![expr_stmt(yield_expr(
        call(ident("inner"), vec![]),
        true,
    ))]));

    assert_eq!(check_is_obj(&g, CheckIsObjectKind::IteratorNext), 1);
    assert_eq!(check_is_obj(&g, CheckIsObjectKind::IteratorThrow), 1);
    // return() result, and the close before reporting a missing throw()
    assert_eq!(check_is_obj(&g, CheckIsObjectKind::IteratorReturn), 2);
    assert!(g.code.iter().any(|i| matches!(
        i,
        Instruction::ThrowMsg {
            kind: ThrowMsgKind::IteratorNoThrow
        }
    )));
    // The delegate's results are passed through without re-wrapping
    assert_eq!(g.count_of("IterResult"), 0);
    // InitialYield plus the delegating Yield
    assert_eq!(g.resume_offsets.len(), 2);
    assert_resume_points(&g);
}

#[test]
fn test_forced_return_from_yield_star_runs_finally() {
    // function* g() { try { yield* inner(); } finally { cleanup(); } }
    let body = try_finally(
        vec![expr_stmt(yield_expr(call(ident("inner"), vec![]), true))],
        vec![expr_stmt(call(ident("cleanup"), vec![]))],
    );
    let g = compile_function(generator(vec![body]));

    // Normal completion and both forced returns enter the finally block
    assert_eq!(g.count_of("Gosub"), 3);
    assert_eq!(g.count_of("RetRval"), 3);
    assert_resume_points(&g);
}

#[test]
fn test_return_in_generator() {
    // function* g() { yield 1; return 2; }
    let g = compile_function(generator(vec![
        expr_stmt(yield_expr(num(1.0), false)),
        return_stmt(Some(num(2.0))),
    ]));
    assert_eq!(g.count_of("Return"), 1);
    assert_eq!(g.count_of("RetRval"), 0);
}

// ============================================================================
// Async functions
// ============================================================================

#[test]
fn test_await_suspends_once() {
    let await_p = Expr::new(ExprKind::Await(Box::new(ident("p"))), SP);
    let h = compile_function(async_function(vec![expr_stmt(await_p)]));

    assert!(h.flags.is_async);
    assert_eq!(h.count_of("Generator"), 1);
    assert_eq!(h.count_of("InitialYield"), 0);
    assert_eq!(h.count_of("Await"), 1);
    assert_eq!(h.resume_offsets.len(), 1);
    assert_resume_points(&h);
}

#[test]
fn test_async_generator_awaits_yielded_values() {
    let func = FunctionNode {
        is_generator: true,
        ..async_function(vec![expr_stmt(yield_expr(ident("x"), false))])
    };
    let ag = compile_function(func);
    assert_eq!(ag.count_of("Await"), 1);
    assert_eq!(ag.count_of("Yield"), 1);
    assert_eq!(ag.count_of("IterResult"), 0);
    assert_eq!(ag.resume_offsets.len(), 3);
    assert_resume_points(&ag);
}

#[test]
fn test_for_await_awaits_each_step() {
    let for_await = stmt(StmtKind::ForOf {
        head_scope: Some(ScopeData::new(vec![binding("v", BindingKind::Const, false)])),
        head: ForHead::Decl {
            kind: DeclKind::Const,
            target: pat("v"),
        },
        iterable: ident("stream"),
        body: Box::new(block(None, vec![break_stmt(None)])),
        is_await: true,
    });
    let h = compile_function(async_function(vec![for_await]));

    assert_eq!(h.count_of("GetAsyncIterator"), 1);
    // next() each iteration, return() on break
    assert_eq!(h.count_of("Await"), 2);
    assert_resume_points(&h);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_yield_outside_generator() {
    let func = function(Some("f"), &[], Vec::new(), vec![expr_stmt(yield_expr(num(1.0), false))]);
    let err = try_compile(&in_function(func)).unwrap_err();
    assert!(matches!(err, EmitError::Unsupported(_)));
}
