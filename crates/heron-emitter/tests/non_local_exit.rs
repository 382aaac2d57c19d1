//! Non-local exit tests
//!
//! `break`, `continue` and `return` leaving finally blocks, lexical
//! environments and for-of loops must run every crossed cleanup, innermost
//! first, and leave the stack at the target's depth.

mod common;

use common::*;
use heron_bytecode::{TryNoteKind, iter_close_partner};
use heron_emitter::EmitError;
use heron_emitter::ast::*;

fn notes_of(script: &heron_bytecode::Script, kind: TryNoteKind) -> Vec<heron_bytecode::TryNote> {
    let mut notes: Vec<_> = script
        .try_notes
        .iter()
        .filter(|n| n.kind == kind)
        .copied()
        .collect();
    notes.sort_by_key(|n| n.start);
    notes
}

// ============================================================================
// Finally blocks
// ============================================================================

#[test]
fn test_break_runs_finally_then_pops_block_environment() {
    // for (;;) { let x; try { break; } finally { g(); } }
    let body = block(
        Some(ScopeData::new(vec![binding("x", BindingKind::Let, true)])),
        vec![
            decl(DeclKind::Let, pat("x"), None),
            try_finally(vec![break_stmt(None)], vec![expr_stmt(call(ident("g"), vec![]))]),
        ],
    );
    let output = compile(&script(Vec::new(), vec![for_ever(body)]));
    let script = &output.script;

    assert_eq!(script.count_of("Gosub"), 1);
    assert_eq!(script.count_of("Retsub"), 1);
    assert_eq!(script.count_of("Finally"), 1);
    assert_eq!(notes_of(script, TryNoteKind::Finally).len(), 1);

    let names = names(script);
    let gosub = find_from(&names, 0, "Gosub").unwrap();
    let pop_env = find_from(&names, gosub, "PopLexicalEnv").expect("environment popped after the finally block ran");
    let goto = find_from(&names, pop_env, "Goto").expect("jump to the loop exit");
    assert!(script.jump_target(goto).unwrap() > goto);

    // The finally block returns right after the Gosub
    assert_eq!(script.resume_offsets.len(), 1);
    assert_eq!(script.resume_offsets[0] as usize, gosub + 1);
}

#[test]
fn test_return_runs_finally_blocks_innermost_first() {
    // function f() { try { try { return 1; } finally { a(); } } finally { b(); } }
    let inner = try_finally(
        vec![return_stmt(Some(num(1.0)))],
        vec![expr_stmt(call(ident("a"), vec![]))],
    );
    let outer = try_finally(vec![inner], vec![expr_stmt(call(ident("b"), vec![]))]);
    let output = compile(&in_function(function(Some("f"), &[], Vec::new(), vec![outer])));
    let f = nested(&output.script, 0);

    assert_eq!(f.count_of("Gosub"), 2);
    assert_eq!(f.count_of("SetRval"), 1);
    assert_eq!(f.count_of("Return"), 0);
    assert_eq!(notes_of(f, TryNoteKind::Finally).len(), 2);

    let names = names(f);
    let first = find_from(&names, 0, "Gosub").unwrap();
    let second = find_from(&names, first + 1, "Gosub").unwrap();
    assert!(f.jump_target(first).unwrap() < f.jump_target(second).unwrap());
    let ret = find_from(&names, second, "RetRval").expect("return after both finally blocks");
    assert!(ret > second);
}

#[test]
fn test_plain_return_is_direct() {
    // function f() { while (true) { return 1; } }
    let output = compile(&in_function(function(
        Some("f"),
        &[],
        Vec::new(),
        vec![while_true(vec![return_stmt(Some(num(1.0)))])],
    )));
    let f = nested(&output.script, 0);
    assert_eq!(f.count_of("Return"), 1);
    assert_eq!(f.count_of("SetRval"), 0);
}

#[test]
fn test_return_inside_for_of_closes_iterator() {
    // function f() { for (let v of xs) { return v; } }
    let output = compile(&in_function(function(
        Some("f"),
        &[],
        Vec::new(),
        vec![for_of("v", ident("xs"), vec![return_stmt(Some(ident("v")))])],
    )));
    let f = nested(&output.script, 0);
    assert_eq!(f.count_of("Return"), 0);
    assert_eq!(f.count_of("SetRval"), 1);
    assert_eq!(notes_of(f, TryNoteKind::ForOfIterClose).len(), 1);
    assert_eq!(notes_of(f, TryNoteKind::ForOf).len(), 1);
}

// ============================================================================
// Labeled exits across for-of
// ============================================================================

fn nested_for_of(exit: Stmt) -> Program {
    // outer: for (let v of xs) { try { for (let w of ys) { <exit> } } finally { c(); } }
    let inner = for_of("w", ident("ys"), vec![exit]);
    let guarded = try_finally(vec![inner], vec![expr_stmt(call(ident("c"), vec![]))]);
    script(
        Vec::new(),
        vec![labeled("outer", for_of("v", ident("xs"), vec![guarded]))],
    )
}

#[test]
fn test_labeled_continue_closes_inner_iterator_only() {
    let output = compile(&nested_for_of(continue_stmt(Some("outer"))));
    let script = &output.script;

    let closes = notes_of(script, TryNoteKind::ForOfIterClose);
    assert_eq!(closes.len(), 1);
    let loops = notes_of(script, TryNoteKind::ForOf);
    assert_eq!(loops.len(), 2);
    // The continue and the normal completion of the try block
    assert_eq!(script.count_of("Gosub"), 2);

    // Only the inner iterator (w) is closed
    let (outer, inner) = (loops[0], loops[1]);
    assert!(inner.encloses(&closes[0]));
    assert_eq!(closes[0].depth, inner.depth);
    assert_ne!(closes[0].depth, outer.depth);
    let partner = script
        .try_notes
        .iter()
        .position(|n| *n == closes[0])
        .and_then(|i| iter_close_partner(&script.try_notes, i))
        .unwrap();
    assert_eq!(script.try_notes[partner], inner);

    let names = names(script);
    let gosub = find_from(&names, 0, "Gosub").unwrap();
    assert!((closes[0].start as usize) < gosub);

    // Back to the outer loop head
    let back = find_from(&names, gosub, "Goto").unwrap();
    assert!(script.jump_target(back).unwrap() < back);
}

#[test]
fn test_labeled_break_closes_both_iterators_around_finally() {
    let output = compile(&nested_for_of(break_stmt(Some("outer"))));
    let script = &output.script;

    let closes = notes_of(script, TryNoteKind::ForOfIterClose);
    assert_eq!(closes.len(), 2);
    let names = names(script);
    let gosub = find_from(&names, 0, "Gosub").unwrap();
    assert!((closes[0].start as usize) < gosub);
    assert!((closes[1].start as usize) > gosub);
}

#[test]
fn test_break_closes_iterator_outside_enclosing_catch() {
    // for (let v of xs) { try { break; } catch (e) {} }
    let guarded = try_catch(vec![break_stmt(None)], "e", Vec::new());
    let output = compile(&script(Vec::new(), vec![for_of("v", ident("xs"), vec![guarded])]));
    let script = &output.script;

    let closes = notes_of(script, TryNoteKind::ForOfIterClose);
    let catches = notes_of(script, TryNoteKind::Catch);
    let loops = notes_of(script, TryNoteKind::ForOf);
    assert_eq!((closes.len(), catches.len(), loops.len()), (1, 1, 1));

    // The catch encloses the close, so an exception from return() must
    // unwind past it to the loop
    assert!(catches[0].encloses(&closes[0]));
    let index = script.try_notes.iter().position(|n| *n == closes[0]).unwrap();
    let partner = iter_close_partner(&script.try_notes, index).unwrap();
    assert_eq!(script.try_notes[partner], loops[0]);
    let catch = script.try_notes.iter().position(|n| *n == catches[0]).unwrap();
    assert!(index < catch && catch < partner);
}

#[test]
fn test_break_out_of_finally_block() {
    // while (true) { try { f(); } finally { break; } }
    let body = try_finally(vec![expr_stmt(call(ident("f"), vec![]))], vec![break_stmt(None)]);
    let output = compile(&script(Vec::new(), vec![while_true(vec![body])]));
    // Normal completion enters the finally block once; the break drops
    // the two values the block runs with
    assert_eq!(output.script.count_of("Gosub"), 1);
    assert_eq!(output.script.count_of("Retsub"), 0);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_break_without_target() {
    let err = try_compile(&script(Vec::new(), vec![break_stmt(None)])).unwrap_err();
    assert!(matches!(err, EmitError::NoBreakTarget { label: None, .. }));
}

#[test]
fn test_break_unknown_label() {
    let program = script(Vec::new(), vec![while_true(vec![break_stmt(Some("nowhere"))])]);
    let err = try_compile(&program).unwrap_err();
    assert_eq!(
        err,
        EmitError::NoBreakTarget {
            label: Some("nowhere".to_string()),
            span: SP,
        }
    );
}

#[test]
fn test_continue_to_labeled_block() {
    // l: { while (true) { continue l; } }
    let program = script(
        Vec::new(),
        vec![labeled(
            "l",
            block(None, vec![while_true(vec![continue_stmt(Some("l"))])]),
        )],
    );
    let err = try_compile(&program).unwrap_err();
    assert!(matches!(err, EmitError::ContinueToNonLoop { ref label, .. } if label == "l"));
    assert!(err.to_string().contains("does not denote a loop"));
}

#[test]
fn test_continue_outside_loop() {
    let err = try_compile(&script(Vec::new(), vec![continue_stmt(None)])).unwrap_err();
    assert!(matches!(err, EmitError::NoContinueTarget { label: None, .. }));
}
