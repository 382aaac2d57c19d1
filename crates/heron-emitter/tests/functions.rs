//! Function, lazy compilation and top-level unit tests

mod common;

use std::rc::Rc;

use common::*;
use heron_bytecode::{
    FunctionRecord, Instruction, ScriptKind, SrcNoteKind, verify_stack_depths,
};
use heron_emitter::ast::*;
use heron_emitter::{Compiler, EmitError, EmitterConfig, WarningKind};

fn lazy(func: FunctionNode) -> FunctionNode {
    FunctionNode { lazy: true, ..func }
}

// ============================================================================
// Lazy functions
// ============================================================================

#[test]
fn test_lazy_placeholder_then_compile_on_demand() {
    // var f = function (x) { return x; };
    let func = lazy(function(None, &["x"], Vec::new(), vec![return_stmt(Some(ident("x")))]));
    let program = script(
        vec![binding("f", BindingKind::Var, false)],
        vec![decl(DeclKind::Var, pat("f"), Some(function_expr(func)))],
    );
    let config = EmitterConfig::new().with_lazy_functions(true);
    let output = compile_with(config, &program);

    let FunctionRecord::Lazy(placeholder) = &output.script.functions[0] else {
        panic!("expected a lazy placeholder");
    };
    assert_eq!(placeholder.param_count, 1);
    assert_eq!(placeholder.end.column, 40);
    assert_eq!(output.lazy.len(), 1);
    assert_eq!(output.lazy[0].path, vec![0]);

    let compiled = Compiler::with_config(config)
        .compile_lazy(&output.lazy[0])
        .unwrap();
    verify_tree(&compiled.script);
    assert_eq!(compiled.script.kind, ScriptKind::Function);
    assert!(
        compiled
            .script
            .code
            .iter()
            .any(|i| matches!(i, Instruction::GetArg { index: 0 }))
    );
    assert_eq!(compiled.script.count_of("Return"), 1);
}

#[test]
fn test_lazy_function_resolves_enclosing_bindings() {
    // function outer() { let y = 1; return function () { return y; }; }
    let inner = lazy(function(None, &[], Vec::new(), vec![return_stmt(Some(ident("y")))]));
    let outer = function(
        Some("outer"),
        &[],
        vec![binding("y", BindingKind::Let, true)],
        vec![
            decl(DeclKind::Let, pat("y"), Some(num(1.0))),
            return_stmt(Some(function_expr(inner))),
        ],
    );
    let program = script(
        vec![binding("outer", BindingKind::Function, false)],
        vec![stmt(StmtKind::FunctionDecl(Rc::new(outer)))],
    );
    let config = EmitterConfig::new().with_lazy_functions(true);
    let output = compile_with(config, &program);

    // outer is named, so only the anonymous inner function is deferred
    let outer = nested(&output.script, 0);
    assert!(outer.functions[0].is_lazy());
    assert_eq!(output.lazy.len(), 1);
    assert_eq!(output.lazy[0].path, vec![0, 0]);

    let compiled = Compiler::with_config(config)
        .compile_lazy(&output.lazy[0])
        .unwrap();
    verify_tree(&compiled.script);
    // y lives in outer's environment and is read through the scope chain,
    // with a dead-zone check since nothing proves it initialized
    assert_eq!(compiled.script.count_of("CheckAliasedLexical"), 1);
    assert_eq!(compiled.script.count_of("GetAliasedVar"), 1);
}

#[test]
fn test_lazy_placeholder_survives_serialization() {
    let func = lazy(function(None, &["x"], Vec::new(), Vec::new()));
    let output = compile_with(
        EmitterConfig::new().with_lazy_functions(true),
        &in_function(func),
    );
    let json = output.script.to_json().unwrap();
    let restored: heron_bytecode::Script = serde_json::from_str(&json).unwrap();
    assert!(restored.functions[0].is_lazy());
    assert_eq!(restored, output.script);
}

#[test]
fn test_lazy_disabled_compiles_eagerly() {
    let func = lazy(function(None, &[], Vec::new(), Vec::new()));
    let output = compile(&in_function(func));
    assert!(output.lazy.is_empty());
    assert!(!output.script.functions[0].is_lazy());
}

// ============================================================================
// Hoisting
// ============================================================================

#[test]
fn test_top_level_function_is_defined_once() {
    let top = function(Some("top"), &[], Vec::new(), Vec::new());
    let program = script(
        vec![binding("top", BindingKind::Function, false)],
        vec![
            expr_stmt(call(ident("top"), vec![])),
            stmt(StmtKind::FunctionDecl(Rc::new(top))),
        ],
    );
    let output = compile(&program);
    assert_eq!(output.script.count_of("Lambda"), 1);
    assert_eq!(output.script.count_of("DefFun"), 1);

    // Hoisted above the call that precedes it in the source
    let names = names(&output.script);
    let def = find_from(&names, 0, "DefFun").unwrap();
    let call = find_from(&names, 0, "CallIgnoresRv").unwrap();
    assert!(def < call);
}

fn block_function(strict: bool) -> Program {
    // { function h() {} }
    let h = function(Some("h"), &[], Vec::new(), Vec::new());
    Program {
        strict,
        ..script(
            vec![binding("h", BindingKind::Var, false)],
            vec![block(
                Some(ScopeData::new(vec![binding("h", BindingKind::Function, false)])),
                vec![stmt(StmtKind::FunctionDecl(Rc::new(h)))],
            )],
        )
    }
}

#[test]
fn test_sloppy_block_function_copies_to_var_binding() {
    let output = compile(&block_function(false));
    let script = &output.script;
    // One closure, created when the block is entered
    assert_eq!(script.count_of("Lambda"), 1);
    // At the declaration the block binding is copied to the global var
    assert_eq!(script.count_of("SetGName"), 1);
    let names = names(script);
    let lambda = find_from(&names, 0, "Lambda").unwrap();
    assert!(find_from(&names, 0, "SetGName").unwrap() > lambda);
}

#[test]
fn test_strict_block_function_stays_in_block() {
    let output = compile(&block_function(true));
    assert_eq!(output.script.count_of("Lambda"), 1);
    assert_eq!(output.script.count_of("SetGName"), 0);
}

// ============================================================================
// Parameters
// ============================================================================

#[test]
fn test_captured_parameter_moves_to_environment() {
    // function f(x) { return function () { return x; }; }
    let inner = function(None, &[], Vec::new(), vec![return_stmt(Some(ident("x")))]);
    let mut outer = function(Some("f"), &["x"], Vec::new(), vec![return_stmt(Some(function_expr(inner)))]);
    outer.scope = ScopeData::new(vec![binding("x", BindingKind::Parameter, true)]);
    let output = compile(&in_function(outer));
    let f = nested(&output.script, 0);

    let prologue: Vec<&str> = f.prologue().iter().map(|i| i.name()).collect();
    assert_eq!(prologue, ["PushVarEnv", "GetArg", "SetAliasedVar", "Pop"]);
    assert_eq!(nested(f, 0).count_of("GetAliasedVar"), 1);
}

#[test]
fn test_default_and_pattern_parameters() {
    // function f(a = 1, { b }) {}
    let mut func = function(
        Some("f"),
        &[],
        vec![
            binding("a", BindingKind::Parameter, false),
            binding("b", BindingKind::Parameter, false),
        ],
        Vec::new(),
    );
    func.params = vec![
        Param {
            target: pat("a"),
            default: Some(num(1.0)),
        },
        Param {
            target: object_pattern(&["b"], None),
            default: None,
        },
    ];
    let output = compile(&in_function(func));
    let f = nested(&output.script, 0);

    assert!(f.flags.has_parameter_expressions);
    assert_eq!(f.formal_count, 2);
    assert_eq!(f.param_count, 0);
    assert_eq!(f.count_of("GetArg"), 2);
    assert_eq!(f.count_of("CheckObjCoercible"), 1);
}

#[test]
fn test_rest_parameter() {
    let mut func = function(
        Some("f"),
        &[],
        vec![binding("rest", BindingKind::Parameter, false)],
        Vec::new(),
    );
    func.rest = Some(pat("rest"));
    let output = compile(&in_function(func));
    let f = nested(&output.script, 0);
    assert!(f.flags.has_rest);
    assert_eq!(f.count_of("Rest"), 1);
}

#[test]
fn test_named_function_expression_binds_callee() {
    let mut func = function(Some("fact"), &["n"], Vec::new(), Vec::new());
    func.scope
        .bindings
        .push(binding("fact", BindingKind::Synthetic, false));
    let output = compile(&in_function(func));
    let f = nested(&output.script, 0);
    assert!(f.prologue().iter().any(|i| matches!(i, Instruction::Callee)));
}

#[test]
fn test_too_many_parameters() {
    let func = function(Some("f"), &["a", "b"], Vec::new(), Vec::new());
    let compiler = Compiler::with_config(EmitterConfig::new().with_max_parameters(1));
    let err = compiler.compile(&in_function(func)).unwrap_err();
    assert_eq!(err, EmitError::TooManyParameters { count: 2, max: 1 });
}

#[test]
fn test_arrow_with_expression_body() {
    let arrow = FunctionNode {
        kind: FunctionKind::Arrow,
        body: FunctionBody::Expr(Box::new(binary(BinaryOp::Add, ident("a"), num(1.0)))),
        ..function(None, &["a"], Vec::new(), Vec::new())
    };
    let program = script(
        Vec::new(),
        vec![expr_stmt(Expr::new(ExprKind::Arrow(Rc::new(arrow)), SP))],
    );
    let output = compile(&program);
    let f = nested(&output.script, 0);
    assert!(f.flags.is_arrow);
    assert_eq!(f.count_of("Return"), 1);
    assert_eq!(f.count_of("RetRval"), 0);
}

// ============================================================================
// Top-level units
// ============================================================================

#[test]
fn test_eval_code_keeps_completion_value() {
    let program = Program {
        kind: ProgramKind::Eval,
        ..script(Vec::new(), vec![expr_stmt(num(1.0)), expr_stmt(num(2.0))])
    };
    let output = compile(&program);
    let script = &output.script;
    assert_eq!(script.kind, ScriptKind::Eval);
    assert_eq!(script.count_of("SetRval"), 2);
    let prologue: Vec<&str> = script.prologue().iter().map(|i| i.name()).collect();
    assert_eq!(prologue, ["PushVarEnv", "GlobalOrEvalDeclInstantiation"]);
    // No useless-expression warnings: the values are the completion value
    assert!(output.warnings.is_empty());
}

#[test]
fn test_useless_expression_warning() {
    let output = compile(&script(Vec::new(), vec![expr_stmt(num(1.0))]));
    assert_eq!(output.warnings.len(), 1);
    assert_eq!(output.warnings[0].kind, WarningKind::UselessExpression);
}

#[test]
fn test_conflicting_directive_warning_reaches_output() {
    let mut func = function(Some("f"), &[], vec![binding("a", BindingKind::Parameter, false)], vec![
        stmt(StmtKind::Directive("use strict".into())),
    ]);
    func.params = vec![Param {
        target: pat("a"),
        default: Some(num(0.0)),
    }];
    let program = script(
        vec![binding("f", BindingKind::Function, false)],
        vec![stmt(StmtKind::FunctionDecl(Rc::new(func)))],
    );
    let output = compile(&program);
    assert!(
        output
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::ConflictingDirective)
    );
}

#[test]
fn test_code_length_limit() {
    let body = (0..20).map(|_| expr_stmt(call(ident("f"), vec![]))).collect();
    let compiler = Compiler::with_config(EmitterConfig::new().with_max_code_length(16));
    let err = compiler.compile(&script(Vec::new(), body)).unwrap_err();
    assert_eq!(err, EmitError::CodeTooLong { max: 16 });
}

// ============================================================================
// Source notes
// ============================================================================

#[test]
fn test_line_notes_and_loop_note() {
    let on_line = |line, kind| Stmt::new(kind, Span::new(line, 0));
    let program = script(
        Vec::new(),
        vec![
            on_line(1, StmtKind::Expr(call(ident("a"), vec![]))),
            on_line(2, StmtKind::Expr(call(ident("b"), vec![]))),
            on_line(
                5,
                StmtKind::While {
                    test: ident("c"),
                    body: Box::new(block(None, Vec::new())),
                },
            ),
        ],
    );
    let output = compile(&program);
    let notes: Vec<SrcNoteKind> = output.script.source_notes.iter().map(|(_, k)| k).collect();

    assert!(notes.iter().any(|k| matches!(k, SrcNoteKind::NewLine)));
    assert!(notes.iter().any(|k| matches!(k, SrcNoteKind::SetLine { line: 5 })));
    assert_eq!(
        notes.iter().filter(|k| matches!(k, SrcNoteKind::Breakpoint)).count(),
        3
    );
    assert!(
        notes
            .iter()
            .any(|k| matches!(k, SrcNoteKind::Loop { back_jump } if *back_jump > 0))
    );
    verify_stack_depths(&output.script).unwrap();
}

#[test]
fn test_loop_that_cannot_repeat_has_no_back_jump() {
    // for (;;) { break; }  do { break; } while (c);
    let program = script(
        Vec::new(),
        vec![
            for_ever(block(None, vec![break_stmt(None)])),
            stmt(StmtKind::DoWhile {
                body: Box::new(block(None, vec![break_stmt(None)])),
                test: ident("c"),
            }),
        ],
    );
    let output = compile(&program);
    let script = &output.script;

    let backward = (0..script.code.len())
        .filter(|&offset| script.jump_target(offset).is_some_and(|target| target <= offset))
        .count();
    assert_eq!(backward, 0, "{}", script.disassemble());
    assert!(
        script
            .source_notes
            .iter()
            .all(|(_, k)| !matches!(k, SrcNoteKind::Loop { back_jump } if back_jump > 0))
    );
}

#[test]
fn test_source_notes_disabled() {
    let program = script(Vec::new(), vec![expr_stmt(call(ident("a"), vec![]))]);
    let output = compile_with(EmitterConfig::new().with_source_notes(false), &program);
    assert!(output.script.source_notes.is_empty());
}
