//! Class emitter
//!
//! ```text
//! PushLexicalEnv                      class scope: inner name, #fieldKeys,
//!                                     #instanceFields
//! [heritage]
//! Class ctor                          [ctor proto]
//! NewArray n; set #fieldKeys; Pop     computed field keys, evaluated once
//! members in source order             methods on proto/ctor, keys into the array
//! Lambda init; set #instanceFields    instance field initializer
//! Pop                                 [ctor]
//! set inner name
//! Lambda static; Call 0; Pop          static field initializer, run once
//! PopLexicalEnv
//! ```
//!
//! Constructors replay `#instanceFields` on entry (base classes) or after
//! every `super(...)` (derived classes).

use std::rc::Rc;

use heron_bytecode::{
    BindingKind, FunctionIndex, FunctionPrefixKind, Instruction, ScopeKind, ScriptFlags,
    ScriptKind,
};

use crate::ast::{
    Argument, BindingDecl, ClassField, ClassMember, ClassNode, Expr, ExprKind, FunctionBody,
    FunctionKind, FunctionNode, Pattern, PropKey, ScopeData, Stmt, StmtKind,
};
use crate::emitter::{Emitter, Flavor};
use crate::error::{EmitError, EmitResult};
use crate::expr::is_anonymous_function;
use crate::function::FunctionContext;

const FIELD_KEYS: &str = "#fieldKeys";
const INSTANCE_FIELDS: &str = "#instanceFields";

/// A field with the slot of its computed key in `#fieldKeys`
#[derive(Debug, Clone, Copy)]
struct FieldEntry<'a> {
    field: &'a ClassField,
    key_index: Option<u32>,
}

/// Bindings of the class scope
fn class_scope(class: &ClassNode, has_computed_fields: bool, has_instance_fields: bool) -> ScopeData {
    let mut bindings = Vec::new();
    if let Some(name) = &class.name {
        bindings.push(BindingDecl::new(name, BindingKind::Const, true));
    }
    if has_computed_fields {
        bindings.push(BindingDecl::new(FIELD_KEYS, BindingKind::Synthetic, true));
    }
    if has_instance_fields {
        bindings.push(BindingDecl::new(INSTANCE_FIELDS, BindingKind::Synthetic, true));
    }
    ScopeData::new(bindings)
}

/// `constructor() {}` or `constructor(...args) { super(...args); }`
fn default_constructor(class: &ClassNode) -> FunctionNode {
    let derived = class.heritage.is_some();
    let span = class.span;
    let (rest, scope, body) = if derived {
        let args = Expr::ident("args", span);
        let super_call = Expr::new(ExprKind::SuperCall(vec![Argument::Spread(args)]), span);
        (
            Some(Pattern::ident("args", span)),
            ScopeData::new(vec![BindingDecl::new("args", BindingKind::Parameter, false)]),
            vec![Stmt::new(StmtKind::Expr(super_call), span)],
        )
    } else {
        (None, ScopeData::default(), Vec::new())
    };
    FunctionNode {
        name: class.name.clone(),
        kind: FunctionKind::ClassConstructor,
        is_generator: false,
        is_async: false,
        strict: true,
        params: Vec::new(),
        rest,
        scope,
        body_scope: None,
        body: FunctionBody::Block(body),
        has_direct_eval: false,
        lazy: false,
        span,
        end: class.end,
    }
}

impl Emitter {
    /// `[] -> [ctor]`
    pub(crate) fn emit_class(&mut self, class: &ClassNode) -> EmitResult<()> {
        let mut next_key = 0u32;
        let mut instance_fields = Vec::new();
        let mut static_fields = Vec::new();
        for member in &class.members {
            if let ClassMember::Field(field) = member {
                let key_index = matches!(field.key, PropKey::Computed(_)).then(|| {
                    next_key += 1;
                    next_key - 1
                });
                let entry = FieldEntry { field, key_index };
                if field.is_static {
                    static_fields.push(entry);
                } else {
                    instance_fields.push(entry);
                }
            }
        }
        let computed_keys = next_key;
        let derived = class.heritage.is_some();

        let data = class_scope(class, computed_keys > 0, !instance_fields.is_empty());
        let scope = self.enter_optional_scope(ScopeKind::Block, Some(&data))?;

        if let Some(heritage) = &class.heritage {
            self.emit_expr(heritage)?;
        }
        let synthesized;
        let constructor = match &class.constructor {
            Some(ctor) => ctor,
            None => {
                synthesized = Rc::new(default_constructor(class));
                &synthesized
            }
        };
        let context = FunctionContext {
            name: class.name.clone(),
            derived,
            runs_field_initializer: !instance_fields.is_empty(),
        };
        let func = self.add_function(constructor, &context)?;
        self.emit(Instruction::Class { func, derived })?;

        // [ctor proto]
        if computed_keys > 0 {
            self.emit(Instruction::NewArray {
                length: computed_keys,
            })?;
            self.emit_set_name(FIELD_KEYS, Flavor::Initialize)?;
            self.emit(Instruction::Pop)?;
        }

        let mut next_key = 0u32;
        for member in &class.members {
            match member {
                ClassMember::Method {
                    key,
                    kind,
                    is_static,
                    func,
                } => {
                    if *is_static {
                        self.emit(Instruction::Swap)?;
                    }
                    self.emit_method(key, *kind, func, 1)?;
                    if *is_static {
                        self.emit(Instruction::Swap)?;
                    }
                }
                ClassMember::Field(ClassField {
                    key: PropKey::Computed(key),
                    ..
                }) => {
                    self.emit_get_name(FIELD_KEYS)?;
                    self.emit_expr(key)?;
                    self.emit_all(&[
                        Instruction::ToPropertyKey,
                        Instruction::InitElemArray { index: next_key },
                        Instruction::Pop,
                    ])?;
                    next_key += 1;
                }
                ClassMember::Field(_) => {}
            }
        }

        if !instance_fields.is_empty() {
            let init = self.add_field_initializer(&instance_fields, class)?;
            self.emit_all(&[
                Instruction::Lambda { func: init },
                Instruction::DupAt { n: 1 },
                Instruction::InitHomeObject,
            ])?;
            self.emit_set_name(INSTANCE_FIELDS, Flavor::Initialize)?;
            self.emit(Instruction::Pop)?;
        }

        // [ctor]
        self.emit(Instruction::Pop)?;
        if let Some(name) = &class.name {
            self.emit_set_name(name, Flavor::Initialize)?;
        }

        if !static_fields.is_empty() {
            let init = self.add_field_initializer(&static_fields, class)?;
            self.emit_all(&[
                Instruction::Lambda { func: init },
                Instruction::DupAt { n: 1 },
                Instruction::InitHomeObject,
                Instruction::DupAt { n: 1 },
                Instruction::Call { argc: 0 },
                Instruction::Pop,
            ])?;
        }

        self.leave_optional_scope(scope)
    }

    /// Compile a class declaration
    pub(crate) fn emit_class_decl(&mut self, class: &ClassNode) -> EmitResult<()> {
        let Some(name) = &class.name else {
            return Err(EmitError::unsupported("class declaration without a name"));
        };
        self.emit_class(class)?;
        self.emit_set_name(name, Flavor::Initialize)?;
        self.emit(Instruction::Pop)?;
        Ok(())
    }

    /// `[this] -> [this]`: define the instance fields on `this`
    pub(crate) fn emit_run_field_initializer(&mut self) -> EmitResult<()> {
        self.emit_get_name(INSTANCE_FIELDS)?;
        self.emit_all(&[
            Instruction::DupAt { n: 1 },
            Instruction::Call { argc: 0 },
            Instruction::Pop,
        ])
    }

    /// Compile a hidden method that defines `fields` on its receiver
    fn add_field_initializer(
        &mut self,
        fields: &[FieldEntry<'_>],
        class: &ClassNode,
    ) -> EmitResult<FunctionIndex> {
        let mut em = Emitter::new_unit(
            self.config,
            self.scopes.snapshot(),
            self.next_function_path(),
            class.span,
        );
        em.unit.kind = ScriptKind::Function;
        em.unit.flags = ScriptFlags {
            is_strict: true,
            is_method: true,
            ..ScriptFlags::default()
        };
        let scope = em.scopes.enter(ScopeKind::Function, &[], &[], None)?;

        for entry in fields {
            let field = entry.field;
            em.position(field.span);
            em.emit(Instruction::FunctionThis)?;
            match (&field.key, entry.key_index) {
                (PropKey::Named(name), _) => {
                    em.emit_field_value(field.value.as_ref(), Some(name))?;
                    let name = em.atom(name)?;
                    em.emit(Instruction::InitProp { name })?;
                }
                (PropKey::Computed(_), Some(index)) => {
                    em.emit_get_name(FIELD_KEYS)?;
                    em.emit_all(&[
                        Instruction::Int32 {
                            value: index as i32,
                        },
                        Instruction::GetElem,
                    ])?;
                    em.emit_field_value(field.value.as_ref(), None)?;
                    if field.value.as_ref().is_some_and(is_anonymous_function) {
                        em.emit_all(&[
                            Instruction::DupAt { n: 1 },
                            Instruction::SetFunName {
                                prefix: FunctionPrefixKind::None,
                            },
                        ])?;
                    }
                    em.emit(Instruction::InitElem)?;
                }
                (PropKey::Computed(_), None) => {
                    return Err(EmitError::unsupported("computed field without a key slot"));
                }
            }
            em.emit(Instruction::Pop)?;
        }
        em.emit(Instruction::RetRval)?;
        em.leave_scope(scope)?;

        let output = em.finish()?;
        Ok(self.add_compiled_function(output))
    }

    fn emit_field_value(&mut self, value: Option<&Expr>, name: Option<&str>) -> EmitResult<()> {
        match value {
            Some(value) => self.emit_named_expr(value, name),
            None => {
                self.emit(Instruction::Undefined)?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;

    fn class(heritage: bool) -> ClassNode {
        ClassNode {
            name: Some("C".into()),
            heritage: heritage.then(|| Box::new(Expr::ident("Base", Span::default()))),
            constructor: None,
            members: Vec::new(),
            span: Span::new(1, 0),
            end: Span::new(1, 10),
        }
    }

    #[test]
    fn test_default_constructor_shapes() {
        let base = default_constructor(&class(false));
        assert!(base.rest.is_none());
        assert!(matches!(&base.body, FunctionBody::Block(body) if body.is_empty()));

        let derived = default_constructor(&class(true));
        assert!(derived.rest.is_some());
        assert!(!derived.has_simple_params());
        let FunctionBody::Block(body) = &derived.body else {
            panic!("expected a block body");
        };
        assert!(matches!(
            &body[0].kind,
            StmtKind::Expr(Expr {
                kind: ExprKind::SuperCall(_),
                ..
            })
        ));
    }

    #[test]
    fn test_class_scope_bindings() {
        let scope = class_scope(&class(false), true, false);
        let names: Vec<&str> = scope.bindings.iter().map(|b| &*b.name).collect();
        assert_eq!(names, ["C", FIELD_KEYS]);
        assert!(scope.bindings.iter().all(|b| b.closed_over));
    }
}
