//! Input tree
//!
//! The parser and binder are external; they hand the emitter a tree of these
//! nodes. Every scope-introducing node carries the binder's [`ScopeData`]
//! (binding names, declaration kinds and whether a closure captures them),
//! which is all the emitter needs to classify identifier references.

use std::rc::Rc;

pub use heron_bytecode::BindingKind;

/// Interned-style name
pub type Atom = Rc<str>;

/// Source position of a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Span {
    /// Line (1-based)
    pub line: u32,
    /// Column (0-based)
    pub column: u32,
}

impl Span {
    /// Create a span
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A binding declared in a scope, as classified by the binder
#[derive(Debug, Clone, PartialEq)]
pub struct BindingDecl {
    /// Name
    pub name: Atom,
    /// Declaration kind
    pub kind: BindingKind,
    /// Captured by a nested function (or otherwise needs an environment slot)
    pub closed_over: bool,
}

impl BindingDecl {
    /// Create a binding declaration
    pub fn new(name: &str, kind: BindingKind, closed_over: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            closed_over,
        }
    }
}

/// Bindings of one scope, in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeData {
    /// Bindings
    pub bindings: Vec<BindingDecl>,
}

impl ScopeData {
    /// Create scope data from bindings
    pub fn new(bindings: Vec<BindingDecl>) -> Self {
        Self { bindings }
    }

    /// Whether the scope declares nothing
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Kind of top-level unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramKind {
    /// Classic script
    Script,
    /// Module
    Module,
    /// Direct or indirect eval code
    Eval,
}

/// Top-level unit
#[derive(Debug, Clone)]
pub struct Program {
    /// Unit kind
    pub kind: ProgramKind,
    /// Strict mode code
    pub strict: bool,
    /// Top-level bindings
    pub scope: ScopeData,
    /// Statements
    pub body: Vec<Stmt>,
    /// Start of the unit
    pub span: Span,
}

/// Statement with its source position
#[derive(Debug, Clone)]
pub struct Stmt {
    /// Statement shape
    pub kind: StmtKind,
    /// Source position
    pub span: Span,
}

/// Statement shapes
#[derive(Debug, Clone)]
pub enum StmtKind {
    /// Expression statement
    Expr(Expr),
    /// Directive prologue entry (`"use strict"`)
    Directive(Atom),
    /// `var`/`let`/`const` declaration
    VarDecl(VarDecl),
    /// Function declaration
    FunctionDecl(Rc<FunctionNode>),
    /// Class declaration
    ClassDecl(Rc<ClassNode>),
    /// Block statement
    Block(Block),
    /// `if`
    If {
        /// Condition
        test: Expr,
        /// Then branch
        consequent: Box<Stmt>,
        /// Else branch
        alternate: Option<Box<Stmt>>,
    },
    /// `while`
    While {
        /// Condition
        test: Expr,
        /// Body
        body: Box<Stmt>,
    },
    /// `do ... while`
    DoWhile {
        /// Body
        body: Box<Stmt>,
        /// Condition
        test: Expr,
    },
    /// C-style `for`
    For {
        /// Scope of `let`/`const` declared in the head
        head_scope: Option<ScopeData>,
        /// Initializer
        init: Option<ForInit>,
        /// Condition
        test: Option<Expr>,
        /// Update
        update: Option<Expr>,
        /// Body
        body: Box<Stmt>,
    },
    /// `for (x in obj)`
    ForIn {
        /// Scope of a lexical declaration in the head
        head_scope: Option<ScopeData>,
        /// Loop variable
        head: ForHead,
        /// Enumerated object
        object: Expr,
        /// Body
        body: Box<Stmt>,
    },
    /// `for (x of iterable)` / `for await (...)`
    ForOf {
        /// Scope of a lexical declaration in the head
        head_scope: Option<ScopeData>,
        /// Loop variable
        head: ForHead,
        /// Iterated value
        iterable: Expr,
        /// Body
        body: Box<Stmt>,
        /// `for await`
        is_await: bool,
    },
    /// `break [label]`
    Break(Option<Atom>),
    /// `continue [label]`
    Continue(Option<Atom>),
    /// `return [expr]`
    Return(Option<Expr>),
    /// `throw expr`
    Throw(Expr),
    /// `try` statement
    Try {
        /// Protected block
        block: Block,
        /// Catch clause
        handler: Option<CatchClause>,
        /// Finally block
        finalizer: Option<Block>,
    },
    /// `switch`
    Switch {
        /// Switch value
        discriminant: Expr,
        /// Lexical scope of the case bodies
        scope: Option<ScopeData>,
        /// Cases in source order
        cases: Vec<SwitchCase>,
    },
    /// `label: stmt`
    Labeled {
        /// Label
        label: Atom,
        /// Labeled statement
        body: Box<Stmt>,
    },
    /// `with (obj) stmt`
    With {
        /// Scope object
        object: Expr,
        /// Body
        body: Box<Stmt>,
    },
    /// `debugger`
    Debugger,
    /// `;`
    Empty,
}

/// Braced statement list with its lexical scope
#[derive(Debug, Clone, Default)]
pub struct Block {
    /// Lexical declarations of the block
    pub scope: Option<ScopeData>,
    /// Statements
    pub body: Vec<Stmt>,
}

/// Declaration kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    /// `var`
    Var,
    /// `let`
    Let,
    /// `const`
    Const,
}

/// Variable declaration
#[derive(Debug, Clone)]
pub struct VarDecl {
    /// Declaration kind
    pub kind: DeclKind,
    /// Declarators
    pub declarators: Vec<Declarator>,
}

/// One `target = init` of a declaration
#[derive(Debug, Clone)]
pub struct Declarator {
    /// Bound pattern
    pub target: Pattern,
    /// Initializer
    pub init: Option<Expr>,
}

/// Initializer of a C-style `for`
#[derive(Debug, Clone)]
pub enum ForInit {
    /// Declaration
    VarDecl(VarDecl),
    /// Expression
    Expr(Expr),
}

/// Loop variable of `for-in`/`for-of`
#[derive(Debug, Clone)]
pub enum ForHead {
    /// `for (let x of ...)`
    Decl {
        /// Declaration kind
        kind: DeclKind,
        /// Bound pattern
        target: Pattern,
    },
    /// `for (x of ...)` with an assignment target
    Target(Pattern),
}

/// Catch clause
#[derive(Debug, Clone)]
pub struct CatchClause {
    /// Catch parameter
    pub param: Option<Pattern>,
    /// Parameter scope
    pub scope: ScopeData,
    /// Handler body
    pub body: Block,
}

/// `case test:` or `default:`
#[derive(Debug, Clone)]
pub struct SwitchCase {
    /// Case value, `None` for `default`
    pub test: Option<Expr>,
    /// Statements
    pub body: Vec<Stmt>,
}

/// Expression with its source position
#[derive(Debug, Clone)]
pub struct Expr {
    /// Expression shape
    pub kind: ExprKind,
    /// Source position
    pub span: Span,
}

/// Identifier reference
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    /// Name
    pub name: Atom,
    /// Source position
    pub span: Span,
}

/// Expression shapes
#[derive(Debug, Clone)]
pub enum ExprKind {
    /// Number literal
    Number(f64),
    /// String literal
    String(Atom),
    /// BigInt literal
    BigInt(Atom),
    /// `true`/`false`
    Bool(bool),
    /// `null`
    Null,
    /// `undefined` literal produced by the binder for elided values
    Undefined,
    /// Regular expression literal
    RegExp {
        /// Pattern
        pattern: Atom,
        /// Flags
        flags: Atom,
    },
    /// Untagged template literal
    Template {
        /// Cooked string parts, one more than `exprs`
        quasis: Vec<Atom>,
        /// Substitutions
        exprs: Vec<Expr>,
    },
    /// Tagged template
    TaggedTemplate {
        /// Tag function
        tag: Box<Expr>,
        /// Raw strings
        raw: Vec<Atom>,
        /// Cooked strings
        cooked: Vec<Option<Atom>>,
        /// Substitutions
        exprs: Vec<Expr>,
    },
    /// Identifier reference
    Ident(Ident),
    /// `this`
    This,
    /// `new.target`
    NewTarget,
    /// Array literal
    Array(Vec<ArrayElement>),
    /// Object literal
    Object(Vec<Property>),
    /// Function expression
    Function(Rc<FunctionNode>),
    /// Arrow function
    Arrow(Rc<FunctionNode>),
    /// Class expression
    Class(Rc<ClassNode>),
    /// Unary operator
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        argument: Box<Expr>,
    },
    /// `++`/`--`
    Update {
        /// Operator
        op: UpdateOp,
        /// Prefix form
        prefix: bool,
        /// Updated reference
        target: Box<Expr>,
    },
    /// Binary operator
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// Short-circuiting operator
    Logical {
        /// Operator
        op: LogicalOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// Assignment, compound assignment or destructuring assignment
    Assign {
        /// Operator
        op: AssignOp,
        /// Target
        target: Box<Pattern>,
        /// Assigned value
        value: Box<Expr>,
    },
    /// `test ? consequent : alternate`
    Conditional {
        /// Condition
        test: Box<Expr>,
        /// Value when truthy
        consequent: Box<Expr>,
        /// Value when falsy
        alternate: Box<Expr>,
    },
    /// Call
    Call {
        /// Callee
        callee: Box<Expr>,
        /// Arguments
        args: Vec<Argument>,
    },
    /// `new`
    New {
        /// Constructor
        callee: Box<Expr>,
        /// Arguments
        args: Vec<Argument>,
    },
    /// `super(...)`
    SuperCall(Vec<Argument>),
    /// Property access
    Member {
        /// Object
        object: Box<Expr>,
        /// Property
        property: MemberProp,
    },
    /// Comma expression
    Sequence(Vec<Expr>),
    /// `yield`/`yield*`
    Yield {
        /// Operand
        argument: Option<Box<Expr>>,
        /// `yield*`
        delegate: bool,
    },
    /// `await`
    Await(Box<Expr>),
    /// Legacy array comprehension `[for (x of xs) if (c) body]`
    Comprehension(Box<Comprehension>),
}

/// Legacy array comprehension
#[derive(Debug, Clone)]
pub struct Comprehension {
    /// Per-iteration scope holding the loop variable
    pub scope: ScopeData,
    /// Loop variable
    pub binding: Ident,
    /// Iterated value
    pub iterable: Expr,
    /// Optional filter
    pub filter: Option<Expr>,
    /// Element expression
    pub body: Expr,
}

/// Property of a member expression
#[derive(Debug, Clone)]
pub enum MemberProp {
    /// `obj.name`
    Named(Atom),
    /// `obj[expr]`
    Computed(Box<Expr>),
}

/// Element of an array literal
#[derive(Debug, Clone)]
pub enum ArrayElement {
    /// Plain element
    Expr(Expr),
    /// `...expr`
    Spread(Expr),
    /// Elision
    Hole,
}

/// Call argument
#[derive(Debug, Clone)]
pub enum Argument {
    /// Plain argument
    Expr(Expr),
    /// `...expr`
    Spread(Expr),
}

/// Property key
#[derive(Debug, Clone)]
pub enum PropKey {
    /// Identifier, string or number key
    Named(Atom),
    /// `[expr]`
    Computed(Box<Expr>),
}

/// Method flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// Plain method
    Method,
    /// Getter
    Getter,
    /// Setter
    Setter,
}

/// Object literal member
#[derive(Debug, Clone)]
pub enum Property {
    /// `key: value`
    KeyValue {
        /// Key
        key: PropKey,
        /// Value
        value: Expr,
    },
    /// `{ x }`
    Shorthand(Ident),
    /// `key() {}` / `get key() {}` / `set key(v) {}`
    Method {
        /// Key
        key: PropKey,
        /// Method flavor
        kind: MethodKind,
        /// Function
        func: Rc<FunctionNode>,
    },
    /// `...expr`
    Spread(Expr),
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `!`
    Not,
    /// `-`
    Neg,
    /// `+`
    Pos,
    /// `~`
    BitNot,
    /// `typeof`
    Typeof,
    /// `void`
    Void,
    /// `delete`
    Delete,
}

/// Update operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    /// `++`
    Inc,
    /// `--`
    Dec,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    BitOr,
    BitXor,
    BitAnd,
    Lsh,
    Rsh,
    Ursh,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    InstanceOf,
    In,
}

/// Short-circuiting operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    /// `&&`
    And,
    /// `||`
    Or,
    /// `??`
    Coalesce,
}

/// Assignment operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// `=`
    Assign,
    /// `op=`
    Binary(BinaryOp),
    /// `&&=`, `||=`, `??=`
    Logical(LogicalOp),
}

/// Binding or assignment pattern
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Name
    Ident(Ident),
    /// Member expression (assignment patterns only)
    Member(Box<Expr>),
    /// Array pattern
    Array(ArrayPattern),
    /// Object pattern
    Object(ObjectPattern),
}

/// `[a, , b = 1, ...rest]`
#[derive(Debug, Clone, Default)]
pub struct ArrayPattern {
    /// Elements; `None` is an elision
    pub elements: Vec<Option<PatternElement>>,
    /// Rest element
    pub rest: Option<Box<Pattern>>,
}

/// Pattern element with optional default
#[derive(Debug, Clone)]
pub struct PatternElement {
    /// Target
    pub target: Pattern,
    /// Default used when the value is undefined
    pub default: Option<Expr>,
}

/// `{ a, b: c = 1, [k]: d, ...rest }`
#[derive(Debug, Clone, Default)]
pub struct ObjectPattern {
    /// Properties
    pub properties: Vec<PatternProperty>,
    /// Rest property
    pub rest: Option<Box<Pattern>>,
}

/// Property of an object pattern
#[derive(Debug, Clone)]
pub struct PatternProperty {
    /// Key
    pub key: PropKey,
    /// Target
    pub target: Pattern,
    /// Default used when the value is undefined
    pub default: Option<Expr>,
}

/// Function flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// Declaration or expression
    Normal,
    /// Arrow function
    Arrow,
    /// Object or class method
    Method,
    /// Getter
    Getter,
    /// Setter
    Setter,
    /// Class constructor
    ClassConstructor,
}

/// Formal parameter
#[derive(Debug, Clone)]
pub struct Param {
    /// Bound pattern
    pub target: Pattern,
    /// Default value
    pub default: Option<Expr>,
}

/// Function body
#[derive(Debug, Clone)]
pub enum FunctionBody {
    /// Statement list
    Block(Vec<Stmt>),
    /// Concise arrow body
    Expr(Box<Expr>),
}

/// Function node shared between the tree and deferred compilation units
#[derive(Debug, Clone)]
pub struct FunctionNode {
    /// Name
    pub name: Option<Atom>,
    /// Flavor
    pub kind: FunctionKind,
    /// Generator
    pub is_generator: bool,
    /// Async
    pub is_async: bool,
    /// Strict mode body
    pub strict: bool,
    /// Parameters
    pub params: Vec<Param>,
    /// Rest parameter
    pub rest: Option<Pattern>,
    /// Parameter and var bindings
    pub scope: ScopeData,
    /// Lexical bindings of the body when parameters are not simple
    pub body_scope: Option<ScopeData>,
    /// Body
    pub body: FunctionBody,
    /// Contains a sloppy direct eval
    pub has_direct_eval: bool,
    /// Binder allows deferring the body
    pub lazy: bool,
    /// Start of the function source
    pub span: Span,
    /// End of the function source
    pub end: Span,
}

impl FunctionNode {
    /// Whether every parameter is a plain name without default and there is no rest
    pub fn has_simple_params(&self) -> bool {
        self.rest.is_none()
            && self
                .params
                .iter()
                .all(|p| p.default.is_none() && matches!(p.target, Pattern::Ident(_)))
    }

    /// Value of the function's `length` property
    pub fn length(&self) -> usize {
        self.params
            .iter()
            .take_while(|p| p.default.is_none())
            .count()
    }
}

/// Class member
#[derive(Debug, Clone)]
pub enum ClassMember {
    /// Method, getter or setter
    Method {
        /// Key
        key: PropKey,
        /// Flavor
        kind: MethodKind,
        /// `static`
        is_static: bool,
        /// Function
        func: Rc<FunctionNode>,
    },
    /// Field definition
    Field(ClassField),
}

/// Field definition
#[derive(Debug, Clone)]
pub struct ClassField {
    /// Key
    pub key: PropKey,
    /// Initializer
    pub value: Option<Expr>,
    /// `static`
    pub is_static: bool,
    /// Source position
    pub span: Span,
}

/// Class definition
#[derive(Debug, Clone)]
pub struct ClassNode {
    /// Name
    pub name: Option<Atom>,
    /// `extends` expression
    pub heritage: Option<Box<Expr>>,
    /// Explicit constructor
    pub constructor: Option<Rc<FunctionNode>>,
    /// Members in source order
    pub members: Vec<ClassMember>,
    /// Start of the class source
    pub span: Span,
    /// End of the class source
    pub end: Span,
}

impl Expr {
    /// Create an expression
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Identifier reference
    pub fn ident(name: &str, span: Span) -> Self {
        Self::new(
            ExprKind::Ident(Ident {
                name: name.into(),
                span,
            }),
            span,
        )
    }

    /// Whether evaluating the expression can have no observable effect
    pub fn is_side_effect_free(&self) -> bool {
        match &self.kind {
            ExprKind::Number(_)
            | ExprKind::String(_)
            | ExprKind::BigInt(_)
            | ExprKind::Bool(_)
            | ExprKind::Null
            | ExprKind::Undefined
            | ExprKind::This
            | ExprKind::Function(_)
            | ExprKind::Arrow(_) => true,
            ExprKind::Unary {
                op: UnaryOp::Not | UnaryOp::Void | UnaryOp::Typeof,
                argument,
            } => argument.is_side_effect_free() && !matches!(argument.kind, ExprKind::Ident(_)),
            _ => false,
        }
    }
}

impl Stmt {
    /// Create a statement
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

impl Pattern {
    /// Name pattern
    pub fn ident(name: &str, span: Span) -> Self {
        Self::Ident(Ident {
            name: name.into(),
            span,
        })
    }
}
