//! Bytecode instructions (opcodes)
//!
//! Stack-based instruction set. Every opcode has a static stack effect
//! (`nuses` values popped, `ndefs` values pushed); a handful of opcodes take
//! the count from an operand (argument counts, `PopN`, `DupAt`, `Pick`,
//! `Unpick`, `Class`).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::operand::{
    ConstantIndex, EnvCoord, FunctionIndex, JumpOffset, LocalSlot, ResumeIndex, ScopeIndex,
};

/// Marker for an operand-dependent stack count in the opcode table
const VARIADIC: i32 = -1;

macro_rules! define_opcodes {
    ($( $(#[$doc:meta])* $name:ident = $byte:literal, $uses:expr, $defs:expr; )*) => {
        /// Bytecode opcodes
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum Opcode {
            $( $(#[$doc])* $name = $byte, )*
        }

        impl Opcode {
            /// Convert from raw byte
            pub fn from_byte(byte: u8) -> Option<Self> {
                match byte {
                    $( $byte => Some(Self::$name), )*
                    _ => None,
                }
            }

            /// Get the name of this opcode
            pub const fn name(self) -> &'static str {
                match self {
                    $( Self::$name => stringify!($name), )*
                }
            }

            /// Values popped, or a negative number when an operand decides
            pub const fn nuses(self) -> i32 {
                match self {
                    $( Self::$name => $uses, )*
                }
            }

            /// Values pushed, or a negative number when an operand decides
            pub const fn ndefs(self) -> i32 {
                match self {
                    $( Self::$name => $defs, )*
                }
            }
        }
    };
}

define_opcodes! {
    // ==================== Constants ====================
    /// Push undefined
    Undefined = 0x00, 0, 1;
    /// Push null
    Null = 0x01, 0, 1;
    /// Push true
    True = 0x02, 0, 1;
    /// Push false
    False = 0x03, 0, 1;
    /// Push a 32-bit integer immediate
    Int32 = 0x04, 0, 1;
    /// Push a number from the constant pool
    Double = 0x05, 0, 1;
    /// Push a string from the constant pool
    String = 0x06, 0, 1;
    /// Push a BigInt from the constant pool
    BigInt = 0x07, 0, 1;
    /// Create a RegExp object from the constant pool
    RegExp = 0x08, 0, 1;
    /// Push the (cached) template object from the constant pool
    TemplateObject = 0x09, 0, 1;
    /// Push the uninitialized-lexical marker
    Uninitialized = 0x0A, 0, 1;
    /// Push an array hole
    Hole = 0x0B, 0, 1;
    /// Push a resume index as an integer
    ResumeIndex = 0x0C, 0, 1;
    /// Push a generator resume kind as an integer
    ResumeKind = 0x0D, 0, 1;

    // ==================== Stack ====================
    /// Pop one value
    Pop = 0x10, 1, 0;
    /// Pop `count` values
    PopN = 0x11, VARIADIC, 0;
    /// Duplicate the top value
    Dup = 0x12, 1, 2;
    /// Duplicate the top two values
    Dup2 = 0x13, 2, 4;
    /// Push a copy of the value `n` below the top
    DupAt = 0x14, VARIADIC, VARIADIC;
    /// Swap the top two values
    Swap = 0x15, 2, 2;
    /// Move the value `n` below the top to the top
    Pick = 0x16, VARIADIC, VARIADIC;
    /// Move the top value `n` positions down
    Unpick = 0x17, VARIADIC, VARIADIC;

    // ==================== Unary ====================
    /// Logical not
    Not = 0x20, 1, 1;
    /// Numeric negation
    Neg = 0x21, 1, 1;
    /// Unary plus (ToNumber)
    Pos = 0x22, 1, 1;
    /// Bitwise not
    BitNot = 0x23, 1, 1;
    /// typeof
    Typeof = 0x24, 1, 1;
    /// void: replace the top value with undefined
    Void = 0x25, 1, 1;
    /// ToNumeric conversion
    ToNumeric = 0x26, 1, 1;
    /// ToPropertyKey conversion
    ToPropertyKey = 0x27, 1, 1;
    /// ToString conversion (template literals)
    ToString = 0x28, 1, 1;
    /// Numeric increment
    Inc = 0x29, 1, 1;
    /// Numeric decrement
    Dec = 0x2A, 1, 1;
    /// Push whether the top value is null or undefined, keeping it
    IsNullOrUndefined = 0x2B, 1, 2;

    // ==================== Binary ====================
    /// Addition
    Add = 0x30, 2, 1;
    /// Subtraction
    Sub = 0x31, 2, 1;
    /// Multiplication
    Mul = 0x32, 2, 1;
    /// Division
    Div = 0x33, 2, 1;
    /// Remainder
    Mod = 0x34, 2, 1;
    /// Exponentiation
    Pow = 0x35, 2, 1;
    /// Bitwise or
    BitOr = 0x36, 2, 1;
    /// Bitwise xor
    BitXor = 0x37, 2, 1;
    /// Bitwise and
    BitAnd = 0x38, 2, 1;
    /// Left shift
    Lsh = 0x39, 2, 1;
    /// Signed right shift
    Rsh = 0x3A, 2, 1;
    /// Unsigned right shift
    Ursh = 0x3B, 2, 1;
    /// Loose equality
    Eq = 0x3C, 2, 1;
    /// Loose inequality
    Ne = 0x3D, 2, 1;
    /// Strict equality
    StrictEq = 0x3E, 2, 1;
    /// Strict inequality
    StrictNe = 0x3F, 2, 1;
    /// Less than
    Lt = 0x40, 2, 1;
    /// Less than or equal
    Le = 0x41, 2, 1;
    /// Greater than
    Gt = 0x42, 2, 1;
    /// Greater than or equal
    Ge = 0x43, 2, 1;
    /// instanceof
    InstanceOf = 0x44, 2, 1;
    /// in
    In = 0x45, 2, 1;

    // ==================== Bindings ====================
    /// Push an actual argument
    GetArg = 0x50, 0, 1;
    /// Store into an argument slot, keeping the value
    SetArg = 0x51, 1, 1;
    /// Push a frame slot
    GetLocal = 0x52, 0, 1;
    /// Store into a frame slot, keeping the value
    SetLocal = 0x53, 1, 1;
    /// Initialize a lexical frame slot, keeping the value
    InitLexical = 0x54, 1, 1;
    /// Throw if a lexical frame slot is uninitialized
    CheckLexical = 0x55, 0, 0;
    /// Push an environment slot
    GetAliasedVar = 0x56, 0, 1;
    /// Store into an environment slot, keeping the value
    SetAliasedVar = 0x57, 1, 1;
    /// Initialize a lexical environment slot, keeping the value
    InitAliasedLexical = 0x58, 1, 1;
    /// Throw if a lexical environment slot is uninitialized
    CheckAliasedLexical = 0x59, 0, 0;
    /// Look a name up on the environment chain at runtime
    GetName = 0x5A, 0, 1;
    /// Assign a name found on the environment chain at runtime
    SetName = 0x5B, 1, 1;
    /// Look a name up on the global object / global lexical scope
    GetGName = 0x5C, 0, 1;
    /// Assign a global name
    SetGName = 0x5D, 1, 1;
    /// Delete a name, pushing the result
    DelName = 0x5E, 0, 1;
    /// Assignment to a const binding: throws, stack shaped like a store
    ThrowSetConst = 0x5F, 1, 1;
    /// Push the running function object
    Callee = 0x60, 0, 1;
    /// Push the function's `this`
    FunctionThis = 0x61, 0, 1;
    /// Throw if `this` is still uninitialized in a derived constructor
    CheckThis = 0x62, 1, 1;
    /// Bind `this` after a super call, keeping the value
    InitThis = 0x63, 1, 1;
    /// Push new.target
    NewTarget = 0x64, 0, 1;
    /// Push the super constructor of the running constructor
    SuperFun = 0x65, 0, 1;
    /// Push an array of the actual arguments past the formals
    Rest = 0x66, 0, 1;

    // ==================== Environments ====================
    /// Push a lexical environment for a scope
    PushLexicalEnv = 0x70, 0, 0;
    /// Pop the innermost lexical environment
    PopLexicalEnv = 0x71, 0, 0;
    /// Replace the innermost lexical environment with a copy (per-iteration bindings)
    FreshenLexicalEnv = 0x72, 0, 0;
    /// Push the function or eval var environment
    PushVarEnv = 0x73, 0, 0;
    /// Push a with-environment for the object on top
    EnterWith = 0x74, 1, 0;
    /// Pop a with-environment
    LeaveWith = 0x75, 0, 0;
    /// Declare global or eval bindings for a scope
    GlobalOrEvalDeclInstantiation = 0x76, 0, 0;
    /// Define a global function from the top value
    DefFun = 0x77, 1, 0;

    // ==================== Properties ====================
    /// obj -> obj.name
    GetProp = 0x80, 1, 1;
    /// obj val -> val, assigning obj.name
    SetProp = 0x81, 2, 1;
    /// obj key -> obj\[key\]
    GetElem = 0x82, 2, 1;
    /// obj key val -> val, assigning obj\[key\]
    SetElem = 0x83, 3, 1;
    /// obj -> delete obj.name
    DelProp = 0x84, 1, 1;
    /// obj key -> delete obj\[key\]
    DelElem = 0x85, 2, 1;
    /// obj val -> obj, defining obj.name
    InitProp = 0x86, 2, 1;
    /// obj key val -> obj, defining obj\[key\]
    InitElem = 0x87, 3, 1;
    /// obj fn -> obj, defining a getter
    InitPropGetter = 0x88, 2, 1;
    /// obj fn -> obj, defining a setter
    InitPropSetter = 0x89, 2, 1;
    /// obj key fn -> obj, defining a getter
    InitElemGetter = 0x8A, 3, 1;
    /// obj key fn -> obj, defining a setter
    InitElemSetter = 0x8B, 3, 1;
    /// fn home -> fn, setting the method's home object
    InitHomeObject = 0x8C, 2, 1;
    /// Throw if the top value is null or undefined
    CheckObjCoercible = 0x8D, 1, 1;

    // ==================== Literals ====================
    /// Push a new plain object
    NewObject = 0x90, 0, 1;
    /// Push a new array with the given length hint
    NewArray = 0x91, 0, 1;
    /// arr val -> arr, storing at a fixed index
    InitElemArray = 0x92, 2, 1;
    /// arr index val -> arr index+1
    InitElemInc = 0x93, 3, 2;
    /// target source -> target, copying own enumerable properties
    CopyDataProperties = 0x94, 2, 1;
    /// target source excluded -> target, skipping keys present in `excluded`
    CopyDataPropertiesExcluding = 0x95, 3, 1;

    // ==================== Functions ====================
    /// Create a closure for a nested function
    Lambda = 0xA0, 0, 1;
    /// fn name -> fn, setting the function's name
    SetFunName = 0xA1, 2, 1;
    /// [heritage] -> ctor proto
    Class = 0xA2, VARIADIC, 2;
    /// callee this args... -> rval
    Call = 0xA3, VARIADIC, 1;
    /// Same as Call, result is going to be discarded
    CallIgnoresRv = 0xA4, VARIADIC, 1;
    /// callee new.target args... -> obj
    New = 0xA5, VARIADIC, 1;
    /// superfun new.target args... -> this
    SuperCall = 0xA6, VARIADIC, 1;
    /// callee this args-array -> rval
    SpreadCall = 0xA7, 3, 1;
    /// callee new.target args-array -> obj
    SpreadNew = 0xA8, 3, 1;
    /// superfun new.target args-array -> this
    SpreadSuperCall = 0xA9, 3, 1;

    // ==================== Iteration ====================
    /// obj -> iterator
    GetIterator = 0xB0, 1, 1;
    /// obj -> async iterator
    GetAsyncIterator = 0xB1, 1, 1;
    /// Throw unless the top value is an object
    CheckIsObj = 0xB2, 1, 1;
    /// obj -> for-in iterator
    Iter = 0xB3, 1, 1;
    /// iter -> iter next-key-or-magic
    MoreIter = 0xB4, 1, 2;
    /// val -> val is-exhausted-magic
    IsNoIter = 0xB5, 1, 2;
    /// Release a for-in iterator
    EndIter = 0xB6, 1, 0;

    // ==================== Generators ====================
    /// Create the generator (or async function) object
    Generator = 0xC0, 0, 1;
    /// gen -> rval gen resumeKind, first suspension
    InitialYield = 0xC1, 1, 3;
    /// val gen -> rval gen resumeKind
    Yield = 0xC2, 2, 3;
    /// val gen -> rval gen resumeKind
    Await = 0xC3, 2, 3;
    /// rval gen resumeKind -> rval, throwing or returning for non-next resumes
    CheckResumeKind = 0xC4, 3, 1;
    /// val -> { value: val, done }
    IterResult = 0xC5, 1, 1;

    // ==================== Control flow ====================
    /// Start of a basic block
    JumpTarget = 0xD0, 0, 0;
    /// Start of a loop body
    LoopHead = 0xD1, 0, 0;
    /// Unconditional jump
    Goto = 0xD2, 0, 0;
    /// Pop; jump if falsy
    IfEq = 0xD3, 1, 0;
    /// Pop; jump if truthy
    IfNe = 0xD4, 1, 0;
    /// Jump if the top value is falsy; the value stays on both edges
    And = 0xD5, 1, 1;
    /// Jump if the top value is truthy; the value stays on both edges
    Or = 0xD6, 1, 1;
    /// Jump if the top value is neither null nor undefined; the value stays on both edges
    Coalesce = 0xD7, 1, 1;
    /// lval rval: pop both and jump when strictly equal, else pop rval
    Case = 0xD8, 2, 1;
    /// Pop the switch value and jump
    Default = 0xD9, 1, 0;
    /// false resumeIndex -> (jump to finally with both on the stack)
    Gosub = 0xDA, 2, 0;
    /// throwing value -> rethrow or resume at the indexed offset
    Retsub = 0xDB, 2, 0;
    /// Start of a try block
    Try = 0xDC, 0, 0;
    /// Start of a destructuring cleanup region
    TryDestructuring = 0xDD, 0, 0;
    /// Start of a finally block
    Finally = 0xDE, 0, 0;
    /// Push the pending exception
    Exception = 0xDF, 0, 1;
    /// Throw the top value
    Throw = 0xE0, 1, 0;
    /// Throw a built-in error
    ThrowMsg = 0xE1, 0, 0;
    /// Return the top value
    Return = 0xE2, 1, 0;
    /// Store the frame's return value
    SetRval = 0xE3, 1, 0;
    /// Return the frame's return value
    RetRval = 0xE4, 0, 0;
    /// Debugger statement
    Debugger = 0xE5, 0, 0;
    /// No operation
    Nop = 0xE6, 0, 0;
}

/// Why a suspended generator is being resumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum GeneratorResumeKind {
    /// `next(v)`
    Next = 0,
    /// `throw(e)`
    Throw = 1,
    /// `return(v)`
    Return = 2,
}

/// Which protocol step produced the value checked by `CheckIsObj`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckIsObjectKind {
    /// Result of `next()`
    IteratorNext,
    /// Result of `return()`
    IteratorReturn,
    /// Result of `throw()`
    IteratorThrow,
    /// Result of `@@iterator()`
    GetIterator,
    /// Result of `@@asyncIterator()`
    GetAsyncIterator,
}

/// Built-in errors thrown by `ThrowMsg`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThrowMsgKind {
    /// Delegated iterator has no `throw` method
    IteratorNoThrow,
    /// Assignment to a call expression
    AssignToCall,
    /// `super()` called twice
    SuperCalledTwice,
}

impl ThrowMsgKind {
    /// Error message shown by the runtime
    pub const fn message(self) -> &'static str {
        match self {
            Self::IteratorNoThrow => "iterator does not have a 'throw' method",
            Self::AssignToCall => "invalid assignment to a call expression",
            Self::SuperCalledTwice => "super() called twice in derived class constructor",
        }
    }
}

/// Prefix applied by `SetFunName`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionPrefixKind {
    /// No prefix
    None,
    /// `get `
    Get,
    /// `set `
    Set,
}

/// How a jump instruction treats the stack on its taken edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    /// Always taken, nothing popped
    Always,
    /// Pops its operand on both edges
    Test,
    /// Keeps its operand on the taken edge
    Peek,
    /// Pops both operands on the taken edge
    Case,
    /// Pops the discriminant, always taken
    Default,
    /// Keeps both finally operands on the taken edge, pops them on return
    Gosub,
}

/// A decoded instruction with its operands
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum Instruction {
    // Constants
    Undefined,
    Null,
    True,
    False,
    Int32 { value: i32 },
    Double { idx: ConstantIndex },
    String { idx: ConstantIndex },
    BigInt { idx: ConstantIndex },
    RegExp { idx: ConstantIndex },
    TemplateObject { idx: ConstantIndex },
    Uninitialized,
    Hole,
    ResumeIndex { index: ResumeIndex },
    ResumeKind { kind: GeneratorResumeKind },

    // Stack
    Pop,
    PopN { count: u16 },
    Dup,
    Dup2,
    DupAt { n: u16 },
    Swap,
    Pick { n: u8 },
    Unpick { n: u8 },

    // Unary
    Not,
    Neg,
    Pos,
    BitNot,
    Typeof,
    Void,
    ToNumeric,
    ToPropertyKey,
    ToString,
    Inc,
    Dec,
    IsNullOrUndefined,

    // Binary
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

    // Bindings
    GetArg { index: u16 },
    SetArg { index: u16 },
    GetLocal { slot: LocalSlot },
    SetLocal { slot: LocalSlot },
    InitLexical { slot: LocalSlot },
    CheckLexical { slot: LocalSlot },
    GetAliasedVar { coord: EnvCoord },
    SetAliasedVar { coord: EnvCoord },
    InitAliasedLexical { coord: EnvCoord },
    CheckAliasedLexical { coord: EnvCoord },
    GetName { name: ConstantIndex },
    SetName { name: ConstantIndex },
    GetGName { name: ConstantIndex },
    SetGName { name: ConstantIndex },
    DelName { name: ConstantIndex },
    ThrowSetConst { name: ConstantIndex },
    Callee,
    FunctionThis,
    CheckThis,
    InitThis,
    NewTarget,
    SuperFun,
    Rest,

    // Environments
    PushLexicalEnv { scope: ScopeIndex },
    PopLexicalEnv,
    FreshenLexicalEnv,
    PushVarEnv { scope: ScopeIndex },
    EnterWith { scope: ScopeIndex },
    LeaveWith,
    GlobalOrEvalDeclInstantiation { scope: ScopeIndex },
    DefFun,

    // Properties
    GetProp { name: ConstantIndex },
    SetProp { name: ConstantIndex },
    GetElem,
    SetElem,
    DelProp { name: ConstantIndex },
    DelElem,
    InitProp { name: ConstantIndex },
    InitElem,
    InitPropGetter { name: ConstantIndex },
    InitPropSetter { name: ConstantIndex },
    InitElemGetter,
    InitElemSetter,
    InitHomeObject,
    CheckObjCoercible,

    // Literals
    NewObject,
    NewArray { length: u32 },
    InitElemArray { index: u32 },
    InitElemInc,
    CopyDataProperties,
    CopyDataPropertiesExcluding,

    // Functions
    Lambda { func: FunctionIndex },
    SetFunName { prefix: FunctionPrefixKind },
    Class { func: FunctionIndex, derived: bool },
    Call { argc: u16 },
    CallIgnoresRv { argc: u16 },
    New { argc: u16 },
    SuperCall { argc: u16 },
    SpreadCall,
    SpreadNew,
    SpreadSuperCall,

    // Iteration
    GetIterator,
    GetAsyncIterator,
    CheckIsObj { kind: CheckIsObjectKind },
    Iter,
    MoreIter,
    IsNoIter,
    EndIter,

    // Generators
    Generator,
    InitialYield { resume: ResumeIndex },
    Yield { resume: ResumeIndex },
    Await { resume: ResumeIndex },
    CheckResumeKind,
    IterResult { done: bool },

    // Control flow
    JumpTarget,
    LoopHead { depth: u8 },
    Goto { offset: JumpOffset },
    IfEq { offset: JumpOffset },
    IfNe { offset: JumpOffset },
    And { offset: JumpOffset },
    Or { offset: JumpOffset },
    Coalesce { offset: JumpOffset },
    Case { offset: JumpOffset },
    Default { offset: JumpOffset },
    Gosub { offset: JumpOffset },
    Retsub,
    Try,
    TryDestructuring,
    Finally,
    Exception,
    Throw,
    ThrowMsg { kind: ThrowMsgKind },
    Return,
    SetRval,
    RetRval,
    Debugger,
    Nop,
}

impl Instruction {
    /// Opcode of this instruction
    pub const fn opcode(&self) -> Opcode {
        use Instruction as I;
        match self {
            I::Undefined => Opcode::Undefined,
            I::Null => Opcode::Null,
            I::True => Opcode::True,
            I::False => Opcode::False,
            I::Int32 { .. } => Opcode::Int32,
            I::Double { .. } => Opcode::Double,
            I::String { .. } => Opcode::String,
            I::BigInt { .. } => Opcode::BigInt,
            I::RegExp { .. } => Opcode::RegExp,
            I::TemplateObject { .. } => Opcode::TemplateObject,
            I::Uninitialized => Opcode::Uninitialized,
            I::Hole => Opcode::Hole,
            I::ResumeIndex { .. } => Opcode::ResumeIndex,
            I::ResumeKind { .. } => Opcode::ResumeKind,
            I::Pop => Opcode::Pop,
            I::PopN { .. } => Opcode::PopN,
            I::Dup => Opcode::Dup,
            I::Dup2 => Opcode::Dup2,
            I::DupAt { .. } => Opcode::DupAt,
            I::Swap => Opcode::Swap,
            I::Pick { .. } => Opcode::Pick,
            I::Unpick { .. } => Opcode::Unpick,
            I::Not => Opcode::Not,
            I::Neg => Opcode::Neg,
            I::Pos => Opcode::Pos,
            I::BitNot => Opcode::BitNot,
            I::Typeof => Opcode::Typeof,
            I::Void => Opcode::Void,
            I::ToNumeric => Opcode::ToNumeric,
            I::ToPropertyKey => Opcode::ToPropertyKey,
            I::ToString => Opcode::ToString,
            I::Inc => Opcode::Inc,
            I::Dec => Opcode::Dec,
            I::IsNullOrUndefined => Opcode::IsNullOrUndefined,
            I::Add => Opcode::Add,
            I::Sub => Opcode::Sub,
            I::Mul => Opcode::Mul,
            I::Div => Opcode::Div,
            I::Mod => Opcode::Mod,
            I::Pow => Opcode::Pow,
            I::BitOr => Opcode::BitOr,
            I::BitXor => Opcode::BitXor,
            I::BitAnd => Opcode::BitAnd,
            I::Lsh => Opcode::Lsh,
            I::Rsh => Opcode::Rsh,
            I::Ursh => Opcode::Ursh,
            I::Eq => Opcode::Eq,
            I::Ne => Opcode::Ne,
            I::StrictEq => Opcode::StrictEq,
            I::StrictNe => Opcode::StrictNe,
            I::Lt => Opcode::Lt,
            I::Le => Opcode::Le,
            I::Gt => Opcode::Gt,
            I::Ge => Opcode::Ge,
            I::InstanceOf => Opcode::InstanceOf,
            I::In => Opcode::In,
            I::GetArg { .. } => Opcode::GetArg,
            I::SetArg { .. } => Opcode::SetArg,
            I::GetLocal { .. } => Opcode::GetLocal,
            I::SetLocal { .. } => Opcode::SetLocal,
            I::InitLexical { .. } => Opcode::InitLexical,
            I::CheckLexical { .. } => Opcode::CheckLexical,
            I::GetAliasedVar { .. } => Opcode::GetAliasedVar,
            I::SetAliasedVar { .. } => Opcode::SetAliasedVar,
            I::InitAliasedLexical { .. } => Opcode::InitAliasedLexical,
            I::CheckAliasedLexical { .. } => Opcode::CheckAliasedLexical,
            I::GetName { .. } => Opcode::GetName,
            I::SetName { .. } => Opcode::SetName,
            I::GetGName { .. } => Opcode::GetGName,
            I::SetGName { .. } => Opcode::SetGName,
            I::DelName { .. } => Opcode::DelName,
            I::ThrowSetConst { .. } => Opcode::ThrowSetConst,
            I::Callee => Opcode::Callee,
            I::FunctionThis => Opcode::FunctionThis,
            I::CheckThis => Opcode::CheckThis,
            I::InitThis => Opcode::InitThis,
            I::NewTarget => Opcode::NewTarget,
            I::SuperFun => Opcode::SuperFun,
            I::Rest => Opcode::Rest,
            I::PushLexicalEnv { .. } => Opcode::PushLexicalEnv,
            I::PopLexicalEnv => Opcode::PopLexicalEnv,
            I::FreshenLexicalEnv => Opcode::FreshenLexicalEnv,
            I::PushVarEnv { .. } => Opcode::PushVarEnv,
            I::EnterWith { .. } => Opcode::EnterWith,
            I::LeaveWith => Opcode::LeaveWith,
            I::GlobalOrEvalDeclInstantiation { .. } => Opcode::GlobalOrEvalDeclInstantiation,
            I::DefFun => Opcode::DefFun,
            I::GetProp { .. } => Opcode::GetProp,
            I::SetProp { .. } => Opcode::SetProp,
            I::GetElem => Opcode::GetElem,
            I::SetElem => Opcode::SetElem,
            I::DelProp { .. } => Opcode::DelProp,
            I::DelElem => Opcode::DelElem,
            I::InitProp { .. } => Opcode::InitProp,
            I::InitElem => Opcode::InitElem,
            I::InitPropGetter { .. } => Opcode::InitPropGetter,
            I::InitPropSetter { .. } => Opcode::InitPropSetter,
            I::InitElemGetter => Opcode::InitElemGetter,
            I::InitElemSetter => Opcode::InitElemSetter,
            I::InitHomeObject => Opcode::InitHomeObject,
            I::CheckObjCoercible => Opcode::CheckObjCoercible,
            I::NewObject => Opcode::NewObject,
            I::NewArray { .. } => Opcode::NewArray,
            I::InitElemArray { .. } => Opcode::InitElemArray,
            I::InitElemInc => Opcode::InitElemInc,
            I::CopyDataProperties => Opcode::CopyDataProperties,
            I::CopyDataPropertiesExcluding => Opcode::CopyDataPropertiesExcluding,
            I::Lambda { .. } => Opcode::Lambda,
            I::SetFunName { .. } => Opcode::SetFunName,
            I::Class { .. } => Opcode::Class,
            I::Call { .. } => Opcode::Call,
            I::CallIgnoresRv { .. } => Opcode::CallIgnoresRv,
            I::New { .. } => Opcode::New,
            I::SuperCall { .. } => Opcode::SuperCall,
            I::SpreadCall => Opcode::SpreadCall,
            I::SpreadNew => Opcode::SpreadNew,
            I::SpreadSuperCall => Opcode::SpreadSuperCall,
            I::GetIterator => Opcode::GetIterator,
            I::GetAsyncIterator => Opcode::GetAsyncIterator,
            I::CheckIsObj { .. } => Opcode::CheckIsObj,
            I::Iter => Opcode::Iter,
            I::MoreIter => Opcode::MoreIter,
            I::IsNoIter => Opcode::IsNoIter,
            I::EndIter => Opcode::EndIter,
            I::Generator => Opcode::Generator,
            I::InitialYield { .. } => Opcode::InitialYield,
            I::Yield { .. } => Opcode::Yield,
            I::Await { .. } => Opcode::Await,
            I::CheckResumeKind => Opcode::CheckResumeKind,
            I::IterResult { .. } => Opcode::IterResult,
            I::JumpTarget => Opcode::JumpTarget,
            I::LoopHead { .. } => Opcode::LoopHead,
            I::Goto { .. } => Opcode::Goto,
            I::IfEq { .. } => Opcode::IfEq,
            I::IfNe { .. } => Opcode::IfNe,
            I::And { .. } => Opcode::And,
            I::Or { .. } => Opcode::Or,
            I::Coalesce { .. } => Opcode::Coalesce,
            I::Case { .. } => Opcode::Case,
            I::Default { .. } => Opcode::Default,
            I::Gosub { .. } => Opcode::Gosub,
            I::Retsub => Opcode::Retsub,
            I::Try => Opcode::Try,
            I::TryDestructuring => Opcode::TryDestructuring,
            I::Finally => Opcode::Finally,
            I::Exception => Opcode::Exception,
            I::Throw => Opcode::Throw,
            I::ThrowMsg { .. } => Opcode::ThrowMsg,
            I::Return => Opcode::Return,
            I::SetRval => Opcode::SetRval,
            I::RetRval => Opcode::RetRval,
            I::Debugger => Opcode::Debugger,
            I::Nop => Opcode::Nop,
        }
    }

    /// Number of values popped
    pub fn nuses(&self) -> u32 {
        match *self {
            Instruction::PopN { count } => u32::from(count),
            Instruction::DupAt { n } => u32::from(n) + 1,
            Instruction::Pick { n } | Instruction::Unpick { n } => u32::from(n) + 1,
            Instruction::Call { argc } | Instruction::CallIgnoresRv { argc } => {
                2 + u32::from(argc)
            }
            Instruction::New { argc } => 3 + u32::from(argc),
            Instruction::SuperCall { argc } => 2 + u32::from(argc),
            Instruction::Class { derived, .. } => u32::from(derived),
            _ => {
                let uses = self.opcode().nuses();
                debug_assert!(uses >= 0, "{} has an operand-dependent use count", self.name());
                uses as u32
            }
        }
    }

    /// Number of values pushed
    pub fn ndefs(&self) -> u32 {
        match *self {
            Instruction::DupAt { n } => u32::from(n) + 2,
            Instruction::Pick { n } | Instruction::Unpick { n } => u32::from(n) + 1,
            _ => {
                let defs = self.opcode().ndefs();
                debug_assert!(defs >= 0, "{} has an operand-dependent def count", self.name());
                defs as u32
            }
        }
    }

    /// Net stack effect (`ndefs - nuses`)
    pub fn stack_effect(&self) -> i32 {
        self.ndefs() as i32 - self.nuses() as i32
    }

    /// Name of the opcode
    pub const fn name(&self) -> &'static str {
        self.opcode().name()
    }

    /// Jump offset, if this is a jump
    pub fn jump_offset(&self) -> Option<JumpOffset> {
        match *self {
            Instruction::Goto { offset }
            | Instruction::IfEq { offset }
            | Instruction::IfNe { offset }
            | Instruction::And { offset }
            | Instruction::Or { offset }
            | Instruction::Coalesce { offset }
            | Instruction::Case { offset }
            | Instruction::Default { offset }
            | Instruction::Gosub { offset } => Some(offset),
            _ => None,
        }
    }

    /// Rewrite the offset of a jump. Returns false for non-jumps.
    pub fn set_jump_offset(&mut self, new: JumpOffset) -> bool {
        match self {
            Instruction::Goto { offset }
            | Instruction::IfEq { offset }
            | Instruction::IfNe { offset }
            | Instruction::And { offset }
            | Instruction::Or { offset }
            | Instruction::Coalesce { offset }
            | Instruction::Case { offset }
            | Instruction::Default { offset }
            | Instruction::Gosub { offset } => {
                *offset = new;
                true
            }
            _ => false,
        }
    }

    /// Stack treatment of the taken edge, if this is a jump
    pub fn branch_kind(&self) -> Option<BranchKind> {
        Some(match self {
            Instruction::Goto { .. } => BranchKind::Always,
            Instruction::IfEq { .. } | Instruction::IfNe { .. } => BranchKind::Test,
            Instruction::And { .. } | Instruction::Or { .. } | Instruction::Coalesce { .. } => {
                BranchKind::Peek
            }
            Instruction::Case { .. } => BranchKind::Case,
            Instruction::Default { .. } => BranchKind::Default,
            Instruction::Gosub { .. } => BranchKind::Gosub,
            _ => return None,
        })
    }

    /// Stack depth on the taken edge of a jump executed at `depth`
    pub fn branch_depth(&self, depth: u32) -> Option<u32> {
        let kind = self.branch_kind()?;
        Some(match kind {
            BranchKind::Always | BranchKind::Peek | BranchKind::Gosub => depth,
            BranchKind::Test | BranchKind::Default => depth.saturating_sub(1),
            BranchKind::Case => depth.saturating_sub(2),
        })
    }

    /// Whether control never falls through to the next instruction
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instruction::Goto { .. }
                | Instruction::Default { .. }
                | Instruction::Retsub
                | Instruction::Throw
                | Instruction::ThrowMsg { .. }
                | Instruction::Return
                | Instruction::RetRval
        )
    }

    /// Whether this is a jump-target or loop-head marker
    pub fn is_jump_target(&self) -> bool {
        matches!(self, Instruction::JumpTarget | Instruction::LoopHead { .. })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction as I;
        let name = self.name();
        match *self {
            I::Int32 { value } => write!(f, "{name} {value}"),
            I::Double { idx }
            | I::String { idx }
            | I::BigInt { idx }
            | I::RegExp { idx }
            | I::TemplateObject { idx } => write!(f, "{name} #{}", idx.0),
            I::ResumeIndex { index } => write!(f, "{name} {}", index.0),
            I::ResumeKind { kind } => write!(f, "{name} {kind:?}"),
            I::PopN { count } => write!(f, "{name} {count}"),
            I::DupAt { n } => write!(f, "{name} {n}"),
            I::Pick { n } | I::Unpick { n } => write!(f, "{name} {n}"),
            I::GetArg { index } | I::SetArg { index } => write!(f, "{name} {index}"),
            I::GetLocal { slot }
            | I::SetLocal { slot }
            | I::InitLexical { slot }
            | I::CheckLexical { slot } => write!(f, "{name} {}", slot.0),
            I::GetAliasedVar { coord }
            | I::SetAliasedVar { coord }
            | I::InitAliasedLexical { coord }
            | I::CheckAliasedLexical { coord } => {
                write!(f, "{name} hops={} slot={}", coord.hops, coord.slot)
            }
            I::GetName { name: idx }
            | I::SetName { name: idx }
            | I::GetGName { name: idx }
            | I::SetGName { name: idx }
            | I::DelName { name: idx }
            | I::ThrowSetConst { name: idx }
            | I::GetProp { name: idx }
            | I::SetProp { name: idx }
            | I::DelProp { name: idx }
            | I::InitProp { name: idx }
            | I::InitPropGetter { name: idx }
            | I::InitPropSetter { name: idx } => write!(f, "{name} #{}", idx.0),
            I::PushLexicalEnv { scope }
            | I::PushVarEnv { scope }
            | I::EnterWith { scope }
            | I::GlobalOrEvalDeclInstantiation { scope } => write!(f, "{name} scope={}", scope.0),
            I::NewArray { length } => write!(f, "{name} {length}"),
            I::InitElemArray { index } => write!(f, "{name} {index}"),
            I::Lambda { func } => write!(f, "{name} fn={}", func.0),
            I::SetFunName { prefix } => write!(f, "{name} {prefix:?}"),
            I::Class { func, derived } => write!(f, "{name} fn={} derived={derived}", func.0),
            I::Call { argc }
            | I::CallIgnoresRv { argc }
            | I::New { argc }
            | I::SuperCall { argc } => write!(f, "{name} argc={argc}"),
            I::CheckIsObj { kind } => write!(f, "{name} {kind:?}"),
            I::InitialYield { resume } | I::Yield { resume } | I::Await { resume } => {
                write!(f, "{name} resume={}", resume.0)
            }
            I::IterResult { done } => write!(f, "{name} done={done}"),
            I::LoopHead { depth } => write!(f, "{name} depth={depth}"),
            I::ThrowMsg { kind } => write!(f, "{name} {kind:?}"),
            _ => match self.jump_offset() {
                Some(offset) => write!(f, "{name} {:+}", offset.0),
                None => f.write_str(name),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        let ops = [
            Opcode::Undefined,
            Opcode::Add,
            Opcode::Call,
            Opcode::Goto,
            Opcode::Retsub,
        ];

        for op in ops {
            let byte = op as u8;
            assert_eq!(Opcode::from_byte(byte), Some(op));
        }
    }

    #[test]
    fn test_invalid_opcode() {
        assert_eq!(Opcode::from_byte(0xFF), None);
    }

    #[test]
    fn test_opcode_name() {
        assert_eq!(Opcode::Add.name(), "Add");
        assert_eq!(Instruction::Gosub { offset: JumpOffset(3) }.name(), "Gosub");
    }

    #[test]
    fn test_operand_dependent_effects() {
        assert_eq!(Instruction::Call { argc: 3 }.nuses(), 5);
        assert_eq!(Instruction::New { argc: 1 }.nuses(), 4);
        assert_eq!(Instruction::PopN { count: 4 }.stack_effect(), -4);
        assert_eq!(Instruction::DupAt { n: 2 }.stack_effect(), 1);
        assert_eq!(Instruction::Pick { n: 3 }.stack_effect(), 0);
        let derived = Instruction::Class { func: FunctionIndex(0), derived: true };
        assert_eq!(derived.stack_effect(), 1);
        let base = Instruction::Class { func: FunctionIndex(0), derived: false };
        assert_eq!(base.stack_effect(), 2);
    }

    #[test]
    fn test_branch_depths() {
        let off = JumpOffset(4);
        assert_eq!(Instruction::IfEq { offset: off }.branch_depth(3), Some(2));
        assert_eq!(Instruction::Or { offset: off }.branch_depth(3), Some(3));
        assert_eq!(Instruction::Case { offset: off }.branch_depth(3), Some(1));
        assert_eq!(Instruction::Gosub { offset: off }.branch_depth(5), Some(5));
        assert_eq!(Instruction::Add.branch_depth(2), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Instruction::Goto { offset: JumpOffset(-3) }.to_string(), "Goto -3");
        assert_eq!(Instruction::Int32 { value: 7 }.to_string(), "Int32 7");
        assert_eq!(Instruction::Dup.to_string(), "Dup");
    }
}
