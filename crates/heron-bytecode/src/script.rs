//! Compiled script representation

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::constant::{Constant, ConstantPool};
use crate::instruction::Instruction;
use crate::notes::SourceNotes;
use crate::operand::ScopeIndex;
use crate::scope::{ScopeNote, ScopeRecord};
use crate::trynote::TryNote;

/// Kind of compilation unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptKind {
    /// Classic script
    #[default]
    Global,
    /// Eval code
    Eval,
    /// Module
    Module,
    /// Function body
    Function,
}

/// Script flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptFlags {
    /// Strict mode code
    pub is_strict: bool,
    /// Generator function
    pub is_generator: bool,
    /// Async function
    pub is_async: bool,
    /// Arrow function
    pub is_arrow: bool,
    /// Method, getter, setter or class constructor
    pub is_method: bool,
    /// Class constructor
    pub is_class_constructor: bool,
    /// Constructor of a class with `extends`
    pub is_derived_constructor: bool,
    /// Has a rest parameter
    pub has_rest: bool,
    /// Has defaulted or destructured parameters
    pub has_parameter_expressions: bool,
    /// Contains a sloppy direct eval
    pub has_direct_eval: bool,
}

/// Line/column of a construct
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Line (1-based)
    pub line: u32,
    /// Column (0-based)
    pub column: u32,
}

impl Position {
    /// Create a position
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Placeholder for a function whose body is compiled on first call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LazyScript {
    /// Function name
    pub name: Option<Box<str>>,
    /// Start of the function source
    pub start: Position,
    /// End of the function source
    pub end: Position,
    /// Flags known before compiling the body
    pub flags: ScriptFlags,
    /// Innermost scope of the parent enclosing the function
    pub enclosing_scope: Option<ScopeIndex>,
    /// Declared parameter count (`length`)
    pub param_count: u16,
}

/// A nested function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FunctionRecord {
    /// Fully compiled body
    Compiled(Box<Script>),
    /// Deferred body
    Lazy(LazyScript),
}

impl FunctionRecord {
    /// Function name
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Compiled(script) => script.name.as_deref(),
            Self::Lazy(lazy) => lazy.name.as_deref(),
        }
    }

    /// Compiled script, if the body is not deferred
    pub fn as_compiled(&self) -> Option<&Script> {
        match self {
            Self::Compiled(script) => Some(script),
            Self::Lazy(_) => None,
        }
    }

    /// Whether the body is deferred
    pub fn is_lazy(&self) -> bool {
        matches!(self, Self::Lazy(_))
    }
}

/// A compiled script or function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    /// Function name
    pub name: Option<Box<str>>,
    /// Kind of unit
    pub kind: ScriptKind,
    /// Flags
    pub flags: ScriptFlags,
    /// Source position of the unit
    pub position: Position,
    /// Declared parameter count (`length`)
    pub param_count: u16,
    /// Number of formal parameters, rest excluded
    pub formal_count: u16,
    /// Prologue followed by main code
    pub code: Vec<Instruction>,
    /// Prologue length; main code starts here
    pub main_offset: u32,
    /// Maximum operand stack depth
    pub max_stack_depth: u32,
    /// Number of fixed frame slots
    pub frame_slots: u32,
    /// Constant pool
    pub constants: ConstantPool,
    /// Nested functions, indexed by `Lambda`/`Class` operands
    pub functions: Vec<FunctionRecord>,
    /// Scope table
    pub scopes: Vec<ScopeRecord>,
    /// Scope ranges
    pub scope_notes: Vec<ScopeNote>,
    /// Exception/cleanup regions, innermost first
    pub try_notes: Vec<TryNote>,
    /// Source annotations
    pub source_notes: SourceNotes,
    /// Resume index → instruction offset
    pub resume_offsets: Vec<u32>,
}

impl Script {
    /// Create a new script builder
    pub fn builder() -> ScriptBuilder {
        ScriptBuilder::new()
    }

    /// Get function name for display
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }

    /// Main code, prologue excluded
    pub fn main_code(&self) -> &[Instruction] {
        &self.code[self.main_offset as usize..]
    }

    /// Prologue code
    pub fn prologue(&self) -> &[Instruction] {
        &self.code[..self.main_offset as usize]
    }

    /// Absolute target of the jump at `offset`
    pub fn jump_target(&self, offset: usize) -> Option<usize> {
        let jump = self.code.get(offset)?.jump_offset()?;
        usize::try_from(offset as i64 + i64::from(jump.offset())).ok()
    }

    /// Nested function by index
    pub fn function(&self, index: u32) -> Option<&FunctionRecord> {
        self.functions.get(index as usize)
    }

    /// Count instructions with the given name
    pub fn count_of(&self, name: &str) -> usize {
        self.code.iter().filter(|i| i.name() == name).count()
    }

    /// Human readable listing
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "; {} (stack {}, slots {}, main @{})",
            self.display_name(),
            self.max_stack_depth,
            self.frame_slots,
            self.main_offset
        );
        for (offset, instruction) in self.code.iter().enumerate() {
            if offset as u32 == self.main_offset && self.main_offset != 0 {
                out.push_str("main:\n");
            }
            let _ = write!(out, "{offset:05} {instruction}");
            if let Some(target) = self.jump_target(offset) {
                let _ = write!(out, " (-> {target:05})");
            }
            if let Some(comment) = self.operand_comment(instruction) {
                let _ = write!(out, " ; {comment}");
            }
            out.push('\n');
        }
        for note in &self.try_notes {
            let _ = writeln!(
                out,
                "try {:?} depth={} [{:05}, {:05})",
                note.kind,
                note.depth,
                note.start,
                note.end()
            );
        }
        out
    }

    fn operand_comment(&self, instruction: &Instruction) -> Option<String> {
        use Instruction as I;
        let idx = match *instruction {
            I::String { idx } | I::Double { idx } | I::BigInt { idx } => idx,
            I::GetName { name }
            | I::SetName { name }
            | I::GetGName { name }
            | I::SetGName { name }
            | I::DelName { name }
            | I::ThrowSetConst { name }
            | I::GetProp { name }
            | I::SetProp { name }
            | I::DelProp { name }
            | I::InitProp { name }
            | I::InitPropGetter { name }
            | I::InitPropSetter { name } => name,
            I::Lambda { func } | I::Class { func, .. } => {
                return self
                    .function(func.0)
                    .map(|f| f.name().unwrap_or("<anonymous>").to_string());
            }
            _ => return None,
        };
        match self.constants.get(idx.0)? {
            Constant::String(s) => Some(format!("{s:?}")),
            Constant::Number(n) => Some(n.to_string()),
            Constant::BigInt(s) => Some(format!("{s}n")),
            _ => None,
        }
    }

    /// Dump as JSON, for tooling and snapshots
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Builder for creating scripts
#[derive(Debug, Default)]
pub struct ScriptBuilder {
    name: Option<Box<str>>,
    kind: ScriptKind,
    flags: ScriptFlags,
    position: Position,
    param_count: u16,
    formal_count: u16,
    prologue: Vec<Instruction>,
    main: Vec<Instruction>,
    max_stack_depth: u32,
    frame_slots: u32,
    constants: ConstantPool,
    functions: Vec<FunctionRecord>,
    scopes: Vec<ScopeRecord>,
    scope_notes: Vec<ScopeNote>,
    try_notes: Vec<TryNote>,
    source_notes: SourceNotes,
    resume_offsets: Vec<u32>,
}

impl ScriptBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set function name
    pub fn name(mut self, name: impl Into<Box<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set unit kind
    pub fn kind(mut self, kind: ScriptKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set flags
    pub fn flags(mut self, flags: ScriptFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set source position
    pub fn position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Set declared and formal parameter counts
    pub fn params(mut self, param_count: u16, formal_count: u16) -> Self {
        self.param_count = param_count;
        self.formal_count = formal_count;
        self
    }

    /// Set prologue and main code
    pub fn code(mut self, prologue: Vec<Instruction>, main: Vec<Instruction>) -> Self {
        self.prologue = prologue;
        self.main = main;
        self
    }

    /// Add a single main instruction
    pub fn instruction(mut self, instruction: Instruction) -> Self {
        self.main.push(instruction);
        self
    }

    /// Set maximum stack depth
    pub fn max_stack_depth(mut self, depth: u32) -> Self {
        self.max_stack_depth = depth;
        self
    }

    /// Set frame slot count
    pub fn frame_slots(mut self, slots: u32) -> Self {
        self.frame_slots = slots;
        self
    }

    /// Set constant pool
    pub fn constants(mut self, constants: ConstantPool) -> Self {
        self.constants = constants;
        self
    }

    /// Set nested functions
    pub fn functions(mut self, functions: Vec<FunctionRecord>) -> Self {
        self.functions = functions;
        self
    }

    /// Set scope table and scope notes (main-relative offsets)
    pub fn scopes(mut self, scopes: Vec<ScopeRecord>, notes: Vec<ScopeNote>) -> Self {
        self.scopes = scopes;
        self.scope_notes = notes;
        self
    }

    /// Set try notes (main-relative offsets)
    pub fn try_notes(mut self, notes: Vec<TryNote>) -> Self {
        self.try_notes = notes;
        self
    }

    /// Set prologue and main source notes. Call after [`Self::code`].
    pub fn source_notes(mut self, prologue: SourceNotes, main: SourceNotes) -> Self {
        let mut notes = prologue;
        notes.append(&main, self.prologue.len() as u32);
        self.source_notes = notes;
        self
    }

    /// Set resume offsets (main-relative)
    pub fn resume_offsets(mut self, offsets: Vec<u32>) -> Self {
        self.resume_offsets = offsets;
        self
    }

    /// Build the script, rebasing main-relative offsets past the prologue
    pub fn build(self) -> Script {
        let main_offset = self.prologue.len() as u32;
        let mut code = self.prologue;
        code.extend(self.main);

        let try_notes = self
            .try_notes
            .into_iter()
            .map(|mut n| {
                n.start += main_offset;
                n
            })
            .collect();
        let scope_notes = self
            .scope_notes
            .into_iter()
            .map(|mut n| {
                n.start += main_offset;
                n
            })
            .collect();
        let resume_offsets = self
            .resume_offsets
            .into_iter()
            .map(|o| o + main_offset)
            .collect();

        Script {
            name: self.name,
            kind: self.kind,
            flags: self.flags,
            position: self.position,
            param_count: self.param_count,
            formal_count: self.formal_count,
            code,
            main_offset,
            max_stack_depth: self.max_stack_depth,
            frame_slots: self.frame_slots,
            constants: self.constants,
            functions: self.functions,
            scopes: self.scopes,
            scope_notes,
            try_notes,
            source_notes: self.source_notes,
            resume_offsets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::SrcNoteKind;
    use crate::operand::JumpOffset;
    use crate::trynote::TryNoteKind;

    #[test]
    fn test_script_builder() {
        let mut prologue_notes = SourceNotes::new();
        prologue_notes.add(0, SrcNoteKind::Breakpoint);
        let mut main_notes = SourceNotes::new();
        main_notes.add(1, SrcNoteKind::NewLine);

        let script = Script::builder()
            .name("f")
            .code(
                vec![Instruction::Generator, Instruction::Pop],
                vec![Instruction::Undefined, Instruction::Return],
            )
            .try_notes(vec![TryNote {
                kind: TryNoteKind::Loop,
                depth: 0,
                start: 0,
                length: 1,
            }])
            .source_notes(prologue_notes, main_notes)
            .resume_offsets(vec![1])
            .max_stack_depth(1)
            .build();

        assert_eq!(script.main_offset, 2);
        assert_eq!(script.code.len(), 4);
        assert_eq!(script.main_code()[0], Instruction::Undefined);
        assert_eq!(script.try_notes[0].start, 2);
        assert_eq!(script.resume_offsets, vec![3]);
        let notes: Vec<_> = script.source_notes.iter().collect();
        assert_eq!(notes[1], (3, SrcNoteKind::NewLine));
    }

    #[test]
    fn test_disassemble() {
        let mut constants = ConstantPool::new();
        let name = constants.add_string("x");
        let script = Script::builder()
            .name("main")
            .constants(constants)
            .instruction(Instruction::GetGName {
                name: crate::operand::ConstantIndex(name),
            })
            .instruction(Instruction::IfEq {
                offset: JumpOffset(2),
            })
            .instruction(Instruction::Nop)
            .instruction(Instruction::RetRval)
            .build();

        let text = script.disassemble();
        assert!(text.contains("GetGName #0 ; \"x\""));
        assert!(text.contains("IfEq +2 (-> 00003)"));
        assert_eq!(script.count_of("Nop"), 1);
    }

    #[test]
    fn test_json_dump() {
        let script = Script::builder()
            .name("f")
            .instruction(Instruction::RetRval)
            .build();
        let json = script.to_json().unwrap();
        assert!(json.contains("\"RetRval\""));
    }
}
