//! Emitter core
//!
//! One [`Emitter`] compiles one unit (script, eval code or function body).
//! It owns the instruction buffer, the scope and control stacks and every side
//! table; nested functions are compiled by fresh instances that only see an
//! immutable snapshot of this unit's scope chain.

use std::rc::Rc;

use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use tracing::debug;

use heron_bytecode::{
    ConstantIndex, ConstantPool, FunctionRecord, Instruction, JumpOffset, LocalSlot, Position,
    ResumeIndex, Script, ScriptFlags, ScriptKind, ScopeKind, TryNote, TryNoteKind,
};

use crate::ast::{Atom, BindingKind, FunctionNode, ScopeData, Span};
use crate::buffer::{CodeBuffer, Section};
use crate::config::EmitterConfig;
use crate::control::ControlStack;
use crate::error::{EmitError, EmitResult, Warning};
use crate::jump::{JumpList, JumpTarget};
use crate::scope::{EnclosingScope, NameLocation, ResolvedName, ScopeHandle, ScopeStack};

/// Result of compiling one unit
#[derive(Debug)]
pub struct EmitOutput {
    /// The compiled unit; nested functions are in its function table
    pub script: Script,
    /// Diagnostics from this unit and every eagerly compiled nested unit
    pub warnings: Vec<Warning>,
    /// Functions emitted as lazy placeholders, to be compiled on first call
    pub lazy: Vec<LazyUnit>,
}

/// A deferred function body
#[derive(Debug, Clone)]
pub struct LazyUnit {
    /// Function table indices leading from the root script to the placeholder
    pub path: Vec<u32>,
    /// The function
    pub function: Rc<FunctionNode>,
    /// Scope chain of the enclosing unit at the point of definition
    pub enclosing: Option<Rc<EnclosingScope>>,
    /// Whether the enclosing code is strict
    pub strict: bool,
}

/// How a store resolves its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flavor {
    /// `var` declaration: no dead-zone or const checks
    Declare,
    /// Lexical initialization, parameters, catch parameters
    Initialize,
    /// Plain assignment
    Assign,
}

/// Per-unit facts the lowerings consult
#[derive(Debug, Clone, Default)]
pub(crate) struct Unit {
    pub name: Option<Atom>,
    pub kind: ScriptKind,
    pub flags: ScriptFlags,
    pub span: Span,
    pub param_count: u16,
    pub formal_count: u16,
    /// Frame slot holding the generator / async function object
    pub generator: Option<LocalSlot>,
    /// Class constructor that must run the instance field initializer
    pub runs_field_initializer: bool,
    /// Derived class constructor, or an arrow whose `super()` belongs to one
    pub in_derived_constructor: bool,
}

/// Bytecode emitter for one compilation unit
#[derive(Debug)]
pub struct Emitter {
    pub(crate) config: EmitterConfig,
    pub(crate) code: CodeBuffer,
    constants: ConstantPool,
    pub(crate) functions: Vec<FunctionRecord>,
    pub(crate) scopes: ScopeStack,
    pub(crate) controls: ControlStack,
    pub(crate) try_notes: Vec<TryNote>,
    resume_offsets: Vec<Option<u32>>,
    pub(crate) warnings: Vec<Warning>,
    pub(crate) unit: Unit,
    pub(crate) hoisted: FxHashSet<*const FunctionNode>,
    pub(crate) lazy: Vec<LazyUnit>,
    pub(crate) path: Vec<u32>,
}

impl Emitter {
    pub(crate) fn new_unit(
        config: EmitterConfig,
        enclosing: Option<Rc<EnclosingScope>>,
        path: Vec<u32>,
        span: Span,
    ) -> Self {
        Self {
            code: CodeBuffer::new(&config, span.line, span.column),
            constants: ConstantPool::new(),
            functions: Vec::new(),
            scopes: ScopeStack::new(enclosing, config.max_frame_slots),
            controls: ControlStack::new(),
            try_notes: Vec::new(),
            resume_offsets: Vec::new(),
            warnings: Vec::new(),
            unit: Unit {
                span,
                ..Unit::default()
            },
            hoisted: FxHashSet::default(),
            lazy: Vec::new(),
            path,
            config,
        }
    }

    /// Whether the unit is strict mode code
    pub(crate) fn is_strict(&self) -> bool {
        self.unit.flags.is_strict
    }

    // ==================== Instructions ====================

    /// Append an instruction
    pub(crate) fn emit(&mut self, instruction: Instruction) -> EmitResult<u32> {
        self.code.emit(instruction)
    }

    /// Append a sequence of instructions
    pub(crate) fn emit_all(&mut self, instructions: &[Instruction]) -> EmitResult<()> {
        for instruction in instructions {
            self.code.emit(*instruction)?;
        }
        Ok(())
    }

    /// Record a source position for the next instruction
    pub(crate) fn position(&mut self, span: Span) {
        self.code.update_position(span);
    }

    /// Pop values until the stack is `depth` deep
    pub(crate) fn pop_to(&mut self, depth: u32) -> EmitResult<()> {
        let current = self.code.depth();
        debug_assert!(current >= depth, "cannot pop from {current} up to {depth}");
        match current.saturating_sub(depth) {
            0 => {}
            1 => {
                self.emit(Instruction::Pop)?;
            }
            n => {
                let count = u16::try_from(n).map_err(|_| EmitError::StackTooDeep {
                    max: u32::from(u16::MAX),
                })?;
                self.emit(Instruction::PopN { count })?;
            }
        }
        Ok(())
    }

    /// Push a number, as an immediate when it fits
    pub(crate) fn emit_number(&mut self, value: f64) -> EmitResult<()> {
        let is_int = value.fract() == 0.0
            && value >= f64::from(i32::MIN)
            && value <= f64::from(i32::MAX)
            && !(value == 0.0 && value.is_sign_negative());
        if is_int {
            self.emit(Instruction::Int32 {
                value: value as i32,
            })?;
        } else {
            let idx = self.number(value)?;
            self.emit(Instruction::Double { idx })?;
        }
        Ok(())
    }

    /// Push a string constant
    pub(crate) fn emit_string(&mut self, value: &str) -> EmitResult<()> {
        let idx = self.atom(value)?;
        self.emit(Instruction::String { idx })?;
        Ok(())
    }

    // ==================== Constants ====================

    fn check_constants(&self) -> EmitResult<()> {
        if self.constants.len() >= self.config.max_constants {
            return Err(EmitError::TooManyConstants {
                max: self.config.max_constants,
            });
        }
        Ok(())
    }

    /// Intern a string constant
    pub(crate) fn atom(&mut self, value: &str) -> EmitResult<ConstantIndex> {
        self.check_constants()?;
        Ok(ConstantIndex::new(self.constants.add_string(value)))
    }

    /// Intern a number constant
    pub(crate) fn number(&mut self, value: f64) -> EmitResult<ConstantIndex> {
        self.check_constants()?;
        Ok(ConstantIndex::new(self.constants.add_number(value)))
    }

    /// Add an arbitrary constant
    pub(crate) fn constant(&mut self, value: heron_bytecode::Constant) -> EmitResult<ConstantIndex> {
        self.check_constants()?;
        Ok(ConstantIndex::new(self.constants.add(value)))
    }

    // ==================== Jumps ====================

    /// Emit a forward jump
    pub(crate) fn open_jump(&mut self, jump: Instruction) -> EmitResult<JumpList> {
        self.code.open_jump(jump)
    }

    /// Emit a placeholder `Goto`
    pub(crate) fn goto(&mut self) -> EmitResult<JumpList> {
        self.open_jump(Instruction::Goto {
            offset: JumpOffset::UNPATCHED,
        })
    }

    /// Emit a placeholder conditional jump taken when the popped value is false
    pub(crate) fn if_false(&mut self) -> EmitResult<JumpList> {
        self.open_jump(Instruction::IfEq {
            offset: JumpOffset::UNPATCHED,
        })
    }

    /// Emit a placeholder conditional jump taken when the popped value is true
    pub(crate) fn if_true(&mut self) -> EmitResult<JumpList> {
        self.open_jump(Instruction::IfNe {
            offset: JumpOffset::UNPATCHED,
        })
    }

    /// Start a basic block here
    pub(crate) fn mark(&mut self) -> EmitResult<JumpTarget> {
        self.scopes.clear_tdz_cache();
        self.code.mark()
    }

    /// Patch `list` to the current offset, starting a basic block
    pub(crate) fn patch_to_here(&mut self, list: JumpList) -> EmitResult<()> {
        if !list.is_empty() {
            self.scopes.clear_tdz_cache();
        }
        self.code.patch_to_here(list)?;
        Ok(())
    }

    /// Patch `list` to a known target
    pub(crate) fn patch(&mut self, list: JumpList, target: JumpTarget) {
        self.code.patch(list, target);
    }

    /// Emit a loop head
    pub(crate) fn loop_head(&mut self) -> EmitResult<JumpTarget> {
        self.scopes.clear_tdz_cache();
        let nesting = self.controls.loop_depth();
        self.code.mark_loop_head(nesting)
    }

    /// Jump back to a loop head
    pub(crate) fn goto_back(&mut self, target: JumpTarget) -> EmitResult<()> {
        self.code.emit_backward_jump(
            Instruction::Goto {
                offset: JumpOffset::UNPATCHED,
            },
            target,
        )
    }

    // ==================== Side tables ====================

    /// Current main-section offset, if emitting main code
    pub(crate) fn main_offset(&self) -> Option<u32> {
        (self.code.section() == Section::Main).then(|| self.code.offset())
    }

    /// Record a try note covering `[start, end)` of the main section
    pub(crate) fn add_try_note(&mut self, kind: TryNoteKind, depth: u32, start: u32, end: u32) {
        debug_assert_eq!(self.code.section(), Section::Main);
        self.try_notes.push(TryNote {
            kind,
            depth,
            start,
            length: end - start,
        });
    }

    /// Allocate a resume index; its offset is bound later
    pub(crate) fn alloc_resume(&mut self) -> ResumeIndex {
        self.resume_offsets.push(None);
        ResumeIndex::new(self.resume_offsets.len() as u32 - 1)
    }

    /// Bind a resume index to the current offset
    pub(crate) fn bind_resume(&mut self, index: ResumeIndex) -> EmitResult<()> {
        let target = self.mark()?;
        debug_assert!(self.resume_offsets[index.0 as usize].is_none());
        self.resume_offsets[index.0 as usize] = Some(target.offset);
        Ok(())
    }

    // ==================== Scopes ====================

    /// Enter a block-like scope, creating its environment and putting its
    /// frame lexicals in the dead zone.
    pub(crate) fn enter_scope(
        &mut self,
        kind: ScopeKind,
        data: &ScopeData,
    ) -> EmitResult<ScopeHandle> {
        let offset = self.main_offset();
        let handle = self.scopes.enter(kind, &data.bindings, &[], offset)?;
        if self.scopes.record(handle.index()).has_environment {
            self.emit(Instruction::PushLexicalEnv {
                scope: handle.index(),
            })?;
        }
        self.init_dead_zone(&handle)?;
        Ok(handle)
    }

    /// Enter a scope only when the binder gave it bindings
    pub(crate) fn enter_optional_scope(
        &mut self,
        kind: ScopeKind,
        data: Option<&ScopeData>,
    ) -> EmitResult<Option<ScopeHandle>> {
        match data {
            Some(data) if !data.is_empty() => Ok(Some(self.enter_scope(kind, data)?)),
            _ => Ok(None),
        }
    }

    /// Store the uninitialized marker into every frame lexical of a scope
    pub(crate) fn init_dead_zone(&mut self, handle: &ScopeHandle) -> EmitResult<()> {
        for slot in self.scopes.frame_lexicals(handle) {
            self.emit_all(&[
                Instruction::Uninitialized,
                Instruction::InitLexical { slot },
                Instruction::Pop,
            ])?;
        }
        Ok(())
    }

    /// Leave a scope, detaching its environment on the fall-through path
    pub(crate) fn leave_scope(&mut self, handle: ScopeHandle) -> EmitResult<()> {
        if self.code.is_reachable()
            && let Some(exit) = self.scopes.exit_instruction(handle.depth())
        {
            self.emit(exit)?;
        }
        let offset = self.main_offset();
        self.scopes.leave(handle, offset);
        Ok(())
    }

    /// Leave an optional scope
    pub(crate) fn leave_optional_scope(&mut self, handle: Option<ScopeHandle>) -> EmitResult<()> {
        match handle {
            Some(handle) => self.leave_scope(handle),
            None => Ok(()),
        }
    }

    /// Emit exit code for the scopes at positions `depth..upto`, innermost
    /// first, without popping them from the resolver.
    pub(crate) fn emit_scope_exits(&mut self, depth: usize, upto: usize) -> EmitResult<()> {
        for scope in (depth..upto).rev() {
            if let Some(exit) = self.scopes.exit_instruction(scope) {
                self.emit(exit)?;
            }
        }
        Ok(())
    }

    // ==================== Names ====================

    fn emit_dead_zone_check(&mut self, resolved: &ResolvedName) -> EmitResult<()> {
        let Some(key) = resolved.tdz else {
            return Ok(());
        };
        match resolved.location {
            NameLocation::Frame(slot) => {
                self.emit(Instruction::CheckLexical { slot })?;
            }
            NameLocation::Environment(coord) => {
                self.emit(Instruction::CheckAliasedLexical { coord })?;
            }
            _ => return Ok(()),
        }
        self.scopes.mark_initialized(key);
        Ok(())
    }

    /// Push the value of a binding
    pub(crate) fn emit_get_name(&mut self, name: &str) -> EmitResult<()> {
        let resolved = self.scopes.resolve(name);
        self.emit_get_resolved(name, resolved)
    }

    pub(crate) fn emit_get_resolved(&mut self, name: &str, resolved: ResolvedName) -> EmitResult<()> {
        self.emit_dead_zone_check(&resolved)?;
        let instruction = match resolved.location {
            NameLocation::Argument(index) => Instruction::GetArg { index },
            NameLocation::Frame(slot) => Instruction::GetLocal { slot },
            NameLocation::Environment(coord) => Instruction::GetAliasedVar { coord },
            NameLocation::Global => Instruction::GetGName {
                name: self.atom(name)?,
            },
            NameLocation::Dynamic => Instruction::GetName {
                name: self.atom(name)?,
            },
        };
        self.emit(instruction)?;
        Ok(())
    }

    /// Store the top of stack into a binding, keeping the value
    pub(crate) fn emit_set_name(&mut self, name: &str, flavor: Flavor) -> EmitResult<()> {
        let resolved = self.scopes.resolve(name);
        self.emit_set_resolved(name, resolved, flavor)
    }

    pub(crate) fn emit_set_resolved(
        &mut self,
        name: &str,
        resolved: ResolvedName,
        flavor: Flavor,
    ) -> EmitResult<()> {
        let lexical = resolved.kind.is_some_and(BindingKind::is_lexical);
        if flavor == Flavor::Assign {
            self.emit_dead_zone_check(&resolved)?;
            if resolved.kind.is_some_and(BindingKind::is_const) {
                let name = self.atom(name)?;
                self.emit(Instruction::ThrowSetConst { name })?;
                return Ok(());
            }
        }

        let initialize = flavor == Flavor::Initialize && lexical;
        let instruction = match resolved.location {
            NameLocation::Argument(index) => Instruction::SetArg { index },
            NameLocation::Frame(slot) if initialize => Instruction::InitLexical { slot },
            NameLocation::Frame(slot) => Instruction::SetLocal { slot },
            NameLocation::Environment(coord) if initialize => {
                Instruction::InitAliasedLexical { coord }
            }
            NameLocation::Environment(coord) => Instruction::SetAliasedVar { coord },
            NameLocation::Global => Instruction::SetGName {
                name: self.atom(name)?,
            },
            NameLocation::Dynamic => Instruction::SetName {
                name: self.atom(name)?,
            },
        };
        self.emit(instruction)?;
        if initialize && let Some(key) = resolved.tdz {
            self.scopes.mark_initialized(key);
        }
        Ok(())
    }

    // ==================== Finish ====================

    /// Assemble the script
    pub(crate) fn finish(self) -> EmitResult<EmitOutput> {
        debug_assert_eq!(self.code.open_jumps, 0, "unpatched jumps at end of unit");
        debug_assert!(self.controls.is_empty(), "open control contexts at end of unit");
        debug_assert!(
            self.resume_offsets.iter().all(Option::is_some),
            "resume index without an offset"
        );

        let (scopes, scope_notes, frame_slots) = self.scopes.finish();
        let code = self.code.finish();
        debug!(
            name = self.unit.name.as_deref().unwrap_or("<top level>"),
            prologue = code.prologue.len(),
            main = code.main.len(),
            max_depth = code.max_depth,
            "emitted unit"
        );

        let mut builder = Script::builder();
        if let Some(name) = &self.unit.name {
            builder = builder.name(&**name);
        }
        let script = builder
            .kind(self.unit.kind)
            .flags(self.unit.flags)
            .position(Position::new(self.unit.span.line, self.unit.span.column))
            .params(self.unit.param_count, self.unit.formal_count)
            .code(code.prologue, code.main)
            .max_stack_depth(code.max_depth)
            .frame_slots(frame_slots)
            .constants(self.constants)
            .functions(self.functions)
            .scopes(scopes, scope_notes)
            .try_notes(self.try_notes)
            .source_notes(code.prologue_notes, code.main_notes)
            .resume_offsets(
                self.resume_offsets
                    .into_iter()
                    .map(Option::unwrap_or_default)
                    .collect(),
            )
            .build();

        Ok(EmitOutput {
            script,
            warnings: self.warnings,
            lazy: self.lazy,
        })
    }
}

/// Labels pending for the next statement
pub(crate) type Labels = SmallVec<[Atom; 1]>;
