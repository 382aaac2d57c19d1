//! Instruction buffer
//!
//! Two append-only sections (prologue and main) sharing one virtual stack
//! depth. Every append adjusts the depth by the instruction's static stack
//! effect; the maximum is what the runtime allocates for the frame. Source
//! annotations are recorded per section and merged when the script is built.

use heron_bytecode::{Instruction, SourceNotes, SrcNoteKind};

use crate::ast::Span;
use crate::config::EmitterConfig;
use crate::error::{EmitError, EmitResult};

/// Section being appended to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    /// Administrative setup that runs before the body
    Prologue,
    /// The body
    Main,
}

#[derive(Debug, Default)]
struct SectionData {
    code: Vec<Instruction>,
    notes: SourceNotes,
    line: u32,
    column: u32,
    last_target: Option<u32>,
}

/// Contents of a finished buffer
#[derive(Debug)]
pub struct FinishedCode {
    /// Prologue instructions
    pub prologue: Vec<Instruction>,
    /// Main instructions
    pub main: Vec<Instruction>,
    /// Prologue annotations
    pub prologue_notes: SourceNotes,
    /// Main annotations, main-relative
    pub main_notes: SourceNotes,
    /// Deepest stack reached
    pub max_depth: u32,
}

/// Instruction buffer with depth tracking
#[derive(Debug)]
pub struct CodeBuffer {
    prologue: SectionData,
    main: SectionData,
    section: Section,
    depth: u32,
    max_depth: u32,
    reachable: bool,
    pub(crate) open_jumps: usize,
    max_length: usize,
    max_stack: u32,
    notes_enabled: bool,
}

impl CodeBuffer {
    /// Create an empty buffer starting at `line`/`column`
    pub fn new(config: &EmitterConfig, line: u32, column: u32) -> Self {
        let start = |line, column| SectionData {
            line,
            column,
            ..SectionData::default()
        };
        Self {
            prologue: start(line, column),
            main: start(line, column),
            section: Section::Main,
            depth: 0,
            max_depth: 0,
            reachable: true,
            open_jumps: 0,
            max_length: config.max_code_length,
            max_stack: config.max_stack_depth,
            notes_enabled: config.source_notes,
        }
    }

    fn current(&self) -> &SectionData {
        match self.section {
            Section::Prologue => &self.prologue,
            Section::Main => &self.main,
        }
    }

    fn current_mut(&mut self) -> &mut SectionData {
        match self.section {
            Section::Prologue => &mut self.prologue,
            Section::Main => &mut self.main,
        }
    }

    /// Append an instruction, returning its section-relative offset
    pub fn emit(&mut self, instruction: Instruction) -> EmitResult<u32> {
        if self.prologue.code.len() + self.main.code.len() >= self.max_length {
            return Err(EmitError::CodeTooLong {
                max: self.max_length,
            });
        }

        let uses = instruction.nuses();
        debug_assert!(
            self.depth >= uses || !self.reachable,
            "{instruction} pops {uses} values at depth {}",
            self.depth
        );
        self.depth = self.depth.saturating_sub(uses) + instruction.ndefs();
        if self.depth > self.max_depth {
            if self.depth > self.max_stack {
                return Err(EmitError::StackTooDeep {
                    max: self.max_stack,
                });
            }
            self.max_depth = self.depth;
        }

        let section = self.current_mut();
        let offset = section.code.len() as u32;
        section.code.push(instruction);
        section.last_target = match instruction {
            Instruction::JumpTarget => Some(offset),
            _ => None,
        };
        self.reachable = !instruction.is_terminator();
        Ok(offset)
    }

    /// Offset the next instruction will get in the current section
    pub fn offset(&self) -> u32 {
        self.current().code.len() as u32
    }

    /// Current virtual stack depth
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Force the depth; used where control arrives from a jump or a handler
    pub fn set_depth(&mut self, depth: u32) {
        self.depth = depth;
        self.max_depth = self.max_depth.max(depth);
    }

    /// Deepest stack so far
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Whether the next instruction can be reached by falling through
    pub fn is_reachable(&self) -> bool {
        self.reachable
    }

    pub(crate) fn set_reachable(&mut self, reachable: bool) {
        self.reachable = reachable;
    }

    /// Offset of a `JumpTarget` that is the last instruction, if any
    pub(crate) fn trailing_target(&self) -> Option<u32> {
        self.current().last_target
    }

    /// Section being appended to
    pub fn section(&self) -> Section {
        self.section
    }

    /// Switch sections, returning the previous one
    pub fn switch_to(&mut self, section: Section) -> Section {
        std::mem::replace(&mut self.section, section)
    }

    /// Instruction at a section-relative offset in the current section
    pub fn instruction_mut(&mut self, offset: u32) -> Option<&mut Instruction> {
        self.current_mut().code.get_mut(offset as usize)
    }

    /// Instruction at a section-relative offset in the current section
    pub fn instruction(&self, offset: u32) -> Option<&Instruction> {
        self.current().code.get(offset as usize)
    }

    /// Record line/column movement for the next instruction
    pub fn update_position(&mut self, span: Span) {
        if !self.notes_enabled || span.line == 0 {
            return;
        }
        let offset = self.offset();
        let section = self.current_mut();
        if span.line != section.line {
            let kind = if span.line == section.line + 1 {
                SrcNoteKind::NewLine
            } else {
                SrcNoteKind::SetLine { line: span.line }
            };
            section.notes.add(offset, kind);
            section.line = span.line;
            section.column = 0;
        }
        if span.column != section.column {
            let delta = span.column as i64 - section.column as i64;
            section.notes.add(
                offset,
                SrcNoteKind::ColSpan {
                    delta: delta as i32,
                },
            );
            section.column = span.column;
        }
    }

    /// Attach a structural note to the next instruction
    pub fn add_note(&mut self, kind: SrcNoteKind) -> Option<usize> {
        if !self.notes_enabled {
            return None;
        }
        let offset = self.offset();
        Some(self.current_mut().notes.add(offset, kind))
    }

    /// Rewrite a structural note
    pub fn update_note(&mut self, index: Option<usize>, kind: SrcNoteKind) {
        if let Some(index) = index {
            self.current_mut().notes.update(index, kind);
        }
    }

    /// Hand out the sections
    pub fn finish(self) -> FinishedCode {
        FinishedCode {
            prologue: self.prologue.code,
            main: self.main.code,
            prologue_notes: self.prologue.notes,
            main_notes: self.main.notes,
            max_depth: self.max_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_tracking() {
        let mut buf = CodeBuffer::new(&EmitterConfig::default(), 1, 0);
        buf.emit(Instruction::Undefined).unwrap();
        buf.emit(Instruction::Null).unwrap();
        buf.emit(Instruction::Add).unwrap();
        assert_eq!(buf.depth(), 1);
        assert_eq!(buf.max_depth(), 2);
        buf.emit(Instruction::Return).unwrap();
        assert!(!buf.is_reachable());
    }

    #[test]
    fn test_sections() {
        let mut buf = CodeBuffer::new(&EmitterConfig::default(), 1, 0);
        buf.emit(Instruction::Nop).unwrap();
        let prev = buf.switch_to(Section::Prologue);
        assert_eq!(prev, Section::Main);
        assert_eq!(buf.offset(), 0);
        buf.emit(Instruction::Generator).unwrap();
        buf.emit(Instruction::Pop).unwrap();
        buf.switch_to(Section::Main);
        assert_eq!(buf.offset(), 1);
        let code = buf.finish();
        assert_eq!(code.prologue.len(), 2);
        assert_eq!(code.main, vec![Instruction::Nop]);
    }

    #[test]
    fn test_code_too_long() {
        let config = EmitterConfig::default().with_max_code_length(2);
        let mut buf = CodeBuffer::new(&config, 1, 0);
        buf.emit(Instruction::Nop).unwrap();
        buf.emit(Instruction::Nop).unwrap();
        assert_eq!(
            buf.emit(Instruction::Nop),
            Err(EmitError::CodeTooLong { max: 2 })
        );
    }

    #[test]
    fn test_stack_limit() {
        let config = EmitterConfig::default().with_max_stack_depth(1);
        let mut buf = CodeBuffer::new(&config, 1, 0);
        buf.emit(Instruction::Null).unwrap();
        assert_eq!(
            buf.emit(Instruction::Null),
            Err(EmitError::StackTooDeep { max: 1 })
        );
    }

    #[test]
    fn test_position_notes() {
        let mut buf = CodeBuffer::new(&EmitterConfig::default(), 1, 0);
        buf.update_position(Span::new(2, 4));
        buf.emit(Instruction::Nop).unwrap();
        buf.update_position(Span::new(9, 0));
        buf.emit(Instruction::Nop).unwrap();
        let code = buf.finish();
        let notes: Vec<_> = code.main_notes.iter().collect();
        assert_eq!(
            notes,
            vec![
                (0, SrcNoteKind::NewLine),
                (0, SrcNoteKind::ColSpan { delta: 4 }),
                (1, SrcNoteKind::SetLine { line: 9 }),
            ]
        );
    }
}
