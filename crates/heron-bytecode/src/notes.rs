//! Source notes
//!
//! A side table of `(delta, kind)` records parallel to the instruction
//! stream. Each note applies to the instruction at the running offset
//! obtained by summing deltas. Notes carry line/column movement and
//! structural hints for debuggers and profilers; nothing in the instruction
//! stream reads them.

use serde::{Deserialize, Serialize};

/// Largest delta a single note carries; larger gaps are padded with `XDelta`.
pub const MAX_NOTE_DELTA: u32 = 255;

/// Kind of a source note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SrcNoteKind {
    /// Bump the line by one and reset the column
    NewLine,
    /// Jump to an absolute line and reset the column
    SetLine {
        /// New line number
        line: u32,
    },
    /// Move the column by a signed amount
    ColSpan {
        /// Column delta
        delta: i32,
    },
    /// Padding for offset gaps larger than `MAX_NOTE_DELTA`
    XDelta,
    /// The instruction is the operator of a compound assignment
    AssignOp,
    /// Good place for a line breakpoint
    Breakpoint,
    /// Step separator inside a single line
    StepSep,
    /// Loop head; the closing backward jump is `back_jump` instructions later
    Loop {
        /// Distance from the loop head to the loop-closing jump
        back_jump: u32,
    },
}

/// A single source note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrcNote {
    /// Offset delta from the previous note
    pub delta: u32,
    /// What the note says
    pub kind: SrcNoteKind,
}

/// A source position recovered from the notes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePosition {
    /// Instruction offset
    pub offset: u32,
    /// Line number
    pub line: u32,
    /// Column number
    pub column: u32,
}

/// Source note table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceNotes {
    notes: Vec<SrcNote>,
    last_offset: u32,
}

impl SourceNotes {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a note for the instruction at `offset`.
    ///
    /// Offsets must be non-decreasing.
    pub fn add(&mut self, offset: u32, kind: SrcNoteKind) -> usize {
        debug_assert!(offset >= self.last_offset, "source notes must be appended in order");
        let mut delta = offset - self.last_offset;
        while delta > MAX_NOTE_DELTA {
            self.notes.push(SrcNote {
                delta: MAX_NOTE_DELTA,
                kind: SrcNoteKind::XDelta,
            });
            delta -= MAX_NOTE_DELTA;
        }
        self.notes.push(SrcNote { delta, kind });
        self.last_offset = offset;
        self.notes.len() - 1
    }

    /// Rewrite the operand of an already appended note (loop notes learn
    /// their back-jump distance once the loop is closed).
    pub fn update(&mut self, index: usize, kind: SrcNoteKind) {
        if let Some(note) = self.notes.get_mut(index) {
            note.kind = kind;
        }
    }

    /// Append all notes of `other`, whose offsets are relative to `base`.
    pub fn append(&mut self, other: &SourceNotes, base: u32) {
        for (offset, kind) in other.iter() {
            if kind != SrcNoteKind::XDelta {
                self.add(base + offset, kind);
            }
        }
    }

    /// Offset of the last note
    pub fn last_offset(&self) -> u32 {
        self.last_offset
    }

    /// Number of notes (padding included)
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    /// Whether there are no notes
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Raw notes
    pub fn notes(&self) -> &[SrcNote] {
        &self.notes
    }

    /// Iterate notes with their absolute offsets
    pub fn iter(&self) -> impl Iterator<Item = (u32, SrcNoteKind)> + '_ {
        self.notes.iter().scan(0u32, |offset, note| {
            *offset += note.delta;
            Some((*offset, note.kind))
        })
    }

    /// Replay line/column movement starting from the script's position.
    ///
    /// One entry per position-changing note.
    pub fn positions(&self, line: u32, column: u32) -> Vec<SourcePosition> {
        let mut line = line;
        let mut column = column;
        let mut out = Vec::new();
        for (offset, kind) in self.iter() {
            match kind {
                SrcNoteKind::NewLine => {
                    line += 1;
                    column = 0;
                }
                SrcNoteKind::SetLine { line: new } => {
                    line = new;
                    column = 0;
                }
                SrcNoteKind::ColSpan { delta } => {
                    column = column.saturating_add_signed(delta);
                }
                _ => continue,
            }
            out.push(SourcePosition {
                offset,
                line,
                column,
            });
        }
        out
    }

    /// Source position of the instruction at `offset`
    pub fn position_of(&self, offset: u32, line: u32, column: u32) -> (u32, u32) {
        self.positions(line, column)
            .iter()
            .take_while(|p| p.offset <= offset)
            .last()
            .map(|p| (p.line, p.column))
            .unwrap_or((line, column))
    }
}
