//! Exception and cleanup regions
//!
//! A try note covers `[start, start + length)` and tells the runtime what to
//! do when an exception unwinds through that range. Notes are stored
//! innermost-first: a region is appended when it closes, so nested regions
//! always precede the regions enclosing them.

use serde::{Deserialize, Serialize};

/// What the runtime does for an exception leaving the region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TryNoteKind {
    /// Jump to the catch handler at the end of the region
    Catch,
    /// Jump to the finally block at the end of the region with `[true, exception]`
    Finally,
    /// Release the for-in iterator on the stack
    ForIn,
    /// Close the for-of iterator on the stack, keeping the original exception
    ForOf,
    /// Inline close of a for-of iterator on a break, continue or return.
    ///
    /// An exception leaving this region skips every later note up to and
    /// including the enclosing `ForOf` note at the same depth: the iterator
    /// is already being closed, and any handler between the two lies inside
    /// the loop being left.
    ForOfIterClose,
    /// Jump to the destructuring cleanup handler at the end of the region
    Destructuring,
    /// Loop body, for debuggers and profilers only
    Loop,
}

impl TryNoteKind {
    /// Whether the region ends with emitted handler code
    pub const fn has_handler(self) -> bool {
        matches!(self, Self::Catch | Self::Finally | Self::Destructuring)
    }

    /// Values the runtime pushes before running the handler
    pub const fn handler_pushes(self) -> u32 {
        match self {
            Self::Finally => 2,
            _ => 0,
        }
    }
}

/// A single exception/cleanup region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TryNote {
    /// Region kind
    pub kind: TryNoteKind,
    /// Stack depth the runtime restores before handling
    pub depth: u32,
    /// First covered instruction
    pub start: u32,
    /// Number of covered instructions
    pub length: u32,
}

impl TryNote {
    /// One past the last covered instruction; the handler starts here
    #[inline]
    pub const fn end(&self) -> u32 {
        self.start + self.length
    }

    /// Whether `offset` lies inside the region
    #[inline]
    pub const fn contains(&self, offset: u32) -> bool {
        offset >= self.start && offset < self.end()
    }

    /// Whether `other` lies entirely inside this region
    pub const fn encloses(&self, other: &TryNote) -> bool {
        other.start >= self.start && other.end() <= self.end()
    }
}

/// Index of the `ForOf` note an iterator close at `index` unwinds to: the
/// first later note of that kind enclosing it at the same depth.
pub fn iter_close_partner(notes: &[TryNote], index: usize) -> Option<usize> {
    let close = notes.get(index)?;
    if close.kind != TryNoteKind::ForOfIterClose {
        return None;
    }
    notes[index + 1..]
        .iter()
        .position(|n| n.kind == TryNoteKind::ForOf && n.depth == close.depth && n.encloses(close))
        .map(|i| i + index + 1)
}

/// Check that regions are properly nested and ordered innermost-first.
pub fn is_properly_nested(notes: &[TryNote]) -> bool {
    for (i, inner) in notes.iter().enumerate() {
        for outer in &notes[i + 1..] {
            let overlaps = inner.start < outer.end() && outer.start < inner.end();
            if overlaps && !outer.encloses(inner) {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(kind: TryNoteKind, start: u32, length: u32) -> TryNote {
        at_depth(kind, 0, start, length)
    }

    fn at_depth(kind: TryNoteKind, depth: u32, start: u32, length: u32) -> TryNote {
        TryNote {
            kind,
            depth,
            start,
            length,
        }
    }

    #[test]
    fn test_contains() {
        let n = note(TryNoteKind::Catch, 4, 3);
        assert!(n.contains(4));
        assert!(n.contains(6));
        assert!(!n.contains(7));
        assert_eq!(n.end(), 7);
    }

    #[test]
    fn test_nesting_order() {
        let inner = note(TryNoteKind::ForOf, 5, 2);
        let outer = note(TryNoteKind::Finally, 2, 10);
        assert!(is_properly_nested(&[inner, outer]));
        assert!(!is_properly_nested(&[outer, inner]));
        assert!(!is_properly_nested(&[note(TryNoteKind::Catch, 0, 4), note(TryNoteKind::Catch, 2, 4)]));
    }

    #[test]
    fn test_iter_close_skips_handlers_inside_the_loop() {
        // for (x of it) { try { break; } catch (e) {} }
        let notes = [
            at_depth(TryNoteKind::ForOfIterClose, 2, 20, 12),
            at_depth(TryNoteKind::Catch, 2, 19, 15),
            at_depth(TryNoteKind::Loop, 2, 10, 30),
            at_depth(TryNoteKind::ForOf, 2, 12, 28),
        ];
        assert!(is_properly_nested(&notes));
        assert_eq!(iter_close_partner(&notes, 0), Some(3));
        assert_eq!(iter_close_partner(&notes, 1), None);
    }

    #[test]
    fn test_iter_close_pairs_by_depth() {
        // Inner loop at depth 4 inside an outer loop at depth 2
        let notes = [
            at_depth(TryNoteKind::ForOfIterClose, 2, 30, 10),
            at_depth(TryNoteKind::ForOf, 4, 20, 30),
            at_depth(TryNoteKind::ForOf, 2, 10, 50),
        ];
        assert_eq!(iter_close_partner(&notes, 0), Some(2));
        assert_eq!(iter_close_partner(&notes[..2], 0), None);
    }
}
