//! Control context stack
//!
//! One entry per active loop, switch, label, try/finally and iteration
//! construct. Each entry remembers the stack depth and scope depth at the
//! point it was pushed; non-local exits use both to compute their cleanup.

use smallvec::SmallVec;
use tracing::trace;

use crate::ast::Atom;
use crate::jump::{JumpList, JumpTarget};

/// Kind of a control context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    /// `while`, `do`, `for`, comprehension
    Loop,
    /// `switch`
    Switch,
    /// Labeled statement
    Label,
    /// try block (and catch block) of a try statement with `finally`
    TryFinally,
    /// `for-in`; owns the enumerator on the stack
    ForIn,
    /// `for-of`; owns `[next iterator]` on the stack
    ForOf {
        /// `for await`
        is_async: bool,
    },
    /// Spread iteration in array literals and calls
    Spread,
}

impl ControlKind {
    /// Stack values the construct keeps below its body
    pub const fn own_slots(self) -> u32 {
        match self {
            Self::ForIn => 1,
            Self::ForOf { .. } => 2,
            Self::Spread => 4,
            _ => 0,
        }
    }

    /// Whether `continue` can target the context
    pub const fn is_loop(self) -> bool {
        matches!(self, Self::Loop | Self::ForIn | Self::ForOf { .. })
    }

    /// Whether an unlabeled `break` can target the context
    pub const fn is_breakable(self) -> bool {
        self.is_loop() || matches!(self, Self::Switch)
    }
}

/// Handle to a pushed context
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ControlId(usize);

impl ControlId {
    /// Stack position
    pub fn index(self) -> usize {
        self.0
    }
}

/// A control context
#[derive(Debug)]
pub struct Control {
    /// Kind
    pub kind: ControlKind,
    /// Stack depth when pushed
    pub entry_depth: u32,
    /// Scope stack depth when pushed
    pub scope_depth: usize,
    /// Labels naming the statement
    pub labels: SmallVec<[Atom; 1]>,
    /// Pending `break` jumps
    pub breaks: JumpList,
    /// Pending `continue` jumps
    pub continues: JumpList,
    /// Continue destination once known (loop heads of do-while are not)
    pub continue_target: Option<JumpTarget>,
    /// Pending `Gosub`s into the finally block
    pub gosubs: JumpList,
}

impl Control {
    /// Stack depth after the construct is left by `break`
    pub fn break_depth(&self) -> u32 {
        self.entry_depth - self.kind.own_slots()
    }
}

/// Reason `continue label` failed to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinueLookup {
    /// Target found
    Found(ControlId),
    /// No such label or no enclosing loop
    Missing,
    /// The label names a statement that is not a loop
    NotALoop,
}

/// Stack of active control contexts
#[derive(Debug, Default)]
pub struct ControlStack {
    stack: Vec<Control>,
}

impl ControlStack {
    /// Empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a context
    pub fn push(
        &mut self,
        kind: ControlKind,
        entry_depth: u32,
        scope_depth: usize,
        labels: SmallVec<[Atom; 1]>,
    ) -> ControlId {
        trace!(?kind, entry_depth, scope_depth, "push control");
        self.stack.push(Control {
            kind,
            entry_depth,
            scope_depth,
            labels,
            breaks: JumpList::new(),
            continues: JumpList::new(),
            continue_target: None,
            gosubs: JumpList::new(),
        });
        ControlId(self.stack.len() - 1)
    }

    /// Pop the innermost context, which must be `id`
    pub fn pop(&mut self, id: ControlId) -> Control {
        assert_eq!(
            id.0 + 1,
            self.stack.len(),
            "control contexts must be popped innermost-first"
        );
        let control = self.stack.remove(id.0);
        trace!(kind = ?control.kind, "pop control");
        control
    }

    /// Context by handle
    pub fn get(&self, id: ControlId) -> &Control {
        &self.stack[id.0]
    }

    /// Context by handle
    pub fn get_mut(&mut self, id: ControlId) -> &mut Control {
        &mut self.stack[id.0]
    }

    /// Number of active contexts
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Whether no context is active
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Number of active loops, for loop-head nesting markers
    pub fn loop_depth(&self) -> u8 {
        let loops = self.stack.iter().filter(|c| c.kind.is_loop()).count();
        loops.min(u8::MAX as usize) as u8
    }

    /// Target of `break` / `break label`
    pub fn find_break(&self, label: Option<&str>) -> Option<ControlId> {
        let position = match label {
            Some(label) => self
                .stack
                .iter()
                .rposition(|c| c.kind == ControlKind::Label && c.labels.iter().any(|l| &**l == label)),
            None => self.stack.iter().rposition(|c| c.kind.is_breakable()),
        };
        position.map(ControlId)
    }

    /// Target of `continue` / `continue label`
    pub fn find_continue(&self, label: Option<&str>) -> ContinueLookup {
        let Some(label) = label else {
            return match self.stack.iter().rposition(|c| c.kind.is_loop()) {
                Some(index) => ContinueLookup::Found(ControlId(index)),
                None => ContinueLookup::Missing,
            };
        };
        let named = |c: &Control| c.labels.iter().any(|l| &**l == label);
        if let Some(index) = self.stack.iter().rposition(|c| c.kind.is_loop() && named(c)) {
            return ContinueLookup::Found(ControlId(index));
        }
        if self.stack.iter().any(named) {
            ContinueLookup::NotALoop
        } else {
            ContinueLookup::Missing
        }
    }

    /// Contexts strictly inside `target` (all of them for `None`), innermost first
    pub fn crossed(&self, target: Option<ControlId>) -> impl Iterator<Item = ControlId> + use<> {
        let floor = target.map_or(0, |t| t.0 + 1);
        (floor..self.stack.len()).rev().map(ControlId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_break_and_continue_lookup() {
        let mut controls = ControlStack::new();
        let label = controls.push(ControlKind::Label, 0, 0, smallvec!["outer".into()]);
        let outer = controls.push(ControlKind::Loop, 0, 0, smallvec!["outer".into()]);
        let switch = controls.push(ControlKind::Switch, 0, 1, SmallVec::new());

        assert_eq!(controls.find_break(None), Some(switch));
        assert_eq!(controls.find_break(Some("outer")), Some(label));
        assert_eq!(controls.find_break(Some("nope")), None);
        assert_eq!(controls.find_continue(None), ContinueLookup::Found(outer));
        assert_eq!(
            controls.find_continue(Some("outer")),
            ContinueLookup::Found(outer)
        );
        assert_eq!(controls.loop_depth(), 1);

        let crossed: Vec<_> = controls.crossed(Some(outer)).collect();
        assert_eq!(crossed, vec![switch]);
        assert_eq!(controls.crossed(None).count(), 3);

        let _ = controls.pop(switch);
        let _ = controls.pop(outer);
        let _ = controls.pop(label);
        assert!(controls.is_empty());
    }

    #[test]
    fn test_continue_to_label_of_block() {
        let mut controls = ControlStack::new();
        let block = controls.push(ControlKind::Label, 0, 0, smallvec!["b".into()]);
        let inner = controls.push(ControlKind::Loop, 0, 0, SmallVec::new());
        assert_eq!(controls.find_continue(Some("b")), ContinueLookup::NotALoop);
        assert_eq!(controls.find_continue(Some("c")), ContinueLookup::Missing);
        let _ = controls.pop(inner);
        let _ = controls.pop(block);
        assert_eq!(controls.find_continue(None), ContinueLookup::Missing);
    }

    #[test]
    fn test_break_depth_excludes_owned_values() {
        let mut controls = ControlStack::new();
        let id = controls.push(ControlKind::ForOf { is_async: false }, 5, 0, SmallVec::new());
        assert_eq!(controls.get(id).break_depth(), 3);
        let _ = controls.pop(id);
    }
}
