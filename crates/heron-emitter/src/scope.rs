//! Scope chain resolver
//!
//! Scopes live in an arena (`records`, indexed by [`ScopeIndex`]) and the
//! active chain is a stack of indices into it. Binding storage is decided at
//! enter time: captured bindings get environment slots, simple uncaptured
//! parameters stay in their argument slots, everything else gets a frame slot.
//! Frame slots of a block are released when it is left.
//!
//! Nested units see their parent's chain through an immutable
//! [`EnclosingScope`] snapshot.

use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use tracing::trace;

use heron_bytecode::{
    BindingKind, BindingLocation, BindingRecord, EnvCoord, Instruction, LocalSlot, ScopeIndex,
    ScopeKind, ScopeNote, ScopeRecord,
};

use crate::ast::{Atom, BindingDecl};
use crate::error::{EmitError, EmitResult};

/// Where a name reference goes at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameLocation {
    /// Actual argument slot
    Argument(u16),
    /// Frame slot
    Frame(LocalSlot),
    /// Environment coordinate
    Environment(EnvCoord),
    /// Global object / global lexical scope
    Global,
    /// Runtime lookup by name
    Dynamic,
}

/// Key of a lexical binding in the dead-zone cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TdzKey {
    /// Binding of this unit: scope and binding index
    Local(u32, u32),
    /// Binding of an enclosing unit: snapshot depth and slot
    Outer(u32, u32),
}

/// Result of resolving a name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedName {
    /// Storage
    pub location: NameLocation,
    /// Declaration kind, unknown for global and dynamic names
    pub kind: Option<BindingKind>,
    /// Set when a dead-zone check is still needed on this path
    pub tdz: Option<TdzKey>,
}

impl ResolvedName {
    fn unbound(location: NameLocation) -> Self {
        Self {
            location,
            kind: None,
            tdz: None,
        }
    }
}

/// Read-only view of an enclosing unit's scope
#[derive(Debug)]
pub struct EnclosingScope {
    kind: ScopeKind,
    index: ScopeIndex,
    has_environment: bool,
    dynamic: bool,
    bindings: FxHashMap<Atom, (BindingKind, BindingLocation)>,
    parent: Option<Rc<EnclosingScope>>,
}

impl EnclosingScope {
    /// Kind of the scope
    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    /// Index of the scope in its own script's table
    pub fn index(&self) -> ScopeIndex {
        self.index
    }

    /// Next scope outward
    pub fn parent(&self) -> Option<&Rc<EnclosingScope>> {
        self.parent.as_ref()
    }

    /// Whether any enclosing scope is a strict-breaking dynamic scope
    pub fn is_dynamic(&self) -> bool {
        self.dynamic || self.parent.as_ref().is_some_and(|p| p.is_dynamic())
    }
}

/// Proof that a scope was entered; consumed by [`ScopeStack::leave`]
#[derive(Debug)]
#[must_use = "every entered scope must be left"]
pub struct ScopeHandle {
    depth: usize,
    index: ScopeIndex,
}

impl ScopeHandle {
    /// Scope table index
    pub fn index(&self) -> ScopeIndex {
        self.index
    }

    /// Number of active scopes outside this one
    pub fn depth(&self) -> usize {
        self.depth
    }
}

#[derive(Debug)]
struct ActiveScope {
    index: ScopeIndex,
    kind: ScopeKind,
    has_environment: bool,
    dynamic: bool,
    names: FxHashMap<Atom, u32>,
    frame_start: u32,
    note: Option<usize>,
}

/// Active scope chain of one compilation unit
#[derive(Debug)]
pub struct ScopeStack {
    records: Vec<ScopeRecord>,
    notes: Vec<ScopeNote>,
    stack: Vec<ActiveScope>,
    enclosing: Option<Rc<EnclosingScope>>,
    next_frame_slot: u32,
    frame_slots: u32,
    max_frame_slots: usize,
    force_environment: bool,
    initialized: FxHashSet<TdzKey>,
}

impl ScopeStack {
    /// Create a resolver for a unit nested in `enclosing`
    pub fn new(enclosing: Option<Rc<EnclosingScope>>, max_frame_slots: usize) -> Self {
        Self {
            records: Vec::new(),
            notes: Vec::new(),
            stack: Vec::new(),
            enclosing,
            next_frame_slot: 0,
            frame_slots: 0,
            max_frame_slots,
            force_environment: false,
            initialized: FxHashSet::default(),
        }
    }

    /// Put every binding of this unit in an environment (sloppy direct eval
    /// can observe and add bindings by name).
    pub fn force_environments(&mut self) {
        self.force_environment = true;
    }

    /// Reserve an anonymous frame slot for the rest of the unit
    pub fn reserve_slot(&mut self) -> EmitResult<LocalSlot> {
        debug_assert!(
            self.stack.len() <= 1,
            "reserved slots are taken before blocks are entered"
        );
        let slot = self.alloc_frame_slot()?;
        for scope in &mut self.stack {
            scope.frame_start = self.next_frame_slot;
        }
        Ok(slot)
    }

    fn alloc_frame_slot(&mut self) -> EmitResult<LocalSlot> {
        let slot = self.next_frame_slot;
        if slot as usize >= self.max_frame_slots {
            return Err(EmitError::TooManyFrameSlots {
                max: self.max_frame_slots,
            });
        }
        self.next_frame_slot += 1;
        self.frame_slots = self.frame_slots.max(self.next_frame_slot);
        Ok(LocalSlot::new(slot))
    }

    /// Enter a scope. `params` lists simple parameter names by position
    /// (function scopes only); `offset` is the main-section offset when the
    /// scope range should be recorded.
    pub fn enter(
        &mut self,
        kind: ScopeKind,
        decls: &[BindingDecl],
        params: &[Atom],
        offset: Option<u32>,
    ) -> EmitResult<ScopeHandle> {
        let frame_start = self.next_frame_slot;
        let mut names = FxHashMap::default();
        let mut bindings = Vec::with_capacity(decls.len());
        let mut environment_slots = 0u32;

        for decl in decls {
            if names.contains_key(&decl.name) {
                continue;
            }
            let location = match kind {
                ScopeKind::Global => BindingLocation::Global,
                ScopeKind::Eval if !decl.kind.is_lexical() => BindingLocation::Dynamic,
                _ if decl.closed_over || self.force_environment => {
                    environment_slots += 1;
                    BindingLocation::Environment(environment_slots - 1)
                }
                ScopeKind::Function if decl.kind == BindingKind::Parameter => {
                    match params.iter().rposition(|p| *p == decl.name) {
                        Some(index) => BindingLocation::Argument(index as u16),
                        None => BindingLocation::Frame(self.alloc_frame_slot()?),
                    }
                }
                _ => BindingLocation::Frame(self.alloc_frame_slot()?),
            };
            names.insert(decl.name.clone(), bindings.len() as u32);
            bindings.push(BindingRecord {
                name: decl.name.as_ref().into(),
                kind: decl.kind,
                location,
            });
        }

        let has_environment = environment_slots > 0
            || matches!(kind, ScopeKind::With | ScopeKind::Eval)
            || (kind == ScopeKind::Function && self.force_environment);
        let dynamic = matches!(kind, ScopeKind::With | ScopeKind::Eval)
            || (kind == ScopeKind::Function && self.force_environment);

        let index = ScopeIndex::new(self.records.len() as u32);
        self.records.push(ScopeRecord {
            kind,
            enclosing: self.stack.last().map(|s| s.index),
            bindings,
            has_environment,
            environment_slots,
            first_frame_slot: frame_start,
            frame_slot_end: self.next_frame_slot,
        });

        let note = offset.map(|start| {
            let parent = self.stack.iter().rev().find_map(|s| s.note).map(|n| n as u32);
            self.notes.push(ScopeNote {
                scope: index,
                start,
                length: 0,
                parent,
            });
            self.notes.len() - 1
        });

        trace!(scope = index.0, ?kind, has_environment, "enter scope");
        let depth = self.stack.len();
        self.stack.push(ActiveScope {
            index,
            kind,
            has_environment,
            dynamic,
            names,
            frame_start,
            note,
        });
        Ok(ScopeHandle { depth, index })
    }

    /// Leave the innermost scope. `offset` closes its recorded range.
    pub fn leave(&mut self, handle: ScopeHandle, offset: Option<u32>) {
        assert_eq!(
            handle.depth + 1,
            self.stack.len(),
            "scopes must be left innermost-first"
        );
        if let Some(scope) = self.stack.pop() {
            trace!(scope = scope.index.0, "leave scope");
            self.next_frame_slot = scope.frame_start;
            if let (Some(note), Some(end)) = (scope.note, offset) {
                let note = &mut self.notes[note];
                note.length = end.saturating_sub(note.start);
            }
        }
    }

    /// Number of active scopes
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Innermost active scope
    pub fn innermost(&self) -> Option<ScopeIndex> {
        self.stack.last().map(|s| s.index)
    }

    /// Scope record by index
    pub fn record(&self, index: ScopeIndex) -> &ScopeRecord {
        &self.records[index.0 as usize]
    }

    /// Instruction that detaches the scope at stack position `depth`, if any
    pub fn exit_instruction(&self, depth: usize) -> Option<Instruction> {
        let scope = self.stack.get(depth)?;
        match scope.kind {
            ScopeKind::With => Some(Instruction::LeaveWith),
            ScopeKind::Block | ScopeKind::Catch | ScopeKind::Comprehension
                if scope.has_environment =>
            {
                Some(Instruction::PopLexicalEnv)
            }
            _ => None,
        }
    }

    /// Lexical bindings of a scope that live in frame slots; they start in
    /// the dead zone each time the scope is entered.
    pub fn frame_lexicals(&self, handle: &ScopeHandle) -> SmallVec<[LocalSlot; 4]> {
        self.record(handle.index)
            .bindings
            .iter()
            .filter(|b| b.kind.is_lexical())
            .filter_map(|b| match b.location {
                BindingLocation::Frame(slot) => Some(slot),
                _ => None,
            })
            .collect()
    }

    /// Resolve a name from the innermost scope outward
    pub fn resolve(&self, name: &str) -> ResolvedName {
        self.resolve_from(name, false)
    }

    /// Resolve a name in the nearest var scope, ignoring block bindings
    /// that would otherwise shadow it.
    pub fn resolve_var(&self, name: &str) -> ResolvedName {
        self.resolve_from(name, true)
    }

    fn resolve_from(&self, name: &str, var_only: bool) -> ResolvedName {
        let mut hops: u16 = 0;
        let mut dynamic = false;

        for scope in self.stack.iter().rev() {
            let visible = !var_only || scope.kind.is_var_scope();
            if let Some(&binding) = scope.names.get(name).filter(|_| visible) {
                if dynamic {
                    return ResolvedName::unbound(NameLocation::Dynamic);
                }
                let record = &self.record(scope.index).bindings[binding as usize];
                let location = match record.location {
                    BindingLocation::Argument(index) => NameLocation::Argument(index),
                    BindingLocation::Frame(slot) => NameLocation::Frame(slot),
                    BindingLocation::Environment(slot) => {
                        NameLocation::Environment(EnvCoord::new(hops, slot))
                    }
                    BindingLocation::Global => NameLocation::Global,
                    BindingLocation::Dynamic => NameLocation::Dynamic,
                };
                let key = TdzKey::Local(scope.index.0, binding);
                let tdz = (record.kind.is_lexical()
                    && matches!(
                        location,
                        NameLocation::Frame(_) | NameLocation::Environment(_)
                    )
                    && !self.initialized.contains(&key))
                .then_some(key);
                return ResolvedName {
                    location,
                    kind: Some(record.kind),
                    tdz,
                };
            }
            dynamic |= scope.dynamic;
            if scope.has_environment {
                hops += 1;
            }
        }

        let mut outer_depth = 0u32;
        let mut outer = self.enclosing.as_deref();
        while let Some(scope) = outer {
            let visible = !var_only || scope.kind.is_var_scope();
            if let Some(&(kind, location)) = scope.bindings.get(name).filter(|_| visible) {
                if dynamic {
                    return ResolvedName::unbound(NameLocation::Dynamic);
                }
                return match location {
                    BindingLocation::Environment(slot) => {
                        let key = TdzKey::Outer(outer_depth, slot);
                        ResolvedName {
                            location: NameLocation::Environment(EnvCoord::new(hops, slot)),
                            kind: Some(kind),
                            tdz: (kind.is_lexical() && !self.initialized.contains(&key))
                                .then_some(key),
                        }
                    }
                    BindingLocation::Global => ResolvedName {
                        location: NameLocation::Global,
                        kind: Some(kind),
                        tdz: None,
                    },
                    // Frame and argument slots of another frame are unreachable
                    _ => ResolvedName::unbound(NameLocation::Dynamic),
                };
            }
            dynamic |= scope.dynamic;
            if scope.has_environment {
                hops += 1;
            }
            outer_depth += 1;
            outer = scope.parent.as_deref();
        }

        ResolvedName::unbound(if dynamic {
            NameLocation::Dynamic
        } else {
            NameLocation::Global
        })
    }

    /// Record that a lexical binding is initialized on the current path
    pub fn mark_initialized(&mut self, key: TdzKey) {
        self.initialized.insert(key);
    }

    /// Forget dead-zone knowledge; called at every basic-block start
    pub fn clear_tdz_cache(&mut self) {
        self.initialized.clear();
    }

    /// Freeze the active chain for a nested unit
    pub fn snapshot(&self) -> Option<Rc<EnclosingScope>> {
        let mut chain = self.enclosing.clone();
        for scope in &self.stack {
            let record = self.record(scope.index);
            let bindings = record
                .bindings
                .iter()
                .map(|b| (Atom::from(&*b.name), (b.kind, b.location)))
                .collect();
            chain = Some(Rc::new(EnclosingScope {
                kind: scope.kind,
                index: scope.index,
                has_environment: scope.has_environment,
                dynamic: scope.dynamic,
                bindings,
                parent: chain,
            }));
        }
        chain
    }

    /// Hand out the scope table, scope notes and frame size
    pub fn finish(self) -> (Vec<ScopeRecord>, Vec<ScopeNote>, u32) {
        debug_assert!(self.stack.is_empty(), "unit finished with open scopes");
        (self.records, self.notes, self.frame_slots)
    }
}
