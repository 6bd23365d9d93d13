// scope.rs — Per-graph registry of named objects
//
// A scope table maps a name to the objects declared under it. Where an
// object is registered depends on its visibility: private objects stay in
// their own graph, protected objects move up one level, and public or static
// objects go to the root. Name lookup walks from a graph toward the root;
// private objects are only visible from the graph that declared them.
//
// The walk itself lives on `Patch` (it needs the graph parent chain); this
// module holds the per-graph table and the registration rules.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::id::NodeId;

/// Visibility annotation of a named object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    #[default]
    Private,
    Protected,
    Public,
}

impl Visibility {
    pub fn from_annotation(scope: &str) -> Option<Visibility> {
        match scope {
            "private" => Some(Visibility::Private),
            "protected" => Some(Visibility::Protected),
            "public" => Some(Visibility::Public),
            _ => None,
        }
    }
}

/// The family a registered object belongs to, independent of whether it is
/// still high-level or already lowered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScopeKind {
    Var,
    Table,
    Send,
    Receive,
}

impl ScopeKind {
    pub fn label(self) -> &'static str {
        match self {
            ScopeKind::Var => "var",
            ScopeKind::Table => "table",
            ScopeKind::Send => "send",
            ScopeKind::Receive => "receive",
        }
    }
}

/// One registered object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeEntry {
    pub node: NodeId,
    pub kind: ScopeKind,
    pub visibility: Visibility,
    /// The graph the object lives in (not necessarily the graph whose table
    /// holds the entry).
    pub home: NodeId,
}

/// Result of attempting to register an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Added,
    /// A static object with this name already exists; the new one shares it.
    SharedStatic,
    /// A unique object with this name already exists.
    Conflict,
}

#[derive(Debug, Clone, Default)]
pub struct ScopeTable {
    names: BTreeMap<String, Vec<ScopeEntry>>,
    /// Abstraction search paths declared by the graph's `imports`.
    pub import_paths: Vec<PathBuf>,
}

impl ScopeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `entry` under `name`. Unique objects may not share a name
    /// with another object of the same kind; static objects are registered
    /// once and shared.
    pub fn register(&mut self, name: &str, entry: ScopeEntry, is_static: bool, unique: bool) -> Registration {
        let existing = self.entries(name, entry.kind).count();
        if (unique && existing > 0 && !is_static) || (is_static && existing > 1) {
            return Registration::Conflict;
        }
        if is_static && existing == 1 {
            return Registration::SharedStatic;
        }
        self.names.entry(name.to_string()).or_default().push(entry);
        Registration::Added
    }

    /// Remove every entry for `node` under `name`.
    pub fn unregister(&mut self, name: &str, node: NodeId) {
        if let Some(list) = self.names.get_mut(name) {
            list.retain(|e| e.node != node);
            if list.is_empty() {
                self.names.remove(name);
            }
        }
    }

    /// Point entries for `old` at `new` (a lowered successor).
    pub fn transfer(&mut self, name: &str, old: NodeId, new: NodeId, new_home: NodeId) {
        if let Some(list) = self.names.get_mut(name) {
            for e in list.iter_mut().filter(|e| e.node == old) {
                e.node = new;
                e.home = new_home;
            }
        }
    }

    pub fn entries<'a>(&'a self, name: &str, kind: ScopeKind) -> impl Iterator<Item = &'a ScopeEntry> + 'a {
        self.names
            .get(name)
            .into_iter()
            .flatten()
            .filter(move |e| e.kind == kind)
    }

    /// All names with at least one entry of `kind`, in name order.
    pub fn by_kind(&self, kind: ScopeKind) -> Vec<(String, Vec<ScopeEntry>)> {
        self.names
            .iter()
            .filter_map(|(name, list)| {
                let matching: Vec<ScopeEntry> = list.iter().filter(|e| e.kind == kind).copied().collect();
                (!matching.is_empty()).then(|| (name.clone(), matching))
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
