// node.rs — Node model: kinds, lets, buffers, and graph payload
//
// A node is either a high-level object (reducible), a canonical operation
// (already lowered), or a graph (a node whose lets are provided by inlet and
// outlet proxy members). Nodes never point at each other; connections and the
// owning graph are arena ids.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::buffer::Buffer;
use crate::catalog::{IrOp, LangOp};
use crate::connection::{format_signature, ConnKind, Connection};
use crate::id::{IrId, NodeId};
use crate::scope::{ScopeKind, ScopeTable, Visibility};
use crate::value::Args;

// ── Kinds ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum NodeKind {
    Lang(LangOp),
    Ir(IrOp),
    Graph(Box<GraphData>),
}

/// Members, proxies, and scope of a graph node.
#[derive(Debug, Clone, Default)]
pub struct GraphData {
    /// Members in insertion order (keyed by insertion sequence).
    pub members: BTreeMap<u64, NodeId>,
    /// Inlet proxies sorted by their `index` argument.
    pub inlet_proxies: Vec<NodeId>,
    /// Outlet proxies sorted by their `index` argument.
    pub outlet_proxies: Vec<NodeId>,
    pub scope: ScopeTable,
    /// Source document, when the graph came from a file.
    pub file: Option<PathBuf>,
    /// Display name.
    pub xname: String,
    pub input_channels: BTreeSet<i64>,
    pub output_channels: BTreeSet<i64>,
    /// Signal-processing members in execution order, filled by scheduling.
    pub signal_order: Vec<NodeId>,
}

impl GraphData {
    pub fn new(xname: impl Into<String>) -> Self {
        Self {
            xname: xname.into(),
            ..Self::default()
        }
    }
}

/// Annotations carried over from the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Annotations {
    pub scope: Visibility,
    pub is_static: bool,
}

/// Where a named node is registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameBinding {
    /// The graph whose scope table holds the entry.
    pub table: NodeId,
    pub name: String,
    pub kind: ScopeKind,
}

// ── Node ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Node {
    pub ir_id: IrId,
    pub(crate) seq: u64,
    pub kind: NodeKind,
    pub args: Args,
    pub annotations: Annotations,
    /// Owning graph; `None` for the root and for detached nodes.
    pub graph: Option<NodeId>,
    pub inlets: Vec<Vec<Connection>>,
    pub outlets: Vec<Vec<Connection>>,
    pub inlet_buffers: Vec<Buffer>,
    pub outlet_buffers: Vec<Buffer>,
    pub(crate) ordered: bool,
    pub(crate) binding: Option<NameBinding>,
}

impl Node {
    pub(crate) fn new(ir_id: IrId, seq: u64, kind: NodeKind, args: Args, annotations: Annotations) -> Self {
        let (num_inlets, num_outlets) = match &kind {
            NodeKind::Lang(op) => op.arity(&args),
            NodeKind::Ir(op) => op.arity(&args),
            NodeKind::Graph(_) => (0, 0),
        };
        Self {
            ir_id,
            seq,
            kind,
            args,
            annotations,
            graph: None,
            inlets: vec![Vec::new(); num_inlets],
            outlets: vec![Vec::new(); num_outlets],
            inlet_buffers: vec![Buffer::ZERO; num_inlets],
            outlet_buffers: vec![Buffer::ZERO; num_outlets],
            ordered: false,
            binding: None,
        }
    }

    /// The type tag: the high-level type name, the canonical tag, or `graph`.
    pub fn type_tag(&self) -> &str {
        match &self.kind {
            NodeKind::Lang(op) => op.type_name(),
            NodeKind::Ir(op) => op.tag(),
            NodeKind::Graph(_) => "graph",
        }
    }

    pub fn lang_op(&self) -> Option<LangOp> {
        match self.kind {
            NodeKind::Lang(op) => Some(op),
            _ => None,
        }
    }

    pub fn ir_op(&self) -> Option<IrOp> {
        match self.kind {
            NodeKind::Ir(op) => Some(op),
            _ => None,
        }
    }

    pub fn is_ir(&self, op: IrOp) -> bool {
        self.ir_op() == Some(op)
    }

    pub fn graph_data(&self) -> Option<&GraphData> {
        match &self.kind {
            NodeKind::Graph(g) => Some(g),
            _ => None,
        }
    }

    pub fn graph_data_mut(&mut self) -> Option<&mut GraphData> {
        match &mut self.kind {
            NodeKind::Graph(g) => Some(g),
            _ => None,
        }
    }

    pub fn is_graph(&self) -> bool {
        matches!(self.kind, NodeKind::Graph(_))
    }

    pub fn is_reducible(&self) -> bool {
        matches!(self.kind, NodeKind::Lang(_))
    }

    pub fn num_inlets(&self) -> usize {
        self.inlets.len()
    }

    pub fn num_outlets(&self) -> usize {
        self.outlets.len()
    }

    pub fn inlet_format(&self) -> String {
        format_signature(&self.inlets)
    }

    pub fn outlet_format(&self) -> String {
        format_signature(&self.outlets)
    }

    /// Declared kind of an outlet. Graphs report `Mixed`: their outlets take
    /// the kind of whatever feeds the outlet proxy.
    pub fn declared_outlet_kind(&self, outlet: usize) -> ConnKind {
        match &self.kind {
            NodeKind::Lang(op) => op.outlet_kind(outlet),
            NodeKind::Ir(op) => op.outlet_kind(outlet),
            NodeKind::Graph(_) => None,
        }
        .unwrap_or(ConnKind::Mixed)
    }

    /// Whether the canonical operation consumes a signal at `inlet`.
    pub fn requires_signal_inlet(&self, inlet: usize) -> bool {
        match &self.kind {
            NodeKind::Ir(op) => op.inlet_kind(inlet).is_some_and(ConnKind::is_signal),
            _ => false,
        }
    }

    /// Whether the canonical operation produces a signal at `outlet`.
    pub fn produces_signal_outlet(&self, outlet: usize) -> bool {
        match &self.kind {
            NodeKind::Ir(op) => op.outlet_kind(outlet).is_some_and(ConnKind::is_signal),
            _ => false,
        }
    }

    pub fn needs_init(&self) -> bool {
        self.ir_op().is_some_and(|op| op.flags().init)
    }

    pub fn sends_control(&self) -> bool {
        self.ir_op().is_some_and(|op| op.flags().control)
    }

    /// Signal processing for leaf operations; graphs are decided by `Patch`
    /// from their members.
    pub(crate) fn is_signal_op(&self) -> bool {
        self.ir_op().is_some_and(|op| op.flags().signal)
    }

    /// Argument `index` of a proxy node.
    pub fn proxy_index(&self) -> i64 {
        self.args.get("index").and_then(|v| v.as_i64()).unwrap_or(0)
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(|v| v.as_str())
    }

    pub fn arg_f64(&self, key: &str) -> Option<f64> {
        self.args.get(key).and_then(|v| v.as_f64())
    }

    /// The object's registered name, if it has one.
    pub fn name(&self) -> Option<&str> {
        self.arg_str("name")
    }

    /// Every connection touching this node, inlets first.
    pub fn all_connections(&self) -> Vec<Connection> {
        self.inlets
            .iter()
            .chain(self.outlets.iter())
            .flatten()
            .copied()
            .collect()
    }
}
