// graph.rs — Patch arena and the graph mutation API
//
// The whole patch (root graph plus every nested graph) lives in one arena of
// generation-checked slots. A node's owning graph is an id; graphs list their
// members by id. Every structural edit goes through this module: adding and
// removing nodes, connecting, disconnecting and replacing connections, and
// registering named objects in scope tables.
//
// Preconditions: none.
// Postconditions: a connection stored on a node is stored on both of its
//                 endpoints; graph let counts match their proxy counts.
// Failure modes: out-of-range let or cross-scope connection → E0110;
//                inconsistent rewrite → E0110; duplicate unique name → E0114.
// Side effects: warnings are accumulated on the patch.

use std::collections::BTreeSet;
use std::ops::{Index, IndexMut};
use std::path::PathBuf;

use crate::buffer::{Buffer, BufferPool};
use crate::catalog::{IrOp, LangOp, ADC_INLET_BASE};
use crate::connection::Connection;
use crate::diag::{codes, CompileError, DiagCode, Diagnostic};
use crate::id::{IdAllocator, NodeId};
use crate::node::{Annotations, GraphData, NameBinding, Node, NodeKind};
use crate::scope::{Registration, ScopeEntry, ScopeKind, ScopeTable, Visibility};
use crate::value::{resolve_args, rules_of, Args};

// ── Arena ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// One compile unit: the root graph and everything beneath it.
#[derive(Debug)]
pub struct Patch {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
    ids: IdAllocator,
    notices: Vec<Diagnostic>,
    pub(crate) pool: BufferPool,
}

impl Index<NodeId> for Patch {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        match self.get(id) {
            Some(node) => node,
            None => panic!("stale node id {id}"),
        }
    }
}

impl IndexMut<NodeId> for Patch {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        match self.get_mut(id) {
            Some(node) => node,
            None => panic!("stale node id {id}"),
        }
    }
}

impl Patch {
    /// A patch holding an empty root graph named `xname`.
    pub fn new(xname: &str) -> Self {
        let mut patch = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId::new(0, 0),
            ids: IdAllocator::new(),
            notices: Vec::new(),
            pool: BufferPool::new(),
        };
        patch.root = patch.new_graph(xname, None, Args::new());
        patch
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index() as usize)
            .filter(|s| s.generation == id.generation())
            .and_then(|s| s.node.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|s| s.generation == id.generation())
            .and_then(|s| s.node.as_mut())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live nodes, graphs included.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    // ── Allocation ──────────────────────────────────────────────────────────

    /// Create a detached node. It joins a graph through `add_to_graph`.
    pub fn alloc(&mut self, kind: NodeKind, args: Args, annotations: Annotations) -> NodeId {
        let ir_id = self.ids.alloc_ir();
        let node = Node::new(ir_id, 0, kind, args, annotations);
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                NodeId::new(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeId::new(index, 0)
            }
        }
    }

    /// Create a detached graph node.
    pub fn new_graph(&mut self, xname: &str, file: Option<PathBuf>, args: Args) -> NodeId {
        let mut data = GraphData::new(xname);
        data.file = file;
        self.alloc(NodeKind::Graph(Box::new(data)), args, Annotations::default())
    }

    /// Create a detached canonical node, filling argument defaults from the
    /// catalog.
    pub fn new_ir(&mut self, op: IrOp, args: Args) -> Result<NodeId, CompileError> {
        let resolved = resolve_args(&rules_of(op.spec().args), &args, op.tag())?;
        self.notices.extend(resolved.warnings);
        Ok(self.alloc(NodeKind::Ir(op), resolved.args, Annotations::default()))
    }

    /// Make `id` a member of `graph`. Proxies extend the graph's lets; audio
    /// objects record their channels; named objects are registered when
    /// `register` is set.
    pub fn add_to_graph(&mut self, graph: NodeId, id: NodeId, register: bool) -> Result<(), CompileError> {
        let seq = self.ids.alloc_seq();
        let node = &mut self[id];
        node.graph = Some(graph);
        node.seq = seq;
        let op = node.ir_op();
        let lang = node.lang_op();
        let is_proxy_index = node.proxy_index() <= ADC_INLET_BASE;
        let channels: Vec<i64> = node
            .args
            .get("channels")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|c| c.as_i64()).collect())
            .unwrap_or_default();

        self.graph_mut(graph)?.members.insert(seq, id);

        match (op, lang) {
            (Some(IrOp::Inlet), _) if is_proxy_index => {
                let mut proxies = std::mem::take(&mut self.graph_mut(graph)?.inlet_proxies);
                proxies.push(id);
                proxies.sort_by_key(|&p| self[p].proxy_index());
                self.graph_mut(graph)?.inlet_proxies = proxies;
                let g = &mut self[graph];
                g.inlets.push(Vec::new());
                g.inlet_buffers.push(Buffer::ZERO);
            }
            (Some(IrOp::Outlet), _) => {
                let mut proxies = std::mem::take(&mut self.graph_mut(graph)?.outlet_proxies);
                proxies.push(id);
                proxies.sort_by_key(|&p| self[p].proxy_index());
                self.graph_mut(graph)?.outlet_proxies = proxies;
                let g = &mut self[graph];
                g.outlets.push(Vec::new());
                g.outlet_buffers.push(Buffer::ZERO);
            }
            (_, Some(LangOp::Adc)) => self.graph_mut(graph)?.input_channels.extend(channels),
            (_, Some(LangOp::Dac)) => self.graph_mut(graph)?.output_channels.extend(channels),
            _ => {}
        }

        if register {
            self.register_name(id)?;
        }
        Ok(())
    }

    /// Remove a node, every connection touching it, and its name
    /// registration. Removing a graph removes its members.
    pub fn remove(&mut self, id: NodeId) {
        let Some(node) = self.get(id) else { return };
        let conns = node.all_connections();
        let owner = node.graph;
        let seq = node.seq;
        let members = node.graph_data().map(|g| g.members.values().copied().collect::<Vec<_>>());

        for c in conns {
            self.disconnect(&c);
        }
        if let Some(g) = owner.and_then(|g| self.get_mut(g)).and_then(Node::graph_data_mut) {
            g.members.remove(&seq);
            g.inlet_proxies.retain(|&p| p != id);
            g.outlet_proxies.retain(|&p| p != id);
            g.signal_order.retain(|&p| p != id);
        }
        if let Some(b) = self[id].binding.take() {
            if let Some(g) = self.get_mut(b.table).and_then(Node::graph_data_mut) {
                g.scope.unregister(&b.name, id);
            }
        }
        for m in members.into_iter().flatten() {
            self.remove(m);
        }

        let slot = &mut self.slots[id.index() as usize];
        slot.node = None;
        slot.generation += 1;
        self.free.push(id.index());
    }

    /// Hand the IR id and name registration of `old` to its lowered
    /// `successor`, so references resolved against `old` stay valid.
    pub(crate) fn transfer_identity(&mut self, old: NodeId, successor: NodeId) {
        let ir_id = self[old].ir_id;
        let binding = self[old].binding.take();
        let home = self[successor].graph.unwrap_or(self.root);
        let node = &mut self[successor];
        node.ir_id = ir_id;
        if let Some(b) = binding {
            if let Some(g) = self.get_mut(b.table).and_then(Node::graph_data_mut) {
                g.scope.transfer(&b.name, old, successor, home);
            }
            self[successor].binding = Some(b);
        }
    }

    // ── Connections ─────────────────────────────────────────────────────────

    /// Connect two members of the same graph.
    pub fn connect(&mut self, c: Connection) -> Result<(), CompileError> {
        self.check_lets(&c)?;
        if self[c.from].graph != self[c.to].graph {
            return Err(self.error(
                c.from,
                codes::E0110,
                format!("connection {c} crosses a graph boundary"),
            ));
        }
        self.link(c);
        Ok(())
    }

    /// Connect two nodes that may live in different graphs.
    pub fn connect_cross_scope(&mut self, c: Connection) -> Result<(), CompileError> {
        self.check_lets(&c)?;
        self.link(c);
        Ok(())
    }

    /// Remove a connection from both endpoints. Unknown connections are
    /// ignored.
    pub fn disconnect(&mut self, c: &Connection) {
        if let Some(list) = self.get_mut(c.from).and_then(|n| n.outlets.get_mut(c.outlet)) {
            if let Some(pos) = list.iter().position(|x| x == c) {
                list.remove(pos);
            }
        }
        if let Some(list) = self.get_mut(c.to).and_then(|n| n.inlets.get_mut(c.inlet)) {
            if let Some(pos) = list.iter().position(|x| x == c) {
                list.remove(pos);
            }
        }
    }

    /// Replace `old` with `new`, keeping connection order at the endpoint
    /// they share. `None` adds `new`; an empty `new` deletes `old`.
    pub fn replace(&mut self, old: Option<Connection>, new: Vec<Connection>) -> Result<(), CompileError> {
        let Some(old) = old else {
            for n in new {
                self.connect(n)?;
            }
            return Ok(());
        };
        if new.is_empty() {
            self.disconnect(&old);
            return Ok(());
        }
        for n in &new {
            self.check_lets(n)?;
        }

        if new.iter().all(|n| n.from == old.from) {
            // splice at the shared source, append at the destinations
            let list = &mut self[old.from].outlets[old.outlet];
            let at = list.iter().position(|x| *x == old).unwrap_or(list.len());
            if at < list.len() {
                list.remove(at);
            }
            let (same, other): (Vec<&Connection>, Vec<&Connection>) = new.iter().partition(|n| n.outlet == old.outlet);
            let list = &mut self[old.from].outlets[old.outlet];
            let tail = list.split_off(at.min(list.len()));
            list.extend(same);
            list.extend(tail);
            for n in other {
                self[n.from].outlets[n.outlet].push(*n);
            }
            self.remove_at_inlet(&old);
            for n in new {
                self[n.to].inlets[n.inlet].push(n);
            }
        } else if new.iter().all(|n| n.to == old.to) {
            let list = &mut self[old.to].inlets[old.inlet];
            let at = list.iter().position(|x| *x == old).unwrap_or(list.len());
            if at < list.len() {
                list.remove(at);
            }
            let (same, other): (Vec<&Connection>, Vec<&Connection>) = new.iter().partition(|n| n.inlet == old.inlet);
            let list = &mut self[old.to].inlets[old.inlet];
            let tail = list.split_off(at.min(list.len()));
            list.extend(same);
            list.extend(tail);
            for n in other {
                self[n.to].inlets[n.inlet].push(*n);
            }
            self.remove_at_outlet(&old);
            for n in new {
                self[n.from].outlets[n.outlet].push(n);
            }
        } else {
            return Err(self.error(
                old.from,
                codes::E0110,
                format!("replacements for {old} share no endpoint with it"),
            ));
        }
        Ok(())
    }

    fn link(&mut self, c: Connection) {
        self[c.from].outlets[c.outlet].push(c);
        self[c.to].inlets[c.inlet].push(c);
    }

    fn remove_at_inlet(&mut self, c: &Connection) {
        if let Some(list) = self.get_mut(c.to).and_then(|n| n.inlets.get_mut(c.inlet)) {
            if let Some(pos) = list.iter().position(|x| x == c) {
                list.remove(pos);
            }
        }
    }

    fn remove_at_outlet(&mut self, c: &Connection) {
        if let Some(list) = self.get_mut(c.from).and_then(|n| n.outlets.get_mut(c.outlet)) {
            if let Some(pos) = list.iter().position(|x| x == c) {
                list.remove(pos);
            }
        }
    }

    fn check_lets(&self, c: &Connection) -> Result<(), CompileError> {
        let (Some(from), Some(to)) = (self.get(c.from), self.get(c.to)) else {
            return Err(CompileError::new(Diagnostic::error(
                codes::E0110,
                format!("connection {c} references a removed node"),
            )));
        };
        if c.outlet >= from.num_outlets() {
            return Err(self.error(
                c.from,
                codes::E0110,
                format!("outlet {} out of range (object has {})", c.outlet, from.num_outlets()),
            ));
        }
        if c.inlet >= to.num_inlets() {
            return Err(self.error(
                c.to,
                codes::E0110,
                format!("inlet {} out of range (object has {})", c.inlet, to.num_inlets()),
            ));
        }
        Ok(())
    }

    // ── Graph structure ─────────────────────────────────────────────────────

    pub fn graph_data(&self, graph: NodeId) -> Option<&GraphData> {
        self.get(graph).and_then(Node::graph_data)
    }

    fn graph_mut(&mut self, graph: NodeId) -> Result<&mut GraphData, CompileError> {
        match self.get_mut(graph).and_then(Node::graph_data_mut) {
            Some(g) => Ok(g),
            None => Err(CompileError::new(Diagnostic::error(
                codes::E0110,
                format!("{graph} is not a graph"),
            ))),
        }
    }

    pub(crate) fn graph_data_mut(&mut self, graph: NodeId) -> Option<&mut GraphData> {
        self.get_mut(graph).and_then(Node::graph_data_mut)
    }

    /// Members of `graph` in insertion order.
    pub fn members(&self, graph: NodeId) -> Vec<NodeId> {
        self.graph_data(graph)
            .map(|g| g.members.values().copied().collect())
            .unwrap_or_default()
    }

    /// Graph members of `graph` in insertion order.
    pub fn subgraphs(&self, graph: NodeId) -> Vec<NodeId> {
        self.members(graph)
            .into_iter()
            .filter(|&m| self[m].is_graph())
            .collect()
    }

    /// Every node below `graph`, depth first (graphs precede their members).
    pub fn descendants(&self, graph: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        for m in self.members(graph) {
            out.push(m);
            if self[m].is_graph() {
                out.extend(self.descendants(m));
            }
        }
        out
    }

    pub fn inlet_proxies(&self, graph: NodeId) -> &[NodeId] {
        self.graph_data(graph).map_or(&[], |g| g.inlet_proxies.as_slice())
    }

    pub fn outlet_proxies(&self, graph: NodeId) -> &[NodeId] {
        self.graph_data(graph).map_or(&[], |g| g.outlet_proxies.as_slice())
    }

    /// Display name of the graph owning `id` (or of `id`, for the root).
    pub fn xname_of(&self, id: NodeId) -> &str {
        let graph = self.get(id).and_then(|n| n.graph).unwrap_or(id);
        self.graph_data(graph).map_or("?", |g| g.xname.as_str())
    }

    /// Whether a node processes signal. A graph does when any member does or
    /// when it reads an audio input.
    pub fn is_signal_node(&self, id: NodeId) -> bool {
        let node = &self[id];
        match node.graph_data() {
            Some(g) => g.members.values().any(|&m| {
                self.is_signal_node(m) || (self[m].is_ir(IrOp::Inlet) && self[m].proxy_index() > ADC_INLET_BASE)
            }),
            None => node.is_signal_op(),
        }
    }

    /// Audio input channels read anywhere below `graph`.
    pub fn input_channels(&self, graph: NodeId) -> BTreeSet<i64> {
        self.collect_channels(graph, |g| &g.input_channels)
    }

    /// Audio output channels written anywhere below `graph`.
    pub fn output_channels(&self, graph: NodeId) -> BTreeSet<i64> {
        self.collect_channels(graph, |g| &g.output_channels)
    }

    fn collect_channels(&self, graph: NodeId, pick: fn(&GraphData) -> &BTreeSet<i64>) -> BTreeSet<i64> {
        let mut set = self.graph_data(graph).map(|g| pick(g).clone()).unwrap_or_default();
        for sub in self.subgraphs(graph) {
            set.extend(self.collect_channels(sub, pick));
        }
        set
    }

    // ── Scopes ──────────────────────────────────────────────────────────────

    pub fn scope(&self, graph: NodeId) -> Option<&ScopeTable> {
        self.graph_data(graph).map(|g| &g.scope)
    }

    fn binding_kind(node: &Node) -> Option<(ScopeKind, bool)> {
        let kind = match node.kind {
            NodeKind::Lang(LangOp::Var) => (ScopeKind::Var, true),
            NodeKind::Lang(LangOp::Table) | NodeKind::Ir(IrOp::Table) => (ScopeKind::Table, true),
            NodeKind::Lang(LangOp::Send) | NodeKind::Ir(IrOp::Send) => (ScopeKind::Send, false),
            NodeKind::Lang(LangOp::Receive) | NodeKind::Ir(IrOp::Receive) => (ScopeKind::Receive, false),
            _ => return None,
        };
        Some(kind)
    }

    /// Register a named object in the scope table its visibility selects.
    pub(crate) fn register_name(&mut self, id: NodeId) -> Result<(), CompileError> {
        let node = &self[id];
        let Some((kind, unique)) = Self::binding_kind(node) else {
            return Ok(());
        };
        let Some(name) = node.name().map(str::to_string) else {
            return Ok(());
        };
        let annotations = node.annotations;
        let home = node.graph.unwrap_or(self.root);

        let table = match annotations.scope {
            Visibility::Private if !annotations.is_static => home,
            Visibility::Protected => self[home].graph.unwrap_or(home),
            _ => self.root,
        };
        // a static object is shared by every instance of its abstraction
        let visibility = if annotations.is_static {
            Visibility::Public
        } else {
            annotations.scope
        };
        let entry = ScopeEntry {
            node: id,
            kind,
            visibility,
            home,
        };

        let outcome = self.graph_mut(table)?.scope.register(&name, entry, annotations.is_static, unique);
        match outcome {
            Registration::Added => {
                self[id].binding = Some(NameBinding { table, name, kind });
                Ok(())
            }
            Registration::SharedStatic => Ok(()),
            Registration::Conflict => Err(self.error(
                id,
                codes::E0114,
                format!("a {} named \"{}\" already exists", kind.label(), name),
            )),
        }
    }

    /// Objects named `name` visible from `from`, nearest scope first.
    pub fn resolve_all(&self, from: NodeId, name: &str, kind: ScopeKind) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = Some(from);
        while let Some(g) = cursor {
            if let Some(table) = self.scope(g) {
                out.extend(
                    table
                        .entries(name, kind)
                        .filter(|e| !(e.visibility == Visibility::Private && e.home != from))
                        .map(|e| e.node),
                );
            }
            cursor = self.get(g).and_then(|n| n.graph);
        }
        out
    }

    /// The nearest object named `name` visible from `from`.
    pub fn resolve(&self, from: NodeId, name: &str, kind: ScopeKind) -> Option<NodeId> {
        self.resolve_all(from, name, kind).into_iter().next()
    }

    /// Abstraction search path entries of `graph` and its ancestors, nearest
    /// first.
    pub fn import_paths(&self, graph: NodeId) -> Vec<PathBuf> {
        let mut out = Vec::new();
        let mut cursor = Some(graph);
        while let Some(g) = cursor {
            if let Some(table) = self.scope(g) {
                out.extend(table.import_paths.iter().cloned());
            }
            cursor = self.get(g).and_then(|n| n.graph);
        }
        out
    }

    // ── Diagnostics ─────────────────────────────────────────────────────────

    /// `<type> <id> in <graph>` for a node.
    pub fn origin(&self, id: NodeId) -> String {
        match self.get(id) {
            Some(node) => format!("{} {} in {}", node.type_tag(), node.ir_id, self.xname_of(id)),
            None => format!("removed node {id}"),
        }
    }

    pub fn warn(&mut self, id: NodeId, code: DiagCode, message: impl Into<String>) {
        let d = Diagnostic::warning(code, message).with_origin(self.origin(id));
        tracing::warn!("{}", d.message);
        self.notices.push(d);
    }

    /// A fatal error about `id`. The caller returns it.
    pub fn error(&self, id: NodeId, code: DiagCode, message: impl Into<String>) -> CompileError {
        CompileError::new(Diagnostic::error(code, message).with_origin(self.origin(id)))
    }

    pub fn push_notice(&mut self, d: Diagnostic) {
        self.notices.push(d);
    }

    pub fn notices(&self) -> &[Diagnostic] {
        &self.notices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Binop;
    use crate::connection::ConnKind;
    use serde_json::json;

    fn args(v: serde_json::Value) -> Args {
        match v {
            serde_json::Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    fn add_ir(p: &mut Patch, graph: NodeId, op: IrOp) -> NodeId {
        let id = p.new_ir(op, Args::new()).unwrap();
        p.add_to_graph(graph, id, true).unwrap();
        id
    }

    fn sig(from: NodeId, outlet: usize, to: NodeId, inlet: usize) -> Connection {
        Connection::new(from, outlet, to, inlet, ConnKind::FloatSignal)
    }

    #[test]
    fn removed_ids_go_stale() {
        let mut p = Patch::new("main");
        let root = p.root();
        let a = add_ir(&mut p, root, IrOp::AddF);
        p.remove(a);
        assert!(!p.contains(a));
        let b = add_ir(&mut p, root, IrOp::AddF);
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert_eq!(p.members(root), vec![b]);
    }

    #[test]
    fn proxies_extend_graph_lets_in_index_order() {
        let mut p = Patch::new("main");
        let root = p.root();
        let g = p.new_graph("sub", None, Args::new());
        p.add_to_graph(root, g, true).unwrap();
        let i1 = p.new_ir(IrOp::Inlet, args(json!({"index": 1}))).unwrap();
        let i0 = p.new_ir(IrOp::Inlet, args(json!({"index": 0}))).unwrap();
        p.add_to_graph(g, i1, true).unwrap();
        p.add_to_graph(g, i0, true).unwrap();
        assert_eq!(p.inlet_proxies(g), &[i0, i1]);
        assert_eq!(p[g].num_inlets(), 2);
        // an audio input is not a graph inlet
        let adc = p.new_ir(IrOp::Inlet, args(json!({"index": 128}))).unwrap();
        p.add_to_graph(g, adc, true).unwrap();
        assert_eq!(p[g].num_inlets(), 2);
        assert!(p.is_signal_node(g));
    }

    #[test]
    fn connect_checks_ranges_and_scope() {
        let mut p = Patch::new("main");
        let root = p.root();
        let a = add_ir(&mut p, root, IrOp::MulF);
        let b = add_ir(&mut p, root, IrOp::AddF);
        assert!(p.connect(sig(a, 0, b, 1)).is_ok());
        let err = p.connect(sig(a, 1, b, 0)).unwrap_err();
        assert_eq!(err.code(), Some(codes::E0110));

        let g = p.new_graph("sub", None, Args::new());
        p.add_to_graph(root, g, true).unwrap();
        let c = add_ir(&mut p, g, IrOp::AddF);
        assert_eq!(p.connect(sig(a, 0, c, 0)).unwrap_err().code(), Some(codes::E0110));
        assert!(p.connect_cross_scope(sig(a, 0, c, 0)).is_ok());
    }

    #[test]
    fn replace_keeps_order_at_the_shared_destination() {
        let mut p = Patch::new("main");
        let root = p.root();
        let x = add_ir(&mut p, root, IrOp::SinF);
        let y = add_ir(&mut p, root, IrOp::CosF);
        let z = add_ir(&mut p, root, IrOp::TanF);
        let sink = add_ir(&mut p, root, IrOp::AbsF);
        let cx = sig(x, 0, sink, 0);
        let cy = sig(y, 0, sink, 0);
        p.connect(cx).unwrap();
        p.connect(cy).unwrap();

        let cz = cx.with_from(z, 0);
        p.replace(Some(cx), vec![cz]).unwrap();
        assert_eq!(p[sink].inlets[0], vec![cz, cy]);
        assert!(p[x].outlets[0].is_empty());
        assert_eq!(p[z].outlets[0], vec![cz]);
    }

    #[test]
    fn replace_keeps_order_at_the_shared_source() {
        let mut p = Patch::new("main");
        let root = p.root();
        let src = add_ir(&mut p, root, IrOp::SinF);
        let a = add_ir(&mut p, root, IrOp::AbsF);
        let b = add_ir(&mut p, root, IrOp::CosF);
        let c = add_ir(&mut p, root, IrOp::TanF);
        let ca = sig(src, 0, a, 0);
        let cb = sig(src, 0, b, 0);
        p.connect(ca).unwrap();
        p.connect(cb).unwrap();

        let moved = ca.with_to(c, 0);
        p.replace(Some(ca), vec![moved]).unwrap();
        assert_eq!(p[src].outlets[0], vec![moved, cb]);
        assert!(p[a].inlets[0].is_empty());
    }

    #[test]
    fn replace_without_shared_endpoint_is_rejected() {
        let mut p = Patch::new("main");
        let root = p.root();
        let a = add_ir(&mut p, root, IrOp::SinF);
        let b = add_ir(&mut p, root, IrOp::CosF);
        let c = add_ir(&mut p, root, IrOp::TanF);
        let d = add_ir(&mut p, root, IrOp::AbsF);
        let ab = sig(a, 0, b, 0);
        p.connect(ab).unwrap();
        let err = p.replace(Some(ab), vec![sig(c, 0, d, 0)]).unwrap_err();
        assert_eq!(err.code(), Some(codes::E0110));
    }

    #[test]
    fn scope_visibility_rules() {
        let mut p = Patch::new("main");
        let root = p.root();
        let g = p.new_graph("sub", None, Args::new());
        p.add_to_graph(root, g, true).unwrap();

        let private = p.alloc(
            NodeKind::Lang(LangOp::Table),
            args(json!({"name": "wave"})),
            Annotations::default(),
        );
        p.add_to_graph(g, private, true).unwrap();
        assert_eq!(p.resolve(g, "wave", ScopeKind::Table), Some(private));
        assert_eq!(p.resolve(root, "wave", ScopeKind::Table), None);

        let public = p.alloc(
            NodeKind::Lang(LangOp::Receive),
            args(json!({"name": "freq"})),
            Annotations {
                scope: Visibility::Public,
                is_static: false,
            },
        );
        p.add_to_graph(g, public, true).unwrap();
        assert_eq!(p.resolve(root, "freq", ScopeKind::Receive), Some(public));

        p.remove(public);
        assert_eq!(p.resolve(root, "freq", ScopeKind::Receive), None);
    }

    #[test]
    fn duplicate_tables_conflict() {
        let mut p = Patch::new("main");
        let root = p.root();
        for expect_ok in [true, false] {
            let t = p.alloc(
                NodeKind::Lang(LangOp::Table),
                args(json!({"name": "wave"})),
                Annotations::default(),
            );
            let r = p.add_to_graph(root, t, true);
            assert_eq!(r.is_ok(), expect_ok);
            if !expect_ok {
                assert_eq!(r.unwrap_err().code(), Some(codes::E0114));
            }
        }
    }

    #[test]
    fn transfer_identity_moves_name_and_id() {
        let mut p = Patch::new("main");
        let root = p.root();
        let var = p.alloc(
            NodeKind::Lang(LangOp::Var),
            args(json!({"name": "gain", "k": 1.0})),
            Annotations::default(),
        );
        p.add_to_graph(root, var, true).unwrap();
        let lowered = p.new_ir(IrOp::Var, args(json!({"k": 1.0}))).unwrap();
        p.add_to_graph(root, lowered, false).unwrap();
        let id = p[var].ir_id;
        p.transfer_identity(var, lowered);
        p.remove(var);
        assert_eq!(p[lowered].ir_id, id);
        assert_eq!(p.resolve(root, "gain", ScopeKind::Var), Some(lowered));
    }

    #[test]
    fn removing_a_node_drops_its_connections_everywhere() {
        let mut p = Patch::new("main");
        let root = p.root();
        let a = add_ir(&mut p, root, IrOp::SinF);
        let plus = p.alloc(
            NodeKind::Lang(LangOp::Binop(Binop::Add)),
            Args::new(),
            Annotations::default(),
        );
        p.add_to_graph(root, plus, true).unwrap();
        p.connect(sig(a, 0, plus, 0)).unwrap();
        p.remove(plus);
        assert!(p[a].outlets[0].is_empty());
        assert_eq!(p.origin(a), format!("__sin~f {} in main", p[a].ir_id));
    }
}
