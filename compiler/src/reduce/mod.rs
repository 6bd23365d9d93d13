// reduce/mod.rs — Node reduction protocol
//
// A high-level node reduces to a `Reduction`: the canonical nodes replacing
// it and the connection rewrites that move its external connectivity onto
// them. Canonical nodes reduce to `Outcome::Identity` (table-referencing
// operations first bind their table id). The graph applies a reduction in
// one step: new nodes join the graph, the successor inherits the old node's
// IR id and name registration, every rewrite is applied through
// `Patch::replace`, and the old node is removed with whatever still touches
// it.
//
// Preconditions: every connection has a concrete kind (type resolution ran).
// Postconditions: no high-level node remains below the reduced graph.
// Failure modes: unsupported connection format → E0106; unresolved named
//                reference → E0104; bad extern name → E0111.
// Side effects: W0103 for unconnected sends and receives.

mod arith;
mod objects;

use serde_json::Value;
use tracing::{debug, trace};

use crate::catalog::{IrOp, LangOp};
use crate::connection::{format_signature, Connection};
use crate::diag::{codes, CompileError, DiagCode};
use crate::graph::Patch;
use crate::id::NodeId;
use crate::node::NodeKind;
use crate::scope::ScopeKind;
use crate::value::Args;

// ── Protocol types ──────────────────────────────────────────────────────────

/// One connection edit. `old == None` adds `new`; an empty `new` deletes `old`.
#[derive(Debug, Clone, PartialEq)]
pub struct Rewrite {
    pub old: Option<Connection>,
    pub new: Vec<Connection>,
}

/// Replacement set for one high-level node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reduction {
    pub nodes: Vec<NodeId>,
    pub rewrites: Vec<Rewrite>,
    /// The node that takes over the old node's identity, if any.
    pub successor: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Identity,
    Replace(Reduction),
}

// ── Lowering context ────────────────────────────────────────────────────────

/// Working state for lowering one high-level node. Nodes created through
/// the context are detached until the reduction is applied.
pub(crate) struct Lowering<'p> {
    pub patch: &'p mut Patch,
    pub id: NodeId,
    pub op: LangOp,
    pub args: Args,
    pub inlets: Vec<Vec<Connection>>,
    pub outlets: Vec<Vec<Connection>>,
    out: Reduction,
}

impl<'p> Lowering<'p> {
    fn new(patch: &'p mut Patch, id: NodeId, op: LangOp) -> Self {
        let node = &patch[id];
        let (args, inlets, outlets) = (node.args.clone(), node.inlets.clone(), node.outlets.clone());
        Self {
            patch,
            id,
            op,
            args,
            inlets,
            outlets,
            out: Reduction::default(),
        }
    }

    pub fn inlet_format(&self) -> String {
        format_signature(&self.inlets)
    }

    pub fn outlet_format(&self) -> String {
        format_signature(&self.outlets)
    }

    pub fn arg_f64(&self, key: &str) -> f64 {
        self.args.get(key).and_then(Value::as_f64).unwrap_or(0.0)
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }

    /// The graph the node being lowered belongs to.
    pub fn graph(&self) -> NodeId {
        self.patch[self.id].graph.unwrap_or_else(|| self.patch.root())
    }

    /// Create a replacement node.
    pub fn ir(&mut self, op: IrOp, args: Args) -> Result<NodeId, CompileError> {
        let n = self.patch.new_ir(op, args)?;
        self.out.nodes.push(n);
        Ok(n)
    }

    /// Create the replacement that inherits the old node's identity.
    pub fn successor(&mut self, op: IrOp, args: Args) -> Result<NodeId, CompileError> {
        let n = self.ir(op, args)?;
        self.out.successor = Some(n);
        Ok(n)
    }

    pub fn rewrite(&mut self, old: Option<Connection>, new: Vec<Connection>) {
        self.out.rewrites.push(Rewrite { old, new });
    }

    pub fn add(&mut self, c: Connection) {
        self.rewrite(None, vec![c]);
    }

    /// Deliver everything wired to `inlet` to `to:to_inlet` instead.
    pub fn move_inlet(&mut self, inlet: usize, to: NodeId, to_inlet: usize) {
        let conns = self.inlets.get(inlet).cloned().unwrap_or_default();
        for c in conns {
            self.rewrite(Some(c), vec![c.with_to(to, to_inlet)]);
        }
    }

    /// Source everything leaving `outlet` from `from:from_outlet` instead.
    pub fn move_outlet(&mut self, outlet: usize, from: NodeId, from_outlet: usize) {
        let conns = self.outlets.get(outlet).cloned().unwrap_or_default();
        for c in conns {
            self.rewrite(Some(c), vec![c.with_from(from, from_outlet)]);
        }
    }

    /// Let-for-let replacement by `n`.
    pub fn move_all(&mut self, n: NodeId) {
        for i in 0..self.inlets.len() {
            self.move_inlet(i, n, i);
        }
        for o in 0..self.outlets.len() {
            self.move_outlet(o, n, o);
        }
    }

    pub fn error(&self, code: DiagCode, message: impl Into<String>) -> CompileError {
        self.patch.error(self.id, code, message)
    }

    pub fn warn(&mut self, code: DiagCode, message: impl Into<String>) {
        self.patch.warn(self.id, code, message);
    }

    /// The format is not one this object accepts.
    pub fn bad_format(&self, format: &str) -> CompileError {
        let msg = if format.contains('m') {
            format!("{} cannot have both signal and control connections on one let ({format})", self.op.type_name())
        } else {
            format!("unknown inlet configuration \"{format}\" for {}", self.op.type_name())
        };
        self.error(codes::E0106, msg)
    }

    pub fn finish(self) -> Outcome {
        Outcome::Replace(self.out)
    }
}

/// Build an argument map from a JSON object literal.
pub(crate) fn obj(value: Value) -> Args {
    match value {
        Value::Object(map) => map,
        _ => Args::new(),
    }
}

// ── Driver ──────────────────────────────────────────────────────────────────

/// Reduce one node.
pub fn reduce_node(patch: &mut Patch, id: NodeId) -> Result<Outcome, CompileError> {
    match patch[id].kind {
        NodeKind::Lang(op) => {
            let cx = Lowering::new(patch, id, op);
            match op {
                LangOp::Binop(b) => arith::binop(cx, b),
                LangOp::Unop(u) => arith::unop(cx, u),
                _ => objects::lower(cx),
            }
        }
        NodeKind::Ir(op) if op.references_table() => {
            bind_table(patch, id)?;
            Ok(Outcome::Identity)
        }
        NodeKind::Ir(_) | NodeKind::Graph(_) => Ok(Outcome::Identity),
    }
}

fn bind_table(patch: &mut Patch, id: NodeId) -> Result<(), CompileError> {
    let Some(name) = patch[id].arg_str("table").map(str::to_string) else {
        return Err(patch.error(id, codes::E0104, "no table named"));
    };
    let graph = patch[id].graph.unwrap_or_else(|| patch.root());
    let Some(table) = patch.resolve(graph, &name, ScopeKind::Table) else {
        return Err(patch.error(id, codes::E0104, format!("cannot find table named \"{name}\"")));
    };
    let table_id = patch[table].ir_id.to_string();
    patch[id].args.insert("table_id".into(), Value::String(table_id));
    Ok(())
}

/// Install a reduction in `graph` in place of `old`.
pub fn apply(patch: &mut Patch, graph: NodeId, old: NodeId, reduction: Reduction) -> Result<(), CompileError> {
    let Reduction {
        nodes,
        rewrites,
        successor,
    } = reduction;
    for &n in &nodes {
        patch.add_to_graph(graph, n, Some(n) != successor)?;
    }
    if let Some(s) = successor {
        patch.transfer_identity(old, s);
    }
    for Rewrite { old: c, new } in rewrites {
        patch.replace(c, new)?;
    }
    patch.remove(old);
    Ok(())
}

/// Reduce every member of `graph` and of its sub-graphs. Returns the number
/// of high-level nodes replaced.
pub fn reduce_graph(patch: &mut Patch, graph: NodeId) -> Result<usize, CompileError> {
    let mut reduced = 0;
    for id in patch.members(graph) {
        if !patch.contains(id) {
            continue;
        }
        if patch[id].is_graph() {
            reduced += reduce_graph(patch, id)?;
            continue;
        }
        let tag = patch[id].type_tag().to_string();
        if let Outcome::Replace(r) = reduce_node(patch, id)? {
            trace!(node = %id, added = r.nodes.len(), "reduced {tag}");
            apply(patch, graph, id, r)?;
            reduced += 1;
        }
    }
    if graph == patch.root() {
        debug!(reduced, "reduction complete");
    }
    Ok(reduced)
}

#[cfg(test)]
pub(crate) mod fixture {
    //! Small builders shared by the lowering tests.

    use super::*;
    use crate::connection::ConnKind;
    use crate::node::Annotations;

    pub fn lang(p: &mut Patch, op: LangOp, args: Value) -> NodeId {
        let resolved = crate::value::resolve_args(&crate::value::rules_of(op.spec().args), &obj(args), "test").unwrap();
        let id = p.alloc(NodeKind::Lang(op), resolved.args, Annotations::default());
        let root = p.root();
        p.add_to_graph(root, id, true).unwrap();
        id
    }

    pub fn ir(p: &mut Patch, op: IrOp, args: Value) -> NodeId {
        let id = p.new_ir(op, obj(args)).unwrap();
        let root = p.root();
        p.add_to_graph(root, id, true).unwrap();
        id
    }

    pub fn wire(p: &mut Patch, from: NodeId, outlet: usize, to: NodeId, inlet: usize, kind: ConnKind) {
        p.connect(Connection::new(from, outlet, to, inlet, kind)).unwrap();
    }

    /// Type tags of the root members, in insertion order.
    pub fn tags(p: &Patch) -> Vec<String> {
        p.members(p.root()).iter().map(|&m| p[m].type_tag().to_string()).collect()
    }

    /// The single producer feeding `to:inlet`.
    pub fn source_of(p: &Patch, to: NodeId, inlet: usize) -> NodeId {
        let conns = &p[to].inlets[inlet];
        assert_eq!(conns.len(), 1, "expected one connection on inlet {inlet}");
        conns[0].from
    }
}
