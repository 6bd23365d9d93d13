// type_resolve.rs — Resolve polymorphic connections to concrete kinds
//
// Walks each graph top-down from its roots (members without incoming
// connections). Every outgoing polymorphic connection is replaced by one of
// the kind its source resolves to. A graph resolves its own members before
// its outgoing connections, since those take the kind of whatever feeds the
// matching outlet proxy.
//
// Preconditions: the patch is loaded.
// Postconditions: every connection reachable from a root has a concrete kind.
// Failure modes: conflicting incident kinds → E0105.
// Side effects: rewrites connections in place through `Patch::replace`.

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, trace};

use crate::catalog::{IrOp, LangOp, ADC_INLET_BASE};
use crate::connection::{kind_set, ConnKind, Connection};
use crate::diag::{codes, CompileError};
use crate::graph::Patch;
use crate::id::NodeId;
use crate::node::NodeKind;

enum Task {
    Visit(NodeId),
    Outgoing(NodeId),
}

/// Resolve every polymorphic connection reachable from a root. Returns the
/// number of connections rewritten.
pub fn resolve_connection_types(patch: &mut Patch) -> Result<usize, CompileError> {
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut stack = vec![Task::Visit(patch.root())];
    let mut rewritten = 0;

    while let Some(task) = stack.pop() {
        match task {
            Task::Visit(id) => {
                if !patch.contains(id) || !visited.insert(id) {
                    continue;
                }
                stack.push(Task::Outgoing(id));
                if patch[id].is_graph() {
                    let roots: Vec<NodeId> = patch
                        .members(id)
                        .into_iter()
                        .filter(|&m| patch[m].inlets.iter().all(Vec::is_empty))
                        .collect();
                    stack.extend(roots.into_iter().rev().map(Task::Visit));
                }
            }
            Task::Outgoing(id) => {
                let conns: Vec<Connection> = patch[id].outlets.iter().flatten().copied().collect();
                let mut targets = Vec::with_capacity(conns.len());
                for c in conns {
                    if c.is_mixed() {
                        let kind = resolved_outlet_kind(patch, id, c.outlet)?;
                        if kind == ConnKind::Mixed {
                            return Err(patch.error(
                                id,
                                codes::E0105,
                                format!("outlet {} is fed only by unresolved connections", c.outlet),
                            ));
                        }
                        trace!(%c, %kind, "resolved connection");
                        patch.replace(Some(c), vec![c.with_kind(kind)])?;
                        rewritten += 1;
                    }
                    targets.push(c.to);
                }
                stack.extend(targets.into_iter().rev().map(Task::Visit));
            }
        }
    }

    debug!(rewritten, "connection types resolved");
    Ok(rewritten)
}

/// The concrete kind an outlet produces given what is connected upstream.
pub fn resolved_outlet_kind(patch: &Patch, id: NodeId, outlet: usize) -> Result<ConnKind, CompileError> {
    let node = &patch[id];
    match &node.kind {
        NodeKind::Graph(g) => {
            let Some(&proxy) = g.outlet_proxies.get(outlet) else {
                return Ok(ConnKind::Control);
            };
            strict(patch, id, kind_set(&patch[proxy].inlets[0]))
        }
        NodeKind::Ir(IrOp::Inlet) if node.proxy_index() > ADC_INLET_BASE => Ok(ConnKind::FloatSignal),
        NodeKind::Ir(IrOp::Inlet) => {
            let Some(parent) = node.graph else {
                return Ok(ConnKind::Control);
            };
            let position = patch.inlet_proxies(parent).iter().position(|&p| p == id);
            let incoming = position
                .and_then(|i| patch[parent].inlets.get(i))
                .map(|conns| kind_set(conns))
                .unwrap_or_default();
            strict(patch, id, incoming)
        }
        NodeKind::Lang(LangOp::Adc) => Ok(ConnKind::FloatSignal),
        _ => {
            let declared = node.declared_outlet_kind(outlet);
            if declared != ConnKind::Mixed {
                return Ok(declared);
            }
            let kinds = node.inlets.first().map(|c| kind_set(c)).unwrap_or_default();
            from_first_inlet(patch, id, kinds)
        }
    }
}

/// Proxies pass one kind through unchanged.
fn strict(patch: &Patch, id: NodeId, kinds: BTreeSet<ConnKind>) -> Result<ConnKind, CompileError> {
    let mut iter = kinds.iter();
    match (iter.next(), iter.next()) {
        (None, _) => Ok(ConnKind::Control),
        (Some(&k), None) => Ok(k),
        _ => Err(patch.error(
            id,
            codes::E0105,
            format!("incident connections of differing kinds {}", describe(&kinds)),
        )),
    }
}

/// A signal mixed with control resolves to the signal.
fn from_first_inlet(patch: &Patch, id: NodeId, kinds: BTreeSet<ConnKind>) -> Result<ConnKind, CompileError> {
    use ConnKind::{Control, FloatSignal, IntSignal};
    let v: Vec<ConnKind> = kinds.iter().copied().collect();
    match v.as_slice() {
        [] => Ok(Control),
        [k] => Ok(*k),
        [Control, FloatSignal] => Ok(FloatSignal),
        [Control, IntSignal] => Ok(IntSignal),
        _ => Err(patch.error(
            id,
            codes::E0105,
            format!("cannot resolve outlet kind from inlet kinds {}", describe(&kinds)),
        )),
    }
}

fn describe(kinds: &BTreeSet<ConnKind>) -> String {
    let parts: Vec<&str> = kinds.iter().map(|k| k.symbol()).collect();
    format!("{{{}}}", parts.join(", "))
}
