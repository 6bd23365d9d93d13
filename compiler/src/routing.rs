// routing.rs — Erase named routing
//
// Two passes that turn name-addressed objects into explicit connections.
// Signal send/receive (before reduction) becomes a shared signal variable:
// each writer stores into a variable, each reader reads it back. Control
// receivers (after reduction) that share a name in the root scope are merged
// into one receiver whose outgoing connections fan out in priority order.
//
// Preconditions: remapping: types resolved. Grouping: fully reduced.
// Postconditions: no high-level signal send or receive remains; each name in
//                 the root scope has at most one control receiver.
// Failure modes: merged receivers disagree on extern or attributes → E0107.
// Side effects: none beyond the patch.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::Value;
use tracing::{debug, trace};

use crate::catalog::{IrOp, LangOp};
use crate::connection::{ConnKind, Connection};
use crate::diag::{codes, CompileError};
use crate::graph::Patch;
use crate::id::NodeId;
use crate::reduce::obj;
use crate::scope::ScopeKind;
use crate::value::Args;

// ── Signal send/receive ─────────────────────────────────────────────────────

/// Counts reported by [`remap_send_receive`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemapStats {
    pub names: usize,
    pub writers: usize,
    pub readers: usize,
}

struct Route {
    name: String,
    writers: Vec<NodeId>,
    readers: Vec<NodeId>,
}

/// Rewire every signal send and its receivers through signal variables.
pub fn remap_send_receive(patch: &mut Patch) -> Result<RemapStats, CompileError> {
    let routes = collect_routes(patch);
    let mut stats = RemapStats::default();
    let mut vars: HashMap<NodeId, String> = HashMap::new();
    let mut removed = Vec::new();

    for route in routes {
        stats.names += 1;
        stats.readers += route.readers.len();

        let mut route_vars = Vec::with_capacity(route.writers.len());
        for &w in &route.writers {
            let var_id = match vars.get(&w) {
                Some(v) => v.clone(),
                None => {
                    let v = store(patch, w)?;
                    vars.insert(w, v.clone());
                    removed.push(w);
                    v
                }
            };
            route_vars.push(var_id);
        }
        for &r in &route.readers {
            load(patch, r, &route_vars)?;
        }
        trace!(name = route.name, writers = route_vars.len(), readers = route.readers.len(), "remapped signal route");
        removed.extend(route.readers);
    }
    stats.writers = vars.len();

    for id in removed {
        patch.remove(id);
    }
    debug!(names = stats.names, writers = stats.writers, readers = stats.readers, "send/receive remapped");
    Ok(stats)
}

fn is_signal_writer(patch: &Patch, id: NodeId) -> bool {
    patch[id].lang_op() == Some(LangOp::Send) && patch[id].inlet_format() == "f"
}

/// Signal routes in name order. Readers that see the same writers through
/// their scope chain share one route; writers no reader can see form a
/// route of their own so their input is still consumed.
fn collect_routes(patch: &Patch) -> Vec<Route> {
    let root = patch.root();
    let mut graphs = vec![root];
    graphs.extend(patch.descendants(root).into_iter().filter(|&n| patch[n].is_graph()));

    let mut writers: BTreeMap<String, Vec<NodeId>> = BTreeMap::new();
    let mut readers: BTreeMap<String, Vec<NodeId>> = BTreeMap::new();
    for g in graphs {
        let Some(table) = patch.scope(g) else { continue };
        for (name, entries) in table.by_kind(ScopeKind::Send) {
            let found = entries.iter().map(|e| e.node).filter(|&n| is_signal_writer(patch, n));
            writers.entry(name).or_default().extend(found);
        }
        for (name, entries) in table.by_kind(ScopeKind::Receive) {
            let found = entries
                .iter()
                .map(|e| e.node)
                .filter(|&n| patch[n].lang_op() == Some(LangOp::Receive));
            readers.entry(name).or_default().extend(found);
        }
    }

    let mut routes = Vec::new();
    for (name, all_writers) in writers {
        let mut by_writers: BTreeMap<Vec<NodeId>, Vec<NodeId>> = BTreeMap::new();
        for &r in readers.get(&name).into_iter().flatten() {
            let home = patch[r].graph.unwrap_or(root);
            let mut visible: Vec<NodeId> = Vec::new();
            for w in patch.resolve_all(home, &name, ScopeKind::Send) {
                if is_signal_writer(patch, w) && !visible.contains(&w) {
                    visible.push(w);
                }
            }
            if !visible.is_empty() {
                by_writers.entry(visible).or_default().push(r);
            }
        }

        let seen: HashSet<NodeId> = by_writers.keys().flatten().copied().collect();
        let unseen: Vec<NodeId> = all_writers.into_iter().filter(|w| !seen.contains(w)).collect();
        for (ws, rs) in by_writers {
            routes.push(Route {
                name: name.clone(),
                writers: ws,
                readers: rs,
            });
        }
        if !unseen.is_empty() {
            routes.push(Route {
                name,
                writers: unseen,
                readers: Vec::new(),
            });
        }
    }
    routes
}

/// Redirect a writer's input into a fresh variable; returns the variable's
/// IR id string.
fn store(patch: &mut Patch, writer: NodeId) -> Result<String, CompileError> {
    let graph = patch[writer].graph.unwrap_or(patch.root());
    let var = patch.new_ir(IrOp::VarF, Args::new())?;
    patch.add_to_graph(graph, var, false)?;
    let var_id = patch[var].ir_id.to_string();

    let write = patch.new_ir(IrOp::VarWriteF, obj(serde_json::json!({ "var_id": var_id })))?;
    patch.add_to_graph(graph, write, false)?;
    for c in patch[writer].inlets[0].clone() {
        patch.replace(Some(c), vec![c.with_to(write, 0)])?;
    }
    Ok(var_id)
}

/// Feed a reader's outputs from reads of every variable, summed pairwise.
fn load(patch: &mut Patch, reader: NodeId, vars: &[String]) -> Result<(), CompileError> {
    let outgoing: Vec<Connection> = patch[reader].outlets[0].clone();
    if outgoing.is_empty() {
        return Ok(());
    }
    let graph = patch[reader].graph.unwrap_or(patch.root());

    let mut level = Vec::with_capacity(vars.len());
    for var_id in vars {
        let read = patch.new_ir(IrOp::VarReadF, obj(serde_json::json!({ "var_id": var_id })))?;
        patch.add_to_graph(graph, read, false)?;
        level.push(read);
    }
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            match *pair {
                [a, b] => {
                    let add = patch.new_ir(IrOp::AddF, Args::new())?;
                    patch.add_to_graph(graph, add, false)?;
                    patch.connect(Connection::new(a, 0, add, 0, ConnKind::FloatSignal))?;
                    patch.connect(Connection::new(b, 0, add, 1, ConnKind::FloatSignal))?;
                    next.push(add);
                }
                [odd] => next.push(odd),
                _ => {}
            }
        }
        level = next;
    }

    let head = level[0];
    for c in outgoing {
        patch.replace(Some(c), vec![c.with_from(head, 0).with_kind(ConnKind::FloatSignal)])?;
    }
    Ok(())
}

// ── Control receivers ───────────────────────────────────────────────────────

/// Merge same-named control receivers of the root scope. Returns the number
/// of receivers merged away.
pub fn group_control_receivers(patch: &mut Patch) -> Result<usize, CompileError> {
    let root = patch.root();
    let groups: Vec<(String, Vec<NodeId>)> = match patch.scope(root) {
        Some(table) => table
            .by_kind(ScopeKind::Receive)
            .into_iter()
            .map(|(name, entries)| {
                let ids = entries
                    .into_iter()
                    .map(|e| e.node)
                    .filter(|&n| patch[n].is_ir(IrOp::Receive))
                    .collect();
                (name, ids)
            })
            .collect(),
        None => Vec::new(),
    };

    let mut merged = 0;
    for (name, ids) in groups {
        if ids.len() < 2 {
            continue;
        }
        merged += merge(patch, &name, ids)?;
    }
    debug!(merged, "control receivers grouped");
    Ok(merged)
}

fn merge(patch: &mut Patch, name: &str, mut ids: Vec<NodeId>) -> Result<usize, CompileError> {
    let root = patch.root();
    let (ext, attributes) = shared_attributes(patch, name, &ids)?;

    let mut args = obj(serde_json::json!({ "name": name, "attributes": attributes }));
    if let Some(ext) = ext {
        args.insert("extern".into(), Value::String(ext));
    }
    let receiver = patch.new_ir(IrOp::Receive, args)?;
    patch.add_to_graph(root, receiver, false)?;

    // highest priority first; equal priorities keep declaration order
    ids.sort_by_key(|&id| std::cmp::Reverse(priority(patch, id)));
    for &id in &ids {
        for c in patch[id].outlets[0].clone() {
            patch.replace(Some(c), vec![c.with_from(receiver, 0)])?;
        }
    }
    for &id in &ids {
        patch.remove(id);
    }
    patch.register_name(receiver)?;
    trace!(name, count = ids.len(), "merged receivers");
    Ok(ids.len() - 1)
}

fn priority(patch: &Patch, id: NodeId) -> i64 {
    patch[id].args.get("priority").and_then(Value::as_i64).unwrap_or(0)
}

fn shared_attributes(patch: &Patch, name: &str, ids: &[NodeId]) -> Result<(Option<String>, Value), CompileError> {
    let mut ext: Option<&str> = None;
    let mut attributes: Option<&Value> = None;
    for &id in ids {
        if let Some(e) = patch[id].arg_str("extern") {
            if ext.is_some_and(|prev| prev != e) {
                return Err(patch.error(
                    id,
                    codes::E0107,
                    format!("receivers named \"{name}\" disagree on extern ({} vs {e})", ext.unwrap_or_default()),
                ));
            }
            ext = Some(e);
        }
        match patch[id].args.get("attributes") {
            Some(a @ Value::Object(m)) if !m.is_empty() => {
                if attributes.is_some_and(|prev| prev != a) {
                    return Err(patch.error(
                        id,
                        codes::E0107,
                        format!("receivers named \"{name}\" declare conflicting attributes"),
                    ));
                }
                attributes = Some(a);
            }
            _ => {}
        }
    }
    Ok((
        ext.map(str::to_string),
        attributes.cloned().unwrap_or_else(|| Value::Object(Args::new())),
    ))
}
