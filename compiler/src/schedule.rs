// schedule.rs — Signal ordering and buffer assignment
//
// Orders the signal-processing members of every graph so each runs after its
// producers, then walks that order handing out pooled buffers. A producer's
// outlet buffer is retained once per outgoing connection and released by
// each consumer. Graph nodes pass buffers through their proxies.
//
// Preconditions: the patch is fully reduced, fan-in expanded and fused.
// Postconditions: `signal_order` is filled for every graph; every signal
//                 inlet with a producer reads that producer's buffer.
// Failure modes: two signal sources on one inlet → E0112; pool misuse →
//                E0113; signal-only feedback cycle → E0116.
// Side effects: writes `ordered` flags and buffer slots on nodes.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::buffer::{Buffer, BufferClass, PoolError};
use crate::connection::{ConnKind, Connection};
use crate::diag::{codes, CompileError};
use crate::graph::Patch;
use crate::id::NodeId;
use crate::type_resolve::resolved_outlet_kind;

/// Counts reported by [`assign_buffers`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleStats {
    /// Signal nodes placed in an execution order, graphs included.
    pub scheduled: usize,
    pub float_buffers: u32,
    pub int_buffers: u32,
}

/// Order every graph and assign buffers to every signal outlet.
pub fn assign_buffers(patch: &mut Patch) -> Result<ScheduleStats, CompileError> {
    let root = patch.root();
    check_signal_cycles(patch, root)?;
    for id in patch.descendants(root) {
        patch[id].ordered = false;
    }
    let scheduled = assign_graph(patch, root)?;
    let stats = ScheduleStats {
        scheduled,
        float_buffers: patch.pool.num_buffers(BufferClass::Float),
        int_buffers: patch.pool.num_buffers(BufferClass::Int),
    };
    debug!(
        scheduled = stats.scheduled,
        float = stats.float_buffers,
        int = stats.int_buffers,
        "buffers assigned"
    );
    Ok(stats)
}

// ── Ordering ────────────────────────────────────────────────────────────────

/// Signal members of `graph` in dependency order: a post-order walk up the
/// inlet connections from every member whose outlets are unconnected.
pub fn signal_order(patch: &mut Patch, graph: NodeId) -> Vec<NodeId> {
    let mut order = Vec::new();
    for leaf in patch.members(graph) {
        if patch[leaf].outlets.iter().all(Vec::is_empty) {
            walk_up(patch, leaf, &mut order);
        }
    }
    order.retain(|&n| patch.is_signal_node(n));
    order
}

fn walk_up(patch: &mut Patch, leaf: NodeId, order: &mut Vec<NodeId>) {
    let mut stack = vec![(leaf, false)];
    while let Some((id, expanded)) = stack.pop() {
        if expanded {
            order.push(id);
            continue;
        }
        if patch[id].ordered {
            continue;
        }
        patch[id].ordered = true;
        stack.push((id, true));
        let home = patch[id].graph;
        let sources: Vec<NodeId> = patch[id]
            .inlets
            .iter()
            .flatten()
            .map(|c| c.from)
            .filter(|&s| patch[s].graph == home && !patch[s].ordered)
            .collect();
        stack.extend(sources.into_iter().rev().map(|s| (s, false)));
    }
}

// ── Assignment ──────────────────────────────────────────────────────────────

fn assign_graph(patch: &mut Patch, graph: NodeId) -> Result<usize, CompileError> {
    // graph inlets hand their producer's buffer to the proxy
    let proxies = patch.inlet_proxies(graph).to_vec();
    for (i, proxy) in proxies.into_iter().enumerate() {
        let Some(c) = single_signal_source(patch, graph, i)? else { continue };
        let buffer = patch[c.from].outlet_buffers[c.outlet];
        patch[graph].inlet_buffers[i] = buffer;
        patch[proxy].outlet_buffers[0] = buffer;
        let readers = patch[proxy].outlets[0].iter().filter(|c| c.is_signal()).count();
        retain(patch, graph, buffer, readers as i64 - 1)?;
    }

    let order = signal_order(patch, graph);
    let mut scheduled = order.len();
    for &id in &order {
        if patch[id].is_graph() {
            scheduled += assign_graph(patch, id)?;
        } else {
            assign_node(patch, id)?;
        }
    }
    if let Some(g) = patch.graph_data_mut(graph) {
        g.signal_order = order;
    }

    // graph outlets expose whatever feeds their proxy
    let proxies = patch.outlet_proxies(graph).to_vec();
    for (i, proxy) in proxies.into_iter().enumerate() {
        let Some(c) = patch[proxy].inlets[0].iter().find(|c| c.is_signal()).copied() else {
            continue;
        };
        let buffer = patch[c.from].outlet_buffers[c.outlet];
        patch[proxy].inlet_buffers[0] = buffer;
        patch[graph].outlet_buffers[i] = buffer;
        let readers = patch[graph].outlets[i].len();
        retain(patch, graph, buffer, readers as i64 - 1)?;
    }
    Ok(scheduled)
}

fn assign_node(patch: &mut Patch, id: NodeId) -> Result<(), CompileError> {
    for inlet in 0..patch[id].num_inlets() {
        let Some(c) = single_signal_source(patch, id, inlet)? else { continue };
        let buffer = patch[c.from].outlet_buffers[c.outlet];
        patch[id].inlet_buffers[inlet] = buffer;
        patch.pool.release(buffer).map_err(|e| pool_error(patch, id, e))?;
    }

    let mut exclude: Vec<Buffer> = Vec::new();
    for outlet in 0..patch[id].num_outlets() {
        if !patch[id].outlet_buffers[outlet].is_zero() {
            continue;
        }
        let kind = match patch[id].declared_outlet_kind(outlet) {
            ConnKind::Mixed => resolved_outlet_kind(patch, id, outlet)?,
            k => k,
        };
        let Some(class) = BufferClass::for_kind(kind) else { continue };
        let readers = patch[id].outlets[outlet].len();
        let buffer = patch.pool.get_buffer(class, readers as u32, &exclude);
        if readers == 0 {
            exclude.push(buffer);
        }
        trace!(node = %patch[id].ir_id, outlet, %buffer, readers, "assigned buffer");
        patch[id].outlet_buffers[outlet] = buffer;
    }
    Ok(())
}

fn single_signal_source(
    patch: &Patch,
    id: NodeId,
    inlet: usize,
) -> Result<Option<Connection>, CompileError> {
    let mut sources = patch[id].inlets[inlet].iter().filter(|c| c.is_signal());
    match (sources.next(), sources.next()) {
        (None, _) => Ok(None),
        (Some(c), None) => Ok(Some(*c)),
        _ => Err(patch.error(
            id,
            codes::E0112,
            format!("inlet {inlet} has more than one signal source"),
        )),
    }
}

fn retain(patch: &mut Patch, id: NodeId, buffer: Buffer, delta: i64) -> Result<(), CompileError> {
    patch
        .pool
        .retain(buffer, delta)
        .map(drop)
        .map_err(|e| pool_error(patch, id, e))
}

fn pool_error(patch: &Patch, id: NodeId, err: PoolError) -> CompileError {
    patch.error(id, codes::E0113, err.to_string())
}

// ── Feedback detection ──────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Open,
    Done,
}

/// Reject cycles made only of signal connections between canonical signal
/// nodes of one graph. Sub-graph nodes break a cycle.
fn check_signal_cycles(patch: &Patch, graph: NodeId) -> Result<(), CompileError> {
    let members = patch.members(graph);
    let mut marks: HashMap<NodeId, Mark> = HashMap::new();

    for &start in &members {
        if !is_signal_leaf(patch, start) || marks.contains_key(&start) {
            continue;
        }
        let mut stack = vec![(start, 0usize)];
        marks.insert(start, Mark::Open);
        while let Some(top) = stack.last_mut() {
            let (id, next) = *top;
            top.1 += 1;
            if let Some(&t) = signal_targets(patch, id).get(next) {
                match marks.get(&t) {
                    Some(Mark::Open) => {
                        return Err(patch.error(t, codes::E0116, "signal feedback cycle without a delay"));
                    }
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(t, Mark::Open);
                        stack.push((t, 0));
                    }
                }
            } else {
                marks.insert(id, Mark::Done);
                stack.pop();
            }
        }
    }

    for sub in patch.subgraphs(graph) {
        check_signal_cycles(patch, sub)?;
    }
    Ok(())
}

fn is_signal_leaf(patch: &Patch, id: NodeId) -> bool {
    !patch[id].is_graph() && patch.is_signal_node(id)
}

fn signal_targets(patch: &Patch, id: NodeId) -> Vec<NodeId> {
    let home = patch[id].graph;
    patch[id]
        .outlets
        .iter()
        .flatten()
        .filter(|c| c.is_signal() && patch[c.to].graph == home && is_signal_leaf(patch, c.to))
        .map(|c| c.to)
        .collect()
}
