// rewrite.rs — Whole-graph rewrite passes
//
// Dead-inlet pruning (before reduction), signal fan-in expansion and
// multiply-add fusion (after reduction). Each pass takes a graph and recurses
// into its sub-graphs.
//
// Preconditions: pruning: types resolved. Cascade and fusion: the graph is
//                fully reduced.
// Postconditions: cascade: no inlet carries more than one signal connection.
// Failure modes: float and integer signals on one inlet → E0105.
// Side effects: none beyond the patch.

use tracing::{debug, trace};

use crate::catalog::IrOp;
use crate::connection::{ConnKind, Connection};
use crate::diag::{codes, CompileError};
use crate::graph::Patch;
use crate::id::NodeId;
use crate::value::Args;

// ── Dead-inlet pruning ──────────────────────────────────────────────────────

/// Sever the outgoing connections of every inlet proxy whose graph inlet has
/// nothing connected. Returns the number of connections removed.
pub fn prune_dead_inlets(patch: &mut Patch, graph: NodeId) -> usize {
    let mut severed = 0;
    let proxies = patch.inlet_proxies(graph).to_vec();
    for (i, proxy) in proxies.into_iter().enumerate() {
        if !patch[graph].inlets.get(i).is_some_and(Vec::is_empty) {
            continue;
        }
        let dead: Vec<Connection> = patch[proxy].outlets.iter().flatten().copied().collect();
        for c in &dead {
            trace!(%c, "pruned");
            patch.disconnect(c);
        }
        severed += dead.len();
    }
    for sub in patch.subgraphs(graph) {
        severed += prune_dead_inlets(patch, sub);
    }
    severed
}

// ── Signal fan-in expansion ─────────────────────────────────────────────────

/// Rewrite every inlet fed by several signal connections into a left-deep
/// chain of two-input additions. Returns the number of additions inserted.
pub fn expand_cascades(patch: &mut Patch, graph: NodeId) -> Result<usize, CompileError> {
    let mut inserted = 0;
    for id in patch.members(graph) {
        if !patch.contains(id) {
            continue;
        }
        for inlet in 0..patch[id].num_inlets() {
            inserted += expand_inlet(patch, graph, id, inlet)?;
        }
        if patch[id].is_graph() {
            inserted += expand_cascades(patch, id)?;
        }
    }
    if graph == patch.root() {
        debug!(inserted, "cascade expansion complete");
    }
    Ok(inserted)
}

fn expand_inlet(patch: &mut Patch, graph: NodeId, id: NodeId, inlet: usize) -> Result<usize, CompileError> {
    let sources: Vec<Connection> = patch[id].inlets[inlet].iter().filter(|c| c.is_signal()).copied().collect();
    if sources.len() < 2 {
        return Ok(0);
    }
    let kind = sources[0].kind;
    if sources.iter().any(|c| c.kind != kind) {
        return Err(patch.error(
            id,
            codes::E0105,
            format!("float and integer signals meet at inlet {inlet}"),
        ));
    }
    let add = if kind == ConnKind::IntSignal { IrOp::AddI } else { IrOp::AddF };

    let mut adds = Vec::with_capacity(sources.len() - 1);
    for _ in 1..sources.len() {
        let n = patch.new_ir(add, Args::new())?;
        patch.add_to_graph(graph, n, false)?;
        adds.push(n);
    }

    patch.replace(Some(sources[0]), vec![sources[0].with_to(adds[0], 0)])?;
    for (k, c) in sources.iter().enumerate().skip(1) {
        let n = adds[k - 1];
        patch.replace(Some(*c), vec![c.with_to(n, 1)])?;
        if k > 1 {
            patch.connect(Connection::new(adds[k - 2], 0, n, 0, kind))?;
        }
    }
    let last = adds[adds.len() - 1];
    patch.connect(Connection::new(last, 0, id, inlet, kind))?;
    trace!(node = %id, inlet, fan_in = sources.len(), "expanded signal fan-in");
    Ok(adds.len())
}

// ── Multiply-add fusion ─────────────────────────────────────────────────────

/// Fuse `a * b` feeding an addition (either inlet) or the left inlet of a
/// subtraction into one fused multiply-add. Returns the number of fusions.
pub fn fuse_multiply_add(patch: &mut Patch, graph: NodeId) -> Result<usize, CompileError> {
    let mut fused = 0;
    for id in patch.members(graph) {
        if !patch.contains(id) {
            continue;
        }
        if patch[id].is_graph() {
            fused += fuse_multiply_add(patch, id)?;
            continue;
        }
        if let Some(plan) = fusion_plan(patch, id) {
            apply_fusion(patch, graph, plan)?;
            fused += 1;
        }
    }
    if graph == patch.root() {
        debug!(fused, "multiply-add fusion complete");
    }
    Ok(fused)
}

struct Fusion {
    op: IrOp,
    mul: NodeId,
    target: NodeId,
    inputs: [Connection; 3],
    outputs: Vec<Connection>,
}

fn fusion_plan(patch: &Patch, id: NodeId) -> Option<Fusion> {
    let mul = &patch[id];
    if !mul.is_ir(IrOp::MulF) {
        return None;
    }
    let ([a], [b], [out]) = (mul.inlets[0].as_slice(), mul.inlets[1].as_slice(), mul.outlets[0].as_slice()) else {
        return None;
    };
    let target = &patch[out.to];
    let op = match (target.ir_op(), out.inlet) {
        (Some(IrOp::AddF), 0 | 1) => IrOp::FmaF,
        (Some(IrOp::SubF), 0) => IrOp::FmsF,
        _ => return None,
    };
    let ([_], [_]) = (target.inlets[0].as_slice(), target.inlets[1].as_slice()) else {
        return None;
    };
    if target.outlets[0].is_empty() {
        return None;
    }
    let other = target.inlets[out.inlet ^ 1][0];
    Some(Fusion {
        op,
        mul: id,
        target: out.to,
        inputs: [*a, *b, other],
        outputs: target.outlets[0].clone(),
    })
}

fn apply_fusion(patch: &mut Patch, graph: NodeId, plan: Fusion) -> Result<(), CompileError> {
    let f = patch.new_ir(plan.op, Args::new())?;
    patch.add_to_graph(graph, f, false)?;
    for (inlet, c) in plan.inputs.iter().enumerate() {
        patch.replace(Some(*c), vec![c.with_to(f, inlet)])?;
    }
    for c in &plan.outputs {
        patch.replace(Some(*c), vec![c.with_from(f, 0)])?;
    }
    trace!(mul = %plan.mul, target = %plan.target, "fused into {}", plan.op.tag());
    patch.remove(plan.mul);
    patch.remove(plan.target);
    Ok(())
}
