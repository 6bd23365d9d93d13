// pipeline.rs — Compile options and pass orchestration
//
// Loads a document, runs the preparation passes in dependency order and
// serializes the result. Each pass is timed; with `verbose` set a line per
// pass is printed to stderr as it completes.
//
// Preconditions: none.
// Postconditions: on success the patch is fully reduced and scheduled.
// Failure modes: the first failing pass aborts with a `CompileError` that
//                carries every notice collected so far.
// Side effects: reads the input document and its abstractions; verbose
//               timing goes to stderr.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::buffer::BufferClass;
use crate::connection::ConnKind;
use crate::diag::{CompileError, Notices};
use crate::doc::GraphDoc;
use crate::graph::Patch;
use crate::id::NodeId;
use crate::ir::{to_ir, IrDocument};
use crate::loader::{load_document, load_file, load_str};
use crate::pass::{descriptor, required_passes, PassId, StageCert};
use crate::reduce::reduce_graph;
use crate::rewrite::{expand_cascades, fuse_multiply_add, prune_dead_inlets};
use crate::routing::{group_control_receivers, remap_send_receive, RemapStats};
use crate::schedule::{assign_buffers, ScheduleStats};
use crate::type_resolve::resolve_connection_types;

// ── Options ─────────────────────────────────────────────────────────────────

/// Configuration shared by loading and preparation.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Overrides the patch name from the document.
    pub name: Option<String>,
    /// Extra abstraction search paths, consulted after the document's own.
    pub import_paths: Vec<PathBuf>,
    /// Print per-pass timing to stderr.
    pub verbose: bool,
}

// ── Preparation ─────────────────────────────────────────────────────────────

/// Counts reported by each pass of [`prepare`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrepareStats {
    pub resolved_connections: usize,
    pub pruned_inlets: usize,
    pub remapped: RemapStats,
    pub reduced: usize,
    pub cascades: usize,
    pub fused: usize,
    pub merged_receivers: usize,
    pub schedule: ScheduleStats,
}

/// Run every preparation pass.
pub fn prepare(patch: &mut Patch, options: &CompileOptions) -> Result<PrepareStats, CompileError> {
    prepare_until(patch, PassId::AssignBuffers, options)
}

/// Run the passes needed to reach `terminal`, in order.
pub fn prepare_until(
    patch: &mut Patch,
    terminal: PassId,
    options: &CompileOptions,
) -> Result<PrepareStats, CompileError> {
    let mut stats = PrepareStats::default();
    for pass in required_passes(terminal) {
        let start = Instant::now();
        run_pass(patch, pass, &mut stats).map_err(|e| e.with_snapshot(patch.notices()))?;
        finish_pass(pass, start.elapsed(), options.verbose);
    }
    Ok(stats)
}

fn run_pass(patch: &mut Patch, pass: PassId, stats: &mut PrepareStats) -> Result<(), CompileError> {
    let root = patch.root();
    match pass {
        PassId::ResolveTypes => stats.resolved_connections = resolve_connection_types(patch)?,
        PassId::PruneInlets => stats.pruned_inlets = prune_dead_inlets(patch, root),
        PassId::RemapSendReceive => stats.remapped = remap_send_receive(patch)?,
        PassId::Reduce => stats.reduced = reduce_graph(patch, root)?,
        PassId::CascadeExpansion => stats.cascades = expand_cascades(patch, root)?,
        PassId::FmaFusion => stats.fused = fuse_multiply_add(patch, root)?,
        PassId::GroupReceivers => stats.merged_receivers = group_control_receivers(patch)?,
        PassId::AssignBuffers => stats.schedule = assign_buffers(patch)?,
    }
    Ok(())
}

fn finish_pass(pass: PassId, elapsed: Duration, verbose: bool) {
    let desc = descriptor(pass);
    debug!(pass = desc.name, invariants = desc.invariants, "pass complete");
    if verbose {
        eprintln!(
            "patchc: {} complete, {:.1}ms",
            desc.name,
            elapsed.as_secs_f64() * 1000.0
        );
    }
}

// ── Certificate ─────────────────────────────────────────────────────────────

/// Postconditions of a fully prepared patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareCert {
    pub no_high_level_nodes: bool,
    pub no_mixed_connections: bool,
    pub single_signal_sources: bool,
    pub inlet_buffers_assigned: bool,
    pub buffers_released: bool,
}

impl PrepareCert {
    pub fn verify(patch: &Patch) -> Self {
        let root = patch.root();
        let nodes = patch.descendants(root);

        let no_high_level_nodes = nodes.iter().all(|&id| patch[id].lang_op().is_none());
        let no_mixed_connections = nodes
            .iter()
            .flat_map(|&id| patch[id].all_connections())
            .all(|c| c.kind != ConnKind::Mixed);
        let single_signal_sources = nodes.iter().all(|&id| {
            patch[id]
                .inlets
                .iter()
                .all(|conns| conns.iter().filter(|c| c.is_signal()).count() <= 1)
        });

        let mut graphs = vec![root];
        graphs.extend(nodes.iter().copied().filter(|&id| patch[id].is_graph()));
        let inlet_buffers_assigned = graphs.iter().all(|&g| {
            let order = patch.graph_data(g).map(|d| d.signal_order.as_slice()).unwrap_or_default();
            order.iter().all(|&id| reads_assigned_buffers(patch, id))
        });

        Self {
            no_high_level_nodes,
            no_mixed_connections,
            single_signal_sources,
            inlet_buffers_assigned,
            buffers_released: patch.pool().live_buffers().is_empty(),
        }
    }
}

fn reads_assigned_buffers(patch: &Patch, id: NodeId) -> bool {
    let node = &patch[id];
    node.inlets.iter().enumerate().all(|(i, conns)| {
        !conns.iter().any(|c| c.is_signal()) || !node.inlet_buffers[i].is_zero()
    })
}

impl StageCert for PrepareCert {
    fn obligations(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("no_high_level_nodes", self.no_high_level_nodes),
            ("no_mixed_connections", self.no_mixed_connections),
            ("single_signal_sources", self.single_signal_sources),
            ("inlet_buffers_assigned", self.inlet_buffers_assigned),
            ("buffers_released", self.buffers_released),
        ]
    }
}

// ── Provenance ──────────────────────────────────────────────────────────────

/// Build metadata for `--emit build-info`.
///
/// `source_hash`: SHA-256 of the raw document text.
/// `compiler_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub source_hash: [u8; 32],
    pub compiler_version: &'static str,
}

impl Provenance {
    pub fn source_hash_hex(&self) -> String {
        bytes_to_hex(&self.source_hash)
    }

    pub fn to_json(&self) -> String {
        format!(
            "{{\n  \"source_hash\": \"{}\",\n  \"compiler_version\": \"{}\"\n}}\n",
            self.source_hash_hex(),
            self.compiler_version,
        )
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

pub fn compute_provenance(source: &str) -> Provenance {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    let mut source_hash = [0u8; 32];
    source_hash.copy_from_slice(&hasher.finalize());

    Provenance {
        source_hash,
        compiler_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── Object statistics ───────────────────────────────────────────────────────

/// Per-type object counts of a loaded patch, sub-graphs included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ObjectCounter {
    pub counts: BTreeMap<String, usize>,
}

impl ObjectCounter {
    pub fn count(patch: &Patch) -> Self {
        let mut counts = BTreeMap::new();
        for id in patch.descendants(patch.root()) {
            *counts.entry(patch[id].type_tag().to_string()).or_insert(0) += 1;
        }
        Self { counts }
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn get(&self, type_tag: &str) -> usize {
        self.counts.get(type_tag).copied().unwrap_or(0)
    }
}

// ── Compilation ─────────────────────────────────────────────────────────────

/// Everything one compile produces.
#[derive(Debug, Clone)]
pub struct Compiled {
    pub ir: IrDocument,
    pub stats: PrepareStats,
    /// Counts taken before reduction.
    pub objects: ObjectCounter,
    pub cert: PrepareCert,
    /// Warnings collected while loading and preparing.
    pub notices: Notices,
}

impl Compiled {
    pub fn summary(&self) -> Summary {
        let buffers = Buffers {
            float: self.stats.schedule.float_buffers,
            integer: self.stats.schedule.int_buffers,
        };
        Summary {
            name: self.ir.name.display.clone(),
            objects: self.objects.counts.clone(),
            total_objects: self.objects.total(),
            ir_objects: self.ir.objects.len(),
            signal_nodes: self.ir.signal.process_order.len(),
            buffers,
            warnings: self.notices.warnings().count(),
        }
    }
}

/// The `--emit summary` document.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub name: String,
    pub objects: BTreeMap<String, usize>,
    pub total_objects: usize,
    pub ir_objects: usize,
    pub signal_nodes: usize,
    pub buffers: Buffers,
    pub warnings: usize,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Buffers {
    pub float: u32,
    pub integer: u32,
}

pub fn compile_file(path: &Path, options: &CompileOptions) -> Result<Compiled, CompileError> {
    finish(load_file(path, options)?, options)
}

pub fn compile_str(text: &str, path: Option<&Path>, options: &CompileOptions) -> Result<Compiled, CompileError> {
    finish(load_str(text, path, options)?, options)
}

pub fn compile_document(
    doc: &GraphDoc,
    path: Option<&Path>,
    options: &CompileOptions,
) -> Result<Compiled, CompileError> {
    finish(load_document(doc, path, options)?, options)
}

fn finish(mut patch: Patch, options: &CompileOptions) -> Result<Compiled, CompileError> {
    let objects = ObjectCounter::count(&patch);
    let stats = prepare(&mut patch, options)?;
    let cert = PrepareCert::verify(&patch);
    if !cert.all_pass() {
        debug!(failed = ?cert.failed(), "preparation obligations not met");
    }
    let ir = to_ir(&patch);
    debug!(
        objects = ir.objects.len(),
        float = patch.pool().num_buffers(BufferClass::Float),
        int = patch.pool().num_buffers(BufferClass::Int),
        "compiled \"{}\"",
        ir.name.display
    );
    let notices = Notices::new(patch.notices().to_vec());
    Ok(Compiled {
        ir,
        stats,
        objects,
        cert,
        notices,
    })
}
