// ir.rs — Low-level IR document
//
// Serializable form of a prepared patch, consumed by code generation. Nested
// graphs are flattened: objects, initializers, message routes and the signal
// process order of every sub-graph appear in the root document.
//
// Preconditions: the patch has been prepared (reduced and scheduled).
// Postconditions: object maps are keyed by IR id and iterate in id order.
// Failure modes: none.
// Side effects: none.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde_json::Value;

use crate::buffer::{Buffer, BufferClass};
use crate::catalog::IrOp;
use crate::graph::Patch;
use crate::hash::{hash_hex, hash_symbol};
use crate::id::NodeId;
use crate::node::NodeKind;
use crate::scope::ScopeKind;
use crate::value::Args;

// ── Document ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct IrDocument {
    pub name: IrName,
    pub objects: BTreeMap<String, IrObject>,
    pub init: IrInit,
    pub tables: BTreeMap<String, IrTable>,
    pub control: IrControl,
    pub signal: IrSignal,
}

#[derive(Debug, Clone, Serialize)]
pub struct IrName {
    pub escaped: String,
    pub display: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IrObject {
    #[serde(rename = "type")]
    pub kind: String,
    pub args: Args,
}

#[derive(Debug, Clone, Serialize)]
pub struct IrInit {
    pub order: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IrTable {
    pub id: String,
    pub display: String,
    pub hash: String,
    #[serde(rename = "extern")]
    pub is_extern: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IrControl {
    pub receivers: BTreeMap<String, IrReceiver>,
    pub send_message: Vec<SendMessage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IrReceiver {
    pub display: String,
    pub hash: String,
    #[serde(rename = "extern")]
    pub ext: Option<String>,
    pub attributes: Value,
    pub ids: Vec<String>,
}

/// Where a control node's outlets deliver messages.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub id: String,
    /// Per outlet, the list of receiving inlets.
    pub on_message: Vec<Vec<OnMessage>>,
    #[serde(flatten)]
    pub send: Option<SendTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnMessage {
    pub id: String,
    pub inlet_index: usize,
}

/// Extra fields of a named `__send`.
#[derive(Debug, Clone, Serialize)]
pub struct SendTarget {
    #[serde(rename = "extern")]
    pub ext: Option<String>,
    pub hash: String,
    pub display: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IrSignal {
    pub num_input_buffers: i64,
    pub num_output_buffers: i64,
    pub num_temporary_buffers: TemporaryBuffers,
    pub process_order: Vec<ProcessEntry>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TemporaryBuffers {
    pub float: u32,
    pub integer: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessEntry {
    pub id: String,
    pub input_buffers: Vec<Buffer>,
    pub output_buffers: Vec<Buffer>,
}

// ── Generation ──────────────────────────────────────────────────────────────

/// Build the IR document for a prepared patch.
pub fn to_ir(patch: &Patch) -> IrDocument {
    let root = patch.root();
    let xname = patch.graph_data(root).map(|g| g.xname.clone()).unwrap_or_default();

    let mut objects = BTreeMap::new();
    collect_objects(patch, root, &mut objects);

    let process_order: Vec<ProcessEntry> = flat_signal_order(patch, root)
        .into_iter()
        .map(|id| process_entry(patch, id))
        .collect();

    let mut send_message = Vec::new();
    collect_send_messages(patch, root, &mut send_message);

    IrDocument {
        name: IrName {
            escaped: escape(&xname),
            display: xname,
        },
        objects,
        init: IrInit {
            order: init_order(patch, &process_order),
        },
        tables: tables(patch),
        control: IrControl {
            receivers: receivers(patch),
            send_message,
        },
        signal: IrSignal {
            num_input_buffers: patch.input_channels(root).last().copied().unwrap_or(0),
            num_output_buffers: patch.output_channels(root).last().copied().unwrap_or(0),
            num_temporary_buffers: TemporaryBuffers {
                float: patch.pool().num_buffers(BufferClass::Float),
                integer: patch.pool().num_buffers(BufferClass::Int),
            },
            process_order,
        },
    }
}

fn id_of(patch: &Patch, id: NodeId) -> String {
    patch[id].ir_id.to_string()
}

/// Replace every non-word character with `_`.
pub fn escape(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Names used as code identifiers may not start with a digit.
fn code_key(name: &str) -> String {
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{name}")
    } else {
        name.to_string()
    }
}

fn is_proxy(patch: &Patch, id: NodeId) -> bool {
    matches!(patch[id].ir_op(), Some(IrOp::Inlet | IrOp::Outlet))
}

fn collect_objects(patch: &Patch, graph: NodeId, out: &mut BTreeMap<String, IrObject>) {
    for id in patch.members(graph) {
        let node = &patch[id];
        match &node.kind {
            NodeKind::Graph(_) => collect_objects(patch, id, out),
            _ if is_proxy(patch, id) => {}
            _ => {
                out.insert(
                    id_of(patch, id),
                    IrObject {
                        kind: node.type_tag().to_string(),
                        args: node.args.clone(),
                    },
                );
            }
        }
    }
}

/// Scheduled signal nodes with sub-graphs expanded in place.
fn flat_signal_order(patch: &Patch, graph: NodeId) -> Vec<NodeId> {
    let order = patch.graph_data(graph).map(|g| g.signal_order.clone()).unwrap_or_default();
    let mut out = Vec::with_capacity(order.len());
    for id in order {
        if patch[id].is_graph() {
            out.extend(flat_signal_order(patch, id));
        } else {
            out.push(id);
        }
    }
    out
}

fn process_entry(patch: &Patch, id: NodeId) -> ProcessEntry {
    let node = &patch[id];
    ProcessEntry {
        id: id_of(patch, id),
        input_buffers: (0..node.num_inlets())
            .filter(|&i| node.requires_signal_inlet(i))
            .map(|i| node.inlet_buffers[i])
            .collect(),
        output_buffers: (0..node.num_outlets())
            .filter(|&i| node.produces_signal_outlet(i))
            .map(|i| node.outlet_buffers[i])
            .collect(),
    }
}

/// Initializers of scheduled signal nodes first, in process order, then the
/// rest in graph order.
fn init_order(patch: &Patch, process_order: &[ProcessEntry]) -> Vec<String> {
    let all: Vec<String> = patch
        .descendants(patch.root())
        .into_iter()
        .filter(|&id| patch[id].needs_init())
        .map(|id| id_of(patch, id))
        .collect();
    let wanted: HashSet<&str> = all.iter().map(String::as_str).collect();
    let mut order: Vec<String> = process_order
        .iter()
        .filter(|e| wanted.contains(e.id.as_str()))
        .map(|e| e.id.clone())
        .collect();
    let first: HashSet<String> = order.iter().cloned().collect();
    order.extend(all.into_iter().filter(|id| !first.contains(id)));
    order
}

fn tables(patch: &Patch) -> BTreeMap<String, IrTable> {
    let root = patch.root();
    let mut out = BTreeMap::new();
    let Some(scope) = patch.scope(root) else { return out };
    for (name, entries) in scope.by_kind(ScopeKind::Table) {
        let Some(entry) = entries.first() else { continue };
        let node = &patch[entry.node];
        out.entry(code_key(&name)).or_insert_with(|| IrTable {
            id: id_of(patch, entry.node),
            display: name.clone(),
            hash: hash_hex(hash_symbol(&name)),
            is_extern: node.args.get("extern").and_then(Value::as_bool).unwrap_or(false),
        });
    }
    out
}

fn receivers(patch: &Patch) -> BTreeMap<String, IrReceiver> {
    let root = patch.root();
    let mut out = BTreeMap::new();
    let Some(scope) = patch.scope(root) else { return out };
    for (name, entries) in scope.by_kind(ScopeKind::Receive) {
        let ids: Vec<NodeId> = entries
            .iter()
            .map(|e| e.node)
            .filter(|&n| patch[n].is_ir(IrOp::Receive))
            .collect();
        let Some(&first) = ids.first() else { continue };
        let node = &patch[first];
        out.insert(
            code_key(&name),
            IrReceiver {
                display: name.clone(),
                hash: hash_hex(hash_symbol(&name)),
                ext: node.arg_str("extern").map(str::to_string),
                attributes: node.args.get("attributes").cloned().unwrap_or(Value::Object(Args::new())),
                ids: ids.iter().map(|&n| id_of(patch, n)).collect(),
            },
        );
    }
    out
}

// ── Message routing ─────────────────────────────────────────────────────────

fn collect_send_messages(patch: &Patch, graph: NodeId, out: &mut Vec<SendMessage>) {
    for id in patch.members(graph) {
        if patch[id].is_graph() {
            collect_send_messages(patch, id, out);
        } else if patch[id].sends_control() {
            out.push(send_message(patch, id));
        }
    }
}

fn send_message(patch: &Patch, id: NodeId) -> SendMessage {
    let node = &patch[id];
    if node.is_ir(IrOp::Send) {
        let name = node.name().unwrap_or_default().to_string();
        let graph = node.graph.unwrap_or(patch.root());
        let mut targets = Vec::new();
        for r in patch.resolve_all(graph, &name, ScopeKind::Receive) {
            if patch[r].is_ir(IrOp::Receive) {
                targets.extend(on_message(patch, r, 0, &mut HashSet::new()));
            }
        }
        return SendMessage {
            id: id_of(patch, id),
            on_message: vec![targets],
            send: Some(SendTarget {
                ext: node.arg_str("extern").map(str::to_string),
                hash: node.arg_str("hash").map_or_else(|| hash_hex(hash_symbol(&name)), str::to_string),
                display: name.clone(),
                name: code_key(&name),
            }),
        };
    }

    let routes = node
        .outlets
        .iter()
        .map(|conns| {
            conns
                .iter()
                .filter(|c| !c.is_signal())
                .flat_map(|c| on_message(patch, c.to, c.inlet, &mut HashSet::new()))
                .collect()
        })
        .collect();
    SendMessage {
        id: id_of(patch, id),
        on_message: routes,
        send: None,
    }
}

/// The canonical inlets a message arriving at `to:inlet` is delivered to,
/// looking through graph proxies.
fn on_message(patch: &Patch, to: NodeId, inlet: usize, seen: &mut HashSet<(NodeId, usize)>) -> Vec<OnMessage> {
    if !seen.insert((to, inlet)) {
        return Vec::new();
    }
    let node = &patch[to];
    if node.is_graph() {
        let Some(&proxy) = patch.inlet_proxies(to).get(inlet) else {
            return Vec::new();
        };
        return patch[proxy].outlets[0]
            .iter()
            .filter(|c| !c.is_signal())
            .flat_map(|c| on_message(patch, c.to, c.inlet, seen))
            .collect();
    }
    if node.is_ir(IrOp::Outlet) {
        let Some(graph) = node.graph else { return Vec::new() };
        let Some(slot) = patch.outlet_proxies(graph).iter().position(|&p| p == to) else {
            return Vec::new();
        };
        return patch[graph].outlets[slot]
            .iter()
            .flat_map(|c| on_message(patch, c.to, c.inlet, seen))
            .collect();
    }
    vec![OnMessage {
        id: id_of(patch, to),
        inlet_index: inlet,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnKind, Connection};
    use serde_json::json;

    fn args(v: Value) -> Args {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    fn ir(p: &mut Patch, graph: NodeId, op: IrOp, a: Value) -> NodeId {
        let id = p.new_ir(op, args(a)).unwrap();
        p.add_to_graph(graph, id, true).unwrap();
        id
    }

    fn ctl(p: &mut Patch, from: NodeId, outlet: usize, to: NodeId, inlet: usize) {
        p.connect(Connection::new(from, outlet, to, inlet, ConnKind::Control)).unwrap();
    }

    #[test]
    fn names_are_escaped() {
        assert_eq!(escape("my patch-1"), "my_patch_1");
        assert_eq!(code_key("808"), "_808");
        assert_eq!(code_key("kick"), "kick");
    }

    #[test]
    fn objects_omit_proxies_and_flatten_graphs() {
        let mut p = Patch::new("t");
        let root = p.root();
        let g = p.new_graph("sub", None, Args::new());
        p.add_to_graph(root, g, false).unwrap();
        let inlet = ir(&mut p, g, IrOp::Inlet, json!({"index": 0}));
        let print = ir(&mut p, g, IrOp::Print, json!({}));
        ctl(&mut p, inlet, 0, print, 0);
        let msg = ir(&mut p, root, IrOp::Message, json!({}));
        ctl(&mut p, msg, 0, g, 0);

        let doc = to_ir(&p);
        let kinds: Vec<&str> = doc.objects.values().map(|o| o.kind.as_str()).collect();
        assert_eq!(doc.objects.len(), 2);
        assert!(kinds.contains(&"__print") && kinds.contains(&"__message"));

        // the message reaches the print through the graph inlet
        let entry = doc.control.send_message.iter().find(|s| s.id == p[msg].ir_id.to_string()).unwrap();
        assert_eq!(
            entry.on_message,
            vec![vec![OnMessage {
                id: p[print].ir_id.to_string(),
                inlet_index: 0
            }]]
        );
    }

    #[test]
    fn sends_target_their_receivers() {
        let mut p = Patch::new("t");
        let root = p.root();
        let s = ir(&mut p, root, IrOp::Send, json!({"name": "go", "hash": "0x1"}));
        let r = ir(&mut p, root, IrOp::Receive, json!({"name": "go"}));
        let print = ir(&mut p, root, IrOp::Print, json!({}));
        ctl(&mut p, r, 0, print, 0);

        let doc = serde_json::to_value(to_ir(&p)).unwrap();
        let sends = doc["control"]["sendMessage"].as_array().unwrap();
        let send = sends.iter().find(|e| e["id"] == p[s].ir_id.to_string()).unwrap();
        assert_eq!(send["onMessage"], json!([[{"id": p[r].ir_id.to_string(), "inletIndex": 0}]]));
        assert_eq!(send["display"], "go");
        assert_eq!(send["hash"], "0x1");
        assert!(send["extern"].is_null());

        let receiver = &doc["control"]["receivers"]["go"];
        assert_eq!(receiver["ids"], json!([p[r].ir_id.to_string()]));
        assert_eq!(receiver["hash"], hash_hex(hash_symbol("go")));
    }

    #[test]
    fn init_order_puts_signal_nodes_first() {
        let mut p = Patch::new("t");
        let root = p.root();
        let delay = ir(&mut p, root, IrOp::Delay, json!({}));
        let k = ir(&mut p, root, IrOp::VarKF, json!({"k": 2.0}));
        let abs = ir(&mut p, root, IrOp::AbsF, json!({}));
        p.connect(Connection::new(k, 0, abs, 0, ConnKind::FloatSignal)).unwrap();
        crate::schedule::assign_buffers(&mut p).unwrap();

        let doc = to_ir(&p);
        assert_eq!(doc.init.order, vec![p[k].ir_id.to_string(), p[delay].ir_id.to_string()]);
        let order: Vec<&str> = doc.signal.process_order.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(order, [p[k].ir_id.to_string(), p[abs].ir_id.to_string()]);
        assert_eq!(doc.signal.num_temporary_buffers.float, 1);
        assert_eq!(doc.signal.process_order[1].input_buffers, doc.signal.process_order[0].output_buffers);
    }

    #[test]
    fn tables_are_listed_with_hashes() {
        let mut p = Patch::new("t");
        let root = p.root();
        ir(&mut p, root, IrOp::Table, json!({"name": "1wave", "size": 4, "extern": true}));
        let doc = to_ir(&p);
        let t = &doc.tables["_1wave"];
        assert_eq!(t.display, "1wave");
        assert!(t.is_extern);
        assert_eq!(t.hash, hash_hex(hash_symbol("1wave")));
    }
}
