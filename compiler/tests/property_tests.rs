// Property-based tests for compiler invariants.
//
// Four categories:
// 1. Fan-in: arbitrary numbers of signal sources on one inlet expand to
//    binary additions and schedule cleanly
// 2. Operator formats: every connection format of an arithmetic object
//    either lowers with its external connections intact or is rejected
// 3. Buffer pool: random allocate/release sequences keep retain counts
//    balanced and never hand out a live buffer
// 4. Hashing: symbol and number hashes are pure functions of their input
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use patchc::buffer::{Buffer, BufferClass, BufferPool};
use patchc::catalog::{Binop, Unop};
use patchc::diag::codes;
use patchc::hash::{hash_float, hash_symbol, hash_value, murmur2, BANG_HASH};
use patchc::loader::load_str;
use patchc::pass::{PassId, StageCert};
use patchc::pipeline::{compile_str, prepare_until, CompileOptions};
use proptest::prelude::*;
use serde_json::{json, Value};

// ── Document generator ──────────────────────────────────────────────────────

/// `n` oscillators summed into one output channel, optionally through a
/// chain of `depth` gain stages.
fn fan_in_doc(n: usize, depth: usize) -> Value {
    let mut objects = serde_json::Map::new();
    let mut connections = Vec::new();
    let target = if depth == 0 { "d".to_string() } else { "g0".to_string() };
    for i in 0..n {
        let id = format!("p{i}");
        objects.insert(id.clone(), json!({"type": "phasor", "args": {"frequency": i + 1}}));
        connections.push(json!({"from": {"id": id, "outlet": 0}, "to": {"id": target, "inlet": 0}, "type": "~f>"}));
    }
    for g in 0..depth {
        let id = format!("g{g}");
        let next = if g + 1 == depth { "d".to_string() } else { format!("g{}", g + 1) };
        objects.insert(id.clone(), json!({"type": "*", "args": {"k": 0.5}}));
        connections.push(json!({"from": {"id": id, "outlet": 0}, "to": {"id": next, "inlet": 0}, "type": "-~>"}));
    }
    objects.insert("d".into(), json!({"type": "dac", "args": {"channels": [1]}}));
    json!({"objects": objects, "connections": connections})
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 48,
        .. ProptestConfig::default()
    })]

    #[test]
    fn cascades_bound_signal_fan_in(n in 0usize..24) {
        let doc = fan_in_doc(n, 0).to_string();
        let options = CompileOptions::default();
        let mut patch = load_str(&doc, None, &options).unwrap();
        let stats = prepare_until(&mut patch, PassId::CascadeExpansion, &options).unwrap();
        prop_assert_eq!(stats.cascades, n.saturating_sub(1));
        for id in patch.descendants(patch.root()) {
            for conns in &patch[id].inlets {
                prop_assert!(conns.iter().filter(|c| c.is_signal()).count() <= 1);
            }
        }
    }

    #[test]
    fn generated_chains_certify(n in 1usize..10, depth in 0usize..6) {
        let doc = fan_in_doc(n, depth).to_string();
        let out = compile_str(&doc, None, &CompileOptions::default()).unwrap();
        prop_assert!(out.cert.all_pass(), "{:?}", out.cert.failed());
        // a chain of in-place stages needs no more buffers than oscillators plus one
        prop_assert!(out.stats.schedule.float_buffers as usize <= n + depth + 1);
        prop_assert_eq!(out.ir.signal.num_output_buffers, 1);
    }
}

// ── Operator formats ────────────────────────────────────────────────────────

const FORMAT_CHARS: [char; 4] = ['f', 'i', 'c', '_'];

/// Source object and connection kind for one format character.
fn source_for(c: char) -> Option<(&'static str, &'static str)> {
    match c {
        'f' => Some(("__var_k~f", "~f>")),
        'i' => Some(("__var_k~i", "~i>")),
        'c' => Some(("__message", "-->")),
        _ => None,
    }
}

/// Lower `object` with inlets wired per `format` and one consumer on its
/// outlet. Returns an error message on a broken invariant.
fn check_format(object: Value, format: &str) -> Result<(), String> {
    let mut objects = serde_json::Map::new();
    let mut connections = Vec::new();
    let mut sources = Vec::new();
    for (inlet, c) in format.chars().enumerate() {
        if let Some((tag, kind)) = source_for(c) {
            let id = format!("s{inlet}");
            objects.insert(id.clone(), json!({"type": tag}));
            connections.push(json!({"from": {"id": id, "outlet": 0}, "to": {"id": "op", "inlet": inlet}, "type": kind}));
            sources.push(id);
        }
    }
    let (sink, kind) = if format.contains('f') {
        ("__abs~f", "~f>")
    } else if format.contains('i') {
        ("__abs~i", "~i>")
    } else {
        ("__print", "-->")
    };
    objects.insert("op".into(), object);
    objects.insert("sink".into(), json!({"type": sink}));
    connections.push(json!({"from": {"id": "op", "outlet": 0}, "to": {"id": "sink", "inlet": 0}, "type": kind}));
    let doc = json!({"objects": objects, "connections": connections}).to_string();

    let options = CompileOptions::default();
    let mut patch = load_str(&doc, None, &options).map_err(|e| e.report())?;
    // members in document order: sources, the operator, the consumer
    let members = patch.members(patch.root());
    let (source_ids, rest) = members.split_at(sources.len());
    let (op, sink) = (rest[0], rest[1]);

    match prepare_until(&mut patch, PassId::Reduce, &options) {
        Ok(_) => {
            if patch.contains(op) {
                return Err(format!("{format}: high-level node survived"));
            }
            for &s in source_ids {
                if patch[s].outlets[0].len() != 1 {
                    return Err(format!("{format}: source lost its connection"));
                }
            }
            if patch[sink].inlets[0].len() != 1 {
                return Err(format!("{format}: consumer has {} inputs", patch[sink].inlets[0].len()));
            }
            Ok(())
        }
        Err(e) if e.code() == Some(codes::E0106) => Ok(()),
        Err(e) => Err(format!("{format}: unexpected error {}", e.report())),
    }
}

fn binop_object(b: Binop) -> Value {
    json!({"type": b.symbol(), "args": {"k": 2.5}})
}

fn unop_object(u: Unop) -> Value {
    json!({"type": u.name()})
}

fn two_char_format() -> impl Strategy<Value = String> {
    (prop::sample::select(FORMAT_CHARS.to_vec()), prop::sample::select(FORMAT_CHARS.to_vec()))
        .prop_map(|(a, b)| format!("{a}{b}"))
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    #[test]
    fn binop_formats_lower_or_are_rejected(b in prop::sample::select(Binop::ALL), format in two_char_format()) {
        let checked = check_format(binop_object(b), &format);
        prop_assert!(checked.is_ok(), "{:?} {}", b, checked.unwrap_err());
    }

    #[test]
    fn unop_formats_lower_or_are_rejected(u in prop::sample::select(Unop::ALL), c in prop::sample::select(FORMAT_CHARS.to_vec())) {
        let checked = check_format(unop_object(u), &c.to_string());
        prop_assert!(checked.is_ok(), "{:?} {}", u, checked.unwrap_err());
    }
}

#[test]
fn every_operator_format_is_covered() {
    for &b in Binop::ALL {
        for a in FORMAT_CHARS {
            for c in FORMAT_CHARS {
                check_format(binop_object(b), &format!("{a}{c}")).unwrap_or_else(|e| panic!("{b:?} {e}"));
            }
        }
    }
    for &u in Unop::ALL {
        for c in FORMAT_CHARS {
            check_format(unop_object(u), &c.to_string()).unwrap_or_else(|e| panic!("{u:?} {e}"));
        }
    }
}

// ── Buffer pool ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum PoolOp {
    /// Allocate for an outlet with this many readers.
    Get(u32),
    /// One reader consumes the live buffer at this position (modulo).
    Release(usize),
}

fn pool_op() -> impl Strategy<Value = PoolOp> {
    prop_oneof![
        (0u32..4).prop_map(PoolOp::Get),
        any::<usize>().prop_map(PoolOp::Release),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    #[test]
    fn retain_and_release_balance(ops in prop::collection::vec(pool_op(), 1..64)) {
        let mut pool = BufferPool::new();
        // live buffers and their outstanding readers
        let mut live: Vec<(Buffer, u32)> = Vec::new();

        for op in ops {
            match op {
                PoolOp::Get(readers) => {
                    let b = pool.get_buffer(BufferClass::Float, readers, &[]);
                    prop_assert!(live.iter().all(|&(l, _)| l != b), "{} handed out while live", b);
                    prop_assert_eq!(pool.retain_count(b), Some(readers));
                    if readers > 0 {
                        live.push((b, readers));
                    }
                }
                PoolOp::Release(at) => {
                    if live.is_empty() {
                        continue;
                    }
                    let at = at % live.len();
                    let (b, left) = live[at];
                    prop_assert_eq!(pool.release(b).unwrap(), left - 1);
                    if left == 1 {
                        live.remove(at);
                    } else {
                        live[at].1 -= 1;
                    }
                }
            }
            let mut expected: Vec<Buffer> = live.iter().map(|&(b, _)| b).collect();
            let mut actual = pool.live_buffers();
            expected.sort_by_key(|b| b.index);
            actual.sort_by_key(|b| b.index);
            prop_assert_eq!(actual, expected);
        }

        for (b, left) in live {
            prop_assert_eq!(pool.retain(b, -i64::from(left)).unwrap(), 0);
        }
        prop_assert!(pool.live_buffers().is_empty());
    }

    #[test]
    fn released_buffers_are_reused_most_recent_first(n in 2u32..8) {
        let mut pool = BufferPool::new();
        let buffers: Vec<Buffer> = (0..n).map(|_| pool.get_buffer(BufferClass::Float, 1, &[])).collect();
        for &b in &buffers {
            pool.release(b).unwrap();
        }
        let last = *buffers.last().unwrap();
        prop_assert_eq!(pool.get_buffer(BufferClass::Float, 1, &[]), last);
        prop_assert_eq!(pool.num_buffers(BufferClass::Float), n);
        // an excluded buffer is skipped
        let next = pool.get_buffer(BufferClass::Float, 1, &[buffers[(n - 2) as usize]]);
        prop_assert_ne!(next, buffers[(n - 2) as usize]);
    }
}

// ── Hashing ─────────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn symbol_hash_is_murmur_of_the_bytes(s in "[a-zA-Z0-9_]{0,24}") {
        prop_assume!(s != "bang");
        prop_assert_eq!(hash_symbol(&s), murmur2(s.as_bytes()));
        prop_assert_eq!(hash_value(&json!(s.clone())), Some(hash_symbol(&s)));
    }

    #[test]
    fn number_hash_is_the_single_precision_bit_pattern(f in -1.0e6f32..1.0e6f32) {
        prop_assert_eq!(hash_float(f), f.to_bits());
        prop_assert_eq!(hash_value(&json!(f64::from(f))), Some(f.to_bits()));
    }
}

#[test]
fn bang_is_reserved() {
    assert_eq!(hash_symbol("bang"), BANG_HASH);
    assert_eq!(hash_value(&json!("bang")), Some(0xFFFF_FFFF));
}
