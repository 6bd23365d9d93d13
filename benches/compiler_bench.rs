use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use patchc::*;
use serde_json::{json, Value};

// Benchmark scenarios. All documents use native object types only, so no
// import paths are needed.

fn conn(from: &str, outlet: usize, to: &str, inlet: usize, kind: &str) -> Value {
    json!({"from": {"id": from, "outlet": outlet}, "to": {"id": to, "inlet": inlet}, "type": kind})
}

fn oscillator() -> String {
    json!({
        "name": "osc",
        "objects": {
            "p": {"type": "phasor", "args": {"frequency": 440}},
            "g": {"type": "*", "args": {"k": 0.5}},
            "d": {"type": "dac", "args": {"channels": [1, 2]}}
        },
        "connections": [
            conn("p", 0, "g", 0, "-~>"),
            conn("g", 0, "d", 0, "-~>"),
            conn("g", 0, "d", 1, "-~>")
        ]
    })
    .to_string()
}

fn routed() -> String {
    json!({
        "name": "routed",
        "objects": {
            "w1": {"type": "phasor", "args": {"frequency": 1}},
            "w2": {"type": "phasor", "args": {"frequency": 2}},
            "s1": {"type": "send", "args": {"name": "bus"}},
            "s2": {"type": "send", "args": {"name": "bus"}},
            "r": {"type": "receive", "args": {"name": "bus"}},
            "m": {"type": "*"},
            "a": {"type": "+"},
            "d": {"type": "dac", "args": {"channels": [1]}},
            "c1": {"type": "receive", "args": {"name": "freq", "priority": 1}},
            "c2": {"type": "receive", "args": {"name": "freq", "priority": 2}},
            "pr1": {"type": "print"},
            "pr2": {"type": "print"}
        },
        "connections": [
            conn("w1", 0, "s1", 0, "~f>"),
            conn("w2", 0, "s2", 0, "~f>"),
            conn("r", 0, "m", 0, "~f>"),
            conn("w1", 0, "m", 1, "~f>"),
            conn("m", 0, "a", 0, "~f>"),
            conn("w2", 0, "a", 1, "~f>"),
            conn("a", 0, "d", 0, "~f>"),
            conn("c1", 0, "pr1", 0, "-->"),
            conn("c2", 0, "pr2", 0, "-->")
        ]
    })
    .to_string()
}

fn scenarios() -> [(&'static str, String); 2] {
    [("oscillator", oscillator()), ("routed", routed())]
}

/// `n` oscillators, each through a gain stage, summed into one output.
/// Exercises cascade expansion and buffer assignment as the patch grows.
fn generate_fan_in(n: usize) -> String {
    let mut objects = serde_json::Map::new();
    let mut connections = Vec::new();
    for i in 0..n {
        let p = format!("p{i}");
        let g = format!("g{i}");
        objects.insert(p.clone(), json!({"type": "phasor", "args": {"frequency": i + 1}}));
        objects.insert(g.clone(), json!({"type": "*", "args": {"k": 0.5}}));
        connections.push(conn(&p, 0, &g, 0, "-~>"));
        connections.push(conn(&g, 0, "d", 0, "-~>"));
    }
    objects.insert("d".into(), json!({"type": "dac", "args": {"channels": [1]}}));
    json!({"objects": objects, "connections": connections}).to_string()
}

// Document loading, including argument resolution.
fn bench_load_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("load_latency");
    let options = pipeline::CompileOptions::default();

    for (name, source) in scenarios() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &source, |b, source| {
            b.iter(|| {
                let patch = loader::load_str(black_box(source), None, &options).expect("scenario must load");
                black_box(patch.len());
            });
        });
    }

    group.finish();
}

// Load, every graph pass and IR production.
fn bench_full_compile_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_compile_latency");
    let options = pipeline::CompileOptions::default();

    for (name, source) in scenarios() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &source, |b, source| {
            b.iter(|| {
                let out = pipeline::compile_str(black_box(source), None, &options).expect("scenario must compile");
                black_box(out.ir);
            });
        });
    }

    group.finish();
}

// Graph passes alone, on a freshly loaded patch.
fn bench_prepare_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("prepare_latency");
    let options = pipeline::CompileOptions::default();

    for (name, source) in scenarios() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &source, |b, source| {
            b.iter_batched(
                || loader::load_str(source, None, &options).expect("scenario must load"),
                |mut patch| {
                    let stats = pipeline::prepare(&mut patch, &options).expect("scenario must prepare");
                    black_box(stats);
                    black_box(ir::to_ir(&patch));
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

// Full compile scaling vs number of summed oscillators.
fn bench_fan_in_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_in_scaling");
    let options = pipeline::CompileOptions::default();

    for n in [1_usize, 8, 32, 128] {
        let source = generate_fan_in(n);
        group.bench_with_input(BenchmarkId::from_parameter(format!("{n}voices")), &source, |b, source| {
            b.iter(|| {
                let out = pipeline::compile_str(black_box(source.as_str()), None, &options).expect("fan-in must compile");
                black_box(out.stats.cascades);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_load_latency,
    bench_full_compile_latency,
    bench_prepare_latency,
    bench_fan_in_scaling,
);
criterion_main!(benches);
