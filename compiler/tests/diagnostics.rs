// Snapshot tests: lock the rendered form of diagnostics and connections.
//
// Reports are what users read on stderr, so their layout is pinned with
// inline `insta` snapshots. Run `cargo insta review` after intentional
// wording changes.

use patchc::diag::{codes, CompileError, Diagnostic};
use patchc::loader::load_str;
use patchc::pipeline::{compile_str, CompileOptions};
use serde_json::json;

fn load_error(doc: serde_json::Value) -> CompileError {
    load_str(&doc.to_string(), None, &CompileOptions::default()).unwrap_err()
}

#[test]
fn error_with_origin_and_hint() {
    let d = Diagnostic::error(codes::E0104, "table \"wave\" is not declared")
        .with_origin("__table_get gain in synth")
        .with_hint("declare a table named \"wave\" in this graph or a parent");
    insta::assert_snapshot!(d.to_string(), @r###"
    error[E0104]: table "wave" is not declared
      --> __table_get gain in synth
      hint: declare a table named "wave" in this graph or a parent
    "###);
}

#[test]
fn warning_without_origin() {
    let d = Diagnostic::warning(codes::W0104, "argument \"steal\" ignored");
    insta::assert_snapshot!(d.to_string(), @r###"warning[W0104]: argument "steal" ignored"###);
}

#[test]
fn unknown_type_report() {
    let err = load_error(json!({"objects": {"x": {"type": "osc~"}}, "connections": []}));
    insta::assert_snapshot!(err.report(), @r###"
    error[E0109]: object type "osc~" cannot be found
      --> osc~ x in heavy
    "###);
}

#[test]
fn dangling_connection_report() {
    let err = load_error(json!({
        "name": "wires",
        "objects": {"a": {"type": "print"}},
        "connections": [{"from": {"id": "a", "outlet": 0}, "to": {"id": "b", "inlet": 0}, "type": "-->"}]
    }));
    assert_eq!(err.code(), Some(codes::E0110));
    insta::assert_snapshot!(err.report(), @r###"
    error[E0110]: connection from "a" to "b" names an unknown object
      --> wires
    "###);
}

#[test]
fn unconnected_send_warning_text() {
    let doc = json!({"objects": {"s": {"type": "send", "args": {"name": "nowhere"}}}, "connections": []});
    let out = compile_str(&doc.to_string(), None, &CompileOptions::default()).unwrap();
    let messages: Vec<String> = out.notices.warnings().map(|w| w.message.clone()).collect();
    insta::assert_snapshot!(messages.join("\n"), @r###"send "nowhere" has no connections and is removed"###);
}

#[test]
fn loaded_connection_display() {
    let doc = json!({
        "objects": {"a": {"type": "abs"}, "b": {"type": "abs"}},
        "connections": [{"from": {"id": "a", "outlet": 0}, "to": {"id": "b", "inlet": 0}, "type": "~f>"}]
    });
    let patch = load_str(&doc.to_string(), None, &CompileOptions::default()).unwrap();
    let a = patch.descendants(patch.root())[0];
    let wires: Vec<String> = patch[a].outlets[0].iter().map(|c| c.to_string()).collect();
    insta::assert_snapshot!(wires.join("\n"), @"[n1:0] ~f> [n2:0]");
}
