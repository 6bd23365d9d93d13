// reduce/objects.rs — Lowering of the non-arithmetic high-level objects

use serde_json::{json, Value};

use super::{obj, Lowering, Outcome};
use crate::buffer::Buffer;
use crate::catalog::{IrOp, LangOp, ADC_INLET_BASE};
use crate::connection::{ConnKind, Connection};
use crate::diag::{codes, CompileError};
use crate::hash::{hash_hex, hash_symbol};
use crate::id::NodeId;
use crate::scope::ScopeKind;
use crate::value::Args;

pub(super) fn lower(mut cx: Lowering<'_>) -> Result<Outcome, CompileError> {
    match cx.op {
        LangOp::Var => var(&mut cx)?,
        LangOp::Vario => vario(&mut cx)?,
        LangOp::Sequence => sequence(&mut cx)?,
        LangOp::Adc => adc(&mut cx)?,
        LangOp::Dac => dac(&mut cx)?,
        LangOp::Biquad => biquad(&mut cx)?,
        LangOp::Delay => one_for_one(&mut cx, IrOp::Delay, &["delay"])?,
        LangOp::Message => one_for_one(&mut cx, IrOp::Message, &["local", "remote"])?,
        LangOp::System => one_for_one(&mut cx, IrOp::System, &[])?,
        LangOp::Print => one_for_one(&mut cx, IrOp::Print, &["label"])?,
        LangOp::Slice => one_for_one(&mut cx, IrOp::Slice, &["index", "length"])?,
        LangOp::If => conditional(&mut cx)?,
        LangOp::Line => line(&mut cx)?,
        LangOp::Random => random(&mut cx)?,
        LangOp::Phasor => phasor(&mut cx)?,
        LangOp::Table => {
            let args = pick(&cx.args, &["name", "size", "values", "extern"]);
            let n = cx.successor(IrOp::Table, args)?;
            cx.move_all(n);
        }
        LangOp::Receive => receive(&mut cx)?,
        LangOp::Send => send(&mut cx)?,
        LangOp::Binop(_) | LangOp::Unop(_) => return Err(cx.bad_format(&cx.inlet_format())),
    }
    Ok(cx.finish())
}

/// The named arguments of `args`, in the order given.
fn pick(args: &Args, keys: &[&str]) -> Args {
    keys.iter()
        .filter_map(|&k| args.get(k).map(|v| (k.to_string(), v.clone())))
        .collect()
}

fn one_for_one(cx: &mut Lowering<'_>, op: IrOp, keys: &[&str]) -> Result<(), CompileError> {
    let args = pick(&cx.args, keys);
    let n = cx.successor(op, args)?;
    cx.move_all(n);
    Ok(())
}

// ── Variables ───────────────────────────────────────────────────────────────

/// Constant, store and read operations for the outlet's signal domain.
fn var_ops(format: &str) -> (IrOp, IrOp, IrOp) {
    if format.ends_with('i') {
        (IrOp::VarKI, IrOp::VarI, IrOp::VarReadI)
    } else {
        (IrOp::VarKF, IrOp::VarF, IrOp::VarReadF)
    }
}

fn var(cx: &mut Lowering<'_>) -> Result<(), CompileError> {
    let format = format!("{}{}", cx.inlet_format(), cx.outlet_format());
    let k = json!({ "k": cx.arg_f64("k") });
    let named = cx.arg_str("name").is_some();

    match format.as_str() {
        "_f" | "_i" if !named => {
            let (constant, _, _) = var_ops(&format);
            let n = cx.successor(constant, obj(k))?;
            cx.move_outlet(0, n, 0);
        }
        "_f" | "_i" | "cf" | "ci" => {
            let (_, store, read) = var_ops(&format);
            let v = cx.successor(store, obj(k))?;
            cx.move_inlet(0, v, 0);
            // the successor takes over this node's IR id
            let var_id = cx.patch[cx.id].ir_id.to_string();
            let r = cx.ir(read, obj(json!({ "var_id": var_id })))?;
            cx.move_outlet(0, r, 0);
        }
        "__" | "_c" | "c_" | "cc" => {
            let n = cx.successor(IrOp::Var, obj(k))?;
            cx.move_all(n);
        }
        _ => return Err(cx.bad_format(&format)),
    }
    Ok(())
}

fn vario(cx: &mut Lowering<'_>) -> Result<(), CompileError> {
    let name = cx.arg_str("name").unwrap_or_default().to_string();
    let Some(target) = cx.patch.resolve(cx.graph(), &name, ScopeKind::Var) else {
        return Err(cx.error(codes::E0104, format!("cannot find var named \"{name}\"")));
    };
    let var_id = obj(json!({ "var_id": cx.patch[target].ir_id.to_string() }));

    let format = format!("{}{}", cx.inlet_format(), cx.outlet_format());
    match format.as_str() {
        "f_" | "i_" => {
            let op = if format == "f_" { IrOp::VarWriteF } else { IrOp::VarWriteI };
            let n = cx.ir(op, var_id)?;
            cx.move_inlet(0, n, 0);
        }
        "_f" | "_i" => {
            let op = if format == "_f" { IrOp::VarReadF } else { IrOp::VarReadI };
            let n = cx.ir(op, var_id)?;
            cx.move_outlet(0, n, 0);
        }
        "__" => {}
        _ => return Err(cx.bad_format(&format)),
    }
    Ok(())
}

// ── Message routing ─────────────────────────────────────────────────────────

fn cast_for(cast: &str) -> Option<Option<IrOp>> {
    match cast {
        "a" | "anything" | "l" | "list" => Some(None),
        "b" | "bang" => Some(Some(IrOp::CastB)),
        "f" | "float" => Some(Some(IrOp::CastF)),
        "s" | "symbol" => Some(Some(IrOp::CastS)),
        _ => None,
    }
}

/// Each incoming message is delivered to every outlet, right to left.
fn sequence(cx: &mut Lowering<'_>) -> Result<(), CompileError> {
    let casts: Vec<String> = cx
        .args
        .get("casts")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|c| c.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let mut adapters: Vec<Option<NodeId>> = vec![None; cx.outlets.len()];
    for (i, cast) in casts.iter().enumerate().take(cx.outlets.len()) {
        let Some(op) = cast_for(cast) else {
            return Err(cx.error(codes::E0106, format!("unknown cast \"{cast}\"")));
        };
        if let Some(op) = op {
            if !cx.outlets[i].is_empty() {
                let n = cx.ir(op, Args::new())?;
                cx.move_outlet(i, n, 0);
                adapters[i] = Some(n);
            }
        }
    }

    for src in cx.inlets[0].clone() {
        let mut fanout = Vec::new();
        for i in (0..cx.outlets.len()).rev() {
            match adapters[i] {
                Some(n) => fanout.push(Connection::new(src.from, src.outlet, n, 0, ConnKind::Control)),
                None => fanout.extend(
                    cx.outlets[i]
                        .iter()
                        .map(|c| Connection::new(src.from, src.outlet, c.to, c.inlet, ConnKind::Control)),
                ),
            }
        }
        cx.rewrite(Some(src), fanout);
    }
    Ok(())
}

/// Extern objects become host-visible symbols.
fn check_extern(cx: &Lowering<'_>, name: &str) -> Result<(), CompileError> {
    let is_extern = cx.args.get("extern").is_some_and(|v| !v.is_null());
    let valid = !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    if is_extern && !valid {
        return Err(cx.error(
            codes::E0111,
            format!("extern name \"{name}\" may contain only letters, digits and underscores"),
        ));
    }
    Ok(())
}

fn receive(cx: &mut Lowering<'_>) -> Result<(), CompileError> {
    let name = cx.arg_str("name").unwrap_or_default().to_string();
    match cx.outlet_format().as_str() {
        "c" => {
            check_extern(cx, &name)?;
            let args = pick(&cx.args, &["name", "extern", "attributes", "priority"]);
            let n = cx.successor(IrOp::Receive, args)?;
            cx.move_outlet(0, n, 0);
        }
        // signal receives without a matching send read silence
        "f" | "i" => {}
        "_" => cx.warn(codes::W0103, format!("receive \"{name}\" has no connections and is removed")),
        other => return Err(cx.bad_format(other)),
    }
    Ok(())
}

fn send(cx: &mut Lowering<'_>) -> Result<(), CompileError> {
    let name = cx.arg_str("name").unwrap_or_default().to_string();
    match cx.inlet_format().as_str() {
        "c" => {
            check_extern(cx, &name)?;
            let mut args = pick(&cx.args, &["name", "extern", "attributes"]);
            args.insert("hash".into(), Value::String(hash_hex(hash_symbol(&name))));
            let n = cx.successor(IrOp::Send, args)?;
            cx.move_inlet(0, n, 0);
        }
        "f" | "i" => {}
        "_" => cx.warn(codes::W0103, format!("send \"{name}\" has no connections and is removed")),
        other => return Err(cx.bad_format(other)),
    }
    Ok(())
}

// ── Audio I/O ───────────────────────────────────────────────────────────────

fn channel(cx: &Lowering<'_>, index: usize) -> Result<i64, CompileError> {
    let ch = cx
        .args
        .get("channels")
        .and_then(Value::as_array)
        .and_then(|a| a.get(index))
        .and_then(Value::as_i64)
        .unwrap_or(0);
    if ch < 1 {
        return Err(cx.error(codes::E0102, format!("audio channel {ch} must be 1 or greater")));
    }
    Ok(ch)
}

/// One input reader per connected channel.
fn adc(cx: &mut Lowering<'_>) -> Result<(), CompileError> {
    for i in 0..cx.outlets.len() {
        if cx.outlets[i].is_empty() {
            continue;
        }
        let ch = channel(cx, i)?;
        let n = cx.ir(IrOp::Inlet, obj(json!({ "index": ADC_INLET_BASE + ch })))?;
        cx.patch[n].outlet_buffers[0] = Buffer::input((ch - 1) as u32);
        cx.move_outlet(i, n, 0);
    }
    Ok(())
}

/// One accumulator per connected channel, summing into the output buffer.
fn dac(cx: &mut Lowering<'_>) -> Result<(), CompileError> {
    for i in 0..cx.inlets.len() {
        if cx.inlets[i].is_empty() {
            continue;
        }
        let ch = channel(cx, i)?;
        let n = cx.ir(IrOp::AddF, Args::new())?;
        let out = Buffer::output((ch - 1) as u32);
        cx.patch[n].inlet_buffers[1] = out;
        cx.patch[n].outlet_buffers[0] = out;
        cx.move_inlet(i, n, 0);
    }
    Ok(())
}

// ── Signal and control objects ──────────────────────────────────────────────

fn biquad(cx: &mut Lowering<'_>) -> Result<(), CompileError> {
    let format = cx.inlet_format();
    let f = format.as_bytes();
    let op = if matches!(f[0], b'f' | b'_') && f[1..].iter().all(|c| matches!(c, b'c' | b'_')) {
        IrOp::BiquadKF
    } else if f.iter().all(|c| matches!(c, b'f' | b'_')) {
        IrOp::BiquadF
    } else {
        return Err(cx.bad_format(&format));
    };
    let args = if op == IrOp::BiquadKF {
        pick(&cx.args, &["ff0", "ff1", "ff2", "fb1", "fb2"])
    } else {
        Args::new()
    };
    let n = cx.ir(op, args)?;
    cx.move_all(n);
    Ok(())
}

fn conditional(cx: &mut Lowering<'_>) -> Result<(), CompileError> {
    let format = format!("{}{}", cx.inlet_format(), cx.outlet_format());
    if !format.bytes().all(|c| matches!(c, b'c' | b'_')) {
        return Err(cx.error(
            codes::E0106,
            format!("if operates on control connections only ({format})"),
        ));
    }
    let args = pick(&cx.args, &["k"]);
    let n = cx.ir(IrOp::If, args)?;
    cx.move_all(n);
    Ok(())
}

fn line(cx: &mut Lowering<'_>) -> Result<(), CompileError> {
    let op = match cx.outlet_format().as_str() {
        "f" => IrOp::LineF,
        "c" => IrOp::Line,
        "_" => return Ok(()),
        other => return Err(cx.bad_format(other)),
    };
    let n = cx.ir(op, Args::new())?;
    cx.move_all(n);
    Ok(())
}

fn random(cx: &mut Lowering<'_>) -> Result<(), CompileError> {
    let mut seed = cx.args.get("seed").and_then(Value::as_i64).unwrap_or(0);
    if seed == 0 {
        let ir_id = cx.patch[cx.id].ir_id.to_string();
        seed = i64::from(hash_symbol(&ir_id) & 0x7FFF_FFFF);
    }
    let n = cx.ir(IrOp::Random, obj(json!({ "seed": seed })))?;
    cx.move_all(n);
    Ok(())
}

fn phasor(cx: &mut Lowering<'_>) -> Result<(), CompileError> {
    let format = cx.inlet_format();
    let (op, args) = match format.as_bytes()[0] {
        b'f' => (IrOp::PhasorF, Args::new()),
        b'c' | b'_' => (IrOp::PhasorKF, pick(&cx.args, &["frequency"])),
        _ => return Err(cx.bad_format(&format)),
    };
    let n = cx.ir(op, args)?;
    cx.move_all(n);
    Ok(())
}
