// reduce/arith.rs — Lowering of binary and unary operators
//
// Dispatch is on the inlet format signature. A constant right operand that
// makes the operation an identity (`+0`, `-0`, `*1`, `/1`) splices the input
// straight through to the consumers; `*0` drops the node.

use serde_json::json;

use super::{obj, Lowering, Outcome};
use crate::catalog::{ArithTargets, Binop, IrOp, Unop};
use crate::connection::{ConnKind, Connection};
use crate::diag::{codes, CompileError};
use crate::value::Args;

/// Signal domain of a lowered operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Domain {
    Float,
    Int,
}

impl Domain {
    fn of(c: u8) -> Domain {
        if c == b'i' {
            Domain::Int
        } else {
            Domain::Float
        }
    }

    fn kind(self) -> ConnKind {
        match self {
            Domain::Float => ConnKind::FloatSignal,
            Domain::Int => ConnKind::IntSignal,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Domain::Float => "float",
            Domain::Int => "integer",
        }
    }
}

fn signal_op(cx: &Lowering<'_>, targets: ArithTargets, domain: Domain) -> Result<IrOp, CompileError> {
    let op = match domain {
        Domain::Float => targets.float,
        Domain::Int => targets.int,
    };
    op.ok_or_else(|| {
        cx.error(
            codes::E0106,
            format!("{} has no {} signal form", cx.op.type_name(), domain.label()),
        )
    })
}

pub(super) fn binop(mut cx: Lowering<'_>, op: Binop) -> Result<Outcome, CompileError> {
    // nothing reads the result
    if cx.outlet_format() == "_" {
        return Ok(cx.finish());
    }

    let format = cx.inlet_format();
    let targets = op.targets();
    let k = cx.arg_f64("k");

    match format.as_str() {
        "ff" | "ii" => {
            let target = signal_op(&cx, targets, Domain::of(format.as_bytes()[0]))?;
            let n = cx.ir(target, Args::new())?;
            cx.move_all(n);
        }
        "fc" | "ic" => sampled(&mut cx, targets, 0, Domain::of(format.as_bytes()[0]), k)?,
        "cf" | "ci" => sampled(&mut cx, targets, 1, Domain::of(format.as_bytes()[1]), 0.0)?,
        "f_" | "i_" => constant_operand(&mut cx, op, targets, Domain::of(format.as_bytes()[0]), k)?,
        "cc" => {
            let target = targets.control.ok_or_else(|| cx.bad_format(&format))?;
            let n = cx.ir(target, obj(json!({ "k": k })))?;
            cx.move_all(n);
        }
        "c_" => {
            let target = targets.curried.or(targets.control).ok_or_else(|| cx.bad_format(&format))?;
            let n = cx.ir(target, obj(json!({ "k": k })))?;
            cx.move_inlet(0, n, 0);
            cx.move_outlet(0, n, 0);
        }
        _ => return Err(cx.bad_format(&format)),
    }
    Ok(cx.finish())
}

/// One signal operand, the other control: the control value is held in a
/// variable and read back at signal rate.
fn sampled(
    cx: &mut Lowering<'_>,
    targets: ArithTargets,
    signal_inlet: usize,
    domain: Domain,
    initial: f64,
) -> Result<(), CompileError> {
    let control_inlet = 1 - signal_inlet;
    let target = signal_op(cx, targets, domain)?;
    let (var_op, read_op) = match domain {
        Domain::Float => (IrOp::VarF, IrOp::VarReadF),
        Domain::Int => (IrOp::VarI, IrOp::VarReadI),
    };

    let n = cx.ir(target, Args::new())?;
    let var = cx.ir(var_op, obj(json!({ "k": initial })))?;
    let var_id = cx.patch[var].ir_id.to_string();
    let read = cx.ir(read_op, obj(json!({ "var_id": var_id })))?;

    cx.add(Connection::new(read, 0, n, control_inlet, domain.kind()));
    cx.move_inlet(signal_inlet, n, signal_inlet);
    cx.move_inlet(control_inlet, var, 0);
    cx.move_outlet(0, n, 0);
    Ok(())
}

fn is_identity(op: Binop, k: f64) -> bool {
    match op {
        Binop::Add | Binop::Sub => k == 0.0,
        Binop::Mul | Binop::Div => k == 1.0,
        _ => false,
    }
}

/// Signal operand against the constant `k`.
fn constant_operand(
    cx: &mut Lowering<'_>,
    op: Binop,
    targets: ArithTargets,
    domain: Domain,
    k: f64,
) -> Result<(), CompileError> {
    let inputs = cx.inlets[0].clone();

    if is_identity(op, k) {
        if let [only] = inputs.as_slice() {
            for c in cx.outlets[0].clone() {
                cx.rewrite(Some(c), vec![c.with_from(only.from, only.outlet)]);
            }
            return Ok(());
        }
        // several sources: their sum is the result
        let add = match domain {
            Domain::Float => IrOp::AddF,
            Domain::Int => IrOp::AddI,
        };
        let n = cx.ir(add, Args::new())?;
        for (i, c) in inputs.iter().enumerate() {
            let inlet = usize::from(i > 0);
            cx.rewrite(Some(*c), vec![c.with_to(n, inlet)]);
        }
        cx.move_outlet(0, n, 0);
        return Ok(());
    }

    if op == Binop::Mul && k == 0.0 {
        return Ok(());
    }
    if op == Binop::Mul && k == -1.0 && domain == Domain::Float {
        let n = cx.ir(IrOp::NegF, Args::new())?;
        cx.move_inlet(0, n, 0);
        cx.move_outlet(0, n, 0);
        return Ok(());
    }

    let target = signal_op(cx, targets, domain)?;
    let constant = match domain {
        Domain::Float => IrOp::VarKF,
        Domain::Int => IrOp::VarKI,
    };
    let n = cx.ir(target, Args::new())?;
    let kn = cx.ir(constant, obj(json!({ "k": k })))?;
    cx.add(Connection::new(kn, 0, n, 1, domain.kind()));
    cx.move_inlet(0, n, 0);
    cx.move_outlet(0, n, 0);
    Ok(())
}

pub(super) fn unop(mut cx: Lowering<'_>, op: Unop) -> Result<Outcome, CompileError> {
    let format = cx.inlet_format();
    let targets = op.targets();
    let target = match format.as_str() {
        "_" => {
            return Err(cx.error(
                codes::E0106,
                format!("{} has no input connection", op.name()),
            ))
        }
        "f" => targets.float,
        "i" => targets.int,
        "c" => targets.control,
        _ => return Err(cx.bad_format(&format)),
    };
    let Some(target) = target else {
        return Err(cx.error(
            codes::E0106,
            format!("{} does not accept \"{format}\" input", op.name()),
        ));
    };
    let n = cx.ir(target, Args::new())?;
    cx.move_all(n);
    Ok(cx.finish())
}
