// catalog.rs — Closed catalog of canonical operations and high-level objects
//
// Two closed sets of node kinds: `IrOp`, the canonical low-level operations
// that appear in the IR document, and `LangOp`, the high-level objects that
// reduce themselves into canonical operations. Each canonical operation has
// a static descriptor (let kinds, flags, argument schema); each high-level
// object has a let layout and an argument schema.
//
// The tables are immutable for the life of the process.

use serde_json::Value;

use crate::connection::ConnKind;
use crate::value::{ArgDefault, ArgSpec, Args};

// ── Descriptors ─────────────────────────────────────────────────────────────

const C: ConnKind = ConnKind::Control;
const F: ConnKind = ConnKind::FloatSignal;
const I: ConnKind = ConnKind::IntSignal;
const M: ConnKind = ConnKind::Mixed;

/// What a canonical operation does at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpFlags {
    /// Processes a block of samples every tick.
    pub signal: bool,
    /// Needs one-time setup in the generated initializer.
    pub init: bool,
    /// Sends control messages from its outlets.
    pub control: bool,
}

const NONE: OpFlags = OpFlags { signal: false, init: false, control: false };
const SIG: OpFlags = OpFlags { signal: true, init: false, control: false };
const SIG_INIT: OpFlags = OpFlags { signal: true, init: true, control: false };
const SIG_CTL: OpFlags = OpFlags { signal: true, init: true, control: true };
const CTL: OpFlags = OpFlags { signal: false, init: false, control: true };
const CTL_INIT: OpFlags = OpFlags { signal: false, init: true, control: true };

/// Static descriptor of a canonical operation.
#[derive(Debug)]
pub struct OpSpec {
    pub tag: &'static str,
    pub inlets: &'static [ConnKind],
    pub outlets: &'static [ConnKind],
    pub flags: OpFlags,
    pub args: &'static [ArgSpec],
}

// Argument schemas shared by several operations.
const NO_ARGS: &[ArgSpec] = &[];
const K: &[ArgSpec] = &[ArgSpec::float("k", 0.0)];
const VAR_REF: &[ArgSpec] = &[ArgSpec::required_string("var_id")];
const INDEX: &[ArgSpec] = &[ArgSpec::required_int("index")];
const TABLE_REF: &[ArgSpec] = &[
    ArgSpec::required_string("table"),
    ArgSpec::optional_string("table_id"),
];
const DELAY: &[ArgSpec] = &[ArgSpec::float("delay", 0.0)];
const RANDOM: &[ArgSpec] = &[ArgSpec::int("seed", 0)];
const PRINT: &[ArgSpec] = &[ArgSpec::string("label", "print")];
const TABLE: &[ArgSpec] = &[
    ArgSpec::required_string("name"),
    ArgSpec::int("size", 256),
    ArgSpec::float_array("values", &[]),
    ArgSpec::boolean("extern", false),
];
const RECEIVE: &[ArgSpec] = &[
    ArgSpec::required_string("name"),
    ArgSpec::optional_string("extern"),
    ArgSpec::any("attributes", ArgDefault::EmptyMap),
    ArgSpec::int("priority", 0),
];
const SEND: &[ArgSpec] = &[
    ArgSpec::required_string("name"),
    ArgSpec::optional_string("extern"),
    ArgSpec::any("attributes", ArgDefault::EmptyMap),
    ArgSpec::optional_string("hash"),
];
const MESSAGE: &[ArgSpec] = &[
    ArgSpec::any("local", ArgDefault::FloatList(&[])),
    ArgSpec::any("remote", ArgDefault::FloatList(&[])),
];
const SWITCHCASE: &[ArgSpec] = &[ArgSpec::any("cases", ArgDefault::FloatList(&[]))];
const SLICE: &[ArgSpec] = &[ArgSpec::int("index", 0), ArgSpec::int("length", 1)];
const PACK: &[ArgSpec] = &[ArgSpec::float_array("values", &[0.0, 0.0])];
const BIQUAD: &[ArgSpec] = &[
    ArgSpec::float("ff0", 0.0),
    ArgSpec::float("ff1", 0.0),
    ArgSpec::float("ff2", 0.0),
    ArgSpec::float("fb1", 0.0),
    ArgSpec::float("fb2", 0.0),
];
const PHASOR: &[ArgSpec] = &[ArgSpec::float("frequency", 0.0)];
const ENV: &[ArgSpec] = &[ArgSpec::int("windowSize", 1024), ArgSpec::int("period", 512)];
/// Initial state of the attractor.
const LORENZ: &[ArgSpec] = &[ArgSpec::float("x", 0.0), ArgSpec::float("y", 0.0), ArgSpec::float("z", 0.0)];

// ── Canonical operations ────────────────────────────────────────────────────

macro_rules! ir_ops {
    ($( $variant:ident => $tag:literal [$($i:ident),*] -> [$($o:ident),*] $flags:ident $args:ident; )*) => {
        /// A canonical low-level operation.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum IrOp {
            $($variant,)*
        }

        impl IrOp {
            pub const ALL: &'static [IrOp] = &[$(IrOp::$variant,)*];

            pub fn spec(self) -> &'static OpSpec {
                match self {
                    $(IrOp::$variant => {
                        static SPEC: OpSpec = OpSpec {
                            tag: $tag,
                            inlets: &[$($i),*],
                            outlets: &[$($o),*],
                            flags: $flags,
                            args: $args,
                        };
                        &SPEC
                    })*
                }
            }

            pub fn from_tag(tag: &str) -> Option<IrOp> {
                match tag {
                    $($tag => Some(IrOp::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

ir_ops! {
    // control-rate binary arithmetic, constant `k` as the right operand
    Add => "__add" [C, C] -> [C] CTL_INIT K;
    Sub => "__sub" [C, C] -> [C] CTL_INIT K;
    Mul => "__mul" [C, C] -> [C] CTL_INIT K;
    Div => "__div" [C, C] -> [C] CTL_INIT K;
    Max => "__max" [C, C] -> [C] CTL_INIT K;
    Min => "__min" [C, C] -> [C] CTL_INIT K;
    Gt => "__gt" [C, C] -> [C] CTL_INIT K;
    Gte => "__gte" [C, C] -> [C] CTL_INIT K;
    Eq => "__eq" [C, C] -> [C] CTL_INIT K;
    Neq => "__neq" [C, C] -> [C] CTL_INIT K;
    Lt => "__lt" [C, C] -> [C] CTL_INIT K;
    Lte => "__lte" [C, C] -> [C] CTL_INIT K;
    And => "__and" [C, C] -> [C] CTL_INIT K;
    LogAnd => "__logand" [C, C] -> [C] CTL_INIT K;
    AndNot => "__andnot" [C, C] -> [C] CTL_INIT K;
    Or => "__or" [C, C] -> [C] CTL_INIT K;
    LogOr => "__logor" [C, C] -> [C] CTL_INIT K;
    Pow => "__pow" [C, C] -> [C] CTL_INIT K;
    Atan2 => "__atan2" [C, C] -> [C] CTL_INIT K;
    Unimod => "__unimod" [C, C] -> [C] CTL_INIT K;
    Bimod => "__bimod" [C, C] -> [C] CTL_INIT K;
    ShiftRight => "__shiftright" [C, C] -> [C] CTL_INIT K;
    ShiftLeft => "__shiftleft" [C, C] -> [C] CTL_INIT K;

    // curried control-rate binary arithmetic
    AddK => "__add_k" [C] -> [C] CTL_INIT K;
    SubK => "__sub_k" [C] -> [C] CTL_INIT K;
    MulK => "__mul_k" [C] -> [C] CTL_INIT K;
    DivK => "__div_k" [C] -> [C] CTL_INIT K;
    MaxK => "__max_k" [C] -> [C] CTL_INIT K;
    MinK => "__min_k" [C] -> [C] CTL_INIT K;
    GtK => "__gt_k" [C] -> [C] CTL_INIT K;
    GteK => "__gte_k" [C] -> [C] CTL_INIT K;
    EqK => "__eq_k" [C] -> [C] CTL_INIT K;
    NeqK => "__neq_k" [C] -> [C] CTL_INIT K;
    LtK => "__lt_k" [C] -> [C] CTL_INIT K;
    LteK => "__lte_k" [C] -> [C] CTL_INIT K;
    AndK => "__and_k" [C] -> [C] CTL_INIT K;
    LogAndK => "__logand_k" [C] -> [C] CTL_INIT K;
    OrK => "__or_k" [C] -> [C] CTL_INIT K;
    LogOrK => "__logor_k" [C] -> [C] CTL_INIT K;
    PowK => "__pow_k" [C] -> [C] CTL_INIT K;
    Atan2K => "__atan2_k" [C] -> [C] CTL_INIT K;
    UnimodK => "__unimod_k" [C] -> [C] CTL_INIT K;
    BimodK => "__bimod_k" [C] -> [C] CTL_INIT K;
    ShiftRightK => "__shiftright_k" [C] -> [C] CTL_INIT K;
    ShiftLeftK => "__shiftleft_k" [C] -> [C] CTL_INIT K;

    // float signal binary arithmetic
    AddF => "__add~f" [F, F] -> [F] SIG NO_ARGS;
    SubF => "__sub~f" [F, F] -> [F] SIG NO_ARGS;
    MulF => "__mul~f" [F, F] -> [F] SIG NO_ARGS;
    DivF => "__div~f" [F, F] -> [F] SIG NO_ARGS;
    MaxF => "__max~f" [F, F] -> [F] SIG NO_ARGS;
    MinF => "__min~f" [F, F] -> [F] SIG NO_ARGS;
    GtF => "__gt~f" [F, F] -> [F] SIG NO_ARGS;
    GteF => "__gte~f" [F, F] -> [F] SIG NO_ARGS;
    EqF => "__eq~f" [F, F] -> [F] SIG NO_ARGS;
    NeqF => "__neq~f" [F, F] -> [F] SIG NO_ARGS;
    LtF => "__lt~f" [F, F] -> [F] SIG NO_ARGS;
    LteF => "__lte~f" [F, F] -> [F] SIG NO_ARGS;
    AndF => "__and~f" [F, F] -> [F] SIG NO_ARGS;
    AndNotF => "__andnot~f" [F, F] -> [F] SIG NO_ARGS;
    OrF => "__or~f" [F, F] -> [F] SIG NO_ARGS;
    PowF => "__pow~f" [F, F] -> [F] SIG NO_ARGS;
    Atan2F => "__atan2~f" [F, F] -> [F] SIG NO_ARGS;

    // integer signal binary arithmetic
    AddI => "__add~i" [I, I] -> [I] SIG NO_ARGS;
    SubI => "__sub~i" [I, I] -> [I] SIG NO_ARGS;
    MulI => "__mul~i" [I, I] -> [I] SIG NO_ARGS;
    DivI => "__div~i" [I, I] -> [I] SIG NO_ARGS;
    MaxI => "__max~i" [I, I] -> [I] SIG NO_ARGS;
    MinI => "__min~i" [I, I] -> [I] SIG NO_ARGS;
    GtI => "__gt~i" [I, I] -> [I] SIG NO_ARGS;
    GteI => "__gte~i" [I, I] -> [I] SIG NO_ARGS;
    EqI => "__eq~i" [I, I] -> [I] SIG NO_ARGS;
    NeqI => "__neq~i" [I, I] -> [I] SIG NO_ARGS;
    LtI => "__lt~i" [I, I] -> [I] SIG NO_ARGS;
    LteI => "__lte~i" [I, I] -> [I] SIG NO_ARGS;
    AndI => "__and~i" [I, I] -> [I] SIG NO_ARGS;
    AndNotI => "__andnot~i" [I, I] -> [I] SIG NO_ARGS;
    OrI => "__or~i" [I, I] -> [I] SIG NO_ARGS;
    PowI => "__pow~i" [I, I] -> [I] SIG NO_ARGS;

    // fused and unary signal arithmetic
    NegF => "__neg~f" [F] -> [F] SIG NO_ARGS;
    FmaF => "__fma~f" [F, F, F] -> [F] SIG NO_ARGS;
    FmsF => "__fms~f" [F, F, F] -> [F] SIG NO_ARGS;
    CastFI => "__cast~fi" [F] -> [I] SIG NO_ARGS;
    CastIF => "__cast~if" [I] -> [F] SIG NO_ARGS;

    // control-rate unary math
    Log => "__log" [C] -> [C] CTL NO_ARGS;
    Log10 => "__log10" [C] -> [C] CTL NO_ARGS;
    Log2 => "__log2" [C] -> [C] CTL NO_ARGS;
    Cos => "__cos" [C] -> [C] CTL NO_ARGS;
    Acos => "__acos" [C] -> [C] CTL NO_ARGS;
    Cosh => "__cosh" [C] -> [C] CTL NO_ARGS;
    Acosh => "__acosh" [C] -> [C] CTL NO_ARGS;
    Sin => "__sin" [C] -> [C] CTL NO_ARGS;
    Asin => "__asin" [C] -> [C] CTL NO_ARGS;
    Sinh => "__sinh" [C] -> [C] CTL NO_ARGS;
    Asinh => "__asinh" [C] -> [C] CTL NO_ARGS;
    Tan => "__tan" [C] -> [C] CTL NO_ARGS;
    Atan => "__atan" [C] -> [C] CTL NO_ARGS;
    Tanh => "__tanh" [C] -> [C] CTL NO_ARGS;
    Atanh => "__atanh" [C] -> [C] CTL NO_ARGS;
    Exp => "__exp" [C] -> [C] CTL NO_ARGS;
    Sqrt => "__sqrt" [C] -> [C] CTL NO_ARGS;
    Abs => "__abs" [C] -> [C] CTL NO_ARGS;
    Floor => "__floor" [C] -> [C] CTL NO_ARGS;
    Ceil => "__ceil" [C] -> [C] CTL NO_ARGS;

    // signal-rate unary math
    Log2F => "__log2~f" [F] -> [F] SIG NO_ARGS;
    CosF => "__cos~f" [F] -> [F] SIG NO_ARGS;
    AcosF => "__acos~f" [F] -> [F] SIG NO_ARGS;
    CoshF => "__cosh~f" [F] -> [F] SIG NO_ARGS;
    AcoshF => "__acosh~f" [F] -> [F] SIG NO_ARGS;
    SinF => "__sin~f" [F] -> [F] SIG NO_ARGS;
    AsinF => "__asin~f" [F] -> [F] SIG NO_ARGS;
    SinhF => "__sinh~f" [F] -> [F] SIG NO_ARGS;
    AsinhF => "__asinh~f" [F] -> [F] SIG NO_ARGS;
    TanF => "__tan~f" [F] -> [F] SIG NO_ARGS;
    AtanF => "__atan~f" [F] -> [F] SIG NO_ARGS;
    TanhF => "__tanh~f" [F] -> [F] SIG NO_ARGS;
    AtanhF => "__atanh~f" [F] -> [F] SIG NO_ARGS;
    ExpF => "__exp~f" [F] -> [F] SIG NO_ARGS;
    SqrtF => "__sqrt~f" [F] -> [F] SIG NO_ARGS;
    AbsF => "__abs~f" [F] -> [F] SIG NO_ARGS;
    AbsI => "__abs~i" [I] -> [I] SIG NO_ARGS;
    FloorF => "__floor~f" [F] -> [F] SIG NO_ARGS;
    CeilF => "__ceil~f" [F] -> [F] SIG NO_ARGS;

    // variables
    Var => "__var" [C, C] -> [C] CTL_INIT K;
    VarF => "__var~f" [C] -> [] CTL_INIT K;
    VarI => "__var~i" [C] -> [] CTL_INIT K;
    VarKF => "__var_k~f" [] -> [F] SIG_INIT K;
    VarKI => "__var_k~i" [] -> [I] SIG_INIT K;
    VarReadF => "__varread~f" [] -> [F] SIG VAR_REF;
    VarReadI => "__varread~i" [] -> [I] SIG VAR_REF;
    VarWriteF => "__varwrite~f" [F] -> [] SIG VAR_REF;
    VarWriteI => "__varwrite~i" [I] -> [] SIG VAR_REF;

    // control objects
    CastB => "__cast_b" [C] -> [C] CTL NO_ARGS;
    CastF => "__cast_f" [C] -> [C] CTL NO_ARGS;
    CastS => "__cast_s" [C] -> [C] CTL NO_ARGS;
    Delay => "__delay" [C, C] -> [C] CTL_INIT DELAY;
    If => "__if" [C, C] -> [C, C] CTL_INIT K;
    Line => "__line" [C, C] -> [C] CTL_INIT NO_ARGS;
    Message => "__message" [C] -> [C] CTL MESSAGE;
    Print => "__print" [C] -> [] CTL PRINT;
    Random => "__random" [C, C] -> [C] CTL_INIT RANDOM;
    System => "__system" [C] -> [C] CTL NO_ARGS;
    Slice => "__slice" [C, C, C] -> [C, C] CTL_INIT SLICE;
    Pack => "__pack" [C] -> [C] CTL_INIT PACK;
    Switchcase => "__switchcase" [C] -> [C] CTL SWITCHCASE;
    Receive => "__receive" [] -> [C] CTL RECEIVE;
    Send => "__send" [C] -> [] CTL SEND;
    Table => "__table" [C] -> [C] CTL_INIT TABLE;
    Tabread => "__tabread" [C, C] -> [C] CTL_INIT TABLE_REF;
    Tabhead => "__tabhead" [C] -> [C] CTL_INIT TABLE_REF;
    Tabwrite => "__tabwrite" [C, C] -> [] CTL_INIT TABLE_REF;

    // signal objects
    LineF => "__line~f" [C, C] -> [F] SIG_CTL NO_ARGS;
    PhasorF => "__phasor~f" [F, C] -> [F] SIG_CTL NO_ARGS;
    PhasorKF => "__phasor_k~f" [C, C] -> [F] SIG_CTL PHASOR;
    BiquadF => "__biquad~f" [F, F, F, F, F, F] -> [F] SIG_INIT NO_ARGS;
    BiquadKF => "__biquad_k~f" [F, C, C, C, C, C] -> [F] SIG_CTL BIQUAD;
    Del1F => "__del1~f" [F] -> [F] SIG_INIT NO_ARGS;
    SampholdF => "__samphold~f" [F, F] -> [F] SIG_CTL NO_ARGS;
    RpoleF => "__rpole~f" [F, F] -> [F] SIG_INIT NO_ARGS;
    CpoleF => "__cpole~f" [F, F, F, F] -> [F, F] SIG_INIT NO_ARGS;
    EnvF => "__env~f" [F] -> [C] SIG_CTL ENV;
    // step size, sigma, rho and beta in; x, y and z out
    LorenzF => "__lorenz~f" [F, F, F, F] -> [F, F, F] SIG_INIT LORENZ;
    TabreadF => "__tabread~f" [C] -> [F, C] SIG_CTL TABLE_REF;
    TabheadF => "__tabhead~f" [C] -> [F] SIG_CTL TABLE_REF;
    TabwriteF => "__tabwrite~f" [F, C] -> [C] SIG_CTL TABLE_REF;

    // graph proxies
    Inlet => "__inlet" [] -> [M] NONE INDEX;
    Outlet => "__outlet" [M] -> [] NONE INDEX;
}

/// First inlet index of the proxies an `adc` lowers to; channel `n` uses
/// `ADC_INLET_BASE + n`.
pub const ADC_INLET_BASE: i64 = 127;

impl IrOp {
    pub fn tag(self) -> &'static str {
        self.spec().tag
    }

    pub fn flags(self) -> OpFlags {
        self.spec().flags
    }

    /// Number of inlets and outlets for a node with these arguments.
    pub fn arity(self, args: &Args) -> (usize, usize) {
        let spec = self.spec();
        match self {
            IrOp::Pack => (array_len(args, "values").max(1), spec.outlets.len()),
            IrOp::Switchcase => (spec.inlets.len(), array_len(args, "cases") + 1),
            _ => (spec.inlets.len(), spec.outlets.len()),
        }
    }

    /// Declared kind of an inlet; variable-arity lets repeat the last kind.
    pub fn inlet_kind(self, index: usize) -> Option<ConnKind> {
        let lets = self.spec().inlets;
        lets.get(index).or(lets.last()).copied()
    }

    pub fn outlet_kind(self, index: usize) -> Option<ConnKind> {
        let lets = self.spec().outlets;
        lets.get(index).or(lets.last()).copied()
    }

    /// Operations that name a table in `args.table`.
    pub fn references_table(self) -> bool {
        matches!(
            self,
            IrOp::Tabread
                | IrOp::Tabhead
                | IrOp::Tabwrite
                | IrOp::TabreadF
                | IrOp::TabheadF
                | IrOp::TabwriteF
        )
    }
}

fn array_len(args: &Args, key: &str) -> usize {
    match args.get(key) {
        Some(Value::Array(items)) => items.len(),
        _ => 0,
    }
}

// ── High-level arithmetic tables ────────────────────────────────────────────

use IrOp as O;

/// Canonical variants of an arithmetic operator, by connection format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArithTargets {
    pub control: Option<IrOp>,
    pub curried: Option<IrOp>,
    pub float: Option<IrOp>,
    pub int: Option<IrOp>,
}

macro_rules! binops {
    ($( $variant:ident $symbol:literal => [$c:expr, $k:expr, $f:expr, $i:expr] ),* $(,)?) => {
        /// High-level binary operators.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Binop {
            $($variant,)*
        }

        impl Binop {
            pub const ALL: &'static [Binop] = &[$(Binop::$variant,)*];

            pub fn symbol(self) -> &'static str {
                match self {
                    $(Binop::$variant => $symbol,)*
                }
            }

            pub fn from_symbol(symbol: &str) -> Option<Binop> {
                match symbol {
                    $($symbol => Some(Binop::$variant),)*
                    _ => None,
                }
            }

            pub fn targets(self) -> ArithTargets {
                match self {
                    $(Binop::$variant => ArithTargets {
                        control: $c,
                        curried: $k,
                        float: $f,
                        int: $i,
                    },)*
                }
            }
        }
    };
}

binops! {
    Add "+" => [Some(O::Add), Some(O::AddK), Some(O::AddF), Some(O::AddI)],
    Sub "-" => [Some(O::Sub), Some(O::SubK), Some(O::SubF), Some(O::SubI)],
    Mul "*" => [Some(O::Mul), Some(O::MulK), Some(O::MulF), Some(O::MulI)],
    Div "/" => [Some(O::Div), Some(O::DivK), Some(O::DivF), Some(O::DivI)],
    Max "max" => [Some(O::Max), Some(O::MaxK), Some(O::MaxF), Some(O::MaxI)],
    Min "min" => [Some(O::Min), Some(O::MinK), Some(O::MinF), Some(O::MinI)],
    Gt ">" => [Some(O::Gt), Some(O::GtK), Some(O::GtF), Some(O::GtI)],
    Gte ">=" => [Some(O::Gte), Some(O::GteK), Some(O::GteF), Some(O::GteI)],
    Eq "==" => [Some(O::Eq), Some(O::EqK), Some(O::EqF), Some(O::EqI)],
    Neq "!=" => [Some(O::Neq), Some(O::NeqK), Some(O::NeqF), Some(O::NeqI)],
    Lt "<" => [Some(O::Lt), Some(O::LtK), Some(O::LtF), Some(O::LtI)],
    Lte "<=" => [Some(O::Lte), Some(O::LteK), Some(O::LteF), Some(O::LteI)],
    BitAnd "&" => [Some(O::And), Some(O::AndK), Some(O::AndF), Some(O::AndI)],
    LogAnd "&&" => [Some(O::LogAnd), Some(O::LogAndK), None, None],
    AndNot "&!" => [Some(O::AndNot), None, Some(O::AndNotF), Some(O::AndNotI)],
    BitOr "|" => [Some(O::Or), Some(O::OrK), Some(O::OrF), Some(O::OrI)],
    LogOr "||" => [Some(O::LogOr), Some(O::LogOrK), None, None],
    Pow "pow" => [Some(O::Pow), Some(O::PowK), Some(O::PowF), Some(O::PowI)],
    Atan2 "atan2" => [Some(O::Atan2), Some(O::Atan2K), Some(O::Atan2F), None],
    Unimod "mod" => [Some(O::Unimod), Some(O::UnimodK), None, None],
    Bimod "%" => [Some(O::Bimod), Some(O::BimodK), None, None],
    ShiftRight ">>" => [Some(O::ShiftRight), Some(O::ShiftRightK), None, None],
    ShiftLeft "<<" => [Some(O::ShiftLeft), Some(O::ShiftLeftK), None, None],
}

macro_rules! unops {
    ($( $variant:ident $name:literal => [$c:expr, $f:expr, $i:expr] ),* $(,)?) => {
        /// High-level unary operators.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Unop {
            $($variant,)*
        }

        impl Unop {
            pub const ALL: &'static [Unop] = &[$(Unop::$variant,)*];

            pub fn name(self) -> &'static str {
                match self {
                    $(Unop::$variant => $name,)*
                }
            }

            pub fn from_name(name: &str) -> Option<Unop> {
                match name {
                    $($name => Some(Unop::$variant),)*
                    _ => None,
                }
            }

            pub fn targets(self) -> ArithTargets {
                match self {
                    $(Unop::$variant => ArithTargets {
                        control: $c,
                        curried: None,
                        float: $f,
                        int: $i,
                    },)*
                }
            }
        }
    };
}

unops! {
    Log "log" => [Some(O::Log), None, None],
    Log10 "log10" => [Some(O::Log10), None, None],
    Log2 "log2" => [Some(O::Log2), Some(O::Log2F), None],
    Cos "cos" => [Some(O::Cos), Some(O::CosF), None],
    Acos "acos" => [Some(O::Acos), Some(O::AcosF), None],
    Cosh "cosh" => [Some(O::Cosh), Some(O::CoshF), None],
    Acosh "acosh" => [Some(O::Acosh), Some(O::AcoshF), None],
    Sin "sin" => [Some(O::Sin), Some(O::SinF), None],
    Asin "asin" => [Some(O::Asin), Some(O::AsinF), None],
    Sinh "sinh" => [Some(O::Sinh), Some(O::SinhF), None],
    Asinh "asinh" => [Some(O::Asinh), Some(O::AsinhF), None],
    Tan "tan" => [Some(O::Tan), Some(O::TanF), None],
    Atan "atan" => [Some(O::Atan), Some(O::AtanF), None],
    Tanh "tanh" => [Some(O::Tanh), Some(O::TanhF), None],
    Atanh "atanh" => [Some(O::Atanh), Some(O::AtanhF), None],
    Exp "exp" => [Some(O::Exp), Some(O::ExpF), None],
    Sqrt "sqrt" => [Some(O::Sqrt), Some(O::SqrtF), None],
    Abs "abs" => [Some(O::Abs), Some(O::AbsF), Some(O::AbsI)],
    Floor "floor" => [Some(O::Floor), Some(O::FloorF), None],
    Ceil "ceil" => [Some(O::Ceil), Some(O::CeilF), None],
    CastFI "cast_fi" => [None, Some(O::CastFI), None],
    CastIF "cast_if" => [None, None, Some(O::CastIF)],
}

// ── High-level objects ──────────────────────────────────────────────────────

/// A high-level object that reduces itself to canonical operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LangOp {
    Binop(Binop),
    Unop(Unop),
    Var,
    Vario,
    Sequence,
    Adc,
    Dac,
    Biquad,
    Delay,
    If,
    Line,
    Message,
    Random,
    Receive,
    Send,
    System,
    Table,
    Print,
    Phasor,
    Slice,
}

/// Let layout and argument schema of a high-level object.
#[derive(Debug, Clone, Copy)]
pub struct LangSpec {
    pub inlets: &'static [ConnKind],
    pub outlets: &'static [ConnKind],
    pub args: &'static [ArgSpec],
}

const SEQUENCE: &[ArgSpec] = &[ArgSpec::required_string_array("casts")];
const CHANNELS: &[ArgSpec] = &[ArgSpec::int_array("channels", &[1, 2])];
const VAR: &[ArgSpec] = &[ArgSpec::optional_string("name"), ArgSpec::float("k", 0.0)];
const VARIO: &[ArgSpec] = &[ArgSpec::required_string("name")];
const LANG_SEND: &[ArgSpec] = &[
    ArgSpec::required_string("name"),
    ArgSpec::optional_string("extern"),
    ArgSpec::any("attributes", ArgDefault::EmptyMap),
];

impl LangOp {
    pub fn from_type(obj_type: &str) -> Option<LangOp> {
        if let Some(b) = Binop::from_symbol(obj_type) {
            return Some(LangOp::Binop(b));
        }
        if let Some(u) = Unop::from_name(obj_type) {
            return Some(LangOp::Unop(u));
        }
        let op = match obj_type {
            "var" => LangOp::Var,
            "vario" => LangOp::Vario,
            "sequence" | "trigger" => LangOp::Sequence,
            "adc" => LangOp::Adc,
            "dac" => LangOp::Dac,
            "biquad" => LangOp::Biquad,
            "delay" => LangOp::Delay,
            "if" => LangOp::If,
            "line" => LangOp::Line,
            "message" => LangOp::Message,
            "random" => LangOp::Random,
            "receive" => LangOp::Receive,
            "send" => LangOp::Send,
            "system" => LangOp::System,
            "table" => LangOp::Table,
            "print" => LangOp::Print,
            "phasor" => LangOp::Phasor,
            "slice" => LangOp::Slice,
            _ => return None,
        };
        Some(op)
    }

    pub fn type_name(self) -> &'static str {
        match self {
            LangOp::Binop(b) => b.symbol(),
            LangOp::Unop(u) => u.name(),
            LangOp::Var => "var",
            LangOp::Vario => "vario",
            LangOp::Sequence => "sequence",
            LangOp::Adc => "adc",
            LangOp::Dac => "dac",
            LangOp::Biquad => "biquad",
            LangOp::Delay => "delay",
            LangOp::If => "if",
            LangOp::Line => "line",
            LangOp::Message => "message",
            LangOp::Random => "random",
            LangOp::Receive => "receive",
            LangOp::Send => "send",
            LangOp::System => "system",
            LangOp::Table => "table",
            LangOp::Print => "print",
            LangOp::Phasor => "phasor",
            LangOp::Slice => "slice",
        }
    }

    pub fn spec(self) -> LangSpec {
        let (inlets, outlets, args): (&'static [ConnKind], &'static [ConnKind], &'static [ArgSpec]) =
            match self {
                LangOp::Binop(_) => (&[M, M], &[M], K),
                LangOp::Unop(_) => (&[M], &[M], NO_ARGS),
                LangOp::Var => (&[C], &[M], VAR),
                LangOp::Vario => (&[M], &[M], VARIO),
                LangOp::Sequence => (&[C], &[C], SEQUENCE),
                LangOp::Adc => (&[], &[F], CHANNELS),
                LangOp::Dac => (&[F], &[], CHANNELS),
                LangOp::Biquad => (&[F, M, M, M, M, M], &[F], BIQUAD),
                LangOp::Delay => (&[C, C], &[C], DELAY),
                LangOp::If => (&[M, M], &[M, M], K),
                LangOp::Line => (&[C, C], &[M], NO_ARGS),
                LangOp::Message => (&[C], &[C], MESSAGE),
                LangOp::Random => (&[C, C], &[C], RANDOM),
                LangOp::Receive => (&[], &[M], RECEIVE),
                LangOp::Send => (&[M], &[], LANG_SEND),
                LangOp::System => (&[C], &[C], NO_ARGS),
                LangOp::Table => (&[C], &[C], TABLE),
                LangOp::Print => (&[C], &[], PRINT),
                LangOp::Phasor => (&[M, C], &[F], PHASOR),
                LangOp::Slice => (&[C, C, C], &[C, C], SLICE),
            };
        LangSpec {
            inlets,
            outlets,
            args,
        }
    }

    /// Number of inlets and outlets for an object with these arguments.
    pub fn arity(self, args: &Args) -> (usize, usize) {
        let spec = self.spec();
        match self {
            LangOp::Sequence => (1, array_len(args, "casts")),
            LangOp::Adc => (0, array_len(args, "channels")),
            LangOp::Dac => (array_len(args, "channels"), 0),
            _ => (spec.inlets.len(), spec.outlets.len()),
        }
    }

    pub fn outlet_kind(self, index: usize) -> Option<ConnKind> {
        let lets = self.spec().outlets;
        lets.get(index).or(lets.last()).copied()
    }

    pub fn inlet_kind(self, index: usize) -> Option<ConnKind> {
        let lets = self.spec().inlets;
        lets.get(index).or(lets.last()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tags_round_trip() {
        for &op in IrOp::ALL {
            assert_eq!(IrOp::from_tag(op.tag()), Some(op), "{op:?}");
        }
        assert_eq!(IrOp::from_tag("__nope"), None);
    }

    #[test]
    fn lorenz_is_a_three_output_signal_op() {
        let op = IrOp::from_tag("__lorenz~f").unwrap();
        assert_eq!(op.spec().inlets, &[F, F, F, F]);
        assert_eq!(op.spec().outlets, &[F, F, F]);
        assert!(op.flags().signal && op.flags().init);
        let names: Vec<_> = op.spec().args.iter().map(|a| a.name).collect();
        assert_eq!(names, ["x", "y", "z"]);
    }

    #[test]
    fn tags_are_unique() {
        let mut tags: Vec<_> = IrOp::ALL.iter().map(|op| op.tag()).collect();
        let len = tags.len();
        tags.sort();
        tags.dedup();
        assert_eq!(tags.len(), len);
    }

    #[test]
    fn binop_targets_have_matching_let_kinds() {
        for &b in Binop::ALL {
            let t = b.targets();
            if let Some(f) = t.float {
                assert_eq!(f.spec().inlets, &[F, F], "{b:?}");
                assert!(f.flags().signal);
            }
            if let Some(i) = t.int {
                assert_eq!(i.spec().outlets, &[I], "{b:?}");
            }
            if let Some(k) = t.curried {
                assert_eq!(k.spec().inlets.len(), 1, "{b:?}");
            }
            assert!(t.control.is_some(), "{b:?} has no control variant");
        }
    }

    #[test]
    fn asinh_lowers_to_its_own_signal_op() {
        assert_eq!(Unop::Asinh.targets().float, Some(IrOp::AsinhF));
    }

    #[test]
    fn lang_types_resolve() {
        assert_eq!(LangOp::from_type("+"), Some(LangOp::Binop(Binop::Add)));
        assert_eq!(LangOp::from_type("cast_fi"), Some(LangOp::Unop(Unop::CastFI)));
        assert_eq!(LangOp::from_type("trigger"), Some(LangOp::Sequence));
        assert_eq!(LangOp::from_type("osc~"), None);
        for &b in Binop::ALL {
            assert_eq!(LangOp::from_type(LangOp::Binop(b).type_name()), Some(LangOp::Binop(b)));
        }
    }

    #[test]
    fn variable_arity_follows_arguments() {
        let args = match json!({"casts": ["b", "f", "a"]}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        assert_eq!(LangOp::Sequence.arity(&args), (1, 3));
        let args = match json!({"cases": ["a", 2]}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        assert_eq!(IrOp::Switchcase.arity(&args), (1, 3));
        let args = match json!({"values": [0.0, 1.0, 2.0]}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        assert_eq!(IrOp::Pack.arity(&args), (3, 1));
    }
}
