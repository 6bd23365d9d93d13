// connection.rs — Typed edges and connection-format signatures
//
// A `Connection` is an immutable value; the graph API replaces connections
// rather than editing them. Format signatures summarize, one character per
// let, what is wired to a node: `c` control, `f` float signal, `i` integer
// signal, `m` several kinds (or an unresolved polymorphic edge), `_` nothing.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::NodeId;

// ── Connection kind ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConnKind {
    #[serde(rename = "-->")]
    Control,
    #[serde(rename = "~f>")]
    FloatSignal,
    #[serde(rename = "~i>")]
    IntSignal,
    /// Polymorphic edge whose concrete kind is decided by type resolution.
    #[serde(rename = "-~>")]
    Mixed,
}

impl ConnKind {
    pub fn symbol(self) -> &'static str {
        match self {
            ConnKind::Control => "-->",
            ConnKind::FloatSignal => "~f>",
            ConnKind::IntSignal => "~i>",
            ConnKind::Mixed => "-~>",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "-->" => Some(ConnKind::Control),
            "~f>" => Some(ConnKind::FloatSignal),
            "~i>" => Some(ConnKind::IntSignal),
            "-~>" => Some(ConnKind::Mixed),
            _ => None,
        }
    }

    pub fn is_signal(self) -> bool {
        matches!(self, ConnKind::FloatSignal | ConnKind::IntSignal)
    }

    pub fn format_char(self) -> char {
        match self {
            ConnKind::Control => 'c',
            ConnKind::FloatSignal => 'f',
            ConnKind::IntSignal => 'i',
            ConnKind::Mixed => 'm',
        }
    }
}

impl fmt::Display for ConnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// ── Connection ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    pub from: NodeId,
    pub outlet: usize,
    pub to: NodeId,
    pub inlet: usize,
    pub kind: ConnKind,
}

impl Connection {
    pub fn new(from: NodeId, outlet: usize, to: NodeId, inlet: usize, kind: ConnKind) -> Self {
        Self {
            from,
            outlet,
            to,
            inlet,
            kind,
        }
    }

    /// Same endpoints, different kind.
    pub fn with_kind(self, kind: ConnKind) -> Self {
        Self { kind, ..self }
    }

    /// Same destination, sourced from another outlet.
    pub fn with_from(self, from: NodeId, outlet: usize) -> Self {
        Self {
            from,
            outlet,
            ..self
        }
    }

    /// Same source, delivered to another inlet.
    pub fn with_to(self, to: NodeId, inlet: usize) -> Self {
        Self { to, inlet, ..self }
    }

    pub fn is_signal(&self) -> bool {
        self.kind.is_signal()
    }

    pub fn is_mixed(&self) -> bool {
        self.kind == ConnKind::Mixed
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}:{}] {} [{}:{}]",
            self.from, self.outlet, self.kind, self.to, self.inlet
        )
    }
}

// ── Format signatures ───────────────────────────────────────────────────────

/// The distinct kinds present on one let.
pub fn kind_set(conns: &[Connection]) -> BTreeSet<ConnKind> {
    conns.iter().map(|c| c.kind).collect()
}

/// One-character format code for the connections on a single let.
pub fn let_format(conns: &[Connection]) -> char {
    let kinds = kind_set(conns);
    let mut iter = kinds.iter();
    match (iter.next(), iter.next()) {
        (None, _) => '_',
        (Some(k), None) => k.format_char(),
        (Some(_), Some(_)) => 'm',
    }
}

/// Format signature across all lets, e.g. `"fc"` or `"c_"`.
pub fn format_signature(lets: &[Vec<Connection>]) -> String {
    lets.iter().map(|l| let_format(l)).collect()
}
