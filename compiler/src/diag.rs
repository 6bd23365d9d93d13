// diag.rs — Diagnostics model shared by the loader and every compiler pass
//
// Warnings are collected on the patch in emission order and reported
// together. Errors are fatal: the first one aborts compilation and carries
// a snapshot of every notice collected up to that point.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0104`, `W0102`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code keeps its meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod codes {
    use super::DiagCode;

    pub const E0101: DiagCode = DiagCode("E0101"); // missing required argument
    pub const E0102: DiagCode = DiagCode("E0102"); // unconvertible required argument
    pub const E0103: DiagCode = DiagCode("E0103"); // duplicate object id
    pub const E0104: DiagCode = DiagCode("E0104"); // unresolved named reference
    pub const E0105: DiagCode = DiagCode("E0105"); // unresolvable connection type
    pub const E0106: DiagCode = DiagCode("E0106"); // unsupported connection format
    pub const E0107: DiagCode = DiagCode("E0107"); // conflicting receiver attributes
    pub const E0108: DiagCode = DiagCode("E0108"); // abstraction recursion
    pub const E0109: DiagCode = DiagCode("E0109"); // unknown object type
    pub const E0110: DiagCode = DiagCode("E0110"); // invalid connection
    pub const E0111: DiagCode = DiagCode("E0111"); // invalid extern name
    pub const E0112: DiagCode = DiagCode("E0112"); // several signal inputs on one inlet
    pub const E0113: DiagCode = DiagCode("E0113"); // buffer pool inconsistency
    pub const E0114: DiagCode = DiagCode("E0114"); // duplicate unique named object
    pub const E0115: DiagCode = DiagCode("E0115"); // unreadable or malformed document
    pub const E0116: DiagCode = DiagCode("E0116"); // signal feedback cycle

    pub const W0101: DiagCode = DiagCode("W0101"); // optional argument fell back to default
    pub const W0102: DiagCode = DiagCode("W0102"); // unresolved `$` argument dropped
    pub const W0103: DiagCode = DiagCode("W0103"); // unconnected send/receive removed
    pub const W0104: DiagCode = DiagCode("W0104"); // argument ignored
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A diagnostic emitted while loading or preparing a patch.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    /// The node (`<type> <id> in <graph>`) or file this notice is about.
    pub origin: Option<String>,
    pub message: String,
    pub hint: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, origin, or hint.
    pub fn new(level: DiagLevel, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            origin: None,
            message: message.into(),
            hint: None,
        }
    }

    pub fn error(code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, message).with_code(code)
    }

    pub fn warning(code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, message).with_code(code)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Name the node or file the diagnostic originates from.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        if let Some(origin) = &self.origin {
            write!(f, "\n  --> {}", origin)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

// ── Notices ──────────────────────────────────────────────────────────────

/// Every warning and error collected during a compile, in emission order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Notices {
    pub entries: Vec<Diagnostic>,
}

impl Notices {
    pub fn new(entries: Vec<Diagnostic>) -> Self {
        Self { entries }
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.level == DiagLevel::Warning)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.level == DiagLevel::Error)
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(Diagnostic::is_error)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Fatal error ──────────────────────────────────────────────────────────

/// A fatal compile error: the failing diagnostic plus the notices collected
/// before it (the failing diagnostic is always the last entry).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{diagnostic}")]
pub struct CompileError {
    pub diagnostic: Box<Diagnostic>,
    pub notices: Notices,
}

impl CompileError {
    pub fn new(diagnostic: Diagnostic) -> Self {
        Self {
            notices: Notices::new(vec![diagnostic.clone()]),
            diagnostic: Box::new(diagnostic),
        }
    }

    pub fn code(&self) -> Option<DiagCode> {
        self.diagnostic.code
    }

    /// Replace the snapshot with `collected` followed by the failing diagnostic.
    pub fn with_snapshot(mut self, collected: &[Diagnostic]) -> Self {
        let mut entries = collected.to_vec();
        if entries.last() != Some(&*self.diagnostic) {
            entries.push((*self.diagnostic).clone());
        }
        self.notices = Notices::new(entries);
        self
    }

    /// Render every notice of the snapshot, one per paragraph.
    pub fn report(&self) -> String {
        self.notices
            .entries
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<Diagnostic> for CompileError {
    fn from(diagnostic: Diagnostic) -> Self {
        Self::new(diagnostic)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
