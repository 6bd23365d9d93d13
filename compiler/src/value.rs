// value.rs — Argument schemas, defaults, and type coercion
//
// Every object type declares an argument schema (name, value type, default,
// required-ness). Resolving an argument dictionary against a schema fills
// defaults and coerces values. Arguments outside the schema pass through
// untouched.
//
// Preconditions: none.
// Postconditions: resolved dictionaries contain every schema argument.
// Failure modes: missing required argument → E0101; unconvertible required
//                argument → E0102. Unconvertible optional arguments fall back
//                to their default with a W0101 warning.
// Side effects: none.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diag::{codes, CompileError, Diagnostic};

/// Argument dictionary of a node.
pub type Args = serde_json::Map<String, Value>;

// ── Value types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "int")]
    Int,
    #[serde(rename = "string")]
    String,
    #[serde(rename = "boolean", alias = "bool")]
    Boolean,
    #[serde(rename = "floatarray")]
    FloatArray,
    #[serde(rename = "intarray")]
    IntArray,
    #[serde(rename = "stringarray")]
    StringArray,
    /// Accept the value as given (`auto`, or any unrecognized tag).
    #[serde(other)]
    Any,
}

/// Static default value of a catalog argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArgDefault {
    Null,
    Float(f64),
    Int(i64),
    Str(&'static str),
    Bool(bool),
    FloatList(&'static [f64]),
    IntList(&'static [i64]),
    EmptyMap,
}

impl ArgDefault {
    pub fn to_value(self) -> Value {
        match self {
            ArgDefault::Null => Value::Null,
            ArgDefault::Float(f) => Value::from(f),
            ArgDefault::Int(i) => Value::from(i),
            ArgDefault::Str(s) => Value::from(s),
            ArgDefault::Bool(b) => Value::Bool(b),
            ArgDefault::FloatList(l) => Value::Array(l.iter().map(|&f| Value::from(f)).collect()),
            ArgDefault::IntList(l) => Value::Array(l.iter().map(|&i| Value::from(i)).collect()),
            ArgDefault::EmptyMap => Value::Object(Args::new()),
        }
    }
}

// ── Schemas ─────────────────────────────────────────────────────────────────

/// One entry of a catalog argument schema.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub ty: Option<ValueType>,
    pub default: ArgDefault,
    pub required: bool,
}

impl ArgSpec {
    pub const fn float(name: &'static str, default: f64) -> Self {
        Self::optional(name, Some(ValueType::Float), ArgDefault::Float(default))
    }

    pub const fn int(name: &'static str, default: i64) -> Self {
        Self::optional(name, Some(ValueType::Int), ArgDefault::Int(default))
    }

    pub const fn required_int(name: &'static str) -> Self {
        Self::required(name, Some(ValueType::Int))
    }

    pub const fn string(name: &'static str, default: &'static str) -> Self {
        Self::optional(name, Some(ValueType::String), ArgDefault::Str(default))
    }

    pub const fn optional_string(name: &'static str) -> Self {
        Self::optional(name, Some(ValueType::String), ArgDefault::Null)
    }

    pub const fn required_string(name: &'static str) -> Self {
        Self::required(name, Some(ValueType::String))
    }

    pub const fn boolean(name: &'static str, default: bool) -> Self {
        Self::optional(name, Some(ValueType::Boolean), ArgDefault::Bool(default))
    }

    pub const fn float_array(name: &'static str, default: &'static [f64]) -> Self {
        Self::optional(name, Some(ValueType::FloatArray), ArgDefault::FloatList(default))
    }

    pub const fn int_array(name: &'static str, default: &'static [i64]) -> Self {
        Self::optional(name, Some(ValueType::IntArray), ArgDefault::IntList(default))
    }

    pub const fn required_string_array(name: &'static str) -> Self {
        Self::required(name, Some(ValueType::StringArray))
    }

    /// Untyped argument passed through as given.
    pub const fn any(name: &'static str, default: ArgDefault) -> Self {
        Self::optional(name, None, default)
    }

    const fn optional(name: &'static str, ty: Option<ValueType>, default: ArgDefault) -> Self {
        Self {
            name,
            ty,
            default,
            required: false,
        }
    }

    const fn required(name: &'static str, ty: Option<ValueType>) -> Self {
        Self {
            name,
            ty,
            default: ArgDefault::Null,
            required: true,
        }
    }

    pub fn rule(&self) -> ArgRule {
        ArgRule {
            name: self.name.to_string(),
            ty: self.ty,
            default: self.default.to_value(),
            required: self.required,
        }
    }
}

/// Owned schema entry, as declared by catalog specs or by graph documents.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgRule {
    pub name: String,
    pub ty: Option<ValueType>,
    pub default: Value,
    pub required: bool,
}

pub fn rules_of(specs: &[ArgSpec]) -> Vec<ArgRule> {
    specs.iter().map(ArgSpec::rule).collect()
}

// ── Coercion ────────────────────────────────────────────────────────────────

/// Coerce `value` to `ty`, or describe why it cannot be.
pub fn coerce(ty: ValueType, value: &Value) -> Result<Value, String> {
    match ty {
        ValueType::Float => to_f64(value).map(Value::from),
        ValueType::Int => to_i64(value).map(Value::from),
        ValueType::String => to_text(value).map(Value::String),
        ValueType::Boolean => Ok(Value::Bool(to_bool(value))),
        ValueType::FloatArray => elements(value)?
            .iter()
            .map(|v| to_f64(v).map(Value::from))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        ValueType::IntArray => elements(value)?
            .iter()
            .map(|v| to_i64(v).map(Value::from))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        ValueType::StringArray => elements(value)?
            .iter()
            .map(|v| to_text(v).map(Value::String))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        ValueType::Any => Ok(value.clone()),
    }
}

fn to_f64(value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("{n} is not a float")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("\"{s}\" is not a float")),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        other => Err(format!("{other} is not a float")),
    }
}

/// Integers truncate toward zero, from numbers and numeric strings alike.
fn to_i64(value: &Value) -> Result<i64, String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .ok_or_else(|| format!("{n} is not an int")),
        Value::String(s) => {
            let t = s.trim();
            t.parse::<i64>()
                .or_else(|_| t.parse::<f64>().map(|f| f.trunc() as i64))
                .map_err(|_| format!("\"{s}\" is not an int"))
        }
        Value::Bool(b) => Ok(i64::from(*b)),
        other => Err(format!("{other} is not an int")),
    }
}

fn to_text(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("{other} is not a string")),
    }
}

/// `false`, `f` and `0` (in any case) are false; every other string is true.
fn to_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => !matches!(s.trim().to_lowercase().as_str(), "false" | "f" | "0"),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Null => false,
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Arrays come either as JSON lists or as whitespace-separated strings.
fn elements(value: &Value) -> Result<Vec<Value>, String> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::String(s) => Ok(s
            .split_whitespace()
            .map(|w| Value::String(w.to_string()))
            .collect()),
        other => Err(format!("{other} is not an array")),
    }
}

// ── Resolution against a schema ─────────────────────────────────────────────

/// Resolved arguments plus the warnings produced while resolving them.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedArgs {
    pub args: Args,
    pub warnings: Vec<Diagnostic>,
}

/// Fill defaults and coerce `given` against `rules`.
///
/// `origin` names the object (or graph) the arguments belong to.
pub fn resolve_args(
    rules: &[ArgRule],
    given: &Args,
    origin: &str,
) -> Result<ResolvedArgs, CompileError> {
    let mut args = given.clone();
    let mut warnings = Vec::new();

    for rule in rules {
        let value = match given.get(&rule.name) {
            Some(v) if !v.is_null() => v,
            _ => {
                if rule.required {
                    return Err(Diagnostic::error(
                        codes::E0101,
                        format!("required argument \"{}\" not present", rule.name),
                    )
                    .with_origin(origin)
                    .into());
                }
                args.insert(rule.name.clone(), rule.default.clone());
                continue;
            }
        };

        let Some(ty) = rule.ty else { continue };
        match coerce(ty, value) {
            Ok(v) => {
                args.insert(rule.name.clone(), v);
            }
            Err(reason) if rule.required => {
                return Err(Diagnostic::error(
                    codes::E0102,
                    format!("cannot convert required argument \"{}\": {}", rule.name, reason),
                )
                .with_origin(origin)
                .into());
            }
            Err(reason) => {
                warnings.push(
                    Diagnostic::warning(
                        codes::W0101,
                        format!(
                            "argument \"{}\" falls back to its default {}: {}",
                            rule.name, rule.default, reason
                        ),
                    )
                    .with_origin(origin),
                );
                args.insert(rule.name.clone(), rule.default.clone());
            }
        }
    }

    Ok(ResolvedArgs { args, warnings })
}
