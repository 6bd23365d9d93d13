// subst.rs — `$name` argument substitution from enclosing graph arguments
//
// Object arguments inside an abstraction may reference the abstraction's own
// arguments as `$name`. Uses the `logos` crate to split argument strings
// into literal text and references.
//
// Preconditions: graph arguments are already resolved against their schema.
// Postconditions: a value that is exactly one reference takes the referenced
//                 value with its type; embedded references are replaced
//                 textually.
// Failure modes: a reference that cannot be resolved leaves the argument
//                unresolved (the caller drops it with a warning).
// Side effects: none.

use logos::Logos;
use serde_json::Value;

use crate::value::Args;

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
enum Piece {
    #[regex(r"\$[A-Za-z0-9_]+")]
    Reference,
    #[regex(r"[^$]+")]
    Text,
    #[token("$")]
    Dollar,
}

/// Outcome of substituting one argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum Substituted {
    Value(Value),
    /// The value still references something; carries the first offending name.
    Unresolved(String),
}

/// Substitute graph arguments into a single argument value.
/// Only strings are rewritten; other values are returned unchanged.
pub fn substitute(value: &Value, graph_args: &Args) -> Substituted {
    let Value::String(text) = value else {
        return Substituted::Value(value.clone());
    };
    if !text.contains('$') {
        return Substituted::Value(value.clone());
    }

    let pieces: Vec<(Piece, &str)> = Piece::lexer(text)
        .spanned()
        .map(|(piece, range)| (piece.unwrap_or(Piece::Text), &text[range]))
        .collect();

    if let [(Piece::Reference, slice)] = pieces.as_slice() {
        let name = &slice[1..];
        return match graph_args.get(name) {
            Some(v) if !v.is_null() => Substituted::Value(v.clone()),
            _ => Substituted::Unresolved(name.to_string()),
        };
    }

    let mut out = String::with_capacity(text.len());
    for (piece, slice) in pieces {
        match piece {
            Piece::Reference => {
                let name = &slice[1..];
                match graph_args.get(name) {
                    Some(v) if !v.is_null() => out.push_str(&render(v)),
                    _ => return Substituted::Unresolved(name.to_string()),
                }
            }
            Piece::Dollar => return Substituted::Unresolved(String::from("$")),
            Piece::Text => out.push_str(slice),
        }
    }
    Substituted::Value(Value::String(out))
}

/// Substitute every argument of an object. Returns the surviving arguments
/// and the names of arguments dropped because a reference stayed unresolved.
pub fn substitute_args(args: &Args, graph_args: &Args) -> (Args, Vec<(String, String)>) {
    let mut out = Args::new();
    let mut dropped = Vec::new();
    for (key, value) in args {
        match substitute(value, graph_args) {
            Substituted::Value(v) => {
                out.insert(key.clone(), v);
            }
            Substituted::Unresolved(name) => dropped.push((key.clone(), name)),
        }
    }
    (out, dropped)
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(render).collect::<Vec<_>>().join(" "),
        other => other.to_string(),
    }
}
