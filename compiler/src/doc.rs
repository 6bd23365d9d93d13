// doc.rs — High-level graph document model
//
// Serde model of the patch document consumed by the loader:
// `{name, args, imports, objects, connections, annotations}`. Objects are kept
// in document order; a repeated object id is recorded rather than silently
// overwritten. Inline sub-graphs are objects of type `"graph"` whose body is
// itself a document.

use std::fmt;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::Value;

use crate::connection::ConnKind;
use crate::value::{ArgRule, Args, ValueType};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphDoc {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub args: Vec<ArgDecl>,
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub objects: ObjectTable,
    #[serde(default)]
    pub connections: Vec<ConnDecl>,
    #[serde(default)]
    pub annotations: DocAnnotations,
}

impl GraphDoc {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Argument schema declared by this graph.
    pub fn arg_rules(&self) -> Vec<ArgRule> {
        self.args.iter().map(ArgDecl::rule).collect()
    }
}

/// One declared graph argument.
#[derive(Debug, Clone, Deserialize)]
pub struct ArgDecl {
    pub name: String,
    #[serde(default = "ArgDecl::untyped")]
    pub value_type: ValueType,
    #[serde(default)]
    pub default: Value,
    #[serde(default)]
    pub required: bool,
}

impl ArgDecl {
    fn untyped() -> ValueType {
        ValueType::Any
    }

    pub fn rule(&self) -> ArgRule {
        ArgRule {
            name: self.name.clone(),
            ty: Some(self.value_type),
            default: self.default.clone(),
            required: self.required,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DocAnnotations {
    /// Display name of a graph.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default, rename = "static")]
    pub is_static: bool,
}

/// A non-graph object entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectDecl {
    #[serde(rename = "type")]
    pub obj_type: String,
    #[serde(default)]
    pub args: Args,
    #[serde(default)]
    pub annotations: DocAnnotations,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnDecl {
    pub from: FromEnd,
    pub to: ToEnd,
    #[serde(rename = "type")]
    pub kind: ConnKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FromEnd {
    pub id: String,
    pub outlet: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToEnd {
    pub id: String,
    pub inlet: usize,
}

// ── Ordered object table ────────────────────────────────────────────────────

/// Objects in document order. The body of each entry stays untyped until the
/// loader knows whether it is a sub-graph or a plain object.
#[derive(Debug, Clone, Default)]
pub struct ObjectTable {
    pub entries: Vec<(String, Value)>,
    /// Ids that appeared more than once (the first occurrence is kept).
    pub duplicates: Vec<String>,
}

impl ObjectTable {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'de> Deserialize<'de> for ObjectTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = ObjectTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of object ids to objects")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<ObjectTable, A::Error> {
                let mut table = ObjectTable::default();
                while let Some((id, body)) = map.next_entry::<String, Value>()? {
                    if !body.is_object() {
                        return Err(de::Error::custom(format!("object \"{id}\" is not a map")));
                    }
                    if table.entries.iter().any(|(k, _)| *k == id) {
                        table.duplicates.push(id);
                    } else {
                        table.entries.push((id, body));
                    }
                }
                Ok(table)
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

/// The `type` field of an object body.
pub fn object_type(body: &Value) -> Option<&str> {
    body.get("type").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objects_keep_document_order() {
        let doc = GraphDoc::from_json(
            r#"{
                "objects": {
                    "z": {"type": "+", "args": {"k": 1}},
                    "a": {"type": "print"},
                    "m": {"type": "comment"}
                },
                "connections": [
                    {"from": {"id": "z", "outlet": 0}, "to": {"id": "a", "inlet": 0}, "type": "-->"}
                ]
            }"#,
        )
        .unwrap();
        let ids: Vec<_> = doc.objects.entries.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["z", "a", "m"]);
        assert_eq!(doc.connections[0].kind, ConnKind::Control);
        assert!(doc.objects.duplicates.is_empty());
    }

    #[test]
    fn repeated_ids_are_recorded() {
        let doc = GraphDoc::from_json(
            r#"{"objects": {"a": {"type": "print"}, "a": {"type": "+"}}}"#,
        )
        .unwrap();
        assert_eq!(doc.objects.len(), 1);
        assert_eq!(doc.objects.duplicates, ["a"]);
        assert_eq!(object_type(&doc.objects.entries[0].1), Some("print"));
    }

    #[test]
    fn graph_arguments_and_annotations() {
        let doc = GraphDoc::from_json(
            r#"{
                "args": [
                    {"name": "freq", "value_type": "float", "default": 440.0, "required": false},
                    {"name": "label", "value_type": "auto", "default": null, "required": true}
                ],
                "annotations": {"name": "osc", "scope": "public", "static": true}
            }"#,
        )
        .unwrap();
        let rules = doc.arg_rules();
        assert_eq!(rules[0].ty, Some(ValueType::Float));
        assert_eq!(rules[1].ty, Some(ValueType::Any));
        assert!(rules[1].required);
        assert_eq!(doc.annotations.name.as_deref(), Some("osc"));
        assert!(doc.annotations.is_static);
    }

    #[test]
    fn malformed_objects_are_rejected() {
        assert!(GraphDoc::from_json(r#"{"objects": {"a": 3}}"#).is_err());
        assert!(GraphDoc::from_json(
            r#"{"connections": [{"from": {"id": "a", "outlet": 0}, "to": {"id": "b", "inlet": 0}, "type": "=>"}]}"#
        )
        .is_err());
    }
}
