// loader.rs — Build a `Patch` from high-level graph documents
//
// Walks a document and its abstractions depth first. Graph arguments are
// resolved against the embedding object's arguments, object arguments are
// `$`-substituted and resolved against their catalog schema, and connections
// are installed verbatim with their declared kind.
//
// Preconditions: none.
// Postconditions: every object of every loaded document is a member of its
//                 graph; every declared connection is installed.
// Failure modes: unreadable or malformed document → E0115; duplicate id →
//                E0103; abstraction recursion → E0108; unknown type → E0109;
//                bad connection → E0110; argument errors → E0101/E0102.
// Side effects: reads abstraction files from disk.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, trace};

use crate::catalog::{IrOp, LangOp};
use crate::connection::Connection;
use crate::diag::{codes, CompileError, Diagnostic};
use crate::doc::{object_type, DocAnnotations, GraphDoc, ObjectDecl};
use crate::graph::Patch;
use crate::id::NodeId;
use crate::node::{Annotations, NodeKind};
use crate::pipeline::CompileOptions;
use crate::scope::Visibility;
use crate::subst::substitute_args;
use crate::value::{resolve_args, rules_of, Args};

const DEFAULT_NAME: &str = "heavy";

/// Load a document file and every abstraction it references.
pub fn load_file(path: &Path, options: &CompileOptions) -> Result<Patch, CompileError> {
    let text = fs::read_to_string(path).map_err(|e| unreadable(path, &e.to_string()))?;
    load_str(&text, Some(path), options)
}

/// Load a document from its text. `path` locates relative imports.
pub fn load_str(text: &str, path: Option<&Path>, options: &CompileOptions) -> Result<Patch, CompileError> {
    let doc = GraphDoc::from_json(text).map_err(|e| malformed(path, &e))?;
    load_document(&doc, path, options)
}

/// Load an already parsed document.
pub fn load_document(doc: &GraphDoc, path: Option<&Path>, options: &CompileOptions) -> Result<Patch, CompileError> {
    let name = options
        .name
        .clone()
        .or_else(|| doc.annotations.name.clone())
        .or_else(|| doc.name.clone())
        .unwrap_or_else(|| DEFAULT_NAME.to_string());
    let mut patch = Patch::new(&name);
    let file = path.map(canonical);
    let root = patch.root();
    if let Some(g) = patch.graph_data_mut(root) {
        g.file = file.clone();
    }

    let mut loader = Loader {
        patch: &mut patch,
        options,
        stack: file.iter().cloned().collect(),
    };
    loader.fill_graph(root, doc, &Args::new(), file.as_deref())?;
    debug!(nodes = patch.len(), "loaded patch \"{}\"", name);
    Ok(patch)
}

struct Loader<'a> {
    patch: &'a mut Patch,
    options: &'a CompileOptions,
    /// Abstraction files currently being loaded.
    stack: Vec<PathBuf>,
}

impl Loader<'_> {
    fn fill_graph(&mut self, graph: NodeId, doc: &GraphDoc, given: &Args, file: Option<&Path>) -> Result<(), CompileError> {
        let xname = self.patch.xname_of(graph).to_string();
        let resolved = resolve_args(&doc.arg_rules(), given, &format!("graph {xname}"))?;
        for w in resolved.warnings {
            self.patch.push_notice(w);
        }
        self.patch[graph].args = resolved.args;

        let dir = file.and_then(Path::parent).map(Path::to_path_buf);
        if let Some(g) = self.patch.graph_data_mut(graph) {
            for import in &doc.imports {
                let p = PathBuf::from(import);
                g.scope.import_paths.push(match &dir {
                    Some(d) if p.is_relative() => d.join(p),
                    _ => p,
                });
            }
            g.scope.import_paths.extend(dir.clone());
        }

        if let Some(dup) = doc.objects.duplicates.first() {
            return Err(CompileError::new(
                Diagnostic::error(codes::E0103, format!("duplicate object id \"{dup}\" in graph"))
                    .with_origin(xname),
            ));
        }

        let mut ids: HashMap<&str, NodeId> = HashMap::new();
        for (obj_id, body) in &doc.objects.entries {
            let Some(obj_type) = object_type(body) else {
                return Err(malformed_object(obj_id, &xname, "missing \"type\""));
            };
            let node = match obj_type {
                "comment" => continue,
                "graph" => self.inline_graph(graph, obj_id, body, file)?,
                _ => {
                    let decl: ObjectDecl = serde_json::from_value(body.clone())
                        .map_err(|e| malformed_object(obj_id, &xname, &e.to_string()))?;
                    self.object(graph, obj_id, &decl)?
                }
            };
            trace!(id = obj_id.as_str(), "loaded {}", obj_type);
            ids.insert(obj_id.as_str(), node);
        }

        for c in &doc.connections {
            let (Some(&from), Some(&to)) = (ids.get(c.from.id.as_str()), ids.get(c.to.id.as_str())) else {
                return Err(CompileError::new(
                    Diagnostic::error(
                        codes::E0110,
                        format!("connection from \"{}\" to \"{}\" names an unknown object", c.from.id, c.to.id),
                    )
                    .with_origin(xname),
                ));
            };
            self.patch
                .connect(Connection::new(from, c.from.outlet, to, c.to.inlet, c.kind))?;
        }
        Ok(())
    }

    fn inline_graph(&mut self, parent: NodeId, obj_id: &str, body: &Value, file: Option<&Path>) -> Result<NodeId, CompileError> {
        let parent_name = self.patch.xname_of(parent).to_string();
        let sub_doc = GraphDoc::from_value(body.clone())
            .map_err(|e| malformed_object(obj_id, &parent_name, &e.to_string()))?;
        let xname = sub_doc.annotations.name.clone().unwrap_or(parent_name);
        let sub = self.patch.new_graph(&xname, file.map(Path::to_path_buf), Args::new());
        self.patch[sub].annotations = self.annotations(sub, &sub_doc.annotations);
        self.patch.add_to_graph(parent, sub, true)?;
        let inherited = self.patch[parent].args.clone();
        self.fill_graph(sub, &sub_doc, &inherited, file)?;
        Ok(sub)
    }

    fn object(&mut self, graph: NodeId, obj_id: &str, decl: &ObjectDecl) -> Result<NodeId, CompileError> {
        let xname = self.patch.xname_of(graph).to_string();
        let origin = format!("{} {} in {}", decl.obj_type, obj_id, xname);
        let graph_args = self.patch[graph].args.clone();
        let (args, dropped) = substitute_args(&decl.args, &graph_args);
        for (key, name) in dropped {
            self.patch.push_notice(
                Diagnostic::warning(
                    codes::W0102,
                    format!("argument \"{key}\" references unresolved \"${name}\" and is dropped"),
                )
                .with_origin(origin.clone()),
            );
        }

        let native = native_kind(&decl.obj_type);
        if let Some(path) = self.find_abstraction(graph, &decl.obj_type) {
            if !self.stack.contains(&path) {
                return self.abstraction(graph, &path, decl, args);
            }
            if native.is_none() {
                return Err(CompileError::new(
                    Diagnostic::error(
                        codes::E0108,
                        format!("abstraction \"{}\" includes itself", decl.obj_type),
                    )
                    .with_origin(path.display().to_string()),
                ));
            }
        }

        let node = match native {
            Some(NodeKind::Lang(op)) => {
                let resolved = resolve_args(&rules_of(op.spec().args), &args, &origin)?;
                for w in resolved.warnings {
                    self.patch.push_notice(w);
                }
                self.patch.alloc(NodeKind::Lang(op), resolved.args, Annotations::default())
            }
            Some(NodeKind::Ir(op)) => self.patch.new_ir(op, args)?,
            _ => {
                return Err(CompileError::new(
                    Diagnostic::error(codes::E0109, format!("object type \"{}\" cannot be found", decl.obj_type))
                        .with_origin(origin),
                ));
            }
        };
        self.patch[node].annotations = self.annotations(node, &decl.annotations);
        self.patch.add_to_graph(graph, node, true)?;
        Ok(node)
    }

    fn abstraction(&mut self, parent: NodeId, path: &Path, decl: &ObjectDecl, args: Args) -> Result<NodeId, CompileError> {
        let text = fs::read_to_string(path).map_err(|e| unreadable(path, &e.to_string()))?;
        let doc = GraphDoc::from_json(&text).map_err(|e| malformed(Some(path), &e))?;
        let xname = doc.annotations.name.clone().unwrap_or_else(|| decl.obj_type.clone());
        let sub = self.patch.new_graph(&xname, Some(path.to_path_buf()), Args::new());
        self.patch[sub].annotations = self.annotations(sub, &decl.annotations);
        self.patch.add_to_graph(parent, sub, true)?;

        debug!(path = %path.display(), "loading abstraction {}", decl.obj_type);
        self.stack.push(path.to_path_buf());
        let filled = self.fill_graph(sub, &doc, &args, Some(path));
        self.stack.pop();
        filled?;
        Ok(sub)
    }

    /// `<type>.hv.json` in the scope's import paths, then the configured ones.
    fn find_abstraction(&self, graph: NodeId, obj_type: &str) -> Option<PathBuf> {
        let file_name = format!("{obj_type}.hv.json");
        self.patch
            .import_paths(graph)
            .iter()
            .chain(self.options.import_paths.iter())
            .map(|dir| dir.join(&file_name))
            .find(|p| p.is_file())
            .map(|p| canonical(&p))
    }

    fn annotations(&mut self, node: NodeId, decl: &DocAnnotations) -> Annotations {
        let scope = match decl.scope.as_deref() {
            None => Visibility::Private,
            Some(s) => Visibility::from_annotation(s).unwrap_or_else(|| {
                self.patch
                    .warn(node, codes::W0104, format!("unknown scope \"{s}\" ignored"));
                Visibility::Private
            }),
        };
        Annotations {
            scope,
            is_static: decl.is_static,
        }
    }
}

/// The built-in kind for a document type name, if there is one.
fn native_kind(obj_type: &str) -> Option<NodeKind> {
    match obj_type {
        "inlet" | "__inlet" => Some(NodeKind::Ir(IrOp::Inlet)),
        "outlet" | "__outlet" => Some(NodeKind::Ir(IrOp::Outlet)),
        _ => LangOp::from_type(obj_type)
            .map(NodeKind::Lang)
            .or_else(|| IrOp::from_tag(obj_type).map(NodeKind::Ir)),
    }
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn unreadable(path: &Path, reason: &str) -> CompileError {
    CompileError::new(
        Diagnostic::error(codes::E0115, format!("cannot read document: {reason}"))
            .with_origin(path.display().to_string()),
    )
}

fn malformed(path: Option<&Path>, err: &serde_json::Error) -> CompileError {
    let d = Diagnostic::error(codes::E0115, format!("malformed document: {err}"));
    CompileError::new(match path {
        Some(p) => d.with_origin(p.display().to_string()),
        None => d,
    })
}

fn malformed_object(obj_id: &str, graph: &str, reason: &str) -> CompileError {
    CompileError::new(
        Diagnostic::error(codes::E0115, format!("malformed object \"{obj_id}\": {reason}")).with_origin(graph),
    )
}
