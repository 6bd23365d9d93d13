// patchc — Patch compiler middle tier
//
// Library root. Loading, the graph passes, scheduling and IR output are
// exposed as modules; `pipeline` ties them together.

pub mod buffer;
pub mod catalog;
pub mod connection;
pub mod diag;
pub mod doc;
pub mod graph;
pub mod hash;
pub mod id;
pub mod ir;
pub mod loader;
pub mod node;
pub mod pass;
pub mod pipeline;
pub mod reduce;
pub mod rewrite;
pub mod routing;
pub mod schedule;
pub mod scope;
pub mod subst;
pub mod type_resolve;
pub mod value;
