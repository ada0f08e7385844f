//! A nested, typed value tree with runtime-tagged variants (primitive /
//! struct / list / none), plus a visitor that carries path-and-location
//! context. This is the substrate the Redactor and Zero-Obfuscator
//! traverse (spec.md §4.5) and the representation used for a witness's
//! method tree (headers, query, cookies, auth, body, path template).
//!
//! A plain tagged union trimmed to what a method tree needs: no
//! path-lookup DSL, no lua/graphql bridges, no regex-as-value variant.

mod location;
mod value;
mod visitor;

pub use location::LocationType;
pub use value::Value;
pub use visitor::{walk, Action, VisitContext, Visitor};
