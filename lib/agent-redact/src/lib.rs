//! The Redactor and Zero-Obfuscator (spec.md §4.5): a visitor over the
//! typed method tree guided by field-name and regex policy, plus a
//! distinct zero-out policy used when the payload must not leave the
//! host at all.

mod policy;
mod redactor;
mod zero;

pub use policy::{PolicyError, PolicyStore, RedactionPolicy};
pub use redactor::{redact_method_tree, redact_path_template};
pub use zero::zero_method_tree;
