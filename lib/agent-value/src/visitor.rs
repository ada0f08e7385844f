use crate::location::LocationType;
use crate::value::Value;

/// Path-and-location context carried to each node visited (spec.md §9
/// Design Note: "the visitor need not be reflection-based").
#[derive(Clone, Debug)]
pub struct VisitContext<'a> {
    /// Segment names from the tree root to this node's parent.
    pub path: Vec<String>,
    /// The location this node's subtree root was parsed from.
    pub location: LocationType,
    /// The field name under which this node is stored in its parent
    /// object, if any (spec.md §4.5 rule 3 keys off this, lowercased).
    pub parent_field: Option<&'a str>,
}

impl<'a> VisitContext<'a> {
    pub fn root(location: LocationType) -> Self {
        Self {
            path: Vec::new(),
            location,
            parent_field: None,
        }
    }

    fn child(&self, field: Option<&'a str>) -> VisitContext<'a> {
        let mut path = self.path.clone();
        if let Some(f) = field {
            path.push(f.to_string());
        }
        VisitContext {
            path,
            location: self.location,
            parent_field: field,
        }
    }
}

/// What the visitor decided to do at one node (spec.md §4.5: "the
/// redactor decides among {continue, replace primitive with the literal
/// string, descend-and-replace-all-primitives-in-subtree, skip
/// children}").
pub enum Action {
    /// Recurse into this node's children (or leave a primitive
    /// untouched) with no change at this node.
    Continue,
    /// Replace this primitive node's value in place. Invalid on a
    /// struct/list/null node.
    ReplacePrimitive(Value),
    /// Replace every primitive in this node's subtree (including itself
    /// if primitive) and do not descend any further.
    ReplaceSubtreeAndSkip,
    /// Leave this node exactly as-is and do not descend into it.
    SkipChildren,
}

/// A visitor over the typed value tree, consulted once per node in
/// pre-order. Implementations decide per-node via [`Action`]; `walk`
/// performs the actual tree mutation and recursion so visitors stay
/// free of traversal bookkeeping.
pub trait Visitor {
    fn decide(&self, node: &Value, ctx: &VisitContext<'_>) -> Action;

    /// The marker substituted by `Action::ReplacePrimitive`'s caller and
    /// by `ReplaceSubtreeAndSkip`, when the visitor doesn't supply one
    /// directly via `ReplacePrimitive`. Only the Redactor uses this;
    /// the Zero-Obfuscator never returns `ReplaceSubtreeAndSkip`.
    fn subtree_marker(&self) -> &str {
        "*REDACTED*"
    }
}

/// Walks `node` in pre-order, applying `visitor`'s decision at each
/// step. `location` is the location type of the subtree root (a fresh
/// call site per top-level field — e.g. once for headers, once for
/// cookies — since a method tree's location tag is assigned at the
/// point a sub-tree is attached, not per-node).
pub fn walk(node: &mut Value, visitor: &impl Visitor, location: LocationType) {
    walk_inner(node, visitor, &VisitContext::root(location));
}

fn walk_inner(node: &mut Value, visitor: &impl Visitor, ctx: &VisitContext<'_>) {
    match visitor.decide(node, ctx) {
        Action::Continue => descend(node, visitor, ctx),
        Action::ReplacePrimitive(replacement) => {
            if node.is_primitive() {
                *node = replacement;
            }
        }
        Action::ReplaceSubtreeAndSkip => {
            node.redact_all_primitives(visitor.subtree_marker());
        }
        Action::SkipChildren => {}
    }
}

fn descend(node: &mut Value, visitor: &impl Visitor, ctx: &VisitContext<'_>) {
    match node {
        Value::Object(map) => {
            for (field, child) in map.iter_mut() {
                let child_ctx = ctx.child(Some(field.as_str()));
                walk_inner(child, visitor, &child_ctx);
            }
        }
        Value::Array(items) => {
            for child in items.iter_mut() {
                let child_ctx = ctx.child(None);
                walk_inner(child, visitor, &child_ctx);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    struct ReplaceEverything;
    impl Visitor for ReplaceEverything {
        fn decide(&self, node: &Value, _ctx: &VisitContext<'_>) -> Action {
            if node.is_primitive() {
                Action::ReplacePrimitive(Value::from("x"))
            } else {
                Action::Continue
            }
        }
    }

    #[test]
    fn walk_visits_every_primitive() {
        let mut tree = Value::Object(BTreeMap::from([
            ("a".to_string(), Value::Integer(1)),
            (
                "b".to_string(),
                Value::Array(vec![Value::Boolean(true), Value::from("y")]),
            ),
        ]));
        walk(&mut tree, &ReplaceEverything, LocationType::Body);

        match tree {
            Value::Object(map) => {
                assert_eq!(map["a"], Value::from("x"));
                match &map["b"] {
                    Value::Array(items) => {
                        assert!(items.iter().all(|v| v == &Value::from("x")));
                    }
                    other => panic!("expected array, got {other:?}"),
                }
            }
            other => panic!("expected object, got {other:?}"),
        }
    }

    struct SkipArrays;
    impl Visitor for SkipArrays {
        fn decide(&self, node: &Value, _ctx: &VisitContext<'_>) -> Action {
            if matches!(node, Value::Array(_)) {
                Action::SkipChildren
            } else if node.is_primitive() {
                Action::ReplacePrimitive(Value::from("x"))
            } else {
                Action::Continue
            }
        }
    }

    #[test]
    fn skip_children_leaves_subtree_untouched() {
        let mut tree = Value::Object(BTreeMap::from([(
            "arr".to_string(),
            Value::Array(vec![Value::Integer(7)]),
        )]));
        walk(&mut tree, &SkipArrays, LocationType::Body);

        match tree {
            Value::Object(map) => {
                assert_eq!(map["arr"], Value::Array(vec![Value::Integer(7)]));
            }
            other => panic!("expected object, got {other:?}"),
        }
    }
}
