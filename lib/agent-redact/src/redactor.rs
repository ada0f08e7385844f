use insights_agent_value::{walk, Action, LocationType, Value, VisitContext, Visitor};
use insights_agent_witness::MethodTree;

use crate::policy::RedactionPolicy;

/// Visitor implementing the Redactor's rule order (spec.md §4.5):
///
/// 1. `AUTH`/`COOKIE` subtree -> replace every primitive, skip children.
/// 2. Primitive matching a sensitive-value regex -> replace, skip.
/// 3. Parent field name (lowercased) in the sensitive-key set ->
///    replace every primitive in the subtree, skip children.
/// 4. Otherwise continue descending.
struct Redactor<'a> {
    policy: &'a RedactionPolicy,
}

impl<'a> Visitor for Redactor<'a> {
    fn decide(&self, node: &Value, ctx: &VisitContext<'_>) -> Action {
        if ctx.location.is_always_sensitive() {
            return Action::ReplaceSubtreeAndSkip;
        }

        if node.is_primitive() {
            if let Value::String(s) = node {
                if self.policy.matches_sensitive_value(s) {
                    return Action::ReplacePrimitive(Value::String(
                        insights_agent_common::REDACTED_PLACEHOLDER.to_string(),
                    ));
                }
            }
        }

        if let Some(field) = ctx.parent_field {
            if self.policy.is_sensitive_key(field) {
                return Action::ReplaceSubtreeAndSkip;
            }
        }

        Action::Continue
    }

    fn subtree_marker(&self) -> &str {
        insights_agent_common::REDACTED_PLACEHOLDER
    }
}

/// Applies the Redactor to every sub-tree of a method tree (spec.md
/// §4.5), tagging each with its location type so rule 1 can fire, and
/// separately redacts the path template (rule 4).
pub fn redact_method_tree(tree: &mut MethodTree, policy: &RedactionPolicy) {
    let redactor = Redactor { policy };
    walk(&mut tree.headers, &redactor, LocationType::Header);
    walk(&mut tree.query, &redactor, LocationType::Query);
    walk(&mut tree.cookies, &redactor, LocationType::Cookie);
    walk(&mut tree.auth, &redactor, LocationType::Auth);
    if let Some(body) = tree.body.as_mut() {
        walk(body, &redactor, LocationType::Body);
    }
}

/// Rule 4: split the path template on `/` and replace any segment
/// matching a sensitive-value regex with the redaction marker, then
/// reassemble (spec.md §4.5).
pub fn redact_path_template(path_template: &str, policy: &RedactionPolicy) -> String {
    path_template
        .split('/')
        .map(|segment| {
            if !segment.is_empty() && policy.matches_sensitive_path_segment(segment) {
                insights_agent_common::REDACTED_PLACEHOLDER
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
