use insights_agent_witness::MethodTree;

/// The Zero-Obfuscator (spec.md §4.5): replaces every primitive value
/// in the tree with the type's zero value while preserving tree shape,
/// so the ingestion service can still infer structure. Used by the
/// non-repro path (§4.4 policy gate) and by the Upload Batcher's
/// oversize fallback (§4.6).
pub fn zero_method_tree(tree: &mut MethodTree) {
    tree.headers.zero_all_primitives();
    tree.query.zero_all_primitives();
    tree.cookies.zero_all_primitives();
    tree.auth.zero_all_primitives();
    if let Some(body) = tree.body.as_mut() {
        body.zero_all_primitives();
    }
}
