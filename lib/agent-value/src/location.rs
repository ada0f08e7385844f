/// Where a node in the method tree was parsed from. The Redactor's
/// first rule (spec.md §4.5) keys entirely off this tag: a subtree
/// tagged `Auth` or `Cookie` is fully replaced regardless of its field
/// names or contents.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum LocationType {
    Header,
    Query,
    Cookie,
    Auth,
    Body,
    PathTemplate,
    Other,
}

impl LocationType {
    /// Whether the Redactor's rule 1 (spec.md §4.5) applies to a
    /// subtree rooted at a node tagged with this location.
    pub fn is_always_sensitive(self) -> bool {
        matches!(self, LocationType::Auth | LocationType::Cookie)
    }
}
