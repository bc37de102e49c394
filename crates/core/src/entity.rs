//! Records with an identity that outlives their field values.

/// A record identified by its id rather than its contents.
///
/// A profile is an entity: two records with the same identity id are the
/// same person even if their names differ.
pub trait Entity {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Whether this record is keyed by `id`.
    fn belongs_to(&self, id: &Self::Id) -> bool {
        self.id() == id
    }
}
