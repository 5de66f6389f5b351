//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Entities are compared by identity; two records with the same id are the
/// same record regardless of attribute values.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
