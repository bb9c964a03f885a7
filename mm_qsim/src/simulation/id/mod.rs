use std::cmp::Ordering;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

pub use id_store::IdStore;

mod id_store;

/// This type represents a reference counted pointer to a typed id. It can be used in hash maps/sets
/// in combination with NoHashHasher, to achieve fast look ups with no randomness involved.
///
/// The internal part of the id is a dense index, starting at 0 for every [`IdStore`]. Nodes and
/// links are addressed by this index in all per element arrays of the simulation. The external
/// part is the string the id was created from and is only used for reporting.
///
/// As this type wraps Arc<UntypedId>, using clone produces a new pointer to the actual Id and is
/// the intended way of passing around ids. Ids are Send + Sync, so that they can be handed to
/// other threads, for example to activate a link from a different engine.
pub struct Id<T> {
    _type_marker: PhantomData<fn() -> T>,
    id: Arc<UntypedId>,
}

impl<T> Id<T> {
    fn new(untyped_id: Arc<UntypedId>) -> Self {
        Self {
            _type_marker: PhantomData,
            id: untyped_id,
        }
    }

    /// Creates an id which is not attached to any id storage. This method is intended for test
    /// cases. The intended way of creating ids is to use IdStore::create_id(external);
    #[cfg(test)]
    pub(crate) fn new_internal(internal: u64) -> Self {
        Self::new(Arc::new(UntypedId::new(internal, internal.to_string())))
    }

    pub fn internal(&self) -> u64 {
        self.id.internal
    }

    /// The internal id as index into per element vectors.
    pub fn index(&self) -> usize {
        self.id.internal as usize
    }

    pub fn external(&self) -> &str {
        &self.id.external
    }
}

/// Mark Id as enabled for the nohash_hasher::NoHashHasher trait
impl<T> nohash_hasher::IsEnabled for Id<T> {}

impl<T> nohash_hasher::IsEnabled for &Id<T> {}

/// Implement PartialEq, Eq, PartialOrd, Ord, so that Ids can be used in HashMaps and Ordered collections
/// all four methods rely on the internal id.
impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.internal().eq(&other.internal())
    }
}

impl<T> Eq for Id<T> {}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // use write u64 directly, so that we can use NoHashHasher with ids
        state.write_u64(self.internal());
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.internal().cmp(&other.internal())
    }
}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// This creates a new struct with a cloned Arc pointer
impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        Self {
            _type_marker: PhantomData,
            id: self.id.clone(),
        }
    }
}

impl<T> Debug for Id<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Id({}, {})", self.id.internal, self.id.external)
    }
}

impl<T> Display for Id<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id.external)
    }
}

#[derive(Debug)]
struct UntypedId {
    internal: u64,
    external: String,
}

impl UntypedId {
    fn new(internal: u64, external: String) -> Self {
        Self { internal, external }
    }
}

#[cfg(test)]
mod tests {
    use crate::simulation::id::Id;
    use nohash_hasher::IntSet;

    #[test]
    fn ids_compare_by_internal() {
        let a: Id<()> = Id::new_internal(1);
        let b: Id<()> = Id::new_internal(1);
        let c: Id<()> = Id::new_internal(2);

        assert_eq!(a, b);
        assert!(a < c);
        assert_eq!(1, a.index());
    }

    #[test]
    fn ids_in_int_set() {
        let mut set: IntSet<Id<()>> = IntSet::default();
        set.insert(Id::new_internal(3));
        set.insert(Id::new_internal(3));
        set.insert(Id::new_internal(0));

        assert_eq!(2, set.len());
        assert!(set.contains(&Id::new_internal(0)));
    }

    #[test]
    fn display_uses_external() {
        let id: Id<()> = Id::new_internal(7);
        assert_eq!("7", id.to_string());
        assert_eq!("Id(7, 7)", format!("{id:?}"));
    }
}
