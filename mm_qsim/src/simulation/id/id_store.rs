use crate::simulation::id::{Id, UntypedId};
use ahash::{AHashMap, RandomState};
use std::sync::Arc;

/// Hands out ids of one type. The internal part of created ids is dense and starts at 0, which
/// lets the network address nodes and links by index.
#[derive(Debug)]
pub struct IdStore<T> {
    ids: Vec<Id<T>>,
    // use ahasher algorithm with fixed random state, to get predictable
    mapping: AHashMap<String, u64>,
}

impl<T> Default for IdStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> IdStore<T> {
    pub fn new() -> Self {
        Self {
            ids: Vec::new(),
            mapping: AHashMap::with_hasher(RandomState::with_seed(42)),
        }
    }

    /// Creates a new id for `external`. If the external id is already known, the existing id is
    /// returned.
    pub fn create_id(&mut self, external: &str) -> Id<T> {
        if let Some(id) = self.try_get_from_ext(external) {
            return id;
        }

        let next_internal = self.ids.len() as u64;
        let id = Id::new(Arc::new(UntypedId::new(
            next_internal,
            String::from(external),
        )));
        self.ids.push(id.clone());
        self.mapping.insert(String::from(external), next_internal);
        id
    }

    pub fn get(&self, internal: u64) -> Id<T> {
        self.ids
            .get(internal as usize)
            .unwrap_or_else(|| panic!("No id found for internal {internal}"))
            .clone()
    }

    pub fn get_from_ext(&self, external: &str) -> Id<T> {
        self.try_get_from_ext(external)
            .unwrap_or_else(|| panic!("Could not find id for external id: {external}"))
    }

    pub fn try_get_from_ext(&self, external: &str) -> Option<Id<T>> {
        self.mapping
            .get(external)
            .map(|internal| self.ids[*internal as usize].clone())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Id<T>> {
        self.ids.iter()
    }
}
