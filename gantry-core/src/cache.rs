//! Compiled-delegate cache.
//!
//! A sharded concurrent map from service type id to compiled activation
//! delegate. The shard count is a power of two taken from
//! [`ScopeConfiguration`](crate::ScopeConfiguration). Lifetime scopes share
//! the owning scope's cache by reference, so an entry installed anywhere in
//! the tree is visible everywhere the cache is shared. Entries are
//! installed at most once: the first writer wins and later compilations of
//! the same type observe the original delegate, keeping delegate identity
//! stable. Negative lookups are never cached.

use std::any::TypeId;
use std::sync::Arc;

use dashmap::DashMap;

use crate::strategy::ActivationDelegate;

type CacheMap = DashMap<TypeId, ActivationDelegate, ahash::RandomState>;

#[derive(Clone)]
pub(crate) struct DelegateCache {
    entries: Arc<CacheMap>,
}

impl DelegateCache {
    pub(crate) fn new(shards: usize) -> Self {
        Self {
            entries: Arc::new(CacheMap::with_capacity_and_hasher_and_shard_amount(
                64,
                ahash::RandomState::default(),
                shards,
            )),
        }
    }

    pub(crate) fn get(&self, type_id: &TypeId) -> Option<ActivationDelegate> {
        self.entries.get(type_id).map(|entry| entry.value().clone())
    }

    /// Install a delegate, returning the one that ended up in the cache.
    pub(crate) fn install(&self, type_id: TypeId, delegate: ActivationDelegate) -> ActivationDelegate {
        self.entries
            .entry(type_id)
            .or_insert(delegate)
            .value()
            .clone()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl std::fmt::Debug for DelegateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegateCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Instance;

    fn delegate(tag: u8) -> ActivationDelegate {
        Arc::new(move |_, _, _| Ok(Arc::new(tag) as Instance))
    }

    #[test]
    fn test_first_install_wins() {
        let cache = DelegateCache::new(4);
        let id = TypeId::of::<u8>();

        let first = cache.install(id, delegate(1));
        let second = cache.install(id, delegate(2));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_shared_reference() {
        let cache = DelegateCache::new(4);
        let shared = cache.clone();

        cache.install(TypeId::of::<u8>(), delegate(1));
        assert!(shared.get(&TypeId::of::<u8>()).is_some());
        assert!(shared.get(&TypeId::of::<u16>()).is_none());
    }
}
