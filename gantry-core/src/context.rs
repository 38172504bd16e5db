//! Per-call injection context.
//!
//! An [`InjectionContext`] travels with one top-level `locate` call. It
//! carries positional arguments pushed by factory wrappers, a keyed bag of
//! extra data, the active request chain used for cycle detection, and
//! per-context lifestyle slots. Clones are shallow: fan-out to collection
//! elements copies the positional cursor and the keyed bag while sharing
//! lifestyle slots, so "one instance per top-level locate" holds across
//! the fan-out.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use smallvec::SmallVec;

use crate::types::{ExportKey, Injectable, Instance, TypeInfo};

/// One entry of the active resolution chain.
#[derive(Debug, Clone)]
pub(crate) struct RequestFrame {
    pub type_info: TypeInfo,
    pub key: Option<ExportKey>,
}

impl RequestFrame {
    fn display(&self) -> String {
        match &self.key {
            Some(key) => format!("{} (key: {})", self.type_info, key),
            None => self.type_info.to_string(),
        }
    }
}

type SlotMap = DashMap<(u64, TypeId), Instance, ahash::RandomState>;

/// Mutable key/value bag carried through one resolution call graph.
///
/// # Examples
///
/// ```rust
/// use gantry_core::InjectionContext;
///
/// let mut ctx = InjectionContext::new();
/// ctx.set_value("request_id", 42u64);
/// assert_eq!(*ctx.get_as::<u64>("request_id").unwrap(), 42);
/// ```
#[derive(Clone)]
pub struct InjectionContext {
    positional: SmallVec<[Instance; 4]>,
    cursor: usize,
    extra: HashMap<String, Instance>,
    chain: SmallVec<[RequestFrame; 8]>,
    slots: Arc<SlotMap>,
}

impl InjectionContext {
    pub fn new() -> Self {
        Self {
            positional: SmallVec::new(),
            cursor: 0,
            extra: HashMap::new(),
            chain: SmallVec::new(),
            slots: Arc::new(SlotMap::default()),
        }
    }

    /// Context pre-seeded with extra data entries.
    pub fn with_extra_data(entries: impl IntoIterator<Item = (String, Instance)>) -> Self {
        let mut ctx = Self::new();
        ctx.extra.extend(entries);
        ctx
    }

    /// Get a value from the keyed bag.
    pub fn get(&self, key: &str) -> Option<Instance> {
        self.extra.get(key).cloned()
    }

    /// Get a value from the keyed bag, downcast to `T`.
    pub fn get_as<T: Injectable>(&self, key: &str) -> Option<Arc<T>> {
        self.extra
            .get(key)
            .and_then(|value| value.clone().downcast::<T>().ok())
    }

    /// Set a value in the keyed bag, replacing any previous entry.
    pub fn set(&mut self, key: impl Into<String>, value: Instance) {
        self.extra.insert(key.into(), value);
    }

    /// Set a typed value in the keyed bag.
    pub fn set_value<T: Injectable>(&mut self, key: impl Into<String>, value: T) {
        self.set(key, Arc::new(value) as Instance);
    }

    /// Keys currently present in the bag.
    pub fn keys(&self) -> Vec<String> {
        self.extra.keys().cloned().collect()
    }

    /// Append a positional argument for downstream factories.
    pub fn push_positional(&mut self, value: Instance) {
        self.positional.push(value);
    }

    /// All positional arguments, consumed or not.
    pub fn positional_args(&self) -> &[Instance] {
        &self.positional
    }

    /// Hand out the next unconsumed positional argument.
    pub fn next_positional(&mut self) -> Option<Instance> {
        let value = self.positional.get(self.cursor).cloned()?;
        self.cursor += 1;
        Some(value)
    }

    // ---- request chain -------------------------------------------------

    pub(crate) fn chain_contains(&self, type_id: TypeId, key: Option<&ExportKey>) -> bool {
        self.chain
            .iter()
            .any(|frame| frame.type_info.type_id == type_id && frame.key.as_ref() == key)
    }

    pub(crate) fn chain_len(&self) -> usize {
        self.chain.len()
    }

    pub(crate) fn push_frame(&mut self, type_info: TypeInfo, key: Option<ExportKey>) {
        self.chain.push(RequestFrame { type_info, key });
    }

    pub(crate) fn pop_frame(&mut self) {
        self.chain.pop();
    }

    pub(crate) fn chain_names(&self) -> Vec<String> {
        self.chain.iter().map(RequestFrame::display).collect()
    }

    /// Type currently being activated, if any.
    pub(crate) fn current_target(&self) -> Option<TypeInfo> {
        self.chain.last().map(|frame| frame.type_info)
    }

    // ---- lifestyle slots -----------------------------------------------

    pub(crate) fn slot_get(&self, key: (u64, TypeId)) -> Option<Instance> {
        self.slots.get(&key).map(|entry| entry.value().clone())
    }

    pub(crate) fn slot_insert(&self, key: (u64, TypeId), value: Instance) {
        self.slots.insert(key, value);
    }
}

impl Default for InjectionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InjectionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InjectionContext")
            .field("positional", &self.positional.len())
            .field("extra_keys", &self.extra.len())
            .field("chain_depth", &self.chain.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyed_bag() {
        let mut ctx = InjectionContext::new();
        ctx.set_value("answer", 42i32);

        assert_eq!(*ctx.get_as::<i32>("answer").unwrap(), 42);
        assert!(ctx.get("missing").is_none());
        assert_eq!(ctx.keys(), vec!["answer".to_string()]);
    }

    #[test]
    fn test_positional_cursor() {
        let mut ctx = InjectionContext::new();
        ctx.push_positional(Arc::new(1u8));
        ctx.push_positional(Arc::new(2u8));

        let first = ctx.next_positional().unwrap().downcast::<u8>().unwrap();
        let second = ctx.next_positional().unwrap().downcast::<u8>().unwrap();
        assert_eq!((*first, *second), (1, 2));
        assert!(ctx.next_positional().is_none());
    }

    #[test]
    fn test_clone_is_shallow_fanout() {
        let mut ctx = InjectionContext::new();
        ctx.push_positional(Arc::new(5i32));
        ctx.next_positional();

        // A clone re-reads from its own cursor copy.
        let mut clone = ctx.clone();
        assert!(clone.next_positional().is_none());

        // Lifestyle slots are shared across clones.
        ctx.slot_insert((1, TypeId::of::<i32>()), Arc::new(9i32));
        assert!(clone.slot_get((1, TypeId::of::<i32>())).is_some());
    }

    #[test]
    fn test_chain_tracking() {
        let mut ctx = InjectionContext::new();
        let info = TypeInfo::of::<String>();

        assert!(!ctx.chain_contains(info.type_id, None));
        ctx.push_frame(info, None);
        assert!(ctx.chain_contains(info.type_id, None));
        assert!(!ctx.chain_contains(info.type_id, Some(&ExportKey::from("k"))));
        ctx.pop_frame();
        assert_eq!(ctx.chain_len(), 0);
    }
}
