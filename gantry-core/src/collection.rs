//! Strategy collections and the strategy container.
//!
//! The container keeps three indices: closed exported type, open-generic
//! definition, and registration name. Each index maps to an ordered
//! [`StrategyCollection`] (priority descending, insertion ascending as the
//! tiebreak). Writers mutate a clone under the registration lock and
//! publish the result atomically; readers only ever see a complete
//! snapshot.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::generics::GenericDefId;
use crate::strategy::{ActivationStrategy, StrategyFilter};
use crate::types::ExportKey;

/// Ordered list of strategies exported for one type.
#[derive(Clone, Default)]
pub struct StrategyCollection {
    strategies: Vec<Arc<ActivationStrategy>>,
}

impl StrategyCollection {
    fn insert(&mut self, strategy: Arc<ActivationStrategy>) {
        let position = self
            .strategies
            .iter()
            .position(|existing| {
                (existing.priority(), std::cmp::Reverse(existing.insertion()))
                    < (strategy.priority(), std::cmp::Reverse(strategy.insertion()))
            })
            .unwrap_or(self.strategies.len());
        self.strategies.insert(position, strategy);
    }

    /// Filtered enumeration in collection order.
    ///
    /// `key = None` yields keyless strategies only; `key = Some(k)` yields
    /// strategies whose key equals `k` by value.
    pub fn get_strategies(
        &self,
        filter: Option<&StrategyFilter>,
        key: Option<&ExportKey>,
    ) -> Vec<Arc<ActivationStrategy>> {
        self.strategies
            .iter()
            .filter(|strategy| strategy.key() == key)
            .filter(|strategy| filter.map(|f| f(strategy)).unwrap_or(true))
            .cloned()
            .collect()
    }

    /// All strategies, keyed and keyless, in collection order.
    pub fn all(&self) -> &[Arc<ActivationStrategy>] {
        &self.strategies
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl std::fmt::Debug for StrategyCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyCollection")
            .field("strategies", &self.strategies.len())
            .finish()
    }
}

/// Indexed store of activation strategies.
#[derive(Clone, Default)]
pub struct StrategyContainer {
    by_type: HashMap<TypeId, StrategyCollection>,
    by_open_generic: HashMap<GenericDefId, StrategyCollection>,
    by_name: HashMap<String, StrategyCollection>,
    insertion_counter: u64,
}

impl StrategyContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a strategy into the relevant indices, maintaining order.
    pub fn add_strategy(&mut self, mut strategy: ActivationStrategy) -> Arc<ActivationStrategy> {
        self.insertion_counter += 1;
        strategy.set_insertion(self.insertion_counter);
        let strategy = Arc::new(strategy);

        match strategy.open_definition() {
            Some(definition) => {
                self.by_open_generic
                    .entry(definition)
                    .or_default()
                    .insert(strategy.clone());
            }
            None => {
                self.by_type
                    .entry(strategy.export_type().type_id)
                    .or_default()
                    .insert(strategy.clone());
            }
        }

        if let Some(name) = strategy.name() {
            self.by_name
                .entry(name.to_string())
                .or_default()
                .insert(strategy.clone());
        }

        strategy
    }

    /// Collection for exactly this closed type. No generic fallback.
    pub fn get_collection(&self, type_id: TypeId) -> Option<&StrategyCollection> {
        self.by_type.get(&type_id)
    }

    /// Collection for an open-generic definition.
    pub fn get_open_collection(&self, definition: GenericDefId) -> Option<&StrategyCollection> {
        self.by_open_generic.get(&definition)
    }

    /// Collection for a registration name.
    pub fn get_named_collection(&self, name: &str) -> Option<&StrategyCollection> {
        self.by_name.get(name)
    }

    /// Iterate every strategy in the primary indices.
    pub fn all_strategies(&self) -> impl Iterator<Item = &Arc<ActivationStrategy>> {
        self.by_type
            .values()
            .chain(self.by_open_generic.values())
            .flat_map(|collection| collection.all().iter())
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty() && self.by_open_generic.is_empty()
    }
}

impl std::fmt::Debug for StrategyContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyContainer")
            .field("types", &self.by_type.len())
            .field("open_generics", &self.by_open_generic.len())
            .field("names", &self.by_name.len())
            .finish()
    }
}
