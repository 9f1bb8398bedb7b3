//! Registry of chain adapters, one per chain family.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{Chain, ChainFamily};
use crate::ports::ChainAdapter;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("an adapter for the {0} chain family is already registered")]
    DuplicateAdapter(ChainFamily),
}

/// Built during wiring, read-only afterwards.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<ChainFamily, Arc<dyn ChainAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn ChainAdapter>) -> Result<(), RegistryError> {
        let family = adapter.family();
        if self.adapters.contains_key(&family) {
            return Err(RegistryError::DuplicateAdapter(family));
        }
        self.adapters.insert(family, adapter);
        Ok(())
    }

    pub fn get(&self, family: ChainFamily) -> Option<Arc<dyn ChainAdapter>> {
        self.adapters.get(&family).cloned()
    }

    pub fn for_chain(&self, chain: &Chain) -> Option<Arc<dyn ChainAdapter>> {
        self.get(chain.family())
    }

    pub fn families(&self) -> Vec<ChainFamily> {
        let mut families: Vec<ChainFamily> = self.adapters.keys().copied().collect();
        families.sort();
        families
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
