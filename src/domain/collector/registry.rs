//! Versioned collector registry snapshot

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use super::entity::{CollectorConfig, CollectorType};

/// Immutable set of collector configs.
///
/// A batch takes one snapshot up front and keeps using it even if the
/// registry is reloaded while the batch runs.
#[derive(Debug, Clone, Default)]
pub struct CollectorRegistry {
    version: u64,
    collectors: BTreeMap<CollectorType, CollectorConfig>,
}

impl CollectorRegistry {
    pub fn new(version: u64, configs: Vec<CollectorConfig>) -> Self {
        let collectors = configs
            .into_iter()
            .map(|c| (c.collector_type().clone(), c))
            .collect();

        Self {
            version,
            collectors,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, collector_type: &CollectorType) -> Option<&CollectorConfig> {
        self.collectors.get(collector_type)
    }

    pub fn collector_types(&self) -> impl Iterator<Item = &CollectorType> {
        self.collectors.keys()
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }
}

/// Shared handle to the current registry snapshot
#[derive(Debug)]
pub struct RegistryHandle {
    current: RwLock<Arc<CollectorRegistry>>,
}

impl RegistryHandle {
    pub fn new(registry: CollectorRegistry) -> Self {
        Self {
            current: RwLock::new(Arc::new(registry)),
        }
    }

    pub fn snapshot(&self) -> Arc<CollectorRegistry> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Swaps in a new set of configs under the next version number
    pub fn reload(&self, configs: Vec<CollectorConfig>) -> u64 {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let version = guard.version + 1;
        *guard = Arc::new(CollectorRegistry::new(version, configs));
        version
    }
}
