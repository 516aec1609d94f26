//! Lookup of dynamically managed partition keys.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Source of truth for the keys of dynamic partitions definitions.
pub trait DynamicPartitionsStore: Send + Sync {
    /// All keys currently registered under `partitions_def_name`, in insertion order.
    fn get_dynamic_partitions(&self, partitions_def_name: &str) -> Vec<String>;

    fn has_dynamic_partition(&self, partitions_def_name: &str, partition_key: &str) -> bool {
        self.get_dynamic_partitions(partitions_def_name)
            .iter()
            .any(|k| k == partition_key)
    }
}

impl<S> DynamicPartitionsStore for Arc<S>
where
    S: DynamicPartitionsStore + ?Sized,
{
    fn get_dynamic_partitions(&self, partitions_def_name: &str) -> Vec<String> {
        (**self).get_dynamic_partitions(partitions_def_name)
    }

    fn has_dynamic_partition(&self, partitions_def_name: &str, partition_key: &str) -> bool {
        (**self).has_dynamic_partition(partitions_def_name, partition_key)
    }
}

/// In-memory dynamic partitions store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryDynamicPartitionsStore {
    partitions: RwLock<HashMap<String, Vec<String>>>,
}

impl InMemoryDynamicPartitionsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register keys; already-present keys are ignored.
    pub fn add_partitions<I, S>(&self, partitions_def_name: &str, partition_keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let Ok(mut partitions) = self.partitions.write() else {
            return;
        };
        let existing = partitions.entry(partitions_def_name.to_string()).or_default();
        for key in partition_keys {
            let key = key.into();
            if !existing.contains(&key) {
                existing.push(key);
            }
        }
    }

    /// Remove a key. Returns whether it was present.
    pub fn delete_partition(&self, partitions_def_name: &str, partition_key: &str) -> bool {
        let Ok(mut partitions) = self.partitions.write() else {
            return false;
        };
        match partitions.get_mut(partitions_def_name) {
            Some(keys) => {
                let before = keys.len();
                keys.retain(|k| k != partition_key);
                keys.len() != before
            }
            None => false,
        }
    }
}

impl DynamicPartitionsStore for InMemoryDynamicPartitionsStore {
    fn get_dynamic_partitions(&self, partitions_def_name: &str) -> Vec<String> {
        self.partitions
            .read()
            .ok()
            .and_then(|p| p.get(partitions_def_name).cloned())
            .unwrap_or_default()
    }
}
