//! Partitions subsets: selections of partition keys.
//!
//! A subset is a plain value (a key set, possibly bound to the definition it
//! was built against). It never holds a store or a clock, so it stays
//! serializable and safe to share between threads.

use std::collections::BTreeSet;
use std::ops::{BitAnd, BitOr, Sub};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::definition::{PartitionsDefinition, TimeWindowPartitionsDefinition};
use crate::store::DynamicPartitionsStore;

/// A selection of partition keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PartitionsSubset {
    /// Explicit keys, not bound to any definition.
    Default(DefaultPartitionsSubset),
    /// Keys of a time-window definition.
    TimeWindow(TimeWindowPartitionsSubset),
    /// Every key of a definition, as resolved at a point in time.
    All(AllPartitionsSubset),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultPartitionsSubset {
    keys: BTreeSet<String>,
}

impl DefaultPartitionsSubset {
    pub fn new(keys: BTreeSet<String>) -> Self {
        Self { keys }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindowPartitionsSubset {
    partitions_def: TimeWindowPartitionsDefinition,
    keys: BTreeSet<String>,
}

impl TimeWindowPartitionsSubset {
    pub fn new(partitions_def: TimeWindowPartitionsDefinition, keys: BTreeSet<String>) -> Self {
        Self {
            partitions_def,
            keys,
        }
    }

    pub fn partitions_def(&self) -> &TimeWindowPartitionsDefinition {
        &self.partitions_def
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllPartitionsSubset {
    partitions_def: PartitionsDefinition,
    current_time: DateTime<Utc>,
    keys: BTreeSet<String>,
}

impl AllPartitionsSubset {
    /// Snapshot the full key universe of `partitions_def` at `current_time`.
    pub fn new(
        partitions_def: PartitionsDefinition,
        dynamic_partitions_store: &dyn DynamicPartitionsStore,
        current_time: DateTime<Utc>,
    ) -> Self {
        let keys = partitions_def
            .get_partition_keys(current_time, dynamic_partitions_store)
            .into_iter()
            .collect();
        Self {
            partitions_def,
            current_time,
            keys,
        }
    }

    pub fn partitions_def(&self) -> &PartitionsDefinition {
        &self.partitions_def
    }

    pub fn current_time(&self) -> DateTime<Utc> {
        self.current_time
    }
}

impl PartitionsSubset {
    pub fn keys(&self) -> &BTreeSet<String> {
        match self {
            PartitionsSubset::Default(s) => &s.keys,
            PartitionsSubset::TimeWindow(s) => &s.keys,
            PartitionsSubset::All(s) => &s.keys,
        }
    }

    pub fn partition_keys(&self) -> impl Iterator<Item = &str> {
        self.keys().iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }

    pub fn contains(&self, partition_key: &str) -> bool {
        self.keys().contains(partition_key)
    }

    /// The definition this subset is bound to, if it knows it.
    ///
    /// `Default` subsets are plain key sets and return `None`.
    pub fn partitions_def(&self) -> Option<PartitionsDefinition> {
        match self {
            PartitionsSubset::Default(_) => None,
            PartitionsSubset::TimeWindow(s) => {
                Some(PartitionsDefinition::TimeWindow(s.partitions_def.clone()))
            }
            PartitionsSubset::All(s) => Some(s.partitions_def.clone()),
        }
    }

    /// Same binding as `self`, holding `keys` instead.
    ///
    /// An `All` subset that no longer covers its universe becomes an ordinary
    /// subset of its definition.
    pub fn with_keys(&self, keys: BTreeSet<String>) -> PartitionsSubset {
        match self {
            PartitionsSubset::Default(_) => {
                PartitionsSubset::Default(DefaultPartitionsSubset::new(keys))
            }
            PartitionsSubset::TimeWindow(s) => PartitionsSubset::TimeWindow(
                TimeWindowPartitionsSubset::new(s.partitions_def.clone(), keys),
            ),
            PartitionsSubset::All(s) if s.keys == keys => self.clone(),
            PartitionsSubset::All(s) => s.partitions_def.subset_with_partition_keys(keys),
        }
    }

    /// Empty subset of the same shape (`self - self`).
    pub fn empty_like(&self) -> PartitionsSubset {
        self.with_keys(BTreeSet::new())
    }

    pub fn union(&self, other: &PartitionsSubset) -> PartitionsSubset {
        self.with_keys(self.keys().union(other.keys()).cloned().collect())
    }

    pub fn intersection(&self, other: &PartitionsSubset) -> PartitionsSubset {
        self.with_keys(self.keys().intersection(other.keys()).cloned().collect())
    }

    pub fn difference(&self, other: &PartitionsSubset) -> PartitionsSubset {
        self.with_keys(self.keys().difference(other.keys()).cloned().collect())
    }

    /// Keys of `partitions_def` at `current_time` that are not in this subset.
    pub fn get_partition_keys_not_in_subset(
        &self,
        partitions_def: &PartitionsDefinition,
        current_time: DateTime<Utc>,
        dynamic_partitions_store: &dyn DynamicPartitionsStore,
    ) -> Vec<String> {
        partitions_def
            .get_partition_keys(current_time, dynamic_partitions_store)
            .into_iter()
            .filter(|k| !self.contains(k))
            .collect()
    }
}

impl BitAnd for &PartitionsSubset {
    type Output = PartitionsSubset;

    fn bitand(self, rhs: Self) -> PartitionsSubset {
        self.intersection(rhs)
    }
}

impl BitOr for &PartitionsSubset {
    type Output = PartitionsSubset;

    fn bitor(self, rhs: Self) -> PartitionsSubset {
        self.union(rhs)
    }
}

impl Sub for &PartitionsSubset {
    type Output = PartitionsSubset;

    fn sub(self, rhs: Self) -> PartitionsSubset {
        self.difference(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::StaticPartitionsDefinition;
    use crate::store::InMemoryDynamicPartitionsStore;

    fn letters() -> PartitionsDefinition {
        StaticPartitionsDefinition::new(["a", "b", "c", "d"])
            .unwrap()
            .into()
    }

    fn keys(subset: &PartitionsSubset) -> Vec<&str> {
        subset.partition_keys().collect()
    }

    #[test]
    fn operators_follow_set_semantics() {
        let def = letters();
        let ab = def.subset_with_partition_keys(["a", "b"]);
        let bc = def.subset_with_partition_keys(["b", "c"]);

        assert_eq!(keys(&(&ab & &bc)), ["b"]);
        assert_eq!(keys(&(&ab | &bc)), ["a", "b", "c"]);
        assert_eq!(keys(&(&ab - &bc)), ["a"]);
    }

    #[test]
    fn all_subset_degrades_once_it_loses_keys() {
        let def = letters();
        let store = InMemoryDynamicPartitionsStore::new();
        let all = PartitionsSubset::All(AllPartitionsSubset::new(def.clone(), &store, Utc::now()));
        assert_eq!(all.len(), 4);

        let same = &all | &def.subset_with_partition_keys(["a"]);
        assert!(matches!(same, PartitionsSubset::All(_)));

        let fewer = &all - &def.subset_with_partition_keys(["a"]);
        assert!(matches!(fewer, PartitionsSubset::Default(_)));
        assert_eq!(keys(&fewer), ["b", "c", "d"]);
    }

    #[test]
    fn complement_is_taken_against_resolved_universe() {
        let def = letters();
        let store = InMemoryDynamicPartitionsStore::new();
        let subset = def.subset_with_partition_keys(["b", "d"]);
        assert_eq!(
            subset.get_partition_keys_not_in_subset(&def, Utc::now(), &store),
            ["a", "c"]
        );
    }

    #[test]
    fn empty_like_keeps_binding() {
        let def: PartitionsDefinition =
            TimeWindowPartitionsDefinition::daily(Utc::now()).into();
        let subset = def.subset_with_partition_keys(["2024-01-01"]);
        let empty = subset.empty_like();
        assert!(empty.is_empty());
        assert_eq!(empty.partitions_def(), Some(def));
    }
}
