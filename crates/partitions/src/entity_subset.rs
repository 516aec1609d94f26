//! Subsets over a single entity's key space.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use assetflow_core::{AssetKey, AssetKeyPartitionKey, DomainError, DomainResult, EntityKey};

use crate::definition::PartitionsDefinition;
use crate::subset::PartitionsSubset;

/// Inclusion state of an entity: a bare boolean when unpartitioned, a
/// partitions subset otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubsetValue {
    Bool(bool),
    Partitioned(PartitionsSubset),
}

impl From<bool> for SubsetValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<PartitionsSubset> for SubsetValue {
    fn from(value: PartitionsSubset) -> Self {
        Self::Partitioned(value)
    }
}

/// Keys a subset can range over.
pub trait SubsetKey: Clone + Eq + core::fmt::Debug {
    fn to_asset_key(&self) -> Option<AssetKey>;
}

impl SubsetKey for AssetKey {
    fn to_asset_key(&self) -> Option<AssetKey> {
        Some(self.clone())
    }
}

impl SubsetKey for EntityKey {
    fn to_asset_key(&self) -> Option<AssetKey> {
        self.as_asset_key().cloned()
    }
}

/// An immutable, possibly-partitioned slice of one entity (asset or check).
///
/// Nothing here checks that `value` matches the entity's current partitions
/// definition; see `ValidAssetSubset` for the checked form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySubset<K = EntityKey> {
    key: K,
    value: SubsetValue,
}

/// Subset over an asset.
pub type AssetSubset = EntitySubset<AssetKey>;

impl<K: SubsetKey> EntitySubset<K> {
    pub fn new(key: K, value: impl Into<SubsetValue>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &SubsetValue {
        &self.value
    }

    /// Copy of this subset holding `value`.
    pub fn with_value(&self, value: impl Into<SubsetValue>) -> Self {
        Self {
            key: self.key.clone(),
            value: value.into(),
        }
    }

    pub fn is_partitioned(&self) -> bool {
        matches!(self.value, SubsetValue::Partitioned(_))
    }

    /// Boolean value of an unpartitioned subset.
    pub fn bool_value(&self) -> Option<bool> {
        match self.value {
            SubsetValue::Bool(b) => Some(b),
            SubsetValue::Partitioned(_) => None,
        }
    }

    /// Partitions subset of a partitioned subset.
    pub fn subset_value(&self) -> Option<&PartitionsSubset> {
        match &self.value {
            SubsetValue::Bool(_) => None,
            SubsetValue::Partitioned(s) => Some(s),
        }
    }

    /// Number of included partitions (0 or 1 when unpartitioned).
    pub fn size(&self) -> usize {
        match &self.value {
            SubsetValue::Bool(b) => usize::from(*b),
            SubsetValue::Partitioned(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Whether this subset's shape is usable with `partitions_def`.
    ///
    /// Subsets that know their definition must match it exactly; plain key
    /// sets only require the entity to be partitioned.
    pub fn is_compatible_with_partitions_def(
        &self,
        partitions_def: Option<&PartitionsDefinition>,
    ) -> bool {
        match &self.value {
            SubsetValue::Bool(_) => partitions_def.is_none(),
            SubsetValue::Partitioned(subset) => match subset.partitions_def() {
                Some(bound) => Some(&bound) == partitions_def,
                None => partitions_def.is_some(),
            },
        }
    }

    /// Same subset keyed by an asset key.
    pub fn to_asset_subset(&self) -> DomainResult<AssetSubset> {
        let key = self.key.to_asset_key().ok_or_else(|| {
            DomainError::invariant(format!("subset key {:?} is not an asset key", self.key))
        })?;
        Ok(EntitySubset {
            key,
            value: self.value.clone(),
        })
    }
}

impl AssetSubset {
    /// Every included (asset, partition) pair.
    pub fn asset_partitions(&self) -> BTreeSet<AssetKeyPartitionKey> {
        match &self.value {
            SubsetValue::Bool(true) => {
                BTreeSet::from([AssetKeyPartitionKey::new(self.key.clone(), None)])
            }
            SubsetValue::Bool(false) => BTreeSet::new(),
            SubsetValue::Partitioned(subset) => subset
                .partition_keys()
                .map(|pk| AssetKeyPartitionKey::partitioned(self.key.clone(), pk))
                .collect(),
        }
    }

    /// Widen the key to an `EntityKey`.
    pub fn into_entity_subset(self) -> EntitySubset<EntityKey> {
        EntitySubset {
            key: EntityKey::Asset(self.key),
            value: self.value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{StaticPartitionsDefinition, TimeWindowPartitionsDefinition};
    use chrono::{TimeZone, Utc};

    fn key(name: &str) -> AssetKey {
        AssetKey::new([name]).unwrap()
    }

    fn daily(day: u32) -> PartitionsDefinition {
        TimeWindowPartitionsDefinition::daily(Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap())
            .into()
    }

    #[test]
    fn unpartitioned_compatibility() {
        let subset = AssetSubset::new(key("a"), true);
        assert!(subset.is_compatible_with_partitions_def(None));
        assert!(!subset.is_compatible_with_partitions_def(Some(&daily(1))));
        assert_eq!(subset.size(), 1);
    }

    #[test]
    fn bound_subsets_require_identical_definition() {
        let subset = AssetSubset::new(key("a"), daily(1).subset_with_partition_keys(["2024-01-01"]));
        assert!(subset.is_compatible_with_partitions_def(Some(&daily(1))));
        assert!(!subset.is_compatible_with_partitions_def(Some(&daily(2))));
        assert!(!subset.is_compatible_with_partitions_def(None));
    }

    #[test]
    fn default_subsets_only_require_partitioning() {
        let def: PartitionsDefinition = StaticPartitionsDefinition::new(["x"]).unwrap().into();
        let subset = AssetSubset::new(key("a"), def.subset_with_partition_keys(["x"]));
        assert!(subset.is_compatible_with_partitions_def(Some(&daily(3))));
        assert!(!subset.is_compatible_with_partitions_def(None));
    }

    #[test]
    fn asset_partitions_enumerates_members() {
        let def: PartitionsDefinition = StaticPartitionsDefinition::new(["x", "y"]).unwrap().into();
        let subset = AssetSubset::new(key("a"), def.subset_with_partition_keys(["y"]));
        assert_eq!(
            subset.asset_partitions(),
            BTreeSet::from([AssetKeyPartitionKey::partitioned(key("a"), "y")])
        );
        assert!(AssetSubset::new(key("a"), false).asset_partitions().is_empty());
    }

    #[test]
    fn check_subsets_do_not_convert_to_asset_subsets() {
        let subset = EntitySubset::new(EntityKey::from(key("a").check("fresh")), true);
        assert!(matches!(
            subset.to_asset_subset(),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn subsets_serialize_without_runtime_context() {
        let def: PartitionsDefinition = StaticPartitionsDefinition::new(["x"]).unwrap().into();
        let subset = AssetSubset::new(key("a"), def.subset_with_partition_keys(["x"]));
        let json = serde_json::to_string(&subset).unwrap();
        let back: AssetSubset = serde_json::from_str(&json).unwrap();
        assert_eq!(back, subset);
    }
}
