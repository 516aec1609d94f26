//! Asset subsets known to be valid against the current partitions definition.
//!
//! Every binary operation first runs the right operand through
//! [`ValidAssetSubset::get_valid`]. Operands that do not fit the left operand's
//! shape are replaced by an empty subset instead of producing an error, which
//! keeps the algebra total. Callers are responsible for passing operands that
//! were built against an up-to-date partitions definition; stale operands
//! silently contribute nothing.

use std::ops::{BitAnd, BitOr, Deref, Sub};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use assetflow_core::{AssetKey, AssetKeyPartitionKey, DomainError, DomainResult};

use crate::definition::PartitionsDefinition;
use crate::entity_subset::{AssetSubset, EntitySubset, SubsetKey, SubsetValue};
use crate::store::DynamicPartitionsStore;
use crate::subset::{AllPartitionsSubset, PartitionsSubset};

/// An `AssetSubset` whose value matches the asset's partitions definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidAssetSubset(AssetSubset);

/// Right-hand operand of a subset operation.
#[derive(Debug, Clone, Copy)]
pub enum SubsetOperand<'a> {
    Valid(&'a ValidAssetSubset),
    Unchecked(&'a AssetSubset),
}

impl<'a> From<&'a ValidAssetSubset> for SubsetOperand<'a> {
    fn from(value: &'a ValidAssetSubset) -> Self {
        Self::Valid(value)
    }
}

impl<'a> From<&'a AssetSubset> for SubsetOperand<'a> {
    fn from(value: &'a AssetSubset) -> Self {
        Self::Unchecked(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetOp {
    Intersection,
    Union,
    Difference,
}

impl SetOp {
    fn on_bools(self, lhs: bool, rhs: bool) -> bool {
        match self {
            SetOp::Intersection => lhs && rhs,
            SetOp::Union => lhs || rhs,
            SetOp::Difference => lhs && !rhs,
        }
    }

    fn on_subsets(self, lhs: &PartitionsSubset, rhs: &PartitionsSubset) -> PartitionsSubset {
        match self {
            SetOp::Intersection => lhs & rhs,
            SetOp::Union => lhs | rhs,
            SetOp::Difference => lhs - rhs,
        }
    }
}

impl ValidAssetSubset {
    /// Full subset of an asset.
    ///
    /// Partitioned assets need both a store and a time to resolve the key
    /// universe; omitting either is an invariant violation.
    pub fn all(
        asset_key: AssetKey,
        partitions_def: Option<&PartitionsDefinition>,
        dynamic_partitions_store: Option<&dyn DynamicPartitionsStore>,
        current_time: Option<DateTime<Utc>>,
    ) -> DomainResult<Self> {
        let Some(partitions_def) = partitions_def else {
            return Ok(Self(AssetSubset::new(asset_key, true)));
        };
        let (Some(store), Some(current_time)) = (dynamic_partitions_store, current_time) else {
            return Err(DomainError::invariant(
                "must provide dynamic_partitions_store and current_time for partitioned assets",
            ));
        };
        let all = AllPartitionsSubset::new(partitions_def.clone(), store, current_time);
        Ok(Self(AssetSubset::new(asset_key, PartitionsSubset::All(all))))
    }

    pub fn empty(asset_key: AssetKey, partitions_def: Option<&PartitionsDefinition>) -> Self {
        match partitions_def {
            None => Self(AssetSubset::new(asset_key, false)),
            Some(def) => Self(AssetSubset::new(asset_key, def.empty_subset())),
        }
    }

    pub fn from_partition_keys<I, S>(
        asset_key: AssetKey,
        partitions_def: &PartitionsDefinition,
        partition_keys: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(AssetSubset::new(
            asset_key,
            partitions_def.subset_with_partition_keys(partition_keys),
        ))
    }

    /// Build from explicit (asset, partition) membership.
    ///
    /// Unpartitioned assets are included iff the set is non-empty; for
    /// partitioned assets, entries without a partition key are ignored.
    pub fn from_asset_partitions_set<'a, I>(
        asset_key: AssetKey,
        partitions_def: Option<&PartitionsDefinition>,
        asset_partitions: I,
    ) -> Self
    where
        I: IntoIterator<Item = &'a AssetKeyPartitionKey>,
    {
        let mut asset_partitions = asset_partitions.into_iter();
        match partitions_def {
            Some(def) => Self::from_partition_keys(
                asset_key,
                def,
                asset_partitions.filter_map(|ap| ap.partition_key.clone()),
            ),
            None => {
                let included = asset_partitions.next().is_some();
                Self(AssetSubset::new(asset_key, included))
            }
        }
    }

    /// Convert an arbitrary subset, replacing it with `empty` if its shape does
    /// not fit `partitions_def`.
    ///
    /// Fails only when the subset is not keyed by an asset.
    pub fn coerce_from_subset<K: SubsetKey>(
        subset: &EntitySubset<K>,
        partitions_def: Option<&PartitionsDefinition>,
    ) -> DomainResult<Self> {
        let asset_subset = subset.to_asset_subset()?;
        if asset_subset.is_compatible_with_partitions_def(partitions_def) {
            Ok(Self(asset_subset))
        } else {
            debug!(
                asset_key = %asset_subset.key(),
                "subset incompatible with partitions definition, coercing to empty"
            );
            Ok(Self::empty(asset_subset.key().clone(), partitions_def))
        }
    }

    pub fn as_subset(&self) -> &AssetSubset {
        &self.0
    }

    pub fn into_inner(self) -> AssetSubset {
        self.0
    }

    fn is_compatible_with_subset(&self, other: &AssetSubset) -> bool {
        match other.subset_value().and_then(PartitionsSubset::partitions_def) {
            Some(bound) => self.is_compatible_with_partitions_def(Some(&bound)),
            None => self.is_partitioned() == other.is_partitioned(),
        }
    }

    fn empty_like(&self) -> SubsetValue {
        match self.value() {
            SubsetValue::Bool(_) => SubsetValue::Bool(false),
            SubsetValue::Partitioned(s) => SubsetValue::Partitioned(s.empty_like()),
        }
    }

    /// Coerce `other` into a valid subset relative to `self`.
    ///
    /// Valid subsets pass through untouched, compatible subsets are wrapped,
    /// and anything else becomes an empty subset shaped like `self`.
    pub fn get_valid<'a>(&self, other: impl Into<SubsetOperand<'a>>) -> ValidAssetSubset {
        match other.into() {
            SubsetOperand::Valid(valid) => valid.clone(),
            SubsetOperand::Unchecked(subset) if self.is_compatible_with_subset(subset) => {
                Self(subset.clone())
            }
            SubsetOperand::Unchecked(subset) => {
                debug!(
                    asset_key = %self.key(),
                    operand_key = %subset.key(),
                    "operand incompatible with subset, coercing to empty"
                );
                Self(self.0.with_value(self.empty_like()))
            }
        }
    }

    fn oper(&self, other: &ValidAssetSubset, op: SetOp) -> ValidAssetSubset {
        let value = match (self.value(), other.value()) {
            (SubsetValue::Bool(lhs), SubsetValue::Bool(rhs)) => {
                SubsetValue::Bool(op.on_bools(*lhs, *rhs))
            }
            (SubsetValue::Partitioned(lhs), SubsetValue::Partitioned(rhs)) => {
                SubsetValue::Partitioned(op.on_subsets(lhs, rhs))
            }
            // A valid operand of the other shape contributes nothing.
            (SubsetValue::Bool(lhs), SubsetValue::Partitioned(_)) => {
                SubsetValue::Bool(op.on_bools(*lhs, false))
            }
            (SubsetValue::Partitioned(lhs), SubsetValue::Bool(_)) => {
                SubsetValue::Partitioned(op.on_subsets(lhs, &lhs.empty_like()))
            }
        };
        Self(self.0.with_value(value))
    }

    /// `self - other`.
    pub fn difference<'a>(&self, other: impl Into<SubsetOperand<'a>>) -> ValidAssetSubset {
        self.oper(&self.get_valid(other), SetOp::Difference)
    }

    /// `self & other`.
    pub fn intersection<'a>(&self, other: impl Into<SubsetOperand<'a>>) -> ValidAssetSubset {
        self.oper(&self.get_valid(other), SetOp::Intersection)
    }

    /// `self | other`.
    pub fn union<'a>(&self, other: impl Into<SubsetOperand<'a>>) -> ValidAssetSubset {
        self.oper(&self.get_valid(other), SetOp::Union)
    }

    /// Everything in the asset's current key universe that is not in `self`.
    pub fn inverse(
        &self,
        partitions_def: Option<&PartitionsDefinition>,
        current_time: Option<DateTime<Utc>>,
        dynamic_partitions_store: Option<&dyn DynamicPartitionsStore>,
    ) -> DomainResult<ValidAssetSubset> {
        match (partitions_def, self.value()) {
            (None, SubsetValue::Bool(b)) => Ok(Self(self.0.with_value(!*b))),
            (None, SubsetValue::Partitioned(_)) => Err(DomainError::invariant(format!(
                "cannot invert partitioned subset of {} without a partitions definition",
                self.key()
            ))),
            (Some(_), SubsetValue::Bool(_)) => Err(DomainError::invariant(format!(
                "cannot invert unpartitioned subset of {} against a partitions definition",
                self.key()
            ))),
            (Some(def), SubsetValue::Partitioned(subset)) => {
                let (Some(current_time), Some(store)) = (current_time, dynamic_partitions_store)
                else {
                    return Err(DomainError::invariant(
                        "must provide current_time and dynamic_partitions_store to invert a partitioned subset",
                    ));
                };
                let keys = subset.get_partition_keys_not_in_subset(def, current_time, store);
                Ok(Self(self.0.with_value(def.subset_with_partition_keys(keys))))
            }
        }
    }
}

impl Deref for ValidAssetSubset {
    type Target = AssetSubset;

    fn deref(&self) -> &AssetSubset {
        &self.0
    }
}

impl From<ValidAssetSubset> for AssetSubset {
    fn from(value: ValidAssetSubset) -> Self {
        value.0
    }
}

macro_rules! impl_subset_operator {
    ($trait:ident, $method:ident, $op:ident) => {
        impl<'a> $trait<&'a ValidAssetSubset> for &ValidAssetSubset {
            type Output = ValidAssetSubset;

            fn $method(self, rhs: &'a ValidAssetSubset) -> ValidAssetSubset {
                self.$op(rhs)
            }
        }

        impl<'a> $trait<&'a AssetSubset> for &ValidAssetSubset {
            type Output = ValidAssetSubset;

            fn $method(self, rhs: &'a AssetSubset) -> ValidAssetSubset {
                self.$op(rhs)
            }
        }
    };
}

impl_subset_operator!(Sub, sub, difference);
impl_subset_operator!(BitAnd, bitand, intersection);
impl_subset_operator!(BitOr, bitor, union);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{
        DynamicPartitionsDefinition, StaticPartitionsDefinition, TimeWindowPartitionsDefinition,
    };
    use crate::store::InMemoryDynamicPartitionsStore;
    use assetflow_core::EntityKey;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    const LETTERS: [&str; 6] = ["a", "b", "c", "d", "e", "f"];

    fn key() -> AssetKey {
        AssetKey::new(["orders"]).unwrap()
    }

    fn letters() -> PartitionsDefinition {
        StaticPartitionsDefinition::new(LETTERS).unwrap().into()
    }

    fn daily_from(day: u32) -> PartitionsDefinition {
        TimeWindowPartitionsDefinition::daily(Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap())
            .into()
    }

    fn unpartitioned(b: bool) -> ValidAssetSubset {
        ValidAssetSubset::coerce_from_subset(&AssetSubset::new(key(), b), None).unwrap()
    }

    fn keys_of(subset: &ValidAssetSubset) -> BTreeSet<String> {
        subset.subset_value().unwrap().keys().clone()
    }

    #[test]
    fn all_requires_context_for_partitioned_assets() {
        let def = letters();
        let store = InMemoryDynamicPartitionsStore::new();

        let err = ValidAssetSubset::all(key(), Some(&def), None, Some(Utc::now())).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        let err = ValidAssetSubset::all(key(), Some(&def), Some(&store), None).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));

        let all = ValidAssetSubset::all(key(), Some(&def), Some(&store), Some(Utc::now())).unwrap();
        assert_eq!(all.size(), LETTERS.len());
        assert_eq!(ValidAssetSubset::all(key(), None, None, None).unwrap().bool_value(), Some(true));
    }

    #[test]
    fn empty_always_succeeds() {
        assert_eq!(ValidAssetSubset::empty(key(), None).bool_value(), Some(false));
        assert!(ValidAssetSubset::empty(key(), Some(&letters())).is_empty());
    }

    #[test]
    fn inverse_of_unpartitioned_flips_boolean() {
        assert_eq!(unpartitioned(true).inverse(None, None, None).unwrap().bool_value(), Some(false));
        assert_eq!(unpartitioned(false).inverse(None, None, None).unwrap().bool_value(), Some(true));
    }

    #[test]
    fn inverse_of_dynamic_subset_tracks_store() {
        let def: PartitionsDefinition = DynamicPartitionsDefinition::new("customers").into();
        let store = InMemoryDynamicPartitionsStore::new();
        store.add_partitions("customers", ["acme", "globex", "initech"]);

        let subset = ValidAssetSubset::from_partition_keys(key(), &def, ["globex"]);
        let inverse = subset.inverse(Some(&def), Some(Utc::now()), Some(&store)).unwrap();
        assert_eq!(keys_of(&inverse), BTreeSet::from(["acme".into(), "initech".into()]));

        store.delete_partition("customers", "acme");
        let inverse = subset.inverse(Some(&def), Some(Utc::now()), Some(&store)).unwrap();
        assert_eq!(keys_of(&inverse), BTreeSet::from(["initech".into()]));
    }

    #[test]
    fn inverse_without_context_is_invariant_violation() {
        let def = letters();
        let subset = ValidAssetSubset::from_partition_keys(key(), &def, ["a"]);
        let err = subset.inverse(Some(&def), None, None).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn inverse_of_time_window_subset_uses_current_time() {
        let def = daily_from(1);
        let store = InMemoryDynamicPartitionsStore::new();
        let subset = ValidAssetSubset::from_partition_keys(key(), &def, ["2024-01-02"]);
        let now = Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).unwrap();

        let inverse = subset.inverse(Some(&def), Some(now), Some(&store)).unwrap();
        assert_eq!(
            keys_of(&inverse),
            BTreeSet::from(["2024-01-01".into(), "2024-01-03".into()])
        );
        assert!(inverse.is_compatible_with_partitions_def(Some(&def)));
    }

    #[test]
    fn get_valid_passes_valid_subsets_through() {
        let subset = ValidAssetSubset::from_partition_keys(key(), &letters(), ["a", "c"]);
        assert_eq!(subset.get_valid(&subset), subset);
    }

    #[test]
    fn get_valid_wraps_compatible_subsets() {
        let def = daily_from(1);
        let subset = ValidAssetSubset::from_partition_keys(key(), &def, ["2024-01-01"]);
        let raw = AssetSubset::new(key(), def.subset_with_partition_keys(["2024-01-02"]));
        assert_eq!(subset.get_valid(&raw).as_subset(), &raw);
    }

    #[test]
    fn stale_time_window_operand_coerces_to_empty() {
        let current = daily_from(1);
        let stale = daily_from(2);
        let subset =
            ValidAssetSubset::from_partition_keys(key(), &current, ["2024-01-01", "2024-01-02"]);
        let stale_operand =
            AssetSubset::new(key(), stale.subset_with_partition_keys(["2024-01-02"]));
        let empty = ValidAssetSubset::empty(key(), Some(&current));

        assert_eq!(&subset | &stale_operand, &subset | &empty);
        assert_eq!(&subset & &stale_operand, &subset & &empty);
        assert_eq!(&subset - &stale_operand, &subset - &empty);
        assert_eq!(&subset - &stale_operand, subset);
    }

    #[test]
    fn partitioned_operand_against_unpartitioned_subset_is_empty() {
        let subset = unpartitioned(true);
        let operand = AssetSubset::new(key(), letters().subset_with_partition_keys(["a"]));
        assert_eq!((&subset & &operand).bool_value(), Some(false));
        assert_eq!((&subset - &operand).bool_value(), Some(true));
        assert_eq!((&subset | &operand).bool_value(), Some(true));
    }

    #[test]
    fn valid_operand_of_other_shape_contributes_nothing() {
        let partitioned = ValidAssetSubset::from_partition_keys(key(), &letters(), ["a", "b"]);
        let flag = unpartitioned(true);
        assert_eq!(&partitioned - &flag, partitioned);
        assert!((&partitioned & &flag).is_empty());
        assert_eq!((&flag & &partitioned).bool_value(), Some(false));
    }

    #[test]
    fn results_keep_left_key() {
        let other_key = AssetKey::new(["customers"]).unwrap();
        let lhs = unpartitioned(true);
        let rhs = ValidAssetSubset::empty(other_key, None);
        assert_eq!((&lhs | &rhs).key(), &key());
    }

    #[test]
    fn coerce_from_subset_checks_compatibility() {
        let def = letters();
        let raw = EntitySubset::new(EntityKey::from(key()), true);
        let coerced = ValidAssetSubset::coerce_from_subset(&raw, Some(&def)).unwrap();
        assert!(coerced.is_partitioned());
        assert!(coerced.is_empty());

        let check = EntitySubset::new(EntityKey::from(key().check("fresh")), true);
        assert!(ValidAssetSubset::coerce_from_subset(&check, None).is_err());
    }

    #[test]
    fn from_asset_partitions_set_ignores_unpartitioned_entries() {
        let def = letters();
        let set = BTreeSet::from([
            AssetKeyPartitionKey::partitioned(key(), "b"),
            AssetKeyPartitionKey::new(key(), None),
        ]);
        let subset = ValidAssetSubset::from_asset_partitions_set(key(), Some(&def), &set);
        assert_eq!(keys_of(&subset), BTreeSet::from(["b".into()]));

        let flag = ValidAssetSubset::from_asset_partitions_set(key(), None, &set);
        assert_eq!(flag.bool_value(), Some(true));
        let none = ValidAssetSubset::from_asset_partitions_set(key(), None, &BTreeSet::<AssetKeyPartitionKey>::new());
        assert_eq!(none.bool_value(), Some(false));
    }

    fn letter_set() -> impl Strategy<Value = BTreeSet<String>> {
        prop::collection::btree_set(prop::sample::select(LETTERS.to_vec()), 0..LETTERS.len())
            .prop_map(|s| s.into_iter().map(String::from).collect())
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Unpartitioned subsets behave like booleans.
        #[test]
        fn unpartitioned_algebra_is_boolean(a in any::<bool>(), b in any::<bool>()) {
            let lhs = unpartitioned(a);
            let rhs = AssetSubset::new(key(), b);

            prop_assert_eq!((&lhs & &rhs).bool_value(), Some(a && b));
            prop_assert_eq!((&lhs | &rhs).bool_value(), Some(a || b));
            prop_assert_eq!((&lhs - &rhs).bool_value(), Some(a && !b));
            prop_assert_eq!(lhs.inverse(None, None, None).unwrap().bool_value(), Some(!a));
        }

        /// Partitioned subsets over one definition follow set semantics.
        #[test]
        fn partitioned_algebra_is_set_algebra(a in letter_set(), b in letter_set()) {
            let def = letters();
            let lhs = ValidAssetSubset::from_partition_keys(key(), &def, a.clone());
            let rhs = AssetSubset::new(key(), def.subset_with_partition_keys(b.clone()));

            prop_assert_eq!(keys_of(&(&lhs & &rhs)), a.intersection(&b).cloned().collect::<BTreeSet<_>>());
            prop_assert_eq!(keys_of(&(&lhs | &rhs)), a.union(&b).cloned().collect::<BTreeSet<_>>());
            prop_assert_eq!(keys_of(&(&lhs - &rhs)), a.difference(&b).cloned().collect::<BTreeSet<_>>());
        }

        /// A subset and its inverse partition the key universe.
        #[test]
        fn inverse_partitions_universe(a in letter_set()) {
            let def = letters();
            let store = InMemoryDynamicPartitionsStore::new();
            let subset = ValidAssetSubset::from_partition_keys(key(), &def, a);
            let inverse = subset.inverse(Some(&def), Some(Utc::now()), Some(&store)).unwrap();

            prop_assert!((&subset & &inverse).is_empty());
            prop_assert_eq!((&subset | &inverse).size(), LETTERS.len());
        }

        #[test]
        fn get_valid_is_idempotent(a in letter_set()) {
            let subset = ValidAssetSubset::from_partition_keys(key(), &letters(), a);
            prop_assert_eq!(subset.get_valid(&subset), subset.clone());
        }
    }
}
