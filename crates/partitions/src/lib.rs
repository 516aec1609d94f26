//! Partition-aware subset algebra.
//!
//! ## Components
//!
//! - `PartitionsDefinition`: how an asset's data is subdivided (static keys,
//!   time windows, or a dynamically managed key set)
//! - `PartitionsSubset`: a selection of partition keys, optionally bound to the
//!   definition it was built against
//! - `EntitySubset`: a subset over one entity's key space (a bare boolean for
//!   unpartitioned entities)
//! - `ValidAssetSubset`: an asset subset known to be compatible with the current
//!   partitions definition; supports total set algebra
//!
//! The partition universe of time-window and dynamic definitions is open-ended,
//! so anything that needs "all keys" (complement, `all`) takes an explicit
//! evaluation time and `DynamicPartitionsStore`.

pub mod definition;
pub mod entity_subset;
pub mod store;
pub mod subset;
pub mod valid;

pub use definition::{
    Cadence, DynamicPartitionsDefinition, PartitionsDefinition, StaticPartitionsDefinition,
    TimeWindowPartitionsDefinition,
};
pub use entity_subset::{AssetSubset, EntitySubset, SubsetKey, SubsetValue};
pub use store::{DynamicPartitionsStore, InMemoryDynamicPartitionsStore};
pub use subset::{
    AllPartitionsSubset, DefaultPartitionsSubset, PartitionsSubset, TimeWindowPartitionsSubset,
};
pub use valid::{SubsetOperand, ValidAssetSubset};
