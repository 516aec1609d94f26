//! `assetflow-core`: shared building blocks.
//!
//! This crate contains **pure** primitives (no storage or daemon concerns):
//! error model, strongly-typed identifiers and entity keys.

pub mod error;
pub mod id;
pub mod key;

pub use error::{DomainError, DomainResult};
pub use id::RunId;
pub use key::{AssetCheckKey, AssetKey, AssetKeyPartitionKey, EntityKey};
