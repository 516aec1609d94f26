//! Entity keys: assets, asset checks and asset partitions.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Key of an asset: a non-empty path of name components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetKey(Vec<String>);

impl AssetKey {
    pub fn new<I, S>(path: I) -> DomainResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path: Vec<String> = path.into_iter().map(Into::into).collect();
        if path.is_empty() {
            return Err(DomainError::invalid_asset_key("path must not be empty"));
        }
        if path.iter().any(|p| p.is_empty()) {
            return Err(DomainError::invalid_asset_key(
                "path components must not be empty",
            ));
        }
        Ok(Self(path))
    }

    pub fn path(&self) -> &[String] {
        &self.0
    }

    /// Last path component.
    pub fn name(&self) -> &str {
        // Construction guarantees at least one component.
        self.0.last().map(String::as_str).unwrap_or_default()
    }

    /// Key of a check attached to this asset.
    pub fn check(&self, name: impl Into<String>) -> AssetCheckKey {
        AssetCheckKey {
            asset_key: self.clone(),
            name: name.into(),
        }
    }
}

impl core::fmt::Display for AssetKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

impl FromStr for AssetKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.split('/'))
    }
}

/// Key of a check defined against an asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetCheckKey {
    pub asset_key: AssetKey,
    pub name: String,
}

impl core::fmt::Display for AssetCheckKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.asset_key, self.name)
    }
}

/// Any entity whose materialization/evaluation state can be tracked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKey {
    Asset(AssetKey),
    AssetCheck(AssetCheckKey),
}

impl EntityKey {
    pub fn as_asset_key(&self) -> Option<&AssetKey> {
        match self {
            EntityKey::Asset(key) => Some(key),
            EntityKey::AssetCheck(_) => None,
        }
    }
}

impl From<AssetKey> for EntityKey {
    fn from(value: AssetKey) -> Self {
        Self::Asset(value)
    }
}

impl From<AssetCheckKey> for EntityKey {
    fn from(value: AssetCheckKey) -> Self {
        Self::AssetCheck(value)
    }
}

impl core::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EntityKey::Asset(key) => core::fmt::Display::fmt(key, f),
            EntityKey::AssetCheck(key) => core::fmt::Display::fmt(key, f),
        }
    }
}

/// An asset, optionally narrowed to a single partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetKeyPartitionKey {
    pub asset_key: AssetKey,
    pub partition_key: Option<String>,
}

impl AssetKeyPartitionKey {
    pub fn new(asset_key: AssetKey, partition_key: Option<String>) -> Self {
        Self {
            asset_key,
            partition_key,
        }
    }

    pub fn partitioned(asset_key: AssetKey, partition_key: impl Into<String>) -> Self {
        Self::new(asset_key, Some(partition_key.into()))
    }
}
