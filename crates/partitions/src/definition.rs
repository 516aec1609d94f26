//! Partitions definitions: how an asset's data is subdivided.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

use assetflow_core::{DomainError, DomainResult};

use crate::store::DynamicPartitionsStore;
use crate::subset::{DefaultPartitionsSubset, PartitionsSubset, TimeWindowPartitionsSubset};

/// Partitioning scheme of an asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PartitionsDefinition {
    Static(StaticPartitionsDefinition),
    TimeWindow(TimeWindowPartitionsDefinition),
    Dynamic(DynamicPartitionsDefinition),
}

impl PartitionsDefinition {
    /// Resolve every partition key that exists at `current_time`, in definition order.
    pub fn get_partition_keys(
        &self,
        current_time: DateTime<Utc>,
        dynamic_partitions_store: &dyn DynamicPartitionsStore,
    ) -> Vec<String> {
        match self {
            PartitionsDefinition::Static(def) => def.keys.clone(),
            PartitionsDefinition::TimeWindow(def) => def.partition_keys(current_time),
            PartitionsDefinition::Dynamic(def) => {
                dynamic_partitions_store.get_dynamic_partitions(&def.name)
            }
        }
    }

    pub fn has_partition_key(
        &self,
        partition_key: &str,
        current_time: DateTime<Utc>,
        dynamic_partitions_store: &dyn DynamicPartitionsStore,
    ) -> bool {
        match self {
            PartitionsDefinition::Static(def) => def.keys.iter().any(|k| k == partition_key),
            PartitionsDefinition::TimeWindow(def) => def
                .partition_keys(current_time)
                .iter()
                .any(|k| k == partition_key),
            PartitionsDefinition::Dynamic(def) => {
                dynamic_partitions_store.has_dynamic_partition(&def.name, partition_key)
            }
        }
    }

    /// Subset containing no keys, shaped for this definition.
    pub fn empty_subset(&self) -> PartitionsSubset {
        self.subset_with_partition_keys(std::iter::empty::<String>())
    }

    /// Subset containing exactly `partition_keys`.
    ///
    /// Time-window subsets stay bound to their definition; other subsets are
    /// plain key sets.
    pub fn subset_with_partition_keys<I, S>(&self, partition_keys: I) -> PartitionsSubset
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys = partition_keys.into_iter().map(Into::into).collect();
        match self {
            PartitionsDefinition::TimeWindow(def) => {
                PartitionsSubset::TimeWindow(TimeWindowPartitionsSubset::new(def.clone(), keys))
            }
            PartitionsDefinition::Static(_) | PartitionsDefinition::Dynamic(_) => {
                PartitionsSubset::Default(DefaultPartitionsSubset::new(keys))
            }
        }
    }
}

impl From<StaticPartitionsDefinition> for PartitionsDefinition {
    fn from(value: StaticPartitionsDefinition) -> Self {
        Self::Static(value)
    }
}

impl From<TimeWindowPartitionsDefinition> for PartitionsDefinition {
    fn from(value: TimeWindowPartitionsDefinition) -> Self {
        Self::TimeWindow(value)
    }
}

impl From<DynamicPartitionsDefinition> for PartitionsDefinition {
    fn from(value: DynamicPartitionsDefinition) -> Self {
        Self::Dynamic(value)
    }
}

/// Fixed, ordered set of partition keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StaticPartitionsDefinition {
    keys: Vec<String>,
}

impl StaticPartitionsDefinition {
    pub fn new<I, S>(keys: I) -> DomainResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        let mut seen = HashSet::with_capacity(keys.len());
        for key in &keys {
            if !seen.insert(key.as_str()) {
                return Err(DomainError::validation(format!(
                    "duplicate static partition key '{key}'"
                )));
            }
        }
        Ok(Self { keys })
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

/// Length of one time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Cadence {
    fn default_fmt(self) -> &'static str {
        match self {
            Cadence::Hourly => "%Y-%m-%d-%H:%M",
            Cadence::Daily | Cadence::Weekly | Cadence::Monthly => "%Y-%m-%d",
        }
    }
}

/// One partition per completed time window since `start`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindowPartitionsDefinition {
    start: DateTime<Utc>,
    cadence: Cadence,
    fmt: String,
    /// Extra windows past the last completed one (negative hides completed windows).
    end_offset: i32,
}

impl TimeWindowPartitionsDefinition {
    pub fn new(start: DateTime<Utc>, cadence: Cadence) -> Self {
        Self {
            start,
            cadence,
            fmt: cadence.default_fmt().to_string(),
            end_offset: 0,
        }
    }

    pub fn hourly(start: DateTime<Utc>) -> Self {
        Self::new(start, Cadence::Hourly)
    }

    pub fn daily(start: DateTime<Utc>) -> Self {
        Self::new(start, Cadence::Daily)
    }

    pub fn weekly(start: DateTime<Utc>) -> Self {
        Self::new(start, Cadence::Weekly)
    }

    pub fn monthly(start: DateTime<Utc>) -> Self {
        Self::new(start, Cadence::Monthly)
    }

    pub fn with_fmt(mut self, fmt: impl Into<String>) -> Self {
        self.fmt = fmt.into();
        self
    }

    pub fn with_end_offset(mut self, end_offset: i32) -> Self {
        self.end_offset = end_offset;
        self
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    pub fn fmt(&self) -> &str {
        &self.fmt
    }

    /// Start of the window at `index` (0-based), if representable.
    pub fn window_start(&self, index: u32) -> Option<DateTime<Utc>> {
        let n = i64::from(index);
        match self.cadence {
            Cadence::Hourly => self.start.checked_add_signed(Duration::hours(n)),
            Cadence::Daily => self.start.checked_add_signed(Duration::days(n)),
            Cadence::Weekly => self.start.checked_add_signed(Duration::weeks(n)),
            Cadence::Monthly => self.start.checked_add_months(Months::new(index)),
        }
    }

    /// Number of windows that have fully elapsed at `current_time`.
    fn completed_windows(&self, current_time: DateTime<Utc>) -> u32 {
        let mut completed = 0u32;
        while let Some(end) = self.window_start(completed.saturating_add(1)) {
            if end > current_time || completed == u32::MAX {
                break;
            }
            completed += 1;
        }
        completed
    }

    pub fn partition_keys(&self, current_time: DateTime<Utc>) -> Vec<String> {
        let count = i64::from(self.completed_windows(current_time)) + i64::from(self.end_offset);
        let count = u32::try_from(count.max(0)).unwrap_or(u32::MAX);
        (0..count)
            .map_while(|i| self.window_start(i))
            .map(|start| start.format(&self.fmt).to_string())
            .collect()
    }
}

/// Partition keys managed at runtime through a `DynamicPartitionsStore`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DynamicPartitionsDefinition {
    name: String,
}

impl DynamicPartitionsDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
