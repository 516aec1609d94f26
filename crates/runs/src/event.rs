//! Events attached to runs.
//!
//! Run events are append-only. Run storage assigns each stored event a
//! globally increasing `storage_id`, which daemons use as a cursor when
//! tailing events of a given type (e.g. `RunFailure`).

use std::collections::BTreeMap;
use std::error::Error as StdError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use assetflow_core::RunId;

/// Kind of a run event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunEventType {
    /// Free-form message from the engine or a daemon
    EngineEvent,
    RunEnqueued,
    RunStart,
    RunSuccess,
    RunFailure,
    RunCanceled,
}

/// A typed metadata entry on an engine event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum MetadataValue {
    /// Link to another run
    Run(RunId),
    Text(String),
    Int(i64),
    Json(JsonValue),
}

/// Serializable description of an error and its cause chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableErrorInfo {
    pub message: String,
    /// Name of the error kind (e.g. `"RunStorageError"`)
    pub cls_name: Option<String>,
    /// Messages of the source chain, outermost first
    pub causes: Vec<String>,
}

impl SerializableErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cls_name: None,
            causes: Vec::new(),
        }
    }

    /// Capture `err` together with its `source()` chain.
    pub fn from_error(err: &(dyn StdError + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        Self {
            message: err.to_string(),
            cls_name: None,
            causes,
        }
    }

    pub fn with_cls_name(mut self, cls_name: impl Into<String>) -> Self {
        self.cls_name = Some(cls_name.into());
        self
    }
}

impl core::fmt::Display for SerializableErrorInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if let Some(cls) = &self.cls_name {
            write!(f, "{cls}: ")?;
        }
        f.write_str(&self.message)?;
        for cause in &self.causes {
            write!(f, "\ncaused by: {cause}")?;
        }
        Ok(())
    }
}

/// Structured payload of an engine event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineEventData {
    pub metadata: BTreeMap<String, MetadataValue>,
    pub error: Option<SerializableErrorInfo>,
}

impl EngineEventData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(mut self, label: impl Into<String>, value: MetadataValue) -> Self {
        self.metadata.insert(label.into(), value);
        self
    }

    pub fn with_error(mut self, error: SerializableErrorInfo) -> Self {
        self.error = Some(error);
        self
    }
}

/// An event on a run, before storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub run_id: RunId,
    pub event_type: RunEventType,
    pub message: String,
    pub data: Option<EngineEventData>,
    pub timestamp: DateTime<Utc>,
}

impl RunEvent {
    pub fn new(run_id: RunId, event_type: RunEventType, message: impl Into<String>) -> Self {
        Self {
            run_id,
            event_type,
            message: message.into(),
            data: None,
            timestamp: Utc::now(),
        }
    }

    pub fn engine(run_id: RunId, message: impl Into<String>, data: Option<EngineEventData>) -> Self {
        Self {
            data,
            ..Self::new(run_id, RunEventType::EngineEvent, message)
        }
    }
}

/// A persisted run event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRunEvent {
    /// Global, monotonically increasing position across all runs.
    pub storage_id: u64,
    pub event: RunEvent,
}
