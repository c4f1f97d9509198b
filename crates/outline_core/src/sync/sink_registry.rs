//! In-process persistence sink registry and selection hooks.

use crate::sync::job::{PersistenceSink, SyncError, SyncJob};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

const REGISTRY_SINK_ID: &str = "registry";

/// Sink registration/selection errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkRegistryError {
    InvalidSinkId(String),
    DuplicateSinkId(String),
    SinkNotFound(String),
}

impl Display for SinkRegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSinkId(value) => write!(f, "sink id is invalid: {value}"),
            Self::DuplicateSinkId(value) => write!(f, "sink id already registered: {value}"),
            Self::SinkNotFound(value) => write!(f, "sink not found: {value}"),
        }
    }
}

impl Error for SinkRegistryError {}

/// Runtime registry of persistence sinks with one active selection.
///
/// The registry is itself a [`PersistenceSink`] that forwards to the active
/// sink, so the engine can flush against it directly.
#[derive(Default)]
pub struct SinkRegistry {
    sinks: BTreeMap<String, Arc<dyn PersistenceSink>>,
    active_sink_id: Option<String>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one sink.
    pub fn register(&mut self, sink: Arc<dyn PersistenceSink>) -> Result<(), SinkRegistryError> {
        let sink_id = sink.sink_id().trim().to_string();
        if !is_valid_sink_id(&sink_id) {
            return Err(SinkRegistryError::InvalidSinkId(sink_id));
        }
        if self.sinks.contains_key(sink_id.as_str()) {
            return Err(SinkRegistryError::DuplicateSinkId(sink_id));
        }

        self.sinks.insert(sink_id, sink);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Returns sorted sink ids.
    pub fn sink_ids(&self) -> Vec<String> {
        self.sinks.keys().cloned().collect()
    }

    /// Selects one active sink.
    pub fn select_active(&mut self, sink_id: &str) -> Result<(), SinkRegistryError> {
        let normalized = sink_id.trim();
        if !self.sinks.contains_key(normalized) {
            return Err(SinkRegistryError::SinkNotFound(normalized.to_string()));
        }
        self.active_sink_id = Some(normalized.to_string());
        Ok(())
    }

    pub fn clear_active(&mut self) {
        self.active_sink_id = None;
    }

    pub fn active_sink_id(&self) -> Option<&str> {
        self.active_sink_id.as_deref()
    }

    pub fn get(&self, sink_id: &str) -> Option<Arc<dyn PersistenceSink>> {
        self.sinks.get(sink_id.trim()).cloned()
    }

    pub fn active_sink(&self) -> Option<Arc<dyn PersistenceSink>> {
        let id = self.active_sink_id()?;
        self.get(id)
    }
}

impl PersistenceSink for SinkRegistry {
    fn sink_id(&self) -> &str {
        REGISTRY_SINK_ID
    }

    fn sync_one(&self, job: &SyncJob) -> Result<(), SyncError> {
        match self.active_sink() {
            Some(sink) => sink.sync_one(job),
            None => Err(SyncError::new(
                REGISTRY_SINK_ID,
                "sink_not_selected",
                "No active persistence sink selected.",
            )),
        }
    }
}

fn is_valid_sink_id(value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::{SinkRegistry, SinkRegistryError};
    use crate::model::item::Item;
    use crate::sync::job::{PersistenceSink, SyncError, SyncJob, SyncPayload};
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    struct RecordingSink {
        sink_id: String,
        received: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn new(sink_id: &str) -> Self {
            Self {
                sink_id: sink_id.to_string(),
                received: Mutex::new(Vec::new()),
            }
        }
    }

    impl PersistenceSink for RecordingSink {
        fn sink_id(&self) -> &str {
            &self.sink_id
        }

        fn sync_one(&self, job: &SyncJob) -> Result<(), SyncError> {
            self.received
                .lock()
                .expect("recording lock")
                .push(job.payload.item.value.clone());
            Ok(())
        }
    }

    fn job(value: &str) -> SyncJob {
        SyncJob::new(1, SyncPayload::new(Item::new(value, 0), BTreeMap::new()), 0)
    }

    #[test]
    fn registers_and_selects_sink() {
        let mut registry = SinkRegistry::new();
        registry
            .register(Arc::new(RecordingSink::new("sqlite")))
            .expect("sink should register");
        assert_eq!(registry.len(), 1);
        assert!(registry.active_sink_id().is_none());

        registry
            .select_active("  sqlite ")
            .expect("trimmed sink id should be selectable");
        assert_eq!(registry.active_sink_id(), Some("sqlite"));
    }

    #[test]
    fn rejects_invalid_or_duplicate_sink_id() {
        let mut registry = SinkRegistry::new();
        let invalid = registry.register(Arc::new(RecordingSink::new("Remote Store")));
        assert!(matches!(invalid, Err(SinkRegistryError::InvalidSinkId(_))));

        registry
            .register(Arc::new(RecordingSink::new("sqlite")))
            .expect("first sink should register");
        let duplicate = registry.register(Arc::new(RecordingSink::new("sqlite")));
        assert!(matches!(
            duplicate,
            Err(SinkRegistryError::DuplicateSinkId(_))
        ));
        assert!(matches!(
            registry.select_active("remote"),
            Err(SinkRegistryError::SinkNotFound(_))
        ));
    }

    #[test]
    fn forwards_jobs_to_active_sink_only() {
        let primary = Arc::new(RecordingSink::new("primary"));
        let backup = Arc::new(RecordingSink::new("backup"));
        let mut registry = SinkRegistry::new();
        registry.register(primary.clone()).unwrap();
        registry.register(backup.clone()).unwrap();

        let err = registry.sync_one(&job("Cat")).unwrap_err();
        assert_eq!(err.code, "sink_not_selected");

        registry.select_active("backup").unwrap();
        registry.sync_one(&job("Cat")).unwrap();
        assert!(primary.received.lock().unwrap().is_empty());
        assert_eq!(*backup.received.lock().unwrap(), vec!["Cat".to_string()]);

        registry.clear_active();
        assert!(registry.sync_one(&job("Dog")).is_err());
    }
}
