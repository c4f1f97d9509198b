//! Core data engine for a multi-context outliner.
//!
//! Items are identified by their text and may live in any number of
//! contexts at once. This crate owns the in-memory graph, its invariants
//! and the deferred hand-off of writes to persistence.

pub mod config;
pub mod db;
pub mod graph;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod store;
pub mod sync;

pub use config::{ConfigError, EngineConfig, RedirectPolicy};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use graph::error::{GraphError, GraphResult};
pub use graph::queries::{display_sort_key, GraphQueries};
pub use graph::state::{Commit, GraphState, IndexRebuild, SubmitRequest};
pub use graph::view::{plan_view, Subheading, ViewChild, ViewOutcome, ViewPlan};
pub use logging::{default_log_level, init_logging, init_logging_with_config, LoggingError};
pub use model::item::{Clock, ContextChild, ContextMembership, Item, SystemClock, Timestamp};
pub use model::path::{decode_path, encode_path, Context, PathDecodeError, ROOT_VALUE};
pub use model::rank::Rank;
pub use repo::graph_repo::{
    GraphRepoError, GraphRepoResult, GraphRepository, SqliteGraphRepository, SQLITE_SINK_ID,
};
pub use service::outline_engine::{FlushReport, OutlineEngine};
pub use sync::job::{PersistenceSink, SyncError, SyncJob, SyncPayload, SyncQueue};
pub use sync::sink_registry::{SinkRegistry, SinkRegistryError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
