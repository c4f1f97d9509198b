//! Outline engine use-case service.
//!
//! # Responsibility
//! - Own the current graph state and sequence every submit against it.
//! - Turn commit payloads into scheduled sync jobs and dispatch them to a
//!   persistence sink on request.
//!
//! # Invariants
//! - A submit swaps in the new state before any of its jobs can be dispatched.
//! - A failed submit leaves state, revision and outbox untouched.
//! - Dispatch is fire-and-forget: failures are logged and reported, never
//!   retried and never rolled back into state.

use crate::config::EngineConfig;
use crate::graph::error::GraphResult;
use crate::graph::queries::GraphQueries;
use crate::graph::state::{GraphState, SubmitRequest};
use crate::graph::view::{plan_view, ViewOutcome};
use crate::model::item::{Clock, SystemClock, Timestamp};
use crate::model::path::Context;
use crate::sync::job::{PersistenceSink, SyncError, SyncJob, SyncQueue};
use log::{error, info};
use uuid::Uuid;

/// Per-flush dispatch summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub dispatched: usize,
    pub failed: Vec<(Uuid, SyncError)>,
    /// Jobs left queued because they are not yet due.
    pub deferred: usize,
}

/// Single-writer orchestrator around one [`GraphState`].
pub struct OutlineEngine<C: Clock = SystemClock> {
    state: GraphState,
    outbox: SyncQueue,
    config: EngineConfig,
    clock: C,
}

impl OutlineEngine<SystemClock> {
    /// Creates an engine over an empty graph using the wall clock.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> OutlineEngine<C> {
    pub fn with_clock(config: EngineConfig, clock: C) -> Self {
        Self::from_state(GraphState::new(), config, clock)
    }

    /// Resumes from a previously loaded state.
    pub fn from_state(state: GraphState, config: EngineConfig, clock: C) -> Self {
        Self {
            state,
            outbox: SyncQueue::new(),
            config,
            clock,
        }
    }

    pub fn state(&self) -> &GraphState {
        &self.state
    }

    pub fn queries(&self) -> GraphQueries<'_> {
        self.state.queries()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn revision(&self) -> u64 {
        self.state.revision()
    }

    /// Jobs scheduled but not yet dispatched.
    pub fn pending_sync(&self) -> impl Iterator<Item = &SyncJob> {
        self.outbox.pending()
    }

    /// Applies one submit and schedules its persistence payloads.
    ///
    /// Returns the new revision.
    ///
    /// # Errors
    /// - Propagates `GraphError::NotFound` and `GraphError::RankExhausted` from
    ///   the mutation protocol.
    pub fn submit(&mut self, request: &SubmitRequest) -> GraphResult<u64> {
        let now = self.clock.now_ms();
        let commit = self.state.submit_item(request, now)?;
        self.state = commit.state;

        let not_before_ms = now.saturating_add(delay_ms(self.config.sync_delay_ms));
        let revision = self.state.revision();
        for payload in commit.sync_payloads {
            self.outbox.push(SyncJob::new(revision, payload, not_before_ms));
        }
        Ok(revision)
    }

    /// Plans the view of `focus` with the configured redirect policy.
    pub fn plan_view(&self, focus: &[String], from: Option<&[String]>) -> GraphResult<ViewOutcome> {
        plan_view(&self.state.queries(), focus, from, &self.config)
    }

    /// Follows redirects until a renderable focus is reached.
    ///
    /// A redirect always targets a bare single-element path, which cannot
    /// redirect again, so this resolves in at most two plans.
    pub fn resolve_focus(&self, focus: &[String], from: Option<&[String]>) -> GraphResult<(Context, ViewOutcome)> {
        match self.plan_view(focus, from)? {
            ViewOutcome::Redirect(target) => {
                info!(
                    "event=view_redirect module=engine status=ok from_depth={} to_depth={}",
                    focus.len(),
                    target.len()
                );
                let outcome = self.plan_view(&target, None)?;
                Ok((target, outcome))
            }
            outcome => Ok((focus.to_vec(), outcome)),
        }
    }

    /// Dispatches every job due at the current clock time.
    pub fn flush_sync(&mut self, sink: &dyn PersistenceSink) -> FlushReport {
        let now = self.clock.now_ms();
        let due = self.outbox.drain_due(now);
        self.dispatch(sink, due)
    }

    /// Dispatches every queued job regardless of its scheduled time.
    pub fn flush_all(&mut self, sink: &dyn PersistenceSink) -> FlushReport {
        let jobs = self.outbox.drain_all();
        self.dispatch(sink, jobs)
    }

    fn dispatch(&self, sink: &dyn PersistenceSink, jobs: Vec<SyncJob>) -> FlushReport {
        let mut report = FlushReport {
            deferred: self.outbox.len(),
            ..FlushReport::default()
        };
        for job in jobs {
            match sink.sync_one(&job) {
                Ok(()) => {
                    report.dispatched += 1;
                    info!(
                        "event=sync_dispatch module=engine status=ok sink={} job_id={} revision={} context_updates={}",
                        sink.sink_id(),
                        job.job_id,
                        job.revision,
                        job.payload.context_updates.len()
                    );
                }
                Err(err) => {
                    error!(
                        "event=sync_dispatch module=engine status=error sink={} job_id={} revision={} error_code={}",
                        sink.sink_id(),
                        job.job_id,
                        job.revision,
                        err.code
                    );
                    report.failed.push((job.job_id, err));
                }
            }
        }
        report
    }
}

fn delay_ms(value: u64) -> Timestamp {
    Timestamp::try_from(value).unwrap_or(Timestamp::MAX)
}

#[cfg(test)]
mod tests {
    use super::OutlineEngine;
    use crate::config::EngineConfig;
    use crate::graph::error::GraphError;
    use crate::graph::state::SubmitRequest;
    use crate::model::item::Clock;
    use crate::model::rank::Rank;
    use crate::sync::job::{PersistenceSink, SyncError, SyncJob};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Clone)]
    struct ManualClock(Rc<Cell<i64>>);

    impl Clock for ManualClock {
        fn now_ms(&self) -> i64 {
            self.0.get()
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        jobs: RefCell<Vec<SyncJob>>,
        fail: bool,
    }

    impl PersistenceSink for RecordingSink {
        fn sink_id(&self) -> &str {
            "recording"
        }

        fn sync_one(&self, job: &SyncJob) -> Result<(), SyncError> {
            if self.fail {
                return Err(SyncError::new("recording", "offline", "sink offline"));
            }
            self.jobs.borrow_mut().push(job.clone());
            Ok(())
        }
    }

    fn engine() -> (OutlineEngine<ManualClock>, Rc<Cell<i64>>) {
        let time = Rc::new(Cell::new(1_000));
        let engine = OutlineEngine::with_clock(EngineConfig::default(), ManualClock(time.clone()));
        (engine, time)
    }

    fn path(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn submit_is_visible_before_sync_is_due() {
        let (mut engine, time) = engine();
        let sink = RecordingSink::default();

        let revision = engine
            .submit(&SubmitRequest::thought("Cat", path(&["Animal"]), Rank(0)))
            .unwrap();
        assert_eq!(revision, 1);
        assert_eq!(engine.queries().children_of(&["Animal"]), vec!["Cat"]);

        let early = engine.flush_sync(&sink);
        assert_eq!(early.dispatched, 0);
        assert_eq!(early.deferred, 1);

        time.set(1_100);
        let report = engine.flush_sync(&sink);
        assert_eq!(report.dispatched, 1);
        assert_eq!(sink.jobs.borrow()[0].payload.item.value, "Cat");
        assert_eq!(engine.pending_sync().count(), 0);
    }

    #[test]
    fn failed_dispatch_is_reported_and_not_retried() {
        let (mut engine, _time) = engine();
        let failing = RecordingSink {
            fail: true,
            ..RecordingSink::default()
        };

        engine
            .submit(&SubmitRequest::thought("Cat", path(&["Animal"]), Rank(0)))
            .unwrap();
        let report = engine.flush_all(&failing);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].1.code, "offline");

        assert_eq!(engine.pending_sync().count(), 0);
        assert_eq!(engine.revision(), 1);
        assert!(engine.state().items().exists("Cat"));
    }

    #[test]
    fn failed_submit_schedules_nothing() {
        let (mut engine, _time) = engine();
        let err = engine
            .submit(&SubmitRequest::as_context("Pet", path(&["Cat"])))
            .unwrap_err();
        assert!(matches!(err, GraphError::NotFound { .. }));
        assert_eq!(engine.revision(), 0);
        assert_eq!(engine.pending_sync().count(), 0);
    }

    #[test]
    fn resolve_focus_follows_redirect_to_bare_signifier() {
        let (mut engine, _time) = engine();
        engine
            .submit(&SubmitRequest::thought("Dog", path(&["Animal"]), Rank(0)))
            .unwrap();

        let (focus, _) = engine.resolve_focus(&path(&["Animal", "Dog"]), None).unwrap();
        assert_eq!(focus, path(&["Dog"]));
    }
}
