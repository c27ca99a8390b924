//! The orchestrator: run work, spawn children, fan in, finalize.
//!
//! Every step awaits its collaborator before the next one starts, so side
//! effects for one work item land in a fixed order:
//! start → run → save → spawn → flush → report to parent.

use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use tokio::task::JoinError;
use tracing::{Instrument, debug, info};

use crate::error::{Error, Result};
use crate::model::work::{Outcome, ResultStatus, Response, Route, Work, WorkId};
use crate::service::{Router, Runnable, StateStore, WorkLoader, WorkLogger};
use crate::telemetry::metrics;
use crate::telemetry::work::{record_state_transition, start_work_span};

use super::builder::WorkhorseBuilder;

/// What to run: a fresh work item, or an existing record.
#[derive(Debug, Clone)]
pub enum WorkRequest {
    New {
        behavior_ref: String,
        input: serde_json::Value,
    },
    Existing {
        work: Work,
        /// Replaces the record's input when set.
        input: Option<serde_json::Value>,
    },
}

impl From<&str> for WorkRequest {
    fn from(behavior_ref: &str) -> Self {
        behavior_ref.to_string().into()
    }
}

impl From<String> for WorkRequest {
    fn from(behavior_ref: String) -> Self {
        WorkRequest::New {
            behavior_ref,
            input: serde_json::Value::Null,
        }
    }
}

impl From<(&str, serde_json::Value)> for WorkRequest {
    fn from((behavior_ref, input): (&str, serde_json::Value)) -> Self {
        WorkRequest::New {
            behavior_ref: behavior_ref.to_string(),
            input,
        }
    }
}

impl From<Work> for WorkRequest {
    fn from(work: Work) -> Self {
        WorkRequest::Existing { work, input: None }
    }
}

impl From<(Work, serde_json::Value)> for WorkRequest {
    fn from((work, input): (Work, serde_json::Value)) -> Self {
        WorkRequest::Existing {
            work,
            input: Some(input),
        }
    }
}

/// Handle to the engine. Cloning is cheap; clones share collaborators.
#[derive(Clone)]
pub struct Workhorse {
    inner: Arc<Inner>,
}

struct Inner {
    loader: Arc<dyn WorkLoader>,
    state: Arc<dyn StateStore>,
    router: Arc<dyn Router>,
    logger: Arc<dyn WorkLogger>,
}

impl std::fmt::Debug for Workhorse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workhorse").finish_non_exhaustive()
    }
}

impl Workhorse {
    pub fn builder() -> WorkhorseBuilder {
        WorkhorseBuilder::new()
    }

    /// Assemble an engine from ready collaborators.
    pub fn from_parts(
        loader: Arc<dyn WorkLoader>,
        state: Arc<dyn StateStore>,
        router: Arc<dyn Router>,
        logger: Arc<dyn WorkLogger>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                loader,
                state,
                router,
                logger,
            }),
        }
    }

    pub fn state(&self) -> &Arc<dyn StateStore> {
        &self.inner.state
    }

    pub fn router(&self) -> &Arc<dyn Router> {
        &self.inner.router
    }

    pub fn loader(&self) -> &Arc<dyn WorkLoader> {
        &self.inner.loader
    }

    pub fn logger(&self) -> &Arc<dyn WorkLogger> {
        &self.inner.logger
    }

    // -----------------------------------------------------------------------
    // Public API
    // -----------------------------------------------------------------------

    /// Persist the request and hand it to the router. Does not run it.
    pub async fn route(&self, request: impl Into<WorkRequest>) -> Result<Work> {
        let work = self.normalize(request.into()).await?;
        let id = work.require_id()?;
        self.inner.router.route(self, Route::work(id)).await?;
        metrics::work_routed().add(1, &[KeyValue::new("kind", "work")]);
        Ok(work)
    }

    /// Persist the request and run it to completion.
    ///
    /// A failing behavior still returns `Ok`; inspect `work.result`. `Err`
    /// means the behavior could not be resolved or a collaborator failed.
    pub async fn run(&self, request: impl Into<WorkRequest>) -> Result<Work> {
        let work = self.normalize(request.into()).await?;
        self.inner
            .logger
            .log(&format!("Loading work: {}", work.label()));
        let runnable = self.inner.loader.get_work(&work.behavior_ref).await?;

        let span = start_work_span(&work);
        span.record("work.phase", Phase::Run.as_str());
        if let Some(parent) = work.parent_id {
            span.record("work.parent_id", tracing::field::display(parent));
        }
        self.run_work(work, runnable, &span)
            .instrument(span.clone())
            .await
    }

    /// Run the finalizer of `work`'s behavior and record its result.
    ///
    /// A saved work item is reloaded first, so the finalizer sees every
    /// child reported since the caller's copy was taken.
    pub async fn run_finalizer(&self, work: Work) -> Result<Work> {
        let work = match work.id {
            Some(id) => self.load(id).await?,
            None => {
                let mut work = work;
                self.inner.state.save(&mut work).await?;
                work
            }
        };
        self.finalize(work).await
    }

    /// Load a stored record and run it. What a router calls for a work route.
    pub async fn run_by_id(&self, id: WorkId) -> Result<Work> {
        let work = self.load(id).await?;
        self.run(work).await
    }

    /// Load a stored record and run its finalizer.
    pub async fn run_finalizer_by_id(&self, id: WorkId) -> Result<Work> {
        let work = self.load(id).await?;
        self.finalize(work).await
    }

    /// Current stored record for `id`.
    pub async fn load(&self, id: WorkId) -> Result<Work> {
        self.inner
            .state
            .load(id)
            .await?
            .ok_or(Error::NotFound(id))
    }

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    async fn normalize(&self, request: WorkRequest) -> Result<Work> {
        match request {
            WorkRequest::New {
                behavior_ref,
                input,
            } => {
                let mut work = Work::new(behavior_ref, input);
                self.inner.state.save(&mut work).await?;
                Ok(work)
            }
            WorkRequest::Existing { mut work, input } => {
                let replaced = input.is_some();
                if let Some(input) = input {
                    work.input = input;
                }
                if replaced || work.id.is_none() {
                    self.inner.state.save(&mut work).await?;
                }
                Ok(work)
            }
        }
    }

    async fn run_work(
        &self,
        mut work: Work,
        runnable: Arc<dyn Runnable>,
        span: &tracing::Span,
    ) -> Result<Work> {
        let logger = &self.inner.logger;

        work.result.start()?;
        record_state_transition(span, ResultStatus::NotStarted, ResultStatus::Running);
        self.inner.state.save(&mut work).await?;

        logger.log_outside_work(&work, "Running work", None);
        let started = Instant::now();
        let children = match call_run(&runnable, &work).await {
            Ok(response) => {
                logger.log_outside_work(&work, "Work succeeded", None);
                work.result.end(Outcome::Success(response.result))?;
                response.child_work
            }
            Err(e) => {
                let error = format!("{e:#}");
                logger.log_outside_work(&work, "Work failed", Some(&error));
                work.result.end(Outcome::Failure(error))?;
                None
            }
        };
        record_state_transition(span, ResultStatus::Running, ResultStatus::Ended);
        record_run_metrics(&work, Phase::Run, started);

        self.inner.state.save(&mut work).await?;

        if let Some(children) = children.filter(|c| !c.is_empty()) {
            self.spawn_children(&mut work, children).await?;
        }

        logger.flush().await?;
        self.on_ended(&work).await?;
        Ok(work)
    }

    /// Save the children, record them on the parent, then route them.
    ///
    /// The parent's `children_ids` is durable before the first route is
    /// issued, so no child can report completion to a parent that does not
    /// list it yet.
    async fn spawn_children(&self, parent: &mut Work, mut children: Vec<Work>) -> Result<()> {
        let parent_id = parent.require_id()?;
        for child in &mut children {
            child.parent_id = Some(parent_id);
        }
        self.inner.state.save_all(&mut children).await?;

        parent.children_ids = children
            .iter()
            .map(Work::require_id)
            .collect::<Result<Vec<_>>>()?;
        self.inner.state.save(parent).await?;
        info!(
            parent = %parent_id,
            children = parent.children_ids.len(),
            "children spawned"
        );

        for child in &children {
            self.inner.logger.log_outside_work(
                parent,
                &format!("Routing child work: {}", child.label()),
                None,
            );
            self.inner
                .router
                .route(self, Route::work(child.require_id()?))
                .await?;
            metrics::work_routed().add(1, &[KeyValue::new("kind", "child")]);
        }
        Ok(())
    }

    /// Report `work` as ended and, if it has a parent, fan in.
    async fn on_ended(&self, work: &Work) -> Result<()> {
        self.inner.logger.work_ended(work).await?;

        let Some(parent_id) = work.parent_id else {
            return Ok(());
        };
        let fan_in = self
            .inner
            .state
            .child_work_finished(parent_id, work.require_id()?)
            .await?;
        debug!(
            parent = %parent_id,
            finished = fan_in.parent.finished_children_ids.len(),
            total = fan_in.parent.children_ids.len(),
            closed = fan_in.closed,
            "reported to parent"
        );

        if fan_in.closed {
            self.check_run_finalizer(&fan_in.parent).await?;
        }
        Ok(())
    }

    async fn finalize(&self, work: Work) -> Result<Work> {
        let runnable = self.inner.loader.get_work(&work.behavior_ref).await?;

        let span = start_work_span(&work);
        span.record("work.phase", Phase::Finalize.as_str());
        self.run_finalizer_work(work, runnable, &span)
            .instrument(span.clone())
            .await
    }

    async fn check_run_finalizer(&self, parent: &Work) -> Result<()> {
        let runnable = self.inner.loader.get_work(&parent.behavior_ref).await?;
        let behavior = KeyValue::new("behavior", parent.behavior_ref.clone());

        if runnable.finalizer().is_none() {
            self.inner.logger.log_outside_work(
                parent,
                "All children are done, but no finalizer is defined",
                None,
            );
            metrics::fan_in_closed().add(1, &[behavior, KeyValue::new("finalizer", "none")]);
            return Ok(());
        }

        self.inner
            .logger
            .log_outside_work(parent, "Routing finalizer", None);
        self.inner
            .router
            .route_finalizer(self, Route::finalizer(parent.require_id()?))
            .await?;
        metrics::fan_in_closed().add(1, &[behavior, KeyValue::new("finalizer", "routed")]);
        metrics::work_routed().add(1, &[KeyValue::new("kind", "finalizer")]);
        Ok(())
    }

    async fn run_finalizer_work(
        &self,
        mut work: Work,
        runnable: Arc<dyn Runnable>,
        span: &tracing::Span,
    ) -> Result<Work> {
        if runnable.finalizer().is_none() {
            return Err(Error::NoFinalizer(work.behavior_ref.clone()));
        }
        let logger = &self.inner.logger;

        work.finalizer_result.get_or_insert_with(Default::default).start()?;
        record_state_transition(span, ResultStatus::NotStarted, ResultStatus::Running);
        self.inner.state.save(&mut work).await?;

        logger.log_outside_work(&work, "Starting finalizer", None);
        let started = Instant::now();
        let outcome = match call_finalizer(&runnable, &work).await {
            Ok(value) => {
                logger.log_outside_work(&work, "Finalizer succeeded", None);
                Outcome::Success(value)
            }
            Err(e) => {
                let error = format!("{e:#}");
                logger.log_outside_work(&work, "Finalizer failed", Some(&error));
                Outcome::Failure(error)
            }
        };
        if let Some(result) = work.finalizer_result.as_mut() {
            result.end(outcome)?;
        }
        record_state_transition(span, ResultStatus::Running, ResultStatus::Ended);
        record_run_metrics(&work, Phase::Finalize, started);

        self.inner.state.save(&mut work).await?;
        Ok(work)
    }
}

/// Run the behavior on its own task so a panic ends the work as a failure.
async fn call_run(runnable: &Arc<dyn Runnable>, work: &Work) -> anyhow::Result<Response> {
    let runnable = Arc::clone(runnable);
    let work = work.clone();
    tokio::spawn(async move { runnable.run(&work).await }.in_current_span())
        .await
        .unwrap_or_else(|e| Err(behavior_died(e)))
}

async fn call_finalizer(
    runnable: &Arc<dyn Runnable>,
    work: &Work,
) -> anyhow::Result<serde_json::Value> {
    let runnable = Arc::clone(runnable);
    let work = work.clone();
    tokio::spawn(
        async move {
            match runnable.finalizer() {
                Some(finalizer) => finalizer.on_children_done(&work).await,
                None => Err(Error::NoFinalizer(work.behavior_ref.clone()).into()),
            }
        }
        .in_current_span(),
    )
    .await
    .unwrap_or_else(|e| Err(behavior_died(e)))
}

fn behavior_died(err: JoinError) -> anyhow::Error {
    if !err.is_panic() {
        return anyhow::anyhow!("behavior task was cancelled");
    }
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    anyhow::anyhow!("behavior panicked: {message}")
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Run,
    Finalize,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Phase::Run => "run",
            Phase::Finalize => "finalize",
        }
    }
}

fn record_run_metrics(work: &Work, phase: Phase, started: Instant) {
    let result = match phase {
        Phase::Run => Some(&work.result),
        Phase::Finalize => work.finalizer_result.as_ref(),
    };
    let outcome = if result.is_some_and(|r| r.is_success()) {
        "success"
    } else {
        "failure"
    };
    let labels = [
        KeyValue::new("behavior", work.behavior_ref.clone()),
        KeyValue::new("outcome", outcome),
    ];
    match phase {
        Phase::Run => metrics::work_runs().add(1, &labels),
        Phase::Finalize => metrics::finalizer_runs().add(1, &labels),
    }
    metrics::operation_duration_ms().record(
        started.elapsed().as_secs_f64() * 1000.0,
        &[KeyValue::new("operation", phase.as_str())],
    );
}
