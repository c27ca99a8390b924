//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use serde_json::json;
use workhorse::behavior::Calculator;
use workhorse::model::work::{Response, Route, Work};
use workhorse::service::{
    BehaviorRegistry, Finalizer, MemoryLogger, MemoryRouter, MemoryStateManager, RegistryWorkLoader,
    Router, Runnable,
};
use workhorse::{Result, Workhorse};

// ---------------------------------------------------------------------------
// Behaviors
// ---------------------------------------------------------------------------

/// Always fails.
pub struct Failing;

#[async_trait]
impl Runnable for Failing {
    async fn run(&self, _work: &Work) -> anyhow::Result<Response> {
        bail!("disk on fire")
    }
}

/// Spawns `input.count` children of `input.child` and has no finalizer.
pub struct FanOutNoFinalizer;

#[async_trait]
impl Runnable for FanOutNoFinalizer {
    async fn run(&self, work: &Work) -> anyhow::Result<Response> {
        Ok(Response::new(json!("spawned")).with_children(children(work)))
    }
}

/// Spawns `input.count` children of `input.child`; finalizer counts them.
pub struct FanOut;

#[async_trait]
impl Runnable for FanOut {
    async fn run(&self, work: &Work) -> anyhow::Result<Response> {
        Ok(Response::new(json!("spawned")).with_children(children(work)))
    }

    fn finalizer(&self) -> Option<&dyn Finalizer> {
        Some(self)
    }
}

#[async_trait]
impl Finalizer for FanOut {
    async fn on_children_done(&self, work: &Work) -> anyhow::Result<serde_json::Value> {
        Ok(json!({"finished": work.finished_children_ids.len()}))
    }
}

/// Returns an empty child list.
pub struct EmptyChildren;

#[async_trait]
impl Runnable for EmptyChildren {
    async fn run(&self, _work: &Work) -> anyhow::Result<Response> {
        Ok(Response::new(json!(null)).with_children(Vec::new()))
    }

    fn finalizer(&self) -> Option<&dyn Finalizer> {
        Some(self)
    }
}

#[async_trait]
impl Finalizer for EmptyChildren {
    async fn on_children_done(&self, _work: &Work) -> anyhow::Result<serde_json::Value> {
        Ok(json!(null))
    }
}

/// Finalizer that fails.
pub struct BadFinalizer;

#[async_trait]
impl Runnable for BadFinalizer {
    async fn run(&self, work: &Work) -> anyhow::Result<Response> {
        Ok(Response::new(json!(1)).with_children(children(work)))
    }

    fn finalizer(&self) -> Option<&dyn Finalizer> {
        Some(self)
    }
}

#[async_trait]
impl Finalizer for BadFinalizer {
    async fn on_children_done(&self, _work: &Work) -> anyhow::Result<serde_json::Value> {
        bail!("could not summarize")
    }
}

/// Panics instead of returning.
pub struct Panicking;

#[async_trait]
impl Runnable for Panicking {
    async fn run(&self, _work: &Work) -> anyhow::Result<Response> {
        panic!("child exploded")
    }
}

/// Spawns children like [`FanOut`]; its finalizer panics.
pub struct PanickingFinalizer;

#[async_trait]
impl Runnable for PanickingFinalizer {
    async fn run(&self, work: &Work) -> anyhow::Result<Response> {
        Ok(Response::new(json!("spawned")).with_children(children(work)))
    }

    fn finalizer(&self) -> Option<&dyn Finalizer> {
        Some(self)
    }
}

#[async_trait]
impl Finalizer for PanickingFinalizer {
    async fn on_children_done(&self, _work: &Work) -> anyhow::Result<serde_json::Value> {
        panic!("summary exploded")
    }
}

/// Sleeps `input.ms` milliseconds, then succeeds.
pub struct Sleepy;

#[async_trait]
impl Runnable for Sleepy {
    async fn run(&self, work: &Work) -> anyhow::Result<Response> {
        let ms = work.input["ms"].as_u64().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(Response::new(json!(ms)))
    }
}

fn children(work: &Work) -> Vec<Work> {
    let count = work.input["count"].as_u64().unwrap_or(1);
    let child = work.input["child"].as_str().unwrap_or("calculator");
    (0..count)
        .map(|i| Work::new(child, json!({"x": i, "y": 1, "ms": (i % 4) * 3})))
        .collect()
}

pub fn behaviors() -> BehaviorRegistry {
    let mut behaviors = BehaviorRegistry::default();
    behaviors.register_component("calculator", || Arc::new(Calculator) as Arc<dyn Runnable>);
    behaviors.register_component("failing", || Arc::new(Failing) as Arc<dyn Runnable>);
    behaviors.register_component("fan-out", || Arc::new(FanOut) as Arc<dyn Runnable>);
    behaviors.register_component("fan-out-bare", || {
        Arc::new(FanOutNoFinalizer) as Arc<dyn Runnable>
    });
    behaviors.register_component("empty-children", || {
        Arc::new(EmptyChildren) as Arc<dyn Runnable>
    });
    behaviors.register_component("bad-finalizer", || Arc::new(BadFinalizer) as Arc<dyn Runnable>);
    behaviors.register_component("sleepy", || Arc::new(Sleepy) as Arc<dyn Runnable>);
    behaviors.register_component("panicking", || Arc::new(Panicking) as Arc<dyn Runnable>);
    behaviors.register_component("panicking-finalizer", || {
        Arc::new(PanickingFinalizer) as Arc<dyn Runnable>
    });
    behaviors
}

// ---------------------------------------------------------------------------
// Routers
// ---------------------------------------------------------------------------

/// What a [`RecordingRouter`] saw for one route.
#[derive(Debug, Clone)]
pub struct Seen {
    pub route: Route,
    /// For child routes: whether the stored parent already listed the child.
    pub parent_lists_child: Option<bool>,
}

/// Records routes. Forwards them to an inner router when one is given.
#[derive(Default)]
pub struct RecordingRouter {
    seen: Mutex<Vec<Seen>>,
    forward: Option<Arc<MemoryRouter>>,
}

impl RecordingRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forwarding(inner: Arc<MemoryRouter>) -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            forward: Some(inner),
        }
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    pub fn work_routes(&self) -> Vec<Route> {
        self.seen()
            .into_iter()
            .map(|s| s.route)
            .filter(|r| !r.is_finalizer)
            .collect()
    }

    pub fn finalizer_routes(&self) -> Vec<Route> {
        self.seen()
            .into_iter()
            .map(|s| s.route)
            .filter(|r| r.is_finalizer)
            .collect()
    }
}

#[async_trait]
impl Router for RecordingRouter {
    async fn route(&self, workhorse: &Workhorse, route: Route) -> Result<()> {
        let child = workhorse.load(route.work_id).await?;
        let parent_lists_child = match child.parent_id {
            Some(parent_id) => Some(
                workhorse
                    .load(parent_id)
                    .await?
                    .children_ids
                    .contains(&route.work_id),
            ),
            None => None,
        };
        self.seen.lock().unwrap().push(Seen {
            route,
            parent_lists_child,
        });
        match &self.forward {
            Some(inner) => inner.route(workhorse, route).await,
            None => Ok(()),
        }
    }

    async fn route_finalizer(&self, workhorse: &Workhorse, route: Route) -> Result<()> {
        self.seen.lock().unwrap().push(Seen {
            route,
            parent_lists_child: None,
        });
        match &self.forward {
            Some(inner) => inner.route_finalizer(workhorse, route).await,
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Engines
// ---------------------------------------------------------------------------

pub struct Harness {
    pub engine: Workhorse,
    pub state: Arc<MemoryStateManager>,
    pub logger: Arc<MemoryLogger>,
    pub recorder: Arc<RecordingRouter>,
    pub memory: Arc<MemoryRouter>,
}

impl Harness {
    pub async fn settle(&self) {
        self.memory.wait_idle().await;
    }
}

fn harness(recorder: RecordingRouter, memory: Arc<MemoryRouter>) -> Harness {
    let state = Arc::new(MemoryStateManager::new());
    let logger = Arc::new(MemoryLogger::new());
    let recorder = Arc::new(recorder);
    let engine = Workhorse::builder()
        .work_loader(Arc::new(RegistryWorkLoader::new(Arc::new(behaviors()))))
        .state_manager(state.clone())
        .router(recorder.clone())
        .logger(logger.clone())
        .build()
        .expect("engine builds");
    Harness {
        engine,
        state,
        logger,
        recorder,
        memory,
    }
}

/// Routes are recorded and executed in-process.
pub fn live() -> Harness {
    let memory = Arc::new(MemoryRouter::new());
    harness(RecordingRouter::forwarding(memory.clone()), memory)
}

/// Routes are only recorded; nothing runs unless the test drives it.
pub fn recording() -> Harness {
    harness(RecordingRouter::new(), Arc::new(MemoryRouter::new()))
}
