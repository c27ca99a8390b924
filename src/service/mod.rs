//! Collaborator ports and their built-in implementations.
//!
//! The engine talks to four services: a state store, a router, a work
//! loader and a logger. Each is a trait object so deployments can swap in
//! their own; [`Services`] holds the registries those swaps are resolved
//! from.

pub mod loader;
pub mod logger;
pub mod memory_router;
pub mod memory_state;

use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::Workhorse;
use crate::error::Result;
use crate::href::{Module, Registry};
use crate::model::work::{Response, Route, Work, WorkId};

pub use loader::RegistryWorkLoader;
pub use logger::{ConsoleLogger, MemoryLogger};
pub use memory_router::MemoryRouter;
pub use memory_state::MemoryStateManager;

// ---------------------------------------------------------------------------
// Behavior
// ---------------------------------------------------------------------------

/// Executable logic for a work item.
#[async_trait]
pub trait Runnable: Send + Sync {
    /// Primary entry point. An `Err` is recorded as the work's failure.
    async fn run(&self, work: &Work) -> anyhow::Result<Response>;

    /// Finalizer, if this behavior has one.
    fn finalizer(&self) -> Option<&dyn Finalizer> {
        None
    }
}

/// Runs once every child of a work item has finished.
#[async_trait]
pub trait Finalizer: Send + Sync {
    async fn on_children_done(&self, work: &Work) -> anyhow::Result<serde_json::Value>;
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Outcome of reporting one finished child to its parent.
#[derive(Debug, Clone)]
pub struct FanIn {
    /// Parent as persisted after the report.
    pub parent: Work,
    /// True only for the report that completed the parent's children.
    pub closed: bool,
}

/// Durable work state.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Persist `work`, assigning `id` and `created` on first save and
    /// refreshing `updated` every time.
    async fn save(&self, work: &mut Work) -> Result<()>;

    async fn save_all(&self, works: &mut [Work]) -> Result<()>;

    async fn load(&self, id: WorkId) -> Result<Option<Work>>;

    /// Load several records. Unknown ids are skipped.
    async fn load_all(&self, ids: &[WorkId]) -> Result<Vec<Work>>;

    /// Record `child` as finished on `parent`.
    ///
    /// Load, append, save and the closure check happen as one atomic step
    /// per parent, so concurrent siblings close the fan-in exactly once.
    async fn child_work_finished(&self, parent: WorkId, child: WorkId) -> Result<FanIn>;
}

/// Hands work references to wherever they execute next.
///
/// The engine handle is passed on every call; routers hold no reference
/// back to it.
#[async_trait]
pub trait Router: Send + Sync {
    async fn route(&self, workhorse: &Workhorse, route: Route) -> Result<()>;

    async fn route_finalizer(&self, workhorse: &Workhorse, route: Route) -> Result<()>;
}

/// Maps a behavior ref to the behavior that runs it.
#[async_trait]
pub trait WorkLoader: Send + Sync {
    async fn get_work(&self, behavior_ref: &str) -> Result<Arc<dyn Runnable>>;
}

/// Work-scoped logging sink.
#[async_trait]
pub trait WorkLogger: Send + Sync {
    fn log(&self, message: &str);

    fn log_outside_work(&self, work: &Work, message: &str, error: Option<&str>);

    async fn work_ended(&self, work: &Work) -> Result<()>;

    async fn flush(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Registries
// ---------------------------------------------------------------------------

pub type BehaviorRegistry = Registry<Arc<dyn Runnable>>;

/// Built-in names, as written in config.
pub mod builtin {
    pub const REGISTRY_WORK_LOADER: &str = ":RegistryWorkLoader";
    pub const MEMORY_STATE_MANAGER: &str = ":MemoryStateManager";
    pub const MEMORY_ROUTER: &str = ":MemoryRouter";
    pub const CONSOLE_LOGGER: &str = ":ConsoleLogger";
    pub const MEMORY_LOGGER: &str = ":MemoryLogger";
}

/// Every registry a [`Workhorse`] resolves its collaborators from.
///
/// Built-ins are present from construction. Plugins are added with
/// `register_module` on the relevant registry before building the engine.
pub struct Services {
    pub behaviors: Arc<BehaviorRegistry>,
    pub work_loaders: Registry<Arc<dyn WorkLoader>>,
    pub state_managers: Registry<Arc<dyn StateStore>>,
    pub routers: Registry<Arc<dyn Router>>,
    pub loggers: Registry<Arc<dyn WorkLogger>>,
}

impl Services {
    pub fn new(behaviors: BehaviorRegistry) -> Self {
        let behaviors = Arc::new(behaviors);

        let loader_behaviors = Arc::clone(&behaviors);
        let work_loaders = Registry::new(Module::new().component("RegistryWorkLoader", move || {
            Arc::new(RegistryWorkLoader::new(Arc::clone(&loader_behaviors))) as Arc<dyn WorkLoader>
        }));

        let state_managers = Registry::new(Module::new().component("MemoryStateManager", || {
            Arc::new(MemoryStateManager::new()) as Arc<dyn StateStore>
        }));

        let routers = Registry::new(
            Module::new().component("MemoryRouter", || Arc::new(MemoryRouter::new()) as Arc<dyn Router>),
        );

        let loggers = Registry::new(
            Module::new()
                .component("ConsoleLogger", || Arc::new(ConsoleLogger) as Arc<dyn WorkLogger>)
                .component("MemoryLogger", || {
                    Arc::new(MemoryLogger::new()) as Arc<dyn WorkLogger>
                }),
        );

        Self {
            behaviors,
            work_loaders,
            state_managers,
            routers,
            loggers,
        }
    }
}

impl Default for Services {
    fn default() -> Self {
        Self::new(BehaviorRegistry::default())
    }
}
