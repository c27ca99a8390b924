//! In-process router: every route becomes a tokio task.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{Instrument, debug, error, info_span};

use super::Router;
use crate::engine::Workhorse;
use crate::error::Result;
use crate::model::work::Route;

/// Runs routed work on the current tokio runtime.
///
/// Tracks how many routed tasks are in flight so callers can wait for a
/// whole work tree to settle with [`MemoryRouter::wait_idle`].
#[derive(Debug, Default)]
pub struct MemoryRouter {
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl MemoryRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routed tasks that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until no routed task is running.
    ///
    /// A task routes its children before it finishes, so the count only
    /// reaches zero once the whole tree has settled.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn dispatch(&self, workhorse: &Workhorse, route: Route) {
        let workhorse = workhorse.clone();
        let guard = InFlight::enter(Arc::clone(&self.in_flight), Arc::clone(&self.idle));
        let span = info_span!(
            "work.dispatch",
            "work.id" = %route.work_id,
            "work.finalizer" = route.is_finalizer,
        );

        tokio::spawn(
            async move {
                let _guard = guard;
                let outcome = if route.is_finalizer {
                    workhorse.run_finalizer_by_id(route.work_id).await
                } else {
                    workhorse.run_by_id(route.work_id).await
                };
                if let Err(e) = outcome {
                    error!(id = %route.work_id, "routed work failed: {e}");
                }
            }
            .instrument(span),
        );
    }
}

/// Decrements the in-flight count when the task ends, even on panic.
struct InFlight {
    count: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl InFlight {
    fn enter(count: Arc<AtomicUsize>, idle: Arc<Notify>) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self { count, idle }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

#[async_trait]
impl Router for MemoryRouter {
    async fn route(&self, workhorse: &Workhorse, route: Route) -> Result<()> {
        debug!(id = %route.work_id, "routing work");
        self.dispatch(workhorse, route);
        Ok(())
    }

    async fn route_finalizer(&self, workhorse: &Workhorse, route: Route) -> Result<()> {
        debug!(id = %route.work_id, "routing finalizer");
        self.dispatch(workhorse, Route::finalizer(route.work_id));
        Ok(())
    }
}
