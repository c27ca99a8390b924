//! Assembles a [`Workhorse`] from config hrefs, registries and overrides.

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::href::Registry;
use crate::service::{Router, Services, StateStore, WorkLoader, WorkLogger};

use super::workhorse::Workhorse;

/// Builder for [`Workhorse`].
///
/// Each collaborator is taken from an explicit instance if one was given,
/// otherwise resolved from its href in the config.
#[derive(Default)]
pub struct WorkhorseBuilder {
    config: Config,
    services: Option<Services>,
    loader: Option<Arc<dyn WorkLoader>>,
    state: Option<Arc<dyn StateStore>>,
    router: Option<Arc<dyn Router>>,
    logger: Option<Arc<dyn WorkLogger>>,
}

impl WorkhorseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn services(mut self, services: Services) -> Self {
        self.services = Some(services);
        self
    }

    pub fn work_loader(mut self, loader: Arc<dyn WorkLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn state_manager(mut self, state: Arc<dyn StateStore>) -> Self {
        self.state = Some(state);
        self
    }

    pub fn router(mut self, router: Arc<dyn Router>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn logger(mut self, logger: Arc<dyn WorkLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Resolve whatever was not given explicitly.
    ///
    /// # Errors
    ///
    /// Any href that does not resolve to an instantiable component.
    pub fn build(self) -> Result<Workhorse> {
        let services = self.services.unwrap_or_default();
        let config = self.config;

        let loader = pick(self.loader, &services.work_loaders, &config.work_loader, "work_loader")?;
        let state = pick(self.state, &services.state_managers, &config.state_manager, "state_manager")?;
        let router = pick(self.router, &services.routers, &config.router, "router")?;
        let logger = pick(self.logger, &services.loggers, &config.logger, "logger")?;

        Ok(Workhorse::from_parts(loader, state, router, logger))
    }
}

fn pick<T: ?Sized>(
    given: Option<Arc<T>>,
    registry: &Registry<Arc<T>>,
    href: &str,
    role: &str,
) -> Result<Arc<T>> {
    match given {
        Some(instance) => {
            info!(role, "using provided instance");
            Ok(instance)
        }
        None => {
            info!(role, href, "resolving service");
            registry.instantiate_from_path(href)
        }
    }
}
