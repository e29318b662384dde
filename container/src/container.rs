use std::sync::Arc;

use axum::Router;
use common_database::Store;
use common_kafka::{KafkaPublisher, KafkaSubscriber};
use common_redis::RedisCache;
use envconfig::Envconfig;
use health::{HealthAggregator, HealthCheck};
use lifecycle::{Server, ServerOptions};
use serve_metrics::setup_metrics_recorder;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::backend::{Backend, BackendKind};
use crate::config::Config;
use crate::error::{ContainerError, RegistryError};
use crate::pipeline::{self, Action, RunError};
use crate::registry::Registry;
use crate::router::AppRouter;

/// A configuration step applied to a [`Container`], see [`Container::new`].
pub type ConfigAction = Box<dyn FnOnce(&mut Container) -> Result<(), ContainerError> + Send>;

/// Name of the readiness check registered for a backend.
pub fn probe_name(kind: BackendKind, name: &str) -> String {
    format!("{name}-{kind}")
}

/// Process-wide holder of backend handles, their readiness checks, the
/// HTTP router and the server driving it.
pub struct Container {
    registry: Registry,
    health: HealthAggregator,
    config: Option<Config>,
    router: Option<AppRouter>,
    server: Option<Server>,
}

impl Container {
    /// Builds a container by applying `actions` in order. The first failing
    /// action aborts construction.
    pub fn new(actions: Vec<ConfigAction>) -> Result<Self, ContainerError> {
        let mut container = Self {
            registry: Registry::new(),
            health: HealthAggregator::new("readiness"),
            config: None,
            router: None,
            server: None,
        };
        container.add(actions)?;
        Ok(container)
    }

    /// Applies more configuration actions, in order.
    pub fn add(&mut self, actions: Vec<ConfigAction>) -> Result<(), ContainerError> {
        for action in actions {
            action(self)?;
        }
        Ok(())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn health(&self) -> &HealthAggregator {
        &self.health
    }

    pub fn config(&self) -> Option<&Config> {
        self.config.as_ref()
    }

    pub fn router(&self) -> Option<&AppRouter> {
        self.router.as_ref()
    }

    pub fn server(&self) -> Option<&Server> {
        self.server.as_ref()
    }

    pub fn cache(&self, name: &str) -> Result<Arc<RedisCache>, RegistryError> {
        self.lookup(name)
    }

    pub fn store(&self, name: &str) -> Result<Arc<Store>, RegistryError> {
        self.lookup(name)
    }

    pub fn publisher(&self, name: &str) -> Result<Arc<KafkaPublisher>, RegistryError> {
        self.lookup(name)
    }

    pub fn subscriber(&self, name: &str) -> Result<Arc<KafkaSubscriber>, RegistryError> {
        self.lookup(name)
    }

    pub fn lookup<B: Backend>(&self, name: &str) -> Result<Arc<B>, RegistryError> {
        self.registry.lookup(name)
    }

    /// Registers `handle` and its readiness check under `"{name}-{kind}"`.
    pub fn register<B: Backend + HealthCheck>(&self, name: &str, handle: Arc<B>) {
        let probe: Arc<dyn HealthCheck> = handle.clone();
        self.register_with_probe(name, handle, Some(probe));
    }

    /// Registers `handle` with a custom readiness check, or none at all.
    ///
    /// Both happen under the registry lock, so a handle is never visible to
    /// lookups before its check is. Without a check, any check left by a
    /// handle previously registered under the same name is removed.
    pub fn register_with_probe<B: Backend>(
        &self,
        name: &str,
        handle: Arc<B>,
        probe: Option<Arc<dyn HealthCheck>>,
    ) {
        let mut entries = self.registry.lock();
        let check = probe_name(B::KIND, name);
        match probe {
            Some(probe) => self.health.add_check(check, probe),
            None => {
                self.health.remove_check(&check);
            }
        }
        Registry::insert(&mut entries, name, handle);
    }

    /// Runs the startup pipeline, see [`pipeline::run`].
    pub async fn run(
        &self,
        shutdown: &CancellationToken,
        actions: Vec<Action>,
    ) -> Result<(), RunError> {
        match pipeline::run(shutdown, actions).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(action = e.index(), "run error: {}", e.cause());
                Err(e)
            }
        }
    }

    /// Starts the configured server and blocks until it has stopped.
    pub async fn serve(&self, shutdown: CancellationToken) -> Result<(), ContainerError> {
        let server = self.server.as_ref().ok_or(ContainerError::MissingServer)?;
        info!(addr = %server.options().addr, tls = server.is_tls(), "starting server");
        server.start(shutdown).await?;
        Ok(())
    }

    fn router_mut(&mut self) -> Result<&mut AppRouter, ContainerError> {
        if self.server.is_some() {
            return Err(ContainerError::ServerAlreadyConfigured);
        }
        Ok(self
            .router
            .get_or_insert_with(|| AppRouter::new(self.health.clone())))
    }
}

/// Stores `config` in the container.
pub fn with_config(config: Config) -> ConfigAction {
    Box::new(move |container| {
        container.config = Some(config);
        Ok(())
    })
}

/// Loads the [`Config`] from the environment and stores it in the container.
pub fn with_config_from_env() -> ConfigAction {
    Box::new(|container| {
        container.config = Some(Config::init_from_env()?);
        Ok(())
    })
}

/// Adds `routes` to the router, creating it on first use. Must be applied
/// before [`with_server`].
pub fn with_router(routes: Router) -> ConfigAction {
    Box::new(move |container| {
        container.router_mut()?.merge(routes);
        Ok(())
    })
}

/// Installs the Prometheus recorder and serves it on the metrics endpoint.
pub fn with_metrics() -> ConfigAction {
    Box::new(|container| {
        let handle = setup_metrics_recorder()?;
        container.router_mut()?.set_metrics(handle);
        Ok(())
    })
}

/// Creates the server for the router built so far.
pub fn with_server(options: ServerOptions) -> ConfigAction {
    Box::new(move |container| {
        if container.server.is_some() {
            return Err(ContainerError::ServerAlreadyConfigured);
        }
        let router = container
            .router
            .as_ref()
            .ok_or(ContainerError::MissingRouter)?;
        container.server = Some(Server::new(router.build(), options));
        Ok(())
    })
}

/// Registers any backend along with its readiness check.
pub fn with_backend<B: Backend + HealthCheck>(name: &str, handle: Arc<B>) -> ConfigAction {
    let name = name.to_string();
    Box::new(move |container| {
        container.register(&name, handle);
        Ok(())
    })
}

pub fn with_cache(name: &str, cache: RedisCache) -> ConfigAction {
    with_backend(name, Arc::new(cache))
}

pub fn with_store(name: &str, store: Store) -> ConfigAction {
    with_backend(name, Arc::new(store))
}

pub fn with_publisher(name: &str, publisher: KafkaPublisher) -> ConfigAction {
    with_backend(name, Arc::new(publisher))
}

pub fn with_subscriber(name: &str, subscriber: KafkaSubscriber) -> ConfigAction {
    with_backend(name, Arc::new(subscriber))
}
