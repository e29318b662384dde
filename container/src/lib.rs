//! Service container: named backend handles with readiness checks, a
//! startup pipeline, and an HTTP server with a bounded graceful shutdown.
//!
//! ```no_run
//! use axum::Router;
//! use container::{with_cache, with_router, with_server, Container};
//! use common_redis::RedisCache;
//! use lifecycle::ServerOptions;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> eyre::Result<()> {
//! let container = Container::new(vec![
//!     with_router(Router::new()),
//!     with_cache("main", RedisCache::new("redis://localhost:6379")?),
//!     with_server(ServerOptions::default()),
//! ])?;
//! let cache = container.cache("main")?;
//! container.serve(CancellationToken::new()).await?;
//! # drop(cache);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
mod container;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod router;

pub use backend::{Backend, BackendKind};
pub use container::{
    probe_name, with_backend, with_cache, with_config, with_config_from_env, with_metrics,
    with_publisher, with_router, with_server, with_store, with_subscriber, ConfigAction,
    Container,
};
pub use error::{ContainerError, RegistryError};
pub use pipeline::{action, Action, BoxError, Cancelled, RunError};
pub use registry::Registry;
pub use router::AppRouter;
