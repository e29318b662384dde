//! Lifecycle coordination for an HTTP listener: binding (plaintext or TLS),
//! signal trapping, and a graceful shutdown bounded by a drain timeout.

mod error;
mod metrics;
mod options;
mod server;
mod signals;
mod tls;

pub use error::{LifecycleError, TlsError};
pub use options::{
    ServerOptions, DEFAULT_ADDR, DEFAULT_DRAIN_TIMEOUT, DEFAULT_READ_TIMEOUT, DEFAULT_WRITE_TIMEOUT,
};
pub use server::{Server, State};
pub use tls::TlsConfig;
