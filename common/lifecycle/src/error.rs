use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors returned by [`Server::start`](crate::Server::start) and
/// [`Server::stop`](crate::Server::stop).
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("server already started")]
    AlreadyStarted,

    /// Binding the listener failed.
    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid tls configuration: {0}")]
    Tls(#[from] TlsError),

    /// In-flight connections were still open when the drain bound expired.
    #[error("shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no certificate found in {0}")]
    NoCertificates(PathBuf),
    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),
    #[error(transparent)]
    Rustls(#[from] rustls::Error),
}
