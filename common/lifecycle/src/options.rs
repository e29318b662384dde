use std::time::Duration;

use crate::tls::TlsConfig;

pub const DEFAULT_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Listener settings, fixed when the [`Server`](crate::Server) is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// `host:port` to bind, port 0 picks an ephemeral port.
    pub addr: String,
    /// Time allowed for a client to send the request headers (HTTP/1).
    pub read_timeout: Duration,
    /// Deadline for producing a response, requests over it get a 408.
    pub write_timeout: Duration,
    /// Upper bound on the graceful drain once shutdown starts.
    pub drain_timeout: Duration,
    /// Serve TLS instead of plaintext.
    pub tls: Option<TlsConfig>,
    /// Stop on SIGINT, SIGTERM and SIGPROF.
    pub trap_signals: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            tls: None,
            trap_signals: true,
        }
    }
}

impl ServerOptions {
    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn with_trap_signals(mut self, trap_signals: bool) -> Self {
        self.trap_signals = trap_signals;
        self
    }
}
