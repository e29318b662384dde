use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::Router;
use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower::Service;
use tower_http::timeout::TimeoutLayer;
use tracing::{debug, error, info, warn};

use crate::error::LifecycleError;
use crate::metrics;
use crate::options::ServerOptions;
use crate::signals::wait_for_shutdown_signal;

// Pause after a transient accept error before accepting again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Clone, Copy)]
struct Status {
    state: State,
    addr: Option<SocketAddr>,
}

/// HTTP listener driven through `Idle -> Running -> Draining -> Stopped`.
///
/// `start` blocks until the listener is fully stopped. Shutdown is triggered by
/// an OS signal, by cancelling the token given to `start`, or by calling `stop`
/// directly, and always goes through the same bounded drain.
///
/// Cloning is cheap and every clone drives the same listener.
#[derive(Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

struct Inner {
    options: ServerOptions,
    router: Router,
    status: watch::Sender<Status>,
    // Cancelled when draining starts: stop accepting, finish in-flight requests.
    drain: CancellationToken,
    // Cancelled when the drain bound expires: drop whatever is left.
    abort: CancellationToken,
    // Drain bound that expired, if any.
    timed_out: OnceLock<Duration>,
}

impl Server {
    pub fn new(router: Router, options: ServerOptions) -> Self {
        let router = router.layer(TimeoutLayer::new(options.write_timeout));
        let (status, _) = watch::channel(Status {
            state: State::Idle,
            addr: None,
        });

        Self {
            inner: Arc::new(Inner {
                options,
                router,
                status,
                drain: CancellationToken::new(),
                abort: CancellationToken::new(),
                timed_out: OnceLock::new(),
            }),
        }
    }

    pub fn options(&self) -> &ServerOptions {
        &self.inner.options
    }

    pub fn is_tls(&self) -> bool {
        self.inner.options.tls.is_some()
    }

    pub fn state(&self) -> State {
        self.inner.status.borrow().state
    }

    /// Address the listener is bound to, once `start` has bound it.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.status.borrow().addr
    }

    /// Waits for the listener to be bound and returns its address, or `None`
    /// if the server stopped before binding.
    pub async fn listening_addr(&self) -> Option<SocketAddr> {
        let mut status = self.inner.status.subscribe();
        let status = status
            .wait_for(|s| s.addr.is_some() || s.state == State::Stopped)
            .await
            .ok()?;
        status.addr
    }

    /// Binds the listener and serves until shutdown completes.
    ///
    /// Returns `Ok(())` after a clean drain, [`LifecycleError::ShutdownTimeout`]
    /// if connections were still open when the drain bound expired, and the
    /// setup error if the listener could not be created.
    pub async fn start(&self, shutdown: CancellationToken) -> Result<(), LifecycleError> {
        if !self.transition(State::Idle, State::Running) {
            return Err(LifecycleError::AlreadyStarted);
        }

        // Also covers the caller dropping this future before run completes.
        let _stopped = StopOnDrop(self);
        let result = self.run(shutdown).await;
        self.set_stopped();
        metrics::emit_shutdown_completed(result.is_ok());
        match &result {
            Ok(()) => info!("server stopped"),
            Err(e) => error!("server stopped with error: {e}"),
        }
        result
    }

    /// Stops accepting, lets in-flight requests finish and waits at most
    /// the drain timeout for the listener to stop. A server that is not
    /// running is left untouched.
    pub async fn stop(&self) -> Result<(), LifecycleError> {
        self.shutdown("stop", self.inner.options.drain_timeout).await
    }

    /// Like [`Server::stop`], waiting at most `deadline` if it is shorter
    /// than the drain timeout.
    pub async fn stop_within(&self, deadline: Duration) -> Result<(), LifecycleError> {
        let bound = deadline.min(self.inner.options.drain_timeout);
        self.shutdown("stop", bound).await
    }

    async fn shutdown(
        &self,
        reason: &str,
        drain_timeout: Duration,
    ) -> Result<(), LifecycleError> {
        if !self.transition(State::Running, State::Draining) {
            debug!(state = ?self.state(), "server not running, nothing to stop");
            return Ok(());
        }

        metrics::emit_shutdown_initiated(reason);
        info!(trigger_reason = reason, "shutdown initiated, draining connections");

        let mut status = self.inner.status.subscribe();
        self.inner.drain.cancel();

        let drained = tokio::time::timeout(
            drain_timeout,
            status.wait_for(|s| s.state == State::Stopped),
        )
        .await
        .is_ok();

        if drained {
            return Ok(());
        }

        warn!(?drain_timeout, "drain timed out, closing remaining connections");
        _ = self.inner.timed_out.set(drain_timeout);
        self.inner.abort.cancel();
        self.set_stopped();
        Err(LifecycleError::ShutdownTimeout(drain_timeout))
    }

    async fn run(&self, shutdown: CancellationToken) -> Result<(), LifecycleError> {
        let options = &self.inner.options;
        let acceptor = match &options.tls {
            Some(tls) => Some(tls.acceptor()?),
            None => None,
        };

        let listen_err = |source| LifecycleError::Listen {
            addr: options.addr.clone(),
            source,
        };
        let listener = TcpListener::bind(&options.addr).await.map_err(listen_err)?;
        let local_addr = listener.local_addr().map_err(listen_err)?;
        self.inner.status.send_modify(|s| s.addr = Some(local_addr));
        info!(addr = %local_addr, tls = acceptor.is_some(), "listening");

        // Exits on its own once draining starts, whoever started it.
        tokio::spawn(self.clone().watch_for_shutdown(shutdown));

        let builder = self.connection_builder();
        let mut connections = JoinSet::new();

        let fatal = loop {
            tokio::select! {
                _ = self.inner.drain.cancelled() => break None,
                result = listener.accept() => {
                    let (socket, remote_addr) = match result {
                        Ok(conn) => conn,
                        Err(e) if is_transient_accept_error(&e) => {
                            warn!("failed to accept connection, retrying: {}", e);
                            tokio::select! {
                                _ = tokio::time::sleep(ACCEPT_BACKOFF) => {}
                                _ = self.inner.drain.cancelled() => {}
                            }
                            continue;
                        }
                        Err(e) => break Some(e),
                    };

                    if let Err(e) = socket.set_nodelay(true) {
                        warn!("failed to set TCP_NODELAY: {}", e);
                    }
                    metrics::emit_connection_accepted(acceptor.is_some());

                    let builder = builder.clone();
                    let router = self.inner.router.clone();
                    let drain = self.inner.drain.clone();
                    match acceptor.clone() {
                        None => {
                            connections.spawn(serve_connection(socket, remote_addr, builder, router, drain));
                        }
                        Some(acceptor) => {
                            connections.spawn(async move {
                                let stream = tokio::select! {
                                    result = acceptor.accept(socket) => match result {
                                        Ok(stream) => stream,
                                        Err(e) => {
                                            debug!(%remote_addr, "tls handshake failed: {}", e);
                                            return;
                                        }
                                    },
                                    _ = drain.cancelled() => return,
                                };
                                serve_connection(stream, remote_addr, builder, router, drain).await
                            });
                        }
                    }
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        };

        drop(listener);
        if let Some(e) = &fatal {
            error!(addr = %local_addr, "listener failed: {}", e);
            // Nobody else drives the drain when the listener itself fails.
            self.inner.drain.cancel();
        }
        info!(connections = connections.len(), "stopped accepting");

        tokio::select! {
            _ = async { while connections.join_next().await.is_some() {} } => {}
            _ = self.inner.abort.cancelled() => {
                warn!(connections = connections.len(), "aborting connections");
                connections.abort_all();
            }
            _ = tokio::time::sleep(options.drain_timeout), if fatal.is_some() => {
                warn!(connections = connections.len(), "aborting connections");
                connections.abort_all();
            }
        }

        if let Some(source) = fatal {
            return Err(listen_err(source));
        }
        match self.inner.timed_out.get() {
            Some(bound) => Err(LifecycleError::ShutdownTimeout(*bound)),
            None => Ok(()),
        }
    }

    async fn watch_for_shutdown(self, shutdown: CancellationToken) {
        let trap_signals = self.inner.options.trap_signals;
        let reason = tokio::select! {
            signal = wait_for_shutdown_signal(), if trap_signals => signal,
            _ = shutdown.cancelled() => "cancelled",
            _ = self.inner.drain.cancelled() => return,
        };

        if let Err(e) = self.shutdown(reason, self.inner.options.drain_timeout).await {
            warn!("graceful shutdown failed: {e}");
        }
    }

    fn connection_builder(&self) -> AutoBuilder<TokioExecutor> {
        let mut builder = AutoBuilder::new(TokioExecutor::new());
        builder
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(self.inner.options.read_timeout);
        builder.http2().timer(TokioTimer::new());
        builder
    }

    fn transition(&self, from: State, to: State) -> bool {
        self.inner.status.send_if_modified(|s| {
            if s.state != from {
                return false;
            }
            s.state = to;
            true
        })
    }

    fn set_stopped(&self) {
        self.inner.status.send_if_modified(|s| {
            let changed = s.state != State::Stopped;
            s.state = State::Stopped;
            changed
        });
    }
}

/// Cancels the drain and marks the server stopped when dropped.
struct StopOnDrop<'a>(&'a Server);

impl Drop for StopOnDrop<'_> {
    fn drop(&mut self) {
        self.0.inner.drain.cancel();
        self.0.set_stopped();
    }
}

/// Accept errors that concern a single connection or a momentary resource
/// shortage. Anything else means the listener itself is broken.
fn is_transient_accept_error(e: &io::Error) -> bool {
    if matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
    ) {
        return true;
    }
    matches!(
        e.raw_os_error(),
        Some(libc::EMFILE | libc::ENFILE | libc::ENOMEM | libc::ENOBUFS)
    )
}

async fn serve_connection<I>(
    io: I,
    remote_addr: SocketAddr,
    builder: AutoBuilder<TokioExecutor>,
    router: Router,
    drain: CancellationToken,
) where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = hyper::service::service_fn(move |req: Request<Incoming>| {
        let mut router = router.clone();
        let mut req = req.map(Body::new);
        req.extensions_mut().insert(ConnectInfo(remote_addr));
        async move { router.call(req).await }
    });

    let conn = builder.serve_connection_with_upgrades(TokioIo::new(io), service);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => {
            if let Err(e) = result {
                debug!("connection closed: {}", e);
            }
            return;
        }
        _ = drain.cancelled() => conn.as_mut().graceful_shutdown(),
    }

    if let Err(e) = conn.await {
        debug!("connection closed during drain: {}", e);
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("options", &self.inner.options)
            .field("state", &self.state())
            .finish()
    }
}
