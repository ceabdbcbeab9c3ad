//! Lifecycle manager: listener, per-connection timeouts and bounded drain.
//!
//! Connections are served by hyper directly (instead of `axum::serve`) so the
//! header read timeout, the idle timeout and the forced close at the end of the
//! drain can be enforced per connection.

use axum::{Router, body::Body, extract::ConnectInfo, http::StatusCode};
use hyper::{Request, body::Incoming, server::conn::http1, service::service_fn};
use hyper_util::rt::{TokioIo, TokioTimer};
use std::{
    fmt,
    future::Future,
    io,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::watch,
    task::JoinSet,
};
use tower::{ServiceBuilder, ServiceExt};
use tower_http::timeout::{RequestBodyTimeoutLayer, TimeoutLayer};
use tracing::{debug, error, info, warn};

pub const DRAIN_DEADLINE: Duration = Duration::from_secs(10);

// Back-off when the process runs out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    /// Time allowed to receive a complete request head.
    pub header_read: Duration,
    /// Time allowed to receive a complete request body.
    pub read: Duration,
    /// Time allowed to produce a response once the head has been read.
    pub write: Duration,
    /// Keep-alive connections with no request in flight are closed after this.
    pub idle: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            header_read: Duration::from_secs(5),
            read: Duration::from_secs(5 * 60),
            write: Duration::from_secs(15),
            idle: Duration::from_secs(30),
        }
    }
}

/// Lifecycle states, in the only order they can be entered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Starting,
    Serving,
    Draining,
    Stopped,
}

impl LifecycleState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Serving => "serving",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("listener failed: {0}")]
    Listener(#[source] io::Error),
    #[error("drain deadline of {deadline:?} exceeded, {remaining} connection(s) forcibly closed")]
    DrainTimeout { deadline: Duration, remaining: usize },
}

pub struct Server {
    listener: TcpListener,
    app: Router,
    timeouts: Timeouts,
    drain_deadline: Duration,
    state: watch::Sender<LifecycleState>,
}

impl Server {
    /// Bind the listener. The server starts in [`LifecycleState::Starting`].
    ///
    /// # Errors
    /// Returns [`ServerError::Bind`] if the address can not be bound.
    pub async fn bind(addr: SocketAddr, app: Router) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        Ok(Self::from_listener(listener, app))
    }

    #[must_use]
    pub fn from_listener(listener: TcpListener, app: Router) -> Self {
        let (state, _) = watch::channel(LifecycleState::Starting);
        Self {
            listener,
            app,
            timeouts: Timeouts::default(),
            drain_deadline: DRAIN_DEADLINE,
            state,
        }
    }

    #[must_use]
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    #[must_use]
    pub fn with_drain_deadline(mut self, deadline: Duration) -> Self {
        self.drain_deadline = deadline;
        self
    }

    /// # Errors
    /// Returns an error if the socket address can not be read.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Observe lifecycle transitions.
    #[must_use]
    pub fn lifecycle(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    fn advance(&self, next: LifecycleState) {
        let moved = self.state.send_if_modified(|current| {
            if next > *current {
                *current = next;
                true
            } else {
                false
            }
        });
        if moved {
            debug!(state = %next, "Lifecycle transition");
        }
    }

    /// Serve until `shutdown` resolves, then drain.
    ///
    /// In-flight requests get up to the drain deadline to finish; whatever is
    /// still open after that is aborted and reported as
    /// [`ServerError::DrainTimeout`]. A fatal listener error returns at once
    /// without draining.
    ///
    /// # Errors
    /// Returns [`ServerError::Listener`] on a fatal accept error and
    /// [`ServerError::DrainTimeout`] when the drain deadline is exceeded.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let app = self.app.clone().layer(
            ServiceBuilder::new()
                .layer(RequestBodyTimeoutLayer::new(self.timeouts.read))
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    self.timeouts.write,
                )),
        );

        let (close_tx, close_rx) = watch::channel(false);
        let mut connections = JoinSet::new();

        self.advance(LifecycleState::Serving);
        if let Ok(addr) = self.listener.local_addr() {
            info!(address = %addr, "Listening");
        }

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        connections.spawn(serve_connection(
                            stream,
                            peer,
                            app.clone(),
                            self.timeouts,
                            close_rx.clone(),
                        ));
                    }
                    Err(err) => self.on_accept_error(err).await?,
                }
            }
        }

        self.advance(LifecycleState::Draining);
        let Self {
            listener,
            drain_deadline,
            state,
            ..
        } = self;
        drop(listener);

        info!(connections = connections.len(), "Shutting down, draining connections");
        let _ = close_tx.send(true);

        let drained = tokio::time::timeout(drain_deadline, async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        let result = if drained.is_ok() {
            info!("All connections drained");
            Ok(())
        } else {
            let remaining = connections.len();
            connections.abort_all();
            while connections.join_next().await.is_some() {}
            warn!(remaining, "Drain deadline exceeded, connections closed");
            Err(ServerError::DrainTimeout {
                deadline: drain_deadline,
                remaining,
            })
        };

        state.send_replace(LifecycleState::Stopped);
        debug!(state = %LifecycleState::Stopped, "Lifecycle transition");
        result
    }

    /// Transient accept failures keep the loop going. Anything else is fatal:
    /// the server stops without draining.
    async fn on_accept_error(&self, err: io::Error) -> Result<(), ServerError> {
        if is_connection_error(&err) {
            debug!(error = %err, "Accepted connection failed");
            return Ok(());
        }
        if is_resource_exhausted(&err) {
            error!(error = %err, "Accept failed, backing off");
            tokio::time::sleep(ACCEPT_BACKOFF).await;
            return Ok(());
        }

        error!(error = %err, "Listener failed");
        self.advance(LifecycleState::Stopped);
        Err(ServerError::Listener(err))
    }
}

/// Per-connection request activity, used by the idle watchdog.
struct Activity {
    started: Instant,
    in_flight: AtomicUsize,
    last_active_ms: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            in_flight: AtomicUsize::new(0),
            last_active_ms: AtomicU64::new(0),
        }
    }

    fn begin(self: &Arc<Self>) -> InFlight {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.touch();
        InFlight(Arc::clone(self))
    }

    fn touch(&self) {
        let elapsed = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last_active_ms.store(elapsed, Ordering::SeqCst);
    }

    fn idle_for(&self) -> Duration {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            return Duration::ZERO;
        }
        let last = Duration::from_millis(self.last_active_ms.load(Ordering::SeqCst));
        self.started.elapsed().saturating_sub(last)
    }
}

struct InFlight(Arc<Activity>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.touch();
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    app: Router,
    timeouts: Timeouts,
    mut close: watch::Receiver<bool>,
) {
    let activity = Arc::new(Activity::new());

    let service = {
        let activity = Arc::clone(&activity);
        service_fn(move |mut request: Request<Incoming>| {
            let in_flight = activity.begin();
            request.extensions_mut().insert(ConnectInfo(peer));
            let app = app.clone();
            async move {
                let response = app.oneshot(request.map(Body::new)).await;
                drop(in_flight);
                response
            }
        })
    };

    let mut builder = http1::Builder::new();
    builder
        .timer(TokioTimer::new())
        .header_read_timeout(timeouts.header_read)
        .keep_alive(true);
    let connection = builder.serve_connection(TokioIo::new(stream), service);
    tokio::pin!(connection);

    let mut watchdog = tokio::time::interval((timeouts.idle / 4).max(Duration::from_millis(10)));
    let mut closing = false;

    loop {
        tokio::select! {
            result = connection.as_mut() => {
                if let Err(err) = result {
                    debug!(peer = %peer, error = %err, "Connection closed with error");
                }
                break;
            }
            _ = close.changed(), if !closing => {
                closing = true;
                connection.as_mut().graceful_shutdown();
            }
            _ = watchdog.tick(), if !closing => {
                if activity.idle_for() >= timeouts.idle {
                    debug!(peer = %peer, "Closing idle connection");
                    closing = true;
                    connection.as_mut().graceful_shutdown();
                }
            }
        }
    }
}

fn is_connection_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

// EMFILE / ENFILE
fn is_resource_exhausted(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(23 | 24))
}
