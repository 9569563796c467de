//! Accept loop, peer authentication, dispatch and idle lifecycle

use mimikeepass_api::{Request, Response, GET_ENTRY_METHOD};
use mimikeepass_ipc::FramedStream;
use mimikeepass_store::StoreSet;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::net::{UnixListener, UnixStream};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, error, info, warn};

use crate::DaemonResult;

/// Live-connection count and idle timestamp, under one lock.
///
/// Invariant: `idle_since` is `Some` exactly when the connection count is
/// zero and an idle timeout is configured. Every mutation and the decision
/// to wake the accept loop happen while holding the lock, so the loop never
/// sees a stale zero racing a fresh accept.
pub struct IdleTracker {
    idle_timeout: Option<Duration>,
    state: StdMutex<IdleState>,
    notify: Notify,
}

struct IdleState {
    connections: usize,
    idle_since: Option<Instant>,
}

impl IdleTracker {
    /// `idle_timeout` of `None` disables idle shutdown entirely.
    pub fn new(idle_timeout: Option<Duration>) -> Self {
        Self {
            idle_timeout,
            state: StdMutex::new(IdleState {
                connections: 0,
                // The clock starts at daemon startup: a daemon nobody ever
                // connects to still times out.
                idle_since: idle_timeout.map(|_| Instant::now()),
            }),
            notify: Notify::new(),
        }
    }

    pub fn connection_opened(&self) {
        let mut state = self.state.lock().expect("idle state lock poisoned");
        state.idle_since = None;
        state.connections += 1;
    }

    pub fn connection_closed(&self) {
        let mut state = self.state.lock().expect("idle state lock poisoned");
        state.connections = state.connections.saturating_sub(1);
        if state.connections == 0 {
            if self.idle_timeout.is_some() {
                state.idle_since = Some(Instant::now());
            }
            self.notify.notify_one();
        }
    }

    /// Remaining idle budget: `None` means wait forever (timer disabled or
    /// connections live), `Some(ZERO)` means the timeout has expired.
    pub fn idle_budget(&self) -> Option<Duration> {
        let timeout = self.idle_timeout?;
        let state = self.state.lock().expect("idle state lock poisoned");
        let since = state.idle_since?;
        Some(timeout.saturating_sub(since.elapsed()))
    }

    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    pub fn live_connections(&self) -> usize {
        self.state.lock().expect("idle state lock poisoned").connections
    }

    pub fn is_idle(&self) -> bool {
        self.state
            .lock()
            .expect("idle state lock poisoned")
            .idle_since
            .is_some()
    }
}

/// Peer uid of a connected Unix socket, via SO_PEERCRED.
fn peer_uid(stream: &UnixStream) -> Option<u32> {
    use std::os::unix::io::AsFd;

    let fd = stream.as_fd();
    match nix::sys::socket::getsockopt(&fd, nix::sys::socket::sockopt::PeerCredentials) {
        Ok(creds) => Some(creds.uid()),
        Err(_) => None,
    }
}

/// The sole authorization boundary: same effective uid as the daemon, or out.
/// Unreadable credentials reject as well.
fn authorized(peer_uid: Option<u32>, own_uid: u32) -> bool {
    peer_uid == Some(own_uid)
}

/// The connection server.
pub struct Daemon {
    stores: Arc<Mutex<StoreSet>>,
    tracker: Arc<IdleTracker>,
}

impl Daemon {
    pub fn new(stores: StoreSet, idle_timeout: Option<Duration>) -> Self {
        Self {
            stores: Arc::new(Mutex::new(stores)),
            tracker: Arc::new(IdleTracker::new(idle_timeout)),
        }
    }

    pub fn tracker(&self) -> &IdleTracker {
        &self.tracker
    }

    /// Accept and serve connections until the idle timeout expires or a
    /// termination signal arrives.
    ///
    /// One forwarder task per listener feeds accepted streams into the main
    /// loop; each authenticated connection gets its own task. Returning
    /// drops the listeners; unlinking bound socket files is the caller's
    /// [`crate::SocketGuard`].
    pub async fn run(&self, listeners: Vec<UnixListener>) -> DaemonResult<()> {
        let own_uid = nix::unistd::getuid().as_raw();

        let (conn_tx, mut conn_rx) = mpsc::channel::<UnixStream>(16);
        let mut accept_tasks = Vec::with_capacity(listeners.len());
        for listener in listeners {
            let tx = conn_tx.clone();
            accept_tasks.push(tokio::spawn(async move {
                loop {
                    match listener.accept().await {
                        Ok((stream, _addr)) => {
                            if tx.send(stream).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => error!(error = %e, "failed to accept connection"),
                    }
                }
            }));
        }
        drop(conn_tx);

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        loop {
            let budget = self.tracker.idle_budget();
            if matches!(budget, Some(d) if d.is_zero()) {
                info!("idle timeout reached, shutting down");
                break;
            }

            tokio::select! {
                maybe = conn_rx.recv() => {
                    let Some(stream) = maybe else { break };
                    self.admit(stream, own_uid);
                }
                // Wake to recompute the budget when the last connection closes
                _ = self.tracker.notified() => {}
                _ = idle_sleep(budget) => {}
                _ = sigterm.recv() => {
                    info!("received SIGTERM, shutting down");
                    break;
                }
                _ = sigint.recv() => {
                    info!("received SIGINT, shutting down");
                    break;
                }
            }
        }

        for task in &accept_tasks {
            task.abort();
        }
        Ok(())
    }

    fn admit(&self, stream: UnixStream, own_uid: u32) {
        let peer = peer_uid(&stream);
        if !authorized(peer, own_uid) {
            // Closed before a single byte is read from it
            debug!(peer_uid = ?peer, "rejected connection from foreign uid");
            return;
        }

        self.tracker.connection_opened();
        let stores = Arc::clone(&self.stores);
        let tracker = Arc::clone(&self.tracker);
        tokio::spawn(async move {
            serve_connection(FramedStream::new(stream), &stores).await;
            tracker.connection_closed();
        });
    }
}

/// Sleep out the idle budget, or forever when there is none to enforce.
async fn idle_sleep(budget: Option<Duration>) {
    match budget {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

/// Serve one authenticated connection: read request, dispatch, write the
/// response unless `oneway`, until end-of-stream or a protocol error. Any
/// connection-level failure closes this connection and nothing else.
async fn serve_connection(mut transport: FramedStream<UnixStream>, stores: &Mutex<StoreSet>) {
    loop {
        let frame = match transport.recv().await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "closing connection");
                break;
            }
        };

        let request: Request = match serde_json::from_slice(&frame) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "malformed request, closing connection");
                break;
            }
        };
        let oneway = request.oneway;

        let response = dispatch(stores, request).await;
        if oneway {
            continue;
        }

        let payload = match serde_json::to_vec(&response) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "failed to encode response");
                break;
            }
        };
        if let Err(e) = transport.send(&payload).await {
            debug!(error = %e, "write failed, closing connection");
            break;
        }
    }
}

/// Interpret one decoded request.
///
/// The store lock is held across the whole refresh-then-lookup pass, so
/// concurrent requests serialize and never interleave with a store reopen.
/// An unknown method gets a structured error response on the same
/// connection rather than tearing it down.
async fn dispatch(stores: &Mutex<StoreSet>, request: Request) -> Response {
    if request.method != GET_ENTRY_METHOD {
        warn!(method = %request.method, "unknown method");
        return Response::error(format!("unknown method: {}", request.method));
    }

    let entry = stores.lock().await.get_entry(&request.parameters);
    Response::Entry(entry)
}
