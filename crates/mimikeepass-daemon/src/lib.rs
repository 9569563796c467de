//! The mimikeepass daemon
//!
//! Accepts connections on one or more Unix-domain listening sockets, rejects
//! peers whose uid differs from the daemon's, serves `GetEntry` lookups
//! against the shared store set, and shuts itself down after a configurable
//! idle period with no live connections.
//!
//! Listening sockets come either from systemd-style socket activation
//! (`LISTEN_PID`/`LISTEN_FDS`) or from binding a fresh owner-only socket in
//! the runtime directory.

mod daemon;
mod listen;

pub use daemon::*;
pub use listen::*;

use thiserror::Error;

/// Daemon errors. Only listener setup is fatal; per-connection failures are
/// logged and close that connection.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("socket activation handoff invalid: {0}")]
    Activation(String),
}

pub type DaemonResult<T> = Result<T, DaemonError>;
