//! Listening socket acquisition
//!
//! Two ways to get listeners:
//! - adopt pre-opened descriptors from a socket-activation supervisor when
//!   `LISTEN_PID` names this process (fds start at 3, systemd convention);
//!   the numeric variables are consumed and removed from the environment so
//!   they never leak into child processes
//! - bind a fresh Unix socket at the resolved path, forced to mode 0600

use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::{FromRawFd, RawFd};
use std::path::{Path, PathBuf};
use tokio::net::UnixListener;
use tracing::{debug, info};

use crate::{DaemonError, DaemonResult};

/// First descriptor passed by the supervisor (SD_LISTEN_FDS_START)
const SD_LISTEN_FDS_START: RawFd = 3;

/// Unlinks the socket files this process created, on drop.
///
/// Adopted (socket-activated) listeners contribute no paths; their lifecycle
/// belongs to the supervisor.
#[derive(Debug, Default)]
pub struct SocketGuard {
    paths: Vec<PathBuf>,
}

impl SocketGuard {
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl Drop for SocketGuard {
    fn drop(&mut self) {
        for path in &self.paths {
            if let Err(e) = std::fs::remove_file(path) {
                debug!(path = %path.display(), error = %e, "failed to unlink socket");
            }
        }
    }
}

/// Acquire the listening sockets: adopt activation fds when present,
/// otherwise bind at the resolved socket path.
pub fn acquire_listeners(
    socket_path: Option<&Path>,
) -> DaemonResult<(Vec<UnixListener>, SocketGuard)> {
    if let Some(count) = take_activation_fds() {
        let listeners = adopt_activation_fds(count)?;
        info!(count, "adopted listening sockets from supervisor");
        return Ok((listeners, SocketGuard::default()));
    }

    let path = mimikeepass_util::resolve_socket_path(socket_path);
    let listener = bind_socket(&path)?;
    info!(path = %path.display(), "listening");
    Ok((vec![listener], SocketGuard { paths: vec![path] }))
}

/// Read and consume the socket-activation environment markers.
///
/// Returns the number of passed descriptors, or `None` when activation does
/// not apply (markers absent, malformed, or addressed to another pid). The
/// variables are only scrubbed once both numeric markers have been read.
fn take_activation_fds() -> Option<usize> {
    let listen_pid: u32 = std::env::var("LISTEN_PID").ok()?.parse().ok()?;
    if listen_pid != std::process::id() {
        return None;
    }
    let listen_fds: usize = std::env::var("LISTEN_FDS").ok()?.parse().ok()?;

    std::env::remove_var("LISTEN_PID");
    std::env::remove_var("LISTEN_FDS");
    std::env::remove_var("LISTEN_FDNAMES");

    Some(listen_fds)
}

fn adopt_activation_fds(count: usize) -> DaemonResult<Vec<UnixListener>> {
    let mut listeners = Vec::with_capacity(count);
    for i in 0..count {
        let fd = SD_LISTEN_FDS_START + i as RawFd;
        // Safety: the supervisor handed us ownership of fds 3..3+count; the
        // LISTEN_PID check above confirmed this process is the addressee.
        let std_listener = unsafe { std::os::unix::net::UnixListener::from_raw_fd(fd) };
        std_listener
            .set_nonblocking(true)
            .map_err(|e| DaemonError::Activation(format!("fd {fd}: {e}")))?;
        let listener = UnixListener::from_std(std_listener)
            .map_err(|e| DaemonError::Activation(format!("fd {fd}: {e}")))?;
        listeners.push(listener);
    }
    Ok(listeners)
}

fn bind_socket(path: &Path) -> DaemonResult<UnixListener> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if path.exists() {
        std::fs::remove_file(path)?;
    }

    let listener = UnixListener::bind(path)?;

    // The socket file itself is the first authorization layer; peer
    // credentials are checked again on every accept.
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;

    Ok(listener)
}
