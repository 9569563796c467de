//! Socket path resolution for mimikeepass
//!
//! The daemon and all clients must agree on the socket location:
//! - explicit path (CLI flag) wins,
//! - then the `MIMIKEEPASS_SOCKET` environment variable,
//! - then `<runtime-dir>/mimikeepass.varlink`, where the runtime directory is
//!   `$XDG_RUNTIME_DIR` or `/run/user/<uid>`.
//!
//! A bare name without any `/` is interpreted relative to the runtime
//! directory, so `MIMIKEEPASS_SOCKET=test.sock` works as a shorthand.

use std::path::{Path, PathBuf};

/// Environment variable for overriding the socket path
pub const SOCKET_ENV: &str = "MIMIKEEPASS_SOCKET";

/// Socket filename within the runtime directory
const SOCKET_FILENAME: &str = "mimikeepass.varlink";

/// Get the per-user runtime directory.
///
/// `$XDG_RUNTIME_DIR` if set, otherwise `/run/user/<uid>`.
pub fn runtime_directory() -> PathBuf {
    match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(format!("/run/user/{}", nix::unistd::getuid().as_raw())),
    }
}

/// Resolve the socket path to use.
///
/// Order of precedence:
/// 1. `explicit` (e.g. a `--socket` flag)
/// 2. `$MIMIKEEPASS_SOCKET`
/// 3. `<runtime-dir>/mimikeepass.varlink`
pub fn resolve_socket_path(explicit: Option<&Path>) -> PathBuf {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(SOCKET_ENV).map(PathBuf::from))
        .unwrap_or_else(|| runtime_directory().join(SOCKET_FILENAME));

    // Bare names land in the runtime directory
    if !path.to_string_lossy().contains('/') {
        return runtime_directory().join(path);
    }
    path
}
