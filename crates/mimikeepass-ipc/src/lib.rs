//! IPC layer for mimikeepass
//!
//! Provides:
//! - NUL-separated message framing over any async byte stream
//! - the thin client used by `mimikeepass password` and the ssh-askpass
//!   wrapper
//!
//! The daemon side (accept loop, authentication, dispatch) lives in
//! `mimikeepass-daemon` and reuses the framing from here.

mod client;
mod framing;

pub use client::*;
pub use framing::*;

use thiserror::Error;

/// IPC errors
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message too long")]
    MessageTooLong,
}

pub type IpcResult<T> = Result<T, IpcError>;
