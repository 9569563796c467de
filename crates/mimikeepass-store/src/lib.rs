//! KeePass database access for mimikeepass
//!
//! Wraps the `keepass` crate behind the small surface the daemon needs:
//! - [`KeepassStore`]: one decrypted database handle plus the file identity
//!   (device, inode, mtime) used to detect out-of-band edits and reopen
//!   transparently
//! - [`StoreSet`]: the ordered collection of stores a daemon serves,
//!   first-match-wins
//! - [`unlock_store`]: the bounded interactive unlock used at daemon startup
//!
//! The master password for each file stays in memory for the daemon's
//! lifetime; that is the whole point of the broker.

mod store;
#[cfg(test)]
mod testutil;
mod unlock;

pub use store::*;
pub use unlock::*;

use std::path::PathBuf;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid password for {path}")]
    BadCredentials { path: PathBuf },

    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: keepass::error::DatabaseOpenError,
    },

    #[error("password prompt cancelled for {path}")]
    PromptCancelled { path: PathBuf },
}

pub type StoreResult<T> = Result<T, StoreError>;
