//! Interactive unlock at daemon startup

use std::path::Path;
use tracing::warn;

use crate::{KeepassStore, StoreError, StoreResult};

/// Attempts per database before giving up
const UNLOCK_ATTEMPTS: u32 = 3;

/// Unlock one database file, prompting for the master password.
///
/// Up to three attempts: a cancelled prompt (`None`) counts as a failed
/// attempt and retries, a wrong password retries with a message to the
/// operator, and an IO error aborts immediately. After the last attempt the
/// last credential error is returned so the daemon can exit non-zero.
pub fn unlock_store(
    path: &Path,
    mut prompt: impl FnMut(&str) -> Option<String>,
) -> StoreResult<KeepassStore> {
    let text = format!("Password for keepass file {}: ", path.display());
    let mut last_error = None;

    for _ in 0..UNLOCK_ATTEMPTS {
        let Some(password) = prompt(&text) else {
            continue;
        };
        match KeepassStore::open(path, password) {
            Ok(store) => return Ok(store),
            Err(StoreError::Io(e)) => return Err(StoreError::Io(e)),
            Err(e) => {
                warn!(path = %path.display(), "invalid password");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| StoreError::PromptCancelled {
        path: path.to_path_buf(),
    }))
}
