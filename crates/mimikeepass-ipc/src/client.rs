//! Client for the mimikeepass daemon

use mimikeepass_api::{EntryQuery, Request};
use std::path::Path;
use tokio::net::UnixStream;
use tracing::debug;

use crate::{FramedStream, IpcResult};

/// A thin client: one connection, one request at a time.
pub struct Client {
    transport: FramedStream<UnixStream>,
}

impl Client {
    /// Connect to the daemon.
    ///
    /// `socket_path` overrides the usual resolution chain
    /// (`MIMIKEEPASS_SOCKET`, then the runtime-directory default).
    /// Connection failures propagate to the caller.
    pub async fn connect(socket_path: Option<&Path>) -> IpcResult<Self> {
        let path = mimikeepass_util::resolve_socket_path(socket_path);
        debug!(path = %path.display(), "connecting to mimikeepass daemon");
        let stream = UnixStream::connect(&path).await?;
        Ok(Self {
            transport: FramedStream::new(stream),
        })
    }

    /// Look up a password.
    ///
    /// Sends a single `GetEntry` request and reads one response. A closed
    /// connection, a non-map response, or a map without a string `password`
    /// field all read as "no answer", not as errors.
    pub async fn get_password(&mut self, query: EntryQuery) -> IpcResult<Option<String>> {
        let request = Request::get_entry(query);
        self.transport.send(&serde_json::to_vec(&request)?).await?;

        let Some(frame) = self.transport.recv().await? else {
            return Ok(None);
        };
        let response: serde_json::Value = serde_json::from_slice(&frame)?;

        let password = response
            .as_object()
            .and_then(|map| map.get("password"))
            .and_then(|value| value.as_str())
            .map(str::to_owned);
        Ok(password)
    }
}
