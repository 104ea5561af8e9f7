//! Listening side of the resolution service.
//!
//! - `session`: per-connection lookup bookkeeping
//! - `worker`: request/response handling for one connection

mod session;
mod worker;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::resolver::Lookup;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Local resolution service bound to a unix socket
pub struct ResolverService {
    listener: UnixListener,
    path: PathBuf,
    resolver: Arc<dyn Lookup>,
}

impl ResolverService {
    /// Bind the listening socket at `path`.
    ///
    /// A leftover socket file from an earlier run is removed first; only one
    /// daemon is expected to use a given path. Must be called inside a tokio runtime.
    pub fn bind(path: impl AsRef<Path>, resolver: Arc<dyn Lookup>) -> crate::Result<Self> {
        let path = path.as_ref().to_path_buf();

        info!(path = %path.display(), "Creating local socket for name resolution");

        remove_stale_socket(&path)
            .with_context(|| format!("failed to remove old socket {}", path.display()))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create socket directory {}", parent.display()))?;
        }

        let listener = UnixListener::bind(&path)
            .with_context(|| format!("failed to bind resolver socket {}", path.display()))?;

        Ok(Self { listener, path, resolver })
    }

    /// Path the service is listening on
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept connections forever, handing each to its own worker task
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("Accepted new resolver connection");
                    tokio::spawn(worker::serve_connection(stream, Arc::clone(&self.resolver)));
                }
                Err(e) => {
                    warn!("Failed to accept for name resolution: {}", e);
                    // Usually fd exhaustion, give workers a moment to finish
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    /// Run the accept loop as a background task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

impl Drop for ResolverService {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), "Could not remove resolver socket: {}", e);
        }
    }
}

fn remove_stale_socket(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Socket exists, removed");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
