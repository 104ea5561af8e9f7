//! Client side of the resolver socket, used by test processes.

use std::io;
use std::path::Path;

use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tracing::debug;

use crate::protocol::{NameQuery, ResolvedAddress, ResolverCodec};

/// One resolution session with the local service
///
/// The service answers a single batch per connection, so `resolve` consumes
/// the client.
pub struct ResolverClient {
    stream: UnixStream,
    codec: ResolverCodec,
}

impl ResolverClient {
    /// Connect to the service listening at `path`
    pub async fn connect(path: impl AsRef<Path>) -> io::Result<Self> {
        let stream = UnixStream::connect(path.as_ref()).await?;
        Ok(Self { stream, codec: ResolverCodec })
    }

    /// Submit every query and collect the resolved addresses.
    ///
    /// Records arrive in lookup completion order, not query order.
    pub async fn resolve(mut self, queries: &[NameQuery]) -> io::Result<Vec<ResolvedAddress>> {
        if queries.is_empty() {
            self.codec.write_end_of_requests(&mut self.stream).await?;
        }

        let last = queries.len().saturating_sub(1);
        for (index, query) in queries.iter().enumerate() {
            self.codec.write_request(&mut self.stream, query, index < last).await?;
        }

        let mut results = Vec::new();
        while let Some((entry, more)) = self.codec.read_response(&mut self.stream).await? {
            results.push(entry);
            if !more {
                break;
            }
        }

        debug!(queries = queries.len(), results = results.len(), "Resolver session finished");

        // Best effort, the service has finished with us either way
        let _ = self.stream.shutdown().await;

        Ok(results)
    }
}
