//! Connection worker: owns one accepted client until the stream closes.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tracing::{debug, warn};

use super::session::ResolverSession;
use crate::protocol::ResolverCodec;
use crate::resolver::Lookup;

/// Serve one client: collect its names, wait for every lookup, stream the results back.
///
/// Any read or write failure ends this connection only. Lookups already in
/// flight finish on their own and their results are discarded.
pub(crate) async fn serve_connection(mut stream: UnixStream, resolver: Arc<dyn Lookup>) {
    let mut codec = ResolverCodec;
    let mut session = ResolverSession::new(resolver);

    debug!("Starting new name resolution worker");

    loop {
        let frame = match codec.read_request(&mut stream).await {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Error reading name request, aborting: {}", e);
                return;
            }
        };

        if let Some(query) = frame.query {
            debug!(name = %query.name, family = %query.family, max = query.max_count, "Queued name");
            session.submit(query);
        }

        if !frame.more {
            break;
        }
    }

    debug!(outstanding = session.outstanding(), "Got all requests, waiting for responses");

    let results = session.settle().await;

    debug!(count = results.len(), "Got all responses, sending them back");

    let last = results.len().saturating_sub(1);
    for (index, entry) in results.iter().enumerate() {
        if let Err(e) = codec.write_response(&mut stream, entry, index < last).await {
            warn!("Failed to send resolved address: {}", e);
            return;
        }
    }

    if let Err(e) = stream.shutdown().await {
        debug!("Error closing resolver connection: {}", e);
    }

    debug!("Name resolution worker completed");
}
