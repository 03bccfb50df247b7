//! WebSocket disconnect detection.

use std::fmt::Display;

use axum::extract::ws::Message;
use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Consume inbound frames until the peer goes away, then cancel `token`.
///
/// A close frame, a read error and the end of the stream all count as a
/// disconnect. Inbound text or binary frames are ignored. The task also
/// exits, without cancelling anything further, once `token` is cancelled
/// from elsewhere.
pub fn spawn_disconnect_detector<S, E>(mut inbound: S, token: CancellationToken) -> JoinHandle<()>
where
    S: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: Display + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                () = token.cancelled() => return,
                frame = inbound.next() => frame,
            };
            match frame {
                Some(Ok(Message::Close(_))) => {
                    debug!("Peer sent close frame");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "WebSocket read failed");
                    break;
                }
                None => {
                    debug!("WebSocket stream ended");
                    break;
                }
            }
        }
        token.cancel();
    })
}
