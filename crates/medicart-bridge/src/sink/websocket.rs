//! WebSocket sink: one text message of wire JSON per event.

use std::fmt::Display;

use axum::extract::ws::Message;
use futures::SinkExt;
use tracing::debug;

use medicart_core::DeviceEvent;

use super::{DeliveryError, Sink};

/// Writes events to the outbound half of a WebSocket.
///
/// Generic over any `futures::Sink<Message>` so the same sink serves axum's
/// split socket and in-memory channels.
pub struct WebSocketSink<S> {
    inner: S,
}

impl<S> WebSocketSink<S>
where
    S: futures::Sink<Message> + Unpin + Send,
    S::Error: Display,
{
    pub const fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Send a text message that is not a device event.
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<(), DeliveryError> {
        let text: String = text.into();
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| DeliveryError::ConsumerGone(e.to_string()))
    }

    /// Send a close frame and flush. Errors are ignored: the peer may
    /// already be gone.
    pub async fn close(&mut self) {
        if let Err(e) = self.inner.send(Message::Close(None)).await {
            debug!(error = %e, "Close frame not delivered");
        }
        let _ = self.inner.close().await;
    }

    /// Send a final status event, then close.
    pub async fn finish_with_status(&mut self, message: impl Into<String>) {
        if let Err(e) = self.deliver(&DeviceEvent::status(message)).await {
            debug!(error = %e, "Final status not delivered");
        }
        self.close().await;
    }
}

impl<S> Sink for WebSocketSink<S>
where
    S: futures::Sink<Message> + Unpin + Send,
    S::Error: Display,
{
    async fn deliver(&mut self, event: &DeviceEvent) -> Result<(), DeliveryError> {
        let json = serde_json::to_string(event)?;
        self.send_text(json).await
    }
}
