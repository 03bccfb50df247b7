//! Event sinks.
//!
//! A sink receives parsed device events one at a time, in order, from the
//! supervisor's session loop. Delivery errors are split into fatal (the
//! consumer is gone, stop the session) and non-fatal (log and keep reading).

pub mod http;
pub mod websocket;

use std::future::Future;

use medicart_core::DeviceEvent;

pub use http::{ForwardIdentity, HttpForwardSink};
pub use websocket::WebSocketSink;

/// Errors delivering an event to a sink.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The consumer disconnected; nothing further can be delivered.
    #[error("Consumer disconnected: {0}")]
    ConsumerGone(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Rejected by receiver with status {status}")]
    Rejected { status: u16 },

    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

impl DeliveryError {
    /// Whether the session should stop after this error.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ConsumerGone(_))
    }
}

/// Destination for device events.
pub trait Sink: Send {
    /// Deliver one event. Called sequentially; the next line is not read
    /// until this resolves.
    fn deliver(
        &mut self,
        event: &DeviceEvent,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

impl<T: Sink> Sink for &mut T {
    fn deliver(
        &mut self,
        event: &DeviceEvent,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send {
        (**self).deliver(event)
    }
}
