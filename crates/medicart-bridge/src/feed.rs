//! Camera frame relay.
//!
//! One desktop feed connects at a time and pushes JPEG frames tagged with
//! the clinic and patient they show. Viewers subscribe to a clinic/patient
//! key and receive only frames for that key. The feed also takes `start` /
//! `stop` control commands from the HTTP API.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::body::Bytes;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

/// Frames buffered per subscriber before new frames are dropped for it.
const SUBSCRIBER_BUFFER: usize = 16;

/// Control commands buffered for the feed.
const CONTROL_BUFFER: usize = 8;

/// Name used when the feed has not said who it is showing.
pub const UNKNOWN: &str = "Unknown";

/// Clinic/patient pair that frames are routed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    clinic: String,
    patient: String,
}

impl StreamKey {
    /// Blank components become `unknown`; others are trimmed.
    pub fn new(clinic: &str, patient: &str) -> Self {
        Self {
            clinic: normalize(clinic),
            patient: normalize(patient),
        }
    }
}

fn normalize(part: &str) -> String {
    let part = part.trim();
    if part.is_empty() {
        "unknown".to_string()
    } else {
        part.to_string()
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.clinic, self.patient)
    }
}

/// Metadata text frame sent by the feed ahead of its frames.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedMetadata {
    #[serde(default)]
    pub clinic_name: String,
    #[serde(default)]
    pub patient_name: String,
}

impl FeedMetadata {
    /// Overlay non-empty fields onto the current `(clinic, patient)`.
    pub fn apply(self, clinic: &mut String, patient: &mut String) {
        if !self.clinic_name.is_empty() {
            *clinic = self.clinic_name;
        }
        if !self.patient_name.is_empty() {
            *patient = self.patient_name;
        }
    }
}

/// Commands sent to the connected feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedControl {
    Start,
    Stop,
}

impl FeedControl {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

/// Frame relay errors.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("no desktop connected")]
    NotConnected,

    #[error("failed to send command: {0}")]
    SendFailed(String),
}

/// The connected feed's side of the relay.
#[derive(Debug)]
pub struct FeedRegistration {
    pub id: u64,
    /// Control commands for this feed. Closes when the feed is replaced.
    pub control: mpsc::Receiver<FeedControl>,
}

/// A viewer's side of the relay.
#[derive(Debug)]
pub struct Subscription {
    pub id: u64,
    pub key: StreamKey,
    pub frames: mpsc::Receiver<Bytes>,
}

struct Feed {
    id: u64,
    control: mpsc::Sender<FeedControl>,
}

struct Subscriber {
    id: u64,
    frames: mpsc::Sender<Bytes>,
}

#[derive(Default)]
struct RelayState {
    next_id: u64,
    feed: Option<Feed>,
    streams: HashMap<StreamKey, Vec<Subscriber>>,
}

impl RelayState {
    const fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Routes frames from the feed to viewers.
#[derive(Clone, Default)]
pub struct FrameRelay {
    state: Arc<Mutex<RelayState>>,
}

impl FrameRelay {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RelayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new feed, replacing any existing one.
    pub fn attach_feed(&self) -> FeedRegistration {
        let (tx, rx) = mpsc::channel(CONTROL_BUFFER);
        let mut state = self.lock();
        let id = state.next_id();
        if let Some(old) = state.feed.replace(Feed { id, control: tx }) {
            info!(old = old.id, new = id, "Feed replaced");
        } else {
            info!(id, "Feed connected");
        }
        drop(state);
        FeedRegistration { id, control: rx }
    }

    /// Remove feed `id` if it is still the current one.
    pub fn detach_feed(&self, id: u64) {
        let mut state = self.lock();
        if state.feed.as_ref().is_some_and(|f| f.id == id) {
            state.feed = None;
            drop(state);
            info!(id, "Feed disconnected");
        }
    }

    pub fn has_feed(&self) -> bool {
        self.lock().feed.is_some()
    }

    /// Queue a control command for the connected feed.
    pub fn send_control(&self, command: FeedControl) -> Result<(), FeedError> {
        let mut state = self.lock();
        let feed = state.feed.as_ref().ok_or(FeedError::NotConnected)?;
        match feed.control.try_send(command) {
            Ok(()) => {
                debug!(command = command.as_str(), "Feed control queued");
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(FeedError::SendFailed("feed is not reading".into())),
            Err(TrySendError::Closed(_)) => {
                state.feed = None;
                Err(FeedError::SendFailed("feed disconnected".into()))
            }
        }
    }

    /// Subscribe to frames for `key`.
    pub fn subscribe(&self, key: StreamKey) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let mut state = self.lock();
        let id = state.next_id();
        state
            .streams
            .entry(key.clone())
            .or_default()
            .push(Subscriber { id, frames: tx });
        drop(state);
        info!(%key, id, "Stream subscriber connected");
        Subscription {
            id,
            key,
            frames: rx,
        }
    }

    pub fn unsubscribe(&self, key: &StreamKey, id: u64) {
        let mut state = self.lock();
        if let Some(subscribers) = state.streams.get_mut(key) {
            subscribers.retain(|s| s.id != id);
            if subscribers.is_empty() {
                state.streams.remove(key);
            }
        }
        drop(state);
        info!(%key, id, "Stream subscriber disconnected");
    }

    pub fn subscriber_count(&self, key: &StreamKey) -> usize {
        self.lock().streams.get(key).map_or(0, Vec::len)
    }

    /// Send `frame` to every subscriber of `key`. Returns how many took it.
    ///
    /// Subscribers whose receiver is gone are pruned. A subscriber that is
    /// behind skips this frame.
    pub fn broadcast(&self, key: &StreamKey, frame: &Bytes) -> usize {
        let mut state = self.lock();
        let Some(subscribers) = state.streams.get_mut(key) else {
            return 0;
        };

        let mut delivered = 0;
        subscribers.retain(|s| match s.frames.try_send(frame.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(%key, id = s.id, "Subscriber lagging, frame dropped");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
        if subscribers.is_empty() {
            state.streams.remove(key);
        }
        delivered
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn key_normalizes_blank_parts() {
        assert_eq!(StreamKey::new(" North ", "Ada").to_string(), "North|Ada");
        assert_eq!(StreamKey::new("", "  ").to_string(), "unknown|unknown");
        assert_eq!(StreamKey::new(UNKNOWN, UNKNOWN).to_string(), "Unknown|Unknown");
    }

    #[test]
    fn metadata_overlays_non_empty_fields() {
        let mut clinic = UNKNOWN.to_string();
        let mut patient = UNKNOWN.to_string();
        let meta: FeedMetadata = serde_json::from_str(r#"{"clinic_name": "North"}"#).unwrap();
        meta.apply(&mut clinic, &mut patient);
        assert_eq!(clinic, "North");
        assert_eq!(patient, UNKNOWN);
    }

    #[tokio::test]
    async fn frames_reach_only_matching_key() {
        let relay = FrameRelay::new();
        let mut ada = relay.subscribe(StreamKey::new("North", "Ada"));
        let mut grace = relay.subscribe(StreamKey::new("North", "Grace"));

        let frame = Bytes::from_static(b"\xff\xd8jpeg");
        assert_eq!(relay.broadcast(&StreamKey::new("North", "Ada"), &frame), 1);

        assert_eq!(ada.frames.recv().await.unwrap(), frame);
        assert!(grace.frames.try_recv().is_err());
    }

    #[test]
    fn closed_subscribers_are_pruned() {
        let relay = FrameRelay::new();
        let key = StreamKey::new("North", "Ada");
        let gone = relay.subscribe(key.clone());
        let _kept = relay.subscribe(key.clone());
        drop(gone);

        assert_eq!(relay.broadcast(&key, &Bytes::from_static(b"f")), 1);
        assert_eq!(relay.subscriber_count(&key), 1);
    }

    #[test]
    fn unsubscribe_removes_empty_key() {
        let relay = FrameRelay::new();
        let key = StreamKey::new("North", "Ada");
        let sub = relay.subscribe(key.clone());
        relay.unsubscribe(&key, sub.id);
        assert_eq!(relay.subscriber_count(&key), 0);
        assert_eq!(relay.broadcast(&key, &Bytes::from_static(b"f")), 0);
    }

    #[test]
    fn control_without_feed_fails() {
        let relay = FrameRelay::new();
        assert!(matches!(
            relay.send_control(FeedControl::Start),
            Err(FeedError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn new_feed_replaces_old() {
        let relay = FrameRelay::new();
        let mut first = relay.attach_feed();
        let mut second = relay.attach_feed();

        assert!(first.control.recv().await.is_none());

        relay.send_control(FeedControl::Stop).unwrap();
        assert_eq!(second.control.recv().await, Some(FeedControl::Stop));

        relay.detach_feed(first.id);
        assert!(relay.has_feed());
        relay.detach_feed(second.id);
        assert!(!relay.has_feed());
    }
}
