//! Session supervisor.
//!
//! Owns the channel table: one device tool session per channel, claimed
//! atomically and released by a guard. A session runs a sequential loop of
//! read line, parse, deliver; the next line is not read until the sink has
//! finished with the previous event.

mod disconnect;
mod state;
mod types;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use medicart_core::{DeviceKind, parse_line};

use crate::sink::Sink;
use crate::subprocess::{DeviceTool, ProcessSession};

pub use disconnect::spawn_disconnect_detector;
pub use state::ChannelGuard;
pub use types::{ActiveSessionInfo, ChannelId, SessionReport, SupervisorError, Termination};

use state::{ChannelTable, Slot, lock};

/// Runs device tool sessions, at most one per channel.
#[derive(Clone)]
pub struct Supervisor {
    channels: ChannelTable,
    tool: Arc<DeviceTool>,
}

impl Supervisor {
    pub fn new(tool: DeviceTool) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            tool: Arc::new(tool),
        }
    }

    pub fn tool(&self) -> &DeviceTool {
        &self.tool
    }

    /// Claim `channel` for a `kind` session.
    ///
    /// Fails with `AlreadyRunning` if the channel is occupied; the running
    /// session is not affected. When `parent` is given, cancelling it also
    /// cancels this session.
    pub fn claim(
        &self,
        channel: &ChannelId,
        kind: DeviceKind,
        parent: Option<&CancellationToken>,
    ) -> Result<ChannelGuard, SupervisorError> {
        let mut channels = lock(&self.channels);
        if let Some(existing) = channels.get(channel) {
            debug!(%channel, running = %existing.kind, requested = %kind, "Channel busy");
            return Err(SupervisorError::AlreadyRunning {
                channel: channel.clone(),
                kind: existing.kind,
            });
        }

        let cancel = parent.map_or_else(CancellationToken::new, CancellationToken::child_token);
        channels.insert(
            channel.clone(),
            Slot {
                kind,
                cancel: cancel.clone(),
                session_id: None,
                pid: None,
                started: Instant::now(),
            },
        );
        drop(channels);

        debug!(%channel, %kind, "Channel claimed");
        Ok(ChannelGuard::new(
            Arc::clone(&self.channels),
            channel.clone(),
            kind,
            cancel,
        ))
    }

    /// Start the device tool for a claimed channel.
    ///
    /// On failure the guard is dropped and the channel released.
    pub fn launch(&self, guard: ChannelGuard) -> Result<RunningSession, SupervisorError> {
        let cancel = guard.cancel_token().clone();
        let session = ProcessSession::start_with_cancel(&self.tool, guard.kind(), cancel)
            .inspect_err(|e| {
                warn!(
                    channel = %guard.channel(),
                    kind = %guard.kind(),
                    error = %e,
                    "Device tool launch failed"
                );
            })?;
        guard.attach(session.id(), session.pid());
        info!(
            channel = %guard.channel(),
            session_id = session.id(),
            pid = ?session.pid(),
            kind = guard.kind().label(),
            "Session started"
        );
        Ok(RunningSession { guard, session })
    }

    /// Claim, launch and forward to `sink` until the session ends.
    pub async fn run<K: Sink>(
        &self,
        channel: &ChannelId,
        kind: DeviceKind,
        sink: K,
        cancel: Option<&CancellationToken>,
    ) -> Result<SessionReport, SupervisorError> {
        let guard = self.claim(channel, kind, cancel)?;
        let running = self.launch(guard)?;
        Ok(running.forward(sink).await)
    }

    /// Cancel the session on `channel`. Returns `false` if none is running.
    pub fn cancel(&self, channel: &ChannelId) -> bool {
        let channels = lock(&self.channels);
        let Some(slot) = channels.get(channel) else {
            return false;
        };
        slot.cancel.cancel();
        drop(channels);
        info!(%channel, "Session cancellation requested");
        true
    }

    pub fn is_active(&self, channel: &ChannelId) -> bool {
        lock(&self.channels).contains_key(channel)
    }

    /// Snapshot of all occupied channels, ordered by channel name.
    pub fn active_sessions(&self) -> Vec<ActiveSessionInfo> {
        let mut sessions: Vec<_> = lock(&self.channels)
            .iter()
            .map(|(channel, slot)| slot.info(channel))
            .collect();
        sessions.sort_by(|a, b| a.channel.cmp(&b.channel));
        sessions
    }

    /// Cancel every running session. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let channels = lock(&self.channels);
        for slot in channels.values() {
            slot.cancel.cancel();
        }
        channels.len()
    }
}

/// A launched session holding its channel.
#[derive(Debug)]
pub struct RunningSession {
    guard: ChannelGuard,
    session: ProcessSession,
}

impl RunningSession {
    pub fn id(&self) -> &str {
        self.session.id()
    }

    pub const fn channel(&self) -> &ChannelId {
        self.guard.channel()
    }

    pub const fn cancel_token(&self) -> &CancellationToken {
        self.guard.cancel_token()
    }

    /// Pump device output into `sink` until end of output, a fatal delivery
    /// error, or cancellation. The process is reaped before the channel is
    /// released.
    pub async fn forward<K: Sink>(self, mut sink: K) -> SessionReport {
        let Self { guard, mut session } = self;
        let kind = guard.kind();
        let cancel = guard.cancel_token().clone();
        let session_id = session.id().to_string();

        let mut delivered = 0u64;
        let mut skipped = 0u64;
        let mut parse_errors = 0u64;
        let mut failed = 0u64;

        let termination = loop {
            let Some(line) = session.next_line().await else {
                break if cancel.is_cancelled() {
                    Termination::Cancelled
                } else {
                    Termination::EndOfStream
                };
            };

            let event = match parse_line(kind, &line) {
                Ok(Some(event)) => event,
                Ok(None) => {
                    skipped += 1;
                    continue;
                }
                Err(e) => {
                    parse_errors += 1;
                    warn!(%session_id, %kind, %line, error = %e, "Failed to parse device line");
                    continue;
                }
            };

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                result = sink.deliver(&event) => Some(result),
            };
            match result {
                None => break Termination::Cancelled,
                Some(Ok(())) => delivered += 1,
                Some(Err(e)) if e.is_fatal() => {
                    info!(
                        %session_id,
                        channel = %guard.channel(),
                        error = %e,
                        "Consumer gone, stopping session"
                    );
                    cancel.cancel();
                    break Termination::SinkGone;
                }
                Some(Err(e)) => {
                    failed += 1;
                    warn!(%session_id, channel = %guard.channel(), error = %e, "Delivery failed");
                }
            }
        };

        let exit = session.wait().await;
        if exit.is_error() {
            warn!(
                %session_id,
                channel = %guard.channel(),
                %exit,
                "Device tool exited abnormally"
            );
        } else {
            info!(
                %session_id,
                channel = %guard.channel(),
                %exit,
                ?termination,
                delivered,
                "Session finished"
            );
        }

        let channel = guard.channel().clone();
        drop(guard);

        SessionReport {
            session_id,
            channel,
            kind,
            delivered,
            skipped,
            parse_errors,
            failed,
            termination,
            exit,
        }
    }
}
