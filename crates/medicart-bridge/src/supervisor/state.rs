//! Channel slot table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use medicart_core::DeviceKind;

use super::types::{ActiveSessionInfo, ChannelId};

/// An occupied channel.
#[derive(Debug)]
pub(crate) struct Slot {
    pub kind: DeviceKind,
    pub cancel: CancellationToken,
    pub session_id: Option<String>,
    pub pid: Option<u32>,
    pub started: Instant,
}

impl Slot {
    pub fn info(&self, channel: &ChannelId) -> ActiveSessionInfo {
        ActiveSessionInfo {
            channel: channel.to_string(),
            kind: self.kind,
            session_id: self.session_id.clone(),
            pid: self.pid,
            running_secs: self.started.elapsed().as_secs(),
        }
    }
}

pub(crate) type ChannelTable = Arc<Mutex<HashMap<ChannelId, Slot>>>;

/// Lock the table. A panic while holding the lock leaves the map itself
/// consistent, so poisoning is ignored.
pub(crate) fn lock(
    table: &Mutex<HashMap<ChannelId, Slot>>,
) -> MutexGuard<'_, HashMap<ChannelId, Slot>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Exclusive ownership of a channel slot.
///
/// The slot is released when the guard is dropped, on every exit path.
#[derive(Debug)]
pub struct ChannelGuard {
    table: ChannelTable,
    channel: ChannelId,
    kind: DeviceKind,
    cancel: CancellationToken,
}

impl ChannelGuard {
    pub(crate) const fn new(
        table: ChannelTable,
        channel: ChannelId,
        kind: DeviceKind,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            table,
            channel,
            kind,
            cancel,
        }
    }

    pub const fn channel(&self) -> &ChannelId {
        &self.channel
    }

    pub const fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// Token that cancels the session running on this channel.
    pub const fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Record the launched process against the slot.
    pub(crate) fn attach(&self, session_id: &str, pid: Option<u32>) {
        if let Some(slot) = lock(&self.table).get_mut(&self.channel) {
            slot.session_id = Some(session_id.to_string());
            slot.pid = pid;
        }
    }
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        lock(&self.table).remove(&self.channel);
        debug!(channel = %self.channel, "Channel released");
    }
}
