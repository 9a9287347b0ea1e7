use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::events::{ServerEvent, SessionId};

/// Maximum queued outbound events per session.
pub const MAX_OUTBOUND_QUEUE: usize = 1024;

/// A connected client session. The engine doesn't know or care what
/// transport sits behind the outbound channel; display names live on the
/// room slots, not here.
#[derive(Debug)]
pub struct PlayerSession {
    pub id: SessionId,
    /// Bounded queue draining into this session's write loop.
    pub outbound: mpsc::Sender<ServerEvent>,
    pub connected_at: DateTime<Utc>,
}

impl PlayerSession {
    pub fn new(id: SessionId, outbound: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            id,
            outbound,
            connected_at: Utc::now(),
        }
    }

    /// Send an event to this session. Returns false when the channel is
    /// closed or the queue is full; a slow client loses events, it never
    /// stalls the engine.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.outbound.try_send(event).is_ok()
    }
}
