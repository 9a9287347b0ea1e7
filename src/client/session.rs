//! Client-side session layer: one background task owns the transport and
//! exposes a [`DraftClient`] handle plus an event stream. The task keeps the
//! connection alive (heartbeat ping/pong), reconnects with exponential
//! backoff and replays a `rejoin` so the server answers with a sync-tagged
//! snapshot, and re-sends tracked messages until the server acknowledges
//! them or the retry budget runs out.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::error::DraftError;
use crate::engine::events::{ClientMessage, Envelope, Role, ServerEvent};

use super::transport::{Connector, Transport};

/// Cap on a single connect attempt; dead routes fail fast instead of
/// stalling the backoff schedule.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long `shutdown` waits for the session task before aborting it.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Tuning knobs for a [`DraftClient`] session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Ping cadence while connected.
    pub heartbeat_interval: Duration,
    /// Unanswered pings tolerated before the link is declared dead.
    pub missed_pong_limit: u32,
    /// First reconnect delay; doubles per attempt.
    pub reconnect_base_delay: Duration,
    /// Ceiling for the doubled delay.
    pub reconnect_max_delay: Duration,
    /// Consecutive failed connect attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Wait before the first re-send of an unacknowledged message; doubles
    /// per re-send.
    pub ack_retry_delay: Duration,
    /// Total wire sends allowed per tracked message.
    pub max_send_attempts: u32,
    /// Bounded capacity of the event channel handed to the app.
    pub event_channel_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            missed_pong_limit: 3,
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
            max_reconnect_attempts: 10,
            ack_retry_delay: Duration::from_secs(2),
            max_send_attempts: 4,
            event_channel_capacity: 256,
        }
    }
}

/// Where the session currently stands with respect to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// What the app observes. Delivery acks and heartbeat pongs are consumed
/// internally and never surface here.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Transport established (initial connect or after a reconnect).
    Connected,
    /// A server push, unwrapped from its envelope. Payloads flagged
    /// `sync: true` replay known history and should refresh the display
    /// without animation.
    Server(ServerEvent),
    /// Transport lost; the next attempt fires after `delay`.
    Reconnecting { attempt: u32, delay: Duration },
    /// Retry budget exhausted; the session emits nothing further.
    ConnectionLost,
    /// A tracked message was never acknowledged.
    DeliveryFailed { message_id: Uuid, attempts: u32 },
    /// The session ended on request.
    Closed,
}

// ── Handle ──────────────────────────────────────────────────────────

enum Command {
    Send(ClientMessage),
    Leave,
}

/// State mirrored out of the session task for handle-side reads.
struct SharedState {
    state: RwLock<ConnectionState>,
    room_code: RwLock<Option<String>>,
    role: RwLock<Option<Role>>,
}

/// Handle to a running client session.
///
/// Created via [`DraftClient::start`], which spawns the background task and
/// returns this handle together with the event receiver. All send methods
/// queue the message and return once it is handed to the task; delivery
/// outcomes arrive as [`ClientEvent`]s.
pub struct DraftClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    shared: Arc<SharedState>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl DraftClient {
    /// Spawn the session task. The connector is retried with backoff until
    /// a transport comes up or the attempt budget is spent.
    #[must_use = "the event receiver must be consumed"]
    pub fn start<C: Connector + Sync>(
        connector: C,
        config: ClientConfig,
    ) -> (Self, mpsc::Receiver<ClientEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity.max(1));
        let shared = Arc::new(SharedState {
            state: RwLock::new(ConnectionState::Connecting),
            room_code: RwLock::new(None),
            role: RwLock::new(None),
        });

        let session = Session {
            connector,
            config,
            shared: Arc::clone(&shared),
            cmd_rx,
            event_tx,
            memory: SessionMemory::default(),
            pending: HashMap::new(),
            pending_pongs: 0,
        };
        let task = tokio::spawn(session.run());

        (
            Self {
                cmd_tx,
                shared,
                task: Some(task),
            },
            event_rx,
        )
    }

    pub fn create_room(&self, player_name: impl Into<String>) -> Result<(), DraftError> {
        self.send(ClientMessage::CreateRoom {
            player_name: player_name.into(),
        })
    }

    pub fn join_room(
        &self,
        room_code: impl Into<String>,
        player_name: impl Into<String>,
        captain: bool,
    ) -> Result<(), DraftError> {
        self.send(ClientMessage::JoinRoom {
            room_code: room_code.into(),
            player_name: player_name.into(),
            captain,
        })
    }

    pub fn switch_team(
        &self,
        team: Role,
        player_name: impl Into<String>,
        captain: bool,
    ) -> Result<(), DraftError> {
        self.send(ClientMessage::SwitchTeam {
            team: team.as_str().to_string(),
            player_name: player_name.into(),
            captain,
        })
    }

    pub fn start_draft(&self) -> Result<(), DraftError> {
        self.send(ClientMessage::StartDraft)
    }

    pub fn draft_action(&self, champion: impl Into<String>) -> Result<(), DraftError> {
        self.send(ClientMessage::DraftAction {
            champion: champion.into(),
        })
    }

    pub fn toggle_fearless(&self, enabled: bool) -> Result<(), DraftError> {
        self.send(ClientMessage::ToggleFearless { enabled })
    }

    pub fn reset_fearless(&self) -> Result<(), DraftError> {
        self.send(ClientMessage::ResetFearless)
    }

    /// Manual liveness probe outside the automatic heartbeat.
    pub fn ping(&self) -> Result<(), DraftError> {
        self.send(ClientMessage::Ping {
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }

    /// Abandon multiplayer: cancels any reconnect cycle, drops queued
    /// messages and pending retries, and closes the transport.
    pub fn leave(&self) {
        let _ = self.cmd_tx.send(Command::Leave);
    }

    /// Leave and wait for the session task to wind down.
    pub async fn shutdown(&mut self) {
        self.leave();
        if let Some(mut task) = self.task.take()
            && tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut task)
                .await
                .is_err()
        {
            warn!("session task did not exit in time, aborting");
            task.abort();
        }
    }

    pub async fn state(&self) -> ConnectionState {
        *self.shared.state.read().await
    }

    pub async fn current_room(&self) -> Option<String> {
        self.shared.room_code.read().await.clone()
    }

    pub async fn current_role(&self) -> Option<Role> {
        *self.shared.role.read().await
    }

    fn send(&self, msg: ClientMessage) -> Result<(), DraftError> {
        self.cmd_tx
            .send(Command::Send(msg))
            .map_err(|_| DraftError::NotConnected)
    }
}

impl Drop for DraftClient {
    fn drop(&mut self) {
        // No executor to drive a graceful close from here.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Session task ────────────────────────────────────────────────────

/// Identity to replay on reconnect, learned from confirmed server replies
/// (and from outbound intents, for the display name).
#[derive(Default)]
struct SessionMemory {
    room_code: Option<String>,
    role: Option<Role>,
    player_name: Option<String>,
}

struct PendingSend {
    envelope: Envelope<ClientMessage>,
    /// Wire sends so far; 0 while queued offline.
    attempts: u32,
    next_retry: Instant,
}

enum ConnectOutcome<T> {
    Connected(T),
    /// Leave arrived while waiting.
    Cancelled,
    Exhausted,
}

enum LinkExit {
    /// Explicit leave, or the handle was dropped.
    Closed,
    /// Transport failed or the heartbeat declared it dead.
    Lost,
}

struct Session<C: Connector> {
    connector: C,
    config: ClientConfig,
    shared: Arc<SharedState>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: mpsc::Sender<ClientEvent>,
    memory: SessionMemory,
    pending: HashMap<Uuid, PendingSend>,
    pending_pongs: u32,
}

impl<C: Connector> Session<C> {
    async fn run(mut self) {
        let mut transport = match self.connect_with_backoff(false).await {
            ConnectOutcome::Connected(t) => t,
            ConnectOutcome::Cancelled => {
                self.finish(ClientEvent::Closed).await;
                return;
            }
            ConnectOutcome::Exhausted => {
                self.finish(ClientEvent::ConnectionLost).await;
                return;
            }
        };
        self.set_state(ConnectionState::Connected).await;
        self.emit(ClientEvent::Connected);

        loop {
            match self.run_link(&mut transport).await {
                LinkExit::Closed => {
                    let _ = transport.close().await;
                    self.finish(ClientEvent::Closed).await;
                    return;
                }
                LinkExit::Lost => {
                    let _ = transport.close().await;
                    match self.connect_with_backoff(true).await {
                        ConnectOutcome::Connected(t) => {
                            transport = t;
                            self.set_state(ConnectionState::Connected).await;
                            self.emit(ClientEvent::Connected);
                            if let Err(e) = self.send_rejoin(&mut transport).await {
                                // The fresh link died immediately; the next
                                // run_link pass notices and cycles again.
                                warn!(error = %e, "rejoin send failed");
                            }
                        }
                        ConnectOutcome::Cancelled => {
                            self.finish(ClientEvent::Closed).await;
                            return;
                        }
                        ConnectOutcome::Exhausted => {
                            self.finish(ClientEvent::ConnectionLost).await;
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Dial until a transport comes up, honoring leave and queueing tracked
    /// sends for after the link returns. Initial connects dial immediately;
    /// reconnects wait out the backoff first.
    async fn connect_with_backoff(&mut self, reconnecting: bool) -> ConnectOutcome<C::Transport> {
        self.set_state(if reconnecting {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Connecting
        })
        .await;

        let mut delay = self.config.reconnect_base_delay;
        for attempt in 1..=self.config.max_reconnect_attempts {
            if reconnecting {
                self.emit(ClientEvent::Reconnecting { attempt, delay });
                if self.wait_backoff(delay).await {
                    return ConnectOutcome::Cancelled;
                }
            }
            match tokio::time::timeout(CONNECT_TIMEOUT, self.connector.connect()).await {
                Ok(Ok(transport)) => {
                    info!(attempt, "transport established");
                    return ConnectOutcome::Connected(transport);
                }
                Ok(Err(e)) => warn!(attempt, error = %e, "connect failed"),
                Err(_) => warn!(attempt, "connect attempt timed out"),
            }
            if !reconnecting && self.wait_backoff(delay).await {
                return ConnectOutcome::Cancelled;
            }
            delay = (delay * 2).min(self.config.reconnect_max_delay);
        }
        ConnectOutcome::Exhausted
    }

    /// Sleep for `delay` while still servicing the command channel.
    /// Returns true if the session should stop.
    async fn wait_backoff(&mut self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return false,
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Send(msg)) => self.queue_offline(msg),
                    Some(Command::Leave) | None => return true,
                },
            }
        }
    }

    /// Drive one live transport until it closes or dies.
    async fn run_link(&mut self, transport: &mut C::Transport) -> LinkExit {
        self.pending_pongs = 0;
        let mut heartbeat = tokio::time::interval_at(
            Instant::now() + self.config.heartbeat_interval,
            self.config.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let scan_every = (self.config.ack_retry_delay / 2).max(Duration::from_millis(10));
        let mut retry_scan = tokio::time::interval(scan_every);
        retry_scan.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Send(msg)) => {
                        if let Err(e) = self.dispatch(transport, msg).await {
                            warn!(error = %e, "send failed, reconnecting");
                            return LinkExit::Lost;
                        }
                    }
                    Some(Command::Leave) | None => return LinkExit::Closed,
                },
                incoming = transport.recv() => match incoming {
                    Some(Ok(line)) => {
                        if let Err(e) = self.handle_line(transport, &line).await {
                            warn!(error = %e, "ack send failed, reconnecting");
                            return LinkExit::Lost;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "transport read error");
                        return LinkExit::Lost;
                    }
                    None => {
                        info!("server closed the connection");
                        return LinkExit::Lost;
                    }
                },
                _ = heartbeat.tick() => {
                    if self.pending_pongs >= self.config.missed_pong_limit {
                        warn!(missed = self.pending_pongs, "no pong from server, forcing reconnect");
                        return LinkExit::Lost;
                    }
                    let ping = ClientMessage::Ping {
                        timestamp: chrono::Utc::now().timestamp_millis(),
                    };
                    if let Err(e) = write_frame(transport, &Envelope::bare(ping)).await {
                        warn!(error = %e, "ping failed, reconnecting");
                        return LinkExit::Lost;
                    }
                    self.pending_pongs += 1;
                }
                _ = retry_scan.tick() => {
                    if let Err(e) = self.flush_due_retries(transport).await {
                        warn!(error = %e, "retry send failed, reconnecting");
                        return LinkExit::Lost;
                    }
                }
            }
        }
    }

    /// Send one intent on the live link, tracking it if it needs an ack.
    async fn dispatch(&mut self, transport: &mut C::Transport, msg: ClientMessage) -> io::Result<()> {
        self.remember_outbound(&msg);
        if needs_ack(&msg) {
            let id = Uuid::new_v4();
            let envelope = Envelope::tracked(msg, id);
            write_frame(transport, &envelope).await?;
            self.pending.insert(
                id,
                PendingSend {
                    envelope,
                    attempts: 1,
                    next_retry: Instant::now() + self.config.ack_retry_delay,
                },
            );
        } else {
            write_frame(transport, &Envelope::bare(msg)).await?;
        }
        Ok(())
    }

    /// Stash an intent while no link is up; the retry scan delivers it
    /// once reconnected. Untracked traffic is stale by then and dropped.
    fn queue_offline(&mut self, msg: ClientMessage) {
        self.remember_outbound(&msg);
        if needs_ack(&msg) {
            let id = Uuid::new_v4();
            self.pending.insert(
                id,
                PendingSend {
                    envelope: Envelope::tracked(msg, id),
                    attempts: 0,
                    next_retry: Instant::now(),
                },
            );
        } else {
            debug!("dropping untracked message while disconnected");
        }
    }

    /// Re-send every due tracked message; expire the ones that spent their
    /// attempt budget.
    async fn flush_due_retries(&mut self, transport: &mut C::Transport) -> io::Result<()> {
        let now = Instant::now();
        let due: Vec<Uuid> = self
            .pending
            .iter()
            .filter(|(_, p)| p.next_retry <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in due {
            let Some(mut entry) = self.pending.remove(&id) else {
                continue;
            };
            if entry.attempts >= self.config.max_send_attempts {
                warn!(message_id = %id, attempts = entry.attempts, "message never acknowledged, giving up");
                self.emit(ClientEvent::DeliveryFailed {
                    message_id: id,
                    attempts: entry.attempts,
                });
                continue;
            }
            entry.attempts += 1;
            let shift = (entry.attempts - 1).min(6);
            entry.next_retry = now + self.config.ack_retry_delay * 2u32.pow(shift);
            let envelope = entry.envelope.clone();
            debug!(message_id = %id, attempt = entry.attempts, "re-sending unacknowledged message");
            self.pending.insert(id, entry);
            write_frame(transport, &envelope).await?;
        }
        Ok(())
    }

    /// Process one inbound frame. Pongs and acks are bookkeeping; everything
    /// else is forwarded to the app.
    async fn handle_line(&mut self, transport: &mut C::Transport, line: &str) -> io::Result<()> {
        let envelope: Envelope<ServerEvent> = match serde_json::from_str(line) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "malformed server frame dropped");
                return Ok(());
            }
        };
        if envelope.requires_ack
            && let Some(message_id) = envelope.message_id
        {
            write_frame(transport, &Envelope::bare(ClientMessage::Ack { message_id })).await?;
        }

        match envelope.msg {
            ServerEvent::Pong { timestamp } => {
                self.pending_pongs = 0;
                debug!(
                    rtt_ms = chrono::Utc::now().timestamp_millis() - timestamp,
                    "pong"
                );
            }
            ServerEvent::Ack { message_id } => {
                if self.pending.remove(&message_id).is_some() {
                    debug!(%message_id, "delivery confirmed");
                } else {
                    debug!(%message_id, "ack for unknown or expired message");
                }
            }
            event => {
                match &event {
                    ServerEvent::RoomCreated { room_code, role, .. }
                    | ServerEvent::RoomJoined { room_code, role, .. } => {
                        self.memory.room_code = Some(room_code.clone());
                        self.memory.role = Some(*role);
                        self.sync_shared().await;
                    }
                    ServerEvent::TeamSwitched { team, player_name } => {
                        // Broadcast for any switcher; only our own name moves us.
                        if self.memory.player_name.as_deref() == Some(player_name.as_str()) {
                            self.memory.role = Some(*team);
                            self.sync_shared().await;
                        }
                    }
                    _ => {}
                }
                self.emit(ClientEvent::Server(event));
            }
        }
        Ok(())
    }

    /// Replay attachment after a reconnect; the server's reply comes back
    /// sync-tagged. A session that never attached anywhere sends nothing.
    async fn send_rejoin(&mut self, transport: &mut C::Transport) -> io::Result<()> {
        let (Some(room_code), Some(player_name)) = (
            self.memory.room_code.clone(),
            self.memory.player_name.clone(),
        ) else {
            return Ok(());
        };
        let claimed = self.memory.role.unwrap_or(Role::Spectator);
        info!(%room_code, role = claimed.as_str(), "rejoining after reconnect");

        let id = Uuid::new_v4();
        let envelope = Envelope::tracked(
            ClientMessage::Rejoin {
                room_code,
                team: claimed.as_str().to_string(),
                player_name,
            },
            id,
        );
        write_frame(transport, &envelope).await?;
        self.pending.insert(
            id,
            PendingSend {
                envelope,
                attempts: 1,
                next_retry: Instant::now() + self.config.ack_retry_delay,
            },
        );
        Ok(())
    }

    fn remember_outbound(&mut self, msg: &ClientMessage) {
        match msg {
            ClientMessage::CreateRoom { player_name }
            | ClientMessage::SwitchTeam { player_name, .. } => {
                self.memory.player_name = Some(player_name.clone());
            }
            ClientMessage::JoinRoom {
                room_code,
                player_name,
                ..
            }
            | ClientMessage::Rejoin {
                room_code,
                player_name,
                ..
            } => {
                self.memory.room_code = Some(room_code.clone());
                self.memory.player_name = Some(player_name.clone());
            }
            _ => {}
        }
    }

    async fn sync_shared(&self) {
        *self.shared.room_code.write().await = self.memory.room_code.clone();
        *self.shared.role.write().await = self.memory.role;
    }

    async fn set_state(&self, state: ConnectionState) {
        *self.shared.state.write().await = state;
    }

    /// Non-blocking emit; a stalled consumer loses events instead of
    /// stalling the transport.
    fn emit(&self, event: ClientEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(
                    "event channel full, dropping {:?}",
                    std::mem::discriminant(&dropped)
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event channel closed, receiver dropped");
            }
        }
    }

    /// Terminal events are delivered with a blocking send so the app always
    /// learns how the session ended.
    async fn finish(&mut self, event: ClientEvent) {
        self.set_state(ConnectionState::Disconnected).await;
        if self.event_tx.send(event).await.is_err() {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Draft-affecting intents ride tracked envelopes; liveness traffic does not.
fn needs_ack(msg: &ClientMessage) -> bool {
    !matches!(msg, ClientMessage::Ping { .. } | ClientMessage::Ack { .. })
}

async fn write_frame<T: Transport>(
    transport: &mut T,
    envelope: &Envelope<ClientMessage>,
) -> io::Result<()> {
    match serde_json::to_string(envelope) {
        Ok(json) => transport.send(&json).await,
        Err(e) => {
            // A message we built ourselves failing to serialize is a bug,
            // not a link problem.
            error!(error = %e, "failed to serialize outbound message");
            Ok(())
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
