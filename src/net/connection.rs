use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::draft_engine::DraftEngine;
use crate::engine::error::DraftError;
use crate::engine::events::{ClientMessage, Envelope, Role, ServerEvent, SessionId};

/// Maximum bytes per message line. A full draft snapshot with rosters stays
/// well under 4 KiB; anything near this cap is garbage or abuse.
const MAX_LINE_LENGTH: usize = 16 * 1024;
/// Disconnect clients that send nothing for this long. Healthy clients
/// heartbeat every 30 seconds and never get close.
const IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Read one newline-terminated frame into `buf`, capping the accumulated
/// frame at MAX_LINE_LENGTH bytes. Returns Ok(0) on EOF, Ok(total frame
/// length) on success, Err on I/O error or an overlong frame.
///
/// Consumed bytes land in `buf` immediately, so a caller that drops this
/// future mid-frame (select against engine events, idle timeout) loses
/// nothing: the next call picks up where the stream left off, and the cap
/// is enforced against `buf` across calls.
async fn read_bounded_line<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
    buf: &mut String,
) -> std::io::Result<usize> {
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            // EOF; a dangling partial frame is handed back as-is.
            return Ok(buf.len());
        }
        if let Some(pos) = available.iter().position(|&b| b == b'\n') {
            let frame = &available[..=pos];
            buf.push_str(&String::from_utf8_lossy(frame));
            reader.consume(pos + 1);
            return Ok(buf.len());
        }
        let len = available.len();
        if buf.len() + len > MAX_LINE_LENGTH {
            buf.clear();
            reader.consume(len);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "frame exceeds maximum length",
            ));
        }
        buf.push_str(&String::from_utf8_lossy(available));
        reader.consume(len);
    }
}

/// Queue a line for the writer task. Send failures mean the connection is
/// closing; they are ignored here and surface as the writer exiting.
fn send_line(out_tx: &mpsc::UnboundedSender<String>, line: String) {
    let _ = out_tx.send(line);
}

/// Handle one draft client from accept to close. Accepts any stream
/// implementing AsyncRead + AsyncWrite so tests can drive it with an
/// in-memory duplex pipe.
pub async fn handle_draft_connection<S>(stream: S, peer: String, engine: Arc<DraftEngine>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    info!(%peer, "draft client connected");

    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    // Outbound lines funnel through one writer task so engine events and
    // connection-level replies cannot interleave mid-frame.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let write_handle = tokio::spawn(async move {
        while let Some(line) = out_rx.recv().await {
            let data = format!("{line}\n");
            if writer.write_all(data.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    // No handshake: a connection is a session from the first byte.
    let (session_id, mut event_rx) = engine.register_session();
    let mut line_buf = String::new();

    loop {
        tokio::select! {
            result = tokio::time::timeout(IDLE_TIMEOUT, read_bounded_line(&mut reader, &mut line_buf)) => {
                match result {
                    Ok(Ok(0)) | Ok(Err(_)) | Err(_) => break, // EOF, error, or timeout
                    Ok(Ok(_)) => {}
                }

                let line = line_buf.trim_end().to_string();
                line_buf.clear();
                if line.is_empty() {
                    continue;
                }

                let envelope: Envelope<ClientMessage> = match serde_json::from_str(&line) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        debug!(%peer, error = %e, "dropping unparseable frame");
                        engine.send_to_session(
                            session_id,
                            ServerEvent::error(&DraftError::InvalidInput(
                                "unrecognized message".into(),
                            )),
                        );
                        continue;
                    }
                };
                let message_id = envelope.message_id;
                let requires_ack = envelope.requires_ack;

                if let Err(err) = dispatch(&engine, session_id, envelope.msg) {
                    debug!(%peer, code = err.code(), "request refused");
                    engine.send_to_session(session_id, ServerEvent::error(&err));
                }
                // Acks confirm processing, not success: a refused request
                // was still received and handled.
                if requires_ack
                    && let Some(message_id) = message_id
                {
                    engine.send_to_session(session_id, ServerEvent::Ack { message_id });
                }
            }
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                match serde_json::to_string(&event) {
                    Ok(json) => send_line(&out_tx, json),
                    Err(e) => warn!(%peer, error = %e, "failed to serialize event"),
                }
            }
        }
    }

    engine.detach(session_id);
    info!(%peer, %session_id, "draft client disconnected");
    write_handle.abort();
}

/// Route one parsed message into the engine. Ping and ack are answered at
/// the connection level; everything else is room traffic.
fn dispatch(
    engine: &DraftEngine,
    session_id: SessionId,
    msg: ClientMessage,
) -> Result<(), DraftError> {
    match msg {
        ClientMessage::CreateRoom { player_name } => {
            engine.create_and_attach(session_id, player_name)?;
            Ok(())
        }
        ClientMessage::JoinRoom {
            room_code,
            player_name,
            captain,
        } => {
            engine.join_room(session_id, &room_code, player_name, captain)?;
            Ok(())
        }
        ClientMessage::SwitchTeam {
            team,
            player_name,
            captain,
        } => {
            let role = Role::parse(&team)?;
            engine.switch_role(session_id, role, player_name, captain)
        }
        ClientMessage::Rejoin {
            room_code,
            team,
            player_name,
        } => {
            let role = Role::parse(&team)?;
            engine.rejoin(session_id, &room_code, role, player_name)?;
            Ok(())
        }
        ClientMessage::StartDraft => engine.start_draft(session_id),
        ClientMessage::DraftAction { champion } => engine.apply_action(session_id, champion),
        ClientMessage::ToggleFearless { enabled } => engine.toggle_fearless(session_id, enabled),
        ClientMessage::ResetFearless => engine.reset_fearless(session_id),
        ClientMessage::Ping { timestamp } => {
            engine.send_to_session(session_id, ServerEvent::Pong { timestamp });
            Ok(())
        }
        ClientMessage::Ack { message_id } => {
            // The server does not track its own deliveries today; a stray
            // client ack is harmless.
            debug!(%session_id, %message_id, "client ack ignored");
            Ok(())
        }
    }
}
