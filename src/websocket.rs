//! # Meeting WebSocket Handler
//!
//! One socket serves both roles on a meeting: the uploader streams binary
//! audio chunks up, and every viewer receives JSON notification frames down.
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: Client connects to `/ws/meetings/{meeting_id}`
//! 2. **Admission**: The handshake always completes; over-cap connections then
//!    receive a `connection_error/rejected` frame and a 1008 close, so the
//!    client can always decode why it was turned away
//! 3. **Audio Streaming**: Binary messages are audio chunks; each one is
//!    persisted and queued for transcription, and the uploader gets a
//!    point-to-point acknowledgment frame
//! 4. **Notifications**: Transcription progress arrives as JSON frames
//!    broadcast to every live connection of the meeting
//! 5. **Heartbeat**: Server pings every 30s and drops clients silent for 60s
//!
//! ## Actor Model:
//! Each connection is an independent actix actor. The connection manager holds
//! a `Recipient` for the actor behind the [`NotificationSink`] seam; sends are
//! non-blocking mailbox pushes, so a slow client can only fail itself.

use crate::audio::storage;
use crate::connections::{CloseReason, NotificationFrame, NotificationSink, SinkSendError};
use crate::meetings::MeetingStatus;
use crate::state::AppState;
use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

/// How often the server pings idle connections.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// How long a client may stay silent before the connection is dropped.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Outbound traffic from the registry to one socket actor.
#[derive(Message)]
#[rtype(result = "()")]
pub enum OutboundFrame {
    /// A serialized notification frame to write to the socket
    Text(String),
    /// Close the socket (used by the accept-then-reject admission path)
    Close(CloseReason),
}

/// Production [`NotificationSink`]: hands frames to the actor's mailbox.
///
/// `try_send` never blocks; a stopped actor or a saturated mailbox both
/// surface as a send error, which the manager treats as a dead connection.
pub struct ActorSink {
    recipient: Recipient<OutboundFrame>,
}

impl ActorSink {
    pub fn new(recipient: Recipient<OutboundFrame>) -> Self {
        Self { recipient }
    }
}

impl NotificationSink for ActorSink {
    fn send(&self, text: &str) -> Result<(), SinkSendError> {
        self.recipient
            .try_send(OutboundFrame::Text(text.to_string()))
            .map_err(|_| SinkSendError)
    }

    fn close(&self, reason: CloseReason) {
        let _ = self.recipient.try_send(OutboundFrame::Close(reason));
    }
}

/// WebSocket actor for one meeting connection.
pub struct MeetingSocket {
    meeting_id: String,
    connection_id: Uuid,
    state: web::Data<AppState>,
    last_heartbeat: Instant,
    /// Set once the connection manager admits this connection; rejected and
    /// invalid connections never register, so they must not deregister either
    admitted: bool,
}

impl MeetingSocket {
    pub fn new(meeting_id: String, state: web::Data<AppState>) -> Self {
        Self {
            meeting_id,
            connection_id: Uuid::new_v4(),
            state,
            last_heartbeat: Instant::now(),
            admitted: false,
        }
    }

    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(
                    "WebSocket heartbeat timeout for meeting {} connection {}, closing",
                    act.meeting_id, act.connection_id
                );
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    /// Persist one binary audio chunk and queue its transcription job.
    ///
    /// The heavy lifting runs in a spawned task so the actor keeps draining
    /// its mailbox; acknowledgments come back through the registry's
    /// point-to-point send rather than the actor context.
    fn handle_audio_chunk(&self, data: &[u8]) {
        if !self.admitted {
            warn!(
                "Dropping audio chunk on unadmitted connection for meeting {}",
                self.meeting_id
            );
            return;
        }

        let state = self.state.clone();
        let meeting_id = self.meeting_id.clone();
        let connection_id = self.connection_id;
        let data = data.to_vec();

        tokio::spawn(async move {
            info!(
                "Received audio chunk of {} bytes for meeting {}",
                data.len(),
                meeting_id
            );

            let config = state.get_config();
            let ack = match storage::save_chunk(
                &config.transcription.shared_audio_path,
                &meeting_id,
                &data,
            )
            .await
            {
                Ok(filename) => {
                    let job_id = state
                        .jobs
                        .create(&meeting_id, &filename, &state.webhook_url())
                        .await;
                    NotificationFrame::new(
                        "audio_chunk",
                        "queued",
                        &format!("Audio chunk saved: {}", filename),
                    )
                    .with_data(json!({
                        "filename": filename,
                        "job_id": job_id,
                    }))
                }
                Err(err) => {
                    error!(
                        "Failed to save audio chunk for meeting {}: {}",
                        meeting_id, err
                    );
                    NotificationFrame::new(
                        "audio_chunk",
                        "error",
                        &format!("Error saving audio chunk: {}", err),
                    )
                }
            };

            // Only the uploader cares about chunk acks; viewers are spared
            state
                .connections
                .send_to_one(&meeting_id, connection_id, &ack);
        });
    }
}

impl Actor for MeetingSocket {
    type Context = ws::WebsocketContext<Self>;

    /// Handshake already completed when this runs: admission control and
    /// meeting validation deliberately happen on the open socket so the
    /// client always receives a decodable explanation before any close.
    fn started(&mut self, ctx: &mut Self::Context) {
        self.start_heartbeat(ctx);

        if !self.state.meetings.exists(&self.meeting_id) {
            warn!("WebSocket connect for unknown meeting {}", self.meeting_id);
            if let Some(json) =
                NotificationFrame::new("connection_error", "error", "Meeting not found").to_json()
            {
                ctx.text(json);
            }
            ctx.close(Some(ws::CloseReason {
                code: ws::CloseCode::Normal,
                description: Some("Meeting not found".to_string()),
            }));
            ctx.stop();
            return;
        }

        let sink = Arc::new(ActorSink::new(ctx.address().recipient()));
        match self
            .state
            .connections
            .connect(&self.meeting_id, self.connection_id, sink)
        {
            Ok(()) => {
                self.admitted = true;

                // First viewer flips the meeting into transcribing
                if self.state.connections.connection_count(&self.meeting_id) == 1 {
                    self.state
                        .meetings
                        .set_status(&self.meeting_id, MeetingStatus::Transcribing);
                }

                let ack = NotificationFrame::new(
                    "connection_status",
                    "connected",
                    "Ready to receive audio",
                );
                self.state
                    .connections
                    .send_to_one(&self.meeting_id, self.connection_id, &ack);
            }
            Err(_) => {
                // The manager already pushed the rejection frame and the
                // policy close into this actor's mailbox; they drain before
                // the close handler stops the actor.
            }
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if !self.admitted {
            return;
        }

        self.state
            .connections
            .disconnect(&self.meeting_id, self.connection_id);

        // Last viewer gone: the meeting goes back to created
        if self.state.connections.connection_count(&self.meeting_id) == 0 {
            self.state
                .meetings
                .set_status(&self.meeting_id, MeetingStatus::Created);
        }

        info!(
            "WebSocket connection stopped for meeting {} (connection {})",
            self.meeting_id, self.connection_id
        );
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for MeetingSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Binary(data)) => {
                self.handle_audio_chunk(&data);
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Text(_)) => {
                // The uplink protocol is binary-only; audio must not arrive
                // as text frames
                warn!(
                    "Ignoring unexpected text frame on meeting {} connection {}",
                    self.meeting_id, self.connection_id
                );
            }
            Ok(ws::Message::Close(reason)) => {
                info!(
                    "WebSocket closed by client for meeting {}: {:?}",
                    self.meeting_id, reason
                );
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(
                    "WebSocket protocol error for meeting {}: {}",
                    self.meeting_id, err
                );
                ctx.stop();
            }
        }
    }
}

impl Handler<OutboundFrame> for MeetingSocket {
    type Result = ();

    fn handle(&mut self, msg: OutboundFrame, ctx: &mut Self::Context) {
        match msg {
            OutboundFrame::Text(text) => ctx.text(text),
            OutboundFrame::Close(CloseReason::PolicyViolation) => {
                ctx.close(Some(ws::CloseReason {
                    code: ws::CloseCode::Policy,
                    description: Some("Connection limit reached for this meeting".to_string()),
                }));
                ctx.stop();
            }
        }
    }
}

/// WebSocket endpoint handler: upgrades the HTTP request and starts the actor.
pub async fn meeting_websocket(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let meeting_id = path.into_inner();
    info!(
        "New WebSocket connection request for meeting {} from {:?}",
        meeting_id,
        req.connection_info().peer_addr()
    );

    ws::start(MeetingSocket::new(meeting_id, state), &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Plain actor standing in for a socket on the other side of a Recipient.
    struct CollectorActor {
        frames: Arc<Mutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl Actor for CollectorActor {
        type Context = Context<Self>;
    }

    impl Handler<OutboundFrame> for CollectorActor {
        type Result = ();

        fn handle(&mut self, msg: OutboundFrame, _ctx: &mut Self::Context) {
            match msg {
                OutboundFrame::Text(text) => self.frames.lock().unwrap().push(text),
                OutboundFrame::Close(_) => self.closed.store(true, Ordering::SeqCst),
            }
        }
    }

    #[actix_web::test]
    async fn test_actor_sink_delivers_through_mailbox() {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let addr = CollectorActor {
            frames: frames.clone(),
            closed: closed.clone(),
        }
        .start();

        let sink = ActorSink::new(addr.recipient());
        sink.send(r#"{"type":"transcription_status"}"#).unwrap();
        sink.close(CloseReason::PolicyViolation);

        // Let the actor drain its mailbox
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(frames.lock().unwrap().len(), 1);
        assert!(closed.load(Ordering::SeqCst));
    }
}
