//! # Connection Manager
//!
//! Per-meeting registry of live viewer connections with a hard admission cap,
//! fan-out broadcast, point-to-point sends, and stale-connection pruning.
//!
//! ## Design:
//! Many viewers may watch one meeting concurrently, but only the uploader
//! needs per-chunk acknowledgments while all viewers need progress
//! broadcasts; hence two send primitives sharing one registry.
//!
//! The registry talks to sockets through the [`NotificationSink`] trait so the
//! fan-out logic is independent of the transport. The production sink wraps a
//! WebSocket actor address with a non-blocking try-send; a sink whose send
//! fails is considered dead and removed. Tests substitute recording sinks at
//! the same seam.
//!
//! ## Admission:
//! The cap is enforced at connect time, never by evicting an existing viewer.
//! Rejection is accept-then-reject: the handshake has already completed, so
//! the manager can deliver a decodable rejection frame before closing the
//! socket with a policy-violation close code.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Ephemeral notification frame sent to viewers.
///
/// Not persisted anywhere; delivery is best-effort per connection.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationFrame {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl NotificationFrame {
    pub fn new(kind: &str, status: &str, message: &str) -> Self {
        Self {
            kind: kind.to_string(),
            status: status.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Frame sent on a not-yet-admitted socket when the cap is hit.
    pub fn rejection(message: &str) -> Self {
        Self::new("connection_error", "rejected", message)
    }

    /// Wire encoding. Frames contain no non-serializable data, so failure is
    /// a programming error worth logging loudly, not propagating.
    pub fn to_json(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(json) => Some(json),
            Err(err) => {
                error!("Failed to serialize notification frame: {}", err);
                None
            }
        }
    }
}

/// Why the manager is closing a connection it never admitted (or is pruning).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Connection cap exceeded; maps to WS close code 1008
    PolicyViolation,
}

/// Send failure on a sink. The manager only needs to know the connection is
/// dead, not why.
#[derive(Debug, thiserror::Error)]
#[error("notification sink rejected the frame")]
pub struct SinkSendError;

/// One live viewer transport, as the registry sees it.
///
/// `send` must not block: a slow client must never stall a broadcast to the
/// rest of the meeting. Implementations hand the frame to the socket's
/// mailbox and report failure if the socket is gone or saturated.
pub trait NotificationSink: Send + Sync {
    fn send(&self, text: &str) -> Result<(), SinkSendError>;
    fn close(&self, reason: CloseReason);
}

/// Returned by [`ConnectionManager::connect`] when the meeting is at capacity.
#[derive(Debug, thiserror::Error)]
#[error("connection cap reached for meeting")]
pub struct ConnectionRejected;

/// Registry of live connections keyed by `(meeting_id, connection_id)`.
///
/// ## Thread Safety:
/// Connect, disconnect, and broadcast may run concurrently from different
/// tasks. All structural access goes through one reader-writer lock;
/// broadcasts iterate a cloned snapshot so a concurrent connect or disconnect
/// can never tear the iteration, and sends happen outside the lock.
pub struct ConnectionManager {
    meetings: RwLock<HashMap<String, HashMap<Uuid, Arc<dyn NotificationSink>>>>,
    max_per_meeting: usize,
}

impl ConnectionManager {
    pub fn new(max_per_meeting: usize) -> Self {
        Self {
            meetings: RwLock::new(HashMap::new()),
            max_per_meeting,
        }
    }

    /// Admit a connection, or reject it when the meeting is at capacity.
    ///
    /// On rejection the sink receives a `connection_error/rejected` frame and
    /// is then closed with a policy-violation code; it is never registered.
    pub fn connect(
        &self,
        meeting_id: &str,
        connection_id: Uuid,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<(), ConnectionRejected> {
        let rejected = {
            let mut meetings = self.meetings.write().unwrap();
            let connections = meetings.entry(meeting_id.to_string()).or_default();
            if connections.len() >= self.max_per_meeting {
                true
            } else {
                connections.insert(connection_id, sink.clone());
                false
            }
        };

        if rejected {
            warn!(
                "Rejecting connection {} for meeting {}: cap of {} reached",
                connection_id, meeting_id, self.max_per_meeting
            );
            let frame = NotificationFrame::rejection(&format!(
                "Connection limit reached for this meeting (max {})",
                self.max_per_meeting
            ));
            if let Some(json) = frame.to_json() {
                let _ = sink.send(&json);
            }
            sink.close(CloseReason::PolicyViolation);
            return Err(ConnectionRejected);
        }

        info!(
            "WebSocket connected for meeting {} (connection {}, {}/{})",
            meeting_id,
            connection_id,
            self.connection_count(meeting_id),
            self.max_per_meeting
        );
        Ok(())
    }

    /// Remove a connection. Idempotent: unknown pairs are a no-op. The last
    /// removal for a meeting drops the meeting's entry entirely.
    pub fn disconnect(&self, meeting_id: &str, connection_id: Uuid) {
        let mut meetings = self.meetings.write().unwrap();
        if let Some(connections) = meetings.get_mut(meeting_id) {
            if connections.remove(&connection_id).is_some() {
                info!(
                    "WebSocket disconnected for meeting {} (connection {})",
                    meeting_id, connection_id
                );
            }
            if connections.is_empty() {
                meetings.remove(meeting_id);
            }
        }
    }

    /// Current live-connection count for one meeting.
    pub fn connection_count(&self, meeting_id: &str) -> usize {
        self.meetings
            .read()
            .unwrap()
            .get(meeting_id)
            .map_or(0, HashMap::len)
    }

    /// Live connections across all meetings (health reporting).
    pub fn total_connections(&self) -> usize {
        self.meetings.read().unwrap().values().map(HashMap::len).sum()
    }

    /// Number of meetings with at least one live viewer.
    pub fn active_meetings(&self) -> usize {
        self.meetings.read().unwrap().len()
    }

    /// Fan one notification out to every live connection of a meeting.
    ///
    /// Individual send failures mark that connection dead; dead connections
    /// are removed only after the full pass, so one bad socket can neither
    /// abort nor starve delivery to the rest. Failures are reported in the
    /// log, never raised.
    pub fn broadcast(
        &self,
        meeting_id: &str,
        kind: &str,
        status: &str,
        message: &str,
        data: Option<serde_json::Value>,
    ) {
        let mut frame = NotificationFrame::new(kind, status, message);
        if let Some(data) = data {
            frame = frame.with_data(data);
        }
        let Some(json) = frame.to_json() else {
            return;
        };

        // Snapshot under the read lock; send outside it
        let targets: Vec<(Uuid, Arc<dyn NotificationSink>)> = {
            let meetings = self.meetings.read().unwrap();
            match meetings.get(meeting_id) {
                Some(connections) => connections
                    .iter()
                    .map(|(id, sink)| (*id, sink.clone()))
                    .collect(),
                None => return,
            }
        };

        let mut dead = Vec::new();
        for (connection_id, sink) in &targets {
            if sink.send(&json).is_err() {
                warn!(
                    "Failed to send notification to meeting {} connection {}",
                    meeting_id, connection_id
                );
                dead.push(*connection_id);
            }
        }

        let failed = dead.len();
        for connection_id in dead {
            self.disconnect(meeting_id, connection_id);
        }

        info!(
            "Broadcast to meeting {}: {} connections, {} failed",
            meeting_id,
            targets.len(),
            failed
        );
    }

    /// Point-to-point send, used for per-uploader acknowledgments that the
    /// rest of the meeting's viewers should not see.
    ///
    /// On failure only this connection is removed. Returns whether the frame
    /// was handed to the transport.
    pub fn send_to_one(
        &self,
        meeting_id: &str,
        connection_id: Uuid,
        frame: &NotificationFrame,
    ) -> bool {
        let Some(json) = frame.to_json() else {
            return false;
        };

        let sink = {
            let meetings = self.meetings.read().unwrap();
            meetings
                .get(meeting_id)
                .and_then(|connections| connections.get(&connection_id))
                .cloned()
        };

        match sink {
            Some(sink) => {
                if sink.send(&json).is_err() {
                    warn!(
                        "Failed point-to-point send to meeting {} connection {}",
                        meeting_id, connection_id
                    );
                    self.disconnect(meeting_id, connection_id);
                    false
                } else {
                    true
                }
            }
            None => false,
        }
    }
}
