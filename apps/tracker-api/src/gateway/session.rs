//! Per-connection tracking session state.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracker_common::id;

use crate::models::position::ResponderIdentity;

use super::events::ServerEvent;
use super::queue::{Frame, OutboundQueue};

/// What a connection is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Field unit streaming its own position.
    Responder,
    /// Dashboard consuming the live feed.
    Viewer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Responder => "responder",
            Role::Viewer => "viewer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "responder" => Some(Role::Responder),
            "viewer" => Some(Role::Viewer),
            _ => None,
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client closed the socket or the stream ended.
    ClientClosed,
    /// No inbound message within the idle threshold plus the session timeout.
    Timeout,
    /// The same responder connected again from another session.
    Superseded,
    /// A send or receive failed or timed out.
    TransportFailure,
    /// The server is shutting down.
    Shutdown,
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::ClientClosed => "client_closed",
            CloseReason::Timeout => "timeout",
            CloseReason::Superseded => "superseded",
            CloseReason::TransportFailure => "transport_failure",
            CloseReason::Shutdown => "shutdown",
        }
    }

    /// WebSocket close code sent to the client (4000-range for application-level).
    pub fn close_code(self) -> u16 {
        match self {
            CloseReason::ClientClosed => 1000,
            CloseReason::Shutdown => 1001,
            CloseReason::TransportFailure => 4000,
            CloseReason::Superseded => 4008,
            CloseReason::Timeout => 4009,
        }
    }
}

/// Lifecycle: `Connecting -> Active <-> Idle -> Closed`. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Idle,
    Closed(CloseReason),
}

impl SessionState {
    pub fn is_closed(self) -> bool {
        matches!(self, SessionState::Closed(_))
    }
}

/// Result of a liveness evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Unchanged,
    WentIdle,
    TimedOut,
}

/// Returned when a responder session sends updates for a second identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityMismatch {
    pub bound: String,
    pub attempted: String,
}

struct SessionRecord {
    state: SessionState,
    identity: Option<ResponderIdentity>,
    last_seen: Instant,
}

/// State for a single WebSocket connection.
///
/// Every state transition happens under the record lock, so timeout
/// evaluation and inbound message handling never interleave.
pub struct Session {
    /// Unique session identifier (`ses_` prefixed ULID).
    pub session_id: String,
    pub role: Role,
    record: Mutex<SessionRecord>,
    outbound: OutboundQueue,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(role: Role, queue_capacity: usize, now: Instant) -> Self {
        Self {
            session_id: id::session_id(),
            role,
            record: Mutex::new(SessionRecord {
                state: SessionState::Connecting,
                identity: None,
                last_seen: now,
            }),
            outbound: OutboundQueue::new(queue_capacity),
        }
    }

    pub fn state(&self) -> SessionState {
        self.record.lock().state
    }

    pub fn identity(&self) -> Option<ResponderIdentity> {
        self.record.lock().identity.clone()
    }

    pub fn last_seen(&self) -> Instant {
        self.record.lock().last_seen
    }

    /// `Connecting -> Active`. Returns `false` from any other state.
    pub fn activate(&self, now: Instant) -> bool {
        let mut record = self.record.lock();
        if record.state != SessionState::Connecting {
            return false;
        }
        record.state = SessionState::Active;
        record.last_seen = now;
        true
    }

    /// Record inbound activity. `Idle -> Active`. Returns `false` if the
    /// session is already closed, in which case the message must be dropped.
    pub fn touch(&self, now: Instant) -> bool {
        let mut record = self.record.lock();
        match record.state {
            SessionState::Closed(_) => false,
            SessionState::Connecting => {
                record.last_seen = now;
                true
            }
            SessionState::Active | SessionState::Idle => {
                record.state = SessionState::Active;
                record.last_seen = now;
                true
            }
        }
    }

    /// Apply the heartbeat rules at `now`.
    ///
    /// `Active -> Idle` once silent for `heartbeat_interval`;
    /// `Idle -> Closed(Timeout)` once silent for a further `session_timeout`.
    /// A late evaluation may pass through `Idle` and close in one call.
    pub fn evaluate(&self, now: Instant, heartbeat_interval: Duration, session_timeout: Duration) -> Liveness {
        let mut record = self.record.lock();
        let silent = now.saturating_duration_since(record.last_seen);

        let mut outcome = Liveness::Unchanged;
        if record.state == SessionState::Active && silent >= heartbeat_interval {
            record.state = SessionState::Idle;
            outcome = Liveness::WentIdle;
        }
        if record.state == SessionState::Idle && silent >= heartbeat_interval + session_timeout {
            record.state = SessionState::Closed(CloseReason::Timeout);
            drop(record);
            self.outbound.close();
            return Liveness::TimedOut;
        }
        outcome
    }

    /// Move to `Closed`. Only the first call has an effect; returns whether
    /// this call performed the transition.
    pub fn close(&self, reason: CloseReason) -> bool {
        {
            let mut record = self.record.lock();
            if record.state.is_closed() {
                return false;
            }
            record.state = SessionState::Closed(reason);
        }
        self.outbound.close();
        true
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        match self.record.lock().state {
            SessionState::Closed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Bind this session to a responder identity. Returns `Ok(true)` on the
    /// first binding, `Ok(false)` if already bound to the same id.
    pub fn bind_identity(&self, identity: &ResponderIdentity) -> Result<bool, IdentityMismatch> {
        let mut record = self.record.lock();
        if let Some(bound) = record.identity.as_mut() {
            if bound.id != identity.id {
                return Err(IdentityMismatch {
                    bound: bound.id.clone(),
                    attempted: identity.id.clone(),
                });
            }
            bound.name.clone_from(&identity.name);
            return Ok(false);
        }
        record.identity = Some(identity.clone());
        Ok(true)
    }

    /// Queue an event for this session. Returns `true` if an older frame
    /// had to be dropped.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.send_frame(Frame::from(event.into_text()))
    }

    pub fn send_frame(&self, frame: Frame) -> bool {
        self.outbound.push(frame)
    }

    pub fn outbound(&self) -> &OutboundQueue {
        &self.outbound
    }
}
