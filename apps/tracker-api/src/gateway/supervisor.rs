//! Session lifecycle: connect, heartbeat/timeout sweeps, teardown, and
//! retention of departed responders' tracks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time;

use crate::config::Config;
use crate::db::positions::PositionStore;
use crate::models::position::ResponderIdentity;

use super::events::ServerEvent;
use super::fanout::BroadcastDispatcher;
use super::queue::Frame;
use super::registry::ConnectionRegistry;
use super::session::{CloseReason, Liveness, Role, Session};

/// Floor for the sweep period. `time::interval` panics on zero.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

/// Timing knobs for the supervisor.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    pub heartbeat_interval: Duration,
    pub session_timeout: Duration,
    pub retention: Duration,
    pub send_queue_capacity: usize,
}

impl From<&Config> for SupervisorConfig {
    fn from(config: &Config) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval,
            session_timeout: config.session_timeout,
            retention: config.retention,
            send_queue_capacity: config.send_queue_capacity,
        }
    }
}

/// What a single sweep did.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub idled: usize,
    pub timed_out: Vec<String>,
    pub purged: Vec<ResponderIdentity>,
}

pub struct SessionSupervisor {
    registry: Arc<ConnectionRegistry>,
    store: Arc<PositionStore>,
    dispatcher: BroadcastDispatcher,
    config: SupervisorConfig,
}

impl SessionSupervisor {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        store: Arc<PositionStore>,
        dispatcher: BroadcastDispatcher,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            registry,
            store,
            dispatcher,
            config,
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Register a new connection and make it `Active`.
    ///
    /// The session's queue starts with a `ready` frame; viewers also get the
    /// current snapshot right after it. The viewer is registered before the
    /// snapshot is taken, so no update applied in between is missed, and
    /// queued updates the snapshot already covers are dropped.
    pub fn connect(&self, role: Role, now: Instant) -> Arc<Session> {
        let session = Arc::new(Session::new(role, self.config.send_queue_capacity, now));
        self.registry.register(session.clone());
        session.activate(now);

        let heartbeat_ms = u64::try_from(self.config.heartbeat_interval.as_millis()).unwrap_or(u64::MAX);
        let ready = ServerEvent::ready(&session.session_id, role.as_str(), heartbeat_ms);
        session.outbound().push_bootstrap(Frame::from(ready.into_text()));
        if role == Role::Viewer {
            BroadcastDispatcher::bootstrap(&session, &self.store);
        }

        tracing::info!(
            session_id = %session.session_id,
            role = role.as_str(),
            "tracking session established"
        );
        session
    }

    /// Record inbound activity. Returns `false` if the session is closed.
    pub fn touch(&self, session: &Session, now: Instant) -> bool {
        session.touch(now)
    }

    /// Close a session from the transport side and free its resources.
    pub fn disconnect(&self, session: &Session, reason: CloseReason, now: Instant) {
        if session.close(reason) {
            tracing::debug!(
                session_id = %session.session_id,
                reason = reason.as_str(),
                "tracking session closed"
            );
        }
        self.release(session, now);
    }

    /// Unregister a closed session. If it was the reporting session of a
    /// responder, that responder's track starts its retention countdown.
    pub fn release(&self, session: &Session, now: Instant) {
        if self.registry.unregister(&session.session_id).is_none() {
            return;
        }
        let Some(identity) = session.identity() else {
            return;
        };
        if !self.registry.is_claimed(&identity.id) {
            self.store.detach(&identity.id, now);
            tracing::info!(
                session_id = %session.session_id,
                responder_id = %identity.id,
                retention_secs = self.config.retention.as_secs(),
                "responder offline, track retained"
            );
        }
    }

    /// Evaluate every session's liveness, close timed-out ones, and purge
    /// tracks whose retention has expired.
    pub fn sweep(&self, now: Instant) -> SweepReport {
        let mut report = SweepReport::default();

        for session in self.registry.all() {
            match session.evaluate(now, self.config.heartbeat_interval, self.config.session_timeout) {
                Liveness::Unchanged => {}
                Liveness::WentIdle => {
                    report.idled += 1;
                    tracing::debug!(session_id = %session.session_id, "session idle");
                }
                Liveness::TimedOut => {
                    tracing::info!(
                        session_id = %session.session_id,
                        role = session.role.as_str(),
                        "session timed out"
                    );
                    self.release(&session, now);
                    report.timed_out.push(session.session_id.clone());
                }
            }
        }

        report.purged = self
            .store
            .purge_expired(now, self.config.retention, |id| self.registry.is_claimed(id));
        for identity in &report.purged {
            tracing::info!(responder_id = %identity.id, "retention expired, track purged");
            self.dispatcher.publish_removed(identity);
        }

        report
    }

    /// Run [`sweep`](Self::sweep) every `interval` until the task is dropped.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        let mut ticker = time::interval(interval.max(MIN_SWEEP_INTERVAL));
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let report = self.sweep(Instant::now());
            if report.idled > 0 || !report.timed_out.is_empty() || !report.purged.is_empty() {
                tracing::debug!(
                    idled = report.idled,
                    timed_out = report.timed_out.len(),
                    purged = report.purged.len(),
                    "supervisor sweep"
                );
            }
        }
    }

    /// Close every session, e.g. on server shutdown.
    pub fn shutdown(&self) {
        for session in self.registry.all() {
            session.close(CloseReason::Shutdown);
        }
    }
}
