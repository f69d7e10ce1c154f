//! Broadcast dispatcher for live position updates.
//!
//! Each accepted update is serialized once and pushed onto every viewer's
//! own bounded queue. Pushing never waits, so a stalled viewer only ever
//! loses its own oldest frames; dropping the viewer is left to the
//! supervisor's heartbeat logic.

use std::collections::HashMap;
use std::sync::Arc;

use crate::db::positions::PositionStore;
use crate::models::position::{PositionSample, ResponderIdentity};

use super::events::ServerEvent;
use super::queue::{Frame, PositionTag};
use super::registry::ConnectionRegistry;
use super::session::{Role, Session};

/// Outcome of a single publish.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Viewers the frame was queued for.
    pub recipients: usize,
    /// Viewers whose queue overflowed and dropped an older frame.
    pub overflowed: usize,
}

#[derive(Clone)]
pub struct BroadcastDispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl BroadcastDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver an applied sample to every connected viewer.
    pub fn publish(&self, identity: &ResponderIdentity, sample: &PositionSample) -> Delivery {
        let tag = PositionTag::new(&identity.id, sample.timestamp);
        self.fan_out(ServerEvent::location_update(identity, sample), Some(tag))
    }

    /// Tell every connected viewer a responder's track was purged.
    pub fn publish_removed(&self, identity: &ResponderIdentity) -> Delivery {
        self.fan_out(ServerEvent::location_removed(identity), None)
    }

    /// Queue the snapshot for a viewer that is already registered.
    ///
    /// Updates published between registration and the snapshot read are
    /// already queued; the ones the snapshot covers are discarded so the
    /// viewer never sees a responder step back in time.
    pub fn bootstrap(viewer: &Session, store: &PositionStore) {
        let latest = store.all_latest();
        let covered: HashMap<&str, i64> = latest
            .iter()
            .map(|(identity, sample)| (identity.id.as_str(), sample.timestamp))
            .collect();

        viewer
            .outbound()
            .push_bootstrap(Frame::from(ServerEvent::snapshot(&latest).into_text()));
        let discarded = viewer.outbound().discard_covered(|id| covered.get(id).copied());
        if discarded > 0 {
            tracing::debug!(
                session_id = %viewer.session_id,
                discarded,
                "dropped updates already covered by snapshot"
            );
        }
    }

    fn fan_out(&self, event: ServerEvent, position: Option<PositionTag>) -> Delivery {
        let frame: Frame = Frame::from(event.into_text());
        let mut delivery = Delivery::default();

        for viewer in self.registry.sessions_by_role(Role::Viewer) {
            delivery.recipients += 1;
            if deliver(&viewer, frame.clone(), position.clone()) {
                delivery.overflowed += 1;
            }
        }
        delivery
    }
}

fn deliver(viewer: &Session, frame: Frame, position: Option<PositionTag>) -> bool {
    let overflowed = match position {
        Some(tag) => viewer.outbound().push_position(frame, tag),
        None => viewer.send_frame(frame),
    };
    if overflowed {
        tracing::warn!(
            session_id = %viewer.session_id,
            dropped_total = viewer.outbound().dropped(),
            "viewer queue full, dropped oldest frame"
        );
    }
    overflowed
}
