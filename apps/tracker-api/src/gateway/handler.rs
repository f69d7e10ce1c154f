//! Inbound `ems-location-update` handling: validate, stamp, apply, publish.

use std::sync::Arc;

use serde_json::Value;
use tracker_common::ReceiptClock;

use crate::db::positions::PositionStore;
use crate::error::IngestError;
use crate::models::position::{PositionSample, ResponderIdentity};

use super::events::InboundUpdate;
use super::fanout::BroadcastDispatcher;
use super::registry::{ClaimError, ConnectionRegistry};
use super::session::{Role, Session};

/// Result of an accepted (well-formed) update.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Stored as the responder's new latest and broadcast to viewers.
    Applied(PositionSample),
    /// Not newer than the stored latest; dropped without error.
    Stale,
}

/// A validated update, before it is stamped.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidUpdate {
    pub identity: ResponderIdentity,
    pub lat: f64,
    pub lng: f64,
}

pub struct IngestionHandler {
    registry: Arc<ConnectionRegistry>,
    store: Arc<PositionStore>,
    dispatcher: BroadcastDispatcher,
    clock: ReceiptClock,
}

impl IngestionHandler {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        store: Arc<PositionStore>,
        dispatcher: BroadcastDispatcher,
    ) -> Self {
        Self {
            registry,
            store,
            dispatcher,
            clock: ReceiptClock::new(),
        }
    }

    /// Process one update from `session_id`, stamping it with the current
    /// receipt time.
    pub fn on_inbound_update(&self, session_id: &str, raw: &Value) -> Result<IngestOutcome, IngestError> {
        let (session, update) = self.admit(session_id, raw)?;
        let timestamp = self.clock.stamp();
        self.ingest(&session, update, timestamp)
    }

    /// Same as [`on_inbound_update`](Self::on_inbound_update) with an
    /// explicit receipt timestamp.
    pub fn on_inbound_update_at(
        &self,
        session_id: &str,
        raw: &Value,
        timestamp: i64,
    ) -> Result<IngestOutcome, IngestError> {
        let (session, update) = self.admit(session_id, raw)?;
        self.ingest(&session, update, timestamp)
    }

    fn admit(&self, session_id: &str, raw: &Value) -> Result<(Arc<Session>, ValidUpdate), IngestError> {
        let session = self
            .registry
            .get(session_id)
            .ok_or(IngestError::UnknownSession)?;
        if session.role != Role::Responder {
            return Err(IngestError::NotResponder);
        }
        if session.state().is_closed() {
            return Err(IngestError::UnknownSession);
        }
        let update = validate(raw)?;
        Ok((session, update))
    }

    fn ingest(&self, session: &Arc<Session>, update: ValidUpdate, timestamp: i64) -> Result<IngestOutcome, IngestError> {
        let ValidUpdate { identity, lat, lng } = update;

        match self.registry.claim_identity(session, &identity) {
            Ok(displaced) => {
                if let Some(old) = displaced {
                    tracing::info!(
                        session_id = %old.session_id,
                        replaced_by = %session.session_id,
                        responder_id = %identity.id,
                        "responder reconnected, superseding previous session"
                    );
                }
                self.store.attach(&identity.id);
            }
            Err(ClaimError::NotResponder) => return Err(IngestError::NotResponder),
            Err(ClaimError::Closed) => return Err(IngestError::UnknownSession),
            Err(ClaimError::Mismatch(m)) => {
                return Err(IngestError::invalid(format!(
                    "session is bound to responder {}, got {}",
                    m.bound, m.attempted
                )));
            }
        }

        let sample = PositionSample::new(identity.id.clone(), lat, lng, timestamp);
        let applied = self.store.apply_then(&identity, sample.clone(), |track| {
            self.dispatcher.publish(&track.user, &track.latest);
        });

        if applied {
            Ok(IngestOutcome::Applied(sample))
        } else {
            tracing::debug!(
                session_id = %session.session_id,
                responder_id = %identity.id,
                timestamp,
                "stale position update dropped"
            );
            Ok(IngestOutcome::Stale)
        }
    }
}

/// Check the update's shape and ranges.
pub fn validate(raw: &Value) -> Result<ValidUpdate, IngestError> {
    let update: InboundUpdate =
        serde_json::from_value(raw.clone()).map_err(|e| IngestError::invalid(e.to_string()))?;

    let id = update.user.id.trim();
    if id.is_empty() {
        return Err(IngestError::invalid("user.id must not be empty"));
    }

    let (lat, lng) = (update.location.lat, update.location.lng);
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(IngestError::invalid(format!("location.lat out of range: {lat}")));
    }
    if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
        return Err(IngestError::invalid(format!("location.lng out of range: {lng}")));
    }

    Ok(ValidUpdate {
        identity: ResponderIdentity::new(id, update.user.name),
        lat,
        lng,
    })
}
