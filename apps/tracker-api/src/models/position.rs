use std::collections::VecDeque;

use serde::Serialize;
use utoipa::ToSchema;

/// A field unit streaming its position. Two identities with the same `id`
/// are the same responder; `name` is display-only and may change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ResponderIdentity {
    pub id: String,
    pub name: String,
}

impl ResponderIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// One accepted GPS fix. `timestamp` is the server receipt time in Unix
/// milliseconds, never a client-supplied value.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PositionSample {
    #[serde(skip)]
    pub responder_id: String,
    pub lat: f64,
    pub lng: f64,
    pub timestamp: i64,
}

impl PositionSample {
    pub fn new(responder_id: impl Into<String>, lat: f64, lng: f64, timestamp: i64) -> Self {
        Self {
            responder_id: responder_id.into(),
            lat,
            lng,
            timestamp,
        }
    }
}

/// Latest position of a responder plus a FIFO ring of recent samples.
///
/// The trail is ordered oldest to newest and always ends with `latest`.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TrackState {
    pub user: ResponderIdentity,
    pub latest: PositionSample,
    #[schema(value_type = Vec<PositionSample>)]
    pub trail: VecDeque<PositionSample>,
}

impl TrackState {
    pub fn new(user: ResponderIdentity, first: PositionSample, capacity: usize) -> Self {
        let mut trail = VecDeque::with_capacity(capacity.max(1));
        trail.push_back(first.clone());
        Self {
            user,
            latest: first,
            trail,
        }
    }

    /// Make `sample` the new latest and append it to the trail, evicting
    /// the oldest entries beyond `capacity`. The caller is responsible for
    /// checking that `sample` is newer.
    pub fn push(&mut self, sample: PositionSample, capacity: usize) {
        self.trail.push_back(sample.clone());
        while self.trail.len() > capacity.max(1) {
            self.trail.pop_front();
        }
        self.latest = sample;
    }

    /// Whether `latest` is still the newest trail entry and the trail is in
    /// strictly increasing timestamp order.
    pub fn is_consistent(&self) -> bool {
        let ordered = self
            .trail
            .iter()
            .zip(self.trail.iter().skip(1))
            .all(|(a, b)| a.timestamp < b.timestamp);
        ordered && self.trail.back() == Some(&self.latest)
    }
}
