//! In-memory store of responder tracks.
//!
//! Each responder's entry is mutated under its `DashMap` shard lock, so
//! concurrent updates for different responders never interleave inside one
//! trail, and updates for the same responder are resolved purely by
//! timestamp.

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::models::position::{PositionSample, ResponderIdentity, TrackState};

struct TrackEntry {
    track: TrackState,
    /// Set when the responder's last session ends; cleared when it returns.
    detached_at: Option<Instant>,
}

pub struct PositionStore {
    tracks: DashMap<String, TrackEntry>,
    trail_capacity: usize,
}

impl PositionStore {
    pub fn new(trail_capacity: usize) -> Self {
        Self {
            tracks: DashMap::new(),
            trail_capacity: trail_capacity.max(1),
        }
    }

    /// Apply a sample. Returns `false` (and changes nothing) unless the
    /// sample is strictly newer than the stored latest for that responder.
    pub fn apply(&self, identity: &ResponderIdentity, sample: PositionSample) -> bool {
        self.apply_then(identity, sample, |_| {})
    }

    /// Like [`apply`](Self::apply), but runs `on_applied` with the updated
    /// track while the responder's entry is still locked. Callers that
    /// forward applied samples from inside `on_applied` observe them in
    /// timestamp order.
    pub fn apply_then<F>(&self, identity: &ResponderIdentity, mut sample: PositionSample, on_applied: F) -> bool
    where
        F: FnOnce(&TrackState),
    {
        sample.responder_id.clone_from(&identity.id);

        match self.tracks.entry(identity.id.clone()) {
            Entry::Vacant(slot) => {
                let entry = slot.insert(TrackEntry {
                    track: TrackState::new(identity.clone(), sample, self.trail_capacity),
                    detached_at: None,
                });
                on_applied(&entry.track);
                true
            }
            Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();

                if !entry.track.is_consistent() {
                    tracing::error!(
                        responder_id = %identity.id,
                        latest = entry.track.latest.timestamp,
                        trail_len = entry.track.trail.len(),
                        "track state corrupted, resetting entry"
                    );
                    entry.track = TrackState::new(identity.clone(), sample, self.trail_capacity);
                    entry.detached_at = None;
                    on_applied(&entry.track);
                    return true;
                }

                if sample.timestamp <= entry.track.latest.timestamp {
                    return false;
                }

                entry.track.user.name.clone_from(&identity.name);
                entry.track.push(sample, self.trail_capacity);
                entry.detached_at = None;
                on_applied(&entry.track);
                true
            }
        }
    }

    pub fn get(&self, responder_id: &str) -> Option<TrackState> {
        self.tracks.get(responder_id).map(|e| e.track.clone())
    }

    /// Latest sample of every tracked responder, ordered by responder id.
    pub fn all_latest(&self) -> Vec<(ResponderIdentity, PositionSample)> {
        let mut latest: Vec<_> = self
            .tracks
            .iter()
            .map(|e| (e.track.user.clone(), e.track.latest.clone()))
            .collect();
        latest.sort_by(|a, b| a.0.id.cmp(&b.0.id));
        latest
    }

    /// Start the retention countdown for a responder whose session ended.
    /// A countdown already running is left alone.
    pub fn detach(&self, responder_id: &str, now: Instant) {
        if let Some(mut entry) = self.tracks.get_mut(responder_id) {
            entry.detached_at.get_or_insert(now);
        }
    }

    /// Cancel the retention countdown (the responder is back online).
    pub fn attach(&self, responder_id: &str) {
        if let Some(mut entry) = self.tracks.get_mut(responder_id) {
            entry.detached_at = None;
        }
    }

    /// Whether the responder's track is currently counting down to removal.
    pub fn is_detached(&self, responder_id: &str) -> bool {
        self.tracks
            .get(responder_id)
            .is_some_and(|e| e.detached_at.is_some())
    }

    /// Remove tracks that have been detached for at least `retention`.
    /// Returns the identities that were removed.
    ///
    /// `is_live` is consulted for every expired entry; a responder that has
    /// reconnected in the meantime gets its countdown cancelled instead.
    pub fn purge_expired<F>(&self, now: Instant, retention: Duration, is_live: F) -> Vec<ResponderIdentity>
    where
        F: Fn(&str) -> bool,
    {
        let mut purged = Vec::new();
        self.tracks.retain(|id, entry| match entry.detached_at {
            Some(at) if now.saturating_duration_since(at) >= retention => {
                if is_live(id) {
                    entry.detached_at = None;
                    return true;
                }
                purged.push(entry.track.user.clone());
                false
            }
            _ => true,
        });
        purged
    }

    pub fn remove(&self, responder_id: &str) -> Option<TrackState> {
        self.tracks.remove(responder_id).map(|(_, e)| e.track)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
