//! Registry of connected responder and viewer sessions.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::models::position::ResponderIdentity;

use super::session::{CloseReason, IdentityMismatch, Role, Session};

/// Why an identity claim was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimError {
    NotResponder,
    /// The session is already closed, e.g. superseded but not yet released.
    Closed,
    Mismatch(IdentityMismatch),
}

/// Shared registry of live sessions.
///
/// Uses `DashMap` for shard-level concurrency. Besides the sessions
/// themselves it keeps an index from responder id to the one session
/// currently reporting for it.
pub struct ConnectionRegistry {
    sessions: DashMap<String, Arc<Session>>,
    responders: DashMap<String, String>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            responders: DashMap::new(),
        }
    }

    /// Add a session and return its id.
    pub fn register(&self, session: Arc<Session>) -> String {
        let session_id = session.session_id.clone();
        self.sessions.insert(session_id.clone(), session);
        session_id
    }

    /// Remove a session. Unknown ids are ignored. A responder's identity
    /// claim is dropped only if it still points at this session.
    pub fn unregister(&self, session_id: &str) -> Option<Arc<Session>> {
        let (_, session) = self.sessions.remove(session_id)?;
        if let Some(identity) = session.identity() {
            self.responders
                .remove_if(&identity.id, |_, owner| owner == session_id);
        }
        Some(session)
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id).map(|s| s.value().clone())
    }

    /// Ids of all sessions with the given role.
    pub fn list_by_role(&self, role: Role) -> Vec<String> {
        self.sessions
            .iter()
            .filter(|s| s.role == role)
            .map(|s| s.key().clone())
            .collect()
    }

    /// Handles of all sessions with the given role.
    pub fn sessions_by_role(&self, role: Role) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .filter(|s| s.role == role)
            .map(|s| s.value().clone())
            .collect()
    }

    pub fn all(&self) -> Vec<Arc<Session>> {
        self.sessions.iter().map(|s| s.value().clone()).collect()
    }

    pub fn count_by_role(&self, role: Role) -> usize {
        self.sessions.iter().filter(|s| s.role == role).count()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Bind `session` to `identity` and make it the identity's reporting
    /// session. Returns the session it displaced, if any, already closed
    /// as `Superseded`.
    ///
    /// The closed check, the rebind, and closing the displaced session all
    /// happen under the identity's entry lock, so a session that loses the
    /// claim can never take it back.
    pub fn claim_identity(
        &self,
        session: &Arc<Session>,
        identity: &ResponderIdentity,
    ) -> Result<Option<Arc<Session>>, ClaimError> {
        if session.role != Role::Responder {
            return Err(ClaimError::NotResponder);
        }

        let admit = |session: &Session| {
            if session.state().is_closed() {
                return Err(ClaimError::Closed);
            }
            session.bind_identity(identity).map_err(ClaimError::Mismatch)
        };

        match self.responders.entry(identity.id.clone()) {
            Entry::Occupied(mut claim) => {
                admit(session)?;
                if claim.get() == &session.session_id {
                    return Ok(None);
                }
                let previous = claim.insert(session.session_id.clone());
                let displaced = self.get(&previous);
                if let Some(old) = &displaced {
                    old.close(CloseReason::Superseded);
                }
                Ok(displaced)
            }
            Entry::Vacant(slot) => {
                admit(session)?;
                slot.insert(session.session_id.clone());
                Ok(None)
            }
        }
    }

    /// Session id currently reporting for a responder.
    pub fn claimant(&self, responder_id: &str) -> Option<String> {
        self.responders.get(responder_id).map(|s| s.value().clone())
    }

    pub fn is_claimed(&self, responder_id: &str) -> bool {
        self.responders.contains_key(responder_id)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
