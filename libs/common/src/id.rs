//! Prefixed ULID identifiers (`ses_01J...`).

use ulid::Ulid;

/// Well-known ID prefixes.
pub mod prefix {
    /// A tracking WebSocket session.
    pub const SESSION: &str = "ses";
}

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = tracker_common::id::prefixed_ulid("ses");
/// assert!(id.starts_with("ses_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// New tracking session id.
pub fn session_id() -> String {
    prefixed_ulid(prefix::SESSION)
}

/// Split an id into its prefix and ULID. `None` if there is no `_`
/// separator or the suffix is not a valid ULID.
pub fn parse_prefixed(id: &str) -> Option<(&str, Ulid)> {
    let (prefix, raw) = id.split_once('_')?;
    let ulid = Ulid::from_string(raw).ok()?;
    Some((prefix, ulid))
}
