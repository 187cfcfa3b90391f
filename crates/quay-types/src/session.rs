//! Expiring key/value session state.
//!
//! A [`Session`] is the value a store holds for a [`SessionKey`]. It carries
//! an expiration deadline and an open-ended context map. Context values are
//! `serde_json::Value`s, which keeps everything a handler puts into a session
//! serializable by whatever medium backs the store.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::key::SessionKey;

/// Capability interface shared by every session variant a transport hands out.
///
/// Write-back only needs [`IpcSession::key`], so callers never have to know
/// the concrete session type.
pub trait IpcSession: Send + Sync {
    /// Identity of this session.
    fn key(&self) -> &SessionKey;

    /// Session id half of the key.
    fn session_id(&self) -> &str {
        self.key().session_id()
    }

    /// Identifier half of the key.
    fn identifier(&self) -> &str {
        self.key().identifier()
    }

    /// Read a context entry.
    fn get(&self, name: &str) -> Option<&Value>;

    /// Write a context entry, returning the previous value.
    fn set(&mut self, name: String, value: Value) -> Option<Value>;

    /// Remove a context entry, returning it.
    fn remove(&mut self, name: &str) -> Option<Value>;

    /// Whether a context entry exists.
    fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Whether the deadline has passed.
    fn is_expired(&self) -> bool;

    /// Drop every context entry.
    fn clear(&mut self);
}

/// Server-side session bound to one `(session id, identifier)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    key: SessionKey,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    timeout: Duration,
    #[serde(default)]
    context: HashMap<String, Value>,
}

impl Session {
    /// Create a session whose deadline is `timeout` from now.
    pub fn new(session_id: impl Into<String>, identifier: impl Into<String>, timeout: Duration) -> Self {
        let now = Utc::now();
        Self {
            key: SessionKey::new(session_id, identifier),
            created_at: now,
            expires_at: deadline(now, timeout),
            timeout,
            context: HashMap::new(),
        }
    }

    /// Create a session with a freshly generated random session id.
    pub fn generate(identifier: impl Into<String>, timeout: Duration) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), identifier, timeout)
    }

    /// Identity of this session.
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn session_id(&self) -> &str {
        self.key.session_id()
    }

    pub fn identifier(&self) -> &str {
        self.key.identifier()
    }

    /// When the session was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The deadline after which the session is expired.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// The configured timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Replace the timeout and move the deadline to `now + timeout`.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
        self.refresh();
    }

    /// Move the deadline to `now + timeout`.
    pub fn refresh(&mut self) {
        self.expires_at = deadline(Utc::now(), self.timeout);
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Whether the deadline has passed at the given instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// The backing context map.
    pub fn context(&self) -> &HashMap<String, Value> {
        &self.context
    }

    /// Mutable access to the backing context map.
    pub fn context_mut(&mut self) -> &mut HashMap<String, Value> {
        &mut self.context
    }

    /// Read a context entry and deserialize it into `T`.
    ///
    /// Returns `None` if the entry is missing or has a different shape.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.context
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Serialize `value` and store it under `name`.
    pub fn set_value<T: Serialize>(
        &mut self,
        name: impl Into<String>,
        value: &T,
    ) -> serde_json::Result<Option<Value>> {
        let value = serde_json::to_value(value)?;
        Ok(self.context.insert(name.into(), value))
    }

    /// Number of context entries.
    pub fn len(&self) -> usize {
        self.context.len()
    }

    /// Whether the context is empty.
    pub fn is_empty(&self) -> bool {
        self.context.is_empty()
    }

    /// Drop every context entry. Calling this repeatedly is harmless.
    pub fn clear(&mut self) {
        self.context.clear();
    }
}

impl IpcSession for Session {
    fn key(&self) -> &SessionKey {
        &self.key
    }

    fn get(&self, name: &str) -> Option<&Value> {
        self.context.get(name)
    }

    fn set(&mut self, name: String, value: Value) -> Option<Value> {
        self.context.insert(name, value)
    }

    fn remove(&mut self, name: &str) -> Option<Value> {
        self.context.remove(name)
    }

    fn is_expired(&self) -> bool {
        Session::is_expired(self)
    }

    fn clear(&mut self) {
        Session::clear(self);
    }
}

impl std::fmt::Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Session{{key={}, entries={}}}", self.key, self.context.len())
    }
}

/// `from + timeout`, saturating at the largest representable instant.
fn deadline(from: DateTime<Utc>, timeout: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(timeout)
        .ok()
        .and_then(|delta| from.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_session_is_not_expired() {
        let session = Session::new("abc", "client-1", Duration::from_secs(60));
        assert!(!session.is_expired());
        assert!(session.is_empty());
        assert_eq!(session.key(), &SessionKey::new("abc", "client-1"));
    }

    #[test]
    fn test_expires_once_time_passes_timeout() {
        let session = Session::new("abc", "client-1", Duration::from_secs(60));
        let later = session.created_at() + chrono::Duration::seconds(61);
        assert!(session.is_expired_at(later));

        let earlier = session.created_at() + chrono::Duration::seconds(59);
        assert!(!session.is_expired_at(earlier));
    }

    #[test]
    fn test_expired_exactly_at_deadline() {
        let session = Session::new("abc", "client-1", Duration::from_secs(60));
        assert!(session.is_expired_at(session.expires_at()));
    }

    #[test]
    fn test_zero_timeout_is_expired_immediately() {
        let session = Session::new("abc", "client-1", Duration::ZERO);
        assert!(session.is_expired());
    }

    #[test]
    fn test_expires_after_real_time() {
        let session = Session::new("abc", "client-1", Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(20));
        assert!(session.is_expired());
    }

    #[test]
    fn test_huge_timeout_saturates() {
        let session = Session::new("abc", "client-1", Duration::MAX);
        assert!(!session.is_expired());
        assert_eq!(session.expires_at(), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut session = Session::new("abc", "client-1", Duration::from_secs(60));
        session.set("user".to_string(), json!("alice"));
        session.set("count".to_string(), json!(3));

        session.clear();
        assert!(session.is_empty());

        session.clear();
        assert!(session.is_empty());
    }

    #[test]
    fn test_context_accessors() {
        let mut session = Session::new("abc", "client-1", Duration::from_secs(60));
        assert_eq!(session.set("user".to_string(), json!("alice")), None);
        assert_eq!(
            session.set("user".to_string(), json!("bob")),
            Some(json!("alice"))
        );
        assert!(session.contains("user"));
        assert_eq!(session.get("user"), Some(&json!("bob")));
        assert_eq!(session.remove("user"), Some(json!("bob")));
        assert!(!session.contains("user"));
    }

    #[test]
    fn test_typed_values() {
        let mut session = Session::new("abc", "client-1", Duration::from_secs(60));
        session.set_value("roles", &vec!["admin", "ops"]).unwrap();

        let roles: Vec<String> = session.get_as("roles").unwrap();
        assert_eq!(roles, vec!["admin", "ops"]);
        assert_eq!(session.get_as::<u32>("roles"), None);
        assert_eq!(session.get_as::<u32>("missing"), None);
    }

    #[test]
    fn test_generate_uses_fresh_ids() {
        let a = Session::generate("client-1", Duration::from_secs(60));
        let b = Session::generate("client-1", Duration::from_secs(60));
        assert_ne!(a.session_id(), b.session_id());
        assert_eq!(a.identifier(), "client-1");
        assert!(uuid::Uuid::parse_str(a.session_id()).is_ok());
    }

    #[test]
    fn test_set_timeout_moves_deadline() {
        let mut session = Session::new("abc", "client-1", Duration::ZERO);
        assert!(session.is_expired());

        session.set_timeout(Duration::from_secs(60));
        assert!(!session.is_expired());
        assert_eq!(session.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_display() {
        let mut session = Session::new("abc", "client-1", Duration::from_secs(60));
        session.set("a".to_string(), json!(1));
        assert_eq!(
            session.to_string(),
            "Session{key=SessionKey{sessionId='abc', identifier='client-1'}, entries=1}"
        );
    }

    #[test]
    fn test_key_extraction_through_capability() {
        let session = Session::new("abc", "client-1", Duration::from_secs(60));
        let dynamic: &dyn IpcSession = &session;
        assert_eq!(SessionKey::of(dynamic), SessionKey::new("abc", "client-1"));
        assert_eq!(dynamic.identifier(), "client-1");
    }

    #[test]
    fn test_serialized_form_survives_store_boundary() {
        let mut session = Session::new("abc", "client-1", Duration::from_secs(60));
        session.set("user".to_string(), json!({"name": "alice"}));

        let bytes = serde_json::to_vec(&session).unwrap();
        let restored: Session = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(restored, session);
    }
}
