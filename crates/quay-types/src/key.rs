//! Session identity used as the store key.

use serde::{Deserialize, Serialize};

use crate::session::IpcSession;

/// Identity of a session: the pair of session id and client identifier.
///
/// Keys are immutable once built. Equality and hashing cover both fields,
/// so two keys constructed separately from the same strings address the
/// same store entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    session_id: String,
    identifier: String,
}

impl SessionKey {
    /// Create a key from a session id and an identifier.
    pub fn new(session_id: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            identifier: identifier.into(),
        }
    }

    /// Extract the key of any session variant.
    pub fn of<S: IpcSession + ?Sized>(session: &S) -> Self {
        session.key().clone()
    }

    /// The session id half of the key.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The identifier half of the key.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SessionKey{{sessionId='{}', identifier='{}'}}",
            self.session_id, self.identifier
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of(key: &SessionKey) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_equal_fields_are_equal_keys() {
        let a = SessionKey::new("abc", "client-1");
        let b = SessionKey::new(String::from("abc"), String::from("client-1"));
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_different_identifier_is_different_key() {
        let a = SessionKey::new("abc", "client-1");
        let b = SessionKey::new("abc", "client-2");
        assert_ne!(a, b);
    }

    #[test]
    fn test_different_session_id_is_different_key() {
        let a = SessionKey::new("abc", "client-1");
        let b = SessionKey::new("abd", "client-1");
        assert_ne!(a, b);
    }

    #[test]
    fn test_display() {
        let key = SessionKey::new("abc", "client-1");
        assert_eq!(
            key.to_string(),
            "SessionKey{sessionId='abc', identifier='client-1'}"
        );
    }

    #[test]
    fn test_usable_as_map_key() {
        let mut map = std::collections::HashMap::new();
        map.insert(SessionKey::new("abc", "client-1"), 1);
        assert_eq!(map.get(&SessionKey::new("abc", "client-1")), Some(&1));
        assert_eq!(map.get(&SessionKey::new("abc", "client-2")), None);
    }
}
