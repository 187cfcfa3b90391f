//! Transport-side view of a connection.

use crate::session::Session;

/// The connection has no session attached.
///
/// This is the normal state for a connection that never asked for a session,
/// so consumers treat it as "nothing to do" rather than as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no session attached to connection")]
pub struct NotAttached;

/// A live connection as seen by the session layer.
///
/// Transports implement this so connection-destroy listeners can reach the
/// session the connection was using.
pub trait IpcConnection: Send + Sync {
    /// Identifier of the peer on the other end of the connection.
    fn identifier(&self) -> &str;

    /// Snapshot of the session attached to this connection.
    fn session(&self) -> Result<Session, NotAttached>;
}
