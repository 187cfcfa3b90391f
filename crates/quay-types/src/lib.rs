//! Shared types for the Quay session layer.
//!
//! These types sit below both the configuration crate and the session
//! provider so that transports can depend on them without pulling in a
//! store implementation.

pub mod config;
pub mod connection;
pub mod key;
pub mod session;
pub mod time;

pub use config::{
    ConfigProvider, HasSessionConfig, SessionConfigProvider, defaults as config_defaults,
};
pub use connection::{IpcConnection, NotAttached};
pub use key::SessionKey;
pub use session::{IpcSession, Session};
pub use time::TimeUnit;
