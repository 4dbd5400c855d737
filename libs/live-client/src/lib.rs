//! Client side of live entity updates: handler registry, presence tracking,
//! debounced field saving, and the connection driver.

pub mod codec;
pub mod connection;
pub mod debounce;
pub mod presence;
pub mod registry;

pub use connection::{ClientConfig, ClientError, ConnectionStatus, LiveConnection};
pub use debounce::{DebouncedField, FieldStore, SaveError, SaveStatus};
pub use presence::PresenceTracker;
pub use registry::{EventKind, HandlerHandle, HandlerRegistry, Subscriptions};
