//! Wire contract shared by the live-update gateway and its clients.

pub mod entity;
pub mod envelope;
pub mod id;
pub mod publish;
pub mod scope;

pub use entity::{EntityKind, LiveEntity};
pub use envelope::{LiveUpdateEnvelope, MessageKind, ServerMessage};
pub use id::{ProjectId, UserId};
pub use publish::LivePublisher;
pub use scope::Scope;
