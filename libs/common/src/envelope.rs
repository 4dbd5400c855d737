//! Live-update envelopes, server → client frames, and close codes.

use serde::{Deserialize, Serialize};

use crate::entity::{EntityKind, LiveEntity};
use crate::id::{EntityId, UserId};

// ---------------------------------------------------------------------------
// Close codes
// ---------------------------------------------------------------------------

pub const CLOSE_NORMAL: u16 = 1000;
/// The handshake was rejected; a `ConnectionError` frame precedes the close.
pub const CLOSE_REJECTED: u16 = 4004;
pub const CLOSE_KEEPALIVE_TIMEOUT: u16 = 4009;
/// The project the connection was joined to no longer exists.
pub const CLOSE_PROJECT_REMOVED: u16 = 4010;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The four kinds of entity notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Full new value embedded.
    EntityUpdated,
    /// Something changed; subscribers re-fetch.
    EntityChanged,
    EditingStarted,
    EditingEnded,
}

/// A transient entity notification, built by a publisher and discarded after
/// delivery.
///
/// Constructors enforce the payload shape of each kind: only
/// `EntityUpdated` carries a value, and every kind except `EntityChanged`
/// carries the editing user.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveUpdateEnvelope {
    entity_kind: EntityKind,
    entity_id: EntityId,
    kind: MessageKind,
    value: Option<String>,
    editing_user_id: Option<UserId>,
}

impl LiveUpdateEnvelope {
    /// `EntityUpdated` with an already-serialized value.
    pub fn entity_updated(
        entity_kind: EntityKind,
        entity_id: EntityId,
        value: String,
        editing_user_id: UserId,
    ) -> Self {
        Self {
            entity_kind,
            entity_id,
            kind: MessageKind::EntityUpdated,
            value: Some(value),
            editing_user_id: Some(editing_user_id),
        }
    }

    /// `EntityUpdated` serializing `value` as JSON.
    pub fn updated<T: LiveEntity>(
        entity_id: EntityId,
        value: &T,
        editing_user_id: UserId,
    ) -> Result<Self, serde_json::Error> {
        let value = serde_json::to_string(value)?;
        Ok(Self::entity_updated(T::KIND, entity_id, value, editing_user_id))
    }

    pub fn entity_changed(entity_kind: EntityKind, entity_id: EntityId) -> Self {
        Self {
            entity_kind,
            entity_id,
            kind: MessageKind::EntityChanged,
            value: None,
            editing_user_id: None,
        }
    }

    pub fn editing_started(
        entity_kind: EntityKind,
        entity_id: EntityId,
        editing_user_id: UserId,
    ) -> Self {
        Self {
            entity_kind,
            entity_id,
            kind: MessageKind::EditingStarted,
            value: None,
            editing_user_id: Some(editing_user_id),
        }
    }

    pub fn editing_ended(
        entity_kind: EntityKind,
        entity_id: EntityId,
        editing_user_id: UserId,
    ) -> Self {
        Self {
            entity_kind,
            entity_id,
            kind: MessageKind::EditingEnded,
            value: None,
            editing_user_id: Some(editing_user_id),
        }
    }

    pub fn entity_kind(&self) -> EntityKind {
        self.entity_kind
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Serialized new value; `Some` only for `EntityUpdated`.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// `None` only for `EntityChanged`.
    pub fn editing_user_id(&self) -> Option<UserId> {
        self.editing_user_id
    }

    /// Build the wire frame for this envelope.
    pub fn to_message(&self) -> ServerMessage {
        let kind = self.entity_kind;
        let id = self.entity_id;
        let user = self.editing_user_id.unwrap_or_default();
        match self.kind {
            MessageKind::EntityUpdated => ServerMessage::ReceiveEntityUpdate(
                kind,
                id,
                self.value.clone().unwrap_or_default(),
                user,
            ),
            MessageKind::EntityChanged => ServerMessage::EntityHasChanged(kind, id),
            MessageKind::EditingStarted => ServerMessage::StartedUpdatingEntity(kind, id, user),
            MessageKind::EditingEnded => ServerMessage::StoppedUpdatingEntity(kind, id, user),
        }
    }
}

// ---------------------------------------------------------------------------
// Server → Client frame
// ---------------------------------------------------------------------------

/// A message sent from the server to the client over WebSocket.
///
/// Encoded as `{"t": <name>, "d": <payload tuple>}`; unit messages omit `d`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "d")]
pub enum ServerMessage {
    ConnectionSuccess,
    ConnectionError(String),
    ReceiveEntityUpdate(EntityKind, EntityId, String, UserId),
    EntityHasChanged(EntityKind, EntityId),
    StartedUpdatingEntity(EntityKind, EntityId, UserId),
    StoppedUpdatingEntity(EntityKind, EntityId, UserId),
}

impl ServerMessage {
    /// The entity notification this frame carries, if any.
    pub fn into_envelope(self) -> Option<LiveUpdateEnvelope> {
        match self {
            ServerMessage::ConnectionSuccess | ServerMessage::ConnectionError(_) => None,
            ServerMessage::ReceiveEntityUpdate(kind, id, value, user) => {
                Some(LiveUpdateEnvelope::entity_updated(kind, id, value, user))
            }
            ServerMessage::EntityHasChanged(kind, id) => {
                Some(LiveUpdateEnvelope::entity_changed(kind, id))
            }
            ServerMessage::StartedUpdatingEntity(kind, id, user) => {
                Some(LiveUpdateEnvelope::editing_started(kind, id, user))
            }
            ServerMessage::StoppedUpdatingEntity(kind, id, user) => {
                Some(LiveUpdateEnvelope::editing_ended(kind, id, user))
            }
        }
    }

    /// Encode as a JSON text frame.
    pub fn to_json(&self) -> String {
        // Every variant is plain strings and integers.
        serde_json::to_string(self).unwrap_or_default()
    }
}
