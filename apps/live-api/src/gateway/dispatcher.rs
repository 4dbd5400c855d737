//! Broadcast dispatcher used by business logic to publish entity
//! notifications.
//!
//! Stateless apart from a handle on the channel registry. Every call names
//! its scope explicitly; publishes are encoded once, queued without waiting
//! and never retried.

use std::sync::Arc;

use live_common::envelope::CLOSE_PROJECT_REMOVED;
use live_common::id::EntityId;
use live_common::{LiveEntity, LivePublisher, LiveUpdateEnvelope, ProjectId, Scope, UserId};

use super::channels::{ChannelRegistry, Outbound};

#[derive(Clone)]
pub struct LiveUpdateDispatcher {
    channels: Arc<ChannelRegistry>,
}

impl LiveUpdateDispatcher {
    pub fn new(channels: Arc<ChannelRegistry>) -> Self {
        Self { channels }
    }

    /// Send the full new value of an entity.
    pub fn publish_update<T: LiveEntity>(
        &self,
        entity_id: EntityId,
        scope: Scope,
        value: &T,
        editing_user_id: UserId,
    ) -> usize {
        match LiveUpdateEnvelope::updated(entity_id, value, editing_user_id) {
            Ok(envelope) => self.publish(scope, envelope),
            Err(err) => {
                tracing::error!(?err, entity_kind = %T::KIND, entity_id, "failed to encode entity");
                0
            }
        }
    }

    /// Tell subscribers an entity changed without embedding the value.
    pub fn publish_changed<T: LiveEntity>(&self, entity_id: EntityId, scope: Scope) -> usize {
        self.publish(scope, LiveUpdateEnvelope::entity_changed(T::KIND, entity_id))
    }

    pub fn publish_editing_started<T: LiveEntity>(
        &self,
        entity_id: EntityId,
        scope: Scope,
        editing_user_id: UserId,
    ) -> usize {
        self.publish(
            scope,
            LiveUpdateEnvelope::editing_started(T::KIND, entity_id, editing_user_id),
        )
    }

    pub fn publish_editing_ended<T: LiveEntity>(
        &self,
        entity_id: EntityId,
        scope: Scope,
        editing_user_id: UserId,
    ) -> usize {
        self.publish(
            scope,
            LiveUpdateEnvelope::editing_ended(T::KIND, entity_id, editing_user_id),
        )
    }

    /// Disconnect everyone joined to a project that no longer exists.
    ///
    /// Each connection closes with `CLOSE_PROJECT_REMOVED` and leaves all of
    /// its channels as part of normal teardown.
    pub fn close_project(&self, project_id: ProjectId) -> usize {
        let closed = self.channels.send(
            Scope::Project(project_id),
            Outbound::Close {
                code: CLOSE_PROJECT_REMOVED,
                reason: "Project removed",
            },
        );
        tracing::info!(project_id, closed, "closing connections for removed project");
        closed
    }
}

impl LivePublisher for LiveUpdateDispatcher {
    fn publish(&self, scope: Scope, envelope: LiveUpdateEnvelope) -> usize {
        let frame: Arc<str> = Arc::from(envelope.to_message().to_json());
        let delivered = self.channels.send(scope, Outbound::Frame(frame));
        tracing::debug!(
            %scope,
            entity_kind = %envelope.entity_kind(),
            entity_id = envelope.entity_id(),
            kind = ?envelope.kind(),
            delivered,
            "published live update"
        );
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use live_common::entity::{Story, Task};
    use live_common::envelope::MessageKind;
    use live_common::ServerMessage;
    use tokio::sync::mpsc;

    fn story() -> Story {
        Story {
            id: 5,
            project_id: 1,
            sprint_id: None,
            title: "Login page".to_string(),
            description: String::new(),
            story_points: Some(3),
            status: "todo".to_string(),
        }
    }

    fn next_message(rx: &mut mpsc::Receiver<Outbound>) -> Option<ServerMessage> {
        match rx.try_recv().ok()? {
            Outbound::Frame(text) => serde_json::from_str(&text).ok(),
            Outbound::Close { .. } => None,
        }
    }

    fn setup() -> (LiveUpdateDispatcher, Arc<ChannelRegistry>) {
        let channels = Arc::new(ChannelRegistry::new());
        (LiveUpdateDispatcher::new(Arc::clone(&channels)), channels)
    }

    #[test]
    fn update_embeds_serialized_value() {
        let (dispatcher, channels) = setup();
        let (tx, mut rx) = mpsc::channel(8);
        let _m = channels.join("conn_a", &[Scope::Project(1)], tx);

        assert_eq!(dispatcher.publish_update(5, Scope::Project(1), &story(), 7), 1);

        let envelope = next_message(&mut rx).unwrap().into_envelope().unwrap();
        assert_eq!(envelope.kind(), MessageKind::EntityUpdated);
        assert_eq!(envelope.editing_user_id(), Some(7));
        let value: Story = serde_json::from_str(envelope.value().unwrap()).unwrap();
        assert_eq!(value, story());
    }

    #[test]
    fn user_scope_skips_project_channel() {
        let (dispatcher, channels) = setup();
        let (tx, mut rx) = mpsc::channel(8);
        let _m = channels.join("conn_a", &[Scope::Project(1), Scope::User(3)], tx);

        assert_eq!(dispatcher.publish_changed::<Task>(9, Scope::User(4)), 0);
        assert_eq!(dispatcher.publish_changed::<Task>(9, Scope::User(3)), 1);
        assert_eq!(
            next_message(&mut rx),
            Some(ServerMessage::EntityHasChanged(live_common::EntityKind::Task, 9))
        );
    }

    #[test]
    fn repeated_changed_publishes_are_not_deduplicated() {
        let (dispatcher, channels) = setup();
        let (tx, mut rx) = mpsc::channel(8);
        let _m = channels.join("conn_a", &[Scope::Project(1)], tx);

        dispatcher.publish_changed::<Task>(9, Scope::Project(1));
        dispatcher.publish_changed::<Task>(9, Scope::Project(1));

        assert!(next_message(&mut rx).is_some());
        assert!(next_message(&mut rx).is_some());
        assert!(next_message(&mut rx).is_none());
    }

    #[test]
    fn presence_messages_carry_editing_user() {
        let (dispatcher, channels) = setup();
        let (tx, mut rx) = mpsc::channel(8);
        let _m = channels.join("conn_a", &[Scope::Project(1)], tx);

        dispatcher.publish_editing_started::<Story>(5, Scope::Project(1), 8);
        dispatcher.publish_editing_ended::<Story>(5, Scope::Project(1), 8);

        assert_eq!(
            next_message(&mut rx),
            Some(ServerMessage::StartedUpdatingEntity(live_common::EntityKind::Story, 5, 8))
        );
        assert_eq!(
            next_message(&mut rx),
            Some(ServerMessage::StoppedUpdatingEntity(live_common::EntityKind::Story, 5, 8))
        );
    }

    #[test]
    fn close_project_queues_close_for_members() {
        let (dispatcher, channels) = setup();
        let (tx, mut rx) = mpsc::channel(8);
        let _m = channels.join("conn_a", &[Scope::Project(1), Scope::User(3)], tx);

        assert_eq!(dispatcher.close_project(1), 1);
        assert!(matches!(
            rx.try_recv(),
            Ok(Outbound::Close { code: CLOSE_PROJECT_REMOVED, .. })
        ));
        assert_eq!(dispatcher.close_project(2), 0);
    }
}
