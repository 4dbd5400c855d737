//! "Someone is editing this" indicator for one entity.
//!
//! `EditingStarted` adds the user, `EditingEnded` removes them, and an
//! `EntityUpdated` from a user removes them as well since the new value
//! supersedes the indicator.

use std::collections::BTreeSet;
use std::sync::Arc;

use live_common::id::EntityId;
use live_common::{LiveEntity, UserId};
use tokio::sync::watch;

use crate::registry::{EventKind, HandlerRegistry, Subscriptions};

pub struct PresenceTracker {
    editors: Arc<watch::Sender<BTreeSet<UserId>>>,
    _subscriptions: Subscriptions,
}

impl PresenceTracker {
    /// Track editors of entity `T` `entity_id`.
    ///
    /// Notifications about `local_user` are ignored so a field never shows
    /// its own user as a remote editor.
    pub fn new<T: LiveEntity>(
        registry: Arc<HandlerRegistry>,
        entity_id: EntityId,
        local_user: Option<UserId>,
    ) -> Self {
        let (tx, _) = watch::channel(BTreeSet::new());
        let editors = Arc::new(tx);
        let remote = move |user: UserId| Some(user) != local_user;

        let mut subscriptions = Subscriptions::new(registry);
        {
            let editors = Arc::clone(&editors);
            subscriptions.on_event::<T, _>(entity_id, EventKind::EditingStarted, move |user| {
                if let Some(user) = user.filter(|u| remote(*u)) {
                    editors.send_if_modified(|set| set.insert(user));
                }
            });
        }
        {
            let editors = Arc::clone(&editors);
            subscriptions.on_event::<T, _>(entity_id, EventKind::EditingEnded, move |user| {
                if let Some(user) = user {
                    editors.send_if_modified(|set| set.remove(&user));
                }
            });
        }
        {
            let editors = Arc::clone(&editors);
            subscriptions.on_update::<T, _>(entity_id, move |_, user| {
                editors.send_if_modified(|set| set.remove(&user));
            });
        }

        Self {
            editors,
            _subscriptions: subscriptions,
        }
    }

    /// Users currently editing, in ascending id order.
    pub fn editors(&self) -> Vec<UserId> {
        self.editors.borrow().iter().copied().collect()
    }

    pub fn is_being_edited(&self) -> bool {
        !self.editors.borrow().is_empty()
    }

    /// Change feed for the UI.
    pub fn subscribe(&self) -> watch::Receiver<BTreeSet<UserId>> {
        self.editors.subscribe()
    }
}
