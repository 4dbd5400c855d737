//! Per-session table of UI callbacks keyed by entity.
//!
//! Registrations are grouped by `(entity kind, entity id)`. Each one carries
//! the message kind it answers to, so an envelope only reaches callbacks
//! that asked for exactly that kind of notification.
//!
//! Removal is synchronous: once `unregister` returns, the callback is never
//! invoked again, even if a dispatch that had already picked it up is still
//! running on another thread. Each registration owns a reentrant gate that a
//! dispatch holds for the duration of the call and that `unregister` takes
//! before retiring the slot; a callback may therefore unregister itself.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use live_common::id::EntityId;
use live_common::{EntityKind, LiveEntity, LiveUpdateEnvelope, MessageKind, UserId};
use parking_lot::ReentrantMutex;

use crate::codec::decoder_for;

type EntityKey = (EntityKind, EntityId);

type UpdateFn = Box<dyn Fn(&(dyn Any + Send + Sync), UserId) + Send + Sync>;
type EventFn = Box<dyn Fn(Option<UserId>) + Send + Sync>;

/// Notifications that carry no entity value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Re-fetch; the callback receives `None`.
    EntityChanged,
    EditingStarted,
    EditingEnded,
}

impl EventKind {
    fn message_kind(self) -> MessageKind {
        match self {
            EventKind::EntityChanged => MessageKind::EntityChanged,
            EventKind::EditingStarted => MessageKind::EditingStarted,
            EventKind::EditingEnded => MessageKind::EditingEnded,
        }
    }
}

enum Callback {
    Updated(UpdateFn),
    Event(EventFn),
}

struct Slot {
    id: u64,
    kind: MessageKind,
    active: AtomicBool,
    gate: ReentrantMutex<()>,
    callback: Callback,
}

/// Identifies one registration for removal.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping a handle leaks the registration; unregister it or use Subscriptions"]
pub struct HandlerHandle {
    key: EntityKey,
    id: u64,
}

pub struct HandlerRegistry {
    entries: DashMap<EntityKey, Vec<Arc<Slot>>>,
    next_id: AtomicU64,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Call `callback` with the new value and the editing user whenever an
    /// `EntityUpdated` for this entity arrives.
    pub fn on_update<T, F>(&self, entity_id: EntityId, callback: F) -> HandlerHandle
    where
        T: LiveEntity,
        F: Fn(&T, UserId) + Send + Sync + 'static,
    {
        let wrapped = move |value: &(dyn Any + Send + Sync), user: UserId| {
            match value.downcast_ref::<T>() {
                Some(value) => callback(value, user),
                None => tracing::warn!(
                    entity_kind = %T::KIND,
                    entity_id,
                    "decoded value does not match the registered type"
                ),
            }
        };
        self.insert(
            (T::KIND, entity_id),
            MessageKind::EntityUpdated,
            Callback::Updated(Box::new(wrapped)),
        )
    }

    /// Call `callback` whenever a value-less notification of `kind` arrives
    /// for this entity. It receives the editing user, or `None` for
    /// `EntityChanged`.
    pub fn on_event<T, F>(&self, entity_id: EntityId, kind: EventKind, callback: F) -> HandlerHandle
    where
        T: LiveEntity,
        F: Fn(Option<UserId>) + Send + Sync + 'static,
    {
        self.insert(
            (T::KIND, entity_id),
            kind.message_kind(),
            Callback::Event(Box::new(callback)),
        )
    }

    fn insert(&self, key: EntityKey, kind: MessageKind, callback: Callback) -> HandlerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(Slot {
            id,
            kind,
            active: AtomicBool::new(true),
            gate: ReentrantMutex::new(()),
            callback,
        });
        self.entries.entry(key).or_default().push(slot);
        HandlerHandle { key, id }
    }

    /// Remove a registration. Returns `false` if it was already gone.
    ///
    /// Blocks while the callback is running on another thread. A callback may
    /// unregister itself or any registration that is not currently running.
    /// Two callbacks running at once on different threads must not unregister
    /// each other: each waits for the other to return and neither does.
    pub fn unregister(&self, handle: &HandlerHandle) -> bool {
        let slot = {
            let Some(mut slots) = self.entries.get_mut(&handle.key) else {
                return false;
            };
            let Some(pos) = slots.iter().position(|s| s.id == handle.id) else {
                return false;
            };
            slots.remove(pos)
        };
        self.entries.remove_if(&handle.key, |_, slots| slots.is_empty());

        let _gate = slot.gate.lock();
        slot.active.store(false, Ordering::Release);
        true
    }

    /// Route an envelope to every matching registration.
    ///
    /// The value of an `EntityUpdated` is decoded once, and only when at
    /// least one callback wants it. Returns the number of callbacks invoked.
    pub fn dispatch(&self, envelope: &LiveUpdateEnvelope) -> usize {
        let key = (envelope.entity_kind(), envelope.entity_id());
        let matching: Vec<Arc<Slot>> = match self.entries.get(&key) {
            Some(slots) => slots
                .iter()
                .filter(|slot| slot.kind == envelope.kind())
                .cloned()
                .collect(),
            None => return 0,
        };
        if matching.is_empty() {
            return 0;
        }

        let value = match (envelope.kind(), envelope.value()) {
            (MessageKind::EntityUpdated, Some(raw)) => match decoder_for(key.0)(raw) {
                Ok(value) => Some(value),
                Err(err) => {
                    tracing::warn!(
                        ?err,
                        entity_kind = %key.0,
                        entity_id = key.1,
                        "discarding undecodable entity update"
                    );
                    return 0;
                }
            },
            _ => None,
        };

        let mut invoked = 0;
        for slot in matching {
            let _gate = slot.gate.lock();
            if !slot.active.load(Ordering::Acquire) {
                continue;
            }
            match (&slot.callback, &value, envelope.editing_user_id()) {
                (Callback::Updated(f), Some(value), Some(user)) => f(value.as_ref(), user),
                (Callback::Event(f), _, user) => f(user),
                _ => continue,
            }
            invoked += 1;
        }
        invoked
    }

    /// Total live registrations.
    pub fn handler_count(&self) -> usize {
        self.entries.iter().map(|slots| slots.len()).sum()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The registrations owned by one UI component.
///
/// Everything registered through it is removed when it is cleared or
/// dropped.
pub struct Subscriptions {
    registry: Arc<HandlerRegistry>,
    handles: Vec<HandlerHandle>,
}

impl Subscriptions {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self {
            registry,
            handles: Vec::new(),
        }
    }

    pub fn on_update<T, F>(&mut self, entity_id: EntityId, callback: F) -> &mut Self
    where
        T: LiveEntity,
        F: Fn(&T, UserId) + Send + Sync + 'static,
    {
        let handle = self.registry.on_update::<T, F>(entity_id, callback);
        self.handles.push(handle);
        self
    }

    pub fn on_event<T, F>(&mut self, entity_id: EntityId, kind: EventKind, callback: F) -> &mut Self
    where
        T: LiveEntity,
        F: Fn(Option<UserId>) + Send + Sync + 'static,
    {
        let handle = self.registry.on_event::<T, F>(entity_id, kind, callback);
        self.handles.push(handle);
        self
    }

    /// Unregister everything, e.g. before re-registering for another entity.
    pub fn clear(&mut self) {
        for handle in self.handles.drain(..) {
            self.registry.unregister(&handle);
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        self.clear();
    }
}
