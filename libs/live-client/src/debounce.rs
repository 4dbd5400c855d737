//! Debounced saving for an editable field bound to a live entity.
//!
//! The first edit after idle announces `EditingStarted` right away. Every
//! edit restarts a quiet-period timer; when it elapses the latest value is
//! validated, persisted and published as `EntityUpdated`. Closing the field
//! mid-edit cancels the timer and announces `EditingEnded`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use live_common::id::EntityId;
use live_common::{LiveEntity, LivePublisher, LiveUpdateEnvelope, Scope, UserId};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(1);

/// Local save indicator for the editing user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStatus {
    Idle,
    /// Edits are waiting for the quiet period to elapse.
    Editing,
    Saving,
    Saved,
    /// Validation or persistence failed; nothing was published.
    Unsaved(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveError {
    message: String,
}

impl SaveError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for SaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SaveError {}

/// Persists a field's value through the business layer and returns the
/// stored value.
#[async_trait]
pub trait FieldStore<T: Send + 'static>: Send + Sync {
    async fn persist(&self, value: T) -> Result<T, SaveError>;
}

type ValidateFn<T> = dyn Fn(&T) -> Result<(), String> + Send + Sync;

struct Binding<T: LiveEntity> {
    entity_id: EntityId,
    user_id: UserId,
    scope: Scope,
    publisher: Arc<dyn LivePublisher>,
    store: Arc<dyn FieldStore<T>>,
    validator: Option<Arc<ValidateFn<T>>>,
}

impl<T: LiveEntity> Clone for Binding<T> {
    fn clone(&self) -> Self {
        Self {
            entity_id: self.entity_id,
            user_id: self.user_id,
            scope: self.scope,
            publisher: Arc::clone(&self.publisher),
            store: Arc::clone(&self.store),
            validator: self.validator.clone(),
        }
    }
}

impl<T: LiveEntity> Binding<T> {
    fn publish(&self, envelope: LiveUpdateEnvelope) {
        self.publisher.publish(self.scope, envelope);
    }
}

#[derive(Default)]
struct TimerState {
    /// Bumped by every edit and by close; a timer only saves if it still
    /// holds the latest generation.
    generation: u64,
    /// The armed timer. Cleared once that timer starts saving, after which it
    /// is never aborted.
    pending: Option<JoinHandle<()>>,
    /// Generation of the most recently claimed timer.
    claimed: u64,
    editing: bool,
}

struct Shared {
    timer: Mutex<TimerState>,
    save_lock: tokio::sync::Mutex<()>,
    status: watch::Sender<SaveStatus>,
}

pub struct DebouncedField<T: LiveEntity> {
    binding: Binding<T>,
    quiet_period: Duration,
    shared: Arc<Shared>,
}

impl<T: LiveEntity> DebouncedField<T> {
    pub fn new(
        entity_id: EntityId,
        scope: Scope,
        user_id: UserId,
        publisher: Arc<dyn LivePublisher>,
        store: Arc<dyn FieldStore<T>>,
    ) -> Self {
        let (status, _) = watch::channel(SaveStatus::Idle);
        Self {
            binding: Binding {
                entity_id,
                user_id,
                scope,
                publisher,
                store,
                validator: None,
            },
            quiet_period: DEFAULT_QUIET_PERIOD,
            shared: Arc::new(Shared {
                timer: Mutex::new(TimerState::default()),
                save_lock: tokio::sync::Mutex::new(()),
                status,
            }),
        }
    }

    pub fn with_quiet_period(mut self, quiet_period: Duration) -> Self {
        self.quiet_period = quiet_period;
        self
    }

    /// Reject values before they are persisted. The error text becomes the
    /// `Unsaved` reason.
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&T) -> Result<(), String> + Send + Sync + 'static,
    {
        self.binding.validator = Some(Arc::new(validator));
        self
    }

    /// Record an edit. Must be called within a Tokio runtime.
    pub fn edit(&self, value: T) {
        let mut timer = self.shared.timer.lock();
        if !timer.editing {
            timer.editing = true;
            self.binding.publish(LiveUpdateEnvelope::editing_started(
                T::KIND,
                self.binding.entity_id,
                self.binding.user_id,
            ));
        }

        timer.generation += 1;
        if let Some(previous) = timer.pending.take() {
            previous.abort();
        }
        self.shared.status.send_replace(SaveStatus::Editing);

        // Spawned under the lock so the handle is stored before the timer
        // can claim itself.
        timer.pending = Some(tokio::spawn(save_after_quiet_period(
            self.binding.clone(),
            Arc::clone(&self.shared),
            timer.generation,
            value,
            self.quiet_period,
        )));
    }

    /// Stop editing: drop any unsaved pending value and clear the presence
    /// indicator for others. A save already in progress still completes.
    pub fn close(&self) {
        let mut timer = self.shared.timer.lock();
        timer.generation += 1;
        if let Some(pending) = timer.pending.take() {
            pending.abort();
            self.shared.status.send_replace(SaveStatus::Idle);
        }
        if std::mem::take(&mut timer.editing) {
            self.binding.publish(LiveUpdateEnvelope::editing_ended(
                T::KIND,
                self.binding.entity_id,
                self.binding.user_id,
            ));
        }
    }

    pub fn status(&self) -> watch::Receiver<SaveStatus> {
        self.shared.status.subscribe()
    }

    pub fn current_status(&self) -> SaveStatus {
        self.shared.status.borrow().clone()
    }
}

impl<T: LiveEntity> Drop for DebouncedField<T> {
    fn drop(&mut self) {
        self.close();
    }
}

async fn save_after_quiet_period<T: LiveEntity>(
    binding: Binding<T>,
    shared: Arc<Shared>,
    generation: u64,
    value: T,
    quiet_period: Duration,
) {
    tokio::time::sleep(quiet_period).await;
    {
        let mut timer = shared.timer.lock();
        if timer.generation != generation {
            return;
        }
        timer.pending = None;
        timer.claimed = generation;
        shared.status.send_replace(SaveStatus::Saving);
    }

    let _serial = shared.save_lock.lock().await;
    // A newer edit or a close while queued behind another save supersedes
    // this value.
    {
        let timer = shared.timer.lock();
        if timer.generation != generation {
            if timer.claimed == generation && timer.pending.is_none() {
                shared.status.send_replace(SaveStatus::Idle);
            }
            return;
        }
    }

    if let Some(validate) = &binding.validator {
        if let Err(reason) = validate(&value) {
            tracing::debug!(
                entity_kind = %T::KIND,
                entity_id = binding.entity_id,
                %reason,
                "field value rejected by validation"
            );
            settle(&shared, generation, SaveStatus::Unsaved(reason), false);
            return;
        }
    }

    settle(&shared, generation, SaveStatus::Saving, false);
    match binding.store.persist(value).await {
        Ok(saved) => {
            match LiveUpdateEnvelope::updated(binding.entity_id, &saved, binding.user_id) {
                Ok(envelope) => binding.publish(envelope),
                Err(err) => tracing::error!(
                    ?err,
                    entity_kind = %T::KIND,
                    entity_id = binding.entity_id,
                    "failed to encode saved value"
                ),
            }
            settle(&shared, generation, SaveStatus::Saved, true);
        }
        Err(err) => {
            tracing::warn!(
                %err,
                entity_kind = %T::KIND,
                entity_id = binding.entity_id,
                "failed to persist field"
            );
            settle(&shared, generation, SaveStatus::Unsaved(err.to_string()), false);
        }
    }
}

/// Report the outcome of a save unless a newer value is waiting or queued.
fn settle(shared: &Shared, generation: u64, status: SaveStatus, done_editing: bool) {
    let mut timer = shared.timer.lock();
    if timer.claimed != generation || timer.pending.is_some() {
        return;
    }
    if timer.generation == generation && done_editing {
        timer.editing = false;
    }
    shared.status.send_replace(status);
}
