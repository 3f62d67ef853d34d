//! Request id to command mapping.
//!
//! The registry and the event router share one [`Tables`] mutex. It is held
//! only for map and list edits; command callbacks always run after the guard
//! is dropped, with a cloned `Arc` keeping the command alive.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, warn};

use crate::command::{Command, EventKey, RequestId, SharedCommand};
use crate::errors::HalError;

pub(crate) const ENGINE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::engine");

/// Non-owning link from an event key to the command that handles it.
pub(crate) struct Subscription {
    pub(crate) key: EventKey,
    pub(crate) target: Weak<dyn Command>,
}

/// Tables guarded by the engine lock.
#[derive(Default)]
pub(crate) struct Tables {
    pub(crate) commands: HashMap<RequestId, SharedCommand>,
    pub(crate) subscriptions: Vec<Subscription>,
}

pub(crate) type SharedTables = Arc<Mutex<Tables>>;

pub(crate) fn lock_tables(tables: &Mutex<Tables>) -> MutexGuard<'_, Tables> {
    tables.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owner of one strong reference per registered command.
#[derive(Clone)]
pub struct CommandRegistry {
    tables: SharedTables,
}

impl CommandRegistry {
    pub(crate) const fn new(tables: SharedTables) -> Self {
        Self { tables }
    }

    /// Stores `command` under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::DuplicateRegistration`] when `id` is taken.
    pub fn register(&self, id: RequestId, command: SharedCommand) -> Result<(), HalError> {
        let mut tables = lock_tables(&self.tables);
        if tables.commands.contains_key(&id) {
            return Err(HalError::DuplicateRegistration { id });
        }
        tables.commands.insert(id, command);
        debug!(target: ENGINE_TARGET, id, "command registered");
        Ok(())
    }

    /// Removes `id` and returns the registry's reference to the caller.
    ///
    /// Dropping the returned value outside the lock releases the registry's
    /// ownership.
    pub fn unregister(&self, id: RequestId) -> Option<SharedCommand> {
        let removed = lock_tables(&self.tables).commands.remove(&id);
        if removed.is_some() {
            debug!(target: ENGINE_TARGET, id, "command unregistered");
        }
        removed
    }

    /// Returns a temporary strong reference to the command under `id`.
    #[must_use]
    pub fn lookup_and_hold(&self, id: RequestId) -> Option<SharedCommand> {
        lock_tables(&self.tables).commands.get(&id).cloned()
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: RequestId) -> bool {
        lock_tables(&self.tables).commands.contains_key(&id)
    }

    /// Number of registered commands.
    #[must_use]
    pub fn len(&self) -> usize {
        lock_tables(&self.tables).commands.len()
    }

    /// Whether no command is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<RequestId> {
        let mut ids: Vec<_> = lock_tables(&self.tables).commands.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Cancels every registered command and empties the registry.
    ///
    /// Works over a snapshot of the ids taken up front. Each command is held,
    /// the lock released, `cancel` invoked, and the entry removed only if the
    /// same command is still registered. A command removed by someone else in
    /// the meantime counts as already cancelled. Entries registered while the
    /// drain runs are dropped without a callback. Returns the number of
    /// `cancel` invocations.
    pub fn drain_and_cancel_all(&self, mut cancel: impl FnMut(&SharedCommand)) -> usize {
        let mut cancelled = 0;
        for id in self.ids() {
            let Some(held) = self.lookup_and_hold(id) else {
                debug!(target: ENGINE_TARGET, id, "command already removed during drain");
                continue;
            };
            cancel(&held);
            cancelled += 1;
            let removed = {
                let mut tables = lock_tables(&self.tables);
                let same = tables
                    .commands
                    .get(&id)
                    .is_some_and(|current| Arc::ptr_eq(current, &held));
                if same { tables.commands.remove(&id) } else { None }
            };
            drop(removed);
            drop(held);
        }

        let residual: Vec<_> = lock_tables(&self.tables).commands.drain().collect();
        for (id, _) in &residual {
            warn!(target: ENGINE_TARGET, id, "command registered during drain was discarded");
        }
        drop(residual);
        cancelled
    }
}
