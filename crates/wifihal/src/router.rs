//! Routing of multicast notifications to subscribed commands.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::command::{EventKey, SharedCommand};
use crate::errors::HalError;
use crate::event::Event;
use crate::netlink::{Control, Messages};
use crate::registry::{SharedTables, Subscription, lock_tables};

pub(crate) const EVENTS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::events");

/// Subscription table and dispatcher.
#[derive(Clone)]
pub struct EventRouter {
    tables: SharedTables,
}

impl EventRouter {
    pub(crate) const fn new(tables: SharedTables) -> Self {
        Self { tables }
    }

    /// Routes events matching `key` to `command`.
    ///
    /// The router keeps a weak link only; the command must be kept alive by
    /// the registry or the caller.
    ///
    /// # Errors
    ///
    /// Returns [`HalError::DuplicateSubscription`] when `key` is already
    /// subscribed.
    pub fn subscribe(&self, key: EventKey, command: &SharedCommand) -> Result<(), HalError> {
        let mut tables = lock_tables(&self.tables);
        if tables.subscriptions.iter().any(|entry| entry.key == key) {
            return Err(HalError::DuplicateSubscription { key });
        }
        tables.subscriptions.push(Subscription {
            key,
            target: Arc::downgrade(command),
        });
        debug!(target: EVENTS_TARGET, %key, "subscription added");
        Ok(())
    }

    /// Removes the subscription for `key`. Returns whether one existed.
    pub fn unsubscribe(&self, key: EventKey) -> bool {
        let mut tables = lock_tables(&self.tables);
        let before = tables.subscriptions.len();
        tables.subscriptions.retain(|entry| entry.key != key);
        let removed = tables.subscriptions.len() != before;
        drop(tables);
        if removed {
            debug!(target: EVENTS_TARGET, %key, "subscription removed");
        }
        removed
    }

    /// Whether `key` is subscribed.
    #[must_use]
    pub fn is_subscribed(&self, key: EventKey) -> bool {
        lock_tables(&self.tables)
            .subscriptions
            .iter()
            .any(|entry| entry.key == key)
    }

    /// Number of subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        lock_tables(&self.tables).subscriptions.len()
    }

    /// Whether there are no subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribed keys in registration order.
    #[must_use]
    pub fn keys(&self) -> Vec<EventKey> {
        lock_tables(&self.tables)
            .subscriptions
            .iter()
            .map(|entry| entry.key)
            .collect()
    }

    /// Removes every subscription and returns the keys that were present.
    pub(crate) fn clear(&self) -> Vec<EventKey> {
        let drained: Vec<_> = lock_tables(&self.tables).subscriptions.drain(..).collect();
        drained.into_iter().map(|entry| entry.key).collect()
    }

    /// Dispatches every message in `datagram`. Returns how many reached a
    /// handler.
    pub fn dispatch(&self, datagram: &[u8]) -> usize {
        let mut delivered = 0;
        for parsed in Messages::new(datagram) {
            match parsed {
                Ok(message) if message.control() == Control::Data => {
                    if self.dispatch_event(&Event::new(message)) {
                        delivered += 1;
                    }
                }
                Ok(message) => {
                    trace!(
                        target: EVENTS_TARGET,
                        kind = message.header().kind,
                        "ignoring control message on event channel"
                    );
                }
                Err(violation) => {
                    warn!(target: EVENTS_TARGET, %violation, "malformed event datagram");
                }
            }
        }
        delivered
    }

    /// Delivers `event` to the first subscription with an identical key.
    /// Returns whether a handler ran.
    pub fn dispatch_event(&self, event: &Event<'_>) -> bool {
        let Some(key) = event.key() else {
            debug!(
                target: EVENTS_TARGET,
                cmd = ?event.cmd(),
                "dropping event without a routing key"
            );
            return false;
        };

        let target = {
            let tables = lock_tables(&self.tables);
            tables
                .subscriptions
                .iter()
                .find(|entry| entry.key == key)
                .map(|entry| entry.target.upgrade())
        };

        match target {
            None => {
                trace!(target: EVENTS_TARGET, %key, "no subscriber for event");
                false
            }
            Some(None) => {
                warn!(target: EVENTS_TARGET, %key, "subscriber dropped before delivery");
                false
            }
            Some(Some(command)) => {
                command.handle_event(event);
                drop(command);
                true
            }
        }
    }
}
