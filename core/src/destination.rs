//! # stompmq Destination Registry
//!
//! Maps destination names to [`Destination`] records holding the subscriber
//! list and, for durable destinations, the persisted sequence counters.
//!
//! Destinations are created lazily on the first SUBSCRIBE or SEND naming
//! them and are never removed. A name starting with the configured volatile
//! prefix (`/topic/` by default) is fan-out only; every other name is durable
//! and each message sent to it is appended to the [`MessageLog`] before it is
//! delivered.
//!
//! Subscriber lists hold [`SessionId`]s rather than references to sessions.
//! The engine calls [`DestinationRegistry::remove_subscriber`] when a session
//! is torn down, and fan-out skips any id whose connection is already gone.

use crate::broker::session::SessionId;
use crate::storage::{MessageLog, SequenceCounters, StorageError};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Destination name is empty")]
    EmptyName,

    #[error("Destination name of {len} bytes exceeds the {max} byte limit")]
    NameTooLong { len: usize, max: usize },

    #[error("Persistence failure")]
    Persistence(#[source] StorageError),
}

#[derive(Debug, Clone)]
pub struct Destination {
    name: String,
    durable: bool,
    subscribers: Vec<SessionId>,
    counters: SequenceCounters,
}

impl Destination {
    fn new(name: String, durable: bool, counters: SequenceCounters) -> Self {
        Self {
            name,
            durable,
            subscribers: Vec::new(),
            counters,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    /// Subscribers in subscription order.
    pub fn subscribers(&self) -> &[SessionId] {
        &self.subscribers
    }

    pub fn counters(&self) -> SequenceCounters {
        self.counters
    }

    /// Adds `session` to the subscriber list. Returns `false` if it was
    /// already subscribed; a session is listed at most once.
    pub fn subscribe(&mut self, session: SessionId) -> bool {
        if self.subscribers.contains(&session) {
            return false;
        }
        self.subscribers.push(session);
        true
    }

    /// Returns `true` if `session` was subscribed.
    pub fn unsubscribe(&mut self, session: SessionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|id| *id != session);
        self.subscribers.len() != before
    }

    /// Appends `payload` to the log under this destination's next sequence
    /// number.
    pub fn persist(&mut self, log: &MessageLog, payload: &[u8]) -> Result<u64, StorageError> {
        log.append(&self.name, &mut self.counters, payload)
    }
}

/// The broker's destination table. One instance is owned by the engine and
/// handed to command handlers by reference.
#[derive(Debug)]
pub struct DestinationRegistry {
    destinations: HashMap<String, Destination>,
    log: MessageLog,
    volatile_prefix: String,
    max_name_len: usize,
}

impl DestinationRegistry {
    pub fn new(log: MessageLog, volatile_prefix: impl Into<String>, max_name_len: usize) -> Self {
        Self {
            destinations: HashMap::new(),
            log,
            volatile_prefix: volatile_prefix.into(),
            max_name_len,
        }
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn is_volatile(&self, name: &str) -> bool {
        !self.volatile_prefix.is_empty() && name.starts_with(&self.volatile_prefix)
    }

    pub fn find(&self, name: &str) -> Option<&Destination> {
        self.destinations.get(name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Destination> {
        self.destinations.get_mut(name)
    }

    /// Looks `name` up, creating it on first use.
    ///
    /// Creating a durable destination restores its counters from the log. If
    /// that read fails nothing is registered and the caller gets
    /// [`RegistryError::Persistence`].
    pub fn get_or_create(&mut self, name: &str) -> Result<&mut Destination, RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if name.len() > self.max_name_len {
            return Err(RegistryError::NameTooLong {
                len: name.len(),
                max: self.max_name_len,
            });
        }

        let durable = !self.is_volatile(name);
        match self.destinations.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let counters = if durable {
                    self.log.load(name).map_err(|e| {
                        warn!("Failed to load destination {}: {}", name, e);
                        RegistryError::Persistence(e)
                    })?
                } else {
                    SequenceCounters::default()
                };

                info!(
                    "Created {} destination {} (write sequence {})",
                    if durable { "durable" } else { "volatile" },
                    name,
                    counters.write
                );
                Ok(entry.insert(Destination::new(name.to_string(), durable, counters)))
            }
        }
    }

    /// Drops `session` from every subscriber list.
    pub fn remove_subscriber(&mut self, session: SessionId) -> usize {
        let removed = self
            .destinations
            .values_mut()
            .map(|destination| destination.unsubscribe(session))
            .filter(|removed| *removed)
            .count();
        if removed > 0 {
            debug!("Removed session {} from {} destinations", session, removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }
}
