// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reference-counted change stream registry.
//!
//! Many downstream listeners share one [`ChangeStreamClient`] per thing. A
//! stream exists exactly while its thing has at least one listener; the last
//! detach tears it down.
//!
//! All map and listener-set mutations happen under one lock, so a detach that
//! removes the last listener can never race an attach into creating a second
//! stream for the same thing. State is delivered to listeners outside that
//! lock, except for the initial delivery on attach.
//!
//! # Usage
//!
//! ```ignore
//! let sub = registry.attach("device-1", Arc::new(|state: Option<Arc<Thing>>| {
//!     println!("{:?}", state.map(|t| t.name().to_string()));
//! }));
//! // ...
//! sub.detach();
//! ```

use crate::model::Thing;
use crate::stream::{ChangeStreamClient, StateCallback, StreamFactory};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// Receiver of thing state updates.
///
/// `None` means the state is currently unknown (not loaded yet, or the
/// stream is disconnected). Implementations must not call back into the
/// registry.
pub trait StateListener: Send + Sync {
    fn on_state(&self, state: Option<Arc<Thing>>);
}

impl<F> StateListener for F
where
    F: Fn(Option<Arc<Thing>>) + Send + Sync,
{
    fn on_state(&self, state: Option<Arc<Thing>>) {
        self(state)
    }
}

/// Attached listener; `removed` is set on detach so in-flight deliveries skip it.
#[derive(Clone)]
struct Slot {
    listener: Arc<dyn StateListener>,
    removed: Arc<AtomicBool>,
}

impl Slot {
    fn deliver(&self, state: Option<Arc<Thing>>) {
        if !self.removed.load(Ordering::Acquire) {
            self.listener.on_state(state);
        }
    }
}

struct Entry {
    client: ChangeStreamClient,
    generation: u64,
    listeners: BTreeMap<u64, Slot>,
    last_state: Option<Arc<Thing>>,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<String, Entry>,
    /// Streams created so far; doubles as the entry generation.
    created: u64,
    next_handle: u64,
}

struct Inner {
    factory: StreamFactory,
    state: Mutex<RegistryState>,
}

/// Registry of change streams keyed by thing.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    inner: Arc<Inner>,
}

impl SubscriptionRegistry {
    pub fn new(factory: StreamFactory) -> Self {
        Self {
            inner: Arc::new(Inner {
                factory,
                state: Mutex::new(RegistryState::default()),
            }),
        }
    }

    /// Attach a listener to a thing.
    ///
    /// Creates the thing's stream if needed and delivers the last known state
    /// (or `None`) to the listener before returning.
    pub fn attach(&self, thing: &str, listener: Arc<dyn StateListener>) -> Subscription {
        let mut guard = self.inner.state.lock();
        let RegistryState {
            entries,
            created,
            next_handle,
        } = &mut *guard;

        let entry = entries.entry(thing.to_string()).or_insert_with(|| {
            *created += 1;
            let generation = *created;
            let publish = publisher(Arc::downgrade(&self.inner), thing.to_string(), generation);
            info!("Opening change stream for '{}'", thing);
            Entry {
                client: self.inner.factory.spawn(thing, publish),
                generation,
                listeners: BTreeMap::new(),
                last_state: None,
            }
        });

        let handle = *next_handle;
        *next_handle += 1;

        listener.on_state(entry.last_state.clone());
        entry.listeners.insert(
            handle,
            Slot {
                listener,
                removed: Arc::new(AtomicBool::new(false)),
            },
        );
        debug!(
            "Attached listener {} to '{}' ({} total)",
            handle,
            thing,
            entry.listeners.len()
        );

        Subscription {
            registry: Arc::downgrade(&self.inner),
            thing: thing.to_string(),
            handle,
            detached: false,
        }
    }

    /// Close every stream and forget all listeners.
    pub fn close_all(&self) {
        let entries = std::mem::take(&mut self.inner.state.lock().entries);
        for (thing, entry) in entries {
            debug!("Closing change stream for '{}'", thing);
            for slot in entry.listeners.values() {
                slot.removed.store(true, Ordering::Release);
            }
            entry.client.close();
        }
        info!("Subscription registry closed");
    }

    /// Number of open streams.
    pub fn active_streams(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    /// Number of streams created since start.
    pub fn streams_created(&self) -> u64 {
        self.inner.state.lock().created
    }

    /// Listeners currently attached to a thing.
    pub fn listener_count(&self, thing: &str) -> usize {
        self.inner
            .state
            .lock()
            .entries
            .get(thing)
            .map_or(0, |e| e.listeners.len())
    }

    /// Last state received for a thing with an open stream.
    pub fn last_state(&self, thing: &str) -> Option<Arc<Thing>> {
        self.inner
            .state
            .lock()
            .entries
            .get(thing)
            .and_then(|e| e.last_state.clone())
    }
}

fn publisher(inner: Weak<Inner>, thing: String, generation: u64) -> StateCallback {
    Arc::new(move |state: Option<Arc<Thing>>| {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let listeners: Vec<Slot> = {
            let mut guard = inner.state.lock();
            match guard.entries.get_mut(&thing) {
                Some(entry) if entry.generation == generation => {
                    entry.last_state = state.clone();
                    entry.listeners.values().cloned().collect()
                }
                // Stream was torn down; late notification.
                _ => return,
            }
        };
        for slot in listeners {
            slot.deliver(state.clone());
        }
    })
}

fn detach(inner: &Inner, thing: &str, handle: u64) {
    let mut guard = inner.state.lock();
    let Some(entry) = guard.entries.get_mut(thing) else {
        return;
    };
    let Some(slot) = entry.listeners.remove(&handle) else {
        return;
    };
    slot.removed.store(true, Ordering::Release);
    debug!(
        "Detached listener {} from '{}' ({} left)",
        handle,
        thing,
        entry.listeners.len()
    );
    if entry.listeners.is_empty() {
        if let Some(entry) = guard.entries.remove(thing) {
            entry.client.close();
            info!("Closed change stream for '{}'", thing);
        }
    }
}

/// Attached listener; detaches when dropped.
pub struct Subscription {
    registry: Weak<Inner>,
    thing: String,
    handle: u64,
    detached: bool,
}

impl Subscription {
    pub fn thing(&self) -> &str {
        &self.thing
    }

    /// Registry-wide unique listener handle.
    pub fn handle(&self) -> u64 {
        self.handle
    }

    /// Detach the listener now.
    pub fn detach(mut self) {
        self.detach_inner();
    }

    fn detach_inner(&mut self) {
        if self.detached {
            return;
        }
        self.detached = true;
        if let Some(inner) = self.registry.upgrade() {
            detach(&inner, &self.thing, self.handle);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach_inner();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("thing", &self.thing)
            .field("handle", &self.handle)
            .finish()
    }
}
