// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Per-key coordination for handshakes
//!
//! `SingleFlight` coalesces concurrent work for one key: the first caller
//! runs it and every caller that arrives while it is in flight receives a
//! clone of the same outcome, success or error. `KeyedGate` is plain per-key
//! mutual exclusion, used where later callers must observe the effects of
//! earlier ones rather than share their result.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{watch, Mutex as AsyncMutex, OwnedMutexGuard};

type Flights<T> = Mutex<HashMap<String, watch::Receiver<Option<T>>>>;

/// Shares one in-flight computation per key among concurrent callers
pub struct SingleFlight<T> {
    flights: Flights<T>,
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Run `work` for `key`, or wait for the run already in flight
    ///
    /// If the leading caller is cancelled before finishing, one of the
    /// waiters takes over and runs `work` itself.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        loop {
            let joined = {
                let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
                match flights.get(key) {
                    Some(receiver) => Err(receiver.clone()),
                    None => {
                        let (sender, receiver) = watch::channel(None);
                        flights.insert(key.to_string(), receiver);
                        Ok(sender)
                    }
                }
            };

            match joined {
                Ok(sender) => {
                    let _landing = Landing {
                        flights: &self.flights,
                        key,
                    };
                    let outcome = work().await;
                    sender.send_replace(Some(outcome.clone()));
                    return outcome;
                }
                Err(mut receiver) => {
                    if let Some(outcome) = wait_for(&mut receiver).await {
                        return outcome;
                    }
                }
            }
        }
    }

    /// Number of keys with work in flight
    pub fn in_flight(&self) -> usize {
        self.flights
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// `None` when the leader went away without publishing
async fn wait_for<T: Clone>(receiver: &mut watch::Receiver<Option<T>>) -> Option<T> {
    loop {
        let current = receiver.borrow_and_update().clone();
        if current.is_some() {
            return current;
        }
        if receiver.changed().await.is_err() {
            return receiver.borrow().clone();
        }
    }
}

/// Clears the flight entry when the leader finishes or is dropped
struct Landing<'a, T> {
    flights: &'a Flights<T>,
    key: &'a str,
}

impl<T> Drop for Landing<'_, T> {
    fn drop(&mut self) {
        self.flights
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(self.key);
    }
}

/// Idle gates are pruned once the map grows past this size
const PRUNE_THRESHOLD: usize = 256;

#[derive(Default)]
pub struct KeyedGate {
    gates: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let gate = {
            let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
            if gates.len() >= PRUNE_THRESHOLD {
                // Only the map holds an idle gate
                gates.retain(|_, gate| Arc::strong_count(gate) > 1);
            }
            gates
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        gate.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
