// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Negotiated Session Cache
//!
//! Holds negotiated sessions in two independent maps, one per role. A single
//! process is usually a client to some peers and a server to others at the
//! same time, and the two key spaces (destination ids vs. inbound session
//! ids) must never collide.
//!
//! Expiry is lazy: `get` treats `now >= expire_time` as absent and evicts
//! the stale entry. `spawn_sweeper` adds an optional periodic purge.
//!
//! **Security**: Sessions are stored in memory only and never persisted to disk.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::types::{NegotiationResult, SessionRole};
use crate::crypto::clock::{system_clock, Clock};

type SessionMap = Arc<RwLock<HashMap<String, NegotiationResult>>>;

/// Role-partitioned, expiring session storage
///
/// # Example
///
/// ```ignore
/// let cache = SessionCache::new(system_clock());
/// cache.put(SessionRole::Client, "billing-service", session).await;
/// let session = cache.get(SessionRole::Client, "billing-service").await;
/// cache.invalidate(SessionRole::Client, "billing-service").await;
/// ```
#[derive(Clone)]
pub struct SessionCache {
    client: SessionMap,
    server: SessionMap,
    clock: Arc<dyn Clock>,
}

impl SessionCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            client: Arc::new(RwLock::new(HashMap::new())),
            server: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn map(&self, role: SessionRole) -> &SessionMap {
        match role {
            SessionRole::Client => &self.client,
            SessionRole::Server => &self.server,
        }
    }

    /// Publish a fully negotiated session under `key`
    pub async fn put(&self, role: SessionRole, key: &str, session: NegotiationResult) {
        let mut sessions = self.map(role).write().await;
        tracing::info!(
            "🔑 {} session stored: key={} session_id={} scheme={} expires_at={} (total: {})",
            role,
            key,
            session.session_id(),
            session.encryption_scheme(),
            session.expire_time_epoch_ms(),
            sessions.len() + 1
        );
        sessions.insert(key.to_string(), session);
    }

    /// Fetch a live session, evicting it if it has expired
    pub async fn get(&self, role: SessionRole, key: &str) -> Option<NegotiationResult> {
        let now = self.clock.now_millis();
        {
            let sessions = self.map(role).read().await;
            match sessions.get(key) {
                None => return None,
                Some(session) if !session.is_expired(now) => return Some(session.clone()),
                Some(_) => {}
            }
        }

        let mut sessions = self.map(role).write().await;
        // Another task may have replaced the entry between the two locks
        if let Some(session) = sessions.get(key) {
            if !session.is_expired(now) {
                return Some(session.clone());
            }
            tracing::debug!("⌛ {} session expired: key={}", role, key);
            sessions.remove(key);
        }
        None
    }

    /// Remove a session regardless of expiry
    pub async fn invalidate(&self, role: SessionRole, key: &str) -> Option<NegotiationResult> {
        let mut sessions = self.map(role).write().await;
        let removed = sessions.remove(key);
        if removed.is_some() {
            tracing::info!(
                "🗑️  {} session invalidated: key={} (remaining: {})",
                role,
                key,
                sessions.len()
            );
        }
        removed
    }

    /// Number of stored entries for a role, expired ones included
    pub async fn count(&self, role: SessionRole) -> usize {
        self.map(role).read().await.len()
    }

    /// Purge expired entries from both maps, returning how many were removed
    pub async fn clear_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut removed = 0;
        for role in [SessionRole::Client, SessionRole::Server] {
            let mut sessions = self.map(role).write().await;
            let before = sessions.len();
            sessions.retain(|_, session| !session.is_expired(now));
            removed += before - sessions.len();
        }
        if removed > 0 {
            tracing::info!("🧹 Swept {} expired sessions", removed);
        }
        removed
    }

    /// Drop every session in both roles
    pub async fn clear_all(&self) {
        let mut count = 0;
        for role in [SessionRole::Client, SessionRole::Server] {
            let mut sessions = self.map(role).write().await;
            count += sessions.len();
            sessions.clear();
        }
        tracing::info!("🗑️  Cleared all sessions (count: {})", count);
    }

    /// Periodically purge expired sessions until the handle is aborted
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.clear_expired().await;
            }
        })
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new(system_clock())
    }
}
