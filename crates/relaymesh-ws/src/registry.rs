//! The session registry: two indexes (session id -> session, group name
//! -> session ids) plus the accept/fan-out operations of §4.5/§3.6.

use std::sync::{Arc, Weak};
use std::time::Duration;

use axum::extract::ws::WebSocket;
use dashmap::{DashMap, DashSet};
use futures_util::StreamExt;
use relaymesh_core::{CmsObject, Dispatch};
use tracing::info;
use uuid::Uuid;

use crate::session::{Fanout, PeerMeta, Session};
use crate::{lifecycle, WsError, WsResult};

/// Per-connection lifecycle management, heartbeat, group membership, and
/// fan-out broadcast. Session values are held weakly: the owning
/// lifecycle task holds the only strong `Arc`, so an abandoned session
/// (its task panicked without going through the normal exit path) is
/// collectible rather than pinned in the index forever.
pub struct SessionRegistry {
    sessions: DashMap<String, Weak<Session>>,
    groups: DashMap<String, DashSet<String>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            groups: DashMap::new(),
        })
    }

    /// Upgrade one connection: mint a session id, construct the Session,
    /// index it, and hand it off to its lifecycle task. Returns
    /// immediately; the lifecycle task removes the session from the
    /// index on exit.
    pub fn accept(
        self: &Arc<Self>,
        socket: WebSocket,
        peer: PeerMeta,
        cms: CmsObject,
        dispatch: Arc<dyn Dispatch>,
        heartbeat_interval: Duration,
    ) -> Arc<Session> {
        let id = Uuid::new_v4().to_string();
        let (sink, stream) = socket.split();
        let session = Arc::new(Session::new(
            id.clone(),
            peer,
            cms,
            sink,
            heartbeat_interval,
            Arc::downgrade(self),
        ));

        self.sessions.insert(id.clone(), Arc::downgrade(&session));
        info!(session = %id, "websocket session opened");

        let registry = Arc::clone(self);
        let task_session = Arc::clone(&session);
        tokio::spawn(async move {
            lifecycle::run(Arc::clone(&task_session), stream, dispatch).await;
            registry.forget(&task_session.id().to_string());
        });

        session
    }

    /// Remove a session from both indexes; invariant (ii) of §3.6.
    fn forget(&self, id: &str) {
        self.sessions.remove(id);
        for entry in self.groups.iter() {
            entry.value().remove(id);
        }
        self.groups.retain(|_, ids| !ids.is_empty());
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.get(id)?.upgrade();
        if session.is_none() {
            self.sessions.remove(id);
        }
        session
    }

    /// `add(session_id, group)`: creates the group if absent. Returns
    /// `false` if the session is unknown.
    pub fn add_to_group(&self, session_id: &str, group: &str) -> bool {
        if self.get(session_id).is_none() {
            return false;
        }
        self.groups
            .entry(group.to_string())
            .or_default()
            .insert(session_id.to_string());
        true
    }

    /// `remove(session_id, group)`: removes, deleting the group if it
    /// becomes empty.
    pub fn remove_from_group(&self, session_id: &str, group: &str) {
        if let Some(ids) = self.groups.get(group) {
            ids.remove(session_id);
        }
        self.groups.retain(|_, ids| !ids.is_empty());
    }

    /// A snapshot of live sessions in `group`, pruning dead ids (and
    /// deleting the group if it becomes empty) in the process, per
    /// invariant (iii).
    #[must_use]
    pub fn group_sessions(&self, group: &str) -> Vec<Arc<Session>> {
        let Some(ids) = self.groups.get(group) else {
            return Vec::new();
        };
        let snapshot: Vec<String> = ids.iter().map(|id| (*id).clone()).collect();
        drop(ids);

        let mut alive = Vec::new();
        let mut dead = Vec::new();
        for id in snapshot {
            match self.get(&id) {
                Some(session) => alive.push(session),
                None => dead.push(id),
            }
        }
        if !dead.is_empty() {
            if let Some(ids) = self.groups.get(group) {
                for id in &dead {
                    ids.remove(id);
                }
            }
            self.groups.retain(|_, ids| !ids.is_empty());
        }
        alive
    }

    /// Every group name currently present (non-empty by invariant (i)).
    #[must_use]
    pub fn all_groups(&self) -> Vec<String> {
        self.groups.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Send `payload` to every live session in `group`. Per-session
    /// failures do not abort the fan-out. Returns the count of
    /// successful deliveries.
    pub async fn send_to_group(&self, group: &str, payload: Fanout) -> usize {
        let mut delivered = 0;
        for session in self.group_sessions(group) {
            if session.send_fanout(payload.clone()).await {
                delivered += 1;
            }
        }
        delivered
    }

    /// Send `payload` to every live session in the registry.
    pub async fn broadcast(&self, payload: Fanout) -> usize {
        let ids: Vec<String> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        let mut delivered = 0;
        for id in ids {
            if let Some(session) = self.get(&id) {
                if session.send_fanout(payload.clone()).await {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Send `payload` to one specific session by id.
    pub async fn send_to(&self, session_id: &str, payload: Fanout) -> WsResult<bool> {
        let session = self
            .get(session_id)
            .ok_or_else(|| WsError::UnknownSession(session_id.to_string()))?;
        Ok(session.send_fanout(payload).await)
    }

    /// Graceful shutdown: close every live session, bounded by each
    /// session's own close timeout. The DISCONNECT dispatch itself
    /// happens inside each session's own lifecycle loop once its read
    /// future observes the socket close, not here.
    pub async fn shutdown_all(&self) {
        let ids: Vec<String> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            if let Some(session) = self.get(&id) {
                session.close(1001, "server shutting down").await;
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_lifecycle_without_real_sockets() {
        let registry = SessionRegistry::new();
        // No sessions registered yet: unknown id can't join a group.
        assert!(!registry.add_to_group("missing", "room"));
        assert!(registry.all_groups().is_empty());
    }
}
