//! Connection-group registry and broadcast fan-out.
//!
//! A [`SocketPool`] maps group names to their current members. Every frame a
//! member sends is written to every member of the same group, the sender
//! included. Membership changes take the write side of one `RwLock`; a
//! broadcast holds the read side for as long as its writes are in flight, so
//! the recipient set is fixed when the broadcast starts and concurrent
//! broadcasts run in parallel.
//!
//! Writes to one member are serialized through a [`NamedLocker`] keyed by
//! `"{group}/{id}"`. A member whose write fails is evicted once the broadcast
//! has released the read lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::join_all;
use metrics::{counter, gauge};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::connection::Connection;
use crate::frame::Frame;
use crate::ids::ConnectionId;
use crate::metrics::{
    WS_BROADCASTS_TOTAL, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DELIVERY_FAILURES_TOTAL,
    WS_DISCONNECTIONS_TOTAL, WS_FRAMES_RELAYED_TOTAL,
};
use crate::named_locker::NamedLocker;

type Members = HashMap<ConnectionId, Arc<dyn Connection>>;

/// Outcome of one [`SocketPool::broadcast`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Members present when the broadcast started.
    pub recipients: usize,
    /// Members the frame was written to.
    pub delivered: usize,
    /// Members removed because their write failed.
    pub evicted: usize,
}

/// Registry of named connection groups.
#[derive(Default)]
pub struct SocketPool {
    groups: RwLock<HashMap<String, Members>>,
    send_locks: NamedLocker,
    /// Only changed while `groups` is write-locked, so it never runs ahead
    /// of the map.
    active: AtomicUsize,
}

impl SocketPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `connection` to `group` under a fresh identity.
    ///
    /// The returned [`Registration`] removes the membership again, either
    /// explicitly through [`Registration::unregister`] or when dropped.
    pub async fn register(
        self: &Arc<Self>,
        group: &str,
        connection: Arc<dyn Connection>,
    ) -> Registration {
        let id = ConnectionId::new();
        {
            let mut groups = self.groups.write().await;
            let _ = groups
                .entry(group.to_owned())
                .or_default()
                .insert(id.clone(), connection);
            let _ = self.active.fetch_add(1, Ordering::SeqCst);
        }

        info!(id = %id, socket = group, "registered socket");
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

        Registration {
            pool: Arc::clone(self),
            group: group.to_owned(),
            id,
            done: false,
        }
    }

    /// Write `frame` to every current member of `group` and wait for all
    /// writes to finish.
    ///
    /// Failed writes are logged and their members evicted before this
    /// returns. An unknown group is a no-op.
    pub async fn broadcast(&self, group: &str, frame: &Frame) -> Delivery {
        let (recipients, failed) = {
            let groups = self.groups.read().await;
            let Some(members) = groups.get(group) else {
                return Delivery::default();
            };

            debug!(
                socket = group,
                recipients = members.len(),
                kind = frame.kind.as_str(),
                bytes = frame.len(),
                "broadcasting frame"
            );

            let sends = members.iter().map(move |(id, conn)| async move {
                let delivered = self.send_locked(group, id, conn.as_ref(), frame).await;
                (id, delivered)
            });
            let failed: Vec<ConnectionId> = join_all(sends)
                .await
                .into_iter()
                .filter(|(_, delivered)| !delivered)
                .map(|(id, _)| id.clone())
                .collect();
            (members.len(), failed)
        };

        if recipients > 0 {
            counter!(WS_BROADCASTS_TOTAL).increment(1);
        }

        let mut evicted = 0;
        for id in &failed {
            if self.unregister(group, id).await {
                evicted += 1;
            }
        }

        Delivery {
            recipients,
            delivered: recipients - failed.len(),
            evicted,
        }
    }

    /// Remove `id` from `group` and close its connection.
    ///
    /// Returns `false` if the membership was already gone, which happens when
    /// the owning handler and a failed broadcast race to remove it.
    pub async fn unregister(&self, group: &str, id: &ConnectionId) -> bool {
        let removed = {
            let mut groups = self.groups.write().await;
            let Some(members) = groups.get_mut(group) else {
                return false;
            };
            let removed = members.remove(id);
            if members.is_empty() {
                let _ = groups.remove(group);
            }
            if removed.is_some() {
                let _ = self.active.fetch_sub(1, Ordering::SeqCst);
            }
            removed
        };
        let Some(connection) = removed else {
            return false;
        };

        let _ = self.send_locks.prune(&lock_key(group, id));

        if let Err(error) = connection.close().await {
            debug!(id = %id, socket = group, error = %error, "closing socket");
        }

        info!(id = %id, socket = group, "unregistered socket");
        counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        true
    }

    /// Number of registered memberships across all groups.
    pub fn connection_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Number of groups with at least one member.
    pub async fn group_count(&self) -> usize {
        self.groups.read().await.len()
    }

    /// Identities currently in `group`.
    pub async fn members(&self, group: &str) -> Vec<ConnectionId> {
        self.groups
            .read()
            .await
            .get(group)
            .map(|members| members.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether `id` is currently a member of `group`.
    pub async fn contains(&self, group: &str, id: &ConnectionId) -> bool {
        self.groups
            .read()
            .await
            .get(group)
            .is_some_and(|members| members.contains_key(id))
    }

    async fn send_locked(
        &self,
        group: &str,
        id: &ConnectionId,
        conn: &dyn Connection,
        frame: &Frame,
    ) -> bool {
        let _guard = self.send_locks.lock(&lock_key(group, id)).await;
        match conn.send(frame).await {
            Ok(()) => {
                counter!(WS_FRAMES_RELAYED_TOTAL, "kind" => frame.kind.as_str()).increment(1);
                true
            }
            Err(error) => {
                error!(id = %id, socket = group, error = %error, "delivering to socket");
                counter!(WS_DELIVERY_FAILURES_TOTAL).increment(1);
                false
            }
        }
    }
}

fn lock_key(group: &str, id: &ConnectionId) -> String {
    format!("{group}/{id}")
}

/// One membership in a [`SocketPool`].
///
/// Removing the membership happens at most once: [`unregister`](Self::unregister)
/// consumes the registration, and dropping it without calling `unregister`
/// schedules the removal on the current Tokio runtime.
pub struct Registration {
    pool: Arc<SocketPool>,
    group: String,
    id: ConnectionId,
    done: bool,
}

impl Registration {
    /// Identity assigned to this membership.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Group this membership belongs to.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Remove the membership now and close its connection.
    ///
    /// Returns `false` if a failed broadcast already evicted it.
    pub async fn unregister(mut self) -> bool {
        self.done = true;
        self.pool.unregister(&self.group, &self.id).await
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let pool = Arc::clone(&self.pool);
        let group = std::mem::take(&mut self.group);
        let id = self.id.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let _ = handle.spawn(async move {
                    let _ = pool.unregister(&group, &id).await;
                });
            }
            Err(_) => warn!(id = %id, socket = group.as_str(), "registration dropped outside a runtime"),
        }
    }
}
