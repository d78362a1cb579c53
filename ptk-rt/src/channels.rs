//! Channel router and fan-out dispatcher
//!
//! Every authenticated connection is registered with the [`ChannelHub`] and
//! subscribed to:
//! - [`Channel::Coaches`] iff its role is coach
//! - [`Channel::Learner`] keyed by its own learner id, always
//!
//! Dispatch targets a set of channels and delivers each event at most once per
//! connection, however many of the targeted channels it belongs to. The hub
//! also owns the deployment-wide coach broadcast.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use ptk_common::events::ServerEvent;
use ptk_common::model::{Broadcast, Identity, COACHES_CHANNEL};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

/// Hub-assigned connection handle
pub type ConnectionId = u64;

/// Outbound half of a connection; the transport drains the receiver
pub type Outbound = mpsc::UnboundedSender<ServerEvent>;

/// Named subscription target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    Coaches,
    /// Personal channel of one learner
    Learner(String),
}

impl Channel {
    pub fn learner(learner_id: impl Into<String>) -> Self {
        Channel::Learner(learner_id.into())
    }

    /// Role-appropriate subscriptions for a verified identity
    pub fn for_identity(identity: &Identity) -> Vec<Channel> {
        let mut channels = Vec::with_capacity(2);
        if identity.is_coach() {
            channels.push(Channel::Coaches);
        }
        channels.push(Channel::learner(&identity.learner_id));
        channels
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Coaches => f.write_str(COACHES_CHANNEL),
            Channel::Learner(id) => f.write_str(id),
        }
    }
}

struct Connection {
    identity: Identity,
    channels: HashSet<Channel>,
    outbound: Outbound,
}

impl Connection {
    /// Whether `event` may reach this connection through `targets`
    ///
    /// Reaching a connection only through a personal channel requires the
    /// event's subject (if any) to be that channel's owner.
    fn accepts(&self, targets: &[Channel], event: &ServerEvent) -> bool {
        let via_coaches =
            targets.contains(&Channel::Coaches) && self.channels.contains(&Channel::Coaches);
        if via_coaches {
            return true;
        }

        let via_personal = targets.iter().any(|c| self.channels.contains(c));
        if !via_personal {
            return false;
        }

        match event.subject_learner() {
            Some(subject) if subject != self.identity.learner_id => {
                warn!(
                    event = event.event_name(),
                    subject,
                    recipient = %self.identity.learner_id,
                    "Refusing to deliver another learner's record on a personal channel"
                );
                false
            }
            _ => true,
        }
    }
}

/// Connection registry, channel membership and current broadcast
///
/// Shared behind an `Arc` by every session and handler.
pub struct ChannelHub {
    next_id: AtomicU64,
    connections: RwLock<HashMap<ConnectionId, Connection>>,
    broadcast: RwLock<Option<Broadcast>>,
}

impl Default for ChannelHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelHub {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            connections: RwLock::new(HashMap::new()),
            broadcast: RwLock::new(None),
        }
    }

    /// Register an authenticated connection and join its channels
    ///
    /// If a broadcast is active the connection receives `current-broadcast`
    /// straight away.
    pub async fn register(&self, identity: Identity, outbound: Outbound) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let channels: HashSet<Channel> = Channel::for_identity(&identity).into_iter().collect();

        info!(
            connection = id,
            learner_id = %identity.learner_id,
            role = %identity.role,
            channels = ?channels.iter().map(|c| c.to_string()).collect::<Vec<_>>(),
            "Connection joined"
        );

        // Registry lock first so a concurrent set_broadcast cannot slip between
        // the snapshot and the insert
        let mut connections = self.connections.write().await;
        if let Some(current) = self.broadcast.read().await.clone() {
            let _ = outbound.send(ServerEvent::CurrentBroadcast(Some(current)));
        }

        connections.insert(
            id,
            Connection {
                identity,
                channels,
                outbound,
            },
        );
        id
    }

    /// Drop a connection and all of its subscriptions
    pub async fn unregister(&self, id: ConnectionId) {
        if let Some(conn) = self.connections.write().await.remove(&id) {
            info!(
                connection = id,
                learner_id = %conn.identity.learner_id,
                "Connection left"
            );
        }
    }

    /// Deliver `event` to every connection subscribed to any of `targets`
    ///
    /// Each connection receives the event at most once. `except` skips one
    /// connection (typically the originator). Returns the number of
    /// connections the event was handed to.
    pub async fn dispatch(
        &self,
        targets: &[Channel],
        event: &ServerEvent,
        except: Option<ConnectionId>,
    ) -> usize {
        let connections = self.connections.read().await;
        let mut delivered = 0;

        for (id, conn) in connections.iter() {
            if Some(*id) == except || !conn.accepts(targets, event) {
                continue;
            }
            if conn.outbound.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }

        debug!(
            event = event.event_name(),
            targets = ?targets.iter().map(|c| c.to_string()).collect::<Vec<_>>(),
            delivered,
            "Dispatched"
        );
        delivered
    }

    /// Deliver `event` to every registered connection
    pub async fn dispatch_all(&self, event: &ServerEvent) -> usize {
        let connections = self.connections.read().await;
        connections
            .values()
            .filter(|conn| conn.outbound.send(event.clone()).is_ok())
            .count()
    }

    /// Answer one connection directly
    pub async fn send_to(&self, id: ConnectionId, event: ServerEvent) -> bool {
        match self.connections.read().await.get(&id) {
            Some(conn) => conn.outbound.send(event).is_ok(),
            None => {
                debug!(connection = id, event = event.event_name(), "Connection gone, dropping reply");
                false
            }
        }
    }

    pub async fn current_broadcast(&self) -> Option<Broadcast> {
        self.broadcast.read().await.clone()
    }

    /// Replace (`Some`) or clear (`None`) the broadcast and announce it to every session
    pub async fn set_broadcast(&self, broadcast: Option<Broadcast>) -> usize {
        let event = {
            let mut current = self.broadcast.write().await;
            *current = broadcast;
            ServerEvent::CurrentBroadcast(current.clone())
        };
        self.dispatch_all(&event).await
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Channels a connection is subscribed to, `None` if unknown
    pub async fn subscriptions(&self, id: ConnectionId) -> Option<HashSet<Channel>> {
        self.connections
            .read()
            .await
            .get(&id)
            .map(|conn| conn.channels.clone())
    }
}
