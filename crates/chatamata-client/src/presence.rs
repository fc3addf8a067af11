//! Presence tracking over the shared online-users channel.
//!
//! One channel instance exists per authenticated session. After the join
//! is acknowledged the tracker publishes its own liveness metadata; sync
//! events replace the whole online set, join/leave events adjust single
//! identities. Nothing is persisted: the set is rebuilt from channel
//! membership every session.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use chatamata_gateway::{ChannelEvent, RealtimeHandle, SubscriptionSpec};
use chatamata_shared::constants::PRESENCE_TOPIC;
use chatamata_shared::types::UserId;

use crate::error::Result;

/// The set of currently-online identities.
#[derive(Debug, Clone, Default)]
pub struct OnlineSet {
    online: HashSet<UserId>,
}

impl OnlineSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the full membership (a sync event).
    pub fn replace_all(&mut self, users: impl IntoIterator<Item = UserId>) {
        self.online = users.into_iter().collect();
    }

    pub fn join(&mut self, user: UserId) {
        self.online.insert(user);
    }

    pub fn leave(&mut self, user: &UserId) {
        self.online.remove(user);
    }

    pub fn is_online(&self, user: &UserId) -> bool {
        self.online.contains(user)
    }

    pub fn len(&self) -> usize {
        self.online.len()
    }

    pub fn is_empty(&self) -> bool {
        self.online.is_empty()
    }

    pub fn snapshot(&self) -> HashSet<UserId> {
        self.online.clone()
    }
}

/// Presence keys on the wire are the identity ids the clients joined with.
fn parse_key(key: &str) -> Option<UserId> {
    Uuid::parse_str(key).ok().map(UserId)
}

/// Tracks which identities are currently connected.
pub struct PresenceTracker {
    online: Arc<Mutex<OnlineSet>>,
    task: JoinHandle<()>,
}

impl PresenceTracker {
    /// Join the shared presence channel keyed by the signed-in identity and
    /// start tracking. Call once per session; [`PresenceTracker::stop`]
    /// tears the channel down on sign-out.
    pub async fn start(realtime: &RealtimeHandle, user: UserId) -> Result<Self> {
        let spec = SubscriptionSpec {
            topic: PRESENCE_TOPIC.to_string(),
            changes: Vec::new(),
            presence_key: Some(user.to_string()),
        };
        let mut subscription = realtime.subscribe(spec).await?;
        info!(user = %user, "Joined presence channel");

        let online = Arc::new(Mutex::new(OnlineSet::new()));
        let online_task = online.clone();
        let handle = realtime.clone();

        let task = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                match event {
                    ChannelEvent::Joined => {
                        // Announce ourselves once the join is acknowledged.
                        let meta = json!({ "online_at": Utc::now() });
                        if let Err(e) = handle.track(PRESENCE_TOPIC, meta).await {
                            tracing::error!(error = %e, "Presence track failed");
                        }
                    }
                    ChannelEvent::PresenceSync(keys) => {
                        let users = keys.iter().filter_map(|k| parse_key(k));
                        if let Ok(mut set) = online_task.lock() {
                            set.replace_all(users);
                            debug!(online = set.len(), "Presence sync");
                        }
                    }
                    ChannelEvent::PresenceJoin(key) => {
                        if let Some(user) = parse_key(&key) {
                            if let Ok(mut set) = online_task.lock() {
                                set.join(user);
                            }
                        }
                    }
                    ChannelEvent::PresenceLeave(key) => {
                        if let Some(user) = parse_key(&key) {
                            if let Ok(mut set) = online_task.lock() {
                                set.leave(&user);
                            }
                        }
                    }
                    ChannelEvent::Closed => break,
                    ChannelEvent::Change(_) => {}
                }
            }
            debug!("Presence loop ended");
        });

        Ok(Self { online, task })
    }

    pub fn online_users(&self) -> HashSet<UserId> {
        self.online
            .lock()
            .map(|set| set.snapshot())
            .unwrap_or_default()
    }

    pub fn is_online(&self, user: &UserId) -> bool {
        self.online
            .lock()
            .map(|set| set.is_online(user))
            .unwrap_or(false)
    }

    /// Leave the channel and stop tracking.
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for PresenceTracker {
    fn drop(&mut self) {
        self.task.abort();
    }
}
