//! Friendship synchronization.
//!
//! Exposes the three relationship views (accepted, incoming pending,
//! outgoing pending) plus search/request/respond actions. Reconciliation
//! is deliberately coarse: every change event and every successful action
//! refetches all three lists wholesale, which is fine at friendship-change
//! frequency.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use chatamata_gateway::{ChangeFilter, ChannelEvent, Gateway, RealtimeHandle, SubscriptionSpec};
use chatamata_shared::constants::FRIEND_SEARCH_LIMIT;
use chatamata_shared::events::ChangeEvent;
use chatamata_shared::models::{Friendship, FriendshipRow, Profile};
use chatamata_shared::types::{FriendResponse, FriendStatus, UserId};

use crate::error::Result;
use crate::notify::Notifier;

/// The three relationship views.
#[derive(Debug, Clone, Default)]
pub struct FriendLists {
    /// Accepted friends.
    pub friends: Vec<Profile>,
    /// Pending requests sent to the current identity.
    pub incoming: Vec<Friendship>,
    /// Pending requests the current identity sent.
    pub outgoing: Vec<Friendship>,
}

/// Partition raw friendship rows into the three views by inspecting which
/// side is the current identity and who initiated the request. Rejected
/// and blocked rows are terminal and not displayed.
pub fn partition_friendships(rows: Vec<FriendshipRow>, self_id: UserId) -> FriendLists {
    let mut lists = FriendLists::default();

    for row in rows {
        let friend = if row.user_one.id == self_id {
            row.user_two
        } else if row.user_two.id == self_id {
            row.user_one
        } else {
            warn!(friendship = %row.id, "Friendship row does not name the current identity");
            continue;
        };

        let is_requester = row.action_user_id == self_id;

        match row.status {
            FriendStatus::Accepted => lists.friends.push(friend),
            FriendStatus::Pending => {
                let friendship = Friendship {
                    id: row.id,
                    friend,
                    status: row.status,
                    is_requester,
                };
                if is_requester {
                    lists.outgoing.push(friendship);
                } else {
                    lists.incoming.push(friendship);
                }
            }
            FriendStatus::Rejected | FriendStatus::Blocked => {}
        }
    }

    lists
}

/// Empty or whitespace-only queries never reach the gateway.
fn normalized_query(query: &str) -> Option<String> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Keeps the [`FriendLists`] current against the gateway.
pub struct FriendshipSync {
    gateway: Arc<Gateway>,
    notifier: Notifier,
    self_id: UserId,
    state: Arc<Mutex<FriendLists>>,
    loading: Arc<AtomicBool>,
    ingest: Option<JoinHandle<()>>,
}

impl FriendshipSync {
    pub fn new(gateway: Arc<Gateway>, notifier: Notifier, self_id: UserId) -> Self {
        Self {
            gateway,
            notifier,
            self_id,
            state: Arc::new(Mutex::new(FriendLists::default())),
            loading: Arc::new(AtomicBool::new(false)),
            ingest: None,
        }
    }

    async fn refetch(
        gateway: &Gateway,
        self_id: UserId,
        state: &Mutex<FriendLists>,
    ) -> Result<()> {
        let rows = gateway.friendship_rows(self_id).await?;
        let lists = partition_friendships(rows, self_id);
        debug!(
            friends = lists.friends.len(),
            incoming = lists.incoming.len(),
            outgoing = lists.outgoing.len(),
            "Fetched friendships"
        );
        if let Ok(mut guard) = state.lock() {
            *guard = lists;
        }
        Ok(())
    }

    /// Fetch and partition all friendship rows.
    pub async fn fetch_all(&self) -> Result<()> {
        self.loading.store(true, Ordering::SeqCst);
        let result = Self::refetch(&self.gateway, self.self_id, &self.state).await;
        self.loading.store(false, Ordering::SeqCst);
        if let Err(ref e) = result {
            self.notifier
                .error("Error", format!("Failed to fetch friends: {e}"));
        }
        result
    }

    /// Fetch the lists and refetch wholesale on any friendship change.
    pub async fn start(&mut self, realtime: &RealtimeHandle) -> Result<()> {
        let _ = self.fetch_all().await;

        let spec = SubscriptionSpec {
            topic: format!("friendships:{}", self.self_id),
            changes: vec![ChangeFilter::all("friendships")],
            presence_key: None,
        };
        let mut subscription = realtime.subscribe(spec).await?;
        info!(user = %self.self_id, "Friendship feed subscribed");

        let gateway = self.gateway.clone();
        let notifier = self.notifier.clone();
        let state = self.state.clone();
        let self_id = self.self_id;

        self.ingest = Some(tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                match event {
                    ChannelEvent::Change(ChangeEvent::FriendshipChanged) => {
                        notifier.info(
                            "Friends Update",
                            "Your friends list or requests have been updated.",
                        );
                        if let Err(e) = Self::refetch(&gateway, self_id, &state).await {
                            warn!(error = %e, "Friendship refetch failed");
                        }
                    }
                    ChannelEvent::Closed => break,
                    _ => {}
                }
            }
            debug!("Friendship ingest loop ended");
        }));

        Ok(())
    }

    /// Remote substring search on username, excluding the current identity,
    /// capped at a fixed result count.
    pub async fn search(&self, query: &str) -> Result<Vec<Profile>> {
        let Some(query) = normalized_query(query) else {
            return Ok(Vec::new());
        };
        match self
            .gateway
            .search_profiles(&query, self.self_id, FRIEND_SEARCH_LIMIT)
            .await
        {
            Ok(profiles) => Ok(profiles),
            Err(e) => {
                self.notifier.error("Search Error", e.to_string());
                Err(e.into())
            }
        }
    }

    pub async fn send_request(&self, receiver: UserId) -> Result<()> {
        match self.gateway.send_friend_request(receiver).await {
            Ok(()) => {
                self.notifier.success("Success", "Friend request sent!");
                self.fetch_all().await
            }
            Err(e) => {
                self.notifier
                    .error("Error", format!("Failed to send request: {e}"));
                Err(e.into())
            }
        }
    }

    pub async fn respond(&self, sender: UserId, response: FriendResponse) -> Result<()> {
        match self.gateway.respond_to_friend_request(sender, response).await {
            Ok(()) => {
                let body = match response {
                    FriendResponse::Accepted => "Request accepted!",
                    FriendResponse::Rejected => "Request rejected!",
                };
                self.notifier.success("Success", body);
                self.fetch_all().await
            }
            Err(e) => {
                self.notifier
                    .error("Error", format!("Failed to respond: {e}"));
                Err(e.into())
            }
        }
    }

    /// Snapshot of all three views.
    pub fn lists(&self) -> FriendLists {
        self.state.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.ingest.take() {
            task.abort();
        }
    }
}

impl Drop for FriendshipSync {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatamata_shared::types::FriendshipId;
    use uuid::Uuid;

    fn profile(id: UserId, name: &str) -> Profile {
        Profile {
            id,
            username: Some(name.to_string()),
            full_name: None,
            avatar_url: None,
            banner_url: None,
            description: None,
            chatamata_id: None,
            plan: Default::default(),
            joined_at: None,
            updated_at: None,
            profile_setup_complete: true,
        }
    }

    fn row(
        id: i64,
        status: FriendStatus,
        one: UserId,
        two: UserId,
        action: UserId,
    ) -> FriendshipRow {
        FriendshipRow {
            id: FriendshipId(id),
            status,
            action_user_id: action,
            user_one: profile(one, "one"),
            user_two: profile(two, "two"),
        }
    }

    #[test]
    fn test_partition_directions_and_statuses() {
        let me = UserId(Uuid::new_v4());
        let (a, b, c, d) = (
            UserId(Uuid::new_v4()),
            UserId(Uuid::new_v4()),
            UserId(Uuid::new_v4()),
            UserId(Uuid::new_v4()),
        );

        let rows = vec![
            row(1, FriendStatus::Accepted, me, a, me),
            // b asked me: incoming.
            row(2, FriendStatus::Pending, b, me, b),
            // I asked c: outgoing.
            row(3, FriendStatus::Pending, me, c, me),
            row(4, FriendStatus::Blocked, me, d, d),
        ];

        let lists = partition_friendships(rows, me);
        assert_eq!(lists.friends.len(), 1);
        assert_eq!(lists.friends[0].id, a);

        assert_eq!(lists.incoming.len(), 1);
        assert_eq!(lists.incoming[0].friend.id, b);
        assert!(!lists.incoming[0].is_requester);

        assert_eq!(lists.outgoing.len(), 1);
        assert_eq!(lists.outgoing[0].friend.id, c);
        assert!(lists.outgoing[0].is_requester);
    }

    #[test]
    fn test_partition_skips_foreign_rows() {
        let me = UserId(Uuid::new_v4());
        let (x, y) = (UserId(Uuid::new_v4()), UserId(Uuid::new_v4()));
        let lists = partition_friendships(vec![row(1, FriendStatus::Accepted, x, y, x)], me);
        assert!(lists.friends.is_empty());
        assert!(lists.incoming.is_empty());
        assert!(lists.outgoing.is_empty());
    }

    #[test]
    fn test_empty_search_queries_are_rejected_locally() {
        assert!(normalized_query("").is_none());
        assert!(normalized_query("   ").is_none());
        assert_eq!(normalized_query(" nik ").as_deref(), Some("nik"));
    }
}
