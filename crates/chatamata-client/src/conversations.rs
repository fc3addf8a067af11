//! Conversation list synchronization.
//!
//! Keeps the signed-in identity's conversation previews sorted by latest
//! activity, patched in place from realtime events where possible and
//! refetched wholesale where the client has nothing to patch (being added
//! to a new conversation, profile changes).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use chatamata_gateway::{ChangeFilter, ChannelEvent, Gateway, RealtimeHandle, SubscriptionSpec};
use chatamata_shared::events::{ChangeEvent, MessageChange};
use chatamata_shared::models::ConversationPreview;
use chatamata_shared::types::{ConversationId, UserId};

use crate::error::Result;
use crate::notify::Notifier;

/// Outcome of an in-place patch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListPatch {
    Patched,
    /// No preview exists for the conversation; the caller refetches.
    Missing,
}

/// The preview list itself. Pure state: every mutation keeps the list
/// sorted by latest activity descending, and unread counts only ever
/// increment by one or drop to exactly zero.
#[derive(Debug, Default)]
pub struct ConversationList {
    previews: Vec<ConversationPreview>,
    loaded: bool,
}

impl ConversationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the first full fetch has completed (so consumers can skip
    /// loading placeholders on subsequent updates).
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn previews(&self) -> &[ConversationPreview] {
        &self.previews
    }

    /// Install a freshly fetched list.
    pub fn set_all(&mut self, previews: Vec<ConversationPreview>) {
        self.previews = previews;
        self.resort();
        self.loaded = true;
    }

    /// Patch the matching preview for a newly inserted message: latest
    /// content and timestamp move in place, the unread counter grows by
    /// one unless the message is self-authored, and the conversation moves
    /// to the front via the sort invariant.
    pub fn apply_message(&mut self, change: &MessageChange, self_id: UserId) -> ListPatch {
        let Some(preview) = self
            .previews
            .iter_mut()
            .find(|p| p.conversation_id == change.conversation_id)
        else {
            return ListPatch::Missing;
        };

        preview.latest_message_content = change.content.clone();
        preview.latest_message_at = Some(change.created_at);
        if change.sender_id != self_id {
            preview.unread_count += 1;
        }
        self.resort();
        ListPatch::Patched
    }

    /// Zero the unread counter for a conversation after a read event.
    pub fn apply_read(&mut self, conversation_id: ConversationId) -> bool {
        match self
            .previews
            .iter_mut()
            .find(|p| p.conversation_id == conversation_id)
        {
            Some(preview) => {
                preview.unread_count = 0;
                true
            }
            None => false,
        }
    }

    /// Case-insensitive filter over display names and latest message
    /// content. Purely client-side.
    pub fn search(&self, query: &str) -> Vec<ConversationPreview> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return self.previews.clone();
        }
        self.previews
            .iter()
            .filter(|p| {
                let name_hit = p
                    .display_name
                    .as_deref()
                    .is_some_and(|n| n.to_lowercase().contains(&query));
                let content_hit = p
                    .latest_message_content
                    .as_deref()
                    .is_some_and(|c| c.to_lowercase().contains(&query));
                name_hit || content_hit
            })
            .cloned()
            .collect()
    }

    // Latest activity first; conversations with no messages yet sink to
    // the bottom.
    fn resort(&mut self) {
        self.previews
            .sort_by(|a, b| b.latest_message_at.cmp(&a.latest_message_at));
    }
}

/// Keeps a [`ConversationList`] current against the gateway.
pub struct ConversationListSync {
    gateway: Arc<Gateway>,
    notifier: Notifier,
    self_id: UserId,
    state: Arc<Mutex<ConversationList>>,
    loading: Arc<AtomicBool>,
    ingest: Option<JoinHandle<()>>,
}

impl ConversationListSync {
    pub fn new(gateway: Arc<Gateway>, notifier: Notifier, self_id: UserId) -> Self {
        Self {
            gateway,
            notifier,
            self_id,
            state: Arc::new(Mutex::new(ConversationList::new())),
            loading: Arc::new(AtomicBool::new(false)),
            ingest: None,
        }
    }

    /// Fetch the full preview list via the aggregation procedure.
    pub async fn fetch_all(&self) -> Result<()> {
        self.loading.store(true, Ordering::SeqCst);
        let result = Self::refetch(&self.gateway, &self.state, &self.notifier).await;
        self.loading.store(false, Ordering::SeqCst);
        result
    }

    async fn refetch(
        gateway: &Gateway,
        state: &Mutex<ConversationList>,
        notifier: &Notifier,
    ) -> Result<()> {
        match gateway.user_conversations().await {
            Ok(previews) => {
                debug!(count = previews.len(), "Fetched conversation previews");
                if let Ok(mut list) = state.lock() {
                    list.set_all(previews);
                }
                Ok(())
            }
            Err(e) => {
                notifier.error("Error", format!("Failed to fetch conversations: {e}"));
                Err(e.into())
            }
        }
    }

    /// Fetch the list and start consuming realtime events. Patches are
    /// applied in place for known conversations; a participant insert
    /// naming this identity or any profile update triggers a wholesale
    /// refetch.
    pub async fn start(&mut self, realtime: &RealtimeHandle) -> Result<()> {
        // Surface fetch failures as a notice but still subscribe; the next
        // event-driven refetch can recover the list.
        let _ = self.fetch_all().await;

        let spec = SubscriptionSpec {
            topic: format!("conversations:{}", self.self_id),
            changes: vec![
                ChangeFilter::insert("messages"),
                ChangeFilter::insert("message_read_statuses"),
                ChangeFilter::insert("participants"),
                ChangeFilter::update("profiles"),
            ],
            presence_key: None,
        };
        let mut subscription = realtime.subscribe(spec).await?;
        info!(user = %self.self_id, "Conversation list subscribed");

        let gateway = self.gateway.clone();
        let notifier = self.notifier.clone();
        let state = self.state.clone();
        let self_id = self.self_id;

        self.ingest = Some(tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                match event {
                    ChannelEvent::Change(ChangeEvent::MessageInserted(change)) => {
                        let patch = match state.lock() {
                            Ok(mut list) => list.apply_message(&change, self_id),
                            Err(_) => continue,
                        };
                        if patch == ListPatch::Missing {
                            debug!(
                                conversation = %change.conversation_id,
                                "Message for unknown conversation, refetching list"
                            );
                            let _ = Self::refetch(&gateway, &state, &notifier).await;
                        }
                    }
                    ChannelEvent::Change(ChangeEvent::ReadReceiptInserted(receipt)) => {
                        // Only this identity's own acknowledgements clear
                        // its unread counter.
                        if receipt.user_id.is_some_and(|u| u != self_id) {
                            continue;
                        }
                        let Some(conversation_id) = receipt.conversation_id else {
                            continue;
                        };
                        if let Ok(mut list) = state.lock() {
                            list.apply_read(conversation_id);
                        }
                    }
                    ChannelEvent::Change(ChangeEvent::ParticipantInserted(participant)) => {
                        if participant.user_id == self_id {
                            info!(
                                conversation = %participant.conversation_id,
                                "Added to a conversation, refetching list"
                            );
                            let _ = Self::refetch(&gateway, &state, &notifier).await;
                        }
                    }
                    ChannelEvent::Change(ChangeEvent::ProfileUpdated(_)) => {
                        // Display names/avatars in previews may be stale.
                        let _ = Self::refetch(&gateway, &state, &notifier).await;
                    }
                    ChannelEvent::Closed => {
                        error!("Conversation list feed closed");
                        break;
                    }
                    _ => {}
                }
            }
            debug!("Conversation list ingest loop ended");
        }));

        Ok(())
    }

    /// Snapshot of the current previews, sorted by latest activity.
    pub fn conversations(&self) -> Vec<ConversationPreview> {
        self.state
            .lock()
            .map(|list| list.previews().to_vec())
            .unwrap_or_default()
    }

    /// Client-side search over the loaded list.
    pub fn search(&self, query: &str) -> Vec<ConversationPreview> {
        self.state
            .lock()
            .map(|list| list.search(query))
            .unwrap_or_default()
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().map(|l| l.is_loaded()).unwrap_or(false)
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

impl Drop for ConversationListSync {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn preview(id: i64, name: &str, at: Option<i64>) -> ConversationPreview {
        ConversationPreview {
            conversation_id: ConversationId(id),
            is_group: false,
            display_name: Some(name.to_string()),
            display_avatar: None,
            other_user_id: Some(UserId(Uuid::new_v4())),
            latest_message_content: Some("hello there".to_string()),
            latest_message_at: at.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
            unread_count: 0,
        }
    }

    fn message(conversation: i64, sender: UserId, at: i64) -> MessageChange {
        MessageChange {
            id: chatamata_shared::types::MessageId(1),
            conversation_id: ConversationId(conversation),
            sender_id: sender,
            content: Some("newest".to_string()),
            image_url: None,
            created_at: Utc.timestamp_opt(at, 0).unwrap(),
        }
    }

    #[test]
    fn test_set_all_sorts_by_latest_activity() {
        let mut list = ConversationList::new();
        list.set_all(vec![
            preview(1, "old", Some(100)),
            preview(2, "new", Some(300)),
            preview(3, "empty", None),
            preview(4, "mid", Some(200)),
        ]);
        let ids: Vec<i64> = list.previews().iter().map(|p| p.conversation_id.0).collect();
        assert_eq!(ids, vec![2, 4, 1, 3]);
        assert!(list.is_loaded());
    }

    #[test]
    fn test_patch_moves_conversation_to_front_and_counts_unread() {
        let other = UserId(Uuid::new_v4());
        let me = UserId(Uuid::new_v4());
        let mut list = ConversationList::new();
        list.set_all(vec![preview(1, "a", Some(300)), preview(2, "b", Some(100))]);

        assert_eq!(list.apply_message(&message(2, other, 400), me), ListPatch::Patched);

        let front = &list.previews()[0];
        assert_eq!(front.conversation_id, ConversationId(2));
        assert_eq!(front.unread_count, 1);
        assert_eq!(front.latest_message_content.as_deref(), Some("newest"));
    }

    #[test]
    fn test_self_authored_message_does_not_increment_unread() {
        let me = UserId(Uuid::new_v4());
        let mut list = ConversationList::new();
        list.set_all(vec![preview(1, "a", Some(100))]);
        list.apply_message(&message(1, me, 200), me);
        assert_eq!(list.previews()[0].unread_count, 0);
    }

    #[test]
    fn test_read_event_zeroes_unread() {
        let other = UserId(Uuid::new_v4());
        let me = UserId(Uuid::new_v4());
        let mut list = ConversationList::new();
        list.set_all(vec![preview(1, "a", Some(100))]);
        list.apply_message(&message(1, other, 200), me);
        list.apply_message(&message(1, other, 300), me);
        assert_eq!(list.previews()[0].unread_count, 2);

        assert!(list.apply_read(ConversationId(1)));
        assert_eq!(list.previews()[0].unread_count, 0);
    }

    #[test]
    fn test_unknown_conversation_reports_missing() {
        let me = UserId(Uuid::new_v4());
        let mut list = ConversationList::new();
        list.set_all(vec![preview(1, "a", Some(100))]);
        assert_eq!(
            list.apply_message(&message(99, me, 200), me),
            ListPatch::Missing
        );
    }

    #[test]
    fn test_search_matches_name_and_content_case_insensitively() {
        let mut list = ConversationList::new();
        let mut p = preview(1, "Nika", Some(100));
        p.latest_message_content = Some("See you TOMORROW".to_string());
        list.set_all(vec![p, preview(2, "Ann", Some(200))]);

        assert_eq!(list.search("nik").len(), 1);
        assert_eq!(list.search("tomorrow").len(), 1);
        assert_eq!(list.search("  ").len(), 2);
        assert!(list.search("zebra").is_empty());
    }
}
