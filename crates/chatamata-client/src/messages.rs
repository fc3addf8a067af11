//! Message thread synchronization.
//!
//! One [`MessageThreadSync`] exists per open conversation. It keeps an
//! ordered, deduplicated view of that conversation's messages: backward
//! pagination, optimistic sends with retry, soft deletes, and merges of
//! realtime inserts and read receipts.
//!
//! The state itself lives in [`MessageThread`], a plain struct with no I/O,
//! so the reconciliation rules are testable without a gateway.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, error, info};

use chatamata_gateway::storage::chat_image_path;
use chatamata_gateway::{ChangeFilter, ChannelEvent, Gateway, RealtimeHandle, SubscriptionSpec};
use chatamata_shared::constants::{BUCKET_CHAT_IMAGES, MAX_UPLOAD_BYTES, MESSAGES_PER_PAGE};
use chatamata_shared::events::ChangeEvent;
use chatamata_shared::models::{AuthUser, Message, NewMessage, Profile};
use chatamata_shared::types::{ConversationId, MessageId, MessageStatus};

use crate::error::{ClientError, Result};
use crate::notify::Notifier;

// ---------------------------------------------------------------------------
// Pure thread state
// ---------------------------------------------------------------------------

/// Ordered message state for one conversation.
///
/// Messages are kept oldest-first for display. Placeholders created for
/// optimistic sends carry negative transient ids and are replaced (never
/// duplicated) by their confirmed rows; deleted messages are removed from
/// the view for the rest of the session regardless of the remote outcome.
#[derive(Debug)]
pub struct MessageThread {
    conversation_id: ConversationId,
    messages: Vec<Message>,
    page: u32,
    has_more: bool,
    next_local_id: i64,
}

impl MessageThread {
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            messages: Vec::new(),
            page: 0,
            has_more: true,
            next_local_id: -1,
        }
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    /// Oldest-first view.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    /// Install the most recent page (fetched newest-first) and reset the
    /// pagination cursor. A short page means history is exhausted.
    pub fn set_initial(&mut self, newest_first: Vec<Message>) {
        self.has_more = newest_first.len() as u32 == MESSAGES_PER_PAGE;
        self.page = 0;
        self.messages = newest_first.into_iter().rev().collect();
    }

    /// Prepend the next-older page (fetched newest-first).
    pub fn prepend_page(&mut self, newest_first: Vec<Message>) {
        self.has_more = newest_first.len() as u32 == MESSAGES_PER_PAGE;
        self.page += 1;
        let mut merged: Vec<Message> = newest_first.into_iter().rev().collect();
        merged.append(&mut self.messages);
        self.messages = merged;
    }

    /// Append an optimistic placeholder and return its transient id.
    pub fn push_placeholder(
        &mut self,
        content: Option<String>,
        image_url: Option<String>,
        sender: Profile,
    ) -> MessageId {
        let id = MessageId(self.next_local_id);
        self.next_local_id -= 1;
        self.messages.push(Message {
            id,
            conversation_id: self.conversation_id,
            sender_id: sender.id,
            content,
            image_url,
            created_at: Utc::now(),
            deleted_at: None,
            read_at: None,
            sender,
            status: MessageStatus::Sending,
        });
        id
    }

    pub fn placeholder(&self, id: MessageId) -> Option<&Message> {
        if !id.is_local() {
            return None;
        }
        self.messages.iter().find(|m| m.id == id)
    }

    /// Flip a failed placeholder back to `Sending` for a retry. The
    /// transient id is reused; no new placeholder appears.
    pub fn mark_retrying(&mut self, id: MessageId) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(m) => {
                m.status = MessageStatus::Sending;
                true
            }
            None => false,
        }
    }

    /// Replace the placeholder with its confirmed row. If the realtime echo
    /// already delivered the confirmed id, the placeholder is dropped
    /// instead so the message never appears twice.
    pub fn confirm(&mut self, local_id: MessageId, mut confirmed: Message) -> bool {
        confirmed.status = MessageStatus::Success;
        if self.messages.iter().any(|m| m.id == confirmed.id) {
            let before = self.messages.len();
            self.messages.retain(|m| m.id != local_id);
            return self.messages.len() != before;
        }
        match self.messages.iter_mut().find(|m| m.id == local_id) {
            Some(slot) => {
                *slot = confirmed;
                true
            }
            None => false,
        }
    }

    pub fn mark_failed(&mut self, id: MessageId) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(m) => {
                m.status = MessageStatus::Error;
                true
            }
            None => false,
        }
    }

    /// Remove a message from the view (optimistic delete).
    pub fn remove(&mut self, id: MessageId) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != id);
        self.messages.len() != before
    }

    /// Append an incoming row unless it is already present by id.
    pub fn merge_incoming(&mut self, mut message: Message) -> bool {
        if self.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        message.status = MessageStatus::Success;
        self.messages.push(message);
        true
    }

    /// Patch a message's read timestamp from a read receipt.
    pub fn apply_read(&mut self, id: MessageId, read_at: chrono::DateTime<Utc>) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(m) => {
                m.read_at = Some(read_at);
                true
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Synchronizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum PageKind {
    Initial,
    Older,
}

/// Keeps a [`MessageThread`] current against the gateway for one open
/// conversation. Dropping the synchronizer tears down its realtime
/// subscription; opening another conversation means opening another
/// synchronizer.
pub struct MessageThreadSync {
    gateway: Arc<Gateway>,
    notifier: Notifier,
    user: AuthUser,
    conversation_id: ConversationId,
    state: Arc<Mutex<MessageThread>>,
    loading: Arc<AtomicBool>,
    loading_more: Arc<AtomicBool>,
    error: Arc<Mutex<Option<String>>>,
    // Bumped by every (re)load; fetches apply their results only while the
    // generation still matches, so a superseded fetch cannot clobber newer
    // state.
    generation: Arc<AtomicU64>,
    ingest: Option<tokio::task::JoinHandle<()>>,
}

impl MessageThreadSync {
    /// Open a conversation: load the initial page, mark it read, and start
    /// ingesting realtime events on a fresh uniquely-named topic.
    pub async fn open(
        gateway: Arc<Gateway>,
        realtime: &RealtimeHandle,
        notifier: Notifier,
        user: AuthUser,
        conversation_id: ConversationId,
    ) -> Result<Self> {
        let mut sync = Self {
            gateway,
            notifier,
            user,
            conversation_id,
            state: Arc::new(Mutex::new(MessageThread::new(conversation_id))),
            loading: Arc::new(AtomicBool::new(false)),
            loading_more: Arc::new(AtomicBool::new(false)),
            error: Arc::new(Mutex::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
            ingest: None,
        };

        // Fetch failures set the error flag and notice; the subscription is
        // still established so the thread can fill in from events.
        sync.load_initial().await;

        let topic = conversation_id.thread_topic(&sync.user.id, Utc::now().timestamp_millis());
        let spec = SubscriptionSpec {
            topic,
            changes: vec![
                ChangeFilter::insert("messages")
                    .with_filter(format!("conversation_id=eq.{conversation_id}")),
                ChangeFilter::insert("message_read_statuses"),
            ],
            presence_key: None,
        };
        let mut subscription = realtime.subscribe(spec).await?;
        info!(conversation = %conversation_id, "Message thread subscribed");

        let gateway = sync.gateway.clone();
        let state = sync.state.clone();
        let self_id = sync.user.id;

        sync.ingest = Some(tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                match event {
                    ChannelEvent::Change(ChangeEvent::MessageInserted(change)) => {
                        if change.conversation_id != conversation_id {
                            continue;
                        }
                        // Self-authored inserts are already represented by
                        // the optimistic entry; suppressing the echo avoids
                        // depending on event ordering.
                        if change.sender_id == self_id {
                            continue;
                        }
                        match gateway.message_with_sender(change.id).await {
                            Ok(full) => {
                                let added = match state.lock() {
                                    Ok(mut thread) => thread.merge_incoming(full),
                                    Err(_) => continue,
                                };
                                if added {
                                    if let Err(e) =
                                        gateway.mark_messages_as_read(conversation_id).await
                                    {
                                        error!(error = %e, "Failed to mark messages as read");
                                    }
                                }
                            }
                            Err(e) => {
                                error!(
                                    message = %change.id,
                                    error = %e,
                                    "Failed to fetch incoming message"
                                );
                            }
                        }
                    }
                    ChannelEvent::Change(ChangeEvent::ReadReceiptInserted(receipt)) => {
                        if let Ok(mut thread) = state.lock() {
                            thread.apply_read(receipt.message_id, receipt.read_at);
                        }
                    }
                    ChannelEvent::Closed => {
                        debug!(conversation = %conversation_id, "Message feed closed");
                        break;
                    }
                    _ => {}
                }
            }
            debug!(conversation = %conversation_id, "Message ingest loop ended");
        }));

        Ok(sync)
    }

    /// Fetch the most recent page and reset pagination. Errors set the
    /// error flag and surface a single notice; there is no automatic retry.
    pub async fn load_initial(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.loading.store(true, Ordering::SeqCst);
        if let Ok(mut e) = self.error.lock() {
            *e = None;
        }

        match self
            .gateway
            .messages_page(self.conversation_id, 0, MESSAGES_PER_PAGE)
            .await
        {
            Ok(rows) => {
                if self.apply_page_if_current(generation, rows, PageKind::Initial) {
                    self.mark_as_read().await;
                }
            }
            Err(e) => {
                error!(conversation = %self.conversation_id, error = %e, "Initial load failed");
                if let Ok(mut slot) = self.error.lock() {
                    *slot = Some(e.to_string());
                }
                self.notifier.error("Error", "Failed to load messages.");
            }
        }

        self.loading.store(false, Ordering::SeqCst);
    }

    /// Fetch the next-older page. Guarded against concurrent fetches and
    /// no-ops once history is exhausted.
    pub async fn load_older(&self) {
        if self.loading_more.swap(true, Ordering::SeqCst) {
            return;
        }
        let (has_more, page) = match self.state.lock() {
            Ok(thread) => (thread.has_more(), thread.page()),
            Err(_) => (false, 0),
        };
        if !has_more {
            self.loading_more.store(false, Ordering::SeqCst);
            return;
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let offset = (page + 1) * MESSAGES_PER_PAGE;

        match self
            .gateway
            .messages_page(self.conversation_id, offset, MESSAGES_PER_PAGE)
            .await
        {
            Ok(rows) => {
                self.apply_page_if_current(generation, rows, PageKind::Older);
            }
            Err(e) => {
                error!(conversation = %self.conversation_id, error = %e, "Load older failed");
                if let Ok(mut slot) = self.error.lock() {
                    *slot = Some(e.to_string());
                }
            }
        }

        self.loading_more.store(false, Ordering::SeqCst);
    }

    /// Send a text message optimistically. The placeholder appears with
    /// status `Sending` before the remote call resolves and is replaced by
    /// the confirmed row, matched by its transient id.
    pub async fn send_text(&self, content: &str) -> Result<MessageId> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(ClientError::Validation("message is empty".into()));
        }

        let local_id = match self.state.lock() {
            Ok(mut thread) => thread.push_placeholder(
                Some(trimmed.to_string()),
                None,
                Profile::from_auth_user(&self.user),
            ),
            Err(_) => return Err(ClientError::Validation("thread state poisoned".into())),
        };

        let new = NewMessage {
            conversation_id: self.conversation_id,
            content: Some(trimmed.to_string()),
            image_url: None,
        };
        self.submit(local_id, new, "Message failed to send.").await;
        Ok(local_id)
    }

    /// Retry a failed text send, reusing the same transient id.
    pub async fn retry_send(&self, local_id: MessageId) -> Result<()> {
        let content = {
            let thread = self
                .state
                .lock()
                .map_err(|_| ClientError::Validation("thread state poisoned".into()))?;
            match thread.placeholder(local_id) {
                Some(m) if m.image_url.is_none() => m.content.clone(),
                Some(_) => {
                    return Err(ClientError::Validation(
                        "image sends cannot be retried".into(),
                    ))
                }
                None => {
                    return Err(ClientError::Validation("no such pending message".into()));
                }
            }
        };

        if let Ok(mut thread) = self.state.lock() {
            thread.mark_retrying(local_id);
        }
        let new = NewMessage {
            conversation_id: self.conversation_id,
            content,
            image_url: None,
        };
        self.submit(local_id, new, "Message failed to send.").await;
        Ok(())
    }

    /// Send an image optimistically: upload to conversation-scoped storage,
    /// then insert a row referencing the public URL. `local_preview` is
    /// shown in the placeholder until the confirmed row replaces it.
    pub async fn send_image(
        &self,
        file_name: &str,
        bytes: Bytes,
        content_type: &str,
        local_preview: Option<String>,
    ) -> Result<MessageId> {
        if bytes.is_empty() {
            return Err(ClientError::Validation("image is empty".into()));
        }
        if bytes.len() > MAX_UPLOAD_BYTES {
            let body = format!(
                "The uploaded image should be less than {}MB.",
                MAX_UPLOAD_BYTES / (1024 * 1024)
            );
            self.notifier.error("File Size Error", body.clone());
            return Err(ClientError::Validation(body));
        }

        let local_id = match self.state.lock() {
            Ok(mut thread) => {
                thread.push_placeholder(None, local_preview, Profile::from_auth_user(&self.user))
            }
            Err(_) => return Err(ClientError::Validation("thread state poisoned".into())),
        };

        let path = chat_image_path(
            self.conversation_id,
            Utc::now().timestamp_millis(),
            file_name,
        );
        if let Err(e) = self
            .gateway
            .upload(BUCKET_CHAT_IMAGES, &path, bytes, content_type, false)
            .await
        {
            error!(error = %e, "Image upload failed");
            if let Ok(mut thread) = self.state.lock() {
                thread.mark_failed(local_id);
            }
            self.notifier
                .error("Image Send Error", "Failed to send image.");
            return Ok(local_id);
        }

        let public_url = self.gateway.public_url(BUCKET_CHAT_IMAGES, &path);
        let new = NewMessage {
            conversation_id: self.conversation_id,
            content: None,
            image_url: Some(public_url),
        };
        self.submit(local_id, new, "Failed to send image.").await;
        Ok(local_id)
    }

    /// Apply a fetched page only if no newer (re)load has started since the
    /// fetch began. Late results from a superseded fetch are discarded so
    /// they cannot clobber the state a newer load installed.
    fn apply_page_if_current(
        &self,
        generation: u64,
        rows: Vec<Message>,
        kind: PageKind,
    ) -> bool {
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(
                conversation = %self.conversation_id,
                ?kind,
                "Discarding superseded page"
            );
            return false;
        }
        match self.state.lock() {
            Ok(mut thread) => {
                match kind {
                    PageKind::Initial => thread.set_initial(rows),
                    PageKind::Older => thread.prepend_page(rows),
                }
                true
            }
            Err(_) => false,
        }
    }

    async fn submit(&self, local_id: MessageId, new: NewMessage, failure_body: &str) {
        match self.gateway.insert_message(&new).await {
            Ok(row) => {
                debug!(local = %local_id, confirmed = %row.id, "Send confirmed");
                if let Ok(mut thread) = self.state.lock() {
                    thread.confirm(local_id, row);
                }
            }
            Err(e) => {
                error!(local = %local_id, error = %e, "Send failed");
                if let Ok(mut thread) = self.state.lock() {
                    thread.mark_failed(local_id);
                }
                self.notifier.error("Send Error", failure_body);
            }
        }
    }

    /// Remove a message from the view immediately, then soft-delete it
    /// remotely. A failed soft-delete surfaces a notice only; the local
    /// removal stands for the rest of the session.
    pub async fn delete(&self, id: MessageId) {
        if let Ok(mut thread) = self.state.lock() {
            thread.remove(id);
        }
        // Placeholders were never committed; nothing to delete remotely.
        if id.is_local() {
            return;
        }
        if let Err(e) = self.gateway.soft_delete_message(id).await {
            error!(message = %id, error = %e, "Soft delete failed");
            self.notifier.error("Error", "Could not delete message.");
        }
    }

    async fn mark_as_read(&self) {
        if let Err(e) = self.gateway.mark_messages_as_read(self.conversation_id).await {
            error!(
                conversation = %self.conversation_id,
                error = %e,
                "Failed to mark messages as read"
            );
        }
    }

    // -- Accessors ----------------------------------------------------------

    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    /// Snapshot of the thread, oldest-first.
    pub fn messages(&self) -> Vec<Message> {
        self.state
            .lock()
            .map(|thread| thread.messages().to_vec())
            .unwrap_or_default()
    }

    pub fn has_more(&self) -> bool {
        self.state.lock().map(|t| t.has_more()).unwrap_or(false)
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub fn is_loading_more(&self) -> bool {
        self.loading_more.load(Ordering::SeqCst)
    }

    pub fn last_error(&self) -> Option<String> {
        self.error.lock().ok().and_then(|e| e.clone())
    }

    pub fn close(&mut self) {
        if let Some(task) = self.ingest.take() {
            task.abort();
        }
    }
}

impl Drop for MessageThreadSync {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;
    use chatamata_shared::types::UserId;

    fn profile(name: &str) -> Profile {
        Profile {
            id: UserId(Uuid::new_v4()),
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

    fn server_message(id: i64, conversation: i64, at: i64) -> Message {
        Message {
            id: MessageId(id),
            conversation_id: ConversationId(conversation),
            sender_id: UserId(Uuid::new_v4()),
            content: Some(format!("message {id}")),
            image_url: None,
            created_at: Utc.timestamp_opt(at, 0).unwrap(),
            deleted_at: None,
            read_at: None,
            sender: profile("ann"),
            status: MessageStatus::Success,
        }
    }

    fn full_page(start_id: i64, conversation: i64) -> Vec<Message> {
        // Newest-first, the way the gateway returns pages.
        (0..MESSAGES_PER_PAGE as i64)
            .map(|i| server_message(start_id - i, conversation, 10_000 - i))
            .collect()
    }

    #[test]
    fn test_initial_page_is_reversed_for_display() {
        let mut thread = MessageThread::new(ConversationId(42));
        thread.set_initial(vec![
            server_message(3, 42, 300),
            server_message(2, 42, 200),
            server_message(1, 42, 100),
        ]);
        let ids: Vec<i64> = thread.messages().iter().map(|m| m.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        // Short page: history exhausted.
        assert!(!thread.has_more());
    }

    #[test]
    fn test_full_page_keeps_has_more() {
        let mut thread = MessageThread::new(ConversationId(42));
        thread.set_initial(full_page(100, 42));
        assert!(thread.has_more());

        thread.prepend_page(full_page(70, 42));
        assert!(thread.has_more());
        assert_eq!(thread.page(), 1);

        thread.prepend_page(vec![server_message(1, 42, 1)]);
        assert!(!thread.has_more());
        assert_eq!(thread.page(), 2);
    }

    #[test]
    fn test_prepend_keeps_older_messages_first() {
        let mut thread = MessageThread::new(ConversationId(42));
        thread.set_initial(vec![server_message(10, 42, 1000)]);
        thread.prepend_page(vec![server_message(5, 42, 500), server_message(4, 42, 400)]);
        let ids: Vec<i64> = thread.messages().iter().map(|m| m.id.0).collect();
        assert_eq!(ids, vec![4, 5, 10]);
    }

    #[test]
    fn test_placeholder_appears_sending_then_is_replaced() {
        let mut thread = MessageThread::new(ConversationId(42));
        let local = thread.push_placeholder(Some("hello".into()), None, profile("me"));

        assert!(local.is_local());
        assert_eq!(thread.messages().len(), 1);
        assert_eq!(thread.messages()[0].status, MessageStatus::Sending);

        let confirmed = server_message(501, 42, 900);
        assert!(thread.confirm(local, confirmed));

        // Replaced, not duplicated.
        assert_eq!(thread.messages().len(), 1);
        assert_eq!(thread.messages()[0].id, MessageId(501));
        assert_eq!(thread.messages()[0].status, MessageStatus::Success);
    }

    #[test]
    fn test_offline_send_error_retry_same_id_then_success() {
        let mut thread = MessageThread::new(ConversationId(42));
        let local = thread.push_placeholder(Some("hello".into()), None, profile("me"));

        assert!(thread.mark_failed(local));
        assert_eq!(thread.messages()[0].status, MessageStatus::Error);

        // Retry reuses the same transient id rather than a new placeholder.
        assert!(thread.mark_retrying(local));
        assert_eq!(thread.messages().len(), 1);
        assert_eq!(thread.messages()[0].id, local);
        assert_eq!(thread.messages()[0].status, MessageStatus::Sending);

        assert!(thread.confirm(local, server_message(600, 42, 901)));
        assert_eq!(thread.messages()[0].id, MessageId(600));
        assert_eq!(thread.messages()[0].status, MessageStatus::Success);
    }

    #[test]
    fn test_confirm_after_echo_drops_placeholder() {
        let mut thread = MessageThread::new(ConversationId(42));
        let local = thread.push_placeholder(Some("hello".into()), None, profile("me"));

        // The realtime echo of the same row lands before the insert call
        // returns.
        assert!(thread.merge_incoming(server_message(700, 42, 902)));
        assert!(thread.confirm(local, server_message(700, 42, 902)));

        assert_eq!(thread.messages().len(), 1);
        assert_eq!(thread.messages()[0].id, MessageId(700));
    }

    #[test]
    fn test_merge_incoming_deduplicates_by_id() {
        let mut thread = MessageThread::new(ConversationId(42));
        assert!(thread.merge_incoming(server_message(7, 42, 100)));
        assert!(!thread.merge_incoming(server_message(7, 42, 100)));
        assert_eq!(thread.messages().len(), 1);
    }

    #[test]
    fn test_remove_is_permanent_for_the_session() {
        let mut thread = MessageThread::new(ConversationId(42));
        thread.set_initial(vec![server_message(2, 42, 200), server_message(1, 42, 100)]);

        assert!(thread.remove(MessageId(2)));
        assert_eq!(thread.messages().len(), 1);

        // Even a later merge of the same id stays out only if it never
        // arrives again; removal itself does not resurrect anything.
        assert!(!thread.remove(MessageId(2)));
    }

    #[test]
    fn test_read_receipt_patches_timestamp() {
        let mut thread = MessageThread::new(ConversationId(42));
        thread.set_initial(vec![server_message(1, 42, 100)]);

        let read_at = Utc.timestamp_opt(5000, 0).unwrap();
        assert!(thread.apply_read(MessageId(1), read_at));
        assert_eq!(thread.messages()[0].read_at, Some(read_at));
        assert!(!thread.apply_read(MessageId(99), read_at));
    }

    fn offline_sync(conversation: i64) -> MessageThreadSync {
        use chatamata_gateway::GatewayConfig;
        use chatamata_shared::models::{AuthUser, UserMetadata};

        let conversation_id = ConversationId(conversation);
        MessageThreadSync {
            gateway: Arc::new(Gateway::new(GatewayConfig::default()).unwrap()),
            notifier: crate::notify::Notifier::channel(8).0,
            user: AuthUser {
                id: UserId(Uuid::new_v4()),
                email: None,
                user_metadata: UserMetadata::default(),
            },
            conversation_id,
            state: Arc::new(Mutex::new(MessageThread::new(conversation_id))),
            loading: Arc::new(AtomicBool::new(false)),
            loading_more: Arc::new(AtomicBool::new(false)),
            error: Arc::new(Mutex::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
            ingest: None,
        }
    }

    #[test]
    fn test_superseded_fetch_result_is_discarded() {
        let sync = offline_sync(42);

        // A fetch begins under the current generation...
        let stale_generation = sync.generation.fetch_add(1, Ordering::SeqCst) + 1;

        // ...then the conversation is reloaded (e.g. rapid switching), which
        // bumps the generation before the first fetch resolves.
        let fresh_generation = sync.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let applied = sync.apply_page_if_current(
            stale_generation,
            vec![server_message(1, 42, 100)],
            PageKind::Initial,
        );
        assert!(!applied);
        assert!(sync.messages().is_empty());

        // The fetch belonging to the newest load applies normally.
        let applied = sync.apply_page_if_current(
            fresh_generation,
            vec![server_message(2, 42, 200)],
            PageKind::Initial,
        );
        assert!(applied);
        assert_eq!(sync.messages().len(), 1);
        assert_eq!(sync.messages()[0].id, MessageId(2));
    }

    #[test]
    fn test_stale_older_page_does_not_clobber_reloaded_state() {
        let sync = offline_sync(42);
        let generation = sync.generation.fetch_add(1, Ordering::SeqCst) + 1;
        sync.apply_page_if_current(
            generation,
            vec![server_message(10, 42, 1000)],
            PageKind::Initial,
        );

        // An older-page fetch from before a reload must not prepend.
        sync.generation.fetch_add(1, Ordering::SeqCst);
        let applied = sync.apply_page_if_current(
            generation,
            vec![server_message(1, 42, 100)],
            PageKind::Older,
        );
        assert!(!applied);
        assert_eq!(sync.messages().len(), 1);
    }

    #[test]
    fn test_placeholder_lookup_ignores_server_ids() {
        let mut thread = MessageThread::new(ConversationId(42));
        thread.set_initial(vec![server_message(1, 42, 100)]);
        assert!(thread.placeholder(MessageId(1)).is_none());

        let local = thread.push_placeholder(Some("x".into()), None, profile("me"));
        assert!(thread.placeholder(local).is_some());
    }
}
