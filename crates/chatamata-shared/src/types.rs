use serde::{Deserialize, Serialize};
use uuid::Uuid;

// User identity = the auth platform's UUID for the account
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-assigned conversation row id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationId(pub i64);

impl ConversationId {
    /// Topic for a thread-scoped realtime subscription. The name embeds the
    /// subscriber identity and a caller-supplied nonce so that switching
    /// conversations always joins a fresh channel instead of reusing a
    /// half-torn-down one.
    pub fn thread_topic(&self, user: &UserId, nonce: i64) -> String {
        format!("chat:{}:{}:{}", self.0, user, nonce)
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message row id. Server-assigned ids are positive; placeholders created
/// for optimistic sends carry negative transient ids until the insert is
/// confirmed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub i64);

impl MessageId {
    /// Whether this id is a client-local placeholder id.
    pub fn is_local(&self) -> bool {
        self.0 < 0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FriendshipId(pub i64);

impl std::fmt::Display for FriendshipId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Account plan tier shown on profiles.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Free,
    Verified,
    Premium,
    Vip,
}

/// Friendship row status as stored by the gateway.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FriendStatus {
    Pending,
    Accepted,
    Rejected,
    Blocked,
}

/// Allowed responses to an incoming friend request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FriendResponse {
    Accepted,
    Rejected,
}

/// Client-side delivery state of a message. Rows fetched from the gateway
/// are always `Success`; only optimistic placeholders move through
/// `Sending` and `Error`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    #[default]
    Success,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_message_id() {
        assert!(MessageId(-3).is_local());
        assert!(!MessageId(1).is_local());
        assert!(!MessageId(0).is_local());
    }

    #[test]
    fn test_thread_topic_embeds_identity_and_nonce() {
        let user = UserId(Uuid::nil());
        let a = ConversationId(42).thread_topic(&user, 1);
        let b = ConversationId(42).thread_topic(&user, 2);
        assert!(a.starts_with("chat:42:"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_plan_wire_names() {
        assert_eq!(serde_json::to_string(&Plan::Vip).unwrap(), "\"vip\"");
        let p: Plan = serde_json::from_str("\"verified\"").unwrap();
        assert_eq!(p, Plan::Verified);
    }
}
