pub mod constants;
pub mod error;
pub mod events;
pub mod models;
pub mod types;

pub use error::EventDecodeError;
pub use events::ChangeEvent;
pub use models::{
    AuthUser, ConversationPreview, Friendship, FriendshipRow, Message, NewMessage, Profile,
    Session, UserMetadata,
};
pub use types::{
    ConversationId, FriendResponse, FriendStatus, FriendshipId, MessageId, MessageStatus, Plan,
    UserId,
};
