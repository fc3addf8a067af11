/// Application name
pub const APP_NAME: &str = "Chatamata";

/// Messages fetched per pagination window
pub const MESSAGES_PER_PAGE: u32 = 30;

/// Maximum accepted upload size in bytes (2 MiB)
pub const MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024;

/// Maximum profiles returned by a friend search
pub const FRIEND_SEARCH_LIMIT: u32 = 10;

/// Shared presence channel joined by every signed-in client
pub const PRESENCE_TOPIC: &str = "online-users";

/// Object storage bucket for chat image uploads
pub const BUCKET_CHAT_IMAGES: &str = "chatimages";

/// Object storage bucket for profile avatars
pub const BUCKET_AVATARS: &str = "avatars";

/// Object storage bucket for profile banners
pub const BUCKET_BANNERS: &str = "banners";

/// Realtime socket heartbeat interval in seconds
pub const HEARTBEAT_SECS: u64 = 30;

/// Buffer size for realtime command / event channels
pub const CHANNEL_BUFFER: usize = 256;
