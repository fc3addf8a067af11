pub mod conversations;
pub mod error;
pub mod friends;
pub mod messages;
pub mod notify;
pub mod presence;
pub mod session;

pub use conversations::ConversationListSync;
pub use error::{ClientError, Result};
pub use friends::FriendshipSync;
pub use messages::MessageThreadSync;
pub use notify::{Notice, Notifier, Severity};
pub use presence::PresenceTracker;
pub use session::SessionStore;

use tracing_subscriber::{fmt, EnvFilter};

/// Initialise logging for an embedding application. Call once at startup.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("chatamata_client=debug,chatamata_gateway=debug,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
