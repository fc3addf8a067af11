// Remote data gateway client: REST rows + remote procedures, auth, object
// storage, and the realtime change feed / presence socket.

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod queries;
pub mod realtime;
pub mod storage;

pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use http::Gateway;
pub use realtime::{
    spawn_realtime, ChangeFilter, ChannelEvent, RealtimeCommand, RealtimeHandle, Subscription,
    SubscriptionSpec,
};
