//! Realtime change feed and presence socket.
//!
//! The socket event loop runs in a dedicated tokio task. External code
//! communicates with it through typed command channels and receives decoded
//! per-topic events, keeping the realtime layer fully asynchronous and
//! decoupled from the synchronizers that consume it.
//!
//! Wire frames follow the platform's channel protocol: JSON objects with
//! `topic`, `event`, `payload`, and `ref` fields; `phx_join`/`phx_leave`
//! manage topic membership, a periodic `heartbeat` keeps the socket alive,
//! `postgres_changes` delivers row changes, and `presence_state` /
//! `presence_diff` carry channel membership.

use std::collections::HashMap;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Duration};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use chatamata_shared::constants::{CHANNEL_BUFFER, HEARTBEAT_SECS};
use chatamata_shared::events::ChangeEvent;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

// ---------------------------------------------------------------------------
// Command / event types
// ---------------------------------------------------------------------------

/// Commands sent *into* the socket task.
#[derive(Debug)]
pub enum RealtimeCommand {
    /// Join a topic and start receiving its events.
    Subscribe {
        spec: SubscriptionSpec,
        reply: oneshot::Sender<mpsc::Receiver<ChannelEvent>>,
    },
    /// Publish this client's presence metadata on a joined topic.
    Track { topic: String, meta: Value },
    /// Leave a topic.
    Unsubscribe { topic: String },
    /// Gracefully shut down the socket.
    Shutdown,
}

/// What a topic subscribes to.
#[derive(Debug, Clone)]
pub struct SubscriptionSpec {
    /// Channel topic. Callers scope thread subscriptions with a unique
    /// name per selection so a new join never collides with a
    /// half-torn-down predecessor.
    pub topic: String,
    /// Row-change subscriptions requested for this topic.
    pub changes: Vec<ChangeFilter>,
    /// When set, join the topic's presence group under this key.
    pub presence_key: Option<String>,
}

/// A single row-change subscription: table, operation, optional row filter
/// (e.g. `conversation_id=eq.42`).
#[derive(Debug, Clone)]
pub struct ChangeFilter {
    pub table: String,
    pub event: String,
    pub filter: Option<String>,
}

impl ChangeFilter {
    pub fn insert(table: &str) -> Self {
        Self {
            table: table.to_string(),
            event: "INSERT".to_string(),
            filter: None,
        }
    }

    pub fn update(table: &str) -> Self {
        Self {
            table: table.to_string(),
            event: "UPDATE".to_string(),
            filter: None,
        }
    }

    pub fn all(table: &str) -> Self {
        Self {
            table: table.to_string(),
            event: "*".to_string(),
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// Events delivered *from* the socket task to one subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The topic join was acknowledged.
    Joined,
    /// A decoded row change.
    Change(ChangeEvent),
    /// Full presence membership for the topic (replaces prior state).
    PresenceSync(Vec<String>),
    /// A single key joined the presence group.
    PresenceJoin(String),
    /// A single key left the presence group.
    PresenceLeave(String),
    /// The topic was closed by the server or the socket went away.
    Closed,
}

// ---------------------------------------------------------------------------
// Wire frame
// ---------------------------------------------------------------------------

/// One protocol frame on the socket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// Join payload for a topic: requested row-change subscriptions, optional
/// presence key, and the signed-in access token (row-level security on the
/// feed applies per identity).
fn join_payload(spec: &SubscriptionSpec, access_token: Option<&str>) -> Value {
    let changes: Vec<Value> = spec
        .changes
        .iter()
        .map(|c| {
            let mut change = json!({
                "event": c.event,
                "schema": "public",
                "table": c.table,
            });
            if let Some(ref filter) = c.filter {
                change["filter"] = json!(filter);
            }
            change
        })
        .collect();

    let mut config = json!({ "postgres_changes": changes });
    if let Some(ref key) = spec.presence_key {
        config["presence"] = json!({ "key": key });
    }

    let mut payload = json!({ "config": config });
    if let Some(token) = access_token {
        payload["access_token"] = json!(token);
    }
    payload
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable handle for talking to the socket task.
#[derive(Clone)]
pub struct RealtimeHandle {
    cmd_tx: mpsc::Sender<RealtimeCommand>,
}

impl RealtimeHandle {
    /// Join a topic. The returned [`Subscription`] yields the topic's
    /// events and leaves the topic when dropped.
    pub async fn subscribe(&self, spec: SubscriptionSpec) -> Result<Subscription> {
        let topic = spec.topic.clone();
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(RealtimeCommand::Subscribe { spec, reply })
            .await
            .map_err(|_| GatewayError::RealtimeClosed)?;
        let events = rx.await.map_err(|_| GatewayError::RealtimeClosed)?;
        Ok(Subscription {
            topic,
            events,
            cmd_tx: self.cmd_tx.clone(),
        })
    }

    /// Publish presence metadata for this client on a joined topic.
    pub async fn track(&self, topic: &str, meta: Value) -> Result<()> {
        self.cmd_tx
            .send(RealtimeCommand::Track {
                topic: topic.to_string(),
                meta,
            })
            .await
            .map_err(|_| GatewayError::RealtimeClosed)
    }

    pub async fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.cmd_tx
            .send(RealtimeCommand::Unsubscribe {
                topic: topic.to_string(),
            })
            .await
            .map_err(|_| GatewayError::RealtimeClosed)
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.cmd_tx
            .send(RealtimeCommand::Shutdown)
            .await
            .map_err(|_| GatewayError::RealtimeClosed)
    }
}

/// A joined topic. Dropping it leaves the topic.
pub struct Subscription {
    topic: String,
    events: mpsc::Receiver<ChannelEvent>,
    cmd_tx: mpsc::Sender<RealtimeCommand>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next event on this topic; `None` once the topic is gone.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.cmd_tx.try_send(RealtimeCommand::Unsubscribe {
            topic: self.topic.clone(),
        });
    }
}

// ---------------------------------------------------------------------------
// Socket task
// ---------------------------------------------------------------------------

struct TopicState {
    tx: mpsc::Sender<ChannelEvent>,
    joined: bool,
}

/// Connect the realtime socket and spawn its event loop.
///
/// Returns a handle for subscribing, tracking presence, and shutting the
/// socket down. The loop ends when the server closes the connection, the
/// handle is dropped, or `Shutdown` is sent; every open subscription then
/// receives [`ChannelEvent::Closed`].
pub async fn spawn_realtime(
    config: &GatewayConfig,
    access_token: Option<String>,
) -> Result<RealtimeHandle> {
    let url = config.realtime_socket_url();
    let (ws, _) = connect_async(url).await?;
    info!("Realtime socket connected");

    let (write, read) = ws.split();
    let (cmd_tx, cmd_rx) = mpsc::channel::<RealtimeCommand>(CHANNEL_BUFFER);

    tokio::spawn(async move {
        socket_loop(write, read, cmd_rx, access_token).await;
    });

    Ok(RealtimeHandle { cmd_tx })
}

async fn socket_loop(
    mut write: WsSink,
    mut read: WsSource,
    mut cmd_rx: mpsc::Receiver<RealtimeCommand>,
    access_token: Option<String>,
) {
    let mut topics: HashMap<String, TopicState> = HashMap::new();
    let mut ref_counter: u64 = 0;
    let mut heartbeat = interval(Duration::from_secs(HEARTBEAT_SECS));
    // The first tick completes immediately; skip it so the heartbeat
    // starts one interval after connect.
    heartbeat.tick().await;

    loop {
        tokio::select! {
            // --- Incoming commands ---
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(RealtimeCommand::Subscribe { spec, reply }) => {
                        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER);
                        ref_counter += 1;
                        let frame = Frame {
                            topic: spec.topic.clone(),
                            event: "phx_join".to_string(),
                            payload: join_payload(&spec, access_token.as_deref()),
                            reference: Some(ref_counter.to_string()),
                        };
                        debug!(topic = %spec.topic, changes = spec.changes.len(), "Joining topic");
                        if let Err(e) = send_frame(&mut write, &frame).await {
                            error!(topic = %spec.topic, error = %e, "Join send failed");
                            break;
                        }
                        topics.insert(spec.topic.clone(), TopicState { tx, joined: false });
                        let _ = reply.send(rx);
                    }
                    Some(RealtimeCommand::Track { topic, meta }) => {
                        ref_counter += 1;
                        let frame = Frame {
                            topic: topic.clone(),
                            event: "presence".to_string(),
                            payload: json!({ "event": "track", "payload": meta }),
                            reference: Some(ref_counter.to_string()),
                        };
                        if let Err(e) = send_frame(&mut write, &frame).await {
                            error!(topic = %topic, error = %e, "Track send failed");
                            break;
                        }
                    }
                    Some(RealtimeCommand::Unsubscribe { topic }) => {
                        if topics.remove(&topic).is_some() {
                            ref_counter += 1;
                            let frame = Frame {
                                topic: topic.clone(),
                                event: "phx_leave".to_string(),
                                payload: json!({}),
                                reference: Some(ref_counter.to_string()),
                            };
                            debug!(topic = %topic, "Leaving topic");
                            if let Err(e) = send_frame(&mut write, &frame).await {
                                error!(topic = %topic, error = %e, "Leave send failed");
                                break;
                            }
                        }
                    }
                    Some(RealtimeCommand::Shutdown) => {
                        info!("Realtime shutdown requested");
                        break;
                    }
                    None => {
                        // All senders dropped
                        info!("Command channel closed, shutting down realtime socket");
                        break;
                    }
                }
            }

            // --- Heartbeat ---
            _ = heartbeat.tick() => {
                ref_counter += 1;
                let frame = Frame {
                    topic: "phoenix".to_string(),
                    event: "heartbeat".to_string(),
                    payload: json!({}),
                    reference: Some(ref_counter.to_string()),
                };
                if let Err(e) = send_frame(&mut write, &frame).await {
                    error!(error = %e, "Heartbeat failed, closing socket");
                    break;
                }
            }

            // --- Socket frames ---
            msg = read.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<Frame>(&text) {
                            Ok(frame) => handle_frame(&mut topics, frame),
                            Err(e) => debug!(error = %e, "Undecodable frame, dropping"),
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        if write.send(WsMessage::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        info!("Realtime socket closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "Realtime socket error");
                        break;
                    }
                }
            }
        }
    }

    // Let every open subscription know the feed is gone.
    for (topic, state) in topics.iter() {
        debug!(topic = %topic, "Closing subscription");
        let _ = state.tx.try_send(ChannelEvent::Closed);
    }

    info!("Realtime socket loop terminated");
}

async fn send_frame(
    write: &mut WsSink,
    frame: &Frame,
) -> std::result::Result<(), tokio_tungstenite::tungstenite::Error> {
    let text = serde_json::to_string(frame).expect("frame serialization is infallible");
    write.send(WsMessage::Text(text.into())).await
}

/// Route one inbound frame to its topic's subscription.
fn handle_frame(topics: &mut HashMap<String, TopicState>, frame: Frame) {
    if frame.event == "phx_close" || frame.event == "phx_error" {
        if let Some(state) = topics.remove(&frame.topic) {
            warn!(topic = %frame.topic, event = %frame.event, "Topic closed by server");
            let _ = state.tx.try_send(ChannelEvent::Closed);
        }
        return;
    }

    let Some(state) = topics.get_mut(&frame.topic) else {
        // Heartbeat replies and frames for already-left topics land here.
        debug!(topic = %frame.topic, event = %frame.event, "Frame for unknown topic");
        return;
    };

    match frame.event.as_str() {
        "phx_reply" => {
            let ok = frame.payload.get("status").and_then(Value::as_str) == Some("ok");
            if ok && !state.joined {
                state.joined = true;
                deliver(state, &frame.topic, ChannelEvent::Joined);
            } else if !ok {
                warn!(topic = %frame.topic, payload = %frame.payload, "Topic reply was not ok");
            }
        }

        "postgres_changes" => {
            let data = frame.payload.get("data").unwrap_or(&frame.payload);
            match ChangeEvent::decode(data) {
                Ok(event) => deliver(state, &frame.topic, ChannelEvent::Change(event)),
                Err(e) => debug!(topic = %frame.topic, error = %e, "Dropping undecodable change"),
            }
        }

        "presence_state" => {
            let keys: Vec<String> = frame
                .payload
                .as_object()
                .map(|obj| obj.keys().cloned().collect())
                .unwrap_or_default();
            deliver(state, &frame.topic, ChannelEvent::PresenceSync(keys));
        }

        "presence_diff" => {
            let keys_of = |field: &str| -> Vec<String> {
                frame
                    .payload
                    .get(field)
                    .and_then(Value::as_object)
                    .map(|obj| obj.keys().cloned().collect())
                    .unwrap_or_default()
            };
            for key in keys_of("joins") {
                deliver(state, &frame.topic, ChannelEvent::PresenceJoin(key));
            }
            for key in keys_of("leaves") {
                deliver(state, &frame.topic, ChannelEvent::PresenceLeave(key));
            }
        }

        other => {
            debug!(topic = %frame.topic, event = %other, "Unhandled frame event");
        }
    }
}

fn deliver(state: &TopicState, topic: &str, event: ChannelEvent) {
    if let Err(e) = state.tx.try_send(event) {
        warn!(topic = %topic, error = %e, "Subscriber not keeping up, dropping event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_wire_shape() {
        let frame = Frame {
            topic: "chat:42".into(),
            event: "phx_join".into(),
            payload: json!({ "a": 1 }),
            reference: Some("7".into()),
        };
        let wire = serde_json::to_value(&frame).unwrap();
        assert_eq!(wire["ref"], "7");
        assert_eq!(wire["topic"], "chat:42");

        let back: Frame = serde_json::from_value(wire).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn test_frame_ref_is_optional() {
        let frame: Frame =
            serde_json::from_str(r#"{"topic":"t","event":"presence_state","payload":{}}"#).unwrap();
        assert!(frame.reference.is_none());
    }

    #[test]
    fn test_join_payload_lists_changes() {
        let spec = SubscriptionSpec {
            topic: "chat:42:u:1".into(),
            changes: vec![
                ChangeFilter::insert("messages").with_filter("conversation_id=eq.42"),
                ChangeFilter::insert("message_read_statuses"),
            ],
            presence_key: None,
        };
        let payload = join_payload(&spec, Some("tok"));
        let changes = payload["config"]["postgres_changes"].as_array().unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0]["table"], "messages");
        assert_eq!(changes[0]["filter"], "conversation_id=eq.42");
        assert!(changes[1].get("filter").is_none());
        assert_eq!(payload["access_token"], "tok");
    }

    #[test]
    fn test_join_payload_presence_key() {
        let spec = SubscriptionSpec {
            topic: "online-users".into(),
            changes: vec![],
            presence_key: Some("user-1".into()),
        };
        let payload = join_payload(&spec, None);
        assert_eq!(payload["config"]["presence"]["key"], "user-1");
        assert!(payload.get("access_token").is_none());
    }

    #[test]
    fn test_change_filter_builders() {
        assert_eq!(ChangeFilter::all("friendships").event, "*");
        assert_eq!(ChangeFilter::update("profiles").event, "UPDATE");
        assert!(ChangeFilter::insert("messages").filter.is_none());
    }
}
