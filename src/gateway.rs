use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};
use url::Url;

use crate::model::{Channel, Guild, Member, Message, Presence, Role, User};

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_PRESENCE_UPDATE: u8 = 3;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("url error: {0}")]
    Url(#[from] url::ParseError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("gateway connection closed")]
    Closed,
}

#[derive(Debug, Deserialize)]
pub struct Frame {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ready {
    pub user: User,
    #[serde(default)]
    pub session_id: String,
}

/// A guild as delivered right after identify, with its initial member and
/// presence snapshot.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GuildCreate {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub presences: Vec<Presence>,
}

impl GuildCreate {
    pub fn guild(&self) -> Guild {
        Guild {
            id: self.id.clone(),
            name: self.name.clone(),
            roles: self.roles.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum GatewayEvent {
    GuildCreate(GuildCreate),
    MessageCreate(Message),
    PresenceUpdate(Presence),
}

pub struct GatewayConnection {
    pub ready: Ready,
    pub events: mpsc::UnboundedReceiver<GatewayEvent>,
    pub handle: GatewayHandle,
}

/// Sends frames to the gateway through the writer task.
#[derive(Clone)]
pub struct GatewayHandle {
    outbound: mpsc::UnboundedSender<WsMessage>,
}

impl GatewayHandle {
    pub fn update_presence(&self, status: &str, game: Option<&str>) -> Result<(), GatewayError> {
        self.send(presence_payload(status, game))
    }

    fn send(&self, payload: Value) -> Result<(), GatewayError> {
        self.outbound
            .send(WsMessage::Text(payload.to_string()))
            .map_err(|_| GatewayError::Closed)
    }
}

/// Opens the gateway, identifies and waits for READY. Afterwards a reader,
/// a writer and a heartbeat task keep the connection alive until the socket
/// closes; there is no reconnect.
pub async fn connect(url: &str, token: &str, intents: u64) -> Result<GatewayConnection, GatewayError> {
    let url = Url::parse(url)?;
    let (ws, _) = connect_async(url).await?;
    let (mut sink, mut stream) = ws.split();

    let hello = next_frame(&mut stream).await?;
    if hello.op != OP_HELLO {
        return Err(GatewayError::Protocol(format!(
            "expected hello, got op {}",
            hello.op
        )));
    }
    let interval = heartbeat_interval(&hello)?;
    debug!(interval_ms = interval.as_millis() as u64, "gateway hello");

    sink.send(WsMessage::Text(identify_payload(token, intents).to_string()))
        .await?;

    let seq = Arc::new(AtomicU64::new(0));
    let ready = wait_for_ready(&mut stream, &seq).await?;
    debug!(session_id = %ready.session_id, user = %ready.user.username, "gateway ready");

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    tokio::spawn(write_loop(sink, outbound_rx));
    tokio::spawn(heartbeat_loop(outbound_tx.clone(), Arc::clone(&seq), interval));
    tokio::spawn(read_loop(stream, events_tx, outbound_tx.clone(), seq));

    Ok(GatewayConnection {
        ready,
        events: events_rx,
        handle: GatewayHandle {
            outbound: outbound_tx,
        },
    })
}

async fn wait_for_ready<S>(stream: &mut S, seq: &AtomicU64) -> Result<Ready, GatewayError>
where
    S: Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = next_frame(stream).await?;
        if let Some(s) = frame.s {
            seq.store(s, Ordering::SeqCst);
        }
        match (frame.op, frame.t.as_deref()) {
            (OP_DISPATCH, Some("READY")) => return Ok(serde_json::from_value(frame.d)?),
            (OP_INVALID_SESSION, _) => {
                return Err(GatewayError::Protocol("invalid session".to_string()));
            }
            (op, kind) => debug!(op, ?kind, "skipping frame before ready"),
        }
    }
}

async fn next_frame<S>(stream: &mut S) -> Result<Frame, GatewayError>
where
    S: Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let message = stream.next().await.ok_or(GatewayError::Closed)??;
        match message {
            WsMessage::Text(text) => return Ok(serde_json::from_str(&text)?),
            WsMessage::Binary(data) => return Ok(serde_json::from_slice(&data)?),
            WsMessage::Close(frame) => {
                debug!(?frame, "gateway sent close");
                return Err(GatewayError::Closed);
            }
            _ => continue,
        }
    }
}

async fn read_loop<S>(
    mut stream: S,
    events: mpsc::UnboundedSender<GatewayEvent>,
    outbound: mpsc::UnboundedSender<WsMessage>,
    seq: Arc<AtomicU64>,
) where
    S: Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = match next_frame(&mut stream).await {
            Ok(frame) => frame,
            Err(GatewayError::Json(error)) => {
                warn!(%error, "undecodable gateway frame");
                continue;
            }
            Err(error) => {
                warn!(%error, "gateway reader stopped");
                return;
            }
        };
        if let Some(s) = frame.s {
            seq.store(s, Ordering::SeqCst);
        }
        match frame.op {
            OP_DISPATCH => {
                let kind = frame.t.unwrap_or_default();
                match decode_dispatch(&kind, frame.d) {
                    Ok(Some(event)) => {
                        if events.send(event).is_err() {
                            return;
                        }
                    }
                    Ok(None) => debug!(%kind, "ignoring dispatch"),
                    Err(error) => warn!(%kind, %error, "failed to decode dispatch"),
                }
            }
            OP_HEARTBEAT => {
                let payload = heartbeat_payload(last_seq(&seq));
                if outbound.send(WsMessage::Text(payload.to_string())).is_err() {
                    return;
                }
            }
            OP_HEARTBEAT_ACK => debug!("heartbeat ack"),
            OP_RECONNECT => warn!("gateway asked for a reconnect; staying on this connection"),
            OP_INVALID_SESSION => warn!("gateway reported an invalid session"),
            op => debug!(op, "unhandled gateway op"),
        }
    }
}

async fn write_loop<S>(mut sink: S, mut outbound: mpsc::UnboundedReceiver<WsMessage>)
where
    S: Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    while let Some(message) = outbound.recv().await {
        if let Err(error) = sink.send(message).await {
            warn!(%error, "gateway writer stopped");
            return;
        }
    }
}

async fn heartbeat_loop(
    outbound: mpsc::UnboundedSender<WsMessage>,
    seq: Arc<AtomicU64>,
    period: Duration,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;
        let payload = heartbeat_payload(last_seq(&seq));
        if outbound.send(WsMessage::Text(payload.to_string())).is_err() {
            return;
        }
        debug!("heartbeat sent");
    }
}

fn last_seq(seq: &AtomicU64) -> Option<u64> {
    match seq.load(Ordering::SeqCst) {
        0 => None,
        value => Some(value),
    }
}

fn heartbeat_interval(hello: &Frame) -> Result<Duration, GatewayError> {
    hello
        .d
        .get("heartbeat_interval")
        .and_then(Value::as_u64)
        .map(Duration::from_millis)
        .ok_or_else(|| GatewayError::Protocol("hello without heartbeat_interval".to_string()))
}

pub fn decode_dispatch(kind: &str, data: Value) -> Result<Option<GatewayEvent>, serde_json::Error> {
    let event = match kind {
        "GUILD_CREATE" => GatewayEvent::GuildCreate(serde_json::from_value(data)?),
        "MESSAGE_CREATE" => GatewayEvent::MessageCreate(serde_json::from_value(data)?),
        "PRESENCE_UPDATE" => GatewayEvent::PresenceUpdate(serde_json::from_value(data)?),
        _ => return Ok(None),
    };
    Ok(Some(event))
}

/// Bot tokens authenticate REST calls with a `Bot ` prefix but identify
/// without it.
pub fn identify_payload(token: &str, intents: u64) -> Value {
    let token = token.strip_prefix("Bot ").unwrap_or(token);
    let device = hostname::get()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| env!("CARGO_PKG_NAME").to_string());
    json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": token,
            "intents": intents,
            "properties": {
                "os": std::env::consts::OS,
                "browser": env!("CARGO_PKG_NAME"),
                "device": device,
            },
        },
    })
}

pub fn heartbeat_payload(seq: Option<u64>) -> Value {
    json!({ "op": OP_HEARTBEAT, "d": seq })
}

pub fn presence_payload(status: &str, game: Option<&str>) -> Value {
    let activities = match game {
        Some(name) => json!([{ "name": name, "type": 0 }]),
        None => json!([]),
    };
    json!({
        "op": OP_PRESENCE_UPDATE,
        "d": {
            "since": null,
            "activities": activities,
            "status": status,
            "afk": false,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identify_strips_bot_prefix() {
        let payload = identify_payload("Bot abc.def", 513);
        assert_eq!(payload["op"], 2);
        assert_eq!(payload["d"]["token"], "abc.def");
        assert_eq!(payload["d"]["intents"], 513);
        assert_eq!(payload["d"]["properties"]["browser"], "discordterm");

        let user = identify_payload("plain", 1);
        assert_eq!(user["d"]["token"], "plain");
    }

    #[test]
    fn heartbeat_carries_last_sequence() {
        assert_eq!(heartbeat_payload(None), json!({ "op": 1, "d": null }));
        assert_eq!(heartbeat_payload(Some(42)), json!({ "op": 1, "d": 42 }));

        let seq = AtomicU64::new(0);
        assert_eq!(last_seq(&seq), None);
        seq.store(7, Ordering::SeqCst);
        assert_eq!(last_seq(&seq), Some(7));
    }

    #[test]
    fn presence_update_lists_activity_only_when_playing() {
        let playing = presence_payload("idle", Some("chess"));
        assert_eq!(playing["op"], 3);
        assert_eq!(playing["d"]["status"], "idle");
        assert_eq!(playing["d"]["activities"][0]["name"], "chess");

        let idle = presence_payload("online", None);
        assert_eq!(idle["d"]["activities"], json!([]));
    }

    #[test]
    fn hello_frame_yields_interval() {
        let frame: Frame =
            serde_json::from_str(r#"{"op":10,"d":{"heartbeat_interval":41250},"s":null,"t":null}"#)
                .expect("hello frame");
        assert_eq!(
            heartbeat_interval(&frame).expect("interval"),
            Duration::from_millis(41250)
        );

        let bare: Frame = serde_json::from_str(r#"{"op":10}"#).expect("bare frame");
        assert!(heartbeat_interval(&bare).is_err());
    }

    #[test]
    fn message_create_dispatch_decodes() {
        let data = json!({
            "id": "1",
            "channel_id": "2",
            "guild_id": "3",
            "author": { "id": "4", "username": "ada" },
            "content": "hi",
        });
        match decode_dispatch("MESSAGE_CREATE", data).expect("decodes") {
            Some(GatewayEvent::MessageCreate(message)) => {
                assert_eq!(message.content, "hi");
                assert_eq!(message.guild_id.as_deref(), Some("3"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn guild_create_dispatch_carries_snapshot() {
        let data = json!({
            "id": "3",
            "name": "rust",
            "channels": [{ "id": "10", "name": "general", "type": 0 }],
            "members": [{ "user": { "id": "4", "username": "ada" }, "nick": "A" }],
            "presences": [{ "user": { "id": "4" }, "status": "online" }],
        });
        match decode_dispatch("GUILD_CREATE", data).expect("decodes") {
            Some(GatewayEvent::GuildCreate(created)) => {
                assert_eq!(created.guild().name, "rust");
                assert_eq!(created.channels.len(), 1);
                assert_eq!(created.members[0].nickname(), Some("A"));
                assert_eq!(created.presences[0].status, "online");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn unknown_dispatch_is_ignored() {
        assert!(
            decode_dispatch("TYPING_START", json!({}))
                .expect("no decode needed")
                .is_none()
        );
    }
}
