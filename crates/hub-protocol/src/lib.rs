// hub-protocol: wire types shared by every client-facing surface of the hub.
//
// The signaling fabric speaks one envelope shape everywhere (WebSocket frames
// and the one HTTP endpoint that needs signature proof-of-ownership). Message
// kinds are a tagged union on a `kind` field; unknown kinds decode into an
// explicit `WsMessage::Unknown` variant rather than failing deserialization,
// so the router can report `unknown_message_type` instead of dropping the
// connection.

use serde::de::Error as DeError;
use serde::ser::Error as SerError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Envelope + canonical serialization
// ---------------------------------------------------------------------------

/// A signed envelope. `P` is the payload shape -- `WsMessage` for the
/// WebSocket path, `CallSessionTokenRequest` for the one HTTP endpoint that
/// needs the same proof-of-ownership without a standing connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<P> {
    pub from_pubkey: String,
    pub from_address: String,
    pub nonce: String,
    pub timestamp: i64,
    pub payload: P,
    pub signature: String,
}

pub type WsEnvelope = Envelope<WsMessage>;
pub type CallTokenEnvelope = Envelope<CallSessionTokenRequest>;

/// Recursively sorts object keys so that two structurally equal JSON values
/// always serialize to the same bytes, regardless of field declaration order
/// or map implementation. Array order is left untouched.
pub fn sort_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_value(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_value).collect()),
        other => other.clone(),
    }
}

/// Canonical JSON text for `value`: keys sorted lexicographically at every
/// nesting level, no insignificant whitespace.
pub fn canonical_json(value: &Value) -> String {
    serde_json::to_string(&sort_value(value)).expect("sorted Value always serializes")
}

/// The exact bytes an envelope's signature covers: the whole envelope object
/// with the `signature` field removed, in canonical form. Shared by the
/// WebSocket envelope path and the `/api/call-session-token` HTTP path so
/// producer and consumer can never disagree on what was signed.
pub fn signing_bytes<P: Serialize>(envelope: &Envelope<P>) -> Result<String, serde_json::Error> {
    let mut value = serde_json::to_value(envelope)?;
    if let Value::Object(map) = &mut value {
        map.remove("signature");
    }
    Ok(canonical_json(&value))
}

// ---------------------------------------------------------------------------
// WebSocket payload kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Register {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallInit {
    pub target_address: String,
    pub call_session_token: String,
    #[serde(default)]
    pub video: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallAccept {
    pub call_session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallReject {
    pub call_session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEnd {
    pub call_session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebrtcOffer {
    pub call_session_id: String,
    pub sdp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebrtcAnswer {
    pub call_session_id: String,
    pub sdp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebrtcIce {
    pub call_session_id: String,
    pub candidate: Value,
}

/// `convo_id` is optional: for a direct message the hub derives it from the
/// sorted participant pair, so first contact doesn't require a prior
/// `convo:create` round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSend {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convo_id: Option<String>,
    pub to_address: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgRead {
    pub convo_id: String,
    pub up_to_seq: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgTyping {
    pub convo_id: String,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCreate {
    pub participants: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupLeave {
    pub convo_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRemoveMember {
    pub convo_id: String,
    pub member_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ping {}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pong {}

/// Catch-all for the `policy:*`, `pass:*`, `block:*`, `routing:*` and
/// `wallet:*` families. These are sub-action namespaces rather than single
/// messages; `kind` carries the full dotted... full colon-qualified name
/// (e.g. `"policy:set"`) and every other field rides along in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyMessage {
    pub kind: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// All client -> server envelope payload kinds.
///
/// Deserialization is hand-rolled rather than derived: an unrecognized
/// `kind` must decode successfully into `Unknown` (carrying the raw kind and
/// payload) so the router can reply `unknown_message_type` instead of
/// failing the whole frame.
#[derive(Debug, Clone, PartialEq)]
pub enum WsMessage {
    Register(Register),
    CallInit(CallInit),
    CallAccept(CallAccept),
    CallReject(CallReject),
    CallEnd(CallEnd),
    WebrtcOffer(WebrtcOffer),
    WebrtcAnswer(WebrtcAnswer),
    WebrtcIce(WebrtcIce),
    MsgSend(MsgSend),
    MsgRead(MsgRead),
    MsgTyping(MsgTyping),
    GroupCreate(GroupCreate),
    GroupLeave(GroupLeave),
    GroupRemoveMember(GroupRemoveMember),
    Policy(FamilyMessage),
    Pass(FamilyMessage),
    Block(FamilyMessage),
    Routing(FamilyMessage),
    Wallet(FamilyMessage),
    Ping(Ping),
    Pong(Pong),
    /// Anything whose `kind` the router doesn't recognize. Carries the
    /// original kind string and full payload for logging.
    Unknown { kind: String, payload: Value },
}

impl WsMessage {
    /// The wire `kind` string for this message, including unknown ones.
    pub fn kind(&self) -> &str {
        match self {
            WsMessage::Register(_) => "register",
            WsMessage::CallInit(_) => "call:init",
            WsMessage::CallAccept(_) => "call:accept",
            WsMessage::CallReject(_) => "call:reject",
            WsMessage::CallEnd(_) => "call:end",
            WsMessage::WebrtcOffer(_) => "webrtc:offer",
            WsMessage::WebrtcAnswer(_) => "webrtc:answer",
            WsMessage::WebrtcIce(_) => "webrtc:ice",
            WsMessage::MsgSend(_) => "msg:send",
            WsMessage::MsgRead(_) => "msg:read",
            WsMessage::MsgTyping(_) => "msg:typing",
            WsMessage::GroupCreate(_) => "group:create",
            WsMessage::GroupLeave(_) => "group:leave",
            WsMessage::GroupRemoveMember(_) => "group:remove_member",
            WsMessage::Policy(f) | WsMessage::Pass(f) | WsMessage::Block(f) => f.kind.as_str(),
            WsMessage::Routing(f) | WsMessage::Wallet(f) => f.kind.as_str(),
            WsMessage::Ping(_) => "ping",
            WsMessage::Pong(_) => "pong",
            WsMessage::Unknown { kind, .. } => kind.as_str(),
        }
    }
}

const FAMILY_PREFIXES: [&str; 5] = ["policy:", "pass:", "block:", "routing:", "wallet:"];

impl<'de> Deserialize<'de> for WsMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let kind = value
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| DeError::missing_field("kind"))?
            .to_string();

        macro_rules! decode {
            ($ctor:ident, $ty:ty) => {
                serde_json::from_value::<$ty>(value.clone())
                    .map(WsMessage::$ctor)
                    .map_err(DeError::custom)
            };
        }

        match kind.as_str() {
            "register" => decode!(Register, Register),
            "call:init" => decode!(CallInit, CallInit),
            "call:accept" => decode!(CallAccept, CallAccept),
            "call:reject" => decode!(CallReject, CallReject),
            "call:end" => decode!(CallEnd, CallEnd),
            "webrtc:offer" => decode!(WebrtcOffer, WebrtcOffer),
            "webrtc:answer" => decode!(WebrtcAnswer, WebrtcAnswer),
            "webrtc:ice" => decode!(WebrtcIce, WebrtcIce),
            "msg:send" => decode!(MsgSend, MsgSend),
            "msg:read" => decode!(MsgRead, MsgRead),
            "msg:typing" => decode!(MsgTyping, MsgTyping),
            "group:create" => decode!(GroupCreate, GroupCreate),
            "group:leave" => decode!(GroupLeave, GroupLeave),
            "group:remove_member" => decode!(GroupRemoveMember, GroupRemoveMember),
            "ping" => decode!(Ping, Ping),
            "pong" => decode!(Pong, Pong),
            _ if FAMILY_PREFIXES.iter().any(|p| kind.starts_with(p)) => {
                let family: FamilyMessage =
                    serde_json::from_value(value).map_err(DeError::custom)?;
                Ok(match kind.split(':').next().unwrap_or_default() {
                    "policy" => WsMessage::Policy(family),
                    "pass" => WsMessage::Pass(family),
                    "block" => WsMessage::Block(family),
                    "routing" => WsMessage::Routing(family),
                    "wallet" => WsMessage::Wallet(family),
                    _ => WsMessage::Unknown {
                        kind,
                        payload: serde_json::to_value(family).map_err(DeError::custom)?,
                    },
                })
            }
            _ => Ok(WsMessage::Unknown { kind, payload: value }),
        }
    }
}

impl Serialize for WsMessage {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if let WsMessage::Unknown { payload, .. } = self {
            return payload.serialize(serializer);
        }
        if let WsMessage::Policy(f)
        | WsMessage::Pass(f)
        | WsMessage::Block(f)
        | WsMessage::Routing(f)
        | WsMessage::Wallet(f) = self
        {
            return f.serialize(serializer);
        }

        let kind = self.kind();
        let mut value = match self {
            WsMessage::Register(inner) => serde_json::to_value(inner),
            WsMessage::CallInit(inner) => serde_json::to_value(inner),
            WsMessage::CallAccept(inner) => serde_json::to_value(inner),
            WsMessage::CallReject(inner) => serde_json::to_value(inner),
            WsMessage::CallEnd(inner) => serde_json::to_value(inner),
            WsMessage::WebrtcOffer(inner) => serde_json::to_value(inner),
            WsMessage::WebrtcAnswer(inner) => serde_json::to_value(inner),
            WsMessage::WebrtcIce(inner) => serde_json::to_value(inner),
            WsMessage::MsgSend(inner) => serde_json::to_value(inner),
            WsMessage::MsgRead(inner) => serde_json::to_value(inner),
            WsMessage::MsgTyping(inner) => serde_json::to_value(inner),
            WsMessage::GroupCreate(inner) => serde_json::to_value(inner),
            WsMessage::GroupLeave(inner) => serde_json::to_value(inner),
            WsMessage::GroupRemoveMember(inner) => serde_json::to_value(inner),
            WsMessage::Ping(inner) => serde_json::to_value(inner),
            WsMessage::Pong(inner) => serde_json::to_value(inner),
            WsMessage::Policy(_)
            | WsMessage::Pass(_)
            | WsMessage::Block(_)
            | WsMessage::Routing(_)
            | WsMessage::Wallet(_)
            | WsMessage::Unknown { .. } => unreachable!("handled above"),
        }
        .map_err(SerError::custom)?;

        if let Value::Object(map) = &mut value {
            map.insert("kind".to_string(), Value::String(kind.to_string()));
        }
        value.serialize(serializer)
    }
}

// ---------------------------------------------------------------------------
// Server -> client events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallIncoming {
    pub call_session_id: String,
    pub from_address: String,
    pub video: bool,
    /// True when the caller is not an approved contact (informational only
    /// -- the callee still decides accept/reject).
    pub is_unknown: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageWire {
    pub id: String,
    pub convo_id: String,
    pub from_address: String,
    pub to_address: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub seq: u64,
    pub server_timestamp: i64,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationWire {
    pub id: String,
    pub kind: String,
    pub participants: Vec<String>,
    pub created_at: i64,
    pub last_message_seq: u64,
}

/// All server -> client event kinds. A closed set (unlike `WsMessage`): the
/// hub only ever emits what it knows how to emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ServerEvent {
    #[serde(rename = "success")]
    Success {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        in_reply_to: Option<String>,
    },
    #[serde(rename = "error")]
    Error(ErrorMessage),
    #[serde(rename = "call:incoming")]
    CallIncoming(CallIncoming),
    #[serde(rename = "call:blocked")]
    CallBlocked { reason: String },
    #[serde(rename = "call:dnd")]
    CallDnd {},
    #[serde(rename = "call:connecting")]
    CallConnecting { call_session_id: String },
    #[serde(rename = "call:ringing")]
    CallRinging { call_session_id: String },
    #[serde(rename = "call:unavailable")]
    CallUnavailable {},
    #[serde(rename = "call:ended")]
    CallEnded {
        call_session_id: String,
        reason: String,
    },
    #[serde(rename = "call:request")]
    CallRequest(CallIncoming),
    #[serde(rename = "msg:incoming")]
    MsgIncoming(MessageWire),
    #[serde(rename = "msg:delivered")]
    MsgDelivered { convo_id: String, message_id: String },
    #[serde(rename = "msg:read")]
    MsgRead {
        convo_id: String,
        up_to_seq: u64,
        by_address: String,
    },
    #[serde(rename = "convo:create")]
    ConvoCreate(ConversationWire),
    #[serde(rename = "convo:update")]
    ConvoUpdate(ConversationWire),
    #[serde(rename = "group:created")]
    GroupCreated(ConversationWire),
    #[serde(rename = "group:member_left")]
    GroupMemberLeft {
        convo_id: String,
        member_address: String,
    },
    #[serde(rename = "pass:used")]
    PassUsed { pass_id: String, by_address: String },
    #[serde(rename = "contact:added_by")]
    ContactAddedBy { address: String },
    #[serde(rename = "pong")]
    Pong {},
}

/// Frozen wire error codes (§7 of the taxonomy). Values are the literal
/// strings clients match on; never change one without a wire version bump.
pub mod error_codes {
    pub const BAD_SIGNATURE: &str = "bad_signature";
    pub const EXPIRED: &str = "expired";
    pub const REPLAY: &str = "replay";
    pub const ADDRESS_MISMATCH: &str = "address_mismatch";
    pub const NOT_REGISTERED: &str = "not_registered";
    pub const TOKEN_NOT_FOUND: &str = "token_not_found";
    pub const TOKEN_EXPIRED: &str = "token_expired";
    pub const TOKEN_REPLAY: &str = "token_replay";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const LIMIT_HOURLY_ATTEMPTS: &str = "limit_hourly_attempts";
    pub const LIMIT_DAILY_FAILED_STARTS: &str = "limit_daily_failed_starts";
    pub const LIMIT_DAILY_CALLS: &str = "limit_daily_calls";
    pub const LIMIT_MONTHLY_SECONDS: &str = "limit_monthly_seconds";
    pub const LIMIT_CONCURRENT_CALLS: &str = "limit_concurrent_calls";
    pub const NOT_APPROVED_CONTACT: &str = "not_approved_contact";
    pub const PAYMENT_REQUIRED: &str = "payment_required";
    pub const RECIPIENT_OFFLINE: &str = "recipient_offline";
    pub const DND: &str = "dnd";
    pub const UNKNOWN_MESSAGE_TYPE: &str = "unknown_message_type";
    pub const INTERNAL: &str = "internal";
}

/// Error event sent to a single sender. Never fanned out to anyone else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl ErrorMessage {
    pub fn new(code: &'static str, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            retryable,
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP payloads
// ---------------------------------------------------------------------------

/// Payload of the signed envelope posted to `/api/call-session-token`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSessionTokenRequest {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSessionTokenResponse {
    pub token: String,
    pub nonce: String,
    pub issued_at: i64,
    pub expires_at: i64,
    pub server_time: i64,
    pub plan: String,
    pub allow_turn: bool,
    pub allow_video: bool,
    pub turn_configured: bool,
    pub ice_servers: Vec<IceServer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceConfigResponse {
    pub mode: String,
    pub ice_servers: Vec<IceServer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub url: String,
    pub name: String,
    pub size: u64,
}

/// Frozen HTTP error envelope used by every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpErrorEnvelope {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_json_sorts_nested_keys() {
        let value = serde_json::json!({"b": 1, "a": {"d": 2, "c": 3}});
        assert_eq!(canonical_json(&value), r#"{"a":{"c":3,"d":2},"b":1}"#);
    }

    #[test]
    fn canonical_json_preserves_array_order() {
        let value = serde_json::json!({"z": [3, 1, 2]});
        assert_eq!(canonical_json(&value), r#"{"z":[3,1,2]}"#);
    }

    #[test]
    fn ws_message_round_trips_call_init() {
        let json = serde_json::json!({
            "kind": "call:init",
            "target_address": "call:abc",
            "call_session_token": "tok",
            "video": true
        });
        let msg: WsMessage = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(msg.kind(), "call:init");
        let back = serde_json::to_value(&msg).unwrap();
        assert_eq!(back, json);
    }

    #[test]
    fn ws_message_unknown_kind_does_not_fail() {
        let json = serde_json::json!({"kind": "nonsense:thing", "foo": 1});
        let msg: WsMessage = serde_json::from_value(json).unwrap();
        assert_eq!(msg.kind(), "nonsense:thing");
        assert!(matches!(msg, WsMessage::Unknown { .. }));
    }

    #[test]
    fn ws_message_family_kind_keeps_full_tag() {
        let json = serde_json::json!({"kind": "policy:set", "allow_calls_from": "contacts"});
        let msg: WsMessage = serde_json::from_value(json).unwrap();
        assert_eq!(msg.kind(), "policy:set");
        assert!(matches!(msg, WsMessage::Policy(_)));
    }

    #[test]
    fn signing_bytes_excludes_signature_field() {
        let envelope = Envelope {
            from_pubkey: "pk".to_string(),
            from_address: "call:addr".to_string(),
            nonce: "n1".to_string(),
            timestamp: 1_700_000_000,
            payload: WsMessage::Ping(Ping {}),
            signature: "sig-should-not-appear".to_string(),
        };
        let bytes = signing_bytes(&envelope).unwrap();
        assert!(!bytes.contains("sig-should-not-appear"));
        assert!(bytes.contains("\"ping\""));
    }
}
