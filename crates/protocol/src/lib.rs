//! Companion surface wire protocol.
//!
//! All communication between the agent and the client surface uses JSON
//! frames. A frame is one of:
//! - `req`: a remote call (agent → client for content control, client →
//!   agent for selection forwarding)
//! - `res`: the result of a remote call, correlated by `id`
//! - `event`: a one-way push (data messages, presence)
//!
//! Call payloads themselves are opaque JSON objects handled by the
//! [`codec`] module; the typed bodies exchanged through them live here too.

use std::{borrow::Cow, fmt, hash::Hash};

use serde::{Deserialize, Serialize};

pub mod codec;

pub use codec::{DecodeError, decode, decode_str, encode, encoded_len};

// ── Constants ────────────────────────────────────────────────────────────────

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_PAYLOAD_BYTES: usize = 65_536; // 64 KB
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 10_000; // 10s
pub const DEFAULT_AGENT_IDENTITY: &str = "agent";

// ── Method names ─────────────────────────────────────────────────────────────

pub mod methods {
    /// Show or hide a grid of entity cards.
    pub const DISPLAY_CARDS: &str = "client.displayCards";
    /// Open or close the detail modal of a displayed card.
    pub const CONTROL_CARD_MODAL: &str = "client.controlCardModal";
    /// Show or hide the donation/sponsorship order lists.
    pub const DISPLAY_ORDERS: &str = "client.displayOrders";
    /// Open or close the detail modal of a displayed order.
    pub const CONTROL_ORDER_MODAL: &str = "client.controlOrderModal";

    /// Tell the agent the user picked a card.
    pub const SELECT_CARD: &str = "agent.selectCard";
    /// Tell the agent the user picked an order.
    pub const SELECT_ORDER: &str = "agent.selectOrder";

    /// Every method the client surface answers.
    pub const INBOUND: &[&str] = &[
        DISPLAY_CARDS,
        CONTROL_CARD_MODAL,
        DISPLAY_ORDERS,
        CONTROL_ORDER_MODAL,
    ];
}

// ── Events ───────────────────────────────────────────────────────────────────

pub mod events {
    /// Raw data packet addressed to the agent (`{"message": ...}`).
    pub const DATA: &str = "data";
    /// Sent once after connecting: `{"identity": ..., "protocol": ...}`.
    pub const PRESENCE: &str = "presence";
}

// ── Error codes ──────────────────────────────────────────────────────────────

pub mod error_codes {
    // Call validation
    pub const DECODE_ERROR: &str = "DECODE_ERROR";
    pub const INVALID_ACTION: &str = "INVALID_ACTION";
    pub const MISSING_FIELD: &str = "MISSING_FIELD";
    pub const INVALID_FIELD: &str = "INVALID_FIELD";
    pub const NO_SUCH_ENTITY: &str = "NO_SUCH_ENTITY";

    // Transport
    pub const UNKNOWN_METHOD: &str = "UNKNOWN_METHOD";
    pub const UNAVAILABLE: &str = "UNAVAILABLE";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const TRANSPORT_FAILURE: &str = "TRANSPORT_FAILURE";
    pub const PAYLOAD_TOO_LARGE: &str = "PAYLOAD_TOO_LARGE";
    pub const CONFLICT: &str = "CONFLICT";
    pub const INTERNAL: &str = "INTERNAL";
}

// ── Error shape ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorShape {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }
}

impl fmt::Display for ErrorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

// ── Frames ───────────────────────────────────────────────────────────────────

/// A remote call. `destination` names the participant expected to answer;
/// absent means "whoever registered the method on the other end".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    #[serde(rename = "destinationIdentity", skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

impl RequestFrame {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params: Some(params),
            destination: None,
        }
    }

    #[must_use]
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }
}

/// Result of a remote call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl ResponseFrame {
    pub fn ok(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, error: ErrorShape) -> Self {
        Self {
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(error),
        }
    }
}

/// One-way push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, payload: serde_json::Value, seq: u64) -> Self {
        Self {
            event: event.into(),
            payload: Some(payload),
            seq: Some(seq),
        }
    }
}

/// Discriminated union of all frame types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChannelFrame {
    #[serde(rename = "req")]
    Request(RequestFrame),
    #[serde(rename = "res")]
    Response(ResponseFrame),
    #[serde(rename = "event")]
    Event(EventFrame),
}

// ── Entity identifiers ───────────────────────────────────────────────────────

/// Opaque entity identifier as it appeared on the wire.
///
/// The original representation is preserved so echoed ids round-trip
/// unchanged, but equality and hashing go through [`EntityId::canonical`]:
/// `7` and `"7"` are the same id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Text(String),
    Number(serde_json::Number),
}

impl EntityId {
    /// Accept a JSON string or number; anything else is not an id.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            serde_json::Value::Number(n) => Some(Self::Number(n.clone())),
            _ => None,
        }
    }

    /// Canonical string form used for every comparison.
    pub fn canonical(&self) -> Cow<'_, str> {
        match self {
            Self::Text(s) => Cow::Borrowed(s.as_str()),
            Self::Number(n) => Cow::Owned(n.to_string()),
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Text(s) if s.trim().is_empty())
    }
}

impl PartialEq for EntityId {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for EntityId {}

impl Hash for EntityId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<u64> for EntityId {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

// ── Order types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Donation,
    Sponsorship,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Donation => "donation",
            Self::Sponsorship => "sponsorship",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "donation" => Some(Self::Donation),
            "sponsorship" => Some(Self::Sponsorship),
            _ => None,
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Call responses ───────────────────────────────────────────────────────────

/// `{id, title}` pair echoed back for every displayed entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub id: EntityId,
    pub title: String,
}

/// Body returned by every inbound call. Failures are data, never faults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CallResponse {
    Success(SuccessBody),
    Error { message: String },
}

/// Operation-specific success payload, flattened next to `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SuccessBody {
    Cards {
        cards: Vec<EntitySummary>,
    },
    Orders {
        donations: Vec<EntitySummary>,
        sponsorships: Vec<EntitySummary>,
    },
    CardOpened {
        #[serde(rename = "cardId")]
        card_id: EntityId,
        message: String,
    },
    OrderOpened {
        #[serde(rename = "orderId")]
        order_id: EntityId,
        #[serde(rename = "orderType")]
        order_type: OrderType,
        message: String,
    },
    // Must stay last: it matches any object during deserialization.
    Done {},
}

impl CallResponse {
    pub fn done() -> Self {
        Self::Success(SuccessBody::Done {})
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

// ── Outbound payloads ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectAction {
    #[default]
    Select,
}

/// Params of `agent.selectCard`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectCardParams {
    #[serde(rename = "cardId")]
    pub card_id: EntityId,
    pub title: String,
    pub action: SelectAction,
}

/// Params of `agent.selectOrder`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOrderParams {
    #[serde(rename = "orderId")]
    pub order_id: EntityId,
    #[serde(rename = "orderType")]
    pub order_type: OrderType,
    pub action: SelectAction,
}

/// Data packet the agent turns into a system utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataMessage {
    pub message: String,
}
