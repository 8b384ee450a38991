use axum::http::StatusCode;
use hub_protocol::error_codes;

/// Every failure mode the hub can produce, mapped to a wire error code from
/// `hub_protocol::error_codes` and an HTTP status for the REST surface.
///
/// WebSocket handling never surfaces `HubError` directly — `ws.rs` converts
/// envelope-level failures into `ServerEvent::Error` frames without closing
/// the connection. This type is for the HTTP handlers and for anything in
/// the WS path that does warrant tearing the connection down.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("signature verification failed")]
    BadSignature,
    #[error("envelope timestamp outside the freshness window")]
    Expired,
    #[error("nonce already seen")]
    Replay,
    #[error("from_address does not match from_pubkey")]
    AddressMismatch,
    #[error("address is not registered on this connection")]
    NotRegistered,
    #[error("call session token not found")]
    TokenNotFound,
    #[error("call session token expired")]
    TokenExpired,
    #[error("call session token already used")]
    TokenReplay,
    #[error("rate limited: {0}")]
    RateLimited(&'static str),
    #[error("recipient has not approved this caller")]
    NotApprovedContact,
    #[error("payment required to continue")]
    PaymentRequired,
    #[error("recipient is offline")]
    RecipientOffline,
    #[error("recipient has do-not-disturb enabled")]
    Dnd,
    #[error("unknown message type")]
    UnknownMessageType,
    #[error("not found")]
    NotFound,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("internal error")]
    Internal,
}

impl HubError {
    pub fn wire_code(&self) -> &'static str {
        match self {
            Self::BadSignature => error_codes::BAD_SIGNATURE,
            Self::Expired => error_codes::EXPIRED,
            Self::Replay => error_codes::REPLAY,
            Self::AddressMismatch => error_codes::ADDRESS_MISMATCH,
            Self::NotRegistered => error_codes::NOT_REGISTERED,
            Self::TokenNotFound => error_codes::TOKEN_NOT_FOUND,
            Self::TokenExpired => error_codes::TOKEN_EXPIRED,
            Self::TokenReplay => error_codes::TOKEN_REPLAY,
            Self::RateLimited(code) => code,
            Self::NotApprovedContact => error_codes::NOT_APPROVED_CONTACT,
            Self::PaymentRequired => error_codes::PAYMENT_REQUIRED,
            Self::RecipientOffline => error_codes::RECIPIENT_OFFLINE,
            Self::Dnd => error_codes::DND,
            Self::UnknownMessageType => error_codes::UNKNOWN_MESSAGE_TYPE,
            Self::NotFound | Self::BadRequest(_) => "bad_request",
            Self::Database(_) | Self::Internal => error_codes::INTERNAL,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadSignature
            | Self::Expired
            | Self::Replay
            | Self::AddressMismatch
            | Self::NotRegistered
            | Self::UnknownMessageType
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::TokenNotFound | Self::NotFound => StatusCode::NOT_FOUND,
            Self::TokenExpired | Self::TokenReplay => StatusCode::GONE,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::NotApprovedContact | Self::Dnd => StatusCode::FORBIDDEN,
            Self::PaymentRequired => StatusCode::PAYMENT_REQUIRED,
            Self::RecipientOffline => StatusCode::CONFLICT,
            Self::Database(_) | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
