use thiserror::Error;

use crate::model::{Command, EndpointKind};

/// Top-level error type for the `elmax-api` crate.
///
/// Mirrors the failure modes of the Elmax cloud service: authentication,
/// panel code validation, panel contention, transport, and generic HTTP
/// failures. Every variant maps back to the HTTP status that produced it
/// through [`Error::status_code`].
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login refused: wrong username/password, or credentials that could
    /// never be valid (empty username or password).
    #[error("Login failed: invalid username or password")]
    BadLogin,

    /// The panel code (PIN) was missing or refused by the panel.
    #[error("Panel code refused")]
    BadPin,

    /// The service kept rejecting the session after a fresh login.
    #[error("Session expired -- re-authentication did not restore access")]
    SessionExpired,

    /// The login response did not carry a usable JWT.
    #[error("Invalid session token: {0}")]
    InvalidToken(String),

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// URL parsing or construction error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS configuration or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Service ─────────────────────────────────────────────────────
    /// The panel is processing another operation (HTTP 422).
    #[error("Panel busy -- another operation is in progress")]
    PanelBusy,

    /// Any other non-success HTTP response.
    #[error("API error (HTTP {status_code}): {message}")]
    Api { status_code: u16, message: String },

    // ── Commands ────────────────────────────────────────────────────
    /// The command cannot target this kind of endpoint. Raised before
    /// anything is sent to the service.
    #[error("{command} cannot be sent to {kind} endpoint {endpoint_id}")]
    CapabilityMismatch {
        endpoint_id: String,
        kind: EndpointKind,
        command: Command,
    },

    /// `get_current_panel_status` on a cloud client with no panel chosen
    /// through `set_current_panel`.
    #[error("No current panel selected")]
    NoPanelSelected,

    // ── Push channel ────────────────────────────────────────────────
    /// WebSocket connection failed or broke.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// The HTTP status code this error stands for, when there is one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::BadLogin | Self::SessionExpired => Some(401),
            Self::BadPin => Some(403),
            Self::PanelBusy => Some(422),
            Self::Api { status_code, .. } => Some(*status_code),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns `true` if the session is no longer accepted and a new
    /// login is required.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::SessionExpired | Self::InvalidToken(_))
    }

    /// Returns `true` if this is a transient error worth retrying.
    ///
    /// The client never retries on its own; this is a hint for callers.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            Self::PanelBusy | Self::WebSocketConnect(_) => true,
            _ => false,
        }
    }

    /// Build the error for a non-success HTTP status on an authorized call.
    ///
    /// 401 is handled by the caller (it triggers re-authentication), so it
    /// only reaches this function once the retry has been spent.
    pub(crate) fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 => Self::SessionExpired,
            403 => Self::BadPin,
            422 => Self::PanelBusy,
            code => Self::Api {
                status_code: code,
                message: preview(body).to_owned(),
            },
        }
    }
}

/// First 200 bytes of a response body, cut on a char boundary.
pub(crate) fn preview(body: &str) -> &str {
    let mut end = body.len().min(200);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
