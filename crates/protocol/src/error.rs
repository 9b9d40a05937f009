use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// The five error kinds of the taxonomy. Only [`GatewayError::Internal`] is
/// fatal; every other kind is either a caller mistake (4xx) or has already
/// been contained at the stream-stage level before it ever reaches a caller.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Ingress parse failed: the request did not conform to the protocol it claims.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Upstream SSE frame was syntactically invalid, upstream JSON was
    /// unparseable, or a mandatory field was missing. Stream stages contain
    /// this themselves (§7); it only reaches a caller on a unary path.
    #[error("upstream protocol violation: {0}")]
    UpstreamProtocolViolation(String),

    /// Transport-level failure reaching the upstream provider.
    #[error("connection error: {0}")]
    ConnectionError(String),

    /// The upstream provider responded with a structured API error.
    #[error("provider API error ({status}): {message}")]
    ProviderApiError { status: u16, message: String },

    /// Client disconnected mid-stream. Carried so the caller can finalize the
    /// usage record with a `client_disconnect` status; never serialized to a client.
    #[error("client disconnected")]
    ClientDisconnect,

    /// IR was self-inconsistent. The only fatal kind.
    #[error("internal error")]
    Internal(Option<String>),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamProtocolViolation(_) => StatusCode::BAD_GATEWAY,
            Self::ConnectionError(_) => StatusCode::BAD_GATEWAY,
            Self::ProviderApiError { status, .. } => match *status {
                400 => StatusCode::BAD_REQUEST,
                401 => StatusCode::UNAUTHORIZED,
                403 => StatusCode::FORBIDDEN,
                404 => StatusCode::NOT_FOUND,
                429 => StatusCode::TOO_MANY_REQUESTS,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::ClientDisconnect => StatusCode::OK,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &str {
        match self {
            Self::MalformedRequest(_) => ERROR_TYPE_INVALID_REQUEST,
            Self::UpstreamProtocolViolation(_) | Self::ConnectionError(_) | Self::ProviderApiError { .. } => {
                ERROR_TYPE_API
            }
            Self::ClientDisconnect => ERROR_TYPE_API,
            Self::Internal(_) => "internal_error",
        }
    }

    /// Message safe to expose to API consumers; internal details are never leaked.
    pub fn client_message(&self) -> String {
        match self {
            Self::Internal(Some(provider_msg)) => provider_msg.clone(),
            Self::Internal(None) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

pub const ERROR_TYPE_INVALID_REQUEST: &str = "invalid_request_error";
pub const ERROR_TYPE_AUTHENTICATION: &str = "authentication_error";
pub const ERROR_TYPE_NOT_FOUND: &str = "not_found_error";
pub const ERROR_TYPE_RATE_LIMIT: &str = "rate_limit_error";
pub const ERROR_TYPE_API: &str = "api_error";
pub const ERROR_TYPE_OVERLOADED: &str = "overloaded_error";

/// OpenAI-shaped error envelope.
#[derive(Debug, Serialize)]
struct OpenAiErrorBody {
    error: OpenAiErrorDetails,
}

#[derive(Debug, Serialize)]
struct OpenAiErrorDetails {
    message: String,
    r#type: String,
    code: u16,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = OpenAiErrorBody {
            error: OpenAiErrorDetails {
                message: self.client_message(),
                r#type: self.error_type().to_string(),
                code: status.as_u16(),
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Anthropic-shaped error envelope, used by the `/v1/messages` handler so a
/// client that only understands Anthropic errors still gets a shape it expects.
#[derive(Debug, Serialize)]
pub struct AnthropicErrorBody {
    pub r#type: &'static str,
    pub error: AnthropicErrorDetails,
}

#[derive(Debug, Serialize)]
pub struct AnthropicErrorDetails {
    pub r#type: String,
    pub message: String,
}

pub struct AnthropicError {
    status: StatusCode,
    body: AnthropicErrorBody,
}

impl From<GatewayError> for AnthropicError {
    fn from(error: GatewayError) -> Self {
        let status = error.status_code();
        let r#type = error.error_type().to_string();
        let message = error.client_message();

        Self {
            status,
            body: AnthropicErrorBody {
                r#type: "error",
                error: AnthropicErrorDetails { r#type, message },
            },
        }
    }
}

impl IntoResponse for AnthropicError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub type AnthropicResult<T> = std::result::Result<T, AnthropicError>;
