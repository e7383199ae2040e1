use serde::Deserialize;
use sluice_core::{Envelope, HeaderMap, DESCRIPTION_HEADER, STATUS_HEADER};
use thiserror::Error;

/// Status code used by the server for "no messages" and for "not found".
pub const STATUS_NOT_FOUND: u16 = 404;
/// Status code signalling that a pull request expired server-side.
pub const STATUS_REQUEST_TIMEOUT: u16 = 408;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_SERVER_ERROR: u16 = 500;
pub const STATUS_SERVICE_UNAVAILABLE: u16 = 503;

/// Description that distinguishes an empty pull response from a real 404.
pub const NO_MESSAGES_DESCRIPTION: &str = "No Messages";

/// API sub-code for a missing stream.
pub const ERR_CODE_STREAM_NOT_FOUND: u16 = 10059;
/// API sub-code for a missing consumer.
pub const ERR_CODE_CONSUMER_NOT_FOUND: u16 = 10014;

/// Typed errors reported by the server, either through a status header or a
/// JSON API error body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("service unavailable: {description}")]
    ServiceUnavailable { description: String },
    #[error("server error: {description}")]
    ServerError { description: String },
    #[error("stream not found: {description}")]
    StreamNotFound { description: String },
    #[error("consumer not found: {description}")]
    ConsumerNotFound { description: String },
    #[error("not found: {description}")]
    NotFound { description: String },
    #[error("bad request: {description}")]
    BadRequest { description: String },
    /// Any other status, carrying the raw values.
    #[error("api error (code={code}, err_code={err_code:?}): {description}")]
    Other {
        code: u16,
        err_code: Option<u16>,
        description: String,
    },
}

impl ApiError {
    /// Status code this error was mapped from.
    pub fn code(&self) -> u16 {
        match self {
            Self::ServiceUnavailable { .. } => STATUS_SERVICE_UNAVAILABLE,
            Self::ServerError { .. } => STATUS_SERVER_ERROR,
            Self::StreamNotFound { .. } | Self::ConsumerNotFound { .. } | Self::NotFound { .. } => {
                STATUS_NOT_FOUND
            }
            Self::BadRequest { .. } => STATUS_BAD_REQUEST,
            Self::Other { code, .. } => *code,
        }
    }
}

/// Maps a status code, optional API sub-code and description onto [`ApiError`].
pub fn to_error(code: u16, err_code: Option<u16>, description: Option<&str>) -> ApiError {
    let description = description.unwrap_or_default().to_string();
    match (code, err_code) {
        (STATUS_SERVICE_UNAVAILABLE, _) => ApiError::ServiceUnavailable { description },
        (STATUS_SERVER_ERROR, _) => ApiError::ServerError { description },
        (STATUS_NOT_FOUND, Some(ERR_CODE_STREAM_NOT_FOUND)) => {
            ApiError::StreamNotFound { description }
        }
        (STATUS_NOT_FOUND, Some(ERR_CODE_CONSUMER_NOT_FOUND)) => {
            ApiError::ConsumerNotFound { description }
        }
        (STATUS_NOT_FOUND, _) => ApiError::NotFound { description },
        (STATUS_BAD_REQUEST, _) => ApiError::BadRequest { description },
        _ => ApiError::Other {
            code,
            err_code,
            description,
        },
    }
}

/// Status carried by a control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlStatus {
    /// A no-wait pull found nothing to deliver.
    NoMessages,
    /// An expiring pull request ran out of time on the server.
    RequestTimeout,
    /// Any other status; `code` is 0 when the header value was not numeric.
    Other {
        code: u16,
        description: Option<String>,
    },
}

impl ControlStatus {
    fn from_header(code: &str, description: Option<&str>) -> Self {
        let code = code.trim().parse::<u16>().unwrap_or(0);
        let description = description.map(str::trim).filter(|d| !d.is_empty());
        match code {
            STATUS_NOT_FOUND
                if description
                    .is_some_and(|d| d.eq_ignore_ascii_case(NO_MESSAGES_DESCRIPTION)) =>
            {
                Self::NoMessages
            }
            STATUS_REQUEST_TIMEOUT => Self::RequestTimeout,
            _ => Self::Other {
                code,
                description: description.map(str::to_string),
            },
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            Self::NoMessages => STATUS_NOT_FOUND,
            Self::RequestTimeout => STATUS_REQUEST_TIMEOUT,
            Self::Other { code, .. } => *code,
        }
    }

    /// True for the two sentinels a pull fetch expects and handles itself.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::NoMessages | Self::RequestTimeout)
    }

    /// Maps this status through [`to_error`].
    pub fn to_error(&self) -> ApiError {
        match self {
            Self::NoMessages => to_error(STATUS_NOT_FOUND, None, Some(NO_MESSAGES_DESCRIPTION)),
            Self::RequestTimeout => to_error(STATUS_REQUEST_TIMEOUT, None, None),
            Self::Other { code, description } => to_error(*code, None, description.as_deref()),
        }
    }
}

/// A status-only message; never handed to application code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    pub subject: String,
    pub status: ControlStatus,
    pub headers: HeaderMap,
}

/// Inbound message after boundary classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Data(Envelope),
    Control(ControlMessage),
}

impl Inbound {
    pub fn subject(&self) -> &str {
        match self {
            Self::Data(env) => &env.subject,
            Self::Control(ctrl) => &ctrl.subject,
        }
    }

    /// Payload bytes counted against queue limits; control messages count zero.
    pub fn payload_len(&self) -> usize {
        match self {
            Self::Data(env) => env.payload_len(),
            Self::Control(_) => 0,
        }
    }
}

/// Classifies an envelope: control iff it carries a `Status` header.
pub fn classify(envelope: Envelope) -> Inbound {
    let Some(code) = envelope.header(STATUS_HEADER) else {
        return Inbound::Data(envelope);
    };
    let status = ControlStatus::from_header(code, envelope.header(DESCRIPTION_HEADER));
    Inbound::Control(ControlMessage {
        subject: envelope.subject,
        status,
        headers: envelope.headers.unwrap_or_default(),
    })
}

/// Error object inside a JSON API response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiErrorBody {
    pub code: u16,
    #[serde(default)]
    pub err_code: Option<u16>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Envelope of a JSON API response; unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiResponse {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

/// Extracts an API error from a JSON response body, if it carries one.
///
/// Bodies that are empty or not JSON objects are not errors.
pub fn decode_api_error(payload: &[u8]) -> Option<ApiError> {
    if payload.is_empty() {
        return None;
    }
    let response: ApiResponse = serde_json::from_slice(payload).ok()?;
    response
        .error
        .map(|e| to_error(e.code, e.err_code, e.description.as_deref()))
}

/// Checks a direct request response for either a status header or a JSON
/// API error, applying the same mapping as pull-fetch sentinels.
pub fn check_response(envelope: Envelope) -> Result<Envelope, ApiError> {
    match classify(envelope) {
        Inbound::Control(ctrl) => Err(ctrl.status.to_error()),
        Inbound::Data(env) => match decode_api_error(&env.payload) {
            Some(err) => Err(err),
            None => Ok(env),
        },
    }
}
