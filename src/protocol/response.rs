//! Response envelope and status codes.
//!
//! # Format
//!
//! ```json
//! {
//!   "requestId": "uuid",
//!   "status": { "code": 206, "message": "", "attributes": {} },
//!   "result": { "data": [ ... ], "meta": {} }
//! }
//! ```
//!
//! `result.data` is kept as raw JSON text. The client never interprets it;
//! callers decode it into their own types with [`ResultData::decode`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::{RawValue, to_raw_value};
use serde_json::{Map, Value as JsonValue};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

// ============================================================================
// StatusCode
// ============================================================================

/// Numeric response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub u16);

impl StatusCode {
    /// Success, final frame.
    pub const SUCCESS: Self = Self(200);
    /// Success with no result data, final frame.
    pub const NO_CONTENT: Self = Self(204);
    /// Success, more frames follow.
    pub const PARTIAL_CONTENT: Self = Self(206);
    /// Credentials rejected.
    pub const UNAUTHORIZED: Self = Self(401);
    /// Server demands SASL authentication.
    pub const AUTHENTICATE: Self = Self(407);
    /// Generic server failure.
    pub const SERVER_ERROR: Self = Self(500);
    /// Server-side evaluation timed out.
    pub const SERVER_TIMEOUT: Self = Self(598);
    /// Server rejected the request as malformed.
    pub const MALFORMED_REQUEST: Self = Self(599);

    /// Returns the numeric value.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Classifies the code.
    #[must_use]
    pub const fn class(self) -> StatusClass {
        match self.0 {
            200 | 204 => StatusClass::SuccessFinal,
            206 => StatusClass::SuccessPartial,
            400..=499 => StatusClass::ClientError,
            590..=599 => StatusClass::ProtocolError,
            500..=589 => StatusClass::ServerError,
            _ => StatusClass::Unknown,
        }
    }

    /// Returns `true` unless more frames follow for this request.
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self.class(), StatusClass::SuccessPartial)
    }

    /// Returns `true` for 200, 204 and 206.
    #[inline]
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(
            self.class(),
            StatusClass::SuccessFinal | StatusClass::SuccessPartial
        )
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for StatusCode {
    #[inline]
    fn from(code: u16) -> Self {
        Self(code)
    }
}

/// Partition of status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 200, 204.
    SuccessFinal,
    /// 206.
    SuccessPartial,
    /// 4xx.
    ClientError,
    /// 500-589.
    ServerError,
    /// 590-599.
    ProtocolError,
    /// Anything else; treated as a terminal error.
    Unknown,
}

// ============================================================================
// Status
// ============================================================================

/// Status block of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    /// Status code.
    pub code: StatusCode,

    /// Human-readable message (empty on success).
    #[serde(default)]
    pub message: String,

    /// Server-specific attributes.
    #[serde(default)]
    pub attributes: Map<String, JsonValue>,
}

impl Status {
    /// Creates a status with an empty message and no attributes.
    #[must_use]
    pub fn new(code: StatusCode) -> Self {
        Self {
            code,
            message: String::new(),
            attributes: Map::new(),
        }
    }
}

// ============================================================================
// ResultData
// ============================================================================

/// Opaque result payload, kept as raw JSON text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultData(Option<Box<RawValue>>);

impl ResultData {
    /// Serializes `value` into a payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if `value` cannot be serialized.
    pub fn from_json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self(Some(to_raw_value(value)?)))
    }

    /// Returns `true` if the server sent no data (`null`).
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// Raw JSON text of the payload (`"null"` when absent).
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_deref().map_or("null", RawValue::get)
    }

    /// Raw payload bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.as_str().as_bytes()
    }

    /// Deserializes the payload into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the payload does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(self.as_str())?)
    }
}

impl PartialEq for ResultData {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

// ============================================================================
// ResponseResult
// ============================================================================

/// Result block of a response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseResult {
    /// Result batch.
    #[serde(default)]
    pub data: ResultData,

    /// Server-specific metadata.
    #[serde(default)]
    pub meta: Map<String, JsonValue>,
}

// ============================================================================
// Response
// ============================================================================

/// One response frame from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Matches the request `id`.
    #[serde(rename = "requestId")]
    pub request_id: RequestId,

    /// Status block.
    pub status: Status,

    /// Result block.
    #[serde(default)]
    pub result: ResponseResult,
}

impl Response {
    /// Creates a response with the given code and payload.
    #[must_use]
    pub fn new(request_id: RequestId, code: StatusCode, data: ResultData) -> Self {
        Self {
            request_id,
            status: Status::new(code),
            result: ResponseResult {
                data,
                meta: Map::new(),
            },
        }
    }

    /// Creates an error response carrying `message`.
    #[must_use]
    pub fn error(request_id: RequestId, code: StatusCode, message: impl Into<String>) -> Self {
        let mut response = Self::new(request_id, code, ResultData::default());
        response.status.message = message.into();
        response
    }

    /// Status code of this frame.
    #[inline]
    #[must_use]
    pub fn code(&self) -> StatusCode {
        self.status.code
    }

    /// Returns `true` if no more frames follow for this request.
    #[inline]
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.status.code.is_terminal()
    }

    /// Returns `true` if more frames follow.
    #[inline]
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.is_final()
    }

    /// Returns `true` for success codes (final or partial).
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.code.is_success()
    }

    /// Result payload.
    #[inline]
    #[must_use]
    pub fn data(&self) -> &ResultData {
        &self.result.data
    }

    /// Converts a terminal error status into [`Error::Server`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Server`] with the code and message when the status
    /// is not a success code.
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::server(self.status.code.0, self.status.message))
        }
    }
}

// ============================================================================
// AsyncResponse
// ============================================================================

/// One element of a streamed response.
///
/// `sequence` is the 0-based position of this element in the stream for
/// its request. The last element is either a final success frame or an
/// error.
#[derive(Debug)]
pub struct AsyncResponse {
    /// Position within the stream.
    pub sequence: usize,

    /// The frame, or the error that ended the stream.
    pub result: Result<Response>,
}

impl AsyncResponse {
    /// Returns `true` if this element ends the stream.
    #[inline]
    #[must_use]
    pub fn is_final(&self) -> bool {
        match &self.result {
            Ok(response) => response.is_final(),
            Err(_) => true,
        }
    }

    /// Returns the frame, if this element is not an error.
    #[inline]
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        self.result.as_ref().ok()
    }

    /// Unwraps into the inner result.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the stream.
    #[inline]
    pub fn into_result(self) -> Result<Response> {
        self.result
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_status_classes() {
        assert_eq!(StatusCode::SUCCESS.class(), StatusClass::SuccessFinal);
        assert_eq!(StatusCode::NO_CONTENT.class(), StatusClass::SuccessFinal);
        assert_eq!(StatusCode::PARTIAL_CONTENT.class(), StatusClass::SuccessPartial);
        assert_eq!(StatusCode::UNAUTHORIZED.class(), StatusClass::ClientError);
        assert_eq!(StatusCode(597).class(), StatusClass::ProtocolError);
        assert_eq!(StatusCode::SERVER_ERROR.class(), StatusClass::ServerError);
        assert_eq!(StatusCode(302).class(), StatusClass::Unknown);
    }

    #[test]
    fn test_only_partial_is_not_terminal() {
        assert!(!StatusCode::PARTIAL_CONTENT.is_terminal());
        assert!(StatusCode::SUCCESS.is_terminal());
        assert!(StatusCode::SERVER_TIMEOUT.is_terminal());
        assert!(StatusCode(302).is_terminal());
    }

    #[test]
    fn test_parse_success_response() {
        let json_str = r#"{
            "requestId": "550e8400-e29b-41d4-a716-446655440000",
            "status": {"code": 200, "message": "", "attributes": {}},
            "result": {"data": ["Phil"], "meta": {}}
        }"#;

        let response: Response = serde_json::from_str(json_str).expect("parse");
        assert!(response.is_final());
        assert!(response.is_success());
        let labels: Vec<String> = response.data().decode().expect("decode");
        assert_eq!(labels, vec!["Phil".to_string()]);
    }

    #[test]
    fn test_parse_error_response_without_result() {
        let json_str = r#"{
            "requestId": "550e8400-e29b-41d4-a716-446655440000",
            "status": {"code": 597, "message": "No such property: x"}
        }"#;

        let response: Response = serde_json::from_str(json_str).expect("parse");
        assert!(response.data().is_null());
        assert_eq!(response.data().as_str(), "null");

        let err = response.into_result().unwrap_err();
        assert_eq!(err.status_code(), Some(597));
    }

    #[test]
    fn test_result_data_keeps_raw_text() {
        let data = ResultData::from_json(&json!([{"id": "1234"}])).expect("raw");
        assert_eq!(data.as_str(), r#"[{"id":"1234"}]"#);
        assert!(!data.is_null());
    }

    #[test]
    fn test_async_response_final_flag() {
        let id = RequestId::generate();
        let partial = AsyncResponse {
            sequence: 0,
            result: Ok(Response::new(id, StatusCode::PARTIAL_CONTENT, ResultData::default())),
        };
        let failed = AsyncResponse {
            sequence: 1,
            result: Err(Error::ConnectionClosed),
        };

        assert!(!partial.is_final());
        assert!(partial.response().is_some());
        assert!(failed.is_final());
        assert!(failed.response().is_none());
    }
}
