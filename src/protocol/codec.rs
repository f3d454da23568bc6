//! Frame encoding and decoding.
//!
//! Every message is one WebSocket binary frame laid out as:
//!
//! ```text
//! ┌──────────┬────────────────────┬──────────────────────┐
//! │ len: u8  │ mime type (len B)  │ JSON body            │
//! └──────────┴────────────────────┴──────────────────────┘
//! ```
//!
//! The codec is a pure per-frame transform. It never looks at earlier
//! frames; stitching partial results together is the connection's job.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Serialize;
#[cfg(test)]
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

#[cfg(test)]
use super::request::DEFAULT_LANGUAGE;
use super::request::{Operation, Request};
use super::response::Response;
use super::value::{Bindings, validate_bindings};

// ============================================================================
// Constants
// ============================================================================

/// Mime type sent in the frame header by default.
pub const DEFAULT_MIME_TYPE: &str = "application/json";

/// Wire name of the SASL handshake operation.
const AUTHENTICATION_OP: &str = "authentication";

/// SASL mechanism advertised in authentication frames.
const SASL_MECHANISM: &str = "PLAIN";

// ============================================================================
// Framing
// ============================================================================

/// How inbound response frames are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// `[len][mime][body]`, same as requests.
    #[default]
    MimePrefixed,
    /// Body only.
    Bare,
}

// ============================================================================
// Wire Structures
// ============================================================================

#[derive(Serialize)]
struct EvalFrame<'a> {
    #[serde(rename = "requestId")]
    request_id: RequestId,
    op: Operation,
    processor: &'a str,
    args: EvalArgs<'a>,
}

#[derive(Serialize)]
struct EvalArgs<'a> {
    gremlin: &'a str,
    bindings: &'a Bindings,
    language: &'a str,
    #[serde(skip_serializing_if = "is_empty_map")]
    aliases: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
struct AuthFrame<'a> {
    #[serde(rename = "requestId")]
    request_id: RequestId,
    op: &'static str,
    processor: &'static str,
    args: AuthArgs<'a>,
}

#[derive(Serialize)]
struct AuthArgs<'a> {
    sasl: &'a str,
    #[serde(rename = "saslMechanism")]
    sasl_mechanism: &'static str,
}

#[cfg(test)]
#[derive(Deserialize)]
struct InboundFrame {
    #[serde(rename = "requestId")]
    request_id: RequestId,
    op: String,
    #[serde(default)]
    processor: String,
    #[serde(default)]
    args: InboundArgs,
}

#[cfg(test)]
#[derive(Deserialize, Default)]
struct InboundArgs {
    #[serde(default)]
    gremlin: String,
    #[serde(default)]
    bindings: Bindings,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    aliases: BTreeMap<String, String>,
    #[serde(default)]
    sasl: Option<String>,
}

fn is_empty_map(map: &&BTreeMap<String, String>) -> bool {
    map.is_empty()
}

// ============================================================================
// ClientMessage
// ============================================================================

/// A client-to-server frame, as seen by a server.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ClientMessage {
    /// A script submission.
    Eval(Request),
    /// A SASL response to a 407 challenge.
    Authentication {
        /// The challenged request.
        request_id: RequestId,
        /// Base64 SASL payload.
        sasl: String,
    },
}

// ============================================================================
// Codec
// ============================================================================

/// Stateless frame encoder/decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Codec {
    mime_type: String,
    response_framing: Framing,
}

impl Default for Codec {
    fn default() -> Self {
        Self {
            mime_type: DEFAULT_MIME_TYPE.to_string(),
            response_framing: Framing::MimePrefixed,
        }
    }
}

impl Codec {
    /// Creates a codec for a specific mime type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the mime type is empty or longer than
    /// 255 bytes.
    pub fn new(mime_type: impl Into<String>) -> Result<Self> {
        let mime_type = mime_type.into();
        if mime_type.is_empty() || mime_type.len() > usize::from(u8::MAX) {
            return Err(Error::config(format!(
                "mime type must be 1..=255 bytes, got {}",
                mime_type.len()
            )));
        }
        Ok(Self {
            mime_type,
            response_framing: Framing::MimePrefixed,
        })
    }

    /// Sets how inbound responses are framed.
    #[inline]
    #[must_use]
    pub fn with_response_framing(mut self, framing: Framing) -> Self {
        self.response_framing = framing;
        self
    }

    /// Mime type written in frame headers.
    #[inline]
    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Response framing in use.
    #[inline]
    #[must_use]
    pub fn response_framing(&self) -> Framing {
        self.response_framing
    }
}

// ============================================================================
// Codec - Client Side
// ============================================================================

impl Codec {
    /// Encodes a request into a frame.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyScript`] if the operation needs a script and it is blank
    /// - [`Error::UnsupportedBinding`] if a binding cannot be represented
    /// - [`Error::Json`] if serialization fails
    pub fn encode_request(&self, request: &Request) -> Result<Vec<u8>> {
        if request.operation.requires_script() && request.script.trim().is_empty() {
            return Err(Error::EmptyScript);
        }
        validate_bindings(&request.bindings)?;

        let frame = EvalFrame {
            request_id: request.id,
            op: request.operation,
            processor: &request.processor,
            args: EvalArgs {
                gremlin: &request.script,
                bindings: &request.bindings,
                language: &request.language,
                aliases: &request.aliases,
            },
        };

        self.frame(&frame)
    }

    /// Encodes a SASL authentication answer for `request_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn encode_authentication(&self, request_id: RequestId, sasl: &str) -> Result<Vec<u8>> {
        let frame = AuthFrame {
            request_id,
            op: AUTHENTICATION_OP,
            processor: "",
            args: AuthArgs {
                sasl,
                sasl_mechanism: SASL_MECHANISM,
            },
        };

        self.frame(&frame)
    }

    /// Decodes one response frame using the configured framing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] on truncated input, a malformed header or
    /// an unparsable body.
    pub fn decode_response(&self, bytes: &[u8]) -> Result<Response> {
        let body = match self.response_framing {
            Framing::MimePrefixed => self.split_frame(bytes)?,
            Framing::Bare => bytes,
        };
        Self::decode_response_body(body)
    }

    /// Decodes a response body that carries no mime header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the body is not a response envelope.
    pub fn decode_response_body(body: &[u8]) -> Result<Response> {
        serde_json::from_slice(body).map_err(|e| Error::decode(format!("response body: {e}")))
    }
}

// ============================================================================
// Codec - Server Side
// ============================================================================

#[cfg(test)]
impl Codec {
    /// Encodes a response using the configured framing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub(crate) fn encode_response(&self, response: &Response) -> Result<Vec<u8>> {
        match self.response_framing {
            Framing::MimePrefixed => self.frame(response),
            Framing::Bare => Ok(serde_json::to_vec(response)?),
        }
    }

    /// Decodes a client frame of any operation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] on a malformed frame or unknown operation.
    pub(crate) fn decode_client_message(&self, bytes: &[u8]) -> Result<ClientMessage> {
        let body = self.split_frame(bytes)?;
        let frame: InboundFrame = serde_json::from_slice(body)
            .map_err(|e| Error::decode(format!("request body: {e}")))?;

        match frame.op.as_str() {
            "eval" => Ok(ClientMessage::Eval(Request {
                id: frame.request_id,
                operation: Operation::Eval,
                processor: frame.processor,
                script: frame.args.gremlin,
                bindings: frame.args.bindings,
                language: frame
                    .args
                    .language
                    .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
                aliases: frame.args.aliases,
            })),
            AUTHENTICATION_OP => Ok(ClientMessage::Authentication {
                request_id: frame.request_id,
                sasl: frame.args.sasl.unwrap_or_default(),
            }),
            other => Err(Error::decode(format!("unknown op '{other}'"))),
        }
    }

    /// Decodes an eval request frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the frame is malformed or not an eval.
    pub(crate) fn decode_request(&self, bytes: &[u8]) -> Result<Request> {
        match self.decode_client_message(bytes)? {
            ClientMessage::Eval(request) => Ok(request),
            ClientMessage::Authentication { .. } => {
                Err(Error::decode("expected eval, got authentication"))
            }
        }
    }
}

// ============================================================================
// Codec - Framing
// ============================================================================

impl Codec {
    /// Serializes `body` and prepends the mime header.
    fn frame<T: Serialize + ?Sized>(&self, body: &T) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(body)?;
        let mime = self.mime_type.as_bytes();

        let mut out = Vec::with_capacity(1 + mime.len() + json.len());
        // Length fits: checked in `new`, and the default is short.
        out.push(mime.len() as u8);
        out.extend_from_slice(mime);
        out.extend_from_slice(&json);
        Ok(out)
    }

    /// Validates the mime header and returns the body slice.
    fn split_frame<'a>(&self, bytes: &'a [u8]) -> Result<&'a [u8]> {
        let (&len, rest) = bytes
            .split_first()
            .ok_or_else(|| Error::decode("empty frame"))?;
        let len = usize::from(len);

        if len == 0 {
            return Err(Error::decode("zero-length mime header"));
        }
        if rest.len() < len {
            return Err(Error::decode(format!(
                "truncated header: need {len} bytes, have {}",
                rest.len()
            )));
        }

        let (mime, body) = rest.split_at(len);
        if mime != self.mime_type.as_bytes() {
            return Err(Error::decode(format!(
                "unexpected mime type '{}'",
                String::from_utf8_lossy(mime)
            )));
        }
        if body.is_empty() {
            return Err(Error::decode("frame has no body"));
        }

        Ok(body)
    }
}

// ============================================================================
// Tests
// ============================================================================
