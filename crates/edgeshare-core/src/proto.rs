//! Protocol buffer message definitions
//!
//! These are manually defined with prost derives, avoiding the need for
//! protoc at build time. Every message travels inside an [`Envelope`] whose
//! `payload` oneof is the closed set of message kinds the network speaks.

use crate::{Error, Result, PROTOCOL_VERSION};
use prost::Message;

/// Message envelope wrapping all protocol messages
#[derive(Clone, PartialEq, Message)]
pub struct Envelope {
    /// Protocol version
    #[prost(uint32, tag = "1")]
    pub version: u32,
    /// Request ID for correlation
    #[prost(uint64, tag = "2")]
    pub request_id: u64,
    /// The actual message payload
    #[prost(oneof = "Payload", tags = "10, 11, 12, 13, 14, 20, 21, 22, 100")]
    pub payload: Option<Payload>,
}

/// Payload variants for the envelope
#[derive(Clone, PartialEq, prost::Oneof)]
pub enum Payload {
    #[prost(message, tag = "10")]
    Announce(Announce),
    #[prost(message, tag = "11")]
    Heartbeat(Heartbeat),
    #[prost(message, tag = "12")]
    CatalogRequest(CatalogRequest),
    #[prost(message, tag = "13")]
    CatalogResponse(CatalogResponse),
    #[prost(message, tag = "14")]
    Ack(Ack),
    #[prost(message, tag = "20")]
    GetRequest(GetRequest),
    #[prost(message, tag = "21")]
    GetResponseOk(GetResponseOk),
    #[prost(message, tag = "22")]
    GetResponseErr(GetResponseErr),
    #[prost(message, tag = "100")]
    ErrorResponse(ErrorResponse),
}

impl Payload {
    /// Short name of the variant, for logging
    pub fn name(&self) -> &'static str {
        match self {
            Payload::Announce(_) => "Announce",
            Payload::Heartbeat(_) => "Heartbeat",
            Payload::CatalogRequest(_) => "CatalogRequest",
            Payload::CatalogResponse(_) => "CatalogResponse",
            Payload::Ack(_) => "Ack",
            Payload::GetRequest(_) => "GetRequest",
            Payload::GetResponseOk(_) => "GetResponseOk",
            Payload::GetResponseErr(_) => "GetResponseErr",
            Payload::ErrorResponse(_) => "ErrorResponse",
        }
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct PeerAddress {
    #[prost(string, tag = "1")]
    pub host: String,
    #[prost(uint32, tag = "2")]
    pub port: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct FileEntry {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(bytes, tag = "2")]
    pub content_hash: Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub size: u64,
}

// Registry messages

#[derive(Clone, PartialEq, Message)]
pub struct Announce {
    #[prost(message, optional, tag = "1")]
    pub address: Option<PeerAddress>,
    #[prost(message, repeated, tag = "2")]
    pub files: Vec<FileEntry>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Heartbeat {
    #[prost(message, optional, tag = "1")]
    pub address: Option<PeerAddress>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Ack {}

// Catalog messages

#[derive(Clone, PartialEq, Message)]
pub struct CatalogRequest {}

#[derive(Clone, PartialEq, Message)]
pub struct CatalogEntry {
    #[prost(message, optional, tag = "1")]
    pub address: Option<PeerAddress>,
    #[prost(string, repeated, tag = "2")]
    pub filenames: Vec<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CatalogResponse {
    #[prost(message, repeated, tag = "1")]
    pub entries: Vec<CatalogEntry>,
}

// Transfer messages

#[derive(Clone, PartialEq, Message)]
pub struct GetRequest {
    #[prost(string, tag = "1")]
    pub filename: String,
}

/// Header of a successful transfer; `size` raw bytes follow on the stream
#[derive(Clone, PartialEq, Message)]
pub struct GetResponseOk {
    #[prost(uint64, tag = "1")]
    pub size: u64,
    #[prost(bytes, tag = "2")]
    pub content_hash: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetResponseErr {
    #[prost(string, tag = "1")]
    pub reason: String,
}

// Error message

#[derive(Clone, PartialEq, Message)]
pub struct ErrorResponse {
    #[prost(uint32, tag = "1")]
    pub code: u32,
    #[prost(string, tag = "2")]
    pub message: String,
}

impl ErrorResponse {
    /// Map a remote error back into the local error taxonomy
    pub fn into_error(self) -> Error {
        match self.code {
            error_codes::NOT_FOUND => Error::NotFound(self.message),
            error_codes::VERSION_MISMATCH
            | error_codes::INVALID_MESSAGE
            | error_codes::INVALID_DATA => Error::Protocol(format!(
                "remote rejected request: {} (code {})",
                self.message, self.code
            )),
            _ => Error::Protocol(format!(
                "remote error: {} (code {})",
                self.message, self.code
            )),
        }
    }
}

// Helper implementations

impl Envelope {
    /// Create a new envelope with the current protocol version
    pub fn new(request_id: u64, payload: Payload) -> Self {
        Self {
            version: PROTOCOL_VERSION as u32,
            request_id,
            payload: Some(payload),
        }
    }

    /// Encode the envelope to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    /// Decode an envelope from bytes, checking version compatibility
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let envelope = Self::decode(buf)?;

        if envelope.version != PROTOCOL_VERSION as u32 {
            return Err(Error::VersionMismatch {
                expected: PROTOCOL_VERSION,
                actual: envelope.version,
            });
        }

        Ok(envelope)
    }

    /// Take the payload, treating an absent or unrecognized one as a protocol error
    pub fn into_payload(self) -> Result<Payload> {
        self.payload
            .ok_or_else(|| Error::Protocol("empty or unrecognized payload".to_string()))
    }
}

/// Error codes
pub mod error_codes {
    // Protocol errors (1xx)
    pub const VERSION_MISMATCH: u32 = 100;
    pub const INVALID_MESSAGE: u32 = 101;

    // Resource errors (2xx)
    pub const NOT_FOUND: u32 = 200;

    // Validation errors (3xx)
    pub const INVALID_DATA: u32 = 301;
}

/// Reason carried by [`GetResponseErr`] when the file does not exist
pub const REASON_NOT_FOUND: &str = "not found";

/// Reason carried by [`GetResponseErr`] when the name escapes the shared folder
pub const REASON_INVALID_PATH: &str = "invalid path";

/// Helper functions to create common message types

pub fn announce(request_id: u64, address: PeerAddress, files: Vec<FileEntry>) -> Envelope {
    Envelope::new(
        request_id,
        Payload::Announce(Announce {
            address: Some(address),
            files,
        }),
    )
}

pub fn heartbeat(request_id: u64, address: PeerAddress) -> Envelope {
    Envelope::new(
        request_id,
        Payload::Heartbeat(Heartbeat {
            address: Some(address),
        }),
    )
}

pub fn ack(request_id: u64) -> Envelope {
    Envelope::new(request_id, Payload::Ack(Ack {}))
}

pub fn catalog_request(request_id: u64) -> Envelope {
    Envelope::new(request_id, Payload::CatalogRequest(CatalogRequest {}))
}

pub fn catalog_response(request_id: u64, entries: Vec<CatalogEntry>) -> Envelope {
    Envelope::new(
        request_id,
        Payload::CatalogResponse(CatalogResponse { entries }),
    )
}

pub fn get_request(request_id: u64, filename: String) -> Envelope {
    Envelope::new(request_id, Payload::GetRequest(GetRequest { filename }))
}

pub fn get_response_ok(request_id: u64, size: u64, content_hash: Vec<u8>) -> Envelope {
    Envelope::new(
        request_id,
        Payload::GetResponseOk(GetResponseOk { size, content_hash }),
    )
}

pub fn get_response_err(request_id: u64, reason: &str) -> Envelope {
    Envelope::new(
        request_id,
        Payload::GetResponseErr(GetResponseErr {
            reason: reason.to_string(),
        }),
    )
}

pub fn error_response(request_id: u64, code: u32, message: String) -> Envelope {
    Envelope::new(
        request_id,
        Payload::ErrorResponse(ErrorResponse { code, message }),
    )
}
