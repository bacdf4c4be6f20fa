//! Transaction errors

use thiserror::Error;
use zcl_protocol::{ProtocolError, Status};

/// Errors reported by the radio adapter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("Timeout waiting for response")]
    Timeout,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Adapter disconnected")]
    Disconnected,
}

impl AdapterError {
    /// Whether the adapter can no longer transmit anything
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

/// Errors surfaced to callers of endpoint operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ZclError {
    #[error("{0}")]
    Build(#[from] ProtocolError),

    #[error("Use parameter")]
    SequenceNumberOption,

    #[error("Transport error: {0}")]
    Transport(#[from] AdapterError),

    #[error("Status '{status}' ({code:#04x}) for {request}")]
    Status {
        code: u8,
        status: String,
        request: String,
    },

    #[error("Malformed response: {0}")]
    InvalidResponse(ProtocolError),

    #[error("Request expired before it could be sent")]
    Expired,

    #[error("Request superseded by a newer write")]
    Superseded,

    #[error("Device removed")]
    DeviceRemoved,

    #[error("Network stopping")]
    Stopping,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Endpoint {0} not found")]
    EndpointNotFound(u8),
}

impl ZclError {
    /// Build a status error from a raw ZCL status code
    #[must_use]
    pub fn status(code: u8, request: String) -> Self {
        let status = Status::try_from(code)
            .map_or_else(|raw| format!("Unknown({raw:#04x})"), |s| format!("{s:?}"));
        Self::Status {
            code,
            status,
            request,
        }
    }

    /// Raised before anything was transmitted
    #[must_use]
    pub fn is_build_error(&self) -> bool {
        matches!(self, Self::Build(_) | Self::SequenceNumberOption)
    }
}
