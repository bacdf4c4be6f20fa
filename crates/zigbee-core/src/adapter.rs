//! Radio adapter seam
//!
//! The adapter owns the serial link, MAC/NWK retries and route discovery.
//! The transaction engine only hands it encoded ZCL frames and listens for
//! received ones.

use crate::error::AdapterError;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tokio::sync::broadcast;

/// Default per-call response timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Unicast destination of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Destination {
    pub nwk_address: u16,
    pub endpoint: u8,
}

/// Per-transmission options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmitOptions {
    pub cluster_id: u16,
    /// Used by the adapter to match the response
    pub transaction_sequence_number: u8,
    pub timeout: Duration,
    /// Do not wait for a response frame
    pub disable_response: bool,
    /// Do not let the adapter attempt route recovery
    pub disable_recovery: bool,
    pub source_endpoint: u8,
}

impl TransmitOptions {
    #[must_use]
    pub fn new(cluster_id: u16, transaction_sequence_number: u8) -> Self {
        Self {
            cluster_id,
            transaction_sequence_number,
            timeout: DEFAULT_TIMEOUT,
            disable_response: false,
            disable_recovery: false,
            source_endpoint: 1,
        }
    }
}

/// A frame received from the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    pub source_address: u16,
    pub source_endpoint: u8,
    pub destination_endpoint: u8,
    pub cluster_id: u16,
    /// ZCL header and payload
    pub data: Bytes,
    pub was_broadcast: bool,
    pub lqi: u8,
}

/// Events from the adapter
#[derive(Debug, Clone)]
pub enum AdapterEvent {
    FrameReceived(ReceivedFrame),
    /// The link to the radio is gone
    Disconnected,
}

/// Radio adapter
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Send a ZCL frame and, unless disabled, wait for the matching response
    ///
    /// Returns the response frame bytes, or `None` when no response was
    /// awaited.
    async fn transmit(
        &self,
        destination: Destination,
        frame: Bytes,
        options: &TransmitOptions,
    ) -> Result<Option<Bytes>, AdapterError>;

    fn supports_route_discovery(&self) -> bool {
        false
    }

    async fn discover_route(&self, _nwk_address: u16) -> Result<(), AdapterError> {
        Err(AdapterError::SendFailed(
            "route discovery not supported".to_string(),
        ))
    }

    /// Subscribe to adapter events
    fn subscribe(&self) -> broadcast::Receiver<AdapterEvent>;
}
