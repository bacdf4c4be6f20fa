//! Zigbee device representation

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use zcl_protocol::{Cluster, ClusterRegistry, CustomClusters};

/// A Zigbee device on the network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZigbeeDevice {
    /// IEEE address (EUI-64)
    pub ieee_address: [u8; 8],
    /// Network short address
    pub nwk_address: u16,
    /// Manufacturer code from the node descriptor
    pub manufacturer_id: Option<u16>,
    /// Device endpoints
    pub endpoints: Vec<Endpoint>,
    /// Definitions that extend or replace the built-in cluster library
    #[serde(skip)]
    pub custom_clusters: CustomClusters,
    /// Poll control checkin interval in seconds
    pub checkin_interval: Option<u32>,
    /// How long requests may wait in the queue, 0 disables queueing
    #[serde(default)]
    pub pending_request_timeout_ms: u64,
    /// Suppress the next default response to this device
    #[serde(default)]
    pub skip_default_response: bool,
    /// Sequence number of the last frame answered with a default response
    #[serde(skip)]
    pub last_default_response_tsn: Option<u8>,
    /// Last seen timestamp
    #[serde(skip)]
    pub last_seen: Option<Instant>,
    /// Link quality indicator (0-255)
    pub lqi: Option<u8>,
}

impl ZigbeeDevice {
    /// Create a new device with just address info
    #[must_use]
    pub fn new(ieee_address: [u8; 8], nwk_address: u16) -> Self {
        Self {
            ieee_address,
            nwk_address,
            manufacturer_id: None,
            endpoints: Vec::new(),
            custom_clusters: CustomClusters::default(),
            checkin_interval: None,
            pending_request_timeout_ms: 0,
            skip_default_response: false,
            last_default_response_tsn: None,
            last_seen: None,
            lqi: None,
        }
    }

    /// Get IEEE address as hex string
    #[must_use]
    pub fn ieee_address_string(&self) -> String {
        format_ieee(&self.ieee_address)
    }

    /// Record the checkin interval and derive the queue residency from it
    pub fn set_checkin_interval(&mut self, seconds: u32) {
        self.checkin_interval = Some(seconds);
        self.pending_request_timeout_ms = u64::from(seconds) * 1000;
    }

    #[must_use]
    pub fn pending_request_timeout(&self) -> Duration {
        Duration::from_millis(self.pending_request_timeout_ms)
    }

    /// Register a custom cluster definition for this device
    pub fn add_custom_cluster(&mut self, cluster: Cluster) {
        self.custom_clusters.insert(cluster);
    }

    /// Cluster lookup for frames to and from this device
    #[must_use]
    pub fn cluster_registry(&self) -> ClusterRegistry {
        ClusterRegistry::with_custom(self.custom_clusters.clone())
    }

    #[must_use]
    pub fn endpoint(&self, id: u8) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.id == id)
    }
}

/// Format an IEEE address, most significant byte first
#[must_use]
pub fn format_ieee(ieee: &[u8; 8]) -> String {
    ieee.iter()
        .rev() // IEEE addresses are typically displayed in reverse byte order
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// A device endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    /// Endpoint ID (1-240)
    pub id: u8,
}
