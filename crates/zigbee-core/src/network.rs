//! Zigbee network management

use crate::adapter::{Adapter, AdapterEvent, ReceivedFrame};
use crate::checkin;
use crate::config::EngineConfig;
use crate::default_response;
use crate::device::{format_ieee, ZigbeeDevice};
use crate::endpoint::EndpointHandle;
use crate::error::{AdapterError, ZclError};
use crate::queue::EndpointQueue;
use crate::sequence::TransactionSequence;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use zcl_protocol::{library::id, ZclFrame};

/// Network events
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    /// A new device joined the network
    DeviceJoined(ZigbeeDevice),
    /// A device left the network
    DeviceLeft { ieee_address: [u8; 8] },
    /// Device state/attributes updated
    DeviceUpdated { ieee_address: [u8; 8] },
    /// A ZCL frame was received from a device
    ZclMessage {
        ieee_address: [u8; 8],
        endpoint: u8,
        frame: ZclFrame,
        lqi: u8,
    },
    /// Network state changed
    NetworkStateChanged { connected: bool },
}

/// Removes a device from the draining set when its drain ends
pub(crate) struct DrainGuard {
    draining: Arc<DashSet<[u8; 8]>>,
    ieee: [u8; 8],
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        self.draining.remove(&self.ieee);
    }
}

/// Zigbee network manager
#[derive(Clone)]
pub struct ZigbeeNetwork {
    /// Radio adapter
    adapter: Arc<dyn Adapter>,
    /// Known devices (keyed by IEEE address)
    devices: Arc<DashMap<[u8; 8], ZigbeeDevice>>,
    /// Pending request queues, created on first use
    queues: Arc<DashMap<([u8; 8], u8), Arc<EndpointQueue>>>,
    /// Devices with a checkin drain in progress
    draining: Arc<DashSet<[u8; 8]>>,
    sequence: Arc<TransactionSequence>,
    config: Arc<EngineConfig>,
    /// Event broadcaster
    event_tx: broadcast::Sender<NetworkEvent>,
    stopping: Arc<AtomicBool>,
}

impl ZigbeeNetwork {
    /// Create a new network manager
    #[must_use]
    pub fn new(adapter: Arc<dyn Adapter>, config: EngineConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));
        Self {
            adapter,
            devices: Arc::new(DashMap::new()),
            queues: Arc::new(DashMap::new()),
            draining: Arc::new(DashSet::new()),
            sequence: Arc::new(TransactionSequence::new()),
            config: Arc::new(config),
            event_tx,
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start background task to listen for adapter events
    pub fn start_event_listener(&self) -> JoinHandle<()> {
        let network = self.clone();
        let mut adapter_rx = self.adapter.subscribe();

        tokio::spawn(async move {
            loop {
                match adapter_rx.recv().await {
                    Ok(AdapterEvent::FrameReceived(frame)) => {
                        let network = network.clone();
                        tokio::spawn(async move {
                            network.handle_received(frame).await;
                        });
                    }
                    Ok(AdapterEvent::Disconnected) => {
                        tracing::warn!("Adapter disconnected, flushing pending requests");
                        network
                            .flush_all(ZclError::Transport(AdapterError::Disconnected))
                            .await;
                        let _ = network
                            .event_tx
                            .send(NetworkEvent::NetworkStateChanged { connected: false });
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Event listener lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Event channel closed, stopping listener");
                        break;
                    }
                }
            }
        })
    }

    /// Subscribe to network events
    pub fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
        self.event_tx.subscribe()
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.adapter
    }

    /// Allocate the sequence number of the next outgoing frame
    pub fn next_transaction_sequence_number(&self) -> u8 {
        self.sequence.next()
    }

    /// Get a specific device by IEEE address
    pub fn get_device(&self, ieee: &[u8; 8]) -> Option<ZigbeeDevice> {
        self.devices.get(ieee).map(|r| r.value().clone())
    }

    /// Find a device by its network short address
    pub fn device_by_nwk(&self, nwk_address: u16) -> Option<ZigbeeDevice> {
        self.devices
            .iter()
            .find(|r| r.nwk_address == nwk_address)
            .map(|r| r.value().clone())
    }

    /// Add or update a device
    pub fn upsert_device(&self, device: ZigbeeDevice) {
        let ieee = device.ieee_address;
        let is_new = !self.devices.contains_key(&ieee);

        self.devices.insert(ieee, device.clone());

        let event = if is_new {
            NetworkEvent::DeviceJoined(device)
        } else {
            NetworkEvent::DeviceUpdated { ieee_address: ieee }
        };

        let _ = self.event_tx.send(event);
    }

    /// Modify a device in place
    pub fn update_device<R>(
        &self,
        ieee: &[u8; 8],
        f: impl FnOnce(&mut ZigbeeDevice) -> R,
    ) -> Option<R> {
        self.devices.get_mut(ieee).map(|mut entry| f(entry.value_mut()))
    }

    /// Remove a device, rejecting everything still queued for it
    pub async fn remove_device(&self, ieee: &[u8; 8]) -> Option<ZigbeeDevice> {
        let removed = self.devices.remove(ieee).map(|(_, v)| v);

        let keys: Vec<([u8; 8], u8)> = self
            .queues
            .iter()
            .filter(|e| e.key().0 == *ieee)
            .map(|e| *e.key())
            .collect();
        for key in keys {
            if let Some((_, queue)) = self.queues.remove(&key) {
                let flushed = queue.flush(ZclError::DeviceRemoved).await;
                if flushed > 0 {
                    tracing::debug!(
                        "Flushed {} requests for removed device {}",
                        flushed,
                        format_ieee(ieee)
                    );
                }
            }
        }

        if removed.is_some() {
            let _ = self.event_tx.send(NetworkEvent::DeviceLeft {
                ieee_address: *ieee,
            });
        }
        removed
    }

    /// Handle for operations on one endpoint of a known device
    pub fn endpoint(&self, ieee: &[u8; 8], endpoint: u8) -> Result<EndpointHandle, ZclError> {
        let device = self
            .devices
            .get(ieee)
            .ok_or_else(|| ZclError::DeviceNotFound(format_ieee(ieee)))?;
        if device.endpoint(endpoint).is_none() {
            return Err(ZclError::EndpointNotFound(endpoint));
        }
        drop(device);
        Ok(EndpointHandle::new(self.clone(), *ieee, endpoint))
    }

    pub(crate) fn queue(&self, ieee: &[u8; 8], endpoint: u8) -> Arc<EndpointQueue> {
        Arc::clone(
            self.queues
                .entry((*ieee, endpoint))
                .or_insert_with(|| Arc::new(EndpointQueue::new()))
                .value(),
        )
    }

    /// Queues of a device, ordered by endpoint
    pub(crate) fn device_queues(&self, ieee: &[u8; 8]) -> Vec<Arc<EndpointQueue>> {
        let mut queues: Vec<(u8, Arc<EndpointQueue>)> = self
            .queues
            .iter()
            .filter(|e| e.key().0 == *ieee)
            .map(|e| (e.key().1, Arc::clone(e.value())))
            .collect();
        queues.sort_by_key(|(endpoint, _)| *endpoint);
        queues.into_iter().map(|(_, queue)| queue).collect()
    }

    /// Number of requests waiting for an endpoint
    pub async fn pending_requests(&self, ieee: &[u8; 8], endpoint: u8) -> usize {
        let queue = self.queues.get(&(*ieee, endpoint)).map(|e| Arc::clone(e.value()));
        match queue {
            Some(queue) => queue.len().await,
            None => 0,
        }
    }

    /// Mark a device as draining; `None` if a drain is already running
    pub(crate) fn begin_drain(&self, ieee: [u8; 8]) -> Option<DrainGuard> {
        self.draining.insert(ieee).then(|| DrainGuard {
            draining: Arc::clone(&self.draining),
            ieee,
        })
    }

    /// Process a frame received from the adapter
    pub async fn handle_received(&self, received: ReceivedFrame) {
        let Some(device) = self.device_by_nwk(received.source_address) else {
            tracing::debug!(
                "Ignoring frame from unknown device {:#06x}",
                received.source_address
            );
            return;
        };
        let ieee = device.ieee_address;

        let frame = match ZclFrame::decode(
            &device.cluster_registry(),
            received.cluster_id,
            &received.data,
        ) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(
                    "Failed to decode frame from {:#06x} cluster {:#06x}: {}",
                    received.source_address,
                    received.cluster_id,
                    e
                );
                return;
            }
        };

        self.update_device(&ieee, |d| {
            d.last_seen = Some(Instant::now());
            d.lqi = Some(received.lqi);
        });

        // The default response runs alongside delivery and the checkin window
        let network = self.clone();
        let acknowledged = frame.clone();
        let source = received.clone();
        tokio::spawn(async move {
            default_response::dispatch(&network, ieee, &acknowledged, &source).await;
        });

        let is_checkin = checkin::is_checkin(&frame);
        let is_poll_control = frame.cluster.id == id::POLL_CONTROL;
        let _ = self.event_tx.send(NetworkEvent::ZclMessage {
            ieee_address: ieee,
            endpoint: received.source_endpoint,
            frame,
            lqi: received.lqi,
        });

        if is_checkin {
            checkin::handle_checkin(self, ieee, received.source_endpoint).await;
        } else if !is_poll_control {
            checkin::implicit_checkin(self, ieee).await;
        }
    }

    /// Reject every queued request on every endpoint
    pub(crate) async fn flush_all(&self, error: ZclError) {
        let queues: Vec<Arc<EndpointQueue>> =
            self.queues.iter().map(|e| Arc::clone(e.value())).collect();
        let mut flushed = 0;
        for queue in queues {
            flushed += queue.flush(error.clone()).await;
        }
        if flushed > 0 {
            tracing::info!("Flushed {} pending requests: {}", flushed, error);
        }
    }

    /// Reject queued requests and refuse new ones
    pub async fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.flush_all(ZclError::Stopping).await;
    }

    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }
}
