//! Test doubles

use crate::adapter::{Adapter, AdapterEvent, Destination, ReceivedFrame, TransmitOptions};
use crate::config::EngineConfig;
use crate::device::{Endpoint, ZigbeeDevice};
use crate::error::AdapterError;
use crate::network::ZigbeeNetwork;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use zcl_protocol::{ClusterRegistry, ZclFrame};

pub(crate) const IEEE: [u8; 8] = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];
pub(crate) const NWK: u16 = 0x4F2A;

/// A frame handed to the mock adapter
#[derive(Debug, Clone)]
pub(crate) struct SentFrame {
    pub destination: Destination,
    pub data: Bytes,
    pub options: TransmitOptions,
}

impl SentFrame {
    pub fn decode(&self) -> ZclFrame {
        ZclFrame::decode(&ClusterRegistry::builtin(), self.options.cluster_id, &self.data)
            .expect("sent frame decodes")
    }

    /// `cluster.command` of the sent frame
    pub fn command(&self) -> String {
        let frame = self.decode();
        format!(
            "{}.{}",
            frame.cluster.name,
            frame.command_name().unwrap_or("?")
        )
    }
}

/// Adapter that records transmissions and replays scripted results
pub(crate) struct MockAdapter {
    sent: Mutex<Vec<SentFrame>>,
    replies: Mutex<VecDeque<Result<Option<Bytes>, AdapterError>>>,
    route_discovery: AtomicBool,
    routes: Mutex<Vec<u16>>,
    events: broadcast::Sender<AdapterEvent>,
    stall: Mutex<Option<Duration>>,
}

impl MockAdapter {
    pub fn new() -> Arc<Self> {
        crate::logging::init_for_tests();
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            replies: Mutex::new(VecDeque::new()),
            route_discovery: AtomicBool::new(false),
            routes: Mutex::new(Vec::new()),
            events,
            stall: Mutex::new(None),
        })
    }

    /// Queue the result of the next transmission; unscripted ones succeed with no response
    pub fn reply(&self, result: Result<Option<Bytes>, AdapterError>) {
        self.replies.lock().unwrap().push_back(result);
    }

    pub fn reply_frame(&self, data: &[u8]) {
        self.reply(Ok(Some(Bytes::copy_from_slice(data))));
    }

    /// Hold the next transmission on the air for `duration`
    pub fn stall_next(&self, duration: Duration) {
        *self.stall.lock().unwrap() = Some(duration);
    }

    /// Wait until `count` frames have been handed over
    pub async fn wait_for_sent(&self, count: usize) {
        while self.sent.lock().unwrap().len() < count {
            tokio::task::yield_now().await;
        }
    }

    pub fn set_route_discovery(&self, supported: bool) {
        self.route_discovery.store(supported, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentFrame> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_commands(&self) -> Vec<String> {
        self.sent().iter().map(SentFrame::command).collect()
    }

    pub fn routes(&self) -> Vec<u16> {
        self.routes.lock().unwrap().clone()
    }

    pub fn emit(&self, event: AdapterEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    async fn transmit(
        &self,
        destination: Destination,
        frame: Bytes,
        options: &TransmitOptions,
    ) -> Result<Option<Bytes>, AdapterError> {
        self.sent.lock().unwrap().push(SentFrame {
            destination,
            data: frame,
            options: options.clone(),
        });
        let stall = self.stall.lock().unwrap().take();
        if let Some(duration) = stall {
            tokio::time::sleep(duration).await;
        }
        self.replies.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }

    fn supports_route_discovery(&self) -> bool {
        self.route_discovery.load(Ordering::SeqCst)
    }

    async fn discover_route(&self, nwk_address: u16) -> Result<(), AdapterError> {
        self.routes.lock().unwrap().push(nwk_address);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AdapterEvent> {
        self.events.subscribe()
    }
}

/// Sleepy device with a single endpoint
pub(crate) fn test_device(checkin_interval: Option<u32>) -> ZigbeeDevice {
    let mut device = ZigbeeDevice::new(IEEE, NWK);
    device.endpoints.push(Endpoint { id: 1 });
    if let Some(seconds) = checkin_interval {
        device.set_checkin_interval(seconds);
    }
    device
}

pub(crate) fn test_network(adapter: &Arc<MockAdapter>, device: ZigbeeDevice) -> ZigbeeNetwork {
    let adapter: Arc<dyn Adapter> = adapter.clone();
    let network = ZigbeeNetwork::new(adapter, EngineConfig::default());
    network.upsert_device(device);
    network
}

/// Frame from the test device's first endpoint
pub(crate) fn received(cluster_id: u16, data: &[u8]) -> ReceivedFrame {
    ReceivedFrame {
        source_address: NWK,
        source_endpoint: 1,
        destination_endpoint: 1,
        cluster_id,
        data: Bytes::copy_from_slice(data),
        was_broadcast: false,
        lqi: 200,
    }
}
