//! Poll control checkin handling
//!
//! A sleepy device announces a short receive window with a checkin. The
//! coordinator answers with a checkin response (asking for fast poll when
//! bulk requests are waiting), sends everything queued for the device in
//! order and finally releases the device from fast poll.

use crate::device::format_ieee;
use crate::endpoint::{EndpointHandle, Options};
use crate::error::ZclError;
use crate::network::ZigbeeNetwork;
use zcl_protocol::library::{id, poll_control};
use zcl_protocol::{AttributeKey, Direction, Fields, FrameType, ZclFrame, ZclValue};

/// Whether a received frame is a poll control checkin
#[must_use]
pub fn is_checkin(frame: &ZclFrame) -> bool {
    frame.cluster.id == id::POLL_CONTROL
        && frame.header.frame_type == FrameType::ClusterSpecific
        && frame.header.direction == Direction::ServerToClient
        && frame.header.command_id == poll_control::CHECKIN
}

/// Run the checkin drain for a device
///
/// A checkin arriving while the device is already being drained is folded
/// into the running drain.
pub(crate) async fn handle_checkin(network: &ZigbeeNetwork, ieee: [u8; 8], endpoint_id: u8) {
    let Some(_guard) = network.begin_drain(ieee) else {
        tracing::debug!("Drain already running, ignoring checkin");
        return;
    };
    let Some(device) = network.get_device(&ieee) else {
        return;
    };
    tracing::info!(
        "Checkin from {} ({:#06x})",
        device.ieee_address_string(),
        device.nwk_address
    );

    let mut fast_poll = false;
    for queue in network.device_queues(&ieee) {
        if queue.has_bulk().await {
            fast_poll = true;
            break;
        }
    }

    let endpoint = EndpointHandle::new(network.clone(), ieee, endpoint_id);
    let response = Fields::new()
        .with("startFastPolling", fast_poll)
        .with("fastPollTimeout", network.config().fast_poll_timeout);
    if let Err(e) = endpoint
        .command(id::POLL_CONTROL, "checkinRsp", response, Options::immediate())
        .await
    {
        tracing::warn!(
            "Checkin response to {} failed: {}",
            device.ieee_address_string(),
            e
        );
    }

    if device.checkin_interval.is_none() {
        discover_checkin_interval(network, &endpoint).await;
    }

    if !drain_queues(network, &ieee, fast_poll).await {
        return;
    }

    if fast_poll {
        if let Err(e) = endpoint
            .command(
                id::POLL_CONTROL,
                "fastPollStop",
                Fields::new(),
                Options::immediate(),
            )
            .await
        {
            tracing::warn!(
                "Fast poll stop to {} failed: {}",
                device.ieee_address_string(),
                e
            );
        }
    }
}

/// Drain a device that is evidently awake
///
/// Any frame from the device other than poll control means its receiver is
/// on, so non-bulk entries are sent without a fast poll window.
pub(crate) async fn implicit_checkin(network: &ZigbeeNetwork, ieee: [u8; 8]) {
    let Some(_guard) = network.begin_drain(ieee) else {
        return;
    };
    drain_queues(network, &ieee, false).await;
}

/// Send the queued entries of every endpoint of a device
///
/// Returns `false` when a fatal adapter error aborted the drain; every queue
/// has been flushed by then.
async fn drain_queues(network: &ZigbeeNetwork, ieee: &[u8; 8], fast_poll: bool) -> bool {
    let adapter = network.adapter();
    for queue in network.device_queues(ieee) {
        match queue.drain(adapter.as_ref(), fast_poll).await {
            Ok(0) => {}
            Ok(sent) => tracing::debug!(
                "Drained {} queued requests to {}",
                sent,
                format_ieee(ieee)
            ),
            Err(e) => {
                tracing::warn!("Drain aborted: {}", e);
                network.flush_all(ZclError::Transport(e)).await;
                return false;
            }
        }
    }
    true
}

/// Read the checkin interval (in quarter-seconds) and store it in seconds
async fn discover_checkin_interval(network: &ZigbeeNetwork, endpoint: &EndpointHandle) {
    let key = AttributeKey::from("checkinInterval");
    let values = match endpoint
        .read(id::POLL_CONTROL, &[key.clone()], Options::immediate())
        .await
    {
        Ok(values) => values,
        Err(e) => {
            tracing::warn!("Failed to read checkin interval: {}", e);
            return;
        }
    };
    let Some(quarters) = values.get(&key).and_then(ZclValue::as_u64) else {
        return;
    };
    let seconds = u32::try_from(quarters / 4).unwrap_or(u32::MAX);
    network.update_device(&endpoint.ieee_address(), |device| {
        device.set_checkin_interval(seconds);
    });
    tracing::info!("Checkin interval is {}s", seconds);
}
