//! Default responses to received commands

use crate::adapter::ReceivedFrame;
use crate::device::format_ieee;
use crate::endpoint::{EndpointHandle, Options};
use crate::network::ZigbeeNetwork;
use zcl_protocol::{Direction, GlobalCommand, Status, ZclFrame};

/// Whether the frame itself allows a default response
fn wants_default_response(frame: &ZclFrame, received: &ReceivedFrame) -> bool {
    !received.was_broadcast
        && !frame.header.disable_default_response
        && frame.global_command() != Some(GlobalCommand::DefaultResponse)
        && !frame.command_has_response()
}

/// Acknowledge a received frame when ZCL requires it
///
/// Honors the device's one-shot skip flag and does not answer the same
/// sequence number twice in a row. A failed response is not retried; the
/// adapter is asked to rediscover the route instead.
pub(crate) async fn dispatch(
    network: &ZigbeeNetwork,
    ieee: [u8; 8],
    frame: &ZclFrame,
    received: &ReceivedFrame,
) {
    if !wants_default_response(frame, received) {
        return;
    }

    let transaction_sequence_number = frame.header.transaction_sequence_number;
    let send = network
        .update_device(&ieee, |device| {
            if device.skip_default_response {
                device.skip_default_response = false;
                return false;
            }
            if device.last_default_response_tsn == Some(transaction_sequence_number) {
                return false;
            }
            device.last_default_response_tsn = Some(transaction_sequence_number);
            true
        })
        .unwrap_or(false);
    if !send {
        tracing::debug!(
            "Skipping default response to {} (tsn {})",
            format_ieee(&ieee),
            transaction_sequence_number
        );
        return;
    }

    let direction = if frame.header.is_global() {
        Direction::ServerToClient
    } else {
        frame.header.direction.reverse()
    };
    let options = Options {
        direction: Some(direction),
        manufacturer_code: frame.header.manufacturer_code,
        disable_response: true,
        source_endpoint: Some(received.destination_endpoint),
        ..Options::immediate()
    };

    let endpoint = EndpointHandle::new(network.clone(), ieee, received.source_endpoint);
    let result = endpoint
        .default_response(
            frame.cluster.id,
            frame.header.command_id,
            Status::Success as u8,
            transaction_sequence_number,
            options,
        )
        .await;
    let Err(e) = result else {
        return;
    };

    tracing::warn!(
        "Default response to {:#06x} failed: {}",
        received.source_address,
        e
    );
    let adapter = network.adapter();
    if network.config().route_discovery_on_failure && adapter.supports_route_discovery() {
        tracing::warn!("Rediscovering route to {:#06x}", received.source_address);
        if let Err(e) = adapter.discover_route(received.source_address).await {
            tracing::warn!(
                "Route discovery to {:#06x} failed: {}",
                received.source_address,
                e
            );
        }
    }
}
