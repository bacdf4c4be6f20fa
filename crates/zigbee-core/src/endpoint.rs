//! Application operations on a device endpoint
//!
//! Every operation builds a ZCL frame against the device's cluster
//! registry, then either transmits it right away or parks it in the
//! endpoint queue until the device checks in, depending on the send
//! policy and the device's pending request timeout.

use crate::adapter::{Destination, TransmitOptions};
use crate::device::format_ieee;
use crate::error::ZclError;
use crate::network::ZigbeeNetwork;
use crate::request::{OutgoingFrame, PendingRequest, SendPolicy};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use zcl_protocol::buffer::ZclReader;
use zcl_protocol::{
    AttributeKey, AttributeMap, Cluster, ClusterKey, ClusterRegistry, Direction, Fields,
    FrameType, GlobalCommand, Payload, ProtocolError, ZclFrame, ZclHeader, ZclValue,
};

/// Per-call options
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Response timeout, the engine default when unset
    pub timeout: Option<Duration>,
    /// Do not wait for any response frame
    pub disable_response: bool,
    pub disable_recovery: bool,
    pub disable_default_response: Option<bool>,
    pub direction: Option<Direction>,
    pub manufacturer_code: Option<u16>,
    /// Rejected; response operations take the sequence number as a parameter
    pub transaction_sequence_number: Option<u8>,
    pub send_policy: Option<SendPolicy>,
    /// Send writes as write attributes undivided
    pub write_undiv: bool,
    pub source_endpoint: Option<u8>,
}

impl Options {
    pub fn validate(&self) -> Result<(), ZclError> {
        if self.transaction_sequence_number.is_some() {
            return Err(ZclError::SequenceNumberOption);
        }
        Ok(())
    }

    /// Immediate transmission, for protocol replies
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            send_policy: Some(SendPolicy::Immediate),
            ..Self::default()
        }
    }
}

/// One reporting configuration record
#[derive(Debug, Clone, PartialEq)]
pub struct ReportingConfig {
    pub attribute: AttributeKey,
    pub minimum_report_interval: u16,
    pub maximum_report_interval: u16,
    /// Required for analog attributes
    pub reportable_change: Option<ZclValue>,
}

/// Device state an operation needs, captured when it starts
struct Target {
    nwk_address: u16,
    manufacturer_id: Option<u16>,
    registry: ClusterRegistry,
    residency: Duration,
}

/// Header fields an operation fills in when the caller does not
#[derive(Debug, Clone, Copy)]
struct HeaderDefaults {
    frame_type: FrameType,
    direction: Direction,
    disable_default_response: bool,
}

impl HeaderDefaults {
    const REQUEST: Self = Self {
        frame_type: FrameType::Global,
        direction: Direction::ClientToServer,
        disable_default_response: true,
    };

    const RESPONSE: Self = Self {
        frame_type: FrameType::Global,
        direction: Direction::ServerToClient,
        disable_default_response: true,
    };
}

/// Handle for one endpoint of a device
#[derive(Clone)]
pub struct EndpointHandle {
    network: ZigbeeNetwork,
    ieee: [u8; 8],
    endpoint_id: u8,
}

impl EndpointHandle {
    pub(crate) fn new(network: ZigbeeNetwork, ieee: [u8; 8], endpoint_id: u8) -> Self {
        Self {
            network,
            ieee,
            endpoint_id,
        }
    }

    #[must_use]
    pub fn ieee_address(&self) -> [u8; 8] {
        self.ieee
    }

    #[must_use]
    pub fn id(&self) -> u8 {
        self.endpoint_id
    }

    fn target(&self) -> Result<Target, ZclError> {
        let device = self
            .network
            .get_device(&self.ieee)
            .ok_or_else(|| ZclError::DeviceNotFound(format_ieee(&self.ieee)))?;
        Ok(Target {
            nwk_address: device.nwk_address,
            manufacturer_id: device.manufacturer_id,
            registry: device.cluster_registry(),
            residency: device.pending_request_timeout(),
        })
    }

    fn header(
        &self,
        options: &Options,
        defaults: HeaderDefaults,
        command_id: u8,
        manufacturer_code: Option<u16>,
        transaction_sequence_number: Option<u8>,
    ) -> ZclHeader {
        ZclHeader {
            frame_type: defaults.frame_type,
            direction: options.direction.unwrap_or(defaults.direction),
            disable_default_response: options
                .disable_default_response
                .unwrap_or(defaults.disable_default_response),
            manufacturer_code,
            transaction_sequence_number: transaction_sequence_number
                .unwrap_or_else(|| self.network.next_transaction_sequence_number()),
            command_id,
        }
    }

    /// Transmit now or queue, returning the response bytes if one was awaited
    async fn dispatch(
        &self,
        target: &Target,
        frame: OutgoingFrame,
        transaction_sequence_number: u8,
        wait: bool,
        options: &Options,
    ) -> Result<Option<Bytes>, ZclError> {
        if self.network.is_stopping() {
            return Err(ZclError::Stopping);
        }
        let config = self.network.config();
        let transmit = TransmitOptions {
            cluster_id: frame.cluster_id(),
            transaction_sequence_number,
            timeout: options.timeout.unwrap_or_else(|| config.default_timeout()),
            disable_response: !wait,
            disable_recovery: options.disable_recovery,
            source_endpoint: options.source_endpoint.unwrap_or(config.source_endpoint),
        };
        let policy = options.send_policy.unwrap_or(config.default_send_policy);
        let destination = Destination {
            nwk_address: target.nwk_address,
            endpoint: self.endpoint_id,
        };
        let queue = self.network.queue(&self.ieee, self.endpoint_id);
        let data = frame.to_bytes()?;

        if policy == SendPolicy::Immediate || target.residency.is_zero() {
            let adapter = self.network.adapter();
            return match queue
                .transmit(adapter.as_ref(), destination, data, &transmit)
                .await
            {
                Ok(response) => Ok(response),
                Err(e) => {
                    if e.is_fatal() {
                        self.network
                            .flush_all(ZclError::Transport(e.clone()))
                            .await;
                    }
                    Err(e.into())
                }
            };
        }

        let (tx, rx) = oneshot::channel();
        let request =
            PendingRequest::new(frame, destination, transmit, policy, target.residency, tx);
        let deadline = request.expires_at;
        queue.enqueue(request).await;
        queue.wait(rx, deadline).await
    }

    /// Send a frame and check the status of its response
    async fn send(
        &self,
        target: &Target,
        frame: ZclFrame,
        options: &Options,
    ) -> Result<Option<ZclFrame>, ZclError> {
        let wait = !options.disable_response
            && (frame.command_has_response() || !frame.header.disable_default_response);
        let cluster_id = frame.cluster.id;
        let transaction_sequence_number = frame.header.transaction_sequence_number;
        let outgoing = OutgoingFrame::Zcl(frame);
        let request = outgoing.describe();

        let Some(response) = self
            .dispatch(target, outgoing, transaction_sequence_number, wait, options)
            .await?
        else {
            return Ok(None);
        };

        let response = ZclFrame::decode(&target.registry, cluster_id, &response)
            .map_err(ZclError::InvalidResponse)?;
        if let Some((code, attribute)) = response.failed_status() {
            let request = match attribute {
                Some(id) => format!("{request} attribute {id:#06x}"),
                None => request,
            };
            return Err(ZclError::status(code, request));
        }
        Ok(Some(response))
    }

    fn resolve_cluster(
        &self,
        target: &Target,
        cluster: ClusterKey,
        options: &Options,
    ) -> Result<Arc<Cluster>, ZclError> {
        Ok(target.registry.resolve(&cluster, options.manufacturer_code)?)
    }

    fn global_frame(
        &self,
        options: &Options,
        command: GlobalCommand,
        cluster: Arc<Cluster>,
        manufacturer_code: Option<u16>,
        payload: Payload,
        transaction_sequence_number: Option<u8>,
    ) -> ZclFrame {
        let defaults = if command.is_response() {
            HeaderDefaults::RESPONSE
        } else {
            HeaderDefaults::REQUEST
        };
        let header = self.header(
            options,
            defaults,
            command as u8,
            manufacturer_code,
            transaction_sequence_number,
        );
        ZclFrame::new(header, cluster, payload)
    }

    /// Read attributes, returning the values keyed by name
    pub async fn read(
        &self,
        cluster: impl Into<ClusterKey>,
        attributes: &[AttributeKey],
        options: Options,
    ) -> Result<AttributeMap, ZclError> {
        options.validate()?;
        let target = self.target()?;
        let cluster = self.resolve_cluster(&target, cluster.into(), &options)?;
        let fallback = options.manufacturer_code.or(cluster.manufacturer_code);
        let (resolved, manufacturer_code) = cluster.resolve_attributes(attributes, fallback)?;
        let records = resolved
            .iter()
            .map(|attribute| Fields::new().with("attrId", attribute.id))
            .collect();

        tracing::info!(
            "Read {}.{:?} from {}/{}",
            cluster.name,
            attributes.iter().map(ToString::to_string).collect::<Vec<_>>(),
            format_ieee(&self.ieee),
            self.endpoint_id
        );
        let frame = self.global_frame(
            &options,
            GlobalCommand::ReadAttributes,
            cluster,
            manufacturer_code,
            Payload::Records(records),
            None,
        );
        let response = self.send(&target, frame, &options).await?;
        Ok(response
            .map(|frame| frame.attributes(target.manufacturer_id))
            .unwrap_or_default())
    }

    /// Write attributes, returning the decoded write response if one arrived
    pub async fn write(
        &self,
        cluster: impl Into<ClusterKey>,
        attributes: &AttributeMap,
        options: Options,
    ) -> Result<Option<ZclFrame>, ZclError> {
        let command = if options.write_undiv {
            GlobalCommand::WriteAttributesUndivided
        } else {
            GlobalCommand::WriteAttributes
        };
        self.send_attributes(command, cluster.into(), attributes, &options)
            .await
    }

    pub async fn write_undiv(
        &self,
        cluster: impl Into<ClusterKey>,
        attributes: &AttributeMap,
        options: Options,
    ) -> Result<(), ZclError> {
        self.send_attributes(
            GlobalCommand::WriteAttributesUndivided,
            cluster.into(),
            attributes,
            &options,
        )
        .await
        .map(|_| ())
    }

    /// Send an attribute report to the device
    pub async fn report(
        &self,
        cluster: impl Into<ClusterKey>,
        attributes: &AttributeMap,
        options: Options,
    ) -> Result<(), ZclError> {
        self.send_attributes(
            GlobalCommand::ReportAttributes,
            cluster.into(),
            attributes,
            &options,
        )
        .await
        .map(|_| ())
    }

    async fn send_attributes(
        &self,
        command: GlobalCommand,
        cluster: ClusterKey,
        attributes: &AttributeMap,
        options: &Options,
    ) -> Result<Option<ZclFrame>, ZclError> {
        options.validate()?;
        let target = self.target()?;
        let cluster = self.resolve_cluster(&target, cluster, options)?;
        let fallback = options.manufacturer_code.or(cluster.manufacturer_code);
        let (records, manufacturer_code) = typed_records(&cluster, attributes, fallback)?;
        let records = records
            .into_iter()
            .map(|(record, value)| record.with("attrData", value.clone()))
            .collect();

        tracing::info!(
            "{} {}.{:?} to {}/{}",
            command.name(),
            cluster.name,
            attributes.keys().map(ToString::to_string).collect::<Vec<_>>(),
            format_ieee(&self.ieee),
            self.endpoint_id
        );
        let frame = self.global_frame(
            options,
            command,
            cluster,
            manufacturer_code,
            Payload::Records(records),
            None,
        );
        self.send(&target, frame, options).await
    }

    /// Send a cluster-specific command
    ///
    /// Commands with a declared response disable the default response
    /// unless the caller says otherwise. Returns the response frame if one
    /// was awaited.
    pub async fn command(
        &self,
        cluster: impl Into<ClusterKey>,
        command: &str,
        args: Fields,
        options: Options,
    ) -> Result<Option<ZclFrame>, ZclError> {
        options.validate()?;
        let target = self.target()?;
        let cluster = self.resolve_cluster(&target, cluster.into(), &options)?;
        let (command_id, has_response) = {
            let definition = cluster.command_by_name(command).ok_or_else(|| {
                ProtocolError::UnknownCommand {
                    cluster: cluster.name.clone(),
                    command: command.to_string(),
                }
            })?;
            (definition.id, definition.response.is_some())
        };

        tracing::info!(
            "Command {}.{} to {}/{}",
            cluster.name,
            command,
            format_ieee(&self.ieee),
            self.endpoint_id
        );
        let header = self.header(
            &options,
            HeaderDefaults {
                frame_type: FrameType::ClusterSpecific,
                direction: Direction::ClientToServer,
                disable_default_response: has_response,
            },
            command_id,
            options.manufacturer_code.or(cluster.manufacturer_code),
            None,
        );
        let frame = ZclFrame::new(header, cluster, Payload::Fields(args));
        self.send(&target, frame, &options).await
    }

    /// Answer a cluster-specific command with one of its command responses
    pub async fn command_response(
        &self,
        cluster: impl Into<ClusterKey>,
        command: &str,
        args: Fields,
        transaction_sequence_number: Option<u8>,
        options: Options,
    ) -> Result<(), ZclError> {
        options.validate()?;
        let target = self.target()?;
        let cluster = self.resolve_cluster(&target, cluster.into(), &options)?;
        let command_id = cluster
            .command_response_by_name(command)
            .map(|definition| definition.id)
            .ok_or_else(|| ProtocolError::UnknownCommand {
                cluster: cluster.name.clone(),
                command: command.to_string(),
            })?;

        tracing::info!(
            "Command response {}.{} to {}/{}",
            cluster.name,
            command,
            format_ieee(&self.ieee),
            self.endpoint_id
        );
        let header = self.header(
            &options,
            HeaderDefaults {
                frame_type: FrameType::ClusterSpecific,
                direction: Direction::ServerToClient,
                disable_default_response: true,
            },
            command_id,
            options.manufacturer_code.or(cluster.manufacturer_code),
            transaction_sequence_number,
        );
        let frame = ZclFrame::new(header, cluster, Payload::Fields(args));
        self.send(&target, frame, &options).await.map(|_| ())
    }

    pub async fn configure_reporting(
        &self,
        cluster: impl Into<ClusterKey>,
        items: &[ReportingConfig],
        options: Options,
    ) -> Result<(), ZclError> {
        options.validate()?;
        let target = self.target()?;
        let cluster = self.resolve_cluster(&target, cluster.into(), &options)?;
        let fallback = options.manufacturer_code.or(cluster.manufacturer_code);
        let (resolved, manufacturer_code) =
            cluster.resolve_attributes(items.iter().map(|item| &item.attribute), fallback)?;

        let mut records = Vec::with_capacity(items.len());
        for (item, attribute) in items.iter().zip(resolved) {
            let data_type = attribute
                .data_type
                .ok_or_else(|| ProtocolError::UnknownAttribute(item.attribute.to_string()))?;
            let mut record = Fields::new()
                .with("direction", 0u8)
                .with("attrId", attribute.id)
                .with("dataType", data_type as u8)
                .with("minRepIntval", item.minimum_report_interval)
                .with("maxRepIntval", item.maximum_report_interval);
            if let Some(change) = &item.reportable_change {
                record.insert("repChange", change.clone());
            }
            records.push(record);
        }

        tracing::info!(
            "Configure reporting {} ({} attributes) on {}/{}",
            cluster.name,
            items.len(),
            format_ieee(&self.ieee),
            self.endpoint_id
        );
        let frame = self.global_frame(
            &options,
            GlobalCommand::ConfigureReporting,
            cluster,
            manufacturer_code,
            Payload::Records(records),
            None,
        );
        self.send(&target, frame, &options).await.map(|_| ())
    }

    /// Answer a read request from the device
    pub async fn read_response(
        &self,
        cluster: impl Into<ClusterKey>,
        transaction_sequence_number: u8,
        attributes: &AttributeMap,
        options: Options,
    ) -> Result<(), ZclError> {
        options.validate()?;
        let target = self.target()?;
        let cluster = self.resolve_cluster(&target, cluster.into(), &options)?;
        let fallback = options.manufacturer_code.or(cluster.manufacturer_code);
        let (records, _) = typed_records(&cluster, attributes, fallback)?;
        let records = records
            .into_iter()
            .map(|(record, value)| {
                let mut fields = Fields::new();
                for (name, field) in record.iter() {
                    fields.insert(name, field.clone());
                    if name == "attrId" {
                        fields.insert("status", 0u8);
                    }
                }
                fields.with("attrData", value.clone())
            })
            .collect();

        tracing::info!(
            "Read response {} to {}/{}",
            cluster.name,
            format_ieee(&self.ieee),
            self.endpoint_id
        );
        let frame = self.global_frame(
            &options,
            GlobalCommand::ReadAttributesResponse,
            cluster,
            fallback,
            Payload::Records(records),
            Some(transaction_sequence_number),
        );
        self.send(&target, frame, &options).await.map(|_| ())
    }

    /// Answer a write request from the device with per-attribute statuses
    pub async fn write_response(
        &self,
        cluster: impl Into<ClusterKey>,
        transaction_sequence_number: u8,
        statuses: &[(AttributeKey, u8)],
        options: Options,
    ) -> Result<(), ZclError> {
        options.validate()?;
        let target = self.target()?;
        let cluster = self.resolve_cluster(&target, cluster.into(), &options)?;
        let fallback = options.manufacturer_code.or(cluster.manufacturer_code);
        let (resolved, _) =
            cluster.resolve_attributes(statuses.iter().map(|(key, _)| key), fallback)?;
        let records = statuses
            .iter()
            .zip(resolved)
            .map(|((_, status), attribute)| {
                Fields::new()
                    .with("status", *status)
                    .with("attrId", attribute.id)
            })
            .collect();

        let frame = self.global_frame(
            &options,
            GlobalCommand::WriteAttributesResponse,
            cluster,
            fallback,
            Payload::Records(records),
            Some(transaction_sequence_number),
        );
        self.send(&target, frame, &options).await.map(|_| ())
    }

    /// Acknowledge a received command
    pub async fn default_response(
        &self,
        cluster: impl Into<ClusterKey>,
        command_id: u8,
        status: u8,
        transaction_sequence_number: u8,
        options: Options,
    ) -> Result<(), ZclError> {
        options.validate()?;
        let target = self.target()?;
        let cluster = self.resolve_cluster(&target, cluster.into(), &options)?;
        let payload = Fields::new()
            .with("cmdId", command_id)
            .with("statusCode", status);

        tracing::debug!(
            "Default response {}.{:#04x} (status {:#04x}) to {}/{}",
            cluster.name,
            command_id,
            status,
            format_ieee(&self.ieee),
            self.endpoint_id
        );
        let manufacturer_code = options.manufacturer_code;
        let frame = self.global_frame(
            &options,
            GlobalCommand::DefaultResponse,
            cluster,
            manufacturer_code,
            Payload::Fields(payload),
            Some(transaction_sequence_number),
        );
        self.send(&target, frame, &options).await.map(|_| ())
    }

    /// Send pre-encoded ZCL bytes, returning the raw response if one was awaited
    pub async fn send_raw(
        &self,
        cluster_id: u16,
        data: Bytes,
        options: Options,
    ) -> Result<Option<Bytes>, ZclError> {
        options.validate()?;
        let target = self.target()?;
        let header = ZclHeader::parse(&mut ZclReader::new(&data))?;
        let frame = OutgoingFrame::Opaque { cluster_id, data };
        self.dispatch(
            &target,
            frame,
            header.transaction_sequence_number,
            !options.disable_response,
            &options,
        )
        .await
    }
}

/// `attrId`/`dataType` records for attribute values, with the shared manufacturer code
fn typed_records<'a>(
    cluster: &Cluster,
    attributes: &'a AttributeMap,
    fallback: Option<u16>,
) -> Result<(Vec<(Fields, &'a ZclValue)>, Option<u16>), ZclError> {
    let (resolved, manufacturer_code) = cluster.resolve_attributes(attributes.keys(), fallback)?;
    let records = attributes
        .iter()
        .zip(resolved)
        .map(|((key, value), attribute)| {
            let data_type = attribute
                .data_type
                .ok_or_else(|| ProtocolError::UnknownAttribute(key.to_string()))?;
            let record = Fields::new()
                .with("attrId", attribute.id)
                .with("dataType", data_type as u8);
            Ok((record, value))
        })
        .collect::<Result<Vec<_>, ProtocolError>>()?;
    Ok((records, manufacturer_code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdapterError;
    use crate::testing::{test_device, test_network, MockAdapter, IEEE, NWK};
    use zcl_protocol::{library::id, manufacturer, DataType};

    fn attributes(entries: &[(&str, ZclValue)]) -> AttributeMap {
        entries
            .iter()
            .map(|(name, value)| (AttributeKey::from(*name), value.clone()))
            .collect()
    }

    fn records(frame: &ZclFrame) -> &[Fields] {
        match &frame.payload {
            Payload::Records(records) => records,
            other => panic!("expected records, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_write_without_queueing_transmits_once() {
        let adapter = MockAdapter::new();
        let network = test_network(&adapter, test_device(None));
        let endpoint = network.endpoint(&IEEE, 1).unwrap();

        let response = endpoint
            .write(
                id::ON_OFF,
                &attributes(&[("onTime", ZclValue::Uint(1))]),
                Options::default(),
            )
            .await;
        assert_eq!(response, Ok(None));

        let sent = adapter.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].destination,
            Destination {
                nwk_address: NWK,
                endpoint: 1
            }
        );
        assert!(!sent[0].options.disable_response);
        let frame = sent[0].decode();
        assert_eq!(frame.command_name(), Some("write"));
        assert!(frame.header.disable_default_response);
        assert_eq!(frame.header.direction, Direction::ClientToServer);
        assert_eq!(
            frame.header.transaction_sequence_number,
            sent[0].options.transaction_sequence_number
        );
    }

    #[tokio::test]
    async fn test_writes_queue_until_checkin() {
        let adapter = MockAdapter::new();
        let network = test_network(&adapter, test_device(Some(10)));
        let endpoint = network.endpoint(&IEEE, 1).unwrap();

        for name in ["onTime", "offWaitTime"] {
            let endpoint = endpoint.clone();
            tokio::spawn(async move {
                endpoint
                    .write(
                        id::ON_OFF,
                        &attributes(&[(name, ZclValue::Uint(5))]),
                        Options::default(),
                    )
                    .await
            });
        }
        while network.pending_requests(&IEEE, 1).await < 2 {
            tokio::task::yield_now().await;
        }
        assert_eq!(network.pending_requests(&IEEE, 1).await, 2);
        assert!(adapter.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_read_expires_without_checkin() {
        let adapter = MockAdapter::new();
        let network = test_network(&adapter, test_device(Some(10)));
        let endpoint = network.endpoint(&IEEE, 1).unwrap();
        let started = tokio::time::Instant::now();

        let result = endpoint
            .read(id::ON_OFF, &[AttributeKey::from("onOff")], Options::default())
            .await;
        assert_eq!(result, Err(ZclError::Expired));
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert_eq!(network.pending_requests(&IEEE, 1).await, 0);
        assert!(adapter.sent().is_empty());
    }

    #[tokio::test]
    async fn test_immediate_policy_bypasses_queue() {
        let adapter = MockAdapter::new();
        let network = test_network(&adapter, test_device(Some(3600)));
        let endpoint = network.endpoint(&IEEE, 1).unwrap();

        let options = Options::immediate();
        endpoint
            .write(id::ON_OFF, &attributes(&[("onTime", ZclValue::Uint(1))]), options)
            .await
            .unwrap();
        assert_eq!(adapter.sent().len(), 1);
        assert_eq!(network.pending_requests(&IEEE, 1).await, 0);
    }

    #[tokio::test]
    async fn test_mixed_manufacturer_read_fails_before_transmission() {
        let adapter = MockAdapter::new();
        let network = test_network(&adapter, test_device(None));
        let endpoint = network.endpoint(&IEEE, 1).unwrap();

        let result = endpoint
            .read(
                "hvacThermostat",
                &["localTemp".into(), "viessmannWindowOpenInternal".into()],
                Options::default(),
            )
            .await;
        let error = result.unwrap_err();
        assert!(error.is_build_error());
        assert_eq!(
            error.to_string(),
            "Cannot have attributes with different manufacturerCode in a single call"
        );
        assert!(adapter.sent().is_empty());
    }

    #[tokio::test]
    async fn test_sequence_number_option_is_rejected() {
        let adapter = MockAdapter::new();
        let network = test_network(&adapter, test_device(None));
        let endpoint = network.endpoint(&IEEE, 1).unwrap();

        let options = Options {
            transaction_sequence_number: Some(7),
            ..Options::default()
        };
        let error = endpoint
            .read(id::ON_OFF, &["onOff".into()], options)
            .await
            .unwrap_err();
        assert_eq!(error, ZclError::SequenceNumberOption);
        assert_eq!(error.to_string(), "Use parameter");
        assert!(adapter.sent().is_empty());
    }

    #[tokio::test]
    async fn test_read_returns_named_values() {
        let adapter = MockAdapter::new();
        adapter.reply_frame(&[0x18, 0x02, 0x01, 0x00, 0x00, 0x00, 0x10, 0x01]);
        let network = test_network(&adapter, test_device(None));
        let endpoint = network.endpoint(&IEEE, 1).unwrap();

        let values = endpoint
            .read("genOnOff", &["onOff".into()], Options::default())
            .await
            .unwrap();
        assert_eq!(values.get(&"onOff".into()), Some(&ZclValue::Bool(true)));
        assert_eq!(adapter.sent_commands(), vec!["genOnOff.read"]);
    }

    #[tokio::test]
    async fn test_unsuccessful_status_is_an_error() {
        let adapter = MockAdapter::new();
        adapter.reply_frame(&[0x18, 0x02, 0x01, 0x03, 0x40, 0x86]);
        let network = test_network(&adapter, test_device(None));
        let endpoint = network.endpoint(&IEEE, 1).unwrap();

        let error = endpoint
            .read(id::ON_OFF, &[AttributeKey::Id(0x4003)], Options::default())
            .await
            .unwrap_err();
        let ZclError::Status { code, request, .. } = error else {
            panic!("expected a status error, got {error:?}");
        };
        assert_eq!(code, 0x86);
        assert_eq!(request, "genOnOff.read attribute 0x4003");
    }

    #[tokio::test]
    async fn test_manufacturer_code_derived_from_attributes() {
        let adapter = MockAdapter::new();
        let network = test_network(&adapter, test_device(None));
        let endpoint = network.endpoint(&IEEE, 1).unwrap();

        endpoint
            .write(
                "hvacThermostat",
                &attributes(&[("viessmannWindowOpenInternal", ZclValue::Uint(1))]),
                Options::default(),
            )
            .await
            .unwrap();
        let frame = adapter.sent()[0].decode();
        assert_eq!(frame.header.manufacturer_code, Some(manufacturer::VIESSMANN));
        assert_eq!(
            records(&frame)[0].get("dataType"),
            Some(&ZclValue::Uint(u64::from(DataType::Enum8 as u8)))
        );
    }

    #[tokio::test]
    async fn test_unknown_numeric_attribute_needs_a_type() {
        let adapter = MockAdapter::new();
        let network = test_network(&adapter, test_device(None));
        let endpoint = network.endpoint(&IEEE, 1).unwrap();

        let untyped = AttributeMap::from([(AttributeKey::Id(0x5000), ZclValue::Uint(3))]);
        let error = endpoint
            .write(id::ON_OFF, &untyped, Options::default())
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            ZclError::Build(ProtocolError::UnknownAttribute(_))
        ));

        let typed = AttributeMap::from([(
            AttributeKey::Typed(0x5000, DataType::Uint8),
            ZclValue::Uint(3),
        )]);
        endpoint
            .write(id::ON_OFF, &typed, Options::default())
            .await
            .unwrap();
        assert_eq!(adapter.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_write_undiv_option_selects_command() {
        let adapter = MockAdapter::new();
        let network = test_network(&adapter, test_device(None));
        let endpoint = network.endpoint(&IEEE, 1).unwrap();

        let options = Options {
            write_undiv: true,
            ..Options::default()
        };
        endpoint
            .write(id::ON_OFF, &attributes(&[("onTime", ZclValue::Uint(1))]), options)
            .await
            .unwrap();
        endpoint
            .report(
                id::ON_OFF,
                &attributes(&[("onOff", ZclValue::Bool(true))]),
                Options::default(),
            )
            .await
            .unwrap();
        assert_eq!(
            adapter.sent_commands(),
            vec!["genOnOff.writeUndiv", "genOnOff.report"]
        );
        // Reports expect no response frame
        assert!(adapter.sent()[1].options.disable_response);
    }

    #[tokio::test]
    async fn test_command_waits_for_default_response() {
        let adapter = MockAdapter::new();
        adapter.reply_frame(&[0x18, 0x02, 0x0B, 0x01, 0x00]);
        adapter.reply_frame(&[0x18, 0x03, 0x0B, 0x01, 0x81]);
        let network = test_network(&adapter, test_device(None));
        let endpoint = network.endpoint(&IEEE, 1).unwrap();

        let response = endpoint
            .command(id::ON_OFF, "on", Fields::new(), Options::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.command_name(), Some("defaultRsp"));

        let sent = adapter.sent()[0].decode();
        assert_eq!(sent.header.frame_type, FrameType::ClusterSpecific);
        assert!(!sent.header.disable_default_response);

        let error = endpoint
            .command(id::ON_OFF, "on", Fields::new(), Options::default())
            .await
            .unwrap_err();
        assert!(matches!(error, ZclError::Status { code: 0x81, .. }));
    }

    #[tokio::test]
    async fn test_unknown_command_is_a_build_error() {
        let adapter = MockAdapter::new();
        let network = test_network(&adapter, test_device(None));
        let endpoint = network.endpoint(&IEEE, 1).unwrap();

        let error = endpoint
            .command(id::ON_OFF, "explode", Fields::new(), Options::default())
            .await
            .unwrap_err();
        assert!(error.is_build_error());
        assert!(adapter.sent().is_empty());
    }

    #[tokio::test]
    async fn test_configure_reporting_records() {
        let adapter = MockAdapter::new();
        adapter.reply_frame(&[0x18, 0x02, 0x07, 0x00]);
        let network = test_network(&adapter, test_device(None));
        let endpoint = network.endpoint(&IEEE, 1).unwrap();

        endpoint
            .configure_reporting(
                "hvacThermostat",
                &[
                    ReportingConfig {
                        attribute: "localTemp".into(),
                        minimum_report_interval: 10,
                        maximum_report_interval: 600,
                        reportable_change: Some(ZclValue::Int(50)),
                    },
                    ReportingConfig {
                        attribute: "systemMode".into(),
                        minimum_report_interval: 0,
                        maximum_report_interval: 3600,
                        reportable_change: None,
                    },
                ],
                Options::default(),
            )
            .await
            .unwrap();

        let frame = adapter.sent()[0].decode();
        let records = records(&frame);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("repChange"), Some(&ZclValue::Int(50)));
        assert!(!records[1].contains("repChange"));
    }

    #[tokio::test]
    async fn test_responses_carry_explicit_sequence_number() {
        let adapter = MockAdapter::new();
        let network = test_network(&adapter, test_device(Some(3600)));
        let endpoint = network.endpoint(&IEEE, 1).unwrap();

        endpoint
            .read_response(
                id::ON_OFF,
                0x33,
                &attributes(&[("onOff", ZclValue::Bool(false))]),
                Options::immediate(),
            )
            .await
            .unwrap();
        endpoint
            .write_response(
                id::ON_OFF,
                0x34,
                &[("onTime".into(), 0x00), ("offWaitTime".into(), 0x88)],
                Options::immediate(),
            )
            .await
            .unwrap();
        endpoint
            .default_response(id::ON_OFF, 0x01, 0x00, 0x35, Options::immediate())
            .await
            .unwrap();
        endpoint
            .command_response(
                id::IDENTIFY,
                "identifyQueryRsp",
                Fields::new().with("timeout", 30u16),
                Some(0x36),
                Options::immediate(),
            )
            .await
            .unwrap();

        let sent: Vec<ZclFrame> = adapter.sent().iter().map(|s| s.decode()).collect();
        let tsns: Vec<u8> = sent
            .iter()
            .map(|f| f.header.transaction_sequence_number)
            .collect();
        assert_eq!(tsns, vec![0x33, 0x34, 0x35, 0x36]);
        assert!(sent
            .iter()
            .all(|f| f.header.direction == Direction::ServerToClient));
        assert_eq!(records(&sent[0])[0].get("status"), Some(&ZclValue::Uint(0)));
        // Successful write statuses omit the attribute id
        assert_eq!(records(&sent[1])[0].len(), 1);
        assert_eq!(records(&sent[1])[1].get("attrId"), Some(&ZclValue::Uint(0x4002)));
        assert!(adapter.sent().iter().all(|s| s.options.disable_response));
    }

    #[tokio::test]
    async fn test_raw_frames_use_their_own_sequence_number() {
        let adapter = MockAdapter::new();
        adapter.reply_frame(&[0x19, 0x44, 0x00]);
        let network = test_network(&adapter, test_device(None));
        let endpoint = network.endpoint(&IEEE, 1).unwrap();

        let response = endpoint
            .send_raw(0xFC00, Bytes::from_static(&[0x01, 0x44, 0x00]), Options::default())
            .await
            .unwrap();
        assert_eq!(response, Some(Bytes::from_static(&[0x19, 0x44, 0x00])));
        assert_eq!(adapter.sent()[0].options.transaction_sequence_number, 0x44);
        assert_eq!(adapter.sent()[0].options.cluster_id, 0xFC00);
    }

    #[tokio::test]
    async fn test_fatal_transport_error_flushes_queues() {
        let adapter = MockAdapter::new();
        adapter.reply(Err(AdapterError::Disconnected));
        let network = test_network(&adapter, test_device(Some(3600)));
        let endpoint = network.endpoint(&IEEE, 1).unwrap();

        let queued = endpoint.clone();
        let pending = tokio::spawn(async move {
            queued
                .read(id::ON_OFF, &["onOff".into()], Options::default())
                .await
        });
        while network.pending_requests(&IEEE, 1).await == 0 {
            tokio::task::yield_now().await;
        }

        let error = endpoint
            .read(id::ON_OFF, &["onTime".into()], Options::immediate())
            .await
            .unwrap_err();
        assert_eq!(error, ZclError::Transport(AdapterError::Disconnected));
        assert_eq!(
            pending.await.unwrap(),
            Err(ZclError::Transport(AdapterError::Disconnected))
        );
    }
}
