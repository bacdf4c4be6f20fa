//! Outgoing requests and their queueing policy

use crate::adapter::{Destination, TransmitOptions};
use crate::error::ZclError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use zcl_protocol::{Fields, GlobalCommand, Payload, ProtocolError, ZclFrame, ZclValue};

/// When an operation reaches the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendPolicy {
    /// Transmit now, never queue
    Immediate,
    /// Hold until the device checks in
    #[default]
    Queue,
    /// Hold until the device checks in and is put into fast poll
    Bulk,
}

impl FromStr for SendPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "immediate" => Ok(Self::Immediate),
            "queue" => Ok(Self::Queue),
            "bulk" => Ok(Self::Bulk),
            other => Err(format!("unknown send policy '{other}'")),
        }
    }
}

/// How a new entry merges with queued ones
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoalescePolicy {
    /// Identical payloads share one transmission
    KeepPayload,
    /// Newer writes take over overlapping attributes of older ones
    KeepCommand,
    /// Never merged
    None,
}

/// Frame waiting for transmission
#[derive(Debug, Clone, PartialEq)]
pub enum OutgoingFrame {
    Zcl(ZclFrame),
    /// Pre-encoded bytes the queue does not look into
    Opaque { cluster_id: u16, data: Bytes },
}

impl OutgoingFrame {
    #[must_use]
    pub fn cluster_id(&self) -> u16 {
        match self {
            Self::Zcl(frame) => frame.cluster.id,
            Self::Opaque { cluster_id, .. } => *cluster_id,
        }
    }

    pub fn to_bytes(&self) -> Result<Bytes, ProtocolError> {
        match self {
            Self::Zcl(frame) => frame.to_bytes(),
            Self::Opaque { data, .. } => Ok(data.clone()),
        }
    }

    #[must_use]
    pub fn coalesce_policy(&self) -> CoalescePolicy {
        let Self::Zcl(frame) = self else {
            return CoalescePolicy::None;
        };
        match frame.global_command() {
            Some(
                GlobalCommand::ReadAttributes
                | GlobalCommand::ConfigureReporting
                | GlobalCommand::ReadReportingConfig
                | GlobalCommand::ReportAttributes
                | GlobalCommand::DiscoverAttributes
                | GlobalCommand::ReadAttributesStructured
                | GlobalCommand::WriteAttributesStructured
                | GlobalCommand::DiscoverCommandsReceived
                | GlobalCommand::DiscoverCommandsGenerated
                | GlobalCommand::DiscoverAttributesExtended,
            ) => CoalescePolicy::KeepPayload,
            Some(GlobalCommand::WriteAttributes | GlobalCommand::WriteAttributesNoResponse) => {
                CoalescePolicy::KeepCommand
            }
            _ => CoalescePolicy::None,
        }
    }

    /// Same cluster, command and payload, ignoring the sequence number
    #[must_use]
    pub fn same_request(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Zcl(a), Self::Zcl(b)) => {
                a.cluster.id == b.cluster.id
                    && a.header.frame_type == b.header.frame_type
                    && a.header.direction == b.header.direction
                    && a.header.manufacturer_code == b.header.manufacturer_code
                    && a.header.command_id == b.header.command_id
                    && a.payload == b.payload
            }
            _ => false,
        }
    }

    /// Same cluster and command, so attribute records are comparable
    #[must_use]
    pub fn same_command(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Zcl(a), Self::Zcl(b)) => {
                a.cluster.id == b.cluster.id
                    && a.header.command_id == b.header.command_id
                    && a.header.manufacturer_code == b.header.manufacturer_code
            }
            _ => false,
        }
    }

    /// Attribute ids carried by the records of a global command
    #[must_use]
    pub fn attribute_ids(&self) -> Vec<u64> {
        match self {
            Self::Zcl(ZclFrame {
                payload: Payload::Records(records),
                ..
            }) => records
                .iter()
                .filter_map(|r| r.get("attrId").and_then(ZclValue::as_u64))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Drop records for the given attribute ids, returning how many remain
    pub fn remove_attributes(&mut self, ids: &[u64]) -> usize {
        match self {
            Self::Zcl(ZclFrame {
                payload: Payload::Records(records),
                ..
            }) => {
                let keep = |r: &Fields| {
                    r.get("attrId")
                        .and_then(ZclValue::as_u64)
                        .map_or(true, |id| !ids.contains(&id))
                };
                records.retain(keep);
                records.len()
            }
            _ => 1,
        }
    }

    /// Short description for logs and status errors
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Zcl(frame) => format!(
                "{}.{}",
                frame.cluster.name,
                frame
                    .command_name()
                    .map_or_else(|| frame.header.command_id.to_string(), str::to_string)
            ),
            Self::Opaque { cluster_id, data } => {
                format!("{cluster_id:#06x}(raw {} bytes)", data.len())
            }
        }
    }
}

/// Resolves the caller waiting on a request
pub type Completion = oneshot::Sender<Result<Option<Bytes>, ZclError>>;

/// A request held in an endpoint queue
#[derive(Debug)]
pub struct PendingRequest {
    pub frame: OutgoingFrame,
    pub destination: Destination,
    pub options: TransmitOptions,
    pub send_policy: SendPolicy,
    pub created_at: Instant,
    pub expires_at: Instant,
    completions: Vec<Completion>,
}

impl PendingRequest {
    #[must_use]
    pub fn new(
        frame: OutgoingFrame,
        destination: Destination,
        options: TransmitOptions,
        send_policy: SendPolicy,
        residency: Duration,
        completion: Completion,
    ) -> Self {
        let created_at = Instant::now();
        Self {
            frame,
            destination,
            options,
            send_policy,
            created_at,
            expires_at: created_at + residency,
            completions: vec![completion],
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    #[must_use]
    pub fn is_bulk(&self) -> bool {
        self.send_policy == SendPolicy::Bulk
    }

    /// Take over the callers of an older identical request
    ///
    /// The timestamps of `self` are kept, so the merged entry gets a full
    /// residency from the newest caller.
    pub fn adopt(&mut self, older: PendingRequest) {
        if older.is_bulk() {
            self.send_policy = SendPolicy::Bulk;
        }
        let mut completions = older.completions;
        completions.append(&mut self.completions);
        self.completions = completions;
    }

    #[must_use]
    pub fn callers(&self) -> usize {
        self.completions.len()
    }

    pub fn resolve(self, response: Option<Bytes>) {
        for completion in self.completions {
            let _ = completion.send(Ok(response.clone()));
        }
    }

    pub fn reject(self, error: ZclError) {
        for completion in self.completions {
            let _ = completion.send(Err(error.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zcl_protocol::{ClusterRegistry, Direction, FrameType, ZclHeader};

    fn frame(command: GlobalCommand, records: Vec<Fields>) -> OutgoingFrame {
        OutgoingFrame::Zcl(ZclFrame::new(
            ZclHeader {
                frame_type: FrameType::Global,
                direction: Direction::ClientToServer,
                disable_default_response: true,
                manufacturer_code: None,
                transaction_sequence_number: 1,
                command_id: command as u8,
            },
            ClusterRegistry::builtin().by_id(0x0006, None),
            Payload::Records(records),
        ))
    }

    fn write_record(id: u16, value: u8) -> Fields {
        Fields::new()
            .with("attrId", id)
            .with("dataType", 0x20u8)
            .with("attrData", value)
    }

    #[test]
    fn test_coalesce_policies() {
        assert_eq!(
            frame(GlobalCommand::ReadAttributes, vec![]).coalesce_policy(),
            CoalescePolicy::KeepPayload
        );
        assert_eq!(
            frame(GlobalCommand::WriteAttributesNoResponse, vec![]).coalesce_policy(),
            CoalescePolicy::KeepCommand
        );
        assert_eq!(
            frame(GlobalCommand::WriteAttributesUndivided, vec![]).coalesce_policy(),
            CoalescePolicy::None
        );
        assert_eq!(
            frame(GlobalCommand::WriteAttributesStructured, vec![]).coalesce_policy(),
            CoalescePolicy::KeepPayload
        );
        assert_eq!(
            frame(GlobalCommand::DiscoverAttributesExtended, vec![]).coalesce_policy(),
            CoalescePolicy::KeepPayload
        );
        assert_eq!(
            frame(GlobalCommand::DiscoverCommandsReceivedResponse, vec![]).coalesce_policy(),
            CoalescePolicy::None
        );
        let opaque = OutgoingFrame::Opaque {
            cluster_id: 6,
            data: Bytes::from_static(&[1, 2, 3]),
        };
        assert_eq!(opaque.coalesce_policy(), CoalescePolicy::None);
    }

    #[test]
    fn test_same_request_ignores_sequence_number() {
        let a = frame(GlobalCommand::ReadAttributes, vec![Fields::new().with("attrId", 0u16)]);
        let mut b = a.clone();
        if let OutgoingFrame::Zcl(frame) = &mut b {
            frame.header.transaction_sequence_number = 99;
        }
        assert!(a.same_request(&b));
        let c = frame(GlobalCommand::ReadAttributes, vec![Fields::new().with("attrId", 1u16)]);
        assert!(!a.same_request(&c));
        assert!(a.same_command(&c));
    }

    #[test]
    fn test_remove_attributes() {
        let mut write = frame(
            GlobalCommand::WriteAttributes,
            vec![write_record(0x4001, 1), write_record(0x4002, 2)],
        );
        assert_eq!(write.attribute_ids(), vec![0x4001, 0x4002]);
        assert_eq!(write.remove_attributes(&[0x4001]), 1);
        assert_eq!(write.attribute_ids(), vec![0x4002]);
        assert_eq!(write.remove_attributes(&[0x4002]), 0);
        assert_eq!(write.describe(), "genOnOff.write");
    }

    #[tokio::test]
    async fn test_merged_callers_share_result() {
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        let destination = Destination {
            nwk_address: 0x1234,
            endpoint: 1,
        };
        let read = frame(GlobalCommand::ReadAttributes, vec![]);
        let options = TransmitOptions::new(6, 1);
        let first = PendingRequest::new(
            read.clone(),
            destination,
            options.clone(),
            SendPolicy::Bulk,
            Duration::from_secs(10),
            tx1,
        );
        let mut second = PendingRequest::new(
            read,
            destination,
            options,
            SendPolicy::Queue,
            Duration::from_secs(30),
            tx2,
        );
        let expires_at = second.expires_at;
        second.adopt(first);
        assert!(second.is_bulk());
        assert_eq!(second.callers(), 2);
        assert_eq!(second.expires_at, expires_at);

        second.resolve(Some(Bytes::from_static(&[0xAA])));
        assert_eq!(rx1.await.unwrap(), Ok(Some(Bytes::from_static(&[0xAA]))));
        assert_eq!(rx2.await.unwrap(), Ok(Some(Bytes::from_static(&[0xAA]))));
    }

    #[test]
    fn test_send_policy_parsing() {
        assert_eq!("Bulk".parse::<SendPolicy>(), Ok(SendPolicy::Bulk));
        assert!("later".parse::<SendPolicy>().is_err());
        assert_eq!(
            serde_json::from_str::<SendPolicy>("\"immediate\"").unwrap(),
            SendPolicy::Immediate
        );
    }
}
