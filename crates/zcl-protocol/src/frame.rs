//! ZCL frame structure
//!
//! Frame format:
//! ```text
//! [Frame Control: 1 byte]
//!     bits 0-1  frame type (0 = global, 1 = cluster specific)
//!     bit  2    manufacturer specific
//!     bit  3    direction (1 = server to client)
//!     bit  4    disable default response
//! [Manufacturer Code: 2 bytes LE] (only if manufacturer specific)
//! [Transaction Sequence Number: 1 byte]
//! [Command ID: 1 byte]
//! [Payload: variable]
//! ```

use crate::buffer::{ZclReader, ZclWriter};
use crate::cluster::{Cluster, Command, ParamType, Parameter};
use crate::data_type::DataType;
use crate::foundation::{GlobalCommand, ParseStrategy};
use crate::registry::ClusterRegistry;
use crate::types::{Direction, FrameType, ProtocolError, Status};
use crate::value::{AttributeKey, AttributeMap, Fields, ZclValue};
use bytes::Bytes;
use std::sync::Arc;

const MANUFACTURER_SPECIFIC: u8 = 0x04;
const DIRECTION_SERVER_TO_CLIENT: u8 = 0x08;
const DISABLE_DEFAULT_RESPONSE: u8 = 0x10;

/// ZCL frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZclHeader {
    pub frame_type: FrameType,
    pub direction: Direction,
    pub disable_default_response: bool,
    /// Present iff the frame is manufacturer specific
    pub manufacturer_code: Option<u16>,
    pub transaction_sequence_number: u8,
    pub command_id: u8,
}

impl ZclHeader {
    /// Minimum header size without manufacturer code
    pub const MIN_LEN: usize = 3;

    #[must_use]
    pub fn is_global(&self) -> bool {
        self.frame_type == FrameType::Global
    }

    #[must_use]
    pub fn is_manufacturer_specific(&self) -> bool {
        self.manufacturer_code.is_some()
    }

    /// Frame control byte
    #[must_use]
    pub fn frame_control(&self) -> u8 {
        let mut control = self.frame_type as u8;
        if self.manufacturer_code.is_some() {
            control |= MANUFACTURER_SPECIFIC;
        }
        if self.direction == Direction::ServerToClient {
            control |= DIRECTION_SERVER_TO_CLIENT;
        }
        if self.disable_default_response {
            control |= DISABLE_DEFAULT_RESPONSE;
        }
        control
    }

    pub fn write(&self, writer: &mut ZclWriter) {
        writer.put_u8(self.frame_control());
        if let Some(code) = self.manufacturer_code {
            writer.put_u16(code);
        }
        writer.put_u8(self.transaction_sequence_number);
        writer.put_u8(self.command_id);
    }

    /// Parse a header, leaving the reader at the start of the payload
    pub fn parse(reader: &mut ZclReader<'_>) -> Result<Self, ProtocolError> {
        let control = reader.read_u8()?;
        let frame_type = FrameType::from_bits(control)?;
        let manufacturer_code = if control & MANUFACTURER_SPECIFIC != 0 {
            Some(reader.read_u16()?)
        } else {
            None
        };
        let direction = if control & DIRECTION_SERVER_TO_CLIENT != 0 {
            Direction::ServerToClient
        } else {
            Direction::ClientToServer
        };
        Ok(Self {
            frame_type,
            direction,
            disable_default_response: control & DISABLE_DEFAULT_RESPONSE != 0,
            manufacturer_code,
            transaction_sequence_number: reader.read_u8()?,
            command_id: reader.read_u8()?,
        })
    }
}

/// Command payload
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Repeated records of a global command
    Records(Vec<Fields>),
    /// Single record of a flat global command or a cluster command
    Fields(Fields),
    /// Discover attributes response
    Discovery { complete: bool, records: Vec<Fields> },
    /// Bytes that could not be resolved against a definition
    Raw(Vec<u8>),
}

/// A ZCL frame resolved against its cluster definition
#[derive(Debug, Clone, PartialEq)]
pub struct ZclFrame {
    pub header: ZclHeader,
    pub cluster: Arc<Cluster>,
    pub payload: Payload,
}

enum CommandDef<'a> {
    Global(GlobalCommand),
    Cluster(&'a Command),
}

impl ZclFrame {
    #[must_use]
    pub fn new(header: ZclHeader, cluster: Arc<Cluster>, payload: Payload) -> Self {
        Self {
            header,
            cluster,
            payload,
        }
    }

    fn command_def(&self) -> Option<CommandDef<'_>> {
        command_def(&self.cluster, &self.header)
    }

    /// Command name, if the command is known
    #[must_use]
    pub fn command_name(&self) -> Option<&str> {
        match self.command_def()? {
            CommandDef::Global(command) => Some(command.name()),
            CommandDef::Cluster(command) => Some(command.name.as_str()),
        }
    }

    /// The global command carried by this frame, if any
    #[must_use]
    pub fn global_command(&self) -> Option<GlobalCommand> {
        if self.header.is_global() {
            GlobalCommand::from_u8(self.header.command_id)
        } else {
            None
        }
    }

    /// Whether the command definition declares a response command
    #[must_use]
    pub fn command_has_response(&self) -> bool {
        match self.command_def() {
            Some(CommandDef::Global(command)) => command.response().is_some(),
            Some(CommandDef::Cluster(command)) => command.response.is_some(),
            None => false,
        }
    }

    /// Serialize header and payload
    pub fn to_bytes(&self) -> Result<Bytes, ProtocolError> {
        let mut writer = ZclWriter::new();
        self.header.write(&mut writer);

        match (&self.payload, self.command_def()) {
            (Payload::Raw(bytes), _) => writer.put_slice(bytes),
            (Payload::Records(records), Some(CommandDef::Global(command))) => {
                for record in records {
                    write_record(&mut writer, command.parameters(), record)?;
                }
            }
            (Payload::Fields(fields), Some(CommandDef::Global(command))) => {
                write_record(&mut writer, command.parameters(), fields)?;
            }
            (Payload::Discovery { complete, records }, Some(CommandDef::Global(command))) => {
                writer.put_u8(u8::from(*complete));
                for record in records {
                    write_record(&mut writer, command.parameters(), record)?;
                }
            }
            (Payload::Fields(fields), Some(CommandDef::Cluster(command))) => {
                write_record(&mut writer, &command.parameters, fields)?;
            }
            _ => {
                return Err(ProtocolError::UnknownCommand {
                    cluster: self.cluster.name.clone(),
                    command: self.header.command_id.to_string(),
                })
            }
        }
        Ok(writer.freeze())
    }

    /// Decode a received frame
    ///
    /// The cluster is resolved through `registry` using the frame's
    /// manufacturer code. Frames whose command cannot be resolved, or whose
    /// payload does not match the definition, keep their payload as raw
    /// bytes. Only a truncated header is an error.
    pub fn decode(
        registry: &ClusterRegistry,
        cluster_id: u16,
        data: &[u8],
    ) -> Result<Self, ProtocolError> {
        let mut reader = ZclReader::new(data);
        let header = ZclHeader::parse(&mut reader)?;
        let cluster = registry.by_id(cluster_id, header.manufacturer_code);

        let payload_start = data.len() - reader.remaining();
        let payload = match command_def(&cluster, &header) {
            Some(def) => match read_payload(&mut reader, &def) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::debug!(
                        "Keeping raw payload for cluster {:#06x} command {:#04x}: {}",
                        cluster_id,
                        header.command_id,
                        e
                    );
                    Payload::Raw(data[payload_start..].to_vec())
                }
            },
            None => Payload::Raw(reader.read_rest()),
        };

        Ok(Self {
            header,
            cluster,
            payload,
        })
    }

    /// Attribute values of a read response or report, keyed by name
    ///
    /// On manufacturer-specific frames the attribute is matched against
    /// `device_manufacturer` (falling back to the frame's own code).
    /// Attributes without a matching definition keep their numeric key.
    #[must_use]
    pub fn attributes(&self, device_manufacturer: Option<u16>) -> AttributeMap {
        let manufacturer = self
            .header
            .manufacturer_code
            .and(device_manufacturer.or(self.header.manufacturer_code));
        let mut map = AttributeMap::new();

        let Payload::Records(records) = &self.payload else {
            return map;
        };
        for record in records {
            let (Some(id), Some(value)) = (
                record.get("attrId").and_then(ZclValue::as_u64),
                record.get("attrData"),
            ) else {
                continue;
            };
            let Ok(id) = u16::try_from(id) else {
                continue;
            };
            let key = match self.cluster.attribute_by_id(id, manufacturer) {
                Some(attribute) => AttributeKey::Name(attribute.name.clone()),
                None => AttributeKey::Id(id),
            };
            map.insert(key, value.clone());
        }
        map
    }

    /// First non-success status carried by a response payload
    ///
    /// Covers read, write, structured write and configure reporting
    /// responses as well as the default response.
    #[must_use]
    pub fn failed_status(&self) -> Option<(u8, Option<u16>)> {
        let status_of = |fields: &Fields, name: &str| {
            fields
                .get(name)
                .and_then(ZclValue::as_u64)
                .and_then(|s| u8::try_from(s).ok())
        };
        let attr_id = |fields: &Fields| {
            fields
                .get("attrId")
                .and_then(ZclValue::as_u64)
                .and_then(|id| u16::try_from(id).ok())
        };
        match (&self.payload, self.global_command()?) {
            (
                Payload::Records(records),
                GlobalCommand::ReadAttributesResponse
                | GlobalCommand::WriteAttributesResponse
                | GlobalCommand::ConfigureReportingResponse
                | GlobalCommand::WriteAttributesStructuredResponse,
            ) => records.iter().find_map(|record| {
                status_of(record, "status")
                    .filter(|s| *s != Status::Success as u8)
                    .map(|s| (s, attr_id(record)))
            }),
            (Payload::Fields(fields), GlobalCommand::DefaultResponse) => {
                status_of(fields, "statusCode")
                    .filter(|s| *s != Status::Success as u8)
                    .map(|s| (s, None))
            }
            _ => None,
        }
    }
}

fn command_def<'a>(cluster: &'a Cluster, header: &ZclHeader) -> Option<CommandDef<'a>> {
    match header.frame_type {
        FrameType::Global => GlobalCommand::from_u8(header.command_id).map(CommandDef::Global),
        FrameType::ClusterSpecific => match header.direction {
            Direction::ClientToServer => cluster.command_by_id(header.command_id),
            Direction::ServerToClient => cluster.command_response_by_id(header.command_id),
        }
        .map(CommandDef::Cluster),
    }
}

fn read_payload(reader: &mut ZclReader<'_>, def: &CommandDef<'_>) -> Result<Payload, ProtocolError> {
    match def {
        CommandDef::Cluster(command) => Ok(Payload::Fields(read_record(reader, &command.parameters)?)),
        CommandDef::Global(command) => match command.strategy() {
            ParseStrategy::Flat => Ok(Payload::Fields(read_record(reader, command.parameters())?)),
            ParseStrategy::Repetitive => {
                let mut records = Vec::new();
                while reader.remaining() > 0 {
                    records.push(read_record(reader, command.parameters())?);
                }
                Ok(Payload::Records(records))
            }
            ParseStrategy::Discovery => {
                let complete = reader.read_u8()? != 0;
                let mut records = Vec::new();
                while reader.remaining() > 0 {
                    records.push(read_record(reader, command.parameters())?);
                }
                Ok(Payload::Discovery { complete, records })
            }
        },
    }
}

fn record_data_type(record: &Fields, name: &str) -> Result<DataType, ProtocolError> {
    let raw = record
        .get("dataType")
        .and_then(ZclValue::as_u64)
        .ok_or_else(|| ProtocolError::MissingParameter("dataType".into()))?;
    let raw = u8::try_from(raw).map_err(|_| ProtocolError::InvalidValue {
        name: name.to_string(),
        reason: format!("data type {raw} out of range"),
    })?;
    DataType::from_u8(raw).ok_or(ProtocolError::UnsupportedDataType(raw))
}

fn read_record(reader: &mut ZclReader<'_>, parameters: &[Parameter]) -> Result<Fields, ProtocolError> {
    let mut record = Fields::new();
    for parameter in parameters {
        if !parameter.is_present(&record, Some(reader.remaining())) {
            continue;
        }
        let value = match parameter.kind {
            ParamType::Data(data_type) => reader.read_value(data_type)?,
            ParamType::UseDataType => {
                reader.read_value(record_data_type(&record, &parameter.name)?)?
            }
            ParamType::Selector => ZclValue::Selector(reader.read_selector()?),
        };
        record.insert(&parameter.name, value);
    }
    Ok(record)
}

fn write_record(
    writer: &mut ZclWriter,
    parameters: &[Parameter],
    record: &Fields,
) -> Result<(), ProtocolError> {
    // Conditions see only the fields written so far
    let mut written = Fields::new();
    for parameter in parameters {
        if !parameter.is_present(&written, None) {
            continue;
        }
        let Some(value) = record.get(&parameter.name) else {
            if parameter.is_trailing_optional() {
                continue;
            }
            return Err(ProtocolError::MissingParameter(parameter.name.clone()));
        };
        match (parameter.kind, value) {
            (ParamType::Data(data_type), _) => {
                writer.write_value(&parameter.name, data_type, value)?;
            }
            (ParamType::UseDataType, _) => {
                let data_type = record_data_type(&written, &parameter.name)?;
                writer.write_value(&parameter.name, data_type, value)?;
            }
            (ParamType::Selector, ZclValue::Selector(selector)) => {
                writer.write_selector(&parameter.name, selector)?;
            }
            (ParamType::Selector, other) => {
                return Err(ProtocolError::InvalidValue {
                    name: parameter.name.clone(),
                    reason: format!("expected a structured selector, got {other:?}"),
                });
            }
        }
        written.insert(&parameter.name, value.clone());
    }
    Ok(())
}
