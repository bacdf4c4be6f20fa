//! ZCL global (foundation) commands
//!
//! Global commands share one id space across every cluster. Their payloads
//! are either a list of repeated records, one flat record, or the discover
//! response layout (a completion flag followed by records).

use crate::cluster::{Condition, Parameter};
use crate::data_type::{DataType, DataTypeClass};
use std::sync::OnceLock;

/// ZCL Global commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GlobalCommand {
    ReadAttributes = 0x00,
    ReadAttributesResponse = 0x01,
    WriteAttributes = 0x02,
    WriteAttributesUndivided = 0x03,
    WriteAttributesResponse = 0x04,
    WriteAttributesNoResponse = 0x05,
    ConfigureReporting = 0x06,
    ConfigureReportingResponse = 0x07,
    ReadReportingConfig = 0x08,
    ReadReportingConfigResponse = 0x09,
    ReportAttributes = 0x0A,
    DefaultResponse = 0x0B,
    DiscoverAttributes = 0x0C,
    DiscoverAttributesResponse = 0x0D,
    ReadAttributesStructured = 0x0E,
    WriteAttributesStructured = 0x0F,
    WriteAttributesStructuredResponse = 0x10,
    DiscoverCommandsReceived = 0x11,
    DiscoverCommandsReceivedResponse = 0x12,
    DiscoverCommandsGenerated = 0x13,
    DiscoverCommandsGeneratedResponse = 0x14,
    DiscoverAttributesExtended = 0x15,
    DiscoverAttributesExtendedResponse = 0x16,
}

/// Highest global command id
const LAST: u8 = GlobalCommand::DiscoverAttributesExtendedResponse as u8;

/// Payload layout of a global command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    /// Records repeated until the payload is exhausted
    Repetitive,
    /// A single record
    Flat,
    /// `discComplete` flag followed by repeated records, as in all discover responses
    Discovery,
}

const STATUS_SUCCESS: u8 = 0x00;
const CLIENT_TO_SERVER: u8 = 0x00;
const SERVER_TO_CLIENT: u8 = 0x01;

impl GlobalCommand {
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::ReadAttributes),
            0x01 => Some(Self::ReadAttributesResponse),
            0x02 => Some(Self::WriteAttributes),
            0x03 => Some(Self::WriteAttributesUndivided),
            0x04 => Some(Self::WriteAttributesResponse),
            0x05 => Some(Self::WriteAttributesNoResponse),
            0x06 => Some(Self::ConfigureReporting),
            0x07 => Some(Self::ConfigureReportingResponse),
            0x08 => Some(Self::ReadReportingConfig),
            0x09 => Some(Self::ReadReportingConfigResponse),
            0x0A => Some(Self::ReportAttributes),
            0x0B => Some(Self::DefaultResponse),
            0x0C => Some(Self::DiscoverAttributes),
            0x0D => Some(Self::DiscoverAttributesResponse),
            0x0E => Some(Self::ReadAttributesStructured),
            0x0F => Some(Self::WriteAttributesStructured),
            0x10 => Some(Self::WriteAttributesStructuredResponse),
            0x11 => Some(Self::DiscoverCommandsReceived),
            0x12 => Some(Self::DiscoverCommandsReceivedResponse),
            0x13 => Some(Self::DiscoverCommandsGenerated),
            0x14 => Some(Self::DiscoverCommandsGeneratedResponse),
            0x15 => Some(Self::DiscoverAttributesExtended),
            0x16 => Some(Self::DiscoverAttributesExtendedResponse),
            _ => None,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::ReadAttributes => "read",
            Self::ReadAttributesResponse => "readRsp",
            Self::WriteAttributes => "write",
            Self::WriteAttributesUndivided => "writeUndiv",
            Self::WriteAttributesResponse => "writeRsp",
            Self::WriteAttributesNoResponse => "writeNoRsp",
            Self::ConfigureReporting => "configReport",
            Self::ConfigureReportingResponse => "configReportRsp",
            Self::ReadReportingConfig => "readReportConfig",
            Self::ReadReportingConfigResponse => "readReportConfigRsp",
            Self::ReportAttributes => "report",
            Self::DefaultResponse => "defaultRsp",
            Self::DiscoverAttributes => "discover",
            Self::DiscoverAttributesResponse => "discoverRsp",
            Self::ReadAttributesStructured => "readStructured",
            Self::WriteAttributesStructured => "writeStructured",
            Self::WriteAttributesStructuredResponse => "writeStructuredRsp",
            Self::DiscoverCommandsReceived => "discoverCommands",
            Self::DiscoverCommandsReceivedResponse => "discoverCommandsRsp",
            Self::DiscoverCommandsGenerated => "discoverCommandsGen",
            Self::DiscoverCommandsGeneratedResponse => "discoverCommandsGenRsp",
            Self::DiscoverAttributesExtended => "discoverExt",
            Self::DiscoverAttributesExtendedResponse => "discoverExtRsp",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        (0x00..=LAST)
            .filter_map(Self::from_u8)
            .find(|c| c.name() == name)
    }

    #[must_use]
    pub fn strategy(self) -> ParseStrategy {
        match self {
            Self::DefaultResponse
            | Self::DiscoverAttributes
            | Self::DiscoverCommandsReceived
            | Self::DiscoverCommandsGenerated
            | Self::DiscoverAttributesExtended => ParseStrategy::Flat,
            Self::DiscoverAttributesResponse
            | Self::DiscoverCommandsReceivedResponse
            | Self::DiscoverCommandsGeneratedResponse
            | Self::DiscoverAttributesExtendedResponse => ParseStrategy::Discovery,
            _ => ParseStrategy::Repetitive,
        }
    }

    /// Whether the command answers another one
    #[must_use]
    pub fn is_response(self) -> bool {
        matches!(
            self,
            Self::ReadAttributesResponse
                | Self::WriteAttributesResponse
                | Self::ConfigureReportingResponse
                | Self::ReadReportingConfigResponse
                | Self::DefaultResponse
                | Self::DiscoverAttributesResponse
                | Self::WriteAttributesStructuredResponse
                | Self::DiscoverCommandsReceivedResponse
                | Self::DiscoverCommandsGeneratedResponse
                | Self::DiscoverAttributesExtendedResponse
        )
    }

    /// The command the peer answers with, if any
    #[must_use]
    pub fn response(self) -> Option<Self> {
        match self {
            Self::ReadAttributes => Some(Self::ReadAttributesResponse),
            Self::WriteAttributes | Self::WriteAttributesUndivided => {
                Some(Self::WriteAttributesResponse)
            }
            Self::ConfigureReporting => Some(Self::ConfigureReportingResponse),
            Self::ReadReportingConfig => Some(Self::ReadReportingConfigResponse),
            Self::DiscoverAttributes => Some(Self::DiscoverAttributesResponse),
            // Structured reads are answered with a plain read response
            Self::ReadAttributesStructured => Some(Self::ReadAttributesResponse),
            Self::WriteAttributesStructured => Some(Self::WriteAttributesStructuredResponse),
            Self::DiscoverCommandsReceived => Some(Self::DiscoverCommandsReceivedResponse),
            Self::DiscoverCommandsGenerated => Some(Self::DiscoverCommandsGeneratedResponse),
            Self::DiscoverAttributesExtended => Some(Self::DiscoverAttributesExtendedResponse),
            _ => None,
        }
    }

    /// Parameters of one payload record
    #[must_use]
    pub fn parameters(self) -> &'static [Parameter] {
        static TABLE: OnceLock<Vec<Vec<Parameter>>> = OnceLock::new();
        let table = TABLE.get_or_init(|| (0x00..=LAST).map(build_parameters).collect());
        &table[self as usize]
    }
}

fn reporting_parameters() -> Vec<Parameter> {
    let reported = Condition::DirectionEquals(CLIENT_TO_SERVER);
    vec![
        Parameter::new("dataType", DataType::Uint8).when(reported),
        Parameter::new("minRepIntval", DataType::Uint16).when(reported),
        Parameter::new("maxRepIntval", DataType::Uint16).when(reported),
        Parameter::typed_by_record("repChange")
            .when(reported)
            .when(Condition::DataTypeClassEquals(DataTypeClass::Analog)),
        Parameter::new("timeout", DataType::Uint16)
            .when(Condition::DirectionEquals(SERVER_TO_CLIENT)),
    ]
}

fn build_parameters(id: u8) -> Vec<Parameter> {
    let attr_id = || Parameter::new("attrId", DataType::Uint16);
    let data_type = || Parameter::new("dataType", DataType::Uint8);
    let status = || Parameter::new("status", DataType::Uint8);
    let direction = || Parameter::new("direction", DataType::Uint8);

    match GlobalCommand::from_u8(id) {
        Some(GlobalCommand::ReadAttributes) => vec![attr_id()],
        Some(GlobalCommand::ReadAttributesResponse) => vec![
            attr_id(),
            status(),
            data_type().when(Condition::StatusEquals(STATUS_SUCCESS)),
            Parameter::typed_by_record("attrData").when(Condition::StatusEquals(STATUS_SUCCESS)),
        ],
        Some(
            GlobalCommand::WriteAttributes
            | GlobalCommand::WriteAttributesUndivided
            | GlobalCommand::WriteAttributesNoResponse
            | GlobalCommand::ReportAttributes,
        ) => vec![attr_id(), data_type(), Parameter::typed_by_record("attrData")],
        Some(GlobalCommand::WriteAttributesResponse) => vec![
            status(),
            attr_id().when(Condition::StatusNotEquals(STATUS_SUCCESS)),
        ],
        Some(GlobalCommand::ConfigureReporting) => {
            let mut params = vec![direction(), attr_id()];
            params.extend(reporting_parameters());
            params
        }
        Some(GlobalCommand::ConfigureReportingResponse) => vec![
            status(),
            direction().when(Condition::MinimumRemainingBytes(3)),
            attr_id().when(Condition::MinimumRemainingBytes(2)),
        ],
        Some(GlobalCommand::ReadReportingConfig) => vec![direction(), attr_id()],
        Some(GlobalCommand::ReadReportingConfigResponse) => {
            let mut params = vec![status(), direction(), attr_id()];
            params.extend(reporting_parameters());
            params
        }
        Some(GlobalCommand::DefaultResponse) => vec![
            Parameter::new("cmdId", DataType::Uint8),
            Parameter::new("statusCode", DataType::Uint8),
        ],
        Some(GlobalCommand::DiscoverAttributes) => vec![
            Parameter::new("startAttrId", DataType::Uint16),
            Parameter::new("maxAttrIds", DataType::Uint8),
        ],
        Some(GlobalCommand::DiscoverAttributesResponse) => vec![attr_id(), data_type()],
        Some(GlobalCommand::ReadAttributesStructured) => {
            vec![attr_id(), Parameter::selector("selector")]
        }
        Some(GlobalCommand::WriteAttributesStructured) => vec![
            attr_id(),
            Parameter::selector("selector"),
            data_type(),
            Parameter::typed_by_record("elementData"),
        ],
        // A single success record stands for every written attribute
        Some(GlobalCommand::WriteAttributesStructuredResponse) => vec![
            status(),
            attr_id().when(Condition::StatusNotEquals(STATUS_SUCCESS)),
            Parameter::selector("selector").when(Condition::StatusNotEquals(STATUS_SUCCESS)),
        ],
        Some(
            GlobalCommand::DiscoverCommandsReceived | GlobalCommand::DiscoverCommandsGenerated,
        ) => vec![
            Parameter::new("startCmdId", DataType::Uint8),
            Parameter::new("maxCmdIds", DataType::Uint8),
        ],
        Some(
            GlobalCommand::DiscoverCommandsReceivedResponse
            | GlobalCommand::DiscoverCommandsGeneratedResponse,
        ) => vec![Parameter::new("cmdId", DataType::Uint8)],
        Some(GlobalCommand::DiscoverAttributesExtended) => vec![
            Parameter::new("startAttrId", DataType::Uint16),
            Parameter::new("maxAttrIds", DataType::Uint8),
        ],
        Some(GlobalCommand::DiscoverAttributesExtendedResponse) => vec![
            attr_id(),
            data_type(),
            Parameter::new("access", DataType::Uint8),
        ],
        None => Vec::new(),
    }
}
