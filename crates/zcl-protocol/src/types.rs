//! Common types used throughout the protocol

use thiserror::Error;

/// Protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Frame too short: {0} bytes")]
    FrameTooShort(usize),

    #[error("Cluster with name '{0}' does not exist")]
    UnknownCluster(String),

    #[error("Cluster '{cluster}' has no command '{command}'")]
    UnknownCommand { cluster: String, command: String },

    #[error("Unknown attribute '{0}', specify either an existing attribute or a number")]
    UnknownAttribute(String),

    #[error("Cannot have attributes with different manufacturerCode in a single call")]
    MixedManufacturerCode,

    #[error("Parameter '{0}' is missing")]
    MissingParameter(String),

    #[error("Invalid value for '{name}': {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("Unsupported data type: {0:#04x}")]
    UnsupportedDataType(u8),
}

/// ZCL status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Success = 0x00,
    Failure = 0x01,
    NotAuthorized = 0x7E,
    ReservedFieldNotZero = 0x7F,
    MalformedCommand = 0x80,
    UnsupportedClusterCommand = 0x81,
    UnsupportedGeneralCommand = 0x82,
    UnsupportedManufacturerClusterCommand = 0x83,
    UnsupportedManufacturerGeneralCommand = 0x84,
    InvalidField = 0x85,
    UnsupportedAttribute = 0x86,
    InvalidValue = 0x87,
    ReadOnly = 0x88,
    InsufficientSpace = 0x89,
    DuplicateExists = 0x8A,
    NotFound = 0x8B,
    UnreportableAttribute = 0x8C,
    InvalidDataType = 0x8D,
    InvalidSelector = 0x8E,
    WriteOnly = 0x8F,
    InconsistentStartupState = 0x90,
    DefinedOutOfBand = 0x91,
    Inconsistent = 0x92,
    ActionDenied = 0x93,
    Timeout = 0x94,
    Abort = 0x95,
    InvalidImage = 0x96,
    WaitForData = 0x97,
    NoImageAvailable = 0x98,
    RequireMoreImage = 0x99,
    NotificationPending = 0x9A,
    HardwareFailure = 0xC0,
    SoftwareFailure = 0xC1,
    CalibrationError = 0xC2,
    UnsupportedCluster = 0xC3,
}

impl TryFrom<u8> for Status {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        let status = match value {
            0x00 => Status::Success,
            0x01 => Status::Failure,
            0x7E => Status::NotAuthorized,
            0x7F => Status::ReservedFieldNotZero,
            0x80 => Status::MalformedCommand,
            0x81 => Status::UnsupportedClusterCommand,
            0x82 => Status::UnsupportedGeneralCommand,
            0x83 => Status::UnsupportedManufacturerClusterCommand,
            0x84 => Status::UnsupportedManufacturerGeneralCommand,
            0x85 => Status::InvalidField,
            0x86 => Status::UnsupportedAttribute,
            0x87 => Status::InvalidValue,
            0x88 => Status::ReadOnly,
            0x89 => Status::InsufficientSpace,
            0x8A => Status::DuplicateExists,
            0x8B => Status::NotFound,
            0x8C => Status::UnreportableAttribute,
            0x8D => Status::InvalidDataType,
            0x8E => Status::InvalidSelector,
            0x8F => Status::WriteOnly,
            0x90 => Status::InconsistentStartupState,
            0x91 => Status::DefinedOutOfBand,
            0x92 => Status::Inconsistent,
            0x93 => Status::ActionDenied,
            0x94 => Status::Timeout,
            0x95 => Status::Abort,
            0x96 => Status::InvalidImage,
            0x97 => Status::WaitForData,
            0x98 => Status::NoImageAvailable,
            0x99 => Status::RequireMoreImage,
            0x9A => Status::NotificationPending,
            0xC0 => Status::HardwareFailure,
            0xC1 => Status::SoftwareFailure,
            0xC2 => Status::CalibrationError,
            0xC3 => Status::UnsupportedCluster,
            _ => return Err(value),
        };
        Ok(status)
    }
}

/// ZCL Frame types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    Global = 0x00,
    ClusterSpecific = 0x01,
}

impl FrameType {
    /// Decode the frame type bits of the frame control field
    pub fn from_bits(bits: u8) -> Result<Self, ProtocolError> {
        match bits & 0x03 {
            0 => Ok(FrameType::Global),
            1 => Ok(FrameType::ClusterSpecific),
            other => Err(ProtocolError::InvalidFrame(format!(
                "Reserved frame type: {other}"
            ))),
        }
    }
}

/// ZCL Direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    ClientToServer = 0x00,
    ServerToClient = 0x01,
}

impl Direction {
    #[must_use]
    pub fn reverse(self) -> Self {
        match self {
            Direction::ClientToServer => Direction::ServerToClient,
            Direction::ServerToClient => Direction::ClientToServer,
        }
    }
}

/// Zigbee manufacturer codes referenced by the built-in library
pub mod manufacturer {
    pub const VIESSMANN: u16 = 0x1221;
    pub const DANFOSS: u16 = 0x1246;
    pub const ADEO: u16 = 0x1277;
}
