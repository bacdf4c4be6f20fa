//! ZCL data types

/// ZCL data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum DataType {
    NoData = 0x00,
    Data8 = 0x08,
    Data16 = 0x09,
    Data24 = 0x0A,
    Data32 = 0x0B,
    Data40 = 0x0C,
    Data48 = 0x0D,
    Data56 = 0x0E,
    Data64 = 0x0F,
    Boolean = 0x10,
    Bitmap8 = 0x18,
    Bitmap16 = 0x19,
    Bitmap24 = 0x1A,
    Bitmap32 = 0x1B,
    Bitmap40 = 0x1C,
    Bitmap48 = 0x1D,
    Bitmap56 = 0x1E,
    Bitmap64 = 0x1F,
    Uint8 = 0x20,
    Uint16 = 0x21,
    Uint24 = 0x22,
    Uint32 = 0x23,
    Uint40 = 0x24,
    Uint48 = 0x25,
    Uint56 = 0x26,
    Uint64 = 0x27,
    Int8 = 0x28,
    Int16 = 0x29,
    Int24 = 0x2A,
    Int32 = 0x2B,
    Int40 = 0x2C,
    Int48 = 0x2D,
    Int56 = 0x2E,
    Int64 = 0x2F,
    Enum8 = 0x30,
    Enum16 = 0x31,
    SemiPrecision = 0x38,
    SinglePrecision = 0x39,
    DoublePrecision = 0x3A,
    OctetString = 0x41,
    CharString = 0x42,
    LongOctetString = 0x43,
    LongCharString = 0x44,
    Array = 0x48,
    Struct = 0x4C,
    Set = 0x50,
    Bag = 0x51,
    TimeOfDay = 0xE0,
    Date = 0xE1,
    Utc = 0xE2,
    ClusterId = 0xE8,
    AttributeId = 0xE9,
    BacnetOid = 0xEA,
    IeeeAddress = 0xF0,
    SecurityKey = 0xF1,
}

/// Value class of a data type, used by reporting configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataTypeClass {
    /// Continuous values with a meaningful reportable change
    Analog,
    /// Enumerations, bitmaps, strings and collections
    Discrete,
}

impl DataType {
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        let data_type = match value {
            0x00 => Self::NoData,
            0x08 => Self::Data8,
            0x09 => Self::Data16,
            0x0A => Self::Data24,
            0x0B => Self::Data32,
            0x0C => Self::Data40,
            0x0D => Self::Data48,
            0x0E => Self::Data56,
            0x0F => Self::Data64,
            0x10 => Self::Boolean,
            0x18 => Self::Bitmap8,
            0x19 => Self::Bitmap16,
            0x1A => Self::Bitmap24,
            0x1B => Self::Bitmap32,
            0x1C => Self::Bitmap40,
            0x1D => Self::Bitmap48,
            0x1E => Self::Bitmap56,
            0x1F => Self::Bitmap64,
            0x20 => Self::Uint8,
            0x21 => Self::Uint16,
            0x22 => Self::Uint24,
            0x23 => Self::Uint32,
            0x24 => Self::Uint40,
            0x25 => Self::Uint48,
            0x26 => Self::Uint56,
            0x27 => Self::Uint64,
            0x28 => Self::Int8,
            0x29 => Self::Int16,
            0x2A => Self::Int24,
            0x2B => Self::Int32,
            0x2C => Self::Int40,
            0x2D => Self::Int48,
            0x2E => Self::Int56,
            0x2F => Self::Int64,
            0x30 => Self::Enum8,
            0x31 => Self::Enum16,
            0x38 => Self::SemiPrecision,
            0x39 => Self::SinglePrecision,
            0x3A => Self::DoublePrecision,
            0x41 => Self::OctetString,
            0x42 => Self::CharString,
            0x43 => Self::LongOctetString,
            0x44 => Self::LongCharString,
            0x48 => Self::Array,
            0x4C => Self::Struct,
            0x50 => Self::Set,
            0x51 => Self::Bag,
            0xE0 => Self::TimeOfDay,
            0xE1 => Self::Date,
            0xE2 => Self::Utc,
            0xE8 => Self::ClusterId,
            0xE9 => Self::AttributeId,
            0xEA => Self::BacnetOid,
            0xF0 => Self::IeeeAddress,
            0xF1 => Self::SecurityKey,
            _ => return None,
        };
        Some(data_type)
    }

    /// Analog or discrete classification, `None` for `NoData`
    #[must_use]
    pub fn class(self) -> Option<DataTypeClass> {
        match self {
            Self::NoData => None,
            Self::Uint8
            | Self::Uint16
            | Self::Uint24
            | Self::Uint32
            | Self::Uint40
            | Self::Uint48
            | Self::Uint56
            | Self::Uint64
            | Self::Int8
            | Self::Int16
            | Self::Int24
            | Self::Int32
            | Self::Int40
            | Self::Int48
            | Self::Int56
            | Self::Int64
            | Self::SemiPrecision
            | Self::SinglePrecision
            | Self::DoublePrecision
            | Self::TimeOfDay
            | Self::Date
            | Self::Utc => Some(DataTypeClass::Analog),
            _ => Some(DataTypeClass::Discrete),
        }
    }

    /// Width in bytes of unsigned integer-like types
    #[must_use]
    pub fn unsigned_width(self) -> Option<usize> {
        match self {
            Self::Data8 | Self::Bitmap8 | Self::Uint8 | Self::Enum8 => Some(1),
            Self::Data16
            | Self::Bitmap16
            | Self::Uint16
            | Self::Enum16
            | Self::ClusterId
            | Self::AttributeId => Some(2),
            Self::Data24 | Self::Bitmap24 | Self::Uint24 => Some(3),
            Self::Data32 | Self::Bitmap32 | Self::Uint32 | Self::Utc | Self::BacnetOid => Some(4),
            Self::Data40 | Self::Bitmap40 | Self::Uint40 => Some(5),
            Self::Data48 | Self::Bitmap48 | Self::Uint48 => Some(6),
            Self::Data56 | Self::Bitmap56 | Self::Uint56 => Some(7),
            Self::Data64 | Self::Bitmap64 | Self::Uint64 | Self::IeeeAddress => Some(8),
            _ => None,
        }
    }

    /// Width in bytes of signed integer types
    #[must_use]
    pub fn signed_width(self) -> Option<usize> {
        match self {
            Self::Int8 => Some(1),
            Self::Int16 => Some(2),
            Self::Int24 => Some(3),
            Self::Int32 => Some(4),
            Self::Int40 => Some(5),
            Self::Int48 => Some(6),
            Self::Int56 => Some(7),
            Self::Int64 => Some(8),
            _ => None,
        }
    }
}

impl From<DataType> for u8 {
    fn from(data_type: DataType) -> Self {
        data_type as u8
    }
}
