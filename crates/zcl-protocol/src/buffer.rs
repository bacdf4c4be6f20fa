//! Bounds-checked reader and writer for ZCL payloads
//!
//! All multi-byte integers are little-endian. Strings are length-prefixed
//! (1 byte for short strings, 2 bytes for long strings) and the all-ones
//! length marks a non-value.
//!
//! Character strings decode to `ZclValue::String` when they are valid
//! UTF-8 and to `ZclValue::Octets` otherwise, and both encode back to the
//! same bytes. Booleans are the one lossy type: any byte other than 0x00
//! and the 0xFF non-value decodes as `true` and encodes back as 0x01.

use crate::data_type::DataType;
use crate::types::ProtocolError;
use crate::value::{SelectorIndicator, StructuredSelector, ZclValue};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Cursor over a received ZCL payload
#[derive(Debug)]
pub struct ZclReader<'a> {
    buf: &'a [u8],
    total: usize,
}

impl<'a> ZclReader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            buf: data,
            total: data.len(),
        }
    }

    /// Bytes left to read
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn ensure(&self, needed: usize) -> Result<(), ProtocolError> {
        if self.buf.remaining() < needed {
            return Err(ProtocolError::FrameTooShort(self.total));
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        self.ensure(2)?;
        Ok(self.buf.get_u16_le())
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, ProtocolError> {
        self.ensure(len)?;
        let bytes = self.buf[..len].to_vec();
        self.buf.advance(len);
        Ok(bytes)
    }

    /// Consume everything left
    pub fn read_rest(&mut self) -> Vec<u8> {
        let rest = self.buf.to_vec();
        self.buf.advance(rest.len());
        rest
    }

    /// Read one value laid out according to `data_type`
    pub fn read_value(&mut self, data_type: DataType) -> Result<ZclValue, ProtocolError> {
        if let Some(width) = data_type.unsigned_width() {
            self.ensure(width)?;
            return Ok(ZclValue::Uint(self.buf.get_uint_le(width)));
        }
        if let Some(width) = data_type.signed_width() {
            self.ensure(width)?;
            return Ok(ZclValue::Int(self.buf.get_int_le(width)));
        }

        match data_type {
            DataType::NoData => Ok(ZclValue::Null),
            DataType::Boolean => match self.read_u8()? {
                0xFF => Ok(ZclValue::Null),
                b => Ok(ZclValue::Bool(b != 0)),
            },
            DataType::SemiPrecision => Ok(ZclValue::Float(half_to_f64(self.read_u16()?))),
            DataType::SinglePrecision => {
                self.ensure(4)?;
                Ok(ZclValue::Float(f64::from(self.buf.get_f32_le())))
            }
            DataType::DoublePrecision => {
                self.ensure(8)?;
                Ok(ZclValue::Float(self.buf.get_f64_le()))
            }
            DataType::OctetString => match self.read_u8()? {
                0xFF => Ok(ZclValue::Null),
                len => Ok(ZclValue::Octets(self.read_bytes(usize::from(len))?)),
            },
            DataType::CharString => match self.read_u8()? {
                0xFF => Ok(ZclValue::Null),
                len => self.read_string(usize::from(len)),
            },
            DataType::LongOctetString => match self.read_u16()? {
                0xFFFF => Ok(ZclValue::Null),
                len => Ok(ZclValue::Octets(self.read_bytes(usize::from(len))?)),
            },
            DataType::LongCharString => match self.read_u16()? {
                0xFFFF => Ok(ZclValue::Null),
                len => self.read_string(usize::from(len)),
            },
            DataType::Array | DataType::Set | DataType::Bag => {
                let raw_type = self.read_u8()?;
                let element_type = DataType::from_u8(raw_type)
                    .ok_or(ProtocolError::UnsupportedDataType(raw_type))?;
                let count = self.read_u16()?;
                if count == 0xFFFF {
                    return Ok(ZclValue::Null);
                }
                let mut elements = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    elements.push(self.read_value(element_type)?);
                }
                Ok(ZclValue::Array {
                    element_type,
                    elements,
                })
            }
            DataType::Struct => {
                let count = self.read_u16()?;
                if count == 0xFFFF {
                    return Ok(ZclValue::Null);
                }
                let mut members = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    let raw_type = self.read_u8()?;
                    let member_type = DataType::from_u8(raw_type)
                        .ok_or(ProtocolError::UnsupportedDataType(raw_type))?;
                    members.push((member_type, self.read_value(member_type)?));
                }
                Ok(ZclValue::Struct(members))
            }
            DataType::TimeOfDay | DataType::Date => Ok(ZclValue::Octets(self.read_bytes(4)?)),
            DataType::SecurityKey => Ok(ZclValue::Octets(self.read_bytes(16)?)),
            other => Err(ProtocolError::UnsupportedDataType(other as u8)),
        }
    }

    fn read_string(&mut self, len: usize) -> Result<ZclValue, ProtocolError> {
        let bytes = self.read_bytes(len)?;
        Ok(match String::from_utf8(bytes) {
            Ok(s) => ZclValue::String(s),
            Err(e) => ZclValue::Octets(e.into_bytes()),
        })
    }

    /// Read the element path of a structured command
    pub fn read_selector(&mut self) -> Result<StructuredSelector, ProtocolError> {
        let raw = self.read_u8()?;
        let indicator = match raw & 0xF0 {
            0x00 => SelectorIndicator::Whole,
            0x10 => SelectorIndicator::WriteAdd,
            0x20 => SelectorIndicator::WriteRemove,
            _ => {
                return Err(ProtocolError::InvalidFrame(format!(
                    "Reserved selector indicator: {raw:#04x}"
                )))
            }
        };
        let count = raw & 0x0F;
        let mut indexes = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            indexes.push(self.read_u16()?);
        }
        Ok(StructuredSelector { indicator, indexes })
    }
}

/// Growable buffer for outgoing ZCL frames
#[derive(Debug, Default)]
pub struct ZclWriter {
    buf: BytesMut,
}

impl ZclWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.put_u16_le(value);
    }

    pub fn put_slice(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
    }

    #[must_use]
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }

    /// Write one value laid out according to `data_type`
    ///
    /// `name` only labels the error when the value does not fit the type.
    pub fn write_value(
        &mut self,
        name: &str,
        data_type: DataType,
        value: &ZclValue,
    ) -> Result<(), ProtocolError> {
        let invalid = |reason: String| ProtocolError::InvalidValue {
            name: name.to_string(),
            reason,
        };

        if let Some(width) = data_type.unsigned_width() {
            let v = value
                .as_u64()
                .ok_or_else(|| invalid(format!("expected unsigned integer, got {value:?}")))?;
            if width < 8 && v >> (width * 8) != 0 {
                return Err(invalid(format!("{v} does not fit in {width} bytes")));
            }
            self.buf.put_uint_le(v, width);
            return Ok(());
        }
        if let Some(width) = data_type.signed_width() {
            let v = value
                .as_i64()
                .ok_or_else(|| invalid(format!("expected signed integer, got {value:?}")))?;
            if width < 8 {
                let bits = width * 8;
                let min = -(1i64 << (bits - 1));
                let max = (1i64 << (bits - 1)) - 1;
                if v < min || v > max {
                    return Err(invalid(format!("{v} does not fit in {width} bytes")));
                }
            }
            self.buf.put_int_le(v, width);
            return Ok(());
        }

        match (data_type, value) {
            (DataType::NoData, _) => {}
            (DataType::Boolean, ZclValue::Null) => self.buf.put_u8(0xFF),
            (DataType::Boolean, v) => {
                let b = v
                    .as_bool()
                    .ok_or_else(|| invalid(format!("expected boolean, got {v:?}")))?;
                self.buf.put_u8(u8::from(b));
            }
            (DataType::SemiPrecision, v) => self.buf.put_u16_le(f64_to_half(float(v, &invalid)?)),
            #[allow(clippy::cast_possible_truncation)]
            (DataType::SinglePrecision, v) => self.buf.put_f32_le(float(v, &invalid)? as f32),
            (DataType::DoublePrecision, v) => self.buf.put_f64_le(float(v, &invalid)?),
            (DataType::OctetString | DataType::CharString, ZclValue::Null) => self.buf.put_u8(0xFF),
            (DataType::LongOctetString | DataType::LongCharString, ZclValue::Null) => {
                self.buf.put_u16_le(0xFFFF);
            }
            (DataType::OctetString, ZclValue::Octets(bytes)) => self.put_short(bytes, &invalid)?,
            (DataType::CharString, ZclValue::String(s)) => self.put_short(s.as_bytes(), &invalid)?,
            (DataType::CharString, ZclValue::Octets(bytes)) => self.put_short(bytes, &invalid)?,
            (DataType::LongOctetString, ZclValue::Octets(bytes)) => {
                self.put_long(bytes, &invalid)?;
            }
            (DataType::LongCharString, ZclValue::String(s)) => {
                self.put_long(s.as_bytes(), &invalid)?;
            }
            (DataType::LongCharString, ZclValue::Octets(bytes)) => {
                self.put_long(bytes, &invalid)?;
            }
            (
                DataType::Array | DataType::Set | DataType::Bag,
                ZclValue::Array {
                    element_type,
                    elements,
                },
            ) => {
                let count = u16::try_from(elements.len())
                    .ok()
                    .filter(|c| *c != 0xFFFF)
                    .ok_or_else(|| invalid(format!("{} elements", elements.len())))?;
                self.buf.put_u8(*element_type as u8);
                self.buf.put_u16_le(count);
                for element in elements {
                    self.write_value(name, *element_type, element)?;
                }
            }
            (DataType::Array | DataType::Set | DataType::Bag, ZclValue::Null) => {
                self.buf.put_u8(DataType::NoData as u8);
                self.buf.put_u16_le(0xFFFF);
            }
            (DataType::Struct, ZclValue::Struct(members)) => {
                let count = u16::try_from(members.len())
                    .ok()
                    .filter(|c| *c != 0xFFFF)
                    .ok_or_else(|| invalid(format!("{} members", members.len())))?;
                self.buf.put_u16_le(count);
                for (member_type, member) in members {
                    self.buf.put_u8(*member_type as u8);
                    self.write_value(name, *member_type, member)?;
                }
            }
            (DataType::Struct, ZclValue::Null) => self.buf.put_u16_le(0xFFFF),
            (DataType::TimeOfDay | DataType::Date, ZclValue::Octets(bytes)) if bytes.len() == 4 => {
                self.buf.put_slice(bytes);
            }
            (DataType::SecurityKey, ZclValue::Octets(bytes)) if bytes.len() == 16 => {
                self.buf.put_slice(bytes);
            }
            (data_type, v) => {
                return Err(invalid(format!("{v:?} cannot be encoded as {data_type:?}")));
            }
        }
        Ok(())
    }

    /// Write the element path of a structured command
    pub fn write_selector(
        &mut self,
        name: &str,
        selector: &StructuredSelector,
    ) -> Result<(), ProtocolError> {
        let count = u8::try_from(selector.indexes.len())
            .ok()
            .filter(|c| *c <= 0x0F)
            .ok_or_else(|| ProtocolError::InvalidValue {
                name: name.to_string(),
                reason: format!("{} indexes, at most 15", selector.indexes.len()),
            })?;
        self.buf.put_u8(selector.indicator as u8 | count);
        for index in &selector.indexes {
            self.buf.put_u16_le(*index);
        }
        Ok(())
    }

    fn put_short(
        &mut self,
        bytes: &[u8],
        invalid: &impl Fn(String) -> ProtocolError,
    ) -> Result<(), ProtocolError> {
        let len = u8::try_from(bytes.len())
            .ok()
            .filter(|l| *l != 0xFF)
            .ok_or_else(|| invalid(format!("string of {} bytes is too long", bytes.len())))?;
        self.buf.put_u8(len);
        self.buf.put_slice(bytes);
        Ok(())
    }

    fn put_long(
        &mut self,
        bytes: &[u8],
        invalid: &impl Fn(String) -> ProtocolError,
    ) -> Result<(), ProtocolError> {
        let len = u16::try_from(bytes.len())
            .ok()
            .filter(|l| *l != 0xFFFF)
            .ok_or_else(|| invalid(format!("string of {} bytes is too long", bytes.len())))?;
        self.buf.put_u16_le(len);
        self.buf.put_slice(bytes);
        Ok(())
    }
}

#[allow(clippy::cast_precision_loss)]
fn float(
    value: &ZclValue,
    invalid: &impl Fn(String) -> ProtocolError,
) -> Result<f64, ProtocolError> {
    match value {
        ZclValue::Float(f) => Ok(*f),
        ZclValue::Int(i) => Ok(*i as f64),
        ZclValue::Uint(u) => Ok(*u as f64),
        other => Err(invalid(format!("expected number, got {other:?}"))),
    }
}

/// Decode an IEEE 754 half-precision float
fn half_to_f64(bits: u16) -> f64 {
    let sign = if bits & 0x8000 == 0 { 1.0 } else { -1.0 };
    let exponent = i32::from((bits >> 10) & 0x1F);
    let mantissa = f64::from(bits & 0x03FF);
    match exponent {
        0 => sign * mantissa * 2f64.powi(-24),
        0x1F if mantissa == 0.0 => sign * f64::INFINITY,
        0x1F => f64::NAN,
        e => sign * (1.0 + mantissa / 1024.0) * 2f64.powi(e - 15),
    }
}

/// Encode an IEEE 754 half-precision float, saturating to infinity
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
fn f64_to_half(value: f64) -> u16 {
    if value.is_nan() {
        return 0x7E00;
    }
    let sign: u16 = if value.is_sign_negative() { 0x8000 } else { 0 };
    let abs = value.abs();
    if abs >= 65520.0 {
        return sign | 0x7C00;
    }
    if abs < 2f64.powi(-14) {
        // Subnormal range
        return sign | (abs / 2f64.powi(-24)).round() as u16;
    }
    let mut exponent = abs.log2().floor() as i32;
    let mut mantissa = ((abs / 2f64.powi(exponent) - 1.0) * 1024.0).round() as u16;
    if mantissa == 1024 {
        mantissa = 0;
        exponent += 1;
    }
    sign | (((exponent + 15) as u16) << 10) | mantissa
}
