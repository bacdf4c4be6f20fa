//! ZCL (Zigbee Cluster Library) definitions
//!
//! A [`Cluster`] describes the attributes, commands and command responses
//! of one cluster. Command parameters carry presence [`Condition`]s that are
//! evaluated against the fields preceding them, so the same table drives
//! both encoding and decoding.

use crate::data_type::{DataType, DataTypeClass};
use crate::types::ProtocolError;
use crate::value::{AttributeKey, Fields, ZclValue};

/// An attribute definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub id: u16,
    pub name: String,
    pub data_type: DataType,
    pub manufacturer_code: Option<u16>,
}

/// How a parameter's bytes are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// Fixed data type
    Data(DataType),
    /// Type taken from the preceding `dataType` field of the same record
    UseDataType,
    /// Structured selector
    Selector,
}

/// Presence condition of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    StatusEquals(u8),
    StatusNotEquals(u8),
    /// Compares against the preceding `direction` field
    DirectionEquals(u8),
    /// Compares the class of the preceding `dataType` field
    DataTypeClassEquals(DataTypeClass),
    /// Present only if at least this many bytes remain while decoding
    MinimumRemainingBytes(usize),
}

impl Condition {
    /// Evaluate against already processed fields
    ///
    /// `remaining` is the number of unread bytes when decoding and `None`
    /// when encoding.
    #[must_use]
    pub fn evaluate(&self, prior: &Fields, remaining: Option<usize>) -> bool {
        let field = |name: &str| prior.get(name).and_then(ZclValue::as_u64);
        match *self {
            Condition::StatusEquals(v) => field("status") == Some(u64::from(v)),
            Condition::StatusNotEquals(v) => field("status") != Some(u64::from(v)),
            Condition::DirectionEquals(v) => field("direction") == Some(u64::from(v)),
            Condition::DataTypeClassEquals(class) => field("dataType")
                .and_then(|raw| u8::try_from(raw).ok())
                .and_then(DataType::from_u8)
                .and_then(DataType::class)
                == Some(class),
            Condition::MinimumRemainingBytes(min) => remaining.map_or(true, |r| r >= min),
        }
    }
}

/// A command parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub kind: ParamType,
    pub conditions: Vec<Condition>,
}

impl Parameter {
    #[must_use]
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamType::Data(data_type),
            conditions: Vec::new(),
        }
    }

    /// Parameter whose type comes from the record's `dataType` field
    #[must_use]
    pub fn typed_by_record(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamType::UseDataType,
            conditions: Vec::new(),
        }
    }

    #[must_use]
    pub fn selector(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamType::Selector,
            conditions: Vec::new(),
        }
    }

    #[must_use]
    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Whether every condition holds
    #[must_use]
    pub fn is_present(&self, prior: &Fields, remaining: Option<usize>) -> bool {
        self.conditions.iter().all(|c| c.evaluate(prior, remaining))
    }

    /// Parameters gated on remaining length may be left out when encoding
    #[must_use]
    pub fn is_trailing_optional(&self) -> bool {
        self.conditions
            .iter()
            .any(|c| matches!(c, Condition::MinimumRemainingBytes(_)))
    }
}

/// A cluster-specific command or command response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub id: u8,
    pub name: String,
    pub parameters: Vec<Parameter>,
    /// Id of the matching command response, if the peer answers with one
    pub response: Option<u8>,
}

impl Command {
    #[must_use]
    pub fn new(id: u8, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            parameters: Vec::new(),
            response: None,
        }
    }

    #[must_use]
    pub fn param(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    #[must_use]
    pub fn response(mut self, id: u8) -> Self {
        self.response = Some(id);
        self
    }
}

/// A cluster definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub id: u16,
    pub name: String,
    pub manufacturer_code: Option<u16>,
    pub attributes: Vec<Attribute>,
    pub commands: Vec<Command>,
    pub command_responses: Vec<Command>,
}

impl Cluster {
    /// Create an empty cluster definition
    #[must_use]
    pub fn new(id: u16, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            manufacturer_code: None,
            attributes: Vec::new(),
            commands: Vec::new(),
            command_responses: Vec::new(),
        }
    }

    #[must_use]
    pub fn manufacturer(mut self, code: u16) -> Self {
        self.manufacturer_code = Some(code);
        self
    }

    #[must_use]
    pub fn attribute(self, name: &str, id: u16, data_type: DataType) -> Self {
        self.attribute_with(name, id, data_type, None)
    }

    /// Add a manufacturer-specific attribute
    #[must_use]
    pub fn manufacturer_attribute(
        self,
        name: &str,
        id: u16,
        data_type: DataType,
        manufacturer_code: u16,
    ) -> Self {
        self.attribute_with(name, id, data_type, Some(manufacturer_code))
    }

    fn attribute_with(
        mut self,
        name: &str,
        id: u16,
        data_type: DataType,
        manufacturer_code: Option<u16>,
    ) -> Self {
        self.attributes.push(Attribute {
            id,
            name: name.to_string(),
            data_type,
            manufacturer_code,
        });
        self
    }

    #[must_use]
    pub fn command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    #[must_use]
    pub fn command_response(mut self, command: Command) -> Self {
        self.command_responses.push(command);
        self
    }

    #[must_use]
    pub fn attribute_by_name(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Look up an attribute by numeric id
    ///
    /// Several attributes may share an id across manufacturers. The one
    /// matching `manufacturer_code` wins, then the one without a
    /// manufacturer code.
    #[must_use]
    pub fn attribute_by_id(&self, id: u16, manufacturer_code: Option<u16>) -> Option<&Attribute> {
        let mut fallback = None;
        for attribute in self.attributes.iter().filter(|a| a.id == id) {
            if manufacturer_code.is_some() && attribute.manufacturer_code == manufacturer_code {
                return Some(attribute);
            }
            if attribute.manufacturer_code.is_none() {
                fallback = Some(attribute);
            }
        }
        fallback
    }

    #[must_use]
    pub fn command_by_name(&self, name: &str) -> Option<&Command> {
        self.commands.iter().find(|c| c.name == name)
    }

    #[must_use]
    pub fn command_by_id(&self, id: u8) -> Option<&Command> {
        self.commands.iter().find(|c| c.id == id)
    }

    #[must_use]
    pub fn command_response_by_name(&self, name: &str) -> Option<&Command> {
        self.command_responses.iter().find(|c| c.name == name)
    }

    #[must_use]
    pub fn command_response_by_id(&self, id: u8) -> Option<&Command> {
        self.command_responses.iter().find(|c| c.id == id)
    }
}

/// An attribute reference resolved against a cluster definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAttribute {
    pub id: u16,
    /// `None` for numeric ids the definition does not know
    pub data_type: Option<DataType>,
}

impl Cluster {
    /// Resolve attribute references and the manufacturer code they share
    ///
    /// Attributes without a manufacturer code count as `fallback`. Every
    /// attribute must end up with the same code since a frame carries at
    /// most one.
    pub fn resolve_attributes<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a AttributeKey>,
        fallback: Option<u16>,
    ) -> Result<(Vec<ResolvedAttribute>, Option<u16>), ProtocolError> {
        let mut resolved = Vec::new();
        let mut codes: Vec<Option<u16>> = Vec::new();

        for key in keys {
            let (id, definition) = match key {
                AttributeKey::Name(name) => {
                    let attribute = self
                        .attribute_by_name(name)
                        .ok_or_else(|| ProtocolError::UnknownAttribute(name.clone()))?;
                    (attribute.id, Some(attribute))
                }
                AttributeKey::Id(id) | AttributeKey::Typed(id, _) => {
                    (*id, self.attribute_by_id(*id, fallback))
                }
            };
            let data_type = match key {
                AttributeKey::Typed(_, data_type) => Some(*data_type),
                _ => definition.map(|a| a.data_type),
            };
            let code = definition.and_then(|a| a.manufacturer_code).or(fallback);
            if !codes.contains(&code) {
                codes.push(code);
            }
            resolved.push(ResolvedAttribute { id, data_type });
        }

        match codes.as_slice() {
            [] => Ok((resolved, fallback)),
            [code] => Ok((resolved, *code)),
            _ => Err(ProtocolError::MixedManufacturerCode),
        }
    }
}
