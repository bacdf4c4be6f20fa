//! Zigbee Cluster Library frame codec
//!
//! This crate implements ZCL frame encoding and decoding along with the
//! cluster definitions the codec is driven by.

pub mod buffer;
pub mod cluster;
pub mod data_type;
pub mod foundation;
pub mod frame;
pub mod library;
pub mod registry;
pub mod types;
pub mod value;

pub use cluster::{Attribute, Cluster, Command, Condition, ParamType, Parameter, ResolvedAttribute};
pub use data_type::{DataType, DataTypeClass};
pub use foundation::GlobalCommand;
pub use frame::{Payload, ZclFrame, ZclHeader};
pub use registry::{ClusterKey, ClusterProvider, ClusterRegistry, CustomClusters};
pub use types::*;
pub use value::{
    AttributeKey, AttributeMap, Fields, SelectorIndicator, StructuredSelector, ZclValue,
};
