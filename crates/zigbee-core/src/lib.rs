//! Zigbee transaction layer
//!
//! This crate manages ZCL transactions with the devices of a Zigbee
//! network on top of the `zcl-protocol` codec: sequence numbers, per
//! endpoint request queues for sleepy devices, poll control checkins and
//! default responses.

pub mod adapter;
pub mod checkin;
pub mod config;
mod default_response;
pub mod device;
pub mod endpoint;
pub mod error;
pub mod logging;
pub mod network;
pub mod queue;
pub mod request;
pub mod sequence;

#[cfg(test)]
mod testing;

pub use adapter::{Adapter, AdapterEvent, Destination, ReceivedFrame, TransmitOptions};
pub use config::EngineConfig;
pub use device::{Endpoint, ZigbeeDevice};
pub use endpoint::{EndpointHandle, Options, ReportingConfig};
pub use error::{AdapterError, ZclError};
pub use network::{NetworkEvent, ZigbeeNetwork};
pub use request::SendPolicy;
pub use sequence::TransactionSequence;
