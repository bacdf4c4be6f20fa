//! Built-in cluster library

use crate::cluster::{Cluster, Command, Condition, Parameter};
use crate::data_type::DataType;
use crate::types::manufacturer;
use std::sync::{Arc, OnceLock};

/// Common ZCL cluster IDs
pub mod id {
    // General Clusters
    pub const BASIC: u16 = 0x0000;
    pub const IDENTIFY: u16 = 0x0003;
    pub const GROUPS: u16 = 0x0004;
    pub const SCENES: u16 = 0x0005;
    pub const ON_OFF: u16 = 0x0006;
    pub const LEVEL_CONTROL: u16 = 0x0008;
    pub const POLL_CONTROL: u16 = 0x0020;

    // HVAC Clusters
    pub const THERMOSTAT: u16 = 0x0201;

    // Measurement Clusters
    pub const TEMPERATURE_MEASUREMENT: u16 = 0x0402;
}

/// Poll Control cluster command ids
pub mod poll_control {
    /// Server to client
    pub const CHECKIN: u8 = 0x00;
    pub const CHECKIN_RSP: u8 = 0x00;
    pub const FAST_POLL_STOP: u8 = 0x01;
    pub const SET_LONG_POLL_INTERVAL: u8 = 0x02;
    pub const SET_SHORT_POLL_INTERVAL: u8 = 0x03;
}

/// All built-in cluster definitions
#[must_use]
pub fn clusters() -> &'static [Arc<Cluster>] {
    static LIBRARY: OnceLock<Vec<Arc<Cluster>>> = OnceLock::new();
    LIBRARY.get_or_init(|| {
        vec![
            basic(),
            identify(),
            groups(),
            scenes(),
            on_off(),
            level_control(),
            poll_control(),
            thermostat(),
            temperature_measurement(),
        ]
        .into_iter()
        .map(Arc::new)
        .collect()
    })
}

fn param(name: &str, data_type: DataType) -> Parameter {
    Parameter::new(name, data_type)
}

fn basic() -> Cluster {
    Cluster::new(id::BASIC, "genBasic")
        .attribute("zclVersion", 0x0000, DataType::Uint8)
        .attribute("appVersion", 0x0001, DataType::Uint8)
        .attribute("stackVersion", 0x0002, DataType::Uint8)
        .attribute("hwVersion", 0x0003, DataType::Uint8)
        .attribute("manufacturerName", 0x0004, DataType::CharString)
        .attribute("modelId", 0x0005, DataType::CharString)
        .attribute("dateCode", 0x0006, DataType::CharString)
        .attribute("powerSource", 0x0007, DataType::Enum8)
        .attribute("swBuildId", 0x4000, DataType::CharString)
        .command(Command::new(0x00, "resetFactDefault"))
}

fn identify() -> Cluster {
    Cluster::new(id::IDENTIFY, "genIdentify")
        .attribute("identifyTime", 0x0000, DataType::Uint16)
        .command(Command::new(0x00, "identify").param(param("identifytime", DataType::Uint16)))
        .command(Command::new(0x01, "identifyQuery").response(0x00))
        .command_response(
            Command::new(0x00, "identifyQueryRsp").param(param("timeout", DataType::Uint16)),
        )
}

fn groups() -> Cluster {
    let status = || param("status", DataType::Uint8);
    let group_id = || param("groupid", DataType::Uint16);
    Cluster::new(id::GROUPS, "genGroups")
        .attribute("nameSupport", 0x0000, DataType::Bitmap8)
        .command(
            Command::new(0x00, "add")
                .param(group_id())
                .param(param("groupname", DataType::CharString))
                .response(0x00),
        )
        .command(Command::new(0x01, "view").param(group_id()).response(0x01))
        .command(Command::new(0x03, "remove").param(group_id()).response(0x03))
        .command(Command::new(0x04, "removeAll"))
        .command_response(Command::new(0x00, "addRsp").param(status()).param(group_id()))
        .command_response(
            Command::new(0x01, "viewRsp")
                .param(status())
                .param(group_id())
                .param(param("groupname", DataType::CharString)),
        )
        .command_response(Command::new(0x03, "removeRsp").param(status()).param(group_id()))
}

fn scenes() -> Cluster {
    let status = || param("status", DataType::Uint8);
    let group_id = || param("groupid", DataType::Uint16);
    let scene_id = || param("sceneid", DataType::Uint8);
    let on_success = Condition::StatusEquals(0x00);
    Cluster::new(id::SCENES, "genScenes")
        .attribute("count", 0x0000, DataType::Uint8)
        .attribute("currentScene", 0x0001, DataType::Uint8)
        .attribute("currentGroup", 0x0002, DataType::Uint16)
        .attribute("sceneValid", 0x0003, DataType::Boolean)
        .command(
            Command::new(0x01, "view")
                .param(group_id())
                .param(scene_id())
                .response(0x01),
        )
        .command(
            Command::new(0x04, "store")
                .param(group_id())
                .param(scene_id())
                .response(0x04),
        )
        .command(Command::new(0x05, "recall").param(group_id()).param(scene_id()))
        .command_response(
            Command::new(0x01, "viewRsp")
                .param(status())
                .param(group_id())
                .param(scene_id())
                .param(param("transtime", DataType::Uint16).when(on_success))
                .param(param("scenename", DataType::CharString).when(on_success)),
        )
        .command_response(
            Command::new(0x04, "storeRsp")
                .param(status())
                .param(group_id())
                .param(scene_id()),
        )
}

fn on_off() -> Cluster {
    Cluster::new(id::ON_OFF, "genOnOff")
        .attribute("onOff", 0x0000, DataType::Boolean)
        .attribute("globalSceneCtrl", 0x4000, DataType::Boolean)
        .attribute("onTime", 0x4001, DataType::Uint16)
        .attribute("offWaitTime", 0x4002, DataType::Uint16)
        .attribute("startUpOnOff", 0x4003, DataType::Enum8)
        .manufacturer_attribute("elkoPreWarningTime", 0xE000, DataType::Uint16, manufacturer::ADEO)
        .command(Command::new(0x00, "off"))
        .command(Command::new(0x01, "on"))
        .command(Command::new(0x02, "toggle"))
        .command(
            Command::new(0x40, "offWithEffect")
                .param(param("effectid", DataType::Uint8))
                .param(param("effectvariant", DataType::Uint8)),
        )
        .command(
            Command::new(0x42, "onWithTimedOff")
                .param(param("ctrlbits", DataType::Uint8))
                .param(param("ontime", DataType::Uint16))
                .param(param("offwaittime", DataType::Uint16)),
        )
}

fn level_control() -> Cluster {
    let level = || param("level", DataType::Uint8);
    let transtime = || param("transtime", DataType::Uint16);
    Cluster::new(id::LEVEL_CONTROL, "genLevelCtrl")
        .attribute("currentLevel", 0x0000, DataType::Uint8)
        .attribute("onOffTransitionTime", 0x0010, DataType::Uint16)
        .attribute("onLevel", 0x0011, DataType::Uint8)
        .command(Command::new(0x00, "moveToLevel").param(level()).param(transtime()))
        .command(
            Command::new(0x01, "move")
                .param(param("movemode", DataType::Uint8))
                .param(param("rate", DataType::Uint8)),
        )
        .command(
            Command::new(0x02, "step")
                .param(param("stepmode", DataType::Uint8))
                .param(param("stepsize", DataType::Uint8))
                .param(transtime()),
        )
        .command(Command::new(0x03, "stop"))
        .command(
            Command::new(0x04, "moveToLevelWithOnOff")
                .param(level())
                .param(transtime()),
        )
}

fn poll_control() -> Cluster {
    Cluster::new(id::POLL_CONTROL, "genPollCtrl")
        .attribute("checkinInterval", 0x0000, DataType::Uint32)
        .attribute("longPollInterval", 0x0001, DataType::Uint32)
        .attribute("shortPollInterval", 0x0002, DataType::Uint16)
        .attribute("fastPollTimeout", 0x0003, DataType::Uint16)
        .attribute("checkinIntervalMin", 0x0004, DataType::Uint32)
        .attribute("longPollIntervalMin", 0x0005, DataType::Uint32)
        .attribute("fastPollTimeoutMax", 0x0006, DataType::Uint16)
        .command(
            Command::new(poll_control::CHECKIN_RSP, "checkinRsp")
                .param(param("startFastPolling", DataType::Boolean))
                .param(param("fastPollTimeout", DataType::Uint16)),
        )
        .command(Command::new(poll_control::FAST_POLL_STOP, "fastPollStop"))
        .command(
            Command::new(poll_control::SET_LONG_POLL_INTERVAL, "setLongPollInterval")
                .param(param("newLongPollInterval", DataType::Uint32)),
        )
        .command(
            Command::new(poll_control::SET_SHORT_POLL_INTERVAL, "setShortPollInterval")
                .param(param("newShortPollInterval", DataType::Uint16)),
        )
        .command_response(Command::new(poll_control::CHECKIN, "checkin"))
}

fn thermostat() -> Cluster {
    Cluster::new(id::THERMOSTAT, "hvacThermostat")
        .attribute("localTemp", 0x0000, DataType::Int16)
        .attribute("outdoorTemp", 0x0001, DataType::Int16)
        .attribute("occupiedCoolingSetpoint", 0x0011, DataType::Int16)
        .attribute("occupiedHeatingSetpoint", 0x0012, DataType::Int16)
        .attribute("controlSequenceOfOperation", 0x001B, DataType::Enum8)
        .attribute("systemMode", 0x001C, DataType::Enum8)
        .manufacturer_attribute(
            "viessmannWindowOpenInternal",
            0x4000,
            DataType::Enum8,
            manufacturer::VIESSMANN,
        )
        .manufacturer_attribute(
            "danfossWindowOpenInternal",
            0x4000,
            DataType::Enum8,
            manufacturer::DANFOSS,
        )
        .command(
            Command::new(0x00, "setpointRaiseLower")
                .param(param("mode", DataType::Uint8))
                .param(param("amount", DataType::Int8)),
        )
}

fn temperature_measurement() -> Cluster {
    Cluster::new(id::TEMPERATURE_MEASUREMENT, "msTemperatureMeasurement")
        .attribute("measuredValue", 0x0000, DataType::Int16)
        .attribute("minMeasuredValue", 0x0001, DataType::Int16)
        .attribute("maxMeasuredValue", 0x0002, DataType::Int16)
        .attribute("tolerance", 0x0003, DataType::Uint16)
}
