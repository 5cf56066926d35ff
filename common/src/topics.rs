pub const TOPIC_SENSOR_TEMP: &str = "thermostat/sensor/temperature";
pub const TOPIC_SENSOR_STATUS: &str = "thermostat/sensor/status";

pub const TOPIC_CONTROLLER_STATE: &str = "thermostat/controller/state";
pub const TOPIC_CONTROLLER_STATUS: &str = "thermostat/controller/status";
pub const TOPIC_CONTROLLER_SCHEDULE_STATE: &str = "thermostat/controller/schedule/state";
/// Prefix for notification ports, followed by the port name.
pub const TOPIC_TRIGGER_PREFIX: &str = "thermostat/controller/trigger";

pub const TOPIC_CMD_CONTROL: &str = "thermostat/cmnd/thermostat/control";
pub const TOPIC_CMD_MODE: &str = "thermostat/cmnd/thermostat/mode";
pub const TOPIC_CMD_FAN_MODE: &str = "thermostat/cmnd/thermostat/fan_mode";
pub const TOPIC_CMD_SWING_MODE: &str = "thermostat/cmnd/thermostat/swing_mode";
pub const TOPIC_CMD_PRESET: &str = "thermostat/cmnd/thermostat/preset";
pub const TOPIC_CMD_TARGET: &str = "thermostat/cmnd/thermostat/target";
pub const TOPIC_CMD_TARGET_LOW: &str = "thermostat/cmnd/thermostat/target_low";
pub const TOPIC_CMD_TARGET_HIGH: &str = "thermostat/cmnd/thermostat/target_high";
pub const TOPIC_CMD_SCHEDULE: &str = "thermostat/cmnd/thermostat/schedule";

pub const PAYLOAD_TRIGGER_FIRE: &str = "ON";
pub const PAYLOAD_TRIGGER_STOP: &str = "OFF";

pub fn trigger_topic(port: &str) -> String {
    format!("{TOPIC_TRIGGER_PREFIX}/{port}")
}
