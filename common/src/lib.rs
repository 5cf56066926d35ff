pub mod config;
pub mod engine;
pub mod hysteresis;
pub mod latch;
pub mod schedule;
pub mod setpoint;
pub mod timers;
pub mod topics;
pub mod triggers;
pub mod types;

pub use config::{
    Capabilities, ConfigError, HysteresisConfig, MqttConfig, PresetConfig, PresetTargets,
    RuntimeConfig, ThermostatConfig, TimerConfig,
};
pub use engine::ThermostatEngine;
pub use schedule::{DayOfWeek, Schedule, ScheduleAction, ScheduleEntry};
pub use setpoint::{SetpointLimits, Setpoints};
pub use timers::{TimerBank, TimerId};
pub use topics::*;
pub use triggers::{dispatch, Actuator, EngineEvent, Trigger, TriggerTable};
pub use types::{
    Action, ClimateState, ControlRequest, ControllerStatus, FanMode, Mode, PersistedState, Preset,
    SupplementalAction, SwingMode, TimerStatus,
};
