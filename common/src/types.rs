use std::fmt;

use serde::{Deserialize, Serialize};

use crate::setpoint::Setpoints;

/// User intent. Exactly one mode is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    Off,
    HeatCool,
    Cool,
    Heat,
    FanOnly,
    Dry,
}

impl Mode {
    pub const ALL: [Mode; 6] = [
        Self::Off,
        Self::HeatCool,
        Self::Cool,
        Self::Heat,
        Self::FanOnly,
        Self::Dry,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::HeatCool => "HEAT_COOL",
            Self::Cool => "COOL",
            Self::Heat => "HEAT",
            Self::FanOnly => "FAN_ONLY",
            Self::Dry => "DRY",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn parse(value: &str) -> Option<Self> {
        let upper = value.trim().to_ascii_uppercase();
        match upper.as_str() {
            "AUTO" => Some(Self::HeatCool),
            other => Self::ALL.into_iter().find(|mode| mode.as_str() == other),
        }
    }
}

/// What the equipment is currently doing. Derived by the engine, never set directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Off,
    Idle,
    Cooling,
    Heating,
    Fan,
    Drying,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Self::Off,
        Self::Idle,
        Self::Cooling,
        Self::Heating,
        Self::Fan,
        Self::Drying,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Idle => "IDLE",
            Self::Cooling => "COOLING",
            Self::Heating => "HEATING",
            Self::Fan => "FAN",
            Self::Drying => "DRYING",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Off and Idle only differ in their label; neither drives equipment.
    pub fn is_resting(self) -> bool {
        matches!(self, Self::Off | Self::Idle)
    }

    /// True when moving from `self` to `next` would cross the heat/cool boundary.
    pub fn conflicts_with(self, next: Action) -> bool {
        matches!(
            (self, next),
            (Self::Cooling | Self::Drying, Self::Heating)
                | (Self::Heating, Self::Cooling | Self::Drying)
        )
    }
}

/// Second equipment stage, tracked independently of [`Action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupplementalAction {
    Off,
    Idle,
    Cooling,
    Heating,
}

impl SupplementalAction {
    pub const ALL: [SupplementalAction; 4] =
        [Self::Off, Self::Idle, Self::Cooling, Self::Heating];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Idle => "IDLE",
            Self::Cooling => "COOLING",
            Self::Heating => "HEATING",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_resting(self) -> bool {
        matches!(self, Self::Off | Self::Idle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FanMode {
    On,
    Off,
    Auto,
    Low,
    Medium,
    High,
    Middle,
    Focus,
    Diffuse,
}

impl FanMode {
    pub const ALL: [FanMode; 9] = [
        Self::On,
        Self::Off,
        Self::Auto,
        Self::Low,
        Self::Medium,
        Self::High,
        Self::Middle,
        Self::Focus,
        Self::Diffuse,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
            Self::Auto => "AUTO",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Middle => "MIDDLE",
            Self::Focus => "FOCUS",
            Self::Diffuse => "DIFFUSE",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn parse(value: &str) -> Option<Self> {
        let upper = value.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|mode| mode.as_str() == upper)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwingMode {
    Both,
    Off,
    Horizontal,
    Vertical,
}

impl SwingMode {
    pub const ALL: [SwingMode; 4] = [Self::Both, Self::Off, Self::Horizontal, Self::Vertical];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Both => "BOTH",
            Self::Off => "OFF",
            Self::Horizontal => "HORIZONTAL",
            Self::Vertical => "VERTICAL",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn parse(value: &str) -> Option<Self> {
        let upper = value.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|mode| mode.as_str() == upper)
    }
}

/// Selects which stored setpoint set is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Preset {
    Home,
    Away,
}

impl Preset {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Home => "HOME",
            Self::Away => "AWAY",
        }
    }

    pub fn from_away(away: bool) -> Self {
        if away {
            Self::Away
        } else {
            Self::Home
        }
    }

    pub fn is_away(self) -> bool {
        self == Self::Away
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "HOME" => Some(Self::Home),
            "AWAY" => Some(Self::Away),
            _ => None,
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_as_str!(Mode, Action, SupplementalAction, FanMode, SwingMode, Preset);

/// Inbound request from the UI/automation layer. Only present fields are applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlRequest {
    #[serde(default)]
    pub preset: Option<Preset>,
    #[serde(default)]
    pub mode: Option<Mode>,
    #[serde(rename = "fanMode", default)]
    pub fan_mode: Option<FanMode>,
    #[serde(rename = "swingMode", default)]
    pub swing_mode: Option<SwingMode>,
    #[serde(rename = "targetTemperature", default)]
    pub target_temperature: Option<f32>,
    #[serde(rename = "targetTemperatureLow", default)]
    pub target_temperature_low: Option<f32>,
    #[serde(rename = "targetTemperatureHigh", default)]
    pub target_temperature_high: Option<f32>,
}

impl ControlRequest {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Outbound state snapshot, emitted whenever an observable field changes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClimateState {
    pub mode: Mode,
    pub action: Action,
    #[serde(rename = "supplementalAction")]
    pub supplemental_action: SupplementalAction,
    #[serde(rename = "fanMode")]
    pub fan_mode: FanMode,
    #[serde(rename = "swingMode")]
    pub swing_mode: SwingMode,
    pub preset: Preset,
    #[serde(rename = "targetTemperature")]
    pub target_temperature: Option<f32>,
    #[serde(rename = "targetTemperatureLow")]
    pub target_temperature_low: Option<f32>,
    #[serde(rename = "targetTemperatureHigh")]
    pub target_temperature_high: Option<f32>,
    #[serde(rename = "currentTemperature")]
    pub current_temperature: Option<f32>,
}

/// User-owned state that survives a reboot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub mode: Mode,
    #[serde(rename = "fanMode")]
    pub fan_mode: FanMode,
    #[serde(rename = "swingMode")]
    pub swing_mode: SwingMode,
    pub preset: Preset,
    pub setpoints: Setpoints,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimerStatus {
    pub name: &'static str,
    pub active: bool,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
    #[serde(rename = "remainingMs")]
    pub remaining_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    #[serde(flatten)]
    pub state: ClimateState,
    #[serde(rename = "sensorValid")]
    pub sensor_valid: bool,
    #[serde(rename = "setupComplete")]
    pub setup_complete: bool,
    #[serde(rename = "actionChangeDelayed")]
    pub action_change_delayed: bool,
    #[serde(rename = "delayedAction")]
    pub delayed_action: Action,
    #[serde(rename = "fanModeChangeDelayed")]
    pub fan_mode_change_delayed: bool,
    #[serde(rename = "lockedFanMode")]
    pub locked_fan_mode: Option<FanMode>,
    pub timers: Vec<TimerStatus>,
    #[serde(rename = "scheduleEnabled")]
    pub schedule_enabled: bool,
    #[serde(rename = "nextScheduleEventEpoch")]
    pub next_schedule_event_epoch: Option<i64>,
    #[serde(rename = "timeSynced")]
    pub time_synced: bool,
    pub timezone: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heat_cool_boundary_conflicts() {
        assert!(Action::Cooling.conflicts_with(Action::Heating));
        assert!(Action::Drying.conflicts_with(Action::Heating));
        assert!(Action::Heating.conflicts_with(Action::Drying));
        assert!(!Action::Idle.conflicts_with(Action::Heating));
        assert!(!Action::Cooling.conflicts_with(Action::Fan));
    }

    #[test]
    fn parses_mode_names_case_insensitively() {
        assert_eq!(Mode::parse("heat_cool"), Some(Mode::HeatCool));
        assert_eq!(Mode::parse("auto"), Some(Mode::HeatCool));
        assert_eq!(Mode::parse(" Fan_Only "), Some(Mode::FanOnly));
        assert_eq!(Mode::parse("turbo"), None);
        assert_eq!(FanMode::parse("diffuse"), Some(FanMode::Diffuse));
        assert_eq!(SwingMode::parse("vertical"), Some(SwingMode::Vertical));
        assert_eq!(Preset::parse("away"), Some(Preset::Away));
    }

    #[test]
    fn control_request_accepts_partial_json() {
        let request: ControlRequest =
            serde_json::from_str(r#"{"mode":"COOL","targetTemperatureLow":19.5}"#).unwrap();

        assert_eq!(request.mode, Some(Mode::Cool));
        assert_eq!(request.target_temperature_low, Some(19.5));
        assert_eq!(request.fan_mode, None);
        assert!(!request.is_empty());
        assert!(ControlRequest::default().is_empty());
    }
}
