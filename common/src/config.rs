use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    setpoint::{SetpointLimits, Setpoints},
    types::{FanMode, Mode, Preset, SwingMode},
};

/// Timers configured below this many seconds are raised to it.
pub const MIN_TIMER_DURATION_S: u32 = 1;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{name} must be a finite temperature delta, got {value}")]
    InvalidHysteresis { name: &'static str, value: f32 },
    #[error("visual range is empty: min {min} >= max {max}")]
    EmptyVisualRange { min: f32, max: f32 },
    #[error("set point minimum differential {0} must be finite and >= 0")]
    InvalidDifferential(f32),
    #[error("visual range {min}..{max} cannot hold two set points {differential} apart")]
    DifferentialTooWide { min: f32, max: f32, differential: f32 },
    #[error("{preset} preset {field} {value} is outside the visual range {min}..{max}")]
    PresetOutOfRange {
        preset: Preset,
        field: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    #[error("no supported climate mode is configured")]
    NoSupportedMode,
    #[error(
        "heat/cool bands overlap: set point gap {gap} is smaller than {required}, \
         cooling and heating could both be demanded"
    )]
    OverlappingBands { gap: f32, required: f32 },
}

/// What the attached equipment can do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub heat_cool: bool,
    pub cool: bool,
    pub heat: bool,
    pub fan_only: bool,
    pub dry: bool,
    pub two_points: bool,
    /// Fan action and fan mode switching share the fan mode timer.
    pub fan_only_action_uses_fan_mode_timer: bool,
    /// Fan-only mode follows the cooling band instead of running unconditionally.
    pub fan_only_cooling: bool,
    pub fan_with_cooling: bool,
    pub fan_with_heating: bool,
    pub fan_modes: Vec<FanMode>,
    pub swing_modes: Vec<SwingMode>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            heat_cool: true,
            cool: true,
            heat: true,
            fan_only: false,
            dry: false,
            two_points: true,
            fan_only_action_uses_fan_mode_timer: false,
            fan_only_cooling: false,
            fan_with_cooling: false,
            fan_with_heating: false,
            fan_modes: vec![FanMode::Auto, FanMode::On],
            swing_modes: vec![SwingMode::Off],
        }
    }
}

impl Capabilities {
    pub fn supports_mode(&self, mode: Mode) -> bool {
        match mode {
            Mode::Off => true,
            Mode::HeatCool => self.heat_cool,
            Mode::Cool => self.cool,
            Mode::Heat => self.heat,
            Mode::FanOnly => self.fan_only,
            Mode::Dry => self.dry,
        }
    }

    pub fn supports_fan_mode(&self, fan_mode: FanMode) -> bool {
        self.fan_modes.contains(&fan_mode)
    }

    /// Auto when supported, otherwise the first configured fan mode.
    pub fn fallback_fan_mode(&self) -> FanMode {
        if self.supports_fan_mode(FanMode::Auto) {
            FanMode::Auto
        } else {
            self.fan_modes.first().copied().unwrap_or(FanMode::Auto)
        }
    }

    pub fn supports_swing_mode(&self, swing_mode: SwingMode) -> bool {
        self.swing_modes.contains(&swing_mode)
    }

    fn cooling_band_used(&self) -> bool {
        self.cool || (self.fan_only && self.fan_only_cooling)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HysteresisConfig {
    pub cooling_deadband: f32,
    pub cooling_overrun: f32,
    pub heating_deadband: f32,
    pub heating_overrun: f32,
    /// Error beyond the cooling set point that engages supplemental cooling.
    pub supplemental_cool_delta: Option<f32>,
    pub supplemental_heat_delta: Option<f32>,
}

impl Default for HysteresisConfig {
    fn default() -> Self {
        Self {
            cooling_deadband: 0.5,
            cooling_overrun: 0.5,
            heating_deadband: 0.5,
            heating_overrun: 0.5,
            supplemental_cool_delta: None,
            supplemental_heat_delta: None,
        }
    }
}

impl HysteresisConfig {
    pub fn cooling_valid(&self) -> bool {
        self.cooling_deadband.is_finite() && self.cooling_overrun.is_finite()
    }

    pub fn heating_valid(&self) -> bool {
        self.heating_deadband.is_finite() && self.heating_overrun.is_finite()
    }
}

/// Timer durations in seconds. `None` disables the timer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TimerConfig {
    pub cooling_max_run_time_s: Option<u32>,
    pub cooling_minimum_off_time_s: Option<u32>,
    pub cooling_minimum_run_time_s: Option<u32>,
    pub fan_mode_minimum_switching_time_s: Option<u32>,
    pub fanning_minimum_off_time_s: Option<u32>,
    pub fanning_minimum_run_time_s: Option<u32>,
    pub heating_max_run_time_s: Option<u32>,
    pub heating_minimum_off_time_s: Option<u32>,
    pub heating_minimum_run_time_s: Option<u32>,
    pub idle_minimum_time_s: Option<u32>,
}

impl TimerConfig {
    /// Conservative compressor protection, no max run time.
    pub fn protective() -> Self {
        Self {
            cooling_max_run_time_s: None,
            cooling_minimum_off_time_s: Some(300),
            cooling_minimum_run_time_s: Some(300),
            fan_mode_minimum_switching_time_s: Some(15),
            fanning_minimum_off_time_s: Some(30),
            fanning_minimum_run_time_s: Some(30),
            heating_max_run_time_s: None,
            heating_minimum_off_time_s: Some(300),
            heating_minimum_run_time_s: Some(300),
            idle_minimum_time_s: Some(30),
        }
    }

    fn slots_mut(&mut self) -> [&mut Option<u32>; 10] {
        [
            &mut self.cooling_max_run_time_s,
            &mut self.cooling_minimum_off_time_s,
            &mut self.cooling_minimum_run_time_s,
            &mut self.fan_mode_minimum_switching_time_s,
            &mut self.fanning_minimum_off_time_s,
            &mut self.fanning_minimum_run_time_s,
            &mut self.heating_max_run_time_s,
            &mut self.heating_minimum_off_time_s,
            &mut self.heating_minimum_run_time_s,
            &mut self.idle_minimum_time_s,
        ]
    }

    pub fn sanitize(&mut self) {
        for slot in self.slots_mut() {
            if let Some(seconds) = slot {
                *seconds = (*seconds).max(MIN_TIMER_DURATION_S);
            }
        }
    }
}

/// Default setpoint(s) owned by one preset.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PresetTargets {
    #[serde(default)]
    pub target: Option<f32>,
    #[serde(default)]
    pub low: Option<f32>,
    #[serde(default)]
    pub high: Option<f32>,
}

impl PresetTargets {
    pub fn setpoints(&self, two_points: bool) -> Setpoints {
        if two_points {
            Setpoints::Range {
                low: self.low,
                high: self.high,
            }
        } else {
            Setpoints::Single {
                target: self.target,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PresetConfig {
    pub home: PresetTargets,
    pub away: PresetTargets,
}

impl Default for PresetConfig {
    fn default() -> Self {
        Self {
            home: PresetTargets {
                target: Some(21.0),
                low: Some(20.0),
                high: Some(24.0),
            },
            away: PresetTargets {
                target: Some(17.0),
                low: Some(16.0),
                high: Some(28.0),
            },
        }
    }
}

impl PresetConfig {
    pub fn targets(&self, preset: Preset) -> &PresetTargets {
        match preset {
            Preset::Home => &self.home,
            Preset::Away => &self.away,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermostatConfig {
    pub capabilities: Capabilities,
    pub hysteresis: HysteresisConfig,
    pub timers: TimerConfig,
    /// Arm the off timers at boot so nothing actuates right after a reset.
    pub startup_delay: bool,
    pub visual_min_temperature: f32,
    pub visual_max_temperature: f32,
    pub visual_temperature_step: f32,
    pub set_point_minimum_differential: f32,
    pub presets: PresetConfig,
    pub default_mode: Mode,
    pub default_preset: Preset,
    pub sensor_stale_timeout_s: Option<u32>,
}

impl Default for ThermostatConfig {
    fn default() -> Self {
        Self {
            capabilities: Capabilities::default(),
            hysteresis: HysteresisConfig::default(),
            timers: TimerConfig::protective(),
            startup_delay: true,
            visual_min_temperature: 10.0,
            visual_max_temperature: 30.0,
            visual_temperature_step: 0.5,
            set_point_minimum_differential: 0.5,
            presets: PresetConfig::default(),
            default_mode: Mode::HeatCool,
            default_preset: Preset::Home,
            sensor_stale_timeout_s: Some(300),
        }
    }
}

impl ThermostatConfig {
    pub fn setpoint_limits(&self) -> SetpointLimits {
        SetpointLimits {
            visual_min: self.visual_min_temperature,
            visual_max: self.visual_max_temperature,
            minimum_differential: if self.capabilities.two_points {
                self.set_point_minimum_differential
            } else {
                0.0
            },
        }
    }

    /// Restores the default visual range and differential when they cannot
    /// bound a set point. Returns true when something was replaced.
    pub fn repair_setpoint_limits(&mut self) -> bool {
        let min = self.visual_min_temperature;
        let max = self.visual_max_temperature;
        let differential = self.set_point_minimum_differential;
        let usable = min.is_finite()
            && max.is_finite()
            && min < max
            && differential.is_finite()
            && differential >= 0.0
            && (!self.capabilities.two_points || max - min >= differential);
        if usable {
            return false;
        }

        let defaults = Self::default();
        self.visual_min_temperature = defaults.visual_min_temperature;
        self.visual_max_temperature = defaults.visual_max_temperature;
        self.set_point_minimum_differential = defaults.set_point_minimum_differential;
        true
    }

    /// Hysteresis needed by `mode` is usable.
    pub fn hysteresis_valid_for(&self, mode: Mode) -> bool {
        let caps = &self.capabilities;
        let cooling = !caps.cool || self.hysteresis.cooling_valid();
        let heating = !caps.heat || self.hysteresis.heating_valid();
        match mode {
            Mode::Off | Mode::Dry => true,
            Mode::Cool => cooling,
            Mode::Heat => heating,
            Mode::HeatCool => cooling && heating,
            Mode::FanOnly => !caps.fan_only_cooling || self.hysteresis.cooling_valid(),
        }
    }

    pub fn sanitize(&mut self) {
        self.timers.sanitize();
        if self.visual_temperature_step <= 0.0 || !self.visual_temperature_step.is_finite() {
            self.visual_temperature_step = 0.5;
        }
        if self.set_point_minimum_differential.is_finite() {
            self.set_point_minimum_differential = self.set_point_minimum_differential.max(0.0);
        }
        self.sensor_stale_timeout_s = self
            .sensor_stale_timeout_s
            .map(|seconds| seconds.max(MIN_TIMER_DURATION_S));
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let caps = &self.capabilities;
        let hysteresis = &self.hysteresis;

        if !Mode::ALL
            .into_iter()
            .any(|mode| mode != Mode::Off && caps.supports_mode(mode))
        {
            return Err(ConfigError::NoSupportedMode);
        }

        let mut checks: Vec<(&'static str, f32)> = Vec::new();
        if caps.cooling_band_used() {
            checks.push(("cooling_deadband", hysteresis.cooling_deadband));
            checks.push(("cooling_overrun", hysteresis.cooling_overrun));
        }
        if caps.heat {
            checks.push(("heating_deadband", hysteresis.heating_deadband));
            checks.push(("heating_overrun", hysteresis.heating_overrun));
        }
        for (name, value) in checks {
            if !value.is_finite() {
                return Err(ConfigError::InvalidHysteresis { name, value });
            }
        }

        let min = self.visual_min_temperature;
        let max = self.visual_max_temperature;
        if !(min.is_finite() && max.is_finite()) || min >= max {
            return Err(ConfigError::EmptyVisualRange { min, max });
        }

        let differential = self.set_point_minimum_differential;
        if !differential.is_finite() || differential < 0.0 {
            return Err(ConfigError::InvalidDifferential(differential));
        }
        if caps.two_points && max - min < differential {
            return Err(ConfigError::DifferentialTooWide {
                min,
                max,
                differential,
            });
        }

        let limits = self.setpoint_limits();
        for preset in [Preset::Home, Preset::Away] {
            let targets = self.presets.targets(preset);
            let fields = [
                ("target", targets.target),
                ("low", targets.low),
                ("high", targets.high),
            ];
            for (field, value) in fields {
                if let Some(value) = value.filter(|v| !v.is_nan()) {
                    if !limits.contains(value) {
                        return Err(ConfigError::PresetOutOfRange {
                            preset,
                            field,
                            value,
                            min,
                            max,
                        });
                    }
                }
            }
        }

        if caps.heat_cool && caps.cool && caps.heat {
            let gap = if caps.two_points { differential } else { 0.0 };
            let required = (hysteresis.cooling_overrun - hysteresis.heating_deadband)
                .max(hysteresis.heating_overrun - hysteresis.cooling_deadband);
            if gap < required {
                return Err(ConfigError::OverlappingBands { gap, required });
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            user: String::new(),
            pass: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub thermostat: ThermostatConfig,
    pub timezone: String,
    pub mqtt: MqttConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            thermostat: ThermostatConfig::default(),
            timezone: "America/Los_Angeles".to_string(),
            mqtt: MqttConfig::default(),
        }
    }
}
