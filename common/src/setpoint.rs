use serde::{Deserialize, Serialize};

/// Visual range and spacing rules applied to every setpoint write.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetpointLimits {
    pub visual_min: f32,
    pub visual_max: f32,
    pub minimum_differential: f32,
}

impl SetpointLimits {
    pub fn midpoint(&self) -> f32 {
        (self.visual_max - self.visual_min) / 2.0 + self.visual_min
    }

    pub fn contains(&self, value: f32) -> bool {
        (self.visual_min..=self.visual_max).contains(&value)
    }
}

/// Live setpoint(s). `None` (or NaN) means "no value yet" and is replaced by validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Setpoints {
    Single {
        #[serde(rename = "targetTemperature")]
        target: Option<f32>,
    },
    Range {
        #[serde(rename = "targetTemperatureLow")]
        low: Option<f32>,
        #[serde(rename = "targetTemperatureHigh")]
        high: Option<f32>,
    },
}

fn present(value: Option<f32>) -> Option<f32> {
    value.filter(|v| !v.is_nan())
}

impl Setpoints {
    pub fn is_two_point(&self) -> bool {
        matches!(self, Self::Range { .. })
    }

    pub fn target(&self) -> Option<f32> {
        match *self {
            Self::Single { target } => present(target),
            Self::Range { .. } => None,
        }
    }

    pub fn low(&self) -> Option<f32> {
        match *self {
            Self::Range { low, .. } => present(low),
            Self::Single { .. } => None,
        }
    }

    pub fn high(&self) -> Option<f32> {
        match *self {
            Self::Range { high, .. } => present(high),
            Self::Single { .. } => None,
        }
    }

    /// Setpoint the cooling and fanning bands are measured against.
    pub fn cooling_target(&self) -> Option<f32> {
        match self {
            Self::Single { .. } => self.target(),
            Self::Range { .. } => self.high(),
        }
    }

    /// Setpoint the heating band is measured against.
    pub fn heating_target(&self) -> Option<f32> {
        match self {
            Self::Single { .. } => self.target(),
            Self::Range { .. } => self.low(),
        }
    }

    pub fn set_target(&mut self, value: f32) {
        if let Self::Single { target } = self {
            *target = Some(value);
        }
    }

    pub fn set_low(&mut self, value: f32) {
        if let Self::Range { low, .. } = self {
            *low = Some(value);
        }
    }

    pub fn set_high(&mut self, value: f32) {
        if let Self::Range { high, .. } = self {
            *high = Some(value);
        }
    }

    pub fn validate(&mut self, limits: &SetpointLimits) {
        match self {
            Self::Single { .. } => self.validate_target_temperature(limits),
            Self::Range { .. } => {
                self.validate_target_temperature_low(limits);
                self.validate_target_temperature_high(limits);
            }
        }
    }

    /// Missing target falls back to the middle of the visual range, anything else is clamped.
    pub fn validate_target_temperature(&mut self, limits: &SetpointLimits) {
        let Self::Single { target } = self else {
            return;
        };
        *target = Some(match present(*target) {
            Some(value) => value.max(limits.visual_min).min(limits.visual_max),
            None => limits.midpoint(),
        });
    }

    /// Clamps the low setpoint and pushes the high one up when they get too close.
    pub fn validate_target_temperature_low(&mut self, limits: &SetpointLimits) {
        let Self::Range { low, high } = self else {
            return;
        };
        let Some(mut value) = present(*low) else {
            *low = Some(limits.visual_min);
            return;
        };

        value = value.max(limits.visual_min);
        value = value.min(limits.visual_max - limits.minimum_differential);
        *low = Some(value);

        if let Some(upper) = present(*high) {
            if value > upper - limits.minimum_differential {
                *high = Some(value + limits.minimum_differential);
            }
        }
    }

    /// Clamps the high setpoint and pushes the low one down when they get too close.
    pub fn validate_target_temperature_high(&mut self, limits: &SetpointLimits) {
        let Self::Range { low, high } = self else {
            return;
        };
        let Some(mut value) = present(*high) else {
            *high = Some(limits.visual_max);
            return;
        };

        value = value.min(limits.visual_max);
        value = value.max(limits.visual_min + limits.minimum_differential);
        *high = Some(value);

        if let Some(lower) = present(*low) {
            if value < lower + limits.minimum_differential {
                *low = Some(value - limits.minimum_differential);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const LIMITS: SetpointLimits = SetpointLimits {
        visual_min: 10.0,
        visual_max: 30.0,
        minimum_differential: 2.0,
    };

    fn range(low: f32, high: f32) -> Setpoints {
        Setpoints::Range {
            low: Some(low),
            high: Some(high),
        }
    }

    #[test]
    fn missing_single_target_defaults_to_midpoint() {
        let mut setpoints = Setpoints::Single {
            target: Some(f32::NAN),
        };
        setpoints.validate(&LIMITS);
        assert_eq!(setpoints.target(), Some(20.0));

        let mut setpoints = Setpoints::Single { target: None };
        setpoints.validate(&LIMITS);
        assert_eq!(setpoints.target(), Some(20.0));
    }

    #[test]
    fn single_target_is_clamped_to_visual_range() {
        let mut setpoints = Setpoints::Single { target: Some(42.0) };
        setpoints.validate_target_temperature(&LIMITS);
        assert_eq!(setpoints.target(), Some(30.0));

        setpoints.set_target(-5.0);
        setpoints.validate_target_temperature(&LIMITS);
        assert_eq!(setpoints.target(), Some(10.0));
    }

    #[test]
    fn missing_range_bounds_default_to_visual_bounds() {
        let mut setpoints = Setpoints::Range {
            low: None,
            high: None,
        };
        setpoints.validate(&LIMITS);
        assert_eq!(setpoints, range(10.0, 30.0));
    }

    #[test]
    fn raising_low_pushes_high() {
        let mut setpoints = range(18.0, 24.0);
        setpoints.set_low(25.0);
        setpoints.validate_target_temperature_low(&LIMITS);
        assert_eq!(setpoints, range(25.0, 27.0));
    }

    #[test]
    fn lowering_high_pushes_low() {
        let mut setpoints = range(18.0, 24.0);
        setpoints.set_high(17.0);
        setpoints.validate_target_temperature_high(&LIMITS);
        assert_eq!(setpoints, range(15.0, 17.0));
    }

    #[test]
    fn low_cannot_leave_room_for_high_above_visual_max() {
        let mut setpoints = range(18.0, 24.0);
        setpoints.set_low(35.0);
        setpoints.validate_target_temperature_low(&LIMITS);
        assert_eq!(setpoints, range(28.0, 30.0));
    }

    #[test]
    fn validated_range_always_respects_differential() {
        let inputs = [
            (25.0, 12.0),
            (-100.0, 100.0),
            (29.5, 10.0),
            (10.0, 10.5),
            (20.0, 20.0),
            (f32::NAN, 11.0),
            (29.0, f32::NAN),
        ];

        for (low, high) in inputs {
            let mut setpoints = range(20.0, 24.0);
            setpoints.set_low(low);
            setpoints.validate_target_temperature_low(&LIMITS);
            setpoints.set_high(high);
            setpoints.validate_target_temperature_high(&LIMITS);

            let (Some(low_out), Some(high_out)) = (setpoints.low(), setpoints.high()) else {
                panic!("setpoints missing after validation for ({low}, {high})");
            };
            assert!(
                low_out + LIMITS.minimum_differential <= high_out,
                "({low}, {high}) produced ({low_out}, {high_out})"
            );
            assert!(LIMITS.contains(low_out) && LIMITS.contains(high_out));
        }
    }

    #[test]
    fn inverted_limits_do_not_panic() {
        let inverted = SetpointLimits {
            visual_min: 30.0,
            visual_max: 10.0,
            minimum_differential: 0.0,
        };
        let mut setpoints = Setpoints::Single { target: Some(21.0) };
        setpoints.validate(&inverted);
        assert_eq!(setpoints.target(), Some(10.0));

        let nan_bounds = SetpointLimits {
            visual_min: f32::NAN,
            visual_max: f32::NAN,
            minimum_differential: 0.0,
        };
        setpoints.set_target(21.0);
        setpoints.validate(&nan_bounds);
        assert_eq!(setpoints.target(), Some(21.0));
    }

    #[test]
    fn persists_as_tagged_json() {
        let json = serde_json::to_string(&range(19.0, 23.5)).unwrap();
        assert_eq!(
            json,
            r#"{"kind":"range","targetTemperatureLow":19.0,"targetTemperatureHigh":23.5}"#
        );
    }
}
