//! Pure demand evaluation. Nothing here looks at timers or mutates state.

use crate::{
    config::ThermostatConfig,
    setpoint::Setpoints,
    types::{Action, Mode, SupplementalAction},
};

/// Comparator with hysteresis for "too warm" demand.
///
/// Engages strictly above `target + deadband`, releases strictly below
/// `target - overrun`, and keeps `engaged` anywhere in between.
pub fn above_band(current: f32, target: f32, deadband: f32, overrun: f32, engaged: bool) -> bool {
    if current > target + deadband {
        true
    } else if current < target - overrun {
        false
    } else {
        engaged
    }
}

/// Mirror of [`above_band`] for "too cold" demand.
pub fn below_band(current: f32, target: f32, deadband: f32, overrun: f32, engaged: bool) -> bool {
    if current < target - deadband {
        true
    } else if current > target + overrun {
        false
    } else {
        engaged
    }
}

/// Snapshot of everything the evaluator reads.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    pub config: &'a ThermostatConfig,
    pub mode: Mode,
    pub action: Action,
    pub supplemental_action: SupplementalAction,
    pub current: Option<f32>,
    pub setpoints: &'a Setpoints,
}

impl Evaluator<'_> {
    fn reading(&self) -> Option<f32> {
        self.current.filter(|value| value.is_finite())
    }

    /// Reading and hysteresis are both usable for the active mode.
    pub fn inputs_valid(&self) -> bool {
        self.reading().is_some() && self.config.hysteresis_valid_for(self.mode)
    }

    fn cooling_band(&self, engaged: bool) -> bool {
        let (Some(current), Some(target)) = (self.reading(), self.setpoints.cooling_target())
        else {
            return false;
        };
        let hysteresis = &self.config.hysteresis;
        above_band(
            current,
            target,
            hysteresis.cooling_deadband,
            hysteresis.cooling_overrun,
            engaged,
        )
    }

    fn heating_band(&self, engaged: bool) -> bool {
        let (Some(current), Some(target)) = (self.reading(), self.setpoints.heating_target())
        else {
            return false;
        };
        let hysteresis = &self.config.hysteresis;
        below_band(
            current,
            target,
            hysteresis.heating_deadband,
            hysteresis.heating_overrun,
            engaged,
        )
    }

    pub fn cooling_required(&self) -> bool {
        if !self.config.capabilities.cool {
            return false;
        }
        let engaged =
            self.action == Action::Cooling && matches!(self.mode, Mode::HeatCool | Mode::Cool);
        self.cooling_band(engaged)
    }

    pub fn heating_required(&self) -> bool {
        if !self.config.capabilities.heat {
            return false;
        }
        let engaged =
            self.action == Action::Heating && matches!(self.mode, Mode::HeatCool | Mode::Heat);
        self.heating_band(engaged)
    }

    pub fn fanning_required(&self) -> bool {
        let caps = &self.config.capabilities;
        if !caps.fan_only {
            return false;
        }
        if caps.fan_only_cooling {
            let engaged = self.action == Action::Fan && self.mode == Mode::FanOnly;
            self.cooling_band(engaged)
        } else {
            true
        }
    }

    /// Desired action for the current inputs, before any timer gating.
    pub fn action(&self) -> Action {
        if !self.inputs_valid() {
            return Action::Off;
        }

        let proposed = match self.mode {
            Mode::Off => Action::Off,
            Mode::FanOnly => {
                if self.fanning_required() {
                    Action::Fan
                } else {
                    Action::Idle
                }
            }
            Mode::Dry => Action::Drying,
            Mode::HeatCool => match (self.cooling_required(), self.heating_required()) {
                (true, true) => {
                    tracing::warn!("cooling and heating both required; keeping {}", self.action);
                    self.action
                }
                (true, false) => Action::Cooling,
                (false, true) => Action::Heating,
                (false, false) => Action::Idle,
            },
            Mode::Cool => {
                if self.cooling_required() {
                    Action::Cooling
                } else {
                    Action::Idle
                }
            }
            Mode::Heat => {
                if self.heating_required() {
                    Action::Heating
                } else {
                    Action::Idle
                }
            }
        };

        if self.action.conflicts_with(proposed) {
            Action::Idle
        } else {
            proposed
        }
    }

    fn error_exceeds(delta: Option<f32>, error: Option<f32>) -> bool {
        match (delta, error) {
            (Some(delta), Some(error)) if delta.is_finite() => error > delta,
            _ => false,
        }
    }

    pub fn supplemental_cooling_required(&self, max_runtime_exceeded: bool) -> bool {
        if !self.config.capabilities.cool || self.action != Action::Cooling {
            return false;
        }
        let error = self
            .reading()
            .zip(self.setpoints.cooling_target())
            .map(|(current, target)| current - target);
        max_runtime_exceeded
            || Self::error_exceeds(self.config.hysteresis.supplemental_cool_delta, error)
            || self.supplemental_action == SupplementalAction::Cooling
    }

    pub fn supplemental_heating_required(&self, max_runtime_exceeded: bool) -> bool {
        if !self.config.capabilities.heat || self.action != Action::Heating {
            return false;
        }
        let error = self
            .reading()
            .zip(self.setpoints.heating_target())
            .map(|(current, target)| target - current);
        max_runtime_exceeded
            || Self::error_exceeds(self.config.hysteresis.supplemental_heat_delta, error)
            || self.supplemental_action == SupplementalAction::Heating
    }

    pub fn supplemental_action(
        &self,
        cooling_max_runtime_exceeded: bool,
        heating_max_runtime_exceeded: bool,
    ) -> SupplementalAction {
        if !self.inputs_valid() {
            return SupplementalAction::Off;
        }
        let cooling = || self.supplemental_cooling_required(cooling_max_runtime_exceeded);
        let heating = || self.supplemental_heating_required(heating_max_runtime_exceeded);
        let staged = |required: bool, stage: SupplementalAction| {
            if required {
                stage
            } else {
                SupplementalAction::Idle
            }
        };

        match self.mode {
            Mode::Off => SupplementalAction::Off,
            Mode::HeatCool => match (cooling(), heating()) {
                (true, true) => self.supplemental_action,
                (true, false) => SupplementalAction::Cooling,
                (false, true) => SupplementalAction::Heating,
                (false, false) => SupplementalAction::Idle,
            },
            Mode::Cool => staged(cooling(), SupplementalAction::Cooling),
            Mode::Heat => staged(heating(), SupplementalAction::Heating),
            Mode::FanOnly | Mode::Dry => SupplementalAction::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HysteresisConfig;

    fn config() -> ThermostatConfig {
        let mut config = ThermostatConfig::default();
        config.capabilities.two_points = false;
        config.capabilities.fan_only = true;
        config.hysteresis = HysteresisConfig {
            cooling_deadband: 1.0,
            cooling_overrun: 0.5,
            heating_deadband: 1.0,
            heating_overrun: 0.5,
            supplemental_cool_delta: Some(3.0),
            supplemental_heat_delta: None,
        };
        config
    }

    fn eval<'a>(
        config: &'a ThermostatConfig,
        setpoints: &'a Setpoints,
        mode: Mode,
        action: Action,
        current: f32,
    ) -> Evaluator<'a> {
        Evaluator {
            config,
            mode,
            action,
            supplemental_action: SupplementalAction::Idle,
            current: Some(current),
            setpoints,
        }
    }

    #[test]
    fn cooling_band_is_sticky() {
        let config = config();
        let setpoints = Setpoints::Single { target: Some(20.0) };

        assert_eq!(
            eval(&config, &setpoints, Mode::Cool, Action::Idle, 20.5).action(),
            Action::Idle
        );
        assert_eq!(
            eval(&config, &setpoints, Mode::Cool, Action::Idle, 21.1).action(),
            Action::Cooling
        );
        assert_eq!(
            eval(&config, &setpoints, Mode::Cool, Action::Cooling, 19.6).action(),
            Action::Cooling
        );
        assert_eq!(
            eval(&config, &setpoints, Mode::Cool, Action::Cooling, 19.4).action(),
            Action::Idle
        );
    }

    #[test]
    fn exact_boundaries_keep_prior_state() {
        assert!(!above_band(21.0, 20.0, 1.0, 0.5, false));
        assert!(above_band(19.5, 20.0, 1.0, 0.5, true));
        assert!(!below_band(19.0, 20.0, 1.0, 0.5, false));
        assert!(below_band(20.5, 20.0, 1.0, 0.5, true));
    }

    #[test]
    fn missing_or_nan_reading_is_off_in_every_mode() {
        let config = config();
        let setpoints = Setpoints::Single { target: Some(20.0) };
        for mode in Mode::ALL {
            let mut evaluator = eval(&config, &setpoints, mode, Action::Idle, f32::NAN);
            assert_eq!(evaluator.action(), Action::Off, "{mode}");
            evaluator.current = None;
            assert_eq!(evaluator.action(), Action::Off, "{mode}");
        }
    }

    #[test]
    fn invalid_hysteresis_for_mode_is_off() {
        let mut config = config();
        config.hysteresis.heating_overrun = f32::NAN;
        let setpoints = Setpoints::Single { target: Some(20.0) };

        assert_eq!(eval(&config, &setpoints, Mode::Heat, Action::Idle, 15.0).action(), Action::Off);
        assert_eq!(
            eval(&config, &setpoints, Mode::Cool, Action::Idle, 25.0).action(),
            Action::Cooling
        );
    }

    #[test]
    fn single_purpose_modes_never_pick_the_opposite_action() {
        let config = config();
        let setpoints = Setpoints::Single { target: Some(20.0) };
        for current in [5.0, 15.0, 19.4, 20.0, 20.6, 25.0, 35.0] {
            for action in Action::ALL {
                let heat = eval(&config, &setpoints, Mode::Heat, action, current).action();
                assert_ne!(heat, Action::Cooling, "heat mode at {current} from {action}");
                let cool = eval(&config, &setpoints, Mode::Cool, action, current).action();
                assert_ne!(cool, Action::Heating, "cool mode at {current} from {action}");
            }
        }
    }

    #[test]
    fn crossing_heat_cool_boundary_goes_through_idle() {
        let config = config();
        let setpoints = Setpoints::Range {
            low: Some(18.0),
            high: Some(24.0),
        };

        let evaluator = eval(&config, &setpoints, Mode::HeatCool, Action::Cooling, 10.0);
        assert!(evaluator.heating_required());
        assert_eq!(evaluator.action(), Action::Idle);
        assert_eq!(
            eval(&config, &setpoints, Mode::HeatCool, Action::Idle, 10.0).action(),
            Action::Heating
        );
    }

    #[test]
    fn fan_only_runs_unless_gated_by_cooling_band() {
        let mut config = config();
        let setpoints = Setpoints::Single { target: Some(20.0) };
        assert_eq!(
            eval(&config, &setpoints, Mode::FanOnly, Action::Idle, 10.0).action(),
            Action::Fan
        );

        config.capabilities.fan_only_cooling = true;
        assert_eq!(
            eval(&config, &setpoints, Mode::FanOnly, Action::Idle, 10.0).action(),
            Action::Idle
        );
        assert_eq!(
            eval(&config, &setpoints, Mode::FanOnly, Action::Idle, 22.0).action(),
            Action::Fan
        );
    }

    #[test]
    fn supplemental_cooling_latches_once_engaged() {
        let config = config();
        let setpoints = Setpoints::Single { target: Some(20.0) };
        let mut evaluator = eval(&config, &setpoints, Mode::Cool, Action::Cooling, 22.0);
        assert_eq!(evaluator.supplemental_action(false, false), SupplementalAction::Idle);
        assert_eq!(evaluator.supplemental_action(true, false), SupplementalAction::Cooling);

        evaluator.current = Some(23.5);
        assert_eq!(evaluator.supplemental_action(false, false), SupplementalAction::Cooling);

        evaluator.current = Some(20.0);
        evaluator.supplemental_action = SupplementalAction::Cooling;
        assert_eq!(evaluator.supplemental_action(false, false), SupplementalAction::Cooling);

        evaluator.action = Action::Idle;
        assert_eq!(evaluator.supplemental_action(false, false), SupplementalAction::Idle);
    }

    #[test]
    fn supplemental_is_off_in_off_mode_or_without_reading() {
        let config = config();
        let setpoints = Setpoints::Single { target: Some(20.0) };
        assert_eq!(
            eval(&config, &setpoints, Mode::Off, Action::Off, 20.0).supplemental_action(true, true),
            SupplementalAction::Off
        );
        assert_eq!(
            eval(&config, &setpoints, Mode::Heat, Action::Heating, f32::NAN)
                .supplemental_action(true, true),
            SupplementalAction::Off
        );
        assert_eq!(
            eval(&config, &setpoints, Mode::Dry, Action::Drying, 20.0)
                .supplemental_action(true, true),
            SupplementalAction::Idle
        );
    }
}
