use crate::types::{Action, ClimateState, FanMode, Mode, SupplementalAction, SwingMode};

/// One notification port towards the hardware side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    Action(Action),
    Supplemental(SupplementalAction),
    Mode(Mode),
    FanMode(FanMode),
    SwingMode(SwingMode),
    TemperatureChange,
    StartupComplete,
}

const SUPPLEMENTAL_BASE: usize = Action::ALL.len();
const MODE_BASE: usize = SUPPLEMENTAL_BASE + SupplementalAction::ALL.len();
const FAN_MODE_BASE: usize = MODE_BASE + Mode::ALL.len();
const SWING_MODE_BASE: usize = FAN_MODE_BASE + FanMode::ALL.len();
const TEMPERATURE_CHANGE: usize = SWING_MODE_BASE + SwingMode::ALL.len();
const STARTUP_COMPLETE: usize = TEMPERATURE_CHANGE + 1;

impl Trigger {
    pub const COUNT: usize = STARTUP_COMPLETE + 1;

    /// Dense position in `0..COUNT`.
    pub fn index(self) -> usize {
        match self {
            Self::Action(action) => action.index(),
            Self::Supplemental(action) => SUPPLEMENTAL_BASE + action.index(),
            Self::Mode(mode) => MODE_BASE + mode.index(),
            Self::FanMode(fan_mode) => FAN_MODE_BASE + fan_mode.index(),
            Self::SwingMode(swing_mode) => SWING_MODE_BASE + swing_mode.index(),
            Self::TemperatureChange => TEMPERATURE_CHANGE,
            Self::StartupComplete => STARTUP_COMPLETE,
        }
    }

    pub fn all() -> impl Iterator<Item = Trigger> {
        Action::ALL
            .into_iter()
            .map(Self::Action)
            .chain(SupplementalAction::ALL.into_iter().map(Self::Supplemental))
            .chain(Mode::ALL.into_iter().map(Self::Mode))
            .chain(FanMode::ALL.into_iter().map(Self::FanMode))
            .chain(SwingMode::ALL.into_iter().map(Self::SwingMode))
            .chain([Self::TemperatureChange, Self::StartupComplete])
    }

    /// Stable port name, e.g. `action_cooling` or `fan_mode_auto`.
    pub fn name(self) -> String {
        let (group, value) = match self {
            Self::Action(action) => ("action", action.as_str()),
            Self::Supplemental(action) => ("supplemental", action.as_str()),
            Self::Mode(mode) => ("mode", mode.as_str()),
            Self::FanMode(fan_mode) => ("fan_mode", fan_mode.as_str()),
            Self::SwingMode(swing_mode) => ("swing_mode", swing_mode.as_str()),
            Self::TemperatureChange => return "temperature_change".to_string(),
            Self::StartupComplete => return "startup_complete".to_string(),
        };
        format!("{group}_{}", value.to_ascii_lowercase())
    }
}

/// Output of the engine, in the order it happened.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineEvent {
    Fire(Trigger),
    /// Tell the effect started by an earlier `Fire` of this port to stop.
    Stop(Trigger),
    Publish(ClimateState),
}

/// Hardware side of the notification ports.
pub trait Actuator {
    fn fire(&mut self, trigger: Trigger);
    fn stop(&mut self, trigger: Trigger);
}

type Callback = Box<dyn FnMut() + Send>;

#[derive(Default)]
struct Port {
    on_fire: Vec<Callback>,
    on_stop: Vec<Callback>,
}

/// Fixed table of callbacks, one slot per [`Trigger`].
pub struct TriggerTable {
    ports: Vec<Port>,
}

impl Default for TriggerTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerTable {
    pub fn new() -> Self {
        Self {
            ports: Trigger::all().map(|_| Port::default()).collect(),
        }
    }

    pub fn on_fire(&mut self, trigger: Trigger, callback: impl FnMut() + Send + 'static) {
        self.ports[trigger.index()].on_fire.push(Box::new(callback));
    }

    pub fn on_stop(&mut self, trigger: Trigger, callback: impl FnMut() + Send + 'static) {
        self.ports[trigger.index()].on_stop.push(Box::new(callback));
    }
}

impl Actuator for TriggerTable {
    fn fire(&mut self, trigger: Trigger) {
        for callback in &mut self.ports[trigger.index()].on_fire {
            callback();
        }
    }

    fn stop(&mut self, trigger: Trigger) {
        for callback in &mut self.ports[trigger.index()].on_stop {
            callback();
        }
    }
}

/// Replays `events` against `actuator`; returns the last published snapshot, if any.
pub fn dispatch<A: Actuator + ?Sized>(
    events: impl IntoIterator<Item = EngineEvent>,
    actuator: &mut A,
) -> Option<ClimateState> {
    let mut published = None;
    for event in events {
        match event {
            EngineEvent::Fire(trigger) => actuator.fire(trigger),
            EngineEvent::Stop(trigger) => actuator.stop(trigger),
            EngineEvent::Publish(state) => published = Some(state),
        }
    }
    published
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::{Arc, Mutex},
    };

    use super::*;

    #[test]
    fn indices_are_dense_and_unique() {
        let indices: HashSet<usize> = Trigger::all().map(Trigger::index).collect();
        assert_eq!(indices.len(), Trigger::COUNT);
        assert_eq!(Trigger::COUNT, 31);
        assert!(indices.iter().all(|index| *index < Trigger::COUNT));
    }

    #[test]
    fn names_are_lowercase_and_grouped() {
        assert_eq!(Trigger::Action(Action::Cooling).name(), "action_cooling");
        assert_eq!(Trigger::Mode(Mode::HeatCool).name(), "mode_heat_cool");
        assert_eq!(Trigger::FanMode(FanMode::Auto).name(), "fan_mode_auto");
        assert_eq!(
            Trigger::Supplemental(SupplementalAction::Heating).name(),
            "supplemental_heating"
        );
        assert_eq!(Trigger::StartupComplete.name(), "startup_complete");
    }

    #[test]
    fn table_routes_fire_and_stop_to_registered_callbacks() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut table = TriggerTable::new();

        let fire_log = Arc::clone(&log);
        table.on_fire(Trigger::Action(Action::Heating), move || {
            fire_log.lock().unwrap().push("heat on");
        });
        let stop_log = Arc::clone(&log);
        table.on_stop(Trigger::Action(Action::Heating), move || {
            stop_log.lock().unwrap().push("heat off");
        });

        let published = dispatch(
            [
                EngineEvent::Fire(Trigger::Action(Action::Heating)),
                EngineEvent::Fire(Trigger::Action(Action::Cooling)),
                EngineEvent::Stop(Trigger::Action(Action::Heating)),
            ],
            &mut table,
        );

        assert_eq!(published, None);
        assert_eq!(*log.lock().unwrap(), vec!["heat on", "heat off"]);
    }
}
