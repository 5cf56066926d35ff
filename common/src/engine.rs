use tracing::{debug, info, warn};

use crate::{
    config::ThermostatConfig,
    hysteresis::Evaluator,
    latch::Latch,
    setpoint::{SetpointLimits, Setpoints},
    timers::{TimerBank, TimerId},
    triggers::{EngineEvent, Trigger},
    types::{
        Action, ClimateState, ControlRequest, ControllerStatus, FanMode, Mode, PersistedState,
        Preset, SupplementalAction, SwingMode, TimerStatus,
    },
};

/// Timers that hold the current action in place while armed.
const HOLD_TIMERS: [TimerId; 4] = [
    TimerId::IdleOn,
    TimerId::CoolingOn,
    TimerId::FanningOn,
    TimerId::HeatingOn,
];

/// Bang-bang climate controller with short-cycle protection.
///
/// Every entry point takes the current monotonic time and returns the
/// notifications it produced. State is fully updated before the events are
/// handed back, so a caller may feed the engine again while dispatching them.
#[derive(Debug, Clone)]
pub struct ThermostatEngine {
    config: ThermostatConfig,
    limits: SetpointLimits,
    timers: TimerBank,

    mode: Mode,
    fan_mode: FanMode,
    swing_mode: SwingMode,
    preset: Preset,
    setpoints: Setpoints,
    current_temperature: Option<f32>,

    action: Latch<Action>,
    supplemental_action: Latch<SupplementalAction>,
    mode_latch: Latch<Mode>,
    fan_mode_latch: Latch<FanMode>,
    swing_mode_latch: Latch<SwingMode>,
    // Fan port fired alongside cooling/heating.
    coupled_fan: bool,

    cooling_max_runtime_exceeded: bool,
    heating_max_runtime_exceeded: bool,

    notified_setpoints: Option<Setpoints>,
    last_published: Option<ClimateState>,
    last_sensor_update_ms: Option<u64>,
    setup_complete: bool,
}

impl ThermostatEngine {
    pub fn new(mut config: ThermostatConfig) -> Self {
        config.sanitize();
        if config.repair_setpoint_limits() {
            warn!(
                min = config.visual_min_temperature,
                max = config.visual_max_temperature,
                "visual range cannot hold a set point, using the default range"
            );
        }
        if let Err(err) = config.validate() {
            warn!("thermostat config is invalid, affected modes will stay off: {err}");
        }

        let two_points = config.capabilities.two_points;
        let fan_mode = config.capabilities.fallback_fan_mode();

        Self {
            limits: config.setpoint_limits(),
            timers: TimerBank::new(&config.timers),
            mode: config.default_mode,
            fan_mode,
            swing_mode: SwingMode::Off,
            preset: config.default_preset,
            setpoints: config
                .presets
                .targets(config.default_preset)
                .setpoints(two_points),
            current_temperature: None,
            action: Latch::default(),
            supplemental_action: Latch::default(),
            mode_latch: Latch::default(),
            fan_mode_latch: Latch::default(),
            swing_mode_latch: Latch::default(),
            coupled_fan: false,
            cooling_max_runtime_exceeded: false,
            heating_max_runtime_exceeded: false,
            notified_setpoints: None,
            last_published: None,
            last_sensor_update_ms: None,
            setup_complete: false,
            config,
        }
    }

    pub fn config(&self) -> &ThermostatConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn action(&self) -> Action {
        self.action.value().unwrap_or(Action::Off)
    }

    pub fn supplemental_action(&self) -> SupplementalAction {
        self.supplemental_action
            .value()
            .unwrap_or(SupplementalAction::Off)
    }

    pub fn fan_mode(&self) -> FanMode {
        self.fan_mode
    }

    pub fn swing_mode(&self) -> SwingMode {
        self.swing_mode
    }

    pub fn preset(&self) -> Preset {
        self.preset
    }

    pub fn setpoints(&self) -> &Setpoints {
        &self.setpoints
    }

    pub fn current_temperature(&self) -> Option<f32> {
        self.current_temperature
    }

    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete
    }

    pub fn state(&self) -> ClimateState {
        ClimateState {
            mode: self.mode,
            action: self.action(),
            supplemental_action: self.supplemental_action(),
            fan_mode: self.fan_mode,
            swing_mode: self.swing_mode,
            preset: self.preset,
            target_temperature: self.setpoints.target(),
            target_temperature_low: self.setpoints.low(),
            target_temperature_high: self.setpoints.high(),
            current_temperature: self.current_temperature,
        }
    }

    pub fn persisted_state(&self) -> PersistedState {
        PersistedState {
            mode: self.mode,
            fan_mode: self.fan_mode,
            swing_mode: self.swing_mode,
            preset: self.preset,
            setpoints: self.setpoints,
        }
    }

    /// Boots the engine. Protective off timers are armed before anything is evaluated.
    pub fn setup(&mut self, restored: Option<PersistedState>, now_ms: u64) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if self.setup_complete {
            warn!("thermostat setup called twice, ignoring");
            return events;
        }

        if self.config.startup_delay {
            for id in [TimerId::CoolingOff, TimerId::FanningOff, TimerId::HeatingOff] {
                self.timers.start(id, now_ms);
            }
            if self.config.capabilities.fan_only_action_uses_fan_mode_timer {
                self.timers.start(TimerId::FanMode, now_ms);
            }
        }

        match restored {
            Some(state) => self.restore(state),
            None => {
                self.mode = self.config.default_mode;
                self.change_preset(self.config.default_preset.is_away());
            }
        }
        self.mode = self.supported_mode(self.mode);
        self.fan_mode = self.supported_fan_mode(self.fan_mode);
        self.swing_mode = self.supported_swing_mode(self.swing_mode);
        self.setpoints.validate(&self.limits);
        self.notified_setpoints = Some(self.setpoints);

        self.switch_to_mode(&mut events);
        self.update_actions(now_ms, &mut events);
        self.switch_to_fan_mode(now_ms, &mut events);
        self.switch_to_swing_mode(&mut events);

        self.setup_complete = true;
        events.push(EngineEvent::Fire(Trigger::StartupComplete));
        self.publish(true, &mut events);
        info!(
            mode = %self.mode,
            action = %self.action(),
            preset = %self.preset,
            "thermostat ready"
        );
        events
    }

    fn restore(&mut self, state: PersistedState) {
        self.mode = state.mode;
        self.fan_mode = state.fan_mode;
        self.swing_mode = state.swing_mode;
        self.preset = state.preset;
        if state.setpoints.is_two_point() == self.config.capabilities.two_points {
            self.setpoints = state.setpoints;
        } else {
            warn!("restored set points do not match two-point setting, using preset defaults");
            self.change_preset(state.preset.is_away());
        }
    }

    /// Feeds a new sensor reading. Non-finite values mean "no reading".
    pub fn on_temperature(&mut self, value: f32, now_ms: u64) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        self.service_timers(now_ms, &mut events);

        if value.is_finite() {
            self.current_temperature = Some(value);
            self.last_sensor_update_ms = Some(now_ms);
        } else {
            debug!("invalid temperature reading");
            self.current_temperature = None;
        }

        if self.setup_complete {
            self.update_actions(now_ms, &mut events);
            self.publish(false, &mut events);
        }
        events
    }

    /// Applies the present fields of `request`, then refreshes.
    pub fn control(&mut self, request: ControlRequest, now_ms: u64) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        self.service_timers(now_ms, &mut events);

        if let Some(preset) = request.preset {
            // Before setup the restore owns the set points.
            if self.setup_complete {
                self.change_preset(preset.is_away());
            } else {
                self.preset = preset;
            }
        }
        if let Some(mode) = request.mode {
            self.mode = self.supported_mode(mode);
        }
        if let Some(fan_mode) = request.fan_mode {
            self.fan_mode = self.supported_fan_mode(fan_mode);
        }
        if let Some(swing_mode) = request.swing_mode {
            self.swing_mode = self.supported_swing_mode(swing_mode);
        }

        if self.setpoints.is_two_point() {
            if let Some(low) = request.target_temperature_low {
                self.setpoints.set_low(low);
                self.setpoints.validate_target_temperature_low(&self.limits);
            }
            if let Some(high) = request.target_temperature_high {
                self.setpoints.set_high(high);
                self.setpoints.validate_target_temperature_high(&self.limits);
            }
        } else if let Some(target) = request.target_temperature {
            self.setpoints.set_target(target);
            self.setpoints.validate_target_temperature(&self.limits);
        }

        if self.setup_complete {
            self.apply_refresh(now_ms, &mut events);
        }
        events
    }

    /// Services expired timers and sensor staleness.
    pub fn tick(&mut self, now_ms: u64) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if !self.setup_complete {
            return events;
        }
        self.service_timers(now_ms, &mut events);
        self.check_sensor_staleness(now_ms, &mut events);
        self.publish(false, &mut events);
        events
    }

    pub fn refresh(&mut self, now_ms: u64) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if self.setup_complete {
            self.service_timers(now_ms, &mut events);
            self.apply_refresh(now_ms, &mut events);
        }
        events
    }

    pub fn next_timer_deadline_ms(&self) -> Option<u64> {
        self.timers.next_deadline_ms()
    }

    pub fn timer_status(&self, now_ms: u64) -> Vec<TimerStatus> {
        self.timers.status(now_ms)
    }

    /// Action chosen when timers are ignored.
    pub fn delayed_action(&self) -> Action {
        self.compute_action(true)
    }

    /// The evaluator wants a different action but a timer is holding it back.
    pub fn action_change_delayed(&self) -> bool {
        let wanted = self.delayed_action();
        wanted != self.action() && !self.action_ready(wanted)
    }

    pub fn fan_mode_change_delayed(&self) -> bool {
        !self.fan_mode_latch.is(self.fan_mode) && self.timers.is_active(TimerId::FanMode)
    }

    /// Fan mode whose notification is currently running.
    pub fn locked_fan_mode(&self) -> Option<FanMode> {
        self.fan_mode_latch.value()
    }

    pub fn is_sensor_valid(&self, now_ms: u64) -> bool {
        if self.current_temperature.is_none() {
            return false;
        }
        match (self.config.sensor_stale_timeout_s, self.last_sensor_update_ms) {
            (Some(timeout_s), Some(last)) => {
                now_ms.saturating_sub(last) <= u64::from(timeout_s) * 1_000
            }
            _ => true,
        }
    }

    pub fn status(
        &self,
        now_ms: u64,
        schedule_enabled: bool,
        next_schedule_event_epoch: Option<i64>,
        time_synced: bool,
        timezone: &str,
    ) -> ControllerStatus {
        ControllerStatus {
            state: self.state(),
            sensor_valid: self.is_sensor_valid(now_ms),
            setup_complete: self.is_setup_complete(),
            action_change_delayed: self.action_change_delayed(),
            delayed_action: self.delayed_action(),
            fan_mode_change_delayed: self.fan_mode_change_delayed(),
            locked_fan_mode: self.locked_fan_mode(),
            timers: self.timer_status(now_ms),
            schedule_enabled,
            next_schedule_event_epoch,
            time_synced,
            timezone: timezone.to_string(),
        }
    }

    fn evaluator(&self) -> Evaluator<'_> {
        Evaluator {
            config: &self.config,
            mode: self.mode,
            action: self.action(),
            supplemental_action: self.supplemental_action(),
            current: self.current_temperature,
            setpoints: &self.setpoints,
        }
    }

    fn compute_action(&self, ignore_timers: bool) -> Action {
        let evaluator = self.evaluator();
        if !evaluator.inputs_valid() {
            return Action::Off;
        }
        if !ignore_timers && self.timers.any_active(&HOLD_TIMERS) {
            return self.action();
        }
        evaluator.action()
    }

    fn compute_supplemental_action(&self) -> SupplementalAction {
        self.evaluator().supplemental_action(
            self.cooling_max_runtime_exceeded,
            self.heating_max_runtime_exceeded,
        )
    }

    fn fan_on_timer(&self) -> TimerId {
        if self.config.capabilities.fan_only_action_uses_fan_mode_timer {
            TimerId::FanMode
        } else {
            TimerId::FanningOn
        }
    }

    fn fan_off_timer(&self) -> TimerId {
        if self.config.capabilities.fan_only_action_uses_fan_mode_timer {
            TimerId::FanMode
        } else {
            TimerId::FanningOff
        }
    }

    fn action_ready(&self, action: Action) -> bool {
        let blocked = match action {
            Action::Off | Action::Idle => self.timers.any_active(&[
                TimerId::CoolingOn,
                TimerId::HeatingOn,
                self.fan_on_timer(),
            ]),
            Action::Cooling | Action::Drying => self.timers.any_active(&[
                TimerId::IdleOn,
                TimerId::FanningOff,
                TimerId::CoolingOff,
                TimerId::HeatingOn,
            ]),
            Action::Heating => self.timers.any_active(&[
                TimerId::IdleOn,
                TimerId::CoolingOn,
                TimerId::FanningOff,
                TimerId::HeatingOff,
            ]),
            Action::Fan => self.timers.is_active(self.fan_off_timer()),
        };
        !blocked
    }

    fn update_actions(&mut self, now_ms: u64, events: &mut Vec<EngineEvent>) {
        let action = self.compute_action(false);
        self.switch_to_action(action, now_ms, events);
        self.update_supplemental_action(events);
    }

    fn update_supplemental_action(&mut self, events: &mut Vec<EngineEvent>) {
        let supplemental = self.compute_supplemental_action();
        self.switch_to_supplemental_action(supplemental, events);
    }

    fn switch_to_action(&mut self, action: Action, now_ms: u64, events: &mut Vec<EngineEvent>) {
        let previous = self.action.value();
        if previous == Some(action) {
            return;
        }

        if self.setup_complete && previous.is_some_and(Action::is_resting) && action.is_resting() {
            debug!(%action, "action relabelled");
            self.action.relabel(action);
            return;
        }

        if !self.action_ready(action) {
            debug!(
                from = %self.action(),
                to = %action,
                "action change delayed by timers"
            );
            return;
        }

        match previous {
            Some(Action::Cooling) => {
                self.timers.start(TimerId::CoolingOff, now_ms);
                self.timers.cancel(TimerId::CoolingMaxRunTime);
            }
            Some(Action::Heating) => {
                self.timers.start(TimerId::HeatingOff, now_ms);
                self.timers.cancel(TimerId::HeatingMaxRunTime);
            }
            Some(Action::Drying) => {
                self.timers.start(TimerId::CoolingOff, now_ms);
                self.timers.start(TimerId::FanningOff, now_ms);
            }
            Some(Action::Fan) => {
                let fan_off = self.fan_off_timer();
                self.timers.start(fan_off, now_ms);
            }
            Some(Action::Off | Action::Idle) | None => {}
        }

        let fan_with_cooling = self.config.capabilities.fan_with_cooling;
        let fan_with_heating = self.config.capabilities.fan_with_heating;
        let mut couple_fan = false;
        match action {
            Action::Off | Action::Idle => {
                self.timers.start(TimerId::IdleOn, now_ms);
                self.cooling_max_runtime_exceeded = false;
                self.heating_max_runtime_exceeded = false;
            }
            Action::Cooling => {
                self.timers.start(TimerId::CoolingOn, now_ms);
                self.timers.start(TimerId::CoolingMaxRunTime, now_ms);
                self.cooling_max_runtime_exceeded = false;
                couple_fan = fan_with_cooling;
            }
            Action::Heating => {
                self.timers.start(TimerId::HeatingOn, now_ms);
                self.timers.start(TimerId::HeatingMaxRunTime, now_ms);
                self.heating_max_runtime_exceeded = false;
                couple_fan = fan_with_heating;
            }
            Action::Fan => {
                let fan_on = self.fan_on_timer();
                self.timers.start(fan_on, now_ms);
            }
            Action::Drying => {
                self.timers.start(TimerId::CoolingOn, now_ms);
                self.timers.start(TimerId::FanningOn, now_ms);
            }
        }

        if std::mem::take(&mut self.coupled_fan) {
            events.push(EngineEvent::Stop(Trigger::Action(Action::Fan)));
        }
        self.action.select(action, Trigger::Action(action), events);
        if couple_fan {
            self.timers.start(TimerId::FanningOn, now_ms);
            self.coupled_fan = true;
            events.push(EngineEvent::Fire(Trigger::Action(Action::Fan)));
        }
        debug!(?previous, %action, "action switched");
    }

    fn switch_to_supplemental_action(
        &mut self,
        action: SupplementalAction,
        events: &mut Vec<EngineEvent>,
    ) {
        let previous = self.supplemental_action.value();
        if previous == Some(action) {
            return;
        }

        let was_engaged = previous.is_some_and(|previous| !previous.is_resting());
        if self.setup_complete && !was_engaged && action.is_resting() && previous.is_some() {
            self.supplemental_action.relabel(action);
            return;
        }

        match action {
            SupplementalAction::Off | SupplementalAction::Idle => {
                if was_engaged {
                    self.timers.cancel(TimerId::CoolingMaxRunTime);
                    self.timers.cancel(TimerId::HeatingMaxRunTime);
                }
            }
            SupplementalAction::Cooling => {
                self.timers.cancel(TimerId::CoolingMaxRunTime);
            }
            SupplementalAction::Heating => {
                self.timers.cancel(TimerId::HeatingMaxRunTime);
            }
        }

        self.supplemental_action
            .select(action, Trigger::Supplemental(action), events);
        debug!(?previous, %action, "supplemental action switched");
    }

    fn switch_to_mode(&mut self, events: &mut Vec<EngineEvent>) {
        let mode = self.mode;
        if self.mode_latch.select(mode, Trigger::Mode(mode), events) {
            debug!(%mode, "mode latched");
        }
    }

    fn switch_to_fan_mode(&mut self, now_ms: u64, events: &mut Vec<EngineEvent>) {
        let fan_mode = self.fan_mode;
        if self.fan_mode_latch.is(fan_mode) {
            return;
        }
        if self.timers.is_active(TimerId::FanMode) {
            debug!(%fan_mode, "fan mode change delayed by timer");
            return;
        }
        self.timers.start(TimerId::FanMode, now_ms);
        self.fan_mode_latch
            .select(fan_mode, Trigger::FanMode(fan_mode), events);
        debug!(%fan_mode, "fan mode latched");
    }

    fn switch_to_swing_mode(&mut self, events: &mut Vec<EngineEvent>) {
        let swing_mode = self.swing_mode;
        if self
            .swing_mode_latch
            .select(swing_mode, Trigger::SwingMode(swing_mode), events)
        {
            debug!(%swing_mode, "swing mode latched");
        }
    }

    fn supported_mode(&self, mode: Mode) -> Mode {
        if self.config.capabilities.supports_mode(mode) {
            mode
        } else {
            warn!(requested = %mode, "unsupported mode, using HEAT_COOL");
            Mode::HeatCool
        }
    }

    fn supported_fan_mode(&self, fan_mode: FanMode) -> FanMode {
        let capabilities = &self.config.capabilities;
        if capabilities.supports_fan_mode(fan_mode) {
            fan_mode
        } else {
            let fallback = capabilities.fallback_fan_mode();
            warn!(requested = %fan_mode, %fallback, "unsupported fan mode");
            fallback
        }
    }

    fn supported_swing_mode(&self, swing_mode: SwingMode) -> SwingMode {
        if self.config.capabilities.supports_swing_mode(swing_mode) {
            swing_mode
        } else {
            warn!(requested = %swing_mode, "unsupported swing mode, using OFF");
            SwingMode::Off
        }
    }

    /// Overwrites the live set points with the Home or Away defaults.
    fn change_preset(&mut self, away: bool) {
        let preset = Preset::from_away(away);
        self.setpoints = self
            .config
            .presets
            .targets(preset)
            .setpoints(self.config.capabilities.two_points);
        self.setpoints.validate(&self.limits);
        self.preset = preset;
    }

    fn check_temperature_change_trigger(&mut self, events: &mut Vec<EngineEvent>) {
        if self.notified_setpoints == Some(self.setpoints) {
            return;
        }
        self.notified_setpoints = Some(self.setpoints);
        events.push(EngineEvent::Fire(Trigger::TemperatureChange));
    }

    fn apply_refresh(&mut self, now_ms: u64, events: &mut Vec<EngineEvent>) {
        self.switch_to_mode(events);
        self.update_actions(now_ms, events);
        self.switch_to_fan_mode(now_ms, events);
        self.switch_to_swing_mode(events);
        self.check_temperature_change_trigger(events);
        self.publish(false, events);
    }

    fn service_timers(&mut self, now_ms: u64, events: &mut Vec<EngineEvent>) {
        if !self.setup_complete {
            return;
        }
        while let Some(id) = self.timers.pop_expired(now_ms) {
            debug!(timer = id.name(), "timer expired");
            match id {
                TimerId::CoolingMaxRunTime => {
                    self.cooling_max_runtime_exceeded = true;
                    self.update_supplemental_action(events);
                }
                TimerId::HeatingMaxRunTime => {
                    self.heating_max_runtime_exceeded = true;
                    self.update_supplemental_action(events);
                }
                TimerId::FanMode => {
                    self.switch_to_fan_mode(now_ms, events);
                    if self.config.capabilities.fan_only_action_uses_fan_mode_timer {
                        self.update_actions(now_ms, events);
                    }
                }
                _ => self.update_actions(now_ms, events),
            }
        }
    }

    fn check_sensor_staleness(&mut self, now_ms: u64, events: &mut Vec<EngineEvent>) {
        if self.current_temperature.is_none() || self.is_sensor_valid(now_ms) {
            return;
        }
        warn!("no temperature reading within the stale timeout, treating sensor as missing");
        self.current_temperature = None;
        self.update_actions(now_ms, events);
    }

    fn publish(&mut self, force: bool, events: &mut Vec<EngineEvent>) {
        let state = self.state();
        if force || self.last_published != Some(state) {
            self.last_published = Some(state);
            events.push(EngineEvent::Publish(state));
        }
    }
}
