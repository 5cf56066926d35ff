use crate::{config::TimerConfig, types::TimerStatus};

/// Every timer purpose the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerId {
    CoolingMaxRunTime,
    CoolingOff,
    CoolingOn,
    FanMode,
    FanningOff,
    FanningOn,
    HeatingMaxRunTime,
    HeatingOff,
    HeatingOn,
    IdleOn,
}

impl TimerId {
    pub const COUNT: usize = 10;

    pub const ALL: [TimerId; Self::COUNT] = [
        Self::CoolingMaxRunTime,
        Self::CoolingOff,
        Self::CoolingOn,
        Self::FanMode,
        Self::FanningOff,
        Self::FanningOn,
        Self::HeatingMaxRunTime,
        Self::HeatingOff,
        Self::HeatingOn,
        Self::IdleOn,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::CoolingMaxRunTime => "cool_run",
            Self::CoolingOff => "cool_off",
            Self::CoolingOn => "cool_on",
            Self::FanMode => "fan_mode",
            Self::FanningOff => "fan_off",
            Self::FanningOn => "fan_on",
            Self::HeatingMaxRunTime => "heat_run",
            Self::HeatingOff => "heat_off",
            Self::HeatingOn => "heat_on",
            Self::IdleOn => "idle_on",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct TimerSlot {
    duration_ms: u64,
    deadline_ms: Option<u64>,
}

/// Fixed table of one-shot countdown timers keyed by [`TimerId`].
///
/// A timer counts as active from `start` until its expiry has been collected
/// with [`TimerBank::pop_expired`] or it is cancelled. Starting an active timer
/// replaces its deadline, so a timer never fires twice for one arming.
#[derive(Debug, Clone)]
pub struct TimerBank {
    slots: [TimerSlot; TimerId::COUNT],
}

fn seconds_to_ms(seconds: Option<u32>) -> u64 {
    seconds.map(|s| u64::from(s) * 1_000).unwrap_or(0)
}

impl TimerBank {
    pub fn new(config: &TimerConfig) -> Self {
        let mut bank = Self {
            slots: [TimerSlot::default(); TimerId::COUNT],
        };
        let durations = [
            (TimerId::CoolingMaxRunTime, config.cooling_max_run_time_s),
            (TimerId::CoolingOff, config.cooling_minimum_off_time_s),
            (TimerId::CoolingOn, config.cooling_minimum_run_time_s),
            (TimerId::FanMode, config.fan_mode_minimum_switching_time_s),
            (TimerId::FanningOff, config.fanning_minimum_off_time_s),
            (TimerId::FanningOn, config.fanning_minimum_run_time_s),
            (TimerId::HeatingMaxRunTime, config.heating_max_run_time_s),
            (TimerId::HeatingOff, config.heating_minimum_off_time_s),
            (TimerId::HeatingOn, config.heating_minimum_run_time_s),
            (TimerId::IdleOn, config.idle_minimum_time_s),
        ];
        for (id, seconds) in durations {
            bank.slots[id.index()].duration_ms = seconds_to_ms(seconds);
        }
        bank
    }

    pub fn duration_ms(&self, id: TimerId) -> u64 {
        self.slots[id.index()].duration_ms
    }

    /// Arms `id`. Disabled (zero length) timers are never armed; returns whether it was.
    pub fn start(&mut self, id: TimerId, now_ms: u64) -> bool {
        let slot = &mut self.slots[id.index()];
        if slot.duration_ms == 0 {
            return false;
        }
        slot.deadline_ms = Some(now_ms.saturating_add(slot.duration_ms));
        true
    }

    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.slots[id.index()].deadline_ms.take().is_some()
    }

    pub fn is_active(&self, id: TimerId) -> bool {
        self.slots[id.index()].deadline_ms.is_some()
    }

    pub fn any_active(&self, ids: &[TimerId]) -> bool {
        ids.iter().any(|id| self.is_active(*id))
    }

    pub fn remaining_ms(&self, id: TimerId, now_ms: u64) -> u64 {
        self.slots[id.index()]
            .deadline_ms
            .map(|deadline| deadline.saturating_sub(now_ms))
            .unwrap_or(0)
    }

    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.slots.iter().filter_map(|slot| slot.deadline_ms).min()
    }

    /// Disarms and returns the earliest timer whose deadline has passed.
    pub fn pop_expired(&mut self, now_ms: u64) -> Option<TimerId> {
        let id = TimerId::ALL
            .into_iter()
            .filter_map(|id| {
                self.slots[id.index()]
                    .deadline_ms
                    .filter(|deadline| *deadline <= now_ms)
                    .map(|deadline| (deadline, id))
            })
            .min()?
            .1;
        self.slots[id.index()].deadline_ms = None;
        Some(id)
    }

    pub fn status(&self, now_ms: u64) -> Vec<TimerStatus> {
        TimerId::ALL
            .into_iter()
            .map(|id| TimerStatus {
                name: id.name(),
                active: self.is_active(id),
                duration_ms: self.duration_ms(id),
                remaining_ms: self.remaining_ms(id, now_ms),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank() -> TimerBank {
        TimerBank::new(&TimerConfig {
            cooling_minimum_off_time_s: Some(10),
            cooling_minimum_run_time_s: Some(5),
            idle_minimum_time_s: Some(5),
            ..TimerConfig::default()
        })
    }

    #[test]
    fn disabled_timer_never_arms() {
        let mut timers = bank();
        assert!(!timers.start(TimerId::HeatingOff, 0));
        assert!(!timers.is_active(TimerId::HeatingOff));
        assert_eq!(timers.next_deadline_ms(), None);
    }

    #[test]
    fn restart_replaces_deadline() {
        let mut timers = bank();
        assert!(timers.start(TimerId::CoolingOff, 0));
        assert!(timers.start(TimerId::CoolingOff, 4_000));

        assert_eq!(timers.pop_expired(10_000), None);
        assert_eq!(timers.remaining_ms(TimerId::CoolingOff, 10_000), 4_000);
        assert_eq!(timers.pop_expired(14_000), Some(TimerId::CoolingOff));
        assert_eq!(timers.pop_expired(14_000), None);
        assert!(!timers.is_active(TimerId::CoolingOff));
    }

    #[test]
    fn expired_timers_pop_in_deadline_order() {
        let mut timers = bank();
        timers.start(TimerId::CoolingOff, 0);
        timers.start(TimerId::IdleOn, 1_000);
        timers.start(TimerId::CoolingOn, 500);

        assert_eq!(timers.next_deadline_ms(), Some(5_500));
        assert_eq!(timers.pop_expired(20_000), Some(TimerId::CoolingOn));
        assert_eq!(timers.pop_expired(20_000), Some(TimerId::IdleOn));
        assert_eq!(timers.pop_expired(20_000), Some(TimerId::CoolingOff));
        assert_eq!(timers.pop_expired(20_000), None);
    }

    #[test]
    fn cancel_reports_whether_timer_was_armed() {
        let mut timers = bank();
        assert!(!timers.cancel(TimerId::IdleOn));
        timers.start(TimerId::IdleOn, 0);
        assert!(timers.any_active(&[TimerId::CoolingOn, TimerId::IdleOn]));
        assert!(timers.cancel(TimerId::IdleOn));
        assert!(!timers.any_active(&[TimerId::CoolingOn, TimerId::IdleOn]));
    }
}
