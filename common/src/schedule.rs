use chrono::{DateTime, Datelike, Duration, FixedOffset, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::types::{ControlRequest, Mode, Preset};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DayOfWeek {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl DayOfWeek {
    pub fn index(self) -> usize {
        match self {
            Self::Mon => 0,
            Self::Tue => 1,
            Self::Wed => 2,
            Self::Thu => 3,
            Self::Fri => 4,
            Self::Sat => 5,
            Self::Sun => 6,
        }
    }

    pub fn from_index(index: usize) -> Self {
        match index % 7 {
            0 => Self::Mon,
            1 => Self::Tue,
            2 => Self::Wed,
            3 => Self::Thu,
            4 => Self::Fri,
            5 => Self::Sat,
            _ => Self::Sun,
        }
    }

    pub fn from_chrono(weekday: Weekday) -> Self {
        Self::from_index(weekday.num_days_from_monday() as usize)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleEntry {
    pub day: DayOfWeek,
    #[serde(rename = "startMinutes")]
    pub start_minutes: u16,
    /// Leaves the mode alone when absent.
    #[serde(default)]
    pub mode: Option<Mode>,
    pub preset: Preset,
}

impl ScheduleEntry {
    pub fn validate(&self) -> bool {
        i64::from(self.start_minutes) < MINUTES_PER_DAY
    }

    fn week_minute(&self) -> i64 {
        week_minute(self.day, i64::from(self.start_minutes))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Schedule {
    pub enabled: bool,
    pub entries: Vec<ScheduleEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleAction {
    pub mode: Option<Mode>,
    pub preset: Preset,
}

impl ScheduleAction {
    pub fn to_request(self) -> ControlRequest {
        ControlRequest {
            mode: self.mode,
            preset: Some(self.preset),
            ..ControlRequest::default()
        }
    }
}

const MINUTES_PER_DAY: i64 = 24 * 60;
const MINUTES_PER_WEEK: i64 = 7 * MINUTES_PER_DAY;

/// Minutes since Monday 00:00.
fn week_minute(day: DayOfWeek, minute_of_day: i64) -> i64 {
    day.index() as i64 * MINUTES_PER_DAY + minute_of_day
}

fn now_week_minute(now: DateTime<FixedOffset>) -> i64 {
    week_minute(
        DayOfWeek::from_chrono(now.weekday()),
        i64::from(now.hour() * 60 + now.minute()),
    )
}

impl Schedule {
    pub fn normalize(&mut self) {
        self.entries.retain(ScheduleEntry::validate);
        self.entries.sort_by_key(ScheduleEntry::week_minute);
    }

    fn active(&self) -> impl Iterator<Item = &ScheduleEntry> {
        let enabled = self.enabled;
        self.entries.iter().filter(move |_| enabled)
    }

    /// Entry in effect at `now`: the latest start at or before it, wrapping
    /// back into the previous week.
    pub fn current_action(&self, now: DateTime<FixedOffset>) -> Option<ScheduleAction> {
        let now_minute = now_week_minute(now);
        self.active()
            .max_by_key(|entry| {
                let start = entry.week_minute();
                (start <= now_minute, start)
            })
            .map(|entry| ScheduleAction {
                mode: entry.mode,
                preset: entry.preset,
            })
    }

    /// Epoch seconds of the next entry start strictly after `now`. A lone
    /// entry that just started repeats one week later.
    pub fn next_event_epoch(&self, now: DateTime<FixedOffset>) -> Option<i64> {
        let now_minute = now_week_minute(now);
        let wait = self
            .active()
            .map(|entry| {
                let ahead = (entry.week_minute() - now_minute).rem_euclid(MINUTES_PER_WEEK);
                if ahead == 0 {
                    MINUTES_PER_WEEK
                } else {
                    ahead
                }
            })
            .min()?;

        let minute_start = now.with_second(0)?.with_nanosecond(0)?;
        Some((minute_start + Duration::minutes(wait)).timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn fixed_time(day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::west_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 1, day, hour, minute, 0)
            .unwrap()
    }

    fn entry(day: DayOfWeek, hour: u16, mode: Option<Mode>, preset: Preset) -> ScheduleEntry {
        ScheduleEntry {
            day,
            start_minutes: hour * 60,
            mode,
            preset,
        }
    }

    #[test]
    fn wraps_schedule_to_previous_day() {
        let mut schedule = Schedule {
            enabled: true,
            entries: vec![entry(DayOfWeek::Sun, 23, Some(Mode::Heat), Preset::Away)],
        };
        schedule.normalize();

        // Jan 5, 2026 is a Monday.
        let now = fixed_time(5, 8, 0);
        let action = schedule.current_action(now).unwrap();

        assert_eq!(
            action,
            ScheduleAction {
                mode: Some(Mode::Heat),
                preset: Preset::Away,
            }
        );
    }

    #[test]
    fn finds_next_event_in_current_week() {
        let mut schedule = Schedule {
            enabled: true,
            entries: vec![
                entry(DayOfWeek::Mon, 18, None, Preset::Home),
                entry(DayOfWeek::Mon, 9, Some(Mode::HeatCool), Preset::Away),
            ],
        };
        schedule.normalize();
        assert_eq!(schedule.entries[0].start_minutes, 9 * 60);

        let now = fixed_time(5, 9, 1);
        let next = schedule.next_event_epoch(now).unwrap();

        assert_eq!(next, fixed_time(5, 18, 0).timestamp());
    }

    #[test]
    fn single_entry_repeats_next_week() {
        let schedule = Schedule {
            enabled: true,
            entries: vec![entry(DayOfWeek::Mon, 9, None, Preset::Away)],
        };

        let now = fixed_time(5, 10, 0);
        assert_eq!(
            schedule.next_event_epoch(now),
            Some(fixed_time(12, 9, 0).timestamp())
        );
    }

    #[test]
    fn disabled_schedule_has_no_action() {
        let schedule = Schedule {
            enabled: false,
            entries: vec![entry(DayOfWeek::Mon, 0, None, Preset::Away)],
        };
        assert_eq!(schedule.current_action(fixed_time(5, 10, 0)), None);
        assert_eq!(schedule.next_event_epoch(fixed_time(5, 10, 0)), None);
    }

    #[test]
    fn action_becomes_partial_control_request() {
        let request = ScheduleAction {
            mode: None,
            preset: Preset::Away,
        }
        .to_request();

        assert_eq!(request.preset, Some(Preset::Away));
        assert_eq!(request.mode, None);
        assert_eq!(request.target_temperature, None);
    }

    #[test]
    fn out_of_range_entries_are_dropped() {
        let mut schedule = Schedule {
            enabled: true,
            entries: vec![ScheduleEntry {
                day: DayOfWeek::Tue,
                start_minutes: 24 * 60,
                mode: None,
                preset: Preset::Home,
            }],
        };
        schedule.normalize();
        assert!(schedule.entries.is_empty());
    }
}
