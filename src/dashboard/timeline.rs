//! Timeline slider.
//!
//! Maps a fixed step quantum onto integer slider positions between the start date
//! (position 0) and `floor((end - start) / step)`. Every quantum is a whole number of
//! days, so calendar dates are exact.

use crate::error::{AppError, Result};
use chrono::{Duration, NaiveDate};
use std::fmt;
use std::str::FromStr;

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimelineStep {
    #[default]
    Day,
    Week,
    /// 30 days.
    Month,
    /// 90 days.
    Quarter,
}

impl TimelineStep {
    pub const ALL: [TimelineStep; 4] = [
        TimelineStep::Day,
        TimelineStep::Week,
        TimelineStep::Month,
        TimelineStep::Quarter,
    ];

    pub fn days(&self) -> i64 {
        match self {
            TimelineStep::Day => 1,
            TimelineStep::Week => 7,
            TimelineStep::Month => 30,
            TimelineStep::Quarter => 90,
        }
    }

    pub fn step_ms(&self) -> i64 {
        self.days() * MS_PER_DAY
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimelineStep::Day => "day",
            TimelineStep::Week => "week",
            TimelineStep::Month => "month",
            TimelineStep::Quarter => "quarter",
        }
    }
}

impl fmt::Display for TimelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimelineStep {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        TimelineStep::ALL
            .into_iter()
            .find(|step| step.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                AppError::Cli(format!(
                    "unknown timeline step '{}' (expected day, week, month or quarter)",
                    s
                ))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeline {
    start: NaiveDate,
    end: NaiveDate,
    step: TimelineStep,
    current: NaiveDate,
}

impl Timeline {
    pub fn new(start: NaiveDate, end: NaiveDate, step: TimelineStep) -> Result<Self> {
        if end < start {
            return Err(AppError::Config(format!(
                "timeline ends ({}) before it starts ({})",
                end, start
            )));
        }
        Ok(Self {
            start,
            end,
            step,
            current: start,
        })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn step(&self) -> TimelineStep {
        self.step
    }

    /// Changes the quantum; the current date is kept.
    pub fn set_step(&mut self, step: TimelineStep) {
        self.step = step;
    }

    pub fn current_date(&self) -> NaiveDate {
        self.current
    }

    pub fn total_steps(&self) -> u32 {
        ((self.end - self.start).num_days() / self.step.days()) as u32
    }

    /// Date of a slider position; the position is clamped into `[0, total_steps]`.
    pub fn date_at(&self, position: u32) -> NaiveDate {
        let position = position.min(self.total_steps());
        self.start + Duration::days(i64::from(position) * self.step.days())
    }

    /// Slider position of a date, rounded down and clamped into `[0, total_steps]`.
    pub fn position_of(&self, date: NaiveDate) -> u32 {
        let steps = (date - self.start).num_days().div_euclid(self.step.days());
        steps.clamp(0, i64::from(self.total_steps())) as u32
    }

    pub fn position(&self) -> u32 {
        self.position_of(self.current)
    }

    /// Percentage of the slider track that lies before the thumb.
    pub fn progress(&self) -> f64 {
        match self.total_steps() {
            0 => 0.0,
            total => f64::from(self.position()) / f64::from(total) * 100.0,
        }
    }

    /// Moves the slider and returns the date to publish.
    pub fn set_position(&mut self, position: u32) -> NaiveDate {
        self.current = self.date_at(position);
        self.current
    }

    /// Follows a date chosen elsewhere (e.g. a chart click) without clamping it.
    pub fn sync_to(&mut self, date: NaiveDate) {
        self.current = date;
    }

    /// One step back; `None` at the start.
    pub fn previous(&mut self) -> Option<NaiveDate> {
        match self.position() {
            0 => None,
            position => Some(self.set_position(position - 1)),
        }
    }

    /// One step forward; `None` at the end.
    pub fn next(&mut self) -> Option<NaiveDate> {
        let position = self.position();
        if position >= self.total_steps() {
            return None;
        }
        Some(self.set_position(position + 1))
    }

    pub fn go_to_start(&mut self) -> NaiveDate {
        self.current = self.start;
        self.current
    }

    /// Jumps to the exact end date, which may lie past the last whole step.
    pub fn go_to_end(&mut self) -> NaiveDate {
        self.current = self.end;
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn two_years(step: TimelineStep) -> Timeline {
        Timeline::new(date(2020, 1, 1), date(2021, 12, 31), step).unwrap()
    }

    #[rstest]
    #[case(TimelineStep::Day, 730)]
    #[case(TimelineStep::Week, 104)]
    #[case(TimelineStep::Month, 24)]
    #[case(TimelineStep::Quarter, 8)]
    fn total_steps_per_quantum(#[case] step: TimelineStep, #[case] expected: u32) {
        assert_eq!(two_years(step).total_steps(), expected);
    }

    #[test]
    fn monthly_boundaries() {
        let timeline = two_years(TimelineStep::Month);
        assert_eq!(timeline.date_at(0), date(2020, 1, 1));
        // 24 * 30 days from the start, short of the end date
        assert_eq!(timeline.date_at(24), date(2021, 12, 21));
        assert_eq!(timeline.date_at(500), date(2021, 12, 21));
        assert_eq!(TimelineStep::Month.step_ms(), 2_592_000_000);
    }

    #[rstest]
    #[case(TimelineStep::Day)]
    #[case(TimelineStep::Week)]
    #[case(TimelineStep::Month)]
    #[case(TimelineStep::Quarter)]
    fn positions_round_trip(#[case] step: TimelineStep) {
        let timeline = two_years(step);
        for position in 0..=timeline.total_steps() {
            let d = timeline.date_at(position);
            assert_eq!(d, timeline.start() + Duration::days(i64::from(position) * step.days()));
            assert_eq!(timeline.position_of(d), position);
        }
    }

    #[test]
    fn position_of_rounds_down_and_clamps() {
        let timeline = two_years(TimelineStep::Week);
        assert_eq!(timeline.position_of(date(2020, 1, 13)), 1);
        assert_eq!(timeline.position_of(date(2019, 6, 1)), 0);
        assert_eq!(timeline.position_of(date(2030, 1, 1)), 104);
    }

    #[test]
    fn navigation_stops_at_the_ends() {
        let mut timeline = two_years(TimelineStep::Quarter);
        assert_eq!(timeline.previous(), None);
        assert_eq!(timeline.next(), Some(date(2020, 3, 31)));
        assert_eq!(timeline.previous(), Some(date(2020, 1, 1)));

        assert_eq!(timeline.go_to_end(), date(2021, 12, 31));
        assert_eq!(timeline.position(), 8);
        assert_eq!(timeline.next(), None);
        assert_eq!(timeline.progress(), 100.0);

        assert_eq!(timeline.go_to_start(), date(2020, 1, 1));
        assert_eq!(timeline.progress(), 0.0);
    }

    #[test]
    fn synced_date_drives_the_thumb() {
        let mut timeline = two_years(TimelineStep::Month);
        timeline.sync_to(date(2021, 1, 15));
        assert_eq!(timeline.current_date(), date(2021, 1, 15));
        assert_eq!(timeline.position(), 12);
        assert_eq!(timeline.progress(), 50.0);

        timeline.set_step(TimelineStep::Day);
        assert_eq!(timeline.current_date(), date(2021, 1, 15));
        assert_eq!(timeline.total_steps(), 730);
    }

    #[test]
    fn rejects_inverted_range_and_unknown_steps() {
        assert!(matches!(
            Timeline::new(date(2021, 1, 1), date(2020, 1, 1), TimelineStep::Day),
            Err(AppError::Config(_))
        ));
        assert_eq!("Quarter".parse::<TimelineStep>().unwrap(), TimelineStep::Quarter);
        assert!("fortnight".parse::<TimelineStep>().is_err());
    }
}
