//! # Agenda Aggregation
//!
//! Turns the flat, time-sorted event list from the calendar collaborator into
//! the ordered [`Day`] groups shown in the agenda column.
//!
//! ## Grouping Rules
//! - A new group opens whenever an event starts on a different date than the
//!   group currently open
//! - Before a group opens, its distance from today is checked; once a date is
//!   more than `lookahead_days` away, aggregation stops for good. The input
//!   is already sorted, so nothing after that point can be closer
//! - Events keep their input order inside a group; the aggregator never sorts
//! - No day is invented for dates without events
//!
//! ## Labels
//! "Today", "Tomorrow", or a long form such as "Wednesday 21st October".

use crate::{Day, Event, EventTime};
use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime};
use thiserror::Error;

/// Default number of days ahead that events are shown for.
pub const DEFAULT_LOOKAHEAD_DAYS: u32 = 7;

/// Errors raised while building events from raw calendar data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgendaError {
    /// A timestamp was neither a date nor a date-time
    #[error("cannot parse timestamp {value:?}: {reason}")]
    Parse { value: String, reason: String },
}

impl EventTime {
    /// Parse a calendar endpoint.
    ///
    /// Accepts `YYYY-MM-DD` for all-day endpoints, RFC 3339 date-times (the
    /// offset is converted to local time) and offset-less
    /// `YYYY-MM-DDTHH:MM:SS` values, which are taken as local already.
    ///
    /// # Example
    /// ```
    /// use paper_agenda_lib::EventTime;
    ///
    /// assert!(matches!(EventTime::parse("2024-06-16"), Ok(EventTime::Date(_))));
    /// assert!(matches!(EventTime::parse("2024-06-16T09:30:00"), Ok(EventTime::DateTime(_))));
    /// assert!(EventTime::parse("next tuesday").is_err());
    /// ```
    pub fn parse(value: &str) -> Result<Self, AgendaError> {
        let value = value.trim();

        if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            return Ok(EventTime::Date(date));
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Ok(EventTime::DateTime(dt.with_timezone(&Local).naive_local()));
        }

        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
            .map(EventTime::DateTime)
            .map_err(|err| AgendaError::Parse {
                value: value.to_string(),
                reason: err.to_string(),
            })
    }
}

impl Event {
    /// Build an event from raw calendar strings.
    pub fn parse(summary: &str, location: &str, start: &str, end: &str) -> Result<Self, AgendaError> {
        Ok(Event {
            summary: summary.to_string(),
            location: location.to_string(),
            start: EventTime::parse(start)?,
            end: EventTime::parse(end)?,
        })
    }
}

/// Groups sorted events into day buckets inside a lookahead window.
#[derive(Clone, Copy, Debug)]
pub struct EventAggregator {
    lookahead_days: u32,
}

impl Default for EventAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_LOOKAHEAD_DAYS)
    }
}

impl EventAggregator {
    pub fn new(lookahead_days: u32) -> Self {
        Self { lookahead_days }
    }

    pub fn lookahead_days(&self) -> u32 {
        self.lookahead_days
    }

    /// Group `events` (ascending by start) into days relative to `today`.
    ///
    /// A date exactly `lookahead_days` after `today` is still included; the
    /// first date beyond it ends aggregation.
    ///
    /// # Example
    /// ```
    /// use chrono::NaiveDate;
    /// use paper_agenda_lib::{agenda::EventAggregator, Event};
    ///
    /// let today = NaiveDate::from_ymd_opt(2024, 6, 16).unwrap();
    /// let events = vec![
    ///     Event::parse("Standup", "", "2024-06-16T09:00:00", "2024-06-16T09:15:00").unwrap(),
    ///     Event::parse("Lunch", "", "2024-06-16T12:00:00", "2024-06-16T13:00:00").unwrap(),
    ///     Event::parse("Gym", "", "2024-06-17T18:00:00", "2024-06-17T19:00:00").unwrap(),
    /// ];
    ///
    /// let days = EventAggregator::new(7).aggregate(events, today);
    /// assert_eq!(days.len(), 2);
    /// assert_eq!(days[0].label, "Today");
    /// assert_eq!(days[1].label, "Tomorrow");
    /// ```
    pub fn aggregate<I>(&self, events: I, today: NaiveDate) -> Vec<Day>
    where
        I: IntoIterator<Item = Event>,
    {
        let mut days: Vec<Day> = Vec::new();

        for event in events {
            let date = event.start.date();

            match days.last_mut() {
                Some(open) if open.date == date => open.events.push(event),
                _ => {
                    let gap = (date - today).num_days();
                    if gap > i64::from(self.lookahead_days) {
                        tracing::debug!(
                            "stopping at {} ({} days out, window is {})",
                            date,
                            gap,
                            self.lookahead_days
                        );
                        break;
                    }

                    days.push(Day {
                        date,
                        label: day_label(date, today),
                        events: vec![event],
                    });
                }
            }
        }

        days
    }
}

/// Heading for a day group.
pub fn day_label(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        return "Today".to_string();
    }
    if date == today + Duration::days(1) {
        return "Tomorrow".to_string();
    }

    format!(
        "{}{} {}",
        date.format("%A %-d"),
        ordinal_suffix(date.day()),
        date.format("%B")
    )
}

/// English ordinal suffix for a day of the month.
pub fn ordinal_suffix(day: u32) -> &'static str {
    if (11..=13).contains(&day) {
        return "th";
    }
    match day % 10 {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    }
}
