//! # Paper Agenda Core Library
//!
//! This library composes a two-plane (black/red) dashboard frame for a
//! 7.5" HD e-paper panel (880×528). A frame combines three things:
//!
//! - a short-range **agenda** of calendar events grouped by day,
//! - a **forecast strip** of near-term and daily weather slots,
//! - a **mini calendar** of the current month.
//!
//! ## Pipeline
//!
//! The binary runs the pipeline once per invocation, usually from a timer:
//!
//! 1. **Fetch**: calendar events and weather samples come from the
//!    collaborators in [`sources`]
//! 2. **Aggregate**: [`agenda::EventAggregator`] groups events into [`Day`]s
//!    inside the lookahead window
//! 3. **Select**: [`forecast::ForecastSelector`] turns samples into slots
//! 4. **Cache check**: [`cache::ChangeCache`] decides whether the agenda
//!    changed since the last refresh, so an identical agenda does not cost a
//!    full e-paper refresh cycle
//! 5. **Render**: [`renderer::FrameRenderer`] lays out a [`frame::Frame`]
//! 6. **Output**: PBM files, or the panel driver in [`epd7in5b_hd`]; only
//!    then is the new agenda recorded in the cache
//!
//! ## Core Types
//!
//! - [`EventTime`]: a date-only or precise endpoint of an event
//! - [`Event`]: a single calendar entry
//! - [`Day`]: the events falling on one calendar date, with its display label

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

// Module declarations
pub mod agenda;
pub mod cache;
pub mod config;
pub mod epd7in5b_hd;
pub mod forecast;
pub mod frame;
pub mod renderer;
pub mod sources;

/// One endpoint of a calendar event.
///
/// Calendar services report all-day events with date-only endpoints and
/// everything else with a precise local date-time.
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use paper_agenda_lib::EventTime;
///
/// let day = NaiveDate::from_ymd_opt(2024, 6, 16).unwrap();
/// let start = EventTime::Date(day);
/// assert_eq!(start.date(), day);
/// assert!(start.is_midnight());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventTime {
    /// Date-only endpoint, implying midnight
    Date(NaiveDate),
    /// Precise local date-time
    DateTime(NaiveDateTime),
}

impl EventTime {
    /// Calendar date of this endpoint.
    pub fn date(&self) -> NaiveDate {
        match self {
            EventTime::Date(date) => *date,
            EventTime::DateTime(dt) => dt.date(),
        }
    }

    /// This endpoint as a local date-time (date-only endpoints at midnight).
    pub fn as_datetime(&self) -> NaiveDateTime {
        match self {
            EventTime::Date(date) => date.and_time(NaiveTime::MIN),
            EventTime::DateTime(dt) => *dt,
        }
    }

    /// True when the endpoint sits exactly on midnight.
    pub fn is_midnight(&self) -> bool {
        self.as_datetime().time() == NaiveTime::MIN
    }
}

/// A single calendar entry.
///
/// Events are immutable once built and owned by the [`Day`] that holds them.
/// Equality is structural, which is what the change cache compares.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Title shown on the agenda line
    pub summary: String,
    /// Free-text location (empty when the calendar has none)
    pub location: String,
    /// Start of the event
    pub start: EventTime,
    /// End of the event
    pub end: EventTime,
}

impl Event {
    /// Calendars carry no explicit all-day flag: an all-day event simply
    /// starts and ends at midnight.
    pub fn is_all_day(&self) -> bool {
        self.start.is_midnight() && self.end.is_midnight()
    }
}

/// The events that start on one calendar date.
///
/// `label` is computed once during aggregation ("Today", "Tomorrow" or
/// e.g. "Wednesday 21st October") so the renderer never needs the clock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Day {
    /// Date shared by every event in `events`
    pub date: NaiveDate,
    /// Human-readable heading for the agenda column
    pub label: String,
    /// Events in chronological order
    pub events: Vec<Event>,
}
