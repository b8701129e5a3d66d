//! Upstream data collaborators.
//!
//! Both clients are async (reqwest) and are driven by the binary on a
//! current-thread tokio runtime. Each owns its error type; neither retries.

pub mod calendar;
pub mod weather;

pub use calendar::{CalendarError, GoogleCalendar};
pub use weather::{DataHub, WeatherError};
