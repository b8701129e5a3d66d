//! # Forecast Slot Selection
//!
//! Maps raw weather samples into the fixed slots of the forecast strip.
//!
//! ## Weather Codes
//! The upstream provider reports one of 31 significant-weather codes (0–30)
//! or "not available". [`WeatherCode`] is that closed set, and
//! [`GlyphTable`] maps every member to a Meteocons glyph. A code outside the
//! set is a [`ForecastError::MissingGlyph`], never a guessed glyph.
//!
//! ## Two Cadences
//! - **Near-term**: three-hourly samples. Only samples strictly after "now"
//!   are used, at most [`NEAR_TERM_SLOTS`] of them.
//! - **Daily**: samples come in day/night pairs. Even positions hold the
//!   daytime aggregate (maximum feels-like), the following odd position
//!   holds the night aggregate (minimum feels-like). Pairs dated today or
//!   earlier are skipped, whether or not the provider still reports today;
//!   then up to [`DAILY_SLOTS`] pairs are shown.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of near-term slots in the strip.
pub const NEAR_TERM_SLOTS: usize = 7;

/// Number of daily slots after the divider.
pub const DAILY_SLOTS: usize = 3;

/// Errors raised while turning samples into slots.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    /// A weather code outside 0–30 / "not available"
    #[error("no glyph for weather code {0}")]
    MissingGlyph(i32),

    /// A glyph table built without an entry for this code
    #[error("glyph table has no entry for {0:?}")]
    IncompleteGlyphTable(WeatherCode),

    /// Daily samples must come in day/night pairs
    #[error("daily forecast has {0} samples; expected day/night pairs")]
    UnpairedDailySample(usize),

    /// A night sample without its minimum feels-like reading
    #[error("night sample at position {0} has no minimum temperature")]
    MissingDailyMinimum(usize),
}

/// Met Office significant-weather categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WeatherCode {
    NotAvailable,
    ClearNight,
    SunnyDay,
    PartlyCloudyNight,
    PartlyCloudyDay,
    NotUsed,
    Mist,
    Fog,
    Cloudy,
    Overcast,
    LightRainShowerNight,
    LightRainShowerDay,
    Drizzle,
    LightRain,
    HeavyRainShowerNight,
    HeavyRainShowerDay,
    HeavyRain,
    SleetShowerNight,
    SleetShowerDay,
    Sleet,
    HailShowerNight,
    HailShowerDay,
    Hail,
    LightSnowShowerNight,
    LightSnowShowerDay,
    LightSnow,
    HeavySnowShowerNight,
    HeavySnowShowerDay,
    HeavySnow,
    ThunderShowerNight,
    ThunderShowerDay,
    Thunder,
}

impl WeatherCode {
    /// Every member, "not available" first, then codes 0–30 in order.
    pub const ALL: [WeatherCode; 32] = [
        WeatherCode::NotAvailable,
        WeatherCode::ClearNight,
        WeatherCode::SunnyDay,
        WeatherCode::PartlyCloudyNight,
        WeatherCode::PartlyCloudyDay,
        WeatherCode::NotUsed,
        WeatherCode::Mist,
        WeatherCode::Fog,
        WeatherCode::Cloudy,
        WeatherCode::Overcast,
        WeatherCode::LightRainShowerNight,
        WeatherCode::LightRainShowerDay,
        WeatherCode::Drizzle,
        WeatherCode::LightRain,
        WeatherCode::HeavyRainShowerNight,
        WeatherCode::HeavyRainShowerDay,
        WeatherCode::HeavyRain,
        WeatherCode::SleetShowerNight,
        WeatherCode::SleetShowerDay,
        WeatherCode::Sleet,
        WeatherCode::HailShowerNight,
        WeatherCode::HailShowerDay,
        WeatherCode::Hail,
        WeatherCode::LightSnowShowerNight,
        WeatherCode::LightSnowShowerDay,
        WeatherCode::LightSnow,
        WeatherCode::HeavySnowShowerNight,
        WeatherCode::HeavySnowShowerDay,
        WeatherCode::HeavySnow,
        WeatherCode::ThunderShowerNight,
        WeatherCode::ThunderShowerDay,
        WeatherCode::Thunder,
    ];

    /// Resolve a raw provider code; `None` is the provider's "not available".
    ///
    /// # Example
    /// ```
    /// use paper_agenda_lib::forecast::{ForecastError, WeatherCode};
    ///
    /// assert_eq!(WeatherCode::from_raw(Some(7)), Ok(WeatherCode::Cloudy));
    /// assert_eq!(WeatherCode::from_raw(None), Ok(WeatherCode::NotAvailable));
    /// assert_eq!(WeatherCode::from_raw(Some(999)), Err(ForecastError::MissingGlyph(999)));
    /// ```
    pub fn from_raw(raw: Option<i32>) -> Result<Self, ForecastError> {
        match raw {
            None => Ok(WeatherCode::NotAvailable),
            Some(code @ 0..=30) => Ok(Self::ALL[code as usize + 1]),
            Some(code) => Err(ForecastError::MissingGlyph(code)),
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    /// Meteocons glyph for this category.
    pub fn meteocon(self) -> char {
        use WeatherCode::*;
        match self {
            NotAvailable | NotUsed => ')',
            ClearNight => 'C',
            SunnyDay => 'B',
            PartlyCloudyNight => 'I',
            PartlyCloudyDay => 'H',
            Mist | Fog => 'M',
            Cloudy => 'N',
            Overcast => 'Y',
            LightRainShowerNight | LightRainShowerDay | Drizzle | LightRain => 'Q',
            HeavyRainShowerNight | HeavyRainShowerDay | HeavyRain => 'R',
            SleetShowerNight | SleetShowerDay | Sleet | HailShowerNight | HailShowerDay | Hail => {
                'X'
            }
            LightSnowShowerNight | LightSnowShowerDay | LightSnow => 'U',
            HeavySnowShowerNight | HeavySnowShowerDay | HeavySnow => 'W',
            ThunderShowerNight | ThunderShowerDay | Thunder => 'P',
        }
    }
}

/// Exhaustive weather-code → glyph mapping.
///
/// Built once per render and passed down explicitly; construction fails if
/// any [`WeatherCode`] lacks a glyph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlyphTable {
    glyphs: [char; 32],
}

impl Default for GlyphTable {
    fn default() -> Self {
        Self::meteocons()
    }
}

impl GlyphTable {
    /// The Meteocons icon-font mapping.
    pub fn meteocons() -> Self {
        let mut glyphs = [')'; 32];
        for code in WeatherCode::ALL {
            glyphs[code.index()] = code.meteocon();
        }
        Self { glyphs }
    }

    /// Build a table from explicit entries; every code must be covered.
    pub fn from_entries<I>(entries: I) -> Result<Self, ForecastError>
    where
        I: IntoIterator<Item = (WeatherCode, char)>,
    {
        let mut slots: [Option<char>; 32] = [None; 32];
        for (code, glyph) in entries {
            slots[code.index()] = Some(glyph);
        }

        let mut glyphs = [' '; 32];
        for code in WeatherCode::ALL {
            glyphs[code.index()] = slots[code.index()].ok_or(ForecastError::IncompleteGlyphTable(code))?;
        }
        Ok(Self { glyphs })
    }

    pub fn glyph(&self, code: WeatherCode) -> char {
        self.glyphs[code.index()]
    }

    /// Glyph for a raw provider code.
    pub fn lookup(&self, raw: Option<i32>) -> Result<char, ForecastError> {
        WeatherCode::from_raw(raw).map(|code| self.glyph(code))
    }
}

/// One reading from the weather provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeatherSample {
    /// Local time the sample applies to
    pub timestamp: NaiveDateTime,
    /// Provider code; `None` when the provider reports "not available"
    pub code: Option<i32>,
    /// Feels-like temperature (°C); the maximum for daily samples
    pub feels_like_primary: f32,
    /// Minimum feels-like temperature, daily samples only
    pub feels_like_secondary: Option<f32>,
}

/// Both forecast series as delivered by the weather collaborator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    /// Three-hourly samples, ascending
    pub near_term: Vec<WeatherSample>,
    /// Daily samples in day/night pairs, ascending
    pub daily: Vec<WeatherSample>,
}

/// A near-term slot: time, glyph, temperature.
#[derive(Clone, Debug, PartialEq)]
pub struct NearTermSlot {
    pub time: NaiveDateTime,
    pub glyph: char,
    pub feels_like: f32,
}

impl NearTermSlot {
    pub fn time_label(&self) -> String {
        self.time.format("%H:%M").to_string()
    }

    pub fn temperature_label(&self) -> String {
        format!("{}°C", whole_degrees(self.feels_like))
    }
}

/// A daily slot built from one day/night pair.
#[derive(Clone, Debug, PartialEq)]
pub struct DailySlot {
    pub date: NaiveDateTime,
    pub glyph: char,
    pub max_feels_like: f32,
    pub min_feels_like: f32,
}

impl DailySlot {
    pub fn weekday_label(&self) -> String {
        self.date.format("%a").to_string()
    }

    pub fn max_label(&self) -> String {
        format!("{}°", whole_degrees(self.max_feels_like))
    }

    pub fn min_label(&self) -> String {
        format!("{}°", whole_degrees(self.min_feels_like))
    }
}

/// Round to whole degrees, never printing "-0".
fn whole_degrees(value: f32) -> String {
    let rounded = value.round();
    if rounded == 0.0 {
        "0".to_string()
    } else {
        format!("{:.0}", rounded)
    }
}

/// Display-ready forecast strip content.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ForecastSlots {
    pub near_term: Vec<NearTermSlot>,
    pub daily: Vec<DailySlot>,
}

/// Selects and formats samples into forecast slots.
#[derive(Clone, Copy, Debug)]
pub struct ForecastSelector<'a> {
    glyphs: &'a GlyphTable,
    near_term_slots: usize,
    daily_slots: usize,
}

impl<'a> ForecastSelector<'a> {
    pub fn new(glyphs: &'a GlyphTable) -> Self {
        Self {
            glyphs,
            near_term_slots: NEAR_TERM_SLOTS,
            daily_slots: DAILY_SLOTS,
        }
    }

    /// Slots for the strip, or `None` when weather is disabled/unavailable.
    pub fn select(
        &self,
        forecast: Option<&Forecast>,
        now: NaiveDateTime,
    ) -> Result<Option<ForecastSlots>, ForecastError> {
        let Some(forecast) = forecast else {
            return Ok(None);
        };

        Ok(Some(ForecastSlots {
            near_term: self.near_term(&forecast.near_term, now)?,
            daily: self.daily(&forecast.daily, now)?,
        }))
    }

    /// Future samples only, capped at the slot count.
    pub fn near_term(
        &self,
        samples: &[WeatherSample],
        now: NaiveDateTime,
    ) -> Result<Vec<NearTermSlot>, ForecastError> {
        samples
            .iter()
            .filter(|sample| sample.timestamp > now)
            .take(self.near_term_slots)
            .map(|sample| -> Result<NearTermSlot, ForecastError> {
                Ok(NearTermSlot {
                    time: sample.timestamp,
                    glyph: self.glyphs.lookup(sample.code)?,
                    feels_like: sample.feels_like_primary,
                })
            })
            .collect()
    }

    /// Day/night pairs after today: glyph and maximum from the day, minimum
    /// from the night.
    pub fn daily(
        &self,
        samples: &[WeatherSample],
        now: NaiveDateTime,
    ) -> Result<Vec<DailySlot>, ForecastError> {
        if samples.len() % 2 != 0 {
            return Err(ForecastError::UnpairedDailySample(samples.len()));
        }

        let today = now.date();
        samples
            .chunks_exact(2)
            .enumerate()
            .filter(|(_, chunk)| chunk[0].timestamp.date() > today)
            .take(self.daily_slots)
            .map(|(pair, chunk)| -> Result<DailySlot, ForecastError> {
                let (day, night) = (&chunk[0], &chunk[1]);
                let min_feels_like = night
                    .feels_like_secondary
                    .ok_or(ForecastError::MissingDailyMinimum(pair * 2 + 1))?;

                Ok(DailySlot {
                    date: day.timestamp,
                    glyph: self.glyphs.lookup(day.code)?,
                    max_feels_like: day.feels_like_primary,
                    min_feels_like,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 16)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn sample(offset_hours: i64, code: Option<i32>, temp: f32) -> WeatherSample {
        WeatherSample {
            timestamp: now() + Duration::hours(offset_hours),
            code,
            feels_like_primary: temp,
            feels_like_secondary: None,
        }
    }

    fn daily_series(days: usize) -> Vec<WeatherSample> {
        let mut series = Vec::new();
        for day in 0..days as i64 {
            series.push(WeatherSample {
                timestamp: now() + Duration::days(day),
                code: Some(1),
                feels_like_primary: 20.0 + day as f32,
                feels_like_secondary: Some(8.0),
            });
            series.push(WeatherSample {
                timestamp: now() + Duration::days(day) + Duration::hours(12),
                code: Some(0),
                feels_like_primary: 8.0,
                feels_like_secondary: Some(5.0 + day as f32),
            });
        }
        series
    }

    #[test]
    fn test_every_known_code_has_a_glyph() {
        let table = GlyphTable::meteocons();
        assert!(table.lookup(None).is_ok());
        for code in 0..=30 {
            assert!(table.lookup(Some(code)).is_ok(), "code {}", code);
        }
    }

    #[test]
    fn test_cloudy_and_unknown_codes() {
        let table = GlyphTable::meteocons();
        assert_eq!(table.lookup(Some(7)), Ok('N'));
        assert_eq!(table.lookup(Some(999)), Err(ForecastError::MissingGlyph(999)));
        assert_eq!(table.lookup(Some(-1)), Err(ForecastError::MissingGlyph(-1)));
        assert_eq!(table.lookup(Some(31)), Err(ForecastError::MissingGlyph(31)));
    }

    #[test]
    fn test_glyph_table_rejects_missing_entries() {
        let partial = WeatherCode::ALL
            .iter()
            .filter(|code| **code != WeatherCode::Thunder)
            .map(|code| (*code, code.meteocon()));

        assert_eq!(
            GlyphTable::from_entries(partial),
            Err(ForecastError::IncompleteGlyphTable(WeatherCode::Thunder))
        );

        let full = WeatherCode::ALL.iter().map(|code| (*code, code.meteocon()));
        assert_eq!(GlyphTable::from_entries(full), Ok(GlyphTable::meteocons()));
    }

    #[test]
    fn test_near_term_filters_past_and_caps_slots() {
        let table = GlyphTable::meteocons();
        let selector = ForecastSelector::new(&table);
        let samples: Vec<_> = (-3..12).map(|h| sample(h * 3, Some(1), h as f32)).collect();

        let slots = selector.near_term(&samples, now()).unwrap();

        assert_eq!(slots.len(), NEAR_TERM_SLOTS);
        assert!(slots.iter().all(|slot| slot.time > now()));
        assert_eq!(slots[0].time, now() + Duration::hours(3));
    }

    #[test]
    fn test_sample_at_now_is_excluded() {
        let table = GlyphTable::meteocons();
        let selector = ForecastSelector::new(&table);
        let samples = vec![sample(0, Some(1), 10.0), sample(3, Some(7), 11.0)];

        let slots = selector.near_term(&samples, now()).unwrap();

        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].glyph, 'N');
    }

    #[test]
    fn test_near_term_unknown_code_is_fatal() {
        let table = GlyphTable::meteocons();
        let selector = ForecastSelector::new(&table);
        let samples = vec![sample(3, Some(999), 10.0)];

        assert_eq!(
            selector.near_term(&samples, now()),
            Err(ForecastError::MissingGlyph(999))
        );
    }

    #[test]
    fn test_daily_pairs_skip_today() {
        let table = GlyphTable::meteocons();
        let selector = ForecastSelector::new(&table);

        let slots = selector.daily(&daily_series(5), now()).unwrap();

        assert_eq!(slots.len(), DAILY_SLOTS);
        assert_eq!(slots[0].date, now() + Duration::days(1));
        assert_eq!(slots[0].max_feels_like, 21.0);
        assert_eq!(slots[0].min_feels_like, 6.0);
        assert_eq!(slots[0].glyph, 'B');
        assert_eq!(slots[2].max_feels_like, 23.0);
    }

    #[test]
    fn test_evening_series_without_today_starts_tomorrow() {
        let table = GlyphTable::meteocons();
        let selector = ForecastSelector::new(&table);
        // After today's daytime the provider no longer reports today
        let series = daily_series(5).split_off(2);
        let evening = now() + Duration::hours(9);

        let slots = selector.daily(&series, evening).unwrap();

        assert_eq!(slots.len(), DAILY_SLOTS);
        assert_eq!(slots[0].date.date(), evening.date() + Duration::days(1));
        assert_eq!(slots[0].max_feels_like, 21.0);
        assert_eq!(slots[2].date.date(), evening.date() + Duration::days(3));
    }

    #[test]
    fn test_morning_and_evening_series_agree() {
        let table = GlyphTable::meteocons();
        let selector = ForecastSelector::new(&table);
        let morning = selector.daily(&daily_series(5), now()).unwrap();
        let evening = selector
            .daily(&daily_series(5).split_off(2), now() + Duration::hours(9))
            .unwrap();

        assert_eq!(morning, evening);
    }

    #[test]
    fn test_short_daily_series_yields_fewer_slots() {
        let table = GlyphTable::meteocons();
        let selector = ForecastSelector::new(&table);
        assert_eq!(selector.daily(&daily_series(2), now()).unwrap().len(), 1);
        assert!(selector.daily(&[], now()).unwrap().is_empty());
    }

    #[test]
    fn test_odd_daily_series_is_error() {
        let table = GlyphTable::meteocons();
        let selector = ForecastSelector::new(&table);
        let mut series = daily_series(3);
        series.pop();

        assert_eq!(
            selector.daily(&series, now()),
            Err(ForecastError::UnpairedDailySample(5))
        );
    }

    #[test]
    fn test_night_without_minimum_is_error() {
        let table = GlyphTable::meteocons();
        let selector = ForecastSelector::new(&table);
        let mut series = daily_series(2);
        series[3].feels_like_secondary = None;

        assert_eq!(
            selector.daily(&series, now()),
            Err(ForecastError::MissingDailyMinimum(3))
        );
    }

    #[test]
    fn test_absent_forecast_selects_nothing() {
        let table = GlyphTable::meteocons();
        let selector = ForecastSelector::new(&table);
        assert_eq!(selector.select(None, now()), Ok(None));
    }

    #[test]
    fn test_slot_labels() {
        let slot = NearTermSlot {
            time: now() + Duration::hours(3),
            glyph: 'B',
            feels_like: 12.4,
        };
        assert_eq!(slot.time_label(), "13:00");
        assert_eq!(slot.temperature_label(), "12°C");

        let daily = DailySlot {
            date: now(),
            glyph: 'B',
            max_feels_like: 19.6,
            min_feels_like: -2.0,
        };
        assert_eq!(daily.weekday_label(), "Sun");
        assert_eq!(daily.max_label(), "20°");
        assert_eq!(daily.min_label(), "-2°");
    }

    #[test]
    fn test_labels_never_show_negative_zero() {
        let slot = NearTermSlot {
            time: now(),
            glyph: 'B',
            feels_like: -0.3,
        };
        assert_eq!(slot.temperature_label(), "0°C");

        let daily = DailySlot {
            date: now(),
            glyph: 'B',
            max_feels_like: -0.0,
            min_feels_like: -0.49,
        };
        assert_eq!(daily.max_label(), "0°");
        assert_eq!(daily.min_label(), "0°");
        assert_eq!(whole_degrees(-0.6), "-1");
    }
}
