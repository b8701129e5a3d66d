//! Met Office Weather DataHub site-specific forecast client.
//!
//! Two endpoints are read per run: `three-hourly` for the near-term slots and
//! `daily` for the day/night outlook. The free tier allows 360 calls a day;
//! a 429 is reported as [`WeatherError::RateLimited`] and never retried.
//!
//! Timestamps arrive in UTC (`2024-06-16T12:00Z`) and are converted to local
//! time here, so everything downstream works in local naive time. Daily
//! entries name a calendar day; their samples sit at midday and midnight of
//! that date.

use crate::config::WeatherConfig;
use crate::forecast::{Forecast, WeatherSample};
use chrono::{Duration, Local, NaiveDateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

const DATAHUB_API_BASE: &str = "https://data.hub.api.metoffice.gov.uk/sitespecific/v0/point";

#[derive(Error, Debug)]
pub enum WeatherError {
    #[error("DataHub API key is invalid or expired. Check weather.json and https://datahub.metoffice.gov.uk")]
    UpstreamAuth,

    #[error("DataHub rate limit exceeded (360 requests/day). Try again later.")]
    RateLimited,

    #[error("DataHub API error: {0}")]
    Api(String),

    #[error("DataHub request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Response did not have the expected shape
    #[error("unexpected DataHub response: {0}")]
    Schema(String),
}

#[derive(Debug, Deserialize)]
struct FeatureCollection<T> {
    features: Vec<Feature<T>>,
}

#[derive(Debug, Deserialize)]
struct Feature<T> {
    properties: Properties<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Properties<T> {
    time_series: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreeHourlyEntry {
    time: String,
    significant_weather_code: Option<i32>,
    feels_like_temp: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DailyEntry {
    time: String,
    day_significant_weather_code: Option<i32>,
    night_significant_weather_code: Option<i32>,
    day_max_feels_like_temp: Option<f32>,
    night_min_feels_like_temp: Option<f32>,
}

pub struct DataHub {
    client: reqwest::Client,
    apikey: String,
    lat: f64,
    lon: f64,
    base_url: String,
}

impl DataHub {
    pub fn new(config: &WeatherConfig) -> Self {
        Self::with_base_url(config, DATAHUB_API_BASE)
    }

    pub fn with_base_url(config: &WeatherConfig, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            apikey: config.apikey.clone(),
            lat: config.lat,
            lon: config.lon,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Both series for the configured location.
    pub async fn forecast(&self) -> Result<Forecast, WeatherError> {
        let near_term = self.three_hourly().await?;
        let daily = self.daily().await?;
        tracing::info!(
            "fetched {} three-hourly and {} daily samples",
            near_term.len(),
            daily.len()
        );
        Ok(Forecast { near_term, daily })
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn three_hourly(&self) -> Result<Vec<WeatherSample>, WeatherError> {
        let body = self.get("three-hourly").await?;
        parse_three_hourly(&body)
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn daily(&self) -> Result<Vec<WeatherSample>, WeatherError> {
        let body = self.get("daily").await?;
        parse_daily(&body)
    }

    async fn get(&self, endpoint: &str) -> Result<String, WeatherError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let lat = self.lat.to_string();
        let lon = self.lon.to_string();

        let response = self
            .client
            .get(&url)
            .header("apikey", &self.apikey)
            .query(&[
                ("latitude", lat.as_str()),
                ("longitude", lon.as_str()),
                ("includeLocationName", "true"),
                ("excludeParameterMetadata", "false"),
            ])
            .send()
            .await?;

        let status = response.status();
        match status.as_u16() {
            401 | 403 => Err(WeatherError::UpstreamAuth),
            429 => Err(WeatherError::RateLimited),
            _ if status.is_success() => Ok(response.text().await?),
            _ => {
                let text = response.text().await.unwrap_or_default();
                Err(WeatherError::Api(format!("{}: {}", status, text)))
            }
        }
    }
}

fn time_series<T: DeserializeOwned>(body: &str) -> Result<Vec<T>, WeatherError> {
    let collection: FeatureCollection<T> =
        serde_json::from_str(body).map_err(|e| WeatherError::Schema(e.to_string()))?;
    collection
        .features
        .into_iter()
        .next()
        .map(|feature| feature.properties.time_series)
        .ok_or_else(|| WeatherError::Schema("no features in response".to_string()))
}

/// Near-term samples from a `three-hourly` response body.
pub fn parse_three_hourly(body: &str) -> Result<Vec<WeatherSample>, WeatherError> {
    time_series::<ThreeHourlyEntry>(body)?
        .into_iter()
        .map(|entry| -> Result<WeatherSample, WeatherError> {
            Ok(WeatherSample {
                timestamp: utc_to_local(&entry.time)?,
                code: entry.significant_weather_code,
                feels_like_primary: entry.feels_like_temp,
                feels_like_secondary: None,
            })
        })
        .collect()
}

/// Day/night sample pairs from a `daily` response body.
///
/// Entries without a day weather code (today, once the daytime is over) are
/// skipped. Each remaining entry becomes a day sample at midday of its date
/// followed by a night sample twelve hours later, both carrying the night
/// minimum as secondary.
pub fn parse_daily(body: &str) -> Result<Vec<WeatherSample>, WeatherError> {
    let mut samples = Vec::new();

    for entry in time_series::<DailyEntry>(body)? {
        let Some(day_code) = entry.day_significant_weather_code else {
            tracing::debug!("skipping partial day {}", entry.time);
            continue;
        };

        let timestamp = parse_utc(&entry.time)?
            .date()
            .and_hms_opt(12, 0, 0)
            .ok_or_else(|| WeatherError::Schema(format!("bad day {:?}", entry.time)))?;
        let max = entry
            .day_max_feels_like_temp
            .ok_or_else(|| WeatherError::Schema(format!("{}: no dayMaxFeelsLikeTemp", entry.time)))?;
        let min = entry
            .night_min_feels_like_temp
            .ok_or_else(|| WeatherError::Schema(format!("{}: no nightMinFeelsLikeTemp", entry.time)))?;

        samples.push(WeatherSample {
            timestamp,
            code: Some(day_code),
            feels_like_primary: max,
            feels_like_secondary: Some(min),
        });
        samples.push(WeatherSample {
            timestamp: timestamp + Duration::hours(12),
            code: entry.night_significant_weather_code,
            feels_like_primary: min,
            feels_like_secondary: Some(min),
        });
    }

    Ok(samples)
}

/// `2024-06-16T12:00Z` (seconds optional) as naive UTC.
fn parse_utc(value: &str) -> Result<NaiveDateTime, WeatherError> {
    let trimmed = value.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M"))
        .map_err(|e| WeatherError::Schema(format!("bad time {:?}: {}", value, e)))
}

/// A UTC timestamp as local naive time.
fn utc_to_local(value: &str) -> Result<NaiveDateTime, WeatherError> {
    let naive = parse_utc(value)?;
    Ok(Utc.from_utc_datetime(&naive).with_timezone(&Local).naive_local())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::{ForecastSelector, GlyphTable};
    use chrono::NaiveDate;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn local(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        let utc = NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, 0, 0).unwrap();
        Utc.from_utc_datetime(&utc).with_timezone(&Local).naive_local()
    }

    fn config() -> WeatherConfig {
        WeatherConfig {
            lat: 54.97,
            lon: -1.62,
            apikey: "key-123".to_string(),
        }
    }

    const THREE_HOURLY: &str = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": {
                "location": {"name": "Newcastle"},
                "timeSeries": [
                    {"time": "2024-06-16T12:00Z", "significantWeatherCode": 7, "feelsLikeTemp": 14.2},
                    {"time": "2024-06-16T15:00Z", "feelsLikeTemp": 15.8}
                ]
            }
        }]
    }"#;

    const DAILY: &str = r#"{
        "features": [{
            "properties": {
                "timeSeries": [
                    {"time": "2024-06-16T00:00Z", "nightSignificantWeatherCode": 2, "nightMinFeelsLikeTemp": 7.0},
                    {"time": "2024-06-17T00:00Z", "daySignificantWeatherCode": 3, "nightSignificantWeatherCode": 0,
                     "dayMaxFeelsLikeTemp": 19.5, "nightMinFeelsLikeTemp": 8.1},
                    {"time": "2024-06-18T00:00Z", "daySignificantWeatherCode": 12,
                     "dayMaxFeelsLikeTemp": 16.0, "nightMinFeelsLikeTemp": 9.0}
                ]
            }
        }]
    }"#;

    #[test]
    fn test_parse_three_hourly() {
        let samples = parse_three_hourly(THREE_HOURLY).unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].timestamp, local(2024, 6, 16, 12));
        assert_eq!(samples[0].code, Some(7));
        assert_eq!(samples[0].feels_like_primary, 14.2);
        assert_eq!(samples[0].feels_like_secondary, None);
        // Missing code is "not available"
        assert_eq!(samples[1].code, None);
    }

    #[test]
    fn test_parse_daily_pairs_and_skips_partial_day() {
        let samples = parse_daily(DAILY).unwrap();

        assert_eq!(samples.len(), 4);

        let (day, night) = (&samples[0], &samples[1]);
        assert_eq!(
            day.timestamp,
            NaiveDate::from_ymd_opt(2024, 6, 17).unwrap().and_hms_opt(12, 0, 0).unwrap()
        );
        assert_eq!(day.code, Some(3));
        assert_eq!(day.feels_like_primary, 19.5);
        assert_eq!(day.feels_like_secondary, Some(8.1));
        assert_eq!(night.timestamp, day.timestamp + Duration::hours(12));
        assert_eq!(night.code, Some(0));
        assert_eq!(night.feels_like_secondary, Some(8.1));

        // No night code on the last entry
        assert_eq!(samples[3].code, None);
    }

    #[test]
    fn test_daily_slots_start_tomorrow_morning_and_evening() {
        let table = GlyphTable::meteocons();
        let selector = ForecastSelector::new(&table);
        let today = NaiveDate::from_ymd_opt(2024, 6, 16).unwrap();
        let tomorrow = NaiveDate::from_ymd_opt(2024, 6, 17).unwrap();

        // Morning: today still carries a day forecast
        let morning_body = DAILY.replace(
            r#""nightSignificantWeatherCode": 2,"#,
            r#""daySignificantWeatherCode": 1, "dayMaxFeelsLikeTemp": 21.0, "nightSignificantWeatherCode": 2,"#,
        );
        let morning = parse_daily(&morning_body).unwrap();
        assert_eq!(morning.len(), 6);
        let slots = selector
            .daily(&morning, today.and_hms_opt(8, 0, 0).unwrap())
            .unwrap();
        assert_eq!(slots[0].date.date(), tomorrow);
        assert_eq!(slots[0].max_feels_like, 19.5);

        // Evening: today has dropped out of the series
        let evening = parse_daily(DAILY).unwrap();
        let slots = selector
            .daily(&evening, today.and_hms_opt(20, 0, 0).unwrap())
            .unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].date.date(), tomorrow);
        assert_eq!(slots[1].date.date(), tomorrow + Duration::days(1));
    }

    #[test]
    fn test_schema_errors() {
        assert!(matches!(
            parse_three_hourly(r#"{"features": []}"#),
            Err(WeatherError::Schema(_))
        ));
        assert!(matches!(parse_daily("<html>"), Err(WeatherError::Schema(_))));
        assert!(matches!(
            parse_daily(
                r#"{"features":[{"properties":{"timeSeries":[
                    {"time": "2024-06-17T00:00Z", "daySignificantWeatherCode": 3, "nightMinFeelsLikeTemp": 8.1}
                ]}}]}"#
            ),
            Err(WeatherError::Schema(_))
        ));
        assert!(matches!(
            parse_three_hourly(
                r#"{"features":[{"properties":{"timeSeries":[
                    {"time": "yesterday", "significantWeatherCode": 1, "feelsLikeTemp": 1.0}
                ]}}]}"#
            ),
            Err(WeatherError::Schema(_))
        ));
    }

    #[test]
    fn test_utc_with_seconds() {
        assert_eq!(utc_to_local("2024-06-16T12:00:00Z").unwrap(), local(2024, 6, 16, 12));
    }

    #[tokio::test]
    async fn test_forecast_sends_key_and_location() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/three-hourly"))
            .and(header("apikey", "key-123"))
            .and(query_param("latitude", "54.97"))
            .and(query_param("longitude", "-1.62"))
            .respond_with(ResponseTemplate::new(200).set_body_string(THREE_HOURLY))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/daily"))
            .and(header("apikey", "key-123"))
            .respond_with(ResponseTemplate::new(200).set_body_string(DAILY))
            .mount(&server)
            .await;

        let forecast = DataHub::with_base_url(&config(), &server.uri())
            .forecast()
            .await
            .unwrap();

        assert_eq!(forecast.near_term.len(), 2);
        assert_eq!(forecast.daily.len(), 4);
    }

    #[tokio::test]
    async fn test_status_mapping() {
        fn kind(err: &WeatherError) -> &'static str {
            match err {
                WeatherError::UpstreamAuth => "auth",
                WeatherError::RateLimited => "rate",
                WeatherError::Api(_) => "api",
                _ => "other",
            }
        }

        for (status, expected) in [(401u16, "auth"), (403, "auth"), (429, "rate"), (500, "api")] {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(status))
                .expect(1)
                .mount(&server)
                .await;

            let err = DataHub::with_base_url(&config(), &server.uri())
                .three_hourly()
                .await
                .unwrap_err();
            assert_eq!(kind(&err), expected, "status {} gave {:?}", status, err);
        }
    }
}
