//! Google Calendar REST client.
//!
//! Only reads: resolve calendar names to IDs, then list upcoming single
//! events. The OAuth access token is obtained elsewhere and read from a file;
//! an absent token or a 401 is reported as [`CalendarError::Auth`].

use crate::agenda::AgendaError;
use crate::Event;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::instrument;

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Events requested per calendar
pub const MAX_RESULTS_PER_CALENDAR: u32 = 10;

#[derive(Error, Debug)]
pub enum CalendarError {
    /// Token missing, unreadable or rejected
    #[error("calendar authorisation failed: {0}")]
    Auth(String),

    #[error("calendar API error: {0}")]
    Api(String),

    #[error("calendar request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// An event came back with endpoints that do not parse
    #[error("bad event from calendar API: {0}")]
    Event(#[from] AgendaError),
}

#[derive(Debug, Deserialize)]
struct CalendarListResponse {
    #[serde(default)]
    items: Vec<CalendarListEntry>,
}

/// One calendar visible to the account.
#[derive(Debug, Clone, Deserialize)]
pub struct CalendarListEntry {
    pub id: String,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Deserialize)]
struct EventListResponse {
    #[serde(default)]
    items: Vec<ApiEvent>,
}

#[derive(Debug, Deserialize)]
struct ApiEvent {
    summary: Option<String>,
    location: Option<String>,
    start: ApiEventTime,
    end: ApiEventTime,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventTime {
    date: Option<String>,
    date_time: Option<String>,
}

impl ApiEventTime {
    fn value(&self) -> &str {
        self.date_time
            .as_deref()
            .or(self.date.as_deref())
            .unwrap_or_default()
    }
}

pub struct GoogleCalendar {
    client: reqwest::Client,
    access_token: String,
    base_url: String,
}

impl GoogleCalendar {
    pub fn new(access_token: &str) -> Self {
        Self::with_base_url(access_token, CALENDAR_API_BASE)
    }

    pub fn with_base_url(access_token: &str, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            access_token: access_token.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Build a client from a token file: either a bare token or a JSON
    /// credentials file carrying a `token` / `access_token` field.
    pub fn from_token_file(path: &Path) -> Result<Self, CalendarError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| CalendarError::Auth(format!("cannot read {}: {}", path.display(), e)))?;
        let token = parse_token(&contents)
            .ok_or_else(|| CalendarError::Auth(format!("no access token in {}", path.display())))?;
        Ok(Self::new(&token))
    }

    /// All calendars on the account.
    #[instrument(skip(self), level = "debug")]
    pub async fn list_calendars(&self) -> Result<Vec<CalendarListEntry>, CalendarError> {
        let url = format!("{}/users/me/calendarList", self.base_url);
        let resp: CalendarListResponse = self.get_json(&url, &[]).await?;
        Ok(resp.items)
    }

    /// Up to [`MAX_RESULTS_PER_CALENDAR`] upcoming events of one calendar.
    #[instrument(skip(self), level = "debug")]
    pub async fn upcoming_events(
        &self,
        calendar_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, CalendarError> {
        let url = format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(calendar_id)
        );
        let time_min = now.to_rfc3339_opts(SecondsFormat::Secs, true);
        let max_results = MAX_RESULTS_PER_CALENDAR.to_string();
        let query = [
            ("timeMin", time_min.as_str()),
            ("maxResults", max_results.as_str()),
            ("singleEvents", "true"),
            ("orderBy", "startTime"),
        ];

        let resp: EventListResponse = self.get_json(&url, &query).await?;
        resp.items.into_iter().map(to_event).collect()
    }

    /// Events from every named calendar, merged in start order.
    pub async fn fetch(&self, names: &str, now: DateTime<Utc>) -> Result<Vec<Event>, CalendarError> {
        let calendars = self.list_calendars().await?;
        for calendar in &calendars {
            tracing::debug!("calendar in account: {} ({})", calendar.id, calendar.summary);
        }

        let mut events = Vec::new();
        for id in select_ids(names, &calendars) {
            events.extend(self.upcoming_events(&id, now).await?);
        }
        sort_events(&mut events);

        tracing::info!("fetched {} calendar events", events.len());
        Ok(events)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, CalendarError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| CalendarError::Api(format!("JSON parse error: {}", e)))
        } else if status.as_u16() == 401 {
            Err(CalendarError::Auth("token rejected or expired".to_string()))
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(CalendarError::Api(format!("{}: {}", status, text)))
        }
    }
}

/// Token from a bare-token file or a JSON credentials file.
fn parse_token(contents: &str) -> Option<String> {
    let contents = contents.trim();
    if contents.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(contents).ok()?;
        return ["token", "access_token"]
            .iter()
            .find_map(|key| value.get(key)?.as_str())
            .map(str::to_string);
    }
    (!contents.is_empty()).then(|| contents.to_string())
}

/// Map comma-separated calendar names to IDs. `primary` needs no lookup;
/// names not found on the account are skipped.
pub fn select_ids(names: &str, calendars: &[CalendarListEntry]) -> Vec<String> {
    let mut ids = Vec::new();
    for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        if name == "primary" {
            ids.push("primary".to_string());
            continue;
        }
        match calendars.iter().find(|c| c.summary == name) {
            Some(calendar) => ids.push(calendar.id.clone()),
            None => tracing::warn!("no calendar named {:?}, skipping", name),
        }
    }
    ids
}

fn to_event(api: ApiEvent) -> Result<Event, CalendarError> {
    let event = Event::parse(
        api.summary.as_deref().unwrap_or("No summary"),
        api.location.as_deref().unwrap_or_default(),
        api.start.value(),
        api.end.value(),
    )?;
    Ok(event)
}

/// Stable sort by start; all-day events sort at midnight.
pub fn sort_events(events: &mut [Event]) {
    events.sort_by_key(|event| event.start.as_datetime());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventTime;
    use chrono::NaiveDate;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entry(id: &str, summary: &str) -> CalendarListEntry {
        CalendarListEntry {
            id: id.to_string(),
            summary: summary.to_string(),
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-16T07:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_select_ids() {
        let calendars = [entry("abc@group.calendar.google.com", "Work"), entry("me@example.com", "Me")];

        assert_eq!(select_ids("primary", &calendars), ["primary"]);
        assert_eq!(
            select_ids("primary, Work,Missing", &calendars),
            ["primary", "abc@group.calendar.google.com"]
        );
        assert!(select_ids("", &calendars).is_empty());
    }

    #[test]
    fn test_parse_token() {
        assert_eq!(parse_token("ya29.abc\n"), Some("ya29.abc".to_string()));
        assert_eq!(
            parse_token(r#"{"token": "ya29.json", "refresh_token": "r"}"#),
            Some("ya29.json".to_string())
        );
        assert_eq!(
            parse_token(r#"{"access_token": "ya29.other"}"#),
            Some("ya29.other".to_string())
        );
        assert_eq!(parse_token(r#"{"refresh_token": "r"}"#), None);
        assert_eq!(parse_token("  \n"), None);
    }

    #[test]
    fn test_missing_token_file_is_auth_error() {
        let dir = TempDir::new().unwrap();
        let err = GoogleCalendar::from_token_file(&dir.path().join("token.json"))
            .err()
            .unwrap();
        assert!(matches!(err, CalendarError::Auth(_)));
    }

    #[test]
    fn test_event_defaults_and_all_day() {
        let api: ApiEvent = serde_json::from_str(
            r#"{"start": {"date": "2024-06-17"}, "end": {"date": "2024-06-18"}}"#,
        )
        .unwrap();

        let event = to_event(api).unwrap();
        assert_eq!(event.summary, "No summary");
        assert_eq!(event.location, "");
        assert!(event.is_all_day());
        assert_eq!(
            event.start,
            EventTime::Date(NaiveDate::from_ymd_opt(2024, 6, 17).unwrap())
        );
    }

    #[test]
    fn test_unparseable_event_is_error() {
        let api: ApiEvent = serde_json::from_str(
            r#"{"summary": "x", "start": {"date": "June"}, "end": {"date": "2024-06-18"}}"#,
        )
        .unwrap();
        assert!(matches!(to_event(api), Err(CalendarError::Event(_))));
    }

    #[tokio::test]
    async fn test_fetch_merges_and_sorts() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/users/me/calendarList"))
            .and(header("Authorization", "Bearer test_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {"id": "me@example.com", "summary": "Me"},
                    {"id": "work-id", "summary": "Work"}
                ]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .and(query_param("singleEvents", "true"))
            .and(query_param("orderBy", "startTime"))
            .and(query_param("maxResults", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {"summary": "Lunch", "start": {"dateTime": "2024-06-16T12:00:00"}, "end": {"dateTime": "2024-06-16T13:00:00"}},
                    {"summary": "Gym", "start": {"dateTime": "2024-06-17T18:00:00"}, "end": {"dateTime": "2024-06-17T19:00:00"}}
                ]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/calendars/work-id/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {"summary": "Standup", "location": "Room 1", "start": {"dateTime": "2024-06-16T09:00:00"}, "end": {"dateTime": "2024-06-16T09:15:00"}}
                ]
            })))
            .mount(&server)
            .await;

        let client = GoogleCalendar::with_base_url("test_token", &server.uri());
        let events = client.fetch("primary,Work", now()).await.unwrap();

        let summaries: Vec<_> = events.iter().map(|e| e.summary.as_str()).collect();
        assert_eq!(summaries, ["Standup", "Lunch", "Gym"]);
        assert_eq!(events[0].location, "Room 1");
    }

    #[tokio::test]
    async fn test_unauthorised_is_auth_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/users/me/calendarList"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = GoogleCalendar::with_base_url("stale", &server.uri());
        let err = client.fetch("primary", now()).await.unwrap_err();
        assert!(matches!(err, CalendarError::Auth(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_api_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/calendars/primary/events"))
            .respond_with(ResponseTemplate::new(500).set_body_string("backend down"))
            .mount(&server)
            .await;

        let client = GoogleCalendar::with_base_url("test_token", &server.uri());
        let err = client.upcoming_events("primary", now()).await.unwrap_err();
        match err {
            CalendarError::Api(msg) => assert!(msg.contains("backend down")),
            other => panic!("expected Api error, got {:?}", other),
        }
    }
}
