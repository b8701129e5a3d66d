//! # Agenda Change Cache
//!
//! A full refresh of the 7.5" B/W/Red panel takes around 30 seconds and
//! flashes the screen, so it is skipped when nothing on the agenda changed.
//!
//! ## Strategy
//! - **Record**: the last aggregated [`Day`] list plus the time it was stored
//! - **Fresh**: the stored days are structurally equal to the new ones *and*
//!   the record is younger than the TTL
//! - **Store**: overwrites the record on every successful run, hit or miss,
//!   so the TTL window restarts from the latest fetch rather than from the
//!   last real change. On a miss the store waits until the new frame has
//!   actually been shown, so a failed run leaves the old record in place.
//!
//! The TTL exists because the forecast is not part of the comparison: an
//! agenda that never changes still gets a redraw often enough to show a new
//! forecast.
//!
//! ## Format
//! JSON with an explicit `version`. Unknown fields are ignored so newer
//! writers stay readable, and anything that fails to read, parse or match a
//! supported version counts as "no cache". A damaged cache file never stops
//! a run.

use crate::Day;
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{fs, io};
use thiserror::Error;

/// Current on-disk format.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Default cache TTL in hours.
pub const DEFAULT_TTL_HOURS: u32 = 2;

/// Errors writing the cache file. Read failures never surface.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Cache file operations failed (permissions, disk space)
    #[error("cache IO: {0}")]
    Io(#[from] io::Error),

    /// Record could not be encoded
    #[error("cache encode: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The persisted agenda snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Format version of this record
    pub version: u32,
    /// When the snapshot was stored
    pub timestamp: NaiveDateTime,
    /// Agenda at that time
    #[serde(default)]
    pub days: Vec<Day>,
}

impl CacheRecord {
    pub fn new(days: &[Day], timestamp: NaiveDateTime) -> Self {
        Self {
            version: CACHE_FORMAT_VERSION,
            timestamp,
            days: days.to_vec(),
        }
    }
}

/// File-backed cache deciding whether a redraw is needed.
#[derive(Clone, Debug)]
pub struct ChangeCache {
    path: PathBuf,
}

impl ChangeCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored record; any failure is reported as `None`.
    pub fn load(&self) -> Option<CacheRecord> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!("ignoring unreadable cache {}: {}", self.path.display(), err);
                return None;
            }
        };

        match serde_json::from_slice::<CacheRecord>(&data) {
            Ok(record) if record.version == 0 || record.version > CACHE_FORMAT_VERSION => {
                tracing::warn!(
                    "ignoring cache {} with unsupported version {}",
                    self.path.display(),
                    record.version
                );
                None
            }
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!("ignoring corrupt cache {}: {}", self.path.display(), err);
                None
            }
        }
    }

    /// True iff a record exists, its days equal `current`, and it is younger than `ttl`.
    pub fn is_fresh(
        record: Option<&CacheRecord>,
        current: &[Day],
        ttl: Duration,
        now: NaiveDateTime,
    ) -> bool {
        match record {
            Some(record) => record.days == current && now < record.timestamp + ttl,
            None => false,
        }
    }

    /// Overwrite the stored record with `days` stamped at `now`.
    ///
    /// Writes to a sibling temporary file first and renames it into place, so
    /// an interrupted run leaves either the old record or the new one.
    pub fn store(&self, days: &[Day], now: NaiveDateTime) -> Result<(), CacheError> {
        let data = serde_json::to_vec(&CacheRecord::new(days, now))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Load and decide without writing. Returns true when a redraw is needed.
    pub fn needs_redraw(&self, days: &[Day], ttl: Duration, now: NaiveDateTime) -> bool {
        !Self::is_fresh(self.load().as_ref(), days, ttl, now)
    }

    /// Store `days` as the agenda now on screen, logging instead of failing.
    pub fn record_shown(&self, days: &[Day], now: NaiveDateTime) {
        // Store failures only cost an extra redraw next time
        if let Err(err) = self.store(days, now) {
            tracing::warn!("could not write cache {}: {}", self.path.display(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Event, EventTime};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 16)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn sample_days() -> Vec<Day> {
        let date = t0().date();
        vec![Day {
            date,
            label: "Today".to_string(),
            events: vec![Event {
                summary: "Standup".to_string(),
                location: String::new(),
                start: EventTime::DateTime(date.and_hms_opt(9, 0, 0).unwrap()),
                end: EventTime::DateTime(date.and_hms_opt(9, 15, 0).unwrap()),
            }],
        }]
    }

    #[test]
    fn test_fresh_within_ttl() {
        let record = CacheRecord::new(&sample_days(), t0());
        assert!(ChangeCache::is_fresh(
            Some(&record),
            &sample_days(),
            Duration::hours(2),
            t0() + Duration::minutes(90)
        ));
    }

    #[test]
    fn test_expired_ttl_is_stale() {
        let record = CacheRecord::new(&sample_days(), t0());
        assert!(!ChangeCache::is_fresh(
            Some(&record),
            &sample_days(),
            Duration::hours(2),
            t0() + Duration::hours(3)
        ));
        // Exactly at the boundary counts as expired
        assert!(!ChangeCache::is_fresh(
            Some(&record),
            &sample_days(),
            Duration::hours(2),
            t0() + Duration::hours(2)
        ));
    }

    #[test]
    fn test_changed_days_are_stale_regardless_of_ttl() {
        let record = CacheRecord::new(&sample_days(), t0());

        let mut renamed = sample_days();
        renamed[0].events[0].summary = "Retro".to_string();
        assert!(!ChangeCache::is_fresh(
            Some(&record),
            &renamed,
            Duration::hours(24),
            t0()
        ));

        assert!(!ChangeCache::is_fresh(
            Some(&record),
            &[],
            Duration::hours(24),
            t0()
        ));
    }

    #[test]
    fn test_missing_record_is_stale() {
        assert!(!ChangeCache::is_fresh(
            None,
            &sample_days(),
            Duration::hours(2),
            t0()
        ));
    }

    #[test]
    fn test_store_then_load() {
        let dir = TempDir::new().unwrap();
        let cache = ChangeCache::new(dir.path().join("agenda.json"));

        assert!(cache.load().is_none());
        cache.store(&sample_days(), t0()).unwrap();

        let record = cache.load().unwrap();
        assert_eq!(record.version, CACHE_FORMAT_VERSION);
        assert_eq!(record.timestamp, t0());
        assert_eq!(record.days, sample_days());
    }

    #[test]
    fn test_corrupt_cache_reads_as_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agenda.json");
        fs::write(&path, b"\x80\x04not json at all").unwrap();

        assert!(ChangeCache::new(&path).load().is_none());
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agenda.json");
        fs::write(
            &path,
            r#"{"version":1,"timestamp":"2024-06-16T08:00:00","days":[],"forecast_hash":"abc"}"#,
        )
        .unwrap();

        let record = ChangeCache::new(&path).load().unwrap();
        assert!(record.days.is_empty());
    }

    #[test]
    fn test_future_version_reads_as_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agenda.json");
        fs::write(
            &path,
            r#"{"version":99,"timestamp":"2024-06-16T08:00:00","days":[]}"#,
        )
        .unwrap();

        assert!(ChangeCache::new(&path).load().is_none());
    }

    #[test]
    fn test_each_run_rearms_ttl_from_latest_fetch() {
        let dir = TempDir::new().unwrap();
        let cache = ChangeCache::new(dir.path().join("agenda.json"));
        let ttl = Duration::hours(2);

        // First run: nothing cached, must draw
        assert!(cache.needs_redraw(&sample_days(), ttl, t0()));
        cache.record_shown(&sample_days(), t0());

        // Same agenda an hour later: skip, and re-arm
        let later = t0() + Duration::hours(1);
        assert!(!cache.needs_redraw(&sample_days(), ttl, later));
        cache.record_shown(&sample_days(), later);

        // Re-armed at +1h, so +2h30 is still inside the window
        let later = t0() + Duration::minutes(150);
        assert!(!cache.needs_redraw(&sample_days(), ttl, later));
        cache.record_shown(&sample_days(), later);

        // +5h is past every stored timestamp's window
        assert!(cache.needs_redraw(&sample_days(), ttl, t0() + Duration::hours(5)));
    }

    #[test]
    fn test_deciding_does_not_touch_the_record() {
        let dir = TempDir::new().unwrap();
        let cache = ChangeCache::new(dir.path().join("agenda.json"));
        let ttl = Duration::hours(2);

        assert!(cache.needs_redraw(&sample_days(), ttl, t0()));
        // Nothing was shown, so nothing was stored
        assert!(cache.load().is_none());
        assert!(cache.needs_redraw(&sample_days(), ttl, t0() + Duration::minutes(10)));

        cache.record_shown(&[], t0());
        assert!(cache.needs_redraw(&sample_days(), ttl, t0() + Duration::minutes(20)));
        assert_eq!(cache.load().unwrap().days, Vec::<Day>::new());
    }

    #[test]
    fn test_record_shown_survives_unwritable_path() {
        let dir = TempDir::new().unwrap();
        let cache = ChangeCache::new(dir.path().join("missing").join("agenda.json"));

        cache.record_shown(&sample_days(), t0());
        assert!(cache.load().is_none());
    }
}
