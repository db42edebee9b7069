use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::credentials::CredentialStore;

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Access + refresh token pair as issued by the login or refresh endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    /// Opaque expiry as reported by the server, e.g. `"24h"` or a timestamp.
    #[serde(default)]
    pub expires_at: String,
    #[serde(default = "Utc::now")]
    pub issued_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at: expires_at.into(),
            issued_at: Utc::now(),
        }
    }

    pub fn has_access_token(&self) -> bool {
        !self.access_token.is_empty()
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.trim().is_empty()
    }

    /// Best-effort absolute expiry.
    ///
    /// Accepts an RFC 3339 timestamp, a Unix timestamp in seconds or
    /// milliseconds, or a relative duration (`"3600"`, `"90s"`, `"30m"`,
    /// `"24h"`, `"7d"`) counted from `issued_at`. Values that do not fit a
    /// timestamp read as unknown.
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        let raw = self.expires_at.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
            return Some(at.with_timezone(&Utc));
        }
        if let Some(at) = parse_epoch(raw) {
            return Some(at);
        }
        parse_relative(raw).and_then(|d| self.issued_at.checked_add_signed(d))
    }

    /// Unknown expiry counts as not expired; the server decides with a 401.
    pub fn is_expired(&self) -> bool {
        self.expiry().map(|at| Utc::now() > at).unwrap_or(false)
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> Option<i64> {
        self.expiry()
            .map(|at| (at - Utc::now()).num_minutes().max(0))
    }
}

/// Bare numbers at or above this are Unix seconds rather than a duration.
const EPOCH_SECONDS_THRESHOLD: i64 = 1_000_000_000;
const EPOCH_MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

fn parse_epoch(raw: &str) -> Option<DateTime<Utc>> {
    let value: i64 = raw.parse().ok()?;
    if value >= EPOCH_MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(value)
    } else if value >= EPOCH_SECONDS_THRESHOLD {
        DateTime::from_timestamp(value, 0)
    } else {
        None
    }
}

fn parse_relative(raw: &str) -> Option<Duration> {
    let lower = raw.to_ascii_lowercase();
    let split = lower
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(lower.len());
    let (digits, unit) = lower.split_at(split);
    let amount: i64 = digits.parse().ok()?;
    match unit.trim() {
        "" | "s" | "sec" | "secs" => Duration::try_seconds(amount),
        "m" | "min" | "mins" => Duration::try_minutes(amount),
        "h" | "hr" | "hrs" => Duration::try_hours(amount),
        "d" | "day" | "days" => Duration::try_days(amount),
        _ => None,
    }
}

/// Credential store persisted as JSON in the cache directory.
pub struct FileCredentialStore {
    cache_dir: PathBuf,
    // Serializes read-modify-write of the session file within this process.
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            lock: Mutex::new(()),
        }
    }

    fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> Result<Option<Credential>> {
        let _guard = self.lock.lock();
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let credential: Credential =
            serde_json::from_str(&contents).context("Failed to parse session file")?;
        Ok(Some(credential))
    }

    fn set(&self, credential: &Credential) -> Result<()> {
        let _guard = self.lock.lock();
        let path = self.session_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create session directory")?;
        }
        let contents = serde_json::to_string_pretty(credential)?;
        std::fs::write(&path, contents).context("Failed to write session file")?;
        debug!(path = %path.display(), "Session saved");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock();
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(&path).context("Failed to remove session file")?;
        }
        Ok(())
    }
}
