//! Short link records.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::Error;

/// Longest short code accepted on create.
pub const MAX_CODE_LEN: usize = 32;

/// A short link as owned by its partition store.
///
/// The cache holds a possibly stale copy of this; `click_count` in particular
/// lags behind the store while increments sit in the click aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortLinkRecord {
    pub id: i64,
    pub short_code: String,
    pub target_url: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub click_count: i64,
}

impl ShortLinkRecord {
    /// Whether the record's own expiry has passed at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Time left until expiry, `None` for records that never expire.
    ///
    /// Returns `Some(Duration::ZERO)` once the expiry has passed.
    pub fn remaining_ttl(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at.map(|at| (at - now).to_std().unwrap_or(Duration::ZERO))
    }
}

/// Input for creating a short link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLink {
    pub short_code: String,
    pub target_url: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewLink {
    pub fn new(short_code: impl Into<String>, target_url: impl Into<String>) -> Self {
        Self { short_code: short_code.into(), target_url: target_url.into(), expires_at: None }
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Reject malformed input before it reaches a store.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if:
    /// - the short code is empty, longer than [`MAX_CODE_LEN`], or contains
    ///   characters outside `[A-Za-z0-9_-]`
    /// - the target is not an absolute http(s) URL
    /// - the expiry is not in the future
    pub fn validate(&self) -> Result<(), Error> {
        validate_code(&self.short_code)?;

        let url = Url::parse(&self.target_url)
            .map_err(|e| Error::Validation(format!("target_url {}: {e}", self.target_url)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Error::Validation(format!("unsupported scheme: {}", url.scheme())));
        }

        if let Some(at) = self.expires_at
            && at <= Utc::now()
        {
            return Err(Error::Validation("expires_at must be in the future".into()));
        }

        Ok(())
    }
}

/// Check that a short code is well formed.
pub fn validate_code(code: &str) -> Result<(), Error> {
    if code.is_empty() {
        return Err(Error::Validation("short code must not be empty".into()));
    }
    if code.len() > MAX_CODE_LEN {
        return Err(Error::Validation(format!("short code exceeds {MAX_CODE_LEN} characters")));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(Error::Validation(format!("short code {code:?} contains invalid characters")));
    }
    Ok(())
}

/// Millisecond timestamps are how the store persists time.
pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}
