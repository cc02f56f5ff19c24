//! Job identifier generation for redwork.
//!
//! A job id must be safe as a Redis key *suffix* — spec §3: "alphanumeric
//! and `_`". A hyphenated UUID string isn't, so `JobId` renders the simple
//! (no-hyphen) hex form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Error returned when parsing a job id fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobIdError {
    message: String,
}

impl JobIdError {
    fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl fmt::Display for JobIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for JobIdError {}

/// A unique per-submission token, safe to embed in a Redis key without
/// escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generates a fresh job id (32 lowercase hex characters).
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Validates and wraps an externally-supplied job id.
    pub fn parse(value: &str) -> Result<Self, JobIdError> {
        if value.is_empty() {
            return Err(JobIdError::new("job id must not be empty"));
        }
        if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(JobIdError::new(format!(
                "job id {value:?} must be alphanumeric or underscore only"
            )));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = JobIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
