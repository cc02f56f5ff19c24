//! Redis key schema for a queue `Q` and job `J`.
//!
//! Every key the master touches is built here so the schema lives in one
//! place instead of scattered `format!` calls. See spec §3 for the
//! authoritative table.

use std::fmt;

/// Returns true if `name` is safe to use as a Redis key component and, for
/// job ids specifically, as a key *suffix* (alphanumeric + `_`).
pub fn is_safe_key_component(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Builds the well-known key names for a given queue.
#[derive(Debug, Clone, Copy)]
pub struct QueueKeys<'a> {
    queue: &'a str,
}

impl<'a> QueueKeys<'a> {
    pub fn new(queue: &'a str) -> Self {
        Self { queue }
    }

    /// `Q` — the shared FIFO of pending task chunks.
    pub fn tasks(&self) -> String {
        self.queue.to_string()
    }

    /// `Q.live` — liveness sentinel.
    pub fn live(&self) -> String {
        format!("{}.live", self.queue)
    }

    /// `Q.count` — advisory worker count.
    pub fn count(&self) -> String {
        format!("{}.count", self.queue)
    }

    /// `Q.env.J` — job envelope blob.
    pub fn env(&self, job: &str) -> String {
        format!("{}.env.{}", self.queue, job)
    }

    /// `Q.env.*` — pattern matching every envelope on this queue.
    pub fn env_pattern(&self) -> String {
        format!("{}.env.*", self.queue)
    }

    /// `Q.out.J` — result chunk list for job `J`.
    pub fn out(&self, job: &str) -> String {
        format!("{}.out.{}", self.queue, job)
    }

    /// `Q.out.*`
    pub fn out_pattern(&self) -> String {
        format!("{}.out.*", self.queue)
    }

    /// `Q.start.J.<tok>` for a specific worker token.
    pub fn start(&self, job: &str, token: &str) -> String {
        format!("{}.start.{}.{}", self.queue, job, token)
    }

    /// `Q.start.J.*` — pattern matching every start marker for job `J`.
    pub fn start_pattern(&self, job: &str) -> String {
        format!("{}.start.{}.*", self.queue, job)
    }

    /// `Q.alive.J.<tok>` for a specific worker token.
    pub fn alive(&self, job: &str, token: &str) -> String {
        format!("{}.alive.{}.{}", self.queue, job, token)
    }

    /// `Q.alive.J.*`
    pub fn alive_pattern(&self, job: &str) -> String {
        format!("{}.alive.{}.*", self.queue, job)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Start,
    Alive,
}

impl fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerKind::Start => write!(f, "start"),
            MarkerKind::Alive => write!(f, "alive"),
        }
    }
}

/// Extracts the trailing `<tok>` from a `Q.start.J.<tok>` or `Q.alive.J.<tok>` key.
pub fn strip_marker_token<'a>(key: &'a str, queue: &str, job: &str, kind: MarkerKind) -> Option<&'a str> {
    let prefix = format!("{queue}.{kind}.{job}.");
    key.strip_prefix(prefix.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_expected_keys() {
        let keys = QueueKeys::new("jobs");
        assert_eq!(keys.tasks(), "jobs");
        assert_eq!(keys.live(), "jobs.live");
        assert_eq!(keys.count(), "jobs.count");
        assert_eq!(keys.env("abc123"), "jobs.env.abc123");
        assert_eq!(keys.out("abc123"), "jobs.out.abc123");
        assert_eq!(keys.start("abc123", "tok1"), "jobs.start.abc123.tok1");
        assert_eq!(keys.alive("abc123", "tok1"), "jobs.alive.abc123.tok1");
    }

    #[test]
    fn strips_marker_token() {
        let key = "jobs.start.abc123.tok1";
        let tok = strip_marker_token(key, "jobs", "abc123", MarkerKind::Start);
        assert_eq!(tok, Some("tok1"));
    }

    #[test]
    fn rejects_unsafe_components() {
        assert!(is_safe_key_component("abc_123"));
        assert!(!is_safe_key_component("abc-123"));
        assert!(!is_safe_key_component(""));
        assert!(!is_safe_key_component("abc.123"));
    }
}
