//! The Refresh Event row shared by the Startup Verifier and the
//! Credential Store's background refresh loop (§3, §6's refresh-history
//! table).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Exceeded its expected duration without finishing or erroring; the
    /// scheduler flags these rather than letting them hang silently.
    Stuck,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshType {
    VerifierSweep,
    CredentialRefresh,
}

/// One append-only row per verifier run or credential-refresh cycle.
/// Retention is finite — callers truncate on insert past a configured cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: RefreshType,
    pub status: RefreshStatus,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub succeeded_count: u32,
    pub failed_count: u32,
    pub error: Option<String>,
    pub duration_ms: Option<u64>,
}

impl RefreshEvent {
    pub fn started(kind: RefreshType) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            status: RefreshStatus::Running,
            started_at: chrono::Utc::now(),
            finished_at: None,
            succeeded_count: 0,
            failed_count: 0,
            error: None,
            duration_ms: None,
        }
    }

    pub fn finish(&mut self, status: RefreshStatus, succeeded: u32, failed: u32, error: Option<String>) {
        let now = chrono::Utc::now();
        self.finished_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds().max(0) as u64);
        self.status = status;
        self.succeeded_count = succeeded;
        self.failed_count = failed;
        self.error = error;
    }
}

/// Bounded append-only ring of [`RefreshEvent`] rows, newest first on read,
/// used by both the Verifier and the Credential Store so `/admin/models/
/// metadata/refresh/status` can show a unified history.
#[derive(Debug, Default)]
pub struct RefreshHistory {
    capacity: usize,
    rows: std::collections::VecDeque<RefreshEvent>,
}

impl RefreshHistory {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, rows: std::collections::VecDeque::with_capacity(capacity) }
    }

    pub fn push(&mut self, event: RefreshEvent) {
        if self.rows.len() >= self.capacity && self.capacity > 0 {
            self.rows.pop_front();
        }
        self.rows.push_back(event);
    }

    /// Newest-first view, per §6's `/admin/models/metadata/refresh/status`.
    pub fn newest_first(&self) -> Vec<RefreshEvent> {
        self.rows.iter().rev().cloned().collect()
    }
}
