use crate::finding::Finding;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outcome of one target within a run.
#[derive(Debug, Clone, Serialize)]
pub struct TargetSummary {
    pub target: String,
    pub scan_ok: bool,
    pub candidates: usize,
    pub delivered: usize,
    pub failed: usize,
}

impl TargetSummary {
    pub fn new(target: &str, scan_ok: bool) -> Self {
        Self {
            target: target.to_string(),
            scan_ok,
            candidates: 0,
            delivered: 0,
            failed: 0,
        }
    }
}

/// The complete summary of a single pass over all targets.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub targets: Vec<TargetSummary>,
    /// Candidates processed, delivered or not.
    pub candidates: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Built findings, kept only in dry-run mode.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub findings: Vec<Finding>,
}

impl RunSummary {
    pub fn start(dry_run: bool) -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            dry_run,
            targets: Vec::new(),
            candidates: 0,
            delivered: 0,
            failed: 0,
            findings: Vec::new(),
        }
    }

    pub fn record(&mut self, target: TargetSummary) {
        self.candidates += target.candidates;
        self.delivered += target.delivered;
        self.failed += target.failed;
        self.targets.push(target);
    }

    pub fn finish(&mut self) {
        self.finished_at = Utc::now();
    }

    pub fn elapsed_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    pub fn failed_scans(&self) -> usize {
        self.targets.iter().filter(|t| !t.scan_ok).count()
    }

    pub fn delivery_rate_pct(&self) -> f64 {
        if self.candidates == 0 {
            return 0.0;
        }
        self.delivered as f64 / self.candidates as f64 * 100.0
    }
}

/// Format seconds into a human-readable duration string.
pub fn format_duration(secs: f64) -> String {
    let total_secs = secs.round() as u64;
    let minutes = total_secs / 60;
    let seconds = total_secs % 60;
    if minutes > 0 {
        format!("{}:{:02}", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
