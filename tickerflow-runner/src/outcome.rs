//! Typed stage outcomes and the run report.

use std::fmt;
use std::path::Path;
use std::time::Instant;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use tickerflow_core::Domain;

/// What one stage call ended with. Execution proceeds regardless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StageOutcome {
    Succeeded,
    Skipped(String),
    Failed(String),
}

impl StageOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StageOutcome::Failed(_))
    }

    fn label(&self) -> &'static str {
        match self {
            StageOutcome::Succeeded => "ok",
            StageOutcome::Skipped(_) => "skipped",
            StageOutcome::Failed(_) => "FAILED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Setup,
    RefreshTickers,
    Fetch,
    Merge,
    Load,
    Archive,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StageKind::Setup => "setup",
            StageKind::RefreshTickers => "refresh_tickers",
            StageKind::Fetch => "fetch",
            StageKind::Merge => "merge",
            StageKind::Load => "load",
            StageKind::Archive => "archive",
        })
    }
}

/// One line of the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    /// `None` for stages that are not per domain.
    pub domain: Option<Domain>,
    pub stage: StageKind,
    pub outcome: StageOutcome,
    /// Counts and per-item notes, e.g. `written=3 skipped=0 failed=1`.
    pub detail: String,
    pub elapsed_ms: u64,
}

impl StageReport {
    pub fn new(domain: Option<Domain>, stage: StageKind, outcome: StageOutcome, detail: impl Into<String>) -> Self {
        Self {
            domain,
            stage,
            outcome,
            detail: detail.into(),
            elapsed_ms: 0,
        }
    }

    /// Stamp the time elapsed since `start`.
    pub fn timed(mut self, start: Instant) -> Self {
        self.elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        self
    }
}

impl fmt::Display for StageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = self.domain.map(|d| d.slug()).unwrap_or("-");
        write!(f, "{:<22} {:<16} {:<8}", scope, self.stage, self.outcome.label())?;
        match &self.outcome {
            StageOutcome::Skipped(reason) | StageOutcome::Failed(reason) => write!(f, " {reason}")?,
            StageOutcome::Succeeded => {}
        }
        if !self.detail.is_empty() {
            write!(f, " [{}]", self.detail)?;
        }
        write!(f, " ({} ms)", self.elapsed_ms)
    }
}

/// Every stage outcome of one invocation, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: NaiveDateTime,
    pub ingestion_date: NaiveDate,
    pub stages: Vec<StageReport>,
}

impl RunReport {
    pub fn new(ingestion_date: NaiveDate) -> Self {
        Self {
            started_at: chrono::Local::now().naive_local(),
            ingestion_date,
            stages: Vec::new(),
        }
    }

    pub fn push(&mut self, report: StageReport) {
        self.stages.push(report);
    }

    pub fn extend(&mut self, other: RunReport) {
        self.stages.extend(other.stages);
    }

    pub fn any_failed(&self) -> bool {
        self.stages.iter().any(|s| s.outcome.is_failed())
    }

    pub fn failed(&self) -> impl Iterator<Item = &StageReport> {
        self.stages.iter().filter(|s| s.outcome.is_failed())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run report (ingestion date {})", self.ingestion_date)?;
        for stage in &self.stages {
            writeln!(f, "  {stage}")?;
        }
        let failed = self.failed().count();
        write!(f, "  {} stage(s), {} failed", self.stages.len(), failed)
    }
}
