//! Append-only audit trail of a migration run.
//!
//! Every transition attempt, successful or not, appends one [`StepRecord`].
//! The trail lives in memory; an [`AuditSink`] sees each record as it is
//! appended, which is where a persistence layer attaches.

use crate::state_machine::Stage;
use crate::types::RunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// Step completed
    Success,
    /// Step not complete yet; retried locally
    RetryableFailure,
    /// Step failed; the run stops
    FatalFailure,
}

/// One audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Run this record belongs to
    pub run_id: RunId,
    /// Stage the step targeted
    pub stage: Stage,
    /// Outcome
    pub outcome: StepOutcome,
    /// When the outcome was observed
    pub timestamp: DateTime<Utc>,
    /// Free-form detail
    pub detail: String,
}

/// Receives records as they are appended
pub trait AuditSink: Send + Sync {
    /// Called once per appended record
    fn record(&self, record: &StepRecord);
}

/// Sink that forwards records to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &StepRecord) {
        match record.outcome {
            StepOutcome::Success => tracing::info!(
                run_id = %record.run_id,
                stage = %record.stage,
                detail = %record.detail,
                "step succeeded"
            ),
            StepOutcome::RetryableFailure => tracing::warn!(
                run_id = %record.run_id,
                stage = %record.stage,
                detail = %record.detail,
                "step pending"
            ),
            StepOutcome::FatalFailure => tracing::error!(
                run_id = %record.run_id,
                stage = %record.stage,
                detail = %record.detail,
                "step failed"
            ),
        }
    }
}

/// Ordered records of one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTrail {
    records: Vec<StepRecord>,
}

impl AuditTrail {
    /// Create empty trail
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record
    pub fn push(&mut self, record: StepRecord) {
        self.records.push(record);
    }

    /// All records, oldest first
    #[inline]
    #[must_use]
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    /// Number of records
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the trail is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Most recent record
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&StepRecord> {
        self.records.last()
    }

    /// Stages that completed, in order
    #[must_use]
    pub fn completed_stages(&self) -> Vec<Stage> {
        self.records
            .iter()
            .filter(|r| r.outcome == StepOutcome::Success)
            .map(|r| r.stage)
            .collect()
    }

    /// Whether any record targets `stage`
    #[must_use]
    pub fn touched(&self, stage: Stage) -> bool {
        self.records.iter().any(|r| r.stage == stage)
    }

    /// Number of records with `outcome` at `stage`
    #[must_use]
    pub fn count(&self, stage: Stage, outcome: StepOutcome) -> usize {
        self.records
            .iter()
            .filter(|r| r.stage == stage && r.outcome == outcome)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(stage: Stage, outcome: StepOutcome) -> StepRecord {
        StepRecord {
            run_id: RunId::new(),
            stage,
            outcome,
            timestamp: Utc::now(),
            detail: String::new(),
        }
    }

    #[test]
    fn completed_stages_filters_failures() {
        let mut trail = AuditTrail::new();
        trail.push(record(Stage::TokenEstablished, StepOutcome::Success));
        trail.push(record(Stage::RegistryResolved, StepOutcome::RetryableFailure));
        trail.push(record(Stage::RegistryResolved, StepOutcome::FatalFailure));

        assert_eq!(trail.completed_stages(), vec![Stage::TokenEstablished]);
        assert_eq!(trail.count(Stage::RegistryResolved, StepOutcome::RetryableFailure), 1);
        assert!(trail.touched(Stage::RegistryResolved));
        assert!(!trail.touched(Stage::MintVerified));
        assert_eq!(trail.last().map(|r| r.outcome), Some(StepOutcome::FatalFailure));
    }

    #[test]
    fn trail_serializes() {
        let mut trail = AuditTrail::new();
        trail.push(record(Stage::Done, StepOutcome::Success));
        let json = serde_json::to_string(&trail).unwrap();
        assert!(json.contains("\"Done\""));
        assert!(json.contains("\"success\""));
    }
}
