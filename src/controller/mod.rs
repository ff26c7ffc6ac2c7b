// ============================================================================
// Trusted CA Bundle Injection Controller
// ============================================================================
//
// One reconciliation pass per accepted notification:
//
//   ReadSource → ResolveTargets → ApplyAll → Report
//
// - filter:   admission predicate over change notifications
// - source:   reads and validates the canonical bundle
// - resolver: decides which config maps the pass touches
// - applier:  idempotent, conflict-retried sparse update of one target
// - driver:   runs the pass and reports the aggregate to the health registry
// - dispatch: feeds notifications to the driver on a bounded worker pool
//
// ============================================================================

mod applier;
mod dispatch;
mod driver;
pub mod filter;
mod resolver;
mod source;

#[cfg(test)]
pub(crate) mod testing;

use uuid::Uuid;

use crate::models::{ObjectKey, ReconcileRequest};
use crate::store::StoreError;
use crate::validation::ValidationError;

pub use applier::BundleApplier;
pub use dispatch::{DispatchSummary, Dispatcher};
pub use driver::ReconcileDriver;
pub use resolver::TargetResolver;
pub use source::SourceBundleReader;

/// Pass-level failures that end a pass before or instead of a normal report
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("reconciliation canceled")]
    Canceled,

    #[error("failed to read trusted CA bundle: {0}")]
    SourceUnavailable(#[source] StoreError),

    #[error("failed to validate trusted CA certificates in {key}: {source}")]
    InvalidBundle {
        key: ObjectKey,
        #[source]
        source: ValidationError,
    },

    #[error("error getting the list of affected configmaps: {0}")]
    ListTargets(#[source] StoreError),

    #[error("failed to get configmap '{key}': {source}")]
    GetTarget {
        key: ObjectKey,
        #[source]
        source: StoreError,
    },
}

/// Result of bringing one target in line
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// Already held the bundle; nothing written
    Unchanged,
    /// Written after `attempts` tries
    Updated { attempts: u32 },
    /// Gave up on this target
    Failed(StoreError),
}

impl SyncOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, SyncOutcome::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            SyncOutcome::Unchanged => "unchanged",
            SyncOutcome::Updated { .. } => "updated",
            SyncOutcome::Failed(_) => "failed",
        }
    }
}

/// Aggregate condition of a pass that reached Report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassCondition {
    Success,
    /// Every target was attempted, some failed
    PartialFailure,
    /// Failure threshold reached, remaining targets skipped
    TooManyFailures,
}

impl PassCondition {
    /// Reason code reported to the health registry
    pub fn reason(&self) -> &'static str {
        match self {
            PassCondition::Success => "Success",
            PassCondition::PartialFailure => "PartialFailure",
            PassCondition::TooManyFailures => "TooManyFailures",
        }
    }

    pub fn metric_label(&self) -> &'static str {
        match self {
            PassCondition::Success => "success",
            PassCondition::PartialFailure => "partial_failure",
            PassCondition::TooManyFailures => "too_many_failures",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PassReport {
    pub pass_id: Uuid,
    pub request: ReconcileRequest,
    pub condition: PassCondition,
    /// Outcomes of the targets actually attempted, in attempt order
    pub outcomes: Vec<(ObjectKey, SyncOutcome)>,
    /// Targets left untouched after the failure threshold was reached
    pub skipped: usize,
}

impl PassReport {
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_failed()).count()
    }

    pub fn updated(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, SyncOutcome::Updated { .. }))
            .count()
    }

    pub fn unchanged(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, SyncOutcome::Unchanged))
            .count()
    }
}

/// Why a pass ended without doing anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoOpReason {
    BundleMissing,
    TargetMissing,
}

#[derive(Debug, Clone)]
pub enum PassResult {
    /// Ended before ApplyAll with zero side effects and no health change
    NoOp(NoOpReason),
    /// Reached Report
    Reported(PassReport),
    /// Interrupted; redelivery is up to the notification source
    Canceled,
}

impl PassResult {
    pub fn metric_label(&self) -> &'static str {
        match self {
            PassResult::NoOp(_) => "noop",
            PassResult::Reported(report) => report.condition.metric_label(),
            PassResult::Canceled => "canceled",
        }
    }
}
