//! Writing pending changes back into the game.
//!
//! A commit is planned against the model (resolving each change to an
//! address and encoded bytes), executed against the process without touching
//! the model, and finally applied to the model so committed changes leave the
//! overlay. Failures never abort the batch.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{LayoutError, MemoryError};
use crate::layout::{Field, MemoryLayout};
use crate::memory::{Address, WriteMemory};
use crate::model::{EntityModel, FieldId, FieldValue, PendingChange};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// The process went away before this change was written.
    SessionLost,
    #[serde(serialize_with = "serialize_display")]
    Write(MemoryError),
    /// The entity or skill record no longer exists, or the value does not
    /// fit the field.
    Unresolvable,
}

fn serialize_display<S: serde::Serializer>(error: &MemoryError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(error)
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::SessionLost => f.write_str("session lost"),
            FailureReason::Write(e) => write!(f, "{}", e),
            FailureReason::Unresolvable => f.write_str("field could not be resolved"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommitOutcome {
    Committed,
    Failed { failure: FailureReason },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitReport {
    pub outcomes: Vec<(PendingChange, CommitOutcome)>,
}

impl CommitReport {
    pub fn committed(&self) -> impl Iterator<Item = &PendingChange> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == CommitOutcome::Committed)
            .map(|(change, _)| change)
    }

    pub fn committed_count(&self) -> usize {
        self.committed().count()
    }

    pub fn failed(&self) -> Vec<(&PendingChange, &FailureReason)> {
        self.outcomes
            .iter()
            .filter_map(|(change, outcome)| match outcome {
                CommitOutcome::Failed { failure } => Some((change, failure)),
                CommitOutcome::Committed => None,
            })
            .collect()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.committed_count()
    }

    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }

    /// Whether the batch stopped because the process went away.
    pub fn session_lost(&self) -> bool {
        self.failed()
            .iter()
            .any(|(_, reason)| **reason == FailureReason::SessionLost)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// One resolved write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedWrite {
    pub change: PendingChange,
    /// `None` when the change could not be resolved.
    pub target: Option<(Address, Vec<u8>)>,
}

/// Pending changes resolved to addresses, detached from the model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitPlan {
    pub writes: Vec<PlannedWrite>,
}

impl CommitPlan {
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Resolve every pending change to the foreign address and bytes to write,
/// using addresses cached when the entities were decoded.
pub fn plan_commit(model: &EntityModel, layout: &MemoryLayout) -> Result<CommitPlan, LayoutError> {
    let labors = layout.offset(Field::Labors)?;
    let rating = layout.field(Field::SkillRating)?;

    let writes = model
        .pending_changes()
        .into_iter()
        .map(|change| {
            let target = model.entity(change.entity).and_then(|entity| {
                match (change.field, change.value) {
                    (FieldId::Labor(labor), FieldValue::Flag(enabled)) => {
                        if usize::from(labor) >= entity.labors.len() {
                            return None;
                        }
                        let address = entity.address + labors + u64::from(labor);
                        Some((address, vec![u8::from(enabled)]))
                    }
                    (FieldId::SkillRating(skill), FieldValue::Rating(value)) => {
                        let record = entity.skill(skill)?;
                        let bytes = rating.width.encode(i64::from(value))?;
                        Some((record.address + rating.offset, bytes))
                    }
                    _ => None,
                }
            });
            PlannedWrite { change, target }
        })
        .collect();

    Ok(CommitPlan { writes })
}

/// Issue one write per planned change.
///
/// A failed write does not stop the batch. Once the process is gone, every
/// remaining change fails with [`FailureReason::SessionLost`] without a
/// write attempt.
pub fn execute_commit<W: WriteMemory + ?Sized>(writer: &W, plan: &CommitPlan) -> CommitReport {
    let mut lost = !writer.is_valid();
    if lost {
        warn!("Process is gone; {} change(s) not written", plan.len());
    }

    let mut outcomes = Vec::with_capacity(plan.len());
    for write in &plan.writes {
        let outcome = if lost {
            CommitOutcome::Failed {
                failure: FailureReason::SessionLost,
            }
        } else {
            match &write.target {
                None => CommitOutcome::Failed {
                    failure: FailureReason::Unresolvable,
                },
                Some(_) if !writer.is_valid() => {
                    lost = true;
                    CommitOutcome::Failed {
                        failure: FailureReason::SessionLost,
                    }
                }
                Some((address, bytes)) => match writer.write_bytes(*address, bytes) {
                    Ok(()) => CommitOutcome::Committed,
                    Err(e) if e.is_session_lost() => {
                        lost = true;
                        CommitOutcome::Failed {
                            failure: FailureReason::SessionLost,
                        }
                    }
                    Err(e) => {
                        debug!("Write for {} {} failed: {}", write.change.entity, write.change.field, e);
                        CommitOutcome::Failed {
                            failure: FailureReason::Write(e),
                        }
                    }
                },
            }
        };
        outcomes.push((write.change, outcome));
    }

    let report = CommitReport { outcomes };
    info!(
        "Commit finished: {} written, {} failed",
        report.committed_count(),
        report.failed_count()
    );
    report
}

/// Plan, execute and apply a commit in one step.
pub fn commit<W: WriteMemory + ?Sized>(
    writer: &W,
    layout: &MemoryLayout,
    model: &mut EntityModel,
) -> Result<CommitReport, LayoutError> {
    let plan = plan_commit(model, layout)?;
    let report = execute_commit(writer, &plan);
    model.apply_commit(&report);
    Ok(report)
}
