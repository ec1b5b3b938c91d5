use std::cmp::Reverse;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::memory::Address;

/// Global collections located by scanning.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScanTarget {
    CreatureVector,
    LanguageVector,
    TranslationVector,
}

/// Incremental scan progress: `step` of `total` chunks done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanProgress {
    pub target: ScanTarget,
    pub step: usize,
    pub total: usize,
}

impl ScanProgress {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.step * 100) / self.total).min(100) as u8
    }
}

/// Receives progress reports from a running scan.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: ScanProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(ScanProgress) + Send + Sync,
{
    fn report(&self, progress: ScanProgress) {
        self(progress)
    }
}

/// Discards progress reports.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _progress: ScanProgress) {}
}

/// A vector header that passed the shape predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanCandidate {
    /// Address of the header itself.
    pub address: Address,
    pub start: Address,
    pub end: Address,
    pub capacity: Address,
    pub count: u64,
    pub sampled: usize,
    pub valid_samples: usize,
}

impl ScanCandidate {
    pub fn all_samples_valid(&self) -> bool {
        self.sampled > 0 && self.valid_samples == self.sampled
    }

    /// More validated samples, then more elements, then lower address.
    pub fn is_better_than(&self, other: &Self) -> bool {
        (self.valid_samples, self.count, Reverse(self.address))
            > (other.valid_samples, other.count, Reverse(other.address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(address: Address, count: u64, valid_samples: usize) -> ScanCandidate {
        ScanCandidate {
            address,
            start: 0x1000,
            end: 0x1000 + count * 4,
            capacity: 0x1000 + count * 4,
            count,
            sampled: 4,
            valid_samples,
        }
    }

    #[test]
    fn test_ranking_prefers_valid_samples() {
        let a = candidate(0x100, 10, 4);
        let b = candidate(0x200, 500, 2);
        assert!(a.is_better_than(&b));
        assert!(!b.is_better_than(&a));
    }

    #[test]
    fn test_ranking_ties_break_on_count_then_address() {
        let small = candidate(0x100, 10, 4);
        let large = candidate(0x200, 20, 4);
        assert!(large.is_better_than(&small));

        let low = candidate(0x100, 10, 4);
        let high = candidate(0x200, 10, 4);
        assert!(low.is_better_than(&high));
    }

    #[test]
    fn test_progress_percent() {
        let progress = ScanProgress {
            target: ScanTarget::CreatureVector,
            step: 3,
            total: 4,
        };
        assert_eq!(progress.percent(), 75);
    }

    #[test]
    fn test_target_names() {
        assert_eq!(ScanTarget::CreatureVector.to_string(), "creature_vector");
        assert_eq!(
            "translation_vector".parse::<ScanTarget>().unwrap(),
            ScanTarget::TranslationVector
        );
    }
}
