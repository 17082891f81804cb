use std::cmp::Ordering;

use serde::Serialize;

use super::domain::{CategoryBucket, PhaseId};
use super::store::{ProgressCounter, ProgressField, ProgressKey, StoreError, StoreTransaction};

/// One row of the per-phase progress report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketProgress {
    pub bucket: CategoryBucket,
    pub target: u32,
    pub evaluated: u32,
    pub in_progress: u32,
    pub goal_reached: bool,
    /// Share of the target fully evaluated, in percent.
    pub quota_met: f64,
    /// Share of the target currently sitting in reviewer mailboxes, in percent.
    pub in_analysis: f64,
}

/// Quota bookkeeping and the least-served-first ranking used by pull requests.
pub struct ProgressTracker;

impl ProgressTracker {
    /// Buckets whose quota is not met yet, least served first.
    pub fn ranked_pending_buckets(
        counters: &[(ProgressKey, ProgressCounter)],
        quorum: u8,
    ) -> Vec<CategoryBucket> {
        let mut pending: Vec<&(ProgressKey, ProgressCounter)> = counters
            .iter()
            .filter(|(_, counter)| is_pending(counter, quorum))
            .collect();
        pending.sort_by(|(left_key, left), (right_key, right)| {
            rank(left, right, quorum).then_with(|| left_key.bucket.cmp(&right_key.bucket))
        });
        pending
            .into_iter()
            .map(|(key, _)| key.bucket.clone())
            .collect()
    }

    /// Pending buckets in ranking order, followed by the rest in bucket order.
    pub fn report(counters: &[(ProgressKey, ProgressCounter)], quorum: u8) -> Vec<BucketProgress> {
        let ranked = Self::ranked_pending_buckets(counters, quorum);
        let mut rows: Vec<BucketProgress> = ranked
            .iter()
            .filter_map(|bucket| {
                counters
                    .iter()
                    .find(|(key, _)| &key.bucket == bucket)
                    .map(|(key, counter)| row(key, counter, quorum))
            })
            .collect();

        let mut settled: Vec<BucketProgress> = counters
            .iter()
            .filter(|(key, _)| !ranked.contains(&key.bucket))
            .map(|(key, counter)| row(key, counter, quorum))
            .collect();
        settled.sort_by(|left, right| left.bucket.cmp(&right.bucket));
        rows.extend(settled);
        rows
    }

    /// Sets `target = seats × multiplier`. Zero seats leave the bucket untracked.
    pub fn set_target(
        tx: &mut dyn StoreTransaction,
        phase: &PhaseId,
        bucket: CategoryBucket,
        seats: u32,
        multiplier: u32,
    ) -> Result<Option<u32>, StoreError> {
        let target = seats.saturating_mul(multiplier);
        if target == 0 {
            return Ok(None);
        }
        let key = ProgressKey {
            phase: phase.clone(),
            bucket,
        };
        tx.set_target(&key, target)?;
        Ok(Some(target))
    }

    pub fn record_claim(
        tx: &mut dyn StoreTransaction,
        phase: &PhaseId,
        bucket: CategoryBucket,
    ) -> Result<(), StoreError> {
        bump(tx, phase, bucket, ProgressField::InProgress)
    }

    pub fn record_completion(
        tx: &mut dyn StoreTransaction,
        phase: &PhaseId,
        bucket: CategoryBucket,
    ) -> Result<(), StoreError> {
        bump(tx, phase, bucket, ProgressField::Evaluated)
    }
}

fn bump(
    tx: &mut dyn StoreTransaction,
    phase: &PhaseId,
    bucket: CategoryBucket,
    field: ProgressField,
) -> Result<(), StoreError> {
    let key = ProgressKey {
        phase: phase.clone(),
        bucket,
    };
    tx.increment(&key, field, 1)
}

fn is_pending(counter: &ProgressCounter, quorum: u8) -> bool {
    counter.target > 0 && u64::from(counter.evaluated) < goal(counter, quorum)
}

fn goal(counter: &ProgressCounter, quorum: u8) -> u64 {
    u64::from(counter.target) * u64::from(quorum.max(1))
}

fn fraction(count: u32, counter: &ProgressCounter, quorum: u8) -> f64 {
    let goal = goal(counter, quorum);
    if goal == 0 {
        return 0.0;
    }
    f64::from(count) / goal as f64
}

fn rank(left: &ProgressCounter, right: &ProgressCounter, quorum: u8) -> Ordering {
    fraction(left.evaluated, left, quorum)
        .total_cmp(&fraction(right.evaluated, right, quorum))
        .then_with(|| {
            fraction(left.in_progress, left, quorum)
                .total_cmp(&fraction(right.in_progress, right, quorum))
        })
}

fn row(key: &ProgressKey, counter: &ProgressCounter, quorum: u8) -> BucketProgress {
    BucketProgress {
        bucket: key.bucket.clone(),
        target: counter.target,
        evaluated: counter.evaluated,
        in_progress: counter.in_progress,
        goal_reached: counter.target > 0 && !is_pending(counter, quorum),
        quota_met: percent(fraction(counter.evaluated, counter, quorum)),
        in_analysis: percent(fraction(counter.in_progress, counter, quorum)),
    }
}

fn percent(value: f64) -> f64 {
    (value * 10_000.0).round() / 100.0
}
