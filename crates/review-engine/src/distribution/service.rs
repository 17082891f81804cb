use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tracing::{info, instrument, warn};

use super::acquisition::{BatchAcquirer, BatchOutcome};
use super::domain::{
    CategoryBucket, Column, GroupId, ItemId, ItemStatus, NewItem, Phase, PhaseId, ReviewerId,
    Tier, Verdict, WorkItem,
};
use super::group::{DistributionReport, GroupDistributor};
use super::kind::ItemKind;
use super::progress::{BucketProgress, ProgressTracker};
use super::redistribution::Redistributor;
use super::review::ReviewRecorder;
use super::store::{ItemStore, StoreError, StoreTransaction};
use super::validation::{validate_phase, ConfigurationError};

/// Entry point for every distribution operation of one item kind.
///
/// Each call runs as a single store transaction: it commits completely or leaves the store
/// untouched.
pub struct ReviewDistributionService<S, K> {
    store: Arc<S>,
    kind: K,
}

impl<S, K> ReviewDistributionService<S, K>
where
    S: ItemStore + 'static,
    K: ItemKind,
{
    pub fn new(store: Arc<S>, kind: K) -> Self {
        Self { store, kind }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    /// Imports items into a phase in `NoReviewers`. Returns how many were new.
    #[instrument(skip(self, items), fields(phase = %phase_id, submitted = items.len()))]
    pub fn import_items(
        &self,
        phase_id: &PhaseId,
        items: Vec<NewItem>,
    ) -> Result<usize, DistributionError> {
        let created = self.store.atomically(|tx| {
            let phase = self.load_phase(tx, phase_id)?;
            let records: Vec<WorkItem> = items
                .into_iter()
                .map(|item| item.into_work_item(self.kind.tag(), phase.id.clone()))
                .collect();
            Ok::<_, DistributionError>(tx.insert_items(records)?)
        })?;
        info!(created, "items imported");
        Ok(created)
    }

    /// Sets a bucket's quota from its seat count. Zero seats leave the bucket untracked.
    pub fn set_bucket_target(
        &self,
        phase_id: &PhaseId,
        bucket: CategoryBucket,
        seats: u32,
        multiplier: u32,
    ) -> Result<Option<u32>, DistributionError> {
        self.store.atomically(|tx| {
            let phase = self.load_phase(tx, phase_id)?;
            Ok(ProgressTracker::set_target(
                tx, &phase.id, bucket, seats, multiplier,
            )?)
        })
    }

    /// Checks the phase configuration against the current group membership.
    #[instrument(skip(self), fields(phase = %phase_id))]
    pub fn validate_phase(&self, phase_id: &PhaseId) -> Result<(), DistributionError> {
        self.store.atomically(|tx| {
            let phase = self.load_phase(tx, phase_id)?;
            let evaluators = tx
                .members_of(&phase.evaluator_group)?
                .ok_or_else(|| DistributionError::GroupNotFound(phase.evaluator_group.clone()))?;
            let approvers = match &phase.approver_group {
                Some(group) => Some(
                    tx.members_of(group)?
                        .ok_or_else(|| DistributionError::GroupNotFound(group.clone()))?,
                ),
                None => None,
            };
            validate_phase(&phase, &evaluators, approvers.as_deref())?;
            Ok(())
        })
    }

    /// Seeds group mailboxes and fans them out, shuffling with the thread-local generator.
    pub fn distribute_initial(
        &self,
        phase_id: &PhaseId,
        column: &Column,
        groups: &BTreeMap<String, GroupId>,
        tier: Tier,
    ) -> Result<DistributionReport, DistributionError> {
        self.distribute_initial_with(phase_id, column, groups, tier, &mut rand::thread_rng())
    }

    #[instrument(skip(self, groups, rng), fields(phase = %phase_id, column = %column, tier = tier.label()))]
    pub fn distribute_initial_with<R>(
        &self,
        phase_id: &PhaseId,
        column: &Column,
        groups: &BTreeMap<String, GroupId>,
        tier: Tier,
        rng: &mut R,
    ) -> Result<DistributionReport, DistributionError>
    where
        R: Rng + ?Sized,
    {
        let report = self.store.atomically(|tx| {
            let phase = self.load_phase(tx, phase_id)?;
            GroupDistributor::distribute_initial(tx, &self.kind, &phase, column, groups, tier, rng)
        })?;
        info!(
            staged = report.total_staged(),
            assigned = report.total_assigned(),
            "initial distribution finished"
        );
        Ok(report)
    }

    /// Pulls up to `requested` more items into the reviewer's mailbox.
    #[instrument(skip(self), fields(phase = %phase_id, reviewer = %reviewer, tier = tier.label()))]
    pub fn acquire_batch(
        &self,
        phase_id: &PhaseId,
        reviewer: &ReviewerId,
        tier: Tier,
        requested: usize,
    ) -> Result<BatchOutcome, DistributionError> {
        let outcome = self.store.atomically(|tx| {
            let phase = self.open_phase(tx, phase_id)?;
            BatchAcquirer::acquire(tx, &self.kind, &phase, reviewer, tier, requested)
        })?;
        if outcome.total() == 0 {
            info!(requested, "no eligible items for batch");
        } else {
            info!(
                requested,
                assigned = outcome.total(),
                partially_staffed = outcome.partially_staffed,
                unstaffed = outcome.unstaffed,
                ranked_buckets = outcome.ranked_buckets,
                "batch acquired"
            );
        }
        Ok(outcome)
    }

    /// Moves unfinished items from `source` to `target`.
    #[instrument(skip(self), fields(phase = %phase_id, tier = tier.label()))]
    pub fn redistribute(
        &self,
        phase_id: &PhaseId,
        tier: Tier,
        source: &ReviewerId,
        target: &ReviewerId,
        max: usize,
    ) -> Result<usize, DistributionError> {
        let moved = self.store.atomically(|tx| {
            let phase = self.open_phase(tx, phase_id)?;
            Redistributor::redistribute(tx, &self.kind, &phase, tier, source, target, max)
        })?;
        info!(source = %source, target = %target, max, moved, "items redistributed");
        Ok(moved)
    }

    #[instrument(skip(self, verdict), fields(phase = %phase_id, item = %item, reviewer = %reviewer))]
    pub fn record_review(
        &self,
        phase_id: &PhaseId,
        item: &ItemId,
        reviewer: &ReviewerId,
        verdict: Verdict,
        completed: bool,
    ) -> Result<ItemStatus, DistributionError> {
        self.store.atomically(|tx| {
            let phase = self.open_phase(tx, phase_id)?;
            ReviewRecorder::record_review(
                tx, &self.kind, &phase, item, reviewer, verdict, completed,
            )
        })
    }

    #[instrument(skip(self, verdict), fields(phase = %phase_id, item = %item, approver = %approver))]
    pub fn record_approval(
        &self,
        phase_id: &PhaseId,
        item: &ItemId,
        approver: &ReviewerId,
        verdict: Verdict,
    ) -> Result<ItemStatus, DistributionError> {
        self.store.atomically(|tx| {
            let phase = self.open_phase(tx, phase_id)?;
            ReviewRecorder::record_approval(tx, &self.kind, &phase, item, approver, verdict)
        })
    }

    pub fn pending_items(
        &self,
        phase_id: &PhaseId,
        reviewer: &ReviewerId,
        tier: Tier,
    ) -> Result<Vec<WorkItem>, DistributionError> {
        self.store.atomically(|tx| {
            let phase = self.load_phase(tx, phase_id)?;
            ReviewRecorder::pending_items(tx, &self.kind, &phase, reviewer, tier)
        })
    }

    pub fn has_pending(
        &self,
        phase_id: &PhaseId,
        reviewer: &ReviewerId,
        tier: Tier,
    ) -> Result<bool, DistributionError> {
        Ok(!self.pending_items(phase_id, reviewer, tier)?.is_empty())
    }

    /// Per-bucket progress, least served first.
    pub fn progress_report(
        &self,
        phase_id: &PhaseId,
    ) -> Result<Vec<BucketProgress>, DistributionError> {
        self.store.atomically(|tx| {
            let phase = self.load_phase(tx, phase_id)?;
            let counters = tx.progress(&phase.id)?;
            Ok(ProgressTracker::report(&counters, phase.quorum))
        })
    }

    fn load_phase(
        &self,
        tx: &dyn StoreTransaction,
        phase_id: &PhaseId,
    ) -> Result<Phase, DistributionError> {
        tx.phase(phase_id)?
            .filter(|phase| phase.kind == self.kind.tag())
            .ok_or_else(|| DistributionError::PhaseNotFound(phase_id.clone()))
    }

    fn open_phase(
        &self,
        tx: &dyn StoreTransaction,
        phase_id: &PhaseId,
    ) -> Result<Phase, DistributionError> {
        let phase = self.load_phase(tx, phase_id)?;
        if !phase.window.contains(Utc::now()) {
            warn!(phase = %phase.id, "review window is closed");
            return Err(DistributionError::PhaseClosed(phase.id));
        }
        Ok(phase)
    }
}

/// Error raised by distribution operations.
#[derive(Debug, thiserror::Error)]
pub enum DistributionError {
    #[error("phase {0} not found")]
    PhaseNotFound(PhaseId),
    #[error("group {0} not found")]
    GroupNotFound(GroupId),
    #[error("item {0} not found")]
    ItemNotFound(ItemId),
    #[error("{tier} mailbox of {reviewer} not found")]
    MailboxNotFound { reviewer: ReviewerId, tier: Tier },
    #[error("phase {0} is outside its review window")]
    PhaseClosed(PhaseId),
    #[error("phase {0} has no approver tier")]
    ApproverTierDisabled(PhaseId),
    #[error("item {item} already has {owners} of {required} {tier} reviewer(s)")]
    InvariantViolation {
        item: ItemId,
        tier: Tier,
        owners: usize,
        required: usize,
    },
    #[error("item {item} is not assigned to {reviewer}")]
    NotAssigned { item: ItemId, reviewer: ReviewerId },
    #[error("review of {item} by {reviewer} can no longer change")]
    ReviewLocked { item: ItemId, reviewer: ReviewerId },
    #[error("item {item} is {}, not awaiting approval", .status.label())]
    NotAwaitingApproval { item: ItemId, status: ItemStatus },
    #[error("cannot redistribute items from {0} to themselves")]
    SameReviewer(ReviewerId),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DistributionError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DistributionError::PhaseNotFound(_)
                | DistributionError::GroupNotFound(_)
                | DistributionError::ItemNotFound(_)
                | DistributionError::MailboxNotFound { .. }
        )
    }
}
