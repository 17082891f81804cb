use std::collections::BTreeSet;

use tracing::info;

use super::domain::{
    ItemId, ItemKey, ItemStatus, Phase, Review, ReviewerId, Tier, Verdict, WorkItem,
};
use super::kind::ItemKind;
use super::progress::ProgressTracker;
use super::service::DistributionError;
use super::store::StoreTransaction;

/// Verdict bookkeeping that drives an item through the staffing and decision states.
pub struct ReviewRecorder;

impl ReviewRecorder {
    /// Stores an evaluator's review. Returns the item status afterwards.
    ///
    /// Saving an incomplete review keeps it editable; completing it locks it, counts towards the
    /// bucket's evaluated total and, once `quorum` completed reviews exist, settles the item.
    pub fn record_review<K>(
        tx: &mut dyn StoreTransaction,
        kind: &K,
        phase: &Phase,
        item: &ItemId,
        reviewer: &ReviewerId,
        verdict: Verdict,
        completed: bool,
    ) -> Result<ItemStatus, DistributionError>
    where
        K: ItemKind + ?Sized,
    {
        let key = ItemKey::new(kind.tag(), &phase.id, item);
        let record = load_item(tx, &key)?;
        let owners = tx.mailbox_owners(kind.tag(), &phase.id, Tier::Evaluator, item)?;
        if !owners.contains(reviewer) {
            return Err(DistributionError::NotAssigned {
                item: item.clone(),
                reviewer: reviewer.clone(),
            });
        }

        let mut reviews = tx.reviews(&key, Tier::Evaluator)?;
        let locked = reviews
            .iter()
            .any(|review| &review.reviewer == reviewer && review.completed);
        if locked || record.status.is_decided() || record.status == ItemStatus::PendingApprover {
            return Err(DistributionError::ReviewLocked {
                item: item.clone(),
                reviewer: reviewer.clone(),
            });
        }

        let review = Review {
            kind: key.kind,
            phase: key.phase.clone(),
            item: item.clone(),
            reviewer: reviewer.clone(),
            tier: Tier::Evaluator,
            verdict,
            completed,
        };
        tx.save_review(review.clone())?;
        if !completed {
            return Ok(record.status);
        }
        ProgressTracker::record_completion(tx, &phase.id, record.bucket())?;

        reviews.retain(|stored| &stored.reviewer != reviewer);
        reviews.push(review);
        let finished: Vec<&Verdict> = reviews
            .iter()
            .filter(|review| review.completed)
            .map(|review| &review.verdict)
            .collect();
        if finished.len() < usize::from(phase.quorum) {
            return Ok(record.status);
        }

        let status = match consensus(&finished) {
            Some(status) if kind.consensus_is_final() => status,
            _ => ItemStatus::PendingApprover,
        };
        tx.set_status(&key, status)?;
        info!(
            phase = %phase.id,
            item = %item,
            status = status.label(),
            "evaluation quorum reached"
        );
        Ok(status)
    }

    /// Stores the approver's decision and closes the item.
    pub fn record_approval<K>(
        tx: &mut dyn StoreTransaction,
        kind: &K,
        phase: &Phase,
        item: &ItemId,
        approver: &ReviewerId,
        verdict: Verdict,
    ) -> Result<ItemStatus, DistributionError>
    where
        K: ItemKind + ?Sized,
    {
        if !phase.requires_approver {
            return Err(DistributionError::ApproverTierDisabled(phase.id.clone()));
        }
        let key = ItemKey::new(kind.tag(), &phase.id, item);
        let record = load_item(tx, &key)?;
        if record.status != ItemStatus::PendingApprover {
            return Err(DistributionError::NotAwaitingApproval {
                item: item.clone(),
                status: record.status,
            });
        }
        let owners = tx.mailbox_owners(kind.tag(), &phase.id, Tier::Approver, item)?;
        if !owners.contains(approver) {
            return Err(DistributionError::NotAssigned {
                item: item.clone(),
                reviewer: approver.clone(),
            });
        }

        let status = verdict.decided_status();
        tx.save_review(Review {
            kind: key.kind,
            phase: key.phase.clone(),
            item: item.clone(),
            reviewer: approver.clone(),
            tier: Tier::Approver,
            verdict,
            completed: true,
        })?;
        tx.set_status(&key, status)?;
        info!(
            phase = %phase.id,
            item = %item,
            approver = %approver,
            status = status.label(),
            "approval recorded"
        );
        Ok(status)
    }

    /// Items in the reviewer's mailbox that still await the reviewer's verdict.
    pub fn pending_items<K>(
        tx: &dyn StoreTransaction,
        kind: &K,
        phase: &Phase,
        reviewer: &ReviewerId,
        tier: Tier,
    ) -> Result<Vec<WorkItem>, DistributionError>
    where
        K: ItemKind + ?Sized,
    {
        let mailbox = kind.reviewer_mailbox(&phase.id, tier, reviewer);
        let mut pending = Vec::new();
        for id in tx.mailbox(&mailbox)?.unwrap_or_default() {
            let key = ItemKey::new(kind.tag(), &phase.id, &id);
            let Some(item) = tx.item(&key)? else {
                continue;
            };
            let awaiting = match tier {
                Tier::Evaluator => {
                    !item.status.is_decided() && item.status != ItemStatus::PendingApprover
                }
                Tier::Approver => item.status == ItemStatus::PendingApprover,
            };
            if !awaiting {
                continue;
            }
            let done = tx
                .reviews(&key, tier)?
                .iter()
                .any(|review| &review.reviewer == reviewer && review.completed);
            if !done {
                pending.push(item);
            }
        }
        Ok(pending)
    }
}

/// Unanimous approval approves; rejections sharing a single reason reject; anything else is split.
pub(crate) fn consensus(verdicts: &[&Verdict]) -> Option<ItemStatus> {
    if verdicts.is_empty() {
        return None;
    }
    let mut approvals = 0;
    let mut reasons = BTreeSet::new();
    for verdict in verdicts {
        match verdict {
            Verdict::Approved => approvals += 1,
            Verdict::Rejected { reason } => {
                reasons.insert(reason.trim());
            }
        }
    }

    if approvals == verdicts.len() {
        Some(ItemStatus::Approved)
    } else if approvals == 0 && reasons.len() == 1 {
        Some(ItemStatus::Rejected)
    } else {
        None
    }
}

fn load_item(tx: &dyn StoreTransaction, key: &ItemKey) -> Result<WorkItem, DistributionError> {
    tx.item(key)?
        .ok_or_else(|| DistributionError::ItemNotFound(key.id.clone()))
}
