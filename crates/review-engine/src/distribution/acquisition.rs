use serde::Serialize;
use tracing::debug;

use super::domain::{ItemId, ItemKey, ItemStatus, Phase, ReviewerId, Tier};
use super::exclusion::ExclusionRuleEngine;
use super::kind::ItemKind;
use super::progress::ProgressTracker;
use super::service::DistributionError;
use super::store::{ItemQuery, Membership, StoreTransaction};

/// Items handed out by one pull request, split by the tier of the fallback order that supplied them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub partially_staffed: usize,
    pub unstaffed: usize,
    pub ranked_buckets: usize,
    pub awaiting_approval: usize,
}

impl BatchOutcome {
    pub fn total(&self) -> usize {
        self.partially_staffed + self.unstaffed + self.ranked_buckets + self.awaiting_approval
    }
}

/// Pull model: a reviewer asks for up to N more items.
pub struct BatchAcquirer;

impl BatchAcquirer {
    pub fn acquire<K>(
        tx: &mut dyn StoreTransaction,
        kind: &K,
        phase: &Phase,
        reviewer: &ReviewerId,
        tier: Tier,
        requested: usize,
    ) -> Result<BatchOutcome, DistributionError>
    where
        K: ItemKind + ?Sized,
    {
        let mut outcome = BatchOutcome::default();
        if requested == 0 {
            return Ok(outcome);
        }
        let excluded = ExclusionRuleEngine::excluded_predicate(&*tx, &phase.id, reviewer)?;

        if tier == Tier::Approver {
            if !phase.requires_approver {
                return Err(DistributionError::ApproverTierDisabled(phase.id.clone()));
            }
            let query = kind
                .item_query(&phase.id)
                .with_status(ItemStatus::PendingApprover)
                .excluding(excluded)
                .require(Membership::OwnersBelow {
                    tier: Tier::Approver,
                    limit: 1,
                })
                .require(Membership::NotReviewedBy(reviewer.clone()))
                .limit(requested);
            outcome.awaiting_approval = claim_all(tx, kind, phase, reviewer, tier, &query)?;
            return Ok(outcome);
        }

        let base = kind
            .item_query(&phase.id)
            .excluding(excluded)
            .require(Membership::NotInMailbox(kind.reviewer_mailbox(
                &phase.id,
                tier,
                reviewer,
            )))
            .require(Membership::OwnersBelow {
                tier,
                limit: tier.required_count(phase),
            })
            .require(Membership::NotReviewedBy(reviewer.clone()));

        let partial = base
            .clone()
            .with_status(ItemStatus::PartiallyStaffed)
            .limit(requested);
        outcome.partially_staffed = claim_all(tx, kind, phase, reviewer, tier, &partial)?;

        let pending = ProgressTracker::ranked_pending_buckets(&tx.progress(&phase.id)?, phase.quorum);

        let remaining = requested - outcome.total();
        if remaining > 0 {
            let unstaffed = base
                .clone()
                .with_status(ItemStatus::NoReviewers)
                .outside(pending.clone())
                .limit(remaining);
            outcome.unstaffed = claim_all(tx, kind, phase, reviewer, tier, &unstaffed)?;
        }

        for bucket in pending {
            let remaining = requested - outcome.total();
            if remaining == 0 {
                break;
            }
            let ranked = base
                .clone()
                .with_status(ItemStatus::NoReviewers)
                .in_bucket(bucket)
                .limit(remaining);
            outcome.ranked_buckets += claim_all(tx, kind, phase, reviewer, tier, &ranked)?;
        }

        Ok(outcome)
    }
}

fn claim_all<K>(
    tx: &mut dyn StoreTransaction,
    kind: &K,
    phase: &Phase,
    reviewer: &ReviewerId,
    tier: Tier,
    query: &ItemQuery,
) -> Result<usize, DistributionError>
where
    K: ItemKind + ?Sized,
{
    let mut claimed = 0;
    for item in tx.find(query)? {
        if claim_item(tx, kind, phase, reviewer, tier, &item.id)? {
            claimed += 1;
        }
    }
    Ok(claimed)
}

/// Adds one item to a reviewer mailbox and applies the staffing bookkeeping.
///
/// Returns `false` when the reviewer already holds the item. Fails with `InvariantViolation`
/// instead of pushing the item past the tier's required reviewer count.
pub(super) fn claim_item<K>(
    tx: &mut dyn StoreTransaction,
    kind: &K,
    phase: &Phase,
    reviewer: &ReviewerId,
    tier: Tier,
    item: &ItemId,
) -> Result<bool, DistributionError>
where
    K: ItemKind + ?Sized,
{
    let key = ItemKey::new(kind.tag(), &phase.id, item);
    let record = tx
        .item(&key)?
        .ok_or_else(|| DistributionError::ItemNotFound(item.clone()))?;
    let owners = tx.mailbox_owners(kind.tag(), &phase.id, tier, item)?;
    if owners.contains(reviewer) {
        return Ok(false);
    }
    let required = tier.required_count(phase);
    if owners.len() >= required {
        return Err(DistributionError::InvariantViolation {
            item: item.clone(),
            tier,
            owners: owners.len(),
            required,
        });
    }

    let mailbox = kind.reviewer_mailbox(&phase.id, tier, reviewer);
    if tx.add_to_mailbox(&mailbox, std::slice::from_ref(item))? == 0 {
        return Ok(false);
    }

    if tier == Tier::Evaluator {
        let status = record.status.staffed(owners.len() + 1, required);
        if status != record.status {
            tx.set_status(&key, status)?;
        }
        ProgressTracker::record_claim(tx, &phase.id, record.bucket())?;
    }

    debug!(
        phase = %phase.id,
        reviewer = %reviewer,
        tier = tier.label(),
        item = %item,
        owners = owners.len() + 1,
        "item claimed"
    );
    Ok(true)
}
