use std::collections::BTreeMap;

use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::acquisition::claim_item;
use super::domain::{Column, GroupId, ItemId, ItemKey, ItemStatus, Phase, ReviewerId, Tier};
use super::kind::ItemKind;
use super::service::DistributionError;
use super::store::{Membership, StoreTransaction};
use super::subgroup::SubgroupAssigner;

/// Outcome for one `(value, group)` pair of a distribution map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupDistribution {
    pub value: String,
    pub group: GroupId,
    /// Items newly placed in the group mailbox by this run.
    pub staged: usize,
    /// Items handed to at least one member by this run.
    pub assigned: usize,
    pub subgroups: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistributionReport {
    pub tier: Tier,
    pub groups: Vec<GroupDistribution>,
}

impl DistributionReport {
    pub fn total_assigned(&self) -> usize {
        self.groups.iter().map(|group| group.assigned).sum()
    }

    pub fn total_staged(&self) -> usize {
        self.groups.iter().map(|group| group.staged).sum()
    }
}

/// One-time bulk seeding of group mailboxes followed by the subgroup fan-out.
pub struct GroupDistributor;

impl GroupDistributor {
    /// Stages every item whose `column` matches a map value into that value's group mailbox and
    /// fans the group mailbox out to the group's members.
    ///
    /// Re-running over the same map assigns nothing new: staging skips items already staged for
    /// the tier and the fan-out only considers staged items nobody in the tier holds yet.
    /// A subgroup member who already reviewed an item in either tier is passed over for it, so
    /// the item stays staged for another reviewer.
    pub fn distribute_initial<K, R>(
        tx: &mut dyn StoreTransaction,
        kind: &K,
        phase: &Phase,
        column: &Column,
        groups: &BTreeMap<String, GroupId>,
        tier: Tier,
        rng: &mut R,
    ) -> Result<DistributionReport, DistributionError>
    where
        K: ItemKind + ?Sized,
        R: Rng + ?Sized,
    {
        if tier == Tier::Approver && !phase.requires_approver {
            return Err(DistributionError::ApproverTierDisabled(phase.id.clone()));
        }
        let assigner = SubgroupAssigner::new(tier.required_count(phase));

        let mut report = DistributionReport {
            tier,
            groups: Vec::with_capacity(groups.len()),
        };
        for (value, group) in groups {
            let members = tx
                .members_of(group)?
                .ok_or_else(|| DistributionError::GroupNotFound(group.clone()))?;

            let mut query = kind
                .item_query(&phase.id)
                .where_column(column.clone(), value.as_str())
                .require(Membership::NoGroupMailbox(tier));
            if tier == Tier::Approver {
                query = query.with_status(ItemStatus::PendingApprover);
            }
            let fresh: Vec<ItemId> = tx.find(&query)?.into_iter().map(|item| item.id).collect();

            let mailbox = kind.group_mailbox(&phase.id, tier, group, value);
            let staged = tx.add_to_mailbox(&mailbox, &fresh)?;

            let mut unowned = Vec::new();
            for item in tx.mailbox(&mailbox)?.unwrap_or_default() {
                if tx.mailbox_owners(kind.tag(), &phase.id, tier, &item)?.is_empty() {
                    unowned.push(item);
                }
            }

            if members.is_empty() {
                warn!(
                    phase = %phase.id,
                    group = %group,
                    value = %value,
                    staged,
                    "group has no members; items stay staged"
                );
                report.groups.push(GroupDistribution {
                    value: value.clone(),
                    group: group.clone(),
                    staged,
                    assigned: 0,
                    subgroups: 0,
                });
                continue;
            }

            let plan = assigner.plan(group, members, unowned, rng)?;
            let mut assigned = 0;
            for assignment in &plan.assignments {
                for item in &assignment.items {
                    let reviewed = reviewed_by(tx, &ItemKey::new(kind.tag(), &phase.id, item))?;
                    let mut handed_out = false;
                    for reviewer in &assignment.reviewers {
                        if reviewed.contains(reviewer) {
                            debug!(
                                phase = %phase.id,
                                item = %item,
                                reviewer = %reviewer,
                                "reviewer already reviewed item; skipped"
                            );
                            continue;
                        }
                        handed_out |= claim_item(tx, kind, phase, reviewer, tier, item)?;
                    }
                    if handed_out {
                        assigned += 1;
                    }
                }
            }

            info!(
                phase = %phase.id,
                group = %group,
                value = %value,
                tier = tier.label(),
                staged,
                assigned,
                subgroups = plan.total_subgroups,
                "group mailbox distributed"
            );
            report.groups.push(GroupDistribution {
                value: value.clone(),
                group: group.clone(),
                staged,
                assigned,
                subgroups: plan.total_subgroups,
            });
        }

        Ok(report)
    }
}

fn reviewed_by(
    tx: &dyn StoreTransaction,
    item: &ItemKey,
) -> Result<Vec<ReviewerId>, DistributionError> {
    let mut reviewers = Vec::new();
    for tier in [Tier::Evaluator, Tier::Approver] {
        reviewers.extend(tx.reviews(item, tier)?.into_iter().map(|review| review.reviewer));
    }
    Ok(reviewers)
}
