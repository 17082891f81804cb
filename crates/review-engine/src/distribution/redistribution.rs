use tracing::debug;

use super::domain::{ItemKey, Phase, ReviewerId, Tier};
use super::exclusion::ExclusionRuleEngine;
use super::kind::ItemKind;
use super::service::DistributionError;
use super::store::StoreTransaction;

/// Manual rebalancing of unfinished work between two reviewers of the same tier.
pub struct Redistributor;

impl Redistributor {
    /// Moves up to `max` items from `source` to `target` and returns how many moved.
    ///
    /// Items the kind pins to the source, items the target already holds or has reviewed in any
    /// tier, decided items, and items the target's exclusion rules forbid are skipped silently.
    pub fn redistribute<K>(
        tx: &mut dyn StoreTransaction,
        kind: &K,
        phase: &Phase,
        tier: Tier,
        source: &ReviewerId,
        target: &ReviewerId,
        max: usize,
    ) -> Result<usize, DistributionError>
    where
        K: ItemKind + ?Sized,
    {
        if source == target {
            return Err(DistributionError::SameReviewer(source.clone()));
        }
        if tier == Tier::Approver && !phase.requires_approver {
            return Err(DistributionError::ApproverTierDisabled(phase.id.clone()));
        }

        let source_key = kind.reviewer_mailbox(&phase.id, tier, source);
        let held = tx
            .mailbox(&source_key)?
            .ok_or_else(|| DistributionError::MailboxNotFound {
                reviewer: source.clone(),
                tier,
            })?;
        if max == 0 {
            return Ok(0);
        }

        let target_key = kind.reviewer_mailbox(&phase.id, tier, target);
        let target_held = tx.mailbox(&target_key)?.unwrap_or_default();
        let excluded = ExclusionRuleEngine::excluded_predicate(&*tx, &phase.id, target)?;

        let mut moved = 0;
        for id in held {
            if moved == max {
                break;
            }
            if target_held.contains(&id) {
                continue;
            }
            let key = ItemKey::new(kind.tag(), &phase.id, &id);
            let Some(item) = tx.item(&key)? else {
                continue;
            };
            if item.status.is_decided() || excluded.matches(&item) {
                continue;
            }

            let tier_reviews = tx.reviews(&key, tier)?;
            if !kind.redistributable(tier, source, &tier_reviews) {
                continue;
            }
            let other_tier = match tier {
                Tier::Evaluator => Tier::Approver,
                Tier::Approver => Tier::Evaluator,
            };
            let other_reviews = tx.reviews(&key, other_tier)?;
            if tier_reviews
                .iter()
                .chain(other_reviews.iter())
                .any(|review| &review.reviewer == target)
            {
                continue;
            }

            tx.remove_from_mailbox(&source_key, std::slice::from_ref(&id))?;
            tx.add_to_mailbox(&target_key, std::slice::from_ref(&id))?;
            debug!(
                phase = %phase.id,
                item = %id,
                from = %source,
                to = %target,
                "item redistributed"
            );
            moved += 1;
        }

        Ok(moved)
    }
}
