use super::domain::{GroupId, KindTag, PhaseId, Review, ReviewerId, Tier};
use super::store::{ItemQuery, MailboxKey};

/// Per-family capabilities the engine is parameterized with.
///
/// Admission reviews, appeals, and score adjustments share the same distribution algorithms;
/// they differ only in where their items and mailboxes live and in a couple of policies.
pub trait ItemKind: Send + Sync + 'static {
    fn tag(&self) -> KindTag;

    /// Base query selecting this family's items in a phase.
    fn item_query(&self, phase: &PhaseId) -> ItemQuery {
        ItemQuery::new(self.tag(), phase.clone())
    }

    fn reviewer_mailbox(&self, phase: &PhaseId, tier: Tier, reviewer: &ReviewerId) -> MailboxKey {
        MailboxKey::Reviewer {
            kind: self.tag(),
            phase: phase.clone(),
            tier,
            reviewer: reviewer.clone(),
        }
    }

    fn group_mailbox(
        &self,
        phase: &PhaseId,
        tier: Tier,
        group: &GroupId,
        bucket: &str,
    ) -> MailboxKey {
        MailboxKey::Group {
            kind: self.tag(),
            phase: phase.clone(),
            tier,
            group: group.clone(),
            bucket: bucket.to_string(),
        }
    }

    /// Whether an item may leave `source`'s mailbox given the item's reviews in `tier`.
    fn redistributable(&self, tier: Tier, source: &ReviewerId, reviews: &[Review]) -> bool {
        match tier {
            Tier::Evaluator => !reviews
                .iter()
                .any(|review| &review.reviewer == source && review.completed),
            Tier::Approver => reviews.is_empty(),
        }
    }

    /// Whether unanimous evaluators close an item without the approver tier.
    fn consensus_is_final(&self) -> bool {
        true
    }
}

/// Admission applications under pre-analysis.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdmissionReview;

impl ItemKind for AdmissionReview {
    fn tag(&self) -> KindTag {
        KindTag::Admission
    }
}

/// Appeals against a published result; the approver always issues the final opinion.
#[derive(Debug, Clone, Copy, Default)]
pub struct Appeal;

impl ItemKind for Appeal {
    fn tag(&self) -> KindTag {
        KindTag::Appeal
    }

    fn consensus_is_final(&self) -> bool {
        false
    }
}

/// Score adjustment requests. Any started evaluation pins the item to its evaluators.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreAdjustment;

impl ItemKind for ScoreAdjustment {
    fn tag(&self) -> KindTag {
        KindTag::ScoreAdjustment
    }

    fn redistributable(&self, _tier: Tier, _source: &ReviewerId, reviews: &[Review]) -> bool {
        reviews.is_empty()
    }
}
