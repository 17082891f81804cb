use serde::{Deserialize, Serialize};

use super::domain::{
    CategoryBucket, Column, ExclusionRule, GroupId, ItemId, ItemKey, ItemStatus, KindTag, Phase,
    PhaseId, Review, ReviewerId, Tier, WorkItem,
};
use super::exclusion::ExclusionPredicate;

/// Address of a mailbox: a reviewer's personal queue or a group's staging box.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MailboxKey {
    Reviewer {
        kind: KindTag,
        phase: PhaseId,
        tier: Tier,
        reviewer: ReviewerId,
    },
    Group {
        kind: KindTag,
        phase: PhaseId,
        tier: Tier,
        group: GroupId,
        bucket: String,
    },
}

impl MailboxKey {
    pub fn reviewer(&self) -> Option<&ReviewerId> {
        match self {
            MailboxKey::Reviewer { reviewer, .. } => Some(reviewer),
            MailboxKey::Group { .. } => None,
        }
    }
}

/// Progress counters are kept per phase and bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProgressKey {
    pub phase: PhaseId,
    pub bucket: CategoryBucket,
}

/// Quota bookkeeping for one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCounter {
    pub target: u32,
    pub evaluated: u32,
    pub in_progress: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressField {
    Evaluated,
    InProgress,
}

/// Mailbox-membership constraints a query result must satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Membership {
    /// Not already queued in this mailbox.
    NotInMailbox(MailboxKey),
    /// Not staged in any group mailbox of the tier.
    NoGroupMailbox(Tier),
    /// Held by fewer than `limit` reviewer mailboxes of the tier.
    OwnersBelow { tier: Tier, limit: usize },
    /// The reviewer has no review of the item in any tier.
    NotReviewedBy(ReviewerId),
}

/// Declarative item filter; every populated field must hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemQuery {
    pub kind: KindTag,
    pub phase: PhaseId,
    pub statuses: Vec<ItemStatus>,
    pub column: Option<(Column, String)>,
    pub bucket: Option<CategoryBucket>,
    pub outside_buckets: Vec<CategoryBucket>,
    pub excluding: ExclusionPredicate,
    pub membership: Vec<Membership>,
    pub limit: Option<usize>,
}

impl ItemQuery {
    pub fn new(kind: KindTag, phase: PhaseId) -> Self {
        Self {
            kind,
            phase,
            statuses: Vec::new(),
            column: None,
            bucket: None,
            outside_buckets: Vec::new(),
            excluding: ExclusionPredicate::default(),
            membership: Vec::new(),
            limit: None,
        }
    }

    pub fn with_status(mut self, status: ItemStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn where_column(mut self, column: Column, value: impl Into<String>) -> Self {
        self.column = Some((column, value.into()));
        self
    }

    pub fn in_bucket(mut self, bucket: CategoryBucket) -> Self {
        self.bucket = Some(bucket);
        self
    }

    pub fn outside(mut self, buckets: Vec<CategoryBucket>) -> Self {
        self.outside_buckets = buckets;
        self
    }

    pub fn excluding(mut self, predicate: ExclusionPredicate) -> Self {
        self.excluding = predicate;
        self
    }

    pub fn require(mut self, membership: Membership) -> Self {
        self.membership.push(membership);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Checks the attribute-level filters. Membership is resolved by the store.
    pub fn matches_item(&self, item: &WorkItem) -> bool {
        if item.kind != self.kind || item.phase != self.phase {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&item.status) {
            return false;
        }
        if let Some((column, value)) = &self.column {
            if !column.matches(item, value) {
                return false;
            }
        }
        let bucket = item.bucket();
        if let Some(wanted) = &self.bucket {
            if &bucket != wanted {
                return false;
            }
        }
        if self.outside_buckets.contains(&bucket) {
            return false;
        }
        !self.excluding.matches(item)
    }
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists: {0}")]
    Conflict(String),
    #[error("record not found: {0}")]
    Missing(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Operations available inside one store transaction.
pub trait StoreTransaction {
    fn phase(&self, id: &PhaseId) -> Result<Option<Phase>, StoreError>;
    /// `None` when the group does not exist.
    fn members_of(&self, group: &GroupId) -> Result<Option<Vec<ReviewerId>>, StoreError>;
    fn exclusion_rules(&self, phase: &PhaseId) -> Result<Vec<ExclusionRule>, StoreError>;

    fn item(&self, key: &ItemKey) -> Result<Option<WorkItem>, StoreError>;
    /// Matching items in import order, truncated to the query limit.
    fn find(&self, query: &ItemQuery) -> Result<Vec<WorkItem>, StoreError>;
    fn count(&self, query: &ItemQuery) -> Result<usize, StoreError> {
        Ok(self.find(query)?.len())
    }
    /// Inserts new items and returns how many were created. Items already present under the
    /// same kind, phase and id are skipped.
    fn insert_items(&mut self, items: Vec<WorkItem>) -> Result<usize, StoreError>;
    fn set_status(&mut self, item: &ItemKey, status: ItemStatus) -> Result<(), StoreError>;

    /// `None` when the mailbox has never been created.
    fn mailbox(&self, key: &MailboxKey) -> Result<Option<Vec<ItemId>>, StoreError>;
    /// Creates the mailbox if needed and returns how many items were newly added.
    fn add_to_mailbox(&mut self, key: &MailboxKey, items: &[ItemId]) -> Result<usize, StoreError>;
    fn remove_from_mailbox(
        &mut self,
        key: &MailboxKey,
        items: &[ItemId],
    ) -> Result<usize, StoreError>;
    /// Reviewers whose mailbox in `tier` holds the item.
    fn mailbox_owners(
        &self,
        kind: KindTag,
        phase: &PhaseId,
        tier: Tier,
        item: &ItemId,
    ) -> Result<Vec<ReviewerId>, StoreError>;

    fn reviews(&self, item: &ItemKey, tier: Tier) -> Result<Vec<Review>, StoreError>;
    /// Upserts by (item key, reviewer, tier).
    fn save_review(&mut self, review: Review) -> Result<(), StoreError>;

    fn progress(&self, phase: &PhaseId) -> Result<Vec<(ProgressKey, ProgressCounter)>, StoreError>;
    fn set_target(&mut self, key: &ProgressKey, target: u32) -> Result<(), StoreError>;
    /// Atomic counter update; a missing counter is left absent.
    fn increment(
        &mut self,
        key: &ProgressKey,
        field: ProgressField,
        delta: i64,
    ) -> Result<(), StoreError>;
}

/// Storage abstraction: every engine operation runs as one all-or-nothing transaction.
pub trait ItemStore: Send + Sync {
    /// Runs `work` and commits its writes only when it returns `Ok`.
    fn atomically<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T, E>,
        E: From<StoreError>;
}
