//! Reviewer assignment for admission reviews, appeals, and score adjustments.
//!
//! Items are seeded into group mailboxes and fanned out to subgroups of `quorum` evaluators,
//! pulled in batches by reviewers who run out of work, and moved between reviewers by an
//! administrator. Every operation runs inside one store transaction, and no item ever ends up
//! with more reviewers than its tier requires.

pub mod acquisition;
pub mod domain;
pub mod exclusion;
pub mod group;
pub mod import;
pub mod kind;
pub mod memory;
pub mod progress;
pub mod redistribution;
pub mod review;
pub mod router;
pub mod service;
pub mod store;
pub mod subgroup;
pub mod validation;

#[cfg(test)]
mod tests;

pub use acquisition::{BatchAcquirer, BatchOutcome};
pub use domain::{
    CategoryBucket, Column, ExclusionRule, GroupId, ItemId, ItemKey, ItemStatus, KindTag, NewItem,
    Phase, PhaseId, Review, ReviewWindow, ReviewerId, Tier, Verdict, WorkItem,
};
pub use exclusion::{ExclusionPredicate, ExclusionRuleEngine};
pub use group::{DistributionReport, GroupDistribution, GroupDistributor};
pub use import::{parse_items, ImportError};
pub use kind::{AdmissionReview, Appeal, ItemKind, ScoreAdjustment};
pub use memory::MemoryItemStore;
pub use progress::{BucketProgress, ProgressTracker};
pub use redistribution::Redistributor;
pub use review::ReviewRecorder;
pub use router::{distribution_router, status_for, DistributionState};
pub use service::{DistributionError, ReviewDistributionService};
pub use store::{
    ItemQuery, ItemStore, MailboxKey, Membership, ProgressCounter, ProgressField, ProgressKey,
    StoreError, StoreTransaction,
};
pub use subgroup::{SubgroupAssigner, SubgroupAssignment, SubgroupPlan};
pub use validation::{validate_phase, ConfigurationError};
