use std::collections::BTreeMap;
use std::sync::Arc;

use axum::response::Response;
use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;

use crate::distribution::{
    distribution_router, AdmissionReview, CategoryBucket, ExclusionRule, GroupId, ItemId,
    ItemKey, ItemStatus, ItemStore, KindTag, MailboxKey, MemoryItemStore, NewItem, Phase, PhaseId,
    ReviewDistributionService, ReviewWindow, ReviewerId, StoreError, StoreTransaction, Tier,
    WorkItem,
};
use crate::config::DistributionConfig;

pub(super) const PHASE: &str = "pre-analysis-2024";
pub(super) const EVALUATORS: &str = "evaluators";
pub(super) const APPROVERS: &str = "approvers";

pub(super) type AdmissionService = ReviewDistributionService<MemoryItemStore, AdmissionReview>;

pub(super) fn phase_id() -> PhaseId {
    PhaseId(PHASE.to_string())
}

pub(super) fn reviewer(name: &str) -> ReviewerId {
    ReviewerId(name.to_string())
}

pub(super) fn item_id(id: &str) -> ItemId {
    ItemId(id.to_string())
}

pub(super) fn reviewers(names: &[&str]) -> Vec<ReviewerId> {
    names.iter().map(|name| reviewer(name)).collect()
}

pub(super) fn phase(quorum: u8, requires_approver: bool) -> Phase {
    let now = Utc::now();
    Phase {
        id: phase_id(),
        name: "Pre-analysis".to_string(),
        kind: KindTag::Admission,
        quorum,
        requires_approver,
        evaluator_group: GroupId(EVALUATORS.to_string()),
        approver_group: requires_approver.then(|| GroupId(APPROVERS.to_string())),
        window: ReviewWindow {
            opens_at: now - Duration::days(1),
            closes_at: now + Duration::days(7),
        },
    }
}

pub(super) fn closed_phase(quorum: u8) -> Phase {
    let now = Utc::now();
    let mut phase = phase(quorum, false);
    phase.window = ReviewWindow {
        opens_at: now - Duration::days(10),
        closes_at: now - Duration::days(3),
    };
    phase
}

pub(super) fn new_item(id: &str, course: &str, modality: &str) -> NewItem {
    NewItem {
        id: item_id(id),
        course: course.to_string(),
        modality: modality.to_string(),
        attributes: BTreeMap::new(),
    }
}

pub(super) fn new_item_at(id: &str, course: &str, modality: &str, campus: &str) -> NewItem {
    let mut item = new_item(id, course, modality);
    item.attributes
        .insert("campus".to_string(), campus.to_string());
    item
}

pub(super) fn seeded_rng() -> StdRng {
    StdRng::seed_from_u64(2024)
}

/// Store holding `phase` with the named evaluators and approvers.
pub(super) fn seeded_store(phase: Phase, evaluators: &[&str], approvers: &[&str]) -> Arc<MemoryItemStore> {
    let store = MemoryItemStore::new();
    store.insert_phase(phase).expect("phase inserts");
    store
        .upsert_group(GroupId(EVALUATORS.to_string()), reviewers(evaluators))
        .expect("evaluators insert");
    store
        .upsert_group(GroupId(APPROVERS.to_string()), reviewers(approvers))
        .expect("approvers insert");
    Arc::new(store)
}

pub(super) fn build_service(
    phase: Phase,
    evaluators: &[&str],
    approvers: &[&str],
) -> (AdmissionService, Arc<MemoryItemStore>) {
    let store = seeded_store(phase, evaluators, approvers);
    let service = ReviewDistributionService::new(store.clone(), AdmissionReview);
    (service, store)
}

pub(super) fn exclude(store: &MemoryItemStore, column: &str, value: &str, group: &str) {
    store
        .add_exclusion_rule(ExclusionRule {
            phase: phase_id(),
            column: column.to_string().into(),
            value: value.to_string(),
            excluded_group: GroupId(group.to_string()),
        })
        .expect("rule inserts");
}

pub(super) fn target(service: &AdmissionService, course: &str, modality: &str, seats: u32) {
    service
        .set_bucket_target(&phase_id(), CategoryBucket::new(course, modality), seats, 1)
        .expect("target set");
}

pub(super) fn read<T>(
    store: &MemoryItemStore,
    work: impl FnOnce(&mut dyn StoreTransaction) -> Result<T, StoreError>,
) -> T {
    store.atomically(work).expect("store read succeeds")
}

pub(super) fn mailbox(store: &MemoryItemStore, tier: Tier, name: &str) -> Vec<ItemId> {
    let key = MailboxKey::Reviewer {
        kind: KindTag::Admission,
        phase: phase_id(),
        tier,
        reviewer: reviewer(name),
    };
    read(store, |tx| tx.mailbox(&key)).unwrap_or_default()
}

pub(super) fn owners(store: &MemoryItemStore, tier: Tier, id: &str) -> Vec<ReviewerId> {
    read(store, |tx| {
        tx.mailbox_owners(KindTag::Admission, &phase_id(), tier, &item_id(id))
    })
}

pub(super) fn item(store: &MemoryItemStore, id: &str) -> WorkItem {
    let key = ItemKey::new(KindTag::Admission, &phase_id(), &item_id(id));
    read(store, |tx| tx.item(&key)).expect("item exists")
}

pub(super) fn status(store: &MemoryItemStore, id: &str) -> ItemStatus {
    item(store, id).status
}

pub(super) fn all_items(store: &MemoryItemStore) -> Vec<WorkItem> {
    read(store, |tx| {
        tx.find(&crate::distribution::ItemQuery::new(
            KindTag::Admission,
            phase_id(),
        ))
    })
}

/// Store whose every transaction fails as if the database were offline.
pub(super) struct UnavailableStore;

impl ItemStore for UnavailableStore {
    fn atomically<T, E, F>(&self, _work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        Err(StoreError::Unavailable("database offline".to_string()).into())
    }
}

pub(super) fn router_with_service(service: AdmissionService) -> axum::Router {
    distribution_router(Arc::new(service), DistributionConfig::default())
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
