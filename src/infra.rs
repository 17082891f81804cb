use chrono::{Duration, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use review_engine::distribution::{
    parse_items, AdmissionReview, CategoryBucket, Column, DistributionError, ExclusionRule,
    GroupId, KindTag, MemoryItemStore, NewItem, Phase, PhaseId, ReviewDistributionService,
    ReviewWindow, ReviewerId, StoreError,
};
use review_engine::error::AppError;
use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub(crate) type AdmissionService = ReviewDistributionService<MemoryItemStore, AdmissionReview>;

pub(crate) const SAMPLE_PHASE: &str = "admissions-sample";
pub(crate) const SAMPLE_EVALUATORS: [&str; 5] = ["ana", "bruno", "carla", "davi", "elis"];
pub(crate) const SAMPLE_APPROVERS: [&str; 1] = ["dora"];
const SAMPLE_ROSTER: &[u8] = include_bytes!("../crates/review-engine/admission_items.csv");

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn reviewers(names: &[&str]) -> Vec<ReviewerId> {
    names.iter().map(|name| ReviewerId(name.to_string())).collect()
}

/// Registers the sample phase, its two reviewer pools, and a campus conflict rule for carla.
pub(crate) fn seed_sample_phase(store: &MemoryItemStore, quorum: u8) -> Result<PhaseId, StoreError> {
    let now = Utc::now();
    let phase = Phase {
        id: PhaseId(SAMPLE_PHASE.to_string()),
        name: "Sample admission pre-analysis".to_string(),
        kind: KindTag::Admission,
        quorum,
        requires_approver: true,
        evaluator_group: GroupId("evaluators".to_string()),
        approver_group: Some(GroupId("approvers".to_string())),
        window: ReviewWindow {
            opens_at: now - Duration::hours(1),
            closes_at: now + Duration::days(30),
        },
    };
    let phase_id = phase.id.clone();

    store.insert_phase(phase)?;
    store.upsert_group(GroupId("evaluators".to_string()), reviewers(&SAMPLE_EVALUATORS))?;
    store.upsert_group(GroupId("approvers".to_string()), reviewers(&SAMPLE_APPROVERS))?;
    store.upsert_group(GroupId("north-conflicts".to_string()), reviewers(&["carla"]))?;
    store.add_exclusion_rule(ExclusionRule {
        phase: phase_id.clone(),
        column: Column::from("campus".to_string()),
        value: "north".to_string(),
        excluded_group: GroupId("north-conflicts".to_string()),
    })?;

    Ok(phase_id)
}

/// Reads a roster CSV from disk, or the bundled sample roster when no path is given.
pub(crate) fn load_roster(path: Option<&Path>) -> Result<Vec<NewItem>, AppError> {
    let items = match path {
        Some(path) => parse_items(File::open(path)?)?,
        None => parse_items(SAMPLE_ROSTER)?,
    };
    Ok(items)
}

/// Gives every bucket present in `items` the same seat count.
pub(crate) fn seed_targets(
    service: &AdmissionService,
    phase: &PhaseId,
    items: &[NewItem],
    seats: u32,
) -> Result<usize, DistributionError> {
    let buckets: BTreeSet<CategoryBucket> = items
        .iter()
        .map(|item| CategoryBucket::new(item.course.clone(), item.modality.clone()))
        .collect();
    for bucket in &buckets {
        service.set_bucket_target(phase, bucket.clone(), seats, 1)?;
    }
    Ok(buckets.len())
}

/// Seeds the sample phase and imports the bundled roster into it.
pub(crate) fn sample_service(quorum: u8) -> Result<(AdmissionService, PhaseId), AppError> {
    let store = MemoryItemStore::new();
    let phase = seed_sample_phase(&store, quorum).map_err(DistributionError::from)?;
    let service = ReviewDistributionService::new(Arc::new(store), AdmissionReview);
    let items = load_roster(None)?;
    seed_targets(&service, &phase, &items, 2)?;
    service.import_items(&phase, items)?;
    Ok((service, phase))
}
