use std::sync::Arc;

use super::common::*;
use crate::distribution::{
    Appeal, DistributionError, GroupId, ItemStatus, KindTag, MemoryItemStore,
    ReviewDistributionService, Tier, Verdict,
};

fn rejected(reason: &str) -> Verdict {
    Verdict::Rejected {
        reason: reason.to_string(),
    }
}

fn staffed(requires_approver: bool) -> (AdmissionService, Arc<MemoryItemStore>) {
    let (service, store) =
        build_service(phase(2, requires_approver), &["ana", "bruno", "carla"], &["dora"]);
    target(&service, "Law", "open", 1);
    service
        .import_items(&phase_id(), vec![new_item("a-1", "Law", "open")])
        .expect("items import");
    for name in ["ana", "bruno"] {
        service
            .acquire_batch(&phase_id(), &reviewer(name), Tier::Evaluator, 1)
            .expect("batch acquired");
    }
    (service, store)
}

fn review(service: &AdmissionService, name: &str, verdict: Verdict) -> ItemStatus {
    service
        .record_review(&phase_id(), &item_id("a-1"), &reviewer(name), verdict, true)
        .expect("review recorded")
}

#[test]
fn unanimous_approval_decides_the_item() {
    let (service, store) = staffed(false);
    assert_eq!(review(&service, "ana", Verdict::Approved), ItemStatus::FullyStaffed);
    assert_eq!(review(&service, "bruno", Verdict::Approved), ItemStatus::Approved);
    assert_eq!(status(&store, "a-1"), ItemStatus::Approved);

    let report = service.progress_report(&phase_id()).expect("report builds");
    assert_eq!(report[0].evaluated, 2);
    assert!(report[0].goal_reached);
}

#[test]
fn shared_rejection_reason_rejects() {
    let (service, _) = staffed(false);
    review(&service, "ana", rejected("missing transcript"));
    assert_eq!(
        review(&service, "bruno", rejected("missing transcript")),
        ItemStatus::Rejected
    );
}

#[test]
fn disagreement_waits_for_the_approver() {
    let (service, store) = staffed(true);
    review(&service, "ana", rejected("missing transcript"));
    assert_eq!(
        review(&service, "bruno", rejected("late submission")),
        ItemStatus::PendingApprover
    );

    let early = service
        .record_approval(&phase_id(), &item_id("a-1"), &reviewer("dora"), Verdict::Approved)
        .expect_err("dora holds nothing yet");
    assert!(matches!(early, DistributionError::NotAssigned { .. }));

    service
        .acquire_batch(&phase_id(), &reviewer("dora"), Tier::Approver, 1)
        .expect("approver batch");
    assert!(service
        .has_pending(&phase_id(), &reviewer("dora"), Tier::Approver)
        .expect("pending check"));

    let decided = service
        .record_approval(&phase_id(), &item_id("a-1"), &reviewer("dora"), rejected("late submission"))
        .expect("approval recorded");
    assert_eq!(decided, ItemStatus::Rejected);
    assert_eq!(status(&store, "a-1"), ItemStatus::Rejected);
    assert!(!service
        .has_pending(&phase_id(), &reviewer("dora"), Tier::Approver)
        .expect("pending check"));

    let again = service
        .record_approval(&phase_id(), &item_id("a-1"), &reviewer("dora"), Verdict::Approved)
        .expect_err("already decided");
    assert!(matches!(again, DistributionError::NotAwaitingApproval { .. }));
}

#[test]
fn split_without_approver_tier_stays_pending() {
    let (service, _) = staffed(false);
    review(&service, "ana", Verdict::Approved);
    assert_eq!(
        review(&service, "bruno", rejected("late submission")),
        ItemStatus::PendingApprover
    );
    let error = service
        .record_approval(&phase_id(), &item_id("a-1"), &reviewer("dora"), Verdict::Approved)
        .expect_err("no approver tier");
    assert!(matches!(error, DistributionError::ApproverTierDisabled(_)));
}

#[test]
fn completed_reviews_are_locked_and_drafts_are_not() {
    let (service, _) = staffed(false);
    let draft = service
        .record_review(&phase_id(), &item_id("a-1"), &reviewer("ana"), Verdict::Approved, false)
        .expect("draft saved");
    assert_eq!(draft, ItemStatus::FullyStaffed);
    assert!(service
        .has_pending(&phase_id(), &reviewer("ana"), Tier::Evaluator)
        .expect("pending check"));

    review(&service, "ana", rejected("missing transcript"));
    assert!(!service
        .has_pending(&phase_id(), &reviewer("ana"), Tier::Evaluator)
        .expect("pending check"));

    let locked = service
        .record_review(&phase_id(), &item_id("a-1"), &reviewer("ana"), Verdict::Approved, true)
        .expect_err("completed review is immutable");
    assert!(matches!(locked, DistributionError::ReviewLocked { .. }));
}

#[test]
fn only_assigned_reviewers_may_review() {
    let (service, _) = staffed(false);
    let error = service
        .record_review(&phase_id(), &item_id("a-1"), &reviewer("carla"), Verdict::Approved, true)
        .expect_err("carla holds nothing");
    assert!(matches!(error, DistributionError::NotAssigned { .. }));

    let unknown = service
        .record_review(&phase_id(), &item_id("zz-9"), &reviewer("ana"), Verdict::Approved, true)
        .expect_err("unknown item");
    assert!(matches!(unknown, DistributionError::ItemNotFound(_)));
}

#[test]
fn appeals_always_reach_the_approver() {
    let mut appeal_phase = phase(2, true);
    appeal_phase.kind = KindTag::Appeal;
    let store = Arc::new(MemoryItemStore::new());
    store.insert_phase(appeal_phase).expect("phase inserts");
    store
        .upsert_group(GroupId(EVALUATORS.to_string()), reviewers(&["ana", "bruno"]))
        .expect("group inserts");
    let service = ReviewDistributionService::new(store.clone(), Appeal);
    service
        .import_items(&phase_id(), vec![new_item("ap-1", "Law", "open")])
        .expect("items import");
    for name in ["ana", "bruno"] {
        service
            .acquire_batch(&phase_id(), &reviewer(name), Tier::Evaluator, 1)
            .expect("batch acquired");
        service
            .record_review(&phase_id(), &item_id("ap-1"), &reviewer(name), Verdict::Approved, true)
            .expect("review recorded");
    }

    assert_eq!(status(&store, "ap-1"), ItemStatus::PendingApprover);
}
