use super::common::*;
use crate::distribution::{
    CategoryBucket, DistributionError, PhaseId, ProgressCounter, ProgressKey, ProgressTracker,
};

fn counter(bucket: &str, target: u32, evaluated: u32, in_progress: u32) -> (ProgressKey, ProgressCounter) {
    (
        ProgressKey {
            phase: phase_id(),
            bucket: CategoryBucket::new(bucket, "open"),
        },
        ProgressCounter {
            target,
            evaluated,
            in_progress,
        },
    )
}

fn courses(buckets: Vec<CategoryBucket>) -> Vec<String> {
    buckets.into_iter().map(|bucket| bucket.course).collect()
}

#[test]
fn least_served_buckets_rank_first() {
    let counters = vec![
        counter("Architecture", 10, 10, 0),
        counter("Biology", 4, 2, 0),
        counter("Chemistry", 4, 0, 3),
        counter("Dentistry", 4, 0, 1),
        counter("Economics", 0, 0, 0),
    ];

    let ranked = ProgressTracker::ranked_pending_buckets(&counters, 1);
    assert_eq!(courses(ranked), vec!["Dentistry", "Chemistry", "Biology"]);
}

#[test]
fn ties_fall_back_to_bucket_order() {
    let counters = vec![counter("Law", 5, 1, 0), counter("Geography", 5, 1, 0)];
    let ranked = ProgressTracker::ranked_pending_buckets(&counters, 1);
    assert_eq!(courses(ranked), vec!["Geography", "Law"]);
}

#[test]
fn quota_accounts_for_the_quorum() {
    let counters = vec![counter("Law", 2, 3, 0), counter("Music", 2, 4, 0)];
    let ranked = ProgressTracker::ranked_pending_buckets(&counters, 2);
    assert_eq!(courses(ranked), vec!["Law"]);
}

#[test]
fn report_lists_pending_buckets_before_settled_ones() {
    let counters = vec![
        counter("Architecture", 2, 4, 0),
        counter("Biology", 4, 2, 4),
        counter("Chemistry", 0, 0, 0),
    ];
    let rows = ProgressTracker::report(&counters, 2);

    let order: Vec<&str> = rows.iter().map(|row| row.bucket.course.as_str()).collect();
    assert_eq!(order, vec!["Biology", "Architecture", "Chemistry"]);

    assert!(!rows[0].goal_reached);
    assert_eq!(rows[0].quota_met, 25.0);
    assert_eq!(rows[0].in_analysis, 50.0);
    assert!(rows[1].goal_reached);
    assert_eq!(rows[1].quota_met, 100.0);
    assert!(!rows[2].goal_reached);
    assert_eq!(rows[2].quota_met, 0.0);
}

#[test]
fn targets_come_from_seats_times_multiplier() {
    let (service, _) = build_service(phase(2, false), &["ana", "bruno"], &[]);

    let set = service
        .set_bucket_target(&phase_id(), CategoryBucket::new("Law", "open"), 5, 3)
        .expect("target set");
    assert_eq!(set, Some(15));

    let skipped = service
        .set_bucket_target(&phase_id(), CategoryBucket::new("Music", "open"), 0, 3)
        .expect("zero seats accepted");
    assert_eq!(skipped, None);

    let report = service.progress_report(&phase_id()).expect("report builds");
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].target, 15);
}

#[test]
fn completed_reviews_and_claims_move_the_counters() {
    let (service, _) = build_service(phase(1, false), &["ana"], &[]);
    target(&service, "Law", "open", 2);
    service
        .import_items(
            &phase_id(),
            vec![new_item("a-1", "Law", "open"), new_item("a-2", "Law", "open")],
        )
        .expect("items import");

    service
        .acquire_batch(&phase_id(), &reviewer("ana"), crate::distribution::Tier::Evaluator, 2)
        .expect("batch acquired");
    service
        .record_review(
            &phase_id(),
            &item_id("a-1"),
            &reviewer("ana"),
            crate::distribution::Verdict::Approved,
            true,
        )
        .expect("review recorded");

    let report = service.progress_report(&phase_id()).expect("report builds");
    assert_eq!(report[0].in_progress, 2);
    assert_eq!(report[0].evaluated, 1);
    assert_eq!(report[0].quota_met, 50.0);
}

#[test]
fn unknown_phase_has_no_report() {
    let (service, _) = build_service(phase(1, false), &["ana"], &[]);
    let error = service
        .progress_report(&PhaseId("missing".to_string()))
        .expect_err("phase is unknown");
    assert!(matches!(error, DistributionError::PhaseNotFound(_)));
}
