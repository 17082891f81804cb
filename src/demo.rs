use crate::infra::{
    load_roster, reviewers, seed_sample_phase, seed_targets, AdmissionService, SAMPLE_APPROVERS,
    SAMPLE_EVALUATORS,
};
use clap::Args;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use review_engine::distribution::{
    AdmissionReview, BucketProgress, Column, GroupId, ItemStatus, MemoryItemStore, PhaseId,
    ReviewDistributionService, Tier, Verdict,
};
use review_engine::error::AppError;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

const REJECTION_REASONS: [&str; 3] = [
    "missing transcript",
    "income proof expired",
    "late submission",
];

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Roster CSV (item_id,course,modality plus optional attribute columns). Defaults to the bundled sample.
    #[arg(long)]
    pub(crate) roster: Option<PathBuf>,
    /// Evaluators required per item
    #[arg(long, default_value_t = 2)]
    pub(crate) quorum: u8,
    /// Items each evaluator pulls after the initial seeding
    #[arg(long, default_value_t = 4)]
    pub(crate) batch: usize,
    /// Seat count applied to every bucket found in the roster
    #[arg(long, default_value_t = 2)]
    pub(crate) seats: u32,
    /// Seed for shuffling and simulated verdicts
    #[arg(long, default_value_t = 2024)]
    pub(crate) seed: u64,
    /// Stop before the approver tier settles disagreements
    #[arg(long)]
    pub(crate) skip_approval: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        roster,
        quorum,
        batch,
        seats,
        seed,
        skip_approval,
    } = args;
    let mut rng = StdRng::seed_from_u64(seed);

    let store = MemoryItemStore::new();
    let phase = seed_sample_phase(&store, quorum)
        .map_err(review_engine::distribution::DistributionError::from)?;
    let service: AdmissionService =
        ReviewDistributionService::new(Arc::new(store), AdmissionReview);

    println!("Review distribution demo (phase {phase}, quorum {quorum})");
    if let Err(err) = service.validate_phase(&phase) {
        println!("  Phase configuration rejected: {err}");
        return Ok(());
    }

    let items = load_roster(roster.as_deref())?;
    let buckets = seed_targets(&service, &phase, &items, seats)?;
    let first_course = items.first().map(|item| item.course.clone());
    let imported = service.import_items(&phase, items)?;
    println!("- Imported {imported} items across {buckets} buckets ({seats} seats each)");

    if let Some(course) = first_course {
        let groups = BTreeMap::from([(course.clone(), GroupId("evaluators".to_string()))]);
        let report = service.distribute_initial_with(
            &phase,
            &Column::Course,
            &groups,
            Tier::Evaluator,
            &mut rng,
        )?;
        for group in &report.groups {
            println!(
                "- Seeded {} '{}' items to {} in {} subgroups",
                group.assigned, group.value, group.group, group.subgroups
            );
        }
    }

    println!("\nEvaluator pulls (batch of {batch})");
    for name in reviewers(&SAMPLE_EVALUATORS) {
        let outcome = service.acquire_batch(&phase, &name, Tier::Evaluator, batch)?;
        println!(
            "  - {name}: {} items ({} partially staffed, {} unstaffed, {} from ranked buckets)",
            outcome.total(),
            outcome.partially_staffed,
            outcome.unstaffed,
            outcome.ranked_buckets
        );
    }

    let mut decided = BTreeMap::<&'static str, usize>::new();
    for name in reviewers(&SAMPLE_EVALUATORS) {
        for item in service.pending_items(&phase, &name, Tier::Evaluator)? {
            let verdict = simulated_verdict(&mut rng);
            let status = service.record_review(&phase, &item.id, &name, verdict, true)?;
            if status.is_decided() || status == ItemStatus::PendingApprover {
                *decided.entry(status.label()).or_default() += 1;
            }
        }
    }
    println!("\nEvaluator outcomes");
    for (status, count) in &decided {
        println!("  - {status}: {count}");
    }

    if !skip_approval {
        settle_disagreements(&service, &phase)?;
    }

    println!("\nBucket progress (least served first)");
    render_progress(&service.progress_report(&phase)?);
    Ok(())
}

fn simulated_verdict(rng: &mut StdRng) -> Verdict {
    if rng.gen_bool(0.75) {
        Verdict::Approved
    } else {
        let reason = REJECTION_REASONS[rng.gen_range(0..REJECTION_REASONS.len())];
        Verdict::Rejected {
            reason: reason.to_string(),
        }
    }
}

fn settle_disagreements(service: &AdmissionService, phase: &PhaseId) -> Result<(), AppError> {
    println!("\nApprover tier");
    for name in reviewers(&SAMPLE_APPROVERS) {
        let outcome = service.acquire_batch(phase, &name, Tier::Approver, 100)?;
        println!("  - {name} pulled {} split items", outcome.awaiting_approval);
        for item in service.pending_items(phase, &name, Tier::Approver)? {
            let status = service.record_approval(phase, &item.id, &name, Verdict::Approved)?;
            println!("    {} -> {}", item.id, status.label());
        }
    }
    Ok(())
}

fn render_progress(rows: &[BucketProgress]) {
    for row in rows {
        println!(
            "  - {}: {} evaluations for {} seats | {:.0}% quota met | {:.0}% in analysis{}",
            row.bucket,
            row.evaluated,
            row.target,
            row.quota_met,
            row.in_analysis,
            if row.goal_reached { " | goal reached" } else { "" }
        );
    }
}
