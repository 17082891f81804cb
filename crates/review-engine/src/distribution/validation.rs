use std::collections::BTreeSet;

use super::domain::{GroupId, Phase, ReviewerId};

/// Misconfiguration the administrator has to fix; never retried by the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("phase quorum must be at least one reviewer")]
    QuorumZero,
    #[error("review window closes before it opens")]
    WindowInverted,
    #[error("phase requires an approver tier but no approver group is set")]
    MissingApproverGroup,
    #[error("approver group {0} has no members")]
    EmptyApproverGroup(GroupId),
    #[error("reviewer {0} belongs to both the evaluator and the approver group")]
    OverlappingGroups(ReviewerId),
    #[error("group {group} has {members} member(s) but subgroups need {required}")]
    InsufficientMembers {
        group: GroupId,
        members: usize,
        required: usize,
    },
}

/// Checks a phase against the member lists of its groups.
pub fn validate_phase(
    phase: &Phase,
    evaluators: &[ReviewerId],
    approvers: Option<&[ReviewerId]>,
) -> Result<(), ConfigurationError> {
    if phase.quorum == 0 {
        return Err(ConfigurationError::QuorumZero);
    }
    if phase.window.closes_at < phase.window.opens_at {
        return Err(ConfigurationError::WindowInverted);
    }
    if phase.requires_approver && phase.approver_group.is_none() {
        return Err(ConfigurationError::MissingApproverGroup);
    }

    if let (Some(group), Some(approvers)) = (&phase.approver_group, approvers) {
        if approvers.is_empty() {
            return Err(ConfigurationError::EmptyApproverGroup(group.clone()));
        }
        let evaluator_set: BTreeSet<&ReviewerId> = evaluators.iter().collect();
        if let Some(shared) = approvers
            .iter()
            .find(|reviewer| evaluator_set.contains(reviewer))
        {
            return Err(ConfigurationError::OverlappingGroups(shared.clone()));
        }
    }

    let distinct = evaluators.iter().collect::<BTreeSet<_>>().len();
    let required = usize::from(phase.quorum);
    if distinct < required {
        return Err(ConfigurationError::InsufficientMembers {
            group: phase.evaluator_group.clone(),
            members: distinct,
            required,
        });
    }

    Ok(())
}
