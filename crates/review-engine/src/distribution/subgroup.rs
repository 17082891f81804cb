use rand::seq::SliceRandom;
use rand::Rng;

use super::domain::{GroupId, ItemId, ReviewerId};
use super::validation::ConfigurationError;

/// One slice of a group's items together with the reviewers who receive every item in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubgroupAssignment {
    pub reviewers: Vec<ReviewerId>,
    pub items: Vec<ItemId>,
}

/// Result of splitting a group mailbox across the group's members.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubgroupPlan {
    pub total_subgroups: usize,
    pub assignments: Vec<SubgroupAssignment>,
}

impl SubgroupPlan {
    pub fn items_assigned(&self) -> usize {
        self.assignments
            .iter()
            .map(|assignment| assignment.items.len())
            .sum()
    }
}

/// Splits members into subgroups of `subgroup_size` and deals items across the subgroups.
#[derive(Debug, Clone, Copy)]
pub struct SubgroupAssigner {
    subgroup_size: usize,
}

impl SubgroupAssigner {
    pub fn new(subgroup_size: usize) -> Self {
        Self { subgroup_size }
    }

    pub fn subgroup_size(&self) -> usize {
        self.subgroup_size
    }

    pub fn total_subgroups(&self, member_count: usize) -> usize {
        if self.subgroup_size == 0 {
            return 0;
        }
        member_count.div_ceil(self.subgroup_size)
    }

    /// Shuffles both lists and pairs each item chunk with one subgroup.
    ///
    /// An empty group yields an empty plan. A group with fewer members than one subgroup needs
    /// is rejected because cycling would place the same reviewer twice in a subgroup.
    pub fn plan<R>(
        &self,
        group: &GroupId,
        mut members: Vec<ReviewerId>,
        mut items: Vec<ItemId>,
        rng: &mut R,
    ) -> Result<SubgroupPlan, ConfigurationError>
    where
        R: Rng + ?Sized,
    {
        if self.subgroup_size == 0 {
            return Err(ConfigurationError::QuorumZero);
        }
        members.sort();
        members.dedup();
        if members.is_empty() {
            return Ok(SubgroupPlan::default());
        }
        if members.len() < self.subgroup_size {
            return Err(ConfigurationError::InsufficientMembers {
                group: group.clone(),
                members: members.len(),
                required: self.subgroup_size,
            });
        }

        let total_subgroups = self.total_subgroups(members.len());
        items.shuffle(rng);
        members.shuffle(rng);

        let subgroups = cycle_subgroups(&members, total_subgroups, self.subgroup_size);
        let chunks = even_chunks(items, total_subgroups);

        let assignments = chunks
            .into_iter()
            .zip(subgroups)
            .filter(|(chunk, _)| !chunk.is_empty())
            .map(|(items, reviewers)| SubgroupAssignment { reviewers, items })
            .collect();

        Ok(SubgroupPlan {
            total_subgroups,
            assignments,
        })
    }
}

/// `count` consecutive windows of `size` over `members` repeated end to end.
pub(crate) fn cycle_subgroups<T: Clone>(members: &[T], count: usize, size: usize) -> Vec<Vec<T>> {
    let mut cycle = members.iter().cycle();
    (0..count)
        .map(|_| cycle.by_ref().take(size).cloned().collect())
        .collect()
}

/// `count` chunks of `ceil(len / count)` items; trailing chunks may be short or empty.
pub(crate) fn even_chunks<T>(items: Vec<T>, count: usize) -> Vec<Vec<T>> {
    if count == 0 {
        return Vec::new();
    }
    let chunk_size = items.len().div_ceil(count);
    let mut remaining = items.into_iter();
    (0..count)
        .map(|_| remaining.by_ref().take(chunk_size).collect())
        .collect()
}
