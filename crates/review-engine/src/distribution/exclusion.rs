use std::collections::HashMap;

use super::domain::{Column, ExclusionRule, GroupId, PhaseId, ReviewerId, WorkItem};
use super::store::{StoreError, StoreTransaction};

/// OR of `column == value` clauses. With no clauses nothing is excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionPredicate {
    clauses: Vec<(Column, String)>,
}

impl ExclusionPredicate {
    pub fn none() -> Self {
        Self::default()
    }

    /// Combines the phase's rules whose group passes `is_member`.
    pub fn for_rules<F>(rules: &[ExclusionRule], phase: &PhaseId, mut is_member: F) -> Self
    where
        F: FnMut(&GroupId) -> bool,
    {
        let mut clauses: Vec<(Column, String)> = Vec::new();
        for rule in rules.iter().filter(|rule| &rule.phase == phase) {
            if !is_member(&rule.excluded_group) {
                continue;
            }
            let clause = (rule.column.clone(), rule.value.clone());
            if !clauses.contains(&clause) {
                clauses.push(clause);
            }
        }
        Self { clauses }
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[(Column, String)] {
        &self.clauses
    }

    pub fn matches(&self, item: &WorkItem) -> bool {
        self.clauses
            .iter()
            .any(|(column, value)| column.matches(item, value))
    }
}

/// Resolves which items a reviewer must never be handed in a phase.
pub struct ExclusionRuleEngine;

impl ExclusionRuleEngine {
    pub fn excluded_predicate(
        tx: &dyn StoreTransaction,
        phase: &PhaseId,
        reviewer: &ReviewerId,
    ) -> Result<ExclusionPredicate, StoreError> {
        let rules = tx.exclusion_rules(phase)?;
        if rules.is_empty() {
            return Ok(ExclusionPredicate::none());
        }

        let mut membership: HashMap<GroupId, bool> = HashMap::new();
        for rule in &rules {
            if membership.contains_key(&rule.excluded_group) {
                continue;
            }
            // a rule naming a deleted group excludes nobody
            let is_member = tx
                .members_of(&rule.excluded_group)?
                .map(|members| members.contains(reviewer))
                .unwrap_or(false);
            membership.insert(rule.excluded_group.clone(), is_member);
        }

        Ok(ExclusionPredicate::for_rules(&rules, phase, |group| {
            membership.get(group).copied().unwrap_or(false)
        }))
    }
}
