use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::domain::{
    ExclusionRule, GroupId, ItemId, ItemKey, ItemStatus, KindTag, Phase, PhaseId, Review, ReviewerId,
    Tier, WorkItem,
};
use super::store::{
    ItemQuery, ItemStore, MailboxKey, Membership, ProgressCounter, ProgressField, ProgressKey,
    StoreError, StoreTransaction,
};

#[derive(Debug, Default, Clone)]
struct StoreState {
    phases: HashMap<PhaseId, Phase>,
    groups: HashMap<GroupId, Vec<ReviewerId>>,
    rules: Vec<ExclusionRule>,
    items: HashMap<ItemKey, WorkItem>,
    order: Vec<ItemKey>,
    mailboxes: HashMap<MailboxKey, Vec<ItemId>>,
    reviews: Vec<Review>,
    progress: BTreeMap<ProgressKey, ProgressCounter>,
}

impl StoreState {
    fn owners(&self, kind: KindTag, phase: &PhaseId, tier: Tier, item: &ItemId) -> Vec<ReviewerId> {
        let mut owners: Vec<ReviewerId> = self
            .mailboxes
            .iter()
            .filter_map(|(key, items)| match key {
                MailboxKey::Reviewer {
                    kind: key_kind,
                    phase: key_phase,
                    tier: key_tier,
                    reviewer,
                } if *key_kind == kind
                    && key_phase == phase
                    && *key_tier == tier
                    && items.contains(item) =>
                {
                    Some(reviewer.clone())
                }
                _ => None,
            })
            .collect();
        owners.sort();
        owners
    }

    fn in_group_mailbox(&self, kind: KindTag, phase: &PhaseId, tier: Tier, item: &ItemId) -> bool {
        self.mailboxes.iter().any(|(key, items)| {
            matches!(
                key,
                MailboxKey::Group {
                    kind: key_kind,
                    phase: key_phase,
                    tier: key_tier,
                    ..
                } if *key_kind == kind && key_phase == phase && *key_tier == tier
            ) && items.contains(item)
        })
    }

    fn satisfies(&self, query: &ItemQuery, item: &WorkItem) -> bool {
        query.membership.iter().all(|rule| match rule {
            Membership::NotInMailbox(key) => !self
                .mailboxes
                .get(key)
                .map(|items| items.contains(&item.id))
                .unwrap_or(false),
            Membership::NoGroupMailbox(tier) => {
                !self.in_group_mailbox(query.kind, &query.phase, *tier, &item.id)
            }
            Membership::OwnersBelow { tier, limit } => {
                self.owners(query.kind, &query.phase, *tier, &item.id).len() < *limit
            }
            Membership::NotReviewedBy(reviewer) => !self
                .reviews
                .iter()
                .any(|review| &review.reviewer == reviewer && review.key() == item.key()),
        })
    }
}

/// Reference store keeping every record in process memory.
///
/// Transactions run one at a time behind a single lock against a working copy that replaces
/// the committed state only on success, so concurrent claims can never interleave.
#[derive(Debug, Default)]
pub struct MemoryItemStore {
    state: Mutex<StoreState>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    pub fn insert_phase(&self, phase: Phase) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.phases.contains_key(&phase.id) {
            return Err(StoreError::Conflict(format!("phase {}", phase.id)));
        }
        state.phases.insert(phase.id.clone(), phase);
        Ok(())
    }

    /// Creates or replaces a group's member list.
    pub fn upsert_group(&self, group: GroupId, members: Vec<ReviewerId>) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let mut members = members;
        members.sort();
        members.dedup();
        state.groups.insert(group, members);
        Ok(())
    }

    pub fn add_exclusion_rule(&self, rule: ExclusionRule) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.rules.push(rule);
        Ok(())
    }
}

impl ItemStore for MemoryItemStore {
    fn atomically<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut committed = self.lock()?;
        let mut working = committed.clone();
        let outcome = work(&mut MemoryTransaction {
            state: &mut working,
        });
        if outcome.is_ok() {
            *committed = working;
        }
        outcome
    }
}

struct MemoryTransaction<'a> {
    state: &'a mut StoreState,
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn phase(&self, id: &PhaseId) -> Result<Option<Phase>, StoreError> {
        Ok(self.state.phases.get(id).cloned())
    }

    fn members_of(&self, group: &GroupId) -> Result<Option<Vec<ReviewerId>>, StoreError> {
        Ok(self.state.groups.get(group).cloned())
    }

    fn exclusion_rules(&self, phase: &PhaseId) -> Result<Vec<ExclusionRule>, StoreError> {
        Ok(self
            .state
            .rules
            .iter()
            .filter(|rule| &rule.phase == phase)
            .cloned()
            .collect())
    }

    fn item(&self, key: &ItemKey) -> Result<Option<WorkItem>, StoreError> {
        Ok(self.state.items.get(key).cloned())
    }

    fn find(&self, query: &ItemQuery) -> Result<Vec<WorkItem>, StoreError> {
        let limit = query.limit.unwrap_or(usize::MAX);
        let mut found = Vec::new();
        for key in &self.state.order {
            if found.len() >= limit {
                break;
            }
            let Some(item) = self.state.items.get(key) else {
                continue;
            };
            if query.matches_item(item) && self.state.satisfies(query, item) {
                found.push(item.clone());
            }
        }
        Ok(found)
    }

    fn insert_items(&mut self, items: Vec<WorkItem>) -> Result<usize, StoreError> {
        let mut created = 0;
        for item in items {
            let key = item.key();
            if self.state.items.contains_key(&key) {
                continue;
            }
            self.state.order.push(key.clone());
            self.state.items.insert(key, item);
            created += 1;
        }
        Ok(created)
    }

    fn set_status(&mut self, item: &ItemKey, status: ItemStatus) -> Result<(), StoreError> {
        let record = self
            .state
            .items
            .get_mut(item)
            .ok_or_else(|| StoreError::Missing(format!("item {} in phase {}", item.id, item.phase)))?;
        record.status = status;
        Ok(())
    }

    fn mailbox(&self, key: &MailboxKey) -> Result<Option<Vec<ItemId>>, StoreError> {
        Ok(self.state.mailboxes.get(key).cloned())
    }

    fn add_to_mailbox(&mut self, key: &MailboxKey, items: &[ItemId]) -> Result<usize, StoreError> {
        let mailbox = self.state.mailboxes.entry(key.clone()).or_default();
        let mut added = 0;
        for item in items {
            if !mailbox.contains(item) {
                mailbox.push(item.clone());
                added += 1;
            }
        }
        Ok(added)
    }

    fn remove_from_mailbox(
        &mut self,
        key: &MailboxKey,
        items: &[ItemId],
    ) -> Result<usize, StoreError> {
        let Some(mailbox) = self.state.mailboxes.get_mut(key) else {
            return Ok(0);
        };
        let before = mailbox.len();
        mailbox.retain(|item| !items.contains(item));
        Ok(before - mailbox.len())
    }

    fn mailbox_owners(
        &self,
        kind: KindTag,
        phase: &PhaseId,
        tier: Tier,
        item: &ItemId,
    ) -> Result<Vec<ReviewerId>, StoreError> {
        Ok(self.state.owners(kind, phase, tier, item))
    }

    fn reviews(&self, item: &ItemKey, tier: Tier) -> Result<Vec<Review>, StoreError> {
        Ok(self
            .state
            .reviews
            .iter()
            .filter(|review| review.tier == tier && &review.key() == item)
            .cloned()
            .collect())
    }

    fn save_review(&mut self, review: Review) -> Result<(), StoreError> {
        let existing = self.state.reviews.iter_mut().find(|stored| {
            stored.key() == review.key()
                && stored.reviewer == review.reviewer
                && stored.tier == review.tier
        });
        match existing {
            Some(stored) => *stored = review,
            None => self.state.reviews.push(review),
        }
        Ok(())
    }

    fn progress(&self, phase: &PhaseId) -> Result<Vec<(ProgressKey, ProgressCounter)>, StoreError> {
        Ok(self
            .state
            .progress
            .iter()
            .filter(|(key, _)| &key.phase == phase)
            .map(|(key, counter)| (key.clone(), *counter))
            .collect())
    }

    fn set_target(&mut self, key: &ProgressKey, target: u32) -> Result<(), StoreError> {
        self.state.progress.entry(key.clone()).or_default().target = target;
        Ok(())
    }

    fn increment(
        &mut self,
        key: &ProgressKey,
        field: ProgressField,
        delta: i64,
    ) -> Result<(), StoreError> {
        let Some(counter) = self.state.progress.get_mut(key) else {
            return Ok(());
        };
        let slot = match field {
            ProgressField::Evaluated => &mut counter.evaluated,
            ProgressField::InProgress => &mut counter.in_progress,
        };
        let next = (i64::from(*slot) + delta).clamp(0, i64::from(u32::MAX));
        *slot = u32::try_from(next).unwrap_or(u32::MAX);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::domain::CategoryBucket;

    fn item(id: &str) -> WorkItem {
        WorkItem {
            id: ItemId(id.to_string()),
            kind: KindTag::Admission,
            phase: PhaseId("phase-1".to_string()),
            course: "nursing".to_string(),
            modality: "open".to_string(),
            attributes: BTreeMap::new(),
            status: ItemStatus::NoReviewers,
        }
    }

    #[test]
    fn failed_transaction_discards_writes() {
        let store = MemoryItemStore::new();
        let result: Result<(), StoreError> = store.atomically(|tx| {
            tx.insert_items(vec![item("a-1")])?;
            Err(StoreError::Unavailable("boom".to_string()))
        });
        assert!(result.is_err());

        let key = ItemKey::new(
            KindTag::Admission,
            &PhaseId("phase-1".to_string()),
            &ItemId("a-1".to_string()),
        );
        let found = store
            .atomically(|tx| tx.item(&key))
            .expect("read succeeds");
        assert!(found.is_none());
    }

    #[test]
    fn ids_and_reviews_are_scoped_to_their_phase() {
        let store = MemoryItemStore::new();
        let mut later = item("a-1");
        later.phase = PhaseId("phase-2".to_string());
        let first = item("a-1");
        let created = store
            .atomically(|tx| tx.insert_items(vec![first.clone(), later.clone()]))
            .expect("insert succeeds");
        assert_eq!(created, 2);

        let reviews = store
            .atomically(|tx| {
                tx.save_review(Review {
                    kind: KindTag::Admission,
                    phase: first.phase.clone(),
                    item: first.id.clone(),
                    reviewer: ReviewerId("ana".to_string()),
                    tier: Tier::Evaluator,
                    verdict: crate::distribution::domain::Verdict::Approved,
                    completed: true,
                })?;
                tx.set_status(&first.key(), ItemStatus::Approved)?;
                Ok::<_, StoreError>((
                    tx.reviews(&first.key(), Tier::Evaluator)?.len(),
                    tx.reviews(&later.key(), Tier::Evaluator)?.len(),
                    tx.item(&later.key())?.map(|item| item.status),
                ))
            })
            .expect("review saved");
        assert_eq!(reviews, (1, 0, Some(ItemStatus::NoReviewers)));
    }

    #[test]
    fn find_respects_import_order_and_limit() {
        let store = MemoryItemStore::new();
        let created = store
            .atomically(|tx| tx.insert_items(vec![item("c"), item("a"), item("b"), item("a")]))
            .expect("insert succeeds");
        assert_eq!(created, 3);

        let query = ItemQuery::new(KindTag::Admission, PhaseId("phase-1".to_string())).limit(2);
        let ids: Vec<String> = store
            .atomically(|tx| tx.find(&query))
            .expect("find succeeds")
            .into_iter()
            .map(|item| item.id.0)
            .collect();
        assert_eq!(ids, vec!["c".to_string(), "a".to_string()]);
    }

    #[test]
    fn increment_ignores_missing_counters_and_floors_at_zero() {
        let store = MemoryItemStore::new();
        let key = ProgressKey {
            phase: PhaseId("phase-1".to_string()),
            bucket: CategoryBucket::new("nursing", "open"),
        };
        let counters = store
            .atomically(|tx| {
                tx.increment(&key, ProgressField::InProgress, 1)?;
                assert!(tx.progress(&key.phase)?.is_empty());
                tx.set_target(&key, 4)?;
                tx.increment(&key, ProgressField::InProgress, 2)?;
                tx.increment(&key, ProgressField::Evaluated, -3)?;
                tx.progress(&key.phase)
            })
            .expect("counters update");
        assert_eq!(
            counters,
            vec![(
                key,
                ProgressCounter {
                    target: 4,
                    evaluated: 0,
                    in_progress: 2
                }
            )]
        );
    }
}
