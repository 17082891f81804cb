use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! display_inner {
    ($($name:ident),+ $(,)?) => {
        $(
            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }
        )+
    };
}

/// Identifier wrapper for a review phase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PhaseId(pub String);

/// Identifier wrapper for a reviewer account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReviewerId(pub String);

/// Identifier wrapper for a reviewer group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub String);

/// Identifier wrapper for an item under review.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub String);

display_inner!(PhaseId, ReviewerId, GroupId, ItemId);

/// Reviewer tier. Evaluators give the first verdicts, approvers settle disagreements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Evaluator,
    Approver,
}

impl Tier {
    pub const fn label(self) -> &'static str {
        match self {
            Tier::Evaluator => "evaluator",
            Tier::Approver => "approver",
        }
    }

    /// Number of distinct reviewers an item needs in this tier.
    pub fn required_count(self, phase: &Phase) -> usize {
        match self {
            Tier::Evaluator => usize::from(phase.quorum),
            Tier::Approver => 1,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Storage tag for the family of items a phase reviews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindTag {
    Admission,
    Appeal,
    ScoreAdjustment,
}

impl KindTag {
    pub const fn label(self) -> &'static str {
        match self {
            KindTag::Admission => "admission",
            KindTag::Appeal => "appeal",
            KindTag::ScoreAdjustment => "score_adjustment",
        }
    }
}

/// Progress bucket: one course offered under one admission modality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CategoryBucket {
    pub course: String,
    pub modality: String,
}

impl CategoryBucket {
    pub fn new(course: impl Into<String>, modality: impl Into<String>) -> Self {
        Self {
            course: course.into(),
            modality: modality.into(),
        }
    }
}

impl fmt::Display for CategoryBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.course, self.modality)
    }
}

/// Attribute names are stored trimmed and lowercased so rosters and rules agree on them.
pub fn attribute_name(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// Categorizing column used by distribution maps and exclusion rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Column {
    Course,
    Modality,
    Attribute(String),
}

impl Column {
    pub fn value_of<'a>(&self, item: &'a WorkItem) -> Option<&'a str> {
        match self {
            Column::Course => Some(item.course.as_str()),
            Column::Modality => Some(item.modality.as_str()),
            Column::Attribute(name) => item
                .attributes
                .get(&attribute_name(name))
                .map(String::as_str),
        }
    }

    pub fn matches(&self, item: &WorkItem, value: &str) -> bool {
        self.value_of(item) == Some(value)
    }
}

impl From<String> for Column {
    fn from(value: String) -> Self {
        let name = attribute_name(&value);
        match name.as_str() {
            "course" => Column::Course,
            "modality" => Column::Modality,
            _ => Column::Attribute(name),
        }
    }
}

impl From<Column> for String {
    fn from(value: Column) -> Self {
        match value {
            Column::Course => "course".to_string(),
            Column::Modality => "modality".to_string(),
            Column::Attribute(name) => name,
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Column::Course => f.write_str("course"),
            Column::Modality => f.write_str("modality"),
            Column::Attribute(name) => f.write_str(name),
        }
    }
}

/// Position of an item in the staffing and verdict lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    NoReviewers,
    PartiallyStaffed,
    FullyStaffed,
    PendingApprover,
    Approved,
    Rejected,
}

impl ItemStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ItemStatus::NoReviewers => "no_reviewers",
            ItemStatus::PartiallyStaffed => "partially_staffed",
            ItemStatus::FullyStaffed => "fully_staffed",
            ItemStatus::PendingApprover => "pending_approver",
            ItemStatus::Approved => "approved",
            ItemStatus::Rejected => "rejected",
        }
    }

    pub const fn is_decided(self) -> bool {
        matches!(self, ItemStatus::Approved | ItemStatus::Rejected)
    }

    /// Staffing state after an evaluator mailbox change. Later states are kept as-is.
    pub fn staffed(self, owners: usize, quorum: usize) -> Self {
        match self {
            ItemStatus::NoReviewers | ItemStatus::PartiallyStaffed | ItemStatus::FullyStaffed => {
                if owners == 0 {
                    ItemStatus::NoReviewers
                } else if owners < quorum {
                    ItemStatus::PartiallyStaffed
                } else {
                    ItemStatus::FullyStaffed
                }
            }
            other => other,
        }
    }
}

/// An admission application, appeal, or score adjustment awaiting review in one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: ItemId,
    pub kind: KindTag,
    pub phase: PhaseId,
    pub course: String,
    pub modality: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub status: ItemStatus,
}

impl WorkItem {
    pub fn bucket(&self) -> CategoryBucket {
        CategoryBucket::new(self.course.clone(), self.modality.clone())
    }

    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.kind, &self.phase, &self.id)
    }
}

/// Storage identity of an item. The same id may be imported into several phases and kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    pub kind: KindTag,
    pub phase: PhaseId,
    pub id: ItemId,
}

impl ItemKey {
    pub fn new(kind: KindTag, phase: &PhaseId, id: &ItemId) -> Self {
        Self {
            kind,
            phase: phase.clone(),
            id: id.clone(),
        }
    }
}

/// Item payload accepted at import time, before a phase and status are attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub id: ItemId,
    pub course: String,
    pub modality: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl NewItem {
    pub fn into_work_item(self, kind: KindTag, phase: PhaseId) -> WorkItem {
        WorkItem {
            id: self.id,
            kind,
            phase,
            course: self.course,
            modality: self.modality,
            attributes: self
                .attributes
                .into_iter()
                .map(|(name, value)| (attribute_name(&name), value))
                .collect(),
            status: ItemStatus::NoReviewers,
        }
    }
}

/// Period during which reviewers may pull, move, and submit work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewWindow {
    pub opens_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
}

impl ReviewWindow {
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.opens_at <= now && now <= self.closes_at
    }
}

/// Review round configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub id: PhaseId,
    pub name: String,
    pub kind: KindTag,
    pub quorum: u8,
    pub requires_approver: bool,
    pub evaluator_group: GroupId,
    pub approver_group: Option<GroupId>,
    pub window: ReviewWindow,
}

impl Phase {
    pub fn group_for(&self, tier: Tier) -> Option<&GroupId> {
        match tier {
            Tier::Evaluator => Some(&self.evaluator_group),
            Tier::Approver => self.approver_group.as_ref(),
        }
    }
}

/// Reviewers in `excluded_group` never receive items whose `column` equals `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionRule {
    pub phase: PhaseId,
    pub column: Column,
    pub value: String,
    pub excluded_group: GroupId,
}

/// A single reviewer's verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum Verdict {
    Approved,
    Rejected { reason: String },
}

impl Verdict {
    pub fn decided_status(&self) -> ItemStatus {
        match self {
            Verdict::Approved => ItemStatus::Approved,
            Verdict::Rejected { .. } => ItemStatus::Rejected,
        }
    }
}

/// One reviewer's review of one item in one tier. Approver reviews are always complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub kind: KindTag,
    pub phase: PhaseId,
    pub item: ItemId,
    pub reviewer: ReviewerId,
    pub tier: Tier,
    pub verdict: Verdict,
    pub completed: bool,
}

impl Review {
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.kind, &self.phase, &self.item)
    }
}
