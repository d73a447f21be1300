use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentContact {
    pub first: String,
    pub last: String,
    pub email: String,
}

/// One enrolled student as listed in the directory. Read-only reference data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub student_first: String,
    pub student_last: String,
    pub grade: String,
    pub student_email: String,
    pub parent1: ParentContact,
    pub parent2: ParentContact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Positive,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviorType {
    GoodNews,
    StopAndThink,
}

impl BehaviorType {
    /// Parses the free-form label used on the submission form, e.g.
    /// "Good News (positive behavior)" or "Stop & Think".
    pub fn from_label(label: &str) -> Option<Self> {
        if label.contains("Stop & Think") || label.eq_ignore_ascii_case("stop-and-think") {
            Some(BehaviorType::StopAndThink)
        } else if label.contains("Good News") || label.eq_ignore_ascii_case("good-news") {
            Some(BehaviorType::GoodNews)
        } else {
            None
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BehaviorType::GoodNews => "Good News",
            BehaviorType::StopAndThink => "Stop & Think",
        }
    }

    pub fn polarity(self) -> Polarity {
        match self {
            BehaviorType::GoodNews => Polarity::Positive,
            BehaviorType::StopAndThink => Polarity::Negative,
        }
    }
}

/// Behaviors as submitted: either one comma separated blob or a list of
/// selected labels.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Behaviors {
    Text(String),
    List(Vec<String>),
}

impl Behaviors {
    /// Trimmed, non-blank behavior phrases. Text is split on commas.
    pub fn normalized(&self) -> Vec<String> {
        let phrases: Vec<&str> = match self {
            Behaviors::Text(text) => text.split(',').collect(),
            Behaviors::List(items) => items.iter().map(String::as_str).collect(),
        };

        phrases
            .into_iter()
            .map(str::trim)
            .filter(|phrase| !phrase.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Display form: lists are joined with ", ".
    pub fn to_text(&self) -> String {
        match self {
            Behaviors::Text(text) => text.clone(),
            Behaviors::List(items) => items.join(", "),
        }
    }

    /// Storage columns: the display text plus the labels when this is a list.
    pub fn to_columns(&self) -> (String, Option<Vec<String>>) {
        match self {
            Behaviors::Text(text) => (text.clone(), None),
            Behaviors::List(items) => (self.to_text(), Some(items.clone())),
        }
    }

    pub fn from_columns(text: String, list: Option<Vec<String>>) -> Self {
        match list {
            Some(items) => Behaviors::List(items),
            None => Behaviors::Text(text),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupStatus {
    Pending,
    Matched,
    Unmatched,
}

impl LookupStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LookupStatus::Pending => "pending",
            LookupStatus::Matched => "matched",
            LookupStatus::Unmatched => "unmatched",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "matched" => LookupStatus::Matched,
            "unmatched" => LookupStatus::Unmatched,
            _ => LookupStatus::Pending,
        }
    }
}

/// Directory-derived fields copied onto a report after a successful lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrichment {
    pub student_email: String,
    pub parent1: ParentContact,
    pub parent2: ParentContact,
    pub grade: String,
}

#[derive(Debug, Clone)]
pub struct BehaviorReport {
    pub id: Uuid,
    pub submitted_at: DateTime<Utc>,
    pub teacher_email: String,
    pub student_first: String,
    pub student_last: String,
    pub behavior_type: BehaviorType,
    pub location: String,
    pub behaviors: Behaviors,
    pub comments: String,
    pub enrichment: Enrichment,
    pub lookup_status: LookupStatus,
    pub selected_pillars: Vec<String>,
    pub notified_at: Option<DateTime<Utc>>,
}

impl BehaviorReport {
    pub fn student_name(&self) -> String {
        format!("{} {}", self.student_first, self.student_last)
    }
}
