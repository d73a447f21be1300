use tracing::{debug, info};

use crate::models::{BehaviorReport, DirectoryRecord, Enrichment, LookupStatus, ParentContact};

/// Column count of a directory row: first, last, grade, student email, then
/// first/last/email for each of two parents.
pub const DIRECTORY_COLUMNS: usize = 10;

/// Finds the first record whose first and last name match, ignoring case.
///
/// Directory order matters: when two rows share a name, only the earlier one
/// is ever returned.
pub fn find_student<'a>(
    first_name: &str,
    last_name: &str,
    directory: &'a [DirectoryRecord],
) -> Option<&'a DirectoryRecord> {
    let first = first_name.to_lowercase();
    let last = last_name.to_lowercase();

    directory.iter().find(|record| {
        record.student_first.to_lowercase() == first && record.student_last.to_lowercase() == last
    })
}

impl DirectoryRecord {
    /// Builds a record from positional fields. Missing trailing fields are
    /// treated as empty.
    pub fn from_row<S: AsRef<str>>(row: &[S]) -> Self {
        let field = |index: usize| {
            row.get(index)
                .map(|value| value.as_ref().trim().to_string())
                .unwrap_or_default()
        };

        DirectoryRecord {
            student_first: field(0),
            student_last: field(1),
            grade: field(2),
            student_email: field(3),
            parent1: ParentContact {
                first: field(4),
                last: field(5),
                email: field(6),
            },
            parent2: ParentContact {
                first: field(7),
                last: field(8),
                email: field(9),
            },
        }
    }

    pub fn enrichment(&self) -> Enrichment {
        Enrichment {
            student_email: self.student_email.clone(),
            parent1: self.parent1.clone(),
            parent2: self.parent2.clone(),
            grade: self.grade.clone(),
        }
    }
}

/// Looks the report's student up and rewrites its enrichment fields.
///
/// A match copies the directory fields and marks the report matched; a miss
/// clears any previous enrichment and marks it unmatched. Returns `None`
/// without touching the report when either name is blank.
pub fn enrich_report(
    report: &mut BehaviorReport,
    directory: &[DirectoryRecord],
) -> Option<LookupStatus> {
    if report.student_first.trim().is_empty() || report.student_last.trim().is_empty() {
        debug!(report_id = %report.id, "skipping lookup, student name incomplete");
        return None;
    }

    match find_student(&report.student_first, &report.student_last, directory) {
        Some(record) => {
            report.enrichment = record.enrichment();
            report.lookup_status = LookupStatus::Matched;
            info!(student = %report.student_name(), "updated information for student");
        }
        None => {
            report.enrichment = Enrichment::default();
            report.lookup_status = LookupStatus::Unmatched;
            info!(student = %report.student_name(), "student not found in directory");
        }
    }

    Some(report.lookup_status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BehaviorType, Behaviors};
    use chrono::Utc;
    use uuid::Uuid;

    fn directory() -> Vec<DirectoryRecord> {
        vec![
            DirectoryRecord::from_row(&[
                "John",
                "Doe",
                "7",
                "john.doe@students.example.org",
                "Jane",
                "Doe",
                "jane.doe@example.com",
                "Jim",
                "Doe",
                "jim.doe@example.com",
            ]),
            DirectoryRecord::from_row(&["Ava", "Smith", "8", "", "Lena", "Smith", "lena@example.com"]),
            DirectoryRecord::from_row(&[
                "john", "doe", "6", "", "Second", "Parent", "second@example.com",
            ]),
        ]
    }

    fn report(first: &str, last: &str) -> BehaviorReport {
        BehaviorReport {
            id: Uuid::new_v4(),
            submitted_at: Utc::now(),
            teacher_email: "pat.teacher@school.example.org".to_string(),
            student_first: first.to_string(),
            student_last: last.to_string(),
            behavior_type: BehaviorType::GoodNews,
            location: "Classroom".to_string(),
            behaviors: Behaviors::Text("helping others".to_string()),
            comments: String::new(),
            enrichment: Enrichment::default(),
            lookup_status: LookupStatus::Pending,
            selected_pillars: Vec::new(),
            notified_at: None,
        }
    }

    #[test]
    fn lookup_ignores_case() {
        let directory = directory();
        let record = find_student("john", "DOE", &directory).expect("student should match");
        assert_eq!(record.parent1.email, "jane.doe@example.com");
        assert!(find_student("John", "Do", &directory).is_none());
        assert!(find_student("Nobody", "Here", &directory).is_none());
    }

    #[test]
    fn first_matching_row_wins() {
        let directory = directory();
        let record = find_student("JOHN", "doe", &directory).expect("student should match");
        assert_eq!(record.grade, "7");
    }

    #[test]
    fn short_rows_fill_missing_fields_with_empty_strings() {
        let record = DirectoryRecord::from_row(&["Ava", "Smith"]);
        assert_eq!(record.student_first, "Ava");
        assert_eq!(record.parent2, ParentContact::default());
    }

    #[test]
    fn match_copies_directory_fields() {
        let directory = directory();
        let mut report = report("ava", "smith");
        assert_eq!(enrich_report(&mut report, &directory), Some(LookupStatus::Matched));
        assert_eq!(report.enrichment.grade, "8");
        assert_eq!(report.enrichment.parent1.first, "Lena");
        assert_eq!(report.enrichment.parent2.email, "");
    }

    #[test]
    fn miss_clears_previous_enrichment() {
        let directory = directory();
        let mut report = report("Ava", "Smyth");
        report.enrichment.parent1.email = "stale@example.com".to_string();
        report.lookup_status = LookupStatus::Matched;

        assert_eq!(enrich_report(&mut report, &directory), Some(LookupStatus::Unmatched));
        assert_eq!(report.enrichment, Enrichment::default());
    }

    #[test]
    fn repeated_lookups_are_idempotent() {
        let directory = directory();
        let mut first = report("John", "Doe");
        enrich_report(&mut first, &directory);
        let once = first.enrichment.clone();
        enrich_report(&mut first, &directory);
        assert_eq!(first.enrichment, once);
        assert_eq!(first.lookup_status, LookupStatus::Matched);
    }

    #[test]
    fn incomplete_names_skip_lookup() {
        let directory = directory();
        let mut report = report("John", " ");
        report.enrichment.grade = "5".to_string();
        assert_eq!(enrich_report(&mut report, &directory), None);
        assert_eq!(report.enrichment.grade, "5");
        assert_eq!(report.lookup_status, LookupStatus::Pending);
    }
}
