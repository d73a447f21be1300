use std::collections::HashMap;
use std::fmt::Write;

use chrono::{DateTime, Duration, Utc};

use crate::models::{BehaviorReport, BehaviorType};

#[derive(Debug, Clone)]
pub struct PillarSummary {
    pub pillar: String,
    pub good_news: usize,
    pub stop_and_think: usize,
}

#[derive(Debug, Clone)]
pub struct StudentTally {
    pub student: String,
    pub grade: String,
    pub stop_and_think: usize,
    pub good_news: usize,
}

pub fn cutoff(since_days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(since_days.max(1))
}

pub fn summarize_by_pillar(reports: &[BehaviorReport]) -> Vec<PillarSummary> {
    let mut map: HashMap<String, (usize, usize)> = HashMap::new();

    for report in reports {
        for pillar in &report.selected_pillars {
            let entry = map.entry(pillar.clone()).or_insert((0, 0));
            match report.behavior_type {
                BehaviorType::GoodNews => entry.0 += 1,
                BehaviorType::StopAndThink => entry.1 += 1,
            }
        }
    }

    let mut summaries: Vec<PillarSummary> = map
        .into_iter()
        .map(|(pillar, (good_news, stop_and_think))| PillarSummary {
            pillar,
            good_news,
            stop_and_think,
        })
        .collect();

    summaries.sort_by(|a, b| {
        (b.good_news + b.stop_and_think)
            .cmp(&(a.good_news + a.stop_and_think))
            .then_with(|| a.pillar.cmp(&b.pillar))
    });
    summaries
}

/// Students with more than one Stop & Think moment, most frequent first.
pub fn repeated_stop_and_think(reports: &[BehaviorReport]) -> Vec<StudentTally> {
    let mut map: HashMap<String, StudentTally> = HashMap::new();

    for report in reports {
        let key = report.student_name().to_lowercase();
        let entry = map.entry(key).or_insert_with(|| StudentTally {
            student: report.student_name(),
            grade: report.enrichment.grade.clone(),
            stop_and_think: 0,
            good_news: 0,
        });
        match report.behavior_type {
            BehaviorType::GoodNews => entry.good_news += 1,
            BehaviorType::StopAndThink => entry.stop_and_think += 1,
        }
    }

    let mut tallies: Vec<StudentTally> = map
        .into_values()
        .filter(|tally| tally.stop_and_think > 1)
        .collect();
    tallies.sort_by(|a, b| {
        b.stop_and_think
            .cmp(&a.stop_and_think)
            .then_with(|| a.student.cmp(&b.student))
    });
    tallies
}

pub fn build_report(school: &str, cutoff: DateTime<Utc>, reports: &[BehaviorReport]) -> String {
    let pillars = summarize_by_pillar(reports);
    let repeated = repeated_stop_and_think(reports);
    let good_news = reports
        .iter()
        .filter(|report| report.behavior_type == BehaviorType::GoodNews)
        .count();
    let notified = reports
        .iter()
        .filter(|report| report.notified_at.is_some())
        .count();

    let mut output = String::new();

    let _ = writeln!(output, "# Behavior Summary");
    let _ = writeln!(
        output,
        "Generated for {} (reports since {})",
        school,
        cutoff.date_naive()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Moments by Type");
    let _ = writeln!(output, "- Good News: {}", good_news);
    let _ = writeln!(output, "- Stop & Think: {}", reports.len() - good_news);
    let _ = writeln!(output, "- Parents notified: {} of {}", notified, reports.len());

    let _ = writeln!(output);
    let _ = writeln!(output, "## Pillar Mix");

    if pillars.is_empty() {
        let _ = writeln!(output, "No classified reports for this window.");
    } else {
        for summary in pillars.iter() {
            let _ = writeln!(
                output,
                "- {}: {} Good News, {} Stop & Think",
                summary.pillar, summary.good_news, summary.stop_and_think
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Repeated Stop & Think Moments");

    if repeated.is_empty() {
        let _ = writeln!(output, "No student had more than one Stop & Think moment.");
    } else {
        for tally in repeated.iter().take(10) {
            let grade = if tally.grade.is_empty() {
                "grade unknown".to_string()
            } else {
                format!("grade {}", tally.grade)
            };
            let _ = writeln!(
                output,
                "- {} ({}): {} Stop & Think, {} Good News",
                tally.student, grade, tally.stop_and_think, tally.good_news
            );
        }
    }

    let mut recent: Vec<&BehaviorReport> = reports.iter().collect();
    recent.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Reports");

    if recent.is_empty() {
        let _ = writeln!(output, "No reports recorded for this window.");
    } else {
        for report in recent.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} ({}) on {} in {}: {}",
                report.student_name(),
                report.behavior_type.label(),
                report.submitted_at.date_naive(),
                report.location,
                report.behaviors.to_text()
            );
        }
    }

    output
}
