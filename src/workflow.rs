use std::time::Duration;

use anyhow::Context as _;
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::db;
use crate::directory::enrich_report;
use crate::dispatch::{DispatchError, DispatchOutcome, DispatchRequest, Dispatcher};
use crate::email::{compose, ComposedEmail};
use crate::models::{BehaviorReport, BehaviorType, Behaviors, DirectoryRecord, Enrichment, LookupStatus};
use crate::names::{capitalize_proper_name, teacher_name_from_email};
use crate::pillars::{classify_pillars, Taxonomy};

/// A form response keyed by the form's question titles.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FormSubmission {
    #[serde(rename = "Timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "Email Address")]
    pub teacher_email: String,
    #[serde(rename = "Which type of behavior are you documenting?")]
    pub behavior_type: String,
    #[serde(rename = "Student First")]
    pub student_first: String,
    #[serde(rename = "Student Last")]
    pub student_last: String,
    #[serde(rename = "Location (Good News)")]
    pub good_news_location: String,
    #[serde(rename = "Good News Behaviors")]
    pub good_news_behaviors: Option<Behaviors>,
    #[serde(rename = "Additional comments about the selected \"Good News\" behavior:")]
    pub good_news_comments: String,
    #[serde(rename = "Location (Stop and Think)")]
    pub stop_and_think_location: String,
    #[serde(rename = "Stop and Think Behaviors")]
    pub stop_and_think_behaviors: Option<Behaviors>,
    #[serde(rename = "Additional comments about the selected \"Stop and Think\" behavior:")]
    pub stop_and_think_comments: String,
    #[serde(rename = "CC")]
    pub cc: Vec<String>,
}

impl FormSubmission {
    /// Builds a pending report, picking the location, behaviors and comments
    /// that belong to the selected behavior type.
    pub fn into_report(self) -> anyhow::Result<BehaviorReport> {
        let behavior_type = BehaviorType::from_label(&self.behavior_type)
            .with_context(|| format!("unrecognized behavior type {:?}", self.behavior_type))?;

        let (location, behaviors, comments) = match behavior_type {
            BehaviorType::GoodNews => (
                self.good_news_location,
                self.good_news_behaviors,
                self.good_news_comments,
            ),
            BehaviorType::StopAndThink => (
                self.stop_and_think_location,
                self.stop_and_think_behaviors,
                self.stop_and_think_comments,
            ),
        };

        Ok(BehaviorReport {
            id: Uuid::new_v4(),
            submitted_at: self.timestamp.unwrap_or_else(Utc::now),
            teacher_email: self.teacher_email.trim().to_string(),
            student_first: capitalize_proper_name(&self.student_first),
            student_last: capitalize_proper_name(&self.student_last),
            behavior_type,
            location: location.trim().to_string(),
            behaviors: behaviors.unwrap_or_else(|| Behaviors::Text(String::new())),
            comments,
            enrichment: Enrichment::default(),
            lookup_status: LookupStatus::Pending,
            selected_pillars: Vec::new(),
            notified_at: None,
        })
    }
}

/// Snapshot of reference data and collaborators for one run.
pub struct Context {
    pub settings: Settings,
    pub directory: Vec<DirectoryRecord>,
    pub taxonomy: Taxonomy,
    pub dispatcher: Dispatcher,
}

impl Context {
    pub async fn load(pool: &PgPool, settings: Settings) -> anyhow::Result<Self> {
        let directory = db::fetch_directory(pool).await?;
        let taxonomy = db::fetch_taxonomy(pool).await?;
        let dispatcher = Dispatcher::from_settings(&settings)?;

        Ok(Self {
            settings,
            directory,
            taxonomy,
            dispatcher,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PreparedNotice {
    pub teacher_name: String,
    pub email: ComposedEmail,
}

/// Enriches and classifies the report in place, then renders its email.
pub fn prepare(report: &mut BehaviorReport, ctx: &Context, today: NaiveDate) -> PreparedNotice {
    enrich_report(report, &ctx.directory);
    report.selected_pillars = classify_pillars(
        &ctx.taxonomy,
        report.behavior_type.polarity(),
        &report.behaviors,
    );

    let teacher_name = teacher_name_from_email(&report.teacher_email);
    let email = compose(report, &teacher_name, &ctx.taxonomy, &ctx.settings, today);
    PreparedNotice {
        teacher_name,
        email,
    }
}

pub async fn notify(
    report: &BehaviorReport,
    notice: &PreparedNotice,
    cc: &[String],
    dispatcher: &Dispatcher,
) -> Result<DispatchOutcome, DispatchError> {
    let request = DispatchRequest {
        subject: &notice.email.subject,
        html_body: &notice.email.html,
        parent_emails: [
            report.enrichment.parent1.email.as_str(),
            report.enrichment.parent2.email.as_str(),
        ],
        teacher_email: &report.teacher_email,
        teacher_name: &notice.teacher_name,
        cc,
    };
    dispatcher.dispatch(&request).await
}

/// Full pipeline for one stored report: lookup, classification, persistence
/// of derived fields, and parent notification.
pub async fn process_report(
    pool: &PgPool,
    ctx: &Context,
    report: &mut BehaviorReport,
    cc: &[String],
) -> anyhow::Result<DispatchOutcome> {
    let notice = prepare(report, ctx, Local::now().date_naive());
    db::save_enrichment(pool, report).await?;
    db::save_classification(pool, report).await?;

    info!(
        student = %report.student_name(),
        behavior_type = report.behavior_type.label(),
        pillars = %report.selected_pillars.join(", "),
        teacher = %report.teacher_email,
        "processing behavior report"
    );

    let outcome = notify(report, &notice, cc, &ctx.dispatcher)
        .await
        .with_context(|| format!("failed to notify parents of {}", report.student_name()))?;

    if matches!(outcome, DispatchOutcome::Sent { .. }) {
        db::mark_notified(pool, report.id).await?;
    }
    Ok(outcome)
}

/// Emails the tech support address about a report that could not be
/// processed. A failed notice is only logged.
pub async fn alert_admin(ctx: &Context, report: &BehaviorReport, err: &anyhow::Error) {
    let text = format!(
        "There was an error processing a behavior form for {} (report {}): {err:#}",
        report.student_name(),
        report.id
    );
    if let Err(notice_err) = ctx
        .dispatcher
        .notify_admin(
            &ctx.settings.admin_emails.tech_support,
            "Error in Behavior Form Email System",
            &text,
        )
        .await
    {
        error!(error = %notice_err, "failed to notify administrator");
    }
}

/// Stores and processes a new form response. Failures are reported to the
/// tech support address before being returned.
pub async fn submit(
    pool: &PgPool,
    ctx: &Context,
    submission: FormSubmission,
) -> anyhow::Result<DispatchOutcome> {
    let cc = submission.cc.clone();
    let mut report = submission.into_report()?;
    db::insert_report(pool, &report).await?;

    match process_report(pool, ctx, &mut report, &cc).await {
        Ok(outcome) => {
            info!(student = %report.student_name(), report_id = %report.id, "processed form submission");
            Ok(outcome)
        }
        Err(err) => {
            error!(
                student = %report.student_name(),
                report_id = %report.id,
                error = %format!("{err:#}"),
                "error processing form submission"
            );
            alert_admin(ctx, &report, &err).await;
            Err(err)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Re-runs the pipeline over stored reports one at a time, pausing between
/// sends. A failing report is logged, reported to tech support, and the
/// batch moves on.
pub async fn process_all(
    pool: &PgPool,
    ctx: &Context,
    pending_only: bool,
) -> anyhow::Result<BatchSummary> {
    let mut reports = db::fetch_reports(pool, pending_only).await?;
    let delay = Duration::from_millis(ctx.settings.send_delay_ms);
    let mut summary = BatchSummary::default();

    for (index, report) in reports.iter_mut().enumerate() {
        if index > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match process_report(pool, ctx, report, &[]).await {
            Ok(outcome) => {
                summary.processed += 1;
                match outcome {
                    DispatchOutcome::Sent { .. } | DispatchOutcome::Simulated { .. } => {
                        summary.sent += 1
                    }
                    DispatchOutcome::NoRecipients => summary.skipped += 1,
                }
            }
            Err(err) => {
                summary.failed += 1;
                error!(
                    row = index + 1,
                    report_id = %report.id,
                    student = %report.student_name(),
                    error = %format!("{err:#}"),
                    "error processing report"
                );
                alert_admin(ctx, report, &err).await;
            }
        }
    }

    Ok(summary)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub matched: usize,
    pub unmatched: usize,
    pub skipped: usize,
}

/// Applies `enrich_report` to every report and records the tally.
pub fn refresh_enrichment(
    reports: &mut [BehaviorReport],
    directory: &[DirectoryRecord],
) -> RefreshSummary {
    let mut summary = RefreshSummary::default();
    for report in reports.iter_mut() {
        match enrich_report(report, directory) {
            Some(LookupStatus::Matched) => summary.matched += 1,
            Some(_) => summary.unmatched += 1,
            None => summary.skipped += 1,
        }
    }
    summary
}

/// Re-runs the directory lookup for every stored report, overwriting or
/// clearing their enrichment fields.
pub async fn refresh_lookups(pool: &PgPool, directory: &[DirectoryRecord]) -> anyhow::Result<RefreshSummary> {
    let mut reports = db::fetch_reports(pool, false).await?;
    let summary = refresh_enrichment(&mut reports, directory);

    for report in reports
        .iter()
        .filter(|report| report.lookup_status != LookupStatus::Pending)
    {
        db::save_enrichment(pool, report).await?;
    }

    if summary.unmatched > 0 {
        warn!(unmatched = summary.unmatched, "some reports did not match the directory");
    }
    Ok(summary)
}

/// Sample report used to preview the email for either behavior type.
pub fn sample_report(behavior_type: BehaviorType, parent_email: &str, teacher_email: &str) -> BehaviorReport {
    let (first, last, behaviors, comments) = match behavior_type {
        BehaviorType::GoodNews => (
            "Sarah",
            "Johnson",
            "helping others, showing kindness",
            "Sarah helped a classmate who was struggling with their work.",
        ),
        BehaviorType::StopAndThink => (
            "John",
            "Smith",
            "calling out, needing frequent reminders",
            "John had difficulty focusing during math today.",
        ),
    };

    let mut enrichment = Enrichment::default();
    enrichment.parent1.first = "Test".to_string();
    enrichment.parent1.email = parent_email.to_string();

    BehaviorReport {
        id: Uuid::new_v4(),
        submitted_at: Utc::now(),
        teacher_email: teacher_email.to_string(),
        student_first: first.to_string(),
        student_last: last.to_string(),
        behavior_type,
        location: "Classroom".to_string(),
        behaviors: Behaviors::Text(behaviors.to_string()),
        comments: comments.to_string(),
        enrichment,
        lookup_status: LookupStatus::Pending,
        selected_pillars: Vec::new(),
        notified_at: None,
    }
}

/// Sends a sample notification without touching the database.
pub async fn send_test_email(
    settings: &Settings,
    behavior_type: BehaviorType,
    to: &str,
    teacher_email: &str,
) -> anyhow::Result<DispatchOutcome> {
    let taxonomy = Taxonomy::default();
    let dispatcher = Dispatcher::from_settings(settings)?;
    let mut report = sample_report(behavior_type, to, teacher_email);
    report.selected_pillars =
        classify_pillars(&taxonomy, behavior_type.polarity(), &report.behaviors);

    let teacher_name = teacher_name_from_email(teacher_email);
    let email = compose(
        &report,
        &teacher_name,
        &taxonomy,
        settings,
        Local::now().date_naive(),
    );
    let notice = PreparedNotice {
        teacher_name,
        email,
    };

    Ok(notify(&report, &notice, &[], &dispatcher).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{MailSender, OutgoingMessage};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Capture {
        reject: Option<&'static str>,
        sent: Mutex<Vec<OutgoingMessage>>,
    }

    #[async_trait]
    impl MailSender for Capture {
        fn name(&self) -> &'static str {
            "capture"
        }

        async fn send(&self, message: &OutgoingMessage) -> anyhow::Result<()> {
            if let Some(rejected) = self.reject {
                if message.to.iter().any(|to| to == rejected) {
                    anyhow::bail!("mailbox {rejected} unavailable");
                }
            }
            self.sent.lock().expect("lock").push(message.clone());
            Ok(())
        }
    }

    fn context(sender: Arc<Capture>) -> Context {
        let directory = vec![DirectoryRecord::from_row(&[
            "Sarah",
            "Johnson",
            "7",
            "sarah@students.example.org",
            "Maria",
            "Johnson",
            "maria@example.com",
            "Luis",
            "Johnson",
            "maria@example.com",
        ])];
        let settings = Settings::default();
        let dispatcher = Dispatcher::new(
            Some(sender.clone()),
            sender,
            true,
            settings.school_name.clone(),
            settings.mail.system_address.clone(),
        );

        Context {
            settings,
            directory,
            taxonomy: Taxonomy::default(),
            dispatcher,
        }
    }

    fn submission_json() -> &'static str {
        r#"{
            "Email Address": "pat.lee@school.example.org",
            "Which type of behavior are you documenting?": "Stop & Think",
            "Student First": "  sarah ",
            "Student Last": "JOHNSON",
            "Location (Good News)": "Gym",
            "Location (Stop and Think)": "Cafeteria",
            "Stop and Think Behaviors": ["mocking, teasing, or putting others down", "calling out"],
            "Additional comments about the selected \"Stop and Think\" behavior:": "Talked it through."
        }"#
    }

    #[test]
    fn submission_picks_fields_for_its_type() {
        let submission: FormSubmission =
            serde_json::from_str(submission_json()).expect("submission should parse");
        let report = submission.into_report().expect("report should build");

        assert_eq!(report.behavior_type, BehaviorType::StopAndThink);
        assert_eq!(report.student_first, "Sarah");
        assert_eq!(report.student_last, "Johnson");
        assert_eq!(report.location, "Cafeteria");
        assert_eq!(report.comments, "Talked it through.");
        assert_eq!(report.behaviors.normalized().len(), 2);
        assert_eq!(report.lookup_status, LookupStatus::Pending);
    }

    #[test]
    fn submission_accepts_comma_separated_behaviors() {
        let submission: FormSubmission = serde_json::from_str(
            r#"{
                "Which type of behavior are you documenting?": "Good News",
                "Good News Behaviors": "offering help, sharing items"
            }"#,
        )
        .expect("submission should parse");
        let report = submission.into_report().expect("report should build");
        assert_eq!(
            report.behaviors,
            Behaviors::Text("offering help, sharing items".to_string())
        );
    }

    #[test]
    fn unknown_behavior_type_is_rejected() {
        let submission = FormSubmission {
            behavior_type: "Detention".to_string(),
            ..FormSubmission::default()
        };
        assert!(submission.into_report().is_err());
    }

    #[test]
    fn prepare_enriches_classifies_and_renders() {
        let ctx = context(Arc::new(Capture::default()));
        let submission: FormSubmission =
            serde_json::from_str(submission_json()).expect("submission should parse");
        let mut report = submission.into_report().expect("report should build");
        let today = NaiveDate::from_ymd_opt(2026, 5, 1).expect("date");

        let notice = prepare(&mut report, &ctx, today);

        assert_eq!(report.lookup_status, LookupStatus::Matched);
        assert_eq!(report.enrichment.grade, "7");
        assert_eq!(report.selected_pillars, vec!["Respect".to_string()]);
        assert_eq!(notice.teacher_name, "Pat Lee");
        assert_eq!(notice.email.subject, ctx.settings.subjects.stop_and_think);
        assert!(notice.email.html.contains("Dear Maria & Luis"));
        assert!(notice.email.html.contains("border-top: 5px solid #FFBF00"));
    }

    #[tokio::test]
    async fn notify_sends_once_to_shared_parent_address() {
        let sender = Arc::new(Capture::default());
        let ctx = context(sender.clone());
        let mut report = sample_report(BehaviorType::GoodNews, "", "pat.lee@school.example.org");
        let notice = prepare(&mut report, &ctx, NaiveDate::from_ymd_opt(2026, 5, 1).expect("date"));

        let outcome = notify(&report, &notice, &[], &ctx.dispatcher)
            .await
            .expect("notify should succeed");

        assert_eq!(
            outcome,
            DispatchOutcome::Sent {
                backend: "capture",
                recipients: vec!["maria@example.com".to_string()],
            }
        );
        let sent = sender.sent.lock().expect("lock");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].reply_to, "pat.lee@school.example.org");
    }

    #[tokio::test]
    async fn failed_delivery_is_reported_to_tech_support() {
        let sender = Arc::new(Capture {
            reject: Some("maria@example.com"),
            ..Capture::default()
        });
        let ctx = context(sender.clone());
        let mut report = sample_report(BehaviorType::StopAndThink, "", "pat.lee@school.example.org");
        report.student_first = "Sarah".to_string();
        report.student_last = "Johnson".to_string();
        let notice = prepare(&mut report, &ctx, NaiveDate::from_ymd_opt(2026, 5, 1).expect("date"));

        let err = notify(&report, &notice, &[], &ctx.dispatcher)
            .await
            .expect_err("both senders should fail");
        assert!(matches!(err, DispatchError::BothBackendsFailed { .. }));

        alert_admin(&ctx, &report, &anyhow::Error::new(err)).await;

        let sent = sender.sent.lock().expect("lock");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec![ctx.settings.admin_emails.tech_support.clone()]);
        assert_eq!(sent[0].subject, "Error in Behavior Form Email System");
        assert!(sent[0].html_body.contains("Sarah Johnson"));
        assert!(sent[0].html_body.contains("mailbox maria@example.com unavailable"));
    }

    #[test]
    fn refresh_counts_each_outcome() {
        let ctx = context(Arc::new(Capture::default()));
        let mut reports = vec![
            sample_report(BehaviorType::GoodNews, "a@example.com", "t@example.org"),
            sample_report(BehaviorType::StopAndThink, "b@example.com", "t@example.org"),
            sample_report(BehaviorType::StopAndThink, "c@example.com", "t@example.org"),
        ];
        reports[2].student_last.clear();

        let summary = refresh_enrichment(&mut reports, &ctx.directory);

        assert_eq!(
            summary,
            RefreshSummary {
                matched: 1,
                unmatched: 1,
                skipped: 1,
            }
        );
        assert_eq!(reports[1].enrichment, Enrichment::default());
        assert_eq!(reports[2].enrichment.parent1.email, "c@example.com");
    }
}
