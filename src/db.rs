use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::directory::DIRECTORY_COLUMNS;
use crate::models::{
    BehaviorReport, BehaviorType, Behaviors, DirectoryRecord, Enrichment, LookupStatus,
    ParentContact,
};
use crate::pillars::{ItemKind, PillarItemRow, PillarRow, Taxonomy};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Which seed sets to write, given the current row counts. Existing rows are
/// never overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedPlan {
    pub taxonomy: bool,
    pub students: bool,
}

impl SeedPlan {
    pub fn for_counts(pillar_rows: i64, directory_rows: i64) -> Self {
        Self {
            taxonomy: pillar_rows == 0,
            students: directory_rows == 0,
        }
    }
}

async fn count_rows(pool: &PgPool, table: &str) -> anyhow::Result<i64> {
    let count = sqlx::query(&format!("SELECT COUNT(*) AS count FROM {table}"))
        .fetch_one(pool)
        .await?
        .get("count");
    Ok(count)
}

/// Writes the default pillar taxonomy and a few sample students, each only
/// when its table is still empty.
pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let pillars = count_rows(pool, "behavior.pillars").await?;
    let existing = count_rows(pool, "behavior.directory").await?;
    let plan = SeedPlan::for_counts(pillars, existing);

    if plan.taxonomy {
        save_taxonomy(pool, &Taxonomy::default()).await?;
    } else {
        info!(rows = pillars, "pillars already stored, keeping the current taxonomy");
    }

    if !plan.students {
        info!(rows = existing, "directory already populated, skipping sample students");
        return Ok(());
    }

    let students = [
        [
            "Sarah",
            "Johnson",
            "7",
            "sarah.johnson@students.example.org",
            "Maria",
            "Johnson",
            "maria.johnson@example.com",
            "Luis",
            "Johnson",
            "luis.johnson@example.com",
        ],
        [
            "John",
            "Smith",
            "8",
            "john.smith@students.example.org",
            "Karen",
            "Smith",
            "karen.smith@example.com",
            "",
            "",
            "",
        ],
        [
            "Liam",
            "McDonald",
            "6",
            "liam.mcdonald@students.example.org",
            "Aoife",
            "McDonald",
            "family.mcdonald@example.com",
            "Sean",
            "McDonald",
            "family.mcdonald@example.com",
        ],
    ];

    for row in students {
        insert_directory_record(pool, &DirectoryRecord::from_row(&row)).await?;
    }

    Ok(())
}

pub async fn save_taxonomy(pool: &PgPool, taxonomy: &Taxonomy) -> anyhow::Result<()> {
    let (rows, items) = taxonomy.to_rows();
    let mut tx = pool.begin().await?;

    for (position, row) in rows.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO behavior.pillars (name, position, color, icon_symbol, description)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (name) DO UPDATE
            SET position = EXCLUDED.position, color = EXCLUDED.color,
                icon_symbol = EXCLUDED.icon_symbol, description = EXCLUDED.description
            "#,
        )
        .bind(&row.name)
        .bind(position as i32)
        .bind(&row.color)
        .bind(&row.icon_symbol)
        .bind(&row.description)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM behavior.pillar_items WHERE pillar_name = $1")
            .bind(&row.name)
            .execute(&mut *tx)
            .await?;
    }

    for item in &items {
        sqlx::query(
            "INSERT INTO behavior.pillar_items (pillar_name, kind, item) VALUES ($1, $2, $3)",
        )
        .bind(&item.pillar_name)
        .bind(item.kind.as_str())
        .bind(&item.item)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!(pillars = rows.len(), items = items.len(), "pillar taxonomy saved");
    Ok(())
}

/// Loads the taxonomy snapshot for one run. Falls back to the built-in
/// pillars when nothing has been stored yet.
pub async fn fetch_taxonomy(pool: &PgPool) -> anyhow::Result<Taxonomy> {
    let rows = sqlx::query(
        "SELECT name, color, icon_symbol, description FROM behavior.pillars ORDER BY position, name",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| PillarRow {
        name: row.get("name"),
        color: row.get("color"),
        icon_symbol: row.get("icon_symbol"),
        description: row.get("description"),
    })
    .collect();

    let mut items = Vec::new();
    for row in sqlx::query("SELECT pillar_name, kind, item FROM behavior.pillar_items ORDER BY id")
        .fetch_all(pool)
        .await?
    {
        let kind: String = row.get("kind");
        let Some(kind) = ItemKind::parse(&kind) else {
            warn!(kind = %kind, "ignoring pillar item with unknown kind");
            continue;
        };
        items.push(PillarItemRow {
            pillar_name: row.get("pillar_name"),
            kind,
            item: row.get("item"),
        });
    }

    let taxonomy = Taxonomy::rebuild(rows, items);
    if taxonomy.is_empty() {
        warn!("no pillars stored, using built-in taxonomy");
        return Ok(Taxonomy::default());
    }

    info!(pillars = taxonomy.pillars().len(), "loaded pillar taxonomy");
    Ok(taxonomy)
}

async fn insert_directory_record<'e, E>(executor: E, record: &DirectoryRecord) -> anyhow::Result<()>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO behavior.directory
        (student_first, student_last, grade, student_email,
         parent1_first, parent1_last, parent1_email,
         parent2_first, parent2_last, parent2_email)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(&record.student_first)
    .bind(&record.student_last)
    .bind(&record.grade)
    .bind(&record.student_email)
    .bind(&record.parent1.first)
    .bind(&record.parent1.last)
    .bind(&record.parent1.email)
    .bind(&record.parent2.first)
    .bind(&record.parent2.last)
    .bind(&record.parent2.email)
    .execute(executor)
    .await?;
    Ok(())
}

/// Directory rows in insertion order, which decides which duplicate wins.
pub async fn fetch_directory(pool: &PgPool) -> anyhow::Result<Vec<DirectoryRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT student_first, student_last, grade, student_email,
               parent1_first, parent1_last, parent1_email,
               parent2_first, parent2_last, parent2_email
        FROM behavior.directory
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let records: Vec<DirectoryRecord> = rows
        .into_iter()
        .map(|row| DirectoryRecord {
            student_first: row.get("student_first"),
            student_last: row.get("student_last"),
            grade: row.get("grade"),
            student_email: row.get("student_email"),
            parent1: ParentContact {
                first: row.get("parent1_first"),
                last: row.get("parent1_last"),
                email: row.get("parent1_email"),
            },
            parent2: ParentContact {
                first: row.get("parent2_first"),
                last: row.get("parent2_last"),
                email: row.get("parent2_email"),
            },
        })
        .collect();

    info!(students = records.len(), "loaded directory");
    Ok(records)
}

/// Imports directory rows from a CSV with a header line and the ten
/// positional columns. With `replace`, existing rows are removed first.
pub async fn import_directory_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
    replace: bool,
) -> anyhow::Result<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(csv_path)?;
    let mut tx = pool.begin().await?;

    if replace {
        sqlx::query("DELETE FROM behavior.directory")
            .execute(&mut *tx)
            .await?;
    }

    let mut inserted = 0usize;
    for (index, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("bad CSV record at data row {}", index + 1))?;
        let fields: Vec<&str> = record.iter().take(DIRECTORY_COLUMNS).collect();
        let student = DirectoryRecord::from_row(fields.as_slice());

        if student.student_first.is_empty() && student.student_last.is_empty() {
            continue;
        }

        insert_directory_record(&mut *tx, &student).await?;
        inserted += 1;
    }

    tx.commit().await?;
    Ok(inserted)
}

pub async fn insert_report(pool: &PgPool, report: &BehaviorReport) -> anyhow::Result<()> {
    let (behaviors, behaviors_list) = report.behaviors.to_columns();
    sqlx::query(
        r#"
        INSERT INTO behavior.reports
        (id, submitted_at, teacher_email, student_first, student_last,
         behavior_type, location, behaviors, behaviors_list, comments, lookup_status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(report.id)
    .bind(report.submitted_at)
    .bind(&report.teacher_email)
    .bind(&report.student_first)
    .bind(&report.student_last)
    .bind(report.behavior_type.label())
    .bind(&report.location)
    .bind(behaviors)
    .bind(behaviors_list)
    .bind(&report.comments)
    .bind(report.lookup_status.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

/// Imports raw form responses from a CSV. Imported reports start pending and
/// are enriched and notified by a later `process-all` run.
pub async fn import_reports_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        submitted_at: Option<DateTime<Utc>>,
        teacher_email: String,
        student_first: String,
        student_last: String,
        behavior_type: String,
        #[serde(default)]
        location: String,
        #[serde(default)]
        behaviors: String,
        #[serde(default)]
        comments: String,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("bad CSV record at data row {}", index + 1))?;
        let Some(behavior_type) = BehaviorType::from_label(&row.behavior_type) else {
            warn!(
                row = index + 1,
                behavior_type = %row.behavior_type,
                "skipping response with unrecognized behavior type"
            );
            continue;
        };

        let report = BehaviorReport {
            id: Uuid::new_v4(),
            submitted_at: row.submitted_at.unwrap_or_else(Utc::now),
            teacher_email: row.teacher_email.trim().to_string(),
            student_first: crate::names::capitalize_proper_name(&row.student_first),
            student_last: crate::names::capitalize_proper_name(&row.student_last),
            behavior_type,
            location: row.location,
            behaviors: Behaviors::Text(row.behaviors),
            comments: row.comments,
            enrichment: Enrichment::default(),
            lookup_status: LookupStatus::Pending,
            selected_pillars: Vec::new(),
            notified_at: None,
        };

        insert_report(pool, &report).await?;
        inserted += 1;
    }

    Ok(inserted)
}

fn report_from_row(row: &PgRow) -> anyhow::Result<BehaviorReport> {
    let id: Uuid = row.try_get("id")?;
    let behavior_type: String = row.try_get("behavior_type")?;
    let behavior_type = BehaviorType::from_label(&behavior_type)
        .with_context(|| format!("report {id} has unknown behavior type {behavior_type:?}"))?;
    let lookup_status: String = row.try_get("lookup_status")?;

    Ok(BehaviorReport {
        id,
        submitted_at: row.try_get("submitted_at")?,
        teacher_email: row.try_get("teacher_email")?,
        student_first: row.try_get("student_first")?,
        student_last: row.try_get("student_last")?,
        behavior_type,
        location: row.try_get("location")?,
        behaviors: Behaviors::from_columns(
            row.try_get("behaviors")?,
            row.try_get("behaviors_list")?,
        ),
        comments: row.try_get("comments")?,
        enrichment: Enrichment {
            student_email: row.try_get("student_email")?,
            parent1: ParentContact {
                first: row.try_get("parent1_first")?,
                last: row.try_get("parent1_last")?,
                email: row.try_get("parent1_email")?,
            },
            parent2: ParentContact {
                first: row.try_get("parent2_first")?,
                last: row.try_get("parent2_last")?,
                email: row.try_get("parent2_email")?,
            },
            grade: row.try_get("grade")?,
        },
        lookup_status: LookupStatus::parse(&lookup_status),
        selected_pillars: row.try_get("selected_pillars")?,
        notified_at: row.try_get("notified_at")?,
    })
}

const REPORT_COLUMNS: &str = "id, submitted_at, teacher_email, student_first, student_last, \
     behavior_type, location, behaviors, behaviors_list, comments, student_email, \
     parent1_first, parent1_last, parent1_email, parent2_first, parent2_last, parent2_email, \
     grade, lookup_status, selected_pillars, notified_at";

/// Reports in submission order, optionally only those not yet notified.
pub async fn fetch_reports(pool: &PgPool, pending_only: bool) -> anyhow::Result<Vec<BehaviorReport>> {
    let mut query = format!("SELECT {REPORT_COLUMNS} FROM behavior.reports");
    if pending_only {
        query.push_str(" WHERE notified_at IS NULL");
    }
    query.push_str(" ORDER BY submitted_at, id");

    let rows = sqlx::query(&query).fetch_all(pool).await?;
    rows.iter().map(report_from_row).collect()
}

pub async fn fetch_reports_since(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> anyhow::Result<Vec<BehaviorReport>> {
    let query = format!(
        "SELECT {REPORT_COLUMNS} FROM behavior.reports WHERE submitted_at >= $1 ORDER BY submitted_at, id"
    );

    let rows = sqlx::query(&query).bind(since).fetch_all(pool).await?;
    rows.iter().map(report_from_row).collect()
}

/// Writes the report's enrichment fields and lookup status. An unmatched
/// report carries empty fields, so this also clears stale data.
pub async fn save_enrichment(pool: &PgPool, report: &BehaviorReport) -> anyhow::Result<()> {
    let enrichment = &report.enrichment;
    sqlx::query(
        r#"
        UPDATE behavior.reports
        SET student_email = $2,
            parent1_first = $3, parent1_last = $4, parent1_email = $5,
            parent2_first = $6, parent2_last = $7, parent2_email = $8,
            grade = $9, lookup_status = $10
        WHERE id = $1
        "#,
    )
    .bind(report.id)
    .bind(&enrichment.student_email)
    .bind(&enrichment.parent1.first)
    .bind(&enrichment.parent1.last)
    .bind(&enrichment.parent1.email)
    .bind(&enrichment.parent2.first)
    .bind(&enrichment.parent2.last)
    .bind(&enrichment.parent2.email)
    .bind(&enrichment.grade)
    .bind(report.lookup_status.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn save_classification(pool: &PgPool, report: &BehaviorReport) -> anyhow::Result<()> {
    sqlx::query("UPDATE behavior.reports SET selected_pillars = $2 WHERE id = $1")
        .bind(report.id)
        .bind(&report.selected_pillars)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_notified(pool: &PgPool, id: Uuid) -> anyhow::Result<()> {
    sqlx::query("UPDATE behavior.reports SET notified_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeding_leaves_populated_tables_alone() {
        assert_eq!(
            SeedPlan::for_counts(0, 0),
            SeedPlan {
                taxonomy: true,
                students: true,
            }
        );
        assert_eq!(
            SeedPlan::for_counts(6, 0),
            SeedPlan {
                taxonomy: false,
                students: true,
            }
        );
        assert_eq!(
            SeedPlan::for_counts(0, 120),
            SeedPlan {
                taxonomy: true,
                students: false,
            }
        );
    }
}
