use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod directory;
mod dispatch;
mod email;
mod models;
mod names;
mod pillars;
mod report;
mod workflow;

use config::Settings;
use dispatch::DispatchOutcome;
use models::{BehaviorType, Behaviors};

#[derive(Parser)]
#[command(name = "behavior-notify")]
#[command(about = "Behavior reports and parent notifications for school character pillars", long_about = None)]
struct Cli {
    /// Settings file (defaults to ./behavior.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum TypeArg {
    GoodNews,
    StopAndThink,
}

impl From<TypeArg> for BehaviorType {
    fn from(value: TypeArg) -> Self {
        match value {
            TypeArg::GoodNews => BehaviorType::GoodNews,
            TypeArg::StopAndThink => BehaviorType::StopAndThink,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load the default pillar taxonomy and sample students
    Seed,
    /// Import the student directory from a CSV file
    ImportDirectory {
        #[arg(long)]
        csv: PathBuf,
        /// Remove existing directory rows first
        #[arg(long)]
        replace: bool,
    },
    /// Import raw form responses from a CSV file
    ImportReports {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Store and process one form submission (JSON keyed by question title)
    Submit {
        #[arg(long)]
        json: PathBuf,
    },
    /// Re-run the directory lookup for every stored report
    RefreshLookups,
    /// Process stored reports and send notifications
    ProcessAll {
        /// Skip reports that were already notified
        #[arg(long)]
        pending_only: bool,
    },
    /// Show which pillars a behavior description falls under
    Classify {
        #[arg(long = "type", value_enum)]
        behavior_type: TypeArg,
        #[arg(long)]
        behaviors: String,
    },
    /// Print a name with normalized capitalization
    Capitalize { name: String },
    /// Send a sample notification
    TestEmail {
        #[arg(long = "type", value_enum)]
        behavior_type: TypeArg,
        #[arg(long)]
        to: String,
        #[arg(long)]
        teacher: String,
    },
    /// Generate a markdown behavior summary
    Report {
        #[arg(long, default_value_t = 30)]
        since_days: i64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to the behavior Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

fn describe(outcome: &DispatchOutcome) -> String {
    match outcome {
        DispatchOutcome::Sent {
            backend,
            recipients,
        } => format!("Sent via {backend} to {}.", recipients.join(", ")),
        DispatchOutcome::Simulated { recipients } => {
            format!("Sending disabled; would have sent to {}.", recipients.join(", "))
        }
        DispatchOutcome::NoRecipients => "No valid parent email addresses; nothing sent.".to_string(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    info!(
        school = %settings.school_name,
        send_emails = settings.send_emails,
        similarity_threshold = settings.similarity_threshold,
        max_suggestions = settings.max_suggestions,
        "settings loaded"
    );

    match cli.command {
        Commands::InitDb => {
            db::init_db(&connect().await?).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&connect().await?).await?;
            println!("Seed data inserted.");
        }
        Commands::ImportDirectory { csv, replace } => {
            let inserted = db::import_directory_csv(&connect().await?, &csv, replace).await?;
            println!("Imported {inserted} students from {}.", csv.display());
        }
        Commands::ImportReports { csv } => {
            let inserted = db::import_reports_csv(&connect().await?, &csv).await?;
            println!("Imported {inserted} reports from {}.", csv.display());
        }
        Commands::Submit { json } => {
            let raw = std::fs::read_to_string(&json)
                .with_context(|| format!("failed to read {}", json.display()))?;
            let submission: workflow::FormSubmission =
                serde_json::from_str(&raw).context("invalid form submission")?;

            let pool = connect().await?;
            let ctx = workflow::Context::load(&pool, settings).await?;
            let outcome = workflow::submit(&pool, &ctx, submission).await?;
            println!("{}", describe(&outcome));
        }
        Commands::RefreshLookups => {
            let pool = connect().await?;
            let directory = db::fetch_directory(&pool).await?;
            let summary = workflow::refresh_lookups(&pool, &directory).await?;
            println!(
                "Lookups refreshed: {} matched, {} not found, {} skipped.",
                summary.matched, summary.unmatched, summary.skipped
            );
        }
        Commands::ProcessAll { pending_only } => {
            let pool = connect().await?;
            let ctx = workflow::Context::load(&pool, settings).await?;
            let summary = workflow::process_all(&pool, &ctx, pending_only).await?;
            println!(
                "Processed {} reports: {} notified, {} without parent email, {} failed.",
                summary.processed, summary.sent, summary.skipped, summary.failed
            );
        }
        Commands::Classify {
            behavior_type,
            behaviors,
        } => {
            let behavior_type = BehaviorType::from(behavior_type);
            let matched = pillars::classify_pillars(
                &pillars::Taxonomy::default(),
                behavior_type.polarity(),
                &Behaviors::Text(behaviors),
            );
            println!("{}", matched.join(", "));
        }
        Commands::Capitalize { name } => {
            println!("{}", names::capitalize_proper_name(&name));
        }
        Commands::TestEmail {
            behavior_type,
            to,
            teacher,
        } => {
            let outcome =
                workflow::send_test_email(&settings, behavior_type.into(), &to, &teacher).await?;
            println!("{}", describe(&outcome));
        }
        Commands::Report { since_days, out } => {
            let pool = connect().await?;
            let since = report::cutoff(since_days);
            let reports = db::fetch_reports_since(&pool, since).await?;
            info!(reports = reports.len(), "building behavior summary");
            let summary = report::build_report(&settings.school_name, since, &reports);
            std::fs::write(&out, summary)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
