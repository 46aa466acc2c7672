//! Start-of-period batch entrypoint.
//!
//! Deactivates unrenewed projects and processes the period's approved
//! requests. Report lines go to stdout, per-item failures to stderr, and a
//! fatal error (missing period, non-current period, deactivation gate)
//! exits non-zero.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use granta_accounting::StartPeriodRunner;
use granta_core::config::{AllowanceAmounts, LedgerConfig};
use granta_core::types::DbId;
use granta_db::repositories::PeriodRepo;
use granta_notify::{DropEmailStrategy, EmailConfig, EmailStrategy, SmtpEmailStrategy};

#[derive(Debug, Parser)]
#[command(
    name = "start-allocation-period",
    about = "Deactivate unrenewed projects and process requests for an allocation period."
)]
struct Cli {
    /// ID of the allocation period to start.
    allocation_period_id: DbId,

    /// Skip the project deactivation phase.
    #[arg(long)]
    skip_deactivations: bool,

    /// Report what would be done without writing anything.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Diagnostics go to stderr so stdout stays a clean report.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "granta_accounting=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let ledger = LedgerConfig::from_env();
    let amounts = AllowanceAmounts::from_env();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = granta_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");

    let period = match PeriodRepo::find_by_id(&pool, cli.allocation_period_id).await {
        Ok(Some(period)) => period,
        Ok(None) => {
            eprintln!(
                "AllocationPeriod {} does not exist.",
                cli.allocation_period_id
            );
            std::process::exit(1);
        }
        Err(error) => {
            eprintln!("Failed to look up the allocation period: {error}");
            std::process::exit(1);
        }
    };

    let (email, admin_cc): (Box<dyn EmailStrategy>, Vec<String>) = match EmailConfig::from_env() {
        Some(config) => {
            let admin_cc = config.admin_cc.clone();
            (Box::new(SmtpEmailStrategy::new(config)), admin_cc)
        }
        None => {
            tracing::warn!("SMTP is not configured; notification emails are disabled.");
            (Box::new(DropEmailStrategy::new()), Vec::new())
        }
    };

    let runner = StartPeriodRunner::new(
        period,
        cli.skip_deactivations,
        cli.dry_run,
        email.as_ref(),
        admin_cc,
    );
    match runner.run(&pool, &ledger, &amounts).await {
        Ok(report) => {
            for line in &report.lines {
                println!("{line}");
            }
            for error in &report.errors {
                eprintln!("{error}");
            }
        }
        Err(error) => {
            eprintln!("{error}");
            std::process::exit(1);
        }
    }
}
