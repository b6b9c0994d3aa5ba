use std::process::ExitCode;
use std::sync::Arc;

use cascade_core::{DataSource, DataSourceOptions, DbError, MigrationRunner};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cascade-migrate", about = "Run Cascade schema migrations against a configured data source")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Name of the registered data source; also used as its env prefix (`{NAME}_URL`).
    #[arg(long, default_value = "default", global = true)]
    source: String,
}

#[derive(Subcommand)]
enum Command {
    /// Run every pending migration.
    Up,
    /// Roll back the most recent batch.
    Down,
    /// Drop and rebuild every registered migration from scratch.
    Fresh,
    /// Print each registered migration's applied/pending status.
    List,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("migration command failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), DbError> {
    let options = DataSourceOptions::from_env(cli.source.clone(), &cli.source.to_uppercase())?;
    let source = build_data_source(&options).await?;
    source.connect().await?;

    let runner = MigrationRunner::new();
    let driver = source.driver().migration_driver();

    match cli.command {
        Command::Up => {
            let report = runner.run_all(driver).await?;
            log_report(&report)?;
        }
        Command::Down => {
            let report = runner.rollback_last(driver).await?;
            log_report(&report)?;
        }
        Command::Fresh => {
            let report = runner.fresh(driver).await?;
            log_report(&report)?;
        }
        Command::List => {
            for entry in runner.status(driver).await? {
                log::info!(
                    "{:<40} {}",
                    entry.name,
                    match entry.batch {
                        Some(batch) => format!("applied (batch {})", batch),
                        None => "pending".to_string(),
                    }
                );
            }
        }
    }

    source.disconnect().await
}

#[cfg(feature = "postgres")]
async fn build_data_source(options: &DataSourceOptions) -> Result<DataSource, DbError> {
    let driver = cascade_driver_postgres::PostgresDriver::new(options)?;
    Ok(DataSource::from_options(options, Arc::new(driver)))
}

#[cfg(all(feature = "mongodb", not(feature = "postgres")))]
async fn build_data_source(options: &DataSourceOptions) -> Result<DataSource, DbError> {
    let driver = cascade_driver_mongodb::MongoDriver::new(options).await?;
    Ok(DataSource::from_options(options, Arc::new(driver)))
}

/// Logs each applied migration and, if the batch stopped early, the failure
/// that stopped it — then turns that failure into the process's `Err` so
/// the CLI exits non-zero on the first failure (spec.md §6).
fn log_report(report: &cascade_core::RunReport) -> Result<(), DbError> {
    for outcome in &report.applied {
        log::info!("applied: {} (batch {})", outcome.name, outcome.batch);
    }
    match &report.failure {
        Some(failure) => {
            log::error!("migration '{}' failed: {}", failure.name, failure.error);
            Err(DbError::migration_failed(&failure.name, DbError::NotSupported(failure.error.clone())))
        }
        None => Ok(()),
    }
}
