use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info, warn};

mod config;
mod db;
mod error;
mod logging;
mod models;
mod payout;
mod period;
mod rates;
mod report;

use config::AppConfig;

#[derive(Parser)]
#[command(name = "fellow-payouts")]
#[command(about = "Session attendance payouts for intervention fellows", long_about = None)]
struct Cli {
    /// Payout config (cutoff time, rate table); defaults to ./payouts.toml when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import attendance rows from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Print the payout window for a cutoff day
    Period {
        /// Cutoff day: M (Monday) or R (Thursday)
        #[arg(long)]
        day: String,
        /// Reference date, RFC 3339 or YYYY-MM-DD; defaults to now
        #[arg(long, value_parser = parse_effective_date)]
        effective_date: Option<DateTime<Utc>>,
    },
    /// Compute fellow payouts for a cutoff day
    Payout {
        /// Cutoff day: M (Monday) or R (Thursday)
        #[arg(long)]
        day: String,
        /// Reference date, RFC 3339 or YYYY-MM-DD; defaults to now
        #[arg(long, value_parser = parse_effective_date)]
        effective_date: Option<DateTime<Utc>>,
        /// Only include fellows under this supervisor
        #[arg(long)]
        supervisor: Option<String>,
        /// Write the full payout CSV here
        #[arg(long)]
        out: Option<PathBuf>,
        /// Write one redacted CSV per supervisor into this directory
        #[arg(long)]
        supervisor_dir: Option<PathBuf>,
        /// Write a markdown summary here
        #[arg(long)]
        summary: Option<PathBuf>,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_effective_date(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|date| date.and_time(chrono::NaiveTime::MIN).and_utc())
        .map_err(|_| format!("'{value}' is not an RFC 3339 timestamp or YYYY-MM-DD date"))
}

async fn connect() -> anyhow::Result<sqlx::PgPool> {
    let database_url = config::database_url()?;
    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);
    let config = AppConfig::load(cli.config.as_deref())?;
    if let Some(source) = &config.source {
        info!(path = %source.display(), "loaded payout config");
    }
    for (tag, rate) in config.rates.iter() {
        debug!(session_type = tag, kind = ?rate.kind, amount = rate.amount, "rate");
    }

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect().await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let pool = connect().await?;
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} attendance rows from {}.", csv.display());
        }
        Commands::Period {
            day,
            effective_date,
        } => {
            let effective = effective_date.unwrap_or_else(Utc::now);
            let window = period::resolve_period(&day, effective, config.cutoff)?;
            println!("{} {}", window.start.to_rfc3339(), window.end.to_rfc3339());
        }
        Commands::Payout {
            day,
            effective_date,
            supervisor,
            out,
            supervisor_dir,
            summary,
            json,
        } => {
            let effective = effective_date.unwrap_or_else(Utc::now);
            let window = period::resolve_period(&day, effective, config.cutoff)?;
            info!(
                day = %day,
                start = %window.start,
                end = %window.end,
                "resolved payout period"
            );

            let pool = connect().await?;
            let records = db::fetch_attendance(&pool, &window, supervisor.as_deref()).await?;
            if let (Some(first), Some(last)) = (
                records.iter().map(|r| r.session_date).min(),
                records.iter().map(|r| r.session_date).max(),
            ) {
                debug!(records = records.len(), %first, %last, "attendance in window");
            }
            let payouts = payout::calculate_payouts(
                &records,
                window,
                &config.rates,
                config.verify_eligibility,
            )
            .with_context(|| format!("payout run for day {day} failed"))?;

            info!(
                fellows = payouts.payout_details.len(),
                total = payouts.total_payout_amount,
                payable = payouts.total_payout_amount_with_complete_payment_info,
                "payouts calculated"
            );
            let missing = payouts.incomplete_records;
            if missing.count_missing_payment_account_name > 0
                || missing.count_missing_payment_account_number > 0
            {
                warn!(
                    missing_name = missing.count_missing_payment_account_name,
                    missing_number = missing.count_missing_payment_account_number,
                    "fellows without complete payment details"
                );
            }

            if let Some(path) = out {
                report::save_csv(&payouts, &path)?;
            }
            if let Some(dir) = supervisor_dir {
                report::save_supervisor_csvs(&payouts, &dir)?;
            }
            if let Some(path) = summary {
                report::save_summary(&day, &payouts, &path)?;
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&payouts)?);
            } else {
                println!(
                    "{} fellows, total {} ({} payable with complete payment details)",
                    payouts.payout_details.len(),
                    payouts.total_payout_amount,
                    payouts.total_payout_amount_with_complete_payment_info
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn effective_date_accepts_plain_dates_and_timestamps() {
        assert_eq!(
            parse_effective_date("2024-06-12").unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 12, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_effective_date("2024-06-12T10:30:00+03:00").unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 12, 7, 30, 0).unwrap()
        );
        assert!(parse_effective_date("12/06/2024").is_err());
    }

    #[test]
    fn cli_parses_payout_command() {
        let cli = Cli::try_parse_from([
            "fellow-payouts",
            "-vv",
            "payout",
            "--day",
            "R",
            "--effective-date",
            "2024-06-12",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Payout { day, json, .. } => {
                assert_eq!(day, "R");
                assert!(json);
            }
            _ => panic!("expected payout command"),
        }
    }
}
