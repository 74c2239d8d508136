use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use sales_funnel_forecast::models::{ForecastResult, ManagerCounts, StageCounts};
use sales_funnel_forecast::report::ReportInput;
use sales_funnel_forecast::{
    compute_funnel, cumulative_observations, db, export, forecast_monthly, forecast_weighted,
    report, resolve_goal, Config,
};

#[derive(Parser)]
#[command(name = "sales-funnel-forecast")]
#[command(about = "Sales funnel conversion and month-end forecast for sales teams", long_about = None)]
struct Cli {
    /// TOML file with benchmarks, goals and forecast settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a month of sample reports
    Seed,
    /// Import daily reports from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Show funnel conversion for a window
    Funnel {
        #[arg(long)]
        manager: Option<String>,
        #[arg(long, default_value_t = 30)]
        since_days: i64,
        #[arg(long)]
        as_of: Option<NaiveDate>,
        /// Read stage counts from a JSON file instead of the database
        #[arg(long)]
        counts: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Project the month-end sales total
    Forecast {
        #[arg(long)]
        manager: Option<String>,
        #[arg(long)]
        as_of: Option<NaiveDate>,
        /// Overrides the configured goal
        #[arg(long)]
        goal: Option<f64>,
        #[arg(long, value_enum, default_value_t = Strategy::Weighted)]
        strategy: Strategy,
        /// Overrides the configured half-life for the weighted strategy
        #[arg(long)]
        half_life_days: Option<f64>,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        manager: Option<String>,
        #[arg(long, default_value_t = 30)]
        since_days: i64,
        #[arg(long)]
        as_of: Option<NaiveDate>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Export funnel or forecast data as CSV
    Export {
        #[arg(value_enum)]
        kind: ExportKind,
        #[arg(long)]
        manager: Option<String>,
        #[arg(long, default_value_t = 30)]
        since_days: i64,
        #[arg(long)]
        as_of: Option<NaiveDate>,
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    Linear,
    Weighted,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportKind {
    Funnel,
    Forecast,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&connect().await?).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let inserted = db::seed(&connect().await?).await?;
            println!("Inserted {inserted} sample reports.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&connect().await?, &csv).await?;
            println!("Inserted {inserted} reports from {}.", csv.display());
        }
        Commands::Funnel {
            manager,
            since_days,
            as_of,
            counts,
            json,
        } => {
            let counts = match counts {
                Some(path) => read_counts(&path)?,
                None => {
                    let to = as_of.unwrap_or_else(today);
                    let from = window_start(to, since_days);
                    db::fetch_stage_counts(&connect().await?, from, to, manager.as_deref())
                        .await?
                }
            };
            let funnel = compute_funnel(&counts, &config.benchmarks);
            tracing::info!(
                kpi = funnel.north_star_kpi.value,
                refusals = funnel.side_flow.refusals.total,
                "funnel computed"
            );

            if json {
                println!("{}", serde_json::to_string_pretty(&funnel)?);
                return Ok(());
            }

            for stage in &funnel.funnel {
                println!(
                    "{:<18} {:>6} {:>6.1}% (benchmark {:.1}%){}",
                    stage.label,
                    stage.value,
                    stage.conversion,
                    stage.benchmark,
                    if stage.is_red_zone { "  RED ZONE" } else { "" }
                );
            }
            println!(
                "{}: {:.1}%",
                funnel.north_star_kpi.label, funnel.north_star_kpi.value
            );
            for entry in &funnel.side_flow.refusals.by_stage {
                println!("Refused at {}: {}", entry.stage_id.label(), entry.count);
            }
        }
        Commands::Forecast {
            manager,
            as_of,
            goal,
            strategy,
            half_life_days,
            json,
        } => {
            let as_of = as_of.unwrap_or_else(today);
            let pool = connect().await?;
            let daily = db::fetch_daily_sales(&pool, as_of, manager.as_deref()).await?;
            let observations = cumulative_observations(&daily);
            let goal = goal.unwrap_or_else(|| resolve_goal(&config.goals, manager.as_deref()));

            let result = match strategy {
                Strategy::Linear => forecast_monthly(&observations, goal, as_of),
                Strategy::Weighted => forecast_weighted(
                    &observations,
                    goal,
                    as_of,
                    half_life_days.unwrap_or(config.forecast.half_life_days),
                ),
            };
            tracing::info!(
                observations = observations.len(),
                projected = result.projected,
                "forecast computed"
            );

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_forecast(&result);
            }
        }
        Commands::Report {
            manager,
            since_days,
            as_of,
            out,
        } => {
            let to = as_of.unwrap_or_else(today);
            let from = window_start(to, since_days);
            let pool = connect().await?;
            let managers = scoped_manager_counts(&pool, from, to, manager.as_deref()).await?;
            let daily = db::fetch_daily_sales(&pool, to, manager.as_deref()).await?;
            let observations = cumulative_observations(&daily);

            let report = report::build_report(
                &ReportInput {
                    scope: manager.as_deref(),
                    from,
                    to,
                    managers: &managers,
                    observations: &observations,
                    goal: resolve_goal(&config.goals, manager.as_deref()),
                },
                &config,
            );
            write_output(&out, report.as_bytes())?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export {
            kind,
            manager,
            since_days,
            as_of,
            out,
        } => {
            let to = as_of.unwrap_or_else(today);
            let pool = connect().await?;

            let mut buffer = Vec::new();
            match kind {
                ExportKind::Funnel => {
                    let from = window_start(to, since_days);
                    let counts =
                        db::fetch_stage_counts(&pool, from, to, manager.as_deref()).await?;
                    let funnel = compute_funnel(&counts, &config.benchmarks);
                    export::write_funnel_csv(
                        &mut buffer,
                        manager.as_deref().unwrap_or("team"),
                        &funnel,
                    )?;
                }
                ExportKind::Forecast => {
                    let daily = db::fetch_daily_sales(&pool, to, manager.as_deref()).await?;
                    let result = forecast_weighted(
                        &cumulative_observations(&daily),
                        resolve_goal(&config.goals, manager.as_deref()),
                        to,
                        config.forecast.half_life_days,
                    );
                    export::write_forecast_csv(&mut buffer, &result)?;
                }
            }

            write_output(&out, &buffer)?;
            println!("Export written to {}.", out.display());
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn scoped_manager_counts(
    pool: &PgPool,
    from: NaiveDate,
    to: NaiveDate,
    manager: Option<&str>,
) -> anyhow::Result<Vec<ManagerCounts>> {
    match manager {
        Some(name) => Ok(vec![ManagerCounts {
            manager: name.to_string(),
            counts: db::fetch_stage_counts(pool, from, to, Some(name)).await?,
        }]),
        None => db::fetch_manager_counts(pool, from, to).await,
    }
}

/// Writes only once the content is complete, so a failed run leaves no file.
fn write_output(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

fn read_counts(path: &Path) -> anyhow::Result<StageCounts> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid stage counts in {}", path.display()))
}

fn print_forecast(result: &ForecastResult) {
    println!("Month to date: {:.2}", result.current);
    println!("Daily pace:    {:.2}", result.daily_average);
    println!("Month end:     {:.2}", result.projected);
    if result.goal > 0.0 {
        println!(
            "Goal:          {:.2} ({:.1}% complete)",
            result.goal, result.completion_percent
        );
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn window_start(to: NaiveDate, since_days: i64) -> NaiveDate {
    to - Duration::days(since_days.max(1))
}
