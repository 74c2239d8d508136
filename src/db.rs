use anyhow::Context;
use chrono::{Datelike, Duration, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{ManagerCounts, StageCounts};

const COUNT_COLUMNS: &str = "COALESCE(SUM(zoom_booked), 0)::BIGINT AS zoom_booked, \
     COALESCE(SUM(zoom1_held), 0)::BIGINT AS zoom1_held, \
     COALESCE(SUM(zoom2_held), 0)::BIGINT AS zoom2_held, \
     COALESCE(SUM(contract_review), 0)::BIGINT AS contract_review, \
     COALESCE(SUM(push), 0)::BIGINT AS push, \
     COALESCE(SUM(deals), 0)::BIGINT AS deals, \
     COALESCE(SUM(refusals), 0)::BIGINT AS refusals";

#[derive(Debug, Clone, serde::Deserialize)]
struct DailyReportRow {
    manager: String,
    employee: String,
    report_date: NaiveDate,
    zoom_booked: i32,
    zoom1_held: i32,
    zoom2_held: i32,
    contract_review: i32,
    push: i32,
    deals: i32,
    refusals: i32,
    sales_amount: f64,
    source_key: Option<String>,
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Inserts a month-to-date of reports for a small team.
pub async fn seed(pool: &PgPool) -> anyhow::Result<usize> {
    let team = [
        ("Avery Lee", "Jules Moreno", 1.0),
        ("Avery Lee", "Kiara Patel", 0.8),
        ("Dana Ortiz", "Sam Whitfield", 1.2),
    ];

    let today = Utc::now().date_naive();
    let first = today - Duration::days(i64::from(today.day0()));
    let mut inserted = 0usize;

    for offset in 0..=today.day0() {
        let report_date = first + Duration::days(i64::from(offset));
        for (index, (manager, employee, pace)) in team.iter().enumerate() {
            // Cheap deterministic variation per person and day.
            let wobble = ((offset as usize * 7 + index * 3) % 5) as f64;
            let booked = (6.0 * pace + wobble).round() as i32;
            let row = DailyReportRow {
                manager: manager.to_string(),
                employee: employee.to_string(),
                report_date,
                zoom_booked: booked,
                zoom1_held: booked * 3 / 4,
                zoom2_held: booked / 2,
                contract_review: booked / 3,
                push: booked / 5,
                deals: i32::from(wobble >= 3.0),
                refusals: booked / 4,
                sales_amount: (wobble + 1.0) * 12_500.0 * pace,
                source_key: Some(format!("seed-{employee}-{report_date}")),
            };
            if insert_report(pool, &row).await? {
                inserted += 1;
            }
        }
    }

    tracing::info!(inserted, "seeded daily reports");
    Ok(inserted)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<DailyReportRow>().enumerate() {
        let row = result.with_context(|| format!("invalid row {}", line + 1))?;
        if insert_report(pool, &row).await? {
            inserted += 1;
        } else {
            tracing::debug!(source_key = ?row.source_key, "skipped duplicate report");
        }
    }

    Ok(inserted)
}

async fn insert_report(pool: &PgPool, row: &DailyReportRow) -> anyhow::Result<bool> {
    let source_key = row
        .source_key
        .clone()
        .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

    let result = sqlx::query(
        r#"
        INSERT INTO sales_analytics.daily_reports
        (id, manager, employee, report_date, zoom_booked, zoom1_held, zoom2_held,
         contract_review, push, deals, refusals, sales_amount, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&row.manager)
    .bind(&row.employee)
    .bind(row.report_date)
    .bind(row.zoom_booked)
    .bind(row.zoom1_held)
    .bind(row.zoom2_held)
    .bind(row.contract_review)
    .bind(row.push)
    .bind(row.deals)
    .bind(row.refusals)
    .bind(row.sales_amount)
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Summed stage counts over `[from, to]`, optionally for one manager.
pub async fn fetch_stage_counts(
    pool: &PgPool,
    from: NaiveDate,
    to: NaiveDate,
    manager: Option<&str>,
) -> anyhow::Result<StageCounts> {
    let query = format!(
        "SELECT {COUNT_COLUMNS} \
         FROM sales_analytics.daily_reports \
         WHERE report_date BETWEEN $1 AND $2 \
         AND ($3::TEXT IS NULL OR manager = $3)"
    );

    let row = sqlx::query(&query)
        .bind(from)
        .bind(to)
        .bind(manager)
        .fetch_one(pool)
        .await
        .context("failed to aggregate stage counts")?;

    Ok(stage_counts_from_row(&row))
}

pub async fn fetch_manager_counts(
    pool: &PgPool,
    from: NaiveDate,
    to: NaiveDate,
) -> anyhow::Result<Vec<ManagerCounts>> {
    let query = format!(
        "SELECT manager, {COUNT_COLUMNS} \
         FROM sales_analytics.daily_reports \
         WHERE report_date BETWEEN $1 AND $2 \
         GROUP BY manager \
         ORDER BY manager"
    );

    let rows = sqlx::query(&query)
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
        .context("failed to aggregate counts per manager")?;

    Ok(rows
        .iter()
        .map(|row| ManagerCounts {
            manager: row.get("manager"),
            counts: stage_counts_from_row(row),
        })
        .collect())
}

/// Per-day sales totals from the first of `as_of`'s month through `as_of`.
pub async fn fetch_daily_sales(
    pool: &PgPool,
    as_of: NaiveDate,
    manager: Option<&str>,
) -> anyhow::Result<Vec<(NaiveDate, f64)>> {
    let month_start = as_of - Duration::days(i64::from(as_of.day0()));
    let rows = sqlx::query(
        r#"
        SELECT report_date, COALESCE(SUM(sales_amount), 0)::DOUBLE PRECISION AS amount
        FROM sales_analytics.daily_reports
        WHERE report_date BETWEEN $1 AND $2
        AND ($3::TEXT IS NULL OR manager = $3)
        GROUP BY report_date
        ORDER BY report_date
        "#,
    )
    .bind(month_start)
    .bind(as_of)
    .bind(manager)
    .fetch_all(pool)
    .await
    .context("failed to load daily sales")?;

    Ok(rows
        .iter()
        .map(|row| (row.get("report_date"), row.get("amount")))
        .collect())
}

fn stage_counts_from_row(row: &PgRow) -> StageCounts {
    let count = |column: &str| -> u64 { u64::try_from(row.get::<i64, _>(column)).unwrap_or(0) };

    StageCounts {
        zoom_booked: count("zoom_booked"),
        zoom1_held: count("zoom1_held"),
        zoom2_held: count("zoom2_held"),
        contract_review: count("contract_review"),
        push: count("push"),
        deals: count("deals"),
        refusals: count("refusals"),
        refusals_by_stage: None,
    }
}
