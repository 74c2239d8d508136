use std::io::Write;

use crate::models::{ForecastResult, FunnelReport};

/// Neutralizes cells a spreadsheet would evaluate as a formula.
pub fn sanitize_cell(value: &str) -> String {
    match value.chars().next() {
        Some('=' | '+' | '-' | '@' | '\t' | '\r') => format!("'{value}"),
        _ => value.to_string(),
    }
}

pub fn write_funnel_csv<W: Write>(
    writer: W,
    scope: &str,
    report: &FunnelReport,
) -> anyhow::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record([
        "scope",
        "stage",
        "label",
        "value",
        "conversion",
        "benchmark",
        "red_zone",
        "refusals",
    ])?;

    let scope = sanitize_cell(scope);
    for stage in &report.funnel {
        let refusals: u64 = report
            .side_flow
            .refusals
            .by_stage
            .iter()
            .filter(|entry| entry.stage_id == stage.id)
            .map(|entry| entry.count)
            .sum();

        csv.write_record([
            scope.clone(),
            stage.id.as_str().to_string(),
            sanitize_cell(&stage.label),
            stage.value.to_string(),
            format!("{:.1}", stage.conversion),
            format!("{:.1}", stage.benchmark),
            stage.is_red_zone.to_string(),
            refusals.to_string(),
        ])?;
    }

    csv.flush()?;
    Ok(())
}

pub fn write_forecast_csv<W: Write>(writer: W, forecast: &ForecastResult) -> anyhow::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["date", "actual", "projected"])?;

    for point in &forecast.chart_data {
        csv.write_record([
            point.date.to_string(),
            point.actual.map(|v| format!("{v:.2}")).unwrap_or_default(),
            point.projected.map(|v| format!("{v:.2}")).unwrap_or_default(),
        ])?;
    }

    csv.flush()?;
    Ok(())
}
