use std::fmt::Write;

use chrono::NaiveDate;

use crate::config::Config;
use crate::forecast::{forecast_monthly, forecast_weighted};
use crate::funnel::{compute_funnel, merge_counts};
use crate::models::{ForecastResult, FunnelReport, ManagerCounts, Observation};

pub struct ReportInput<'a> {
    pub scope: Option<&'a str>,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub managers: &'a [ManagerCounts],
    pub observations: &'a [Observation],
    pub goal: f64,
}

pub fn build_report(input: &ReportInput<'_>, config: &Config) -> String {
    let team_counts = merge_counts(input.managers.iter().map(|m| &m.counts));
    let funnel = compute_funnel(&team_counts, &config.benchmarks);
    let monthly = forecast_monthly(input.observations, input.goal, input.to);
    let weighted = forecast_weighted(
        input.observations,
        input.goal,
        input.to,
        config.forecast.half_life_days,
    );

    let mut output = String::new();
    let scope_label = input.scope.unwrap_or("whole team");

    let _ = writeln!(output, "# Sales Funnel Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} to {})",
        scope_label, input.from, input.to
    );
    let _ = writeln!(output);

    write_funnel(&mut output, &funnel);
    write_managers(&mut output, input.managers, config);
    write_forecast(&mut output, &monthly, &weighted, config.forecast.half_life_days);

    output
}

fn write_funnel(output: &mut String, report: &FunnelReport) {
    let _ = writeln!(output, "## Funnel");
    let _ = writeln!(output, "| Stage | Count | Conversion | Benchmark | |");
    let _ = writeln!(output, "|---|---:|---:|---:|---|");
    for stage in &report.funnel {
        let _ = writeln!(
            output,
            "| {} | {} | {:.1}% | {:.1}% | {} |",
            stage.label,
            stage.value,
            stage.conversion,
            stage.benchmark,
            if stage.is_red_zone { "red zone" } else { "" }
        );
    }
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "{}: **{:.1}%**",
        report.north_star_kpi.label, report.north_star_kpi.value
    );

    let refusals = &report.side_flow.refusals;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Refusals");
    if refusals.total == 0 {
        let _ = writeln!(output, "No refusals recorded for this window.");
    } else {
        let _ = writeln!(output, "{} refusals in total.", refusals.total);
        for entry in &refusals.by_stage {
            let _ = writeln!(output, "- {}: {}", entry.stage_id.label(), entry.count);
        }
    }
    let _ = writeln!(output);
}

fn write_managers(output: &mut String, managers: &[ManagerCounts], config: &Config) {
    let _ = writeln!(output, "## Managers");

    if managers.is_empty() {
        let _ = writeln!(output, "No reports in this window.");
        let _ = writeln!(output);
        return;
    }

    let mut ranked: Vec<(&str, FunnelReport)> = managers
        .iter()
        .map(|m| (m.manager.as_str(), compute_funnel(&m.counts, &config.benchmarks)))
        .collect();
    ranked.sort_by(|a, b| {
        b.1.north_star_kpi
            .value
            .partial_cmp(&a.1.north_star_kpi.value)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for (manager, report) in &ranked {
        let red: Vec<&str> = report
            .funnel
            .iter()
            .filter(|s| s.is_red_zone)
            .map(|s| s.label.as_str())
            .collect();
        let _ = write!(
            output,
            "- {}: {:.1}% lead-to-deal, {} deals",
            manager,
            report.north_star_kpi.value,
            report.funnel.last().map(|s| s.value).unwrap_or(0)
        );
        if red.is_empty() {
            let _ = writeln!(output);
        } else {
            let _ = writeln!(output, " (red zone: {})", red.join(", "));
        }
    }
    let _ = writeln!(output);
}

fn write_forecast(
    output: &mut String,
    monthly: &ForecastResult,
    weighted: &ForecastResult,
    half_life_days: f64,
) {
    let _ = writeln!(output, "## Forecast");
    let _ = writeln!(output, "Month to date: {:.2}", monthly.current);
    if monthly.goal > 0.0 {
        let _ = writeln!(
            output,
            "Goal: {:.2} ({:.1}% complete)",
            monthly.goal, monthly.completion_percent
        );
    } else {
        let _ = writeln!(output, "Goal: not set");
    }
    let _ = writeln!(
        output,
        "- Run-rate: {:.2}/day, month end {:.2}",
        monthly.daily_average, monthly.projected
    );
    let _ = writeln!(
        output,
        "- Recent pace (half-life {} days): {:.2}/day, month end {:.2}",
        half_life_days, weighted.daily_average, weighted.projected
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StageCounts;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn manager(name: &str, booked: u64, held: u64, deals: u64) -> ManagerCounts {
        ManagerCounts {
            manager: name.to_string(),
            counts: StageCounts {
                zoom_booked: booked,
                zoom1_held: held,
                zoom2_held: held,
                contract_review: held,
                push: held,
                deals,
                refusals: 1,
                refusals_by_stage: None,
            },
        }
    }

    #[test]
    fn report_lists_funnel_managers_and_forecast() {
        let managers = vec![manager("Dana Ortiz", 10, 4, 1), manager("Avery Lee", 10, 8, 4)];
        let observations = vec![Observation {
            date: date(10),
            amount: 1000.0,
        }];
        let input = ReportInput {
            scope: None,
            from: date(1),
            to: date(10),
            managers: &managers,
            observations: &observations,
            goal: 4000.0,
        };

        let report = build_report(&input, &Config::default());

        assert!(report.contains("Generated for whole team (2026-03-01 to 2026-03-10)"));
        assert!(report.contains("| Zoom booked | 20 | 100.0% | 0.0% |  |"));
        assert!(report.contains("Lead-to-deal conversion: **25.0%**"));
        assert!(report.contains("2 refusals in total."));
        assert!(report.contains("Goal: 4000.00 (25.0% complete)"));
        assert!(report.contains("- Run-rate: 100.00/day, month end 3100.00"));

        let avery = report.find("- Avery Lee").unwrap();
        let dana = report.find("- Dana Ortiz").unwrap();
        assert!(avery < dana);
        assert!(report.contains("- Dana Ortiz: 10.0% lead-to-deal, 1 deals (red zone: First Zoom held, Deals closed)"));
    }

    #[test]
    fn empty_window_reports_gracefully() {
        let input = ReportInput {
            scope: Some("Avery Lee"),
            from: date(1),
            to: date(5),
            managers: &[],
            observations: &[],
            goal: 0.0,
        };

        let report = build_report(&input, &Config::default());
        assert!(report.contains("Generated for Avery Lee"));
        assert!(report.contains("No refusals recorded for this window."));
        assert!(report.contains("No reports in this window."));
        assert!(report.contains("Goal: not set"));
    }
}
