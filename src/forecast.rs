//! Month-end sales projection.
//!
//! Both strategies take the month-to-date series in cumulative form: each
//! [`Observation`] carries the running total as of its date. Data sources that
//! store per-day totals go through [`cumulative_observations`] first.

use chrono::{Datelike, Duration, Months, NaiveDate};

use crate::funnel::round1;
use crate::models::{ChartPoint, ForecastResult, Observation};

/// Run-rate projection: average per calendar day so far, carried to month end.
pub fn forecast_monthly(observations: &[Observation], goal: f64, as_of: NaiveDate) -> ForecastResult {
    let series = month_to_date(observations, as_of);
    let current = latest_amount(&series);
    let days_elapsed = as_of.day().max(1);
    let daily_average = current / f64::from(days_elapsed);

    build_result(&series, current, daily_average, goal, as_of)
}

/// Projection from a recency-weighted daily rate, so that a pace change late
/// in the month moves the estimate more than an early one.
pub fn forecast_weighted(
    observations: &[Observation],
    goal: f64,
    as_of: NaiveDate,
    half_life_days: f64,
) -> ForecastResult {
    let series = month_to_date(observations, as_of);
    let current = latest_amount(&series);
    let daily_average = weighted_daily_rate(&series, as_of, half_life_days);

    build_result(&series, current, daily_average, goal, as_of)
}

/// Weight of a day `days_ago` before the forecast date. A non-positive or
/// non-finite half-life weights every day equally.
pub fn recency_weight(days_ago: i64, half_life_days: f64) -> f64 {
    if !half_life_days.is_finite() || half_life_days <= 0.0 {
        return 1.0;
    }
    0.5_f64.powf(days_ago.max(0) as f64 / half_life_days)
}

/// Turns per-day totals into running month-to-date totals. Input order does
/// not matter; several totals for the same day are summed.
pub fn cumulative_observations(daily_totals: &[(NaiveDate, f64)]) -> Vec<Observation> {
    let mut sorted = daily_totals.to_vec();
    sorted.sort_by_key(|(date, _)| *date);

    let mut series: Vec<Observation> = Vec::with_capacity(sorted.len());
    let mut running = 0.0;
    for (date, amount) in sorted {
        running += amount;
        if let Some(last) = series.last_mut().filter(|last| last.date == date) {
            last.amount = running;
        } else {
            series.push(Observation {
                date,
                amount: running,
            });
        }
    }
    series
}

pub fn days_in_month(date: NaiveDate) -> u32 {
    let first = month_start(date);
    first
        .checked_add_months(Months::new(1))
        .map(|next| (next - first).num_days() as u32)
        .unwrap_or(31)
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.day0()))
}

/// Observations in `as_of`'s month up to and including `as_of`, sorted by
/// date. On duplicate dates the one given last wins.
fn month_to_date(observations: &[Observation], as_of: NaiveDate) -> Vec<Observation> {
    let start = month_start(as_of);
    let mut series: Vec<Observation> = observations
        .iter()
        .filter(|obs| obs.date >= start && obs.date <= as_of)
        .copied()
        .collect();
    series.sort_by_key(|obs| obs.date);

    let mut deduped: Vec<Observation> = Vec::with_capacity(series.len());
    for obs in series {
        if let Some(last) = deduped.last_mut().filter(|last| last.date == obs.date) {
            *last = obs;
        } else {
            deduped.push(obs);
        }
    }
    deduped
}

fn latest_amount(series: &[Observation]) -> f64 {
    series.last().map(|obs| obs.amount).unwrap_or(0.0)
}

fn weighted_daily_rate(series: &[Observation], as_of: NaiveDate, half_life_days: f64) -> f64 {
    let mut previous_date = month_start(as_of) - Duration::days(1);
    let mut previous_amount = 0.0;
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;

    for obs in series {
        // The change since the previous observation is spread over every day
        // it covers.
        let span = (obs.date - previous_date).num_days().max(1);
        let per_day = (obs.amount - previous_amount) / span as f64;

        for offset in 0..span {
            let day = obs.date - Duration::days(offset);
            let weight = recency_weight((as_of - day).num_days(), half_life_days);
            weighted_sum += weight * per_day;
            weight_total += weight;
        }

        previous_date = obs.date;
        previous_amount = obs.amount;
    }

    // Days after the last report up to `as_of` sold nothing.
    if !series.is_empty() {
        let mut day = previous_date + Duration::days(1);
        while day <= as_of {
            weight_total += recency_weight((as_of - day).num_days(), half_life_days);
            day += Duration::days(1);
        }
    }

    if weight_total > 0.0 {
        weighted_sum / weight_total
    } else {
        0.0
    }
}

fn build_result(
    series: &[Observation],
    current: f64,
    daily_average: f64,
    goal: f64,
    as_of: NaiveDate,
) -> ForecastResult {
    let month_days = days_in_month(as_of);
    let days_remaining = month_days.saturating_sub(as_of.day());
    let projected = current + daily_average * f64::from(days_remaining);
    let completion_percent = if goal > 0.0 {
        round1(current / goal * 100.0)
    } else {
        0.0
    };

    ForecastResult {
        current,
        projected,
        goal,
        completion_percent,
        daily_average,
        chart_data: chart_data(series, current, daily_average, as_of, month_days),
    }
}

/// One point per day of the month: carried-forward actuals up to `as_of`, the
/// projection line from `as_of` on.
fn chart_data(
    series: &[Observation],
    current: f64,
    daily_average: f64,
    as_of: NaiveDate,
    month_days: u32,
) -> Vec<ChartPoint> {
    let start = month_start(as_of);
    let mut points = Vec::with_capacity(month_days as usize);
    let mut observed = series.iter().peekable();
    let mut carried = 0.0;

    for offset in 0..month_days {
        let date = start + Duration::days(i64::from(offset));
        while let Some(obs) = observed.next_if(|obs| obs.date <= date) {
            carried = obs.amount;
        }

        let actual = (date <= as_of).then_some(carried);
        let projected =
            (date >= as_of).then(|| current + daily_average * (date - as_of).num_days() as f64);
        points.push(ChartPoint {
            date,
            actual,
            projected,
        });
    }

    points
}
