use crate::config::Benchmarks;
use crate::models::{
    FunnelReport, FunnelStage, NorthStarKpi, RefusalBreakdown, SideFlow, StageCounts, StageId,
    StageRefusals,
};

pub const NORTH_STAR_LABEL: &str = "Lead-to-deal conversion";

/// Conversions are stage-over-previous. With nothing booked at the top of the
/// funnel every conversion is 0, whatever the later stages hold.
pub fn compute_funnel(counts: &StageCounts, benchmarks: &Benchmarks) -> FunnelReport {
    let mut funnel = Vec::with_capacity(StageId::ALL.len());
    let mut previous: Option<u64> = None;
    let entered = counts.zoom_booked > 0;

    for stage in StageId::ALL {
        let value = counts.get(stage);
        let benchmark = benchmarks.for_stage(stage);
        let (conversion, is_red_zone) = match previous {
            None => (if value > 0 { 100.0 } else { 0.0 }, false),
            Some(prev) => {
                let conversion = if entered { percent(value, prev) } else { 0.0 };
                (conversion, conversion < benchmark)
            }
        };

        funnel.push(FunnelStage {
            id: stage,
            label: stage.label().to_string(),
            value,
            conversion,
            benchmark,
            is_red_zone,
        });
        previous = Some(value);
    }

    FunnelReport {
        funnel,
        side_flow: SideFlow {
            refusals: attribute_refusals(counts),
        },
        north_star_kpi: NorthStarKpi {
            value: percent(counts.deals, counts.zoom_booked),
            label: NORTH_STAR_LABEL.to_string(),
        },
    }
}

/// Splits `counts.refusals` across stages. An explicit breakdown wins, capped
/// at the total in stage order; whatever it leaves unexplained lands on
/// [`fallback_refusal_stage`]. `by_stage` always sums to `total`.
pub fn attribute_refusals(counts: &StageCounts) -> RefusalBreakdown {
    let total = counts.refusals;
    if total == 0 {
        return RefusalBreakdown {
            total,
            by_stage: Vec::new(),
        };
    }

    let mut per_stage = [0u64; 6];
    let mut explained = 0u64;
    if let Some(explicit) = &counts.refusals_by_stage {
        // BTreeMap iterates in stage order, so later stages lose the overflow.
        for (stage, count) in explicit {
            let taken = (*count).min(total - explained);
            per_stage[stage_index(*stage)] += taken;
            explained += taken;
        }
    }

    if explained < total {
        per_stage[stage_index(fallback_refusal_stage(counts))] += total - explained;
    }

    let by_stage = StageId::ALL
        .iter()
        .zip(per_stage)
        .filter(|(_, count)| *count > 0)
        .map(|(stage, count)| StageRefusals {
            stage_id: *stage,
            count,
        })
        .collect();

    RefusalBreakdown { total, by_stage }
}

/// Stage with the largest drop to the next stage; earliest stage wins ties,
/// and the first stage is used when nothing drops.
pub fn fallback_refusal_stage(counts: &StageCounts) -> StageId {
    let mut best = StageId::ZoomBooked;
    let mut best_drop = 0u64;

    for pair in StageId::ALL.windows(2) {
        let drop = counts.get(pair[0]).saturating_sub(counts.get(pair[1]));
        if drop > best_drop {
            best = pair[0];
            best_drop = drop;
        }
    }

    best
}

/// Sums per-manager counts into a team total. Explicit refusal breakdowns are
/// kept only when every input carries one.
pub fn merge_counts<'a>(parts: impl IntoIterator<Item = &'a StageCounts>) -> StageCounts {
    let mut merged = StageCounts {
        refusals_by_stage: Some(Default::default()),
        ..Default::default()
    };
    let mut any = false;

    for part in parts {
        any = true;
        merged.zoom_booked = merged.zoom_booked.saturating_add(part.zoom_booked);
        merged.zoom1_held = merged.zoom1_held.saturating_add(part.zoom1_held);
        merged.zoom2_held = merged.zoom2_held.saturating_add(part.zoom2_held);
        merged.contract_review = merged.contract_review.saturating_add(part.contract_review);
        merged.push = merged.push.saturating_add(part.push);
        merged.deals = merged.deals.saturating_add(part.deals);
        merged.refusals = merged.refusals.saturating_add(part.refusals);

        match (&mut merged.refusals_by_stage, &part.refusals_by_stage) {
            (Some(acc), Some(breakdown)) => {
                for (stage, count) in breakdown {
                    let slot = acc.entry(*stage).or_insert(0);
                    *slot = slot.saturating_add(*count);
                }
            }
            (slot, _) => *slot = None,
        }
    }

    if !any {
        merged.refusals_by_stage = None;
    }
    merged
}

fn stage_index(stage: StageId) -> usize {
    StageId::ALL
        .iter()
        .position(|candidate| *candidate == stage)
        .unwrap_or(0)
}

fn percent(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    round1(numerator as f64 / denominator as f64 * 100.0)
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn sample_counts() -> StageCounts {
        StageCounts {
            zoom_booked: 100,
            zoom1_held: 50,
            zoom2_held: 25,
            contract_review: 10,
            push: 5,
            deals: 2,
            refusals: 4,
            refusals_by_stage: None,
        }
    }

    #[test]
    fn conversions_are_stage_over_previous() {
        let report = compute_funnel(&sample_counts(), &Benchmarks::default());
        let conversions: Vec<f64> = report.funnel.iter().map(|s| s.conversion).collect();

        assert_eq!(conversions, vec![100.0, 50.0, 50.0, 40.0, 50.0, 40.0]);
        assert_eq!(report.side_flow.refusals.total, 4);
        assert_eq!(report.north_star_kpi.value, 2.0);
    }

    #[test]
    fn all_zero_input_stays_finite() {
        let report = compute_funnel(&StageCounts::default(), &Benchmarks::default());

        assert_eq!(report.funnel.len(), 6);
        assert!(report.funnel.iter().all(|s| s.value == 0 && s.conversion == 0.0));
        assert!(!report.funnel[0].is_red_zone);
        assert!(report.funnel[1..].iter().all(|s| s.is_red_zone));
        assert_eq!(report.side_flow.refusals.total, 0);
        assert!(report.side_flow.refusals.by_stage.is_empty());
        assert_eq!(report.north_star_kpi.value, 0.0);
    }

    #[test]
    fn no_bookings_zeroes_kpi_and_conversions() {
        let counts = StageCounts {
            zoom1_held: 7,
            zoom2_held: 7,
            push: 4,
            deals: 3,
            refusals: 2,
            ..Default::default()
        };
        let report = compute_funnel(&counts, &Benchmarks::default());

        assert_eq!(report.north_star_kpi.value, 0.0);
        assert_eq!(report.funnel.len(), 6);
        for stage in &report.funnel {
            assert_eq!(stage.conversion, 0.0, "{:?}", stage.id);
        }
    }

    #[test]
    fn stages_after_an_empty_stage_stay_red() {
        let counts = StageCounts {
            zoom_booked: 10,
            ..Default::default()
        };
        let report = compute_funnel(&counts, &Benchmarks::default());

        assert!(!report.funnel[0].is_red_zone);
        for stage in &report.funnel[1..] {
            assert_eq!(stage.conversion, 0.0);
            assert!(stage.is_red_zone, "{:?}", stage.id);
        }
    }

    #[test]
    fn oversized_breakdown_is_capped_at_total() {
        let mut explicit = BTreeMap::new();
        explicit.insert(StageId::Zoom2Held, 2);
        explicit.insert(StageId::Push, 10);
        let counts = StageCounts {
            refusals: 3,
            refusals_by_stage: Some(explicit),
            ..sample_counts()
        };

        let breakdown = attribute_refusals(&counts);
        assert_eq!(breakdown.total, 3);
        assert_eq!(breakdown.by_stage.iter().map(|e| e.count).sum::<u64>(), 3);
        assert_eq!(
            breakdown.by_stage,
            vec![
                StageRefusals {
                    stage_id: StageId::Zoom2Held,
                    count: 2
                },
                StageRefusals {
                    stage_id: StageId::Push,
                    count: 1
                },
            ]
        );
    }

    #[test]
    fn merge_saturates_instead_of_overflowing() {
        let mut explicit = BTreeMap::new();
        explicit.insert(StageId::Deals, u64::MAX);
        let huge = StageCounts {
            zoom_booked: u64::MAX,
            refusals: u64::MAX,
            refusals_by_stage: Some(explicit),
            ..Default::default()
        };

        let merged = merge_counts([&huge, &huge]);
        assert_eq!(merged.zoom_booked, u64::MAX);
        assert_eq!(merged.refusals, u64::MAX);
        assert_eq!(
            merged.refusals_by_stage.as_ref().and_then(|m| m.get(&StageId::Deals)),
            Some(&u64::MAX)
        );
        assert_eq!(attribute_refusals(&merged).total, u64::MAX);
    }

    #[test]
    fn stage_order_is_fixed() {
        let report = compute_funnel(&sample_counts(), &Benchmarks::default());
        let ids: Vec<StageId> = report.funnel.iter().map(|s| s.id).collect();
        assert_eq!(ids, StageId::ALL.to_vec());
    }

    #[test]
    fn red_zone_marks_stages_below_benchmark() {
        let report = compute_funnel(&sample_counts(), &Benchmarks::default());
        let red: Vec<StageId> = report
            .funnel
            .iter()
            .filter(|s| s.is_red_zone)
            .map(|s| s.id)
            .collect();

        // 50 < 60 at zoom1Held; 40 is not below 40 at contract review.
        assert_eq!(red, vec![StageId::Zoom1Held]);
    }

    #[test]
    fn conversion_rounds_to_one_decimal() {
        let counts = StageCounts {
            zoom_booked: 3,
            zoom1_held: 1,
            ..Default::default()
        };
        let report = compute_funnel(&counts, &Benchmarks::default());
        assert_eq!(report.funnel[1].conversion, 33.3);
    }

    #[test]
    fn refusals_fall_back_to_largest_drop() {
        let breakdown = attribute_refusals(&sample_counts());
        assert_eq!(
            breakdown.by_stage,
            vec![StageRefusals {
                stage_id: StageId::ZoomBooked,
                count: 4
            }]
        );

        let counts = StageCounts {
            zoom_booked: 10,
            zoom1_held: 10,
            zoom2_held: 4,
            contract_review: 4,
            push: 1,
            deals: 1,
            refusals: 9,
            refusals_by_stage: None,
        };
        assert_eq!(fallback_refusal_stage(&counts), StageId::Zoom1Held);
    }

    #[test]
    fn fallback_ties_go_to_earliest_stage() {
        let counts = StageCounts {
            zoom_booked: 10,
            zoom1_held: 10,
            zoom2_held: 6,
            contract_review: 6,
            push: 2,
            ..Default::default()
        };
        assert_eq!(fallback_refusal_stage(&counts), StageId::Zoom1Held);
    }

    #[test]
    fn flat_funnel_falls_back_to_first_stage() {
        let counts = StageCounts {
            zoom_booked: 5,
            zoom1_held: 5,
            zoom2_held: 5,
            contract_review: 5,
            push: 5,
            deals: 5,
            refusals: 3,
            refusals_by_stage: None,
        };
        assert_eq!(fallback_refusal_stage(&counts), StageId::ZoomBooked);
    }

    #[test]
    fn explicit_breakdown_is_used_and_topped_up() {
        let mut explicit = BTreeMap::new();
        explicit.insert(StageId::Push, 1);
        explicit.insert(StageId::Zoom2Held, 2);
        let counts = StageCounts {
            refusals: 5,
            refusals_by_stage: Some(explicit),
            ..sample_counts()
        };

        let breakdown = attribute_refusals(&counts);
        assert_eq!(breakdown.total, 5);
        assert_eq!(
            breakdown.by_stage,
            vec![
                StageRefusals {
                    stage_id: StageId::ZoomBooked,
                    count: 2
                },
                StageRefusals {
                    stage_id: StageId::Zoom2Held,
                    count: 2
                },
                StageRefusals {
                    stage_id: StageId::Push,
                    count: 1
                },
            ]
        );
    }

    #[test]
    fn merge_sums_counts_and_drops_partial_breakdowns() {
        let mut explicit = BTreeMap::new();
        explicit.insert(StageId::Push, 1);
        let with_breakdown = StageCounts {
            refusals: 1,
            refusals_by_stage: Some(explicit),
            ..sample_counts()
        };

        let merged = merge_counts([&with_breakdown, &with_breakdown]);
        assert_eq!(merged.zoom_booked, 200);
        assert_eq!(merged.refusals, 2);
        assert_eq!(
            merged.refusals_by_stage.as_ref().and_then(|m| m.get(&StageId::Push)),
            Some(&2)
        );

        let merged = merge_counts([&with_breakdown, &sample_counts()]);
        assert!(merged.refusals_by_stage.is_none());
        assert_eq!(merge_counts(std::iter::empty::<&StageCounts>()), StageCounts::default());
    }

    #[test]
    fn identical_input_gives_identical_json() {
        let first = serde_json::to_string(&compute_funnel(&sample_counts(), &Benchmarks::default()))
            .unwrap();
        let second =
            serde_json::to_string(&compute_funnel(&sample_counts(), &Benchmarks::default()))
                .unwrap();
        assert_eq!(first, second);
        assert!(first.contains("\"northStarKpi\""));
        assert!(first.contains("\"isRedZone\""));
    }
}
