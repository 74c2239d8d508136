use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Sales funnel stages, in funnel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StageId {
    ZoomBooked,
    Zoom1Held,
    Zoom2Held,
    ContractReview,
    Push,
    Deals,
}

impl StageId {
    pub const ALL: [StageId; 6] = [
        StageId::ZoomBooked,
        StageId::Zoom1Held,
        StageId::Zoom2Held,
        StageId::ContractReview,
        StageId::Push,
        StageId::Deals,
    ];

    pub fn label(self) -> &'static str {
        match self {
            StageId::ZoomBooked => "Zoom booked",
            StageId::Zoom1Held => "First Zoom held",
            StageId::Zoom2Held => "Second Zoom held",
            StageId::ContractReview => "Contract review",
            StageId::Push => "Push",
            StageId::Deals => "Deals closed",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StageId::ZoomBooked => "zoomBooked",
            StageId::Zoom1Held => "zoom1Held",
            StageId::Zoom2Held => "zoom2Held",
            StageId::ContractReview => "contractReview",
            StageId::Push => "push",
            StageId::Deals => "deals",
        }
    }
}

/// Raw counts observed for a period. Negative values are not representable;
/// anything else is taken as given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StageCounts {
    pub zoom_booked: u64,
    pub zoom1_held: u64,
    pub zoom2_held: u64,
    pub contract_review: u64,
    pub push: u64,
    pub deals: u64,
    pub refusals: u64,
    /// Per-stage refusal breakdown, when the source tracks one.
    pub refusals_by_stage: Option<BTreeMap<StageId, u64>>,
}

impl StageCounts {
    pub fn get(&self, stage: StageId) -> u64 {
        match stage {
            StageId::ZoomBooked => self.zoom_booked,
            StageId::Zoom1Held => self.zoom1_held,
            StageId::Zoom2Held => self.zoom2_held,
            StageId::ContractReview => self.contract_review,
            StageId::Push => self.push,
            StageId::Deals => self.deals,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelStage {
    pub id: StageId,
    pub label: String,
    pub value: u64,
    pub conversion: f64,
    pub benchmark: f64,
    pub is_red_zone: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRefusals {
    pub stage_id: StageId,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefusalBreakdown {
    pub total: u64,
    pub by_stage: Vec<StageRefusals>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SideFlow {
    pub refusals: RefusalBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NorthStarKpi {
    pub value: f64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelReport {
    pub funnel: Vec<FunnelStage>,
    pub side_flow: SideFlow,
    pub north_star_kpi: NorthStarKpi,
}

/// Cumulative month-to-date sales amount as of `date`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projected: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastResult {
    pub current: f64,
    pub projected: f64,
    pub goal: f64,
    pub completion_percent: f64,
    pub daily_average: f64,
    pub chart_data: Vec<ChartPoint>,
}

/// One manager's (or employee's) aggregated counts for a period.
#[derive(Debug, Clone)]
pub struct ManagerCounts {
    pub manager: String,
    pub counts: StageCounts,
}
