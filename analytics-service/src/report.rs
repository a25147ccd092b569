//! Assembly of every dashboard view for one client request.

use metering_client::{
    domain::{Plant, YearMonth},
    MeteringStore,
};
use serde::Serialize;
use time::Date;

use crate::{
    aggregation::{
        fetch_combined_monthly, fetch_daily_tod, fetch_generation_consumption, fetch_monthly_tod,
        fetch_plants, fetch_tod_binned, fetch_unitwise, pivot_by_slot, Anomalies, DateRange,
        MonthlyRow, PlantScope, SlotPivotRow, TodRow, UnitRow,
    },
    config::Settings,
    derived::{
        banking_totals, calculate_costs, enrich_generation_consumption, generation_summary,
        settlement_breakdown, summarize_costs, BankingPolicy, BankingTotals, CostRow, CostSummary,
        GenerationConsumptionMetrics, GenerationSummary, SettlementBreakdown,
    },
    error::AnalyticsError,
    tod::{slot_color, slot_label_with_time, slot_order},
};

#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub client_id: String,
    pub range: DateRange,
    /// Plant id, name or type; `None` selects the combined view.
    pub plant: Option<String>,
}

/// Display metadata for one canonical slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotLegend {
    pub label: &'static str,
    pub label_with_time: String,
    pub color: &'static str,
}

fn slot_legend() -> Vec<SlotLegend> {
    slot_order()
        .into_iter()
        .map(|slot| SlotLegend {
            label: slot.label(),
            label_with_time: slot_label_with_time(slot),
            color: slot_color(slot),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostView {
    pub policy: BankingPolicy,
    pub rows: Vec<CostRow>,
    pub summary: CostSummary,
}

impl CostView {
    fn build(monthly: &[MonthlyRow], settings: &Settings, policy: BankingPolicy) -> Self {
        let rows = calculate_costs(monthly, settings.grid_rate, policy);
        let summary = summarize_costs(&rows);
        Self {
            policy,
            rows,
            summary,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardReport {
    pub client_id: String,
    pub start: Date,
    pub end: Date,
    pub scope: PlantScope,
    pub plants: Vec<Plant>,
    pub slots: Vec<SlotLegend>,
    pub generation_consumption: Vec<GenerationConsumptionMetrics>,
    pub generation_summary: GenerationSummary,
    pub tod_binned: Vec<TodRow>,
    pub daily_tod: Vec<SlotPivotRow<Date>>,
    pub monthly_tod: Vec<SlotPivotRow<YearMonth>>,
    pub unitwise: Vec<UnitRow>,
    pub monthly: Vec<MonthlyRow>,
    pub settlement: Vec<SettlementBreakdown>,
    pub banking_totals: BankingTotals,
    pub selected_policy: BankingPolicy,
    /// Both policies, with-banking first.
    pub costs: Vec<CostView>,
    pub anomalies: Anomalies,
}

impl DashboardReport {
    pub fn selected_costs(&self) -> Option<&CostView> {
        self.costs.iter().find(|c| c.policy == self.selected_policy)
    }

    /// True when no view returned any row.
    pub fn is_empty(&self) -> bool {
        self.generation_consumption.is_empty()
            && self.tod_binned.is_empty()
            && self.daily_tod.is_empty()
            && self.monthly_tod.is_empty()
            && self.unitwise.is_empty()
            && self.monthly.is_empty()
    }
}

pub async fn build_report<S>(
    store: &S,
    request: &ReportRequest,
    settings: &Settings,
) -> Result<DashboardReport, AnalyticsError>
where
    S: MeteringStore + ?Sized,
{
    let client_id = request.client_id.trim();
    let range = request.range;

    let plants = fetch_plants(store, client_id).await?;
    let scope = PlantScope::resolve(&plants, request.plant.as_deref())?;
    let plant_type = scope.plant_type();
    tracing::debug!(client_id, ?scope, start = %range.start(), end = %range.end(), "building report");

    let (generation, tod_binned, daily_tod, monthly_tod, unitwise, monthly) = futures::try_join!(
        fetch_generation_consumption(store, client_id, range),
        fetch_tod_binned(store, client_id, range),
        fetch_daily_tod(store, client_id, range, plant_type),
        fetch_monthly_tod(store, client_id, plant_type, settings.max_daily_tod_rows),
        fetch_unitwise(store, client_id, range),
        fetch_combined_monthly(store, Some(client_id)),
    )?;

    let mut anomalies = Anomalies::default();
    anomalies.merge(generation.anomalies);
    anomalies.merge(tod_binned.anomalies);
    anomalies.merge(daily_tod.anomalies);
    anomalies.merge(monthly_tod.anomalies);
    anomalies.merge(unitwise.anomalies);
    anomalies.merge(monthly.anomalies);

    let costs = vec![
        CostView::build(&monthly.rows, settings, BankingPolicy::WithBanking),
        CostView::build(&monthly.rows, settings, BankingPolicy::WithoutBanking),
    ];

    Ok(DashboardReport {
        client_id: client_id.to_string(),
        start: range.start(),
        end: range.end(),
        plants,
        slots: slot_legend(),
        generation_consumption: enrich_generation_consumption(&generation.rows),
        generation_summary: generation_summary(&generation.rows, settings.loss_factor),
        tod_binned: tod_binned.rows,
        daily_tod: pivot_by_slot(daily_tod.rows.into_iter().map(|r| r.pivot_entry())),
        monthly_tod: pivot_by_slot(monthly_tod.rows.into_iter().map(|r| r.pivot_entry())),
        unitwise: unitwise.rows,
        settlement: settlement_breakdown(&monthly.rows),
        banking_totals: banking_totals(&monthly.rows, settings.loss_factor),
        monthly: monthly.rows,
        selected_policy: settings.banking_policy,
        costs,
        scope,
        anomalies,
    })
}
