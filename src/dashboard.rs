use crate::models::{
    DashboardOverview, ReminderView, ReportSelection, ReportSummary, RiskFilters, RiskRecord, RiskStatus, Severity,
    SupplierGroup,
};
use std::collections::{BTreeMap, BTreeSet};

pub fn overview(risks: &[RiskRecord], reminders: &[ReminderView]) -> DashboardOverview {
    let open_risks = count_status(risks, RiskStatus::Aperto);
    let closed_risks = count_status(risks, RiskStatus::Chiuso);
    DashboardOverview {
        total_risks: risks.len(),
        open_risks,
        closed_risks,
        overdue_reminders: reminders.iter().filter(|view| view.overdue).cloned().collect(),
        by_status: counts(risks.iter().map(|risk| risk.stato.as_str())),
        by_severity: counts(risks.iter().map(|risk| risk.gravita.as_str())),
    }
}

/// An empty or missing supplier list keeps every supplier. Status and
/// severity lists restrict only when present, so `Some(vec![])` matches nothing.
pub fn filter_risks(risks: &[RiskRecord], filters: &RiskFilters) -> Vec<RiskRecord> {
    risks
        .iter()
        .filter(|risk| match &filters.fornitore {
            Some(names) if !names.is_empty() => names.iter().any(|name| name == &risk.fornitore),
            _ => true,
        })
        .filter(|risk| filters.stati.as_ref().map_or(true, |stati| stati.contains(&risk.stato)))
        .filter(|risk| {
            filters
                .gravita
                .as_ref()
                .map_or(true, |gravita| gravita.contains(&risk.gravita))
        })
        .cloned()
        .collect()
}

pub fn suppliers(risks: &[RiskRecord]) -> Vec<String> {
    risks
        .iter()
        .map(|risk| risk.fornitore.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Rows and aggregates a printed report is built from.
pub fn report_selection(risks: &[RiskRecord], filters: &RiskFilters) -> ReportSelection {
    let selected = filter_risks(risks, filters);
    let summary = ReportSummary {
        total: selected.len(),
        open: count_status(&selected, RiskStatus::Aperto),
        critical: selected.iter().filter(|risk| risk.gravita == Severity::Critical).count(),
    };
    let by_severity = counts(selected.iter().map(|risk| risk.gravita.as_str()));

    let mut grouped: BTreeMap<String, Vec<RiskRecord>> = BTreeMap::new();
    for risk in selected {
        grouped.entry(risk.fornitore.clone()).or_default().push(risk);
    }

    ReportSelection {
        summary,
        by_severity,
        suppliers: grouped
            .into_iter()
            .map(|(fornitore, risks)| SupplierGroup { fornitore, risks })
            .collect(),
    }
}

fn count_status(risks: &[RiskRecord], status: RiskStatus) -> usize {
    risks.iter().filter(|risk| risk.stato == status).count()
}

fn counts<'a>(values: impl Iterator<Item = &'a str>) -> BTreeMap<String, usize> {
    let mut out = BTreeMap::new();
    for value in values {
        *out.entry(value.to_string()).or_insert(0) += 1;
    }
    out
}
