use crate::dashboard::{Dashboard, DashboardView};
use crate::export::ExportReceipt;
use crate::view::{history_lines, ExpansionState, HistoryLine};

/// Table contents for the shell, optionally narrowed by an EPC query.
pub fn dashboard_view(dashboard: &Dashboard, query: Option<&str>) -> Result<DashboardView, String> {
    Ok(dashboard.view(query.unwrap_or_default(), crate::now_millis()))
}

pub fn download_csv(dashboard: &Dashboard, id: &str) -> Result<ExportReceipt, String> {
    dashboard
        .export_csv(id, crate::now_millis())
        .map_err(|err| err.to_string())
}

pub fn download_pdf(dashboard: &Dashboard, id: &str) -> Result<ExportReceipt, String> {
    dashboard.export_pdf(id).map_err(|err| err.to_string())
}

/// History of one record, oldest first, with open entries flagged.
pub fn record_history(
    dashboard: &Dashboard,
    id: &str,
    expansion: &ExpansionState,
) -> Result<Vec<HistoryLine>, String> {
    dashboard
        .record(id)
        .map(|record| history_lines(&record, expansion))
        .map_err(|err| err.to_string())
}
