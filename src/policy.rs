use crate::errors::{AppError, AppResult};
use crate::models::{Page, ReminderRecord, RiskRecord, RiskStatus, Role};

const MIN_PROGRESS: i64 = 0;
const MAX_PROGRESS: i64 = 100;

/// Every problem with a risk row, in column order. Empty means writable.
pub fn validate_risk(row: &RiskRecord) -> Vec<String> {
    let mut problems = Vec::new();

    for (column, value) in [
        ("fornitore", &row.fornitore),
        ("contract_owner", &row.contract_owner),
        ("area_riferimento", &row.area_riferimento),
    ] {
        if value.trim().is_empty() {
            problems.push(format!("{} is required", column));
        }
    }

    match (row.stato, row.data_chiusura) {
        (RiskStatus::Chiuso, None) => {
            problems.push("data_chiusura is required when stato is chiuso".to_string());
        }
        (RiskStatus::Aperto, Some(_)) => {
            problems.push("data_chiusura must be empty while stato is aperto".to_string());
        }
        _ => {}
    }

    if !(MIN_PROGRESS..=MAX_PROGRESS).contains(&row.perc_avanzamento) {
        problems.push(format!(
            "perc_avanzamento must be between {} and {} (got {})",
            MIN_PROGRESS, MAX_PROGRESS, row.perc_avanzamento
        ));
    }

    problems
}

pub fn validate_reminder(row: &ReminderRecord) -> Vec<String> {
    let mut problems = Vec::new();
    if row.fornitore_nome.trim().is_empty() {
        problems.push("fornitore_nome is required".to_string());
    }
    problems
}

pub fn menu_for(role: Role) -> Vec<Page> {
    let mut menu = vec![Page::Dashboard, Page::Report];
    if role.can_edit() {
        menu.extend([Page::Censimento, Page::Modifica, Page::FollowUp]);
    }
    if role == Role::Admin {
        menu.push(Page::Admin);
    }
    menu
}

pub fn require_page(role: Role, page: Page) -> AppResult<()> {
    if menu_for(role).contains(&page) {
        return Ok(());
    }
    Err(AppError::AccessDenied(format!(
        "role '{}' cannot open {:?}",
        role.as_str(),
        page
    )))
}
