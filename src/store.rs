use crate::errors::AppResult;
use crate::models::{ApplyReport, ReminderRecord, RiskRecord};

/// Durable home of risks and reminders.
///
/// Loader and reconciler only ever talk to storage through this trait, so a
/// different engine (or an in-memory fake in tests) can stand in for SQLite.
pub trait RecordStore: Send + Sync {
    fn fetch_risks(&self) -> AppResult<Vec<RiskRecord>>;
    fn fetch_reminders(&self) -> AppResult<Vec<ReminderRecord>>;

    /// One whole-row update per entry, keyed by id, applied as a single batch.
    /// Ids that match no stored row come back in `ApplyReport::conflicts`.
    fn update_risks(&self, rows: &[RiskRecord]) -> AppResult<ApplyReport>;
    fn update_reminders(&self, rows: &[ReminderRecord]) -> AppResult<ApplyReport>;

    /// The row's `id` is ignored; storage assigns it.
    fn insert_risk(&self, row: &RiskRecord) -> AppResult<RiskRecord>;
    fn insert_reminder(&self, row: &ReminderRecord) -> AppResult<ReminderRecord>;
}
