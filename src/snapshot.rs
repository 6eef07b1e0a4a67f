use crate::clock::Clock;
use crate::errors::AppResult;
use crate::models::{EntityKind, ReminderRecord, ReminderStatus, ReminderView, RiskRecord};
use crate::store::RecordStore;
use chrono::NaiveDate;
use serde::Serialize;

pub const DEFAULT_REMINDER_THRESHOLD_DAYS: i64 = 5;

/// Table contents as of one page render; the "before" side of a diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "rows", rename_all = "snake_case")]
pub enum Snapshot {
    Risks(Vec<RiskRecord>),
    Reminders(Vec<ReminderView>),
}

impl Snapshot {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Risks(_) => EntityKind::Risks,
            Self::Reminders(_) => EntityKind::Reminders,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Risks(rows) => rows.len(),
            Self::Reminders(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct SnapshotLoader<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    clock: &'a Clock,
    threshold_days: i64,
}

impl<'a, S: RecordStore + ?Sized> SnapshotLoader<'a, S> {
    pub fn new(store: &'a S, clock: &'a Clock) -> Self {
        Self {
            store,
            clock,
            threshold_days: DEFAULT_REMINDER_THRESHOLD_DAYS,
        }
    }

    pub fn with_threshold(mut self, threshold_days: i64) -> Self {
        self.threshold_days = threshold_days;
        self
    }

    pub fn load(&self, kind: EntityKind) -> AppResult<Snapshot> {
        match kind {
            EntityKind::Risks => self.load_risks().map(Snapshot::Risks),
            EntityKind::Reminders => self.load_reminders().map(Snapshot::Reminders),
        }
    }

    /// Newest id first.
    pub fn load_risks(&self) -> AppResult<Vec<RiskRecord>> {
        let mut rows = self.store.fetch_risks()?;
        rows.sort_by(|left, right| right.id.cmp(&left.id));
        tracing::debug!(count = rows.len(), "loaded risk snapshot");
        Ok(rows)
    }

    /// Oldest sent date first, with the countdown computed against today.
    pub fn load_reminders(&self) -> AppResult<Vec<ReminderView>> {
        let mut rows = self.store.fetch_reminders()?;
        rows.sort_by(|left, right| {
            left.data_invio
                .cmp(&right.data_invio)
                .then(left.id.cmp(&right.id))
        });
        let today = self.clock.today();
        tracing::debug!(count = rows.len(), %today, "loaded reminder snapshot");
        Ok(rows
            .into_iter()
            .map(|record| derive_reminder(record, today, self.threshold_days))
            .collect())
    }

    /// The editable subset of the follow-up page.
    pub fn active_reminders(&self) -> AppResult<Vec<ReminderView>> {
        Ok(self
            .load_reminders()?
            .into_iter()
            .filter(|view| view.record.stato_reminder == ReminderStatus::Attivo)
            .collect())
    }

    /// The editable subset of the risk editing page; `None` means every supplier.
    pub fn risks_for_supplier(&self, fornitore: Option<&str>) -> AppResult<Vec<RiskRecord>> {
        let rows = self.load_risks()?;
        Ok(match fornitore {
            Some(fornitore) => rows.into_iter().filter(|risk| risk.fornitore == fornitore).collect(),
            None => rows,
        })
    }
}

pub fn derive_reminder(record: ReminderRecord, today: NaiveDate, threshold_days: i64) -> ReminderView {
    let giorni_trascorsi = (today - record.data_invio).num_days();
    let giorni_al_reminder = threshold_days.saturating_sub(giorni_trascorsi).max(0);
    let overdue = record.stato_reminder == ReminderStatus::Attivo && giorni_trascorsi >= threshold_days;
    ReminderView {
        record,
        giorni_trascorsi,
        giorni_al_reminder,
        overdue,
    }
}
