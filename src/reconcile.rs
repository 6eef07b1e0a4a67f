//! Turns an edited grid copy into targeted row updates.
//!
//! Both sides are keyed by row id before comparing, so a grid that re-sorts
//! its rows never attributes an edit to the wrong record. Each changed row is
//! written back whole.

use crate::errors::{AppError, AppResult};
use crate::models::{ApplyReport, EntityKind, ReminderRecord, ReminderView, RiskRecord, RowIssue};
use crate::policy::{validate_reminder, validate_risk};
use crate::store::RecordStore;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Int(i64),
    Bool(bool),
    Text(Option<String>),
    Date(Option<NaiveDate>),
}

fn text(value: &str) -> FieldValue {
    FieldValue::Text(Some(value.to_string()))
}

pub trait EditableRow: Clone {
    const KIND: EntityKind;

    fn id(&self) -> i64;

    /// Column name and value of every field the grid may change, in a fixed order.
    fn editable_fields(&self) -> Vec<(&'static str, FieldValue)>;

    /// Problems with columns that must not change through the grid.
    fn check_immutable(&self, _original: &Self) -> Vec<String> {
        Vec::new()
    }

    fn validate(&self) -> Vec<String>;

    fn write_batch<S: RecordStore + ?Sized>(store: &S, rows: &[Self]) -> AppResult<ApplyReport>;
}

impl EditableRow for RiskRecord {
    const KIND: EntityKind = EntityKind::Risks;

    fn id(&self) -> i64 {
        self.id
    }

    fn editable_fields(&self) -> Vec<(&'static str, FieldValue)> {
        vec![
            ("data_inizio", FieldValue::Date(Some(self.data_inizio))),
            ("data_fine", FieldValue::Date(Some(self.data_fine))),
            ("fornitore", text(&self.fornitore)),
            ("rischio", text(self.rischio.as_str())),
            ("stato", text(self.stato.as_str())),
            ("gravita", text(self.gravita.as_str())),
            ("note", FieldValue::Text(self.note.clone())),
            ("data_chiusura", FieldValue::Date(self.data_chiusura)),
            ("contract_owner", text(&self.contract_owner)),
            ("area_riferimento", text(&self.area_riferimento)),
            ("perc_avanzamento", FieldValue::Int(self.perc_avanzamento)),
        ]
    }

    fn validate(&self) -> Vec<String> {
        validate_risk(self)
    }

    fn write_batch<S: RecordStore + ?Sized>(store: &S, rows: &[Self]) -> AppResult<ApplyReport> {
        store.update_risks(rows)
    }
}

impl EditableRow for ReminderRecord {
    const KIND: EntityKind = EntityKind::Reminders;

    fn id(&self) -> i64 {
        self.id
    }

    fn editable_fields(&self) -> Vec<(&'static str, FieldValue)> {
        vec![
            ("fornitore_nome", text(&self.fornitore_nome)),
            ("stato_reminder", text(self.stato_reminder.as_str())),
            ("note", FieldValue::Text(self.note.clone())),
            ("test_bc", FieldValue::Bool(self.evidence.test_bc)),
            ("test_it", FieldValue::Bool(self.evidence.test_it)),
            ("test_pt_va", FieldValue::Bool(self.evidence.test_pt_va)),
            ("access_review", FieldValue::Bool(self.evidence.access_review)),
            ("ppt", FieldValue::Bool(self.evidence.ppt)),
        ]
    }

    fn check_immutable(&self, original: &Self) -> Vec<String> {
        if self.data_invio != original.data_invio {
            return vec![format!(
                "data_invio cannot change after the reminder is sent ({} -> {})",
                original.data_invio, self.data_invio
            )];
        }
        Vec::new()
    }

    fn validate(&self) -> Vec<String> {
        validate_reminder(self)
    }

    fn write_batch<S: RecordStore + ?Sized>(store: &S, rows: &[Self]) -> AppResult<ApplyReport> {
        store.update_reminders(rows)
    }
}

// Derived countdown columns are display-only and never count as edits.
impl EditableRow for ReminderView {
    const KIND: EntityKind = EntityKind::Reminders;

    fn id(&self) -> i64 {
        self.record.id
    }

    fn editable_fields(&self) -> Vec<(&'static str, FieldValue)> {
        self.record.editable_fields()
    }

    fn check_immutable(&self, original: &Self) -> Vec<String> {
        self.record.check_immutable(&original.record)
    }

    fn validate(&self) -> Vec<String> {
        self.record.validate()
    }

    fn write_batch<S: RecordStore + ?Sized>(store: &S, rows: &[Self]) -> AppResult<ApplyReport> {
        let records = rows.iter().map(|view| view.record.clone()).collect::<Vec<_>>();
        store.update_reminders(&records)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowChange<R> {
    pub id: i64,
    pub changed_fields: Vec<&'static str>,
    /// The full edited row, not only the changed columns.
    pub row: R,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff<R> {
    changes: Vec<RowChange<R>>,
}

impl<R> Diff<R> {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn changes(&self) -> &[RowChange<R>] {
        &self.changes
    }

    pub fn ids(&self) -> Vec<i64> {
        self.changes.iter().map(|change| change.id).collect()
    }
}

/// Result of one save action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Reconciliation {
    /// The edited copy matches the snapshot; nothing was written.
    NothingToSave,
    Applied(ApplyReport),
}

pub trait Reconciler<R: EditableRow> {
    fn diff(&self, original: &[R], edited: &[R]) -> AppResult<Diff<R>>;

    fn apply(&self, diff: &Diff<R>) -> AppResult<ApplyReport>;

    fn save(&self, original: &[R], edited: &[R]) -> AppResult<Reconciliation> {
        let diff = self.diff(original, edited)?;
        if diff.is_empty() {
            return Ok(Reconciliation::NothingToSave);
        }
        self.apply(&diff).map(Reconciliation::Applied)
    }
}

/// Whole-row updates with no version check: concurrent editors of the same
/// row overwrite each other, the last save wins.
pub struct LastWriterWins<'a, S: RecordStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: RecordStore + ?Sized> LastWriterWins<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }
}

impl<'a, S: RecordStore + ?Sized, R: EditableRow> Reconciler<R> for LastWriterWins<'a, S> {
    fn diff(&self, original: &[R], edited: &[R]) -> AppResult<Diff<R>> {
        diff_rows(original, edited)
    }

    fn apply(&self, diff: &Diff<R>) -> AppResult<ApplyReport> {
        let issues = validate_changes(diff);
        if !issues.is_empty() {
            return Err(AppError::InvalidRows(issues));
        }

        let rows = diff.changes.iter().map(|change| change.row.clone()).collect::<Vec<_>>();
        let report = R::write_batch(self.store, &rows)?;
        tracing::debug!(
            entity = R::KIND.as_str(),
            applied = report.applied_count(),
            conflicts = report.conflicts.len(),
            "applied row updates"
        );
        Ok(report)
    }
}

/// Rows of the edited copy whose editable fields differ from the snapshot.
///
/// Both slices must hold exactly the same ids; adding or removing rows
/// through the editing grid is rejected.
pub fn diff_rows<R: EditableRow>(original: &[R], edited: &[R]) -> AppResult<Diff<R>> {
    if original.len() != edited.len() {
        return Err(AppError::Validation(format!(
            "edited copy has {} rows but the snapshot has {}; rows cannot be added or removed here",
            edited.len(),
            original.len()
        )));
    }

    let before = index_by_id(original, "snapshot")?;
    let after = index_by_id(edited, "edited copy")?;

    let unknown = after
        .keys()
        .filter(|id| !before.contains_key(id))
        .copied()
        .collect::<Vec<_>>();
    if !unknown.is_empty() {
        return Err(AppError::Validation(format!(
            "edited copy contains ids {:?} that are not in the snapshot",
            unknown
        )));
    }

    let mut changes = Vec::new();
    let mut violations = Vec::new();
    for (id, old) in &before {
        // Equal lengths, unique ids and no unknown ids leave every snapshot id present.
        let Some(new) = after.get(id) else {
            return Err(AppError::Validation(format!("row {} is missing from the edited copy", id)));
        };

        violations.extend(
            new.check_immutable(old)
                .into_iter()
                .map(|message| RowIssue::new(*id, message)),
        );

        let changed_fields = changed_columns(*old, *new);
        if !changed_fields.is_empty() {
            changes.push(RowChange {
                id: *id,
                changed_fields,
                row: (*new).clone(),
            });
        }
    }

    if !violations.is_empty() {
        return Err(AppError::InvalidRows(violations));
    }

    Ok(Diff { changes })
}

fn index_by_id<'r, R: EditableRow>(rows: &'r [R], side: &str) -> AppResult<BTreeMap<i64, &'r R>> {
    let mut indexed = BTreeMap::new();
    for row in rows {
        if indexed.insert(row.id(), row).is_some() {
            return Err(AppError::Validation(format!(
                "{} contains row id {} more than once",
                side,
                row.id()
            )));
        }
    }
    Ok(indexed)
}

fn changed_columns<R: EditableRow>(old: &R, new: &R) -> Vec<&'static str> {
    old.editable_fields()
        .into_iter()
        .zip(new.editable_fields())
        .filter(|((_, before), (_, after))| before != after)
        .map(|((column, _), _)| column)
        .collect()
}

fn validate_changes<R: EditableRow>(diff: &Diff<R>) -> Vec<RowIssue> {
    diff.changes
        .iter()
        .flat_map(|change| {
            change
                .row
                .validate()
                .into_iter()
                .map(move |message| RowIssue::new(change.id, message))
        })
        .collect()
}
