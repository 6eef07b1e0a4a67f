use chrono::NaiveDate;
use risk_dashboard_lib::clock::Clock;
use risk_dashboard_lib::db::Database;
use risk_dashboard_lib::errors::AppError;
use risk_dashboard_lib::intake::{create_reminder, create_risk};
use risk_dashboard_lib::models::{NewReminderPayload, NewRiskPayload, RiskScenario, RiskStatus, Severity};
use risk_dashboard_lib::reconcile::{LastWriterWins, Reconciler, Reconciliation};
use risk_dashboard_lib::snapshot::SnapshotLoader;
use std::path::Path;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 15).expect("date")
}

fn clock() -> Clock {
    Clock::fixed(today().and_hms_opt(12, 0, 0).expect("time"))
}

fn seeded(path: &Path, suppliers: &[&str]) -> Database {
    let db = Database::new(path).expect("db");
    for fornitore in suppliers {
        create_risk(
            &db,
            NewRiskPayload {
                data_inizio: NaiveDate::from_ymd_opt(2024, 1, 15).expect("date"),
                data_fine: NaiveDate::from_ymd_opt(2024, 12, 31).expect("date"),
                fornitore: fornitore.to_string(),
                rischio: Some(RiskScenario::ThirdPartySecurity),
                stato: RiskStatus::Aperto,
                gravita: Severity::High,
                note: None,
                data_chiusura: None,
                contract_owner: "Conti".to_string(),
                area_riferimento: "ICT".to_string(),
                perc_avanzamento: 20,
            },
        )
        .expect("seed risk");
    }
    db
}

#[test]
fn saved_edits_survive_reload_and_resaving_is_a_no_op() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = seeded(&dir.path().join("flow.db"), &["Acme", "Globex", "Initech"]);
    let clock = clock();
    let loader = SnapshotLoader::new(&db, &clock);
    let reconciler = LastWriterWins::new(&db);

    let original = loader.load_risks().expect("load");
    let mut edited = original.clone();
    edited.reverse();
    edited[0].stato = RiskStatus::Chiuso;
    edited[0].data_chiusura = Some(today());
    edited[0].perc_avanzamento = 100;

    let outcome = reconciler.save(&original, &edited).expect("save");
    let Reconciliation::Applied(report) = outcome else {
        panic!("expected applied outcome");
    };
    assert_eq!(report.applied, vec![edited[0].id]);

    let reloaded = loader.load_risks().expect("reload");
    let closed = reloaded
        .iter()
        .find(|risk| risk.id == edited[0].id)
        .expect("closed row");
    assert_eq!(closed, &edited[0]);

    assert_eq!(
        reconciler.save(&reloaded, &edited).expect("resave"),
        Reconciliation::NothingToSave
    );
}

#[test]
fn row_deleted_by_another_session_is_a_conflict() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("conflict.db");
    let db = seeded(&path, &["Acme", "Globex", "Initech"]);
    let clock = clock();
    let loader = SnapshotLoader::new(&db, &clock);

    let original = loader.load_risks().expect("load");
    let mut edited = original.clone();
    for row in &mut edited {
        row.note = Some("quarterly review".to_string());
    }
    let deleted = original[1].id;

    let other_session = rusqlite::Connection::open(&path).expect("second connection");
    other_session
        .execute("DELETE FROM risks WHERE id = ?1", [deleted])
        .expect("delete");

    let outcome = LastWriterWins::new(&db).save(&original, &edited).expect("save");
    let Reconciliation::Applied(report) = outcome else {
        panic!("expected applied outcome");
    };
    assert_eq!(report.applied_count(), 2);
    assert!(report.has_conflicts());
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].id, deleted);

    let reloaded = loader.load_risks().expect("reload");
    assert_eq!(reloaded.len(), 2);
    assert!(reloaded
        .iter()
        .all(|row| row.note.as_deref() == Some("quarterly review")));
}

#[test]
fn storage_error_mid_batch_writes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("rollback.db");
    let db = seeded(&path, &["Acme", "Globex"]);
    let clock = clock();
    let loader = SnapshotLoader::new(&db, &clock);

    let original = loader.load_risks().expect("load");
    let last_id = original.iter().map(|row| row.id).max().expect("rows");
    let other_session = rusqlite::Connection::open(&path).expect("second connection");
    other_session
        .execute_batch(&format!(
            "CREATE TRIGGER refuse_update BEFORE UPDATE ON risks WHEN OLD.id = {}
             BEGIN SELECT RAISE(ABORT, 'row is locked'); END;",
            last_id
        ))
        .expect("trigger");

    let mut edited = original.clone();
    for row in &mut edited {
        row.perc_avanzamento = 75;
    }

    let result = LastWriterWins::new(&db).save(&original, &edited);
    assert!(result.is_err());
    assert_eq!(loader.load_risks().expect("reload"), original);
}

#[test]
fn invalid_rows_are_reported_with_their_ids() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = seeded(&dir.path().join("invalid.db"), &["Acme", "Globex"]);
    let clock = clock();
    let loader = SnapshotLoader::new(&db, &clock);

    let original = loader.load_risks().expect("load");
    let mut edited = original.clone();
    edited[0].stato = RiskStatus::Chiuso;
    edited[1].fornitore = String::new();

    match LastWriterWins::new(&db).save(&original, &edited) {
        Err(AppError::InvalidRows(issues)) => {
            let mut ids = issues.iter().map(|issue| issue.id).collect::<Vec<_>>();
            ids.sort_unstable();
            let mut expected = vec![original[0].id, original[1].id];
            expected.sort_unstable();
            assert_eq!(ids, expected);
        }
        other => panic!("expected invalid rows, got {:?}", other),
    }
    assert_eq!(loader.load_risks().expect("reload"), original);
}

#[test]
fn reminder_countdown_and_evidence_edits() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = Database::new(&dir.path().join("reminders.db")).expect("db");
    for (name, sent) in [("Acme", 10), ("Globex", 2)] {
        create_reminder(
            &db,
            NewReminderPayload {
                fornitore_nome: name.to_string(),
                data_invio: today() - chrono::Duration::days(sent),
            },
        )
        .expect("reminder");
    }

    let clock = clock();
    let loader = SnapshotLoader::new(&db, &clock);
    let original = loader.load_reminders().expect("load");
    assert_eq!(
        original
            .iter()
            .map(|view| (view.giorni_trascorsi, view.giorni_al_reminder, view.overdue))
            .collect::<Vec<_>>(),
        vec![(10, 0, true), (2, 3, false)]
    );

    let mut edited = original.clone();
    edited[0].record.evidence.access_review = true;
    edited[0].record.note = Some("evidence received".to_string());
    let outcome = LastWriterWins::new(&db).save(&original, &edited).expect("save");
    assert!(matches!(outcome, Reconciliation::Applied(ref report) if report.applied == vec![original[0].record.id]));

    let reloaded = loader.load_reminders().expect("reload");
    assert!(reloaded[0].record.evidence.access_review);
    assert_eq!(reloaded[0].record.data_invio, original[0].record.data_invio);
}
