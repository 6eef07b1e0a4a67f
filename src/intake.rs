use crate::errors::{AppError, AppResult};
use crate::models::{
    EvidenceFlags, NewReminderPayload, NewRiskPayload, ReminderRecord, ReminderStatus, RiskRecord, RiskStatus,
};
use crate::policy::{validate_reminder, validate_risk};
use crate::store::RecordStore;

/// Validates a new risk and stores it, returning the row with its assigned id.
pub fn create_risk<S: RecordStore + ?Sized>(store: &S, payload: NewRiskPayload) -> AppResult<RiskRecord> {
    let row = risk_from_payload(payload)?;
    let created = store.insert_risk(&row)?;
    tracing::info!(risk_id = created.id, fornitore = %created.fornitore, "risk created");
    Ok(created)
}

pub fn create_reminder<S: RecordStore + ?Sized>(
    store: &S,
    payload: NewReminderPayload,
) -> AppResult<ReminderRecord> {
    let row = ReminderRecord {
        id: 0,
        fornitore_nome: payload.fornitore_nome.trim().to_string(),
        data_invio: payload.data_invio,
        stato_reminder: ReminderStatus::Attivo,
        note: None,
        evidence: EvidenceFlags::default(),
    };
    let problems = validate_reminder(&row);
    if !problems.is_empty() {
        return Err(AppError::Validation(problems.join("; ")));
    }
    let created = store.insert_reminder(&row)?;
    tracing::info!(reminder_id = created.id, "reminder created");
    Ok(created)
}

fn risk_from_payload(payload: NewRiskPayload) -> AppResult<RiskRecord> {
    let Some(rischio) = payload.rischio else {
        return Err(AppError::Validation("rischio must be selected".to_string()));
    };

    // The form leaves a stale closure date behind when the status is switched back.
    let data_chiusura = match payload.stato {
        RiskStatus::Chiuso => payload.data_chiusura,
        RiskStatus::Aperto => None,
    };

    let row = RiskRecord {
        id: 0,
        data_inizio: payload.data_inizio,
        data_fine: payload.data_fine,
        fornitore: payload.fornitore.trim().to_string(),
        rischio,
        stato: payload.stato,
        gravita: payload.gravita,
        note: payload.note.filter(|note| !note.trim().is_empty()),
        data_chiusura,
        contract_owner: payload.contract_owner.trim().to_string(),
        area_riferimento: payload.area_riferimento.trim().to_string(),
        perc_avanzamento: payload.perc_avanzamento,
    };

    let problems = validate_risk(&row);
    if !problems.is_empty() {
        return Err(AppError::Validation(problems.join("; ")));
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::{create_reminder, create_risk};
    use crate::db::Database;
    use crate::errors::AppError;
    use crate::models::{NewReminderPayload, NewRiskPayload, ReminderStatus, RiskScenario, RiskStatus, Severity};
    use crate::store::RecordStore;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn payload() -> NewRiskPayload {
        NewRiskPayload {
            data_inizio: date(2024, 4, 1),
            data_fine: date(2024, 9, 30),
            fornitore: " Initech ".to_string(),
            rischio: Some(RiskScenario::ThirdPartyOutsourcing),
            stato: RiskStatus::Aperto,
            gravita: Severity::Low,
            note: Some("   ".to_string()),
            data_chiusura: Some(date(2024, 5, 1)),
            contract_owner: "Bianchi".to_string(),
            area_riferimento: "Legal".to_string(),
            perc_avanzamento: 10,
        }
    }

    fn database() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("dashboard.db")).expect("db");
        (dir, db)
    }

    #[test]
    fn open_risk_drops_closure_date_and_gets_an_id() {
        let (_dir, db) = database();
        let created = create_risk(&db, payload()).expect("create");
        assert!(created.id > 0);
        assert_eq!(created.fornitore, "Initech");
        assert_eq!(created.data_chiusura, None);
        assert_eq!(created.note, None);
        assert_eq!(db.fetch_risks().expect("fetch"), vec![created]);
    }

    #[test]
    fn closed_risk_requires_closure_date() {
        let (_dir, db) = database();
        let mut closed = payload();
        closed.stato = RiskStatus::Chiuso;
        closed.data_chiusura = None;
        assert!(matches!(create_risk(&db, closed), Err(AppError::Validation(_))));

        let mut closed = payload();
        closed.stato = RiskStatus::Chiuso;
        let created = create_risk(&db, closed).expect("create");
        assert_eq!(created.data_chiusura, Some(date(2024, 5, 1)));
    }

    #[test]
    fn scenario_is_required() {
        let (_dir, db) = database();
        let mut missing = payload();
        missing.rischio = None;
        assert!(matches!(create_risk(&db, missing), Err(AppError::Validation(_))));
        assert!(db.fetch_risks().expect("fetch").is_empty());
    }

    #[test]
    fn new_reminder_starts_active_with_no_evidence() {
        let (_dir, db) = database();
        let created = create_reminder(
            &db,
            NewReminderPayload {
                fornitore_nome: "Umbrella".to_string(),
                data_invio: date(2024, 6, 3),
            },
        )
        .expect("create");
        assert_eq!(created.stato_reminder, ReminderStatus::Attivo);
        assert!(!created.evidence.test_bc && !created.evidence.ppt);

        let blank = NewReminderPayload {
            fornitore_nome: " ".to_string(),
            data_invio: date(2024, 6, 3),
        };
        assert!(matches!(create_reminder(&db, blank), Err(AppError::Validation(_))));
    }
}
