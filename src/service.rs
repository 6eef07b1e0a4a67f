use crate::access::{authenticate, seed_admin, DEFAULT_PBKDF2_ITERATIONS};
use crate::clock::Clock;
use crate::config::BootstrapConfig;
use crate::dashboard;
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::intake;
use crate::models::{
    ApplyReport, DashboardOverview, DashboardSettings, EntityKind, LoginResponse, NewReminderPayload,
    NewRiskPayload, Page, ReminderRecord, ReminderView, ReportSelection, RiskFilters, RiskRecord, SessionInfo,
};
use crate::policy::{menu_for, require_page};
use crate::reconcile::{EditableRow, LastWriterWins, Reconciler, Reconciliation};
use crate::session::SessionManager;
use crate::snapshot::{Snapshot, SnapshotLoader};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SaveOutcome {
    /// The edited grid matched the snapshot; shown to the user as "no changes to save".
    NothingToSave,
    Saved { report: ApplyReport, snapshot: Snapshot },
}

pub struct DashboardService {
    db: Arc<Database>,
    sessions: SessionManager,
    clock: Clock,
}

impl DashboardService {
    pub fn new(db: Arc<Database>, clock: Clock) -> AppResult<Arc<Self>> {
        let settings = db.get_settings()?;
        let sessions = SessionManager::new(clock.clone(), settings.session_idle_timeout_secs);
        Ok(Arc::new(Self { db, sessions, clock }))
    }

    /// Opens the configured database and seeds the bootstrap admin.
    pub fn open(config: &BootstrapConfig, clock: Clock) -> AppResult<Arc<Self>> {
        let db = Arc::new(Database::new(&config.database_path)?);
        if let Some(admin) = &config.admin {
            seed_admin(&db, &admin.username, &admin.password, DEFAULT_PBKDF2_ITERATIONS)?;
        }
        tracing::info!(path = %db.path().display(), "dashboard database ready");
        Self::new(db, clock)
    }

    pub async fn login(&self, username: &str, password: &str) -> AppResult<LoginResponse> {
        let Some(user) = authenticate(&self.db, username, password)? else {
            tracing::warn!(username, "rejected login");
            return Err(AppError::AccessDenied("invalid credentials".to_string()));
        };
        let purged = self.sessions.purge_expired().await;
        if purged > 0 {
            tracing::debug!(count = purged, "purged idle sessions");
        }
        let session = self.sessions.open_session(&user).await;
        tracing::info!(username = %user.username, role = user.role.as_str(), "user logged in");
        Ok(LoginResponse {
            token: session.token,
            menu: menu_for(user.role),
            user,
        })
    }

    pub async fn logout(&self, token: &str) -> bool {
        self.sessions.close_session(token).await
    }

    pub async fn overview(&self, token: &str) -> AppResult<DashboardOverview> {
        self.authorize(token, Page::Dashboard).await?;
        let loader = self.loader()?;
        Ok(dashboard::overview(&loader.load_risks()?, &loader.load_reminders()?))
    }

    pub async fn suppliers(&self, token: &str) -> AppResult<Vec<String>> {
        self.authorize(token, Page::Dashboard).await?;
        Ok(dashboard::suppliers(&self.loader()?.load_risks()?))
    }

    pub async fn report(&self, token: &str, filters: RiskFilters) -> AppResult<ReportSelection> {
        self.authorize(token, Page::Report).await?;
        Ok(dashboard::report_selection(&self.loader()?.load_risks()?, &filters))
    }

    pub async fn load_snapshot(&self, token: &str, kind: EntityKind) -> AppResult<Snapshot> {
        self.authorize(token, editing_page(kind)).await?;
        self.loader()?.load(kind)
    }

    pub async fn create_risk(&self, token: &str, payload: NewRiskPayload) -> AppResult<RiskRecord> {
        self.authorize(token, Page::Censimento).await?;
        intake::create_risk(self.db.as_ref(), payload)
    }

    pub async fn create_reminder(&self, token: &str, payload: NewReminderPayload) -> AppResult<ReminderRecord> {
        self.authorize(token, Page::FollowUp).await?;
        intake::create_reminder(self.db.as_ref(), payload)
    }

    pub async fn save_risk_edits(
        &self,
        token: &str,
        original: &[RiskRecord],
        edited: &[RiskRecord],
    ) -> AppResult<SaveOutcome> {
        let session = self.authorize(token, Page::Modifica).await?;
        self.save_edits(&session, original, edited)
    }

    pub async fn save_reminder_edits(
        &self,
        token: &str,
        original: &[ReminderView],
        edited: &[ReminderView],
    ) -> AppResult<SaveOutcome> {
        let session = self.authorize(token, Page::FollowUp).await?;
        self.save_edits(&session, original, edited)
    }

    pub async fn settings(&self, token: &str) -> AppResult<DashboardSettings> {
        self.authorize(token, Page::Dashboard).await?;
        self.db.get_settings()
    }

    pub async fn update_settings(&self, token: &str, patch: serde_json::Value) -> AppResult<DashboardSettings> {
        self.authorize(token, Page::Admin).await?;
        let settings = self.db.update_settings(patch)?;
        self.sessions.set_idle_timeout(settings.session_idle_timeout_secs);
        Ok(settings)
    }

    async fn authorize(&self, token: &str, page: Page) -> AppResult<SessionInfo> {
        let session = self.sessions.touch(token).await?;
        require_page(session.role, page)?;
        Ok(session)
    }

    fn loader(&self) -> AppResult<SnapshotLoader<'_, Database>> {
        let settings = self.db.get_settings()?;
        Ok(SnapshotLoader::new(self.db.as_ref(), &self.clock).with_threshold(settings.reminder_threshold_days))
    }

    fn save_edits<R: EditableRow>(&self, session: &SessionInfo, original: &[R], edited: &[R]) -> AppResult<SaveOutcome> {
        let reconciler = LastWriterWins::new(self.db.as_ref());
        let outcome = match reconciler.save(original, edited) {
            Ok(outcome) => outcome,
            Err(error) => {
                if matches!(error, AppError::StorageUnavailable(_)) {
                    tracing::warn!(entity = R::KIND.as_str(), error = %error, "save failed, nothing written");
                }
                return Err(error);
            }
        };

        match outcome {
            Reconciliation::NothingToSave => {
                tracing::info!(entity = R::KIND.as_str(), username = %session.username, "no changes to save");
                Ok(SaveOutcome::NothingToSave)
            }
            Reconciliation::Applied(report) => {
                tracing::info!(
                    entity = R::KIND.as_str(),
                    username = %session.username,
                    applied = report.applied_count(),
                    "saved edits"
                );
                if report.has_conflicts() {
                    let skipped = report.conflicts.iter().map(|conflict| conflict.id).collect::<Vec<_>>();
                    tracing::warn!(entity = R::KIND.as_str(), row_ids = ?skipped, "rows deleted by another session were skipped");
                }
                let snapshot = self.loader()?.load(R::KIND)?;
                Ok(SaveOutcome::Saved { report, snapshot })
            }
        }
    }
}

fn editing_page(kind: EntityKind) -> Page {
    match kind {
        EntityKind::Risks => Page::Modifica,
        EntityKind::Reminders => Page::FollowUp,
    }
}

#[cfg(test)]
mod tests {
    use super::{DashboardService, SaveOutcome};
    use crate::access::hash_password;
    use crate::clock::Clock;
    use crate::db::Database;
    use crate::errors::AppError;
    use crate::models::{
        EntityKind, NewReminderPayload, NewRiskPayload, Page, RiskFilters, RiskScenario, RiskStatus, Role, Severity,
    };
    use crate::snapshot::Snapshot;
    use chrono::{Duration, NaiveDate};
    use std::sync::{Arc, Mutex};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).expect("date")
    }

    fn service() -> (tempfile::TempDir, Arc<DashboardService>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("dashboard.db")).expect("db");
        db.insert_user("editor", &hash_password("edit-pass", 1_000), Role::Modify)
            .expect("editor");
        db.insert_user("viewer", &hash_password("view-pass", 1_000), Role::Read)
            .expect("viewer");
        let clock = Clock::fixed(today().and_hms_opt(10, 0, 0).expect("time"));
        let service = DashboardService::new(Arc::new(db), clock).expect("service");
        (dir, service)
    }

    fn new_risk(fornitore: &str) -> NewRiskPayload {
        NewRiskPayload {
            data_inizio: today(),
            data_fine: today(),
            fornitore: fornitore.to_string(),
            rischio: Some(RiskScenario::ThirdPartyResilience),
            stato: RiskStatus::Aperto,
            gravita: Severity::High,
            note: None,
            data_chiusura: None,
            contract_owner: "Ferri".to_string(),
            area_riferimento: "IT".to_string(),
            perc_avanzamento: 0,
        }
    }

    #[tokio::test]
    async fn editor_saves_and_receives_fresh_snapshot() {
        let (_dir, service) = service();
        let login = service.login("editor", "edit-pass").await.expect("login");
        assert!(login.menu.contains(&Page::Modifica));

        service.create_risk(&login.token, new_risk("Acme")).await.expect("create");
        service.create_risk(&login.token, new_risk("Globex")).await.expect("create");

        let Snapshot::Risks(original) = service
            .load_snapshot(&login.token, EntityKind::Risks)
            .await
            .expect("snapshot")
        else {
            panic!("expected risk snapshot");
        };

        let nothing = service
            .save_risk_edits(&login.token, &original, &original)
            .await
            .expect("save");
        assert_eq!(nothing, SaveOutcome::NothingToSave);

        let mut edited = original.clone();
        edited[1].note = Some("escalated".to_string());
        let outcome = service
            .save_risk_edits(&login.token, &original, &edited)
            .await
            .expect("save");
        let SaveOutcome::Saved { report, snapshot } = outcome else {
            panic!("expected saved outcome");
        };
        assert_eq!(report.applied, vec![edited[1].id]);
        assert_eq!(snapshot, Snapshot::Risks(edited));
    }

    #[tokio::test]
    async fn read_role_cannot_edit() {
        let (_dir, service) = service();
        let login = service.login("viewer", "view-pass").await.expect("login");
        assert_eq!(login.menu, vec![Page::Dashboard, Page::Report]);

        assert!(matches!(
            service.create_risk(&login.token, new_risk("Acme")).await,
            Err(AppError::AccessDenied(_))
        ));
        assert!(matches!(
            service.load_snapshot(&login.token, EntityKind::Reminders).await,
            Err(AppError::AccessDenied(_))
        ));
        let report = service
            .report(&login.token, RiskFilters::default())
            .await
            .expect("report");
        assert_eq!(report.summary.total, 0);
    }

    #[tokio::test]
    async fn admin_cannot_store_a_timeout_that_breaks_later_calls() {
        let (_dir, service) = service();
        service
            .db
            .insert_user("root", &hash_password("root-pass", 1_000), Role::Admin)
            .expect("admin");
        let admin = service.login("root", "root-pass").await.expect("login");

        assert!(matches!(
            service
                .update_settings(&admin.token, serde_json::json!({ "session_idle_timeout_secs": i64::MAX }))
                .await,
            Err(AppError::Validation(_))
        ));
        assert!(service.overview(&admin.token).await.is_ok());
        assert_eq!(
            service.settings(&admin.token).await.expect("settings").session_idle_timeout_secs,
            1800
        );
    }

    #[tokio::test]
    async fn login_drops_sessions_left_idle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("dashboard.db")).expect("db");
        db.insert_user("editor", &hash_password("edit-pass", 1_000), Role::Modify)
            .expect("editor");
        let start = today().and_hms_opt(9, 0, 0).expect("time");
        let now = Arc::new(Mutex::new(start));
        let handle = Arc::clone(&now);
        let clock = Clock::from_fn(move || *handle.lock().expect("clock lock"));
        let service = DashboardService::new(Arc::new(db), clock).expect("service");

        service.login("editor", "edit-pass").await.expect("first login");
        service.login("editor", "edit-pass").await.expect("second login");
        assert_eq!(service.sessions.active_count().await, 2);

        *now.lock().expect("lock") = start + Duration::seconds(1801);
        let fresh = service.login("editor", "edit-pass").await.expect("third login");
        assert_eq!(service.sessions.active_count().await, 1);
        assert!(service.overview(&fresh.token).await.is_ok());
    }

    #[tokio::test]
    async fn wrong_password_and_logout() {
        let (_dir, service) = service();
        assert!(matches!(
            service.login("editor", "nope").await,
            Err(AppError::AccessDenied(_))
        ));

        let login = service.login("editor", "edit-pass").await.expect("login");
        assert!(service.logout(&login.token).await);
        assert!(matches!(
            service.overview(&login.token).await,
            Err(AppError::SessionExpired(_))
        ));
    }

    #[tokio::test]
    async fn reminder_threshold_follows_settings() {
        let (_dir, service) = service();
        let editor = service.login("editor", "edit-pass").await.expect("login");
        service
            .create_reminder(
                &editor.token,
                NewReminderPayload {
                    fornitore_nome: "Acme".to_string(),
                    data_invio: NaiveDate::from_ymd_opt(2024, 6, 8).expect("date"),
                },
            )
            .await
            .expect("reminder");

        let overview = service.overview(&editor.token).await.expect("overview");
        assert_eq!(overview.overdue_reminders.len(), 1);

        // Only admins may change settings.
        assert!(matches!(
            service
                .update_settings(&editor.token, serde_json::json!({ "reminder_threshold_days": 10 }))
                .await,
            Err(AppError::AccessDenied(_))
        ));
        assert_eq!(service.settings(&editor.token).await.expect("settings").reminder_threshold_days, 5);
    }
}
