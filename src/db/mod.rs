use crate::dates::{format_date, parse_calendar_date};
use crate::errors::{AppError, AppResult};
use crate::models::{
    ApplyReport, DashboardSettings, EvidenceFlags, ReminderRecord, ReminderStatus, RiskRecord, RiskScenario,
    RiskStatus, Role, RowIssue, Severity, UserAccount,
};
use crate::store::RecordStore;
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("schema.sql");

const MAX_REMINDER_THRESHOLD_DAYS: i64 = 365;
const MIN_SESSION_IDLE_SECS: i64 = 60;
const MAX_SESSION_IDLE_SECS: i64 = 30 * 24 * 60 * 60;

const RISK_COLUMNS: &str = "id, data_inizio, data_fine, fornitore, rischio, stato, gravita, note, data_chiusura, contract_owner, area_riferimento, perc_avanzamento";
const REMINDER_COLUMNS: &str =
    "id, fornitore_nome, data_invio, stato_reminder, note, test_bc, test_it, test_pt_va, access_review, ppt";

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(|err| AppError::StorageUnavailable(err.to_string()))?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        let db = Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        };

        db.ensure_schema_extensions()?;
        db.normalize_legacy_severity()?;
        db.ensure_default_settings()?;

        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub fn list_risks(&self) -> AppResult<Vec<RiskRecord>> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM risks ORDER BY id DESC", RISK_COLUMNS))?;
        let rows = stmt.query_map([], parse_risk_row)?.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_reminders(&self) -> AppResult<Vec<ReminderRecord>> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM reminders ORDER BY data_invio ASC, id ASC",
            REMINDER_COLUMNS
        ))?;
        let rows = stmt.query_map([], parse_reminder_row)?.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_risk(&self, id: i64) -> AppResult<Option<RiskRecord>> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.query_row(
            &format!("SELECT {} FROM risks WHERE id = ?1", RISK_COLUMNS),
            [id],
            parse_risk_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn insert_risk_row(&self, row: &RiskRecord) -> AppResult<RiskRecord> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO risks (
               data_inizio, data_fine, fornitore, rischio, stato, gravita, note,
               data_chiusura, contract_owner, area_riferimento, perc_avanzamento
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                format_date(row.data_inizio),
                format_date(row.data_fine),
                row.fornitore,
                row.rischio.as_str(),
                row.stato.as_str(),
                row.gravita.as_str(),
                row.note,
                row.data_chiusura.map(format_date),
                row.contract_owner,
                row.area_riferimento,
                row.perc_avanzamento,
            ],
        )?;

        Ok(RiskRecord {
            id: conn.last_insert_rowid(),
            ..row.clone()
        })
    }

    pub fn insert_reminder_row(&self, row: &ReminderRecord) -> AppResult<ReminderRecord> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO reminders (
               fornitore_nome, data_invio, stato_reminder, note, test_bc, test_it, test_pt_va, access_review, ppt
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                row.fornitore_nome,
                format_date(row.data_invio),
                row.stato_reminder.as_str(),
                row.note,
                row.evidence.test_bc,
                row.evidence.test_it,
                row.evidence.test_pt_va,
                row.evidence.access_review,
                row.evidence.ppt,
            ],
        )?;

        Ok(ReminderRecord {
            id: conn.last_insert_rowid(),
            ..row.clone()
        })
    }

    /// Rewrites every editable column of each row inside one transaction.
    ///
    /// A row whose id no longer exists is reported as a conflict and its
    /// siblings are still written. Any storage error rolls the whole batch
    /// back.
    pub fn update_risk_rows(&self, rows: &[RiskRecord]) -> AppResult<ApplyReport> {
        let mut conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let tx = conn.transaction()?;
        let mut report = ApplyReport::default();
        for row in rows {
            let touched = update_risk_tx(&tx, row)?;
            record_outcome(&mut report, row.id, touched);
        }
        tx.commit()?;
        Ok(report)
    }

    pub fn update_reminder_rows(&self, rows: &[ReminderRecord]) -> AppResult<ApplyReport> {
        let mut conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let tx = conn.transaction()?;
        let mut report = ApplyReport::default();
        for row in rows {
            let touched = update_reminder_tx(&tx, row)?;
            record_outcome(&mut report, row.id, touched);
        }
        tx.commit()?;
        Ok(report)
    }

    pub fn find_user(&self, username: &str) -> AppResult<Option<(UserAccount, String)>> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.query_row(
            "SELECT id, username, role, password_hash FROM users WHERE username = ?1",
            [username],
            |row| {
                let account = UserAccount {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    role: parse_role(&row.get::<_, String>(2)?)?,
                };
                Ok((account, row.get::<_, String>(3)?))
            },
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn insert_user(&self, username: &str, password_hash: &str, role: Role) -> AppResult<UserAccount> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO users (username, password_hash, role) VALUES (?1, ?2, ?3)",
            params![username, password_hash, role.as_str()],
        )?;
        Ok(UserAccount {
            id: conn.last_insert_rowid(),
            username: username.to_string(),
            role,
        })
    }

    pub fn get_settings(&self) -> AppResult<DashboardSettings> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let raw = conn
            .query_row(
                "SELECT value_json FROM settings WHERE key = 'dashboard'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        match raw {
            Some(raw) => {
                let settings = serde_json::from_str::<DashboardSettings>(&raw).unwrap_or_default();
                let problems = settings_problems(&settings);
                if problems.is_empty() {
                    Ok(settings)
                } else {
                    tracing::warn!(problems = %problems.join("; "), "stored settings out of range, using defaults");
                    Ok(DashboardSettings::default())
                }
            }
            None => Ok(DashboardSettings::default()),
        }
    }

    pub fn update_settings(&self, update: serde_json::Value) -> AppResult<DashboardSettings> {
        let current = self.get_settings()?;
        let mut merged = serde_json::to_value(current)?;
        merge_json(&mut merged, update);
        let settings: DashboardSettings = serde_json::from_value(merged)
            .map_err(|error| AppError::Validation(format!("invalid settings: {}", error)))?;
        let problems = settings_problems(&settings);
        if !problems.is_empty() {
            return Err(AppError::Validation(problems.join("; ")));
        }

        self.write_settings(&settings)?;
        Ok(settings)
    }

    fn write_settings(&self, settings: &DashboardSettings) -> AppResult<()> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO settings (key, value_json, updated_at)
             VALUES ('dashboard', ?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
            params![serde_json::to_string(settings)?, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn ensure_default_settings(&self) -> AppResult<()> {
        let exists = {
            let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
            conn.query_row("SELECT 1 FROM settings WHERE key = 'dashboard'", [], |_| Ok(()))
                .optional()?
                .is_some()
        };
        if !exists {
            self.write_settings(&DashboardSettings::default())?;
        }
        Ok(())
    }

    /// Older deployments predate the owner/area/progress columns.
    fn ensure_schema_extensions(&self) -> AppResult<()> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;

        if !column_exists(&conn, "risks", "contract_owner")? {
            conn.execute(
                "ALTER TABLE risks ADD COLUMN contract_owner TEXT NOT NULL DEFAULT ''",
                [],
            )?;
        }
        if !column_exists(&conn, "risks", "area_riferimento")? {
            conn.execute(
                "ALTER TABLE risks ADD COLUMN area_riferimento TEXT NOT NULL DEFAULT ''",
                [],
            )?;
        }
        if !column_exists(&conn, "risks", "perc_avanzamento")? {
            conn.execute(
                "ALTER TABLE risks ADD COLUMN perc_avanzamento INTEGER NOT NULL DEFAULT 0",
                [],
            )?;
        }
        Ok(())
    }

    fn normalize_legacy_severity(&self) -> AppResult<()> {
        let conn = self.conn.lock().map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let changed = conn.execute(
            "UPDATE risks SET gravita = 'High' WHERE gravita IN ('Hight', 'high', 'Medium', 'Medium/High')",
            [],
        )?;
        if changed > 0 {
            tracing::info!(count = changed, "normalized legacy severity labels");
        }
        Ok(())
    }
}

impl RecordStore for Database {
    fn fetch_risks(&self) -> AppResult<Vec<RiskRecord>> {
        self.list_risks()
    }

    fn fetch_reminders(&self) -> AppResult<Vec<ReminderRecord>> {
        self.list_reminders()
    }

    fn update_risks(&self, rows: &[RiskRecord]) -> AppResult<ApplyReport> {
        self.update_risk_rows(rows)
    }

    fn update_reminders(&self, rows: &[ReminderRecord]) -> AppResult<ApplyReport> {
        self.update_reminder_rows(rows)
    }

    fn insert_risk(&self, row: &RiskRecord) -> AppResult<RiskRecord> {
        self.insert_risk_row(row)
    }

    fn insert_reminder(&self, row: &ReminderRecord) -> AppResult<ReminderRecord> {
        self.insert_reminder_row(row)
    }
}

fn update_risk_tx(tx: &Transaction<'_>, row: &RiskRecord) -> AppResult<usize> {
    let touched = tx.execute(
        "UPDATE risks SET data_inizio = ?1, data_fine = ?2, fornitore = ?3, rischio = ?4, stato = ?5,
           gravita = ?6, note = ?7, data_chiusura = ?8, contract_owner = ?9, area_riferimento = ?10,
           perc_avanzamento = ?11
         WHERE id = ?12",
        params![
            format_date(row.data_inizio),
            format_date(row.data_fine),
            row.fornitore,
            row.rischio.as_str(),
            row.stato.as_str(),
            row.gravita.as_str(),
            row.note,
            row.data_chiusura.map(format_date),
            row.contract_owner,
            row.area_riferimento,
            row.perc_avanzamento,
            row.id,
        ],
    )?;
    Ok(touched)
}

// data_invio is immutable once sent and never part of the SET list.
fn update_reminder_tx(tx: &Transaction<'_>, row: &ReminderRecord) -> AppResult<usize> {
    let touched = tx.execute(
        "UPDATE reminders SET fornitore_nome = ?1, stato_reminder = ?2, note = ?3, test_bc = ?4, test_it = ?5,
           test_pt_va = ?6, access_review = ?7, ppt = ?8
         WHERE id = ?9",
        params![
            row.fornitore_nome,
            row.stato_reminder.as_str(),
            row.note,
            row.evidence.test_bc,
            row.evidence.test_it,
            row.evidence.test_pt_va,
            row.evidence.access_review,
            row.evidence.ppt,
            row.id,
        ],
    )?;
    Ok(touched)
}

fn record_outcome(report: &mut ApplyReport, id: i64, touched: usize) {
    if touched == 0 {
        tracing::debug!(row_id = id, "update matched no row");
        report
            .conflicts
            .push(RowIssue::new(id, "row no longer exists (deleted by another session)"));
    } else {
        report.applied.push(id);
    }
}

fn parse_risk_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RiskRecord> {
    Ok(RiskRecord {
        id: row.get(0)?,
        data_inizio: parse_date(1, &row.get::<_, String>(1)?)?,
        data_fine: parse_date(2, &row.get::<_, String>(2)?)?,
        fornitore: row.get(3)?,
        rischio: parse_scenario(&row.get::<_, String>(4)?)?,
        stato: parse_risk_status(&row.get::<_, String>(5)?)?,
        gravita: parse_severity(&row.get::<_, String>(6)?)?,
        note: row.get(7)?,
        data_chiusura: row
            .get::<_, Option<String>>(8)?
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| parse_date(8, &raw))
            .transpose()?,
        contract_owner: row.get(9)?,
        area_riferimento: row.get(10)?,
        perc_avanzamento: row.get(11)?,
    })
}

fn parse_reminder_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReminderRecord> {
    Ok(ReminderRecord {
        id: row.get(0)?,
        fornitore_nome: row.get(1)?,
        data_invio: parse_date(2, &row.get::<_, String>(2)?)?,
        stato_reminder: parse_reminder_status(&row.get::<_, String>(3)?)?,
        note: row.get(4)?,
        evidence: EvidenceFlags {
            test_bc: row.get::<_, i64>(5)? != 0,
            test_it: row.get::<_, i64>(6)? != 0,
            test_pt_va: row.get::<_, i64>(7)? != 0,
            access_review: row.get::<_, i64>(8)? != 0,
            ppt: row.get::<_, i64>(9)? != 0,
        },
    })
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn parse_date(column: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    parse_calendar_date(raw).ok_or_else(|| conversion_error(column, format!("Invalid date '{}'", raw)))
}

fn parse_scenario(raw: &str) -> rusqlite::Result<RiskScenario> {
    RiskScenario::parse(raw).ok_or_else(|| conversion_error(4, format!("Unknown risk scenario '{}'", raw)))
}

fn parse_risk_status(raw: &str) -> rusqlite::Result<RiskStatus> {
    RiskStatus::parse(raw).ok_or_else(|| conversion_error(5, format!("Unknown risk status '{}'", raw)))
}

fn parse_severity(raw: &str) -> rusqlite::Result<Severity> {
    Severity::parse(raw).ok_or_else(|| conversion_error(6, format!("Unknown severity '{}'", raw)))
}

fn parse_reminder_status(raw: &str) -> rusqlite::Result<ReminderStatus> {
    ReminderStatus::parse(raw).ok_or_else(|| conversion_error(3, format!("Unknown reminder status '{}'", raw)))
}

fn parse_role(raw: &str) -> rusqlite::Result<Role> {
    Role::parse(raw).ok_or_else(|| conversion_error(2, format!("Unknown role '{}'", raw)))
}

fn settings_problems(settings: &DashboardSettings) -> Vec<String> {
    let mut problems = Vec::new();
    if !(1..=MAX_REMINDER_THRESHOLD_DAYS).contains(&settings.reminder_threshold_days) {
        problems.push(format!(
            "reminder_threshold_days must be between 1 and {}",
            MAX_REMINDER_THRESHOLD_DAYS
        ));
    }
    if !(MIN_SESSION_IDLE_SECS..=MAX_SESSION_IDLE_SECS).contains(&settings.session_idle_timeout_secs) {
        problems.push(format!(
            "session_idle_timeout_secs must be between {} and {}",
            MIN_SESSION_IDLE_SECS, MAX_SESSION_IDLE_SECS
        ));
    }
    problems
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> AppResult<bool> {
    let pragma = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&pragma)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn merge_json(target: &mut serde_json::Value, update: serde_json::Value) {
    match (target, update) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_json(target_map.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (target, update) => {
            *target = update;
        }
    }
}
