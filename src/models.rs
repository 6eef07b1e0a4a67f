use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowIssue {
    pub id: i64,
    pub message: String,
}

impl RowIssue {
    pub fn new(id: i64, message: impl Into<String>) -> Self {
        Self {
            id,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Risks,
    Reminders,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Risks => "risks",
            Self::Reminders => "reminders",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskStatus {
    Aperto,
    Chiuso,
}

impl RiskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aperto => "aperto",
            Self::Chiuso => "chiuso",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "aperto" => Some(Self::Aperto),
            "chiuso" => Some(Self::Chiuso),
            _ => None,
        }
    }
}

/// Three-valued ordinal; `Hight` and `Medium/High` are older spellings of `High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    #[serde(alias = "Hight", alias = "Medium/High", alias = "Medium")]
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "high" | "hight" | "medium" | "medium/high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskScenario {
    #[serde(rename = "Inadeguate Security of third party")]
    ThirdPartySecurity,
    #[serde(rename = "Inadeguate resilience of third party")]
    ThirdPartyResilience,
    #[serde(rename = "Inadequate outsourcing of third party")]
    ThirdPartyOutsourcing,
}

impl RiskScenario {
    pub const ALL: [RiskScenario; 3] = [
        Self::ThirdPartySecurity,
        Self::ThirdPartyResilience,
        Self::ThirdPartyOutsourcing,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ThirdPartySecurity => "Inadeguate Security of third party",
            Self::ThirdPartyResilience => "Inadeguate resilience of third party",
            Self::ThirdPartyOutsourcing => "Inadequate outsourcing of third party",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        Self::ALL
            .into_iter()
            .find(|scenario| scenario.as_str().eq_ignore_ascii_case(trimmed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReminderStatus {
    Attivo,
    Risposto,
}

impl ReminderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Attivo => "Attivo",
            Self::Risposto => "Risposto",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "Attivo" => Some(Self::Attivo),
            "Risposto" => Some(Self::Risposto),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskRecord {
    pub id: i64,
    #[serde(with = "crate::dates::calendar_date")]
    pub data_inizio: NaiveDate,
    #[serde(with = "crate::dates::calendar_date")]
    pub data_fine: NaiveDate,
    pub fornitore: String,
    pub rischio: RiskScenario,
    pub stato: RiskStatus,
    pub gravita: Severity,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default, with = "crate::dates::optional_calendar_date")]
    pub data_chiusura: Option<NaiveDate>,
    pub contract_owner: String,
    pub area_riferimento: String,
    #[serde(default)]
    pub perc_avanzamento: i64,
}

/// Evidence collected from a supplier; stored as 0/1 columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceFlags {
    #[serde(default, deserialize_with = "flag")]
    pub test_bc: bool,
    #[serde(default, deserialize_with = "flag")]
    pub test_it: bool,
    #[serde(default, deserialize_with = "flag")]
    pub test_pt_va: bool,
    #[serde(default, deserialize_with = "flag")]
    pub access_review: bool,
    #[serde(default, deserialize_with = "flag")]
    pub ppt: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderRecord {
    pub id: i64,
    pub fornitore_nome: String,
    #[serde(with = "crate::dates::calendar_date")]
    pub data_invio: NaiveDate,
    pub stato_reminder: ReminderStatus,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(flatten)]
    pub evidence: EvidenceFlags,
}

/// A reminder as shown on the follow-up grid, with the computed countdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderView {
    #[serde(flatten)]
    pub record: ReminderRecord,
    #[serde(default)]
    pub giorni_trascorsi: i64,
    #[serde(default)]
    pub giorni_al_reminder: i64,
    #[serde(default)]
    pub overdue: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRiskPayload {
    #[serde(with = "crate::dates::calendar_date")]
    pub data_inizio: NaiveDate,
    #[serde(with = "crate::dates::calendar_date")]
    pub data_fine: NaiveDate,
    pub fornitore: String,
    pub rischio: Option<RiskScenario>,
    pub stato: RiskStatus,
    pub gravita: Severity,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default, with = "crate::dates::optional_calendar_date")]
    pub data_chiusura: Option<NaiveDate>,
    pub contract_owner: String,
    pub area_riferimento: String,
    #[serde(default)]
    pub perc_avanzamento: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReminderPayload {
    pub fornitore_nome: String,
    #[serde(with = "crate::dates::calendar_date")]
    pub data_invio: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub applied: Vec<i64>,
    pub conflicts: Vec<RowIssue>,
}

impl ApplyReport {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskFilters {
    pub fornitore: Option<Vec<String>>,
    pub stati: Option<Vec<RiskStatus>>,
    pub gravita: Option<Vec<Severity>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardOverview {
    pub total_risks: usize,
    pub open_risks: usize,
    pub closed_risks: usize,
    pub overdue_reminders: Vec<ReminderView>,
    pub by_status: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub open: usize,
    pub critical: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierGroup {
    pub fornitore: String,
    pub risks: Vec<RiskRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSelection {
    pub summary: ReportSummary,
    pub by_severity: BTreeMap<String, usize>,
    pub suppliers: Vec<SupplierGroup>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Read,
    Modify,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Modify => "modify",
            Self::Admin => "admin",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "read" => Some(Self::Read),
            "modify" => Some(Self::Modify),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn can_edit(self) -> bool {
        matches!(self, Self::Modify | Self::Admin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Page {
    Dashboard,
    #[serde(rename = "Report PDF")]
    Report,
    #[serde(rename = "Censimento Fornitori")]
    Censimento,
    Modifica,
    #[serde(rename = "Follow-up")]
    FollowUp,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserAccount,
    pub menu: Vec<Page>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub token: String,
    pub username: String,
    pub role: Role,
    pub opened_at: NaiveDateTime,
    pub last_activity: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSettings {
    pub reminder_threshold_days: i64,
    pub session_idle_timeout_secs: i64,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            reminder_threshold_days: 5,
            session_idle_timeout_secs: 1800,
        }
    }
}

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawFlag {
        Bool(bool),
        Int(i64),
    }

    match RawFlag::deserialize(deserializer)? {
        RawFlag::Bool(value) => Ok(value),
        RawFlag::Int(0) => Ok(false),
        RawFlag::Int(1) => Ok(true),
        RawFlag::Int(other) => Err(serde::de::Error::custom(format!(
            "evidence flag must be 0 or 1, got {}",
            other
        ))),
    }
}
