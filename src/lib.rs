pub mod access;
pub mod clock;
pub mod config;
pub mod dashboard;
pub mod dates;
pub mod db;
pub mod errors;
pub mod intake;
pub mod models;
pub mod policy;
pub mod reconcile;
pub mod service;
pub mod session;
pub mod snapshot;
pub mod store;

use crate::clock::Clock;
use crate::config::BootstrapConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{EntityKind, ReminderView, RiskFilters, RiskRecord};
use crate::service::DashboardService;
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

pub const USER_ENV: &str = "RISK_DASHBOARD_USER";
pub const PASSWORD_ENV: &str = "RISK_DASHBOARD_PASSWORD";

const USAGE: &str = "usage: risk-dashboard <overview|suppliers|report [filters.json]|risks|reminders|settings|save-risks <original.json> <edited.json>|save-reminders <original.json> <edited.json>>";

/// A grid file holds either a bare row array or a snapshot as printed by
/// the `risks`/`reminders` commands.
#[derive(Deserialize)]
#[serde(untagged)]
enum GridFile<R> {
    Rows(Vec<R>),
    Snapshot { rows: Vec<R> },
}

pub async fn run(args: Vec<String>) -> AppResult<()> {
    let config = BootstrapConfig::load()?;
    init_tracing(&config).map_err(AppError::Internal)?;

    if args.is_empty() {
        return Err(AppError::Validation(USAGE.to_string()));
    }

    let service = DashboardService::open(&config, Clock::system())?;
    let username = std::env::var(USER_ENV).unwrap_or_default();
    let password = std::env::var(PASSWORD_ENV).unwrap_or_default();
    let login = service.login(&username, &password).await?;
    run_command(&service, &login.token, &args).await
}

/// Runs one command for an open session and closes the session whatever the outcome.
async fn run_command(service: &DashboardService, token: &str, args: &[String]) -> AppResult<()> {
    let result = dispatch(service, token, args).await;
    service.logout(token).await;
    result
}

async fn dispatch(service: &DashboardService, token: &str, args: &[String]) -> AppResult<()> {
    let Some(command) = args.first().map(String::as_str) else {
        return Err(AppError::Validation(USAGE.to_string()));
    };

    match command {
        "overview" => print_json(&service.overview(token).await?),
        "suppliers" => print_json(&service.suppliers(token).await?),
        "report" => {
            let filters = match args.get(1) {
                Some(path) => read_json::<RiskFilters>(Path::new(path))?,
                None => RiskFilters::default(),
            };
            print_json(&service.report(token, filters).await?)
        }
        "risks" => print_json(&service.load_snapshot(token, EntityKind::Risks).await?),
        "reminders" => print_json(&service.load_snapshot(token, EntityKind::Reminders).await?),
        "settings" => print_json(&service.settings(token).await?),
        "save-risks" => {
            let (original, edited) = read_grid_pair::<RiskRecord>(args)?;
            print_json(&service.save_risk_edits(token, &original, &edited).await?)
        }
        "save-reminders" => {
            let (original, edited) = read_grid_pair::<ReminderView>(args)?;
            print_json(&service.save_reminder_edits(token, &original, &edited).await?)
        }
        other => Err(AppError::Validation(format!("unknown command '{}'; {}", other, USAGE))),
    }
}

fn read_grid_pair<R: DeserializeOwned>(args: &[String]) -> AppResult<(Vec<R>, Vec<R>)> {
    let (Some(original), Some(edited)) = (args.get(1), args.get(2)) else {
        return Err(AppError::Validation(USAGE.to_string()));
    };
    let original = read_json::<GridFile<R>>(Path::new(original))?;
    let edited = read_json::<GridFile<R>>(Path::new(edited))?;
    Ok((original.into_rows(), edited.into_rows()))
}

impl<R> GridFile<R> {
    fn into_rows(self) -> Vec<R> {
        match self {
            Self::Rows(rows) | Self::Snapshot { rows } => rows,
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> AppResult<T> {
    let parsed: anyhow::Result<T> = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))
        .and_then(|raw| {
            serde_json::from_str(&raw).with_context(|| format!("{} is not a valid grid payload", path.display()))
        });
    parsed.map_err(|error| AppError::Validation(format!("{:#}", error)))
}

fn print_json(value: &impl Serialize) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing(config: &BootstrapConfig) -> Result<(), String> {
    std::fs::create_dir_all(&config.log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "dashboard.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}
