use crate::clock::Clock;
use crate::errors::{AppError, AppResult};
use crate::models::{SessionInfo, UserAccount};
use chrono::Duration;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<Mutex<HashMap<String, SessionInfo>>>,
    idle_timeout_secs: Arc<AtomicI64>,
    clock: Clock,
}

impl SessionManager {
    pub fn new(clock: Clock, idle_timeout_secs: i64) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            idle_timeout_secs: Arc::new(AtomicI64::new(idle_timeout_secs)),
            clock,
        }
    }

    pub fn set_idle_timeout(&self, secs: i64) {
        self.idle_timeout_secs.store(secs, Ordering::Relaxed);
    }

    pub async fn open_session(&self, user: &UserAccount) -> SessionInfo {
        let now = self.clock.now();
        let info = SessionInfo {
            token: Uuid::new_v4().to_string(),
            username: user.username.clone(),
            role: user.role,
            opened_at: now,
            last_activity: now,
        };

        let mut sessions = self.sessions.lock().await;
        sessions.insert(info.token.clone(), info.clone());
        info
    }

    /// Refreshes the idle timer. A session idle for longer than the timeout is
    /// dropped and reported as expired.
    pub async fn touch(&self, token: &str) -> AppResult<SessionInfo> {
        let now = self.clock.now();
        let timeout = self.idle_timeout();
        let mut sessions = self.sessions.lock().await;
        let Some(info) = sessions.get_mut(token) else {
            return Err(AppError::SessionExpired("no active session for this token".to_string()));
        };

        if now - info.last_activity > timeout {
            let username = info.username.clone();
            sessions.remove(token);
            tracing::info!(%username, "session expired after inactivity");
            return Err(AppError::SessionExpired(format!(
                "session for {} expired after inactivity",
                username
            )));
        }

        info.last_activity = now;
        Ok(info.clone())
    }

    pub async fn close_session(&self, token: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(token).is_some()
    }

    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let timeout = self.idle_timeout();
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, info| now - info.last_activity <= timeout);
        before - sessions.len()
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    fn idle_timeout(&self) -> Duration {
        Duration::try_seconds(self.idle_timeout_secs.load(Ordering::Relaxed)).unwrap_or(Duration::MAX)
    }
}
