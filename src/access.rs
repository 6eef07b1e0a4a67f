use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{Role, UserAccount};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use uuid::Uuid;

pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 200_000;

/// Stored as `iterations$salt$hash`, salt and hash base64 encoded.
pub fn hash_password(password: &str, iterations: u32) -> String {
    let salt = Uuid::new_v4().into_bytes();
    let key = derive_key(password, &salt, iterations);
    format!("{}${}${}", iterations, B64.encode(salt), B64.encode(key))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    if password.is_empty() {
        return false;
    }
    let mut parts = stored.splitn(3, '$');
    let (Some(iterations), Some(salt), Some(hash)) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    let Ok(salt) = B64.decode(salt) else {
        return false;
    };
    let key = derive_key(password, &salt, iterations.max(1));
    B64.encode(key) == hash
}

/// `None` when the user is unknown or the password does not match; callers
/// must not tell the two apart.
pub fn authenticate(db: &Database, username: &str, password: &str) -> AppResult<Option<UserAccount>> {
    let Some((account, stored)) = db.find_user(username.trim())? else {
        return Ok(None);
    };
    if verify_password(password, &stored) {
        Ok(Some(account))
    } else {
        Ok(None)
    }
}

/// Creates the bootstrap administrator if no user with that name exists yet.
pub fn seed_admin(db: &Database, username: &str, password: &str, iterations: u32) -> AppResult<bool> {
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(AppError::Validation(
            "admin username and password must not be empty".to_string(),
        ));
    }
    if db.find_user(username)?.is_some() {
        return Ok(false);
    }
    db.insert_user(username, &hash_password(password, iterations), Role::Admin)?;
    tracing::info!(username, "seeded admin account");
    Ok(true)
}

fn derive_key(password: &str, salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);
    key
}
