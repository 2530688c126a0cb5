//! Customer accounts and login sessions.
//!
//! Session tokens never reach this module in clear text; callers pass the
//! digest produced by `storefront_core::accounts::token_digest`.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use storefront_core::StoreError;

use crate::{is_unique_violation, DbError};

const USER_COLUMNS: &str = "id, email, first_name, last_name, phone, address, city, postal_code, \
     created_at, updated_at";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A `users` row without the password hash.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserCredentialsRow {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
}

/// Partial profile edit. `None` leaves a field as it is; an empty string
/// clears one of the optional contact fields.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
}

// ---------------------------------------------------------------------------
// users
// ---------------------------------------------------------------------------

/// Insert a new user.
///
/// # Errors
///
/// Returns [`StoreError::Conflict`] when the email is already registered
/// (case-insensitively), or [`DbError::Sqlx`] on other failures.
pub async fn create_user(pool: &PgPool, user: &NewUser) -> Result<UserRow, DbError> {
    let result = sqlx::query_as::<_, UserRow>(&format!(
        "INSERT INTO users (email, password_hash, first_name, last_name) \
         VALUES ($1, $2, $3, $4) \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .fetch_one(pool)
    .await;

    match result {
        Ok(row) => Ok(row),
        Err(e) if is_unique_violation(&e) => Err(StoreError::Conflict(
            "An account with this email already exists".to_string(),
        )
        .into()),
        Err(e) => Err(e.into()),
    }
}

/// Look up login credentials by email, ignoring case.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn get_user_credentials_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<UserCredentialsRow>, DbError> {
    let row = sqlx::query_as::<_, UserCredentialsRow>(
        "SELECT id, email, password_hash FROM users WHERE LOWER(email) = LOWER($1)",
    )
    .bind(email.trim())
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn get_user(pool: &PgPool, user_id: i64) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Apply a partial profile edit and return the updated user.
///
/// # Errors
///
/// Returns [`StoreError::InvalidInput`] when a name is set to blank,
/// [`StoreError::NotFound`] for an unknown user, or [`DbError::Sqlx`] on
/// query failure.
pub async fn update_user_profile(
    pool: &PgPool,
    user_id: i64,
    update: &ProfileUpdate,
) -> Result<UserRow, DbError> {
    let first_name = required_name("first_name", update.first_name.as_deref())?;
    let last_name = required_name("last_name", update.last_name.as_deref())?;

    let row = sqlx::query_as::<_, UserRow>(&format!(
        "UPDATE users SET \
             first_name  = COALESCE($2, first_name), \
             last_name   = COALESCE($3, last_name), \
             phone       = CASE WHEN $4::TEXT IS NULL THEN phone ELSE NULLIF($4, '') END, \
             address     = CASE WHEN $5::TEXT IS NULL THEN address ELSE NULLIF($5, '') END, \
             city        = CASE WHEN $6::TEXT IS NULL THEN city ELSE NULLIF($6, '') END, \
             postal_code = CASE WHEN $7::TEXT IS NULL THEN postal_code ELSE NULLIF($7, '') END, \
             updated_at  = NOW() \
         WHERE id = $1 \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(user_id)
    .bind(first_name)
    .bind(last_name)
    .bind(update.phone.as_deref().map(str::trim))
    .bind(update.address.as_deref().map(str::trim))
    .bind(update.city.as_deref().map(str::trim))
    .bind(update.postal_code.as_deref().map(str::trim))
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StoreError::not_found("User"))?;

    Ok(row)
}

fn required_name<'a>(field: &str, value: Option<&'a str>) -> Result<Option<&'a str>, StoreError> {
    match value.map(str::trim) {
        Some("") => Err(StoreError::InvalidInput(format!("{field} cannot be blank"))),
        other => Ok(other),
    }
}

// ---------------------------------------------------------------------------
// user_sessions
// ---------------------------------------------------------------------------

/// Store a login session under the token digest. Returns its expiry.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn create_user_session(
    pool: &PgPool,
    user_id: i64,
    token_digest: &str,
    ttl: Duration,
) -> Result<DateTime<Utc>, DbError> {
    let expires_at = Utc::now() + ttl;
    sqlx::query(
        "INSERT INTO user_sessions (user_id, token_hash, expires_at) VALUES ($1, $2, $3)",
    )
    .bind(user_id)
    .bind(token_digest)
    .bind(expires_at)
    .execute(pool)
    .await?;
    Ok(expires_at)
}

/// Resolve an unexpired session to its user.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn find_session_user(
    pool: &PgPool,
    token_digest: &str,
) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT u.id, u.email, u.first_name, u.last_name, u.phone, u.address, u.city, \
                u.postal_code, u.created_at, u.updated_at \
         FROM user_sessions us \
         JOIN users u ON u.id = us.user_id \
         WHERE us.token_hash = $1 AND us.expires_at > NOW()",
    )
    .bind(token_digest)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Delete a session. Returns `false` if no such session existed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn delete_user_session(pool: &PgPool, token_digest: &str) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM user_sessions WHERE token_hash = $1")
        .bind(token_digest)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Remove every expired session. Returns the number removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn purge_expired_sessions(pool: &PgPool) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at <= NOW()")
        .execute(pool)
        .await?;
    let purged = result.rows_affected();
    tracing::info!(purged, "expired user sessions purged");
    Ok(purged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_names_are_rejected_and_missing_names_kept() {
        assert!(required_name("first_name", Some("  ")).is_err());
        assert_eq!(required_name("first_name", None), Ok(None));
        assert_eq!(required_name("first_name", Some(" Ann ")), Ok(Some("Ann")));
    }
}
