//! Credential handling for storefront accounts: registration checks, argon2
//! password hashes, and opaque login tokens stored only as SHA-256 digests.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use std::sync::OnceLock;

use rand_core::RngCore;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::StoreError;

pub const MIN_PASSWORD_LEN: usize = 8;
const TOKEN_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("stored password hash is malformed: {0}")]
    MalformedHash(String),
}

/// Registration form as submitted by the storefront.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

impl Registration {
    /// Trim names, normalize the email, and enforce the password policy.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidInput`] describing the first failing field.
    pub fn validated(self) -> Result<Self, StoreError> {
        let email = normalize_email(&self.email);
        if !looks_like_email(&email) {
            return Err(StoreError::InvalidInput(
                "Enter a valid email address".to_string(),
            ));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(StoreError::InvalidInput(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let first_name = self.first_name.trim().to_string();
        let last_name = self.last_name.trim().to_string();
        if first_name.is_empty() || last_name.is_empty() {
            return Err(StoreError::InvalidInput(
                "First and last name are required".to_string(),
            ));
        }
        Ok(Self {
            email,
            password: self.password,
            first_name,
            last_name,
        })
    }
}

#[must_use]
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

/// Hash a plain-text password into an argon2 PHC string.
///
/// # Errors
///
/// [`PasswordError::Hash`] if argon2 fails.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hash(e.to_string()))
}

/// Check a plain-text password against a stored argon2 PHC string.
///
/// # Errors
///
/// [`PasswordError::MalformedHash`] if the stored value cannot be parsed.
pub fn verify_password(stored_hash: &str, password: &str) -> Result<bool, PasswordError> {
    let parsed =
        PasswordHash::new(stored_hash).map_err(|e| PasswordError::MalformedHash(e.to_string()))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::MalformedHash(e.to_string())),
    }
}

/// Like [`verify_password`], but with no stored hash the password is checked
/// against a throwaway hash and rejected. Lookups for unknown accounts then
/// cost the same argon2 work as a wrong password.
///
/// # Errors
///
/// [`PasswordError`] if hashing or verification fails.
pub fn verify_password_or_dummy(
    stored_hash: Option<&str>,
    password: &str,
) -> Result<bool, PasswordError> {
    match stored_hash {
        Some(hash) => verify_password(hash, password),
        None => {
            verify_password(dummy_hash()?, password)?;
            Ok(false)
        }
    }
}

fn dummy_hash() -> Result<&'static str, PasswordError> {
    static DUMMY_HASH: OnceLock<String> = OnceLock::new();
    if let Some(hash) = DUMMY_HASH.get() {
        return Ok(hash);
    }
    let hash = hash_password("no account has this password")?;
    Ok(DUMMY_HASH.get_or_init(|| hash))
}

/// Fresh random login token, hex encoded. Handed to the client once.
#[must_use]
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Digest under which a login token is stored.
#[must_use]
pub fn token_digest(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}
