use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("STOREFRONT_ENV", "development"))?;

    let bind_addr: SocketAddr = parse_as(
        "STOREFRONT_BIND_ADDR",
        &or_default("STOREFRONT_BIND_ADDR", "0.0.0.0:3000"),
    )?;
    let log_level = or_default("STOREFRONT_LOG_LEVEL", "info");
    let catalog_path = PathBuf::from(or_default(
        "STOREFRONT_CATALOG_PATH",
        "./config/catalog.yaml",
    ));

    let db_max_connections: u32 = parse_as(
        "STOREFRONT_DB_MAX_CONNECTIONS",
        &or_default("STOREFRONT_DB_MAX_CONNECTIONS", "10"),
    )?;
    let db_min_connections: u32 = parse_as(
        "STOREFRONT_DB_MIN_CONNECTIONS",
        &or_default("STOREFRONT_DB_MIN_CONNECTIONS", "1"),
    )?;
    if db_min_connections > db_max_connections {
        return Err(ConfigError::InvalidEnvVar {
            var: "STOREFRONT_DB_MIN_CONNECTIONS".to_string(),
            reason: format!(
                "must not exceed STOREFRONT_DB_MAX_CONNECTIONS ({db_max_connections})"
            ),
        });
    }
    let db_acquire_timeout_secs: u64 = parse_as(
        "STOREFRONT_DB_ACQUIRE_TIMEOUT_SECS",
        &or_default("STOREFRONT_DB_ACQUIRE_TIMEOUT_SECS", "10"),
    )?;

    let session_ttl_hours: i64 = parse_as(
        "STOREFRONT_SESSION_TTL_HOURS",
        &or_default("STOREFRONT_SESSION_TTL_HOURS", "336"),
    )?;
    if session_ttl_hours <= 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "STOREFRONT_SESSION_TTL_HOURS".to_string(),
            reason: "must be positive".to_string(),
        });
    }

    let secure_default = if env == Environment::Production {
        "true"
    } else {
        "false"
    };
    let secure_cookies: bool = parse_as(
        "STOREFRONT_SECURE_COOKIES",
        &or_default("STOREFRONT_SECURE_COOKIES", secure_default),
    )?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        catalog_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        session_ttl_hours,
        secure_cookies,
    })
}

/// Parse a raw env value, reporting the variable name on failure.
fn parse_as<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "STOREFRONT_ENV".to_string(),
            reason: format!("expected development, test, or production; got '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
