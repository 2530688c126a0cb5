pub mod accounts;
pub mod app_config;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod orders;

pub use accounts::{PasswordError, Registration};
pub use app_config::{AppConfig, Environment};
pub use cart::{
    check_add_quantity, check_merge_quantity, check_set_quantity, new_session_key, CartLine,
    CartSummary, QuantityChange,
};
pub use catalog::{
    load_catalog, slug_from_name, BannerSeed, CatalogFile, CatalogParams, CatalogQuery,
    CategorySeed, ProductFilter, ProductSeed, ProductSort,
};
pub use config::{load_app_config, load_app_config_from_env};
pub use orders::{transition, OrderLine, OrderStatus, StockDelta, Transition};

use thiserror::Error;

/// Domain failures surfaced by the cart engine, order transitions, and
/// account operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{entity} not found")]
    NotFound { entity: &'static str },
    #[error("no sizes available")]
    NoSizesAvailable,
    /// `available` is the number of units that could still be requested.
    /// `in_cart` is non-zero when the request would merge into an existing line.
    #[error("insufficient stock: requested {requested}, {available} available")]
    InsufficientStock {
        requested: i32,
        available: i32,
        in_cart: i32,
    },
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid credentials")]
    Unauthorized,
}

impl StoreError {
    #[must_use]
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    /// Message shown to the storefront customer.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidInput(msg) | Self::Conflict(msg) => msg.clone(),
            Self::NotFound { entity } => format!("{entity} not found"),
            Self::NoSizesAvailable => "No sizes available".to_string(),
            Self::InsufficientStock {
                requested,
                available,
                in_cart,
            } => {
                if *in_cart > 0 {
                    format!("Can't add {requested} items. Only {available} more available.")
                } else {
                    format!("Only {available} items available")
                }
            }
            Self::InvalidTransition { from, to } => {
                format!("Order cannot move from {from} to {to}")
            }
            Self::Unauthorized => "Invalid email or password".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
    #[error("failed to read catalog file {path}: {source}")]
    CatalogFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse catalog file: {0}")]
    CatalogFileParse(#[from] serde_yaml::Error),
    #[error("catalog validation failed: {0}")]
    CatalogValidation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_message_for_new_line() {
        let err = StoreError::InsufficientStock {
            requested: 7,
            available: 5,
            in_cart: 0,
        };
        assert_eq!(err.user_message(), "Only 5 items available");
    }

    #[test]
    fn insufficient_stock_message_for_merge() {
        let err = StoreError::InsufficientStock {
            requested: 3,
            available: 2,
            in_cart: 3,
        };
        assert_eq!(
            err.user_message(),
            "Can't add 3 items. Only 2 more available."
        );
    }

    #[test]
    fn not_found_message_names_entity() {
        assert_eq!(StoreError::not_found("Item").user_message(), "Item not found");
    }
}
