//! Cart rules that do not need the database: quantity checks against a
//! stock figure read under lock, and the derived cart summary.

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::StoreError;

/// Generate an opaque key for a storefront session that has none yet.
#[must_use]
pub fn new_session_key() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Validate a quantity for a brand-new cart line.
///
/// # Errors
///
/// [`StoreError::InvalidInput`] when `quantity < 1`,
/// [`StoreError::InsufficientStock`] when it exceeds `stock`.
pub fn check_add_quantity(quantity: i32, stock: i32) -> Result<(), StoreError> {
    if quantity < 1 {
        return Err(StoreError::InvalidInput(
            "Quantity must be at least 1".to_string(),
        ));
    }
    if quantity > stock {
        return Err(StoreError::InsufficientStock {
            requested: quantity,
            available: stock.max(0),
            in_cart: 0,
        });
    }
    Ok(())
}

/// Validate merging `quantity` more units into a line already holding
/// `existing`, returning the merged quantity.
///
/// # Errors
///
/// [`StoreError::InsufficientStock`] reporting how many more units fit.
pub fn check_merge_quantity(existing: i32, quantity: i32, stock: i32) -> Result<i32, StoreError> {
    check_add_quantity(quantity, stock)?;
    let merged = existing.saturating_add(quantity);
    if merged > stock {
        return Err(StoreError::InsufficientStock {
            requested: quantity,
            available: (stock - existing).max(0),
            in_cart: existing,
        });
    }
    Ok(merged)
}

/// Outcome of an absolute quantity edit on an existing line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityChange {
    Remove,
    Set(i32),
}

/// Validate an absolute quantity edit. Zero removes the line.
///
/// # Errors
///
/// [`StoreError::InvalidInput`] for negative values,
/// [`StoreError::InsufficientStock`] when the value exceeds `stock`.
pub fn check_set_quantity(quantity: i32, stock: i32) -> Result<QuantityChange, StoreError> {
    match quantity {
        q if q < 0 => Err(StoreError::InvalidInput("Invalid quantity".to_string())),
        0 => Ok(QuantityChange::Remove),
        q if q > stock => Err(StoreError::InsufficientStock {
            requested: q,
            available: stock.max(0),
            in_cart: 0,
        }),
        q => Ok(QuantityChange::Set(q)),
    }
}

/// Minimal view of a cart line needed to derive totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartLine {
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl CartLine {
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Derived cart totals. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CartSummary {
    pub total_items: i64,
    pub subtotal: Decimal,
}

impl CartSummary {
    #[must_use]
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a CartLine>) -> Self {
        lines.into_iter().fold(
            Self {
                total_items: 0,
                subtotal: Decimal::ZERO,
            },
            |acc, line| Self {
                total_items: acc.total_items + i64::from(line.quantity),
                subtotal: acc.subtotal + line.line_total(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_within_stock_passes() {
        assert_eq!(check_add_quantity(3, 5), Ok(()));
        assert_eq!(check_add_quantity(5, 5), Ok(()));
    }

    #[test]
    fn add_rejects_zero_and_negative() {
        assert!(matches!(
            check_add_quantity(0, 5),
            Err(StoreError::InvalidInput(_))
        ));
        assert!(matches!(
            check_add_quantity(-2, 5),
            Err(StoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn add_over_stock_reports_stock() {
        assert_eq!(
            check_add_quantity(6, 5),
            Err(StoreError::InsufficientStock {
                requested: 6,
                available: 5,
                in_cart: 0
            })
        );
    }

    #[test]
    fn merge_three_plus_three_over_five_fails() {
        assert_eq!(
            check_merge_quantity(3, 3, 5),
            Err(StoreError::InsufficientStock {
                requested: 3,
                available: 2,
                in_cart: 3
            })
        );
    }

    #[test]
    fn merge_up_to_stock_returns_sum() {
        assert_eq!(check_merge_quantity(3, 2, 5), Ok(5));
    }

    #[test]
    fn merge_when_stock_dropped_below_cart_reports_zero_more() {
        let err = check_merge_quantity(4, 1, 2).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientStock { available: 0, .. }
        ));
    }

    #[test]
    fn set_zero_removes() {
        assert_eq!(check_set_quantity(0, 5), Ok(QuantityChange::Remove));
    }

    #[test]
    fn set_zero_removes_even_without_stock() {
        assert_eq!(check_set_quantity(0, 0), Ok(QuantityChange::Remove));
    }

    #[test]
    fn set_is_absolute() {
        assert_eq!(check_set_quantity(4, 5), Ok(QuantityChange::Set(4)));
    }

    #[test]
    fn set_over_stock_fails() {
        assert!(matches!(
            check_set_quantity(6, 5),
            Err(StoreError::InsufficientStock { available: 5, .. })
        ));
    }

    #[test]
    fn set_negative_fails() {
        assert!(matches!(
            check_set_quantity(-1, 5),
            Err(StoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn summary_sums_live_lines() {
        let lines = [
            CartLine {
                quantity: 2,
                unit_price: Decimal::new(1250, 2),
            },
            CartLine {
                quantity: 1,
                unit_price: Decimal::new(999, 2),
            },
        ];
        let summary = CartSummary::from_lines(&lines);
        assert_eq!(summary.total_items, 3);
        assert_eq!(summary.subtotal, Decimal::new(3499, 2));
    }

    #[test]
    fn summary_of_empty_cart_is_zero() {
        let summary = CartSummary::from_lines(std::iter::empty::<&CartLine>());
        assert_eq!(summary.total_items, 0);
        assert_eq!(summary.subtotal, Decimal::ZERO);
    }

    #[test]
    fn session_keys_are_unique() {
        assert_ne!(new_session_key(), new_session_key());
    }
}
