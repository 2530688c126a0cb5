//! Order status machine and the stock deltas each transition implies.
//!
//! Stock is debited when an order first enters a stock-consuming status and
//! credited back when a consuming order is cancelled. The persistence layer
//! applies the returned deltas in the same transaction as the status write.

use serde::{Deserialize, Serialize};

use crate::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Statuses in which the order's units have been taken out of stock.
    #[must_use]
    pub fn consumes_stock(self) -> bool {
        matches!(
            self,
            OrderStatus::Processing | OrderStatus::Shipped | OrderStatus::Delivered
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| StoreError::InvalidInput(format!("unknown order status '{s}'")))
    }
}

/// One order item as seen by the transition: which size it consumed and how many.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLine {
    pub product_size_id: i64,
    pub quantity: i32,
}

/// Signed stock change for a single `product_sizes` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StockDelta {
    pub product_size_id: i64,
    pub delta: i32,
}

/// Result of a status change: the status to persist plus the stock it moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub deltas: Vec<StockDelta>,
}

/// Compute the stock effect of moving an existing order from `from` to `to`.
///
/// - entering a consuming status from `pending` or `cancelled` debits every line;
/// - `cancelled` from a consuming status credits every line;
/// - moves between consuming statuses, and any same-status save, change nothing.
///
/// # Errors
///
/// [`StoreError::InvalidTransition`] when a consuming order is moved back to
/// `pending`; its debit would otherwise be left without a matching credit.
pub fn transition(
    from: OrderStatus,
    to: OrderStatus,
    lines: &[OrderLine],
) -> Result<Transition, StoreError> {
    if from.consumes_stock() && to == OrderStatus::Pending {
        return Err(StoreError::InvalidTransition { from, to });
    }

    let sign = if to == OrderStatus::Cancelled && from.consumes_stock() {
        1
    } else if to.consumes_stock() && !from.consumes_stock() {
        -1
    } else {
        0
    };

    let deltas = if sign == 0 {
        Vec::new()
    } else {
        merge_deltas(lines.iter().map(|line| StockDelta {
            product_size_id: line.product_size_id,
            delta: sign * line.quantity,
        }))
    };

    Ok(Transition { from, to, deltas })
}

/// Collapse deltas touching the same size and order them by id, so rows are
/// always locked in a consistent order.
fn merge_deltas(deltas: impl Iterator<Item = StockDelta>) -> Vec<StockDelta> {
    let mut merged: std::collections::BTreeMap<i64, i32> = std::collections::BTreeMap::new();
    for d in deltas {
        *merged.entry(d.product_size_id).or_insert(0) += d.delta;
    }
    merged
        .into_iter()
        .filter(|(_, delta)| *delta != 0)
        .map(|(product_size_id, delta)| StockDelta {
            product_size_id,
            delta,
        })
        .collect()
}
