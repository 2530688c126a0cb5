//! Operator commands for orders and login sessions.
//!
//! Status changes go through the same transactional path as the admin API,
//! so stock is debited or credited exactly as it would be over HTTP.

use clap::Subcommand;
use storefront_core::OrderStatus;

/// Sub-commands available under `orders`.
#[derive(Debug, Subcommand)]
pub enum OrderCommands {
    /// Show an order and its items
    Show {
        /// Order id
        order_id: i64,
    },
    /// Move an order to a new status
    SetStatus {
        /// Order id
        order_id: i64,
        /// One of: pending, processing, shipped, delivered, cancelled
        #[arg(value_parser = parse_status)]
        status: OrderStatus,
    },
}

/// Sub-commands available under `sessions`.
#[derive(Debug, Subcommand)]
pub enum SessionCommands {
    /// Delete expired login sessions
    Purge,
}

fn parse_status(raw: &str) -> Result<OrderStatus, String> {
    raw.trim()
        .to_ascii_lowercase()
        .parse()
        .map_err(|e: storefront_core::StoreError| e.user_message())
}

pub(crate) async fn run_orders(pool: &sqlx::PgPool, command: OrderCommands) -> anyhow::Result<()> {
    match command {
        OrderCommands::Show { order_id } => show_order(pool, order_id).await,
        OrderCommands::SetStatus { order_id, status } => {
            set_order_status(pool, order_id, status).await
        }
    }
}

pub(crate) async fn run_sessions(
    pool: &sqlx::PgPool,
    command: SessionCommands,
) -> anyhow::Result<()> {
    match command {
        SessionCommands::Purge => {
            let purged = storefront_db::purge_expired_sessions(pool).await?;
            println!("purged {purged} expired session(s)");
        }
    }
    Ok(())
}

async fn show_order(pool: &sqlx::PgPool, order_id: i64) -> anyhow::Result<()> {
    let order = storefront_db::get_order(pool, order_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("order {order_id} not found"))?;
    let items = storefront_db::list_order_items(pool, order_id).await?;

    println!(
        "order #{} [{}] {} total {}",
        order.id,
        order.status,
        order.created_at.format("%Y-%m-%d %H:%M"),
        order.total_price
    );
    println!(
        "  ship to {}, {}, {} {}",
        order.full_name, order.address, order.city, order.postal_code
    );
    for item in items {
        println!(
            "  {:>3} x {} ({}) @ {} = {}",
            item.quantity, item.product_name, item.size_name, item.price, item.line_total
        );
    }
    Ok(())
}

async fn set_order_status(
    pool: &sqlx::PgPool,
    order_id: i64,
    status: OrderStatus,
) -> anyhow::Result<()> {
    let change = storefront_db::update_order_status(pool, order_id, status).await?;

    println!(
        "order #{}: {} -> {}",
        change.order.id, change.previous, change.order.status
    );
    if change.deltas.is_empty() {
        println!("  stock unchanged");
    }
    for delta in &change.deltas {
        println!(
            "  product size {}: stock {:+}",
            delta.product_size_id, delta.delta
        );
    }
    Ok(())
}
