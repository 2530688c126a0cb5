mod orders;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::orders::{OrderCommands, SessionCommands};

#[derive(Debug, Parser)]
#[command(name = "storefront-cli")]
#[command(about = "Storefront operator command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Inspect orders and move them between statuses
    Orders {
        #[command(subcommand)]
        command: OrderCommands,
    },
    /// Manage customer login sessions
    Sessions {
        #[command(subcommand)]
        command: SessionCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check that the database is reachable
    Ping,
    /// Apply pending migrations
    Migrate,
    /// Load categories, sizes, products, and banners from a YAML catalog
    Seed {
        /// Catalog file (defaults to `STOREFRONT_CATALOG_PATH`)
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("storefront-cli ready; run with --help to list commands");
        return Ok(());
    };

    let config = storefront_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = storefront_db::PoolConfig::from_app_config(&config);
    let pool = storefront_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db { command } => run_db(&pool, &config, command).await?,
        Commands::Orders { command } => orders::run_orders(&pool, command).await?,
        Commands::Sessions { command } => orders::run_sessions(&pool, command).await?,
    }

    Ok(())
}

async fn run_db(
    pool: &sqlx::PgPool,
    config: &storefront_core::AppConfig,
    command: DbCommands,
) -> anyhow::Result<()> {
    match command {
        DbCommands::Ping => {
            storefront_db::ping(pool).await?;
            println!("database reachable");
        }
        DbCommands::Migrate => {
            let applied = storefront_db::run_migrations(pool).await?;
            println!("{applied} migration(s) applied");
        }
        DbCommands::Seed { catalog } => {
            let path = catalog.unwrap_or_else(|| config.catalog_path.clone());
            let catalog = storefront_core::load_catalog(&path)?;
            storefront_db::run_migrations(pool).await?;
            let report = storefront_db::seed_catalog(pool, &catalog).await?;
            tracing::info!(path = %path.display(), "catalog seeded");
            println!(
                "seeded {} categories, {} sizes, {} products, {} banners",
                report.categories, report.sizes, report.products, report.banners
            );
        }
    }
    Ok(())
}
