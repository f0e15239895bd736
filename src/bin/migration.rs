//! Schema migration runner.
//!
//! `migration up` applies pending migrations, `migration down --steps N`
//! rolls back the last N. The database URL comes from `--database-url`,
//! `DATABASE_URL` or the application config, in that order.

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use storefront_api::{config, migrator};

#[derive(Parser)]
#[command(name = "migration", about = "Apply or roll back storefront schema migrations", version)]
struct Cli {
    #[arg(long, env = "DATABASE_URL", help = "Database connection string")]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Apply every pending migration (default)
    Up,
    /// Roll back the most recent migrations
    Down {
        #[arg(long, default_value_t = 1, help = "Number of migrations to roll back")]
        steps: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::init_tracing("info", false);
    let cli = Cli::parse();

    let database_url = match cli.database_url {
        Some(url) => url,
        None => {
            config::load_config()
                .context("no --database-url given and configuration could not be loaded")?
                .database_url
        }
    };

    match cli.command.unwrap_or(Command::Up) {
        Command::Up => {
            migrator::run_migration(&database_url).await?;
            info!("Database is up to date");
        }
        Command::Down { steps } => {
            migrator::rollback_migration(&database_url, steps).await?;
            info!(steps, "Rollback finished");
        }
    }

    Ok(())
}
