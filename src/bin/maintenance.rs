use std::env;

use anyhow::{Context, Result};
use chrono::Utc;
use diesel::prelude::*;

use portal::{
    config::AppConfig,
    db,
    logging::init_tracing,
    schema::{password_reset_tokens, refresh_tokens},
};

const USAGE: &str = "Usage: maintenance prune-tokens";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("prune-tokens") => prune_tokens()?,
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn prune_tokens() -> Result<()> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        "loaded portal configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let mut conn = pool.get().context("failed to get database connection")?;
    let now = Utc::now().naive_utc();

    let refresh_removed = diesel::delete(
        refresh_tokens::table.filter(
            refresh_tokens::expires_at
                .lt(now)
                .or(refresh_tokens::revoked_at.is_not_null()),
        ),
    )
    .execute(&mut conn)
    .context("failed to prune refresh tokens")?;

    let reset_removed = diesel::delete(
        password_reset_tokens::table.filter(
            password_reset_tokens::expires_at
                .lt(now)
                .or(password_reset_tokens::used_at.is_not_null()),
        ),
    )
    .execute(&mut conn)
    .context("failed to prune password reset tokens")?;

    tracing::info!(refresh_removed, reset_removed, "pruned stale tokens");
    println!("Removed {refresh_removed} refresh tokens and {reset_removed} password reset tokens.");
    Ok(())
}
