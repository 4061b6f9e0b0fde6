use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use portal::auth::jwt::JwtService;
use portal::aws::{build_s3_client, build_ses_client, load_sdk_config};
use portal::config::AppConfig;
use portal::db;
use portal::logging::init_tracing;
use portal::mail::{LogMailer, Mailer, SesMailer};
use portal::routes;
use portal::state::AppState;
use portal::storage::{ObjectStorage, S3Storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "portal",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        server_host = %config.server_host,
        server_port = config.server_port,
        s3_bucket = %config.s3_bucket,
        mail_enabled = config.mail_from.is_some(),
        tasks_data_dir = %config.tasks_data_dir.display(),
        "loaded portal configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let applied = db::run_migrations(&pool)?;
    tracing::info!(applied, "database migrations up to date");

    let sdk_config = load_sdk_config(&config).await;
    let storage: Arc<dyn ObjectStorage> = Arc::new(S3Storage::new(
        build_s3_client(&sdk_config),
        config.s3_bucket.clone(),
    ));
    let mailer: Arc<dyn Mailer> = match config.mail_from.as_deref() {
        Some(from) => Arc::new(SesMailer::new(build_ses_client(&sdk_config), from)),
        None => {
            tracing::warn!("MAIL_FROM not set; password reset mail will only be logged");
            Arc::new(LogMailer)
        }
    };
    let jwt = JwtService::from_config(&config)?;

    let listen_addr: SocketAddr =
        format!("{}:{}", config.server_host, config.server_port).parse()?;
    let state = AppState::new(pool, config, storage, mailer, jwt);
    let router = routes::create_router(state);

    let listener = TcpListener::bind(listen_addr).await?;
    tracing::info!("listening on {}", listen_addr);

    axum::serve(listener, router).await?;
    Ok(())
}
