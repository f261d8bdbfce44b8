use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use fintake::{
    auth::jwt::JwtService,
    config::AppConfig,
    db,
    google::{credentials::CredentialStore, oauth::HttpGoogleAuthClient, sheets::HttpSheetsClient},
    routes,
    state::AppState,
    storage::{HotStorageSettings, S3HotStorage},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "api",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        hot_bucket = %config.s3_hot_bucket,
        "loaded configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;

    let credentials = {
        let mut conn = pool
            .get()
            .context("failed to acquire connection for credential snapshot")?;
        Arc::new(CredentialStore::load(&config, &mut conn)?)
    };

    let storage = Arc::new(S3HotStorage::connect(HotStorageSettings::from_config(&config)).await?);
    let sheets = Arc::new(HttpSheetsClient::new()?);
    let google_auth = Arc::new(HttpGoogleAuthClient::new()?);
    let jwt = JwtService::from_config(&config)?;

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let state = AppState::new(pool, config, storage, sheets, google_auth, credentials, jwt);
    let router = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(addr = %addr, "api server listening");
    axum::serve(listener, router).await?;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
