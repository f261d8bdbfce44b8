use std::{sync::Arc, time::Duration};

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use fintake::{
    auth::jwt::JwtService,
    config::AppConfig,
    db, default_handlers,
    google::{credentials::CredentialStore, oauth::HttpGoogleAuthClient, sheets::HttpSheetsClient},
    state::AppState,
    storage::{HotStorageSettings, S3HotStorage},
    Worker,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "worker",
        database_url = %config.redacted_database_url(),
        pool_size = 1,
        hot_bucket = %config.s3_hot_bucket,
        "loaded configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, 1)?;

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

    let state = Arc::new(AppState::new(
        pool,
        config,
        storage,
        sheets,
        google_auth,
        credentials,
        jwt,
    ));
    let worker = Worker::new(state, default_handlers(), Duration::from_secs(2));

    tokio::select! {
        _ = worker.run() => {}
        _ = signal::ctrl_c() => {
            tracing::info!("worker received shutdown signal");
        }
    }

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
