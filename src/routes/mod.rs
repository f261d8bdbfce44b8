use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post, put},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::state::AppState;

pub mod accounts;
pub mod auth;
pub mod documents;
pub mod health;
pub mod integrations;
pub mod jobs;

const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| {
                    trimmed
                        .parse::<HeaderValue>()
                        .expect("invalid CORS allowed origin")
                })
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(headers))
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/me", get(auth::me));

    let documents_routes = Router::new()
        .route(
            "/",
            get(documents::list_documents).post(documents::upload_document),
        )
        .route(
            "/:id",
            get(documents::get_document).delete(documents::delete_document),
        )
        .route("/:id/download", get(documents::download_document))
        .route("/:id/transactions", get(documents::list_document_transactions));

    let jobs_routes = Router::new()
        .route("/", get(jobs::list_jobs).post(jobs::create_job))
        .route("/:id", get(jobs::get_job))
        .route("/:id/destination", get(jobs::get_destination))
        .route("/:id/transactions", post(jobs::assign_transactions))
        .route("/:id/export", post(jobs::export_job));

    let accounts_routes = Router::new()
        .route("/", get(accounts::list_accounts).post(accounts::create_account))
        .route("/:id/spreadsheet", patch(accounts::bind_account_spreadsheet));

    let company_routes = Router::new()
        .route("/", get(accounts::get_company).put(accounts::upsert_company))
        .route("/spreadsheet", put(accounts::bind_company_spreadsheet));

    let integrations_routes = Router::new()
        .route(
            "/google",
            get(integrations::google_status).delete(integrations::google_disconnect),
        )
        .route("/google/connect", get(integrations::google_connect))
        .route("/google/callback", get(integrations::google_callback));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/documents", documents_routes)
        .nest("/api/jobs", jobs_routes)
        .nest("/api/accounts", accounts_routes)
        .nest("/api/company", company_routes)
        .nest("/api/integrations", integrations_routes)
        .route("/api/health", get(health::health_check))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}
