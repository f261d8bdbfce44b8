use axum::extract::{Json, Query, State};
use axum::http::StatusCode;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::google::oauth::consent_url;
use crate::google::tokens::{self, PROVIDER_GOOGLE_SHEETS};
use crate::models::UserIntegrationToken;
use crate::schema::user_integration_tokens;
use crate::state::AppState;

#[derive(Serialize)]
pub struct GoogleStatusResponse {
    pub configured: bool,
    pub connected: bool,
    pub service_account_available: bool,
    pub expires_at: Option<String>,
}

/// Integration status is always reportable: a missing OAuth app or an
/// unlinked user degrades to `false` flags, it never errors. Several optional
/// integrations can be unconfigured at once in a given deployment.
pub async fn google_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<GoogleStatusResponse>> {
    let configured = state.credentials.resolve_oauth_app().is_some();
    let service_account_available = state
        .credentials
        .resolve_service_account(user.tenant_id)
        .is_some();

    let mut conn = state.db()?;
    let token: Option<UserIntegrationToken> = user_integration_tokens::table
        .filter(user_integration_tokens::user_id.eq(user.user_id))
        .filter(user_integration_tokens::provider.eq(PROVIDER_GOOGLE_SHEETS))
        .first(&mut conn)
        .optional()?;

    Ok(Json(GoogleStatusResponse {
        configured,
        connected: token.is_some(),
        service_account_available,
        expires_at: token
            .and_then(|t| t.expires_at)
            .map(|at| at.and_utc().to_rfc3339()),
    }))
}

#[derive(Serialize)]
pub struct ConnectResponse {
    pub url: String,
}

pub async fn google_connect(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<ConnectResponse>> {
    let app = state
        .credentials
        .resolve_oauth_app()
        .ok_or_else(|| AppError::not_configured("google OAuth app is not configured"))?;

    let state_token = state
        .jwt
        .generate_state_token(user.user_id)
        .map_err(AppError::internal)?;
    let url = consent_url(app, &state_token).map_err(AppError::internal)?;
    Ok(Json(ConnectResponse { url }))
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: String,
    pub state: String,
}

pub async fn google_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    let user_id = state
        .jwt
        .verify_state_token(&query.state)
        .map_err(|_| AppError::bad_request("invalid or expired OAuth state"))?;

    let app = state
        .credentials
        .resolve_oauth_app()
        .ok_or_else(|| AppError::not_configured("google OAuth app is not configured"))?;

    let grant = state
        .google_auth
        .exchange_code(app, &query.code)
        .await
        .map_err(AppError::provider)?;

    let mut conn = state.db()?;
    tokens::upsert_token(&mut conn, user_id, &grant)?;

    info!(user_id = %user_id, "google sheets connected");
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "connected": true })),
    ))
}

pub async fn google_disconnect(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    tokens::delete_token(&mut conn, user.user_id)?;
    info!(user_id = %user.user_id, "google sheets disconnected");
    Ok(StatusCode::NO_CONTENT)
}
