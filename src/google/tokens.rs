use anyhow::Context;
use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use super::credentials::OAuthCredentials;
use super::oauth::{GoogleAuthClient, TokenGrant};
use crate::error::AppError;
use crate::models::{NewUserIntegrationToken, UserIntegrationToken};
use crate::schema::user_integration_tokens;

pub const PROVIDER_GOOGLE_SHEETS: &str = "google_sheets";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("google sheets is not connected for this user")]
    NotConnected,
    #[error("google sheets authorization is no longer valid, reconnect required")]
    ReconnectRequired,
    #[error("token storage error: {0}")]
    Store(#[source] anyhow::Error),
}

impl From<TokenError> for AppError {
    fn from(value: TokenError) -> Self {
        match value {
            TokenError::NotConnected => AppError::not_connected(value.to_string()),
            TokenError::ReconnectRequired => AppError::reconnect_required(value.to_string()),
            TokenError::Store(err) => AppError::internal(err),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<NaiveDateTime>,
}

/// Persistence seam for a user's integration token row. The production store
/// is a diesel connection; tests use an in-memory fake. `Send` because the
/// store crosses await points inside request handlers.
pub trait TokenStore: Send {
    fn load(&mut self, user_id: Uuid) -> anyhow::Result<Option<StoredToken>>;

    /// Persists a refreshed grant. `refresh_token` is only replaced when the
    /// provider handed out a new one.
    fn save(
        &mut self,
        user_id: Uuid,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<NaiveDateTime>,
    ) -> anyhow::Result<()>;
}

/// Returns an access token that is valid right now.
///
/// A token with no expiry or a future expiry is returned unchanged. An expired
/// token gets exactly one refresh attempt; on success the new grant is
/// persisted (last write wins under concurrent refreshes), on failure the
/// integration is reported as requiring a reconnect. A failed refresh token is
/// assumed revoked, so retrying would only mask a state that needs explicit
/// user action.
pub async fn get_valid_access_token(
    store: &mut dyn TokenStore,
    auth: &dyn GoogleAuthClient,
    app: &OAuthCredentials,
    user_id: Uuid,
) -> Result<String, TokenError> {
    let stored = store
        .load(user_id)
        .map_err(TokenError::Store)?
        .ok_or(TokenError::NotConnected)?;

    if !is_stale(stored.expires_at, Utc::now().naive_utc()) {
        return Ok(stored.access_token);
    }

    let grant = match auth.refresh_token(app, &stored.refresh_token).await {
        Ok(grant) => grant,
        Err(err) => {
            warn!(user_id = %user_id, error = %err, "google token refresh failed");
            return Err(TokenError::ReconnectRequired);
        }
    };

    let expires_at = expiry_from_grant(&grant);
    store
        .save(
            user_id,
            &grant.access_token,
            grant.refresh_token.as_deref(),
            expires_at,
        )
        .map_err(TokenError::Store)?;

    Ok(grant.access_token)
}

fn is_stale(expires_at: Option<NaiveDateTime>, now: NaiveDateTime) -> bool {
    matches!(expires_at, Some(at) if at <= now)
}

pub fn expiry_from_grant(grant: &TokenGrant) -> Option<NaiveDateTime> {
    grant
        .expires_in
        .map(|seconds| (Utc::now() + ChronoDuration::seconds(seconds)).naive_utc())
}

/// Inserts or replaces the user's google_sheets token row after a completed
/// OAuth code exchange.
pub fn upsert_token(
    conn: &mut PgConnection,
    user_id: Uuid,
    grant: &TokenGrant,
) -> Result<(), diesel::result::Error> {
    let refresh_token = grant.refresh_token.clone().unwrap_or_default();
    let expires_at = expiry_from_grant(grant);
    let now = Utc::now().naive_utc();

    let row = NewUserIntegrationToken {
        id: Uuid::new_v4(),
        user_id,
        provider: PROVIDER_GOOGLE_SHEETS.to_string(),
        access_token: grant.access_token.clone(),
        refresh_token,
        expires_at,
    };

    diesel::insert_into(user_integration_tokens::table)
        .values(&row)
        .on_conflict((
            user_integration_tokens::user_id,
            user_integration_tokens::provider,
        ))
        .do_update()
        .set((
            user_integration_tokens::access_token.eq(&row.access_token),
            user_integration_tokens::refresh_token.eq(&row.refresh_token),
            user_integration_tokens::expires_at.eq(row.expires_at),
            user_integration_tokens::updated_at.eq(now),
        ))
        .execute(conn)?;

    Ok(())
}

pub fn delete_token(conn: &mut PgConnection, user_id: Uuid) -> Result<(), diesel::result::Error> {
    diesel::delete(
        user_integration_tokens::table
            .filter(user_integration_tokens::user_id.eq(user_id))
            .filter(user_integration_tokens::provider.eq(PROVIDER_GOOGLE_SHEETS)),
    )
    .execute(conn)?;
    Ok(())
}

pub struct DieselTokenStore<'a> {
    conn: &'a mut PgConnection,
}

impl<'a> DieselTokenStore<'a> {
    pub fn new(conn: &'a mut PgConnection) -> Self {
        Self { conn }
    }
}

impl TokenStore for DieselTokenStore<'_> {
    fn load(&mut self, user_id: Uuid) -> anyhow::Result<Option<StoredToken>> {
        let row: Option<UserIntegrationToken> = user_integration_tokens::table
            .filter(user_integration_tokens::user_id.eq(user_id))
            .filter(user_integration_tokens::provider.eq(PROVIDER_GOOGLE_SHEETS))
            .first(self.conn)
            .optional()
            .context("failed to load integration token")?;

        Ok(row.map(|row| StoredToken {
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            expires_at: row.expires_at,
        }))
    }

    fn save(
        &mut self,
        user_id: Uuid,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<NaiveDateTime>,
    ) -> anyhow::Result<()> {
        let now = Utc::now().naive_utc();
        let target = user_integration_tokens::table
            .filter(user_integration_tokens::user_id.eq(user_id))
            .filter(user_integration_tokens::provider.eq(PROVIDER_GOOGLE_SHEETS));

        // One atomic row update; the refresh token column is only touched when
        // the provider issued a replacement.
        match refresh_token {
            Some(refresh_token) => diesel::update(target)
                .set((
                    user_integration_tokens::access_token.eq(access_token),
                    user_integration_tokens::refresh_token.eq(refresh_token),
                    user_integration_tokens::expires_at.eq(expires_at),
                    user_integration_tokens::updated_at.eq(now),
                ))
                .execute(self.conn),
            None => diesel::update(target)
                .set((
                    user_integration_tokens::access_token.eq(access_token),
                    user_integration_tokens::expires_at.eq(expires_at),
                    user_integration_tokens::updated_at.eq(now),
                ))
                .execute(self.conn),
        }
        .context("failed to persist refreshed token")?;

        Ok(())
    }
}
