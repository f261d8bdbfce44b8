use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use url::Url;

use super::credentials::{OAuthCredentials, ServiceAccountCredentials};

pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_CONSENT_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const SHEETS_SCOPE: &str =
    "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive.file";

const HTTP_TIMEOUT_SECONDS: u64 = 15;

/// Raw token grant as the provider returns it. `refresh_token` is optional
/// because providers may omit it on refresh grants.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

#[async_trait]
pub trait GoogleAuthClient: Send + Sync + 'static {
    async fn exchange_code(&self, app: &OAuthCredentials, code: &str) -> Result<TokenGrant>;

    async fn refresh_token(
        &self,
        app: &OAuthCredentials,
        refresh_token: &str,
    ) -> Result<TokenGrant>;

    async fn service_account_token(
        &self,
        credentials: &ServiceAccountCredentials,
        scope: &str,
    ) -> Result<TokenGrant>;
}

/// Builds the user-facing consent URL for the OAuth flow. `access_type=offline`
/// with explicit consent is what makes Google hand out a refresh token.
pub fn consent_url(app: &OAuthCredentials, state: &str) -> Result<String> {
    let mut url = Url::parse(GOOGLE_CONSENT_URL).context("invalid consent base URL")?;
    url.query_pairs_mut()
        .append_pair("client_id", &app.client_id)
        .append_pair("redirect_uri", &app.redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", SHEETS_SCOPE)
        .append_pair("access_type", "offline")
        .append_pair("prompt", "consent")
        .append_pair("state", state);
    Ok(url.to_string())
}

pub struct HttpGoogleAuthClient {
    http: reqwest::Client,
    token_url: String,
}

impl HttpGoogleAuthClient {
    pub fn new() -> Result<Self> {
        Self::with_token_url(GOOGLE_TOKEN_URL)
    }

    pub fn with_token_url(token_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECONDS))
            .build()
            .context("failed to build google auth HTTP client")?;
        Ok(Self {
            http,
            token_url: token_url.into(),
        })
    }

    async fn post_token_request(&self, form: &[(&str, &str)]) -> Result<TokenGrant> {
        let response = self
            .http
            .post(&self.token_url)
            .form(form)
            .send()
            .await
            .context("google token request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("google token endpoint returned {status}: {body}");
        }

        response
            .json::<TokenGrant>()
            .await
            .context("failed to parse google token response")
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[async_trait]
impl GoogleAuthClient for HttpGoogleAuthClient {
    async fn exchange_code(&self, app: &OAuthCredentials, code: &str) -> Result<TokenGrant> {
        self.post_token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", &app.client_id),
            ("client_secret", &app.client_secret),
            ("redirect_uri", &app.redirect_uri),
        ])
        .await
    }

    async fn refresh_token(
        &self,
        app: &OAuthCredentials,
        refresh_token: &str,
    ) -> Result<TokenGrant> {
        self.post_token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &app.client_id),
            ("client_secret", &app.client_secret),
        ])
        .await
    }

    async fn service_account_token(
        &self,
        credentials: &ServiceAccountCredentials,
        scope: &str,
    ) -> Result<TokenGrant> {
        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &credentials.email,
            scope,
            aud: &self.token_url,
            iat: now,
            exp: now + 3600,
        };

        let key = EncodingKey::from_rsa_pem(credentials.private_key.as_bytes())
            .context("service account private key is not valid RSA PEM")?;
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &key)
            .context("failed to sign service account assertion")?;

        self.post_token_request(&[
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", &assertion),
        ])
        .await
    }
}
