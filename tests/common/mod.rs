use std::collections::HashMap;
use std::env;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::{anyhow, bail, ensure, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use fintake::auth::jwt::JwtService;
use fintake::config::AppConfig;
use fintake::db::{self, PgPool};
use fintake::google::credentials::{CredentialStore, OAuthCredentials, ServiceAccountCredentials};
use fintake::google::oauth::{GoogleAuthClient, TokenGrant};
use fintake::google::sheets::{SheetsApi, SpreadsheetInfo};
use fintake::models::{Job, NewUser};
use fintake::routes;
use fintake::state::AppState;
use fintake::storage::ObjectStorage;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use serde::Serialize;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[allow(dead_code)]
#[derive(Clone)]
pub struct StoredObject {
    pub path: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, StoredObject>>,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn put_object(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<()> {
        let stored = StoredObject {
            path: path.to_string(),
            bytes,
            content_type,
        };
        let mut guard = self.objects.lock().await;
        guard.insert(stored.path.clone(), stored);
        Ok(())
    }

    async fn create_signed_url(&self, path: &str, expires_in: Duration) -> Result<String> {
        let guard = self.objects.lock().await;
        ensure!(guard.contains_key(path), "object {path} missing");
        Ok(format!(
            "https://fake-storage/{path}?expires_in={}",
            expires_in.as_secs()
        ))
    }

    async fn get_object(&self, path: &str) -> Result<Vec<u8>> {
        let guard = self.objects.lock().await;
        guard
            .get(path)
            .map(|obj| obj.bytes.clone())
            .ok_or_else(|| anyhow!("object {path} missing"))
    }

    async fn remove_object(&self, path: &str) -> Result<()> {
        let mut guard = self.objects.lock().await;
        guard.remove(path);
        Ok(())
    }
}

impl FakeStorage {
    #[allow(dead_code)]
    pub async fn get(&self, path: &str) -> Option<StoredObject> {
        let guard = self.objects.lock().await;
        guard.get(path).cloned()
    }

    #[allow(dead_code)]
    pub async fn object_count(&self) -> usize {
        let guard = self.objects.lock().await;
        guard.len()
    }
}

/// In-memory spreadsheet provider. Spreadsheets are tab-title lists; writes
/// and clears are recorded so tests can assert on them.
#[derive(Default)]
pub struct FakeSheets {
    tabs: StdMutex<HashMap<String, Vec<String>>>,
    writes: StdMutex<Vec<(String, String)>>,
    created: StdMutex<usize>,
}

impl FakeSheets {
    #[allow(dead_code)]
    pub fn seed_spreadsheet(&self, id: &str, tabs: &[&str]) {
        self.tabs
            .lock()
            .unwrap()
            .insert(id.to_string(), tabs.iter().map(|t| t.to_string()).collect());
    }

    #[allow(dead_code)]
    pub fn tab_titles(&self, id: &str) -> Vec<String> {
        self.tabs.lock().unwrap().get(id).cloned().unwrap_or_default()
    }

    #[allow(dead_code)]
    pub fn created_count(&self) -> usize {
        *self.created.lock().unwrap()
    }

    #[allow(dead_code)]
    pub fn writes(&self) -> Vec<(String, String)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl SheetsApi for FakeSheets {
    async fn create_spreadsheet(
        &self,
        _access_token: &str,
        title: &str,
    ) -> Result<SpreadsheetInfo> {
        let mut created = self.created.lock().unwrap();
        *created += 1;
        let id = format!("sheet-{}", *created);
        self.tabs
            .lock()
            .unwrap()
            .insert(id.clone(), vec!["Sheet1".to_string()]);
        Ok(SpreadsheetInfo {
            url: format!("https://docs.google.com/spreadsheets/d/{id}"),
            spreadsheet_id: id,
            title: title.to_string(),
        })
    }

    async fn list_tab_titles(
        &self,
        _access_token: &str,
        spreadsheet_id: &str,
    ) -> Result<Vec<String>> {
        let tabs = self.tabs.lock().unwrap();
        tabs.get(spreadsheet_id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown spreadsheet {spreadsheet_id}"))
    }

    async fn add_tab(&self, _access_token: &str, spreadsheet_id: &str, title: &str) -> Result<()> {
        let mut tabs = self.tabs.lock().unwrap();
        let entry = tabs
            .get_mut(spreadsheet_id)
            .ok_or_else(|| anyhow!("unknown spreadsheet {spreadsheet_id}"))?;
        if entry.iter().any(|t| t == title) {
            bail!("duplicate tab {title}");
        }
        entry.push(title.to_string());
        Ok(())
    }

    async fn write_rows(
        &self,
        _access_token: &str,
        spreadsheet_id: &str,
        range: &str,
        _rows: Vec<Vec<String>>,
    ) -> Result<()> {
        let tabs = self.tabs.lock().unwrap();
        ensure!(
            tabs.contains_key(spreadsheet_id),
            "unknown spreadsheet {spreadsheet_id}"
        );
        drop(tabs);
        self.writes
            .lock()
            .unwrap()
            .push((spreadsheet_id.to_string(), range.to_string()));
        Ok(())
    }

    async fn clear_range(
        &self,
        _access_token: &str,
        spreadsheet_id: &str,
        _range: &str,
    ) -> Result<()> {
        let tabs = self.tabs.lock().unwrap();
        ensure!(
            tabs.contains_key(spreadsheet_id),
            "unknown spreadsheet {spreadsheet_id}"
        );
        Ok(())
    }
}

/// Token endpoint stand-in. Every grant succeeds with a recognizable token so
/// assertions can tell which identity acted.
pub struct FakeGoogleAuth;

#[async_trait]
impl GoogleAuthClient for FakeGoogleAuth {
    async fn exchange_code(&self, _app: &OAuthCredentials, code: &str) -> Result<TokenGrant> {
        Ok(TokenGrant {
            access_token: format!("access-for-{code}"),
            refresh_token: Some(format!("refresh-for-{code}")),
            expires_in: Some(3600),
        })
    }

    async fn refresh_token(
        &self,
        _app: &OAuthCredentials,
        _refresh_token: &str,
    ) -> Result<TokenGrant> {
        Ok(TokenGrant {
            access_token: "refreshed-access".to_string(),
            refresh_token: None,
            expires_in: Some(3600),
        })
    }

    async fn service_account_token(
        &self,
        credentials: &ServiceAccountCredentials,
        _scope: &str,
    ) -> Result<TokenGrant> {
        Ok(TokenGrant {
            access_token: format!("sa-token-for-{}", credentials.email),
            refresh_token: None,
            expires_in: Some(3600),
        })
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    storage: Arc<FakeStorage>,
    sheets: Arc<FakeSheets>,
}

impl TestApp {
    /// Full app with the Google OAuth app and a default service account
    /// configured.
    pub async fn new() -> Result<Self> {
        Self::with_google(true).await
    }

    /// App with no Google credentials at all, for exercising degraded status
    /// reporting and `not_configured` paths.
    #[allow(dead_code)]
    pub async fn new_unconfigured() -> Result<Self> {
        Self::with_google(false).await
    }

    async fn with_google(google_configured: bool) -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            cors_allowed_origin: None,
            aws_endpoint_url: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_region: "us-east-1".to_string(),
            s3_hot_bucket: "test-hot-bucket".to_string(),
            google_client_id: google_configured.then(|| "test-client".to_string()),
            google_client_secret: google_configured.then(|| "test-secret".to_string()),
            google_redirect_uri: google_configured
                .then(|| "https://portal.test/callback".to_string()),
            google_service_account_email: google_configured.then(|| "app@sa.test".to_string()),
            google_service_account_key: google_configured.then(|| "test-key".to_string()),
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let storage = Arc::new(FakeStorage::default());
        let storage_for_state: Arc<dyn ObjectStorage> = storage.clone();
        let sheets = Arc::new(FakeSheets::default());
        let sheets_for_state: Arc<dyn SheetsApi> = sheets.clone();
        let google_auth: Arc<dyn GoogleAuthClient> = Arc::new(FakeGoogleAuth);
        let credentials = Arc::new(CredentialStore::from_config(&config));
        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(
            pool.clone(),
            config,
            storage_for_state,
            sheets_for_state,
            google_auth,
            credentials,
            jwt,
        );
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            router,
            storage,
            sheets,
        })
    }

    pub async fn cleanup(&self) -> Result<()> {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get cleanup connection: {err}"))?;
            truncate_all(&mut conn)?;
            Ok(())
        })
        .await
        .context("cleanup task panicked")?
    }

    #[allow(dead_code)]
    pub fn storage(&self) -> Arc<FakeStorage> {
        self.storage.clone()
    }

    #[allow(dead_code)]
    pub fn sheets(&self) -> Arc<FakeSheets> {
        self.sheets.clone()
    }

    pub async fn insert_user(&self, username: &str, password: &str, role: &str) -> Result<Uuid> {
        self.insert_tenant_user(username, password, role, None).await
    }

    pub async fn insert_tenant_user(
        &self,
        username: &str,
        password: &str,
        role: &str,
        tenant_id: Option<Uuid>,
    ) -> Result<Uuid> {
        let username = username.to_string();
        let password = password.to_string();
        let role = role.to_string();
        self.with_conn(move |conn| {
            let password_hash = hash_password(&password)?;
            let user = NewUser {
                id: Uuid::new_v4(),
                username,
                password_hash,
                role,
                tenant_id,
            };
            diesel::insert_into(fintake::schema::users::table)
                .values(&user)
                .execute(conn)
                .context("failed to insert user")?;
            Ok(user.id)
        })
        .await
    }

    /// Links the user to Google Sheets directly at the storage layer, as a
    /// completed OAuth exchange would have.
    #[allow(dead_code)]
    pub async fn connect_google(&self, user_id: Uuid) -> Result<()> {
        self.with_conn(move |conn| {
            let row = fintake::models::NewUserIntegrationToken {
                id: Uuid::new_v4(),
                user_id,
                provider: fintake::google::tokens::PROVIDER_GOOGLE_SHEETS.to_string(),
                access_token: "user-access".to_string(),
                refresh_token: "user-refresh".to_string(),
                expires_at: None,
            };
            diesel::insert_into(fintake::schema::user_integration_tokens::table)
                .values(&row)
                .execute(conn)
                .context("failed to insert integration token")?;
            Ok(())
        })
        .await
    }

    pub async fn login_token(&self, username: &str, password: &str) -> Result<String> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            username: &'a str,
            password: &'a str,
        }

        let response = self
            .post_json(
                "/api/auth/login",
                &LoginPayload { username, password },
                None,
            )
            .await?;

        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        let body = body_to_vec(response.into_body()).await?;
        #[derive(serde::Deserialize)]
        struct LoginResponse {
            access_token: String,
        }
        let parsed: LoginResponse = serde_json::from_slice(&body)?;
        Ok(parsed.access_token)
    }

    #[allow(dead_code)]
    pub async fn jobs_by_type(&self, ty: &str) -> Result<Vec<Job>> {
        let ty = ty.to_string();
        self.with_conn(move |conn| {
            use fintake::schema::jobs::dsl::{job_type as job_type_col, jobs as jobs_table};
            let rows = jobs_table
                .filter(job_type_col.eq(&ty))
                .load::<Job>(conn)
                .context("failed to load jobs")?;
            Ok(rows)
        })
        .await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, payload, token).await
    }

    #[allow(dead_code)]
    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PATCH, path, payload, token).await
    }

    #[allow(dead_code)]
    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PUT, path, payload, token).await
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let builder = Request::builder().method(Method::DELETE).uri(path);
        let builder = if let Some(token) = token {
            builder.header("authorization", format!("Bearer {token}"))
        } else {
            builder
        };
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn upload_document(
        &self,
        filename: &str,
        content_type: &str,
        data: &[u8],
        token: &str,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        body.extend(format!("--{boundary}\r\n").as_bytes());
        body.extend(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                filename
            )
            .as_bytes(),
        );
        body.extend(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend(data);
        body.extend(b"\r\n");
        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let builder = Request::builder()
            .method(Method::POST)
            .uri("/api/documents")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header("authorization", format!("Bearer {token}"));

        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

pub async fn body_to_json(body: Body) -> Result<serde_json::Value> {
    let bytes = body_to_vec(body).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE transactions, user_integration_tokens, tenant_credentials, \
         categorization_jobs, bank_accounts, company_profiles, documents, jobs, users \
         RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}

fn hash_password(password: &str) -> Result<String> {
    use argon2::password_hash::{PasswordHasher, SaltString};
    use argon2::Argon2;

    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?
        .to_string())
}
