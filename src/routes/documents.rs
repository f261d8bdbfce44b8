use axum::extract::{Json, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::jobs::{enqueue_job, JOB_EXTRACT_TRANSACTIONS};
use crate::models::{Document, NewDocument, Transaction};
use crate::schema::{documents, transactions};
use crate::state::AppState;
use crate::tiering::{self, DownloadResolution, UnavailableKind, TIER_HOT};

#[derive(Deserialize)]
pub struct DocumentListQuery {
    #[serde(default)]
    pub include_deleted: bool,
    pub tier: Option<String>,
}

#[derive(Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub original_name: String,
    pub content_type: Option<String>,
    pub checksum: String,
    pub size_bytes: i64,
    pub storage_tier: String,
    pub metadata: Value,
    pub uploaded_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            original_name: doc.original_name,
            content_type: doc.content_type,
            checksum: doc.checksum,
            size_bytes: doc.size_bytes,
            storage_tier: doc.storage_tier,
            metadata: doc.metadata,
            uploaded_at: doc.uploaded_at.and_utc().to_rfc3339(),
            updated_at: doc.updated_at.and_utc().to_rfc3339(),
            deleted_at: doc.deleted_at.map(|at| at.and_utc().to_rfc3339()),
        }
    }
}

#[derive(Serialize)]
pub struct DocumentDetailResponse {
    pub document: DocumentResponse,
}

#[derive(Serialize)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub document_id: Uuid,
    pub job_id: Option<Uuid>,
    pub posted_on: String,
    pub description: String,
    pub amount_cents: i64,
    pub category: Option<String>,
}

impl From<Transaction> for TransactionResponse {
    fn from(tx: Transaction) -> Self {
        Self {
            id: tx.id,
            document_id: tx.document_id,
            job_id: tx.job_id,
            posted_on: tx.posted_on.to_string(),
            description: tx.description,
            amount_cents: tx.amount_cents,
            category: tx.category,
        }
    }
}

pub async fn upload_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DocumentDetailResponse>)> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut original_name: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut metadata: Value = Value::Object(Default::default());

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("file") => {
                original_name = field.file_name().map(|n| n.to_string());
                content_type = field.content_type().map(|mime| mime.to_string());
                let data = field.bytes().await.map_err(|err| {
                    error!(error = %err, "failed to read file bytes");
                    AppError::bad_request(format!("failed to read file bytes: {err}"))
                })?;
                file_bytes = Some(data.to_vec());
            }
            Some("metadata") => {
                let value = field.text().await.map_err(|err| {
                    AppError::bad_request(format!("invalid metadata: {err}"))
                })?;
                metadata = serde_json::from_str(&value).map_err(|err| {
                    AppError::bad_request(format!("metadata must be valid JSON: {err}"))
                })?;
            }
            _ => {}
        }
    }

    let file_bytes =
        file_bytes.ok_or_else(|| AppError::bad_request("file field is required"))?;
    if file_bytes.is_empty() {
        return Err(AppError::bad_request("file field must not be empty"));
    }
    let original_name =
        original_name.ok_or_else(|| AppError::bad_request("filename is required"))?;

    let document_id = Uuid::new_v4();
    let checksum = hex::encode(Sha256::digest(&file_bytes));
    let size_bytes = file_bytes.len() as i64;
    let hot_path = format!("hot/{}/{}", user.user_id, document_id);

    state
        .storage
        .put_object(&hot_path, file_bytes, content_type.clone())
        .await
        .map_err(AppError::provider)?;

    let new_document = NewDocument {
        id: document_id,
        owner_id: user.user_id,
        tenant_id: user.tenant_id,
        original_name: original_name.clone(),
        content_type,
        checksum,
        size_bytes,
        storage_tier: TIER_HOT.to_string(),
        hot_path: Some(hot_path),
        metadata,
    };

    let mut conn = state.db()?;
    diesel::insert_into(documents::table)
        .values(&new_document)
        .execute(&mut conn)?;

    // Fire-and-forget: extraction is kicked off through the persisted queue and
    // its failure never fails the upload itself.
    match enqueue_job(
        &mut conn,
        JOB_EXTRACT_TRANSACTIONS,
        json!({ "document_id": document_id }),
        None,
    ) {
        Ok(job) => info!(
            document_id = %document_id,
            job_id = %job.id,
            "queued transaction extraction"
        ),
        Err(err) => warn!(
            document_id = %document_id,
            error = %err,
            "failed to queue transaction extraction; document stored without it"
        ),
    }

    let doc: Document = documents::table.find(document_id).first(&mut conn)?;

    info!(
        document_id = %document_id,
        original_name = %original_name,
        "document upload succeeded"
    );

    Ok((
        StatusCode::CREATED,
        Json(DocumentDetailResponse {
            document: doc.into(),
        }),
    ))
}

pub async fn list_documents(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<DocumentListQuery>,
) -> AppResult<Json<Vec<DocumentResponse>>> {
    let mut conn = state.db()?;

    let mut docs_query = documents::table
        .filter(documents::owner_id.eq(user.user_id))
        .order(documents::uploaded_at.desc())
        .into_boxed();

    if !query.include_deleted {
        docs_query = docs_query.filter(documents::deleted_at.is_null());
    }
    if let Some(tier) = query.tier.as_deref() {
        docs_query = docs_query.filter(documents::storage_tier.eq(tier.to_string()));
    }

    let docs: Vec<Document> = docs_query.load(&mut conn)?;
    Ok(Json(docs.into_iter().map(DocumentResponse::from).collect()))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<DocumentDetailResponse>> {
    let mut conn = state.db()?;
    let doc = load_owned_document(&mut conn, document_id, user.user_id)?;
    if doc.deleted_at.is_some() {
        return Err(AppError::not_found());
    }
    Ok(Json(DocumentDetailResponse {
        document: doc.into(),
    }))
}

#[derive(Serialize)]
pub struct DownloadReadyResponse {
    pub status: &'static str,
    pub url: String,
    pub expires_in: u64,
    pub filename: String,
}

pub async fn download_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Response> {
    let mut conn = state.db()?;
    let doc = load_owned_document(&mut conn, document_id, user.user_id)?;
    drop(conn);

    match tiering::resolve_download(&doc, state.storage.as_ref()).await {
        DownloadResolution::Redirect { url, expires_in } => Ok((
            StatusCode::OK,
            Json(DownloadReadyResponse {
                status: "ready",
                url,
                expires_in,
                filename: doc.original_name,
            }),
        )
            .into_response()),
        DownloadResolution::RestoreRequired => Ok((
            StatusCode::ACCEPTED,
            Json(json!({
                "status": "restore_required",
                "detail": "document is archived; request a restore and retry later",
            })),
        )
            .into_response()),
        DownloadResolution::Unavailable { kind } => match kind {
            UnavailableKind::NotFound => Err(AppError::not_found()),
            UnavailableKind::ProviderError => {
                Err(AppError::provider("hot storage could not sign the download"))
            }
        },
    }
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    let doc = load_owned_document(&mut conn, document_id, user.user_id)?;
    if doc.deleted_at.is_some() {
        return Ok(StatusCode::NO_CONTENT);
    }

    let now = Utc::now().naive_utc();
    diesel::update(documents::table.find(document_id))
        .set((
            documents::deleted_at.eq(Some(now)),
            documents::updated_at.eq(now),
        ))
        .execute(&mut conn)?;
    drop(conn);

    // Best effort; the soft delete already hides the document.
    if let Some(hot_path) = doc.hot_path.as_deref() {
        if let Err(err) = state.storage.remove_object(hot_path).await {
            warn!(document_id = %document_id, error = %err, "failed to remove hot object");
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_document_transactions(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<TransactionResponse>>> {
    let mut conn = state.db()?;
    let doc = load_owned_document(&mut conn, document_id, user.user_id)?;
    if doc.deleted_at.is_some() {
        return Err(AppError::not_found());
    }

    let rows: Vec<Transaction> = transactions::table
        .filter(transactions::document_id.eq(document_id))
        .order(transactions::posted_on.asc())
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(TransactionResponse::from).collect()))
}

fn load_owned_document(
    conn: &mut diesel::PgConnection,
    document_id: Uuid,
    owner_id: Uuid,
) -> AppResult<Document> {
    let doc: Document = documents::table.find(document_id).first(conn)?;
    if doc.owner_id != owner_id {
        return Err(AppError::not_found());
    }
    Ok(doc)
}
