use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use diesel::prelude::*;
use diesel::PgConnection;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::destination::{
    load_destination_context, resolve_destination, Destination, DestinationKind,
};
use crate::error::{AppError, AppResult};
use crate::google::provision::{
    self, CreatedUnder, ProvisionPurpose, TAB_TRANSACTIONS,
};
use crate::google::tokens::DieselTokenStore;
use crate::models::{BankAccount, CategorizationJob, NewCategorizationJob, Transaction};
use crate::schema::{bank_accounts, categorization_jobs, transactions};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateJobRequest {
    pub name: String,
    pub bank_account_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct JobResponse {
    pub id: Uuid,
    pub name: String,
    pub bank_account_id: Option<Uuid>,
    pub spreadsheet_id: Option<String>,
    pub spreadsheet_name: Option<String>,
    pub created_at: String,
}

impl From<CategorizationJob> for JobResponse {
    fn from(job: CategorizationJob) -> Self {
        Self {
            id: job.id,
            name: job.name,
            bank_account_id: job.bank_account_id,
            spreadsheet_id: job.spreadsheet_id,
            spreadsheet_name: job.spreadsheet_name,
            created_at: job.created_at.and_utc().to_rfc3339(),
        }
    }
}

pub async fn create_job(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateJobRequest>,
) -> AppResult<(StatusCode, Json<JobResponse>)> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::bad_request("job name must not be empty"));
    }

    let mut conn = state.db()?;

    if let Some(account_id) = payload.bank_account_id {
        let account: BankAccount = bank_accounts::table
            .find(account_id)
            .first(&mut conn)
            .map_err(|_| AppError::bad_request("bank account does not exist"))?;
        if account.owner_id != user.user_id {
            return Err(AppError::bad_request("bank account does not exist"));
        }
    }

    let new_job = NewCategorizationJob {
        id: Uuid::new_v4(),
        owner_id: user.user_id,
        name,
        bank_account_id: payload.bank_account_id,
    };

    diesel::insert_into(categorization_jobs::table)
        .values(&new_job)
        .execute(&mut conn)?;

    let job: CategorizationJob = categorization_jobs::table.find(new_job.id).first(&mut conn)?;
    Ok((StatusCode::CREATED, Json(job.into())))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<JobResponse>>> {
    let mut conn = state.db()?;
    let jobs: Vec<CategorizationJob> = categorization_jobs::table
        .filter(categorization_jobs::owner_id.eq(user.user_id))
        .order(categorization_jobs::created_at.desc())
        .load(&mut conn)?;
    Ok(Json(jobs.into_iter().map(JobResponse::from).collect()))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<JobResponse>> {
    let mut conn = state.db()?;
    let job = load_owned_job(&mut conn, job_id, user.user_id)?;
    Ok(Json(job.into()))
}

/// Pure report of where an export for this job would land, without performing
/// any provisioning or writes.
pub async fn get_destination(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<Destination>> {
    let mut conn = state.db()?;
    let job = load_owned_job(&mut conn, job_id, user.user_id)?;
    let ctx = load_destination_context(&mut conn, job)?;
    Ok(Json(resolve_destination(&ctx)))
}

#[derive(Deserialize)]
pub struct AssignTransactionsRequest {
    pub transaction_ids: Vec<Uuid>,
    pub category: Option<String>,
}

#[derive(Serialize)]
pub struct AssignTransactionsResponse {
    pub assigned: usize,
}

pub async fn assign_transactions(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<AssignTransactionsRequest>,
) -> AppResult<Json<AssignTransactionsResponse>> {
    let mut conn = state.db()?;
    load_owned_job(&mut conn, job_id, user.user_id)?;

    let target = transactions::table
        .filter(transactions::id.eq_any(&payload.transaction_ids))
        .filter(transactions::owner_id.eq(user.user_id));

    let assigned = match payload.category.as_deref() {
        Some(category) => diesel::update(target)
            .set((
                transactions::job_id.eq(Some(job_id)),
                transactions::category.eq(Some(category.to_string())),
            ))
            .execute(&mut conn)?,
        None => diesel::update(target)
            .set(transactions::job_id.eq(Some(job_id)))
            .execute(&mut conn)?,
    };

    Ok(Json(AssignTransactionsResponse { assigned }))
}

#[derive(Serialize)]
pub struct ExportResponse {
    pub destination_kind: DestinationKind,
    pub spreadsheet_id: String,
    pub spreadsheet_name: Option<String>,
    pub will_sync_in_place: bool,
    pub rows_exported: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_under: Option<CreatedUnder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Exports the job's categorized transactions to its resolved destination,
/// provisioning and binding a fresh spreadsheet first when no binding exists.
pub async fn export_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<ExportResponse>> {
    let mut conn = state.db()?;
    let job = load_owned_job(&mut conn, job_id, user.user_id)?;
    let job_name = job.name.clone();

    let ctx = load_destination_context(&mut conn, job)?;
    let destination = resolve_destination(&ctx);

    let rows: Vec<Transaction> = transactions::table
        .filter(transactions::job_id.eq(job_id))
        .filter(transactions::owner_id.eq(user.user_id))
        .order(transactions::posted_on.asc())
        .load(&mut conn)?;

    let mut created_under = None;
    let mut url = None;

    let (spreadsheet_id, spreadsheet_name, sync_in_place, purpose) = match destination.kind {
        DestinationKind::New => {
            // A fresh job spreadsheet acts as the human user so they stay the
            // Drive-level owner of their own export.
            let purpose = ProvisionPurpose::ActAsUser {
                user_id: user.user_id,
            };
            let mut token_store = DieselTokenStore::new(&mut conn);
            let provisioned = provision::create_spreadsheet(
                &state.credentials,
                state.google_auth.as_ref(),
                state.sheets.as_ref(),
                &mut token_store,
                purpose,
                &job_name,
            )
            .await
            .map_err(AppError::from)?;

            bind_job_spreadsheet(
                &mut conn,
                job_id,
                &provisioned.spreadsheet_id,
                &provisioned.spreadsheet_name,
            )?;

            created_under = Some(provisioned.created_under);
            url = Some(provisioned.url);
            info!(
                job_id = %job_id,
                spreadsheet_id = %provisioned.spreadsheet_id,
                "bound new spreadsheet to job"
            );
            (
                provisioned.spreadsheet_id,
                Some(provisioned.spreadsheet_name),
                true,
                purpose,
            )
        }
        DestinationKind::Job => (
            destination
                .spreadsheet_id
                .clone()
                .ok_or_else(|| AppError::internal("job destination without spreadsheet id"))?,
            destination.spreadsheet_name.clone(),
            true,
            ProvisionPurpose::ActAsUser {
                user_id: user.user_id,
            },
        ),
        DestinationKind::BankAccount | DestinationKind::Company => (
            destination
                .spreadsheet_id
                .clone()
                .ok_or_else(|| AppError::internal("shared destination without spreadsheet id"))?,
            destination.spreadsheet_name.clone(),
            false,
            // Shared account/company sheets are owned and written by the app.
            ProvisionPurpose::ServerManaged {
                tenant_id: user.tenant_id,
            },
        ),
    };

    let access_token = {
        let mut token_store = DieselTokenStore::new(&mut conn);
        let (token, _) = provision::acting_access_token(
            &state.credentials,
            state.google_auth.as_ref(),
            &mut token_store,
            purpose,
        )
        .await
        .map_err(AppError::from)?;
        token
    };
    drop(conn);

    let sheets = state.sheets.as_ref();
    provision::upgrade_template(sheets, &access_token, &spreadsheet_id)
        .await
        .map_err(AppError::from)?;

    let value_rows: Vec<Vec<String>> = rows.iter().map(transaction_row).collect();
    let row_count = value_rows.len();

    if sync_in_place {
        write_in_place(sheets, &access_token, &spreadsheet_id, value_rows).await?;
    } else {
        write_job_tab(sheets, &access_token, &spreadsheet_id, &job_name, value_rows).await?;
    }

    info!(
        job_id = %job_id,
        spreadsheet_id = %spreadsheet_id,
        rows = row_count,
        in_place = sync_in_place,
        "exported job transactions"
    );

    Ok(Json(ExportResponse {
        destination_kind: destination.kind,
        spreadsheet_id,
        spreadsheet_name,
        // Reported after binding: a first export writes its fresh sheet in
        // place even though the pre-provision resolution said otherwise.
        will_sync_in_place: sync_in_place,
        rows_exported: row_count,
        created_under,
        url,
    }))
}

/// Binds the freshly provisioned spreadsheet to the job. Guarded so a
/// concurrent export that already bound one turns into a conflict instead of
/// silently overwriting the binding.
fn bind_job_spreadsheet(
    conn: &mut PgConnection,
    job_id: Uuid,
    spreadsheet_id: &str,
    spreadsheet_name: &str,
) -> AppResult<()> {
    let updated = diesel::update(
        categorization_jobs::table
            .find(job_id)
            .filter(categorization_jobs::spreadsheet_id.is_null()),
    )
    .set((
        categorization_jobs::spreadsheet_id.eq(spreadsheet_id),
        categorization_jobs::spreadsheet_name.eq(spreadsheet_name),
        categorization_jobs::updated_at.eq(diesel::dsl::now),
    ))
    .execute(conn)?;

    if updated == 0 {
        return Err(AppError::conflict(
            "job is already bound to a spreadsheet",
        ));
    }
    Ok(())
}

async fn write_in_place(
    sheets: &dyn crate::google::sheets::SheetsApi,
    access_token: &str,
    spreadsheet_id: &str,
    value_rows: Vec<Vec<String>>,
) -> AppResult<()> {
    sheets
        .clear_range(access_token, spreadsheet_id, &format!("{TAB_TRANSACTIONS}!A2:D"))
        .await
        .map_err(AppError::provider)?;

    if value_rows.is_empty() {
        return Ok(());
    }

    let range = format!("{TAB_TRANSACTIONS}!A2:D{}", value_rows.len() + 1);
    sheets
        .write_rows(access_token, spreadsheet_id, &range, value_rows)
        .await
        .map_err(AppError::provider)?;
    Ok(())
}

/// Writes the job's rows into its own tab of a shared spreadsheet, creating
/// the tab on first export and rewriting the same tab on re-export.
async fn write_job_tab(
    sheets: &dyn crate::google::sheets::SheetsApi,
    access_token: &str,
    spreadsheet_id: &str,
    job_name: &str,
    value_rows: Vec<Vec<String>>,
) -> AppResult<()> {
    let existing = sheets
        .list_tab_titles(access_token, spreadsheet_id)
        .await
        .map_err(AppError::provider)?;

    if !existing.iter().any(|title| title == job_name) {
        sheets
            .add_tab(access_token, spreadsheet_id, job_name)
            .await
            .map_err(AppError::provider)?;
        sheets
            .write_rows(
                access_token,
                spreadsheet_id,
                &format!("{job_name}!A1:D1"),
                vec![vec![
                    "Date".to_string(),
                    "Description".to_string(),
                    "Amount".to_string(),
                    "Category".to_string(),
                ]],
            )
            .await
            .map_err(AppError::provider)?;
    }

    sheets
        .clear_range(access_token, spreadsheet_id, &format!("{job_name}!A2:D"))
        .await
        .map_err(AppError::provider)?;

    if value_rows.is_empty() {
        return Ok(());
    }

    let range = format!("{job_name}!A2:D{}", value_rows.len() + 1);
    sheets
        .write_rows(access_token, spreadsheet_id, &range, value_rows)
        .await
        .map_err(AppError::provider)?;
    Ok(())
}

fn transaction_row(tx: &Transaction) -> Vec<String> {
    vec![
        tx.posted_on.to_string(),
        tx.description.clone(),
        format_amount(tx.amount_cents),
        tx.category.clone().unwrap_or_default(),
    ]
}

fn format_amount(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

fn load_owned_job(
    conn: &mut PgConnection,
    job_id: Uuid,
    owner_id: Uuid,
) -> AppResult<CategorizationJob> {
    let job: CategorizationJob = categorization_jobs::table.find(job_id).first(conn)?;
    if job.owner_id != owner_id {
        return Err(AppError::not_found());
    }
    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::format_amount;

    #[test]
    fn formats_amounts_as_decimal_strings() {
        assert_eq!(format_amount(0), "0.00");
        assert_eq!(format_amount(5), "0.05");
        assert_eq!(format_amount(123_45), "123.45");
        assert_eq!(format_amount(-123_45), "-123.45");
        assert_eq!(format_amount(-7), "-0.07");
    }
}
