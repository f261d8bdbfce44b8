use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::google::provision::{self, ProvisionPurpose};
use crate::google::tokens::DieselTokenStore;
use crate::models::{BankAccount, CompanyProfile, NewBankAccount, NewCompanyProfile};
use crate::schema::{bank_accounts, company_profiles};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateAccountRequest {
    pub name: String,
}

#[derive(Serialize)]
pub struct AccountResponse {
    pub id: Uuid,
    pub name: String,
    pub default_spreadsheet_id: Option<String>,
    pub default_spreadsheet_name: Option<String>,
}

impl From<BankAccount> for AccountResponse {
    fn from(account: BankAccount) -> Self {
        Self {
            id: account.id,
            name: account.name,
            default_spreadsheet_id: account.default_spreadsheet_id,
            default_spreadsheet_name: account.default_spreadsheet_name,
        }
    }
}

pub async fn create_account(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateAccountRequest>,
) -> AppResult<(StatusCode, Json<AccountResponse>)> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::bad_request("account name must not be empty"));
    }

    let mut conn = state.db()?;
    let new_account = NewBankAccount {
        id: Uuid::new_v4(),
        owner_id: user.user_id,
        name,
    };

    diesel::insert_into(bank_accounts::table)
        .values(&new_account)
        .execute(&mut conn)?;

    let account: BankAccount = bank_accounts::table.find(new_account.id).first(&mut conn)?;
    Ok((StatusCode::CREATED, Json(account.into())))
}

pub async fn list_accounts(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<AccountResponse>>> {
    let mut conn = state.db()?;
    let accounts: Vec<BankAccount> = bank_accounts::table
        .filter(bank_accounts::owner_id.eq(user.user_id))
        .order(bank_accounts::created_at.asc())
        .load(&mut conn)?;
    Ok(Json(accounts.into_iter().map(AccountResponse::from).collect()))
}

#[derive(Deserialize)]
pub struct BindSpreadsheetRequest {
    pub spreadsheet_id: Option<String>,
    pub spreadsheet_name: Option<String>,
}

/// Binds an account-level default spreadsheet. With an explicit id the
/// existing spreadsheet is bound as-is; without one a fresh server-managed
/// spreadsheet is provisioned under the tenant's service account.
pub async fn bind_account_spreadsheet(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<BindSpreadsheetRequest>,
) -> AppResult<Json<AccountResponse>> {
    let mut conn = state.db()?;
    let account: BankAccount = bank_accounts::table.find(account_id).first(&mut conn)?;
    if account.owner_id != user.user_id {
        return Err(AppError::not_found());
    }

    let (spreadsheet_id, spreadsheet_name) = match payload.spreadsheet_id {
        Some(id) if !id.trim().is_empty() => (
            id.trim().to_string(),
            payload.spreadsheet_name.unwrap_or_else(|| account.name.clone()),
        ),
        _ => {
            let title = format!("{} exports", account.name);
            let provisioned = provision_server_sheet(&state, &mut conn, user.tenant_id, &title)
                .await?;
            (provisioned.0, provisioned.1)
        }
    };

    let now = Utc::now().naive_utc();
    diesel::update(bank_accounts::table.find(account_id))
        .set((
            bank_accounts::default_spreadsheet_id.eq(Some(&spreadsheet_id)),
            bank_accounts::default_spreadsheet_name.eq(Some(&spreadsheet_name)),
            bank_accounts::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    info!(
        account_id = %account_id,
        spreadsheet_id = %spreadsheet_id,
        "bound account default spreadsheet"
    );

    let account: BankAccount = bank_accounts::table.find(account_id).first(&mut conn)?;
    Ok(Json(account.into()))
}

#[derive(Serialize)]
pub struct CompanyResponse {
    pub company_name: String,
    pub master_spreadsheet_id: Option<String>,
    pub master_spreadsheet_name: Option<String>,
}

impl From<CompanyProfile> for CompanyResponse {
    fn from(profile: CompanyProfile) -> Self {
        Self {
            company_name: profile.company_name,
            master_spreadsheet_id: profile.master_spreadsheet_id,
            master_spreadsheet_name: profile.master_spreadsheet_name,
        }
    }
}

pub async fn get_company(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<CompanyResponse>> {
    let mut conn = state.db()?;
    let profile: CompanyProfile = company_profiles::table
        .find(user.user_id)
        .first(&mut conn)?;
    Ok(Json(profile.into()))
}

#[derive(Deserialize)]
pub struct UpsertCompanyRequest {
    pub company_name: String,
}

pub async fn upsert_company(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<UpsertCompanyRequest>,
) -> AppResult<Json<CompanyResponse>> {
    let company_name = payload.company_name.trim().to_string();
    if company_name.is_empty() {
        return Err(AppError::bad_request("company name must not be empty"));
    }

    let mut conn = state.db()?;
    let row = NewCompanyProfile {
        owner_id: user.user_id,
        company_name: company_name.clone(),
        master_spreadsheet_id: None,
        master_spreadsheet_name: None,
    };

    diesel::insert_into(company_profiles::table)
        .values(&row)
        .on_conflict(company_profiles::owner_id)
        .do_update()
        .set((
            company_profiles::company_name.eq(&company_name),
            company_profiles::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;

    let profile: CompanyProfile = company_profiles::table
        .find(user.user_id)
        .first(&mut conn)?;
    Ok(Json(profile.into()))
}

pub async fn bind_company_spreadsheet(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<BindSpreadsheetRequest>,
) -> AppResult<Json<CompanyResponse>> {
    let mut conn = state.db()?;
    let profile: CompanyProfile = company_profiles::table
        .find(user.user_id)
        .first(&mut conn)
        .map_err(|_| AppError::bad_request("create a company profile first"))?;

    let (spreadsheet_id, spreadsheet_name) = match payload.spreadsheet_id {
        Some(id) if !id.trim().is_empty() => (
            id.trim().to_string(),
            payload
                .spreadsheet_name
                .unwrap_or_else(|| profile.company_name.clone()),
        ),
        _ => {
            let title = format!("{} master", profile.company_name);
            provision_server_sheet(&state, &mut conn, user.tenant_id, &title).await?
        }
    };

    let now = Utc::now().naive_utc();
    diesel::update(company_profiles::table.find(user.user_id))
        .set((
            company_profiles::master_spreadsheet_id.eq(Some(&spreadsheet_id)),
            company_profiles::master_spreadsheet_name.eq(Some(&spreadsheet_name)),
            company_profiles::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    info!(
        owner_id = %user.user_id,
        spreadsheet_id = %spreadsheet_id,
        "bound company master spreadsheet"
    );

    let profile: CompanyProfile = company_profiles::table
        .find(user.user_id)
        .first(&mut conn)?;
    Ok(Json(profile.into()))
}

async fn provision_server_sheet(
    state: &AppState,
    conn: &mut PgConnection,
    tenant_id: Option<Uuid>,
    title: &str,
) -> AppResult<(String, String)> {
    let mut token_store = DieselTokenStore::new(conn);
    let provisioned = provision::create_spreadsheet(
        &state.credentials,
        state.google_auth.as_ref(),
        state.sheets.as_ref(),
        &mut token_store,
        ProvisionPurpose::ServerManaged { tenant_id },
        title,
    )
    .await
    .map_err(AppError::from)?;
    Ok((provisioned.spreadsheet_id, provisioned.spreadsheet_name))
}
