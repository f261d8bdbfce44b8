use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub tenant_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub tenant_id: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = documents)]
pub struct Document {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub original_name: String,
    pub content_type: Option<String>,
    pub checksum: String,
    pub size_bytes: i64,
    pub storage_tier: String,
    pub hot_path: Option<String>,
    pub archive_path: Option<String>,
    pub metadata: serde_json::Value,
    pub uploaded_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub deleted_at: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = documents)]
pub struct NewDocument {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub original_name: String,
    pub content_type: Option<String>,
    pub checksum: String,
    pub size_bytes: i64,
    pub storage_tier: String,
    pub hot_path: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = categorization_jobs)]
pub struct CategorizationJob {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub bank_account_id: Option<Uuid>,
    pub spreadsheet_id: Option<String>,
    pub spreadsheet_name: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = categorization_jobs)]
pub struct NewCategorizationJob {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub bank_account_id: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = bank_accounts)]
pub struct BankAccount {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub default_spreadsheet_id: Option<String>,
    pub default_spreadsheet_name: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = bank_accounts)]
pub struct NewBankAccount {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = company_profiles)]
#[diesel(primary_key(owner_id))]
pub struct CompanyProfile {
    pub owner_id: Uuid,
    pub company_name: String,
    pub master_spreadsheet_id: Option<String>,
    pub master_spreadsheet_name: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = company_profiles)]
pub struct NewCompanyProfile {
    pub owner_id: Uuid,
    pub company_name: String,
    pub master_spreadsheet_id: Option<String>,
    pub master_spreadsheet_name: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = transactions)]
#[diesel(belongs_to(Document))]
pub struct Transaction {
    pub id: Uuid,
    pub document_id: Uuid,
    pub job_id: Option<Uuid>,
    pub owner_id: Uuid,
    pub posted_on: NaiveDate,
    pub description: String,
    pub amount_cents: i64,
    pub category: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = transactions)]
pub struct NewTransaction {
    pub id: Uuid,
    pub document_id: Uuid,
    pub job_id: Option<Uuid>,
    pub owner_id: Uuid,
    pub posted_on: NaiveDate,
    pub description: String,
    pub amount_cents: i64,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = user_integration_tokens)]
pub struct UserIntegrationToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = user_integration_tokens)]
pub struct NewUserIntegrationToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = tenant_credentials)]
pub struct TenantCredential {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub service_account_email: String,
    pub service_account_private_key: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = tenant_credentials)]
pub struct NewTenantCredential {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub service_account_email: String,
    pub service_account_private_key: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub run_after: NaiveDateTime,
    pub last_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJob {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub run_after: NaiveDateTime,
}
