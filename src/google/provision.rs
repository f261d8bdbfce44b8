use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use super::credentials::CredentialStore;
use super::oauth::{GoogleAuthClient, SHEETS_SCOPE};
use super::sheets::{SheetsApi, SpreadsheetInfo};
use super::tokens::{get_valid_access_token, TokenError, TokenStore};
use crate::error::AppError;

pub const TAB_TRANSACTIONS: &str = "Transactions";
pub const TAB_SUMMARY: &str = "Summary";

const REQUIRED_TABS: &[&str] = &[TAB_TRANSACTIONS, TAB_SUMMARY];

/// Which identity a spreadsheet is created under. Downstream permission checks
/// depend on this: service-account files are owned by the app, user-OAuth
/// files stay owned by the human in their own Drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreatedUnder {
    ServiceAccount,
    UserOauth,
}

/// What the new spreadsheet is for, which in turn selects the acting
/// credential: server-managed scopes must stay writable by the app without a
/// human in the loop, act-as-user scopes must leave the user as Drive owner.
#[derive(Debug, Clone, Copy)]
pub enum ProvisionPurpose {
    ServerManaged { tenant_id: Option<Uuid> },
    ActAsUser { user_id: Uuid },
}

#[derive(Debug, Clone, Serialize)]
pub struct Provisioned {
    pub spreadsheet_id: String,
    pub spreadsheet_name: String,
    pub url: String,
    pub created_under: CreatedUnder,
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("no usable google credential is configured")]
    NotConfigured,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("google API call failed: {0}")]
    Provider(#[source] anyhow::Error),
}

impl From<ProvisionError> for AppError {
    fn from(value: ProvisionError) -> Self {
        match value {
            ProvisionError::NotConfigured => AppError::not_configured(value.to_string()),
            ProvisionError::Token(err) => err.into(),
            ProvisionError::Provider(err) => AppError::provider(err),
        }
    }
}

/// Resolves the access token matching the purpose. Credential absence is
/// `NotConfigured`; a user who never linked Google surfaces as
/// `NotConnected` through the token path.
pub async fn acting_access_token(
    credentials: &CredentialStore,
    auth: &dyn GoogleAuthClient,
    token_store: &mut dyn TokenStore,
    purpose: ProvisionPurpose,
) -> Result<(String, CreatedUnder), ProvisionError> {
    match purpose {
        ProvisionPurpose::ServerManaged { tenant_id } => {
            let service_account = credentials
                .resolve_service_account(tenant_id)
                .ok_or(ProvisionError::NotConfigured)?;
            let grant = auth
                .service_account_token(service_account, SHEETS_SCOPE)
                .await
                .map_err(ProvisionError::Provider)?;
            Ok((grant.access_token, CreatedUnder::ServiceAccount))
        }
        ProvisionPurpose::ActAsUser { user_id } => {
            let app = credentials
                .resolve_oauth_app()
                .ok_or(ProvisionError::NotConfigured)?;
            let access_token = get_valid_access_token(token_store, auth, app, user_id).await?;
            Ok((access_token, CreatedUnder::UserOauth))
        }
    }
}

/// Creates a spreadsheet under the purpose-selected credential and applies the
/// export template to it.
pub async fn create_spreadsheet(
    credentials: &CredentialStore,
    auth: &dyn GoogleAuthClient,
    sheets: &dyn SheetsApi,
    token_store: &mut dyn TokenStore,
    purpose: ProvisionPurpose,
    title: &str,
) -> Result<Provisioned, ProvisionError> {
    let (access_token, created_under) =
        acting_access_token(credentials, auth, token_store, purpose).await?;

    let info: SpreadsheetInfo = sheets
        .create_spreadsheet(&access_token, title)
        .await
        .map_err(ProvisionError::Provider)?;

    upgrade_template(sheets, &access_token, &info.spreadsheet_id).await?;

    info!(
        spreadsheet_id = %info.spreadsheet_id,
        created_under = ?created_under,
        "provisioned spreadsheet"
    );

    Ok(Provisioned {
        spreadsheet_id: info.spreadsheet_id,
        spreadsheet_name: info.title,
        url: info.url,
        created_under,
    })
}

/// Brings a spreadsheet up to the required tab set. Idempotent: existing tab
/// titles are inspected first and only the missing tabs are created, so
/// applying it twice never duplicates tabs or re-writes populated headers.
pub async fn upgrade_template(
    sheets: &dyn SheetsApi,
    access_token: &str,
    spreadsheet_id: &str,
) -> Result<(), ProvisionError> {
    let existing = sheets
        .list_tab_titles(access_token, spreadsheet_id)
        .await
        .map_err(ProvisionError::Provider)?;

    for tab in REQUIRED_TABS {
        if existing.iter().any(|title| title == tab) {
            continue;
        }

        sheets
            .add_tab(access_token, spreadsheet_id, tab)
            .await
            .map_err(ProvisionError::Provider)?;

        let (range, rows) = tab_seed_rows(tab);
        sheets
            .write_rows(access_token, spreadsheet_id, &range, rows)
            .await
            .map_err(ProvisionError::Provider)?;
    }

    Ok(())
}

fn tab_seed_rows(tab: &str) -> (String, Vec<Vec<String>>) {
    match tab {
        TAB_SUMMARY => (
            format!("{TAB_SUMMARY}!A1:B3"),
            vec![
                vec!["Metric".to_string(), "Value".to_string()],
                vec![
                    "Total amount".to_string(),
                    format!("=SUM({TAB_TRANSACTIONS}!C2:C)"),
                ],
                vec![
                    "Transactions".to_string(),
                    format!("=COUNTA({TAB_TRANSACTIONS}!A2:A)"),
                ],
            ],
        ),
        _ => (
            format!("{TAB_TRANSACTIONS}!A1:D1"),
            vec![vec![
                "Date".to_string(),
                "Description".to_string(),
                "Amount".to_string(),
                "Category".to_string(),
            ]],
        ),
    }
}
