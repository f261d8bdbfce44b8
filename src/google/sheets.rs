use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

pub const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

const HTTP_TIMEOUT_SECONDS: u64 = 20;

#[derive(Debug, Clone)]
pub struct SpreadsheetInfo {
    pub spreadsheet_id: String,
    pub title: String,
    pub url: String,
}

/// The slice of the Spreadsheet API this backend uses. Cell values are plain
/// string matrices; range strings use A1 notation.
#[async_trait]
pub trait SheetsApi: Send + Sync + 'static {
    async fn create_spreadsheet(&self, access_token: &str, title: &str)
        -> Result<SpreadsheetInfo>;

    async fn list_tab_titles(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
    ) -> Result<Vec<String>>;

    async fn add_tab(&self, access_token: &str, spreadsheet_id: &str, title: &str) -> Result<()>;

    async fn write_rows(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<String>>,
    ) -> Result<()>;

    async fn clear_range(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<()>;
}

pub struct HttpSheetsClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSheetsClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(SHEETS_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECONDS))
            .build()
            .context("failed to build sheets HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    async fn check(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("sheets API {action} returned {status}: {body}");
        }
        Ok(response)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpreadsheetResponse {
    spreadsheet_id: String,
    #[serde(default)]
    properties: Option<SpreadsheetProperties>,
    #[serde(default)]
    spreadsheet_url: Option<String>,
}

#[derive(Deserialize)]
struct SpreadsheetProperties {
    title: String,
}

#[derive(Deserialize)]
struct SheetListResponse {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
}

#[async_trait]
impl SheetsApi for HttpSheetsClient {
    async fn create_spreadsheet(
        &self,
        access_token: &str,
        title: &str,
    ) -> Result<SpreadsheetInfo> {
        let response = self
            .http
            .post(&self.base_url)
            .bearer_auth(access_token)
            .json(&json!({ "properties": { "title": title } }))
            .send()
            .await
            .context("sheets create request failed")?;

        let parsed: SpreadsheetResponse = Self::check(response, "create")
            .await?
            .json()
            .await
            .context("failed to parse sheets create response")?;

        let url = parsed.spreadsheet_url.unwrap_or_else(|| {
            format!(
                "https://docs.google.com/spreadsheets/d/{}",
                parsed.spreadsheet_id
            )
        });

        Ok(SpreadsheetInfo {
            title: parsed
                .properties
                .map(|p| p.title)
                .unwrap_or_else(|| title.to_string()),
            spreadsheet_id: parsed.spreadsheet_id,
            url,
        })
    }

    async fn list_tab_titles(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
    ) -> Result<Vec<String>> {
        let response = self
            .http
            .get(format!("{}/{spreadsheet_id}", self.base_url))
            .query(&[("fields", "sheets.properties.title")])
            .bearer_auth(access_token)
            .send()
            .await
            .context("sheets metadata request failed")?;

        let parsed: SheetListResponse = Self::check(response, "metadata")
            .await?
            .json()
            .await
            .context("failed to parse sheets metadata response")?;

        Ok(parsed
            .sheets
            .into_iter()
            .map(|sheet| sheet.properties.title)
            .collect())
    }

    async fn add_tab(&self, access_token: &str, spreadsheet_id: &str, title: &str) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/{spreadsheet_id}:batchUpdate", self.base_url))
            .bearer_auth(access_token)
            .json(&json!({
                "requests": [
                    { "addSheet": { "properties": { "title": title } } }
                ]
            }))
            .send()
            .await
            .context("sheets addSheet request failed")?;

        Self::check(response, "addSheet").await?;
        Ok(())
    }

    async fn write_rows(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<String>>,
    ) -> Result<()> {
        let response = self
            .http
            .put(format!("{}/{spreadsheet_id}/values/{range}", self.base_url))
            .query(&[("valueInputOption", "USER_ENTERED")])
            .bearer_auth(access_token)
            .json(&json!({ "range": range, "values": rows }))
            .send()
            .await
            .context("sheets values update failed")?;

        Self::check(response, "values update").await?;
        Ok(())
    }

    async fn clear_range(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<()> {
        let response = self
            .http
            .post(format!(
                "{}/{spreadsheet_id}/values/{range}:clear",
                self.base_url
            ))
            .bearer_auth(access_token)
            .json(&json!({}))
            .send()
            .await
            .context("sheets values clear failed")?;

        Self::check(response, "values clear").await?;
        Ok(())
    }
}
