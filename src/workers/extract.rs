use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::NaiveDate;
use diesel::prelude::*;
use serde::Deserialize;
use tokio::task;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    models::{Document, NewTransaction},
    schema::{documents, transactions},
    state::AppState,
    tiering,
};

use super::{JobExecution, JobHandler};

#[derive(Clone, Debug, Deserialize)]
struct ExtractPayload {
    document_id: Uuid,
}

/// Pulls transaction lines out of an uploaded statement. Extraction accuracy
/// is not the point of this handler; it is the seam where a real OCR engine
/// plugs in. Re-extraction replaces the document's prior rows.
pub struct ExtractTransactionsJob;

impl ExtractTransactionsJob {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for ExtractTransactionsJob {
    fn job_type(&self) -> &'static str {
        crate::jobs::JOB_EXTRACT_TRANSACTIONS
    }

    async fn handle(&self, state: Arc<AppState>, job: crate::models::Job) -> JobExecution {
        let payload: ExtractPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid extract payload: {err}"),
                }
            }
        };

        let state_for_load = state.clone();
        let document = match task::spawn_blocking(move || {
            load_document(state_for_load, payload.document_id)
        })
        .await
        {
            Ok(Ok(document)) => document,
            Ok(Err(err)) => {
                warn!(job_id = %job.id, error = %err, "extract job will retry");
                return JobExecution::Retry {
                    delay: Duration::from_secs(30),
                    error: err,
                };
            }
            Err(join_err) => {
                error!(job_id = %job.id, error = %join_err, "extract task panicked");
                return JobExecution::Retry {
                    delay: Duration::from_secs(60),
                    error: format!("worker panicked: {join_err}"),
                };
            }
        };

        let document = match document {
            Some(document) => document,
            None => {
                info!(document_id = %payload.document_id, "document gone before extraction");
                return JobExecution::Success;
            }
        };

        let hot_path = match document.hot_path.as_deref() {
            Some(path) if document.storage_tier != tiering::TIER_ARCHIVE => path.to_string(),
            _ => {
                // Lifecycle moved the bytes out of hot storage before the
                // queue got to this job; nothing left to extract from.
                warn!(
                    document_id = %document.id,
                    storage_tier = %document.storage_tier,
                    "document bytes no longer in hot storage, skipping extraction"
                );
                return JobExecution::Success;
            }
        };

        let bytes = match state.storage.get_object(&hot_path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                return JobExecution::Retry {
                    delay: Duration::from_secs(30),
                    error: format!("failed to read document bytes: {err}"),
                }
            }
        };

        let parsed = parse_statement(&bytes);
        let row_count = parsed.len();

        let state_for_store = state.clone();
        let document_id = document.id;
        let owner_id = document.owner_id;
        match task::spawn_blocking(move || {
            store_transactions(state_for_store, document_id, owner_id, parsed)
        })
        .await
        {
            Ok(Ok(())) => {
                info!(
                    document_id = %document_id,
                    transactions = row_count,
                    "extracted transactions"
                );
                JobExecution::Success
            }
            Ok(Err(err)) => JobExecution::Retry {
                delay: Duration::from_secs(30),
                error: err,
            },
            Err(join_err) => JobExecution::Retry {
                delay: Duration::from_secs(60),
                error: format!("worker panicked: {join_err}"),
            },
        }
    }
}

fn load_document(state: Arc<AppState>, document_id: Uuid) -> Result<Option<Document>, String> {
    let mut conn = state.db().map_err(|err| format!("{err:?}"))?;
    let document: Option<Document> = documents::table
        .find(document_id)
        .first(&mut conn)
        .optional()
        .map_err(|err| format!("{err:?}"))?;
    Ok(document.filter(|doc| doc.deleted_at.is_none()))
}

fn store_transactions(
    state: Arc<AppState>,
    document_id: Uuid,
    owner_id: Uuid,
    parsed: Vec<ParsedLine>,
) -> Result<(), String> {
    let mut conn = state.db().map_err(|err| format!("{err:?}"))?;

    let rows: Vec<NewTransaction> = parsed
        .into_iter()
        .map(|line| NewTransaction {
            id: Uuid::new_v4(),
            document_id,
            job_id: None,
            owner_id,
            posted_on: line.posted_on,
            description: line.description,
            amount_cents: line.amount_cents,
            category: None,
        })
        .collect();

    conn.transaction(|conn| {
        diesel::delete(transactions::table.filter(transactions::document_id.eq(document_id)))
            .execute(conn)?;
        diesel::insert_into(transactions::table)
            .values(&rows)
            .execute(conn)?;
        Ok::<(), diesel::result::Error>(())
    })
    .map_err(|err| format!("{err:?}"))
}

#[derive(Debug, PartialEq)]
struct ParsedLine {
    posted_on: NaiveDate,
    description: String,
    amount_cents: i64,
}

/// Line-based statement parsing: `date,description,amount` with `,` or `;`
/// separators. Lines that do not parse are skipped rather than failing the
/// whole document.
fn parse_statement(bytes: &[u8]) -> Vec<ParsedLine> {
    let text = String::from_utf8_lossy(bytes);
    text.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<ParsedLine> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let separator = if line.contains(';') { ';' } else { ',' };
    let mut parts = line.splitn(3, separator).map(str::trim);

    let posted_on = NaiveDate::parse_from_str(parts.next()?, "%Y-%m-%d").ok()?;
    let description = parts.next()?.to_string();
    let amount_cents = parse_amount_cents(parts.next()?)?;

    if description.is_empty() {
        return None;
    }

    Some(ParsedLine {
        posted_on,
        description,
        amount_cents,
    })
}

fn parse_amount_cents(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (sign, digits) = match raw.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, raw),
    };

    let (whole, frac) = match digits.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (digits, ""),
    };

    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if frac.len() > 2 {
        return None;
    }

    let whole: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().ok()?
    };
    let frac_value: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac.parse().ok()?,
    };

    Some(sign * (whole * 100 + frac_value))
}
