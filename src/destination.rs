use diesel::prelude::*;
use diesel::PgConnection;
use serde::Serialize;

use crate::models::{BankAccount, CategorizationJob, CompanyProfile};
use crate::schema::{bank_accounts, company_profiles};

/// Spreadsheet scope an export targets, in decreasing order of specificity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    Job,
    BankAccount,
    Company,
    New,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Destination {
    pub kind: DestinationKind,
    pub spreadsheet_id: Option<String>,
    pub spreadsheet_name: Option<String>,
    pub will_sync_in_place: bool,
}

/// Everything the resolver looks at, loaded up front by the caller so the
/// resolution itself stays a pure read-and-decide step.
#[derive(Debug, Clone)]
pub struct DestinationContext {
    pub job: CategorizationJob,
    pub bank_account: Option<BankAccount>,
    pub company_profile: Option<CompanyProfile>,
}

pub fn load_destination_context(
    conn: &mut PgConnection,
    job: CategorizationJob,
) -> Result<DestinationContext, diesel::result::Error> {
    let bank_account = match job.bank_account_id {
        Some(account_id) => bank_accounts::table
            .find(account_id)
            .first::<BankAccount>(conn)
            .optional()?,
        None => None,
    };

    let company_profile = company_profiles::table
        .find(job.owner_id)
        .first::<CompanyProfile>(conn)
        .optional()?;

    Ok(DestinationContext {
        job,
        bank_account,
        company_profile,
    })
}

/// Picks the one spreadsheet an export targets. The cascade encodes a
/// specificity rule: a job already synced to a spreadsheet keeps updating that
/// exact sheet, it never silently redirects to a broader account- or
/// company-wide sheet created later. Each step returns `Some` only when its
/// binding holds a populated spreadsheet id; the first hit wins.
pub fn resolve_destination(ctx: &DestinationContext) -> Destination {
    let steps: [fn(&DestinationContext) -> Option<Destination>; 3] =
        [job_bound, account_bound, company_bound];

    steps
        .iter()
        .find_map(|step| step(ctx))
        .unwrap_or(Destination {
            kind: DestinationKind::New,
            spreadsheet_id: None,
            spreadsheet_name: None,
            will_sync_in_place: false,
        })
}

fn job_bound(ctx: &DestinationContext) -> Option<Destination> {
    let spreadsheet_id = populated(&ctx.job.spreadsheet_id)?;
    Some(Destination {
        kind: DestinationKind::Job,
        spreadsheet_id: Some(spreadsheet_id),
        spreadsheet_name: ctx.job.spreadsheet_name.clone(),
        // Existing rows are updated, not appended to.
        will_sync_in_place: true,
    })
}

fn account_bound(ctx: &DestinationContext) -> Option<Destination> {
    let account = ctx.bank_account.as_ref()?;
    let spreadsheet_id = populated(&account.default_spreadsheet_id)?;
    Some(Destination {
        kind: DestinationKind::BankAccount,
        spreadsheet_id: Some(spreadsheet_id),
        spreadsheet_name: account.default_spreadsheet_name.clone(),
        will_sync_in_place: false,
    })
}

fn company_bound(ctx: &DestinationContext) -> Option<Destination> {
    let profile = ctx.company_profile.as_ref()?;
    let spreadsheet_id = populated(&profile.master_spreadsheet_id)?;
    Some(Destination {
        kind: DestinationKind::Company,
        spreadsheet_id: Some(spreadsheet_id),
        spreadsheet_name: profile.master_spreadsheet_name.clone(),
        will_sync_in_place: false,
    })
}

fn populated(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn job(spreadsheet_id: Option<&str>, bank_account_id: Option<Uuid>) -> CategorizationJob {
        let now = Utc::now().naive_utc();
        CategorizationJob {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "Q2 receipts".to_string(),
            bank_account_id,
            spreadsheet_id: spreadsheet_id.map(str::to_string),
            spreadsheet_name: spreadsheet_id.map(|_| "Q2 receipts".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    fn account(owner_id: Uuid, default_spreadsheet_id: Option<&str>) -> BankAccount {
        let now = Utc::now().naive_utc();
        BankAccount {
            id: Uuid::new_v4(),
            owner_id,
            name: "Checking".to_string(),
            default_spreadsheet_id: default_spreadsheet_id.map(str::to_string),
            default_spreadsheet_name: default_spreadsheet_id.map(|_| "Checking".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    fn company(owner_id: Uuid, master_spreadsheet_id: Option<&str>) -> CompanyProfile {
        let now = Utc::now().naive_utc();
        CompanyProfile {
            owner_id,
            company_name: "Acme GmbH".to_string(),
            master_spreadsheet_id: master_spreadsheet_id.map(str::to_string),
            master_spreadsheet_name: master_spreadsheet_id.map(|_| "Acme master".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn unbound_job_without_account_or_company_resolves_to_new() {
        let ctx = DestinationContext {
            job: job(None, None),
            bank_account: None,
            company_profile: None,
        };
        let destination = resolve_destination(&ctx);
        assert_eq!(destination.kind, DestinationKind::New);
        assert_eq!(destination.spreadsheet_id, None);
        assert!(!destination.will_sync_in_place);
    }

    #[test]
    fn job_binding_beats_account_and_company_bindings() {
        let job = job(Some("S1"), Some(Uuid::new_v4()));
        let owner = job.owner_id;
        let ctx = DestinationContext {
            bank_account: Some(account(owner, Some("S2"))),
            company_profile: Some(company(owner, Some("S3"))),
            job,
        };
        let destination = resolve_destination(&ctx);
        assert_eq!(destination.kind, DestinationKind::Job);
        assert_eq!(destination.spreadsheet_id.as_deref(), Some("S1"));
        assert!(destination.will_sync_in_place);
    }

    #[test]
    fn account_default_wins_over_company_master() {
        let job = job(None, Some(Uuid::new_v4()));
        let owner = job.owner_id;
        let ctx = DestinationContext {
            bank_account: Some(account(owner, Some("S2"))),
            company_profile: Some(company(owner, Some("S3"))),
            job,
        };
        let destination = resolve_destination(&ctx);
        assert_eq!(destination.kind, DestinationKind::BankAccount);
        assert_eq!(destination.spreadsheet_id.as_deref(), Some("S2"));
        assert!(!destination.will_sync_in_place);
    }

    #[test]
    fn account_without_default_falls_through_to_company() {
        let job = job(None, Some(Uuid::new_v4()));
        let owner = job.owner_id;
        let ctx = DestinationContext {
            bank_account: Some(account(owner, None)),
            company_profile: Some(company(owner, Some("S3"))),
            job,
        };
        let destination = resolve_destination(&ctx);
        assert_eq!(destination.kind, DestinationKind::Company);
        assert_eq!(destination.spreadsheet_id.as_deref(), Some("S3"));
    }

    #[test]
    fn blank_spreadsheet_id_counts_as_unbound() {
        let ctx = DestinationContext {
            job: job(Some("  "), None),
            bank_account: None,
            company_profile: None,
        };
        assert_eq!(resolve_destination(&ctx).kind, DestinationKind::New);
    }

    #[test]
    fn resolution_is_deterministic() {
        let job = job(Some("S1"), None);
        let ctx = DestinationContext {
            job,
            bank_account: None,
            company_profile: None,
        };
        let first = resolve_destination(&ctx);
        let second = resolve_destination(&ctx);
        assert_eq!(first, second);
    }
}
