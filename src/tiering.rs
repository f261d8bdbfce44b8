use std::time::Duration;

use tracing::{error, warn};

use crate::models::Document;
use crate::storage::ObjectStorage;

pub const SIGNED_URL_TTL_SECONDS: u64 = 3600;

pub const TIER_HOT: &str = "hot";
pub const TIER_PENDING_ARCHIVE: &str = "pending_archive";
pub const TIER_ARCHIVE: &str = "archive";

/// Storage class a document's bytes currently reside in. Transitions
/// hot -> pending_archive -> archive are driven by an external lifecycle job;
/// archive -> hot only happens through an explicit restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageTier {
    Hot,
    PendingArchive,
    Archive,
}

impl StorageTier {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            TIER_HOT => Some(StorageTier::Hot),
            TIER_PENDING_ARCHIVE => Some(StorageTier::PendingArchive),
            TIER_ARCHIVE => Some(StorageTier::Archive),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageTier::Hot => TIER_HOT,
            StorageTier::PendingArchive => TIER_PENDING_ARCHIVE,
            StorageTier::Archive => TIER_ARCHIVE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableKind {
    NotFound,
    ProviderError,
}

/// Pure outcome of the tier decision table, before any storage I/O.
#[derive(Debug, PartialEq, Eq)]
pub enum TierAction<'a> {
    ServeHot { hot_path: &'a str },
    RestoreRequired,
    Unavailable { kind: UnavailableKind },
}

/// What the caller should do with a download request. The three-way split
/// stays distinguishable: only a redirect is immediately actionable, a
/// restore is a retryable pending state, and unavailable is terminal.
#[derive(Debug, PartialEq, Eq)]
pub enum DownloadResolution {
    Redirect { url: String, expires_in: u64 },
    RestoreRequired,
    Unavailable { kind: UnavailableKind },
}

/// Decision table for serving a document's bytes, first match wins:
/// deleted documents are gone; hot and pending-archive documents with a hot
/// path are served from hot storage; archived documents with an archive path
/// need a restore; everything else is an inconsistent tier/path combination
/// and collapses into not-found.
pub fn classify(document: &Document) -> TierAction<'_> {
    if document.deleted_at.is_some() {
        return TierAction::Unavailable {
            kind: UnavailableKind::NotFound,
        };
    }

    let tier = match StorageTier::parse(&document.storage_tier) {
        Some(tier) => tier,
        None => {
            warn!(
                document_id = %document.id,
                storage_tier = %document.storage_tier,
                "document carries an unknown storage tier"
            );
            return TierAction::Unavailable {
                kind: UnavailableKind::NotFound,
            };
        }
    };

    match tier {
        StorageTier::Hot | StorageTier::PendingArchive => match non_empty(&document.hot_path) {
            Some(hot_path) => TierAction::ServeHot { hot_path },
            None => inconsistent(document),
        },
        StorageTier::Archive => match non_empty(&document.archive_path) {
            Some(_) => TierAction::RestoreRequired,
            None => inconsistent(document),
        },
    }
}

/// Resolves a download request end to end: runs the decision table, then
/// requests a time-limited signed URL for hot documents. A signing failure
/// surfaces as a provider error without retrying; the caller retries the whole
/// request later if it wants to.
pub async fn resolve_download(
    document: &Document,
    storage: &dyn ObjectStorage,
) -> DownloadResolution {
    match classify(document) {
        TierAction::ServeHot { hot_path } => {
            match storage
                .create_signed_url(hot_path, Duration::from_secs(SIGNED_URL_TTL_SECONDS))
                .await
            {
                Ok(url) => DownloadResolution::Redirect {
                    url,
                    expires_in: SIGNED_URL_TTL_SECONDS,
                },
                Err(err) => {
                    error!(
                        document_id = %document.id,
                        error = %err,
                        "failed to sign hot storage URL"
                    );
                    DownloadResolution::Unavailable {
                        kind: UnavailableKind::ProviderError,
                    }
                }
            }
        }
        TierAction::RestoreRequired => DownloadResolution::RestoreRequired,
        TierAction::Unavailable { kind } => DownloadResolution::Unavailable { kind },
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|path| !path.is_empty())
}

fn inconsistent(document: &Document) -> TierAction<'_> {
    // Tier says one thing, the path columns another. Served as not-found so
    // the caller gets a deterministic answer, logged so operators can see it.
    warn!(
        document_id = %document.id,
        storage_tier = %document.storage_tier,
        has_hot_path = document.hot_path.is_some(),
        has_archive_path = document.archive_path.is_some(),
        "document tier and storage paths are inconsistent"
    );
    TierAction::Unavailable {
        kind: UnavailableKind::NotFound,
    }
}
