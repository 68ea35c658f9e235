//! Document discovery.
//!
//! The [`DriveLister`] trait is the seam to whatever service actually
//! lists drive contents. [`discover`] walks its pages, normalizes each
//! raw entry into a [`Document`], and counts the entries it has to skip
//! (missing id, failed content fetch) instead of failing the pass.
//! Discovery holds no state between calls; a second pass re-walks the
//! listing from the first page.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{DiscoverOutcome, Document, RawDocumentEntry};

/// Filter for a discovery pass.
#[derive(Debug, Clone, Default)]
pub struct DriveQuery {
    /// Case-insensitive substring match on document names. `None` lists
    /// everything.
    pub name_contains: Option<String>,
    /// Stop after this many normalized documents.
    pub limit: Option<usize>,
}

/// One page of raw listing entries.
#[derive(Debug, Clone, Default)]
pub struct DrivePage {
    pub entries: Vec<RawDocumentEntry>,
    pub next_page_token: Option<String>,
}

/// A drive backend that can list documents and fetch their content.
///
/// Backends push the query down to their own listing (the way a cloud
/// drive applies a search server-side); [`discover`] applies only the
/// limit and the normalization rules.
#[async_trait]
pub trait DriveLister: Send + Sync {
    /// Returns the backend identifier (e.g. `"filesystem"`).
    fn name(&self) -> &str;

    /// Returns a one-line description for `triage sources` output.
    fn description(&self) -> &str;

    /// List one page of entries, continuing from `page_token` when given.
    async fn list_page(&self, query: &DriveQuery, page_token: Option<&str>) -> Result<DrivePage>;

    /// Fetch the content snippet for a listed document.
    async fn fetch_content(&self, id: &str) -> Result<String>;
}

/// Placeholder backend used when `drive.provider = "disabled"`.
pub struct DisabledDrive;

#[async_trait]
impl DriveLister for DisabledDrive {
    fn name(&self) -> &str {
        "disabled"
    }

    fn description(&self) -> &str {
        "no drive backend configured"
    }

    async fn list_page(&self, _query: &DriveQuery, _page_token: Option<&str>) -> Result<DrivePage> {
        Err(Error::Discovery("drive provider is disabled".into()))
    }

    async fn fetch_content(&self, _id: &str) -> Result<String> {
        Err(Error::Discovery("drive provider is disabled".into()))
    }
}

/// Walk the listing and normalize every usable entry.
///
/// Fatal only when the listing itself cannot be read; per-entry problems
/// are logged, skipped, and counted in the outcome.
pub async fn discover(lister: &dyn DriveLister, query: &DriveQuery) -> Result<DiscoverOutcome> {
    let mut documents = Vec::new();
    let mut skipped = 0u64;
    let mut page_token: Option<String> = None;

    loop {
        let page = lister.list_page(query, page_token.as_deref()).await?;

        for entry in page.entries {
            if let Some(limit) = query.limit {
                if documents.len() >= limit {
                    tracing::debug!(limit, skipped, "discovery limit reached");
                    return Ok(DiscoverOutcome { documents, skipped });
                }
            }
            match normalize_entry(lister, entry).await {
                Ok(doc) => documents.push(doc),
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(error = %e, "skipping listing entry");
                }
            }
        }

        page_token = page.next_page_token;
        if page_token.is_none() {
            break;
        }
    }

    tracing::debug!(
        discovered = documents.len(),
        skipped,
        "discovery pass complete"
    );
    Ok(DiscoverOutcome { documents, skipped })
}

/// Turn a raw listing entry into a [`Document`], fetching its content.
///
/// An entry without an id is unusable. Other missing fields get neutral
/// defaults; a failed content fetch skips the entry.
async fn normalize_entry(lister: &dyn DriveLister, entry: RawDocumentEntry) -> Result<Document> {
    let id = entry
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| Error::Discovery("listing entry missing id".into()))?;

    let content_snippet = lister
        .fetch_content(&id)
        .await
        .map_err(|e| Error::Discovery(format!("content fetch failed for {id}: {e}")))?;

    Ok(Document {
        id,
        name: entry.name.unwrap_or_else(|| "(untitled)".into()),
        mime_type: entry
            .mime_type
            .unwrap_or_else(|| "application/octet-stream".into()),
        content_snippet,
        modified_time: entry.modified_time.unwrap_or(chrono::DateTime::UNIX_EPOCH),
        size_bytes: entry.size_bytes.unwrap_or(0),
    })
}

/// Create the drive backend named by the `[drive]` config.
pub fn create_lister(config: &crate::config::DriveConfig) -> Result<Arc<dyn DriveLister>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledDrive)),
        "filesystem" => Ok(Arc::new(crate::drive_fs::FilesystemDrive::new(config)?)),
        other => Err(Error::Discovery(format!("unknown drive provider: {other}"))),
    }
}
