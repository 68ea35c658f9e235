use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::DriveConfig;
use crate::discovery::{DriveLister, DrivePage, DriveQuery};
use crate::error::{Error, Result};
use crate::models::RawDocumentEntry;

/// Local-folder drive backend. Every matching file under the root is a
/// "drive document" whose id is its relative path.
pub struct FilesystemDrive {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
    follow_symlinks: bool,
    snippet_max_chars: usize,
}

impl FilesystemDrive {
    pub fn new(config: &DriveConfig) -> Result<Self> {
        let root = config
            .root
            .clone()
            .ok_or_else(|| Error::Discovery("drive.root not configured".into()))?;
        if !root.exists() {
            return Err(Error::Discovery(format!(
                "drive root does not exist: {}",
                root.display()
            )));
        }

        let include = build_globset(&config.include_globs)?;

        let mut default_excludes = vec![
            "**/.git/**".to_string(),
            "**/target/**".to_string(),
            "**/node_modules/**".to_string(),
        ];
        default_excludes.extend(config.exclude_globs.clone());
        let exclude = build_globset(&default_excludes)?;

        Ok(Self {
            root,
            include,
            exclude,
            follow_symlinks: config.follow_symlinks,
            snippet_max_chars: config.snippet_max_chars,
        })
    }
}

#[async_trait]
impl DriveLister for FilesystemDrive {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn description(&self) -> &str {
        "local folder treated as a drive"
    }

    async fn list_page(&self, query: &DriveQuery, _page_token: Option<&str>) -> Result<DrivePage> {
        let mut entries = Vec::new();
        let name_filter = query.name_contains.as_ref().map(|s| s.to_lowercase());

        let walker = WalkDir::new(&self.root).follow_links(self.follow_symlinks);
        for entry in walker {
            let entry = entry.map_err(|e| Error::Discovery(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().to_string();

            if self.exclude.is_match(&rel_str) {
                continue;
            }
            if !self.include.is_match(&rel_str) {
                continue;
            }

            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| rel_str.clone());

            if let Some(ref needle) = name_filter {
                if !file_name.to_lowercase().contains(needle) {
                    continue;
                }
            }

            entries.push(file_to_entry(path, &rel_str, file_name)?);
        }

        // Sort for deterministic ordering
        entries.sort_by(|a, b| a.id.cmp(&b.id));

        // The whole folder fits in one page.
        Ok(DrivePage {
            entries,
            next_page_token: None,
        })
    }

    async fn fetch_content(&self, id: &str) -> Result<String> {
        // ids are relative paths; refuse anything that escapes the root
        if id.split(['/', '\\']).any(|part| part == "..") {
            return Err(Error::Discovery(format!("invalid document id: {id}")));
        }

        let path = self.root.join(id);
        let body = std::fs::read_to_string(&path)
            .map_err(|e| Error::Discovery(format!("{}: {e}", path.display())))?;

        Ok(body.chars().take(self.snippet_max_chars).collect())
    }
}

fn file_to_entry(path: &Path, relative_path: &str, file_name: String) -> Result<RawDocumentEntry> {
    let metadata = std::fs::metadata(path)?;
    let modified = metadata
        .modified()
        .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
    let modified_secs = modified
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;

    Ok(RawDocumentEntry {
        id: Some(relative_path.to_string()),
        name: Some(file_name),
        mime_type: Some(guess_mime(path).to_string()),
        modified_time: Utc.timestamp_opt(modified_secs, 0).single(),
        size_bytes: Some(metadata.len()),
    })
}

fn guess_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("md") => "text/markdown",
        Some("txt") => "text/plain",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("pdf") => "application/pdf",
        Some("doc") | Some("docx") => "application/msword",
        Some("xls") | Some("xlsx") => "application/vnd.ms-excel",
        _ => "application/octet-stream",
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).map_err(|e| Error::Discovery(e.to_string()))?);
    }
    builder
        .build()
        .map_err(|e| Error::Discovery(e.to_string()))
}
