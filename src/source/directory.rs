//! Directory source: each regular file is one unit of work.
//!
//! Files are taken in name order. Hidden files (leading `.`) are skipped so
//! producers can write `.name.tmp` and rename into place atomically.

use super::{Configure, SettingDoc, WorkSource};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::model::work::{Record, WorkItem};
use async_trait::async_trait;
use serde_json::json;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

pub const SETTINGS: &[SettingDoc] = &[
    SettingDoc {
        key: "path",
        required: true,
        help: "directory to pull files from",
    },
    SettingDoc {
        key: "extension",
        required: false,
        help: "only pick files with this extension (e.g. json)",
    },
    SettingDoc {
        key: "on-success",
        required: false,
        help: "delete | move (default delete); move requires done-path",
    },
    SettingDoc {
        key: "done-path",
        required: false,
        help: "directory processed files are moved to",
    },
    SettingDoc {
        key: "failed-path",
        required: false,
        help: "directory failed files are moved to (default: leave in place)",
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnSuccess {
    Delete,
    Move,
}

impl FromStr for OnSuccess {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "delete" => Ok(OnSuccess::Delete),
            "move" => Ok(OnSuccess::Move),
            other => Err(format!("expected delete or move, got {other:?}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub path: PathBuf,
    pub extension: Option<String>,
    pub on_success: OnSuccess,
    pub done_path: Option<PathBuf>,
    pub failed_path: Option<PathBuf>,
}

pub struct DirectorySource {
    config: DirectoryConfig,
}

impl DirectorySource {
    pub fn new(config: DirectoryConfig) -> Self {
        Self { config }
    }

    fn wanted(&self, path: &Path) -> bool {
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_none_or(|n| n.starts_with('.'));
        if hidden {
            return false;
        }
        match self.config.extension.as_deref() {
            Some(ext) => path.extension().is_some_and(|e| e == ext),
            None => true,
        }
    }

    /// Lexicographically first candidate file, if any.
    async fn next_file(&self) -> Result<Option<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.config.path).await?;
        let mut first: Option<PathBuf> = None;
        while let Some(entry) = entries.next_entry().await? {
            match entry.file_type().await {
                Ok(kind) if kind.is_file() => {}
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
            let path = entry.path();
            if !self.wanted(&path) {
                continue;
            }
            if first.as_ref().is_none_or(|f| path < *f) {
                first = Some(path);
            }
        }
        Ok(first)
    }
}

impl Configure for DirectorySource {
    fn configure(settings: &Settings) -> Result<Self> {
        let on_success = settings.parse_or("on-success", OnSuccess::Delete)?;
        let done_path = settings.get("done-path").map(PathBuf::from);
        if on_success == OnSuccess::Move && done_path.is_none() {
            return Err(Error::Config("on-success=move requires done-path".to_string()));
        }
        Ok(Self::new(DirectoryConfig {
            path: PathBuf::from(settings.required("path")?),
            extension: settings
                .get("extension")
                .map(|e| e.trim_start_matches('.').to_string()),
            on_success,
            done_path,
            failed_path: settings.get("failed-path").map(PathBuf::from),
        }))
    }
}

#[async_trait]
impl WorkSource for DirectorySource {
    fn name(&self) -> &'static str {
        "directory"
    }

    async fn connect(&mut self) -> Result<()> {
        let meta = tokio::fs::metadata(&self.config.path).await.map_err(|e| {
            Error::Connection(format!("{}: {e}", self.config.path.display()))
        })?;
        if !meta.is_dir() {
            return Err(Error::Connection(format!(
                "{} is not a directory",
                self.config.path.display()
            )));
        }
        for dir in [&self.config.done_path, &self.config.failed_path]
            .into_iter()
            .flatten()
        {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| Error::Connection(format!("{}: {e}", dir.display())))?;
        }
        Ok(())
    }

    async fn fetch(&mut self) -> Result<Option<WorkItem>> {
        // Another consumer may take the listed file before it is read.
        let (path, payload) = loop {
            let Some(path) = self
                .next_file()
                .await
                .map_err(|e| Error::Fetch(e.to_string()))?
            else {
                return Ok(None);
            };
            match read_file(&path).await {
                Ok(Some(payload)) => break (path, payload),
                Ok(None) => debug!(path = %path.display(), "file vanished before read, rescanning"),
                Err(e) => return Err(Error::Fetch(format!("{}: {e}", path.display()))),
            }
        };

        let mut record = Record::new();
        record.insert("path".to_string(), json!(path.display().to_string()));
        record.insert(
            "name".to_string(),
            json!(path.file_name().map(|n| n.to_string_lossy().into_owned())),
        );
        record.insert("size".to_string(), json!(payload.len()));

        Ok(Some(
            WorkItem::from_payload(payload)
                .with_record(record)
                .with_key(path.display().to_string()),
        ))
    }

    async fn acknowledge(&mut self, item: &WorkItem) -> Result<()> {
        let path = item_path(item).map_err(|e| Error::Acknowledge(e.to_string()))?;
        match (self.config.on_success, self.config.done_path.as_deref()) {
            (OnSuccess::Move, Some(done)) => {
                let dest = move_into(&path, done)
                    .await
                    .map_err(|e| Error::Acknowledge(e.to_string()))?;
                debug!(from = %path.display(), to = %dest.display(), "moved processed file");
            }
            _ => {
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|e| Error::Acknowledge(format!("{}: {e}", path.display())))?;
                debug!(path = %path.display(), "deleted processed file");
            }
        }
        Ok(())
    }

    async fn report_failure(&mut self, item: &WorkItem) -> Result<()> {
        let Some(failed) = self.config.failed_path.as_deref() else {
            info!(key = ?item.key, "leaving failed file in place");
            return Ok(());
        };
        let path = item_path(item).map_err(|e| Error::ReportFailure(e.to_string()))?;
        let dest = move_into(&path, failed)
            .await
            .map_err(|e| Error::ReportFailure(e.to_string()))?;
        debug!(from = %path.display(), to = %dest.display(), "moved failed file");
        Ok(())
    }

    async fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Contents of `path`, or None if it no longer exists.
async fn read_file(path: &Path) -> std::io::Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(payload) => Ok(Some(payload)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn item_path(item: &WorkItem) -> Result<PathBuf> {
    item.key
        .as_deref()
        .map(PathBuf::from)
        .ok_or_else(|| Error::Other("work item has no file path".to_string()))
}

async fn move_into(path: &Path, dir: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| Error::Other(format!("{} has no file name", path.display())))?;
    let dest = dir.join(name);
    tokio::fs::rename(path, &dest).await?;
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_taken_between_listing_and_read_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job-1");
        std::fs::write(&path, "x").unwrap();

        assert_eq!(read_file(&path).await.unwrap(), Some(b"x".to_vec()));
        std::fs::rename(&path, dir.path().join(".claimed")).unwrap();
        assert_eq!(read_file(&path).await.unwrap(), None);
    }
}
