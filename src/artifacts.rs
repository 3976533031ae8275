//! Files written next to a run: the result, per-page raw dumps and the
//! failure report.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;

use crate::error::OcrError;
use crate::types::{ExtractionResult, RawPageEntry};

pub const RESULT_FILE: &str = "resp.txt";
pub const ERROR_FILE: &str = "resp_error.txt";
pub const ERROR_SCREENSHOT: &str = "ocr_error.png";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

async fn write_file(path: PathBuf, contents: impl AsRef<[u8]>) -> Result<PathBuf, ArtifactError> {
    match fs::write(&path, contents).await {
        Ok(()) => Ok(path),
        Err(source) => Err(ArtifactError::Io { path, source }),
    }
}

async fn ensure_dir(dir: &Path) -> Result<(), ArtifactError> {
    fs::create_dir_all(dir)
        .await
        .map_err(|source| ArtifactError::Io {
            path: dir.to_path_buf(),
            source,
        })
}

/// Pretty JSON of the whole result, plus the raw dumps when there are any.
pub async fn write_result(
    dir: &Path,
    result: &ExtractionResult,
) -> Result<Vec<PathBuf>, ArtifactError> {
    ensure_dir(dir).await?;
    let json = serde_json::to_string_pretty(result)?;
    let mut written = vec![write_file(dir.join(RESULT_FILE), json).await?];
    if let ExtractionResult::Pages { raw, .. } = result {
        written.extend(write_raw_pages(dir, raw).await?);
    }
    Ok(written)
}

/// `raw-page-N.json` and `raw-page-N.txt` for every entry that produced
/// items. Error entries are skipped; they are already in the result file.
pub async fn write_raw_pages(
    dir: &Path,
    raw: &[RawPageEntry],
) -> Result<Vec<PathBuf>, ArtifactError> {
    ensure_dir(dir).await?;
    let mut written = Vec::new();
    for entry in raw {
        let Some(items) = entry.raw_items() else {
            continue;
        };
        let json = serde_json::to_string_pretty(items)?;
        written.push(write_file(dir.join(format!("raw-page-{}.json", entry.index)), json).await?);

        let text = items
            .iter()
            .map(|item| format!("{}\n{}", item.title, item.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        written.push(write_file(dir.join(format!("raw-page-{}.txt", entry.index)), text).await?);
    }
    Ok(written)
}

pub async fn write_error(dir: &Path, error: &OcrError) -> Result<PathBuf, ArtifactError> {
    ensure_dir(dir).await?;
    write_file(dir.join(ERROR_FILE), error.to_string()).await
}
