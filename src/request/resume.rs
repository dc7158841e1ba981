//! Resumable file downloads.
//!
//! With `auto_resume`, an existing partial file of length `L > 0` at the save
//! path turns every attempt into a ranged request (`Range: bytes=L-`). The
//! partial file is only appended to when the server answers `206` with range
//! evidence; any other success restarts the file from zero. With
//! `auto_rename`, the completed file is renamed after the
//! `Content-Disposition` filename.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::header::{ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_RANGE};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};

use super::cancel::CancelSignal;
use super::error::AttemptError;
use super::filename::{filename_from_disposition, resolve_unique_path};
use super::progress::ProgressReporter;
use super::transport::BodyStream;
use super::{RequestFailure, ResponseHead};

/// Where and how a download is saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    /// File the body is written to. Its parent directory must exist.
    pub save_path: PathBuf,
    /// Continue an existing partial file with a ranged request. When off, a
    /// caller-set `Range` header is sent unchanged.
    pub auto_resume: bool,
    /// Rename the completed file after the server-provided filename.
    pub auto_rename: bool,
}

impl DownloadTarget {
    /// Creates a target that neither resumes nor renames.
    #[must_use]
    pub fn new(save_path: impl Into<PathBuf>) -> Self {
        Self {
            save_path: save_path.into(),
            auto_resume: false,
            auto_rename: false,
        }
    }

    /// Enables or disables resuming a partial file.
    #[must_use]
    pub fn with_auto_resume(mut self, auto_resume: bool) -> Self {
        self.auto_resume = auto_resume;
        self
    }

    /// Enables or disables renaming from `Content-Disposition`.
    #[must_use]
    pub fn with_auto_rename(mut self, auto_rename: bool) -> Self {
        self.auto_rename = auto_rename;
        self
    }

    /// Byte offset to resume from, or 0 when resuming is off or no partial file exists.
    pub(crate) async fn resume_offset(&self) -> u64 {
        if !self.auto_resume {
            return 0;
        }
        match tokio::fs::metadata(&self.save_path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => 0,
        }
    }
}

/// Returns true if a response honors a ranged request.
pub(crate) fn honors_range(head: &ResponseHead) -> bool {
    if head.status != 206 {
        return false;
    }
    let accepts_bytes = head
        .header_str(ACCEPT_RANGES)
        .is_some_and(|v| v.to_ascii_lowercase().contains("bytes"));
    let content_range = head
        .header_str(CONTENT_RANGE)
        .is_some_and(|v| v.trim_start().to_ascii_lowercase().starts_with("bytes"));
    accepts_bytes || content_range
}

/// Streams a download body to the target file, reporting progress.
///
/// Returns the final path, which differs from the save path after a rename.
#[instrument(skip_all, fields(path = %target.save_path.display(), resume_offset = resume_offset))]
pub(crate) async fn receive_file(
    target: &DownloadTarget,
    resume_offset: u64,
    head: &ResponseHead,
    body: BodyStream,
    reporter: &mut ProgressReporter,
    cancel: &CancelSignal,
) -> Result<PathBuf, AttemptError> {
    let append = resume_offset > 0 && honors_range(head);
    if resume_offset > 0 && !append {
        debug!(status = head.status, "server ignored range request, restarting from zero");
    }

    let path = &target.save_path;
    let file = open_target(path, append)
        .await
        .map_err(|e| RequestFailure::io(path.clone(), e))?;

    let start = if append { resume_offset } else { 0 };
    let total = head
        .content_length()
        .map_or(0, |remaining| start.saturating_add(remaining));

    let written = stream_to_file(file, body, path, start, total, reporter, cancel).await?;

    info!(
        path = %path.display(),
        bytes = start + written,
        resumed = append,
        "download complete"
    );

    if target.auto_rename {
        return Ok(rename_completed(path, head).await);
    }
    Ok(path.clone())
}

async fn open_target(path: &Path, append: bool) -> std::io::Result<File> {
    if append {
        OpenOptions::new().append(true).open(path).await
    } else {
        File::create(path).await
    }
}

/// Writes chunks until the body ends, polling cancellation between chunks.
async fn stream_to_file(
    file: File,
    mut body: BodyStream,
    path: &Path,
    start: u64,
    total: u64,
    reporter: &mut ProgressReporter,
    cancel: &CancelSignal,
) -> Result<u64, AttemptError> {
    let mut writer = BufWriter::new(file);
    let mut current = start;

    reporter.report(total, current, true);

    loop {
        if cancel.is_cancelled() {
            return Err(AttemptError::Cancelled);
        }
        let chunk = tokio::select! {
            chunk = body.next() => chunk,
            () = cancel.cancelled() => return Err(AttemptError::Cancelled),
        };
        let Some(chunk) = chunk else {
            break;
        };
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                // keep what arrived so a retry resumes right after it
                if let Err(io) = writer.flush().await {
                    warn!(path = %path.display(), error = %io, "failed to flush partial download");
                }
                return Err(e.into());
            }
        };

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| RequestFailure::io(path, e))?;
        current += chunk.len() as u64;
        reporter.report(total, current, false);
    }

    writer
        .flush()
        .await
        .map_err(|e| RequestFailure::io(path, e))?;

    Ok(current - start)
}

/// Renames a completed download after its `Content-Disposition` filename.
///
/// Rename failures are logged and leave the file at its original path.
pub(crate) async fn rename_completed(path: &Path, head: &ResponseHead) -> PathBuf {
    let Some(name) = head
        .header_str(CONTENT_DISPOSITION)
        .and_then(filename_from_disposition)
    else {
        debug!("no Content-Disposition filename, keeping save path");
        return path.to_path_buf();
    };

    if path.file_name().is_some_and(|current| current == name.as_str()) {
        return path.to_path_buf();
    }

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let renamed = resolve_unique_path(dir, &name);
    match tokio::fs::rename(path, &renamed).await {
        Ok(()) => {
            debug!(from = %path.display(), to = %renamed.display(), "renamed download");
            renamed
        }
        Err(e) => {
            warn!(from = %path.display(), to = %renamed.display(), error = %e, "rename failed, keeping original path");
            path.to_path_buf()
        }
    }
}
