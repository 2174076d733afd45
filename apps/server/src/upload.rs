use std::path::{Path, PathBuf};

use axum::extract::multipart::Field;
use rand::Rng;
use tokio::io::AsyncWriteExt;
use voxdub_interface::InputKind;

use crate::error::ApiError;

pub const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "mkv", "avi", "mov", "webm"];
pub const AUDIO_EXTENSIONS: [&str; 4] = ["mp3", "wav", "flac", "ogg"];

const UPLOAD_CHUNK: usize = 1024 * 1024;

/// Classify the upload by extension against the whitelist.
pub fn classify_extension(filename: &str) -> Option<InputKind> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())?
        .to_ascii_lowercase();
    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(InputKind::Video)
    } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        Some(InputKind::Audio)
    } else {
        None
    }
}

/// Reduce a client-supplied filename to a safe on-disk name: traversal
/// shapes are rejected outright, everything else collapses to
/// `[A-Za-z0-9_-]` behind a random 8-hex prefix.
pub fn sanitize_filename(original: &str) -> Result<String, ApiError> {
    if original.is_empty()
        || original.contains('\0')
        || original.contains('/')
        || original.contains('\\')
        || original.contains("..")
    {
        return Err(ApiError::BadRequest("invalid filename".into()));
    }

    let path = Path::new(original);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("upload");
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let safe_stem: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let prefix: u32 = rand::rng().random();
    Ok(format!("{prefix:08x}_{safe_stem}.{ext}"))
}

/// Stream the multipart file field to disk in 1 MB chunks, rejecting the
/// upload the moment it passes the size cap. The partial file is removed
/// on every failure path.
pub async fn save_upload(
    field: &mut Field<'_>,
    upload_dir: &Path,
    safe_name: &str,
    max_bytes: u64,
) -> Result<PathBuf, ApiError> {
    tokio::fs::create_dir_all(upload_dir)
        .await
        .map_err(|e| ApiError::Internal(format!("upload dir unavailable: {e}")))?;

    let dest = upload_dir.join(safe_name);

    // The name was sanitized, but re-check containment before writing.
    let canonical_dir = upload_dir
        .canonicalize()
        .map_err(|e| ApiError::Internal(format!("upload dir unavailable: {e}")))?;
    if !dest
        .parent()
        .and_then(|p| p.canonicalize().ok())
        .map(|p| p.starts_with(&canonical_dir))
        .unwrap_or(false)
    {
        return Err(ApiError::BadRequest("invalid file path".into()));
    }

    let mut file = tokio::fs::File::create(&dest)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to create upload file: {e}")))?;

    let mut written: u64 = 0;
    let mut buffer: Vec<u8> = Vec::with_capacity(UPLOAD_CHUNK);

    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(&dest).await;
                return Err(ApiError::BadRequest(format!("upload aborted: {e}")));
            }
        };

        written += chunk.len() as u64;
        if written > max_bytes {
            drop(file);
            let _ = tokio::fs::remove_file(&dest).await;
            return Err(ApiError::PayloadTooLarge);
        }

        buffer.extend_from_slice(&chunk);
        if buffer.len() >= UPLOAD_CHUNK {
            if let Err(e) = file.write_all(&buffer).await {
                drop(file);
                let _ = tokio::fs::remove_file(&dest).await;
                return Err(ApiError::Internal(format!("failed to write upload: {e}")));
            }
            buffer.clear();
        }
    }

    if !buffer.is_empty() {
        if let Err(e) = file.write_all(&buffer).await {
            drop(file);
            let _ = tokio::fs::remove_file(&dest).await;
            return Err(ApiError::Internal(format!("failed to write upload: {e}")));
        }
    }
    if let Err(e) = file.flush().await {
        let _ = tokio::fs::remove_file(&dest).await;
        return Err(ApiError::Internal(format!("failed to flush upload: {e}")));
    }

    if written == 0 {
        let _ = tokio::fs::remove_file(&dest).await;
        return Err(ApiError::BadRequest("uploaded file is empty".into()));
    }

    Ok(dest)
}
