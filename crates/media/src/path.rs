use std::path::{Component, Path};

use crate::MediaError;

/// Validate a path before it lands on a subprocess command line.
///
/// No shell ever sees these paths, but ffmpeg itself interprets some
/// patterns, so the basename is screened for shell operators and a
/// leading dash (option injection) on top of the usual null-byte and
/// traversal checks.
pub fn validate_media_path(path: &Path, must_exist: bool) -> Result<(), MediaError> {
    let display = path.display().to_string();
    let invalid = || MediaError::InvalidPath { path: display.clone() };

    if display.is_empty() || display.contains('\0') {
        return Err(invalid());
    }

    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(invalid());
    }

    let basename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(invalid)?;
    if basename.starts_with('-') || basename.contains(['|', ';', '&', '$', '`']) {
        return Err(invalid());
    }

    if must_exist && !path.is_file() {
        return Err(invalid());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn rejects_traversal() {
        let p = PathBuf::from("uploads/../../etc/passwd.mp4");
        assert!(validate_media_path(&p, false).is_err());
    }

    #[test]
    fn rejects_null_bytes_and_metacharacters() {
        assert!(validate_media_path(Path::new("up\0load.mp4"), false).is_err());
        assert!(validate_media_path(Path::new("uploads/a;rm.mp4"), false).is_err());
        assert!(validate_media_path(Path::new("uploads/a|b.mp4"), false).is_err());
    }

    #[test]
    fn rejects_option_injection() {
        assert!(validate_media_path(Path::new("-map.mp4"), false).is_err());
    }

    #[test]
    fn accepts_plain_paths() {
        assert!(validate_media_path(Path::new("uploads/ab12_clip.mp4"), false).is_ok());
    }

    #[test]
    fn missing_file_fails_when_required() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.mp4");
        assert!(validate_media_path(&path, true).is_err());
        std::fs::write(&path, b"x").unwrap();
        assert!(validate_media_path(&path, true).is_ok());
    }
}
