//! Attendance photos arrive as base64 (optionally a `data:` URL) and are
//! written under the upload directory, one folder per day.

use std::path::{Component, Path, PathBuf};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::NaiveDate;
use tracing::warn;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult, ErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoFormat {
    Jpeg,
    Png,
    Webp,
}

impl PhotoFormat {
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0xFF, 0xD8, 0xFF, ..] => Some(PhotoFormat::Jpeg),
            [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some(PhotoFormat::Png),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => {
                Some(PhotoFormat::Webp)
            }
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            PhotoFormat::Jpeg => "jpg",
            PhotoFormat::Png => "png",
            PhotoFormat::Webp => "webp",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "jpg" | "jpeg" => Some(PhotoFormat::Jpeg),
            "png" => Some(PhotoFormat::Png),
            "webp" => Some(PhotoFormat::Webp),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            PhotoFormat::Jpeg => "image/jpeg",
            PhotoFormat::Png => "image/png",
            PhotoFormat::Webp => "image/webp",
        }
    }
}

fn invalid(message: impl Into<String>) -> ApiError {
    ApiError::new(ErrorCode::InvalidPhoto, message)
}

/// Decodes and checks a photo payload.
pub fn decode(payload: &str, max_bytes: usize) -> ApiResult<(Vec<u8>, PhotoFormat)> {
    let data = match payload.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => payload,
    };
    let data: String = data.chars().filter(|c| !c.is_whitespace()).collect();

    // base64 inflates by 4/3; refuse obviously oversized payloads before decoding
    if data.len() / 4 * 3 > max_bytes + 3 {
        return Err(invalid(format!("Photo exceeds {max_bytes} bytes")));
    }

    let bytes = STANDARD
        .decode(data.as_bytes())
        .map_err(|_| invalid("Photo is not valid base64"))?;

    if bytes.is_empty() {
        return Err(invalid("Photo is empty"));
    }
    if bytes.len() > max_bytes {
        return Err(invalid(format!("Photo exceeds {max_bytes} bytes")));
    }

    let format = PhotoFormat::sniff(&bytes)
        .ok_or_else(|| invalid("Photo must be JPEG, PNG or WebP"))?;
    Ok((bytes, format))
}

/// Writes the photo and returns its path relative to `upload_dir`.
pub async fn store(
    upload_dir: &str,
    date: NaiveDate,
    user_id: u64,
    kind: &str,
    bytes: Vec<u8>,
    format: PhotoFormat,
) -> ApiResult<String> {
    let relative = format!(
        "attendance/{}/{}-{}-{}.{}",
        date.format("%Y-%m-%d"),
        user_id,
        kind,
        Uuid::new_v4().to_simple(),
        format.extension()
    );
    let full = Path::new(upload_dir).join(&relative);

    if let Some(parent) = full.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(ApiError::internal)?;
    }
    tokio::fs::write(&full, bytes)
        .await
        .map_err(ApiError::internal)?;

    Ok(relative)
}

/// Removes a photo whose punch was not recorded. Failures are only logged.
pub async fn discard(upload_dir: &str, relative: &str) {
    let Ok(full) = resolve(upload_dir, relative) else {
        return;
    };
    if let Err(e) = tokio::fs::remove_file(&full).await {
        warn!(error = %e, path = %full.display(), "Failed to remove orphaned photo");
    }
}

/// Resolves a stored relative path, refusing anything that escapes the
/// upload directory.
pub fn resolve(upload_dir: &str, relative: &str) -> ApiResult<PathBuf> {
    let rel = Path::new(relative);
    if rel
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(ApiError::not_found("Photo not found"));
    }
    Ok(Path::new(upload_dir).join(rel))
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG_HEAD: [u8; 8] = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F'];

    #[test]
    fn decodes_plain_and_data_url() {
        let encoded = STANDARD.encode(JPEG_HEAD);
        let (bytes, format) = decode(&encoded, 1024).unwrap();
        assert_eq!(bytes, JPEG_HEAD);
        assert_eq!(format, PhotoFormat::Jpeg);

        let url = format!("data:image/jpeg;base64,{encoded}");
        assert_eq!(decode(&url, 1024).unwrap().1, PhotoFormat::Jpeg);
    }

    #[test]
    fn rejects_garbage_unknown_and_oversized() {
        assert_eq!(decode("%%%", 1024).unwrap_err().code, ErrorCode::InvalidPhoto);
        let text = STANDARD.encode(b"hello world");
        assert!(decode(&text, 1024).is_err());
        let big = STANDARD.encode([0xFFu8; 64]);
        assert!(decode(&big, 16).is_err());
    }

    #[test]
    fn sniffs_png_and_webp() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0];
        assert_eq!(PhotoFormat::sniff(&png), Some(PhotoFormat::Png));
        let webp = *b"RIFF\0\0\0\0WEBPVP8 ";
        assert_eq!(PhotoFormat::sniff(&webp), Some(PhotoFormat::Webp));
    }

    #[test]
    fn resolve_blocks_traversal() {
        assert!(resolve("uploads", "../etc/passwd").is_err());
        assert!(resolve("uploads", "/etc/passwd").is_err());
        assert_eq!(
            resolve("uploads", "attendance/2026-01-01/a.jpg").unwrap(),
            Path::new("uploads/attendance/2026-01-01/a.jpg")
        );
    }

    #[tokio::test]
    async fn store_writes_under_dated_folder() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        let rel = store(root, date, 7, "in", JPEG_HEAD.to_vec(), PhotoFormat::Jpeg)
            .await
            .unwrap();
        assert!(rel.starts_with("attendance/2026-01-02/7-in-"));
        assert!(rel.ends_with(".jpg"));
        let written = std::fs::read(dir.path().join(&rel)).unwrap();
        assert_eq!(written, JPEG_HEAD);
    }

    #[tokio::test]
    async fn discard_removes_an_unrecorded_photo() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        let rel = store(root, date, 7, "out", JPEG_HEAD.to_vec(), PhotoFormat::Jpeg)
            .await
            .unwrap();
        assert!(dir.path().join(&rel).exists());

        discard(root, &rel).await;
        assert!(!dir.path().join(&rel).exists());

        // already gone or escaping the root: nothing happens
        discard(root, &rel).await;
        discard(root, "../outside.jpg").await;
    }
}
