//! Attachment loading
//!
//! Turns a local file into an inline [`FileDescriptor`] carrying a data URL,
//! the shape the backend accepts in the `files` field of a chat request.

use std::path::Path;

use base64::Engine;

use crate::error::{CopilotError, Result};
use crate::session::FileDescriptor;

/// Largest attachment accepted (the backend rejects bodies above 10 MB)
pub const MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;

const FALLBACK_MIME: &str = "application/octet-stream";

/// Read a file and wrap it as an inline attachment
///
/// # Errors
///
/// Returns [`CopilotError::Validation`] if the path is not a regular file or
/// exceeds [`MAX_ATTACHMENT_BYTES`], and an IO error if it cannot be read.
///
/// # Examples
///
/// ```no_run
/// use copilot_sidebar::attachments::file_descriptor_from_path;
///
/// # async fn example() -> copilot_sidebar::error::Result<()> {
/// let file = file_descriptor_from_path(std::path::Path::new("notes.md")).await?;
/// assert!(file.data.starts_with("data:text/markdown;base64,"));
/// # Ok(())
/// # }
/// ```
pub async fn file_descriptor_from_path(path: &Path) -> Result<FileDescriptor> {
    let metadata = tokio::fs::metadata(path).await?;
    if !metadata.is_file() {
        return Err(CopilotError::Validation(format!(
            "Not a regular file: {}",
            path.display()
        ))
        .into());
    }
    if metadata.len() > MAX_ATTACHMENT_BYTES {
        return Err(CopilotError::Validation(format!(
            "Attachment {} is {} bytes, limit is {}",
            path.display(),
            metadata.len(),
            MAX_ATTACHMENT_BYTES
        ))
        .into());
    }

    let bytes = tokio::fs::read(path).await?;
    let mime_type = detect_mime_type(path, &bytes);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "attachment".to_string());

    tracing::debug!(name = %name, mime_type = %mime_type, size = bytes.len(), "Loaded attachment");
    Ok(FileDescriptor::inline(
        to_data_url(&mime_type, &bytes),
        mime_type,
        name,
    ))
}

/// Build a `data:<mime>;base64,<payload>` URL
pub fn to_data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime_type,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Detect a MIME type from content first, then from the extension
pub fn detect_mime_type(path: &Path, bytes: &[u8]) -> String {
    if let Some(mime) = image::guess_format(bytes).ok().and_then(image_mime_type) {
        return mime.to_string();
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| extension_mime_type(&ext.to_ascii_lowercase()))
        .unwrap_or(FALLBACK_MIME)
        .to_string()
}

fn image_mime_type(format: image::ImageFormat) -> Option<&'static str> {
    use image::ImageFormat;

    let mime = match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Gif => "image/gif",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::Tiff => "image/tiff",
        ImageFormat::Ico => "image/x-icon",
        ImageFormat::Avif => "image/avif",
        _ => return None,
    };
    Some(mime)
}

fn extension_mime_type(ext: &str) -> Option<&'static str> {
    let mime = match ext {
        "txt" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "text/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "yaml" | "yml" => "application/yaml",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        _ => return None,
    };
    Some(mime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn test_png_detected_by_content() {
        assert_eq!(detect_mime_type(Path::new("no_extension"), PNG_MAGIC), "image/png");
    }

    #[test]
    fn test_extension_fallback() {
        assert_eq!(detect_mime_type(Path::new("README.MD"), b"# hi"), "text/markdown");
        assert_eq!(detect_mime_type(Path::new("blob.bin"), b"\0\x01"), FALLBACK_MIME);
    }

    #[test]
    fn test_data_url() {
        assert_eq!(to_data_url("text/plain", b"hi"), "data:text/plain;base64,aGk=");
    }

    #[tokio::test]
    async fn test_file_descriptor_from_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello").unwrap();

        let file = file_descriptor_from_path(&path).await.unwrap();
        assert_eq!(file.kind, "inline");
        assert_eq!(file.name, "notes.txt");
        assert_eq!(file.mime_type, "text/plain");
        assert_eq!(file.data, "data:text/plain;base64,aGVsbG8=");
    }

    #[tokio::test]
    async fn test_directory_is_rejected() {
        let dir = tempdir().unwrap();
        let err = file_descriptor_from_path(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("Not a regular file"));
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        assert!(file_descriptor_from_path(Path::new("/definitely/not/here.txt"))
            .await
            .is_err());
    }
}
