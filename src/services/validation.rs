use std::path::Path;

/// Video container extensions accepted for upload.
pub const ALLOWED_VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "webm", "flv", "wmv"];

/// Longest sanitized filename kept on disk.
const MAX_FILENAME_LEN: usize = 120;

/// Check an uploaded file's name and size before it is written to disk.
pub fn validate_upload(filename: &str, size: usize, max_bytes: usize) -> Result<(), ValidationError> {
    if size == 0 {
        return Err(ValidationError::EmptyFile);
    }
    if size > max_bytes {
        return Err(ValidationError::TooLarge { size, max: max_bytes });
    }

    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| ValidationError::UnsupportedExtension(filename.to_string()))?;

    if !ALLOWED_VIDEO_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ValidationError::UnsupportedExtension(extension));
    }
    Ok(())
}

/// Reduce a client-supplied filename to a safe single path component.
///
/// Directory parts are stripped and anything outside `[A-Za-z0-9._-]`
/// becomes `_`.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let mut cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.len() != cleaned.len() {
        cleaned = trimmed.to_string();
    }

    if cleaned.len() > MAX_FILENAME_LEN {
        // Keep the extension when truncating.
        let ext = Path::new(&cleaned)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default();
        let keep = MAX_FILENAME_LEN.saturating_sub(ext.len());
        cleaned = format!("{}{}", &cleaned[..keep], ext);
    }

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Remote sources must be plain http(s) URLs.
pub fn validate_remote_url(url: &str) -> Result<(), ValidationError> {
    let lower = url.trim().to_ascii_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
        .ok_or_else(|| ValidationError::UnsupportedScheme(url.to_string()))?;
    if rest.is_empty() || rest.starts_with('/') {
        return Err(ValidationError::UnsupportedScheme(url.to_string()));
    }
    Ok(())
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Uploaded file is empty")]
    EmptyFile,

    #[error("File of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },

    #[error("Unsupported video format: {0}")]
    UnsupportedExtension(String),

    #[error("Only http and https URLs are supported: {0}")]
    UnsupportedScheme(String),
}
