//! File upload safety: extension normalization, image sniffing and
//! containment of stored paths inside the upload directory.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Image extensions accepted for stored uploads.
pub const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".webp", ".gif", ".bmp"];

/// Lower-cased extension (with dot) of an uploaded filename.
///
/// Missing or unrecognized extensions become `.png`.
pub fn upload_extension(filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    match name.rfind('.') {
        Some(pos) if pos > 0 => {
            let ext = name[pos..].to_lowercase();
            if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
                ext
            } else {
                ".png".to_string()
            }
        }
        _ => ".png".to_string(),
    }
}

/// Whether the bytes start with a known image signature.
pub fn is_image(data: &[u8]) -> bool {
    infer::get(data).is_some_and(|kind| kind.mime_type().starts_with("image/"))
}

/// MIME type for serving a stored file, from magic bytes then extension.
pub fn content_type_for(path: &Path, data: &[u8]) -> &'static str {
    if let Some(kind) = infer::get(data) {
        return kind.mime_type();
    }
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// Join a client-supplied relative path onto `root`, refusing escapes.
///
/// Absolute paths, `..` and prefix components are rejected.
pub fn resolve_within(root: &Path, relative: &str) -> Result<PathBuf> {
    let rel = Path::new(relative);
    if relative.is_empty() || relative.contains('\0') {
        return Err(Error::InvalidInput("Invalid file path".to_string()));
    }
    for component in rel.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(Error::InvalidInput("Invalid file path".to_string())),
        }
    }
    Ok(root.join(rel))
}
