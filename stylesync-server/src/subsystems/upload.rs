//! Scoped temporary storage for uploaded images.
//!
//! Each upload is written to `<dir>/<uuid>-<name>` and owned by a
//! `StoredUpload` guard. Dropping the guard removes the file, so cleanup
//! happens on every exit path of the request that holds it.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncRead, AsyncWriteExt};
use uuid::Uuid;

const DEFAULT_MIME: &str = "image/jpeg";

/// Longest kept name. With the uuid prefix this stays well under the
/// 255 byte file name limit.
const MAX_NAME_BYTES: usize = 100;

/// Extensions longer than this are treated as part of the stem.
const MAX_EXTENSION_BYTES: usize = 16;

#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `bytes` to a fresh file. The directory is created if missing.
    pub async fn store(
        &self,
        bytes: &[u8],
        filename: Option<&str>,
        content_type: Option<&str>,
    ) -> std::io::Result<StoredUpload> {
        self.store_reader(bytes, filename, content_type).await
    }

    /// Copy `reader` into a fresh file. The guard exists before the first
    /// byte is written, so a failed copy leaves nothing behind.
    pub async fn store_reader<R>(
        &self,
        mut reader: R,
        filename: Option<&str>,
        content_type: Option<&str>,
    ) -> std::io::Result<StoredUpload>
    where
        R: AsyncRead + Unpin,
    {
        tokio::fs::create_dir_all(&self.dir).await?;

        let id = Uuid::new_v4();
        let original_name = filename.map(sanitize_filename).unwrap_or_default();
        let file_name = if original_name.is_empty() {
            id.to_string()
        } else {
            format!("{}-{}", id, original_name)
        };

        let upload = StoredUpload {
            id,
            path: self.dir.join(file_name),
            mime_type: resolve_mime(content_type, filename),
            original_name,
        };

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&upload.path)
            .await?;
        let written = tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;

        tracing::debug!(path = %upload.path.display(), bytes = written, mime = %upload.mime_type, "Stored upload");

        Ok(upload)
    }
}

#[derive(Debug)]
pub struct StoredUpload {
    id: Uuid,
    path: PathBuf,
    mime_type: String,
    original_name: String,
}

impl StoredUpload {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}

impl Drop for StoredUpload {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove upload");
            }
        }
    }
}

/// Keep the final path component and only `[A-Za-z0-9._-]`, capped at
/// `MAX_NAME_BYTES` with the extension preserved.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.len() <= MAX_NAME_BYTES {
        return cleaned.to_string();
    }

    // ASCII only from here, so byte offsets are char boundaries.
    let (stem, ext) = match cleaned.rfind('.') {
        Some(dot) if cleaned.len() - dot <= MAX_EXTENSION_BYTES => cleaned.split_at(dot),
        _ => (cleaned, ""),
    };
    let keep = MAX_NAME_BYTES - ext.len();
    format!("{}{}", &stem[..keep.min(stem.len())], ext)
}

/// Multipart content type if it is an image type, else by extension.
pub fn resolve_mime(content_type: Option<&str>, filename: Option<&str>) -> String {
    if let Some(ct) = content_type {
        let ct = ct.split(';').next().unwrap_or(ct).trim();
        if ct.starts_with("image/") {
            return ct.to_string();
        }
    }
    filename
        .and_then(mime_from_extension)
        .unwrap_or(DEFAULT_MIME)
        .to_string()
}

fn mime_from_extension(filename: &str) -> Option<&'static str> {
    let ext = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" => "image/heic",
        "heif" => "image/heif",
        _ => return None,
    };
    Some(mime)
}
