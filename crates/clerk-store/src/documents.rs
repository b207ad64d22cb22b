//! User documents and their parse cache.
//!
//! Text extracted from a document is cached next to it in `<name>.parsed`.
//! The cache is valid while it is at least as new as its source. Images are
//! returned as `IMAGE_BASE64:<mime>:<base64>` and never cached.

use std::{
    path::{Component, Path, PathBuf},
    time::SystemTime,
};

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DocumentError;

const PARSED_SUFFIX: &str = ".parsed";
const IMAGE_PREFIX: &str = "IMAGE_BASE64";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Pdf,
    Text,
    Image(&'static str),
}

impl Kind {
    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "pdf" => Some(Self::Pdf),
            "txt" | "md" | "csv" => Some(Self::Text),
            "jpg" | "jpeg" => Some(Self::Image("image/jpeg")),
            "png" => Some(Self::Image("image/png")),
            "webp" => Some(Self::Image("image/webp")),
            _ => None,
        }
    }
}

/// Listing entry for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub filename: String,
    pub size: u64,
    /// A valid parse cache exists.
    pub parsed: bool,
    pub modified: Option<DateTime<Utc>>,
}

/// Documents directory.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    dir: PathBuf,
}

fn parsed_path(original: &Path) -> PathBuf {
    let mut name = original.as_os_str().to_os_string();
    name.push(PARSED_SUFFIX);
    PathBuf::from(name)
}

async fn modified(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

async fn cache_is_valid(original: &Path, cache: &Path) -> bool {
    match (modified(cache).await, modified(original).await) {
        (Some(cache), Some(source)) => cache >= source,
        _ => false,
    }
}

fn is_visible_document(name: &str) -> bool {
    !name.starts_with('.') && !name.ends_with(PARSED_SUFFIX)
}

impl DocumentStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Names of visible documents, sorted.
    async fn names(&self) -> Result<Vec<String>, DocumentError> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if is_visible_document(&name) && entry.file_type().await?.is_file() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// List documents with size, modification time and cache status.
    ///
    /// A missing directory lists as empty.
    ///
    /// # Errors
    /// Returns error if the directory cannot be read.
    pub async fn list(&self) -> Result<Vec<DocumentInfo>, DocumentError> {
        let mut documents = Vec::new();
        for filename in self.names().await? {
            let path = self.dir.join(&filename);
            let (size, modified) = match tokio::fs::metadata(&path).await {
                Ok(meta) => (meta.len(), meta.modified().ok().map(DateTime::<Utc>::from)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "could not stat document");
                    (0, None)
                }
            };
            let parsed = cache_is_valid(&path, &parsed_path(&path)).await;
            documents.push(DocumentInfo {
                filename,
                size,
                parsed,
                modified,
            });
        }
        Ok(documents)
    }

    /// Number of visible documents.
    ///
    /// # Errors
    /// Returns error if the directory cannot be read.
    pub async fn count(&self) -> Result<usize, DocumentError> {
        Ok(self.names().await?.len())
    }

    /// Extract the content of `name`.
    ///
    /// # Errors
    /// Returns error if the document is missing, unsupported or unreadable.
    pub async fn parse(&self, name: &str) -> Result<String, DocumentError> {
        let mut components = Path::new(name).components();
        if !matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        ) {
            return Err(DocumentError::InvalidName(name.to_string()));
        }

        if !tokio::fs::try_exists(&self.dir).await.unwrap_or(false) {
            return Err(DocumentError::MissingDirectory(self.dir.clone()));
        }

        let path = self.dir.join(name);
        let meta = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DocumentError::NotFound {
                    name: name.to_string(),
                    available: self.names().await?,
                });
            }
            Err(e) => return Err(e.into()),
        };
        if !meta.is_file() {
            return Err(DocumentError::NotAFile(name.to_string()));
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let kind = Kind::from_extension(&ext).ok_or_else(|| DocumentError::Unsupported {
            name: name.to_string(),
            ext: format!(".{ext}"),
        })?;

        if let Kind::Image(mime) = kind {
            let raw = tokio::fs::read(&path).await?;
            return Ok(format!("{IMAGE_PREFIX}:{mime}:{}", STANDARD.encode(raw)));
        }

        let cache = parsed_path(&path);
        if cache_is_valid(&path, &cache).await {
            tracing::debug!(document = name, "using cached parse");
            return Ok(tokio::fs::read_to_string(&cache).await?);
        }

        let text = match kind {
            Kind::Pdf => extract_pdf(name, path.clone()).await?,
            _ => tokio::fs::read_to_string(&path).await?,
        };

        if let Err(e) = tokio::fs::write(&cache, &text).await {
            tracing::warn!(document = name, error = %e, "could not write parse cache");
        } else {
            tracing::debug!(document = name, "cached parse");
        }
        Ok(text)
    }
}

async fn extract_pdf(name: &str, path: PathBuf) -> Result<String, DocumentError> {
    let parse_err = |message: String| DocumentError::Parse {
        name: name.to_string(),
        message,
    };
    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text(path))
        .await
        .map_err(|e| parse_err(e.to_string()))?
        .map_err(|e| parse_err(e.to_string()))?;

    let text = text.trim();
    if text.is_empty() {
        return Ok(format!("WARNING: No extractable text found in PDF {name:?}."));
    }
    Ok(text.to_string())
}
