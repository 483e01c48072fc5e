//! Uploaded images on the local filesystem.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use tokio::{fs, io::AsyncWriteExt};

use crate::error::{Error, Result};

pub const DEFAULT_CATEGORY: &str = "general";

const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg"];

const SUFFIX_LEN: usize = 7;

// a handful of retries is plenty with 62^7 possible suffixes
const MAX_ATTEMPTS: usize = 8;

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
    url_prefix: String,
    max_bytes: usize,
}

/// Checks an upload category. Categories become directory names.
pub fn check_category(category: &str) -> Result<()> {
    let valid = !category.is_empty()
        && category.len() <= 50
        && category
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
    if !valid {
        return Err(Error::invalid(
            "category: Use lowercase letters, digits and underscores only.",
        ));
    }
    Ok(())
}

/// The lowercased extension of `filename` with its leading dot.
pub fn image_extension(filename: &str) -> Result<String> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|e| ALLOWED_EXTENSIONS.contains(&e.as_str()));
    match ext {
        Some(ext) => Ok(format!(".{ext}")),
        None => Err(Error::Invalid(format!(
            "image: Unsupported file extension. Allowed: {}.",
            ALLOWED_EXTENSIONS.join(", ")
        ))),
    }
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(char::from)
        .collect()
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>, url_prefix: impl Into<String>, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            url_prefix: url_prefix.into(),
            max_bytes,
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The public path of a stored file, e.g. `/media/menu_items/x.jpg`.
    pub fn url_path(&self, relative: &str) -> String {
        format!("{}{relative}", self.url_prefix)
    }

    /// Writes `bytes` to `<category>s/<category>_<timestamp><ext>` below the
    /// root and returns that relative path. A name already taken gets a random
    /// suffix instead of being overwritten.
    pub async fn save(&self, category: &str, filename: &str, bytes: &[u8]) -> Result<String> {
        check_category(category)?;
        let ext = image_extension(filename)?;
        if bytes.is_empty() {
            return Err(Error::invalid("image: The submitted file is empty."));
        }
        if bytes.len() > self.max_bytes {
            return Err(Error::Invalid(format!(
                "image: File too large. The limit is {} bytes.",
                self.max_bytes
            )));
        }

        let dir = format!("{category}s");
        fs::create_dir_all(self.root.join(&dir)).await?;

        let stem = format!("{category}_{}", Utc::now().format("%Y%m%d_%H%M%S"));
        let mut relative = format!("{dir}/{stem}{ext}");
        for _ in 0..MAX_ATTEMPTS {
            let opened = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.root.join(&relative))
                .await;
            match opened {
                Ok(mut file) => {
                    file.write_all(bytes).await?;
                    file.flush().await?;
                    tracing::info!("stored upload {relative} ({} bytes)", bytes.len());
                    return Ok(relative);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    relative = format!("{dir}/{stem}_{}{ext}", random_suffix());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(Error::Io(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free file name for {stem}{ext}"),
        )))
    }
}
