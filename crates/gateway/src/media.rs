use std::path::{Path, PathBuf};

use ulid::Ulid;

const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for MediaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for MediaError {}

/// Local directory holding uploaded photos, one subdirectory per collection.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
    max_bytes: usize,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `bytes` under `<root>/<collection>/` and returns the public path
    /// `/images/<collection>/<stored-name>`.
    pub async fn save(
        &self,
        collection: &str,
        original_name: Option<&str>,
        bytes: &[u8],
    ) -> Result<String, MediaError> {
        if bytes.is_empty() {
            return Err(MediaError {
                code: "ERR_INVALID_PARAMS",
                message: "uploaded file is empty".to_string(),
            });
        }
        if bytes.len() > self.max_bytes {
            return Err(MediaError {
                code: "ERR_PAYLOAD_TOO_LARGE",
                message: format!("uploaded file exceeds {} bytes", self.max_bytes),
            });
        }

        let stored_name = stored_file_name(original_name);
        let dir = self.root.join(collection);

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|err| io_error("failed to prepare media directory", err))?;
        tokio::fs::write(dir.join(&stored_name), bytes)
            .await
            .map_err(|err| io_error("failed to write media file", err))?;

        Ok(format!("/images/{}/{}", collection, stored_name))
    }
}

fn io_error(context: &str, err: std::io::Error) -> MediaError {
    tracing::error!(error = %err, "{}", context);
    MediaError {
        code: "ERR_INTERNAL",
        message: "failed to store uploaded file".to_string(),
    }
}

fn stored_file_name(original_name: Option<&str>) -> String {
    let sanitized = original_name.and_then(sanitize_file_name);
    match sanitized {
        Some(name) => format!("{}-{}", Ulid::new().to_string().to_lowercase(), name),
        None => Ulid::new().to_string().to_lowercase(),
    }
}

// Keeps only the final path component and a conservative character set.
fn sanitize_file_name(raw: &str) -> Option<String> {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let mut out = String::with_capacity(last.len().min(MAX_NAME_LEN));

    for ch in last.chars() {
        if out.len() >= MAX_NAME_LEN {
            break;
        }
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
            out.push(ch.to_ascii_lowercase());
        } else if ch == ' ' {
            out.push('_');
        }
    }

    let trimmed = out.trim_start_matches('.').to_string();
    (!trimmed.is_empty()).then_some(trimmed)
}
