use std::path::{Path, PathBuf};

use url::Url;

use super::ImportError;

/// Resolves a file reference to an archive path under `files_root`.
///
/// Accepted forms: `file://` URLs, `/files/<name>` and `/private/files/<name>`,
/// any other `/`-prefixed path (relative to the root), and a bare name, which
/// is looked up in `/private/files`.
pub fn resolve_file_reference(files_root: &Path, reference: &str) -> Result<PathBuf, ImportError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(ImportError::InvalidArgument(
            "file reference is required".to_string(),
        ));
    }

    let path = if reference.starts_with("file://") {
        let url = Url::parse(reference).map_err(|e| {
            ImportError::InvalidArgument(format!("invalid file URL {}: {}", reference, e))
        })?;
        url.to_file_path().map_err(|_| {
            ImportError::InvalidArgument(format!("not a local file URL: {}", reference))
        })?
    } else {
        let normalized = if reference.starts_with('/') {
            reference.to_string()
        } else {
            format!("/private/files/{}", reference)
        };
        files_root.join(normalized.trim_start_matches('/'))
    };

    if !path.is_file() {
        return Err(ImportError::ArchiveNotFound(path));
    }
    Ok(path)
}
