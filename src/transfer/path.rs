// CLASSIFICATION: COMMUNITY
// Filename: path.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! Request path normalisation for the file-transfer server.

use std::path::{Path, PathBuf};

/// Why a request path cannot be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathRejection {
    /// `http://` and `https://` URIs are not proxied.
    UnsupportedScheme,
}

/// Normalise a client path into a key relative to the served root.
///
/// A case-insensitive `file://` prefix is stripped, HTTP(S) URIs are
/// rejected and every `..` is removed. The remaining non-empty, non-`.`
/// components are joined with single slashes, so spellings of the same file
/// share one key.
pub fn normalize(raw: &str) -> Result<String, PathRejection> {
    let lower = raw.to_ascii_lowercase();
    let rest = if lower.starts_with("file://") {
        &raw["file://".len()..]
    } else if lower.starts_with("http://") || lower.starts_with("https://") {
        return Err(PathRejection::UnsupportedScheme);
    } else {
        raw
    };
    let stripped = rest.replace("..", "");
    let parts: Vec<&str> = stripped
        .split('/')
        .filter(|p| !p.is_empty() && *p != ".")
        .collect();
    Ok(parts.join("/"))
}

/// Join a normalised key onto `root`.
///
/// Only normal components are kept, so the result always stays under `root`.
pub fn resolve(root: &Path, key: &str) -> PathBuf {
    let mut out = root.to_path_buf();
    for part in key.split('/').filter(|p| !p.is_empty() && *p != ".") {
        out.push(part);
    }
    out
}
