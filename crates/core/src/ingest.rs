use crate::config::{extension_of, RunContext};
use crate::error::IngestError;
use crate::extractor::pdf_text;
use crate::models::Document;
use chrono::Utc;
use encoding_rs::{UTF_8, WINDOWS_1251};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Every regular file under `folder`, recursively, in a stable order.
pub fn discover_files(folder: &Path) -> Result<Vec<PathBuf>, IngestError> {
    if !folder.is_dir() {
        return Err(IngestError::InvalidDirectory(folder.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if entry.file_type().is_file() {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    Ok(files)
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Decodes UTF-8 (with or without BOM), falling back to Windows-1251.
pub fn decode_text(bytes: &[u8]) -> String {
    let (text, had_errors) = UTF_8.decode_with_bom_removal(bytes);
    if !had_errors {
        return text.into_owned();
    }

    let (text, _, had_errors) = WINDOWS_1251.decode(bytes);
    if had_errors {
        warn!("text is neither utf-8 nor windows-1251, replacement characters inserted");
    }
    text.into_owned()
}

/// Reads one source file into a [`Document`]. The extension must be allowed.
///
/// PDFs go through their text layer; everything else is decoded as text.
pub fn load_document(path: &Path, context: &RunContext) -> Result<Document, IngestError> {
    let extension = extension_of(path).unwrap_or_default();
    if !context.is_allowed(path) {
        return Err(IngestError::DisallowedExtension {
            path: path.to_path_buf(),
            extension,
        });
    }

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
        })?
        .to_string();

    let bytes = fs::read(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let source_path = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let text = match extension.as_str() {
        "pdf" => pdf_text(&bytes)?,
        _ => decode_text(&bytes),
    };
    debug!(path = %source_path.display(), bytes = bytes.len(), "document loaded");

    Ok(Document {
        document_id: generate_document_id(&source_path),
        source_path: source_path.to_string_lossy().to_string(),
        file_name,
        extension,
        checksum: digest_bytes(&bytes),
        text,
        ingested_at: Utc::now(),
    })
}

/// Stable document id: SHA-256 over the canonical source path.
pub fn generate_document_id(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    format!("{:x}", hasher.finalize())
}
