//! Freshness checking
//!
//! Compares generated files on disk against the schema files they came from.
//! Used by `polyglot-gen --check`; generation itself never reads the disk.

use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;
use walkdir::WalkDir;

use super::GeneratedFile;
use crate::error::{CodegenError, Result};
use crate::resolution::Type;

/// Source schema files of `types`, deduplicated, in first-seen order
pub fn sources_of<'a>(types: impl IntoIterator<Item = &'a Type>) -> Vec<PathBuf> {
    let mut sources: Vec<PathBuf> = Vec::new();
    for typ in types {
        if let Some(path) = &typ.file_path {
            if !sources.contains(path) {
                sources.push(path.clone());
            }
        }
    }
    sources
}

/// Every file under `dir` with extension `ext`, sorted
pub fn collect_sources(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().map(|e| e == ext).unwrap_or(false) {
            found.push(path.to_path_buf());
        }
    }
    found.sort();
    Ok(found)
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Fail with `Stale` for the first generated file that is missing under
/// `out_root` or older than the newest of `sources`
pub fn check_fresh(out_root: &Path, files: &[GeneratedFile], sources: &[PathBuf]) -> Result<()> {
    let newest_source = sources.iter().filter_map(|s| modified(s)).max();
    for file in files {
        let path = out_root.join(&file.path);
        let Some(generated) = modified(&path) else {
            return Err(CodegenError::Stale { path: file.path.clone() });
        };
        if let Some(source) = newest_source {
            if generated < source {
                return Err(CodegenError::Stale { path: file.path.clone() });
            }
        }
        debug!(path = %file.path, "fresh");
    }
    Ok(())
}

/// Whether the content on disk already equals the generated content
pub fn is_unchanged(out_root: &Path, file: &GeneratedFile) -> bool {
    std::fs::read_to_string(out_root.join(&file.path))
        .map(|existing| existing == file.content)
        .unwrap_or(false)
}
