//! Source packaging for deployments.

use std::path::Path;

use anyhow::{bail, Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Directory names that are never uploaded.
const ALWAYS_IGNORED: &[&str] = &[".git"];

/// Build a gzipped tarball of `root`.
///
/// Entries whose name matches `ignore` (or [`ALWAYS_IGNORED`]) are skipped
/// together with everything beneath them. Paths inside the archive are
/// relative to `root`.
pub fn package_directory(root: &Path, ignore: &[String]) -> Result<Vec<u8>> {
    if !root.is_dir() {
        bail!("Source directory {} does not exist", root.display());
    }

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut archive = tar::Builder::new(encoder);
    let mut files = 0usize;

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_ignored(entry, root, ignore));
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to read {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("{} is outside {}", entry.path().display(), root.display()))?;
        archive
            .append_path_with_name(entry.path(), relative)
            .with_context(|| format!("Failed to add {} to the archive", relative.display()))?;
        files += 1;
    }

    let encoder = archive.into_inner().context("Failed to finish the archive")?;
    let bytes = encoder.finish().context("Failed to compress the archive")?;
    debug!(root = %root.display(), files, bytes = bytes.len(), "packaged source");
    Ok(bytes)
}

fn is_ignored(entry: &DirEntry, root: &Path, ignore: &[String]) -> bool {
    let name = entry.file_name().to_string_lossy();
    if ALWAYS_IGNORED.contains(&name.as_ref()) {
        return true;
    }
    let relative = entry
        .path()
        .strip_prefix(root)
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .unwrap_or_default();
    ignore.iter().any(|pattern| {
        let pattern = pattern.trim_end_matches('/');
        pattern == name || pattern == relative
    })
}
