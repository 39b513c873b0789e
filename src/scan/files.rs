//! Working-tree scan of one repository.
//!
//! Walks the filesystem under the repository root (or its configured
//! sub-path), skipping `.git` directories and symlinks, and feeds each
//! file through the scanner with a lazy loader.

use std::path::Path;
use std::time::Instant;

use walkdir::WalkDir;

use super::stats::ScanStats;
use super::{FoundFinding, ScanError, Scanner};

pub(super) fn scan_files<S: Scanner>(
    root: &Path,
    sub_path: Option<&str>,
    scanner: &mut S,
    stats: &ScanStats,
) -> Result<Vec<FoundFinding<S::Finding>>, ScanError> {
    let search_root = match sub_path {
        Some(sub) => root.join(sub),
        None => root.to_owned(),
    };

    let listing_started = Instant::now();
    let mut files = Vec::new();
    for entry in WalkDir::new(&search_root).into_iter().filter_entry(|e| {
        !(e.file_type().is_dir() && e.file_name() == ".git")
    }) {
        let entry = entry.map_err(|err| ScanError::Walk {
            detail: err.to_string(),
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    stats.add_list_files_nanos(listing_started.elapsed().as_nanos() as u64);

    let mut findings = Vec::new();
    for file in files {
        let relative = file
            .strip_prefix(root)
            .unwrap_or(&file)
            .to_string_lossy()
            .into_owned();

        let mut load_nanos = 0u64;
        let mut loader = || {
            let started = Instant::now();
            let data = std::fs::read(&file).unwrap_or_default();
            load_nanos = started.elapsed().as_nanos() as u64;
            stats.add_data_load_nanos(load_nanos);
            stats.add_file(data.len() as u64);
            data
        };

        let started = Instant::now();
        let results = scanner.process(None, &mut loader, &relative);
        let elapsed = started.elapsed().as_nanos() as u64;
        stats.add_query_nanos(elapsed.saturating_sub(load_nanos));

        for finding in results {
            findings.push(FoundFinding {
                finding,
                path: relative.clone(),
                branches: Vec::new(),
                tags: Vec::new(),
                dangling_commit: None,
            });
        }
    }

    Ok(findings)
}
