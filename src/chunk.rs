use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::State;

/// One retrievable unit: a serialized category block plus its provenance.
/// A chunk's ordinal is its line position in the chunk store and must match
/// the position of its vector in the index.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Metadata {
    pub category: String,
    pub source_file: String,
}

#[derive(Debug, Default)]
pub struct BuildSummary {
    pub files_found: usize,
    pub files_skipped: usize,
    pub rows_skipped: usize,
    pub chunks: usize,
}

/// Recursively collect `*.csv` files under `root`, sorted within each
/// directory so the chunk ordering is stable across runs.
pub fn find_csv_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries: Vec<PathBuf> = fs::read_dir(root)
        .with_context(|| format!("Failed to read source directory '{}'", root.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            files.extend(find_csv_files(&path)?);
        } else if path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false)
        {
            files.push(path);
        }
    }
    Ok(files)
}

/// Deterministic chunk text for one group: the key line followed by the
/// member items joined with "; " in row order.
pub fn serialize_group(category: &str, items: &[String]) -> String {
    format!("Category: {}\nItems: {}", category, items.join("; "))
}

/// Build one chunk per distinct group value across every CSV under the
/// configured source directory. A file missing the required columns, or one
/// that cannot be parsed, is skipped with a diagnostic; the run continues.
pub fn build_chunks(state: &State) -> Result<(Vec<Chunk>, BuildSummary)> {
    let root = PathBuf::from(&state.source_dir);
    let csv_files = find_csv_files(&root)?;

    let mut summary = BuildSummary {
        files_found: csv_files.len(),
        ..BuildSummary::default()
    };
    let mut chunks = Vec::new();

    for path in &csv_files {
        match chunks_from_file(path, &root, state, &mut summary.rows_skipped) {
            Ok(file_chunks) => chunks.extend(file_chunks),
            Err(err) => {
                eprintln!("Warning: Skipping '{}': {:#}", path.display(), err);
                summary.files_skipped += 1;
            }
        }
    }

    summary.chunks = chunks.len();
    Ok((chunks, summary))
}

fn chunks_from_file(
    path: &Path,
    root: &Path,
    state: &State,
    rows_skipped: &mut usize,
) -> Result<Vec<Chunk>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open CSV file '{}'", path.display()))?;

    let headers = reader.headers().context("Failed to read CSV header")?.clone();
    let group_idx = headers
        .iter()
        .position(|h| h == state.group_column)
        .with_context(|| format!("required column '{}' missing", state.group_column))?;
    let item_idx = headers
        .iter()
        .position(|h| h == state.item_column)
        .with_context(|| format!("required column '{}' missing", state.item_column))?;

    // BTreeMap gives a sorted, reproducible group order; item order inside
    // each group preserves row order.
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("invalid CSV record at row {}", row + 2))?;
        let key = record.get(group_idx).unwrap_or("").trim();
        let item = record.get(item_idx).unwrap_or("").trim();
        if key.is_empty() || item.is_empty() {
            eprintln!(
                "Warning: Skipping row {} of '{}': empty group key or item",
                row + 2,
                path.display()
            );
            *rows_skipped += 1;
            continue;
        }
        groups
            .entry(key.to_string())
            .or_insert_with(Vec::new)
            .push(item.to_string());
    }

    let source_file = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned();

    Ok(groups
        .into_iter()
        .map(|(category, items)| Chunk {
            text: serialize_group(&category, &items),
            metadata: Metadata {
                category,
                source_file: source_file.clone(),
            },
        })
        .collect())
}
