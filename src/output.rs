// src/output.rs

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;

use crate::errors::K2rError;
use crate::types::Selection;

/// Run-level metadata written alongside the selections.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    pub k2r_version: String,
    pub sample: String,
    pub timestamp: String,
    pub threshold: u64,
    /// Taxon ids of the selected references, filled in at write time.
    pub selected: Vec<u32>,
}

impl RunMetadata {
    pub fn new(sample: &str, threshold: u64) -> Self {
        RunMetadata {
            k2r_version: env!("CARGO_PKG_VERSION").to_string(),
            sample: sample.to_string(),
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            threshold,
            selected: Vec::new(),
        }
    }
}

#[derive(Serialize)]
struct OutputDocument<'a> {
    metadata: &'a RunMetadata,
    outputs: &'a BTreeMap<u32, Selection>,
}

/// `<out_dir>/<sample><suffix>.json`, with the suffix normalized to start
/// with `_` or `.` and any stray `.json` stripped.
pub fn output_path(out_dir: &Path, sample: &str, suffix: &str) -> PathBuf {
    let mut suffix = suffix.replace(".json", "");
    if !suffix.starts_with('_') && !suffix.starts_with('.') {
        suffix.insert(0, '_');
    }
    out_dir.join(format!("{sample}{suffix}.json"))
}

/// Writes the output document. A run with no selections logs a warning and
/// writes nothing.
pub fn write_json(
    path: &Path,
    mut metadata: RunMetadata,
    selections: &BTreeMap<u32, Selection>,
) -> Result<(), K2rError> {
    if selections.is_empty() {
        log::warn!("no suitable references found in sample: {}", metadata.sample);
        return Ok(());
    }
    metadata.selected = selections.keys().copied().collect();
    let document = OutputDocument {
        metadata: &metadata,
        outputs: selections,
    };
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, &document)?;
    log::info!("output written to {}", path.display());
    Ok(())
}
