//! Panel discovery — sorted listing of recognized image files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;

/// Extensions the pipeline recognizes as panel sources.
const PANEL_EXTENSIONS: [&str; 5] = ["jp2", "png", "jpg", "jpeg", "webp"];

/// List panel image files in `dir`, lexicographically sorted.
///
/// Non-files and unrecognized extensions are skipped; extension matching
/// is case-insensitive.
pub fn list_panels(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read panel directory {}", dir.display()))?;

    let mut panels = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("failed to read entry in {}", dir.display()))?
            .path();
        if !path.is_file() {
            continue;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if PANEL_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
            panels.push(path);
        }
    }
    panels.sort();
    info!("discover: {} panel(s) in {}", panels.len(), dir.display());
    Ok(panels)
}
