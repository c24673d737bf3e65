//! Export cells as plain source files.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::Utc;
use tracing::info;

use super::Cell;
use crate::error::BridgeResult;

/// Write each cell into a fresh `exports_<unix millis>` directory under
/// `root`, plus a copy of the secrets file when one exists. Returns the
/// created directory.
pub fn export_cells(root: &Path, cells: &[Cell], secrets: &Path) -> BridgeResult<PathBuf> {
    let dir = root.join(format!("exports_{}", Utc::now().timestamp_millis()));
    fs::create_dir_all(root)?;
    fs::create_dir(&dir)?;

    for cell in cells {
        fs::write(dir.join(cell.export_name()), &cell.code)?;
    }

    if secrets.exists() {
        fs::copy(secrets, dir.join(".env"))?;
        info!("copied secrets file to export");
    }

    info!(count = cells.len(), dir = %dir.display(), "exported cells");
    Ok(dir)
}
