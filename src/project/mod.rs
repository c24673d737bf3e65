//! Project persistence: one `<name>.playground.json` file per project.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    error::{BridgeError, BridgeResult},
    utils::write_atomic,
};

pub mod cell;
pub mod export;

pub use cell::{Cell, CellKind, CellStatus, Language};

const PROJECT_SUFFIX: &str = ".playground.json";
const LEGACY_FILE: &str = "playground.json";

static NAME_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid name pattern"));

#[derive(Debug)]
pub struct ProjectStore {
    dir: PathBuf,
    default_name: String,
    // project new sessions start on
    last_active: Mutex<String>,
    // serializes read-modify-write cycles on project files
    write_lock: Mutex<()>,
}

impl ProjectStore {
    pub fn new(dir: impl Into<PathBuf>, default_name: impl Into<String>) -> Self {
        let default_name = default_name.into();
        Self {
            dir: dir.into(),
            last_active: Mutex::new(default_name.clone()),
            default_name,
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}{PROJECT_SUFFIX}"))
    }

    pub fn exists(&self, name: &str) -> bool {
        is_valid_name(name) && self.file_path(name).exists()
    }

    /// Project names sorted alphabetically. A legacy `playground.json` is
    /// renamed to the default project on the way; an empty directory still
    /// lists the default name.
    pub fn list(&self) -> BridgeResult<Vec<String>> {
        let mut projects = self.scan()?;

        let legacy = self.dir.join(LEGACY_FILE);
        if !projects.iter().any(|p| p == &self.default_name) && legacy.exists() {
            let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
            fs::rename(&legacy, self.file_path(&self.default_name))?;
            info!(project = %self.default_name, "migrated legacy project file");
            projects.push(self.default_name.clone());
            projects.sort();
        }

        if projects.is_empty() {
            projects.push(self.default_name.clone());
        }
        Ok(projects)
    }

    fn scan(&self) -> BridgeResult<Vec<String>> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names: Vec<String> = read_dir
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter_map(|f| f.strip_suffix(PROJECT_SUFFIX).map(str::to_string))
            .filter(|n| is_valid_name(n))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Create a project holding one starter cell.
    pub fn create(&self, name: &str) -> BridgeResult<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BridgeError::Validation("Project name is required".into()));
        }
        if !is_valid_name(name) {
            return Err(BridgeError::Validation(
                "Project name can only contain letters, numbers, hyphens, and underscores".into(),
            ));
        }

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = self.file_path(name);
        if path.exists() {
            return Err(BridgeError::Validation("Project already exists".into()));
        }
        write_cells(&path, &[starter_cell(name)])?;
        info!(project = name, "created project");
        Ok(name.to_string())
    }

    /// Resolve a switch target. Listed names without a file yet (the
    /// synthesized default) switch to an empty project.
    pub fn switch(&self, name: &str) -> BridgeResult<Vec<Cell>> {
        if name.is_empty() {
            return Err(BridgeError::Validation("Project name is required".into()));
        }
        if !is_valid_name(name) || !self.list()?.iter().any(|p| p == name) {
            return Err(BridgeError::NotFound("Project not found".into()));
        }
        let cells = self.load(name)?.unwrap_or_default();
        *self.last_active.lock().unwrap_or_else(|e| e.into_inner()) = name.to_string();
        info!(project = name, "switched project");
        Ok(cells)
    }

    /// Project a new session starts on: the last switch target, falling back
    /// to the default when that project has since disappeared.
    pub fn last_active(&self) -> String {
        let name = self.last_active.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if name == self.default_name || self.exists(&name) {
            name
        } else {
            self.default_name.clone()
        }
    }

    /// Overwrite the project's file with `cells`.
    pub fn save(&self, name: &str, cells: &[Cell]) -> BridgeResult<()> {
        check_name(name)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        write_cells(&self.file_path(name), cells)
    }

    /// Persisted cells, or `None` when the project was never saved.
    pub fn load(&self, name: &str) -> BridgeResult<Option<Vec<Cell>>> {
        check_name(name)?;
        let path = self.file_path(name);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Write an execution outcome back into the persisted cell. `None` keeps
    /// the previous output. Projects or cells that are not on disk are left
    /// alone.
    pub fn record_outcome(
        &self,
        name: &str,
        cell_id: i64,
        output: Option<Value>,
        status: CellStatus,
    ) -> BridgeResult<bool> {
        check_name(name)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = self.file_path(name);
        if !path.exists() {
            return Ok(false);
        }
        let text = fs::read_to_string(&path)?;
        let mut cells: Vec<Cell> = serde_json::from_str(&text)?;
        let Some(cell) = cells.iter_mut().find(|c| c.id == cell_id) else {
            return Ok(false);
        };
        if output.is_some() {
            cell.output = output;
        }
        cell.status = status;
        write_cells(&path, &cells)?;
        Ok(true)
    }
}

pub fn is_valid_name(name: &str) -> bool {
    NAME_PATTERN.is_match(name)
}

/// Cell ids must be unique within a project.
pub fn check_unique_ids(cells: &[Cell]) -> BridgeResult<()> {
    let mut seen = std::collections::HashSet::new();
    match cells.iter().find(|c| !seen.insert(c.id)) {
        Some(dup) => Err(BridgeError::Validation(format!("duplicate cell id {}", dup.id))),
        None => Ok(()),
    }
}

fn check_name(name: &str) -> BridgeResult<()> {
    if is_valid_name(name) {
        Ok(())
    } else {
        warn!(project = name, "refusing invalid project name");
        Err(BridgeError::Validation(format!("invalid project name: {name}")))
    }
}

fn write_cells(path: &Path, cells: &[Cell]) -> BridgeResult<()> {
    let text = serde_json::to_string_pretty(cells)?;
    write_atomic(path, text.as_bytes())
}

fn starter_cell(name: &str) -> Cell {
    Cell::backend(
        1,
        Language::Javascript,
        "api.js",
        format!("// New project\nlet message = \"Hello from {name}\";\nreturn message;"),
    )
}
