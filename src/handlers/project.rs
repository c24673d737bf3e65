//! Project commands plus SAVE, LOAD and EXPORT.

use tracing::{info, warn};

use super::{reply, Responder};
use crate::{
    error::{BridgeError, BridgeResult},
    project::{self, export::export_cells, Cell},
    protocol::Outbound,
    reactive,
    server::{AppState, Session},
};

/// Connect-time push: the session's project and, if saved, its cells.
pub fn greet(state: &AppState, session: &Session, out: &Responder) {
    current(state, session, out);
    let project = session.project();
    match state.projects.load(&project) {
        Ok(Some(cells)) => reply(out, Outbound::LoadData { cells }),
        Ok(None) => {}
        Err(e) => warn!(project = %project, error = %e, "failed to load saved project"),
    }
}

pub fn save(state: &AppState, session: &Session, cells: Vec<Cell>, out: &Responder) {
    let project = session.project();
    let checked = project::check_unique_ids(&cells).and_then(|_| reactive::check_acyclic(&cells));
    if let Err(e) = checked {
        reply(out, Outbound::error(format!("Save rejected: {e}")));
        return;
    }
    match state.projects.save(&project, &cells) {
        Ok(()) => {
            info!(project = %project, cells = cells.len(), "project saved");
            reply(out, Outbound::log(format!("Project '{project}' saved to disk!")));
        }
        Err(e) => reply(out, Outbound::error(format!("Failed to save: {e}"))),
    }
}

pub fn load(state: &AppState, session: &Session, out: &Responder) {
    match state.projects.load(&session.project()) {
        Ok(Some(cells)) => reply(out, Outbound::LoadData { cells }),
        Ok(None) => {}
        Err(e) => reply(out, Outbound::error(format!("Failed to load: {e}"))),
    }
}

pub fn export(state: &AppState, cells: Vec<Cell>, out: &Responder) {
    match export_cells(state.projects.dir(), &cells, state.secrets.path()) {
        Ok(dir) => {
            let name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            reply(out, Outbound::log(format!("Successfully exported to /{name}")));
        }
        Err(e) => reply(out, Outbound::error(format!("Export failed: {e}"))),
    }
}

pub fn list(state: &AppState, session: &Session, out: &Responder) {
    match state.projects.list() {
        Ok(projects) => reply(
            out,
            Outbound::ProjectsList { projects, current_project: session.project() },
        ),
        Err(e) => project_error(out, format!("Failed to list projects: {e}")),
    }
}

pub fn create(state: &AppState, name: Option<String>, out: &Responder) {
    let result = required(name).and_then(|name| {
        let created = state.projects.create(&name)?;
        Ok((created, state.projects.list()?))
    });
    match result {
        Ok((project_name, projects)) => reply(out, Outbound::ProjectCreated { project_name, projects }),
        Err(e) => project_error(out, e.to_string()),
    }
}

pub fn switch(state: &AppState, session: &Session, name: Option<String>, out: &Responder) {
    let result = required(name).and_then(|name| {
        let cells = state.projects.switch(&name)?;
        session.set_project(&name);
        Ok((name, cells, state.projects.list()?))
    });
    match result {
        Ok((project_name, cells, projects)) => {
            reply(out, Outbound::ProjectSwitched { project_name, cells, projects })
        }
        Err(e) => project_error(out, e.to_string()),
    }
}

pub fn current(state: &AppState, session: &Session, out: &Responder) {
    match state.projects.list() {
        Ok(projects) => reply(
            out,
            Outbound::CurrentProject { project_name: session.project(), projects },
        ),
        Err(e) => project_error(out, format!("Failed to get current project: {e}")),
    }
}

fn required(name: Option<String>) -> BridgeResult<String> {
    name.filter(|n| !n.trim().is_empty())
        .ok_or_else(|| BridgeError::Validation("Project name is required".into()))
}

fn project_error(out: &Responder, message: String) {
    reply(out, Outbound::ProjectError { message });
}
