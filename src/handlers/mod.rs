//! Command router: authenticates inbound frames and dispatches them.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::{
    protocol::{self, Command, Outbound},
    server::{AppState, Session},
};

pub mod env;
pub mod execute;
pub mod project;

/// Frames addressed to the originating connection only.
pub type Responder = mpsc::UnboundedSender<Outbound>;

pub(crate) fn reply(out: &Responder, frame: Outbound) {
    // a closed channel means the connection is gone; nothing left to tell it
    let _ = out.send(frame);
}

/// Handle one raw text frame. Frames with a bad token, malformed payloads
/// and unknown commands produce no response at all.
pub async fn route(state: &Arc<AppState>, session: &Arc<Session>, raw: &str, out: &Responder) {
    let Some(envelope) = protocol::authenticate(raw, &state.settings.token) else {
        debug!(session = session.id(), "dropping unauthenticated frame");
        return;
    };
    let Some(command) = protocol::parse_command(envelope) else {
        debug!(session = session.id(), "dropping unrecognized command");
        return;
    };
    debug!(session = session.id(), command = command.name(), "dispatching");
    dispatch(state, session, command, out).await;
}

pub async fn dispatch(state: &Arc<AppState>, session: &Arc<Session>, command: Command, out: &Responder) {
    if let Command::Execute { cell_id, code, language } = command {
        // Executions run on their own so a slow cell never holds up the
        // rest of this connection's commands.
        let state = Arc::clone(state);
        let project = session.project();
        let out = out.clone();
        let language = language.filter(|l| !l.as_str().is_empty()).unwrap_or_default();
        tokio::spawn(async move {
            execute::run(&state, &project, cell_id, language, code, &out).await;
        });
        return;
    }

    // Store commands do file I/O: run them on the blocking pool, awaited so
    // they still complete in arrival order.
    let name = command.name();
    let (state, session, out) = (Arc::clone(state), Arc::clone(session), out.clone());
    let handled = tokio::task::spawn_blocking(move || handle_store_command(&state, &session, command, &out)).await;
    if let Err(e) = handled {
        error!(command = name, ?e, "command task failed");
    }
}

fn handle_store_command(state: &AppState, session: &Session, command: Command, out: &Responder) {
    match command {
        // dispatched asynchronously above
        Command::Execute { .. } => {}
        Command::Save { cells } => project::save(state, session, cells, out),
        Command::Load => project::load(state, session, out),
        Command::Export { cells } => project::export(state, cells, out),
        Command::ListProjects => project::list(state, session, out),
        Command::CreateProject { project_name } => project::create(state, project_name, out),
        Command::SwitchProject { project_name } => project::switch(state, session, project_name, out),
        Command::GetCurrentProject => project::current(state, session, out),
        Command::GetEnvVars => env::list(state, out),
        Command::AddEnvVar { key, value } => env::add(state, key, value, out),
        Command::DeleteEnvVar { key } => env::delete(state, key, out),
        Command::GetSecrets => env::get_secrets(state, out),
        Command::SaveSecrets { secrets } => env::save_secrets(state, secrets, out),
    }
}
