//! EXECUTE: run a cell, publish its result, then run the dependency cascade.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{reply, Responder};
use crate::{
    error::{BridgeError, BridgeResult},
    execution::ExecutionContext,
    project::{Cell, CellStatus, Language},
    protocol::Outbound,
    reactive::Cascade,
    server::AppState,
};

pub async fn run(state: &Arc<AppState>, project: &str, cell_id: i64, language: Language, code: String, out: &Responder) {
    if !run_cell(state, project, cell_id, &language, &code, out).await {
        return;
    }

    let cells = match load_cells(state, project).await {
        Ok(Some(cells)) => cells,
        Ok(None) => return,
        Err(e) => {
            warn!(project, error = %e, "cannot read project for cascade");
            return;
        }
    };

    let mut cascade = Cascade::plan(&cells, cell_id, state.settings.max_cascade);
    if cascade.is_empty() {
        return;
    }
    while let Some(dependent) = cascade.next() {
        let Some(cell) = cells.iter().find(|c| c.id == dependent) else {
            continue;
        };
        debug!(project, trigger = cell_id, cell = dependent, "re-executing dependent");
        if run_cell(state, project, dependent, &cell.language, &cell.code, out).await {
            cascade.mark_refreshed(dependent);
        }
    }
    info!(project, trigger = cell_id, reran = cascade.launched(), "cascade finished");
}

/// Execute one cell and report it. Returns whether it succeeded.
async fn run_cell(
    state: &Arc<AppState>,
    project: &str,
    cell_id: i64,
    language: &Language,
    code: &str,
    out: &Responder,
) -> bool {
    let ctx = ExecutionContext {
        results: state.results.snapshot(project).await,
        env: state.secrets.env(),
    };

    match state.executor.execute(language, code, ctx).await {
        Ok(value) => {
            state.results.publish(project, cell_id, value.clone()).await;
            record(state, project, cell_id, Some(value.clone()), CellStatus::Success).await;
            reply(out, Outbound::Result { cell_id, content: value });
            true
        }
        Err(e) => {
            let message = e.cell_message();
            debug!(project, cell_id, %language, error = %message, "cell failed");
            record(state, project, cell_id, None, CellStatus::Error).await;
            reply(out, Outbound::cell_error(cell_id, message));
            false
        }
    }
}

async fn load_cells(state: &Arc<AppState>, project: &str) -> BridgeResult<Option<Vec<Cell>>> {
    let (state, project) = (Arc::clone(state), project.to_string());
    tokio::task::spawn_blocking(move || state.projects.load(&project))
        .await
        .map_err(|e| BridgeError::Io(std::io::Error::other(e)))?
}

async fn record(
    state: &Arc<AppState>,
    project: &str,
    cell_id: i64,
    output: Option<serde_json::Value>,
    status: CellStatus,
) {
    let (store_state, name) = (Arc::clone(state), project.to_string());
    let written = tokio::task::spawn_blocking(move || {
        store_state.projects.record_outcome(&name, cell_id, output, status)
    })
    .await
    .map_err(|e| BridgeError::Io(std::io::Error::other(e)))
    .and_then(|r| r);
    if let Err(e) = written {
        warn!(project, cell_id, error = %e, "failed to persist execution outcome");
    }
}
