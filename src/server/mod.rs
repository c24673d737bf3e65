//! WebSocket server.
//!
//! Exposes the Axum `/` upgrade route and `/healthz`. Each socket gets a
//! [`Session`] holding its project handle, a writer task that merges direct
//! replies with the console broadcast, and a reader loop feeding frames to
//! the command router.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, RwLock,
};

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::{
    net::TcpListener,
    sync::{broadcast, mpsc},
};
use tracing::{debug, error, info, warn};

use crate::{
    config::Settings,
    error::BridgeResult,
    execution::{Console, Executor},
    handlers::{self, project::greet},
    project::ProjectStore,
    protocol::Outbound,
    reactive::ResultNamespace,
    secrets::SecretStore,
};

const LOG_CHANNEL_CAPACITY: usize = 1024;

/// Process-wide state shared by every connection.
pub struct AppState {
    pub settings: Settings,
    pub projects: ProjectStore,
    pub secrets: SecretStore,
    pub executor: Executor,
    pub results: ResultNamespace,
    pub logs: broadcast::Sender<Outbound>,
    next_session: AtomicU64,
}

impl AppState {
    pub fn new(settings: Settings) -> BridgeResult<Arc<Self>> {
        let (logs, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);
        let executor = Executor::new(&settings, Console::new(logs.clone()))?;
        Ok(Arc::new(Self {
            projects: ProjectStore::new(&settings.data_dir, settings.default_project.clone()),
            secrets: SecretStore::open(&settings.secrets_path),
            executor,
            results: ResultNamespace::new(),
            logs,
            next_session: AtomicU64::new(1),
            settings,
        }))
    }

    pub fn open_session(&self) -> Arc<Session> {
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        Arc::new(Session::new(id, self.projects.last_active()))
    }
}

/// One connection's view: which project its commands act on.
#[derive(Debug)]
pub struct Session {
    id: u64,
    project: RwLock<String>,
}

impl Session {
    pub fn new(id: u64, project: impl Into<String>) -> Self {
        Self { id, project: RwLock::new(project.into()) }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn project(&self) -> String {
        self.project.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_project(&self, name: &str) {
        *self.project.write().unwrap_or_else(|e| e.into_inner()) = name.to_string();
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(settings: Settings) -> Result<()> {
    let bind = settings.bind;
    let state = AppState::new(settings)?;
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(addr = %listener.local_addr()?, "bridge listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    info!("bridge stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(?e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session = state.open_session();
    info!(session = session.id(), project = %session.project(), "client connected");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let mut logs = state.logs.subscribe();

    let writer = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                direct = rx.recv() => match direct {
                    Some(frame) => frame,
                    None => break,
                },
                line = logs.recv() => match line {
                    Ok(frame) => frame,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "console broadcast lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };
            let text = match frame.to_json() {
                Ok(text) => text,
                Err(e) => {
                    error!(?e, "failed to encode frame");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let (greeter, greeted, greet_tx) = (Arc::clone(&state), Arc::clone(&session), tx.clone());
    if let Err(e) = tokio::task::spawn_blocking(move || greet(&greeter, &greeted, &greet_tx)).await {
        error!(session = session.id(), ?e, "connect push failed");
    }

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => handlers::route(&state, &session, &text, &tx).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(session = session.id(), ?e, "websocket error");
                break;
            }
        }
    }

    writer.abort();
    info!(session = session.id(), "client disconnected");
}
