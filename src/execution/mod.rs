//! Execution engine: dispatches a cell to the local sandbox, the trusted
//! shell escape, or the remote delegate.

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{
    config::Settings,
    error::{BridgeError, BridgeResult},
    external::delegate::DelegateClient,
    project::Language,
    protocol::Outbound,
};

pub mod local;
pub mod shell;

pub use local::LocalSandbox;

/// Prefix that turns a local cell into a host shell command.
pub const SHELL_ESCAPE: char = '!';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Log,
    Debug,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Log => "log",
            LogLevel::Debug => "debug",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Output channel of sandboxed code. Every line goes to all connections.
#[derive(Debug, Clone)]
pub struct Console {
    tx: broadcast::Sender<Outbound>,
}

impl Console {
    pub fn new(tx: broadcast::Sender<Outbound>) -> Self {
        Self { tx }
    }

    pub fn emit(&self, level: LogLevel, content: &str) {
        // no receivers just means no one is connected
        let _ = self.tx.send(Outbound::Log {
            level: Some(level.as_str().to_string()),
            content: content.to_string(),
        });
    }
}

/// Per-call inputs visible to sandboxed code.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Result namespace of the calling project, keyed `cell_<id>`.
    pub results: HashMap<String, Value>,
    /// Secrets environment view.
    pub env: HashMap<String, String>,
}

pub struct Executor {
    sandbox: Arc<LocalSandbox>,
    delegate: DelegateClient,
    allow_shell_escape: bool,
    workdir: PathBuf,
}

impl Executor {
    pub fn new(settings: &Settings, console: Console) -> BridgeResult<Self> {
        let delegate = DelegateClient::new(&settings.delegate_url, settings.delegate_timeout)?;
        Ok(Self {
            sandbox: Arc::new(LocalSandbox::new(console, settings.max_operations)),
            delegate,
            allow_shell_escape: settings.allow_shell_escape,
            workdir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        })
    }

    /// Run `code` and return its result value.
    pub async fn execute(&self, language: &Language, code: &str, ctx: ExecutionContext) -> BridgeResult<Value> {
        if language.is_local() {
            self.execute_local(code, ctx).await
        } else {
            debug!(%language, "delegating cell");
            self.delegate.run(language, code).await
        }
    }

    async fn execute_local(&self, code: &str, ctx: ExecutionContext) -> BridgeResult<Value> {
        if let Some(command) = code.trim().strip_prefix(SHELL_ESCAPE) {
            if !self.allow_shell_escape {
                warn!("shell escape refused: trusted local execution is disabled");
                return Err(BridgeError::Execution(
                    "Shell escape is disabled. Start the bridge with --allow-shell to enable trusted local execution".into(),
                ));
            }
            return shell::run(command, &self.workdir).await.map(Value::String);
        }

        let sandbox = Arc::clone(&self.sandbox);
        let code = code.to_string();
        tokio::task::spawn_blocking(move || sandbox.eval(&code, &ctx))
            .await
            .map_err(|e| BridgeError::Execution(format!("sandbox task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;

    fn executor() -> Executor {
        // nothing listens on port 1, so only local languages can succeed
        let cfg = Config::from_pairs([("DELEGATE_URL", "http://127.0.0.1:1"), ("REQUEST_TIMEOUT", "5")]);
        let settings = Settings::from_config(&cfg).unwrap();
        let (tx, _rx) = broadcast::channel(8);
        Executor::new(&settings, Console::new(tx)).unwrap()
    }

    #[tokio::test]
    async fn test_javascript_runs_in_the_sandbox() {
        let exec = executor();
        let out = exec
            .execute(&Language::Javascript, "return 1+1", ExecutionContext::default())
            .await
            .unwrap();
        assert_eq!(out, json!(2));
        let out = exec.execute(&Language::default(), "return 3", ExecutionContext::default()).await.unwrap();
        assert_eq!(out, json!(3));
    }

    #[tokio::test]
    async fn test_shell_escape_is_refused_by_default() {
        let err = executor()
            .execute(&Language::Javascript, "!echo hi", ExecutionContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Execution(_)));
        assert!(err.to_string().contains("--allow-shell"));
    }

    #[tokio::test]
    async fn test_other_languages_are_delegated() {
        let err = executor()
            .execute(&Language::Python, "print(1)", ExecutionContext::default())
            .await
            .unwrap_err();
        assert!(err.cell_message().starts_with("Cloud Error: "));
    }
}
