use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{
    error::{BridgeError, BridgeResult},
    project::Language,
};

/// Client for a Piston-compatible remote execution service.
#[derive(Debug, Clone)]
pub struct DelegateClient {
    client: Client,
    base: String,
}

#[derive(Debug, Serialize)]
struct ExecuteRequest<'a> {
    language: &'a str,
    version: &'a str,
    files: [SourceFile<'a>; 1],
}

#[derive(Debug, Serialize)]
struct SourceFile<'a> {
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExecuteResponse {
    run: Option<RunStage>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunStage {
    #[serde(default)]
    output: Option<String>,
}

impl DelegateClient {
    pub fn new(base: &str, timeout: Option<Duration>) -> BridgeResult<Self> {
        let mut builder = Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let client = builder
            .build()
            .map_err(|e| BridgeError::Delegate(e.to_string()))?;
        Ok(Self { client, base: base.trim_end_matches('/').to_string() })
    }

    /// Run `code` remotely and interpret its captured output.
    pub async fn run(&self, language: &Language, code: &str) -> BridgeResult<Value> {
        let output = self.execute(language.as_str(), code).await?;
        Ok(interpret_output(&output))
    }

    async fn execute(&self, language: &str, code: &str) -> BridgeResult<String> {
        let url = format!("{}/execute", self.base);
        let body = ExecuteRequest { language, version: "*", files: [SourceFile { content: code }] };
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| BridgeError::Delegate(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| BridgeError::Delegate(e.to_string()))?;
        debug!(%status, language, "delegate responded");
        parse_response(&text)
    }
}

/// Output of a run, or the service's error message.
fn parse_response(text: &str) -> BridgeResult<String> {
    let parsed: ExecuteResponse =
        serde_json::from_str(text).map_err(|e| BridgeError::Delegate(e.to_string()))?;
    match parsed.run {
        Some(run) => Ok(run.output.unwrap_or_default()),
        None => Err(BridgeError::Delegate(
            parsed.message.unwrap_or_else(|| "API Error".to_string()),
        )),
    }
}

/// Best effort: the trimmed output as JSON, else its last line as JSON
/// (programs often print diagnostics first), else the raw trimmed string.
pub fn interpret_output(raw: &str) -> Value {
    let trimmed = raw.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return v;
    }
    if let Some(last) = trimmed.lines().last() {
        if let Ok(v) = serde_json::from_str::<Value>(last) {
            return v;
        }
    }
    Value::String(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_interpret_whole_output() {
        assert_eq!(interpret_output("  {\"lang\": \"Go\"}\n"), json!({ "lang": "Go" }));
        assert_eq!(interpret_output("42"), json!(42));
    }

    #[test]
    fn test_interpret_last_line() {
        let raw = "compiling...\nwarning: unused\n{\"ok\": true}\n";
        assert_eq!(interpret_output(raw), json!({ "ok": true }));
    }

    #[test]
    fn test_interpret_falls_back_to_string() {
        assert_eq!(interpret_output("hello\nworld\n"), json!("hello\nworld"));
        assert_eq!(interpret_output(""), json!(""));
    }

    #[test]
    fn test_parse_response_run() {
        let out = parse_response(r#"{"language":"python","run":{"stdout":"1\n","output":"1\n","code":0}}"#).unwrap();
        assert_eq!(out, "1\n");
    }

    #[test]
    fn test_parse_response_message() {
        let err = parse_response(r#"{"message":"rust-* runtime is unknown"}"#).unwrap_err();
        assert!(matches!(err, BridgeError::Delegate(_)));
        assert_eq!(err.to_string(), "rust-* runtime is unknown");
        assert_eq!(err.cell_message(), "Cloud Error: rust-* runtime is unknown");
    }

    #[test]
    fn test_parse_response_generic_fallback() {
        let err = parse_response("{}").unwrap_err();
        assert_eq!(err.to_string(), "API Error");
        assert!(parse_response("<html>bad gateway</html>").is_err());
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        let client = DelegateClient::new("http://127.0.0.1:1", Some(Duration::from_secs(5))).unwrap();
        let err = client.run(&Language::Python, "print(1)").await.unwrap_err();
        assert!(matches!(err, BridgeError::Delegate(_)));
    }
}
