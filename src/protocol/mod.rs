//! Wire protocol: JSON text frames. Inbound frames carry `token` and
//! `command`; outbound frames are tagged by `type`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    project::{Cell, Language},
    secrets::{MaskedSecret, SecretEntry},
};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all_fields = "camelCase")]
pub enum Command {
    #[serde(rename = "EXECUTE")]
    Execute {
        cell_id: i64,
        code: String,
        #[serde(default)]
        language: Option<Language>,
    },
    #[serde(rename = "SAVE")]
    Save { cells: Vec<Cell> },
    #[serde(rename = "LOAD")]
    Load,
    #[serde(rename = "GET_ENV_VARS")]
    GetEnvVars,
    #[serde(rename = "ADD_ENV_VAR")]
    AddEnvVar {
        #[serde(default)]
        key: Option<String>,
        #[serde(default)]
        value: Option<String>,
    },
    #[serde(rename = "DELETE_ENV_VAR")]
    DeleteEnvVar {
        #[serde(default)]
        key: Option<String>,
    },
    #[serde(rename = "GET_SECRETS")]
    GetSecrets,
    #[serde(rename = "SAVE_SECRETS")]
    SaveSecrets { secrets: Vec<SecretEntry> },
    #[serde(rename = "EXPORT")]
    Export { cells: Vec<Cell> },
    #[serde(rename = "LIST_PROJECTS")]
    ListProjects,
    #[serde(rename = "CREATE_PROJECT")]
    CreateProject {
        #[serde(default)]
        project_name: Option<String>,
    },
    #[serde(rename = "SWITCH_PROJECT")]
    SwitchProject {
        #[serde(default)]
        project_name: Option<String>,
    },
    #[serde(rename = "GET_CURRENT_PROJECT")]
    GetCurrentProject,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Execute { .. } => "EXECUTE",
            Command::Save { .. } => "SAVE",
            Command::Load => "LOAD",
            Command::GetEnvVars => "GET_ENV_VARS",
            Command::AddEnvVar { .. } => "ADD_ENV_VAR",
            Command::DeleteEnvVar { .. } => "DELETE_ENV_VAR",
            Command::GetSecrets => "GET_SECRETS",
            Command::SaveSecrets { .. } => "SAVE_SECRETS",
            Command::Export { .. } => "EXPORT",
            Command::ListProjects => "LIST_PROJECTS",
            Command::CreateProject { .. } => "CREATE_PROJECT",
            Command::SwitchProject { .. } => "SWITCH_PROJECT",
            Command::GetCurrentProject => "GET_CURRENT_PROJECT",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum Outbound {
    #[serde(rename = "result")]
    Result { cell_id: i64, content: Value },
    #[serde(rename = "error")]
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        cell_id: Option<i64>,
        content: String,
    },
    #[serde(rename = "log")]
    Log {
        #[serde(skip_serializing_if = "Option::is_none")]
        level: Option<String>,
        content: String,
    },
    #[serde(rename = "LOAD_DATA")]
    LoadData { cells: Vec<Cell> },
    #[serde(rename = "ENV_VARS_LIST")]
    EnvVarsList { vars: Vec<MaskedSecret> },
    #[serde(rename = "ENV_VAR_ADDED")]
    EnvVarAdded { key: String },
    #[serde(rename = "ENV_VAR_DELETED")]
    EnvVarDeleted { key: String },
    #[serde(rename = "ENV_ERROR")]
    EnvError { message: String },
    #[serde(rename = "SECRETS_DATA")]
    SecretsData { secrets: Vec<SecretEntry> },
    #[serde(rename = "SECRETS_SAVED")]
    SecretsSaved,
    #[serde(rename = "PROJECTS_LIST")]
    ProjectsList { projects: Vec<String>, current_project: String },
    #[serde(rename = "PROJECT_CREATED")]
    ProjectCreated { project_name: String, projects: Vec<String> },
    #[serde(rename = "PROJECT_SWITCHED")]
    ProjectSwitched { project_name: String, cells: Vec<Cell>, projects: Vec<String> },
    #[serde(rename = "PROJECT_ERROR")]
    ProjectError { message: String },
    #[serde(rename = "CURRENT_PROJECT")]
    CurrentProject { project_name: String, projects: Vec<String> },
}

impl Outbound {
    pub fn log(content: impl Into<String>) -> Self {
        Outbound::Log { level: None, content: content.into() }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Outbound::Error { cell_id: None, content: content.into() }
    }

    pub fn cell_error(cell_id: i64, content: impl Into<String>) -> Self {
        Outbound::Error { cell_id: Some(cell_id), content: content.into() }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Parse `raw` and check its token. Anything unparsable or carrying the
/// wrong token yields `None` and must be dropped without a reply.
pub fn authenticate(raw: &str, token: &str) -> Option<Value> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let supplied = value.get("token")?.as_str()?;
    constant_time_eq(supplied.as_bytes(), token.as_bytes()).then_some(value)
}

/// Decode an authenticated envelope. Unknown commands and malformed
/// payloads yield `None`.
pub fn parse_command(envelope: Value) -> Option<Command> {
    serde_json::from_value(envelope).ok()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TOKEN: &str = "t0k3n";

    #[test]
    fn test_authenticate() {
        assert!(authenticate(r#"{"token":"t0k3n","command":"LOAD"}"#, TOKEN).is_some());
        assert!(authenticate(r#"{"token":"wrong","command":"LOAD"}"#, TOKEN).is_none());
        assert!(authenticate(r#"{"command":"LOAD"}"#, TOKEN).is_none());
        assert!(authenticate(r#"{"token":42,"command":"LOAD"}"#, TOKEN).is_none());
        assert!(authenticate("not json", TOKEN).is_none());
    }

    #[test]
    fn test_parse_execute() {
        let env = json!({ "token": TOKEN, "command": "EXECUTE", "cellId": 7, "code": "1", "language": "python" });
        match parse_command(env) {
            Some(Command::Execute { cell_id, code, language }) => {
                assert_eq!(cell_id, 7);
                assert_eq!(code, "1");
                assert_eq!(language, Some(Language::Python));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_parse_unit_commands_with_token() {
        let cmd = parse_command(json!({ "token": TOKEN, "command": "LIST_PROJECTS" }));
        assert!(matches!(cmd, Some(Command::ListProjects)));
        let cmd = parse_command(json!({ "token": TOKEN, "command": "ADD_ENV_VAR", "key": "A" }));
        assert!(matches!(cmd, Some(Command::AddEnvVar { key: Some(_), value: None })));
    }

    #[test]
    fn test_malformed_and_unknown_are_dropped() {
        assert!(parse_command(json!({ "token": TOKEN, "command": "EXECUTE", "code": "1" })).is_none());
        assert!(parse_command(json!({ "token": TOKEN, "command": "SAVE", "cells": "nope" })).is_none());
        assert!(parse_command(json!({ "token": TOKEN, "command": "SELF_DESTRUCT" })).is_none());
        assert!(parse_command(json!({ "token": TOKEN })).is_none());
    }

    #[test]
    fn test_outbound_shapes() {
        let v = serde_json::to_value(Outbound::Result { cell_id: 1, content: json!(2) }).unwrap();
        assert_eq!(v, json!({ "type": "result", "cellId": 1, "content": 2 }));

        let v = serde_json::to_value(Outbound::error("Failed to save: disk full")).unwrap();
        assert_eq!(v, json!({ "type": "error", "content": "Failed to save: disk full" }));

        let v = serde_json::to_value(Outbound::ProjectsList {
            projects: vec!["default".into()],
            current_project: "default".into(),
        })
        .unwrap();
        assert_eq!(v, json!({ "type": "PROJECTS_LIST", "projects": ["default"], "currentProject": "default" }));

        let v = serde_json::to_value(Outbound::SecretsSaved).unwrap();
        assert_eq!(v, json!({ "type": "SECRETS_SAVED" }));
    }
}
