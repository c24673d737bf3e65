//! Cell records as exchanged with clients and persisted in project files.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    #[default]
    Backend,
    Frontend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellStatus {
    #[default]
    Idle,
    Running,
    Success,
    Error,
}

/// Language tag of a cell. `javascript` (the default, and what clients send
/// for backend cells) and `rhai` run in the local sandbox; everything else is
/// delegated. Unknown tags are carried through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Javascript,
    Rhai,
    Typescript,
    Python,
    Go,
    Rust,
    Java,
    Php,
    Csharp,
    #[serde(untagged)]
    Other(String),
}

impl Language {
    pub fn is_local(&self) -> bool {
        matches!(self, Language::Javascript | Language::Rhai)
    }

    /// Tag understood by the remote execution service.
    pub fn as_str(&self) -> &str {
        match self {
            Language::Rhai => "rhai",
            Language::Javascript => "javascript",
            Language::Typescript => "typescript",
            Language::Python => "python",
            Language::Go => "go",
            Language::Rust => "rust",
            Language::Java => "java",
            Language::Php => "php",
            Language::Csharp => "csharp",
            Language::Other(tag) => tag,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Language::Rhai => "rhai",
            Language::Javascript => "js",
            Language::Typescript => "ts",
            Language::Python => "py",
            Language::Go => "go",
            Language::Rust => "rs",
            Language::Java => "java",
            Language::Php => "php",
            Language::Csharp => "cs",
            Language::Other(_) => "txt",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: CellKind,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub status: CellStatus,
    /// Client-side fields the server does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Cell {
    pub fn backend(id: i64, language: Language, filename: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            id,
            kind: CellKind::Backend,
            language,
            filename: filename.into(),
            code: code.into(),
            output: None,
            status: CellStatus::Idle,
            extra: Map::new(),
        }
    }

    pub fn is_backend(&self) -> bool {
        self.kind == CellKind::Backend
    }

    /// File name used when exporting: the cell's own name reduced to its
    /// final component, or `cell_<id>.<ext>`.
    pub fn export_name(&self) -> String {
        let own = std::path::Path::new(self.filename.trim())
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty() && n != "." && n != "..");
        own.unwrap_or_else(|| {
            let ext = match self.kind {
                CellKind::Frontend => "jsx",
                CellKind::Backend => self.language.extension(),
            };
            format!("cell_{}.{}", self.id, ext)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_language_tags() {
        let lang: Language = serde_json::from_value(json!("python")).unwrap();
        assert_eq!(lang, Language::Python);
        let lang: Language = serde_json::from_value(json!("kotlin")).unwrap();
        assert_eq!(lang, Language::Other("kotlin".into()));
        assert_eq!(serde_json::to_value(&lang).unwrap(), json!("kotlin"));
        assert_eq!(serde_json::to_value(Language::Csharp).unwrap(), json!("csharp"));
        assert!(Language::Javascript.is_local());
        assert!(Language::Rhai.is_local());
        assert!(!Language::Typescript.is_local());
        assert!(!Language::Python.is_local());
    }

    #[test]
    fn test_cell_defaults_and_extra_fields() {
        let cell: Cell = serde_json::from_value(json!({
            "id": 3,
            "code": "return 1;",
            "loadKey": 17
        }))
        .unwrap();
        assert_eq!(cell.kind, CellKind::Backend);
        assert_eq!(cell.language, Language::Javascript);
        assert_eq!(cell.status, CellStatus::Idle);
        assert_eq!(cell.extra.get("loadKey"), Some(&json!(17)));

        let back = serde_json::to_value(&cell).unwrap();
        assert_eq!(back["type"], json!("backend"));
        assert_eq!(back["loadKey"], json!(17));
    }

    #[test]
    fn test_export_name() {
        let mut cell = Cell::backend(4, Language::Python, "", "print(1)");
        assert_eq!(cell.export_name(), "cell_4.py");
        cell.kind = CellKind::Frontend;
        assert_eq!(cell.export_name(), "cell_4.jsx");
        cell.filename = "../../etc/passwd".into();
        assert_eq!(cell.export_name(), "passwd");
        cell.filename = "..".into();
        assert_eq!(cell.export_name(), "cell_4.jsx");
    }
}
