//! `KEY=VALUE` secrets file with a masked display view and an in-memory
//! environment view that sandboxed code reads through `env`.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, RwLock},
};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::{BridgeError, BridgeResult},
    utils::{parse_kv_line, write_atomic},
};

static KEY_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^[a-z0-9_]+$").expect("valid key pattern"));

const MASK: char = '•';
const VISIBLE_PREFIX: usize = 4;
const MAX_MASK: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretEntry {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskedSecret {
    pub key: String,
    pub masked: String,
}

#[derive(Debug)]
pub struct SecretStore {
    path: PathBuf,
    env: RwLock<HashMap<String, String>>,
    // serializes read-modify-write cycles on the file
    write_lock: Mutex<()>,
}

impl SecretStore {
    /// Open the store and load the environment view from the file, if any.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let store = Self {
            path: path.into(),
            env: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
        };
        if let Ok(entries) = store.entries() {
            store.reload_env(&entries);
        }
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the file. A missing file is an empty list.
    pub fn entries(&self) -> BridgeResult<Vec<SecretEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&self.path)?;
        Ok(parse_entries(&text))
    }

    pub fn list_masked(&self) -> BridgeResult<Vec<MaskedSecret>> {
        Ok(self
            .entries()?
            .into_iter()
            .map(|e| MaskedSecret { masked: mask_value(&e.value), key: e.key })
            .collect())
    }

    /// Insert or update `key`. Rejected input leaves the file untouched.
    pub fn upsert(&self, key: &str, value: &str) -> BridgeResult<()> {
        if key.is_empty() || value.is_empty() {
            return Err(BridgeError::Validation("Key and value are required".into()));
        }
        validate_key(key)?;
        validate_value(value)?;

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.entries()?;
        match entries.iter_mut().find(|e| e.key == key) {
            Some(existing) => existing.value = value.to_string(),
            None => entries.push(SecretEntry { key: key.to_string(), value: value.to_string() }),
        }
        self.write_entries(&entries)?;
        self.reload_env(&entries);
        info!(key, "secret stored");
        Ok(())
    }

    pub fn delete(&self, key: &str) -> BridgeResult<()> {
        if key.is_empty() {
            return Err(BridgeError::Validation("Key is required".into()));
        }
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if !self.path.exists() {
            return Err(BridgeError::NotFound("secrets file not found".into()));
        }
        let mut entries = self.entries()?;
        entries.retain(|e| e.key != key);
        self.write_entries(&entries)?;
        self.env
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        info!(key, "secret deleted");
        Ok(())
    }

    /// Replace every entry at once. All keys are validated before the file
    /// is touched.
    pub fn replace_all(&self, entries: &[SecretEntry]) -> BridgeResult<()> {
        for entry in entries {
            validate_key(&entry.key)?;
            validate_value(&entry.value)?;
        }
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.write_entries(entries)?;
        self.reload_env(entries);
        info!(count = entries.len(), "secrets replaced");
        Ok(())
    }

    /// Snapshot of the environment view.
    pub fn env(&self) -> HashMap<String, String> {
        self.env.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn write_entries(&self, entries: &[SecretEntry]) -> BridgeResult<()> {
        let mut text = entries
            .iter()
            .map(|e| format!("{}={}", e.key, e.value))
            .collect::<Vec<_>>()
            .join("\n");
        text.push('\n');
        write_atomic(&self.path, text.as_bytes())
    }

    // Keys removed from the file by hand stay visible until deleted through
    // the store, same as an exported process environment.
    fn reload_env(&self, entries: &[SecretEntry]) {
        let mut env = self.env.write().unwrap_or_else(|e| e.into_inner());
        for e in entries {
            env.insert(e.key.clone(), e.value.clone());
        }
        debug!(count = env.len(), "environment view reloaded");
    }
}

pub fn parse_entries(text: &str) -> Vec<SecretEntry> {
    text.lines()
        .filter_map(parse_kv_line)
        .map(|(key, value)| SecretEntry { key, value })
        .collect()
}

pub fn validate_key(key: &str) -> BridgeResult<()> {
    if KEY_PATTERN.is_match(key) {
        Ok(())
    } else {
        Err(BridgeError::Validation(
            "Key must contain only letters, numbers, and underscores".into(),
        ))
    }
}

/// Each secret is one line of the file.
pub fn validate_value(value: &str) -> BridgeResult<()> {
    if value.contains(['\n', '\r']) {
        return Err(BridgeError::Validation("Value must not contain line breaks".into()));
    }
    Ok(())
}

/// Values longer than four characters keep a four character prefix followed
/// by at most twelve mask characters; shorter values are fully masked.
pub fn mask_value(value: &str) -> String {
    let len = value.chars().count();
    if len > VISIBLE_PREFIX {
        let prefix: String = value.chars().take(VISIBLE_PREFIX).collect();
        let hidden = (len - VISIBLE_PREFIX).min(MAX_MASK);
        format!("{prefix}{}", MASK.to_string().repeat(hidden))
    } else {
        MASK.to_string().repeat(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_short_values_fully() {
        assert_eq!(mask_value(""), "");
        assert_eq!(mask_value("a"), "•");
        assert_eq!(mask_value("abcd"), "••••");
    }

    #[test]
    fn test_mask_long_values_with_prefix() {
        assert_eq!(mask_value("secret1234"), "secr••••••");
        assert_eq!(mask_value("abcde"), "abcd•");
        let long = "x".repeat(40);
        assert_eq!(mask_value(&long), format!("xxxx{}", "•".repeat(12)));
    }

    #[test]
    fn test_mask_counts_chars_not_bytes() {
        assert_eq!(mask_value("héllo wörld"), "héll•••••••");
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("api_key").is_ok());
        assert!(validate_key("API_KEY_2").is_ok());
        assert!(validate_key("9LIVES").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("bad-key").is_err());
        assert!(validate_key("with space").is_err());
        assert!(validate_key("KEY=1").is_err());
    }

    #[test]
    fn test_validate_value() {
        assert!(validate_value("plain value").is_ok());
        assert!(validate_value("a=b").is_ok());
        assert!(validate_value("abc\nbad-key=pwned").is_err());
        assert!(validate_value("abc\r").is_err());
    }

    #[test]
    fn test_multiline_value_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, "A=1\n").unwrap();
        let store = SecretStore::open(&path);

        let err = store.upsert("API", "abc\nbad-key=pwned").unwrap_err();
        assert_eq!(err.to_string(), "Value must not contain line breaks");
        let err = store
            .replace_all(&[SecretEntry { key: "API".into(), value: "x\r\nY=2".into() }])
            .unwrap_err();
        assert!(matches!(err, BridgeError::Validation(_)));

        assert_eq!(fs::read_to_string(&path).unwrap(), "A=1\n");
        assert!(store.env().get("API").is_none());
    }

    #[test]
    fn test_parse_entries_skips_comments() {
        let text = "# header\nA=1\n\nB=\"two\"\n  # indented comment\nC='three'\n";
        let entries = parse_entries(text);
        let keys: Vec<_> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["A", "B", "C"]);
        assert_eq!(entries[1].value, "two");
        assert_eq!(entries[2].value, "three");
    }
}
