//! Utilities shared by the config loader and the file-backed stores.

use std::{fs, io::Write, path::Path};

use tempfile::NamedTempFile;

use crate::error::BridgeResult;

/// Parse one `KEY=VALUE` line. Blank lines and `#` comments yield `None`.
/// A line without `=` is a key with an empty value. One leading and one
/// trailing quote (either style) are stripped from the value.
pub fn parse_kv_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (key, value) = line.split_once('=').unwrap_or((line, ""));
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), strip_quotes(value.trim()).to_string()))
}

fn strip_quotes(value: &str) -> &str {
    let value = value
        .strip_prefix('"')
        .or_else(|| value.strip_prefix('\''))
        .unwrap_or(value);
    value
        .strip_suffix('"')
        .or_else(|| value.strip_suffix('\''))
        .unwrap_or(value)
}

/// Replace `path` with `contents` in one step: write a sibling temp file,
/// then rename it over the target.
pub fn write_atomic(path: &Path, contents: &[u8]) -> BridgeResult<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.persist(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kv_line() {
        assert_eq!(parse_kv_line("A=1"), Some(("A".into(), "1".into())));
        assert_eq!(parse_kv_line("  B = two words "), Some(("B".into(), "two words".into())));
        assert_eq!(parse_kv_line("URL=http://x/?a=b"), Some(("URL".into(), "http://x/?a=b".into())));
        assert_eq!(parse_kv_line("Q=\"quoted\""), Some(("Q".into(), "quoted".into())));
        assert_eq!(parse_kv_line("S='single'"), Some(("S".into(), "single".into())));
        assert_eq!(parse_kv_line("BARE"), Some(("BARE".into(), String::new())));
        assert_eq!(parse_kv_line("# comment"), None);
        assert_eq!(parse_kv_line("   "), None);
        assert_eq!(parse_kv_line("=orphan"), None);
    }

    #[test]
    fn test_write_atomic_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("file.txt");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
    }
}
