//! Parse a `.env` file into a key-value map. Application to the process
//! environment (and its precedence rules) happens in `lib.rs`.

use std::collections::HashMap;
use std::path::Path;

/// Path of the `.env` to read: `override_dir` if given, else the current
/// directory. `None` when no such file exists.
fn dotenv_path(override_dir: Option<&Path>) -> Option<std::path::PathBuf> {
    let dir = override_dir
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok())?;
    let path = dir.join(".env");
    path.is_file().then_some(path)
}

/// Minimal `.env` parser.
///
/// * Lines are `KEY=VALUE`; an optional leading `export ` is stripped.
/// * Empty lines and lines starting with `#` are skipped; `#` inside a
///   value is kept.
/// * Double-quoted values support the `\"` escape; single-quoted values
///   are stripped verbatim. No multiline values.
fn parse_dotenv(content: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim();
        let value = if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
            value[1..value.len() - 1].replace("\\\"", "\"")
        } else if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
            value[1..value.len() - 1].to_string()
        } else {
            value.to_string()
        };
        out.insert(key.to_string(), value);
    }
    out
}

/// Loads `.env` from `override_dir` or the current directory. A missing
/// file yields an empty map.
pub fn load_env_map(override_dir: Option<&Path>) -> std::io::Result<HashMap<String, String>> {
    let Some(path) = dotenv_path(override_dir) else {
        return Ok(HashMap::new());
    };
    let content = std::fs::read_to_string(&path)?;
    Ok(parse_dotenv(&content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_pairs() {
        let m = parse_dotenv("FOO=bar\nBAZ=quux\n");
        assert_eq!(m.get("FOO"), Some(&"bar".to_string()));
        assert_eq!(m.get("BAZ"), Some(&"quux".to_string()));
    }

    #[test]
    fn export_prefix_stripped() {
        let m = parse_dotenv("export KEY=val\n");
        assert_eq!(m.get("KEY"), Some(&"val".to_string()));
    }

    #[test]
    fn comments_and_blanks_skipped() {
        let m = parse_dotenv("\n# comment\nKEY=val\n   \n");
        assert_eq!(m.len(), 1);
        assert_eq!(m.get("KEY"), Some(&"val".to_string()));
    }

    #[test]
    fn quoted_values() {
        let m = parse_dotenv("A=\"hello world\"\nB='single quoted'\nC=\"say \\\"hi\\\"\"\n");
        assert_eq!(m.get("A"), Some(&"hello world".to_string()));
        assert_eq!(m.get("B"), Some(&"single quoted".to_string()));
        assert_eq!(m.get("C"), Some(&"say \"hi\"".to_string()));
    }

    #[test]
    fn malformed_lines_skipped() {
        let m = parse_dotenv("NOT_A_PAIR\n=value_only\nKEY=ok\n");
        assert_eq!(m.len(), 1);
        assert_eq!(m.get("KEY"), Some(&"ok".to_string()));
    }

    #[test]
    fn empty_values_kept() {
        let m = parse_dotenv("KEY=\nQUOTED=\"\"\n");
        assert_eq!(m.get("KEY"), Some(&String::new()));
        assert_eq!(m.get("QUOTED"), Some(&String::new()));
    }

    #[test]
    fn missing_file_is_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        let m = load_env_map(Some(dir.path())).unwrap();
        assert!(m.is_empty());
    }

    #[test]
    fn reads_file_from_override_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "A=1\nexport B=2\n").unwrap();
        let m = load_env_map(Some(dir.path())).unwrap();
        assert_eq!(m.get("A"), Some(&"1".to_string()));
        assert_eq!(m.get("B"), Some(&"2".to_string()));
    }
}
