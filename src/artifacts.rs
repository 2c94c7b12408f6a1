//! Persisted extraction artifacts.
//!
//! An index build produces two JSON files that the query-time pipelines read
//! back to recover extended context for a retrieved fragment:
//!
//! - `<name>_context.json` — `context_id → context text`
//! - `<name>_fragment_to_context.json` — `fragment id → context_id`
//!
//! JSON object keys are always strings, so fragment ids are written as
//! stringified integers and parsed back to `u64` on load.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub fn context_path(artifact_dir: &Path, name: &str) -> PathBuf {
    artifact_dir.join(format!("{}_context.json", name))
}

pub fn fragment_index_path(artifact_dir: &Path, name: &str) -> PathBuf {
    artifact_dir.join(format!("{}_fragment_to_context.json", name))
}

/// Write both artifacts, overwriting wholesale. Creates the artifact
/// directory if needed.
pub fn write_artifacts(
    artifact_dir: &Path,
    name: &str,
    context: &HashMap<String, String>,
    fragment_to_context: &HashMap<u64, String>,
) -> Result<()> {
    std::fs::create_dir_all(artifact_dir)
        .with_context(|| format!("failed to create artifact dir {}", artifact_dir.display()))?;
    write_json(&context_path(artifact_dir, name), context)?;
    write_json(&fragment_index_path(artifact_dir, name), fragment_to_context)?;
    Ok(())
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string(value)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write artifact {}", path.display()))?;
    Ok(())
}

pub fn load_context(artifact_dir: &Path, name: &str) -> Result<HashMap<String, String>> {
    let path = context_path(artifact_dir, name);
    let data = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read context artifact {}", path.display()))?;
    Ok(serde_json::from_str(&data)?)
}

/// Load the fragment→context map, coercing the stringified keys back to
/// integer fragment ids.
pub fn load_fragment_index(artifact_dir: &Path, name: &str) -> Result<HashMap<u64, String>> {
    let path = fragment_index_path(artifact_dir, name);
    let data = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read fragment index artifact {}", path.display()))?;
    Ok(serde_json::from_str(&data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn artifacts_round_trip() {
        let tmp = TempDir::new().unwrap();
        let mut context = HashMap::new();
        context.insert("aaaa".to_string(), "some text".to_string());
        context.insert("bbbb".to_string(), "different text".to_string());
        let mut index = HashMap::new();
        index.insert(1u64, "aaaa".to_string());
        index.insert(2u64, "bbbb".to_string());

        write_artifacts(tmp.path(), "testdoc", &context, &index).unwrap();

        assert_eq!(load_context(tmp.path(), "testdoc").unwrap(), context);
        assert_eq!(load_fragment_index(tmp.path(), "testdoc").unwrap(), index);
    }

    #[test]
    fn fragment_keys_written_as_strings() {
        let tmp = TempDir::new().unwrap();
        let mut index = HashMap::new();
        index.insert(7u64, "ctx".to_string());
        write_artifacts(tmp.path(), "doc", &HashMap::new(), &index).unwrap();

        let raw = std::fs::read_to_string(fragment_index_path(tmp.path(), "doc")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["7"], "ctx");
    }

    #[test]
    fn missing_artifact_is_descriptive_error() {
        let tmp = TempDir::new().unwrap();
        let err = load_context(tmp.path(), "nope").unwrap_err();
        assert!(err.to_string().contains("context artifact"));
    }
}
