//! Filesystem-based template artifacts.
//!
//! Stores each template as a pretty-printed JSON file: `{base_path}/{name}.json`.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::instrument;

use crate::models::Template;
use crate::storage::traits::TemplateArtifactStore;
use crate::{Error, Result};

/// Filesystem template artifact store.
pub struct FilesystemTemplateStore {
    base_path: PathBuf,
}

impl FilesystemTemplateStore {
    /// Creates a store rooted at `base_path`, creating the directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let path = base_path.into();
        fs::create_dir_all(&path).map_err(|e| Error::operation("create_template_dir", e))?;
        Ok(Self { base_path: path })
    }

    /// Returns `~/.config/cardsmith/templates/`.
    #[must_use]
    pub fn default_user_path() -> Option<PathBuf> {
        directories::BaseDirs::new()
            .map(|d| d.home_dir().join(".config").join("cardsmith").join("templates"))
    }

    /// Returns the base path.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn artifact_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            return Err(Error::InvalidInput(format!(
                "invalid template name: {name:?}"
            )));
        }
        Ok(self.base_path.join(format!("{name}.json")))
    }
}

impl TemplateArtifactStore for FilesystemTemplateStore {
    #[instrument(skip(self, template), fields(template = %template.name))]
    fn write(&self, template: &Template) -> Result<PathBuf> {
        let path = self.artifact_path(&template.name)?;
        let mut content = serde_json::to_string_pretty(template)
            .map_err(|e| Error::operation("serialize_template", e))?;
        content.push('\n');

        if fs::read_to_string(&path).is_ok_and(|existing| existing == content) {
            tracing::debug!(path = %path.display(), "Template artifact unchanged");
            return Ok(path);
        }

        // Write beside the target and rename so readers never see a partial file.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &content).map_err(|e| Error::operation("write_template_artifact", e))?;
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            Error::operation("publish_template_artifact", e)
        })?;

        tracing::info!(path = %path.display(), "Template artifact written");
        Ok(path)
    }

    fn load(&self, name: &str) -> Result<Option<Template>> {
        let path = self.artifact_path(name)?;
        if !path.exists() {
            return Ok(None);
        }
        let content =
            fs::read_to_string(&path).map_err(|e| Error::operation("read_template_artifact", e))?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| Error::operation("parse_template_artifact", e))
    }

    fn list(&self) -> Result<Vec<String>> {
        let entries =
            fs::read_dir(&self.base_path).map_err(|e| Error::operation("list_template_dir", e))?;

        let mut names: Vec<String> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("json"))
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(String::from))
            .collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PatternId, TemplateComponent};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn template(name: &str) -> Template {
        Template {
            name: name.to_string(),
            description: "Status card".to_string(),
            components: vec![TemplateComponent {
                path: "card.Section".to_string(),
                params: BTreeMap::from([("title".to_string(), "${title}".to_string())]),
            }],
            defaults: BTreeMap::from([("title".to_string(), serde_json::json!("Build"))]),
            notation: Some("§".to_string()),
            source_pattern: PatternId::new("pat_1"),
            positive_count: 10,
            promoted_at: 100,
            materialized_at: Some(200),
        }
    }

    #[test]
    fn test_write_and_load() {
        let dir = TempDir::new().unwrap();
        let store = FilesystemTemplateStore::new(dir.path()).unwrap();
        let path = store.write(&template("status_card_abcd1234")).unwrap();
        assert!(path.ends_with("status_card_abcd1234.json"));

        let loaded = store.load("status_card_abcd1234").unwrap().unwrap();
        assert_eq!(loaded, template("status_card_abcd1234"));
        assert!(store.load("missing").unwrap().is_none());
    }

    #[test]
    fn test_write_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = FilesystemTemplateStore::new(dir.path()).unwrap();
        let path = store.write(&template("t1")).unwrap();
        let first = fs::read_to_string(&path).unwrap();
        store.write(&template("t1")).unwrap();
        let second = fs::read_to_string(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.list().unwrap(), vec!["t1"]);
    }

    #[test]
    fn test_list_sorted() {
        let dir = TempDir::new().unwrap();
        let store = FilesystemTemplateStore::new(dir.path()).unwrap();
        store.write(&template("b")).unwrap();
        store.write(&template("a")).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        assert_eq!(store.list().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_rejects_path_traversal() {
        let dir = TempDir::new().unwrap();
        let store = FilesystemTemplateStore::new(dir.path()).unwrap();
        assert!(store.load("../etc/passwd").is_err());
        let mut bad = template("x");
        bad.name = "a/b".to_string();
        assert!(store.write(&bad).is_err());
    }
}
