//! Class label table loaded from a JSON side file

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};

/// Human-readable class names, index-aligned with model outputs.
///
/// An absent or unreadable file leaves the table empty; lookups then fall
/// back to the stringified class index.
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    labels: Option<Vec<String>>,
}

impl LabelTable {
    /// Table with no names; every lookup yields the index.
    pub fn empty() -> Self {
        Self { labels: None }
    }

    /// Table from an in-memory list.
    pub fn from_labels(labels: Vec<String>) -> Self {
        Self {
            labels: Some(labels),
        }
    }

    /// Load labels from a JSON array of strings.
    ///
    /// Never fails: a missing file is logged at info, a malformed one at warn.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!(path = %path.display(), "Label file not found, using class indices");
            return Self::empty();
        }

        match Self::read(path) {
            Ok(labels) => {
                info!(path = %path.display(), count = labels.len(), "Loaded {} labels", labels.len());
                Self::from_labels(labels)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %format!("{e:#}"), "Failed to load labels");
                Self::empty()
            }
        }
    }

    fn read(path: &Path) -> Result<Vec<String>> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&raw).context("Label file must be a JSON array of strings")
    }

    /// Name for a class index, or the index itself when no name exists.
    pub fn label_for(&self, index: usize) -> String {
        self.labels
            .as_ref()
            .and_then(|labels| labels.get(index))
            .cloned()
            .unwrap_or_else(|| index.to_string())
    }

    /// Whether a label file was loaded
    pub fn is_loaded(&self) -> bool {
        self.labels.is_some()
    }

    /// Number of loaded names
    pub fn len(&self) -> usize {
        self.labels.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Warn when the table cannot name every model output.
    pub fn check_coverage(&self, num_classes: usize) {
        if self.is_loaded() && self.len() < num_classes {
            warn!(
                labels = self.len(),
                num_classes = num_classes,
                "Label table is shorter than the model output; missing entries use class indices"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_lookup_with_table() {
        let table = LabelTable::from_labels(vec!["No DR".into(), "Mild".into()]);
        assert_eq!(table.label_for(0), "No DR");
        assert_eq!(table.label_for(1), "Mild");
        // out of range falls back per entry
        assert_eq!(table.label_for(4), "4");
    }

    #[test]
    fn test_lookup_without_table() {
        let table = LabelTable::empty();
        assert!(!table.is_loaded());
        assert_eq!(table.label_for(3), "3");
    }

    #[test]
    fn test_load_json_array() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"["0", "1", "2", "3", "4"]"#).unwrap();

        let table = LabelTable::load(file.path());
        assert!(table.is_loaded());
        assert_eq!(table.len(), 5);
        assert_eq!(table.label_for(2), "2");
    }

    #[test]
    fn test_load_malformed_falls_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"not": "a list"}}"#).unwrap();

        let table = LabelTable::load(file.path());
        assert!(!table.is_loaded());
        assert_eq!(table.label_for(1), "1");
    }

    #[test]
    fn test_load_missing_file() {
        let table = LabelTable::load("no/such/labels.json");
        assert!(table.is_empty());
    }
}
