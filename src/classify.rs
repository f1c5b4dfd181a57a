//! Per-file classification.
//!
//! A classification says where a file belongs: a suggested folder relative
//! to the source root, tags and a description. Classifications normally come
//! from a language model; this crate only consumes them through the
//! [`Classifier`] trait and validates every payload before planning sees it.

use crate::file_category::FileMapper;
use crate::scanner::FileDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Bytes read from the head of a file for content sniffing.
const SNIFF_LEN: u64 = 8192;

/// Validated analysis result for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub tags: Vec<String>,
    /// Folder relative to the source root, not yet sanitized.
    pub destination_folder: String,
    pub description: String,
}

impl Classification {
    pub fn new(destination_folder: impl Into<String>) -> Self {
        Self {
            tags: Vec::new(),
            destination_folder: destination_folder.into(),
            description: String::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Validates an untyped payload, as produced by a language model.
    ///
    /// Accepts `suggested_folder` or `destination_folder` for the folder;
    /// `tags` and `description` are optional. Blank tags are dropped and
    /// duplicates removed keeping first occurrence.
    pub fn from_value(value: &Value) -> Result<Self, ClassifyError> {
        #[derive(Deserialize)]
        struct Raw {
            #[serde(alias = "destination_folder")]
            suggested_folder: String,
            #[serde(default)]
            tags: Vec<String>,
            #[serde(default)]
            description: String,
        }

        let raw: Raw = serde_json::from_value(value.clone())
            .map_err(|e| ClassifyError::Malformed(e.to_string()))?;
        if raw.suggested_folder.trim().is_empty() {
            return Err(ClassifyError::Malformed(
                "suggested folder is empty".to_string(),
            ));
        }

        let mut tags: Vec<String> = Vec::with_capacity(raw.tags.len());
        for tag in raw.tags {
            let tag = tag.trim();
            if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }

        Ok(Self {
            tags,
            destination_folder: raw.suggested_folder,
            description: raw.description.trim().to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    #[error("no classification was supplied")]
    Missing,
    #[error("malformed classification: {0}")]
    Malformed(String),
    #[error("could not read file: {0}")]
    Unreadable(String),
    #[error("could not load classifications from {}: {reason}", .path.display())]
    Manifest { path: PathBuf, reason: String },
}

/// Produces a classification for one file.
///
/// Per-file errors are not fatal: the plan builder excludes that file and
/// reports it as skipped.
pub trait Classifier {
    fn classify(&self, file: &FileDescriptor) -> Result<Classification, ClassifyError>;
}

/// Offline classifier filing files by content type.
///
/// Sniffs the first bytes with `infer` and falls back to the extension.
#[derive(Debug, Clone, Default)]
pub struct CategoryClassifier {
    mapper: FileMapper,
}

impl Classifier for CategoryClassifier {
    fn classify(&self, file: &FileDescriptor) -> Result<Classification, ClassifyError> {
        let mut head = Vec::new();
        File::open(&file.path)
            .and_then(|f| f.take(SNIFF_LEN).read_to_end(&mut head))
            .map_err(|e| ClassifyError::Unreadable(e.to_string()))?;

        let sniffed = infer::get(&head);
        let extension = file
            .path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase());
        let category = self.mapper.categorize(
            sniffed.map(|kind| kind.mime_type()),
            extension.as_deref().or(sniffed.map(|kind| kind.extension())),
        );

        let mut tags = vec![category.tag().to_string()];
        if let Some(ext) = &extension {
            tags.push(ext.clone());
        }
        let description = match sniffed {
            Some(kind) => format!("{} file ({})", category.tag(), kind.mime_type()),
            None => format!("{} file", category.tag()),
        };

        Ok(Classification::new(category.folder_name())
            .with_tags(tags)
            .with_description(description))
    }
}

/// Classifications read from a JSON manifest written by an external analyzer.
///
/// The manifest is either an object keyed by path or an array of objects
/// carrying a `path` field. Relative paths are resolved against the source
/// root. Each payload is validated lazily, so one bad entry only affects its
/// own file.
#[derive(Debug, Clone, Default)]
pub struct ManifestClassifier {
    entries: HashMap<PathBuf, Value>,
}

impl ManifestClassifier {
    pub fn load(path: &Path, source_root: &Path) -> Result<Self, ClassifyError> {
        let text = fs::read_to_string(path).map_err(|e| ClassifyError::Manifest {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&text, source_root).map_err(|reason| ClassifyError::Manifest {
            path: path.to_path_buf(),
            reason,
        })
    }

    pub fn from_json_str(text: &str, source_root: &Path) -> Result<Self, String> {
        let document: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
        let mut entries = HashMap::new();

        match document {
            Value::Object(map) => {
                for (key, payload) in map {
                    entries.insert(source_root.join(key), payload);
                }
            }
            Value::Array(items) => {
                for (index, item) in items.into_iter().enumerate() {
                    let key = item
                        .get("path")
                        .and_then(Value::as_str)
                        .ok_or_else(|| format!("entry {index} has no string `path`"))?;
                    entries.insert(source_root.join(key), item);
                }
            }
            _ => return Err("expected a JSON object or array".to_string()),
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Classifier for ManifestClassifier {
    fn classify(&self, file: &FileDescriptor) -> Result<Classification, ClassifyError> {
        self.entries
            .get(&file.path)
            .ok_or(ClassifyError::Missing)
            .and_then(Classification::from_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_from_value_accepts_both_folder_keys() {
        let a = Classification::from_value(&json!({
            "suggested_folder": "Notes",
            "tags": ["work", " ", "work", "draft"],
            "description": " meeting notes "
        }))
        .unwrap();
        assert_eq!(a.destination_folder, "Notes");
        assert_eq!(a.tags, vec!["work", "draft"]);
        assert_eq!(a.description, "meeting notes");

        let b = Classification::from_value(&json!({ "destination_folder": "Notes" })).unwrap();
        assert_eq!(b.destination_folder, "Notes");
        assert!(b.tags.is_empty());
    }

    #[test]
    fn test_from_value_rejects_malformed_payloads() {
        for payload in [
            json!({ "tags": ["x"] }),
            json!({ "suggested_folder": 7 }),
            json!({ "suggested_folder": "   " }),
            json!({ "suggested_folder": "A", "tags": "not-a-list" }),
            json!("Notes"),
        ] {
            assert!(
                matches!(
                    Classification::from_value(&payload),
                    Err(ClassifyError::Malformed(_))
                ),
                "payload should be rejected: {payload}"
            );
        }
    }

    #[test]
    fn test_manifest_object_and_array_forms() {
        let root = Path::new("/data/inbox");
        let object = ManifestClassifier::from_json_str(
            r#"{ "a.txt": { "suggested_folder": "Notes" }, "b.txt": { "oops": true } }"#,
            root,
        )
        .unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(
            object
                .classify(&FileDescriptor::from_path(root.join("a.txt")))
                .unwrap()
                .destination_folder,
            "Notes"
        );
        assert!(matches!(
            object.classify(&FileDescriptor::from_path(root.join("b.txt"))),
            Err(ClassifyError::Malformed(_))
        ));
        assert_eq!(
            object.classify(&FileDescriptor::from_path(root.join("c.txt"))),
            Err(ClassifyError::Missing)
        );

        let array = ManifestClassifier::from_json_str(
            r#"[{ "path": "/data/inbox/x.pdf", "suggested_folder": "Docs", "tags": ["pdf"] }]"#,
            root,
        )
        .unwrap();
        let result = array
            .classify(&FileDescriptor::from_path("/data/inbox/x.pdf"))
            .unwrap();
        assert_eq!(result.tags, vec!["pdf"]);

        assert!(ManifestClassifier::from_json_str(r#"[{ "suggested_folder": "A" }]"#, root).is_err());
        assert!(ManifestClassifier::from_json_str("42", root).is_err());
    }

    #[test]
    fn test_category_classifier_uses_content_and_extension() {
        let temp = TempDir::new().unwrap();
        let png = temp.path().join("photo.dat");
        fs::write(
            &png,
            [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, 0x49, 0x48, 0x44, 0x52],
        )
        .unwrap();
        let script = temp.path().join("tool.py");
        fs::write(&script, "print('hi')").unwrap();

        let classifier = CategoryClassifier::default();
        let image = classifier.classify(&FileDescriptor::from_path(&png)).unwrap();
        assert_eq!(image.destination_folder, "Images");
        assert!(image.tags.contains(&"image".to_string()));

        let code = classifier
            .classify(&FileDescriptor::from_path(&script))
            .unwrap();
        assert_eq!(code.destination_folder, "Code");
        assert_eq!(code.tags, vec!["code", "py"]);
    }

    #[test]
    fn test_category_classifier_reports_unreadable() {
        let classifier = CategoryClassifier::default();
        let result = classifier.classify(&FileDescriptor::from_path("/no/such/file.txt"));
        assert!(matches!(result, Err(ClassifyError::Unreadable(_))));
    }
}
