//! Declarative project tree description.
//!
//! This is the input format for the tree-to-mount transformer: a nested
//! sequence of file and directory nodes as produced by the host UI's
//! template storage.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single node in the project tree: a file or a directory.
///
/// A node is a directory iff `items` is present, even when the sequence is
/// empty. File keys derive from `filename` and `file_extension`; directory
/// keys from `folder_name`. Sibling keys must be unique; duplicates
/// overwrite in last-write-wins order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectNode {
    /// File name without extension.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// File extension, without the leading dot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_extension: Option<String>,

    /// File contents. Missing content is an empty file, never an error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Folder name for directory nodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_name: Option<String>,

    /// Child nodes. Presence of this field marks the node as a directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<ProjectNode>>,
}

impl ProjectNode {
    /// Creates a file node without an extension.
    pub fn file(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            filename: Some(name.into()),
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// Creates a file node with an extension.
    pub fn file_with_extension(
        name: impl Into<String>,
        extension: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            filename: Some(name.into()),
            file_extension: Some(extension.into()),
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// Creates a directory node.
    pub fn folder(name: impl Into<String>, items: Vec<ProjectNode>) -> Self {
        Self {
            folder_name: Some(name.into()),
            items: Some(items),
            ..Self::default()
        }
    }

    /// Returns true when this node is a directory.
    pub fn is_directory(&self) -> bool {
        self.items.is_some()
    }

    /// Derives the node's unique key within its parent.
    ///
    /// Directory key is the folder name; file key is `filename.extension`,
    /// or the bare filename when no extension is set.
    pub fn key(&self) -> Result<String> {
        if let Some(folder) = &self.folder_name {
            return Ok(folder.clone());
        }

        let filename = self.filename.as_ref().ok_or(Error::MissingFilename)?;

        Ok(match &self.file_extension {
            Some(extension) => format!("{filename}.{extension}"),
            None => filename.clone(),
        })
    }
}

/// Top-level project description: an ordered sequence of root nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectTree {
    /// Root-level nodes.
    pub items: Vec<ProjectNode>,
}

impl ProjectTree {
    /// Creates a tree from root-level nodes.
    pub fn new(items: Vec<ProjectNode>) -> Self {
        Self { items }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_key_includes_extension() {
        let node = ProjectNode::file_with_extension("index", "ts", "x");
        assert_eq!(node.key().unwrap(), "index.ts");
    }

    #[test]
    fn file_key_without_extension_is_bare_filename() {
        let node = ProjectNode::file("README", "hi");
        assert_eq!(node.key().unwrap(), "README");
    }

    #[test]
    fn directory_key_is_folder_name() {
        let node = ProjectNode::folder("src", vec![]);
        assert_eq!(node.key().unwrap(), "src");
        assert!(node.is_directory());
    }

    #[test]
    fn empty_items_still_marks_a_directory() {
        let node = ProjectNode::folder("empty", vec![]);
        assert!(node.is_directory());
    }

    #[test]
    fn node_without_filename_or_folder_fails_key_derivation() {
        let node = ProjectNode {
            content: Some("orphan".to_string()),
            ..ProjectNode::default()
        };

        assert!(matches!(node.key(), Err(Error::MissingFilename)));
    }

    #[test]
    fn nodes_deserialize_from_camel_case() {
        let json = r#"{"filename":"main","fileExtension":"rs","content":"fn main() {}"}"#;
        let node: ProjectNode = serde_json::from_str(json).unwrap();

        assert_eq!(node.filename.as_deref(), Some("main"));
        assert_eq!(node.file_extension.as_deref(), Some("rs"));
        assert!(!node.is_directory());
    }

    #[test]
    fn folder_name_wins_key_derivation_over_filename() {
        let node = ProjectNode {
            filename: Some("shadowed".to_string()),
            folder_name: Some("actual".to_string()),
            items: Some(vec![]),
            ..ProjectNode::default()
        };

        assert_eq!(node.key().unwrap(), "actual");
    }
}
