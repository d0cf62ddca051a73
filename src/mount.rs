//! Sandbox mount format and the tree-to-mount transformer.
//!
//! [`transform`] converts a [`ProjectTree`] into the [`MountSpec`] the
//! sandbox runtime consumes. The transform is pure, synchronous, and
//! idempotent; the produced spec is owned by the caller and never mutated
//! after creation.

use std::collections::btree_map;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tree::{ProjectNode, ProjectTree};

/// A virtual filesystem tree in the sandbox's mount format.
///
/// Serializes to the runtime wire format:
/// `{"<key>": {"file": {"contents": "…"}}}` for files and
/// `{"<key>": {"directory": {…}}}` for directories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MountSpec {
    entries: BTreeMap<String, MountEntry>,
}

/// A single mount entry: a file body or a nested directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountEntry {
    /// A file with its full contents.
    File { contents: String },
    /// A nested directory.
    Directory(MountSpec),
}

impl MountSpec {
    /// Creates an empty spec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a direct child entry by key.
    pub fn get(&self, key: &str) -> Option<&MountEntry> {
        self.entries.get(key)
    }

    /// Number of direct child entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the spec has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over direct child entries in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, MountEntry> {
        self.entries.iter()
    }

    /// Counts files across the whole tree, for progress reporting.
    pub fn file_count(&self) -> usize {
        self.entries
            .values()
            .map(|entry| match entry {
                MountEntry::File { .. } => 1,
                MountEntry::Directory(dir) => dir.file_count(),
            })
            .sum()
    }
}

/// Converts a project tree into the sandbox mount format.
///
/// Fails with [`Error::MissingFilename`] when a file node lacks both a
/// folder marker and a filename, before any sandbox mutation. Duplicate
/// sibling keys overwrite in last-write-wins order. Missing content becomes
/// an empty file body.
///
/// [`Error::MissingFilename`]: crate::error::Error::MissingFilename
pub fn transform(tree: &ProjectTree) -> Result<MountSpec> {
    build_directory(&tree.items)
}

fn build_directory(items: &[ProjectNode]) -> Result<MountSpec> {
    let mut spec = MountSpec::new();
    for node in items {
        let key = node.key()?;
        spec.entries.insert(key, build_entry(node)?);
    }
    Ok(spec)
}

fn build_entry(node: &ProjectNode) -> Result<MountEntry> {
    match &node.items {
        Some(children) => Ok(MountEntry::Directory(build_directory(children)?)),
        None => Ok(MountEntry::File {
            contents: node.content.clone().unwrap_or_default(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn sample_tree() -> ProjectTree {
        ProjectTree::new(vec![
            ProjectNode::file_with_extension("index", "ts", "x"),
            ProjectNode::file("README", "hi"),
            ProjectNode::folder(
                "src",
                vec![ProjectNode::file_with_extension("main", "rs", "fn main() {}")],
            ),
        ])
    }

    #[test]
    fn transform_maps_file_with_extension() {
        let spec = transform(&sample_tree()).unwrap();

        assert_eq!(
            spec.get("index.ts"),
            Some(&MountEntry::File {
                contents: "x".to_string()
            })
        );
    }

    #[test]
    fn transform_maps_file_without_extension() {
        let spec = transform(&sample_tree()).unwrap();

        assert_eq!(
            spec.get("README"),
            Some(&MountEntry::File {
                contents: "hi".to_string()
            })
        );
    }

    #[test]
    fn transform_maps_directory_with_nested_entries() {
        let spec = transform(&sample_tree()).unwrap();

        match spec.get("src") {
            Some(MountEntry::Directory(dir)) => {
                assert_eq!(
                    dir.get("main.rs"),
                    Some(&MountEntry::File {
                        contents: "fn main() {}".to_string()
                    })
                );
            }
            other => panic!("expected directory entry, got {other:?}"),
        }
    }

    #[test]
    fn transform_fails_on_node_without_filename() {
        let tree = ProjectTree::new(vec![ProjectNode {
            content: Some("orphan".to_string()),
            ..ProjectNode::default()
        }]);

        assert!(matches!(transform(&tree), Err(Error::MissingFilename)));
    }

    #[test]
    fn transform_treats_missing_content_as_empty_file() {
        let tree = ProjectTree::new(vec![ProjectNode {
            filename: Some("empty".to_string()),
            ..ProjectNode::default()
        }]);

        let spec = transform(&tree).unwrap();
        assert_eq!(
            spec.get("empty"),
            Some(&MountEntry::File {
                contents: String::new()
            })
        );
    }

    #[test]
    fn transform_keeps_empty_directory() {
        let tree = ProjectTree::new(vec![ProjectNode::folder("empty", vec![])]);

        let spec = transform(&tree).unwrap();
        match spec.get("empty") {
            Some(MountEntry::Directory(dir)) => assert!(dir.is_empty()),
            other => panic!("expected directory entry, got {other:?}"),
        }
    }

    #[test]
    fn transform_is_idempotent() {
        let tree = sample_tree();

        let first = transform(&tree).unwrap();
        let second = transform(&tree).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn duplicate_sibling_keys_overwrite_last_write_wins() {
        let tree = ProjectTree::new(vec![
            ProjectNode::file_with_extension("app", "js", "first"),
            ProjectNode::file_with_extension("app", "js", "second"),
        ]);

        let spec = transform(&tree).unwrap();
        assert_eq!(spec.len(), 1);
        assert_eq!(
            spec.get("app.js"),
            Some(&MountEntry::File {
                contents: "second".to_string()
            })
        );
    }

    #[test]
    fn spec_serializes_to_runtime_wire_format() {
        let spec = transform(&sample_tree()).unwrap();
        let value = serde_json::to_value(&spec).unwrap();

        assert_eq!(value["index.ts"]["file"]["contents"], "x");
        assert_eq!(value["README"]["file"]["contents"], "hi");
        assert_eq!(value["src"]["directory"]["main.rs"]["file"]["contents"], "fn main() {}");
    }

    #[test]
    fn file_count_spans_nested_directories() {
        let spec = transform(&sample_tree()).unwrap();
        assert_eq!(spec.file_count(), 3);
    }
}
