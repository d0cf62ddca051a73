//! Project manifest parsing and entry-script resolution.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default entry script when the manifest is missing, unreadable, or names
/// neither conventional script.
pub const DEFAULT_ENTRY_SCRIPT: &str = "dev";

/// Fallback entry script used when `dev` is absent but `start` exists.
pub const FALLBACK_ENTRY_SCRIPT: &str = "start";

/// The subset of the project manifest the orchestrator cares about.
///
/// Unknown manifest fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectManifest {
    /// Named run scripts.
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
}

impl ProjectManifest {
    /// Parses a manifest from JSON text.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::ManifestRead(e.to_string()))
    }

    /// Resolves the script name used to start the dev server.
    ///
    /// Prefers `dev`; falls back to `start` when `dev` is absent but `start`
    /// exists. Resolution is static: read once before spawn, never
    /// re-checked.
    pub fn entry_script(&self) -> &str {
        if !self.scripts.contains_key(DEFAULT_ENTRY_SCRIPT)
            && self.scripts.contains_key(FALLBACK_ENTRY_SCRIPT)
        {
            FALLBACK_ENTRY_SCRIPT
        } else {
            DEFAULT_ENTRY_SCRIPT
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_script_is_preferred() {
        let manifest =
            ProjectManifest::parse(r#"{"scripts":{"dev":"next dev","start":"next start"}}"#)
                .unwrap();

        assert_eq!(manifest.entry_script(), "dev");
    }

    #[test]
    fn start_script_is_fallback_when_dev_is_absent() {
        let manifest = ProjectManifest::parse(r#"{"scripts":{"start":"node server.js"}}"#).unwrap();

        assert_eq!(manifest.entry_script(), "start");
    }

    #[test]
    fn missing_scripts_default_to_dev() {
        let manifest = ProjectManifest::parse(r#"{"name":"demo"}"#).unwrap();

        assert_eq!(manifest.entry_script(), "dev");
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let manifest = ProjectManifest::parse(
            r#"{"name":"demo","version":"1.0.0","dependencies":{"react":"^19"},"scripts":{"dev":"vite"}}"#,
        )
        .unwrap();

        assert_eq!(manifest.scripts.len(), 1);
        assert_eq!(manifest.entry_script(), "dev");
    }

    #[test]
    fn malformed_json_surfaces_manifest_read_error() {
        let result = ProjectManifest::parse("{not json");

        assert!(matches!(result, Err(Error::ManifestRead(_))));
    }
}
