//! Setup configuration and validation.
//!
//! Validates configuration before a setup run to catch errors early.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for a sandbox setup run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupConfig {
    /// Manifest file probed for prior provisioning and read for entry
    /// scripts, relative to the sandbox root.
    #[serde(default = "default_manifest_path")]
    pub manifest_path: String,

    /// Package runner used for install and start commands.
    #[serde(default = "default_package_runner")]
    pub package_runner: String,

    /// Arguments for the dependency install command.
    #[serde(default = "default_install_args")]
    pub install_args: Vec<String>,

    /// Port the dev server binds to.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum wait for the server-ready signal, in seconds.
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,
}

fn default_manifest_path() -> String {
    "package.json".to_string()
}

fn default_package_runner() -> String {
    "npm".to_string()
}

fn default_install_args() -> Vec<String> {
    vec!["install".to_string()]
}

fn default_port() -> u16 {
    3000
}

fn default_ready_timeout_secs() -> u64 {
    120
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            manifest_path: default_manifest_path(),
            package_runner: default_package_runner(),
            install_args: default_install_args(),
            port: default_port(),
            ready_timeout_secs: default_ready_timeout_secs(),
        }
    }
}

impl SetupConfig {
    /// Creates a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the manifest path.
    pub fn with_manifest_path(mut self, path: impl Into<String>) -> Self {
        self.manifest_path = path.into();
        self
    }

    /// Sets the package runner.
    pub fn with_package_runner(mut self, runner: impl Into<String>) -> Self {
        self.package_runner = runner.into();
        self
    }

    /// Sets the dev-server port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the server-ready timeout.
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout_secs = timeout.as_secs();
        self
    }

    /// Maximum wait for the server-ready signal.
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    /// Environment injected into the dev-server process so it binds to all
    /// interfaces on the configured port.
    pub fn start_env(&self) -> HashMap<String, String> {
        HashMap::from([
            ("HOSTNAME".to_string(), "0.0.0.0".to_string()),
            ("HOST".to_string(), "0.0.0.0".to_string()),
            ("PORT".to_string(), self.port.to_string()),
            ("NODE_ENV".to_string(), "development".to_string()),
            ("BROWSER".to_string(), "none".to_string()),
        ])
    }

    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Loads a configuration from a TOML file.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Validates the configuration and returns any issues found.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.manifest_path.is_empty() {
            result.add_error("manifest_path must not be empty");
        }
        if self.package_runner.is_empty() {
            result.add_error("package_runner must not be empty");
        }
        if self.port == 0 {
            result.add_error("port must be non-zero");
        }
        if self.ready_timeout_secs == 0 {
            result.add_error("ready_timeout_secs must be non-zero");
        }
        if self.ready_timeout_secs > 3600 {
            result.add_warning("ready_timeout_secs above one hour is unusually long");
        }

        result
    }
}

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// Fatal validation errors.
    pub errors: Vec<String>,
    /// Non-fatal validation warnings.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Adds an error to the result.
    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Adds a warning to the result.
    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Converts to a Result carrying the warnings, failing on errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}
