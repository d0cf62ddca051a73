//! Sandbox runtime interface.
//!
//! The external sandbox runtime is reached only through the narrow seams in
//! this module: [`SandboxFactory`] boots a runtime, [`SandboxRuntime`] is
//! the handle the orchestrator drives. The crate does not implement process
//! isolation itself; [`LocalSandbox`] is a development and test adapter
//! backed by a scratch directory.

mod local;

pub use local::{LocalFactory, LocalSandbox};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::error::Result;
use crate::mount::MountSpec;

/// Event emitted when a spawned process starts listening on a network port.
///
/// May fire zero or more times per handle lifetime; consumers must tolerate
/// duplicate and late firings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerReady {
    /// Port the server bound to.
    pub port: u16,
    /// Externally reachable URL.
    pub url: String,
}

/// Options for spawning a process inside the sandbox.
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    /// Working directory relative to the sandbox root.
    pub cwd: Option<String>,
    /// Extra environment variables.
    pub env: HashMap<String, String>,
}

impl SpawnOptions {
    /// Sets the working directory.
    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Adds one environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Merges a map of environment variables.
    pub fn with_env_map(mut self, env: HashMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }
}

/// A process running inside the sandbox.
///
/// `output` yields combined stdout/stderr lines in emission order and closes
/// when the process ends; `exit` resolves with the process exit code.
#[derive(Debug)]
pub struct ProcessHandle {
    /// Line-oriented combined output stream.
    pub output: mpsc::Receiver<String>,
    /// Exit code, delivered once after the output stream closes.
    pub exit: oneshot::Receiver<i32>,
}

/// Handle to a booted sandbox runtime.
///
/// One handle exists per process; see [`SandboxManager`] for the
/// single-boot contract. Callers must not drive two setup sequences against
/// the same handle concurrently.
///
/// [`SandboxManager`]: crate::singleton::SandboxManager
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    /// Lists entry names of a directory in the sandbox filesystem.
    async fn readdir(&self, path: &str) -> Result<Vec<String>>;

    /// Reads a UTF-8 file from the sandbox filesystem.
    async fn read_file(&self, path: &str) -> Result<String>;

    /// Publishes a virtual filesystem tree into the sandbox root.
    async fn mount(&self, spec: &MountSpec) -> Result<()>;

    /// Spawns a process inside the sandbox.
    async fn spawn(
        &self,
        command: &str,
        args: &[String],
        options: SpawnOptions,
    ) -> Result<ProcessHandle>;

    /// Subscribes to server-ready events.
    ///
    /// Late subscribers only observe events emitted after subscription, so
    /// subscribe before spawning the process expected to produce the event.
    fn subscribe_server_ready(&self) -> broadcast::Receiver<ServerReady>;
}

/// Boots sandbox runtimes.
///
/// Called at most once per process by the singleton manager.
#[async_trait]
pub trait SandboxFactory: Send + Sync {
    /// Boots a new sandbox runtime and returns its handle.
    async fn boot(&self) -> Result<Arc<dyn SandboxRuntime>>;
}
