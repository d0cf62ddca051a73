//! previewbox - sandbox lifecycle orchestration for dev-server previews.
//!
//! This library turns a declarative project-tree description into a
//! running, reachable dev server inside a single ephemeral sandbox: boot
//! the runtime once per process, detect existing state, transform the tree
//! into the sandbox mount format, install dependencies, start the server,
//! and stream progress to a terminal sink while publishing a reactive
//! state view for the host UI.

pub mod config;
pub mod error;
pub mod manifest;
pub mod mount;
pub mod report;
pub mod runtime;
pub mod setup;
pub mod singleton;
pub mod tree;

pub use config::{SetupConfig, ValidationResult};
pub use error::{Error, Result};
pub use manifest::ProjectManifest;
pub use mount::{transform, MountEntry, MountSpec};
pub use report::{ChannelSink, ProgressSink, StdoutSink};
pub use runtime::{
    LocalFactory, LocalSandbox, ProcessHandle, SandboxFactory, SandboxRuntime, ServerReady,
    SpawnOptions,
};
pub use setup::{RunOutcome, SetupOrchestrator, SetupPhase, SetupState, TOTAL_STEPS};
pub use singleton::SandboxManager;
pub use tree::{ProjectNode, ProjectTree};
