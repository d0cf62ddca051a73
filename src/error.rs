//! Error types for sandbox setup operations.

use thiserror::Error;

/// Top-level error type for sandbox setup operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The sandbox runtime failed to boot.
    #[error("failed to boot sandbox runtime: {0}")]
    Boot(String),

    /// A file entry in the project tree carries neither a filename nor a
    /// folder name. A caller data-integrity violation, not a recoverable
    /// runtime condition.
    #[error("file entry is missing a filename")]
    MissingFilename,

    /// Mounting the project files into the sandbox failed. The sandbox is
    /// left in an indeterminate state.
    #[error("failed to mount project files: {0}")]
    Mount(String),

    /// The dependency install process exited non-zero.
    #[error("dependency install failed with exit code {code}")]
    InstallFailed { code: i32 },

    /// The dev server could not be started.
    #[error("failed to start dev server: {0}")]
    Start(String),

    /// The project manifest could not be read or parsed. Non-fatal: script
    /// resolution falls back to the default entry script.
    #[error("failed to read project manifest: {0}")]
    ManifestRead(String),

    /// The server-ready signal was not received in time.
    #[error("server-ready signal not received within {0} seconds")]
    ReadyTimeout(u64),

    /// A sandbox filesystem operation failed.
    #[error("sandbox filesystem error: {0}")]
    Fs(String),

    /// A sandbox process could not be spawned or supervised.
    #[error("sandbox process error: {0}")]
    Process(String),

    /// Setup configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for sandbox setup operations.
pub type Result<T> = std::result::Result<T, Error>;
