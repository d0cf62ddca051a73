//! Local process-backed sandbox runtime.
//!
//! Development and test adapter: mounts materialize into a per-session
//! scratch directory and spawns run through `tokio::process`. This adapter
//! is not an isolation boundary; the production runtime provides that.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::error::{Error, Result};
use crate::mount::{MountEntry, MountSpec};

use super::{ProcessHandle, SandboxFactory, SandboxRuntime, ServerReady, SpawnOptions};

const READY_CHANNEL_CAPACITY: usize = 16;
const OUTPUT_CHANNEL_CAPACITY: usize = 256;

/// Sandbox runtime rooted at a local scratch directory.
pub struct LocalSandbox {
    root: PathBuf,
    ready_tx: broadcast::Sender<ServerReady>,
}

impl LocalSandbox {
    /// Creates a runtime rooted at `root`. The directory must exist.
    pub fn new(root: PathBuf) -> Self {
        let (ready_tx, _) = broadcast::channel(READY_CHANNEL_CAPACITY);
        Self { root, ready_tx }
    }

    /// Returns the scratch directory backing this sandbox.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Re-roots a sandbox path under the scratch directory.
    ///
    /// Absolute sandbox paths ("/src/main.rs") are relative to the scratch
    /// root; the sandbox filesystem has no view outside it.
    fn resolve(&self, path: &str) -> PathBuf {
        let trimmed = path.trim_start_matches('/');
        if trimmed.is_empty() {
            self.root.clone()
        } else {
            self.root.join(trimmed)
        }
    }
}

#[async_trait]
impl SandboxRuntime for LocalSandbox {
    async fn readdir(&self, path: &str) -> Result<Vec<String>> {
        let dir = self.resolve(path);
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| Error::Fs(format!("readdir {}: {e}", dir.display())))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::Fs(format!("readdir {}: {e}", dir.display())))?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn read_file(&self, path: &str) -> Result<String> {
        let file = self.resolve(path);
        tokio::fs::read_to_string(&file)
            .await
            .map_err(|e| Error::Fs(format!("read {}: {e}", file.display())))
    }

    async fn mount(&self, spec: &MountSpec) -> Result<()> {
        // Iterative walk; a directory is created before its children are
        // visited, so no async recursion is needed.
        let mut pending: Vec<(PathBuf, &MountSpec)> = vec![(self.root.clone(), spec)];

        while let Some((dir, entries)) = pending.pop() {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| Error::Mount(format!("create {}: {e}", dir.display())))?;

            for (key, entry) in entries.iter() {
                match entry {
                    MountEntry::File { contents } => {
                        tokio::fs::write(dir.join(key), contents)
                            .await
                            .map_err(|e| Error::Mount(format!("write {key}: {e}")))?;
                    }
                    MountEntry::Directory(child) => pending.push((dir.join(key), child)),
                }
            }
        }

        tracing::debug!(files = spec.file_count(), root = ?self.root, "mounted project tree");
        Ok(())
    }

    async fn spawn(
        &self,
        command: &str,
        args: &[String],
        options: SpawnOptions,
    ) -> Result<ProcessHandle> {
        let cwd = options
            .cwd
            .as_deref()
            .map(|c| self.resolve(c))
            .unwrap_or_else(|| self.root.clone());

        tracing::info!(command, ?args, cwd = ?cwd, "spawning sandbox process");

        let mut child = Command::new(command)
            .args(args)
            .current_dir(&cwd)
            .envs(&options.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Process(format!("failed to spawn {command}: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Process("stdout was not piped".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Process("stderr was not piped".to_string()))?;

        let (line_tx, line_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        let (exit_tx, exit_rx) = oneshot::channel();

        let stdout_task = {
            let line_tx = line_tx.clone();
            let ready_tx = self.ready_tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                let mut announced = false;
                let mut receiver_gone = false;
                while let Ok(Some(line)) = lines.next_line().await {
                    if !announced {
                        if let Some(ready) = scan_for_url(&line) {
                            announced = true;
                            let _ = ready_tx.send(ready);
                        }
                    }
                    // Keep draining after the receiver leaves so the child
                    // never blocks on a full pipe.
                    if !receiver_gone {
                        receiver_gone = line_tx.send(line).await.is_err();
                    }
                }
            })
        };

        let stderr_task = {
            let line_tx = line_tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                let mut receiver_gone = false;
                while let Ok(Some(line)) = lines.next_line().await {
                    if !receiver_gone {
                        receiver_gone = line_tx.send(line).await.is_err();
                    }
                }
            })
        };
        drop(line_tx);

        tokio::spawn(async move {
            // Drain both streams before reporting exit so the output channel
            // closes ahead of the exit signal.
            let _ = stdout_task.await;
            let _ = stderr_task.await;
            let code = match child.wait().await {
                Ok(status) => status.code().unwrap_or(-1),
                Err(e) => {
                    tracing::error!(error = %e, "failed to wait for sandbox process");
                    -1
                }
            };
            let _ = exit_tx.send(code);
        });

        Ok(ProcessHandle {
            output: line_rx,
            exit: exit_rx,
        })
    }

    fn subscribe_server_ready(&self) -> broadcast::Receiver<ServerReady> {
        self.ready_tx.subscribe()
    }
}

/// Scans a dev-server output line for a reachable URL.
///
/// Local dev servers announce their address on startup (e.g. "Local:
/// http://localhost:3000"); the first match per process becomes the
/// server-ready event.
fn scan_for_url(line: &str) -> Option<ServerReady> {
    let start = line.find("http://").or_else(|| line.find("https://"))?;
    let token = line[start..]
        .split_whitespace()
        .next()?
        .trim_end_matches(|c: char| !(c.is_ascii_alphanumeric() || c == '/'));

    let port = token
        .rsplit(':')
        .next()
        .and_then(|tail| tail.split('/').next())
        .and_then(|digits| digits.parse::<u16>().ok())
        .unwrap_or(80);

    Some(ServerReady {
        port,
        url: token.to_string(),
    })
}

/// Boots [`LocalSandbox`] instances rooted at per-session scratch
/// directories.
pub struct LocalFactory {
    base_dir: PathBuf,
}

impl LocalFactory {
    /// `base_dir` holds one scratch directory per booted sandbox.
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Places scratch directories under the system temp directory.
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir().join("previewbox-sandboxes"))
    }
}

#[async_trait]
impl SandboxFactory for LocalFactory {
    async fn boot(&self) -> Result<Arc<dyn SandboxRuntime>> {
        let session = format!("sandbox-{}", uuid::Uuid::new_v4());
        let root = self.base_dir.join(session);

        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| Error::Boot(format!("create scratch root {}: {e}", root.display())))?;

        tracing::info!(root = ?root, "booted local sandbox runtime");
        Ok(Arc::new(LocalSandbox::new(root)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount::transform;
    use crate::tree::{ProjectNode, ProjectTree};
    use tempfile::TempDir;

    fn scratch_sandbox() -> (TempDir, LocalSandbox) {
        let dir = TempDir::new().expect("failed to create temp dir");
        let sandbox = LocalSandbox::new(dir.path().to_path_buf());
        (dir, sandbox)
    }

    #[tokio::test]
    async fn mount_materializes_nested_tree() {
        let (_dir, sandbox) = scratch_sandbox();
        let tree = ProjectTree::new(vec![
            ProjectNode::file_with_extension("package", "json", "{}"),
            ProjectNode::folder(
                "src",
                vec![ProjectNode::file_with_extension("index", "js", "console.log(1)")],
            ),
        ]);
        let spec = transform(&tree).unwrap();

        sandbox.mount(&spec).await.unwrap();

        let root_entries = sandbox.readdir("/").await.unwrap();
        assert_eq!(root_entries, vec!["package.json", "src"]);

        let contents = sandbox.read_file("/src/index.js").await.unwrap();
        assert_eq!(contents, "console.log(1)");
    }

    #[tokio::test]
    async fn readdir_of_missing_directory_fails() {
        let (_dir, sandbox) = scratch_sandbox();

        let result = sandbox.readdir("/nope").await;
        assert!(matches!(result, Err(Error::Fs(_))));
    }

    #[tokio::test]
    async fn spawn_streams_output_and_reports_exit_code() {
        let (_dir, sandbox) = scratch_sandbox();

        let args = vec!["-c".to_string(), "echo one; echo two; exit 3".to_string()];
        let handle = sandbox
            .spawn("sh", &args, SpawnOptions::default())
            .await
            .unwrap();

        let ProcessHandle { mut output, exit } = handle;
        let mut lines = Vec::new();
        while let Some(line) = output.recv().await {
            lines.push(line);
        }

        assert_eq!(lines, vec!["one", "two"]);
        assert_eq!(exit.await.unwrap(), 3);
    }

    #[tokio::test]
    async fn spawn_emits_server_ready_for_url_output() {
        let (_dir, sandbox) = scratch_sandbox();
        let mut ready_rx = sandbox.subscribe_server_ready();

        let args = vec![
            "-c".to_string(),
            "echo ready at http://localhost:4321".to_string(),
        ];
        let handle = sandbox
            .spawn("sh", &args, SpawnOptions::default())
            .await
            .unwrap();

        let ready = ready_rx.recv().await.unwrap();
        assert_eq!(ready.url, "http://localhost:4321");
        assert_eq!(ready.port, 4321);

        drop(handle);
    }

    #[tokio::test]
    async fn spawn_respects_cwd_and_env() {
        let (_dir, sandbox) = scratch_sandbox();
        tokio::fs::create_dir_all(sandbox.root().join("sub"))
            .await
            .unwrap();

        let args = vec!["-c".to_string(), "echo $MARKER:$(basename $PWD)".to_string()];
        let options = SpawnOptions::default()
            .with_cwd("/sub")
            .with_env("MARKER", "hello");
        let handle = sandbox.spawn("sh", &args, options).await.unwrap();

        let ProcessHandle { mut output, exit } = handle;
        let line = output.recv().await.unwrap();
        assert_eq!(line, "hello:sub");
        assert_eq!(exit.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn factory_boots_distinct_scratch_roots() {
        let base = TempDir::new().unwrap();
        let factory = LocalFactory::new(base.path().to_path_buf());

        let first = factory.boot().await.unwrap();
        let second = factory.boot().await.unwrap();

        let first_listing = first.readdir("/").await.unwrap();
        let second_listing = second.readdir("/").await.unwrap();
        assert!(first_listing.is_empty());
        assert!(second_listing.is_empty());
        assert_eq!(base.path().read_dir().unwrap().count(), 2);
    }

    #[test]
    fn url_scanner_extracts_host_and_port() {
        let ready = scan_for_url("  > Local: http://localhost:3000").unwrap();
        assert_eq!(ready.url, "http://localhost:3000");
        assert_eq!(ready.port, 3000);
    }

    #[test]
    fn url_scanner_strips_trailing_punctuation() {
        let ready = scan_for_url("server listening on http://127.0.0.1:8080.").unwrap();
        assert_eq!(ready.url, "http://127.0.0.1:8080");
        assert_eq!(ready.port, 8080);
    }

    #[test]
    fn url_scanner_defaults_port_when_unspecified() {
        let ready = scan_for_url("see https://example.com for docs").unwrap();
        assert_eq!(ready.url, "https://example.com");
        assert_eq!(ready.port, 80);
    }

    #[test]
    fn url_scanner_ignores_lines_without_urls() {
        assert!(scan_for_url("compiling modules...").is_none());
    }
}
