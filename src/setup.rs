//! Setup orchestrator: the sandbox lifecycle state machine.
//!
//! Drives a booted sandbox from a declarative project tree to a running,
//! reachable dev server: detect existing state, transform, mount, install,
//! start, then wait for the runtime's server-ready signal. Progress is
//! published through a watch channel for the host UI; human-readable lines
//! go to the [`ProgressSink`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};

use crate::config::SetupConfig;
use crate::error::{Error, Result};
use crate::manifest::{ProjectManifest, DEFAULT_ENTRY_SCRIPT};
use crate::mount::transform;
use crate::report::ProgressSink;
use crate::runtime::{ProcessHandle, SandboxRuntime, ServerReady, SpawnOptions};
use crate::tree::ProjectTree;

/// Total number of provisioning steps, for progress display.
pub const TOTAL_STEPS: u8 = 4;

/// Phase of the setup state machine.
///
/// Transitions are monotonic forward except the explicit forced reset,
/// which returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetupPhase {
    #[default]
    Idle,
    Transforming,
    Mounting,
    Installing,
    Starting,
    Ready,
    Failed,
}

/// Reactive view of setup progress consumed by the host UI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetupState {
    /// Current phase.
    pub phase: SetupPhase,
    /// Step counter: 0 before entry, 1..=4 during provisioning.
    pub step: u8,
    /// Failure message, set only in the `Failed` phase.
    pub error: Option<String>,
    /// Dev-server URL, set only once Ready and cleared by forced reset.
    pub server_url: Option<String>,
}

/// Outcome of a single [`SetupOrchestrator::run`] invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The attempt reached Ready.
    Completed,
    /// The entry or in-progress latch suppressed the call.
    Suppressed,
    /// A forced reset superseded this attempt mid-flight.
    Superseded,
}

/// The sandbox lifecycle state machine.
///
/// Executes at most once per orchestrator lifetime unless
/// [`force_resetup`] intervenes: a one-shot entry latch suppresses repeat
/// invocations from UI re-renders, and an attempt generation counter is
/// checked at every asynchronous resumption point so callbacks of a
/// superseded attempt are identified and dropped.
///
/// Callers must not drive two orchestrators against the same sandbox
/// handle concurrently.
///
/// [`force_resetup`]: SetupOrchestrator::force_resetup
pub struct SetupOrchestrator {
    runtime: Arc<dyn SandboxRuntime>,
    sink: Arc<dyn ProgressSink>,
    config: SetupConfig,
    state_tx: watch::Sender<SetupState>,
    entered: AtomicBool,
    in_progress: AtomicBool,
    generation: Arc<AtomicU64>,
}

impl SetupOrchestrator {
    /// Creates an orchestrator for one sandbox handle.
    pub fn new(
        runtime: Arc<dyn SandboxRuntime>,
        sink: Arc<dyn ProgressSink>,
        config: SetupConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(SetupState::default());
        Self {
            runtime,
            sink,
            config,
            state_tx,
            entered: AtomicBool::new(false),
            in_progress: AtomicBool::new(false),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Subscribes to state updates.
    pub fn subscribe(&self) -> watch::Receiver<SetupState> {
        self.state_tx.subscribe()
    }

    /// Returns a snapshot of the current state.
    pub fn state(&self) -> SetupState {
        self.state_tx.borrow().clone()
    }

    /// Returns the published dev-server URL, if Ready.
    pub fn server_url(&self) -> Option<String> {
        self.state_tx.borrow().server_url.clone()
    }

    /// Runs the full setup sequence against the sandbox.
    ///
    /// Repeat invocations are suppressed until [`force_resetup`] re-arms
    /// the entry latch. On failure the state moves to `Failed` and stays
    /// there; no automatic retry happens.
    ///
    /// [`force_resetup`]: SetupOrchestrator::force_resetup
    pub async fn run(&self, tree: &ProjectTree) -> Result<RunOutcome> {
        if self.entered.swap(true, Ordering::SeqCst) {
            tracing::debug!("setup already entered; suppressing repeat invocation");
            return Ok(RunOutcome::Suppressed);
        }
        if self.in_progress.swap(true, Ordering::SeqCst) {
            return Ok(RunOutcome::Suppressed);
        }
        let attempt = self.generation.load(Ordering::SeqCst);

        let outcome = self.drive(tree, attempt).await;

        // A forced reset mid-flight owns the latches now; a stale attempt
        // must not release them under a newer one.
        if self.is_current(attempt) {
            self.in_progress.store(false, Ordering::SeqCst);
        }

        match outcome {
            Ok(outcome) => Ok(outcome),
            Err(err) if !self.is_current(attempt) => {
                tracing::debug!(error = %err, "superseded attempt failed; ignoring");
                Ok(RunOutcome::Superseded)
            }
            Err(err) => {
                tracing::error!(error = %err, "sandbox setup failed");
                self.sink.write_line(&format!("Error: {err}"));
                self.state_tx.send_modify(|state| {
                    state.phase = SetupPhase::Failed;
                    state.step = 0;
                    state.error = Some(err.to_string());
                });
                Err(err)
            }
        }
    }

    /// Clears all setup state and re-arms the entry latch.
    ///
    /// The only sanctioned way to re-run the full sequence against the same
    /// sandbox handle. Bumps the attempt generation so callbacks of the
    /// superseded attempt are dropped; install/start processes of that
    /// attempt are detached, not killed.
    pub fn force_resetup(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.in_progress.store(false, Ordering::SeqCst);
        self.entered.store(false, Ordering::SeqCst);
        self.state_tx.send_modify(|state| *state = SetupState::default());
        self.sink.write_line("Setup state cleared");
        tracing::info!("forced re-setup requested");
    }

    async fn drive(&self, tree: &ProjectTree, attempt: u64) -> Result<RunOutcome> {
        if self.already_provisioned().await {
            return self.reconnect(attempt).await;
        }
        self.fresh_provision(tree, attempt).await
    }

    /// Probes the sandbox root for the manifest left by a previous
    /// provisioning.
    ///
    /// The sandbox outlives the UI layer that drives it; re-running mount
    /// and install against a provisioned sandbox would be wasteful and
    /// could corrupt a live dev-server process. Probe failures count as
    /// "not provisioned".
    async fn already_provisioned(&self) -> bool {
        match self.runtime.readdir("/").await {
            Ok(entries) => entries.iter().any(|name| name == &self.config.manifest_path),
            Err(err) => {
                tracing::debug!(error = %err, "root listing failed; treating sandbox as fresh");
                false
            }
        }
    }

    /// Re-subscribes to a sandbox that is already provisioned and serving.
    async fn reconnect(&self, attempt: u64) -> Result<RunOutcome> {
        self.sink.write_line("Reconnecting to existing sandbox session...");
        let ready_rx = self.runtime.subscribe_server_ready();
        self.transition(SetupPhase::Starting, TOTAL_STEPS);

        let Some(ready) = self.await_server_ready(ready_rx, attempt).await? else {
            return Ok(RunOutcome::Superseded);
        };

        self.sink
            .write_line(&format!("Reconnected to server at {}", ready.url));
        self.publish_ready(ready);
        Ok(RunOutcome::Completed)
    }

    /// Provisions a fresh sandbox: transform, mount, install, start.
    async fn fresh_provision(&self, tree: &ProjectTree, attempt: u64) -> Result<RunOutcome> {
        // Step 1: transform the project tree into the mount format.
        self.transition(SetupPhase::Transforming, 1);
        self.sink.write_line("Transforming project tree...");
        let spec = transform(tree)?;

        // Step 2: mount. Failure is fatal to the attempt and surfaced
        // verbatim; the sandbox may be left in an indeterminate state.
        self.transition(SetupPhase::Mounting, 2);
        self.sink.write_line("Mounting files into sandbox...");
        self.runtime.mount(&spec).await?;
        if !self.is_current(attempt) {
            return Ok(RunOutcome::Superseded);
        }
        self.sink
            .write_line(&format!("Mounted {} files", spec.file_count()));

        // Step 3: install dependencies, streaming output as it arrives.
        self.transition(SetupPhase::Installing, 3);
        self.sink.write_line("Installing dependencies...");
        let install = self
            .runtime
            .spawn(
                &self.config.package_runner,
                &self.config.install_args,
                SpawnOptions::default(),
            )
            .await?;
        let code = self.pump_to_exit(install, attempt).await?;
        if !self.is_current(attempt) {
            return Ok(RunOutcome::Superseded);
        }
        if code != 0 {
            return Err(Error::InstallFailed { code });
        }
        self.sink.write_line("Dependencies installed");

        // Step 4: start the dev server and wait for the ready signal.
        self.transition(SetupPhase::Starting, 4);
        self.sink.write_line("Starting development server...");
        let script = self.resolve_entry_script().await;
        let args = start_args(&script);
        let options = SpawnOptions::default()
            .with_cwd("/")
            .with_env_map(self.config.start_env());

        // Subscribe before the spawn: a fast server must not win the race
        // against a late subscriber.
        let ready_rx = self.runtime.subscribe_server_ready();
        let server = self
            .runtime
            .spawn(&self.config.package_runner, &args, options)
            .await
            .map_err(|e| Error::Start(e.to_string()))?;
        self.detach_output(server.output, attempt);

        let Some(ready) = self.await_server_ready(ready_rx, attempt).await? else {
            return Ok(RunOutcome::Superseded);
        };

        self.sink
            .write_line(&format!("Server ready at {}", ready.url));
        self.publish_ready(ready);
        Ok(RunOutcome::Completed)
    }

    /// Forwards a process's output lines to the sink, then returns its exit
    /// code. Lines are delivered in the order the process emitted them.
    async fn pump_to_exit(&self, process: ProcessHandle, attempt: u64) -> Result<i32> {
        let ProcessHandle { mut output, exit } = process;

        while let Some(line) = output.recv().await {
            if self.is_current(attempt) {
                self.sink.write_line(&line);
            }
        }

        exit.await
            .map_err(|_| Error::Process("process exited without reporting a status".to_string()))
    }

    /// Streams dev-server output to the sink from a background task.
    ///
    /// The task checks the attempt generation on every line; a forced reset
    /// detaches it without killing the underlying process.
    fn detach_output(&self, mut output: mpsc::Receiver<String>, attempt: u64) {
        let sink = Arc::clone(&self.sink);
        let generation = Arc::clone(&self.generation);
        tokio::spawn(async move {
            while let Some(line) = output.recv().await {
                if generation.load(Ordering::SeqCst) != attempt {
                    break;
                }
                sink.write_line(&line);
            }
        });
    }

    /// Waits for the runtime's server-ready event, bounded by the
    /// configured timeout.
    ///
    /// Returns `None` when the attempt was superseded while waiting.
    /// Duplicate or late firings are tolerated: the first event observed by
    /// the live attempt wins, later ones find no waiter.
    async fn await_server_ready(
        &self,
        mut ready_rx: broadcast::Receiver<ServerReady>,
        attempt: u64,
    ) -> Result<Option<ServerReady>> {
        let timeout = self.config.ready_timeout();

        let wait = async {
            loop {
                match ready_rx.recv().await {
                    Ok(event) => {
                        if !self.is_current(attempt) {
                            tracing::debug!(
                                url = %event.url,
                                "dropping server-ready for superseded attempt"
                            );
                            return Ok(None);
                        }
                        return Ok(Some(event));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "server-ready receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(Error::Start(
                            "sandbox runtime closed the server-ready channel".to_string(),
                        ));
                    }
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(Error::ReadyTimeout(timeout.as_secs())),
        }
    }

    /// Resolves the dev-server entry script from the mounted manifest.
    ///
    /// Failure to read or parse the manifest is non-fatal: the failure is
    /// logged and the default script is used.
    async fn resolve_entry_script(&self) -> String {
        let parsed = self
            .runtime
            .read_file(&self.config.manifest_path)
            .await
            .and_then(|text| ProjectManifest::parse(&text));

        match parsed {
            Ok(manifest) => manifest.entry_script().to_string(),
            Err(err) => {
                tracing::warn!(error = %err, "manifest read failed; using default entry script");
                self.sink.write_line(&format!(
                    "Could not read {}; defaulting to \"{DEFAULT_ENTRY_SCRIPT}\" script",
                    self.config.manifest_path
                ));
                DEFAULT_ENTRY_SCRIPT.to_string()
            }
        }
    }

    fn transition(&self, phase: SetupPhase, step: u8) {
        tracing::info!(?phase, step, "setup phase transition");
        self.state_tx.send_modify(|state| {
            state.phase = phase;
            state.step = step;
            state.error = None;
        });
    }

    fn publish_ready(&self, ready: ServerReady) {
        tracing::info!(url = %ready.url, port = ready.port, "dev server ready");
        self.state_tx.send_modify(|state| {
            state.phase = SetupPhase::Ready;
            state.step = TOTAL_STEPS;
            state.server_url = Some(ready.url);
        });
    }

    fn is_current(&self, attempt: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == attempt
    }
}

/// Arguments for the dev-server start command: `run <script> -- -H 0.0.0.0`.
fn start_args(script: &str) -> Vec<String> {
    vec![
        "run".to_string(),
        script.to_string(),
        "--".to_string(),
        "-H".to_string(),
        "0.0.0.0".to_string(),
    ]
}
