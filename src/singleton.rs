//! Process-wide sandbox handle with request-coalescing boot.

use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::error::{Error, Result};
use crate::runtime::{SandboxFactory, SandboxRuntime};

/// Owns creation and memoization of the one sandbox handle per process
/// lifetime.
///
/// Concurrent `acquire()` calls before the first boot completes coalesce
/// onto a single boot; every caller receives the same eventual handle. At
/// most one boot is ever in flight. A failed boot is cached and replayed to
/// later callers until the process restarts.
pub struct SandboxManager {
    factory: Arc<dyn SandboxFactory>,
    slot: OnceCell<std::result::Result<Arc<dyn SandboxRuntime>, String>>,
}

impl SandboxManager {
    /// Creates a manager around the given factory. No boot happens here.
    pub fn new(factory: Arc<dyn SandboxFactory>) -> Self {
        Self {
            factory,
            slot: OnceCell::new(),
        }
    }

    /// Returns the process-wide sandbox handle, booting it on first call.
    pub async fn acquire(&self) -> Result<Arc<dyn SandboxRuntime>> {
        let outcome = self
            .slot
            .get_or_init(|| async {
                tracing::info!("booting sandbox runtime");
                match self.factory.boot().await {
                    Ok(handle) => Ok(handle),
                    Err(e) => {
                        tracing::error!(error = %e, "sandbox boot failed");
                        Err(e.to_string())
                    }
                }
            })
            .await;

        match outcome {
            Ok(handle) => Ok(Arc::clone(handle)),
            Err(message) => Err(Error::Boot(message.clone())),
        }
    }

    /// Whether a live handle exists, without triggering a boot.
    pub fn booted(&self) -> bool {
        matches!(self.slot.get(), Some(Ok(_)))
    }
}
