//! Fire-and-forget side effects.
//!
//! Work spawned here never affects the caller's result: failures are logged and
//! dropped. The returned handles exist so tests (and shutdown code) can wait.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Run a side effect on the runtime without blocking the caller.
pub fn spawn_non_critical<F>(label: &'static str, fut: F) -> JoinHandle<()>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        match fut.await {
            Ok(()) => debug!("Background task '{}' finished", label),
            Err(e) => warn!("Background task '{}' failed: {}", label, e),
        }
    })
}

/// Delete a file after `delay`. A file already gone is not an error.
pub fn schedule_removal(path: PathBuf, delay: Duration) -> JoinHandle<()> {
    debug!("Scheduling removal of {} in {:?}", path.display(), delay);
    spawn_non_critical("scheduled-removal", async move {
        tokio::time::sleep(delay).await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Removed expired file {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    })
}
