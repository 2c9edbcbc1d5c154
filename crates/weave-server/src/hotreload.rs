use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;

use weave_core::PatternLibrary;

/// Background task that re-scans one agent's pattern directory and swaps the
/// library in place. Stopped when the agent is deleted or reloaded with a
/// new source.
pub struct PatternHotReloader {
    cancel: CancellationToken,
    source: PathBuf,
}

impl PatternHotReloader {
    pub fn start(
        agent_id: String,
        source: PathBuf,
        library: Arc<RwLock<PatternLibrary>>,
        every: Duration,
    ) -> Self {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let task_source = source.clone();

        tokio::spawn(async move {
            let mut ticker = interval(every);
            // the first tick fires immediately; the directory was just loaded
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = task_cancel.cancelled() => break,
                }
                match PatternLibrary::load_dir(&task_source) {
                    Ok(reloaded) => {
                        let count = reloaded.len();
                        let mut guard = library.write().unwrap_or_else(|e| e.into_inner());
                        *guard = reloaded;
                        drop(guard);
                        log::debug!(
                            "[{}] pattern hot-reload: {} patterns from {}",
                            agent_id,
                            count,
                            task_source.display()
                        );
                    }
                    Err(e) => {
                        log::warn!("[{}] pattern hot-reload failed: {}", agent_id, e);
                    }
                }
            }
            log::debug!("[{}] pattern hot-reloader stopped", agent_id);
        });

        Self { cancel, source }
    }

    pub fn source(&self) -> &PathBuf {
        &self.source
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for PatternHotReloader {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
