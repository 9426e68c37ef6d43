use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::registry::{InMemoryRegistry, JobRegistry};
use crate::supervisor::{ProcessHandle, Supervisor};

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: AppConfig,
    pub registry: Arc<dyn JobRegistry>,
    pub supervisor: Supervisor,
    processes: RwLock<HashMap<Uuid, ProcessHandle>>,
    prefix_counter: AtomicU64,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let supervisor = Supervisor::new(config.kill_strategy);
        Self {
            config,
            registry: Arc::new(InMemoryRegistry::new()),
            supervisor,
            processes: RwLock::new(HashMap::new()),
            prefix_counter: AtomicU64::new(0),
        }
    }

    /// Zero-padded output prefix, unique across live jobs so no two are
    /// ever assigned the same naming pattern concurrently.
    pub fn next_prefix(&self) -> String {
        let n = self.prefix_counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{n:03}")
    }

    pub async fn insert_process(&self, id: Uuid, handle: ProcessHandle) {
        self.processes.write().await.insert(id, handle);
    }

    /// Removes and returns the handle. The exit path and the cancel path
    /// both go through here, so exactly one of them observes `Some`.
    pub async fn take_process(&self, id: Uuid) -> Option<ProcessHandle> {
        self.processes.write().await.remove(&id)
    }

    pub async fn get_process(&self, id: Uuid) -> Option<ProcessHandle> {
        self.processes.read().await.get(&id).cloned()
    }

    /// Flags the job's process as having produced at least one meaningful
    /// progress signal.
    pub async fn mark_producing(&self, id: Uuid) {
        if let Some(handle) = self.processes.write().await.get_mut(&id) {
            handle.producing_output = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AppConfig {
        AppConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            downloads_dir: std::env::temp_dir(),
            ytdlp_bin: "yt-dlp".to_string(),
            kill_strategy: crate::supervisor::KillStrategy::platform_default(),
        }
    }

    #[test]
    fn test_prefixes_are_unique_and_padded() {
        let state = AppState::new(test_config());
        assert_eq!(state.next_prefix(), "001");
        assert_eq!(state.next_prefix(), "002");
        assert_eq!(state.next_prefix(), "003");
    }

    #[tokio::test]
    async fn test_take_process_yields_handle_exactly_once() {
        let state = AppState::new(test_config());
        let id = Uuid::new_v4();
        state
            .insert_process(
                id,
                ProcessHandle {
                    pid: 1,
                    started_at: chrono::Utc::now(),
                    command: String::new(),
                    url: String::new(),
                    prefix: "001".to_string(),
                    producing_output: false,
                },
            )
            .await;

        assert!(state.take_process(id).await.is_some());
        assert!(state.take_process(id).await.is_none());
    }
}
