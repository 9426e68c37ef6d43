use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::types::{JobProgress, ProgressUpdate};

/// Single source of truth for "what is happening now". Updates arrive from
/// asynchronous process-output streams while pollers read concurrently, so
/// every operation hands out consistent snapshots, never references into
/// shared state.
#[async_trait]
pub trait JobRegistry: Send + Sync {
    /// Registers a new job in the `downloading`/0% state.
    async fn create(&self, id: Uuid) -> JobProgress;

    /// Applies an update. No-op (returning false) when the id is unknown,
    /// the record is terminal, or the update's timestamp precedes the
    /// stored one.
    async fn update(&self, id: Uuid, up: ProgressUpdate) -> bool;

    async fn get(&self, id: Uuid) -> Option<JobProgress>;

    async fn remove(&self, id: Uuid);
}

#[derive(Default)]
pub struct InMemoryRegistry {
    jobs: RwLock<HashMap<Uuid, JobProgress>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRegistry for InMemoryRegistry {
    async fn create(&self, id: Uuid) -> JobProgress {
        let job = JobProgress::new();
        self.jobs.write().await.insert(id, job.clone());
        job
    }

    async fn update(&self, id: Uuid, up: ProgressUpdate) -> bool {
        match self.jobs.write().await.get_mut(&id) {
            Some(job) => job.apply(up),
            None => false,
        }
    }

    async fn get(&self, id: Uuid) -> Option<JobProgress> {
        self.jobs.read().await.get(&id).cloned()
    }

    async fn remove(&self, id: Uuid) {
        self.jobs.write().await.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JobStatus, INDETERMINATE};

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let reg = InMemoryRegistry::new();
        assert!(reg.get(Uuid::new_v4()).await.is_none());
        assert!(!reg
            .update(Uuid::new_v4(), ProgressUpdate::downloading(10.0, "x"))
            .await);
    }

    #[tokio::test]
    async fn test_create_starts_downloading_at_zero() {
        let reg = InMemoryRegistry::new();
        let id = Uuid::new_v4();
        reg.create(id).await;

        let job = reg.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Downloading);
        assert_eq!(job.progress, 0.0);
    }

    #[tokio::test]
    async fn test_out_of_order_updates_keep_newest() {
        let reg = InMemoryRegistry::new();
        let id = Uuid::new_v4();
        reg.create(id).await;
        let base = reg.get(id).await.unwrap().last_update;

        let at = |ts: i64, pct: f64| {
            let mut up = ProgressUpdate::downloading(pct, format!("Downloading: {pct}%"));
            up.last_update = ts;
            up
        };

        // Arrival order t3, t1, t2: only t3 must stick.
        assert!(reg.update(id, at(base + 3, 30.0)).await);
        assert!(!reg.update(id, at(base + 1, 10.0)).await);
        assert!(!reg.update(id, at(base + 2, 20.0)).await);

        let job = reg.get(id).await.unwrap();
        assert_eq!(job.progress, 30.0);
        assert_eq!(job.last_update, base + 3);
    }

    #[tokio::test]
    async fn test_terminal_is_absorbing() {
        let reg = InMemoryRegistry::new();
        let id = Uuid::new_v4();
        reg.create(id).await;

        assert!(reg
            .update(
                id,
                ProgressUpdate::terminal(JobStatus::Error, 0.0, "Download failed (exit code 1)")
            )
            .await);

        let mut late = ProgressUpdate::downloading(INDETERMINATE, "Processing: 00:00:10.00");
        late.last_update = i64::MAX;
        assert!(!reg.update(id, late).await);

        let job = reg.get(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.message, "Download failed (exit code 1)");
    }

    #[tokio::test]
    async fn test_concurrent_jobs_are_independent() {
        let reg = std::sync::Arc::new(InMemoryRegistry::new());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let (ra, rb) = tokio::join!(reg.create(a), reg.create(b));
        assert_eq!(ra.progress, 0.0);
        assert_eq!(rb.progress, 0.0);
        assert_ne!(a, b);

        let mut up = ProgressUpdate::downloading(44.0, "Downloading: 44.0%");
        up.last_update = i64::MAX;
        reg.update(a, up).await;

        assert_eq!(reg.get(a).await.unwrap().progress, 44.0);
        assert_eq!(reg.get(b).await.unwrap().progress, 0.0);
    }

    #[tokio::test]
    async fn test_remove() {
        let reg = InMemoryRegistry::new();
        let id = Uuid::new_v4();
        reg.create(id).await;
        reg.remove(id).await;
        assert!(reg.get(id).await.is_none());
    }
}
