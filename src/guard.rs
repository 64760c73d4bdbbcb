use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Scoped request for extended execution time while a response is being
/// produced, so the OS does not suspend the process mid-exchange.
///
/// The platform imposes a soft deadline: if `grace` elapses before the
/// normal release, the expiration path releases the task instead. Both
/// paths race on one atomic flag, so release happens exactly once no
/// matter which side wins. Dropping the guard is the normal release.
#[derive(Debug)]
pub struct BackgroundTask {
    label: String,
    released: Arc<AtomicBool>,
    expiry: Option<JoinHandle<()>>,
}

impl BackgroundTask {
    /// Begin a background task that expires after `grace`.
    pub fn begin(label: impl Into<String>, grace: Duration) -> Self {
        let label = label.into();
        let released = Arc::new(AtomicBool::new(false));
        let flag = released.clone();
        let expiry_label = label.clone();
        let expiry = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if !flag.swap(true, Ordering::SeqCst) {
                warn!("background task '{}' expired before completion", expiry_label);
            }
        });
        debug!("begin background task '{}'", label);
        BackgroundTask {
            label,
            released,
            expiry: Some(expiry),
        }
    }

    /// Normal release path. Idempotent with respect to expiration.
    pub fn end(self) {}

    /// Whether the task has already been released by the expiration
    /// path.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    fn released_handle(&self) -> Arc<AtomicBool> {
        self.released.clone()
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            debug!("end background task '{}'", self.label);
        }
        if let Some(expiry) = self.expiry.take() {
            expiry.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn normal_release_beats_expiration() {
        let task = BackgroundTask::begin("read", Duration::from_secs(30));
        let released = task.released_handle();
        assert!(!task.is_released());
        task.end();
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn expiration_releases_when_response_is_slow() {
        let task = BackgroundTask::begin("read", Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(task.is_released());
        // The late normal release must still be safe.
        task.end();
    }

    #[tokio::test]
    async fn drop_is_the_normal_release() {
        let released = {
            let task = BackgroundTask::begin("read", Duration::from_secs(30));
            task.released_handle()
        };
        assert!(released.load(Ordering::SeqCst));
    }
}
