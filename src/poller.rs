//! Long-running video operation poller
//!
//! Drives a submitted operation to completion, reporting an estimated
//! percentage along the way, then downloads the finished video into the
//! blob registry.

use crate::ai::{GenerativeApi, OperationHandle};
use crate::blob::{BlobRegistry, ObjectUrl};
use crate::models::ProgressReport;
use crate::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_ESTIMATED_DURATION: Duration = Duration::from_secs(120);

pub const MSG_PROCESSING: &str = "Processing request...";
pub const MSG_GENERATING: &str = "Generating video... This may take a few minutes.";
pub const MSG_FINALIZING: &str = "Finalizing and fetching video...";
pub const MSG_DONE: &str = "Done!";

const START_PERCENT: f64 = 5.0;
const CEILING_PERCENT: f64 = 95.0;
const FINALIZING_PERCENT: f64 = 98.0;
const DONE_PERCENT: f64 = 100.0;

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    /// Expected wall-clock time to completion; calibrates the progress ramp.
    pub estimated_duration: Duration,
    /// Give up after this long. `None` polls until the remote side finishes.
    pub max_wait: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            estimated_duration: DEFAULT_ESTIMATED_DURATION,
            max_wait: None,
        }
    }
}

/// Linear 5% → 95% ramp over the estimated duration, clamped at 95%.
pub fn estimate_progress(elapsed: Duration, estimated: Duration) -> f64 {
    let estimated_ms = estimated.as_millis() as f64;
    if estimated_ms <= 0.0 {
        return CEILING_PERCENT;
    }
    let ramp = (CEILING_PERCENT - START_PERCENT) * (elapsed.as_millis() as f64 / estimated_ms);
    (START_PERCENT + ramp).min(CEILING_PERCENT)
}

/// Observer for `(percentage, message)` progress updates.
pub trait ProgressSink: Send + Sync {
    fn report(&self, percentage: f64, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(f64, &str) + Send + Sync,
{
    fn report(&self, percentage: f64, message: &str) {
        self(percentage, message)
    }
}

/// Forwards progress into an unbounded channel. A dropped receiver is ignored.
#[derive(Clone)]
pub struct ChannelProgressSink {
    tx: mpsc::UnboundedSender<ProgressReport>,
}

impl ChannelProgressSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgressSink {
    fn report(&self, percentage: f64, message: &str) {
        let _ = self.tx.send(ProgressReport {
            percentage,
            message: message.to_string(),
        });
    }
}

/// Cloneable cancellation flag. The poller checks it between polls and
/// remote calls made through [`CancelToken::guard`] are abandoned when it fires.
#[derive(Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once [`CancelToken::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let observed = rx.wait_for(|cancelled| *cancelled).await.is_ok();
        if !observed {
            // Sender lives as long as any clone of this token.
            std::future::pending::<()>().await;
        }
    }

    /// Drive `future` to completion unless the token fires first. A pending
    /// request is dropped on cancellation and [`Error::Cancelled`] returned.
    pub async fn guard<T>(&self, future: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancelled() => {
                tracing::info!("Remote call abandoned after cancellation");
                Err(Error::Cancelled)
            }
            result = future => result,
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

pub struct OperationPoller<'a> {
    api: &'a dyn GenerativeApi,
    blobs: &'a BlobRegistry,
    api_key: &'a str,
    config: &'a PollConfig,
    cancel: &'a CancelToken,
}

impl<'a> OperationPoller<'a> {
    pub fn new(
        api: &'a dyn GenerativeApi,
        blobs: &'a BlobRegistry,
        api_key: &'a str,
        config: &'a PollConfig,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            api,
            blobs,
            api_key,
            config,
            cancel,
        }
    }

    pub async fn run(
        &self,
        initial: OperationHandle,
        progress: &dyn ProgressSink,
    ) -> Result<ObjectUrl> {
        let started = Instant::now();
        let mut operation = initial;
        progress.report(START_PERCENT, MSG_PROCESSING);

        while !operation.done {
            self.wait(started).await?;

            let percent = estimate_progress(started.elapsed(), self.config.estimated_duration);
            progress.report(percent, MSG_GENERATING);

            tracing::debug!("Polling operation {} ({:.0}%)", operation.name, percent);
            operation = self
                .cancel
                .guard(self.api.get_video_operation(self.api_key, &operation))
                .await?;
        }

        tracing::info!(
            "Operation {} finished after {:?}",
            operation.name,
            started.elapsed()
        );
        self.finish(&operation, progress).await
    }

    /// Sleep one interval, bounded by the deadline and interrupted by cancel.
    async fn wait(&self, started: Instant) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut sleep_for = self.config.interval;
        if let Some(max_wait) = self.config.max_wait {
            let remaining = max_wait.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                tracing::warn!("Video operation exceeded deadline of {:?}", max_wait);
                return Err(Error::Timeout(max_wait));
            }
            sleep_for = sleep_for.min(remaining);
        }

        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            _ = self.cancel.cancelled() => {
                tracing::info!("Video operation polling cancelled");
                return Err(Error::Cancelled);
            }
        }

        match self.config.max_wait {
            Some(max_wait) if started.elapsed() >= max_wait => {
                tracing::warn!("Video operation exceeded deadline of {:?}", max_wait);
                Err(Error::Timeout(max_wait))
            }
            _ => Ok(()),
        }
    }

    async fn finish(
        &self,
        operation: &OperationHandle,
        progress: &dyn ProgressSink,
    ) -> Result<ObjectUrl> {
        let uri = operation.video_uri().ok_or_else(|| {
            let mut message = "Video generation failed or returned no content.".to_string();
            if let Some(error) = &operation.error {
                message.push_str(&format!(" ({})", error.message));
            }
            tracing::error!("Operation {}: {}", operation.name, message);
            Error::GenerationFailed(message)
        })?;

        progress.report(FINALIZING_PERCENT, MSG_FINALIZING);
        let download = self
            .cancel
            .guard(self.api.download(self.api_key, uri))
            .await?;
        if !download.is_success() {
            tracing::error!("Video download failed with status {}", download.status);
            return Err(Error::DownloadFailed(format!(
                "Failed to download video (status {}).",
                download.status
            )));
        }

        let mime_type = download
            .content_type
            .filter(|m| m.starts_with("video/"))
            .unwrap_or_else(|| "video/mp4".to_string());
        let object_url = self.blobs.create_object_url(download.bytes, mime_type);

        progress.report(DONE_PERCENT, MSG_DONE);
        Ok(object_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockGenerativeApi;
    use std::sync::Mutex;
    use tokio_test::{assert_pending, assert_ready, task};

    fn fast_config() -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(1),
            estimated_duration: Duration::from_secs(120),
            max_wait: None,
        }
    }

    #[test]
    fn test_estimate_progress_ramp() {
        let est = Duration::from_secs(120);
        assert_eq!(estimate_progress(Duration::ZERO, est), 5.0);
        assert_eq!(estimate_progress(Duration::from_secs(60), est), 50.0);
        assert_eq!(estimate_progress(Duration::from_secs(120), est), 95.0);
        assert_eq!(estimate_progress(Duration::from_secs(600), est), 95.0);
    }

    #[test]
    fn test_estimate_progress_zero_estimate() {
        assert_eq!(estimate_progress(Duration::from_secs(1), Duration::ZERO), 95.0);
    }

    #[test]
    fn test_cancel_token_wakes_waiter() {
        let token = CancelToken::new();
        let clone = token.clone();
        let mut waiter = task::spawn(token.cancelled());
        assert!(!token.is_cancelled());
        assert_pending!(waiter.poll());

        clone.cancel();
        assert!(waiter.is_woken());
        assert_ready!(waiter.poll());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_guard_abandons_pending_call() {
        let token = CancelToken::new();
        let mut call = task::spawn(token.guard(std::future::pending::<Result<()>>()));
        assert_pending!(call.poll());

        token.cancel();
        assert!(call.is_woken());
        let result = assert_ready!(call.poll());
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_guard_passes_through_finished_call() {
        let token = CancelToken::new();
        let mut call = task::spawn(token.guard(async { Ok::<_, Error>(7) }));
        assert_eq!(assert_ready!(call.poll()).unwrap(), 7);
    }

    #[tokio::test]
    async fn test_channel_sink_delivers_reports() {
        let (sink, mut rx) = ChannelProgressSink::new();
        sink.report(5.0, MSG_PROCESSING);

        let report = rx.recv().await.unwrap();
        assert_eq!(report.percentage, 5.0);
        assert_eq!(report.message, MSG_PROCESSING);
    }

    #[tokio::test]
    async fn test_run_polls_until_done() {
        let api = MockGenerativeApi::new()
            .with_operations(vec![
                OperationHandle::pending("op"),
                OperationHandle::pending("op"),
                OperationHandle::completed("op", Some("https://media/v.mp4")),
            ])
            .with_download(200, vec![1, 2, 3]);
        let blobs = BlobRegistry::new();
        let config = fast_config();
        let cancel = CancelToken::new();
        let reports = Mutex::new(Vec::new());
        let sink = |p: f64, m: &str| reports.lock().unwrap().push((p, m.to_string()));

        let poller = OperationPoller::new(&api, &blobs, "key", &config, &cancel);
        let url = poller
            .run(OperationHandle::pending("op"), &sink)
            .await
            .unwrap();

        assert_eq!(&*url.blob().unwrap().bytes, &[1, 2, 3]);
        let reports = reports.into_inner().unwrap();
        assert_eq!(reports.first().unwrap().0, 5.0);
        assert_eq!(reports.last().unwrap(), &(100.0, MSG_DONE.to_string()));
        // three polls, one download
        assert_eq!(api.get_call_count(), 4);
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let api = MockGenerativeApi::new().with_operations(vec![OperationHandle::pending("op")]);
        let blobs = BlobRegistry::new();
        let config = PollConfig {
            interval: Duration::from_millis(5),
            estimated_duration: Duration::from_secs(120),
            max_wait: Some(Duration::from_millis(30)),
        };
        let cancel = CancelToken::new();

        let poller = OperationPoller::new(&api, &blobs, "key", &config, &cancel);
        let err = poller
            .run(OperationHandle::pending("op"), &|_: f64, _: &str| {})
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout(_)));
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn test_run_observes_cancellation() {
        let api = MockGenerativeApi::new().with_operations(vec![OperationHandle::pending("op")]);
        let blobs = BlobRegistry::new();
        let config = PollConfig {
            interval: Duration::from_secs(3600),
            ..fast_config()
        };
        let cancel = CancelToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let poller = OperationPoller::new(&api, &blobs, "key", &config, &cancel);
        let err = poller
            .run(OperationHandle::pending("op"), &|_: f64, _: &str| {})
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(api.get_call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_uri_includes_operation_error() {
        let mut failed = OperationHandle::completed("op", None);
        failed.error = Some(crate::ai::gemini::types::OperationError {
            code: Some(3),
            message: "prompt rejected".to_string(),
        });
        let api = MockGenerativeApi::new();
        let blobs = BlobRegistry::new();
        let config = fast_config();
        let cancel = CancelToken::new();

        let poller = OperationPoller::new(&api, &blobs, "key", &config, &cancel);
        let err = poller.run(failed, &|_: f64, _: &str| {}).await.unwrap_err();

        match err {
            Error::GenerationFailed(message) => assert!(message.contains("prompt rejected")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
