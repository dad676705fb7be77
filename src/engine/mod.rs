pub mod raster;

use crate::error::WorkflowError;
use crate::model::{CompressEvent, ImageArtifact};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub use raster::RasterTranscoder;

/// Limits handed to the transcoding capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeOptions {
    pub max_size_bytes: u64,
    pub max_dimension_px: u32,
}

/// Publishes progress as `CompressEvent::Progress`, never going backwards.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    last: Arc<AtomicU8>,
    event_tx: Option<mpsc::UnboundedSender<CompressEvent>>,
}

impl ProgressReporter {
    pub fn new(event_tx: mpsc::UnboundedSender<CompressEvent>) -> Self {
        Self {
            last: Arc::new(AtomicU8::new(0)),
            event_tx: Some(event_tx),
        }
    }

    /// A reporter that only tracks the high-water mark.
    pub fn detached() -> Self {
        Self {
            last: Arc::new(AtomicU8::new(0)),
            event_tx: None,
        }
    }

    /// Report `percent` (clamped to 100). Values below the last reported one are dropped.
    pub fn report(&self, percent: u8) {
        let percent = percent.min(100);
        let prev = self.last.fetch_max(percent, Ordering::Relaxed);
        if percent > prev {
            if let Some(tx) = &self.event_tx {
                let _ = tx.send(CompressEvent::Progress { percent });
            }
        }
    }

    pub fn current(&self) -> u8 {
        self.last.load(Ordering::Relaxed)
    }
}

/// The pixel-level capability that turns an image into a smaller one.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(
        &self,
        input: Arc<ImageArtifact>,
        options: TranscodeOptions,
        progress: ProgressReporter,
    ) -> Result<ImageArtifact>;
}

/// Runs a transcoder under the configured timeout and maps its failures.
#[derive(Clone)]
pub struct CompressionEngine {
    transcoder: Arc<dyn Transcoder>,
    timeout: Duration,
}

impl CompressionEngine {
    pub fn new(transcoder: Arc<dyn Transcoder>, timeout: Duration) -> Self {
        Self {
            transcoder,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn run(
        &self,
        input: Arc<ImageArtifact>,
        options: TranscodeOptions,
        event_tx: mpsc::UnboundedSender<CompressEvent>,
    ) -> std::result::Result<ImageArtifact, WorkflowError> {
        let progress = ProgressReporter::new(event_tx);
        debug!(
            name = input.original_file_name(),
            size_bytes = input.size_bytes(),
            max_size_bytes = options.max_size_bytes,
            max_dimension_px = options.max_dimension_px,
            "transcode starting"
        );

        let fut = self
            .transcoder
            .transcode(input, options, progress.clone());
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(out)) => {
                progress.report(100);
                debug!(size_bytes = out.size_bytes(), "transcode finished");
                Ok(out)
            }
            Ok(Err(e)) => {
                warn!(error = %format!("{e:#}"), "transcode failed");
                Err(WorkflowError::CompressionFailed(format!("{e:#}")))
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "transcode timed out");
                Err(WorkflowError::CompressionFailed(format!(
                    "timed out after {}",
                    humantime::format_duration(self.timeout)
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ImageMime;

    struct Halve;

    #[async_trait]
    impl Transcoder for Halve {
        async fn transcode(
            &self,
            input: Arc<ImageArtifact>,
            _options: TranscodeOptions,
            progress: ProgressReporter,
        ) -> Result<ImageArtifact> {
            progress.report(40);
            progress.report(10);
            progress.report(70);
            let half = input.bytes().slice(..input.bytes().len() / 2);
            Ok(ImageArtifact::new(half, input.mime(), input.original_file_name()))
        }
    }

    struct Stall;

    #[async_trait]
    impl Transcoder for Stall {
        async fn transcode(
            &self,
            _input: Arc<ImageArtifact>,
            _options: TranscodeOptions,
            _progress: ProgressReporter,
        ) -> Result<ImageArtifact> {
            futures::future::pending().await
        }
    }

    fn input() -> Arc<ImageArtifact> {
        Arc::new(ImageArtifact::new(vec![7u8; 100], ImageMime::Jpeg, "x.jpg"))
    }

    fn options() -> TranscodeOptions {
        TranscodeOptions {
            max_size_bytes: 50,
            max_dimension_px: 1920,
        }
    }

    #[test]
    fn reporter_drops_regressions_and_clamps() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let p = ProgressReporter::new(tx);
        p.report(30);
        p.report(20);
        p.report(30);
        p.report(250);
        drop(p);
        let mut seen = Vec::new();
        while let Ok(CompressEvent::Progress { percent }) = rx.try_recv() {
            seen.push(percent);
        }
        assert_eq!(seen, vec![30, 100]);
    }

    #[tokio::test]
    async fn progress_is_non_decreasing_and_ends_at_100() {
        let engine = CompressionEngine::new(Arc::new(Halve), Duration::from_secs(5));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let out = engine.run(input(), options(), tx).await.unwrap();
        assert_eq!(out.size_bytes(), 50);

        let mut seen = Vec::new();
        while let Some(ev) = rx.recv().await {
            if let CompressEvent::Progress { percent } = ev {
                seen.push(percent);
            }
        }
        assert_eq!(seen, vec![40, 70, 100]);
    }

    #[tokio::test]
    async fn timeout_maps_to_compression_failed() {
        let engine = CompressionEngine::new(Arc::new(Stall), Duration::from_millis(20));
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = engine.run(input(), options(), tx).await.unwrap_err();
        assert!(matches!(err, WorkflowError::CompressionFailed(ref m) if m.contains("timed out")));
    }
}
