//! End-to-end workflow tests against a scripted transcoder and the default raster one.

use anyhow::Result;
use async_trait::async_trait;
use image::GenericImageView;
use squish::engine::{CompressionEngine, ProgressReporter, RasterTranscoder, TranscodeOptions, Transcoder};
use squish::model::{CompressConfig, CompressEvent, FileInput, ImageArtifact, ImageMime, StateKind};
use squish::{WorkflowController, WorkflowError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Scripted transcoder: emits a fixed progress script, output sized to the budget
// ---------------------------------------------------------------------------

struct Scripted {
    script: Vec<u8>,
    fail: bool,
}

#[async_trait]
impl Transcoder for Scripted {
    async fn transcode(
        &self,
        input: Arc<ImageArtifact>,
        options: TranscodeOptions,
        progress: ProgressReporter,
    ) -> Result<ImageArtifact> {
        for &p in &self.script {
            progress.report(p);
            tokio::task::yield_now().await;
        }
        if self.fail {
            anyhow::bail!("encoder exploded");
        }
        let size = (options.max_size_bytes as usize).min(input.bytes().len());
        Ok(ImageArtifact::new(
            vec![0xEEu8; size],
            input.mime(),
            input.original_file_name(),
        ))
    }
}

fn engine(script: &[u8], fail: bool) -> CompressionEngine {
    CompressionEngine::new(
        Arc::new(Scripted {
            script: script.to_vec(),
            fail,
        }),
        Duration::from_secs(5),
    )
}

fn jpeg(name: &str, size: usize) -> FileInput {
    FileInput::new(name, "image/jpeg", vec![0x11u8; size])
}

fn drain_progress(rx: &mut mpsc::UnboundedReceiver<CompressEvent>) -> Vec<u8> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        if let CompressEvent::Progress { percent } = ev {
            out.push(percent);
        }
    }
    out
}

#[tokio::test]
async fn three_megabyte_jpeg_end_to_end() {
    let mut c = WorkflowController::new(&CompressConfig::default());
    let preview = c.submit(vec![jpeg("holiday.jpg", 3 * 1024 * 1024)]).unwrap();
    assert_eq!(c.kind(), StateKind::Loaded);
    assert!(c.references().is_live(&preview));

    assert_eq!(c.set_target(1.0), 1.0);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let record = c.compress(&engine(&[10, 35, 30, 60, 90], false), tx).await.unwrap();

    let progress = drain_progress(&mut rx);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{progress:?}");
    assert_eq!(progress.last(), Some(&100));

    assert_eq!(c.kind(), StateKind::Result);
    assert!(record.compressed_size_bytes <= 1024 * 1024);
    assert_eq!(record.savings_percent, 67);
    assert_eq!(c.ledger().head(), Some(&record));

    c.reset().unwrap();
    assert_eq!(c.kind(), StateKind::Idle);
    assert!(!c.references().is_live(&preview));
    assert_eq!(c.ledger().len(), 1);
    assert!(c.references().is_live(&record.artifact_reference));
    // The history reference is the only live one.
    assert_eq!(c.references().live_count(), 1);

    let summary = c.end_session();
    assert_eq!(summary.references_leaked, 0);
    assert_eq!(summary.double_revocations, 0);
}

#[tokio::test]
async fn three_cycles_keep_three_downloadable_records() {
    let mut c = WorkflowController::new(&CompressConfig::default());
    let engine = engine(&[50], false);
    for (i, name) in ["a.jpg", "b.jpg", "c.jpg"].into_iter().enumerate() {
        c.submit(vec![jpeg(name, 1000 * (i + 1))]).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        c.compress(&engine, tx).await.unwrap();
        c.reset().unwrap();
    }

    let names: Vec<_> = c
        .ledger()
        .list()
        .map(|r| r.original_file_name.clone())
        .collect();
    assert_eq!(names, vec!["c.jpg", "b.jpg", "a.jpg"]);

    let ids: Vec<_> = c.ledger().list().map(|r| r.id).collect();
    for (id, (name, size)) in ids.into_iter().zip([("c.jpg", 3000), ("b.jpg", 2000), ("a.jpg", 1000)]) {
        let payload = c.download(Some(id)).unwrap();
        assert_eq!(payload.file_name, format!("min-{name}"));
        assert_eq!(payload.bytes.len(), size);
        assert_eq!(payload.mime, ImageMime::Jpeg);
    }
    assert_eq!(c.references().live_count(), 3);
}

#[tokio::test]
async fn failed_compression_reverts_to_loaded() {
    let mut c = WorkflowController::new(&CompressConfig::default());
    let preview = c.submit(vec![jpeg("x.jpg", 5000)]).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let err = c.compress(&engine(&[20], true), tx).await.unwrap_err();

    assert!(matches!(err, WorkflowError::CompressionFailed(ref m) if m.contains("encoder exploded")));
    assert_eq!(c.kind(), StateKind::Loaded);
    assert_eq!(c.state().preview(), Some(&preview));
    assert!(c.ledger().is_empty());
    assert_eq!(c.last_error(), Some(&err));

    let mut failed = false;
    while let Ok(ev) = rx.try_recv() {
        if let CompressEvent::Failed { message } = ev {
            failed = true;
            assert!(message.starts_with("An error occurred while compressing"));
        }
    }
    assert!(failed);
}

#[tokio::test]
async fn raster_transcoder_shrinks_a_real_png() {
    let img = image::RgbaImage::from_fn(640, 480, |x, y| {
        image::Rgba([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8, 255])
    });
    let mut png = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();
    let original_len = png.len();

    let cfg = CompressConfig {
        max_dimension_px: 320,
        ..CompressConfig::default()
    };
    let mut c = WorkflowController::new(&cfg);
    c.submit(vec![FileInput::new("gradient.png", "image/png", png)]).unwrap();

    let engine = CompressionEngine::new(Arc::new(RasterTranscoder::new()), Duration::from_secs(30));
    let (tx, _rx) = mpsc::unbounded_channel();
    let record = c.compress(&engine, tx).await.unwrap();

    assert_eq!(record.mime, ImageMime::Png);
    assert!((record.compressed_size_bytes as usize) < original_len);
    let payload = c.download(None).unwrap();
    let decoded = image::load_from_memory(&payload.bytes).unwrap();
    assert!(decoded.width() <= 320 && decoded.height() <= 320);
}
