//! Writing results to disk: downloads and history exports.

use crate::model::{DownloadPayload, HistoryRecord};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Default directory for saved images: the user's download folder, else the current directory.
pub fn default_out_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Write `payload` into `dir` under its download name. Returns the absolute path.
pub fn save_download(dir: &Path, payload: &DownloadPayload) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create output directory {}", dir.display()))?;
    // Only the final path component is used; the file must land inside `dir`.
    let name = Path::new(&payload.file_name)
        .file_name()
        .context("download has no file name")?;
    let path = dir.join(name);
    std::fs::write(&path, &payload.bytes)
        .with_context(|| format!("write {}", path.display()))?;
    Ok(std::fs::canonicalize(&path).unwrap_or(path))
}

/// Export history records (most recent first) as pretty JSON.
pub fn export_history_json(path: &Path, records: &[HistoryRecord]) -> Result<()> {
    let json = serde_json::to_string_pretty(records).context("serialize history")?;
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImageArtifact, ImageMime, RecordId};
    use crate::references::ReferenceTable;
    use std::sync::Arc;

    #[test]
    fn download_lands_under_min_name() {
        let dir = tempfile::tempdir().unwrap();
        let payload = DownloadPayload {
            file_name: "min-photo.jpg".into(),
            mime: ImageMime::Jpeg,
            bytes: bytes::Bytes::from_static(b"jpegbytes"),
        };
        let path = save_download(dir.path(), &payload).unwrap();
        assert!(path.ends_with("min-photo.jpg"));
        assert_eq!(std::fs::read(&path).unwrap(), b"jpegbytes");
    }

    #[test]
    fn download_name_cannot_escape_directory() {
        let dir = tempfile::tempdir().unwrap();
        let payload = DownloadPayload {
            file_name: "min-../../evil.png".into(),
            mime: ImageMime::Png,
            bytes: bytes::Bytes::from_static(b"x"),
        };
        let path = save_download(dir.path(), &payload).unwrap();
        assert!(path.starts_with(std::fs::canonicalize(dir.path()).unwrap()));
    }

    #[test]
    fn history_exports_as_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let mut refs = ReferenceTable::new();
        let record = HistoryRecord {
            id: RecordId(1),
            original_file_name: "a.webp".into(),
            original_size_bytes: 100,
            compressed_size_bytes: 40,
            savings_percent: 60,
            mime: ImageMime::WebP,
            artifact_reference: refs.create(Arc::new(ImageArtifact::new(
                vec![0u8; 40],
                ImageMime::WebP,
                "a.webp",
            ))),
            created_at: "2024-05-01T10:00:00Z".into(),
        };
        let path = dir.path().join("history.json");
        export_history_json(&path, &[record]).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value[0]["id"], 1);
        assert_eq!(value[0]["mime"], "image/webp");
        assert_eq!(value[0]["savings_percent"], 60);
        assert!(value[0]["artifact_reference"]
            .as_str()
            .unwrap()
            .starts_with("blob:squish/"));
    }
}
