use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::references::ArtifactRef;

/// Smallest and largest accepted compression target, in megabytes.
pub const MIN_TARGET_MB: f64 = 0.1;
pub const MAX_TARGET_MB: f64 = 5.0;
pub const DEFAULT_TARGET_MB: f64 = 1.0;
pub const DEFAULT_MAX_DIMENSION_PX: u32 = 1920;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressConfig {
    pub target_mb: f64,
    pub max_dimension_px: u32,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub auto_compress: bool,
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self {
            target_mb: DEFAULT_TARGET_MB,
            max_dimension_px: DEFAULT_MAX_DIMENSION_PX,
            timeout: Duration::from_secs(60),
            auto_compress: false,
        }
    }
}

/// Convert a megabyte target to a byte budget.
pub fn mb_to_bytes(mb: f64) -> u64 {
    (mb * BYTES_PER_MB).round() as u64
}

/// Image types the workflow accepts and produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageMime {
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/webp")]
    WebP,
}

impl ImageMime {
    pub fn parse(declared: &str) -> Option<Self> {
        match declared.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(ImageMime::Jpeg),
            "image/png" => Some(ImageMime::Png),
            "image/webp" => Some(ImageMime::WebP),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ImageMime::Jpeg => "image/jpeg",
            ImageMime::Png => "image/png",
            ImageMime::WebP => "image/webp",
        }
    }

    /// Guess the declared type from a file extension, the way a file picker does.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "jfif" => Some(ImageMime::Jpeg),
            "png" => Some(ImageMime::Png),
            "webp" => Some(ImageMime::WebP),
            _ => None,
        }
    }
}

impl std::fmt::Display for ImageMime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable image bytes plus the metadata the workflow needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageArtifact {
    bytes: Bytes,
    mime: ImageMime,
    original_file_name: String,
}

impl ImageArtifact {
    pub fn new(bytes: impl Into<Bytes>, mime: ImageMime, original_file_name: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime,
            original_file_name: original_file_name.into(),
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn mime(&self) -> ImageMime {
        self.mime
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn original_file_name(&self) -> &str {
        &self.original_file_name
    }
}

/// A single file from a selection or drop event, before validation.
#[derive(Debug, Clone)]
pub struct FileInput {
    pub name: String,
    /// Type as declared by whoever handed us the file; may be empty.
    pub declared_type: String,
    pub bytes: Bytes,
}

impl FileInput {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Build an input from bytes read off disk, declaring the type from the extension.
    pub fn from_path_bytes(path: &Path, bytes: impl Into<Bytes>) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".into());
        let declared_type = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ImageMime::from_extension)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        Self::new(name, declared_type, bytes)
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Monotonic identifier assigned by the history ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One completed compression, retained for the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: RecordId,
    pub original_file_name: String,
    pub original_size_bytes: u64,
    pub compressed_size_bytes: u64,
    pub savings_percent: i64,
    pub mime: ImageMime,
    pub artifact_reference: ArtifactRef,
    pub created_at: String,
}

impl HistoryRecord {
    pub fn download_name(&self) -> String {
        download_name(&self.original_file_name)
    }
}

pub fn download_name(original_file_name: &str) -> String {
    format!("min-{original_file_name}")
}

/// A save-ready file: what the download affordance hands to the user.
#[derive(Debug, Clone)]
pub struct DownloadPayload {
    pub file_name: String,
    pub mime: ImageMime,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateKind {
    Idle,
    Loaded,
    Compressing,
    Result,
}

impl std::fmt::Display for StateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StateKind::Idle => "idle",
            StateKind::Loaded => "loaded",
            StateKind::Compressing => "compressing",
            StateKind::Result => "result",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CompressEvent {
    StateChanged {
        state: StateKind,
    },
    Progress {
        percent: u8,
    },
    Info(InfoEvent),
    Completed {
        // Box to keep the event small; records carry several strings.
        record: Box<HistoryRecord>,
    },
    Failed {
        message: String,
    },
}

/// Structured info events consumed by presentation layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InfoEvent {
    Message(String),
    Loaded { name: String, size_bytes: u64 },
    Rejected { message: String },
    Saved { path: String },
    History { lines: Vec<String> },
}

impl InfoEvent {
    /// Render a human-readable message for UI/CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::Loaded { name, size_bytes } => {
                format!(
                    "Loaded {} ({})",
                    name,
                    crate::metrics::format_mb(*size_bytes)
                )
            }
            InfoEvent::Rejected { message } => message.clone(),
            InfoEvent::Saved { path } => format!("Saved: {path}"),
            InfoEvent::History { lines } => lines.join("\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_type_parsing_is_case_insensitive() {
        assert_eq!(ImageMime::parse("IMAGE/PNG"), Some(ImageMime::Png));
        assert_eq!(ImageMime::parse("image/jpg"), Some(ImageMime::Jpeg));
        assert_eq!(ImageMime::parse("application/pdf"), None);
        assert_eq!(ImageMime::parse(""), None);
    }

    #[test]
    fn path_inputs_declare_type_from_extension() {
        let input = FileInput::from_path_bytes(Path::new("/tmp/Holiday.JPG"), vec![1u8, 2, 3]);
        assert_eq!(input.name, "Holiday.JPG");
        assert_eq!(input.declared_type, "image/jpeg");
        assert_eq!(input.size_bytes(), 3);

        let doc = FileInput::from_path_bytes(Path::new("notes.pdf"), vec![0u8]);
        assert_eq!(doc.declared_type, "application/octet-stream");
    }

    #[test]
    fn download_name_prefixes_original() {
        assert_eq!(download_name("cat.webp"), "min-cat.webp");
    }

    #[test]
    fn config_round_trips_humantime_timeout() {
        let cfg = CompressConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"timeout\":\"1m\""));
    }
}
