//! Recording and screenshot persistence.
//!
//! Recordings land under the platform runtime dir as
//! `<slug>--<ts>.webm` with a sibling `.json` metadata sidecar; the
//! screenshots directory mirrors the layout. Uploads are capped at 1 GiB.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use gasoline_common::AppDirs;

use crate::error::{AppError, AppResult};

/// Upload cap per recording.
pub const MAX_RECORDING_BYTES: u64 = 1024 * 1024 * 1024;

/// Sidecar metadata stored next to each recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingMeta {
    /// File stem on disk.
    pub name: String,
    /// Human-friendly name.
    pub display_name: String,
    /// Creation time (RFC3339).
    pub created_at: String,
    /// Capture duration.
    pub duration_seconds: f64,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Page URL at capture time.
    pub url: String,
    /// Browser tab ID.
    pub tab_id: i64,
    /// Capture resolution, e.g. `1920x1080`.
    pub resolution: String,
    /// Container format, e.g. `webm`.
    pub format: String,
    /// Frames per second.
    pub fps: u32,
    /// Whether an audio track is present.
    pub has_audio: bool,
    /// Audio source, e.g. `none`, `tab`, `microphone`.
    pub audio_mode: String,
    /// Whether the capture hit the size cap and was cut short.
    pub truncated: bool,
}

/// Filesystem store for recordings and screenshots.
pub struct RecordingStore {
    recordings_dir: PathBuf,
    screenshots_dir: PathBuf,
}

impl RecordingStore {
    /// Create the store, ensuring both directories exist with owner rwx,
    /// group rx permissions.
    pub fn new() -> AppResult<Self> {
        let dirs = AppDirs::new()
            .ok_or_else(|| AppError::Internal("no home directory available".to_string()))?;
        dirs.ensure_dirs()
            .map_err(|e| AppError::Internal(format!("creating runtime dirs: {e}")))?;
        Ok(Self {
            recordings_dir: dirs.recordings_dir(),
            screenshots_dir: dirs.screenshots_dir(),
        })
    }

    /// Store rooted at an explicit directory (tests).
    pub fn at(root: &Path) -> AppResult<Self> {
        let recordings_dir = root.join("recordings");
        let screenshots_dir = root.join("screenshots");
        for dir in [&recordings_dir, &screenshots_dir] {
            std::fs::create_dir_all(dir)
                .map_err(|e| AppError::Internal(format!("creating {}: {e}", dir.display())))?;
        }
        Ok(Self {
            recordings_dir,
            screenshots_dir,
        })
    }

    /// The recordings directory.
    pub fn recordings_dir(&self) -> &Path {
        &self.recordings_dir
    }

    /// Slugified file stem `<slug>--<ts>` for a display name.
    pub fn file_stem(display_name: &str) -> String {
        let slug: String = display_name
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect::<String>()
            .split('-')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("-");
        let slug = if slug.is_empty() { "recording".to_string() } else { slug };
        format!("{slug}--{}", Utc::now().format("%Y%m%d%H%M%S"))
    }

    /// Persist a recording payload (base64 webm) and its sidecar.
    /// Returns the path of the media file.
    pub fn save_recording(&self, data_base64: &str, mut meta: RecordingMeta) -> AppResult<PathBuf> {
        let data = STANDARD
            .decode(data_base64)
            .map_err(|e| AppError::Validation(format!("recording payload not base64: {e}")))?;
        if data.len() as u64 > MAX_RECORDING_BYTES {
            return Err(AppError::PayloadTooLarge);
        }

        let stem = Self::file_stem(&meta.display_name);
        meta.name = stem.clone();
        meta.size_bytes = data.len() as u64;

        let media_path = self.recordings_dir.join(format!("{stem}.{}", meta.format));
        let sidecar_path = self.recordings_dir.join(format!("{stem}.json"));

        std::fs::write(&media_path, &data)
            .map_err(|e| AppError::Internal(format!("writing recording: {e}")))?;
        let sidecar = serde_json::to_string_pretty(&meta)
            .map_err(|e| AppError::Internal(format!("encoding sidecar: {e}")))?;
        std::fs::write(&sidecar_path, sidecar)
            .map_err(|e| AppError::Internal(format!("writing sidecar: {e}")))?;

        info!(path = %media_path.display(), bytes = meta.size_bytes, "recording saved");
        Ok(media_path)
    }

    /// Persist a screenshot payload (base64 PNG). Returns its path.
    pub fn save_screenshot(&self, data_base64: &str, label: &str) -> AppResult<PathBuf> {
        let data = STANDARD
            .decode(data_base64)
            .map_err(|e| AppError::Validation(format!("screenshot payload not base64: {e}")))?;
        let stem = Self::file_stem(label);
        let path = self.screenshots_dir.join(format!("{stem}.png"));
        std::fs::write(&path, &data)
            .map_err(|e| AppError::Internal(format!("writing screenshot: {e}")))?;
        Ok(path)
    }

    /// List recording sidecars, newest first.
    pub fn list_recordings(&self) -> Vec<RecordingMeta> {
        let Ok(entries) = std::fs::read_dir(&self.recordings_dir) else {
            return Vec::new();
        };
        let mut metas: Vec<RecordingMeta> = entries
            .flatten()
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
            .filter_map(|e| {
                let content = std::fs::read_to_string(e.path()).ok()?;
                serde_json::from_str(&content).ok()
            })
            .collect();
        metas.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        metas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(display_name: &str) -> RecordingMeta {
        RecordingMeta {
            name: String::new(),
            display_name: display_name.to_string(),
            created_at: Utc::now().to_rfc3339(),
            duration_seconds: 4.2,
            size_bytes: 0,
            url: "https://app.test/".into(),
            tab_id: 7,
            resolution: "1280x720".into(),
            format: "webm".into(),
            fps: 30,
            has_audio: false,
            audio_mode: "none".into(),
            truncated: false,
        }
    }

    #[test]
    fn test_file_stem_slug() {
        let stem = RecordingStore::file_stem("Login Flow (v2)!");
        assert!(stem.starts_with("login-flow-v2--"));
    }

    #[test]
    fn test_save_recording_with_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordingStore::at(dir.path()).unwrap();

        let payload = STANDARD.encode(b"webm-bytes");
        let path = store.save_recording(&payload, meta("demo run")).unwrap();
        assert!(path.exists());

        let sidecar = path.with_extension("json");
        assert!(sidecar.exists());

        let listed = store.list_recordings();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].size_bytes, 10);
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordingStore::at(dir.path()).unwrap();
        assert!(store.save_recording("!!!not-base64!!!", meta("x")).is_err());
    }
}
