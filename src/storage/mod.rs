//! Dataset storage: root folder taxonomy, image persistence, statistics.
//!
//! A [`StorageManager`] owns one base directory and a fixed set of role
//! subfolders underneath it:
//!
//! ```text
//! root/
//!   images/                captured frames
//!   annotations/           per-capture metadata JSON + YOLO label .txt
//!   exports/yolo/          training scaffold + dataset descriptor
//!   exports/coco/          aggregated COCO documents
//! ```
//!
//! Every role path exists on disk for the whole life of the manager; the
//! layout is created eagerly and recreated whenever the base changes.

pub mod export;

pub use export::{AnnotationRecord, CocoDocument, ExportFormat};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use walkdir::WalkDir;

/// Extensions counted as captured images by the statistics scan.
const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every encoder in the fallback table failed.
    #[error("could not encode image: {0}")]
    Encode(String),

    #[error("failed to serialize metadata: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Caller passed a format string outside the supported set. This is a
    /// contract violation and fails loudly instead of defaulting.
    #[error("unsupported export format {0:?} (expected \"yolo\" or \"coco\")")]
    UnsupportedFormat(String),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Folder roles under the storage root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Images,
    Annotations,
    ExportsYolo,
    ExportsCoco,
}

impl Role {
    const ALL: [Role; 4] = [
        Role::Images,
        Role::Annotations,
        Role::ExportsYolo,
        Role::ExportsCoco,
    ];

    fn rel_path(self) -> &'static str {
        match self {
            Role::Images => "images",
            Role::Annotations => "annotations",
            Role::ExportsYolo => "exports/yolo",
            Role::ExportsCoco => "exports/coco",
        }
    }
}

/// Sidecar metadata written next to a capture. Created exactly once per
/// successful save, never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub identifier: String,
    /// ISO-8601 local timestamp of the capture.
    pub timestamp: String,
    pub image_path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Caller-supplied free-form payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// One captured image as reported by [`StorageManager::list_images`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapturedImage {
    pub filename: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Storage counters reported by [`StorageManager::get_statistics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    pub total_images: usize,
    pub total_annotations: usize,
    pub storage_size_bytes: u64,
    /// Per-class box counts, read back from YOLO label lines under the
    /// annotations role.
    pub by_class: BTreeMap<u32, usize>,
}

pub struct StorageManager {
    base: PathBuf,
}

impl StorageManager {
    /// Create a manager rooted at `base`, creating the subfolder taxonomy
    /// eagerly.
    pub fn new(base: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let manager = Self { base: base.into() };
        manager.ensure_layout()?;
        Ok(manager)
    }

    /// Default root: `./captures`, falling back to a `captures` folder in the
    /// home directory when there is no usable working directory.
    pub fn with_default_root() -> Result<Self, StorageError> {
        let parent = std::env::current_dir()
            .ok()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(parent.join("captures"))
    }

    pub fn base_path(&self) -> &Path {
        &self.base
    }

    pub fn role_path(&self, role: Role) -> PathBuf {
        self.base.join(role.rel_path())
    }

    /// Re-point the root; the taxonomy is recreated under the new base.
    pub fn set_base(&mut self, base: impl Into<PathBuf>) -> Result<(), StorageError> {
        self.base = base.into();
        self.ensure_layout()
    }

    fn ensure_layout(&self) -> Result<(), StorageError> {
        for role in Role::ALL {
            let path = self.role_path(role);
            fs::create_dir_all(&path).map_err(io_error(&path))?;
        }
        Ok(())
    }

    /// Save a frame under `images/`, stamped `{identifier}_{YYYYMMDD_HHMMSS}`.
    ///
    /// Returns `None` on failure with the cause logged; a full disk must
    /// never take the station down. When `metadata` is supplied a sidecar
    /// JSON record is written under `annotations/` with the same stem.
    pub fn save_image(
        &self,
        frame: &RgbImage,
        identifier: &str,
        metadata: Option<serde_json::Value>,
    ) -> Option<PathBuf> {
        match self.try_save_image(frame, identifier, Local::now(), metadata) {
            Ok(path) => {
                println!("📸 Saved capture: {}", path.display());
                Some(path)
            }
            Err(e) => {
                eprintln!("❌ Could not save capture: {}", e);
                None
            }
        }
    }

    /// Timestamp-explicit save.
    ///
    /// Note on collisions: two saves of the same identifier within one second
    /// share a filename and the later silently overwrites the earlier. That
    /// matches the capture cadence this tool is built for and is intentional;
    /// do not add dedup logic here, it would change observable behavior.
    pub fn try_save_image(
        &self,
        frame: &RgbImage,
        identifier: &str,
        timestamp: DateTime<Local>,
        metadata: Option<serde_json::Value>,
    ) -> Result<PathBuf, StorageError> {
        let stem = format!("{}_{}", identifier, timestamp.format("%Y%m%d_%H%M%S"));
        let image_path = self.role_path(Role::Images).join(format!("{}.png", stem));

        let written = encode_with_fallback(frame, &image_path)?;

        if metadata.is_some() {
            let record = CaptureRecord {
                identifier: identifier.to_string(),
                timestamp: timestamp.to_rfc3339(),
                image_path: written.clone(),
                width: frame.width(),
                height: frame.height(),
                extra: metadata,
            };
            let record_path = self
                .role_path(Role::Annotations)
                .join(format!("{}.json", stem));
            let json = serde_json::to_string_pretty(&record)?;
            fs::write(&record_path, json).map_err(io_error(&record_path))?;
        }

        Ok(written)
    }

    /// Count captures and labels under the root.
    ///
    /// Images are files with a known image extension under `images/`;
    /// annotations are JSON sidecars under `annotations/`. Other files are
    /// ignored. Per-class counts come from YOLO label lines.
    pub fn get_statistics(&self) -> StorageStats {
        let mut stats = StorageStats::default();

        for entry in WalkDir::new(self.role_path(Role::Images))
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            if !has_extension(entry.path(), &IMAGE_EXTENSIONS) {
                continue;
            }
            stats.total_images += 1;
            if let Ok(meta) = entry.metadata() {
                stats.storage_size_bytes += meta.len();
            }
        }

        for entry in WalkDir::new(self.role_path(Role::Annotations))
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            if has_extension(entry.path(), &["json"]) {
                stats.total_annotations += 1;
            } else if has_extension(entry.path(), &["txt"]) {
                tally_yolo_classes(entry.path(), &mut stats.by_class);
            }
        }

        stats
    }

    /// List the captures under `images/`, sorted by filename.
    ///
    /// Same selection rule as [`get_statistics`](Self::get_statistics): known
    /// image extensions only, anything else in the folder is ignored.
    pub fn list_images(&self) -> Vec<CapturedImage> {
        let mut images: Vec<CapturedImage> = WalkDir::new(self.role_path(Role::Images))
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| has_extension(e.path(), &IMAGE_EXTENSIONS))
            .map(|entry| CapturedImage {
                filename: entry.file_name().to_string_lossy().into_owned(),
                path: entry.path().to_path_buf(),
                size_bytes: entry.metadata().map(|m| m.len()).unwrap_or(0),
            })
            .collect();
        images.sort_by(|a, b| a.filename.cmp(&b.filename));
        images
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|e| extensions.contains(&e.as_str()))
}

/// Add the class ids found in one YOLO label file to the tally. Malformed
/// lines are skipped, not errors; statistics are best effort.
fn tally_yolo_classes(path: &Path, by_class: &mut BTreeMap<u32, usize>) {
    let Ok(content) = fs::read_to_string(path) else {
        return;
    };
    for line in content.lines() {
        if let Some(class_id) = line.split_whitespace().next().and_then(|t| t.parse().ok()) {
            *by_class.entry(class_id).or_insert(0) += 1;
        }
    }
}

/// Ordered encoder table for the save path.
///
/// Each entry either writes the file or reports failure so the next one
/// runs. A raw RGB dump is the terminal fallback; it always succeeds as
/// long as the disk cooperates, so a grabbed frame is never silently lost.
#[derive(Debug, Clone, Copy)]
enum Encoder {
    Png,
    Bmp,
    RawRgb,
}

const ENCODERS: [Encoder; 3] = [Encoder::Png, Encoder::Bmp, Encoder::RawRgb];

impl Encoder {
    fn target_path(self, png_path: &Path) -> PathBuf {
        match self {
            Encoder::Png => png_path.to_path_buf(),
            Encoder::Bmp => png_path.with_extension("bmp"),
            Encoder::RawRgb => png_path.with_extension("raw"),
        }
    }

    fn write(self, frame: &RgbImage, target: &Path) -> Result<(), StorageError> {
        match self {
            Encoder::Png => frame
                .save_with_format(target, ImageFormat::Png)
                .map_err(|e| StorageError::Encode(e.to_string())),
            Encoder::Bmp => frame
                .save_with_format(target, ImageFormat::Bmp)
                .map_err(|e| StorageError::Encode(e.to_string())),
            Encoder::RawRgb => fs::write(target, frame.as_raw()).map_err(io_error(target)),
        }
    }
}

fn encode_with_fallback(frame: &RgbImage, png_path: &Path) -> Result<PathBuf, StorageError> {
    let mut last_error = None;
    for encoder in ENCODERS {
        let target = encoder.target_path(png_path);
        match encoder.write(frame, &target) {
            Ok(()) => {
                if !matches!(encoder, Encoder::Png) {
                    eprintln!(
                        "⚠️  PNG encode failed, wrote {} instead",
                        target.display()
                    );
                }
                return Ok(target);
            }
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| StorageError::Encode("no encoder available".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use image::Rgb;
    use tempfile::tempdir;

    fn frame(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([40, 40, 40]))
    }

    fn fixed_timestamp() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_layout_is_created_eagerly() {
        let dir = tempdir().unwrap();
        let storage = StorageManager::new(dir.path().join("root")).unwrap();

        for role in Role::ALL {
            assert!(storage.role_path(role).is_dir(), "{:?} missing", role);
        }
    }

    #[test]
    fn test_set_base_recreates_layout() {
        let dir = tempdir().unwrap();
        let mut storage = StorageManager::new(dir.path().join("a")).unwrap();
        storage.set_base(dir.path().join("b")).unwrap();

        assert!(dir.path().join("b/images").is_dir());
        assert!(dir.path().join("b/exports/yolo").is_dir());
    }

    #[test]
    fn test_save_image_filename_is_identifier_plus_stamp() {
        let dir = tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).unwrap();

        let path = storage
            .try_save_image(&frame(64, 48), "PN123", fixed_timestamp(), None)
            .unwrap();

        assert_eq!(
            path,
            storage.role_path(Role::Images).join("PN123_20240501_100000.png")
        );
        assert!(path.is_file());
    }

    #[test]
    fn test_save_image_with_metadata_writes_sidecar_record() {
        let dir = tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).unwrap();

        let extra = serde_json::json!({ "operator": "maria", "shift": 2 });
        let image_path = storage
            .try_save_image(&frame(64, 48), "PN123", fixed_timestamp(), Some(extra.clone()))
            .unwrap();

        let record_path = storage
            .role_path(Role::Annotations)
            .join("PN123_20240501_100000.json");
        let record: CaptureRecord =
            serde_json::from_str(&fs::read_to_string(&record_path).unwrap()).unwrap();

        assert_eq!(record.identifier, "PN123");
        assert_eq!(record.image_path, image_path);
        assert_eq!((record.width, record.height), (64, 48));
        assert_eq!(record.extra, Some(extra));
        assert!(record.timestamp.starts_with("2024-05-01T10:00:00"));
    }

    #[test]
    fn test_no_metadata_means_no_sidecar() {
        let dir = tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).unwrap();

        storage
            .try_save_image(&frame(64, 48), "PN123", fixed_timestamp(), None)
            .unwrap();

        assert!(!storage
            .role_path(Role::Annotations)
            .join("PN123_20240501_100000.json")
            .exists());
    }

    #[test]
    fn test_same_second_save_overwrites_silently() {
        // Documented limitation, not a bug: same identifier + same second
        // share one filename.
        let dir = tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).unwrap();

        let first = storage
            .try_save_image(&frame(64, 48), "PN123", fixed_timestamp(), None)
            .unwrap();
        let second = storage
            .try_save_image(&frame(32, 24), "PN123", fixed_timestamp(), None)
            .unwrap();

        assert_eq!(first, second);
        let count = fs::read_dir(storage.role_path(Role::Images))
            .unwrap()
            .count();
        assert_eq!(count, 1);
        // Second write won.
        assert_eq!(image::image_dimensions(&second).unwrap(), (32, 24));
    }

    #[test]
    fn test_statistics_count_only_image_extensions() {
        let dir = tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).unwrap();

        for identifier in ["A", "B", "C"] {
            storage
                .try_save_image(&frame(16, 16), identifier, fixed_timestamp(), None)
                .unwrap();
        }
        fs::write(storage.role_path(Role::Images).join("notes.txt"), "x").unwrap();

        let stats = storage.get_statistics();
        assert_eq!(stats.total_images, 3);
        assert!(stats.storage_size_bytes > 0);
    }

    #[test]
    fn test_statistics_annotations_and_by_class() {
        let dir = tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).unwrap();
        let annotations = storage.role_path(Role::Annotations);

        fs::write(annotations.join("a.json"), "{}").unwrap();
        fs::write(
            annotations.join("a.txt"),
            "0 0.5 0.5 0.1 0.1\n1 0.2 0.2 0.1 0.1\n0 0.8 0.8 0.1 0.1\n",
        )
        .unwrap();

        let stats = storage.get_statistics();
        assert_eq!(stats.total_annotations, 1);
        assert_eq!(stats.by_class.get(&0), Some(&2));
        assert_eq!(stats.by_class.get(&1), Some(&1));
    }

    #[test]
    fn test_list_images_reports_name_path_and_size() {
        let dir = tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).unwrap();

        storage
            .try_save_image(&frame(16, 16), "B2", fixed_timestamp(), None)
            .unwrap();
        storage
            .try_save_image(&frame(16, 16), "A1", fixed_timestamp(), None)
            .unwrap();
        fs::write(storage.role_path(Role::Images).join("notes.txt"), "x").unwrap();

        let images = storage.list_images();
        assert_eq!(images.len(), 2);
        // Sorted by filename, non-images skipped.
        assert_eq!(images[0].filename, "A1_20240501_100000.png");
        assert_eq!(images[1].filename, "B2_20240501_100000.png");
        for image in &images {
            assert!(image.path.is_file());
            assert_eq!(image.size_bytes, fs::metadata(&image.path).unwrap().len());
        }
    }

    #[test]
    fn test_list_images_on_empty_root() {
        let dir = tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).unwrap();
        assert!(storage.list_images().is_empty());
    }

    #[test]
    fn test_statistics_on_empty_root() {
        let dir = tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).unwrap();
        assert_eq!(storage.get_statistics(), StorageStats::default());
    }
}
