//! Annotation export: YOLO per-line text and aggregated COCO JSON, plus the
//! train/val/test scaffold for handing a dataset to a training run.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{io_error, Role, StorageError, StorageManager};

/// Normalization target when the exported image cannot be read back. Boxes
/// divided by this pair are an approximation and the export says so on
/// stderr; it is never applied silently.
pub const FALLBACK_DIMENSIONS: (u32, u32) = (640, 480);

/// One labeled bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub class_id: u32,
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl AnnotationRecord {
    /// One YOLO label line: `class x_center y_center width height`, all four
    /// box fields normalized by the image dimensions, six decimals.
    pub fn to_yolo_line(&self, image_width: u32, image_height: u32) -> String {
        let width = f64::from(image_width);
        let height = f64::from(image_height);

        let x_center = (self.x_min + self.x_max) / 2.0 / width;
        let y_center = (self.y_min + self.y_max) / 2.0 / height;
        let box_width = (self.x_max - self.x_min) / width;
        let box_height = (self.y_max - self.y_min) / height;

        format!(
            "{} {:.6} {:.6} {:.6} {:.6}",
            self.class_id, x_center, y_center, box_width, box_height
        )
    }

    /// Rebuild a record from a COCO `[x, y, width, height]` box.
    pub fn from_coco_bbox(class_id: u32, bbox: [f64; 4]) -> Self {
        Self {
            class_id,
            x_min: bbox[0],
            y_min: bbox[1],
            x_max: bbox[0] + bbox[2],
            y_max: bbox[1] + bbox[3],
        }
    }
}

/// Supported label serializations. Parsing an unknown name fails loudly;
/// defaulting here would hide a caller bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    YoloText,
    CocoJson,
}

impl FromStr for ExportFormat {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, StorageError> {
        match s.to_ascii_lowercase().as_str() {
            "yolo" | "yolo-text" => Ok(ExportFormat::YoloText),
            "coco" | "coco-json" => Ok(ExportFormat::CocoJson),
            other => Err(StorageError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Aggregated COCO document. Parses back losslessly; the round trip is part
/// of the contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CocoDocument {
    pub images: Vec<CocoImage>,
    pub categories: Vec<CocoCategory>,
    pub annotations: Vec<CocoAnnotation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CocoImage {
    pub id: u32,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CocoCategory {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CocoAnnotation {
    pub id: u32,
    pub image_id: u32,
    pub category_id: u32,
    /// `[x_min, y_min, width, height]` in pixels.
    pub bbox: [f64; 4],
    pub area: f64,
}

impl StorageManager {
    /// Write the labels for one image in the chosen format.
    ///
    /// YOLO labels land in `annotations/{stem}.txt`, COCO documents in
    /// `exports/coco/{stem}.json`. Returns the written path.
    pub fn save_annotation(
        &self,
        image_path: &Path,
        records: &[AnnotationRecord],
        format: ExportFormat,
    ) -> Result<PathBuf, StorageError> {
        let stem = image_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "annotation".to_string());

        match format {
            ExportFormat::YoloText => self.write_yolo_labels(image_path, &stem, records),
            ExportFormat::CocoJson => self.write_coco_document(image_path, &stem, records),
        }
    }

    /// Scaffold the training export skeleton for `format`.
    ///
    /// Creates structure only; splitting the captured images into the
    /// train/val/test folders is a separate, later step. For YOLO a
    /// `dataset.yaml` descriptor with the class map and relative split paths
    /// is written alongside the folders.
    pub fn export_for_training(
        &self,
        format: ExportFormat,
        classes: Option<&[String]>,
    ) -> Result<PathBuf, StorageError> {
        match format {
            ExportFormat::YoloText => {
                let root = self.role_path(Role::ExportsYolo);
                for kind in ["images", "labels"] {
                    for split in ["train", "val", "test"] {
                        let path = root.join(kind).join(split);
                        fs::create_dir_all(&path).map_err(io_error(&path))?;
                    }
                }

                let descriptor_path = root.join("dataset.yaml");
                fs::write(&descriptor_path, yolo_descriptor(classes))
                    .map_err(io_error(&descriptor_path))?;

                println!("✅ YOLO training scaffold ready at {}", root.display());
                Ok(root)
            }
            ExportFormat::CocoJson => {
                let root = self.role_path(Role::ExportsCoco);
                fs::create_dir_all(&root).map_err(io_error(&root))?;
                println!("✅ COCO export folder ready at {}", root.display());
                Ok(root)
            }
        }
    }

    fn write_yolo_labels(
        &self,
        image_path: &Path,
        stem: &str,
        records: &[AnnotationRecord],
    ) -> Result<PathBuf, StorageError> {
        let (width, height) = dimensions_or_fallback(image_path);

        let mut content = String::new();
        for record in records {
            content.push_str(&record.to_yolo_line(width, height));
            content.push('\n');
        }

        let path = self
            .role_path(Role::Annotations)
            .join(format!("{}.txt", stem));
        fs::write(&path, content).map_err(io_error(&path))?;
        Ok(path)
    }

    fn write_coco_document(
        &self,
        image_path: &Path,
        stem: &str,
        records: &[AnnotationRecord],
    ) -> Result<PathBuf, StorageError> {
        let (width, height) = dimensions_or_fallback(image_path);
        let file_name = image_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("{}.png", stem));

        // Single-image document with the image id fixed at 1. Aggregating
        // several images would need unique incrementing ids; this path does
        // not support that.
        let class_ids: BTreeSet<u32> = records.iter().map(|r| r.class_id).collect();
        let document = CocoDocument {
            images: vec![CocoImage {
                id: 1,
                file_name,
                width,
                height,
            }],
            categories: class_ids
                .into_iter()
                .map(|id| CocoCategory {
                    id,
                    name: format!("class_{}", id),
                })
                .collect(),
            annotations: records
                .iter()
                .enumerate()
                .map(|(i, record)| {
                    let box_width = record.x_max - record.x_min;
                    let box_height = record.y_max - record.y_min;
                    CocoAnnotation {
                        id: i as u32 + 1,
                        image_id: 1,
                        category_id: record.class_id,
                        bbox: [record.x_min, record.y_min, box_width, box_height],
                        area: box_width * box_height,
                    }
                })
                .collect(),
        };

        let path = self
            .role_path(Role::ExportsCoco)
            .join(format!("{}.json", stem));
        let json = serde_json::to_string_pretty(&document)?;
        fs::write(&path, json).map_err(io_error(&path))?;
        Ok(path)
    }
}

fn dimensions_or_fallback(image_path: &Path) -> (u32, u32) {
    match image::image_dimensions(image_path) {
        Ok(dimensions) => dimensions,
        Err(e) => {
            eprintln!(
                "⚠️  Could not read {} ({}); normalizing against {}x{} as an approximation",
                image_path.display(),
                e,
                FALLBACK_DIMENSIONS.0,
                FALLBACK_DIMENSIONS.1
            );
            FALLBACK_DIMENSIONS
        }
    }
}

/// Ultralytics-style dataset descriptor; split paths are relative to the
/// YOLO export root.
fn yolo_descriptor(classes: Option<&[String]>) -> String {
    let mut out = String::from(
        "path: .\ntrain: images/train\nval: images/val\ntest: images/test\n\nnames:\n",
    );
    match classes {
        Some(classes) if !classes.is_empty() => {
            for (id, name) in classes.iter().enumerate() {
                out.push_str(&format!("  {}: {}\n", id, name));
            }
        }
        _ => out.push_str("  0: part\n"),
    }
    out
}
