use std::path::PathBuf;
use std::process::ExitCode;

use part_capture::annotate::{annotate, label_text};
use part_capture::camera::CameraService;
use part_capture::storage::{ExportFormat, StorageError, StorageManager};

/// Warm-up reads before the capture; many drivers deliver dark frames right
/// after the stream opens.
const WARMUP_READS: u32 = 5;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("list") => cmd_list(),
        Some("list-captures") => cmd_list_captures(&args[1..]),
        Some("capture") => cmd_capture(&args[1..]),
        Some("stats") => cmd_stats(&args[1..]),
        Some("export") => cmd_export(&args[1..]),
        _ => {
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    eprintln!("part-capture: webcam capture station for part traceability");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  part-capture list");
    eprintln!("  part-capture list-captures [--out DIR]");
    eprintln!("  part-capture capture <identifier> [--out DIR] [--frames N]");
    eprintln!("  part-capture stats [--out DIR]");
    eprintln!("  part-capture export <yolo|coco> [--classes a,b,c] [--out DIR]");
}

fn cmd_list() -> ExitCode {
    let camera = CameraService::new();
    let devices = camera.find_cameras();

    if devices.is_empty() {
        // A station with no camera plugged in is not an error condition.
        println!("No cameras found");
        return ExitCode::SUCCESS;
    }

    println!("Found {} camera(s):", devices.len());
    for device in devices {
        println!("  🎥 {}", device);
    }
    ExitCode::SUCCESS
}

fn cmd_list_captures(args: &[String]) -> ExitCode {
    let storage = match open_storage(args) {
        Ok(storage) => storage,
        Err(e) => {
            eprintln!("❌ Could not open storage root: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let images = storage.list_images();
    if images.is_empty() {
        println!("No captures under {}", storage.base_path().display());
        return ExitCode::SUCCESS;
    }

    println!("{} capture(s) under {}:", images.len(), storage.base_path().display());
    for image in images {
        println!("  📸 {} ({} bytes)", image.filename, image.size_bytes);
    }
    ExitCode::SUCCESS
}

fn cmd_capture(args: &[String]) -> ExitCode {
    let Some(identifier) = args.first().filter(|a| !a.starts_with("--")) else {
        eprintln!("usage: part-capture capture <identifier> [--out DIR] [--frames N]");
        return ExitCode::FAILURE;
    };
    let warmup = match warmup_reads(args) {
        Ok(warmup) => warmup,
        Err(e) => {
            eprintln!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };

    let storage = match open_storage(args) {
        Ok(storage) => storage,
        Err(e) => {
            eprintln!("❌ Could not prepare storage root: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut camera = CameraService::new();
    let Some(device) = camera.find_cameras().into_iter().next() else {
        eprintln!("❌ No cameras found");
        return ExitCode::FAILURE;
    };
    if !camera.start(device) {
        eprintln!("❌ Could not start the camera");
        return ExitCode::FAILURE;
    }

    for _ in 0..warmup {
        let _ = camera.read_frame();
    }
    let Some(frame) = camera.read_frame() else {
        eprintln!("❌ No frame available to capture");
        camera.stop();
        return ExitCode::FAILURE;
    };

    let stamped = annotate(&frame, &label_text(identifier, chrono::Local::now()));
    let saved = storage.save_image(&stamped, identifier.trim(), None);
    camera.stop();

    match saved {
        Some(path) => {
            println!("✅ Capture saved: {}", path.display());
            ExitCode::SUCCESS
        }
        None => ExitCode::FAILURE,
    }
}

fn cmd_stats(args: &[String]) -> ExitCode {
    let storage = match open_storage(args) {
        Ok(storage) => storage,
        Err(e) => {
            eprintln!("❌ Could not open storage root: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let stats = storage.get_statistics();
    println!("📊 Storage root: {}", storage.base_path().display());
    println!("   images:      {}", stats.total_images);
    println!("   annotations: {}", stats.total_annotations);
    println!(
        "   size:        {:.2} MB",
        stats.storage_size_bytes as f64 / 1024.0 / 1024.0
    );
    for (class_id, count) in &stats.by_class {
        println!("   class {}:     {} boxes", class_id, count);
    }
    ExitCode::SUCCESS
}

fn cmd_export(args: &[String]) -> ExitCode {
    let Some(format) = args.first().filter(|a| !a.starts_with("--")) else {
        eprintln!("usage: part-capture export <yolo|coco> [--classes a,b,c] [--out DIR]");
        return ExitCode::FAILURE;
    };
    let format: ExportFormat = match format.parse() {
        Ok(format) => format,
        Err(e) => {
            eprintln!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };

    let storage = match open_storage(args) {
        Ok(storage) => storage,
        Err(e) => {
            eprintln!("❌ Could not open storage root: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let classes: Option<Vec<String>> = flag_value(args, "--classes")
        .map(|list| list.split(',').map(|c| c.trim().to_string()).collect());

    match storage.export_for_training(format, classes.as_deref()) {
        Ok(root) => {
            println!("✅ Export scaffold: {}", root.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Export failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn open_storage(args: &[String]) -> Result<StorageManager, StorageError> {
    match flag_value(args, "--out") {
        Some(dir) => StorageManager::new(PathBuf::from(dir)),
        None => StorageManager::with_default_root(),
    }
}

/// Warm-up read count for `capture`: `--frames N` when given, the default
/// otherwise. A value that does not parse is a typo worth failing on, not
/// something to silently replace with the default.
fn warmup_reads(args: &[String]) -> Result<u32, String> {
    match flag_value(args, "--frames") {
        None => Ok(WARMUP_READS),
        Some(raw) => raw
            .parse()
            .map_err(|_| format!("--frames expects a number, got {:?}", raw)),
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a.as_str() == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_warmup_reads_defaults_without_flag() {
        assert_eq!(warmup_reads(&args(&["PN123"])), Ok(WARMUP_READS));
    }

    #[test]
    fn test_warmup_reads_honors_frames_flag() {
        let parsed = warmup_reads(&args(&["PN123", "--out", "/tmp/x", "--frames", "12"]));
        assert_eq!(parsed, Ok(12));
    }

    #[test]
    fn test_warmup_reads_rejects_garbage() {
        assert!(warmup_reads(&args(&["PN123", "--frames", "soon"])).is_err());
    }

    #[test]
    fn test_warmup_reads_trailing_flag_falls_back_to_default() {
        assert_eq!(warmup_reads(&args(&["PN123", "--frames"])), Ok(WARMUP_READS));
    }
}
