use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm", "mov", "avi", "flv", "mpg", "mpeg"];

#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub size: u64,
    #[serde(rename = "sizeFormatted")]
    pub size_formatted: String,
    pub date: String,
    #[serde(rename = "type")]
    pub media_type: String,
    #[serde(skip)]
    modified: DateTime<Utc>,
}

fn extension(name: &str) -> &str {
    name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("")
}

fn is_video(name: &str) -> bool {
    let ext = extension(name).to_ascii_lowercase();
    VIDEO_EXTENSIONS.contains(&ext.as_str())
}

/// Numeric value of a `NNN_` filename prefix, 0 when absent. Drives the
/// listing sort so newer downloads come first.
fn prefix_number(name: &str) -> u64 {
    name.split('_')
        .next()
        .and_then(|tok| tok.parse().ok())
        .unwrap_or(0)
}

/// Lists completed video artifacts, newest first: descending numeric prefix,
/// then descending modification time.
pub fn list_videos(dir: &Path) -> std::io::Result<Vec<FileEntry>> {
    let mut files: Vec<FileEntry> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            if !is_video(&name) {
                return None;
            }
            let meta = entry.metadata().ok()?;
            let modified: DateTime<Utc> = meta.modified().ok()?.into();
            Some(FileEntry {
                path: format!("/downloads/{name}"),
                size: meta.len(),
                size_formatted: format_file_size(meta.len()),
                date: modified.to_rfc3339(),
                media_type: extension(&name).to_ascii_lowercase(),
                name,
                modified,
            })
        })
        .collect();

    files.sort_by(|a, b| {
        prefix_number(&b.name)
            .cmp(&prefix_number(&a.name))
            .then(b.modified.cmp(&a.modified))
    });
    Ok(files)
}

pub fn format_file_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < MB {
        format!("{:.2} KB", b / KB)
    } else if b < GB {
        format!("{:.2} MB", b / MB)
    } else {
        format!("{:.2} GB", b / GB)
    }
}

pub fn content_type(name: &str) -> &'static str {
    match extension(name).to_ascii_lowercase().as_str() {
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "flv" => "video/x-flv",
        "mpg" | "mpeg" => "video/mpeg",
        _ => "video/mp4",
    }
}

/// First file carrying the job's `NNN_` prefix, used as the fallback when
/// the parser never announced a destination.
pub fn find_by_prefix(dir: &Path, prefix: &str) -> Option<String> {
    let token = format!("{prefix}_");
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .find(|name| name.starts_with(&token))
}

/// Best-effort removal of every artifact carrying the job's prefix,
/// including `.part` temporaries. Errors are logged and swallowed.
pub fn remove_partials(dir: &Path, prefix: &str) {
    let token = format!("{prefix}_");
    let Ok(rd) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in rd.filter_map(|e| e.ok()) {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name.starts_with(&token) {
            match std::fs::remove_file(entry.path()) {
                Ok(()) => info!(file = %name, "removed partial artifact"),
                Err(e) => tracing::warn!(file = %name, "failed to remove partial: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(2048), "2.00 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type("a.mkv"), "video/x-matroska");
        assert_eq!(content_type("a.webm"), "video/webm");
        assert_eq!(content_type("a.mp4"), "video/mp4");
        assert_eq!(content_type("noext"), "video/mp4");
    }

    #[test]
    fn test_list_filters_and_sorts_by_prefix_desc() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["001_a.mp4", "003_c.mkv", "002_b.webm", "notes.txt", "004_d.mp4.part"] {
            let mut f = File::create(dir.path().join(name)).unwrap();
            f.write_all(b"x").unwrap();
        }

        let files = list_videos(dir.path()).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["003_c.mkv", "002_b.webm", "001_a.mp4"]);
        assert_eq!(files[0].media_type, "mkv");
        assert_eq!(files[0].path, "/downloads/003_c.mkv");
    }

    #[test]
    fn test_remove_partials_only_touches_prefix() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["001_video.mp4", "001_video.mp4.part", "002_other.mp4"] {
            File::create(dir.path().join(name)).unwrap();
        }

        remove_partials(dir.path(), "001");
        assert!(!dir.path().join("001_video.mp4").exists());
        assert!(!dir.path().join("001_video.mp4.part").exists());
        assert!(dir.path().join("002_other.mp4").exists());
    }

    #[test]
    fn test_find_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("007_video.mp4")).unwrap();
        assert_eq!(
            find_by_prefix(dir.path(), "007").as_deref(),
            Some("007_video.mp4")
        );
        assert_eq!(find_by_prefix(dir.path(), "008"), None);
    }
}
