use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::Regex;

use crate::types::{ProgressUpdate, INDETERMINATE};

/// Minimum wall-time between emitted updates per job, so chunked process
/// output does not thrash the registry and pollers.
const EMIT_INTERVAL: Duration = Duration::from_secs(1);

fn destination_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[download\] Destination: (.+)").unwrap())
}

fn percent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[download\]\s+(\d+(?:\.\d+)?)%").unwrap())
}

fn time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"time=(\d+:\d+:\d+\.\d+)").unwrap())
}

fn size_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"size=\s*(\d+)kB").unwrap())
}

fn speed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"speed=([\d.]+)x").unwrap())
}

/// Incremental interpreter for one job's process output. stdout carries
/// yt-dlp progress lines; stderr carries ffmpeg telemetry during the
/// remux/decrypt stages, where no percentage exists and the indeterminate
/// sentinel is emitted instead.
pub struct OutputParser {
    min_interval: Duration,
    last_emit: Option<Instant>,
    destination: Option<String>,
}

impl OutputParser {
    pub fn new() -> Self {
        Self::with_interval(EMIT_INTERVAL)
    }

    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_emit: None,
            destination: None,
        }
    }

    /// The most recently announced destination filename, the primary
    /// candidate for post-exit file resolution.
    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    pub fn on_stdout_line(&mut self, line: &str) -> Option<ProgressUpdate> {
        // Destination announcements are tracked even inside a rate-limit
        // window; losing one would break post-exit resolution.
        if let Some(caps) = destination_re().captures(line) {
            let path = caps[1].trim();
            let base = path.rsplit(['/', '\\']).next().unwrap_or(path);
            self.destination = Some(base.to_string());
        }

        let caps = percent_re().captures(line)?;
        let progress: f64 = caps[1].parse().ok()?;
        self.emit(ProgressUpdate::downloading(
            progress,
            format!("Downloading: {progress:.1}%"),
        ))
    }

    pub fn on_stderr_line(&mut self, line: &str) -> Option<ProgressUpdate> {
        let time = time_re().captures(line).map(|c| c[1].to_string());
        let size = size_re().captures(line).map(|c| c[1].to_string());
        let speed = speed_re().captures(line).map(|c| c[1].to_string());

        if time.is_some() || size.is_some() || speed.is_some() {
            let mut message = String::from("Processing:");
            if let Some(t) = time {
                message.push_str(&format!(" {t}"));
            }
            if let Some(s) = size {
                message.push_str(&format!(" ({s}KB)"));
            }
            if let Some(sp) = speed {
                message.push_str(&format!(" speed {sp}x"));
            }
            return self.emit(ProgressUpdate::downloading(INDETERMINATE, message));
        }

        if line.contains("Opening 'crypto+") || line.contains("[hls @") {
            return self.emit(ProgressUpdate::downloading(
                INDETERMINATE,
                "Decoding stream...",
            ));
        }

        None
    }

    /// Rate-limits emission; the latest parsed value after each window is
    /// what pollers see, values inside a window are dropped.
    fn emit(&mut self, up: ProgressUpdate) -> Option<ProgressUpdate> {
        let now = Instant::now();
        if let Some(last) = self.last_emit {
            if now.duration_since(last) < self.min_interval {
                return None;
            }
        }
        self.last_emit = Some(now);
        Some(up)
    }
}

impl Default for OutputParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobStatus;

    fn parser() -> OutputParser {
        OutputParser::with_interval(Duration::ZERO)
    }

    #[test]
    fn test_percentage_extraction() {
        let mut p = parser();
        let up = p
            .on_stdout_line("[download]  42.3% of 120.00MiB at 3.50MiB/s ETA 00:21")
            .unwrap();
        assert_eq!(up.status, JobStatus::Downloading);
        assert_eq!(up.progress, 42.3);
        assert_eq!(up.message, "Downloading: 42.3%");
    }

    #[test]
    fn test_destination_capture_takes_basename() {
        let mut p = parser();
        assert!(p
            .on_stdout_line("[download] Destination: downloads/003_video.f137.mp4")
            .is_none());
        assert_eq!(p.destination(), Some("003_video.f137.mp4"));
    }

    #[test]
    fn test_latest_destination_wins() {
        let mut p = parser();
        p.on_stdout_line("[download] Destination: downloads/003_video.f137.mp4");
        p.on_stdout_line("[download] Destination: downloads/003_video.mp4");
        assert_eq!(p.destination(), Some("003_video.mp4"));
    }

    #[test]
    fn test_ffmpeg_telemetry_is_indeterminate() {
        let mut p = parser();
        let up = p
            .on_stderr_line("frame= 2406 fps=204 q=-1.0 size=    4096kB time=00:01:40.26 bitrate= 334.7kbits/s speed=8.51x")
            .unwrap();
        assert_eq!(up.progress, INDETERMINATE);
        assert!(up.message.contains("00:01:40.26"));
        assert!(up.message.contains("4096KB"));
        assert!(up.message.contains("speed 8.51x"));
    }

    #[test]
    fn test_hls_marker_is_indeterminate() {
        let mut p = parser();
        let up = p
            .on_stderr_line("[hls @ 0x55d] Opening 'seg-1.ts' for reading")
            .unwrap();
        assert_eq!(up.progress, INDETERMINATE);
        assert_eq!(up.message, "Decoding stream...");
    }

    #[test]
    fn test_noise_lines_emit_nothing() {
        let mut p = parser();
        assert!(p.on_stdout_line("[youtube] abc: Downloading webpage").is_none());
        assert!(p.on_stderr_line("WARNING: unable to embed thumbnail").is_none());
    }

    #[test]
    fn test_rate_limit_drops_mid_window_values() {
        let mut p = OutputParser::with_interval(Duration::from_secs(60));
        assert!(p.on_stdout_line("[download]  10.0% of ~1MiB").is_some());
        assert!(p.on_stdout_line("[download]  11.0% of ~1MiB").is_none());
        // Destination still captured inside the window.
        p.on_stdout_line("[download] Destination: out.mp4");
        assert_eq!(p.destination(), Some("out.mp4"));
    }
}
