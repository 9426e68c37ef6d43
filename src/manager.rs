//! Download job lifecycle: create a tracked job, supervise its external
//! process, reconcile output into the registry, resolve the artifact on
//! exit, and tear everything down on cancellation.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::files;
use crate::parser::OutputParser;
use crate::resolver;
use crate::state::SharedState;
use crate::supervisor::ProcessHandle;
use crate::types::{JobStatus, ProgressUpdate};

/// Builds the yt-dlp invocation for a job. Direct `.m3u8` URLs go through
/// the ffmpeg downloader with a remux to a faststart container; everything
/// else uses the best-video+audio merge.
pub fn build_command(url: &str, template: &str, format: Option<&str>) -> Vec<String> {
    let container = match format {
        Some(f) if !f.is_empty() && f.chars().all(|c| c.is_ascii_alphanumeric()) => f,
        _ => "mp4",
    };

    let mut args: Vec<String> = vec![url.to_string()];
    if url.to_lowercase().contains(".m3u8") {
        args.extend(
            [
                "--downloader",
                "ffmpeg",
                "--downloader-args",
                "ffmpeg_i:-headers 'User-Agent: Mozilla/5.0' -c:v libx264 -c:a aac -movflags +faststart",
                "-o",
                template,
                "--no-check-certificates",
                "--newline",
                "--retries",
                "10",
                "--fragment-retries",
                "10",
                "--hls-prefer-native",
                "--merge-output-format",
                container,
            ]
            .iter()
            .map(|s| s.to_string()),
        );
    } else {
        args.extend(
            [
                "-f",
                "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best",
                "--merge-output-format",
                container,
                "-o",
                template,
                "--no-check-certificates",
                "--newline",
                "--remux-video",
                container,
            ]
            .iter()
            .map(|s| s.to_string()),
        );
    }
    args
}

/// Creates a job: registry entry, spawned process, and the reader tasks
/// that feed parser output back into the registry. Returns the job id the
/// caller polls and cancels with.
pub async fn start_download(
    state: SharedState,
    url: String,
    format: Option<String>,
) -> Result<Uuid, AppError> {
    if !url.starts_with("http") {
        return Err(AppError::InvalidInput);
    }

    let id = Uuid::new_v4();
    state.registry.create(id).await;

    let prefix = state.next_prefix();
    let template = state
        .config
        .downloads_dir
        .join(format!("{prefix}_video.%(ext)s"))
        .to_string_lossy()
        .into_owned();
    let args = build_command(&url, &template, format.as_deref());

    info!(job_id = %id, %url, prefix = %prefix, "starting download");

    let mut child = match state.supervisor.spawn(&state.config.ytdlp_bin, &args) {
        Ok(child) => child,
        Err(e) => {
            state.registry.remove(id).await;
            error!(job_id = %id, "failed to spawn downloader: {e}");
            return Err(AppError::SpawnFailure(e));
        }
    };

    let pid = child.id().unwrap_or_default();
    state
        .insert_process(
            id,
            ProcessHandle {
                pid,
                started_at: chrono::Utc::now(),
                command: format!("{} {}", state.config.ytdlp_bin, args.join(" ")),
                url,
                prefix: prefix.clone(),
                producing_output: false,
            },
        )
        .await;
    info!(job_id = %id, pid, "downloader spawned");

    let parser = Arc::new(Mutex::new(OutputParser::new()));

    // stdout: yt-dlp progress + destination announcements.
    let stdout_task = child.stdout.take().map(|stdout| {
        let st = state.clone();
        let parser = parser.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let update = parser.lock().await.on_stdout_line(&line);
                if let Some(up) = update {
                    if st.registry.update(id, up).await {
                        st.mark_producing(id).await;
                    }
                }
            }
        })
    });

    // stderr: ffmpeg telemetry during remux/decrypt stages.
    let stderr_task = child.stderr.take().map(|stderr| {
        let st = state.clone();
        let parser = parser.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let update = parser.lock().await.on_stderr_line(&line);
                if let Some(up) = update {
                    if st.registry.update(id, up).await {
                        st.mark_producing(id).await;
                    }
                }
            }
        })
    });

    // Exit path: wait for the process and finalize the registry entry.
    let st = state.clone();
    tokio::spawn(async move {
        let status = match child.wait().await {
            Ok(status) => status,
            Err(e) => {
                error!(job_id = %id, "failed to wait on downloader: {e}");
                if st.take_process(id).await.is_some() {
                    finalize_failure(&st, id, None).await;
                }
                return;
            }
        };
        info!(job_id = %id, code = ?status.code(), "downloader exited");

        // Drain the reader tasks before resolving, so a destination
        // announced right before exit is never missed.
        if let Some(task) = stdout_task {
            let _ = task.await;
        }
        if let Some(task) = stderr_task {
            let _ = task.await;
        }

        // The cancel path may have taken the handle already; if so the job
        // is terminal and this exit is stale.
        let Some(handle) = st.take_process(id).await else {
            return;
        };

        if status.success() {
            let destination = parser.lock().await.destination().map(str::to_string);
            finalize_success(&st, id, &handle, destination).await;
        } else {
            files::remove_partials(&st.config.downloads_dir, &handle.prefix);
            finalize_failure(&st, id, status.code()).await;
        }
    });

    Ok(id)
}

/// Exit-code-zero path: locate the artifact (parser's destination first,
/// then the job's prefix) and complete the job, or flag the distinct
/// "finished but produced nothing usable" error.
async fn finalize_success(
    state: &SharedState,
    id: Uuid,
    handle: &ProcessHandle,
    destination: Option<String>,
) {
    let dir = &state.config.downloads_dir;

    let found = destination
        .filter(|name| dir.join(name).is_file())
        .or_else(|| files::find_by_prefix(dir, &handle.prefix));

    let applied = match found {
        Some(filename) => {
            info!(job_id = %id, file = %filename, "download complete");
            state
                .registry
                .update(
                    id,
                    ProgressUpdate {
                        status: JobStatus::Completed,
                        progress: 100.0,
                        message: "Download complete".to_string(),
                        last_update: crate::types::now_ms(),
                        result_filename: Some(filename),
                    },
                )
                .await
        }
        None => {
            warn!(job_id = %id, prefix = %handle.prefix, "exit 0 but no resolvable file");
            state
                .registry
                .update(
                    id,
                    ProgressUpdate::terminal(
                        JobStatus::Error,
                        0.0,
                        AppError::ArtifactNotFound.to_string(),
                    ),
                )
                .await
        }
    };
    if !applied {
        // Job went terminal (cancelled) between exit and finalize.
        info!(job_id = %id, "finalize skipped, job already terminal");
    }
}

async fn finalize_failure(state: &SharedState, id: Uuid, code: Option<i32>) {
    let message = match code {
        Some(code) => AppError::ExitFailure(code).to_string(),
        None => "Download terminated by signal".to_string(),
    };
    state
        .registry
        .update(id, ProgressUpdate::terminal(JobStatus::Error, 0.0, message))
        .await;
}

/// Cancellation, end to end: the registry is marked `cancelled` *before*
/// the kill is issued, so concurrent pollers observe the cancellation
/// immediately even if teardown is slow. Any exit callback that fires
/// afterwards finds the handle gone and the record terminal, and no-ops.
pub async fn cancel_download(state: SharedState, id: Uuid) -> Result<(), AppError> {
    if state.registry.get(id).await.is_none() {
        return Err(AppError::JobNotFound);
    }

    let marked = state
        .registry
        .update(
            id,
            ProgressUpdate::terminal(JobStatus::Cancelled, 0.0, "Download cancelled"),
        )
        .await;
    if !marked {
        // The record exists but is already terminal; there is nothing left
        // to cancel and the outcome must not be reported as one.
        return Err(AppError::JobFinished);
    }
    info!(job_id = %id, "cancel requested");

    if let Some(handle) = state.take_process(id).await {
        // Teardown is best-effort and asynchronous; the registry mark above
        // is already authoritative for readers.
        let st = state.clone();
        tokio::spawn(async move {
            st.supervisor.terminate(&handle).await;
            files::remove_partials(&st.config.downloads_dir, &handle.prefix);
        });
    }

    Ok(())
}

/// Pure read for the polling path. Not-found is reported distinctly from
/// "exists but nothing new yet".
pub async fn poll_progress(state: &SharedState, id: Uuid) -> Option<crate::types::JobProgress> {
    state.registry.get(id).await
}

/// Resolves the on-disk artifact for a requested name, or `None`.
pub fn resolve_file(state: &SharedState, requested: &str) -> Option<String> {
    resolver::find_actual_file(requested, &state.config.downloads_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_command_plain_url() {
        let args = build_command(
            "https://example.com/watch?v=1",
            "downloads/001_video.%(ext)s",
            None,
        );
        assert_eq!(args[0], "https://example.com/watch?v=1");
        assert!(args.contains(&"-f".to_string()));
        assert!(args.contains(&"--remux-video".to_string()));
        assert!(args.contains(&"mp4".to_string()));
        assert!(!args.contains(&"--hls-prefer-native".to_string()));
    }

    #[test]
    fn test_build_command_m3u8_uses_ffmpeg_downloader() {
        let args = build_command(
            "https://cdn.example.com/stream/index.M3U8",
            "downloads/002_video.%(ext)s",
            None,
        );
        assert!(args.contains(&"--downloader".to_string()));
        assert!(args.contains(&"ffmpeg".to_string()));
        assert!(args.contains(&"--hls-prefer-native".to_string()));
        assert!(args.contains(&"--fragment-retries".to_string()));
    }

    #[test]
    fn test_build_command_honors_format_container() {
        let args = build_command("http://x", "t", Some("mkv"));
        assert!(args.contains(&"mkv".to_string()));
    }

    #[test]
    fn test_build_command_rejects_suspicious_format() {
        let args = build_command("http://x", "t", Some("mkv; rm -rf /"));
        assert!(args.contains(&"mp4".to_string()));
    }
}
