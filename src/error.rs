use thiserror::Error;

/// Everything a job lifecycle operation can fail with. Routes convert these
/// into the `{success: false, message}` wire shape; nothing here is allowed
/// to take the process down.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid download link")]
    InvalidInput,

    #[error("Failed to start downloader: {0}")]
    SpawnFailure(std::io::Error),

    #[error("Download failed (exit code {0})")]
    ExitFailure(i32),

    #[error("Download finished but no output file was found")]
    ArtifactNotFound,

    #[error("Download job not found")]
    JobNotFound,

    #[error("Download already finished")]
    JobFinished,

    #[error("Failed to read file: {0}")]
    StreamIo(std::io::Error),

    #[error("File not found")]
    FileNotFound,
}
