//! Self-hosted media download server. A submitted URL becomes a tracked
//! job whose external yt-dlp process is supervised end to end: output is
//! parsed into live progress, the artifact is resolved on exit, and
//! cancellation kills the process tree and cleans partial files.

pub mod config;
pub mod error;
pub mod files;
pub mod manager;
pub mod parser;
pub mod registry;
pub mod resolver;
pub mod routes_downloads;
pub mod routes_files;
pub mod state;
pub mod supervisor;
pub mod types;
