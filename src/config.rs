use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::supervisor::KillStrategy;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub downloads_dir: PathBuf,
    pub ytdlp_bin: String,
    pub kill_strategy: KillStrategy,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr =
            std::env::var("VIDGRAB_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let downloads_dir = PathBuf::from(
            std::env::var("VIDGRAB_DOWNLOADS_DIR").unwrap_or_else(|_| "downloads".to_string()),
        );
        let ytdlp_bin =
            std::env::var("VIDGRAB_YTDLP_BIN").unwrap_or_else(|_| "yt-dlp".to_string());

        let kill_strategy = match std::env::var("VIDGRAB_KILL_STRATEGY").ok().as_deref() {
            Some("process-group") => KillStrategy::ProcessGroup,
            Some("taskkill") => KillStrategy::Taskkill,
            Some(other) => bail!("VIDGRAB_KILL_STRATEGY must be 'process-group' or 'taskkill', got '{other}'"),
            None => KillStrategy::platform_default(),
        };

        // Tiny sanity checks (fail fast, fail loud)
        if ytdlp_bin.trim().is_empty() {
            bail!("VIDGRAB_YTDLP_BIN must not be empty");
        }
        if bind_addr.parse::<std::net::SocketAddr>().is_err() {
            bail!("VIDGRAB_BIND_ADDR is not a valid socket address: {bind_addr}");
        }

        Ok(Self {
            bind_addr,
            downloads_dir,
            ytdlp_bin,
            kill_strategy,
        })
    }
}
