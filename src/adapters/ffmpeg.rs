//! ffmpeg process adapter and binary discovery.

use crate::error::ConfigError;
use crate::ports::encoder::EncoderRunner;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, info};

/// Bundled binary location checked when `FFMPEG_PATH` is unset.
pub const BUNDLED_FFMPEG: &str = "./bin/ffmpeg";

#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    binary: PathBuf,
}

impl FfmpegRunner {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Run `-version` once so a broken binary fails startup rather than the
    /// first render.
    pub async fn check_version(&self) -> Result<String, ConfigError> {
        self.version().await.map_err(|e| ConfigError::EncoderUnusable {
            path: self.binary.display().to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl EncoderRunner for FfmpegRunner {
    async fn run_encoder(&self, args: &[String]) -> io::Result<Output> {
        debug!(binary = %self.binary.display(), args = ?args, "spawning ffmpeg");
        Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
    }

    async fn version(&self) -> io::Result<String> {
        let output = Command::new(&self.binary)
            .arg("-hide_banner")
            .arg("-version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;
        if !output.status.success() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("-version exited with {}", output.status),
            ));
        }
        parse_version(&output.stdout).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "empty -version output")
        })
    }
}

fn parse_version(stdout: &[u8]) -> Option<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Resolve the encoder binary: an explicit `FFMPEG_PATH`, then the bundled
/// copy, then `ffmpeg` on `PATH`.
pub fn locate_ffmpeg(configured: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let candidates: Vec<PathBuf> = match configured {
        Some(path) => vec![path.to_path_buf()],
        None => vec![PathBuf::from(BUNDLED_FFMPEG)],
    };

    if let Some(found) = candidates.iter().find(|path| path.is_file()) {
        info!(path = %found.display(), "using ffmpeg binary");
        return Ok(found.clone());
    }

    match which::which("ffmpeg") {
        Ok(found) => {
            info!(path = %found.display(), "using ffmpeg from PATH");
            Ok(found)
        }
        Err(_) => Err(ConfigError::EncoderNotFound {
            checked: candidates,
        }),
    }
}
