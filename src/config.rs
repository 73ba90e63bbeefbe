//! Configuration loaded from the environment.
//!
//! The binary loads `.env` once, before logging is set up, so this module only
//! reads variables that are already in the process environment.

use crate::application::admission::AdmissionLimits;
use crate::domain::encode::EncodeSettings;
use crate::error::ConfigError;
use std::env;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct RenderConfig {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: u16,
    /// Explicit encoder binary; `None` means bundled copy, then `PATH`
    pub ffmpeg_path: Option<PathBuf>,
    /// Where finished videos are written and served from
    pub output_dir: PathBuf,
    /// Local background images, `<id>.<ext>`
    pub backgrounds_dir: PathBuf,
    /// Remote background URL with an `{id}` placeholder, overrides `backgrounds_dir`
    pub background_url_template: Option<String>,
    /// Worker pool size (K)
    pub workers: usize,
    /// Pending queue bound (Q)
    pub queue_size: usize,
    pub render_timeout: Duration,
    pub cache_capacity: NonZeroUsize,
    pub cache_ttl: Duration,
    pub encode: EncodeSettings,
}

impl RenderConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Unset keys take their default, malformed
    /// ones are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = EncodeSettings::default();

        let workers: usize = parse(&var, "RENDER_WORKERS", 2)?;
        if workers == 0 {
            return Err(invalid("RENDER_WORKERS", "0"));
        }
        let cache_capacity = NonZeroUsize::new(parse(&var, "CACHE_CAPACITY", 100)?)
            .ok_or_else(|| invalid("CACHE_CAPACITY", "0"))?;

        let template = var("BACKGROUND_URL_TEMPLATE");
        if let Some(template) = &template {
            if !template.contains("{id}") {
                return Err(invalid("BACKGROUND_URL_TEMPLATE", template));
            }
        }

        Ok(Self {
            addr: var("ADDR").unwrap_or_else(|| String::from("127.0.0.1")),
            port: parse(&var, "PORT", 3000)?,
            ffmpeg_path: var("FFMPEG_PATH").map(PathBuf::from),
            output_dir: var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./renders")),
            backgrounds_dir: var("BACKGROUNDS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./backgrounds")),
            background_url_template: template,
            workers,
            queue_size: parse(&var, "RENDER_QUEUE_SIZE", 8)?,
            render_timeout: Duration::from_secs(parse(&var, "RENDER_TIMEOUT_SECS", 60)?),
            cache_capacity,
            cache_ttl: Duration::from_secs(parse(&var, "CACHE_TTL_SECS", 3600)?),
            encode: EncodeSettings {
                duration_secs: parse(&var, "VIDEO_DURATION_SECS", defaults.duration_secs)?,
                width: parse(&var, "VIDEO_WIDTH", defaults.width)?,
                height: parse(&var, "VIDEO_HEIGHT", defaults.height)?,
                fps: parse(&var, "VIDEO_FPS", defaults.fps)?,
            },
        })
    }

    pub fn limits(&self) -> AdmissionLimits {
        AdmissionLimits {
            workers: self.workers,
            queue: self.queue_size,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }
}

fn parse<T, F>(var: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| invalid(key, &raw)),
    }
}

fn invalid(key: &'static str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
    }
}
