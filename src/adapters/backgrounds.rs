//! Background image sources.

use crate::domain::params::ImageId;
use crate::error::RenderError;
use crate::ports::backgrounds::BackgroundSource;
use async_trait::async_trait;
use std::path::PathBuf;

const EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// Images stored as `<dir>/<id>.<ext>`.
#[derive(Debug, Clone)]
pub struct LocalBackgrounds {
    dir: PathBuf,
}

impl LocalBackgrounds {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl BackgroundSource for LocalBackgrounds {
    async fn resolve(&self, id: &ImageId) -> Result<String, RenderError> {
        for ext in EXTENSIONS {
            let candidate = self.dir.join(format!("{}.{}", id, ext));
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Ok(candidate.to_string_lossy().into_owned());
            }
        }
        Err(RenderError::Background(format!(
            "no image for `{}` in {}",
            id,
            self.dir.display()
        )))
    }
}

/// Images fetched by the encoder itself from a URL built from a template
/// containing `{id}`.
#[derive(Debug, Clone)]
pub struct RemoteBackgrounds {
    url_template: String,
}

impl RemoteBackgrounds {
    pub fn new(url_template: impl Into<String>) -> Self {
        Self {
            url_template: url_template.into(),
        }
    }
}

#[async_trait]
impl BackgroundSource for RemoteBackgrounds {
    async fn resolve(&self, id: &ImageId) -> Result<String, RenderError> {
        // `ImageId` is restricted to URL-safe characters.
        Ok(self.url_template.replace("{id}", id.as_str()))
    }
}

/// Source picked at startup from configuration.
#[derive(Debug, Clone)]
pub enum Backgrounds {
    Local(LocalBackgrounds),
    Remote(RemoteBackgrounds),
}

#[async_trait]
impl BackgroundSource for Backgrounds {
    async fn resolve(&self, id: &ImageId) -> Result<String, RenderError> {
        match self {
            Backgrounds::Local(local) => local.resolve(id).await,
            Backgrounds::Remote(remote) => remote.resolve(id).await,
        }
    }
}
