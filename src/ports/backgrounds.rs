use crate::domain::params::ImageId;
use crate::error::RenderError;
use async_trait::async_trait;

/// Maps an opaque background identifier to an encoder input.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackgroundSource: Send + Sync {
    /// Returns a value usable as the encoder's `-i` argument: a local path or
    /// a URL.
    async fn resolve(&self, id: &ImageId) -> Result<String, RenderError>;
}
