use async_trait::async_trait;
use std::io;
use std::process::Output;

/// Runs the external encoder process.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EncoderRunner: Send + Sync {
    /// Run the encoder to completion with `args`. Dropping the future before
    /// it resolves must terminate the process.
    async fn run_encoder(&self, args: &[String]) -> io::Result<Output>;

    /// First line of the encoder's version banner.
    async fn version(&self) -> io::Result<String>;
}
