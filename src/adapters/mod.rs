//! Adapters - Concrete implementations of ports, plus the HTTP surface.

pub mod backgrounds;
pub mod ffmpeg;
pub mod http;
