//! Ports - Trait seams between the render core and the outside world.

pub mod backgrounds;
pub mod encoder;
