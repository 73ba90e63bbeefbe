//! Application layer - Admission control and the render worker pool.

pub mod admission;
pub mod worker;
