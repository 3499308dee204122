//! Small helpers shared by the backup pipeline.

pub mod artifact;
pub mod clock;
pub mod identity;
pub mod retention;
