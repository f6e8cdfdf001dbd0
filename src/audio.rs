//! Audio block mixing.

pub mod params;
pub mod render;
