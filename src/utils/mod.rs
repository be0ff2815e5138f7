//! Utility functions and helpers

pub mod logs;
pub mod normalize;
