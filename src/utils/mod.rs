//! Utility modules for the build pipeline.

pub mod category;
pub mod exec;
pub mod hash;
pub mod html;
pub mod minify;
pub mod sourcemap;
