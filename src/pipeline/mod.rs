//! Build stages.
//!
//! ```text
//! discover ──► data ──► render ──► bundle ──► emit
//!                                    │
//!                   resolve ─ modules ─ esm ─ chunks ─ assets
//! ```
//!
//! Every stage works in memory; only [`emit`] touches the output directory.

pub mod assets;
pub mod bundle;
pub mod chunks;
pub mod data;
pub mod discover;
pub mod emit;
pub mod esm;
pub mod modules;
pub mod render;
pub mod resolve;
