//! File category classification for watch mode.
//!
//! Each changed path is classified by its role in the build, and the
//! category decides how much of the pipeline a change re-runs.
//!
//! | Category | Rebuild scope | Example files                          |
//! |----------|---------------|----------------------------------------|
//! | Template | Discover      | `src/pages/*.twig`, `src/templates/**` |
//! | Data     | Render        | `src/data/global.json`                 |
//! | Script   | Full          | `src/js/**/*.js`                       |
//! | Style    | Full          | `src/scss/**/*.scss`                   |
//! | Asset    | Full          | `src/assets/images/*`, `src/assets/fonts/*` |
//! | Public   | Full          | `public/**`                            |
//! | Config   | Full (reload) | `pagewright.toml`                      |
//! | Unknown  | Ignored       | anything outside the watch set         |

use crate::{build::RebuildScope, config::SiteConfig};
use std::{
    env,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCategory {
    Template,
    Data,
    Script,
    Style,
    Asset,
    Public,
    Config,
    Unknown,
}

impl FileCategory {
    /// Short name for logs
    pub const fn name(self) -> &'static str {
        match self {
            Self::Template => "template",
            Self::Data => "data",
            Self::Script => "script",
            Self::Style => "style",
            Self::Asset => "asset",
            Self::Public => "public",
            Self::Config => "config",
            Self::Unknown => "unknown",
        }
    }

    /// Narrowest rebuild that covers a change in this category.
    pub const fn scope(self) -> Option<RebuildScope> {
        match self {
            Self::Template => Some(RebuildScope::Discover),
            Self::Data => Some(RebuildScope::Render),
            Self::Script | Self::Style | Self::Asset | Self::Public | Self::Config => {
                Some(RebuildScope::Full)
            }
            Self::Unknown => None,
        }
    }
}

/// Categorize a file path to determine how a change should be handled.
pub fn categorize_path(path: &Path, config: &SiteConfig) -> FileCategory {
    let path = normalize_path(path);
    let build = &config.build;
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let data_dir = build.data.parent().unwrap_or(&build.data);

    if path == config.config_path {
        FileCategory::Config
    } else if path.starts_with(&build.public) {
        FileCategory::Public
    } else if !path.starts_with(&build.src) {
        FileCategory::Unknown
    } else if ext == "twig" {
        FileCategory::Template
    } else if path == build.data || (path.starts_with(data_dir) && ext == "json") {
        FileCategory::Data
    } else if matches!(ext, "js" | "mjs" | "cjs") {
        FileCategory::Script
    } else if matches!(ext, "css" | "scss" | "sass") {
        FileCategory::Style
    } else {
        FileCategory::Asset
    }
}

/// Editor artifacts and hidden files never trigger rebuilds.
pub fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

/// Normalize a path to absolute form for reliable comparison.
///
/// Config paths are canonicalized at load time; watcher paths may not be
/// (and deleted files cannot be), so fall back to joining with the cwd.
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
        }
    })
}
