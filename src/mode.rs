//! Build mode and the policies derived from it.
//!
//! `BuildMode` is fixed for one invocation and is the only place the
//! development/production split is decided. Components take the mode as a
//! parameter and ask it questions; none of them keep their own toggles.
//!
//! | Policy            | Development          | Production              |
//! |-------------------|----------------------|-------------------------|
//! | asset names       | `js/main.js`         | `js/main.<hash>.js`     |
//! | HTML/CSS minify   | no                   | yes                     |
//! | `console.*` calls | kept                 | stripped                |
//! | source maps       | verbose (w/ sources) | standard (no sources)   |
//! | live reload       | injected             | never                   |

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Development,
    #[default]
    Production,
}

/// How much a generated source map carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMapPolicy {
    /// Line mappings plus the original sources inlined (`sourcesContent`).
    Verbose,
    /// Line mappings and source paths only.
    Standard,
}

impl BuildMode {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }

    pub const fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }

    /// Append a content hash to emitted file names.
    pub const fn fingerprint(self) -> bool {
        matches!(self, Self::Production)
    }

    /// Minify HTML documents and stylesheets.
    pub const fn minify(self) -> bool {
        matches!(self, Self::Production)
    }

    /// Remove standalone `console.*(...)` statements from scripts.
    pub const fn drop_console(self) -> bool {
        matches!(self, Self::Production)
    }

    pub const fn source_maps(self) -> SourceMapPolicy {
        match self {
            Self::Development => SourceMapPolicy::Verbose,
            Self::Production => SourceMapPolicy::Standard,
        }
    }

    /// Inject the live-reload client into pages.
    pub const fn live_reload(self) -> bool {
        matches!(self, Self::Development)
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_production() {
        assert_eq!(BuildMode::default(), BuildMode::Production);
    }

    #[test]
    fn test_policies_are_mutually_exclusive() {
        for mode in [BuildMode::Development, BuildMode::Production] {
            let dev = mode.is_development();
            assert_eq!(mode.fingerprint(), !dev);
            assert_eq!(mode.minify(), !dev);
            assert_eq!(mode.drop_console(), !dev);
            assert_eq!(mode.live_reload(), dev);
        }
    }

    #[test]
    fn test_source_map_policy() {
        assert_eq!(BuildMode::Development.source_maps(), SourceMapPolicy::Verbose);
        assert_eq!(BuildMode::Production.source_maps(), SourceMapPolicy::Standard);
    }

    #[test]
    fn test_deserialize_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: BuildMode,
        }
        let w: Wrapper = toml::from_str(r#"mode = "development""#).unwrap();
        assert_eq!(w.mode, BuildMode::Development);
    }
}
