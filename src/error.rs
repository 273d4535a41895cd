//! Build failure taxonomy.
//!
//! | Error             | Fatal?                                           |
//! |-------------------|--------------------------------------------------|
//! | `Discovery`       | always                                           |
//! | `AssetResolution` | always                                           |
//! | `Render`          | production; development skips the failing page   |
//! | `Preprocess`      | always                                           |
//! | `Io`              | always                                           |
//! | `OutputConflict`  | always                                           |
//! | `Cancelled`       | never (development watch loop only)              |
//!
//! Global data problems never reach this type: the loader recovers from
//! [`DataLoadError`] locally.

use std::{io, path::PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("fallback template `{}` is unreadable", path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("asset `{}` referenced by `{referrer}` does not exist", path.display())]
    AssetResolution { path: PathBuf, referrer: String },

    #[error("failed to render page `{page}`")]
    Render {
        page: String,
        #[source]
        source: tera::Error,
    },

    #[error("stylesheet preprocessing failed for `{}`", path.display())]
    Preprocess {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("IO error at `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("`{path}` would be written by more than one source ({claimants})")]
    OutputConflict { path: String, claimants: String },

    #[error("build cancelled by a newer change")]
    Cancelled,
}

impl BuildError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short label of the page or asset at fault, for the failure summary.
    pub fn culprit(&self) -> Option<String> {
        match self {
            Self::Discovery { path, .. }
            | Self::AssetResolution { path, .. }
            | Self::Preprocess { path, .. }
            | Self::Io { path, .. } => Some(path.display().to_string()),
            Self::Render { page, .. } => Some(page.clone()),
            Self::OutputConflict { path, .. } => Some(path.clone()),
            Self::Cancelled => None,
        }
    }
}

/// Why the global data file could not be used.
#[derive(Debug, Error)]
pub enum DataLoadError {
    #[error("IO error when reading `{}`", .0.display())]
    Io(PathBuf, #[source] io::Error),

    #[error("`{}` is not valid JSON", .0.display())]
    Parse(PathBuf, #[source] serde_json::Error),

    #[error("`{}` must contain a JSON object at the top level", .0.display())]
    NotAnObject(PathBuf),
}

/// Render an error and its `source()` chain as `outer: inner: root`.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    #[test]
    fn test_asset_resolution_names_path() {
        let err = BuildError::AssetResolution {
            path: PathBuf::from("src/assets/images/logo.png"),
            referrer: "index".into(),
        };
        let display = err.to_string();
        assert!(display.contains("src/assets/images/logo.png"));
        assert!(display.contains("index"));
        assert_eq!(err.culprit().as_deref(), Some("src/assets/images/logo.png"));
    }

    #[test]
    fn test_error_chain_includes_source() {
        let err = BuildError::io("dist/index.html", io::Error::new(ErrorKind::Other, "disk full"));
        let chain = error_chain(&err);
        assert!(chain.contains("dist/index.html"));
        assert!(chain.ends_with("disk full"));
    }

    #[test]
    fn test_cancelled_has_no_culprit() {
        assert!(BuildError::Cancelled.culprit().is_none());
    }
}
