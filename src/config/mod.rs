//! Site configuration management for `pagewright.toml`.
//!
//! # Sections
//!
//! | Section        | Purpose                                        |
//! |----------------|------------------------------------------------|
//! | `[build]`      | Source/output paths, chunk names, public path  |
//! | `[build.sass]` | Stylesheet preprocessor command                |
//! | `[serve]`      | Development server (port, reload port, watch)  |
//!
//! The file is optional: a project following the conventional layout builds
//! with no configuration at all.
//!
//! # Example
//!
//! ```toml
//! [build]
//! output = "public"
//! public_path = "/docs/"
//!
//! [serve]
//! port = 8080
//! ```

mod build;
pub mod defaults;
mod error;
mod serve;

pub use build::{BuildConfig, SassConfig};
pub use error::ConfigError;
pub use serve::ServeConfig;

use crate::cli::{Cli, Commands};
use anyhow::{Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Root configuration structure representing pagewright.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Absolute path to the config file (set after loading, may not exist)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Build settings
    #[serde(default)]
    pub build: BuildConfig,

    /// Development server settings
    #[serde(default)]
    pub serve: ServeConfig,
}

impl SiteConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content)
    }

    /// Load, apply CLI overrides, normalize and validate.
    ///
    /// A missing config file is not an error: defaults describe the
    /// conventional layout.
    pub fn load(cli: &Cli) -> Result<Self> {
        let root = cli.root.as_deref().unwrap_or(Path::new("./"));
        let config_path = root.join(&cli.config);

        let mut config = if config_path.exists() {
            Self::from_path(&config_path)?
        } else {
            Self::default()
        };
        config.config_path = normalize_path(&config_path);
        config.apply_cli(cli);
        let config = config.with_root(root);
        config.validate()?;
        Ok(config)
    }

    /// Get the root directory path
    pub fn get_root(&self) -> &Path {
        self.build.root.as_deref().unwrap_or(Path::new("./"))
    }

    /// Resolve every configured path against `root`, producing absolute paths.
    pub fn with_root(mut self, root: &Path) -> Self {
        let root = normalize_path(root);
        let b = &mut self.build;
        for path in [
            &mut b.src,
            &mut b.pages,
            &mut b.templates,
            &mut b.data,
            &mut b.scripts,
            &mut b.entry,
            &mut b.page_scripts,
            &mut b.styles,
            &mut b.images,
            &mut b.fonts,
            &mut b.public,
            &mut b.output,
            &mut b.node_modules,
        ] {
            *path = normalize_path(&root.join(&*path));
        }
        for path in &mut b.sass.load_paths {
            *path = normalize_path(&root.join(&*path));
        }
        if self.config_path.as_os_str().is_empty() {
            self.config_path = root.join(crate::cli::DEFAULT_CONFIG);
        }
        self.build.root = Some(root);
        self
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    fn apply_cli(&mut self, cli: &Cli) {
        match &cli.command {
            Commands::Build { output, .. } => {
                Self::update_option(&mut self.build.output, output.as_ref());
            }
            Commands::Serve {
                interface,
                port,
                reload_port,
                watch,
            } => {
                Self::update_option(&mut self.serve.interface, interface.as_ref());
                Self::update_option(&mut self.serve.port, port.as_ref());
                Self::update_option(&mut self.serve.reload_port, reload_port.as_ref());
                Self::update_option(&mut self.serve.watch, watch.as_ref());
            }
        }
    }

    /// Reject configurations the pipeline cannot honor.
    pub fn validate(&self) -> Result<()> {
        let b = &self.build;

        for (field, name) in [("entry_chunk", &b.entry_chunk), ("vendor_chunk", &b.vendor_chunk)] {
            if name.is_empty() || name.contains(['/', '\\']) {
                bail!(ConfigError::Validation(format!(
                    "[build.{field}] must be a non-empty name without path separators"
                )));
            }
        }
        if b.entry_chunk == b.vendor_chunk {
            bail!(ConfigError::Validation(
                "[build.entry_chunk] and [build.vendor_chunk] must differ".into()
            ));
        }
        if b.sass.command.is_empty() {
            bail!(ConfigError::Validation(
                "[build.sass.command] must have at least one element".into()
            ));
        }
        if b.output == self.get_root() || b.src.starts_with(&b.output) {
            bail!(ConfigError::Validation(
                "[build.output] must not contain the project or its sources".into()
            ));
        }
        if b.output.starts_with(&b.src) {
            bail!(ConfigError::Validation(
                "[build.output] must not be inside [build.src]".into()
            ));
        }
        Ok(())
    }
}

/// Normalize a path to absolute, using canonicalize if the path exists
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        }
    })
}

// ============================================================================
// Tests
// ============================================================================
