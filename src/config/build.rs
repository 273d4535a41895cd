//! `[build]` section configuration.
//!
//! Source layout, output location, chunk names and the stylesheet
//! preprocessor command.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `[build]` section in pagewright.toml - build pipeline configuration.
///
/// # Example
/// ```toml
/// [build]
/// pages = "src/pages"
/// output = "dist"
/// public_path = "/app/"
///
/// [build.sass]
/// command = ["sass", "--stdin", "--no-source-map"]
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Project root directory (usually set via CLI `--root`).
    #[serde(default = "defaults::build::root")]
    #[educe(Default = defaults::build::root())]
    pub root: Option<PathBuf>,

    /// Source root; the `@/` alias and manifest keys are relative to it.
    #[serde(default = "defaults::build::src")]
    #[educe(Default = defaults::build::src())]
    pub src: PathBuf,

    /// Page templates, one output document per `*.twig` file.
    #[serde(default = "defaults::build::pages")]
    #[educe(Default = defaults::build::pages())]
    pub pages: PathBuf,

    /// Shared layouts and partials available to every page.
    #[serde(default = "defaults::build::templates")]
    #[educe(Default = defaults::build::templates())]
    pub templates: PathBuf,

    /// Global data file merged into every page context.
    #[serde(default = "defaults::build::data")]
    #[educe(Default = defaults::build::data())]
    pub data: PathBuf,

    /// Script sources (`@js/` alias).
    #[serde(default = "defaults::build::scripts")]
    #[educe(Default = defaults::build::scripts())]
    pub scripts: PathBuf,

    /// Shared entry script.
    #[serde(default = "defaults::build::entry")]
    #[educe(Default = defaults::build::entry())]
    pub entry: PathBuf,

    /// Directory holding optional `<page>.js` scripts.
    #[serde(default = "defaults::build::page_scripts")]
    #[educe(Default = defaults::build::page_scripts())]
    pub page_scripts: PathBuf,

    /// Stylesheet sources (`@scss/` alias).
    #[serde(default = "defaults::build::styles")]
    #[educe(Default = defaults::build::styles())]
    pub styles: PathBuf,

    /// Images, fingerprinted into `images/`.
    #[serde(default = "defaults::build::images")]
    #[educe(Default = defaults::build::images())]
    pub images: PathBuf,

    /// Fonts, fingerprinted into `fonts/`.
    #[serde(default = "defaults::build::fonts")]
    #[educe(Default = defaults::build::fonts())]
    pub fonts: PathBuf,

    /// Static files copied verbatim into the output root.
    #[serde(default = "defaults::build::public")]
    #[educe(Default = defaults::build::public())]
    pub public: PathBuf,

    /// Build output directory.
    #[serde(default = "defaults::build::output")]
    #[educe(Default = defaults::build::output())]
    pub output: PathBuf,

    /// Third-party package directory; modules under it go to the vendor chunk.
    #[serde(default = "defaults::build::node_modules")]
    #[educe(Default = defaults::build::node_modules())]
    pub node_modules: PathBuf,

    /// URL prefix for emitted asset references.
    #[serde(default = "defaults::build::public_path")]
    #[educe(Default = defaults::build::public_path())]
    pub public_path: String,

    /// Name of the shared entry chunk.
    #[serde(default = "defaults::build::entry_chunk")]
    #[educe(Default = defaults::build::entry_chunk())]
    pub entry_chunk: String,

    /// Name of the third-party chunk.
    #[serde(default = "defaults::build::vendor_chunk")]
    #[educe(Default = defaults::build::vendor_chunk())]
    pub vendor_chunk: String,

    /// Stylesheet preprocessor.
    #[serde(default)]
    pub sass: SassConfig,
}

/// `[build.sass]` section - external stylesheet preprocessor.
///
/// The command receives the stylesheet on stdin and must print CSS on stdout.
/// Plain `.css` files never reach it.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SassConfig {
    /// Command and fixed arguments.
    #[serde(default = "defaults::build::sass::command")]
    #[educe(Default = defaults::build::sass::command())]
    pub command: Vec<String>,

    /// Passed as `--load-path=<dir>` for each entry.
    #[serde(default = "defaults::build::sass::load_paths")]
    #[educe(Default = defaults::build::sass::load_paths())]
    pub load_paths: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::super::SiteConfig;
    use std::path::PathBuf;

    #[test]
    fn test_build_config_defaults() {
        let config: SiteConfig = toml::from_str("").unwrap();

        assert_eq!(config.build.pages, PathBuf::from("src/pages"));
        assert_eq!(config.build.data, PathBuf::from("src/data/global.json"));
        assert_eq!(config.build.output, PathBuf::from("dist"));
        assert_eq!(config.build.entry_chunk, "main");
        assert_eq!(config.build.vendor_chunk, "vendors");
        assert_eq!(config.build.public_path, "/");
        assert_eq!(config.build.sass.command[0], "sass");
    }

    #[test]
    fn test_build_config_partial_override() {
        let config: SiteConfig = toml::from_str(
            r#"
            [build]
            pages = "views"
            entry_chunk = "app"

            [build.sass]
            command = ["npx", "sass", "--stdin"]
        "#,
        )
        .unwrap();

        assert_eq!(config.build.pages, PathBuf::from("views"));
        assert_eq!(config.build.entry_chunk, "app");
        assert_eq!(config.build.sass.command.len(), 3);
        // untouched fields keep defaults
        assert_eq!(config.build.output, PathBuf::from("dist"));
        assert_eq!(config.build.sass.load_paths, vec![PathBuf::from("src/scss")]);
    }

    #[test]
    fn test_build_unknown_field_rejection() {
        let result: Result<SiteConfig, _> = toml::from_str(
            r#"
            [build]
            minify = true
        "#,
        );
        assert!(result.is_err());
    }
}
