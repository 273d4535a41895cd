//! Static assets and the asset manifest.
//!
//! Assets are classified by extension, named by content and collected into
//! the [`AssetManifest`], which maps logical names to emitted paths:
//!
//! | Kind       | Extensions                              | Production name              |
//! |------------|-----------------------------------------|------------------------------|
//! | Script     | js mjs cjs                              | `js/[name].[hash].js`        |
//! | Stylesheet | css scss sass                           | `css/[name].[hash].css`      |
//! | Image      | png svg jpg jpeg gif webp avif ico      | `images/[name].[hash][ext]`  |
//! | Font       | woff woff2 eot ttf otf                  | `fonts/[name].[hash][ext]`   |
//! | Other      | anything else                           | `assets/[name].[hash][ext]`  |
//!
//! `[name]` is the file's path below its kind's source directory without the
//! extension, so `images/icons/logo.png` keeps its `icons/` folder. Files
//! outside that directory are named relative to the source root instead.
//! Development drops the `.[hash]` segment.

use crate::{
    config::BuildConfig,
    error::BuildError,
    mode::BuildMode,
    pipeline::resolve::relative_key,
    utils::{exec, hash, minify::minify_css},
};
use anyhow::Context;
use rayon::prelude::*;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Script,
    Stylesheet,
    Image,
    Font,
    Other,
}

impl AssetKind {
    pub fn classify(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "js" | "mjs" | "cjs" => Self::Script,
            "css" | "scss" | "sass" => Self::Stylesheet,
            "png" | "svg" | "jpg" | "jpeg" | "gif" | "webp" | "avif" | "ico" => Self::Image,
            "woff" | "woff2" | "eot" | "ttf" | "otf" => Self::Font,
            _ => Self::Other,
        }
    }

    /// Output subdirectory.
    pub const fn dir(self) -> &'static str {
        match self {
            Self::Script => "js",
            Self::Stylesheet => "css",
            Self::Image => "images",
            Self::Font => "fonts",
            Self::Other => "assets",
        }
    }
}

/// Output path for `name` + `ext` (`ext` includes the dot, or is empty).
///
/// A pure function of content and mode.
pub fn output_name(kind: AssetKind, name: &str, ext: &str, bytes: &[u8], mode: BuildMode) -> String {
    let dir = kind.dir();
    if mode.fingerprint() {
        format!("{dir}/{name}.{}{ext}", hash::fingerprint(bytes))
    } else {
        format!("{dir}/{name}{ext}")
    }
}

/// `[name]` of `path`: relative to its kind's source directory, else to
/// `src`, else the bare file stem.
pub fn asset_name(path: &Path, build: &BuildConfig) -> String {
    let home = match AssetKind::classify(path) {
        AssetKind::Script => Some(&build.scripts),
        AssetKind::Stylesheet => Some(&build.styles),
        AssetKind::Image => Some(&build.images),
        AssetKind::Font => Some(&build.fonts),
        AssetKind::Other => None,
    };
    let stemmed = path.with_extension("");
    home.into_iter()
        .chain([&build.src])
        .find_map(|dir| relative_key(&stemmed, dir))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
}

/// Logical name → emitted path (relative to the output directory).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AssetManifest(BTreeMap<String, String>);

impl AssetManifest {
    pub fn insert(&mut self, key: impl Into<String>, output: impl Into<String>) {
        self.0.insert(key.into(), output.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// URL of `key` under `public_path`.
    pub fn url(&self, key: &str, public_path: &str) -> Option<String> {
        self.get(key).map(|output| join_url(public_path, output))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

pub fn join_url(public_path: &str, output: &str) -> String {
    format!("{}/{output}", public_path.trim_end_matches('/'))
}

/// Manifest key of a static file: its path relative to `src`, or just the
/// file name when it lives elsewhere.
pub fn asset_key(path: &Path, src: &Path) -> String {
    relative_key(path, src).unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    })
}

/// One file to fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetJob {
    /// Manifest key: path relative to the source root.
    pub key: String,
    /// `[name]` of the emitted file, see [`asset_name`].
    pub name: String,
    pub source: PathBuf,
    /// Page or module that referenced it; `None` for directory sweeps.
    pub referrer: Option<String>,
}

impl AssetJob {
    /// Job for `path`, keyed relative to `src` (or the file name outside it).
    pub fn new(path: &Path, build: &BuildConfig, referrer: Option<String>) -> Self {
        Self {
            key: asset_key(path, &build.src),
            name: asset_name(path, build),
            source: path.to_path_buf(),
            referrer,
        }
    }
}

/// A file ready to be written, relative to the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub path: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedAsset {
    pub key: String,
    pub file: OutputFile,
}

/// Every image and font, referenced or not.
pub fn collect_static(build: &BuildConfig) -> Vec<AssetJob> {
    [&build.images, &build.fonts]
        .into_iter()
        .flat_map(|dir| walk_files(dir))
        .map(|path| AssetJob::new(&path, build, None))
        .collect()
}

/// Fingerprint `jobs` in parallel. Stylesheets go through `preprocessor`.
pub fn process_assets(
    jobs: &[AssetJob],
    preprocessor: &dyn StylePreprocessor,
    mode: BuildMode,
) -> Result<Vec<ProcessedAsset>, BuildError> {
    jobs.par_iter()
        .map(|job| process_one(job, preprocessor, mode))
        .collect()
}

/// Read the job's source; a missing file is blamed on its referrer.
pub fn read_source(job: &AssetJob) -> Result<Vec<u8>, BuildError> {
    fs::read(&job.source).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => BuildError::AssetResolution {
            path: job.source.clone(),
            referrer: job.referrer.clone().unwrap_or_else(|| "build".into()),
        },
        _ => BuildError::io(&job.source, err),
    })
}

fn process_one(
    job: &AssetJob,
    preprocessor: &dyn StylePreprocessor,
    mode: BuildMode,
) -> Result<ProcessedAsset, BuildError> {
    let bytes = read_source(job)?;

    let kind = AssetKind::classify(&job.source);
    let (bytes, ext) = if kind == AssetKind::Stylesheet {
        let css = preprocess(preprocessor, &job.source, &bytes)?;
        (minify_css(&css, mode).into_owned().into_bytes(), ".css".to_owned())
    } else {
        let ext = job
            .source
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        (bytes, ext)
    };

    Ok(ProcessedAsset {
        key: job.key.clone(),
        file: OutputFile {
            path: output_name(kind, &job.name, &ext, &bytes, mode),
            bytes,
        },
    })
}

/// Files under `public/`, copied verbatim to the output root.
pub fn collect_public(public: &Path) -> Result<Vec<OutputFile>, BuildError> {
    walk_files(public)
        .into_iter()
        .filter_map(|path| relative_key(&path, public).map(|rel| (path, rel)))
        .map(|(path, rel)| {
            let bytes = fs::read(&path).map_err(|err| BuildError::io(&path, err))?;
            Ok(OutputFile { path: rel, bytes })
        })
        .collect()
}

fn walk_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| !crate::utils::category::is_temp_file(e.path()))
        .map(|e| e.into_path())
        .collect()
}

// ============================================================================
// Stylesheet preprocessing
// ============================================================================

/// Turns a stylesheet source into CSS.
pub trait StylePreprocessor: Send + Sync {
    fn process(&self, path: &Path, source: &str) -> anyhow::Result<String>;
}

/// Run `preprocessor` unless the file is plain CSS.
pub fn preprocess(
    preprocessor: &dyn StylePreprocessor,
    path: &Path,
    bytes: &[u8],
) -> Result<String, BuildError> {
    let source = String::from_utf8_lossy(bytes);
    if path.extension().is_some_and(|ext| ext == "css") {
        return Ok(source.into_owned());
    }
    preprocessor
        .process(path, &source)
        .map_err(|source| BuildError::Preprocess {
            path: path.to_path_buf(),
            source,
        })
}

/// External command: stylesheet on stdin, CSS on stdout.
#[derive(Debug, Clone)]
pub struct CommandPreprocessor {
    pub command: Vec<String>,
    pub load_paths: Vec<PathBuf>,
    pub root: PathBuf,
}

impl CommandPreprocessor {
    pub fn from_config(build: &BuildConfig, root: &Path) -> Self {
        Self {
            command: build.sass.command.clone(),
            load_paths: build.sass.load_paths.clone(),
            root: root.to_path_buf(),
        }
    }
}

impl StylePreprocessor for CommandPreprocessor {
    fn process(&self, path: &Path, source: &str) -> anyhow::Result<String> {
        // The file's own directory first, so relative `@use` works from stdin.
        let mut args: Vec<OsString> = Vec::new();
        if path.extension().is_some_and(|ext| ext == "sass") {
            args.push("--indented".into());
        }
        for dir in path.parent().into_iter().chain(self.load_paths.iter().map(PathBuf::as_path)) {
            let mut arg = OsString::from("--load-path=");
            arg.push(dir);
            args.push(arg);
        }

        let out = exec::run_with_stdin(Some(&self.root), &self.command, &args, source.as_bytes())
            .with_context(|| format!("while compiling {}", path.display()))?;
        String::from_utf8(out).context("preprocessor produced non-UTF-8 output")
    }
}

/// Returns the source unchanged. Used when the stylesheets are plain CSS.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl StylePreprocessor for Passthrough {
    fn process(&self, _path: &Path, source: &str) -> anyhow::Result<String> {
        Ok(source.to_owned())
    }
}
