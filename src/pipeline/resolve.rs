//! Specifier resolution.
//!
//! Turns the strings found in templates, stylesheets and `import` statements
//! into files on disk:
//!
//! | Specifier            | Resolved against                         |
//! |----------------------|------------------------------------------|
//! | `./x`, `../x`        | the importing file's directory           |
//! | `@/x`, `@images/x`…  | the alias directory (longest prefix)     |
//! | `pkg`, `@scope/pkg`  | `node_modules`, via `package.json`       |

use crate::config::BuildConfig;
use serde_json::Value;
use std::{
    fs,
    path::{Component, Path, PathBuf},
};

/// Tried in order when a specifier has no extension.
pub const EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "scss", "sass", "css"];

/// Path aliases usable in templates, stylesheets and scripts.
#[derive(Debug, Clone)]
pub struct Aliases {
    /// Longest prefix first.
    entries: Vec<(String, PathBuf)>,
}

impl Aliases {
    pub fn from_config(build: &BuildConfig) -> Self {
        Self::new([
            ("@/", &build.src),
            ("@scss/", &build.styles),
            ("@js/", &build.scripts),
            ("@images/", &build.images),
            ("@fonts/", &build.fonts),
        ])
    }

    pub fn new<'a>(entries: impl IntoIterator<Item = (&'a str, &'a PathBuf)>) -> Self {
        let mut entries: Vec<_> = entries
            .into_iter()
            .map(|(prefix, dir)| (prefix.to_owned(), dir.clone()))
            .collect();
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self { entries }
    }

    /// Path for an aliased specifier; `None` if no alias matches.
    pub fn resolve(&self, specifier: &str) -> Option<PathBuf> {
        self.entries.iter().find_map(|(prefix, dir)| {
            specifier
                .strip_prefix(prefix.as_str())
                .map(|rest| dir.join(rest))
        })
    }

    pub fn is_aliased(&self, specifier: &str) -> bool {
        self.entries
            .iter()
            .any(|(prefix, _)| specifier.starts_with(prefix.as_str()))
    }
}

/// Resolves module specifiers to files.
#[derive(Debug, Clone)]
pub struct Resolver {
    aliases: Aliases,
    node_modules: PathBuf,
}

impl Resolver {
    pub fn new(build: &BuildConfig) -> Self {
        Self {
            aliases: Aliases::from_config(build),
            node_modules: build.node_modules.clone(),
        }
    }

    pub fn aliases(&self) -> &Aliases {
        &self.aliases
    }

    /// Best-effort location of `specifier` for error messages, whether or
    /// not it exists.
    pub fn candidate(&self, specifier: &str, from: &Path) -> PathBuf {
        if is_relative(specifier) {
            lexical_normalize(&from.parent().unwrap_or(from).join(specifier))
        } else if let Some(path) = self.aliases.resolve(specifier) {
            lexical_normalize(&path)
        } else {
            self.node_modules.join(specifier)
        }
    }

    /// Resolve `specifier` imported from the file `from`.
    pub fn resolve(&self, specifier: &str, from: &Path) -> Option<PathBuf> {
        if is_relative(specifier) || self.aliases.is_aliased(specifier) {
            return resolve_file(&self.candidate(specifier, from));
        }
        self.resolve_package(specifier)
    }

    fn resolve_package(&self, specifier: &str) -> Option<PathBuf> {
        let (package, subpath) = split_package(specifier);
        let dir = self.node_modules.join(package);

        if let Some(subpath) = subpath {
            return resolve_file(&dir.join(subpath));
        }

        let manifest = fs::read_to_string(dir.join("package.json"))
            .ok()
            .and_then(|text| serde_json::from_str::<Value>(&text).ok());
        let main = manifest.as_ref().and_then(|json| {
            ["module", "main"]
                .iter()
                .find_map(|field| json.get(*field).and_then(Value::as_str))
        });

        main.and_then(|main| resolve_file(&lexical_normalize(&dir.join(main))))
            .or_else(|| resolve_file(&dir.join("index")))
    }
}

fn is_relative(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../")
}

/// `lodash/fp` → (`lodash`, `fp`); `@scope/pkg/x` → (`@scope/pkg`, `x`)
fn split_package(specifier: &str) -> (&str, Option<&str>) {
    let mut split_at = specifier.find('/');
    if specifier.starts_with('@')
        && let Some(first) = split_at
    {
        split_at = specifier[first + 1..].find('/').map(|i| first + 1 + i);
    }
    match split_at {
        Some(i) => (&specifier[..i], Some(&specifier[i + 1..])),
        None => (specifier, None),
    }
}

/// Exact file, then with each known extension, then a Sass partial
/// (`_name.scss`), then `name/index.*`.
pub fn resolve_file(base: &Path) -> Option<PathBuf> {
    if base.is_file() {
        return Some(base.to_path_buf());
    }

    let with_ext = |path: &Path| {
        EXTENSIONS
            .iter()
            .map(|ext| append_extension(path, ext))
            .find(|candidate| candidate.is_file())
    };

    with_ext(base)
        .or_else(|| {
            let name = base.file_name()?.to_str()?;
            with_ext(&base.with_file_name(format!("_{name}")))
        })
        .or_else(|| with_ext(&base.join("index")))
}

fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".");
    os.push(ext);
    PathBuf::from(os)
}

/// Resolve `.` and `..` without touching the filesystem.
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// `/`-separated path of `path` relative to `base`, or `None` outside it.
pub fn relative_key(path: &Path, base: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;
    use tempfile::TempDir;

    fn setup() -> (TempDir, SiteConfig) {
        let dir = TempDir::new().unwrap();
        let config = SiteConfig::default().with_root(dir.path());
        (dir, config)
    }

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_alias_longest_prefix_wins() {
        let (_dir, config) = setup();
        let aliases = Aliases::from_config(&config.build);

        assert_eq!(
            aliases.resolve("@images/logo.png"),
            Some(config.build.images.join("logo.png"))
        );
        assert_eq!(
            aliases.resolve("@/assets/docs/a.pdf"),
            Some(config.build.src.join("assets/docs/a.pdf"))
        );
        assert_eq!(aliases.resolve("@scope/pkg"), None);
        assert_eq!(aliases.resolve("lodash"), None);
    }

    #[test]
    fn test_resolve_relative_with_extension_probe() {
        let (_dir, config) = setup();
        let main = config.build.scripts.join("main.js");
        let nav = config.build.scripts.join("modules/navigation.js");
        write(&main, "");
        write(&nav, "");

        let resolver = Resolver::new(&config.build);
        assert_eq!(resolver.resolve("./modules/navigation", &main), Some(nav));
        assert_eq!(resolver.resolve("./modules/missing", &main), None);
    }

    #[test]
    fn test_resolve_sass_partial_and_alias() {
        let (_dir, config) = setup();
        let main = config.build.scripts.join("main.js");
        let partial = config.build.styles.join("_theme.scss");
        let styles = config.build.styles.join("main.scss");
        write(&partial, "");
        write(&styles, "");

        let resolver = Resolver::new(&config.build);
        assert_eq!(resolver.resolve("../scss/main.scss", &main), Some(styles));
        assert_eq!(resolver.resolve("@scss/theme", &main), Some(partial));
    }

    #[test]
    fn test_resolve_package_main_and_subpath() {
        let (_dir, config) = setup();
        let nm = &config.build.node_modules;
        write(&nm.join("tiny/package.json"), r#"{"main":"./dist/tiny.js"}"#);
        write(&nm.join("tiny/dist/tiny.js"), "");
        write(&nm.join("@acme/ui/index.js"), "");
        write(&nm.join("@acme/ui/button.js"), "");
        let from = config.build.entry.clone();

        let resolver = Resolver::new(&config.build);
        assert_eq!(resolver.resolve("tiny", &from), Some(nm.join("tiny/dist/tiny.js")));
        assert_eq!(resolver.resolve("@acme/ui", &from), Some(nm.join("@acme/ui/index.js")));
        assert_eq!(
            resolver.resolve("@acme/ui/button", &from),
            Some(nm.join("@acme/ui/button.js"))
        );
        assert_eq!(resolver.resolve("absent", &from), None);
    }

    #[test]
    fn test_split_package() {
        assert_eq!(split_package("lodash"), ("lodash", None));
        assert_eq!(split_package("lodash/fp/map"), ("lodash", Some("fp/map")));
        assert_eq!(split_package("@scope/pkg"), ("@scope/pkg", None));
        assert_eq!(split_package("@scope/pkg/x"), ("@scope/pkg", Some("x")));
    }

    #[test]
    fn test_relative_key() {
        let base = Path::new("/site/src");
        assert_eq!(
            relative_key(Path::new("/site/src/assets/images/a.png"), base).as_deref(),
            Some("assets/images/a.png")
        );
        assert_eq!(relative_key(Path::new("/elsewhere/a.png"), base), None);
    }
}
