//! Page discovery.
//!
//! Every `*.twig` file directly inside the pages directory becomes one output
//! document. Discovery is a pure read: it never creates or touches files.
//!
//! # Fallback
//!
//! A directory that is absent or holds no templates still produces exactly
//! one page, `index`, backed by `<pages>/index.twig`:
//!
//! | `<pages>/index.twig` | Result                                   |
//! |----------------------|------------------------------------------|
//! | readable             | `TemplateSource::File`                   |
//! | exists, unreadable   | `BuildError::Discovery`                  |
//! | absent               | `TemplateSource::Default` (built-in page) |

use crate::{error::BuildError, utils::category::is_temp_file};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Page template extension.
pub const TEMPLATE_EXT: &str = "twig";

/// Name of the single page produced when no templates are found.
pub const FALLBACK_PAGE: &str = "index";

/// Rendered in place of a missing fallback template.
pub const DEFAULT_TEMPLATE: &str = include_str!("../embed/index.twig");

/// Where a page's template text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    File(PathBuf),
    /// The conventional path (kept for messages) did not exist.
    Default(PathBuf),
}

impl TemplateSource {
    pub fn path(&self) -> &Path {
        match self {
            Self::File(path) | Self::Default(path) => path,
        }
    }

    /// Template text.
    pub fn read(&self) -> Result<String, BuildError> {
        match self {
            Self::File(path) => fs::read_to_string(path).map_err(|source| BuildError::Discovery {
                path: path.clone(),
                source,
            }),
            Self::Default(_) => Ok(DEFAULT_TEMPLATE.to_owned()),
        }
    }
}

/// One output document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDescriptor {
    /// Template file stem; unique within a build.
    pub name: String,
    pub template: TemplateSource,
    /// Always `<name>.html`.
    pub output_filename: String,
    /// Always `[entry chunk, name]`.
    pub chunks: Vec<String>,
}

impl PageDescriptor {
    pub fn new(name: &str, template: TemplateSource, entry_chunk: &str) -> Self {
        Self {
            name: name.to_owned(),
            template,
            output_filename: format!("{name}.html"),
            chunks: vec![entry_chunk.to_owned(), name.to_owned()],
        }
    }
}

/// Discover pages in `pages_dir`, ordered by file name.
pub fn discover_pages(
    pages_dir: &Path,
    entry_chunk: &str,
) -> Result<Vec<PageDescriptor>, BuildError> {
    let mut templates: Vec<PathBuf> = match fs::read_dir(pages_dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| is_page_template(path))
            .collect(),
        Err(_) => Vec::new(),
    };

    if templates.is_empty() {
        return fallback_page(pages_dir, entry_chunk).map(|page| vec![page]);
    }

    templates.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(templates
        .into_iter()
        .filter_map(|path| {
            let name = path.file_stem()?.to_str()?.to_owned();
            Some(PageDescriptor::new(&name, TemplateSource::File(path), entry_chunk))
        })
        .collect())
}

fn is_page_template(path: &Path) -> bool {
    path.is_file()
        && path.extension().is_some_and(|ext| ext == TEMPLATE_EXT)
        && !is_temp_file(path)
}

fn fallback_page(pages_dir: &Path, entry_chunk: &str) -> Result<PageDescriptor, BuildError> {
    let path = pages_dir.join(format!("{FALLBACK_PAGE}.{TEMPLATE_EXT}"));

    let template = if path.exists() {
        // Surface an unreadable fallback now rather than at render time.
        fs::read(&path).map_err(|source| BuildError::Discovery {
            path: path.clone(),
            source,
        })?;
        TemplateSource::File(path)
    } else {
        TemplateSource::Default(path)
    };
    Ok(PageDescriptor::new(FALLBACK_PAGE, template, entry_chunk))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), "<p>{{ siteName }}</p>").unwrap();
    }

    #[test]
    fn test_one_descriptor_per_template() {
        let dir = TempDir::new().unwrap();
        for name in ["index.twig", "contact.twig", "about.twig"] {
            touch(dir.path(), name);
        }

        let pages = discover_pages(dir.path(), "main").unwrap();
        let names: Vec<_> = pages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["about", "contact", "index"]);

        let about = &pages[0];
        assert_eq!(about.output_filename, "about.html");
        assert_eq!(about.chunks, ["main", "about"]);
        assert_eq!(about.template, TemplateSource::File(dir.path().join("about.twig")));
    }

    #[test]
    fn test_ignores_other_files_and_subdirectories() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "index.twig");
        touch(dir.path(), "notes.md");
        touch(dir.path(), ".draft.twig");
        fs::create_dir(dir.path().join("partials")).unwrap();
        touch(&dir.path().join("partials"), "nav.twig");

        let pages = discover_pages(dir.path(), "main").unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].name, "index");
    }

    #[test]
    fn test_absent_directory_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        let pages_dir = dir.path().join("pages");

        let pages = discover_pages(&pages_dir, "main").unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].name, "index");
        assert_eq!(pages[0].output_filename, "index.html");
        assert_eq!(
            pages[0].template,
            TemplateSource::Default(pages_dir.join("index.twig"))
        );
        assert!(pages[0].template.read().unwrap().contains("<!DOCTYPE html>"));
        // pure read
        assert!(!pages_dir.exists());
    }

    #[test]
    fn test_empty_directory_falls_back() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "readme.txt");

        let pages = discover_pages(dir.path(), "app").unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].chunks, ["app", "index"]);
    }

    #[test]
    fn test_unreadable_fallback_is_discovery_error() {
        let dir = TempDir::new().unwrap();
        // exists, is not a page template, and cannot be read as one
        let fallback = dir.path().join("index.twig");
        fs::create_dir(&fallback).unwrap();

        match discover_pages(dir.path(), "main") {
            Err(BuildError::Discovery { path, .. }) => assert_eq!(path, fallback),
            other => panic!("expected discovery error, got {other:?}"),
        }
    }
}
