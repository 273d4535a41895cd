//! Template rendering.
//!
//! Layouts and partials under the templates directory are parsed once into
//! a base [`Tera`] instance. Each page clones it, adds its own template and
//! renders against global data overlaid with the per-build context.
//!
//! Pages render in parallel. A failing page is fatal in production; in
//! development it is reported and its siblings still render. Alias
//! references are collected here; rewriting and minification happen when
//! the page is emitted.

use crate::{
    error::BuildError,
    log,
    mode::BuildMode,
    pipeline::{data::GlobalData, discover::PageDescriptor},
    utils::html::attribute_references,
};
use chrono::Datelike;
use rayon::prelude::*;
use std::path::Path;
use tera::{Context, Tera};
use walkdir::WalkDir;

/// Template names loaded from disk carry this suffix and are autoescaped.
const AUTOESCAPE_SUFFIX: &str = ".twig";

/// Per-build values every page can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildContext {
    pub is_development: bool,
    pub current_year: i32,
}

impl BuildContext {
    pub fn new(mode: BuildMode) -> Self {
        Self::fixed(mode, chrono::Local::now().year())
    }

    pub const fn fixed(mode: BuildMode, current_year: i32) -> Self {
        Self {
            is_development: mode.is_development(),
            current_year,
        }
    }
}

/// Global data first, then the build context; build keys win on collision.
pub fn merge_context(global: &GlobalData, build: BuildContext) -> Context {
    let mut context = Context::new();
    for (key, value) in global {
        context.insert(key.as_str(), value);
    }
    context.insert("isDevelopment", &build.is_development);
    context.insert("currentYear", &build.current_year);
    context.insert("isDev", &build.is_development);
    context.insert("year", &build.current_year);
    context
}

#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub page: PageDescriptor,
    pub html: String,
    /// Alias references in attribute values, in document order.
    pub references: Vec<String>,
}

/// Pages that rendered, plus the ones skipped in development.
#[derive(Debug, Default)]
pub struct RenderOutcome {
    pub rendered: Vec<RenderedPage>,
    pub failures: Vec<BuildError>,
}

pub struct Renderer {
    base: Tera,
}

impl Renderer {
    /// Load every template under `templates_dir` (absent directory: none).
    ///
    /// Templates are named by their `/`-separated path relative to the
    /// directory, so pages write `{% extends "layouts/base.twig" %}`.
    pub fn new(templates_dir: &Path) -> Result<Self, BuildError> {
        let mut base = Tera::default();
        base.autoescape_on(vec![AUTOESCAPE_SUFFIX]);

        let mut partials = Vec::new();
        for entry in WalkDir::new(templates_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "twig") {
                continue;
            }
            let name = template_name(path, templates_dir);
            let content =
                std::fs::read_to_string(path).map_err(|err| BuildError::io(path, err))?;
            partials.push((name, content));
        }

        base.add_raw_templates(partials)
            .map_err(|source| BuildError::Render {
                page: templates_dir.display().to_string(),
                source,
            })?;
        Ok(Self { base })
    }

    /// Render one page.
    pub fn render_page(&self, page: &PageDescriptor, context: &Context) -> Result<String, BuildError> {
        let source = page.template.read()?;
        let name = format!("pages/{}{AUTOESCAPE_SUFFIX}", page.name);
        let render_error = |source| BuildError::Render {
            page: page.name.clone(),
            source,
        };

        let mut tera = self.base.clone();
        tera.add_raw_template(&name, &source).map_err(render_error)?;
        tera.render(&name, context).map_err(render_error)
    }

    /// Render all pages in parallel, keeping discovery order.
    pub fn render_all(
        &self,
        pages: &[PageDescriptor],
        global: &GlobalData,
        build: BuildContext,
        mode: BuildMode,
    ) -> Result<RenderOutcome, BuildError> {
        let context = merge_context(global, build);
        let results: Vec<_> = pages
            .par_iter()
            .map(|page| {
                self.render_page(page, &context).map(|html| RenderedPage {
                    page: page.clone(),
                    references: attribute_references(&html),
                    html,
                })
            })
            .collect();

        let mut outcome = RenderOutcome::default();
        for result in results {
            match result {
                Ok(page) => outcome.rendered.push(page),
                Err(err) if mode.is_development() && matches!(err, BuildError::Render { .. }) => {
                    log!("error"; "{}", crate::error::error_chain(&err));
                    outcome.failures.push(err);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(outcome)
    }
}

fn template_name(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::discover::{TemplateSource, discover_pages};
    use serde_json::Value;
    use std::fs;
    use tempfile::TempDir;

    fn context_value(global: &GlobalData, build: BuildContext) -> Value {
        merge_context(global, build).into_json()
    }

    fn global(json: &str) -> GlobalData {
        match serde_json::from_str(json).unwrap() {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_build_context_overrides_global_data() {
        let data = global(r#"{"siteName":"Acme","isDevelopment":"yes","year":1999}"#);
        let value = context_value(&data, BuildContext::fixed(BuildMode::Production, 2026));

        assert_eq!(value["siteName"], "Acme");
        assert_eq!(value["isDevelopment"], false);
        assert_eq!(value["isDev"], false);
        assert_eq!(value["currentYear"], 2026);
        assert_eq!(value["year"], 2026);
    }

    #[test]
    fn test_render_with_layout_and_partial() {
        let dir = TempDir::new().unwrap();
        let templates = dir.path().join("templates");
        let pages_dir = dir.path().join("pages");
        fs::create_dir_all(templates.join("layouts")).unwrap();
        fs::create_dir_all(templates.join("partials")).unwrap();
        fs::create_dir_all(&pages_dir).unwrap();
        fs::write(
            templates.join("layouts/base.twig"),
            "<html><body>{% block content %}{% endblock %}</body></html>",
        )
        .unwrap();
        fs::write(templates.join("partials/footer.twig"), "<footer>{{ currentYear }}</footer>")
            .unwrap();
        fs::write(
            pages_dir.join("about.twig"),
            r#"{% extends "layouts/base.twig" %}{% block content %}<h1>{{ siteName }}</h1>{% include "partials/footer.twig" %}{% endblock %}"#,
        )
        .unwrap();

        let renderer = Renderer::new(&templates).unwrap();
        let pages = discover_pages(&pages_dir, "main").unwrap();
        let outcome = renderer
            .render_all(
                &pages,
                &global(r#"{"siteName":"Acme & Co"}"#),
                BuildContext::fixed(BuildMode::Development, 2026),
                BuildMode::Development,
            )
            .unwrap();

        assert_eq!(outcome.rendered.len(), 1);
        assert_eq!(
            outcome.rendered[0].html,
            "<html><body><h1>Acme &amp; Co</h1><footer>2026</footer></body></html>"
        );
    }

    #[test]
    fn test_missing_variable_fails_in_production() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.twig"), "{{ missing.field }}").unwrap();
        let pages = discover_pages(dir.path(), "main").unwrap();
        let renderer = Renderer::new(&dir.path().join("templates")).unwrap();

        let err = renderer
            .render_all(
                &pages,
                &GlobalData::new(),
                BuildContext::new(BuildMode::Production),
                BuildMode::Production,
            )
            .unwrap_err();
        assert!(matches!(err, BuildError::Render { ref page, .. } if page == "index"));
    }

    #[test]
    fn test_development_skips_failing_page() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.twig"), "{% if %}").unwrap();
        fs::write(dir.path().join("index.twig"), "<p>ok</p>").unwrap();
        let pages = discover_pages(dir.path(), "main").unwrap();
        let renderer = Renderer::new(&dir.path().join("templates")).unwrap();

        let outcome = renderer
            .render_all(
                &pages,
                &GlobalData::new(),
                BuildContext::new(BuildMode::Development),
                BuildMode::Development,
            )
            .unwrap();
        assert_eq!(outcome.rendered.len(), 1);
        assert_eq!(outcome.rendered[0].page.name, "index");
        assert_eq!(outcome.failures.len(), 1);
    }

    #[test]
    fn test_default_template_renders() {
        let dir = TempDir::new().unwrap();
        let page = PageDescriptor::new(
            "index",
            TemplateSource::Default(dir.path().join("index.twig")),
            "main",
        );
        let renderer = Renderer::new(&dir.path().join("templates")).unwrap();
        let html = renderer
            .render_page(
                &page,
                &merge_context(
                    &global(r#"{"siteName":"Acme"}"#),
                    BuildContext::fixed(BuildMode::Development, 2026),
                ),
            )
            .unwrap();
        assert!(html.contains("<h1>Acme</h1>"));
        assert!(html.contains("2026"));
    }

    #[test]
    fn test_references_are_collected() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("index.twig"),
            r#"<img src="@images/{{ logo }}"><a href="/about.html">a</a><video poster='@images/p.jpg'></video>"#,
        )
        .unwrap();
        let pages = discover_pages(dir.path(), "main").unwrap();
        let renderer = Renderer::new(&dir.path().join("templates")).unwrap();
        let outcome = renderer
            .render_all(
                &pages,
                &global(r#"{"logo":"logo.png"}"#),
                BuildContext::new(BuildMode::Production),
                BuildMode::Production,
            )
            .unwrap();

        assert_eq!(
            outcome.rendered[0].references,
            ["@images/logo.png", "@images/p.jpg"]
        );
    }
}
