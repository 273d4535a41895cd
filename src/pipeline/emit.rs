//! Page finalization and output writing.
//!
//! A rendered page becomes a document once its alias references are checked
//! against the manifest and rewritten, the chunk tags are injected and, in
//! development, the reload client is appended. Minification runs last so the
//! reference patterns still see quoted attributes.
//!
//! Production output is staged in a sibling directory and swapped in whole.
//! Development output is updated in place, touching only changed files.

use crate::{
    config::SiteConfig,
    error::BuildError,
    mode::BuildMode,
    pipeline::{
        assets::{AssetManifest, OutputFile},
        bundle::reference_key,
        render::RenderedPage,
        resolve::{Aliases, relative_key},
    },
    reload,
    utils::{
        html::{inject_body_end, inject_head, rewrite_attribute_references},
        minify::minify_html,
    },
};
use rustc_hash::FxHashSet;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Turn a rendered page into its final document.
pub fn finalize_page(
    rendered: &RenderedPage,
    manifest: &AssetManifest,
    config: &SiteConfig,
    mode: BuildMode,
    reload_port: Option<u16>,
) -> Result<OutputFile, BuildError> {
    let build = &config.build;
    let aliases = Aliases::from_config(build);

    for reference in &rendered.references {
        let resolved = reference_key(reference, &aliases, &build.src);
        if !resolved.as_ref().is_some_and(|(_, key)| manifest.contains(key)) {
            return Err(BuildError::AssetResolution {
                path: resolved.map_or_else(|| PathBuf::from(reference), |(path, _)| path),
                referrer: rendered.page.name.clone(),
            });
        }
    }

    let html = rewrite_attribute_references(&rendered.html, |reference| {
        let (_, key) = reference_key(reference, &aliases, &build.src)?;
        manifest.url(&key, &build.public_path)
    });

    let (styles, scripts) = chunk_tags(rendered, manifest, config);
    let mut html = inject_head(&html, &styles);
    html = inject_head(&html, &scripts);

    if let Some(port) = reload_port.filter(|_| mode.live_reload()) {
        html = inject_body_end(&html, &reload::client_script(port));
    }

    Ok(OutputFile {
        path: rendered.page.output_filename.clone(),
        bytes: minify_html(html.as_bytes(), mode).into_owned(),
    })
}

/// `<link>` and `<script defer>` tags for vendor, entry and page chunks.
fn chunk_tags(rendered: &RenderedPage, manifest: &AssetManifest, config: &SiteConfig) -> (String, String) {
    let public_path = &config.build.public_path;
    let chunks = std::iter::once(&config.build.vendor_chunk).chain(&rendered.page.chunks);

    let (mut styles, mut scripts) = (String::new(), String::new());
    for chunk in chunks {
        if let Some(url) = manifest.url(&format!("{chunk}.css"), public_path) {
            styles.push_str(&format!(r#"<link rel="stylesheet" href="{url}">"#));
        }
        if let Some(url) = manifest.url(&format!("{chunk}.js"), public_path) {
            scripts.push_str(&format!(r#"<script defer src="{url}"></script>"#));
        }
    }
    (styles, scripts)
}

/// Replace the output directory with exactly `files`.
pub fn write_output(output: &Path, files: &[OutputFile], mode: BuildMode) -> Result<(), BuildError> {
    if mode.is_development() {
        write_in_place(output, files)?;
        prune(output, files)
    } else {
        write_staged(output, files)
    }
}

/// Write `files` into the existing output, leaving everything else alone.
pub fn write_pages(output: &Path, files: &[OutputFile]) -> Result<(), BuildError> {
    write_in_place(output, files)
}

fn write_staged(output: &Path, files: &[OutputFile]) -> Result<(), BuildError> {
    let staging = sibling(output, "staging");
    let retired = sibling(output, "old");
    remove_dir(&staging)?;
    remove_dir(&retired)?;

    for file in files {
        write_file(&staging.join(&file.path), &file.bytes)?;
    }
    fs::create_dir_all(&staging).map_err(|err| BuildError::io(&staging, err))?;

    if output.exists() {
        fs::rename(output, &retired).map_err(|err| BuildError::io(output, err))?;
    }
    fs::rename(&staging, output).map_err(|err| BuildError::io(output, err))?;
    remove_dir(&retired)
}

fn write_in_place(output: &Path, files: &[OutputFile]) -> Result<(), BuildError> {
    for file in files {
        let path = output.join(&file.path);
        let unchanged = fs::read(&path)
            .is_ok_and(|existing| existing == file.bytes);
        if !unchanged {
            write_file(&path, &file.bytes)?;
        }
    }
    Ok(())
}

/// Delete files under `output` that are not part of `files`.
fn prune(output: &Path, files: &[OutputFile]) -> Result<(), BuildError> {
    let keep: FxHashSet<&str> = files.iter().map(|f| f.path.as_str()).collect();
    let stale: Vec<PathBuf> = WalkDir::new(output)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|path| relative_key(path, output).is_some_and(|rel| !keep.contains(rel.as_str())))
        .collect();

    for path in stale {
        fs::remove_file(&path).map_err(|err| BuildError::io(&path, err))?;
    }
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), BuildError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| BuildError::io(parent, err))?;
    }
    fs::write(path, bytes).map_err(|err| BuildError::io(path, err))
}

fn remove_dir(path: &Path) -> Result<(), BuildError> {
    match fs::remove_dir_all(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(BuildError::io(path, err)),
        _ => Ok(()),
    }
}

/// `dist` → `.dist.<suffix>` next to it.
fn sibling(output: &Path, suffix: &str) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".into());
    output.with_file_name(format!(".{name}.{suffix}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::discover::{PageDescriptor, TemplateSource};
    use tempfile::TempDir;

    fn rendered(name: &str, html: &str) -> RenderedPage {
        RenderedPage {
            page: PageDescriptor::new(name, TemplateSource::Default(PathBuf::from("x")), "main"),
            html: html.to_owned(),
            references: crate::utils::html::attribute_references(html),
        }
    }

    fn manifest(entries: &[(&str, &str)]) -> AssetManifest {
        let mut manifest = AssetManifest::default();
        for (key, path) in entries {
            manifest.insert(*key, *path);
        }
        manifest
    }

    const PAGE: &str = r#"<html><head><title>t</title></head><body><img src="@images/logo.png"></body></html>"#;

    #[test]
    fn test_finalize_injects_chunks_in_load_order() {
        let config = SiteConfig::default().with_root(Path::new("/site"));
        let manifest = manifest(&[
            ("assets/images/logo.png", "images/logo.png"),
            ("vendors.js", "js/vendors.js"),
            ("main.js", "js/main.js"),
            ("main.css", "css/main.css"),
            ("about.js", "js/about.js"),
        ]);

        let out = finalize_page(&rendered("about", PAGE), &manifest, &config, BuildMode::Development, None)
            .unwrap();
        let html = String::from_utf8(out.bytes).unwrap();

        assert_eq!(out.path, "about.html");
        assert!(html.contains(r#"<img src="/images/logo.png">"#));
        let vendors = html.find("js/vendors.js").unwrap();
        let main = html.find("js/main.js").unwrap();
        let about = html.find("js/about.js").unwrap();
        assert!(vendors < main && main < about);
        assert!(html.find("css/main.css").unwrap() < vendors);
        assert!(!html.contains("WebSocket"));
    }

    #[test]
    fn test_finalize_missing_reference() {
        let config = SiteConfig::default().with_root(Path::new("/site"));
        let err = finalize_page(&rendered("index", PAGE), &AssetManifest::default(), &config, BuildMode::Production, None)
            .unwrap_err();
        match err {
            BuildError::AssetResolution { path, referrer } => {
                assert_eq!(path, Path::new("/site/src/assets/images/logo.png"));
                assert_eq!(referrer, "index");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_reload_client_only_in_development() {
        let config = SiteConfig::default().with_root(Path::new("/site"));
        let page = rendered("index", "<html><head></head><body></body></html>");
        let manifest = AssetManifest::default();

        let dev = finalize_page(&page, &manifest, &config, BuildMode::Development, Some(35729)).unwrap();
        let dev = String::from_utf8(dev.bytes).unwrap();
        assert!(dev.contains("35729"));
        assert!(dev.find("WebSocket").unwrap() < dev.find("</body>").unwrap());

        let prod = finalize_page(&page, &manifest, &config, BuildMode::Production, Some(35729)).unwrap();
        assert!(!String::from_utf8(prod.bytes).unwrap().contains("WebSocket"));
    }

    fn file(path: &str, bytes: &str) -> OutputFile {
        OutputFile {
            path: path.into(),
            bytes: bytes.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_write_output_production_replaces_everything() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("dist");
        fs::create_dir_all(output.join("js")).unwrap();
        fs::write(output.join("js/old.js"), "old").unwrap();

        write_output(&output, &[file("index.html", "<p>"), file("css/main.css", "a{}")], BuildMode::Production)
            .unwrap();

        assert_eq!(fs::read_to_string(output.join("index.html")).unwrap(), "<p>");
        assert!(output.join("css/main.css").exists());
        assert!(!output.join("js/old.js").exists());
        assert!(!dir.path().join(".dist.staging").exists());
        assert!(!dir.path().join(".dist.old").exists());
    }

    #[test]
    fn test_write_output_development_prunes_stale_files() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("dist");

        write_output(&output, &[file("index.html", "a"), file("about.html", "b")], BuildMode::Development)
            .unwrap();
        write_output(&output, &[file("index.html", "c")], BuildMode::Development).unwrap();

        assert_eq!(fs::read_to_string(output.join("index.html")).unwrap(), "c");
        assert!(!output.join("about.html").exists());
    }

    #[test]
    fn test_write_pages_keeps_other_files() {
        let dir = TempDir::new().unwrap();
        write_output(dir.path(), &[file("index.html", "a"), file("js/main.js", "x")], BuildMode::Development)
            .unwrap();
        write_pages(dir.path(), &[file("index.html", "b")]).unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("index.html")).unwrap(), "b");
        assert!(dir.path().join("js/main.js").exists());
    }

    #[test]
    fn test_write_pages_skips_identical_content() {
        use std::time::{Duration, SystemTime};

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.html");
        fs::write(&path, "same").unwrap();
        let old = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        fs::File::options().write(true).open(&path).unwrap().set_modified(old).unwrap();

        write_pages(dir.path(), &[file("index.html", "same")]).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), old);

        write_pages(dir.path(), &[file("index.html", "new")]).unwrap();
        assert_ne!(fs::metadata(&path).unwrap().modified().unwrap(), old);
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
    }
}
