//! Bundling.
//!
//! Builds everything a page can point at, entirely in memory:
//!
//! ```text
//! entry + page scripts ──► ModuleGraph ──► ChunkGraph ──► js/<chunk>.js (+ .map)
//!                                │                   └──► css/<chunk>.css
//!                                └── imported stylesheets ──► preprocessor
//! images/, fonts/, page and stylesheet references ──► fingerprinted copies
//! public/ ──► verbatim copies
//! ```
//!
//! Nothing touches the output directory here; emission is a separate step,
//! so a failed bundle leaves the previous output untouched.

use crate::{
    config::SiteConfig,
    error::BuildError,
    log,
    mode::BuildMode,
    pipeline::{
        assets::{
            AssetJob, AssetKind, AssetManifest, OutputFile, StylePreprocessor, asset_key,
            collect_public, collect_static, output_name, preprocess, process_assets, read_source,
        },
        chunks::{Chunk, ChunkGraph, ChunkRoots},
        discover::PageDescriptor,
        esm::{self, ImportTarget, REGISTRY},
        modules::{Module, ModuleGraph, ModuleId, ModuleKind, module_id},
        render::RenderedPage,
        resolve::{Aliases, Resolver, lexical_normalize},
    },
    utils::{
        html::{css_references, rewrite_css_references},
        minify::{drop_console, minify_css},
        sourcemap::SourceMapBuilder,
    },
};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

/// Module registry bootstrap, prepended to every script chunk.
const RUNTIME: &str = include_str!("../embed/runtime.js");

/// Written next to the pages.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Everything except the pages.
#[derive(Debug, Clone, Default)]
pub struct Bundle {
    pub manifest: AssetManifest,
    /// In write order: public files first, so generated files win.
    pub files: Vec<OutputFile>,
}

/// File and manifest key behind an alias reference, if an alias matches.
pub fn reference_key(reference: &str, aliases: &Aliases, src: &Path) -> Option<(PathBuf, String)> {
    let path = lexical_normalize(&aliases.resolve(reference)?);
    let key = asset_key(&path, src);
    Some((path, key))
}

pub struct Bundler<'a> {
    config: &'a SiteConfig,
    mode: BuildMode,
    preprocessor: &'a dyn StylePreprocessor,
    resolver: Resolver,
}

impl<'a> Bundler<'a> {
    pub fn new(
        config: &'a SiteConfig,
        mode: BuildMode,
        preprocessor: &'a dyn StylePreprocessor,
    ) -> Self {
        Self {
            config,
            mode,
            preprocessor,
            resolver: Resolver::new(&config.build),
        }
    }

    pub fn bundle(
        &self,
        pages: &[PageDescriptor],
        rendered: &[RenderedPage],
    ) -> Result<Bundle, BuildError> {
        let build = &self.config.build;
        let (roots, root_paths) = self.chunk_roots(pages);
        let graph = ModuleGraph::scan(self.config.get_root(), &root_paths, &self.resolver)?;
        let chunks = ChunkGraph::build(&graph, &roots, &build.entry_chunk, &build.vendor_chunk);
        let order = graph.post_order(&roots.all());
        let styles = self.preprocess_modules(&graph)?;
        let linked = self.linked_stylesheets(rendered)?;

        let mut bundle = Bundle {
            manifest: AssetManifest::default(),
            files: collect_public(&build.public)?,
        };
        let generated_from = bundle.files.len();
        let sheets = styles
            .iter()
            .map(|(id, css)| (id.as_str(), css.as_str()))
            .chain(linked.iter().map(|(job, css)| (job.key.as_str(), css.as_str())));
        for asset in process_assets(&self.asset_jobs(rendered, sheets)?, self.preprocessor, self.mode)? {
            bundle.manifest.insert(asset.key, asset.file.path.clone());
            bundle.files.push(asset.file);
        }
        for (job, css) in &linked {
            self.emit_stylesheet(&job.key, &job.name, css, &mut bundle);
        }

        for chunk in chunks.chunks() {
            let members: Vec<&Module> = order
                .iter()
                .filter(|id| chunk.modules.contains(*id))
                .filter_map(|id| graph.get(id))
                .collect();
            self.style_chunk(chunk, &members, &styles, &mut bundle);
            self.script_chunk(chunk, &members, &graph, &mut bundle);
        }
        check_conflicts(&bundle.manifest, &bundle.files[generated_from..])?;

        bundle.files.push(OutputFile {
            path: MANIFEST_FILE.into(),
            bytes: bundle.manifest.to_json().into_bytes(),
        });
        Ok(bundle)
    }

    /// Entry script and `<page_scripts>/<page>.js` for every page that has one.
    fn chunk_roots(&self, pages: &[PageDescriptor]) -> (ChunkRoots, Vec<PathBuf>) {
        let build = &self.config.build;
        let root = self.config.get_root();
        let mut roots = ChunkRoots::default();
        let mut paths = Vec::new();

        if build.entry.is_file() {
            roots.entry = Some(module_id(root, &build.entry));
            paths.push(build.entry.clone());
        }
        for page in pages {
            let script = build.page_scripts.join(format!("{}.js", page.name));
            if !script.is_file() {
                continue;
            }
            if page.name == build.entry_chunk || page.name == build.vendor_chunk {
                log!("warn"; "page `{}` shares a name with a shared chunk, ignoring {}", page.name, script.display());
                continue;
            }
            roots.pages.push((page.name.clone(), module_id(root, &script)));
            paths.push(script);
        }
        (roots, paths)
    }

    /// Stylesheets imported from scripts, compiled in parallel.
    fn preprocess_modules(&self, graph: &ModuleGraph) -> Result<BTreeMap<ModuleId, String>, BuildError> {
        let styles: Vec<&Module> = graph
            .modules()
            .filter(|m| m.kind == ModuleKind::Style)
            .collect();
        styles
            .par_iter()
            .map(|m| {
                preprocess(self.preprocessor, &m.path, m.source.as_bytes()).map(|css| (m.id.clone(), css))
            })
            .collect()
    }

    /// Stylesheets a page links to directly, compiled in parallel.
    fn linked_stylesheets(&self, rendered: &[RenderedPage]) -> Result<Vec<(AssetJob, String)>, BuildError> {
        let build = &self.config.build;
        let mut linked: BTreeMap<String, AssetJob> = BTreeMap::new();
        for page in rendered {
            for reference in &page.references {
                let Some((path, key)) = reference_key(reference, self.resolver.aliases(), &build.src)
                else {
                    continue;
                };
                if AssetKind::classify(&path) == AssetKind::Stylesheet {
                    linked
                        .entry(key)
                        .or_insert_with(|| AssetJob::new(&path, build, Some(page.page.name.clone())));
                }
            }
        }

        let jobs: Vec<AssetJob> = linked.into_values().collect();
        jobs.into_par_iter()
            .map(|job| {
                let bytes = read_source(&job)?;
                let css = preprocess(self.preprocessor, &job.source, &bytes)?;
                Ok((job, css))
            })
            .collect()
    }

    /// Images and fonts, plus every file referenced by a page or by one of
    /// `sheets` (`(referrer, css)`). Linked stylesheets are handled apart.
    fn asset_jobs<'s>(
        &self,
        rendered: &'s [RenderedPage],
        sheets: impl Iterator<Item = (&'s str, &'s str)>,
    ) -> Result<Vec<AssetJob>, BuildError> {
        let build = &self.config.build;
        let mut jobs: BTreeMap<String, AssetJob> = collect_static(build)
            .into_iter()
            .map(|job| (job.key.clone(), job))
            .collect();

        let page_refs = rendered.iter().flat_map(|page| {
            page.references
                .iter()
                .map(move |r| (r.clone(), page.page.name.as_str()))
        });
        let style_refs =
            sheets.flat_map(|(referrer, css)| css_references(css).into_iter().map(move |r| (r, referrer)));

        for (reference, referrer) in page_refs.chain(style_refs) {
            let Some((path, key)) = reference_key(&reference, self.resolver.aliases(), &build.src)
            else {
                return Err(BuildError::AssetResolution {
                    path: PathBuf::from(reference),
                    referrer: referrer.to_owned(),
                });
            };
            if AssetKind::classify(&path) == AssetKind::Stylesheet {
                continue;
            }
            jobs.entry(key)
                .or_insert_with(|| AssetJob::new(&path, build, Some(referrer.to_owned())));
        }
        Ok(jobs.into_values().collect())
    }

    fn style_chunk(
        &self,
        chunk: &Chunk,
        members: &[&Module],
        styles: &BTreeMap<ModuleId, String>,
        bundle: &mut Bundle,
    ) {
        let mut css = String::new();
        for module in members.iter().filter(|m| m.kind == ModuleKind::Style) {
            let Some(compiled) = styles.get(&module.id) else {
                continue;
            };
            if self.mode.is_development() {
                css.push_str(&format!("/* {} */\n", module.id));
            }
            css.push_str(compiled);
            if !css.ends_with('\n') {
                css.push('\n');
            }
        }
        if !css.is_empty() {
            self.emit_stylesheet(&format!("{}.css", chunk.name), &chunk.name, &css, bundle);
        }
    }

    /// Rewrite `url(@…)` through the manifest, minify, name and register.
    fn emit_stylesheet(&self, key: &str, name: &str, css: &str, bundle: &mut Bundle) {
        let build = &self.config.build;
        let aliases = self.resolver.aliases();
        let css = rewrite_css_references(css, |reference| {
            let (_, key) = reference_key(reference, aliases, &build.src)?;
            bundle.manifest.url(&key, &build.public_path)
        });
        let css = minify_css(&css, self.mode).into_owned();

        let path = output_name(AssetKind::Stylesheet, name, ".css", css.as_bytes(), self.mode);
        bundle.manifest.insert(key, path.clone());
        bundle.files.push(OutputFile {
            path,
            bytes: css.into_bytes(),
        });
    }

    fn script_chunk(&self, chunk: &Chunk, members: &[&Module], graph: &ModuleGraph, bundle: &mut Bundle) {
        let scripts: Vec<&Module> = members
            .iter()
            .copied()
            .filter(|m| m.kind == ModuleKind::Script)
            .collect();
        if scripts.is_empty() && chunk.root.is_none() {
            return;
        }

        let mut code = ChunkWriter::default();
        code.unmapped(RUNTIME);
        for module in scripts {
            let lowered = esm::lower(&module.source, |spec| import_target(module, spec, graph));
            let prologue = if lowered.prologue.is_empty() {
                String::new()
            } else {
                format!(" {}", lowered.prologue)
            };
            code.unmapped(&format!(
                "{REGISTRY}.define({}, function (module, exports, require) {{{prologue}",
                quote(&module.id)
            ));
            code.mapped(
                &format!("pagewright:///{}", module.id),
                &module.source,
                &drop_console(&lowered.body, self.mode),
            );
            code.unmapped("});");
        }
        if let Some(root) = &chunk.root {
            code.unmapped(&format!("{REGISTRY}.require({});", quote(root)));
        }

        let ChunkWriter { mut text, map } = code;
        let path = output_name(AssetKind::Script, &chunk.name, ".js", text.as_bytes(), self.mode);
        let file_name = path.rsplit('/').next().unwrap_or(&path).to_owned();
        text.push_str(&format!("//# sourceMappingURL={file_name}.map\n"));

        bundle.manifest.insert(format!("{}.js", chunk.name), path.clone());
        bundle.files.push(OutputFile {
            path: format!("{path}.map"),
            bytes: map.to_json(&file_name, self.mode.source_maps()).into_bytes(),
        });
        bundle.files.push(OutputFile {
            path,
            bytes: text.into_bytes(),
        });
    }
}

/// Chunk text with a line-level source map kept in step.
#[derive(Default)]
struct ChunkWriter {
    text: String,
    map: SourceMapBuilder,
}

impl ChunkWriter {
    fn unmapped(&mut self, text: &str) {
        self.push(text);
        self.map.add_unmapped(text);
    }

    fn mapped(&mut self, source: &str, original: &str, text: &str) {
        self.push(text);
        self.map.add_source(source, original, text);
    }

    fn push(&mut self, text: &str) {
        self.text.push_str(text);
        if !text.ends_with('\n') {
            self.text.push('\n');
        }
    }
}

/// Generated files may share a path only when their bytes agree.
/// Public files are exempt: generated ones overwrite them.
fn check_conflicts(manifest: &AssetManifest, files: &[OutputFile]) -> Result<(), BuildError> {
    let mut seen: FxHashMap<&str, &[u8]> = FxHashMap::default();
    for file in files {
        match seen.insert(&file.path, &file.bytes) {
            Some(previous) if previous != file.bytes.as_slice() => {
                let claimants: Vec<&str> = manifest
                    .iter()
                    .filter(|(_, output)| *output == file.path)
                    .map(|(key, _)| key)
                    .collect();
                return Err(BuildError::OutputConflict {
                    path: file.path.clone(),
                    claimants: claimants.join(", "),
                });
            }
            _ => {}
        }
    }
    Ok(())
}

fn import_target(module: &Module, specifier: &str, graph: &ModuleGraph) -> Option<ImportTarget> {
    let (_, id) = module.deps.iter().find(|(spec, _)| spec == specifier)?;
    Some(match graph.get(id).map(|m| m.kind) {
        Some(ModuleKind::Style) => ImportTarget::Detached,
        _ => ImportTarget::Module(id.clone()),
    })
}

fn quote(s: &str) -> String {
    Value::String(s.to_owned()).to_string()
}
