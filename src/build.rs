//! Build orchestration.
//!
//! One [`Orchestrator`] drives the stages of a build in order:
//!
//! ```text
//! Idle ─► Discovering ─► Rendering ─► Bundling ─► Emitting ─► Complete
//!              │              │            │           │
//!              └──────────────┴────────────┴───────────┴──► Failed
//! ```
//!
//! Production runs it once. Development keeps the orchestrator alive across
//! rebuilds so a narrow change can skip stages:
//!
//! | Scope      | Stages run                                   |
//! |------------|----------------------------------------------|
//! | `Render`   | Rendering, Emitting (pages only)             |
//! | `Discover` | Discovering, Rendering, Emitting (pages only)|
//! | `Full`     | everything                                   |
//!
//! A narrow rebuild widens to `Full` when there is nothing cached to reuse,
//! when the page set changed, or when a page references an asset the cached
//! manifest does not know. A set cancellation flag stops the run at the next
//! stage boundary and returns it to `Idle`.

use crate::{
    config::SiteConfig,
    error::BuildError,
    log,
    mode::BuildMode,
    pipeline::{
        assets::{AssetManifest, CommandPreprocessor, OutputFile, StylePreprocessor},
        bundle::{Bundle, Bundler, reference_key},
        data::load_or_default,
        discover::{PageDescriptor, discover_pages},
        emit::{finalize_page, write_output, write_pages},
        render::{BuildContext, RenderedPage, Renderer},
        resolve::Aliases,
    },
    utils::exec,
};
use rayon::prelude::*;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Discovering,
    Rendering,
    Bundling,
    Emitting,
    Complete,
    Failed,
}

/// How much of the pipeline a rebuild re-runs. Ordered narrow to wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RebuildScope {
    /// Global data changed.
    Render,
    /// A page or partial template changed.
    Discover,
    Full,
}

/// Summary of a finished build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Scope actually run, after any widening.
    pub scope: RebuildScope,
    pub pages: usize,
    /// Pages that failed to render (development only).
    pub skipped: usize,
    /// Files written, pages included.
    pub files: usize,
    pub elapsed: Duration,
}

pub struct Orchestrator<'a> {
    config: &'a SiteConfig,
    mode: BuildMode,
    stage: Stage,
    /// Stages entered by the last run.
    history: Vec<Stage>,
    preprocessor: Box<dyn StylePreprocessor>,
    pages: Vec<PageDescriptor>,
    /// Last bundle that made it to disk.
    bundle: Option<Bundle>,
    cancel: Arc<AtomicBool>,
    reload_port: Option<u16>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a SiteConfig, mode: BuildMode) -> Self {
        let build = &config.build;
        if !exec::is_installed(&build.sass.command) {
            log!("warn"; "`{}` not found, .scss/.sass stylesheets will fail to build", build.sass.command.join(" "));
        }
        let preprocessor = CommandPreprocessor::from_config(build, config.get_root());
        Self::with_preprocessor(config, mode, Box::new(preprocessor))
    }

    pub fn with_preprocessor(
        config: &'a SiteConfig,
        mode: BuildMode,
        preprocessor: Box<dyn StylePreprocessor>,
    ) -> Self {
        Self {
            config,
            mode,
            stage: Stage::Idle,
            history: Vec::new(),
            preprocessor,
            pages: Vec::new(),
            bundle: None,
            cancel: Arc::new(AtomicBool::new(false)),
            reload_port: None,
        }
    }

    /// Inject the live-reload client pointing at `port` (development only).
    pub fn with_reload_port(mut self, port: u16) -> Self {
        self.reload_port = Some(port);
        self
    }

    /// Flag checked between stages. The caller clears it before a run.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub const fn stage(&self) -> Stage {
        self.stage
    }

    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    pub fn manifest(&self) -> Option<&AssetManifest> {
        self.bundle.as_ref().map(|b| &b.manifest)
    }

    /// Run one build of at least `scope`.
    pub fn run(&mut self, scope: RebuildScope) -> Result<BuildReport, BuildError> {
        let started = Instant::now();
        self.history.clear();

        let result = self.run_stages(scope, started);
        match &result {
            Ok(_) => self.enter(Stage::Complete),
            Err(BuildError::Cancelled) => self.enter(Stage::Idle),
            Err(_) => self.enter(Stage::Failed),
        }
        result
    }

    fn run_stages(&mut self, requested: RebuildScope, started: Instant) -> Result<BuildReport, BuildError> {
        let config = self.config;
        let build = &config.build;
        let mut scope = if self.bundle.is_none() {
            RebuildScope::Full
        } else {
            requested
        };

        if scope >= RebuildScope::Discover {
            self.enter(Stage::Discovering);
            let pages = discover_pages(&build.pages, &build.entry_chunk)?;
            if scope < RebuildScope::Full && pages != self.pages {
                log!("build"; "page set changed, rebuilding everything");
                scope = RebuildScope::Full;
            }
            self.pages = pages;
            self.checkpoint()?;
        }

        self.enter(Stage::Rendering);
        let global = load_or_default(&build.data);
        let renderer = Renderer::new(&build.templates)?;
        let outcome = renderer.render_all(&self.pages, &global, BuildContext::new(self.mode), self.mode)?;
        self.checkpoint()?;

        if scope < RebuildScope::Full
            && let Some(cached) = &self.bundle
            && !references_known(&outcome.rendered, &cached.manifest, config)
        {
            log!("build"; "new asset reference, rebuilding everything");
            scope = RebuildScope::Full;
        }

        // Taken out so a failed or cancelled run leaves nothing to reuse.
        let (bundle, fresh) = match self.bundle.take() {
            Some(cached) if scope < RebuildScope::Full => (cached, false),
            _ => {
                self.enter(Stage::Bundling);
                let bundler = Bundler::new(config, self.mode, self.preprocessor.as_ref());
                let bundle = bundler.bundle(&self.pages, &outcome.rendered)?;
                self.checkpoint()?;
                (bundle, true)
            }
        };

        self.enter(Stage::Emitting);
        let (mode, reload_port) = (self.mode, self.reload_port);
        let documents: Vec<OutputFile> = outcome
            .rendered
            .par_iter()
            .map(|page| finalize_page(page, &bundle.manifest, config, mode, reload_port))
            .collect::<Result<_, _>>()?;

        let files = if fresh {
            let mut files = bundle.files.clone();
            files.extend(documents);
            write_output(&build.output, &files, mode)?;
            files.len()
        } else {
            write_pages(&build.output, &documents)?;
            documents.len()
        };
        self.bundle = Some(bundle);

        let report = BuildReport {
            scope,
            pages: outcome.rendered.len(),
            skipped: outcome.failures.len(),
            files,
            elapsed: started.elapsed(),
        };
        log!("build"; "{} pages, {} files in {} ms ({})",
             report.pages, report.files, report.elapsed.as_millis(), self.mode);
        if report.skipped > 0 {
            log!("warn"; "{} pages skipped because of render errors", report.skipped);
        }
        Ok(report)
    }

    fn enter(&mut self, stage: Stage) {
        self.stage = stage;
        self.history.push(stage);
    }

    fn checkpoint(&self) -> Result<(), BuildError> {
        if self.cancel.load(Ordering::Relaxed) {
            Err(BuildError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Every alias reference of every page has a manifest entry.
fn references_known(pages: &[RenderedPage], manifest: &AssetManifest, config: &SiteConfig) -> bool {
    let aliases = Aliases::from_config(&config.build);
    pages.iter().flat_map(|p| &p.references).all(|reference| {
        reference_key(reference, &aliases, &config.build.src)
            .is_some_and(|(_, key)| manifest.contains(&key))
    })
}

/// One full build.
pub fn build_site(config: &SiteConfig, mode: BuildMode) -> Result<BuildReport, BuildError> {
    Orchestrator::new(config, mode).run(RebuildScope::Full)
}
