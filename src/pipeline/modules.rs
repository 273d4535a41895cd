//! Script dependency graph.
//!
//! Scanning starts at the entry script and the per-page scripts and follows
//! every `import`/`require` until the graph is closed. Stylesheets imported
//! from scripts are leaves: their own `@use` rules are the preprocessor's
//! business.

use crate::{
    error::BuildError,
    pipeline::{esm, resolve::Resolver},
};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Component, Path, PathBuf},
};

/// Root-relative, `/`-separated path of a module file.
pub type ModuleId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    FirstParty,
    /// Lives under a `node_modules` directory.
    ThirdParty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Script,
    Style,
}

impl ModuleKind {
    pub fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("css" | "scss" | "sass") => Self::Style,
            _ => Self::Script,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Module {
    pub id: ModuleId,
    pub path: PathBuf,
    pub origin: Origin,
    pub kind: ModuleKind,
    pub source: String,
    /// `(specifier as written, resolved module)` in source order.
    pub deps: Vec<(String, ModuleId)>,
}

#[derive(Debug, Clone, Default)]
pub struct ModuleGraph {
    root: PathBuf,
    modules: BTreeMap<ModuleId, Module>,
}

impl ModuleGraph {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            modules: BTreeMap::new(),
        }
    }

    /// Scan the closure of `roots`. Roots must exist.
    pub fn scan(root: &Path, roots: &[PathBuf], resolver: &Resolver) -> Result<Self, BuildError> {
        let mut graph = Self::new(root);
        let mut queue: Vec<PathBuf> = roots.to_vec();

        while let Some(path) = queue.pop() {
            let id = graph.id_of(&path);
            if graph.modules.contains_key(&id) {
                continue;
            }

            let source = fs::read_to_string(&path).map_err(|err| BuildError::io(&path, err))?;
            let kind = ModuleKind::of(&path);
            let mut deps = Vec::new();

            if kind == ModuleKind::Script {
                for site in esm::find_imports(&source) {
                    let Some(dep) = resolver.resolve(&site.specifier, &path) else {
                        return Err(BuildError::AssetResolution {
                            path: resolver.candidate(&site.specifier, &path),
                            referrer: id,
                        });
                    };
                    deps.push((site.specifier, graph.id_of(&dep)));
                    queue.push(dep);
                }
            }

            graph.insert(Module {
                origin: origin_of(path.strip_prefix(root).unwrap_or(&path)),
                id,
                path,
                kind,
                source,
                deps,
            });
        }
        Ok(graph)
    }

    pub fn insert(&mut self, module: Module) {
        self.modules.insert(module.id.clone(), module);
    }

    pub fn id_of(&self, path: &Path) -> ModuleId {
        module_id(&self.root, path)
    }

    pub fn get(&self, id: &str) -> Option<&Module> {
        self.modules.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.modules.contains_key(id)
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// `id` and everything it transitively imports.
    pub fn reachable_from(&self, id: &str) -> BTreeSet<ModuleId> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![id.to_owned()];
        while let Some(current) = stack.pop() {
            let Some(module) = self.modules.get(&current) else {
                continue;
            };
            if seen.insert(current) {
                stack.extend(module.deps.iter().map(|(_, dep)| dep.clone()));
            }
        }
        seen
    }

    /// Dependencies before dependents, walking `roots` in order; each module
    /// appears once. Import cycles are cut at the back edge.
    pub fn post_order(&self, roots: &[ModuleId]) -> Vec<ModuleId> {
        let mut visited = BTreeSet::new();
        let mut order = Vec::new();
        for root in roots {
            self.visit(root, &mut visited, &mut order);
        }
        order
    }

    fn visit(&self, id: &str, visited: &mut BTreeSet<ModuleId>, order: &mut Vec<ModuleId>) {
        let Some(module) = self.modules.get(id) else {
            return;
        };
        if !visited.insert(id.to_owned()) {
            return;
        }
        for (_, dep) in &module.deps {
            self.visit(dep, visited, order);
        }
        order.push(id.to_owned());
    }
}

/// Id of the module at `path` in a graph rooted at `root`.
pub fn module_id(root: &Path, path: &Path) -> ModuleId {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn origin_of(path: &Path) -> Origin {
    let vendored = path
        .components()
        .any(|c| matches!(c, Component::Normal(name) if name == "node_modules"));
    if vendored {
        Origin::ThirdParty
    } else {
        Origin::FirstParty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_scan_follows_imports() {
        let dir = TempDir::new().unwrap();
        let config = SiteConfig::default().with_root(dir.path());
        let b = &config.build;
        write(
            &b.entry,
            "import '../scss/main.scss';\nimport './modules/nav';\nimport dayjs from 'dayjs';\n",
        );
        write(&b.scripts.join("modules/nav.js"), "export const nav = 1;\n");
        write(&b.styles.join("main.scss"), "@use 'theme';\n");
        write(&b.node_modules.join("dayjs/index.js"), "module.exports = {};\n");

        let graph = ModuleGraph::scan(config.get_root(), &[b.entry.clone()], &Resolver::new(b)).unwrap();

        assert_eq!(graph.len(), 4);
        let main = graph.get("src/js/main.js").unwrap();
        assert_eq!(
            main.deps,
            vec![
                ("../scss/main.scss".to_string(), "src/scss/main.scss".to_string()),
                ("./modules/nav".to_string(), "src/js/modules/nav.js".to_string()),
                ("dayjs".to_string(), "node_modules/dayjs/index.js".to_string()),
            ]
        );
        assert_eq!(graph.get("src/scss/main.scss").unwrap().kind, ModuleKind::Style);
        assert!(graph.get("src/scss/main.scss").unwrap().deps.is_empty());
        assert_eq!(
            graph.get("node_modules/dayjs/index.js").unwrap().origin,
            Origin::ThirdParty
        );
        assert_eq!(main.origin, Origin::FirstParty);
    }

    #[test]
    fn test_unresolvable_import_names_path_and_referrer() {
        let dir = TempDir::new().unwrap();
        let config = SiteConfig::default().with_root(dir.path());
        let b = &config.build;
        write(&b.entry, "import './gone';\n");

        let err = ModuleGraph::scan(config.get_root(), &[b.entry.clone()], &Resolver::new(b))
            .unwrap_err();
        match err {
            BuildError::AssetResolution { path, referrer } => {
                assert_eq!(path, b.scripts.join("gone"));
                assert_eq!(referrer, "src/js/main.js");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    fn module(id: &str, deps: &[&str]) -> Module {
        Module {
            id: id.into(),
            path: PathBuf::from(id),
            origin: origin_of(Path::new(id)),
            kind: ModuleKind::of(Path::new(id)),
            source: String::new(),
            deps: deps.iter().map(|d| ((*d).to_owned(), (*d).to_owned())).collect(),
        }
    }

    #[test]
    fn test_post_order_and_cycles() {
        let mut graph = ModuleGraph::new(Path::new("/"));
        graph.insert(module("a.js", &["b.js", "c.js"]));
        graph.insert(module("b.js", &["c.js"]));
        graph.insert(module("c.js", &["a.js"]));
        graph.insert(module("d.js", &[]));

        assert_eq!(graph.post_order(&["a.js".into()]), ["c.js", "b.js", "a.js"]);
        assert_eq!(
            graph.post_order(&["d.js".into(), "b.js".into()]),
            ["d.js", "a.js", "c.js", "b.js"]
        );
        assert_eq!(graph.reachable_from("b.js").len(), 3);
    }
}
