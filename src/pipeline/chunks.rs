//! Chunk assignment.
//!
//! Every module of the graph lands in exactly one chunk:
//!
//! 1. third-party modules go to the vendor chunk;
//! 2. first-party modules reachable from the entry go to the entry chunk;
//! 3. first-party modules reachable from exactly one page go to that page;
//! 4. first-party modules shared by several pages (and not the entry) are
//!    hoisted into the entry chunk.
//!
//! So the entry wins every tie and no module is ever duplicated. The vendor
//! chunk loads before the entry on every page.

use crate::pipeline::modules::{ModuleGraph, ModuleId, Origin};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Entry,
    Vendor,
    Page,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub name: String,
    pub kind: ChunkKind,
    pub modules: BTreeSet<ModuleId>,
    /// Module executed when the chunk loads.
    pub root: Option<ModuleId>,
}

impl Chunk {
    fn new(name: &str, kind: ChunkKind, root: Option<ModuleId>) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            modules: BTreeSet::new(),
            root,
        }
    }

    /// Neither modules nor anything to run: not emitted.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty() && self.root.is_none()
    }
}

/// The entry module and per-page root modules the graph was scanned from.
#[derive(Debug, Clone, Default)]
pub struct ChunkRoots {
    pub entry: Option<ModuleId>,
    /// `(page name, root module)`
    pub pages: Vec<(String, ModuleId)>,
}

impl ChunkRoots {
    /// Entry first, then pages in order.
    pub fn all(&self) -> Vec<ModuleId> {
        self.entry
            .iter()
            .chain(self.pages.iter().map(|(_, id)| id))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ChunkGraph {
    /// Vendor, entry, then pages in root order.
    chunks: Vec<Chunk>,
    assignment: BTreeMap<ModuleId, usize>,
}

impl ChunkGraph {
    pub fn build(graph: &ModuleGraph, roots: &ChunkRoots, entry_name: &str, vendor_name: &str) -> Self {
        const VENDOR: usize = 0;
        const ENTRY: usize = 1;

        let mut chunks = vec![
            Chunk::new(vendor_name, ChunkKind::Vendor, None),
            Chunk::new(entry_name, ChunkKind::Entry, roots.entry.clone()),
        ];
        chunks.extend(
            roots
                .pages
                .iter()
                .map(|(page, root)| Chunk::new(page, ChunkKind::Page, Some(root.clone()))),
        );

        let from_entry = roots
            .entry
            .as_deref()
            .map(|id| graph.reachable_from(id))
            .unwrap_or_default();

        let mut owners: BTreeMap<ModuleId, BTreeSet<usize>> = BTreeMap::new();
        for (index, (_, root)) in roots.pages.iter().enumerate() {
            for id in graph.reachable_from(root) {
                owners.entry(id).or_default().insert(ENTRY + 1 + index);
            }
        }

        let mut assignment = BTreeMap::new();
        for module in graph.modules() {
            let chunk = if module.origin == Origin::ThirdParty {
                VENDOR
            } else if from_entry.contains(&module.id) {
                ENTRY
            } else {
                match owners.get(&module.id) {
                    Some(pages) if pages.len() == 1 => pages.first().copied().unwrap_or(ENTRY),
                    _ => ENTRY,
                }
            };
            chunks[chunk].modules.insert(module.id.clone());
            assignment.insert(module.id.clone(), chunk);
        }

        Self { chunks, assignment }
    }

    /// Chunks in load order: vendor, entry, pages.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn get(&self, name: &str) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.name == name)
    }

    /// Name of the chunk holding `id`.
    pub fn chunk_of(&self, id: &str) -> Option<&str> {
        self.assignment
            .get(id)
            .map(|&index| self.chunks[index].name.as_str())
    }
}
