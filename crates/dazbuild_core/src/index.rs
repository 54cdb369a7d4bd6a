//! Structural index: the addressable element tree of an open repository.
//!
//! Every indexed file is held as a [`FileTree`]; elements get an
//! [`ElementId`] that survives reindexing as long as their kind and
//! reference are unchanged.

use crate::config::IndexConfig;
use crate::content_hash::ContentHash;
use crate::error::{DazError, Result};
use crate::parser::ParserRegistry;
use crate::reference;
use crate::tree::FileTree;
use crate::types::{
    Diagnostic, ElementId, ElementKind, OutlineEntry, ParseFailure, SearchDocument, Span,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Borrowed view of one indexed element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeElement<'a> {
    /// Stable id.
    pub id: ElementId,
    /// Dotted reference.
    pub reference: &'a str,
    /// Element kind.
    pub kind: ElementKind,
    /// Span in the owning file.
    pub span: Span,
    /// Definition header.
    pub signature: &'a str,
    /// Owning file path.
    pub file: &'a str,
    /// Enclosing element, lookup only.
    pub parent: Option<ElementId>,
    /// Addressable children in source order.
    pub children: Vec<ElementId>,
    content: &'a str,
}

impl<'a> CodeElement<'a> {
    /// Source text of the element's span.
    pub fn content(&self) -> &'a str {
        self.content
    }
}

#[derive(Debug, Clone)]
struct IndexedFile {
    tree: FileTree,
    hash: ContentHash,
    /// Parallel to `tree.nodes()`; `None` for shadowed duplicates.
    ids: Vec<Option<ElementId>>,
}

/// In-memory index of one repository.
#[derive(Debug)]
pub struct StructuralIndex {
    root: PathBuf,
    parsers: Arc<ParserRegistry>,
    files: BTreeMap<String, IndexedFile>,
    by_id: HashMap<ElementId, (String, usize)>,
    next_id: u64,
    parse_failures: BTreeMap<String, Vec<Diagnostic>>,
}

impl StructuralIndex {
    /// Discovers, reads and indexes the files under `root`.
    pub fn open(root: &Path, config: &IndexConfig, parsers: Arc<ParserRegistry>) -> Result<Self> {
        let paths = discover_files(root, config)?;
        let sources = paths
            .into_iter()
            .filter_map(|path| read_source(root, &path, config.max_file_bytes).map(|t| (path, t)));
        Ok(Self::build(root, parsers, sources))
    }

    /// Indexes the given `(path, text)` pairs.
    ///
    /// A file that fails to parse is kept as a childless File element and
    /// reported through [`StructuralIndex::parse_failures`].
    pub fn build<I>(root: &Path, parsers: Arc<ParserRegistry>, sources: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut index = Self {
            root: root.to_path_buf(),
            parsers,
            files: BTreeMap::new(),
            by_id: HashMap::new(),
            next_id: 1,
            parse_failures: BTreeMap::new(),
        };

        for (path, text) in sources {
            let tree = index.parse_file(&path, text);
            index.insert(tree, &HashMap::new());
        }

        info!(
            root = %index.root.display(),
            files = index.files.len(),
            elements = index.by_id.len(),
            parse_failures = index.parse_failures.len(),
            "Built structural index"
        );
        index
    }

    fn parse_file(&mut self, path: &str, text: String) -> FileTree {
        let parser = self.parsers.for_path(path);
        match parser.parse(path, &text) {
            Ok(syntax) => {
                self.parse_failures.remove(path);
                FileTree::from_syntax(path, text, parser.structured(), syntax)
            }
            Err(diagnostics) => {
                warn!(path, errors = diagnostics.len(), "File failed to parse, indexing as flat file");
                self.parse_failures.insert(path.to_string(), diagnostics);
                FileTree::flat(path, text, parser.structured())
            }
        }
    }

    /// Stores a tree, reusing ids from `previous` keyed by `(kind, reference)`.
    fn insert(&mut self, tree: FileTree, previous: &HashMap<(ElementKind, String), ElementId>) {
        let mut ids = Vec::with_capacity(tree.nodes().len());
        for (i, node) in tree.nodes().iter().enumerate() {
            if !tree.is_addressable(i) {
                ids.push(None);
                continue;
            }
            let id = match previous.get(&(node.kind, node.reference.clone())) {
                Some(id) => *id,
                None => {
                    let id = ElementId(self.next_id);
                    self.next_id += 1;
                    id
                }
            };
            self.by_id.insert(id, (tree.path.clone(), i));
            ids.push(Some(id));
        }

        let hash = ContentHash::of(tree.text.as_bytes());
        self.files
            .insert(tree.path.clone(), IndexedFile { tree, hash, ids });
    }

    fn remove(&mut self, path: &str) -> Option<IndexedFile> {
        let file = self.files.remove(path)?;
        for id in file.ids.iter().flatten() {
            self.by_id.remove(id);
        }
        Some(file)
    }

    /// Reparses one file from disk and returns the references whose span or
    /// content changed, appeared or disappeared.
    pub fn reindex(&mut self, path: &str) -> Result<BTreeSet<String>> {
        let full = self.root.join(path);
        let text = if full.is_file() {
            Some(fs::read_to_string(&full)?)
        } else {
            None
        };

        let old = self.remove(path);
        let mut previous = HashMap::new();
        let mut old_state: HashMap<String, (Span, String)> = HashMap::new();
        if let Some(old) = &old {
            for (i, node) in old.tree.nodes().iter().enumerate() {
                if let Some(id) = old.ids[i] {
                    previous.insert((node.kind, node.reference.clone()), id);
                    old_state.insert(
                        node.reference.clone(),
                        (node.span, old.tree.content(i).to_string()),
                    );
                }
            }
        }

        let mut impacted = BTreeSet::new();
        match text {
            Some(text) => {
                let tree = self.parse_file(path, text);
                for (i, node) in tree.nodes().iter().enumerate() {
                    if !tree.is_addressable(i) {
                        continue;
                    }
                    let unchanged = previous.contains_key(&(node.kind, node.reference.clone()))
                        && old_state
                            .get(&node.reference)
                            .is_some_and(|(span, content)| {
                                *span == node.span && content == tree.content(i)
                            });
                    if !unchanged {
                        impacted.insert(node.reference.clone());
                    }
                    old_state.remove(&node.reference);
                }
                self.insert(tree, &previous);
            }
            None => {
                self.parse_failures.remove(path);
            }
        }

        // Whatever is left no longer exists.
        impacted.extend(old_state.into_keys());

        debug!(path, impacted = impacted.len(), "Reindexed file");
        Ok(impacted)
    }

    /// Repository root this index was built from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Parser registry used by this index.
    pub fn parsers(&self) -> &Arc<ParserRegistry> {
        &self.parsers
    }

    /// Indexed file paths, sorted.
    pub fn file_paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Number of addressable elements, files included.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether no file is indexed.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Files that could not be parsed.
    pub fn parse_failures(&self) -> Vec<ParseFailure> {
        self.parse_failures
            .iter()
            .map(|(path, diagnostics)| ParseFailure {
                path: path.clone(),
                diagnostics: diagnostics.clone(),
            })
            .collect()
    }

    /// Fingerprint of an indexed file's text.
    pub fn file_hash(&self, path: &str) -> Option<ContentHash> {
        self.files.get(path).map(|f| f.hash)
    }

    pub(crate) fn tree(&self, path: &str) -> Option<&FileTree> {
        self.files.get(path).map(|f| &f.tree)
    }

    pub(crate) fn trees(&self) -> BTreeMap<&str, &FileTree> {
        self.files
            .iter()
            .map(|(path, file)| (path.as_str(), &file.tree))
            .collect()
    }

    /// Looks up an element by reference.
    pub fn element(&self, reference: &str) -> Option<CodeElement<'_>> {
        let path = reference::resolve_file(reference, self.file_paths())?;
        let file = self.files.get(path)?;
        let index = file.tree.find(reference)?;
        Some(self.view(file, index))
    }

    /// Looks up an element by id.
    pub fn element_by_id(&self, id: ElementId) -> Option<CodeElement<'_>> {
        let (path, index) = self.by_id.get(&id)?;
        let file = self.files.get(path)?;
        Some(self.view(file, *index))
    }

    fn view<'a>(&self, file: &'a IndexedFile, index: usize) -> CodeElement<'a> {
        let node = file.tree.node(index);
        CodeElement {
            id: file.ids[index].unwrap_or(ElementId(0)),
            reference: &node.reference,
            kind: node.kind,
            span: node.span,
            signature: &node.signature,
            file: &file.tree.path,
            parent: node.parent.and_then(|p| file.ids[p]),
            children: node.children.iter().filter_map(|c| file.ids[*c]).collect(),
            content: file.tree.content(index),
        }
    }

    /// Outline of the committed state; see [`outline_of`].
    pub fn outline(&self, reference: &str) -> Result<Vec<OutlineEntry>> {
        outline_of(&self.trees(), reference)
    }

    /// Committed source text of an element.
    pub fn get(&self, reference: &str) -> Result<&str> {
        let (tree, index) = locate(&self.trees(), reference)?;
        Ok(tree.content(index))
    }

    /// `(reference, kind, content)` for every addressable element.
    pub fn search_documents(&self) -> Vec<SearchDocument> {
        let mut documents = Vec::with_capacity(self.by_id.len());
        for file in self.files.values() {
            for (i, node) in file.tree.nodes().iter().enumerate() {
                if file.ids[i].is_some() {
                    documents.push(SearchDocument {
                        reference: node.reference.clone(),
                        kind: node.kind,
                        content: file.tree.content(i).to_string(),
                    });
                }
            }
        }
        documents
    }

    /// Documents for the given references that still exist.
    pub fn documents_for(&self, references: &BTreeSet<String>) -> Vec<SearchDocument> {
        references
            .iter()
            .filter_map(|r| self.element(r))
            .map(|e| SearchDocument {
                reference: e.reference.to_string(),
                kind: e.kind,
                content: e.content().to_string(),
            })
            .collect()
    }
}

/// Finds the tree and node addressed by `reference`.
pub(crate) fn locate<'a>(
    trees: &BTreeMap<&'a str, &'a FileTree>,
    reference: &str,
) -> Result<(&'a FileTree, usize)> {
    let path = reference::resolve_file(reference, trees.keys().copied())
        .ok_or_else(|| DazError::ReferenceNotFound(reference.to_string()))?;
    let tree = trees[path];
    let index = tree
        .find(reference)
        .ok_or_else(|| DazError::ReferenceNotFound(reference.to_string()))?;
    Ok((tree, index))
}

/// Descendants of `reference` in pre-order, without the element itself.
///
/// An empty reference lists every file followed by its descendants.
pub(crate) fn outline_of(
    trees: &BTreeMap<&str, &FileTree>,
    reference: &str,
) -> Result<Vec<OutlineEntry>> {
    let mut entries = Vec::new();
    if reference.is_empty() {
        for tree in trees.values() {
            entries.push(tree.entry(0));
            tree.outline_into(0, &mut entries);
        }
    } else {
        let (tree, index) = locate(trees, reference)?;
        tree.outline_into(index, &mut entries);
    }
    Ok(entries)
}

/// Lists candidate source files under `root`, relative and `/`-separated.
pub fn discover_files(root: &Path, config: &IndexConfig) -> Result<Vec<String>> {
    if !root.is_dir() {
        return Err(DazError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("repository root is not a directory: {}", root.display()),
        )));
    }

    let mut files = match config.use_git_ls_files.then(|| git_ls_files(root)).flatten() {
        Some(files) => files,
        None => {
            let mut files = Vec::new();
            walk(root, root, config.ignore_hidden, &mut files)?;
            files
        }
    };

    files.retain(|path| {
        !(config.ignore_hidden && path.split('/').any(|part| part.starts_with('.')))
            && root.join(path).is_file()
    });
    files.sort();
    files.dedup();
    Ok(files)
}

fn git_ls_files(root: &Path) -> Option<Vec<String>> {
    let output = Command::new("git")
        .arg("ls-files")
        .arg("-z")
        .arg("--others")
        .arg("--cached")
        .arg("--exclude-standard")
        .current_dir(root)
        .output()
        .ok()?;

    if !output.status.success() {
        debug!(root = %root.display(), "git ls-files unavailable, walking directory");
        return None;
    }

    let listing = String::from_utf8(output.stdout).ok()?;
    Some(
        listing
            .split('\0')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

fn walk(root: &Path, dir: &Path, ignore_hidden: bool, files: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();

        if name == ".git" || (ignore_hidden && name.starts_with('.')) {
            continue;
        }

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(root, &path, ignore_hidden, files)?;
        } else if file_type.is_file() {
            if let Ok(relative) = path.strip_prefix(root) {
                let parts: Vec<_> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                files.push(parts.join("/"));
            }
        }
    }
    Ok(())
}

/// Reads a file as UTF-8, skipping oversized and binary files.
pub fn read_source(root: &Path, path: &str, max_bytes: u64) -> Option<String> {
    let full = root.join(path);
    let len = fs::metadata(&full).ok()?.len();
    if len > max_bytes {
        debug!(path, len, "Skipping oversized file");
        return None;
    }
    match fs::read(&full).map(String::from_utf8) {
        Ok(Ok(text)) => Some(text),
        Ok(Err(_)) => {
            debug!(path, "Skipping non UTF-8 file");
            None
        }
        Err(e) => {
            warn!(path, error = %e, "Failed to read file");
            None
        }
    }
}
