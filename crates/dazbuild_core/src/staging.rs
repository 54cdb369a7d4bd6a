//! Staged overlay of pending edits and the candidate it materialises to.
//!
//! Staging never touches the structural index: each edit produces a new
//! [`FileTree`] for the affected file, stored in the [`Overlay`]. Reads go
//! through a [`View`] that prefers overlay trees over indexed ones.

use crate::error::{DazError, Result};
use crate::index::{self, StructuralIndex};
use crate::parser::{ParserAdapter, SyntaxNode};
use crate::reference;
use crate::tree::{FileTree, TreeNode};
use crate::types::{ElementKind, OutlineEntry};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Candidate trees of the files touched by a session.
#[derive(Debug, Default, Clone)]
pub(crate) struct Overlay {
    files: BTreeMap<String, FileTree>,
}

impl Overlay {
    pub fn insert(&mut self, tree: FileTree) {
        self.files.insert(tree.path.clone(), tree);
    }

    pub fn get(&self, path: &str) -> Option<&FileTree> {
        self.files.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Read model of a repository with an optional overlay on top.
pub(crate) struct View<'a> {
    index: &'a StructuralIndex,
    overlay: Option<&'a Overlay>,
}

impl<'a> View<'a> {
    pub fn new(index: &'a StructuralIndex, overlay: Option<&'a Overlay>) -> Self {
        Self { index, overlay }
    }

    fn trees(&self) -> BTreeMap<&'a str, &'a FileTree> {
        let mut trees = self.index.trees();
        if let Some(overlay) = self.overlay {
            for (path, tree) in &overlay.files {
                trees.insert(path.as_str(), tree);
            }
        }
        trees
    }

    pub fn tree(&self, path: &str) -> Option<&'a FileTree> {
        self.overlay
            .and_then(|o| o.get(path))
            .or_else(|| self.index.tree(path))
    }

    pub fn outline(&self, reference: &str) -> Result<Vec<OutlineEntry>> {
        index::outline_of(&self.trees(), reference)
    }

    pub fn get(&self, reference: &str) -> Result<&'a str> {
        let (tree, node) = index::locate(&self.trees(), reference)?;
        Ok(tree.content(node))
    }

    /// Tree and node index addressed by `reference`.
    fn locate(&self, reference: &str) -> Result<(&'a FileTree, usize)> {
        index::locate(&self.trees(), reference)
    }

    fn contains(&self, reference: &str) -> bool {
        self.locate(reference).is_ok()
    }

    fn is_directory(&self, directory: &str) -> bool {
        let prefix = format!("{}/", directory.trim_end_matches('/'));
        self.index.root().join(directory).is_dir()
            || self.trees().keys().any(|path| path.starts_with(&prefix))
    }
}

/// Stages a replacement and returns the candidate tree of the owning file.
pub(crate) fn stage_replace(view: &View<'_>, target: &str, content: &str) -> Result<FileTree> {
    let (tree, node) = view.locate(target)?;
    let parser = view.index.parsers().for_path(&tree.path);
    let target_node = tree.node(node);

    let new_text = if target_node.kind == ElementKind::File {
        content.to_string()
    } else {
        let indent = leading_whitespace(line_before(&tree.text, target_node.span.start_byte));
        let replacement = normalize_replacement(
            parser,
            &tree.path,
            target,
            target_node.kind,
            &target_node.name,
            content,
            indent,
        )?;
        let range = target_node.span.range();
        format!(
            "{}{}{}",
            &tree.text[..range.start],
            replacement,
            &tree.text[range.end..]
        )
    };

    let candidate = parse_candidate(parser, &tree.path, target, new_text)?;
    match candidate.find(target) {
        Some(i) if candidate.node(i).kind == target_node.kind => {}
        _ => {
            return Err(DazError::parse(
                target,
                format!("content no longer defines {} {}", target_node.kind, target),
            ))
        }
    }

    debug!(reference = target, kind = %target_node.kind, "Staged replacement");
    Ok(candidate)
}

/// Stages an addition and returns the child reference plus the candidate
/// tree of the file it lands in.
pub(crate) fn stage_add(
    view: &View<'_>,
    parent: &str,
    kind: ElementKind,
    name: &str,
    content: &str,
) -> Result<(String, FileTree)> {
    if kind == ElementKind::File {
        return stage_add_file(view, parent, name, content);
    }

    reference::validate_segment(name)?;
    if parent.is_empty() {
        return Err(DazError::KindMismatch {
            parent: String::new(),
            kind,
        });
    }

    let (tree, node) = view.locate(parent)?;
    let parent_node = tree.node(node);
    let parser = view.index.parsers().for_path(&tree.path);
    if !parent_node.kind.accepts_child(kind) || !tree.structured {
        return Err(DazError::KindMismatch {
            parent: parent.to_string(),
            kind,
        });
    }

    let child = reference::child(parent, name);
    if view.contains(&child) {
        return Err(DazError::DuplicateReference(child));
    }

    let standalone = dedent(content);
    let definition = parser
        .parse_definition(&tree.path, &standalone)
        .map_err(|diagnostics| DazError::ParseError {
            target: child.clone(),
            diagnostics,
        })?;
    check_identity(&definition, kind, name, &child)?;
    let standalone = standalone.trim_end();

    let new_text = if parent_node.kind == ElementKind::File {
        append_top_level(&tree.text, standalone)
    } else {
        let indent = body_indent(tree, node);
        let block = indent_lines(standalone, &indent, false);
        match closing_brace(parser, parent_node, &tree.text) {
            Some(close) => {
                let before = tree.text[..close].trim_end();
                let separator = if before.ends_with('{') { "\n" } else { "\n\n" };
                let closing_indent =
                    leading_whitespace(line_before(&tree.text, parent_node.span.start_byte));
                format!(
                    "{}{}{}\n{}{}",
                    before,
                    separator,
                    block,
                    closing_indent,
                    &tree.text[close..]
                )
            }
            None => {
                let end = parent_node.span.end_byte;
                format!("{}\n\n{}{}", &tree.text[..end], block, &tree.text[end..])
            }
        }
    };

    let candidate = parse_candidate(parser, &tree.path, &child, new_text)?;
    match candidate.find(&child) {
        Some(i) if candidate.node(i).kind == kind => {}
        _ => {
            return Err(DazError::parse(
                &child,
                format!("{} {} not found after insertion", kind, child),
            ))
        }
    }

    debug!(reference = %child, kind = %kind, "Staged addition");
    Ok((child, candidate))
}

fn stage_add_file(
    view: &View<'_>,
    parent: &str,
    name: &str,
    content: &str,
) -> Result<(String, FileTree)> {
    reference::validate_file_name(name)?;

    if !parent.is_empty() {
        if view.contains(parent) {
            return Err(DazError::KindMismatch {
                parent: parent.to_string(),
                kind: ElementKind::File,
            });
        }
        if !view.is_directory(parent) {
            return Err(DazError::ReferenceNotFound(parent.to_string()));
        }
    }

    let path = reference::child_file(parent, name);
    if view.tree(&path).is_some() || view.index.root().join(&path).exists() {
        return Err(DazError::DuplicateReference(path));
    }

    let parser = view.index.parsers().for_path(&path);
    let tree = parse_candidate(parser, &path, &path, content.to_string())?;

    debug!(reference = %path, kind = "File", "Staged new file");
    Ok((path, tree))
}

fn parse_candidate(
    parser: &dyn ParserAdapter,
    path: &str,
    target: &str,
    text: String,
) -> Result<FileTree> {
    FileTree::parse(parser, path, text).map_err(|diagnostics| DazError::ParseError {
        target: target.to_string(),
        diagnostics,
    })
}

/// Accepts content in `get` form or standalone form and returns it ready to
/// splice at the element's position.
fn normalize_replacement(
    parser: &dyn ParserAdapter,
    path: &str,
    target: &str,
    kind: ElementKind,
    name: &str,
    content: &str,
    indent: &str,
) -> Result<String> {
    let content = content.trim_end();

    // `get` form: continuation lines already carry the element's indentation.
    let carries_indent = content
        .lines()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .all(|l| l.starts_with(indent));
    if carries_indent {
        let as_read = dedent(&format!("{}{}", indent, content));
        if let Ok(node) = parser.parse_definition(path, &as_read) {
            if check_identity(&node, kind, name, target).is_ok() {
                return Ok(content.to_string());
            }
        }
    }

    let standalone = dedent(content);
    let node = parser
        .parse_definition(path, &standalone)
        .map_err(|diagnostics| DazError::ParseError {
            target: target.to_string(),
            diagnostics,
        })?;
    check_identity(&node, kind, name, target)?;
    Ok(indent_lines(standalone.trim_end(), indent, true))
}

fn check_identity(node: &SyntaxNode, kind: ElementKind, name: &str, target: &str) -> Result<()> {
    let same_kind = match kind {
        ElementKind::Class => node.kind == ElementKind::Class,
        ElementKind::Function | ElementKind::Method => node.kind != ElementKind::Class,
        ElementKind::File => false,
    };
    if same_kind && node.name == name {
        Ok(())
    } else {
        Err(DazError::parse(
            target,
            format!(
                "content must define {} `{}`, found {} `{}`",
                kind, name, node.kind, node.name
            ),
        ))
    }
}

/// Text between the start of the line holding `byte` and `byte`.
fn line_before(text: &str, byte: usize) -> &str {
    let start = text[..byte].rfind('\n').map_or(0, |p| p + 1);
    &text[start..byte]
}

fn leading_whitespace(line: &str) -> &str {
    let end = line
        .find(|c: char| c != ' ' && c != '\t')
        .unwrap_or(line.len());
    &line[..end]
}

/// Indentation of the body of a class or function node: that of its first
/// child, else of the body's first line, else one level below the parent.
fn body_indent(tree: &FileTree, node: usize) -> String {
    let parent = tree.node(node);
    let parent_indent = leading_whitespace(line_before(&tree.text, parent.span.start_byte));

    if let Some(&first) = parent.children.first() {
        let line = line_before(&tree.text, tree.node(first).span.start_byte);
        if line.trim().is_empty() {
            return line.to_string();
        }
    }

    if let Some(body) = &parent.body {
        let line = line_before(&tree.text, body.start);
        if line.trim().is_empty() {
            return line.to_string();
        }
    }
    format!("{}    ", parent_indent)
}

/// Offset of the `}` closing `node`'s body, for grammars with braced bodies.
fn closing_brace(parser: &dyn ParserAdapter, node: &TreeNode, text: &str) -> Option<usize> {
    if !parser.braced_bodies() {
        return None;
    }
    let body = node.body.as_ref()?;
    let close = body.end.checked_sub(1)?;
    (text.get(close..body.end) == Some("}")).then_some(close)
}

fn append_top_level(text: &str, definition: &str) -> String {
    let existing = text.trim_end();
    if existing.is_empty() {
        format!("{}\n", definition)
    } else {
        format!("{}\n\n\n{}\n", existing, definition)
    }
}

/// Removes the longest whitespace prefix shared by all non-blank lines.
pub(crate) fn dedent(text: &str) -> String {
    let common = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(leading_whitespace)
        .reduce(|a, b| {
            let shared = a
                .bytes()
                .zip(b.bytes())
                .take_while(|(x, y)| x == y)
                .count();
            &a[..shared]
        })
        .unwrap_or("");

    text.lines()
        .map(|l| l.strip_prefix(common).unwrap_or(l.trim_start()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prefixes every non-blank line with `indent`.
pub(crate) fn indent_lines(text: &str, indent: &str, skip_first: bool) -> String {
    text.lines()
        .enumerate()
        .map(|(i, line)| {
            if line.trim().is_empty() || (skip_first && i == 0) {
                line.to_string()
            } else {
                format!("{}{}", indent, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Full repository state as it would be after applying staged edits.
#[derive(Debug, Clone, Default)]
pub struct Candidate {
    root: PathBuf,
    files: BTreeMap<String, String>,
    changed: BTreeSet<String>,
}

impl Candidate {
    /// Creates a candidate from explicit file contents.
    pub fn new(
        root: impl Into<PathBuf>,
        files: BTreeMap<String, String>,
        changed: BTreeSet<String>,
    ) -> Self {
        Self {
            root: root.into(),
            files,
            changed,
        }
    }

    /// Overlays the session's trees on the indexed files.
    pub(crate) fn materialize(index: &StructuralIndex, overlay: Option<&Overlay>) -> Self {
        let view = View::new(index, overlay);
        let files = view
            .trees()
            .into_iter()
            .map(|(path, tree)| (path.to_string(), tree.text.clone()))
            .collect();
        let changed = overlay
            .map(|o| o.paths().map(str::to_string).collect())
            .unwrap_or_default();
        Self::new(index.root(), files, changed)
    }

    /// Root of the repository the candidate was built from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every file path with its candidate content.
    pub fn files(&self) -> &BTreeMap<String, String> {
        &self.files
    }

    /// Paths whose content differs from the committed state.
    pub fn changed(&self) -> &BTreeSet<String> {
        &self.changed
    }

    /// Candidate content of one file.
    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    /// Writes the candidate under `dir`.
    ///
    /// Every file under the repository root is copied first, raw bytes and
    /// permissions included, whether or not the index covers it. Candidate
    /// texts are then written over the copy. `.git` is not copied.
    pub fn write_to(&self, dir: &Path) -> io::Result<()> {
        if self.root.is_dir() {
            copy_tree(&self.root, dir, dir)?;
        }

        for (path, text) in &self.files {
            let target = dir.join(path);
            match fs::read(&target) {
                Ok(bytes) if bytes == text.as_bytes() => continue,
                Ok(_) => fs::remove_file(&target)?,
                Err(_) => {
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent)?;
                    }
                }
            }
            fs::write(target, text)?;
        }
        Ok(())
    }
}

/// Recursively copies `from` into `to`, leaving out `.git` and `skip`.
fn copy_tree(from: &Path, to: &Path, skip: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let source = entry.path();
        if entry.file_name() == ".git" || source == skip {
            continue;
        }

        let target = to.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            copy_tree(&source, &target, skip)?;
        } else if file_type.is_symlink() {
            copy_link(&source, &target)?;
        } else {
            fs::copy(&source, &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_link(source: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(source)?, target)
}

#[cfg(not(unix))]
fn copy_link(source: &Path, target: &Path) -> io::Result<()> {
    if source.is_file() {
        fs::copy(source, target)?;
    }
    Ok(())
}
