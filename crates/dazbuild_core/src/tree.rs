//! Flattened element tree of a single file.
//!
//! Both the structural index and the session overlay describe a file with a
//! [`FileTree`]: nodes in pre-order, node 0 being the file itself. Children
//! are owned by index; the parent link is a plain index used for lookup.

use crate::parser::{ParserAdapter, SyntaxNode};
use crate::reference;
use crate::types::{Diagnostic, ElementKind, OutlineEntry, Span};
use std::collections::HashMap;
use std::ops::Range;

/// One element of a [`FileTree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TreeNode {
    pub reference: String,
    pub name: String,
    pub kind: ElementKind,
    pub span: Span,
    pub body: Option<Range<usize>>,
    pub signature: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

/// Parsed view of one file's text.
#[derive(Debug, Clone)]
pub(crate) struct FileTree {
    pub path: String,
    pub text: String,
    pub structured: bool,
    nodes: Vec<TreeNode>,
    by_reference: HashMap<String, usize>,
}

impl FileTree {
    /// Parses `text` with `parser` and builds the tree.
    pub fn parse(
        parser: &dyn ParserAdapter,
        path: &str,
        text: String,
    ) -> Result<Self, Vec<Diagnostic>> {
        let syntax = parser.parse(path, &text)?;
        Ok(Self::from_syntax(path, text, parser.structured(), syntax))
    }

    /// A file element without children.
    pub fn flat(path: &str, text: String, structured: bool) -> Self {
        Self::from_syntax(path, text, structured, Vec::new())
    }

    /// Builds the tree from parser output.
    pub fn from_syntax(
        path: &str,
        text: String,
        structured: bool,
        syntax: Vec<SyntaxNode>,
    ) -> Self {
        let root = TreeNode {
            reference: path.to_string(),
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            kind: ElementKind::File,
            span: Span {
                start_byte: 0,
                end_byte: text.len(),
                start_line: 0,
                start_col: 0,
            },
            body: None,
            signature: path.to_string(),
            parent: None,
            children: Vec::new(),
        };

        let mut tree = Self {
            path: path.to_string(),
            text,
            structured,
            nodes: vec![root],
            by_reference: HashMap::new(),
        };
        for node in syntax {
            tree.push(0, node);
        }

        // Later definitions rebind a name, so the last one owns the reference.
        for (i, node) in tree.nodes.iter().enumerate() {
            tree.by_reference.insert(node.reference.clone(), i);
        }
        tree
    }

    fn push(&mut self, parent: usize, node: SyntaxNode) {
        let index = self.nodes.len();
        let reference = reference::child(&self.nodes[parent].reference, &node.name);
        let span = span_at(&self.text, node.span);

        self.nodes.push(TreeNode {
            reference,
            name: node.name,
            kind: node.kind,
            span,
            body: node.body,
            signature: node.signature,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(index);

        for child in node.children {
            self.push(index, child);
        }
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> &TreeNode {
        &self.nodes[index]
    }

    /// Index of the node owning `reference`.
    ///
    /// Shadowed duplicates are skipped, so every returned node is addressable.
    pub fn find(&self, reference: &str) -> Option<usize> {
        self.by_reference.get(reference).copied()
    }

    /// Whether the node is the one its reference resolves to.
    pub fn is_addressable(&self, index: usize) -> bool {
        self.find(&self.nodes[index].reference) == Some(index)
    }

    /// Exact source text of a node.
    pub fn content(&self, index: usize) -> &str {
        self.text
            .get(self.nodes[index].span.range())
            .unwrap_or_default()
    }

    /// Appends outline entries for every addressable descendant of `index`.
    pub fn outline_into(&self, index: usize, out: &mut Vec<OutlineEntry>) {
        for &child in &self.nodes[index].children {
            if !self.is_addressable(child) {
                continue;
            }
            out.push(self.entry(child));
            self.outline_into(child, out);
        }
    }

    pub fn entry(&self, index: usize) -> OutlineEntry {
        let node = &self.nodes[index];
        OutlineEntry {
            reference: node.reference.clone(),
            kind: node.kind,
            signature: node.signature.clone(),
        }
    }
}

/// Computes line and column of a byte range's start.
pub(crate) fn span_at(text: &str, range: Range<usize>) -> Span {
    let start = range.start.min(text.len());
    let before = &text.as_bytes()[..start];
    let start_line = before.iter().filter(|b| **b == b'\n').count();
    let line_start = before
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |p| p + 1);

    Span {
        start_byte: start,
        end_byte: range.end.min(text.len()),
        start_line,
        start_col: start - line_start,
    }
}
