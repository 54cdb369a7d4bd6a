//! Parser adapters turning file text into trees of definitions.
//!
//! The structural index only needs names, kinds and byte spans; adapters
//! hide the concrete grammar behind [`ParserAdapter`].

use crate::types::{Diagnostic, ElementKind, Location};
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use tree_sitter::{Language, Node, Parser, Tree};

/// A definition found by a parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxNode {
    /// Class, Function or Method.
    pub kind: ElementKind,
    /// Declared name.
    pub name: String,
    /// Byte range of the whole definition, decorators included.
    pub span: Range<usize>,
    /// Byte range of the body block, if the grammar has one.
    pub body: Option<Range<usize>>,
    /// Definition header without the body.
    pub signature: String,
    /// Nested definitions in source order.
    pub children: Vec<SyntaxNode>,
}

/// Converts file text into a tree of definitions.
pub trait ParserAdapter: Send + Sync {
    /// Short adapter name used in logs.
    fn name(&self) -> &'static str;

    /// Whether files handled by this adapter can contain child elements.
    fn structured(&self) -> bool {
        true
    }

    /// Whether definition bodies are closed by a `}`. New children then go
    /// before the closing brace instead of after the body.
    fn braced_bodies(&self) -> bool {
        false
    }

    /// Parses a whole file.
    ///
    /// # Errors
    ///
    /// Returns the parser diagnostics if the text is not syntactically valid.
    fn parse(&self, path: &str, text: &str) -> Result<Vec<SyntaxNode>, Vec<Diagnostic>>;

    /// Parses text that must consist of exactly one definition.
    ///
    /// # Errors
    ///
    /// Returns diagnostics if the text does not parse or does not hold a
    /// single definition.
    fn parse_definition(&self, path: &str, text: &str) -> Result<SyntaxNode, Vec<Diagnostic>> {
        let mut nodes = self.parse(path, text)?;
        if nodes.len() == 1 {
            Ok(nodes.remove(0))
        } else {
            Err(vec![Diagnostic::new(
                "parser",
                format!("expected exactly one definition, found {}", nodes.len()),
            )])
        }
    }
}

/// Fallback adapter: the file is a single element without children.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextParser;

impl ParserAdapter for PlainTextParser {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn structured(&self) -> bool {
        false
    }

    fn parse(&self, _path: &str, _text: &str) -> Result<Vec<SyntaxNode>, Vec<Diagnostic>> {
        Ok(Vec::new())
    }
}

/// Tree-sitter based Python adapter.
///
/// Indexes classes, functions and methods, including definitions nested in
/// class or function bodies. Definitions inside control flow (`if`, `try`)
/// are not addressable.
#[derive(Debug, Default, Clone, Copy)]
pub struct PythonParser;

impl PythonParser {
    fn tree(&self, path: &str, text: &str) -> Result<Tree, Vec<Diagnostic>> {
        syntax_tree(tree_sitter_python::LANGUAGE.into(), "Python", path, text)
    }
}

/// Parses `text`, turning error and missing nodes into diagnostics.
fn syntax_tree(
    language: Language,
    grammar: &str,
    path: &str,
    text: &str,
) -> Result<Tree, Vec<Diagnostic>> {
    let mut parser = Parser::new();
    parser.set_language(&language).map_err(|e| {
        vec![Diagnostic::new(
            "parser",
            format!("failed to load {} grammar: {}", grammar, e),
        )]
    })?;

    let tree = parser
        .parse(text, None)
        .ok_or_else(|| vec![Diagnostic::new("parser", "parser produced no tree")])?;

    if tree.root_node().has_error() {
        let mut diagnostics = Vec::new();
        collect_error_nodes(tree.root_node(), path, text, &mut diagnostics);
        if diagnostics.is_empty() {
            diagnostics.push(Diagnostic::new("parser", "syntax error"));
        }
        return Err(diagnostics);
    }

    Ok(tree)
}

impl ParserAdapter for PythonParser {
    fn name(&self) -> &'static str {
        "python"
    }

    fn parse(&self, path: &str, text: &str) -> Result<Vec<SyntaxNode>, Vec<Diagnostic>> {
        let tree = self.tree(path, text)?;
        let mut nodes = Vec::new();
        collect_definitions(tree.root_node(), ElementKind::File, text, &mut nodes);
        Ok(nodes)
    }

    fn parse_definition(&self, path: &str, text: &str) -> Result<SyntaxNode, Vec<Diagnostic>> {
        let tree = self.tree(path, text)?;
        let root = tree.root_node();
        let mut cursor = root.walk();
        let statements: Vec<Node<'_>> = root
            .named_children(&mut cursor)
            .filter(|n| n.kind() != "comment")
            .collect();

        if statements.len() != 1 {
            return Err(vec![Diagnostic::new(
                "parser",
                format!(
                    "expected a single class or function definition, found {} statements",
                    statements.len()
                ),
            )]);
        }

        let mut nodes = Vec::new();
        collect_definitions(root, ElementKind::File, text, &mut nodes);
        match nodes.pop() {
            Some(node) if nodes.is_empty() => Ok(node),
            _ => Err(vec![Diagnostic::new(
                "parser",
                "expected a single class or function definition",
            )]),
        }
    }
}

/// Walks the named children of `scope` and records definitions.
fn collect_definitions(scope: Node<'_>, scope_kind: ElementKind, text: &str, out: &mut Vec<SyntaxNode>) {
    let mut cursor = scope.walk();
    for child in scope.named_children(&mut cursor) {
        let (outer, definition) = match child.kind() {
            "function_definition" | "class_definition" => (child, child),
            "decorated_definition" => match child.child_by_field_name("definition") {
                Some(def) => (child, def),
                None => continue,
            },
            _ => continue,
        };

        let Some(name) = definition
            .child_by_field_name("name")
            .and_then(|n| n.utf8_text(text.as_bytes()).ok())
        else {
            continue;
        };

        let kind = match (definition.kind(), scope_kind) {
            ("class_definition", _) => ElementKind::Class,
            (_, ElementKind::Class) => ElementKind::Method,
            _ => ElementKind::Function,
        };

        let body = definition.child_by_field_name("body");
        let signature = signature_of(definition, body, text);

        let mut children = Vec::new();
        if let Some(block) = body {
            collect_definitions(block, kind, text, &mut children);
        }

        out.push(SyntaxNode {
            kind,
            name: name.to_string(),
            span: outer.byte_range(),
            body: body.map(|b| b.byte_range()),
            signature,
            children,
        });
    }
}

/// Header text of a definition, whitespace collapsed, trailing colon removed.
fn signature_of(definition: Node<'_>, body: Option<Node<'_>>, text: &str) -> String {
    let end = body.map_or(definition.end_byte(), |b| b.start_byte());
    let header = text.get(definition.start_byte()..end).unwrap_or_default();
    let collapsed = header.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_end_matches(':').trim_end().to_string()
}

/// Tree-sitter based JavaScript adapter.
///
/// Indexes function and class declarations, `export`ed ones included, the
/// methods of those classes, and function or class declarations nested in
/// function and method bodies. Arrow functions bound to variables are not
/// addressable.
#[derive(Debug, Default, Clone, Copy)]
pub struct JavaScriptParser;

/// Lets a lone method parse as the only member of a class.
const MEMBER_PREFIX: &str = "class __member__ {\n";
const MEMBER_SUFFIX: &str = "\n}\n";

impl JavaScriptParser {
    fn tree(&self, path: &str, text: &str) -> Result<Tree, Vec<Diagnostic>> {
        syntax_tree(tree_sitter_javascript::LANGUAGE.into(), "JavaScript", path, text)
    }

    /// Parses a method written as it appears inside a class body.
    fn parse_member(&self, path: &str, text: &str) -> Option<SyntaxNode> {
        let wrapped = format!("{}{}{}", MEMBER_PREFIX, text, MEMBER_SUFFIX);
        let tree = self.tree(path, &wrapped).ok()?;
        let class = single_statement(tree.root_node())?;
        if class.kind() != "class_declaration" {
            return None;
        }
        let member = single_statement(class.child_by_field_name("body")?)?;
        if member.kind() != "method_definition" {
            return None;
        }

        let mut node = js_method(member, &wrapped)?;
        shift(&mut node, MEMBER_PREFIX.len());
        Some(node)
    }
}

impl ParserAdapter for JavaScriptParser {
    fn name(&self) -> &'static str {
        "javascript"
    }

    fn braced_bodies(&self) -> bool {
        true
    }

    fn parse(&self, path: &str, text: &str) -> Result<Vec<SyntaxNode>, Vec<Diagnostic>> {
        let tree = self.tree(path, text)?;
        Ok(js_declarations(tree.root_node(), text))
    }

    fn parse_definition(&self, path: &str, text: &str) -> Result<SyntaxNode, Vec<Diagnostic>> {
        let declaration = self.tree(path, text).and_then(|tree| {
            let root = tree.root_node();
            let single = single_statement(root).is_some();
            let mut nodes = js_declarations(root, text);
            match nodes.pop() {
                Some(node) if single && nodes.is_empty() => Ok(node),
                _ => Err(vec![Diagnostic::new(
                    "parser",
                    "expected a single function, class or method definition",
                )]),
            }
        });
        declaration.or_else(|diagnostics| self.parse_member(path, text).ok_or(diagnostics))
    }
}

/// The only named child of `scope` other than comments.
fn single_statement(scope: Node<'_>) -> Option<Node<'_>> {
    let mut cursor = scope.walk();
    let mut statements = scope
        .named_children(&mut cursor)
        .filter(|n| n.kind() != "comment");
    let first = statements.next()?;
    statements.next().is_none().then_some(first)
}

fn js_declarations(scope: Node<'_>, text: &str) -> Vec<SyntaxNode> {
    let mut out = Vec::new();
    let mut cursor = scope.walk();
    for statement in scope.named_children(&mut cursor) {
        let declaration = if statement.kind() == "export_statement" {
            match statement.child_by_field_name("declaration") {
                Some(declaration) => declaration,
                None => continue,
            }
        } else {
            statement
        };

        let kind = match declaration.kind() {
            "function_declaration" | "generator_function_declaration" => ElementKind::Function,
            "class_declaration" => ElementKind::Class,
            _ => continue,
        };
        let Some(name) = field_text(declaration, "name", text) else {
            continue;
        };

        let body = declaration.child_by_field_name("body");
        let children = match (kind, body) {
            (ElementKind::Class, Some(class_body)) => {
                let mut members = class_body.walk();
                let methods: Vec<SyntaxNode> = class_body
                    .named_children(&mut members)
                    .filter(|m| m.kind() == "method_definition")
                    .filter_map(|m| js_method(m, text))
                    .collect();
                methods
            }
            (_, Some(block)) => js_declarations(block, text),
            (_, None) => Vec::new(),
        };

        out.push(SyntaxNode {
            kind,
            name,
            span: statement.byte_range(),
            body: body.map(|b| b.byte_range()),
            signature: signature_of(declaration, body, text),
            children,
        });
    }
    out
}

fn js_method(method: Node<'_>, text: &str) -> Option<SyntaxNode> {
    let name = field_text(method, "name", text)?;
    let body = method.child_by_field_name("body");
    Some(SyntaxNode {
        kind: ElementKind::Method,
        name,
        span: method.byte_range(),
        body: body.map(|b| b.byte_range()),
        signature: signature_of(method, body, text),
        children: body.map(|b| js_declarations(b, text)).unwrap_or_default(),
    })
}

fn field_text(node: Node<'_>, field: &str, text: &str) -> Option<String> {
    node.child_by_field_name(field)
        .and_then(|n| n.utf8_text(text.as_bytes()).ok())
        .map(str::to_string)
}

/// Moves every range of `node` back by `offset` bytes.
fn shift(node: &mut SyntaxNode, offset: usize) {
    node.span = node.span.start - offset..node.span.end - offset;
    if let Some(body) = &mut node.body {
        *body = body.start - offset..body.end - offset;
    }
    for child in &mut node.children {
        shift(child, offset);
    }
}

fn collect_error_nodes(node: Node<'_>, path: &str, text: &str, out: &mut Vec<Diagnostic>) {
    if node.is_error() || node.is_missing() {
        let start = node.start_position();
        let context = text
            .get(node.byte_range())
            .map(|s| s.chars().take(40).collect::<String>())
            .unwrap_or_default();
        let message = if node.is_missing() {
            format!("missing {}", node.kind())
        } else if context.trim().is_empty() {
            "syntax error".to_string()
        } else {
            format!("syntax error near `{}`", context.trim())
        };
        let line = u32::try_from(start.row.saturating_add(1)).unwrap_or(u32::MAX);
        let column = u32::try_from(start.column.saturating_add(1)).unwrap_or(u32::MAX);
        out.push(Diagnostic::new("parser", message).at(Location::new(path, line, column)));
        return;
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_error_nodes(child, path, text, out);
    }
}

/// Selects a parser adapter by file extension.
pub struct ParserRegistry {
    adapters: Vec<(Vec<String>, Arc<dyn ParserAdapter>)>,
    fallback: Arc<dyn ParserAdapter>,
}

impl ParserRegistry {
    /// Registry with no structured adapters; every file is plain text.
    pub fn plain() -> Self {
        Self {
            adapters: Vec::new(),
            fallback: Arc::new(PlainTextParser),
        }
    }

    /// Registers an adapter for the given extensions (without the dot).
    ///
    /// Later registrations win over earlier ones for the same extension.
    pub fn register(
        mut self,
        extensions: &[&str],
        adapter: impl ParserAdapter + 'static,
    ) -> Self {
        let extensions = extensions.iter().map(|e| e.to_ascii_lowercase()).collect();
        self.adapters.insert(0, (extensions, Arc::new(adapter)));
        self
    }

    /// Returns the adapter responsible for `path`.
    pub fn for_path(&self, path: &str) -> &dyn ParserAdapter {
        let extension = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        if let Some(ext) = extension {
            for (extensions, adapter) in &self.adapters {
                if extensions.iter().any(|e| *e == ext) {
                    return adapter.as_ref();
                }
            }
        }
        self.fallback.as_ref()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::plain()
            .register(&["py", "pyi"], PythonParser)
            .register(&["js", "mjs", "cjs"], JavaScriptParser)
    }
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut list = f.debug_list();
        for (extensions, adapter) in &self.adapters {
            list.entry(&(adapter.name(), extensions));
        }
        list.finish()
    }
}
