//! Parser-independent syntax trees.
//!
//! Block extraction never touches a concrete parser: a [`SyntaxFrontend`]
//! lowers its native tree into a flat [`SyntaxTree`] arena once, and all
//! later passes walk the arena with explicit stacks of [`NodeId`]s.

use crate::source::Language;

/// Handle to a node inside a [`SyntaxTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Byte and 1-indexed line extent of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_line: u32,
    pub end_line: u32,
}

/// One node of a lowered syntax tree.
#[derive(Debug, Clone)]
pub struct SyntaxNode {
    /// Grammar node kind (`function_definition`, `if_statement`, `&&`, ...).
    pub kind: &'static str,
    /// Field name under which the parent holds this node, if any.
    pub field: Option<&'static str>,
    pub span: Span,
    /// `false` for anonymous tokens such as keywords and punctuation.
    pub named: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed syntax tree. The first node pushed is the root.
///
/// # Examples
///
/// ```
/// use tribunal_ir::syntax::{Span, SyntaxTree};
///
/// let mut tree = SyntaxTree::default();
/// let root = tree.push(None, "module", None, Span::default(), true);
/// let call = tree.push(Some(root), "call", None, Span::default(), true);
/// assert_eq!(tree.children(root), &[call]);
/// assert_eq!(tree.parent(call), Some(root));
/// ```
#[derive(Debug, Clone, Default)]
pub struct SyntaxTree {
    nodes: Vec<SyntaxNode>,
    has_error: bool,
}

impl SyntaxTree {
    /// Append a node as the last child of `parent`.
    pub fn push(
        &mut self,
        parent: Option<NodeId>,
        kind: &'static str,
        field: Option<&'static str>,
        span: Span,
        named: bool,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(SyntaxNode {
            kind,
            field,
            span,
            named,
            parent,
            children: Vec::new(),
        });
        if let Some(p) = parent {
            self.nodes[p.index()].children.push(id);
        }
        id
    }

    pub fn root(&self) -> Option<NodeId> {
        (!self.nodes.is_empty()).then_some(NodeId(0))
    }

    pub fn node(&self, id: NodeId) -> &SyntaxNode {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &'static str {
        self.node(id).kind
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// First child held under `field`.
    pub fn child_by_field(&self, id: NodeId, field: &str) -> Option<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .find(|&c| self.node(c).field == Some(field))
    }

    /// Source text covered by `id`; empty if the span does not fit `source`.
    pub fn text<'s>(&self, id: NodeId, source: &'s str) -> &'s str {
        let span = self.node(id).span;
        source.get(span.start_byte..span.end_byte).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the parser had to recover from syntax errors.
    pub fn has_error(&self) -> bool {
        self.has_error
    }

    pub fn set_has_error(&mut self, has_error: bool) {
        self.has_error = has_error;
    }
}

/// Turns source text into a [`SyntaxTree`].
///
/// Returns `None` when the language is unsupported or parsing produced
/// nothing; callers treat that file as having no blocks.
pub trait SyntaxFrontend: Send + Sync {
    fn parse(&self, language: Language, source: &str) -> Option<SyntaxTree>;
}

/// [`SyntaxFrontend`] backed by the bundled tree-sitter grammars.
///
/// # Examples
///
/// ```
/// use tribunal_ir::source::Language;
/// use tribunal_ir::syntax::{SyntaxFrontend, TreeSitterFrontend};
///
/// let tree = TreeSitterFrontend.parse(Language::Python, "x = 1\n").unwrap();
/// let root = tree.root().unwrap();
/// assert_eq!(tree.kind(root), "module");
/// assert!(TreeSitterFrontend.parse(Language::Unknown, "x").is_none());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeSitterFrontend;

impl SyntaxFrontend for TreeSitterFrontend {
    fn parse(&self, language: Language, source: &str) -> Option<SyntaxTree> {
        let ts_language = language.tree_sitter_language()?;

        let mut parser = tree_sitter::Parser::new();
        if let Err(e) = parser.set_language(&ts_language) {
            tracing::warn!(%language, error = %e, "failed to load grammar");
            return None;
        }
        let tree = parser.parse(source, None)?;
        Some(lower(&tree))
    }
}

fn span_of(node: &tree_sitter::Node) -> Span {
    Span {
        start_byte: node.start_byte(),
        end_byte: node.end_byte(),
        start_line: node.start_position().row as u32 + 1,
        end_line: node.end_position().row as u32 + 1,
    }
}

/// Copy a tree-sitter tree into an arena without recursion.
fn lower(tree: &tree_sitter::Tree) -> SyntaxTree {
    let mut out = SyntaxTree::default();
    out.set_has_error(tree.root_node().has_error());

    let mut cursor = tree.walk();
    // Arena ids of the current node's ancestors.
    let mut ancestors: Vec<NodeId> = Vec::new();

    loop {
        let node = cursor.node();
        let id = out.push(
            ancestors.last().copied(),
            node.kind(),
            cursor.field_name(),
            span_of(&node),
            node.is_named(),
        );

        if cursor.goto_first_child() {
            ancestors.push(id);
            continue;
        }

        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return out;
            }
            ancestors.pop();
        }
    }
}
