//! Syntax tree → [`CodeBlock`] extraction.
//!
//! All traversals use explicit stacks; nothing here recurses on tree depth.

use crate::block::{BlockMetadata, BlockType, CodeBlock, SecurityFlag};
use crate::languages::{
    spec_for, Callee, LanguageSpec, LoopRule, Shape, SECRET_TERMS, SQL_KEYWORDS,
};
use crate::source::{Language, SourceFile};
use crate::syntax::{NodeId, SyntaxFrontend, SyntaxTree};

/// Parent kinds whose field names an otherwise anonymous function.
const BINDING_PARENTS: &[(&str, &str)] = &[
    ("variable_declarator", "name"),
    ("assignment_expression", "left"),
    ("assignment", "left"),
    ("pair", "key"),
    ("public_field_definition", "name"),
    ("field_definition", "property"),
    ("let_declaration", "pattern"),
];

/// Extract the blocks of one file, parsing it with `frontend`.
///
/// Files without a grammar, or that the frontend cannot parse, yield no
/// blocks.
///
/// # Examples
///
/// ```
/// use tribunal_ir::extractor::extract_file;
/// use tribunal_ir::source::SourceFile;
/// use tribunal_ir::syntax::TreeSitterFrontend;
///
/// let file = SourceFile::new("loop.py", "while True:\n    pass\n");
/// let blocks = extract_file(&TreeSitterFrontend, &file);
/// assert_eq!(blocks.len(), 1);
/// assert!(blocks[0].metadata().is_infinite);
/// ```
pub fn extract_file(frontend: &dyn SyntaxFrontend, file: &SourceFile) -> Vec<CodeBlock> {
    match frontend.parse(file.language, &file.content) {
        Some(tree) => {
            if tree.has_error() {
                tracing::debug!(path = %file.path, "extracting from a tree with syntax errors");
            }
            extract_blocks(&tree, &file.content, file.language)
        }
        None => {
            if file.language != Language::Unknown {
                tracing::warn!(
                    path = %file.path,
                    language = %file.language,
                    "parse failed, no blocks"
                );
            }
            Vec::new()
        }
    }
}

/// Extract blocks from an already-lowered tree, in source (preorder) order.
pub fn extract_blocks(tree: &SyntaxTree, source: &str, language: Language) -> Vec<CodeBlock> {
    let (Some(spec), Some(root)) = (spec_for(language), tree.root()) else {
        return Vec::new();
    };

    let mut blocks = Vec::new();
    let mut stack = vec![root];

    while let Some(id) = stack.pop() {
        // Keyword tokens such as `function` or `class` share names with
        // block kinds; only named nodes can open a block.
        let rule = tree
            .node(id)
            .named
            .then(|| spec.block_rule(tree.kind(id)))
            .flatten();
        if let Some(rule) = rule {
            let present = rule
                .requires_field
                .map_or(true, |f| tree.child_by_field(id, f).is_some());
            if present {
                match build_block(tree, source, spec, id, rule.shape) {
                    Ok(block) => blocks.push(block),
                    Err(e) => tracing::warn!(error = %e, "dropping malformed block"),
                }
            }
        }
        stack.extend(tree.children(id).iter().rev().copied());
    }

    blocks
}

fn build_block(
    tree: &SyntaxTree,
    source: &str,
    spec: &LanguageSpec,
    id: NodeId,
    shape: Shape,
) -> tribunal_core::Result<CodeBlock> {
    let span = tree.node(id).span;
    let scope = scope_nodes(tree, spec, id);
    let complexity = 1 + scope
        .iter()
        .filter(|&&n| is_branch(tree, spec, n))
        .count() as u32;

    let mut metadata = BlockMetadata::default();
    let (block_type, name) = match shape {
        Shape::Function => {
            let name = resolve_name(tree, source, id);
            scan_function(tree, source, spec, &scope, &name, &mut metadata);
            (BlockType::Function, name)
        }
        Shape::Class => (BlockType::Class, resolve_name(tree, source, id)),
        Shape::TypeDef => (BlockType::TypeDef, resolve_name(tree, source, id)),
        Shape::Loop(rule) => {
            metadata.is_infinite = is_infinite(tree, source, spec, id, rule);
            (BlockType::Loop, loop_name(tree.kind(id)).to_string())
        }
    };

    CodeBlock::new(
        block_type,
        name,
        span.start_line,
        span.end_line,
        complexity,
        spec.language,
        metadata,
    )
}

/// Strict descendants of `id`, not descending into nested functions,
/// classes or type definitions.
fn scope_nodes(tree: &SyntaxTree, spec: &LanguageSpec, id: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack: Vec<NodeId> = tree.children(id).to_vec();
    while let Some(n) = stack.pop() {
        if spec.is_scope_boundary(tree.kind(n)) {
            continue;
        }
        out.push(n);
        stack.extend_from_slice(tree.children(n));
    }
    out
}

fn is_branch(tree: &SyntaxTree, spec: &LanguageSpec, id: NodeId) -> bool {
    let kind = tree.kind(id);
    let branch = spec.branches.iter().any(|r| {
        r.kind == kind
            && r.leading.map_or(true, |lead| {
                tree.children(id)
                    .first()
                    .is_some_and(|&c| tree.kind(c) == lead)
            })
    });
    if branch {
        return true;
    }
    spec.logical.iter().any(|r| {
        r.kind == kind
            && (r.operators.is_empty()
                || tree
                    .children(id)
                    .iter()
                    .any(|&c| r.operators.contains(&tree.kind(c))))
    })
}

fn scan_function(
    tree: &SyntaxTree,
    source: &str,
    spec: &LanguageSpec,
    scope: &[NodeId],
    name: &str,
    metadata: &mut BlockMetadata,
) {
    let own_name = last_segment(name);

    for &n in scope {
        let kind = tree.kind(n);

        if let Some(rule) = spec.call_rule(kind) {
            let Some(callee) = callee_text(tree, source, n, rule.callee) else {
                continue;
            };
            for flag in spec.flags_for_call(&callee) {
                metadata.set(flag);
            }
            if !rule.constructor
                && own_name != "anonymous"
                && last_segment(&callee) == own_name
            {
                metadata.is_recursive = true;
            }
        } else if spec.is_string(kind) {
            let text = tree.text(n, source);
            let upper = text.to_uppercase();
            if SQL_KEYWORDS.iter().any(|kw| upper.contains(kw)) {
                metadata.set(SecurityFlag::SqlStrings);
            }
            let lower = text.to_lowercase();
            if SECRET_TERMS.iter().any(|t| lower.contains(t)) {
                metadata.set(SecurityFlag::HardcodedSecrets);
            }
        }
    }
}

fn callee_text(tree: &SyntaxTree, source: &str, id: NodeId, callee: Callee) -> Option<String> {
    let raw = match callee {
        Callee::Field(field) => tree.text(tree.child_by_field(id, field)?, source),
        Callee::BeforeArguments => {
            let args = tree.child_by_field(id, "arguments")?;
            let start = tree.node(id).span.start_byte;
            let end = tree.node(args).span.start_byte;
            source.get(start..end)?
        }
    };
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    (!compact.is_empty()).then_some(compact)
}

/// `a.b.c` → `c`, `Foo::bar` → `bar`, `p->run` → `run`.
fn last_segment(name: &str) -> &str {
    name.rsplit(|c| matches!(c, '.' | ':' | '>'))
        .next()
        .unwrap_or(name)
}

fn resolve_name(tree: &SyntaxTree, source: &str, id: NodeId) -> String {
    if let Some(name) = tree.child_by_field(id, "name") {
        return tree.text(name, source).to_string();
    }

    // C and C++ nest the identifier inside declarators.
    let mut current = id;
    while let Some(next) = tree.child_by_field(current, "declarator") {
        current = next;
    }
    if current != id {
        let text = tree.text(current, source);
        if !text.is_empty() {
            return text.to_string();
        }
    }

    // Rust `impl Type` / `impl Trait for Type`.
    if tree.kind(id) == "impl_item" {
        if let Some(ty) = tree.child_by_field(id, "type") {
            return tree.text(ty, source).to_string();
        }
    }

    if let Some(parent) = tree.parent(id) {
        let parent_kind = tree.kind(parent);
        for &(kind, field) in BINDING_PARENTS {
            if kind == parent_kind {
                if let Some(binding) = tree.child_by_field(parent, field) {
                    return tree.text(binding, source).to_string();
                }
            }
        }
    }

    "anonymous".to_string()
}

fn loop_name(kind: &str) -> &'static str {
    if kind.starts_with("do") {
        "do_while_loop"
    } else if kind.contains("while") {
        "while_loop"
    } else if kind.contains("for") {
        "for_loop"
    } else {
        "loop"
    }
}

/// Condition text with parentheses, semicolons and whitespace removed.
fn bare_condition(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '(' | ')' | ';'))
        .collect()
}

fn is_infinite(
    tree: &SyntaxTree,
    source: &str,
    spec: &LanguageSpec,
    id: NodeId,
    rule: LoopRule,
) -> bool {
    let literal_true = |n: NodeId| spec.is_true_literal(&bare_condition(tree.text(n, source)));

    match rule {
        LoopRule::Always => true,
        LoopRule::Never => false,
        LoopRule::Condition => tree
            .child_by_field(id, "condition")
            .is_some_and(literal_true),
        LoopRule::CStyle => match tree.child_by_field(id, "condition") {
            None => true,
            Some(cond) => {
                let bare = bare_condition(tree.text(cond, source));
                tree.kind(cond) == "empty_statement"
                    || bare.is_empty()
                    || spec.is_true_literal(&bare)
            }
        },
        LoopRule::GoFor => {
            let children = tree.children(id);
            if let Some(&clause) = children.iter().find(|&&c| tree.kind(c) == "for_clause") {
                return match tree.child_by_field(clause, "condition") {
                    None => true,
                    Some(cond) => literal_true(cond),
                };
            }
            if children.iter().any(|&c| tree.kind(c) == "range_clause") {
                return false;
            }
            let condition = children
                .iter()
                .copied()
                .find(|&c| tree.node(c).named && tree.node(c).field != Some("body"));
            match condition {
                None => true,
                Some(cond) => literal_true(cond),
            }
        }
    }
}
