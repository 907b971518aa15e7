//! Line-level regex triggers for text the block extractor cannot see: files
//! without a grammar, files that failed to parse, and top-level statements.

use once_cell::sync::Lazy;
use regex::Regex;

/// One regex trigger line.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternHit {
    /// 1-indexed.
    pub line: u32,
    pub rule: &'static str,
    pub relevance: f64,
    pub tags: Vec<String>,
}

struct Pattern {
    rule: &'static str,
    regex: Regex,
    priority: f64,
    tags: &'static [&'static str],
}

fn pattern(
    rule: &'static str,
    regex: &str,
    priority: f64,
    tags: &'static [&'static str],
) -> Pattern {
    Pattern {
        rule,
        regex: Regex::new(regex).expect("valid routing regex"),
        priority,
        tags,
    }
}

static SECURITY_PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    vec![
        pattern(
            "sql_injection",
            r#"(?i)\b(select|insert|update|delete)\b.*(\+|\.format\(|%\s*[(\w]|\$\{)|(?i)\bf["'].*\b(select|insert|update|delete)\b"#,
            1.0,
            &["sql", "injection", "source_to_sink"],
        ),
        pattern(
            "code_execution",
            r"\b(eval|exec)\s*\(",
            0.9,
            &["code_execution", "dangerous", "source_to_sink"],
        ),
        pattern(
            "insecure_deserialization",
            r"\bpickle\.loads?\b",
            0.85,
            &["deserialization", "dangerous", "source_to_sink"],
        ),
        pattern(
            "path_traversal",
            r"\bopen\s*\(.*\+",
            0.8,
            &["path_traversal", "file_access", "source_to_sink"],
        ),
    ]
});

static LOGIC_PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    vec![
        pattern(
            "infinite_loop_risk",
            r"\bwhile\s*\(?\s*(True|true|1)\s*\)?\s*[:{]?\s*$|\bfor\s*\(\s*;\s*;\s*\)|^\s*loop\s*\{",
            1.0,
            &["loop", "infinite_loop_risk"],
        ),
        pattern(
            "complex_loop",
            r"\bfor\b.*\b(in|of)\b|\bfor\s*\(",
            0.6,
            &["loop", "iteration"],
        ),
        pattern(
            "nested_conditional",
            r"^\s*(\}\s*)?(else\s+)?(if|elif)\b",
            0.5,
            &["conditional", "branching"],
        ),
    ]
});

/// Minimum indentation depth for a non-infinite-loop logic trigger.
const MIN_LOGIC_NESTING: usize = 2;

/// Security triggers in `content`, in line order.
///
/// # Examples
///
/// ```
/// use tribunal_routing::patterns::security_hits;
///
/// let hits = security_hits("x = 1\nresult = eval(user_input)\n");
/// assert_eq!(hits.len(), 1);
/// assert_eq!(hits[0].line, 2);
/// assert_eq!(hits[0].rule, "code_execution");
/// ```
pub fn security_hits(content: &str) -> Vec<PatternHit> {
    let mut hits = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        for p in SECURITY_PATTERNS.iter() {
            if p.regex.is_match(line) {
                hits.push(PatternHit {
                    line: idx as u32 + 1,
                    rule: p.rule,
                    relevance: p.priority,
                    tags: p.tags.iter().map(|t| t.to_string()).collect(),
                });
            }
        }
    }
    hits
}

/// Logic triggers in `content`. Loops and conditionals only count when
/// nested at least two levels deep; infinite loops always count. Deeper
/// nesting raises relevance by 0.1 per level.
pub fn logic_hits(content: &str) -> Vec<PatternHit> {
    let mut hits = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let nesting = indent_depth(line);
        for p in LOGIC_PATTERNS.iter() {
            if !p.regex.is_match(line) {
                continue;
            }
            if nesting < MIN_LOGIC_NESTING && p.rule != "infinite_loop_risk" {
                continue;
            }
            let mut tags: Vec<String> = p.tags.iter().map(|t| t.to_string()).collect();
            tags.push(format!("nesting_{nesting}"));
            hits.push(PatternHit {
                line: idx as u32 + 1,
                rule: p.rule,
                relevance: (p.priority + nesting as f64 * 0.1).min(1.0),
                tags,
            });
        }
    }
    hits
}

fn indent_depth(line: &str) -> usize {
    let cols: usize = line
        .chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum();
    cols / 4
}
