//! The routing policy: the only place that decides what each specialist sees.

use std::collections::BTreeSet;

use tribunal_core::{AgentKind, CodeSnippet, RoutingConfig};
use tribunal_ir::block::{BlockType, CodeBlock};
use tribunal_ir::features::{Codebase, FileAnalysis};
use tribunal_ir::selectors::{LogicSelector, SecuritySelector};

use crate::curate::{LogicFeatures, QualityFeatures, SecurityFeatures};
use crate::patterns::{logic_hits, security_hits};
use crate::window::{enclosing_scope, expand_window};

/// Relevance ceiling for regex triggers outside any function in a parsed file.
const GLOBAL_SCOPE_RELEVANCE: f64 = 0.7;

/// Curated input for the security specialist.
#[derive(Debug, Clone)]
pub struct SecurityInput {
    features: SecurityFeatures,
    snippets: Vec<CodeSnippet>,
}

impl SecurityInput {
    pub fn features(&self) -> &SecurityFeatures {
        &self.features
    }

    pub fn snippets(&self) -> &[CodeSnippet] {
        &self.snippets
    }
}

/// Curated input for the logic specialist.
#[derive(Debug, Clone)]
pub struct LogicInput {
    features: LogicFeatures,
    snippets: Vec<CodeSnippet>,
}

impl LogicInput {
    pub fn features(&self) -> &LogicFeatures {
        &self.features
    }

    pub fn snippets(&self) -> &[CodeSnippet] {
        &self.snippets
    }
}

/// Curated input for the quality specialist: metrics, never code.
#[derive(Debug, Clone)]
pub struct QualityInput {
    features: QualityFeatures,
}

impl QualityInput {
    pub fn features(&self) -> &QualityFeatures {
        &self.features
    }
}

/// Everything the specialists receive for one run.
#[derive(Debug, Clone)]
pub struct RoutedInputs {
    pub security: SecurityInput,
    pub logic: LogicInput,
    pub quality: QualityInput,
}

impl RoutedInputs {
    /// Locations of the snippets routed to `kind`; empty for metrics-only kinds.
    pub fn snippet_locations(&self, kind: AgentKind) -> Vec<String> {
        let snippets: &[CodeSnippet] = match kind {
            AgentKind::Security => self.security.snippets(),
            AgentKind::Logic => self.logic.snippets(),
            _ => &[],
        };
        snippets.iter().map(CodeSnippet::location).collect()
    }
}

/// A reason to cut a snippet around a given line.
#[derive(Debug)]
struct Candidate<'a> {
    file: &'a FileAnalysis,
    trigger: u32,
    relevance: f64,
    tags: Vec<String>,
    reason: String,
}

/// Deterministic input curation.
///
/// # Examples
///
/// ```
/// use tribunal_core::{QualityConfig, RoutingConfig};
/// use tribunal_ir::analyze_source;
/// use tribunal_ir::source::MemorySource;
/// use tribunal_routing::RoutingPolicy;
///
/// let source = MemorySource::new("demo")
///     .with_file("run.py", "def run(x):\n    return eval(x)\n");
/// let codebase = analyze_source(&source, &QualityConfig::default()).unwrap();
/// let routed = RoutingPolicy::new(RoutingConfig::default()).route(&codebase);
///
/// assert_eq!(routed.security.snippets().len(), 1);
/// assert_eq!(routed.security.snippets()[0].context(), "function run");
/// // The file mentions eval, so the logic specialist never sees it.
/// assert!(routed.logic.snippets().is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct RoutingPolicy {
    config: RoutingConfig,
}

impl RoutingPolicy {
    pub fn new(config: RoutingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    pub fn route(&self, codebase: &Codebase) -> RoutedInputs {
        RoutedInputs {
            security: self.route_security(codebase),
            logic: self.route_logic(codebase),
            quality: self.route_quality(codebase),
        }
    }

    pub fn route_security(&self, codebase: &Codebase) -> SecurityInput {
        let mut candidates = Vec::new();
        for file in &codebase.files {
            if file.parsed {
                for pick in SecuritySelector::select(&file.blocks) {
                    let mut tags = vec![pick.reason.tag().to_string()];
                    tags.extend(
                        pick.block
                            .metadata()
                            .active_flags()
                            .into_iter()
                            .map(String::from),
                    );
                    candidates.push(Candidate {
                        file,
                        trigger: pick.block.start_line(),
                        relevance: pick.reason.relevance(),
                        tags,
                        reason: format!("{:?} in {}", pick.reason, pick.block.name()),
                    });
                }
                // Top-level statements belong to no function block.
                for hit in security_hits(&file.file.content) {
                    if in_function(&file.blocks, hit.line) {
                        continue;
                    }
                    let mut tags = hit.tags;
                    tags.push("global_scope".to_string());
                    candidates.push(Candidate {
                        file,
                        trigger: hit.line,
                        relevance: hit.relevance.min(GLOBAL_SCOPE_RELEVANCE),
                        tags,
                        reason: format!("{} outside any function", hit.rule),
                    });
                }
            } else {
                for hit in security_hits(&file.file.content) {
                    let mut tags = hit.tags;
                    tags.push("pattern".to_string());
                    candidates.push(Candidate {
                        file,
                        trigger: hit.line,
                        relevance: hit.relevance,
                        tags,
                        reason: format!("{} pattern in unparsed file", hit.rule),
                    });
                }
            }
        }

        let snippets = self.cut(AgentKind::Security, candidates);
        tracing::info!(snippets = snippets.len(), "routed security input");
        SecurityInput {
            features: SecurityFeatures::from_raw(&codebase.features),
            snippets,
        }
    }

    pub fn route_logic(&self, codebase: &Codebase) -> LogicInput {
        let mut candidates = Vec::new();
        for file in &codebase.files {
            if self.is_security_file(&file.file.content) {
                tracing::debug!(file = %file.file.path, "excluded from logic routing: security keywords");
                continue;
            }
            if file.parsed {
                for block in LogicSelector::select(&file.blocks) {
                    let (relevance, tags) = logic_relevance(block);
                    candidates.push(Candidate {
                        file,
                        trigger: block.start_line(),
                        relevance,
                        tags,
                        reason: format!(
                            "{} (complexity {})",
                            block.name(),
                            block.complexity()
                        ),
                    });
                }
            } else {
                for hit in logic_hits(&file.file.content) {
                    let mut tags = hit.tags;
                    tags.push("pattern".to_string());
                    candidates.push(Candidate {
                        file,
                        trigger: hit.line,
                        relevance: hit.relevance,
                        tags,
                        reason: format!("{} pattern in unparsed file", hit.rule),
                    });
                }
            }
        }

        let snippets = self.cut(AgentKind::Logic, candidates);
        tracing::info!(snippets = snippets.len(), "routed logic input");
        LogicInput {
            features: LogicFeatures::from_raw(&codebase.features),
            snippets,
        }
    }

    pub fn route_quality(&self, codebase: &Codebase) -> QualityInput {
        let features = QualityFeatures::from_raw(&codebase.features);
        tracing::info!(
            total_loc = features.total_loc,
            max_nesting = features.max_nesting_depth,
            functions = features.metrics.function_count,
            "routed quality input (metrics only)"
        );
        QualityInput { features }
    }

    /// Whether `content` mentions any configured security keyword
    /// (case-insensitive substring).
    pub fn is_security_file(&self, content: &str) -> bool {
        let lower = content.to_lowercase();
        self.config
            .security_file_keywords
            .iter()
            .any(|kw| lower.contains(&kw.to_lowercase()))
    }

    /// Order candidates by relevance, window them, and keep at most
    /// `max_snippets_per_agent` distinct snippets.
    fn cut(&self, agent: AgentKind, mut candidates: Vec<Candidate<'_>>) -> Vec<CodeSnippet> {
        candidates.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));

        let mut seen = BTreeSet::new();
        let mut snippets = Vec::new();
        for c in candidates {
            if snippets.len() >= self.config.max_snippets_per_agent {
                break;
            }
            let lines: Vec<&str> = c.file.file.content.lines().collect();
            let Some(window) = expand_window(&lines, c.trigger, self.config.max_snippet_chars)
            else {
                continue;
            };
            if !seen.insert((c.file.file.path.as_str(), window.start_line, window.end_line)) {
                continue;
            }
            let context = enclosing_scope(&lines, c.trigger, self.config.context_lookback_lines);
            match CodeSnippet::new(
                c.file.file.path.as_str(),
                window.start_line,
                window.end_line,
                window.content,
                context,
                c.relevance.clamp(0.0, 1.0),
                c.tags,
            ) {
                Ok(snippet) => {
                    tracing::debug!(
                        agent = %agent,
                        location = %snippet.location(),
                        relevance = snippet.relevance_score(),
                        tags = ?snippet.tags(),
                        reason = %c.reason,
                        "selected snippet"
                    );
                    snippets.push(snippet);
                }
                Err(e) => tracing::warn!(agent = %agent, error = %e, "dropping invalid snippet"),
            }
        }
        snippets
    }
}

fn in_function(blocks: &[CodeBlock], line: u32) -> bool {
    blocks
        .iter()
        .any(|b| b.block_type() == BlockType::Function && b.contains_line(line))
}

fn logic_relevance(block: &CodeBlock) -> (f64, Vec<String>) {
    let meta = block.metadata();
    let mut tags = Vec::new();
    if block.block_type() == BlockType::Loop {
        tags.push("loop".to_string());
    }
    if meta.is_infinite {
        tags.push("infinite_loop".to_string());
    }
    if meta.is_recursive {
        tags.push("recursion".to_string());
    }
    tags.push(format!("complexity_{}", block.complexity()));

    let relevance = if meta.is_infinite || meta.is_recursive {
        1.0
    } else {
        (f64::from(block.complexity()) / 10.0).min(1.0)
    };
    (relevance, tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tribunal_core::QualityConfig;
    use tribunal_ir::analyze_source;
    use tribunal_ir::source::MemorySource;

    fn codebase(files: &[(&str, &str)]) -> Codebase {
        let mut source = MemorySource::new("test");
        for (path, content) in files {
            source = source.with_file(*path, *content);
        }
        analyze_source(&source, &QualityConfig::default()).unwrap()
    }

    fn branchy(name: &str, branches: usize) -> String {
        let mut s = format!("def {name}(a):\n");
        for i in 0..branches {
            s.push_str(&format!("    if a == {i}:\n        a += 1\n"));
        }
        s.push_str("    return a\n");
        s
    }

    #[test]
    fn security_snippets_are_bounded() {
        let mut files = Vec::new();
        let bodies: Vec<String> = (0..8)
            .map(|i| format!("def f{i}(x):\n    return eval(x)\n"))
            .collect();
        for (i, body) in bodies.iter().enumerate() {
            files.push((format!("m{i}.py"), body.clone()));
        }
        let refs: Vec<(&str, &str)> = files
            .iter()
            .map(|(p, c)| (p.as_str(), c.as_str()))
            .collect();
        let cb = codebase(&refs);

        let policy = RoutingPolicy::new(RoutingConfig::default());
        let input = policy.route_security(&cb);
        assert_eq!(input.snippets().len(), 5);
        for s in input.snippets() {
            assert!(s.content().chars().count() <= 500);
            assert_eq!(s.relevance_score(), 1.0);
            assert!(s.has_tag("dangerous_execution"));
            assert!(s.has_tag("uses_eval"));
        }
        assert!(input.features().has_eval);
    }

    #[test]
    fn snippet_content_respects_char_limit() {
        let mut body = String::from("def run(cmd):\n");
        for i in 0..100 {
            body.push_str(&format!("    step_{i} = prepare(cmd, {i})\n"));
        }
        body.push_str("    exec(cmd)\n");
        let cb = codebase(&[("big.py", body.as_str())]);
        let config = RoutingConfig {
            max_snippet_chars: 120,
            ..Default::default()
        };
        let input = RoutingPolicy::new(config).route_security(&cb);
        assert_eq!(input.snippets().len(), 1);
        let s = &input.snippets()[0];
        assert!(s.content().chars().count() <= 120);
        assert_eq!(s.start_line(), 1);
        assert_eq!(s.context(), "function run");
    }

    #[test]
    fn security_rules_order_relevance() {
        let cb = codebase(&[
            (
                "db.py",
                "def lookup(db, name):\n    if name:\n        return db.run(\"SELECT * FROM u WHERE n = '\" + name + \"'\")\n",
            ),
            ("keys.py", "def creds():\n    return \"password=hunter2\"\n"),
            ("danger.py", "def run(x):\n    return eval(x)\n"),
        ]);
        let input = RoutingPolicy::new(RoutingConfig::default()).route_security(&cb);
        let order: Vec<_> = input
            .snippets()
            .iter()
            .map(|s| (s.filename(), s.relevance_score()))
            .collect();
        assert_eq!(
            order,
            vec![("danger.py", 1.0), ("db.py", 0.9), ("keys.py", 0.8)]
        );
    }

    #[test]
    fn logic_excludes_security_files() {
        let clean = branchy("route", 5);
        let tainted = format!("{}\nAUTH_HEADER = 'x'\n", branchy("check", 6));
        let cb = codebase(&[("clean.py", clean.as_str()), ("tainted.py", tainted.as_str())]);

        let policy = RoutingPolicy::new(RoutingConfig::default());
        assert!(policy.is_security_file(&tainted));
        let input = policy.route_logic(&cb);
        assert_eq!(input.snippets().len(), 1);
        let s = &input.snippets()[0];
        assert_eq!(s.filename(), "clean.py");
        assert!(s.has_tag("complexity_6"));
        assert!((s.relevance_score() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn logic_prefers_recursion_and_infinite_loops() {
        let cb = codebase(&[
            ("walk.js", "function walk(n) { return n ? walk(n - 1) : 0; }\n"),
            ("spin.py", "while True:\n    pass\n"),
            ("busy.py", branchy("busy", 4).as_str()),
        ]);
        let input = RoutingPolicy::new(RoutingConfig::default()).route_logic(&cb);
        let files: Vec<_> = input.snippets().iter().map(|s| s.filename()).collect();
        assert_eq!(files, vec!["spin.py", "walk.js", "busy.py"]);
        assert!(input.snippets()[0].has_tag("loop"));
        assert!(input.snippets()[1].has_tag("recursion"));
    }

    #[test]
    fn unparsed_files_fall_back_to_patterns() {
        let cb = codebase(&[(
            "deploy.rb",
            "def go(cmd)\n  system(cmd)\n  eval(cmd)\nend\n",
        )]);
        let input = RoutingPolicy::new(RoutingConfig::default()).route_security(&cb);
        assert_eq!(input.snippets().len(), 1);
        assert!(input.snippets()[0].has_tag("pattern"));
        assert!(input.snippets()[0].has_tag("code_execution"));
    }

    #[test]
    fn top_level_statements_are_scanned() {
        let cb = codebase(&[("script.py", "import sys\nresult = eval(sys.argv[1])\n")]);
        let input = RoutingPolicy::new(RoutingConfig::default()).route_security(&cb);
        assert_eq!(input.snippets().len(), 1);
        let s = &input.snippets()[0];
        assert!(s.has_tag("global_scope"));
        assert_eq!(s.relevance_score(), GLOBAL_SCOPE_RELEVANCE);
        assert_eq!(s.context(), "global scope");
    }

    #[test]
    fn quality_input_has_metrics_only() {
        let cb = codebase(&[("a.py", branchy("a", 3).as_str())]);
        let routed = RoutingPolicy::new(RoutingConfig::default()).route(&cb);
        assert_eq!(routed.quality.features().metrics.function_count, 1);
        assert!(routed.snippet_locations(AgentKind::Quality).is_empty());
        let json = serde_json::to_string(routed.quality.features()).unwrap();
        assert!(!json.contains("if a =="));
    }
}
