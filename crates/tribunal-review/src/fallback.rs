//! Deterministic pattern analysis used whenever the LLM cannot answer.
//!
//! Produces the same `{findings, confidence}` shape as a model response so
//! that confidence stays defined with no network at all. Confidence grows
//! with the number of findings: `min(0.9, 0.6 + 0.1n)` for security and
//! `min(0.85, 0.6 + 0.08n)` for logic, where a clean snippet still counts
//! its single `no_issues` finding.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tribunal_core::{CodeSnippet, Finding, FindingSeverity};

use crate::assessor::{Assessment, AssessmentRequest, AssessmentSource, Focus, SpecialistLlm};

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid fallback regex")
}

const SQL: &str = "(?:SELECT|INSERT|UPDATE|DELETE|DROP)";

static SQL_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (
            re(&format!(r#"(?i)f["'].*{SQL}.*\{{"#)),
            "f-string SQL query with variable interpolation",
        ),
        (
            re(&format!(r"(?i){SQL}.*\+\s*\w+")),
            "String concatenation in SQL query",
        ),
        (
            re(&format!(r"(?i){SQL}.*%s")),
            "String formatting in SQL query (possible injection)",
        ),
        (
            re(&format!(r"(?i){SQL}.*\.format\(")),
            ".format() used in SQL query",
        ),
        (
            re(r#"(?i)execute\s*\(\s*f["']"#),
            "Direct execution of f-string SQL query",
        ),
    ]
});

static SECRET_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (
            re(r#"(?i)(?:password|passwd|pwd)\s*=\s*["'][^"']+["']"#),
            "Hardcoded password detected",
        ),
        (
            re(r#"(?i)(?:api_key|apikey|secret_key|secret)\s*=\s*["'][^"']+["']"#),
            "Hardcoded API key/secret detected",
        ),
        (
            re(r#"(?i)(?:token|auth_token)\s*=\s*["'][^"']+["']"#),
            "Hardcoded authentication token detected",
        ),
    ]
});

static EVAL: Lazy<Regex> = Lazy::new(|| re(r"\beval\s*\("));
static EXEC: Lazy<Regex> = Lazy::new(|| re(r"\bexec\s*\("));
static PICKLE: Lazy<Regex> = Lazy::new(|| re(r"pickle\.loads?\s*\("));
static YAML: Lazy<Regex> = Lazy::new(|| re(r"yaml\.(?:load|unsafe_load)\s*\("));
static OPEN_CONCAT: Lazy<Regex> = Lazy::new(|| re(r#"open\s*\(.*(?:\+|f["'])"#));
static REQUEST_INPUT: Lazy<Regex> = Lazy::new(|| re(r"request\.(?:args|form|json|data|files)"));
static VALIDATION: Lazy<Regex> =
    Lazy::new(|| re(r"(?:validate|sanitize|check|verify|isinstance|int\(|float\()"));
static COMMAND: Lazy<Regex> =
    Lazy::new(|| re(r"(?:os\.system|subprocess\.(?:call|run|Popen))\s*\("));

static ALWAYS_TRUE_LOOP: Lazy<Regex> = Lazy::new(|| {
    re(r"(?m)while\s+True\s*:|while\s*\(\s*(?:true|1)\s*\)|for\s*\(\s*;\s*;\s*\)|^\s*loop\s*\{")
});
static BREAK: Lazy<Regex> = Lazy::new(|| re(r"\bbreak\b"));
static WHILE_VAR: Lazy<Regex> = Lazy::new(|| re(r"while\s+(\w+)\s*:"));
static RANGE_PAST_END: Lazy<Regex> = Lazy::new(|| re(r"range\(\s*len\(.*?\)\s*\+\s*1\s*\)"));
static INDEX_AT_LEN: Lazy<Regex> = Lazy::new(|| re(r"\[\s*len\(.*?\)\s*\]"));
static DEF_PARAMS: Lazy<Regex> = Lazy::new(|| re(r"def\s+\w+\s*\(([^)]*)\)\s*:"));
static NONE_CHECK: Lazy<Regex> =
    Lazy::new(|| re(r"if\s+(?:not\s+)?\w+\s+is\s+(?:not\s+)?None|if\s+\w+\s*:"));
static DIVISION: Lazy<Regex> = Lazy::new(|| re(r"(?:^|[^/*])/\s*[A-Za-z_]\w*"));
static NONZERO_GUARD: Lazy<Regex> = Lazy::new(|| re(r"if\s+.*!=\s*0|if\s+.*>\s*0"));
static LITERAL_EQ: Lazy<Regex> = Lazy::new(|| re(r"==\s*(?:True|False|None)\b"));
static FUNCTION_NAME: Lazy<Regex> =
    Lazy::new(|| re(r"(?m)^\s*(?:def|fn|function|func)\s+(\w+)\s*\("));
static BASE_CASE: Lazy<Regex> =
    Lazy::new(|| re(r"\bif\b[^\n]*[:{)]\s*\n\s*return\b|\bif\b[^\n]*\breturn\b"));

const TERMINATORS: [&str; 5] = ["break", "return", "continue", "raise", "sys.exit()"];

/// Regex-based stand-in for the LLM.
///
/// # Examples
///
/// ```
/// use tribunal_core::{CodeSnippet, FindingSeverity};
/// use tribunal_review::assessor::Focus;
/// use tribunal_review::fallback::PatternFallback;
///
/// let snippet = CodeSnippet::new("app.py", 7, 7, "result = eval(expr)", "function calc", 1.0, ["eval"]).unwrap();
/// let (findings, confidence) = PatternFallback.analyze(Focus::Security, &snippet);
/// assert_eq!(findings[0].kind, "code_execution");
/// assert_eq!(findings[0].severity, FindingSeverity::Critical);
/// assert_eq!(findings[0].line_number, Some(7));
/// assert!((confidence - 0.7).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternFallback;

impl PatternFallback {
    pub fn analyze(&self, focus: Focus, snippet: &CodeSnippet) -> (Vec<Finding>, f64) {
        let mut findings = match focus {
            Focus::Security => security_findings(snippet.content()),
            Focus::Logic => logic_findings(snippet.content()),
        };
        if findings.is_empty() {
            let description = match focus {
                Focus::Security => {
                    "No obvious security vulnerabilities detected in this code snippet"
                }
                Focus::Logic => "No obvious logic issues detected in this code snippet",
            };
            findings.push(Finding::new("no_issues", FindingSeverity::Info, description));
        }

        let n = findings.len() as f64;
        let confidence = match focus {
            Focus::Security => (0.6 + 0.1 * n).min(0.9),
            Focus::Logic => (0.6 + 0.08 * n).min(0.85),
        };

        let findings = findings
            .into_iter()
            .map(|mut f| {
                // Offsets are relative to the snippet.
                f.line_number = f.line_number.map(|offset| snippet.start_line() + offset);
                f
            })
            .collect();
        (findings, confidence)
    }
}

#[async_trait]
impl SpecialistLlm for PatternFallback {
    async fn assess(&self, request: &AssessmentRequest) -> Assessment {
        let (findings, confidence) = self.analyze(request.focus, &request.snippet);
        Assessment {
            findings,
            confidence,
            source: AssessmentSource::Fallback,
        }
    }
}

/// 0-based line of `offset` in `code`.
fn line_of(code: &str, offset: usize) -> u32 {
    code[..offset].matches('\n').count() as u32
}

fn line_text(code: &str, offset: usize) -> String {
    let start = code[..offset].rfind('\n').map_or(0, |i| i + 1);
    let end = code[offset..].find('\n').map_or(code.len(), |i| offset + i);
    code[start..end].trim().chars().take(100).collect()
}

/// A finding anchored at the first match of `regex`, if any.
fn first_hit(
    regex: &Regex,
    code: &str,
    kind: &str,
    severity: FindingSeverity,
    description: &str,
) -> Option<Finding> {
    regex.find(code).map(|m| {
        let mut f = Finding::new(kind, severity, description)
            .with_evidence(line_text(code, m.start()));
        f.line_number = Some(line_of(code, m.start()));
        f
    })
}

fn first_of(
    patterns: &[(Regex, &'static str)],
    code: &str,
    kind: &str,
    severity: FindingSeverity,
    prefix: &str,
) -> Option<Finding> {
    patterns.iter().find_map(|(regex, desc)| {
        first_hit(regex, code, kind, severity, &format!("{prefix}: {desc}"))
    })
}

fn security_findings(code: &str) -> Vec<Finding> {
    use FindingSeverity::*;

    let mut findings = Vec::new();
    findings.extend(first_of(
        &SQL_PATTERNS,
        code,
        "sql_injection",
        Critical,
        "SQL Injection Risk",
    ));
    findings.extend(first_hit(
        &EVAL,
        code,
        "code_execution",
        Critical,
        "Dangerous code execution: eval() can execute arbitrary code from user input",
    ));
    findings.extend(first_hit(
        &EXEC,
        code,
        "code_execution",
        Critical,
        "Dangerous code execution: exec() can execute arbitrary statements",
    ));
    findings.extend(first_hit(
        &PICKLE,
        code,
        "insecure_deserialization",
        High,
        "Insecure deserialization: pickle.load() can execute arbitrary code from untrusted data",
    ));
    findings.extend(first_hit(
        &YAML,
        code,
        "insecure_deserialization",
        High,
        "Insecure YAML deserialization: yaml.load() without a safe loader can execute arbitrary code",
    ));
    findings.extend(first_hit(
        &OPEN_CONCAT,
        code,
        "path_traversal",
        High,
        "Path traversal risk: file path constructed from variable input without sanitization",
    ));
    findings.extend(first_of(
        &SECRET_PATTERNS,
        code,
        "hardcoded_secret",
        High,
        "Security risk",
    ));
    if !VALIDATION.is_match(&code.to_lowercase()) {
        findings.extend(first_hit(
            &REQUEST_INPUT,
            code,
            "input_validation",
            Medium,
            "Missing input validation: user input from request is used without sanitization",
        ));
    }
    findings.extend(first_hit(
        &COMMAND,
        code,
        "command_injection",
        Critical,
        "Command injection risk: system command execution with potential user input",
    ));
    findings
}

fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

fn at_line(mut finding: Finding, line: usize) -> Finding {
    finding.line_number = Some(line as u32);
    finding
}

fn logic_findings(code: &str) -> Vec<Finding> {
    use FindingSeverity::*;

    let mut findings = Vec::new();
    let lines: Vec<&str> = code.lines().collect();

    if let Some(m) = ALWAYS_TRUE_LOOP.find(code) {
        let finding = if BREAK.is_match(code) {
            Finding::new(
                "conditional_infinite_loop",
                Medium,
                "Always-true loop with a conditional break; it loops forever if the break condition is never met",
            )
        } else {
            Finding::new(
                "infinite_loop",
                High,
                "Unconditional always-true loop without any break statement; it never terminates",
            )
        };
        findings.push(at_line(finding, line_of(code, m.start()) as usize));
    }

    for caps in WHILE_VAR.captures_iter(code) {
        let var = &caps[1];
        if var == "True" || var == "False" {
            continue;
        }
        let assigned = Regex::new(&format!(r"\b{}\s*[-+*/]?=[^=]", regex::escape(var)))
            .map(|r| r.is_match(code))
            .unwrap_or(true);
        if !assigned {
            let start = caps.get(0).map_or(0, |m| m.start());
            findings.push(at_line(
                Finding::new(
                    "potential_infinite_loop",
                    Medium,
                    format!(
                        "Loop variable '{var}' may not be modified inside the loop body, risking infinite iteration"
                    ),
                ),
                line_of(code, start) as usize,
            ));
        }
    }

    if let Some(finding) = unreachable_code(&lines) {
        findings.push(finding);
    }

    findings.extend(first_hit(
        &RANGE_PAST_END,
        code,
        "off_by_one",
        Medium,
        "Potential off-by-one error: range(len(x) + 1) iterates one past the last valid index",
    ));
    findings.extend(first_hit(
        &INDEX_AT_LEN,
        code,
        "off_by_one",
        High,
        "Index out of bounds: index len(x) is one past the last valid index",
    ));

    if let Some(caps) = DEF_PARAMS.captures(code) {
        let params = caps[1].trim();
        let required = !params.is_empty() && params != "self" && !params.contains('=');
        if required && !NONE_CHECK.is_match(code) {
            findings.push(at_line(
                Finding::new(
                    "missing_null_check",
                    Low,
                    "Function parameters are not checked for None/empty values, which may cause unexpected errors",
                ),
                line_of(code, caps.get(0).map_or(0, |m| m.start())) as usize,
            ));
        }
    }

    if !NONZERO_GUARD.is_match(code) {
        let division = lines.iter().position(|line| {
            let t = line.trim_start();
            !t.starts_with('#')
                && !t.starts_with("//")
                && !line.contains("import")
                && !line.contains("://")
                && DIVISION.is_match(line)
        });
        if let Some(idx) = division {
            findings.push(
                at_line(
                    Finding::new(
                        "division_by_zero",
                        Medium,
                        "Potential division by zero: divisor variable is not checked before division",
                    ),
                    idx,
                )
                .with_evidence(lines[idx].trim().chars().take(100).collect::<String>()),
            );
        }
    }

    findings.extend(first_hit(
        &LITERAL_EQ,
        code,
        "incorrect_comparison",
        Low,
        "Consider using 'is' instead of '==' for comparing with True/False/None",
    ));

    if let Some((idx, width)) = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| (i, indent_width(l)))
        .max_by_key(|&(i, w)| (w, std::cmp::Reverse(i)))
    {
        let levels = width / 4;
        if levels >= 4 {
            findings.push(at_line(
                Finding::new(
                    "deep_nesting",
                    Medium,
                    format!("Deeply nested code ({levels} levels); consider refactoring to reduce complexity"),
                ),
                idx,
            ));
        }
    }

    if !BASE_CASE.is_match(code) {
        for caps in FUNCTION_NAME.captures_iter(code) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let call = Regex::new(&format!(r"\b{}\s*\(", regex::escape(name.as_str())));
            let recursive = call
                .map(|r| r.is_match(&code[whole.end()..]))
                .unwrap_or(false);
            if recursive {
                findings.push(at_line(
                    Finding::new(
                        "recursion_risk",
                        High,
                        format!(
                            "Recursive function '{}' may lack a proper base case, risking stack overflow",
                            name.as_str()
                        ),
                    ),
                    line_of(code, whole.start()) as usize,
                ));
            }
        }
    }

    findings
}

/// Code following a terminator at the same or deeper indentation, within the
/// next few non-blank lines. Reported once.
fn unreachable_code(lines: &[&str]) -> Option<Finding> {
    for (i, line) in lines.iter().enumerate() {
        let stripped = line.trim().trim_end_matches(';');
        let Some(keyword) = TERMINATORS
            .iter()
            .find(|t| stripped == **t || stripped.starts_with(&format!("{t} ")))
        else {
            continue;
        };
        let indent = indent_width(line);
        let next = lines
            .iter()
            .enumerate()
            .skip(i + 1)
            .take(4)
            .find(|(_, l)| {
                let t = l.trim();
                !t.is_empty() && !t.starts_with('#') && !t.starts_with("//")
            });
        if let Some((j, next_line)) = next {
            let t = next_line.trim();
            if indent_width(next_line) >= indent && !t.starts_with('}') && !is_block_label(t) {
                return Some(at_line(
                    Finding::new(
                        "unreachable_code",
                        FindingSeverity::Medium,
                        format!(
                            "Code after '{keyword}' statement at this indentation level may be unreachable"
                        ),
                    ),
                    j,
                ));
            }
        }
    }
    None
}

/// Lines that open a sibling branch rather than continue the block.
fn is_block_label(line: &str) -> bool {
    ["else", "elif", "except", "finally", "case", "default"]
        .iter()
        .any(|kw| line.starts_with(kw))
}
