use serde::Deserialize;
use serde_json::Value;
use tribunal_core::{CodeSnippet, Finding, FindingSeverity, TribunalError};

use crate::assessor::{AssessmentRequest, Focus};

const SECURITY_SYSTEM_PROMPT: &str = "\
You are Tribunal's security specialist. You see one bounded snippet of a \
codebase at a time and assess it for SECURITY RISKS ONLY.

Identify:
1. SQL injection risks
2. Authentication/authorization issues
3. Input validation gaps
4. Cryptographic weaknesses
5. Code execution vulnerabilities

Rules:
- Only report issues visible in the snippet
- Do not comment on style, naming or general logic
- If the snippet is clean, return an empty findings list

Respond with a JSON object:
{
  \"findings\": [
    {
      \"type\": \"sql_injection\",
      \"severity\": \"critical\" | \"high\" | \"medium\" | \"low\" | \"info\",
      \"description\": \"Clear explanation of the risk\",
      \"line\": 42
    }
  ],
  \"confidence\": 0.0-1.0
}";

const LOGIC_SYSTEM_PROMPT: &str = "\
You are Tribunal's logic specialist. You see one bounded snippet of a \
codebase at a time and assess it for LOGIC CORRECTNESS ONLY.

Check for:
1. Infinite loops
2. Unreachable code
3. Logic contradictions
4. Off-by-one errors
5. Incorrect conditionals
6. Missing edge case handling

Do NOT check security or code quality.

Respond with a JSON object:
{
  \"findings\": [
    {
      \"type\": \"off_by_one\",
      \"severity\": \"critical\" | \"high\" | \"medium\" | \"low\" | \"info\",
      \"description\": \"Clear explanation of the defect\",
      \"line\": 42
    }
  ],
  \"confidence\": 0.0-1.0
}";

/// System prompt for one specialist focus.
///
/// # Examples
///
/// ```
/// use tribunal_review::assessor::Focus;
/// use tribunal_review::prompt::system_prompt;
///
/// assert!(system_prompt(Focus::Security).contains("SECURITY RISKS ONLY"));
/// assert!(system_prompt(Focus::Logic).contains("Do NOT check security"));
/// ```
pub fn system_prompt(focus: Focus) -> &'static str {
    match focus {
        Focus::Security => SECURITY_SYSTEM_PROMPT,
        Focus::Logic => LOGIC_SYSTEM_PROMPT,
    }
}

/// User prompt for a single snippet: location, scope, tags, the curated
/// features and the code itself.
pub fn build_assessment_prompt(request: &AssessmentRequest) -> String {
    let snippet = &request.snippet;
    let tags: Vec<&str> = match request.focus {
        Focus::Security => snippet.tags().iter().map(String::as_str).collect(),
        // Logic only needs the structural hints.
        Focus::Logic => snippet
            .tags()
            .iter()
            .map(String::as_str)
            .filter(|t| {
                t.starts_with("nesting")
                    || t.starts_with("complexity")
                    || *t == "loop"
                    || *t == "recursion"
                    || *t == "infinite_loop"
            })
            .collect(),
    };

    let mut prompt = format!(
        "Location: {}\nContext: {}\nTags: {}\n",
        snippet.location(),
        snippet.context(),
        tags.join(", ")
    );
    if !request.features.is_null() {
        prompt.push_str(&format!("Codebase signals: {}\n", request.features));
    }
    prompt.push_str(&format!("\nCode:\n```\n{}\n```\n", snippet.content()));
    prompt
}

#[derive(Deserialize)]
struct RawAssessment {
    findings: Vec<RawFinding>,
    confidence: Option<Value>,
}

#[derive(Deserialize)]
struct RawFinding {
    #[serde(default, rename = "type", alias = "issue")]
    kind: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default, alias = "message")]
    description: Option<String>,
    #[serde(default)]
    line: Option<Value>,
}

/// Parse a specialist response into findings and a confidence.
///
/// Markdown fences are stripped. If the remainder is not JSON, the first
/// balanced `{...}` object is tried. Entries without a description or with
/// an unrecognised severity are dropped. A numeric `line` is kept only when
/// it falls inside the snippet. Textual `line` values become evidence.
/// Confidence is clamped to `[0, 1]`; a missing one becomes
/// `default_confidence`.
///
/// # Errors
///
/// Returns [`TribunalError::Llm`] when no JSON object can be recovered or it
/// has no `findings` array.
///
/// # Examples
///
/// ```
/// use tribunal_core::CodeSnippet;
/// use tribunal_review::prompt::parse_assessment;
///
/// let snippet = CodeSnippet::new("a.py", 10, 14, "eval(x)", "function run", 1.0, ["eval"]).unwrap();
/// let text = "```json\n{\"findings\":[{\"type\":\"code_execution\",\"severity\":\"critical\",\"description\":\"eval on input\",\"line\":11}],\"confidence\":0.9}\n```";
/// let (findings, confidence) = parse_assessment(text, &snippet, 0.7).unwrap();
/// assert_eq!(findings[0].line_number, Some(11));
/// assert_eq!(confidence, 0.9);
/// ```
pub fn parse_assessment(
    response: &str,
    snippet: &CodeSnippet,
    default_confidence: f64,
) -> Result<(Vec<Finding>, f64), TribunalError> {
    let cleaned = strip_code_fences(response);
    let parsed: RawAssessment = match serde_json::from_str(cleaned) {
        Ok(parsed) => parsed,
        Err(direct) => {
            let object = first_json_object(cleaned).ok_or_else(|| {
                TribunalError::Llm(format!("response is not a JSON object: {direct}"))
            })?;
            serde_json::from_str(object)
                .map_err(|e| TribunalError::Llm(format!("malformed assessment: {e}")))?
        }
    };

    let mut findings = Vec::new();
    for raw in parsed.findings {
        let Some(description) = raw.description.filter(|d| !d.trim().is_empty()) else {
            continue;
        };
        let severity: FindingSeverity = match raw.severity.as_deref().unwrap_or("low").parse()
        {
            Ok(s) => s,
            Err(_) => continue,
        };
        let kind = raw
            .kind
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(|| "unspecified".to_string());

        let mut finding = Finding::new(kind, severity, description);
        match raw.line {
            Some(Value::Number(n)) => {
                if let Some(line) = n.as_u64().and_then(|l| u32::try_from(l).ok()) {
                    if (snippet.start_line()..=snippet.end_line()).contains(&line) {
                        finding.line_number = Some(line);
                    }
                }
            }
            Some(Value::String(text)) if !text.trim().is_empty() => {
                finding.evidence = Some(text.trim().chars().take(100).collect());
            }
            _ => {}
        }
        findings.push(finding);
    }

    let confidence = match parsed.confidence {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(default_confidence),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(default_confidence),
        _ => default_confidence,
    };
    let confidence = if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        default_confidence
    };

    Ok((findings, confidence))
}

fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line, e.g. ```json.
    let body = match rest.find('\n') {
        Some(nl) if rest[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => &rest[nl + 1..],
        _ => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// The first balanced `{...}` in `s`, ignoring braces inside JSON strings.
fn first_json_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in s[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snippet() -> CodeSnippet {
        CodeSnippet::new(
            "svc/db.py",
            20,
            30,
            "cursor.execute(q)",
            "function load",
            0.9,
            ["sql", "nesting_2"],
        )
        .unwrap()
    }

    #[test]
    fn prompts_carry_location_and_code() {
        let request = AssessmentRequest {
            focus: Focus::Security,
            snippet: snippet(),
            features: serde_json::json!({"has_sql": true}),
        };
        let prompt = build_assessment_prompt(&request);
        assert!(prompt.contains("Location: svc/db.py:20-30"));
        assert!(prompt.contains("Context: function load"));
        assert!(prompt.contains("cursor.execute(q)"));
        assert!(prompt.contains("\"has_sql\":true"));
        assert!(prompt.contains("sql"));
    }

    #[test]
    fn logic_prompt_hides_security_tags() {
        let request = AssessmentRequest {
            focus: Focus::Logic,
            snippet: snippet(),
            features: Value::Null,
        };
        let prompt = build_assessment_prompt(&request);
        assert!(prompt.contains("Tags: nesting_2\n"));
        assert!(!prompt.contains("Codebase signals"));
    }

    #[test]
    fn plain_json_parses() {
        let text = r#"{"findings":[{"type":"sql_injection","severity":"high","description":"concatenated query"}],"confidence":0.8}"#;
        let (findings, confidence) = parse_assessment(text, &snippet(), 0.7).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, "sql_injection");
        assert_eq!(findings[0].severity, FindingSeverity::High);
        assert_eq!(confidence, 0.8);
    }

    #[test]
    fn json_embedded_in_prose_is_recovered() {
        let text = "Here is my analysis:\n{\"findings\": [{\"issue\": \"off_by_one\", \"severity\": \"medium\", \"description\": \"loop runs past end {oops}\"}]}\nThanks!";
        let (findings, confidence) = parse_assessment(text, &snippet(), 0.6).unwrap();
        assert_eq!(findings[0].kind, "off_by_one");
        assert_eq!(findings[0].description, "loop runs past end {oops}");
        assert_eq!(confidence, 0.6);
    }

    #[test]
    fn invalid_entries_are_dropped() {
        let text = r#"{"findings":[
            {"type":"a","severity":"catastrophic","description":"x"},
            {"type":"b","severity":"low"},
            {"type":"c","severity":"warning","description":"kept"}
        ],"confidence":3.5}"#;
        let (findings, confidence) = parse_assessment(text, &snippet(), 0.7).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, "c");
        assert_eq!(findings[0].severity, FindingSeverity::Medium);
        assert_eq!(confidence, 1.0);
    }

    #[test]
    fn line_outside_snippet_is_ignored_and_text_becomes_evidence() {
        let text = r#"{"findings":[
            {"type":"a","severity":"low","description":"x","line":5},
            {"type":"b","severity":"low","description":"y","line":"cursor.execute(q)"}
        ]}"#;
        let (findings, _) = parse_assessment(text, &snippet(), 0.7).unwrap();
        assert_eq!(findings[0].line_number, None);
        assert_eq!(findings[1].evidence.as_deref(), Some("cursor.execute(q)"));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_assessment("I cannot help with that.", &snippet(), 0.7).is_err());
        assert!(parse_assessment(r#"{"confidence": 0.9}"#, &snippet(), 0.7).is_err());
    }

    #[test]
    fn fences_with_language_tag_are_stripped() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {} "), "{}");
    }

    #[test]
    fn balanced_object_skips_braces_in_strings() {
        let s = r#"noise {"a": "}", "b": {"c": 1}} tail }"#;
        assert_eq!(first_json_object(s), Some(r#"{"a": "}", "b": {"c": 1}}"#));
        assert_eq!(first_json_object("{ unterminated"), None);
    }
}
