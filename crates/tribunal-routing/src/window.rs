//! Bounded snippet windows and enclosing-scope lookup.

use once_cell::sync::Lazy;
use regex::Regex;

/// Scope label when no declaration is found within the lookback.
pub const GLOBAL_SCOPE: &str = "global scope";

/// A contiguous, size-bounded range of lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    /// 1-indexed, inclusive.
    pub start_line: u32,
    pub end_line: u32,
    pub content: String,
}

#[derive(Clone, Copy)]
enum Side {
    Up,
    Down,
}

/// Grow a window around `trigger` (1-indexed) one line at a time, alternating
/// above and below, until the next line would push the content past
/// `max_chars` characters. A trigger line that is already too long is cut at
/// `max_chars`.
///
/// Returns `None` for empty input.
///
/// # Examples
///
/// ```
/// use tribunal_routing::window::expand_window;
///
/// let lines = ["a", "bb", "TRIGGER", "cc", "d"];
/// let w = expand_window(&lines, 3, 13).unwrap();
/// assert_eq!((w.start_line, w.end_line), (2, 4));
/// assert_eq!(w.content, "bb\nTRIGGER\ncc");
/// ```
pub fn expand_window(lines: &[&str], trigger: u32, max_chars: usize) -> Option<Window> {
    if lines.is_empty() {
        return None;
    }
    let idx = (trigger.max(1) as usize - 1).min(lines.len() - 1);
    let (mut lo, mut hi) = (idx, idx);
    let mut len = lines[idx].chars().count();
    let mut prefer_up = true;

    loop {
        let side = match (lo > 0, hi + 1 < lines.len()) {
            (false, false) => break,
            (true, false) => Side::Up,
            (false, true) => Side::Down,
            (true, true) if prefer_up => Side::Up,
            (true, true) => Side::Down,
        };
        let candidate = match side {
            Side::Up => lines[lo - 1],
            Side::Down => lines[hi + 1],
        };
        // +1 for the joining newline.
        let cost = candidate.chars().count() + 1;
        if len + cost > max_chars {
            break;
        }
        len += cost;
        match side {
            Side::Up => lo -= 1,
            Side::Down => hi += 1,
        }
        prefer_up = !prefer_up;
    }

    let mut content = lines[lo..=hi].join("\n");
    if len > max_chars {
        content = content.chars().take(max_chars).collect();
    }

    Some(Window {
        start_line: lo as u32 + 1,
        end_line: hi as u32 + 1,
        content,
    })
}

static DECLARATIONS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (
            r"^\s*(?:(?:export|default|abstract|public|private|protected|final|static|sealed)\s+)*(?:class|interface)\s+(\w+)",
            "class",
        ),
        (r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum|trait|union)\s+(\w+)", "class"),
        (r"^\s*(?:async\s+)?def\s+(\w+)", "function"),
        (r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*(\w+)", "function"),
        (
            r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+\S+\s+)?fn\s+(\w+)",
            "function",
        ),
        (r"^\s*func\s+(?:\([^)]*\)\s*)?(\w+)", "function"),
        (
            r"^\s*(?:(?:public|private|protected|static|final|synchronized|abstract|native)\s+)+[\w<>\[\],.?\s]+?\s+(\w+)\s*\(",
            "function",
        ),
    ]
    .into_iter()
    .map(|(pattern, label)| (Regex::new(pattern).expect("valid declaration regex"), label))
    .collect()
});

/// Nearest function or class declaration at or above `line` (1-indexed),
/// looking back at most `lookback` lines, e.g. `"function parse"`.
/// Falls back to [`GLOBAL_SCOPE`].
///
/// # Examples
///
/// ```
/// use tribunal_routing::window::enclosing_scope;
///
/// let lines = ["class Repo:", "    def find(self, id):", "        return id"];
/// assert_eq!(enclosing_scope(&lines, 3, 20), "function find");
/// assert_eq!(enclosing_scope(&lines, 1, 20), "class Repo");
/// assert_eq!(enclosing_scope(&["x = 1"], 1, 20), "global scope");
/// ```
pub fn enclosing_scope(lines: &[&str], line: u32, lookback: usize) -> String {
    if lines.is_empty() {
        return GLOBAL_SCOPE.to_string();
    }
    let end = (line.max(1) as usize).min(lines.len());
    let start = end.saturating_sub(lookback);
    lines[start..end]
        .iter()
        .rev()
        .find_map(|text| {
            DECLARATIONS.iter().find_map(|(re, label)| {
                re.captures(text)
                    .and_then(|c| c.get(1))
                    .map(|name| format!("{label} {}", name.as_str()))
            })
        })
        .unwrap_or_else(|| GLOBAL_SCOPE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_has_no_window() {
        assert!(expand_window(&[], 1, 100).is_none());
    }

    #[test]
    fn window_alternates_starting_upward() {
        let lines = ["1", "2", "3", "4", "5", "6", "7"];
        // Each line costs 2 chars after the first: 1 + 2 + 2 = 5.
        let w = expand_window(&lines, 4, 5).unwrap();
        assert_eq!((w.start_line, w.end_line), (3, 5));
        let w = expand_window(&lines, 4, 7).unwrap();
        assert_eq!((w.start_line, w.end_line), (2, 5));
    }

    #[test]
    fn window_grows_one_way_at_file_edges() {
        let lines = ["a", "b", "c", "d"];
        let w = expand_window(&lines, 1, 100).unwrap();
        assert_eq!((w.start_line, w.end_line), (1, 4));
        assert_eq!(w.content, "a\nb\nc\nd");
        let w = expand_window(&lines, 4, 5).unwrap();
        assert_eq!((w.start_line, w.end_line), (2, 4));
    }

    #[test]
    fn window_stops_at_first_line_that_does_not_fit() {
        let long = "x".repeat(50);
        let lines = ["short", long.as_str(), "hit", "tail"];
        let w = expand_window(&lines, 3, 20).unwrap();
        // The line above is too long, so growth stops there even though
        // the line below would fit.
        assert_eq!((w.start_line, w.end_line), (3, 3));
        assert_eq!(w.content, "hit");
    }

    #[test]
    fn oversized_trigger_line_is_truncated_on_char_boundary() {
        let long = "é".repeat(600);
        let lines = [long.as_str()];
        let w = expand_window(&lines, 1, 500).unwrap();
        assert_eq!(w.content.chars().count(), 500);
        assert_eq!((w.start_line, w.end_line), (1, 1));
    }

    #[test]
    fn out_of_range_trigger_is_clamped() {
        let lines = ["a", "b"];
        let w = expand_window(&lines, 99, 1).unwrap();
        assert_eq!(w.start_line, 2);
        let w = expand_window(&lines, 0, 1).unwrap();
        assert_eq!(w.start_line, 1);
    }

    #[test]
    fn scope_prefers_nearest_declaration() {
        let lines = [
            "class Outer:",
            "    def first(self):",
            "        pass",
            "    def second(self):",
            "        x = 1",
        ];
        assert_eq!(enclosing_scope(&lines, 5, 20), "function second");
    }

    #[test]
    fn scope_respects_lookback() {
        let mut lines = vec!["def far():"];
        lines.extend(std::iter::repeat("    x += 1").take(25));
        assert_eq!(enclosing_scope(&lines, 26, 20), GLOBAL_SCOPE);
        assert_eq!(enclosing_scope(&lines, 15, 20), "function far");
    }

    #[test]
    fn scope_recognises_other_languages() {
        assert_eq!(
            enclosing_scope(&["pub async fn load(path: &Path) {"], 1, 20),
            "function load"
        );
        assert_eq!(
            enclosing_scope(&["func (s *Server) Serve() error {"], 1, 20),
            "function Serve"
        );
        assert_eq!(
            enclosing_scope(&["export async function handler(req) {"], 1, 20),
            "function handler"
        );
        assert_eq!(
            enclosing_scope(&["    public static List<String> names(int n) {"], 1, 20),
            "function names"
        );
        assert_eq!(
            enclosing_scope(&["public final class Vault {"], 1, 20),
            "class Vault"
        );
        assert_eq!(enclosing_scope(&["pub struct Point {"], 1, 20), "class Point");
    }
}
