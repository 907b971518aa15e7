//! Routing over a repository on disk: bounds and cross-specialist isolation.

use std::fs;

use tribunal_core::{QualityConfig, RoutingConfig};
use tribunal_ir::source::FsSource;
use tribunal_routing::RoutingPolicy;

fn write(dir: &std::path::Path, name: &str, content: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

#[test]
fn isolation_and_bounds_hold_on_a_mixed_repo() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    for i in 0..4 {
        write(
            root,
            &format!("auth/login{i}.py"),
            &format!(
                "def login{i}(user, password):\n    if user:\n        q = \"SELECT * FROM users WHERE name = '\" + user + \"'\"\n        return eval(q)\n"
            ),
        );
    }
    let mut nested = String::from("def plan(items):\n");
    for i in 0..6 {
        nested.push_str(&format!("    if items[{i}]:\n        items[{i}] -= 1\n"));
    }
    nested.push_str("    return items\n");
    write(root, "core/plan.py", &nested);
    write(
        root,
        "core/walk.go",
        "package core\n\nfunc Walk(n int) int {\n\tif n == 0 {\n\t\treturn 0\n\t}\n\treturn Walk(n - 1)\n}\n",
    );

    let source = FsSource::new(root, 1024 * 1024);
    let codebase = tribunal_ir::analyze_source(&source, &QualityConfig::default()).unwrap();
    let config = RoutingConfig::default();
    let routed = RoutingPolicy::new(config.clone()).route(&codebase);

    let security = routed.security.snippets();
    assert_eq!(security.len(), 4);
    assert!(security.iter().all(|s| s.filename().starts_with("auth/")));
    assert!(security
        .iter()
        .all(|s| s.content().chars().count() <= config.max_snippet_chars));

    let logic = routed.logic.snippets();
    assert!(logic.len() <= config.max_snippets_per_agent);
    let logic_files: Vec<_> = logic.iter().map(|s| s.filename()).collect();
    assert_eq!(logic_files, vec!["core/walk.go", "core/plan.py"]);
    for s in logic {
        let lower = s.content().to_lowercase();
        for kw in &config.security_file_keywords {
            assert!(!lower.contains(kw.as_str()), "{kw} leaked into {}", s.location());
        }
    }

    assert_eq!(routed.quality.features().metrics.function_count, 6);
}
