//! Integration test: load → parse → extract → select on this crate's own sources
//! and on a small mixed-language tree on disk.

use std::fs;
use std::path::Path;

use tribunal_core::QualityConfig;
use tribunal_ir::block::BlockType;
use tribunal_ir::selectors::{LogicSelector, QualitySelector, SecurityReason, SecuritySelector};
use tribunal_ir::source::{FsSource, Language};

#[test]
fn end_to_end_on_own_sources() {
    let src = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
    let source = FsSource::new(&src, 10 * 1024 * 1024);
    let codebase = tribunal_ir::analyze_source(&source, &QualityConfig::default()).unwrap();

    let rust_files = codebase.features.languages.get(&Language::Rust).copied();
    assert!(rust_files.unwrap_or(0) >= 7, "{:?}", codebase.features.languages);
    assert_eq!(codebase.features.unparsed_files, 0);

    let names: Vec<&str> = codebase.blocks().map(|b| b.name()).collect();
    assert!(names.contains(&"extract_blocks"), "missing extract_blocks");
    assert!(names.contains(&"CodeBlock"), "missing CodeBlock");

    // The extractor walks with explicit stacks; `while let` loops are present.
    assert!(codebase.features.loop_count > 0);
    assert!(codebase.features.quality.function_count > 20);
}

#[test]
fn mixed_tree_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("app")).unwrap();
    fs::write(
        dir.path().join("app/handlers.py"),
        "import os\n\
         \n\
         def run(cmd):\n\
         \x20   if cmd:\n\
         \x20       os.system(cmd)\n\
         \n\
         def lookup(db, name):\n\
         \x20   if name:\n\
         \x20       return db.execute(\"SELECT * FROM users WHERE name = '\" + name + \"'\")\n\
         \x20   return None\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("app/tree.js"),
        "function depth(node) {\n\
         \x20 if (!node) return 0;\n\
         \x20 return 1 + Math.max(depth(node.left), depth(node.right));\n\
         }\n",
    )
    .unwrap();
    fs::write(dir.path().join("notes.txt"), "plain text\n").unwrap();

    let source = FsSource::new(dir.path(), 1024 * 1024);
    let codebase = tribunal_ir::analyze_source(&source, &QualityConfig::default()).unwrap();
    assert_eq!(codebase.features.file_count, 3);
    assert_eq!(codebase.features.unparsed_files, 1);
    assert!(codebase.features.security_signals.has_exec);
    assert!(codebase.features.security_signals.has_sql_strings);

    let py = codebase
        .files
        .iter()
        .find(|f| f.file.path == "app/handlers.py")
        .unwrap();
    let picks = SecuritySelector::select(&py.blocks);
    let reasons: Vec<_> = picks.iter().map(|p| (p.block.name(), p.reason)).collect();
    assert_eq!(
        reasons,
        vec![
            ("run", SecurityReason::DangerousExecution),
            ("lookup", SecurityReason::SqlUsage),
        ]
    );

    let js = codebase
        .files
        .iter()
        .find(|f| f.file.path == "app/tree.js")
        .unwrap();
    let logic = LogicSelector::select(&js.blocks);
    assert_eq!(logic.len(), 1);
    assert_eq!(logic[0].name(), "depth");
    assert!(logic[0].metadata().is_recursive);

    let metrics = QualitySelector::metrics(&py.blocks);
    assert_eq!(metrics.function_count, 2);
    assert!(py
        .blocks
        .iter()
        .all(|b| b.block_type() == BlockType::Function));
}
