//! Per-language node-kind tables driving block extraction.
//!
//! Each supported grammar gets one static [`LanguageSpec`]. Adding a language
//! means adding a table here and a grammar in [`Language::tree_sitter_language`].

use crate::block::SecurityFlag;
use crate::source::Language;

use Shape::{Class, Function, TypeDef};

/// How a block-introducing node kind is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Function,
    Class,
    TypeDef,
    Loop(LoopRule),
}

/// How to decide whether a loop never terminates on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopRule {
    /// The `condition` field is a literal true.
    Condition,
    /// C-style `for`: infinite when the condition clause is absent or empty.
    CStyle,
    /// Go `for`: bare `for {}`, an empty `for_clause` condition, or `for true`.
    GoFor,
    /// Always infinite (Rust `loop`).
    Always,
    /// Never infinite (iterator loops).
    Never,
}

#[derive(Debug, Clone, Copy)]
pub struct BlockRule {
    pub kind: &'static str,
    pub shape: Shape,
    /// Only a block when this field is present (e.g. `struct` with a body).
    pub requires_field: Option<&'static str>,
}

const fn block(kind: &'static str, shape: Shape) -> BlockRule {
    BlockRule {
        kind,
        shape,
        requires_field: None,
    }
}

const fn block_with(kind: &'static str, shape: Shape, field: &'static str) -> BlockRule {
    BlockRule {
        kind,
        shape,
        requires_field: Some(field),
    }
}

/// A node that adds one to cyclomatic complexity.
#[derive(Debug, Clone, Copy)]
pub struct BranchRule {
    pub kind: &'static str,
    /// Required kind of the first child (`case` for switch labels, so
    /// `default` does not count).
    pub leading: Option<&'static str>,
}

const fn branch(kind: &'static str) -> BranchRule {
    BranchRule {
        kind,
        leading: None,
    }
}

const fn branch_led(kind: &'static str, leading: &'static str) -> BranchRule {
    BranchRule {
        kind,
        leading: Some(leading),
    }
}

/// A binary node that is a branch only for the listed operator tokens.
#[derive(Debug, Clone, Copy)]
pub struct LogicalRule {
    pub kind: &'static str,
    /// Empty means every node of `kind` counts.
    pub operators: &'static [&'static str],
}

/// Where a call node keeps the name of what it calls.
#[derive(Debug, Clone, Copy)]
pub enum Callee {
    /// Text of the child held under this field.
    Field(&'static str),
    /// Text from the start of the node up to its `arguments` child.
    BeforeArguments,
}

#[derive(Debug, Clone, Copy)]
pub struct CallRule {
    pub kind: &'static str,
    pub callee: Callee,
    /// Object construction rather than a call; never counts as recursion.
    pub constructor: bool,
}

const fn call(kind: &'static str, callee: Callee) -> CallRule {
    CallRule {
        kind,
        callee,
        constructor: false,
    }
}

const fn construct(kind: &'static str, callee: Callee) -> CallRule {
    CallRule {
        kind,
        callee,
        constructor: true,
    }
}

/// How a dangerous-call pattern is compared with a callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMatch {
    /// Callee equals the pattern.
    Exact,
    /// Callee equals the pattern or ends with `.pattern`, `::pattern` or `->pattern`.
    Qualified,
}

#[derive(Debug, Clone, Copy)]
pub struct DangerRule {
    pub pattern: &'static str,
    pub matching: CallMatch,
    pub flag: SecurityFlag,
}

const fn exact(pattern: &'static str, flag: SecurityFlag) -> DangerRule {
    DangerRule {
        pattern,
        matching: CallMatch::Exact,
        flag,
    }
}

const fn qualified(pattern: &'static str, flag: SecurityFlag) -> DangerRule {
    DangerRule {
        pattern,
        matching: CallMatch::Qualified,
        flag,
    }
}

impl DangerRule {
    /// Whether `callee` (whitespace already removed) hits this rule.
    pub fn matches(&self, callee: &str) -> bool {
        if callee == self.pattern {
            return true;
        }
        if self.matching == CallMatch::Exact {
            return false;
        }
        let Some(prefix) = callee.strip_suffix(self.pattern) else {
            return false;
        };
        prefix.ends_with('.') || prefix.ends_with("::") || prefix.ends_with("->")
    }
}

/// Extraction tables for one language.
#[derive(Debug)]
pub struct LanguageSpec {
    pub language: Language,
    pub blocks: &'static [BlockRule],
    pub branches: &'static [BranchRule],
    pub logical: &'static [LogicalRule],
    pub calls: &'static [CallRule],
    pub strings: &'static [&'static str],
    pub true_literals: &'static [&'static str],
    pub dangerous_calls: &'static [DangerRule],
}

impl LanguageSpec {
    pub fn block_rule(&self, kind: &str) -> Option<&BlockRule> {
        self.blocks.iter().find(|r| r.kind == kind)
    }

    /// Function, class and type bodies own their contents.
    pub fn is_scope_boundary(&self, kind: &str) -> bool {
        self.blocks
            .iter()
            .any(|r| r.kind == kind && !matches!(r.shape, Shape::Loop(_)))
    }

    pub fn call_rule(&self, kind: &str) -> Option<&CallRule> {
        self.calls.iter().find(|r| r.kind == kind)
    }

    pub fn is_string(&self, kind: &str) -> bool {
        self.strings.contains(&kind)
    }

    pub fn is_true_literal(&self, text: &str) -> bool {
        self.true_literals.contains(&text)
    }

    /// Every flag raised by calling `callee`.
    pub fn flags_for_call<'a>(
        &'a self,
        callee: &'a str,
    ) -> impl Iterator<Item = SecurityFlag> + 'a {
        self.dangerous_calls
            .iter()
            .filter(move |r| r.matches(callee))
            .map(|r| r.flag)
    }
}

/// SQL statement starters, matched upper-cased inside string literals.
pub const SQL_KEYWORDS: &[&str] = &[
    "SELECT ", "INSERT ", "UPDATE ", "DELETE ", "DROP ", "CREATE ",
];

/// Credential words, matched lower-cased inside string literals.
pub const SECRET_TERMS: &[&str] = &["password", "secret", "apikey", "api_key", "token"];

/// Tables for `language`, or `None` when it has no grammar.
///
/// # Examples
///
/// ```
/// use tribunal_ir::languages::spec_for;
/// use tribunal_ir::source::Language;
///
/// let python = spec_for(Language::Python).unwrap();
/// assert!(python.block_rule("function_definition").is_some());
/// assert!(spec_for(Language::Unknown).is_none());
/// ```
pub fn spec_for(language: Language) -> Option<&'static LanguageSpec> {
    match language {
        Language::Python => Some(&PYTHON),
        Language::JavaScript => Some(&JAVASCRIPT),
        Language::TypeScript => Some(&TYPESCRIPT),
        Language::Java => Some(&JAVA),
        Language::Go => Some(&GO),
        Language::Rust => Some(&RUST),
        Language::C => Some(&C_LANG),
        Language::Cpp => Some(&CPP),
        Language::Unknown => None,
    }
}

const AND_OR: &[&str] = &["&&", "||"];

static PYTHON: LanguageSpec = LanguageSpec {
    language: Language::Python,
    blocks: &[
        block("function_definition", Function),
        block("class_definition", Class),
        block("while_statement", Shape::Loop(LoopRule::Condition)),
        block("for_statement", Shape::Loop(LoopRule::Never)),
    ],
    branches: &[
        branch("if_statement"),
        branch("elif_clause"),
        branch("for_statement"),
        branch("while_statement"),
        branch("except_clause"),
        branch("except_group_clause"),
        branch("conditional_expression"),
        branch("case_clause"),
    ],
    logical: &[LogicalRule {
        kind: "boolean_operator",
        operators: &[],
    }],
    calls: &[call("call", Callee::Field("function"))],
    strings: &["string"],
    true_literals: &["True", "1"],
    dangerous_calls: &[
        exact("eval", SecurityFlag::Eval),
        exact("exec", SecurityFlag::Exec),
        exact("compile", SecurityFlag::DynamicFunction),
        qualified("os.system", SecurityFlag::Exec),
        qualified("os.popen", SecurityFlag::Exec),
        qualified("subprocess.call", SecurityFlag::Exec),
        qualified("subprocess.run", SecurityFlag::Exec),
        qualified("subprocess.Popen", SecurityFlag::Exec),
        qualified("subprocess.check_call", SecurityFlag::Exec),
        qualified("subprocess.check_output", SecurityFlag::Exec),
        qualified("pickle.load", SecurityFlag::Exec),
        qualified("pickle.loads", SecurityFlag::Exec),
        qualified("marshal.loads", SecurityFlag::Exec),
        qualified("yaml.load", SecurityFlag::Exec),
        exact("getattr", SecurityFlag::Reflection),
        exact("__import__", SecurityFlag::Reflection),
        qualified("importlib.import_module", SecurityFlag::Reflection),
    ],
};

const JS_BLOCKS: [BlockRule; 11] = [
    block("function_declaration", Function),
    block("function_expression", Function),
    block("function", Function),
    block("generator_function_declaration", Function),
    block("arrow_function", Function),
    block("method_definition", Function),
    block("class_declaration", Class),
    block("class", Class),
    block("for_statement", Shape::Loop(LoopRule::CStyle)),
    block("while_statement", Shape::Loop(LoopRule::Condition)),
    block("do_statement", Shape::Loop(LoopRule::Condition)),
];

const JS_BRANCHES: &[BranchRule] = &[
    branch("if_statement"),
    branch("for_statement"),
    branch("for_in_statement"),
    branch("while_statement"),
    branch("do_statement"),
    branch("catch_clause"),
    branch("ternary_expression"),
    branch("switch_case"),
];

const JS_CALLS: &[CallRule] = &[
    call("call_expression", Callee::Field("function")),
    construct("new_expression", Callee::Field("constructor")),
];

const JS_DANGER: &[DangerRule] = &[
    exact("eval", SecurityFlag::Eval),
    qualified("Function", SecurityFlag::DynamicFunction),
    exact("exec", SecurityFlag::Exec),
    exact("execSync", SecurityFlag::Exec),
    qualified("child_process.exec", SecurityFlag::Exec),
    qualified("child_process.execSync", SecurityFlag::Exec),
    qualified("child_process.spawn", SecurityFlag::Exec),
    qualified("execFile", SecurityFlag::Exec),
    qualified("vm.runInNewContext", SecurityFlag::Eval),
    qualified("vm.runInThisContext", SecurityFlag::Eval),
    qualified("Reflect.apply", SecurityFlag::Reflection),
];

static JAVASCRIPT: LanguageSpec = LanguageSpec {
    language: Language::JavaScript,
    blocks: &JS_BLOCKS,
    branches: JS_BRANCHES,
    logical: &[LogicalRule {
        kind: "binary_expression",
        operators: AND_OR,
    }],
    calls: JS_CALLS,
    strings: &["string", "template_string"],
    true_literals: &["true"],
    dangerous_calls: JS_DANGER,
};

static TYPESCRIPT: LanguageSpec = LanguageSpec {
    language: Language::TypeScript,
    blocks: &[
        JS_BLOCKS[0],
        JS_BLOCKS[1],
        JS_BLOCKS[2],
        JS_BLOCKS[3],
        JS_BLOCKS[4],
        JS_BLOCKS[5],
        JS_BLOCKS[6],
        JS_BLOCKS[7],
        JS_BLOCKS[8],
        JS_BLOCKS[9],
        JS_BLOCKS[10],
        block("abstract_class_declaration", Class),
        block("interface_declaration", TypeDef),
        block("type_alias_declaration", TypeDef),
        block("enum_declaration", TypeDef),
    ],
    branches: JS_BRANCHES,
    logical: &[LogicalRule {
        kind: "binary_expression",
        operators: AND_OR,
    }],
    calls: JS_CALLS,
    strings: &["string", "template_string"],
    true_literals: &["true"],
    dangerous_calls: JS_DANGER,
};

static JAVA: LanguageSpec = LanguageSpec {
    language: Language::Java,
    blocks: &[
        block("method_declaration", Function),
        block("constructor_declaration", Function),
        block("class_declaration", Class),
        block("interface_declaration", Class),
        block("enum_declaration", Class),
        block("record_declaration", Class),
        block("for_statement", Shape::Loop(LoopRule::CStyle)),
        block("enhanced_for_statement", Shape::Loop(LoopRule::Never)),
        block("while_statement", Shape::Loop(LoopRule::Condition)),
        block("do_statement", Shape::Loop(LoopRule::Condition)),
    ],
    branches: &[
        branch("if_statement"),
        branch("for_statement"),
        branch("enhanced_for_statement"),
        branch("while_statement"),
        branch("do_statement"),
        branch("catch_clause"),
        branch("ternary_expression"),
        branch_led("switch_label", "case"),
    ],
    logical: &[LogicalRule {
        kind: "binary_expression",
        operators: AND_OR,
    }],
    calls: &[
        call("method_invocation", Callee::BeforeArguments),
        construct("object_creation_expression", Callee::Field("type")),
    ],
    strings: &["string_literal"],
    true_literals: &["true"],
    dangerous_calls: &[
        qualified("exec", SecurityFlag::Exec),
        exact("ProcessBuilder", SecurityFlag::Exec),
        qualified("Class.forName", SecurityFlag::Reflection),
        qualified("invoke", SecurityFlag::Reflection),
        qualified("getDeclaredMethod", SecurityFlag::Reflection),
        qualified("createStatement", SecurityFlag::SqlStrings),
        qualified("prepareStatement", SecurityFlag::SqlStrings),
        qualified("prepareCall", SecurityFlag::SqlStrings),
        qualified("executeQuery", SecurityFlag::SqlStrings),
        qualified("executeUpdate", SecurityFlag::SqlStrings),
    ],
};

static GO: LanguageSpec = LanguageSpec {
    language: Language::Go,
    blocks: &[
        block("function_declaration", Function),
        block("method_declaration", Function),
        block("func_literal", Function),
        block("type_spec", TypeDef),
        block("for_statement", Shape::Loop(LoopRule::GoFor)),
    ],
    branches: &[
        branch("if_statement"),
        branch("for_statement"),
        branch("expression_case"),
        branch("type_case"),
        branch("communication_case"),
    ],
    logical: &[LogicalRule {
        kind: "binary_expression",
        operators: AND_OR,
    }],
    calls: &[call("call_expression", Callee::Field("function"))],
    strings: &["interpreted_string_literal", "raw_string_literal"],
    true_literals: &["true"],
    dangerous_calls: &[
        qualified("exec.Command", SecurityFlag::Exec),
        qualified("exec.CommandContext", SecurityFlag::Exec),
        qualified("syscall.Exec", SecurityFlag::Exec),
        qualified("reflect.ValueOf", SecurityFlag::Reflection),
        qualified("MethodByName", SecurityFlag::Reflection),
        qualified("plugin.Open", SecurityFlag::DynamicFunction),
    ],
};

static RUST: LanguageSpec = LanguageSpec {
    language: Language::Rust,
    blocks: &[
        block("function_item", Function),
        block("closure_expression", Function),
        block("impl_item", Class),
        block("trait_item", Class),
        block("struct_item", TypeDef),
        block("enum_item", TypeDef),
        block("union_item", TypeDef),
        block("type_item", TypeDef),
        block("loop_expression", Shape::Loop(LoopRule::Always)),
        block("while_expression", Shape::Loop(LoopRule::Condition)),
        block("for_expression", Shape::Loop(LoopRule::Never)),
    ],
    branches: &[
        branch("if_expression"),
        branch("while_expression"),
        branch("for_expression"),
        branch("match_arm"),
    ],
    logical: &[LogicalRule {
        kind: "binary_expression",
        operators: AND_OR,
    }],
    calls: &[call("call_expression", Callee::Field("function"))],
    strings: &["string_literal", "raw_string_literal"],
    true_literals: &["true"],
    dangerous_calls: &[
        qualified("Command::new", SecurityFlag::Exec),
        qualified("Library::new", SecurityFlag::Reflection),
    ],
};

const C_BRANCHES: [BranchRule; 6] = [
    branch("if_statement"),
    branch("for_statement"),
    branch("while_statement"),
    branch("do_statement"),
    branch_led("case_statement", "case"),
    branch("conditional_expression"),
];

const C_DANGER: [DangerRule; 10] = [
    exact("system", SecurityFlag::Exec),
    exact("popen", SecurityFlag::Exec),
    exact("execl", SecurityFlag::Exec),
    exact("execlp", SecurityFlag::Exec),
    exact("execle", SecurityFlag::Exec),
    exact("execv", SecurityFlag::Exec),
    exact("execvp", SecurityFlag::Exec),
    exact("execve", SecurityFlag::Exec),
    exact("dlopen", SecurityFlag::Reflection),
    exact("dlsym", SecurityFlag::Reflection),
];

static C_LANG: LanguageSpec = LanguageSpec {
    language: Language::C,
    blocks: &[
        block("function_definition", Function),
        block_with("struct_specifier", TypeDef, "body"),
        block_with("union_specifier", TypeDef, "body"),
        block_with("enum_specifier", TypeDef, "body"),
        block("for_statement", Shape::Loop(LoopRule::CStyle)),
        block("while_statement", Shape::Loop(LoopRule::Condition)),
        block("do_statement", Shape::Loop(LoopRule::Condition)),
    ],
    branches: &C_BRANCHES,
    logical: &[LogicalRule {
        kind: "binary_expression",
        operators: AND_OR,
    }],
    calls: &[call("call_expression", Callee::Field("function"))],
    strings: &["string_literal"],
    true_literals: &["true", "1"],
    dangerous_calls: &C_DANGER,
};

static CPP: LanguageSpec = LanguageSpec {
    language: Language::Cpp,
    blocks: &[
        block("function_definition", Function),
        block("lambda_expression", Function),
        block_with("class_specifier", Class, "body"),
        block_with("struct_specifier", TypeDef, "body"),
        block_with("union_specifier", TypeDef, "body"),
        block_with("enum_specifier", TypeDef, "body"),
        block("for_statement", Shape::Loop(LoopRule::CStyle)),
        block("for_range_loop", Shape::Loop(LoopRule::Never)),
        block("while_statement", Shape::Loop(LoopRule::Condition)),
        block("do_statement", Shape::Loop(LoopRule::Condition)),
    ],
    branches: &[
        C_BRANCHES[0],
        C_BRANCHES[1],
        C_BRANCHES[2],
        C_BRANCHES[3],
        C_BRANCHES[4],
        C_BRANCHES[5],
        branch("for_range_loop"),
        branch("catch_clause"),
    ],
    logical: &[LogicalRule {
        kind: "binary_expression",
        operators: AND_OR,
    }],
    calls: &[
        call("call_expression", Callee::Field("function")),
        construct("new_expression", Callee::Field("type")),
    ],
    strings: &["string_literal", "raw_string_literal"],
    true_literals: &["true", "1"],
    dangerous_calls: &[
        C_DANGER[0],
        C_DANGER[1],
        C_DANGER[2],
        C_DANGER[3],
        C_DANGER[4],
        C_DANGER[5],
        C_DANGER[6],
        C_DANGER[7],
        C_DANGER[8],
        C_DANGER[9],
        qualified("std::system", SecurityFlag::Exec),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_patterns_match_namespaced_callees() {
        let rule = qualified("os.system", SecurityFlag::Exec);
        assert!(rule.matches("os.system"));
        assert!(rule.matches("self.os.system"));
        assert!(!rule.matches("myos.system"));

        let rule = qualified("Command::new", SecurityFlag::Exec);
        assert!(rule.matches("std::process::Command::new"));
        assert!(rule.matches("Command::new"));
    }

    #[test]
    fn exact_patterns_ignore_members() {
        let rule = exact("exec", SecurityFlag::Exec);
        assert!(rule.matches("exec"));
        assert!(!rule.matches("pattern.exec"));
    }

    #[test]
    fn java_exec_chain_is_dangerous() {
        let flags: Vec<_> = JAVA.flags_for_call("Runtime.getRuntime().exec").collect();
        assert_eq!(flags, vec![SecurityFlag::Exec]);
        let flags: Vec<_> = JAVA.flags_for_call("conn.prepareStatement").collect();
        assert_eq!(flags, vec![SecurityFlag::SqlStrings]);
    }

    #[test]
    fn every_language_with_grammar_has_tables() {
        for lang in [
            Language::Python,
            Language::JavaScript,
            Language::TypeScript,
            Language::Java,
            Language::Go,
            Language::Rust,
            Language::C,
            Language::Cpp,
        ] {
            let spec = spec_for(lang).unwrap();
            assert_eq!(spec.language, lang);
            assert!(lang.tree_sitter_language().is_some());
            assert!(!spec.blocks.is_empty());
        }
    }

    #[test]
    fn loops_are_not_scope_boundaries() {
        assert!(PYTHON.is_scope_boundary("function_definition"));
        assert!(PYTHON.is_scope_boundary("class_definition"));
        assert!(!PYTHON.is_scope_boundary("while_statement"));
    }
}
