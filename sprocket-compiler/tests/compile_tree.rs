//! Integration tests for script tree compilation

use std::collections::HashMap;
use std::sync::Arc;

use sprocket_compiler::{CompileError, SourceCompiler};
use sprocket_core::script::RAW_SOURCE_PARAM;
use sprocket_core::{ParamDef, ParamType, ScriptDefinition, ScriptNode, ScriptRegistry};

#[derive(Default)]
struct TestRegistry {
    defs: HashMap<String, Arc<ScriptDefinition>>,
}

impl TestRegistry {
    fn with(mut self, def: ScriptDefinition) -> Self {
        self.defs.insert(def.name.clone(), Arc::new(def));
        self
    }
}

impl ScriptRegistry for TestRegistry {
    fn get(&self, name: &str) -> Option<Arc<ScriptDefinition>> {
        self.defs.get(name).cloned()
    }

    fn names(&self) -> Vec<String> {
        self.defs.keys().cloned().collect()
    }
}

fn registry() -> TestRegistry {
    TestRegistry::default()
        .with(
            ScriptDefinition::new("Copy File")
                .with_title("Copy file")
                .with_param(ParamDef::new("from", ParamType::Text).with_title("Source path").required())
                .with_param(ParamDef::new("overwrite", ParamType::Checkbox))
                .with_body("copy(from, overwrite);"),
        )
        .with(ScriptDefinition::raw_source("source"))
        .with(ScriptDefinition::new("main").with_body("%body%"))
}

#[test]
fn test_shared_definition_is_emitted_once() {
    let reg = registry();
    let compiler = SourceCompiler::new(&reg);

    let node = ScriptNode::new("Copy File")
        .with_value("from", "/tmp/a")
        .with_value("overwrite", "1");
    let text = compiler.compile(&[node.clone(), node]).unwrap();

    assert_eq!(text.matches("function copy_file(").count(), 1);
    assert_eq!(text.matches("copy_file(\"/tmp/a\", true);").count(), 2);
}

#[test]
fn test_raw_sources_are_never_merged() {
    let reg = registry();
    let compiler = SourceCompiler::new(&reg);

    let raw = ScriptNode::new("source").with_value(RAW_SOURCE_PARAM, "let x = 1;");
    let text = compiler.compile(&[raw.clone(), raw]).unwrap();

    assert!(text.contains("function source_1() {"));
    assert!(text.contains("function source_2() {"));
    assert!(text.contains("    source_1();\n    source_2();\n"));
}

#[test]
fn test_required_field_failure_names_field() {
    let reg = registry();
    let compiler = SourceCompiler::new(&reg);

    let tree = vec![ScriptNode::new("main")
        .with_child(ScriptNode::new("Copy File").with_value("from", "   "))];
    let err = compiler.compile(&tree).unwrap_err();

    assert_eq!(
        err,
        CompileError::MissingRequired {
            field: "Source path".to_string(),
            script: "Copy file".to_string(),
        }
    );
    assert!(err.to_string().contains("Source path"));
}

#[test]
fn test_unknown_script_fails() {
    let reg = registry();
    let compiler = SourceCompiler::new(&reg);

    let err = compiler.compile(&[ScriptNode::new("missing")]).unwrap_err();
    assert_eq!(err.to_string(), "unknown script missing");
}

#[test]
fn test_disabled_subtree_is_not_resolved() {
    let reg = registry();
    let compiler = SourceCompiler::new(&reg);

    let tree = vec![
        ScriptNode::new("missing").disabled(),
        ScriptNode::new("main").with_child(ScriptNode::new("also-missing").disabled()),
    ];
    let text = compiler.compile(&tree).unwrap();
    assert!(text.contains("    main();\n"));
}

#[test]
fn test_output_follows_tree_order() {
    let reg = registry();
    let compiler = SourceCompiler::new(&reg);

    let tree = vec![
        ScriptNode::new("main").with_child(ScriptNode::new("source").with_value(RAW_SOURCE_PARAM, "a();")),
        ScriptNode::new("Copy File").with_value("from", "x"),
    ];
    let first = compiler.compile(&tree).unwrap();
    let second = compiler.compile(&tree).unwrap();
    assert_eq!(first, second);

    let source_at = first.find("function source_1(").unwrap();
    let main_at = first.find("function main(").unwrap();
    let copy_at = first.find("function copy_file(").unwrap();
    assert!(source_at < main_at && main_at < copy_at);
}

#[test]
fn test_reserved_word_names_are_escaped() {
    let reg = TestRegistry::default().with(
        ScriptDefinition::new("Delete")
            .with_param(ParamDef::new("default", ParamType::Text))
            .with_body("return default_;"),
    );
    let compiler = SourceCompiler::new(&reg);

    let text = compiler
        .compile(&[ScriptNode::new("Delete").with_value("default", "x")])
        .unwrap();
    assert!(text.contains("function delete_(default_) {"));
    assert!(text.contains("    delete_(\"x\");\n"));
}

#[test]
fn test_non_finite_number_is_rejected() {
    let reg = TestRegistry::default().with(
        ScriptDefinition::new("wait").with_param(ParamDef::new("secs", ParamType::Number)),
    );
    let compiler = SourceCompiler::new(&reg);

    let err = compiler
        .compile(&[ScriptNode::new("wait").with_value("secs", "inf")])
        .unwrap_err();
    assert!(matches!(err, CompileError::InvalidValue { .. }));
}
