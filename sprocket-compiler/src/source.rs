//! Tree to program text compilation

use std::collections::{HashMap, HashSet};

use sprocket_core::script::{BODY_PLACEHOLDER, INLINE_FUNCTION_PARAM, RAW_SOURCE_PARAM};
use sprocket_core::{ScriptDefinition, ScriptNode, ScriptRegistry};
use tracing::{debug, trace};

use crate::binding::{bind_params, BoundValue};
use crate::error::CompileError;
use crate::ident::normalize_ident;

const INDENT: &str = "    ";

/// Accumulated output of one compilation
#[derive(Debug, Default)]
pub struct GeneratedSource {
    /// Emitted function identifiers
    linked: HashSet<String>,
    /// (base identifier, body) to the identifier it was emitted under
    bodies: HashMap<(String, String), String>,
    /// Rendered function definitions in emission order
    functions: Vec<String>,
    /// Raw fragments shared as free functions
    free_functions: Vec<String>,
    /// Suffix counter for raw sources and divergent bodies
    counter: usize,
}

impl GeneratedSource {
    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn is_linked(&self, ident: &str) -> bool {
        self.linked.contains(ident)
    }

    fn next_ident(&mut self, base: &str) -> String {
        loop {
            self.counter += 1;
            let candidate = format!("{}_{}", base, self.counter);
            if !self.linked.contains(&candidate) {
                return candidate;
            }
        }
    }

    fn link(&mut self, ident: &str, params: &[String], body: &str) {
        self.linked.insert(ident.to_string());
        self.functions.push(render_function(ident, params, body));
    }

    /// Return the identifier for a template body, emitting it on first use
    fn link_template(&mut self, base: &str, params: &[String], body: String) -> String {
        let key = (base.to_string(), body);
        if let Some(ident) = self.bodies.get(&key) {
            trace!("Reusing linked function {}", ident);
            return ident.clone();
        }

        let ident = if self.linked.contains(base) {
            self.next_ident(base)
        } else {
            base.to_string()
        };
        self.link(&ident, params, &key.1);
        self.bodies.insert(key, ident.clone());
        ident
    }

    /// Emit a raw-source body under a fresh identifier
    fn link_raw(&mut self, base: &str, body: &str) -> String {
        let ident = self.next_ident(base);
        self.link(&ident, &[], body);
        ident
    }

    /// Concatenate free functions, linked functions and the run block
    pub fn render(&self, calls: &[String]) -> String {
        let mut sections: Vec<String> = Vec::new();
        sections.extend(self.free_functions.iter().cloned());
        sections.extend(self.functions.iter().cloned());

        let mut run = String::from("(function run() {\n");
        for call in calls {
            run.push_str(INDENT);
            run.push_str(call);
            run.push('\n');
        }
        run.push_str("})();\n");
        sections.push(run);

        sections.join("\n")
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                format!("{}{}", INDENT, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_function(ident: &str, params: &[String], body: &str) -> String {
    let body = indent(body.trim_matches('\n'));
    if body.is_empty() {
        format!("function {}({}) {{\n}}\n", ident, params.join(", "))
    } else {
        format!("function {}({}) {{\n{}\n}}\n", ident, params.join(", "), body)
    }
}

/// Compiles script trees against a registry of definitions
pub struct SourceCompiler<'a> {
    registry: &'a dyn ScriptRegistry,
}

impl<'a> SourceCompiler<'a> {
    pub fn new(registry: &'a dyn ScriptRegistry) -> Self {
        Self { registry }
    }

    /// Compile a forest into program text
    pub fn compile(&self, tree: &[ScriptNode]) -> Result<String, CompileError> {
        let mut generated = GeneratedSource::default();
        let calls = self.compile_nodes(tree, &mut generated)?;

        debug!(
            "Compiled {} top-level nodes into {} functions",
            calls.len(),
            generated.function_count()
        );
        Ok(generated.render(&calls))
    }

    fn compile_nodes(
        &self,
        nodes: &[ScriptNode],
        generated: &mut GeneratedSource,
    ) -> Result<Vec<String>, CompileError> {
        let mut calls = Vec::with_capacity(nodes.len());
        for node in nodes {
            if let Some(call) = self.compile_node(node, generated)? {
                calls.push(call);
            }
        }
        Ok(calls)
    }

    /// Compile one node, returning its call site
    fn compile_node(
        &self,
        node: &ScriptNode,
        generated: &mut GeneratedSource,
    ) -> Result<Option<String>, CompileError> {
        if node.disabled {
            trace!("Skipping disabled node {}", node.name);
            return Ok(None);
        }

        let def = self
            .registry
            .get(&node.name)
            .ok_or_else(|| CompileError::UnknownScript(node.name.clone()))?;
        let bound = bind_params(&def, node)?;

        if def.is_raw_source() && is_inline(node, &bound) {
            // An inline function has no call site to nest children under
            if !node.children.is_empty() {
                debug!(
                    "Skipping {} children of inline function {}",
                    node.children.len(),
                    def.name
                );
            }
            generated.free_functions.push(format!("{}\n", raw_code(node, &bound).trim_end()));
            return Ok(None);
        }

        let children = self.compile_nodes(&node.children, generated)?.join("\n");

        if def.is_raw_source() {
            return Ok(Some(compile_raw(&def, node, &bound, &children, generated)));
        }

        let base = normalize_ident(&def.name);
        let params: Vec<String> = bound.iter().map(|(name, _)| normalize_ident(name)).collect();
        let body = def.body.replace(BODY_PLACEHOLDER, &children);
        let ident = generated.link_template(&base, &params, body);

        let args: Vec<String> = bound.iter().map(|(_, value)| value.render()).collect();
        Ok(Some(format!("{}({});", ident, args.join(", "))))
    }
}

fn find_bound<'b>(bound: &'b [(String, BoundValue)], key: &str) -> Option<&'b BoundValue> {
    bound.iter().find(|(name, _)| name == key).map(|(_, value)| value)
}

/// Code of a raw-source node
///
/// Definitions loaded without declared params still carry raw values.
fn raw_code(node: &ScriptNode, bound: &[(String, BoundValue)]) -> String {
    match find_bound(bound, RAW_SOURCE_PARAM) {
        Some(value) => value.as_text().to_string(),
        None => node.value(RAW_SOURCE_PARAM).unwrap_or_default().trim().to_string(),
    }
}

fn is_inline(node: &ScriptNode, bound: &[(String, BoundValue)]) -> bool {
    match find_bound(bound, INLINE_FUNCTION_PARAM) {
        Some(value) => value.as_bool(),
        None => node
            .value(INLINE_FUNCTION_PARAM)
            .map(|v| matches!(v.trim(), "1" | "true"))
            .unwrap_or(false),
    }
}

fn compile_raw(
    def: &ScriptDefinition,
    node: &ScriptNode,
    bound: &[(String, BoundValue)],
    children: &str,
    generated: &mut GeneratedSource,
) -> String {
    let code = raw_code(node, bound);
    let body = if code.contains(BODY_PLACEHOLDER) {
        code.replace(BODY_PLACEHOLDER, children)
    } else if children.is_empty() {
        code
    } else {
        format!("{}\n{}", code, children)
    };
    let ident = generated.link_raw(&normalize_ident(&def.name), &body);
    format!("{}();", ident)
}
