//! Script definitions and the node trees that reference them

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Placeholder in a body template that receives the compiled children
pub const BODY_PLACEHOLDER: &str = "%body%";

/// Parameter of a raw-source definition that carries its code
pub const RAW_SOURCE_PARAM: &str = "source";

/// Parameter of a raw-source node that marks it as a shared free function
pub const INLINE_FUNCTION_PARAM: &str = "inline_function";

/// Type tag of a script parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Checkbox,
    #[default]
    Text,
    Textarea,
    Number,
    Select,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::Checkbox => "checkbox",
            ParamType::Text => "text",
            ParamType::Textarea => "textarea",
            ParamType::Number => "number",
            ParamType::Select => "select",
        }
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, ParamType::Checkbox)
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A typed parameter declared by a script definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDef {
    /// Parameter name, used as the key in node values
    pub name: String,

    /// Human-readable title used in error messages
    #[serde(default)]
    pub title: String,

    #[serde(rename = "type", default)]
    pub kind: ParamType,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub default: Option<String>,
}

impl ParamDef {
    pub fn new(name: impl Into<String>, kind: ParamType) -> Self {
        let name = name.into();
        Self {
            title: name.clone(),
            name,
            kind,
            required: false,
            default: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Title for diagnostics, falling back to the name
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            &self.name
        } else {
            &self.title
        }
    }
}

/// How a definition is turned into program text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
    /// Body template compiled once per tree and shared by call sites
    #[default]
    Template,
    /// User-written code, re-emitted for every node
    RawSource,
}

/// A reusable named template with typed parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptDefinition {
    pub name: String,

    /// Title, also the localization key for run titles
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub kind: ScriptKind,

    #[serde(default)]
    pub params: Vec<ParamDef>,

    /// Body template; `%body%` receives the compiled children
    #[serde(default = "default_body")]
    pub body: String,

    /// Nodes making up the content of a top-level script
    #[serde(default)]
    pub tree: Vec<ScriptNode>,

    /// Localized titles keyed by language
    #[serde(default)]
    pub titles: BTreeMap<String, String>,

    /// Script may be used inside trees but not started on its own
    #[serde(default)]
    pub unrunnable: bool,

    /// Role required to run the script, if any
    #[serde(default)]
    pub role: Option<String>,
}

fn default_body() -> String {
    BODY_PLACEHOLDER.to_string()
}

impl ScriptDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            title: name.clone(),
            name,
            kind: ScriptKind::Template,
            params: Vec::new(),
            body: default_body(),
            tree: Vec::new(),
            titles: BTreeMap::new(),
            unrunnable: false,
            role: None,
        }
    }

    /// A raw-source definition taking its code from the `source` parameter
    pub fn raw_source(name: impl Into<String>) -> Self {
        let mut def = Self::new(name);
        def.kind = ScriptKind::RawSource;
        def.params = vec![
            ParamDef::new(RAW_SOURCE_PARAM, ParamType::Textarea),
            ParamDef::new(INLINE_FUNCTION_PARAM, ParamType::Checkbox),
        ];
        def
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_param(mut self, param: ParamDef) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_tree(mut self, tree: Vec<ScriptNode>) -> Self {
        self.tree = tree;
        self
    }

    pub fn with_localized_title(mut self, lang: impl Into<String>, title: impl Into<String>) -> Self {
        self.titles.insert(lang.into(), title.into());
        self
    }

    pub fn unrunnable(mut self) -> Self {
        self.unrunnable = true;
        self
    }

    pub fn is_raw_source(&self) -> bool {
        self.kind == ScriptKind::RawSource
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            &self.name
        } else {
            &self.title
        }
    }
}

/// A bound reference to a script definition inside a tree
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScriptNode {
    /// Name of the referenced definition
    pub name: String,

    /// Raw values keyed by parameter name
    #[serde(default)]
    pub values: BTreeMap<String, String>,

    #[serde(default)]
    pub children: Vec<ScriptNode>,

    #[serde(default)]
    pub disabled: bool,
}

impl ScriptNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: ScriptNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: Vec<ScriptNode>) -> Self {
        self.children = children;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}
