//! Identifier normalization

/// Words the engine refuses as binding identifiers, including strict mode
const RESERVED_WORDS: &[&str] = &[
    "arguments", "await", "break", "case", "catch", "class", "const", "continue", "debugger",
    "default", "delete", "do", "else", "enum", "eval", "export", "extends", "false", "finally",
    "for", "function", "if", "implements", "import", "in", "instanceof", "interface", "let",
    "new", "null", "package", "private", "protected", "public", "return", "static", "super",
    "switch", "this", "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

/// Derive a program identifier from a script name
///
/// Lowercases, replaces anything outside `[a-z0-9_]` with `_`, prefixes
/// a leading digit with `_` and suffixes reserved words with `_`.
pub fn normalize_ident(name: &str) -> String {
    let mut ident: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();

    if ident.is_empty() {
        ident.push_str("script");
    } else if ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    } else if RESERVED_WORDS.contains(&ident.as_str()) {
        ident.push('_');
    }
    ident
}
