//! Naming Utilities
//!
//! Case conversion shared by every backend, plus per-language keyword escaping.
//! Words split on `_`, `-`, spaces, lower-to-upper transitions and the end of
//! an acronym (`HTTPServer` -> `HTTP`, `Server`).

/// Target languages with reserved words
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Cpp,
    TypeScript,
    Protobuf,
}

/// Split an identifier into words
pub fn split_words(s: &str) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' || c == ' ' || c == '.' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_ascii_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).map(|n| n.is_ascii_lowercase()).unwrap_or(false);
            if prev.is_ascii_lowercase() || prev.is_ascii_digit() || (prev.is_ascii_uppercase() && next_lower) {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn capitalize(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Convert string to PascalCase
pub fn to_pascal_case(s: &str) -> String {
    split_words(s).iter().map(|w| capitalize(w)).collect()
}

/// Convert string to camelCase
pub fn to_camel_case(s: &str) -> String {
    let words = split_words(s);
    let mut result = String::with_capacity(s.len());
    for (i, word) in words.iter().enumerate() {
        if i == 0 {
            result.push_str(&word.to_ascii_lowercase());
        } else {
            result.push_str(&capitalize(word));
        }
    }
    result
}

/// Convert string to snake_case
pub fn to_snake_case(s: &str) -> String {
    split_words(s).iter().map(|w| w.to_ascii_lowercase()).collect::<Vec<_>>().join("_")
}

/// Convert string to SCREAMING_SNAKE_CASE
pub fn to_screaming_snake(s: &str) -> String {
    to_snake_case(s).to_ascii_uppercase()
}

/// Escape a reserved word by appending an underscore
pub fn escape_keyword(language: Language, name: &str) -> String {
    let keywords = match language {
        Language::Cpp => CPP_KEYWORDS,
        Language::TypeScript => TS_KEYWORDS,
        Language::Protobuf => PROTO_KEYWORDS,
    };
    if keywords.contains(&name) {
        format!("{}_", name)
    } else {
        name.to_string()
    }
}

// =============================================================================
// Keywords
// =============================================================================

const CPP_KEYWORDS: &[&str] = &[
    "alignas", "alignof", "and", "asm", "auto", "bool", "break", "case", "catch", "char",
    "class", "const", "constexpr", "continue", "default", "delete", "do", "double",
    "else", "enum", "explicit", "export", "extern", "false", "float", "for", "friend",
    "goto", "if", "inline", "int", "long", "mutable", "namespace", "new", "noexcept",
    "not", "nullptr", "operator", "or", "private", "protected", "public", "register",
    "return", "short", "signed", "sizeof", "static", "struct", "switch", "template",
    "this", "throw", "true", "try", "typedef", "typename", "union", "unsigned", "using",
    "virtual", "void", "volatile", "while", "xor",
];

const TS_KEYWORDS: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger",
    "default", "delete", "do", "else", "enum", "export", "extends", "false",
    "finally", "for", "function", "if", "import", "in", "instanceof", "new",
    "null", "return", "super", "switch", "this", "throw", "true", "try",
    "typeof", "var", "void", "while", "with", "implements", "interface",
    "let", "package", "private", "protected", "public", "static", "yield",
];

const PROTO_KEYWORDS: &[&str] = &[
    "syntax", "import", "package", "option", "message", "enum", "service", "rpc",
    "returns", "reserved", "repeated", "optional", "oneof", "map",
];
