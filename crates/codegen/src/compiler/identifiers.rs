//! # Identifier Resolver
//!
//! Turns free display text into identifiers the target grammar accepts.
//!
//! A resolver instance is the collision table of one generation pass. Distinct
//! texts whose sanitized core is equal are disambiguated with a numeric suffix
//! in first-seen order: `core`, `core_2`, `core_3`, ... The same text always
//! maps to the same identifier within a pass.
//!
//! Text is NFKC-normalized before anything else, the same folding the target
//! parser applies to identifiers, so `Spawn1` and `Spawn１` share a core.

use std::collections::{HashMap, HashSet};
use std::fmt;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Stem used when sanitizing leaves nothing, and prefix for names that would
/// start with a digit.
pub const PLACEHOLDER_STEM: &str = "node";

const HARD_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise",
    "return", "try", "while", "with", "yield",
];

lazy_static::lazy_static! {
    static ref IDENTIFIER_REGEX: Regex =
        Regex::new(r"^[\p{XID_Start}_]\p{XID_Continue}*$").unwrap();
    static ref INVALID_RUN: Regex = Regex::new(r"[^\p{XID_Continue}]+").unwrap();
    static ref UNDERSCORE_RUN: Regex = Regex::new(r"_{2,}").unwrap();
    static ref WORD_SPLIT: Regex = Regex::new(r"[^\p{XID_Continue}]|_").unwrap();
}

pub fn is_keyword(name: &str) -> bool {
    HARD_KEYWORDS.contains(&name)
}

/// Whether `name` can be written as-is as an identifier or keyword-argument name.
pub fn is_legal_identifier(name: &str) -> bool {
    IDENTIFIER_REGEX.is_match(name) && !is_keyword(name)
}

/// Sanitized core of `text`. Always a legal, NFKC-normalized identifier.
pub fn sanitize(text: &str) -> String {
    let normalized: String = text.trim().nfkc().collect();
    let replaced = INVALID_RUN.replace_all(&normalized, "_");
    let collapsed = UNDERSCORE_RUN.replace_all(&replaced, "_");
    let core = collapsed.trim_matches('_');

    let mut ident = if core.is_empty() {
        PLACEHOLDER_STEM.to_string()
    } else {
        core.to_string()
    };
    if !IDENTIFIER_REGEX.is_match(&ident) {
        ident = format!("{}_{}", PLACEHOLDER_STEM, ident);
    }
    if is_keyword(&ident) {
        ident.push('_');
    }
    ident
}

/// Light normalization applied to pin and parameter names before they are
/// matched against each other: surrounding whitespace and label colons go.
pub fn normalize_port_name(text: &str) -> String {
    text.trim()
        .trim_matches(|c: char| c == ':' || c == '：' || c.is_whitespace())
        .to_string()
}

/// PascalCase class name for a graph or composite.
pub fn class_name(text: &str) -> String {
    let normalized: String = text.nfkc().collect();
    let mut name: String = WORD_SPLIT
        .split(&normalized)
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();

    if name.is_empty() {
        return "NodeGraph".to_string();
    }
    if !IDENTIFIER_REGEX.is_match(&name) {
        name.insert(0, 'G');
    }
    if is_keyword(&name) {
        name.push('_');
    }
    name
}

/// Outcome of resolving one text within a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedIdentifier {
    /// The sanitized core was free.
    Unique(String),
    /// The core was already claimed; `suffix` disambiguates.
    Suffixed { stem: String, suffix: u32 },
}

impl ResolvedIdentifier {
    pub fn is_suffixed(&self) -> bool {
        matches!(self, ResolvedIdentifier::Suffixed { .. })
    }
}

impl fmt::Display for ResolvedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedIdentifier::Unique(name) => f.write_str(name),
            ResolvedIdentifier::Suffixed { stem, suffix } => write!(f, "{}_{}", stem, suffix),
        }
    }
}

/// Per-pass collision table.
#[derive(Debug, Default)]
pub struct IdentifierResolver {
    resolved: HashMap<String, ResolvedIdentifier>,
    taken: HashSet<String>,
    // Lowest suffix not yet tried per stem
    next_suffix: HashMap<String, u32>,
}

impl IdentifierResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table where `names` are already claimed.
    pub fn with_reserved(names: &[&str]) -> Self {
        let mut resolver = Self::new();
        resolver.reserve(names.iter().copied());
        resolver
    }

    /// Claim `names` outright; nothing resolved later gets them.
    pub fn reserve<'n>(&mut self, names: impl IntoIterator<Item = &'n str>) {
        for name in names {
            self.taken.insert(name.to_string());
        }
    }

    /// Identifier for a display text; stable for repeated calls with the same text.
    pub fn resolve(&mut self, text: &str) -> ResolvedIdentifier {
        if let Some(existing) = self.resolved.get(text) {
            return existing.clone();
        }
        let resolved = self.claim(sanitize(text));
        if resolved.is_suffixed() {
            tracing::debug!(text, identifier = %resolved, "[IDENT] Disambiguated colliding name");
        }
        self.resolved.insert(text.to_string(), resolved.clone());
        resolved
    }

    /// A name nobody in this pass holds yet, derived from `stem`.
    pub fn fresh(&mut self, stem: &str) -> String {
        self.claim(sanitize(stem)).to_string()
    }

    pub fn is_taken(&self, name: &str) -> bool {
        self.taken.contains(name)
    }

    fn claim(&mut self, stem: String) -> ResolvedIdentifier {
        if self.taken.insert(stem.clone()) {
            return ResolvedIdentifier::Unique(stem);
        }
        let mut suffix = self.next_suffix.get(&stem).copied().unwrap_or(2);
        loop {
            let candidate = format!("{}_{}", stem, suffix);
            suffix += 1;
            if self.taken.insert(candidate) {
                self.next_suffix.insert(stem.clone(), suffix);
                return ResolvedIdentifier::Suffixed { stem, suffix: suffix - 1 };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_symbols() {
        assert_eq!(sanitize("Add/Sub (x)"), "Add_Sub_x");
        assert_eq!(sanitize("Get: Entity Position"), "Get_Entity_Position");
        assert_eq!(sanitize("__hidden__"), "hidden");
        assert_eq!(sanitize("生命值：当前"), "生命值_当前");
    }

    #[test]
    fn test_sanitize_edge_cases() {
        assert_eq!(sanitize(""), "node");
        assert_eq!(sanitize("()/:"), "node");
        assert_eq!(sanitize("3d vector"), "node_3d_vector");
        assert_eq!(sanitize("class"), "class_");
        assert_eq!(sanitize("None"), "None_");
    }

    #[test]
    fn test_collisions_suffixed_in_first_seen_order() {
        let mut resolver = IdentifierResolver::new();
        assert_eq!(resolver.resolve("Add/Sub").to_string(), "Add_Sub");
        assert_eq!(resolver.resolve("Add(Sub)").to_string(), "Add_Sub_2");
        assert_eq!(resolver.resolve("Add Sub").to_string(), "Add_Sub_3");
        // Same text resolves to the same identifier again
        assert_eq!(resolver.resolve("Add(Sub)").to_string(), "Add_Sub_2");
        assert!(resolver.resolve("Add(Sub)").is_suffixed());
    }

    #[test]
    fn test_compatibility_forms_share_a_core() {
        assert_eq!(sanitize("Spawn\u{FF11}"), "Spawn1");
        assert_eq!(sanitize("\u{FF21}dd"), "Add");
        assert_eq!(sanitize("\u{FB01}nd"), "find");

        let mut resolver = IdentifierResolver::new();
        assert_eq!(resolver.resolve("Spawn1").to_string(), "Spawn1");
        assert_eq!(resolver.resolve("Spawn\u{FF11}").to_string(), "Spawn1_2");
        assert_eq!(resolver.resolve("Spawn\u{FF11}").to_string(), "Spawn1_2");
    }

    #[test]
    fn test_many_collisions_stay_sequential() {
        let mut resolver = IdentifierResolver::new();
        assert_eq!(resolver.fresh("value"), "value");
        for suffix in 2..500 {
            assert_eq!(resolver.fresh("value"), format!("value_{}", suffix));
        }
    }

    #[test]
    fn test_suffix_skips_taken_candidates() {
        let mut resolver = IdentifierResolver::new();
        resolver.resolve("a_2");
        resolver.resolve("a");
        assert_eq!(resolver.resolve("a!").to_string(), "a_3");
    }

    #[test]
    fn test_fresh_never_repeats() {
        let mut resolver = IdentifierResolver::with_reserved(&["self"]);
        assert_eq!(resolver.fresh("self"), "self_2");
        assert_eq!(resolver.fresh("result"), "result");
        assert_eq!(resolver.fresh("result"), "result_2");
    }

    #[test]
    fn test_legal_identifier() {
        assert!(is_legal_identifier("amount"));
        assert!(is_legal_identifier("_private"));
        assert!(is_legal_identifier("伤害"));
        assert!(!is_legal_identifier("a(b)"));
        assert!(!is_legal_identifier("9lives"));
        assert!(!is_legal_identifier("lambda"));
        assert!(!is_legal_identifier(""));
    }

    #[test]
    fn test_normalize_port_name() {
        assert_eq!(normalize_port_name("  Target Entity: "), "Target Entity");
        assert_eq!(normalize_port_name("a(b)"), "a(b)");
    }

    #[test]
    fn test_class_name() {
        assert_eq!(class_name("damage flow/main"), "DamageFlowMain");
        assert_eq!(class_name("3d_graph"), "G3dGraph");
        assert_eq!(class_name(""), "NodeGraph");
        assert_eq!(class_name("none"), "None_");
    }
}
