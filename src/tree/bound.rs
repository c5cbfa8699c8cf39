//! Loop bounds.
//!
//! A bound is either a concrete integer, an opaque symbolic expression, or
//! the `UNK` sentinel left behind by non-affine transformations such as
//! skewing. Symbolic expressions are tokenized once at construction so that
//! "does this bound mention iterator `i`" is a set lookup rather than a text
//! search over rendered code.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Text used for the unknown sentinel.
pub const UNKNOWN_BOUND: &str = "UNK";

/// Function names that may appear in bound expressions without being iterators.
const BUILTINS: &[&str] = &["max", "min", "floor", "ceil", "floord", "ceild", "mod"];

/// A lower or upper loop bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BoundRepr", into = "BoundRepr")]
pub enum Bound {
    /// Concrete integer bound
    Int(i64),
    /// Symbolic expression (parameters, other iterators, min/max, ...)
    Symbolic(SymbolicBound),
    /// Unknown after a non-affine transformation
    Unknown,
}

/// An opaque bound expression together with the identifiers it mentions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolicBound {
    text: String,
    names: BTreeSet<String>,
}

impl SymbolicBound {
    /// Tokenize an expression.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let names = tokens(&text)
            .into_iter()
            .filter_map(|tok| match tok {
                Token::Ident(name) if !BUILTINS.contains(&name) => Some(name.to_string()),
                _ => None,
            })
            .collect();
        Self { text, names }
    }

    /// The expression as written.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Identifiers mentioned by the expression (parameters and iterators).
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Whether `name` occurs as a whole identifier.
    pub fn references(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Rewrite whole identifiers according to `renames`.
    pub fn renamed(&self, renames: &HashMap<String, String>) -> Self {
        if !self.names.iter().any(|n| renames.contains_key(n)) {
            return self.clone();
        }
        let text: String = tokens(&self.text)
            .into_iter()
            .map(|tok| match tok {
                Token::Ident(name) => renames.get(name).map(String::as_str).unwrap_or(name),
                Token::Other(text) => text,
            })
            .collect();
        Self::new(text)
    }
}

impl Bound {
    /// Parse a bound from loader text: integers become `Int`, `UNK` the sentinel.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed == UNKNOWN_BOUND {
            return Bound::Unknown;
        }
        match trimmed.parse::<i64>() {
            Ok(value) => Bound::Int(value),
            Err(_) => Bound::Symbolic(SymbolicBound::new(trimmed)),
        }
    }

    /// Remainder expression for the boundary tile of a tiled loop:
    /// `(extent - max(outer*factor, extent-factor))`.
    pub fn tile_remainder(extent: i64, outer: &str, factor: i64) -> Self {
        Bound::Symbolic(SymbolicBound::new(format!(
            "({extent} - max({outer}*{factor}, {extent}-{factor}))"
        )))
    }

    /// Concrete value, if any.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Bound::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Whether this is the unknown sentinel.
    pub fn is_unknown(&self) -> bool {
        matches!(self, Bound::Unknown)
    }

    /// Whether the bound depends on iterator `name`.
    pub fn references(&self, name: &str) -> bool {
        match self {
            Bound::Symbolic(expr) => expr.references(name),
            _ => false,
        }
    }

    /// Rename iterator references (used when a subtree is cloned).
    pub fn renamed(&self, renames: &HashMap<String, String>) -> Self {
        match self {
            Bound::Symbolic(expr) => Bound::Symbolic(expr.renamed(renames)),
            other => other.clone(),
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Int(value) => write!(f, "{}", value),
            Bound::Symbolic(expr) => write!(f, "{}", expr.text),
            Bound::Unknown => write!(f, "{}", UNKNOWN_BOUND),
        }
    }
}

impl From<i64> for Bound {
    fn from(value: i64) -> Self {
        Bound::Int(value)
    }
}

impl From<i32> for Bound {
    fn from(value: i32) -> Self {
        Bound::Int(i64::from(value))
    }
}

impl From<&str> for Bound {
    fn from(text: &str) -> Self {
        Bound::parse(text)
    }
}

impl From<String> for Bound {
    fn from(text: String) -> Self {
        Bound::parse(&text)
    }
}

/// Wire form: a JSON number or an expression string.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum BoundRepr {
    Int(i64),
    Text(String),
}

impl From<BoundRepr> for Bound {
    fn from(repr: BoundRepr) -> Self {
        match repr {
            BoundRepr::Int(value) => Bound::Int(value),
            BoundRepr::Text(text) => Bound::parse(&text),
        }
    }
}

impl From<Bound> for BoundRepr {
    fn from(bound: Bound) -> Self {
        match bound {
            Bound::Int(value) => BoundRepr::Int(value),
            other => BoundRepr::Text(other.to_string()),
        }
    }
}

enum Token<'a> {
    Ident(&'a str),
    Other(&'a str),
}

/// Split an expression into identifier and non-identifier runs.
fn tokens(text: &str) -> Vec<Token<'_>> {
    let mut out = Vec::new();
    let bytes = text.as_bytes();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_alphabetic() || c == b'_' {
            if start < i {
                out.push(Token::Other(&text[start..i]));
            }
            let ident_start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            out.push(Token::Ident(&text[ident_start..i]));
            start = i;
        } else if c.is_ascii_digit() {
            // Keep numeric literals like `2e` or `10_i` from spawning identifiers.
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
        } else {
            i += 1;
        }
    }
    if start < bytes.len() {
        out.push(Token::Other(&text[start..]));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variants() {
        assert_eq!(Bound::parse("42"), Bound::Int(42));
        assert_eq!(Bound::parse(" -3 "), Bound::Int(-3));
        assert_eq!(Bound::parse("UNK"), Bound::Unknown);
        assert!(matches!(Bound::parse("N - 1"), Bound::Symbolic(_)));
    }

    #[test]
    fn test_references_whole_tokens() {
        let bound = Bound::parse("max(i0, N) + ii");
        assert!(bound.references("i0"));
        assert!(bound.references("N"));
        assert!(bound.references("ii"));
        assert!(!bound.references("i"));
        assert!(!bound.references("max"));
        assert!(!Bound::Int(3).references("i"));
    }

    #[test]
    fn test_rename_keeps_partial_matches() {
        let renames = HashMap::from([("i".to_string(), "i_unroll".to_string())]);
        let bound = Bound::parse("i + ii + 2*i");
        let renamed = bound.renamed(&renames);
        assert_eq!(renamed.to_string(), "i_unroll + ii + 2*i_unroll");
        assert!(renamed.references("i_unroll"));
        assert!(!renamed.references("i"));
    }

    #[test]
    fn test_tile_remainder() {
        let bound = Bound::tile_remainder(10, "i", 4);
        assert_eq!(bound.to_string(), "(10 - max(i*4, 10-4))");
        assert!(bound.references("i"));
        assert_eq!(bound.as_int(), None);
    }

    #[test]
    fn test_display_unknown() {
        assert_eq!(Bound::Unknown.to_string(), "UNK");
        assert!(Bound::Unknown.is_unknown());
    }
}
