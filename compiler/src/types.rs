// types.rs — Type identity, derivation signatures, and source locations
//
// Value types shared by every stage. All of them are immutable, value-equal,
// and totally ordered so populations iterate deterministically.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::scan::ast::Span;

// ── Source identity ──────────────────────────────────────────────────────

/// Stable identifier for an input source file. Allocated in input order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FileId(pub u32);

/// Opaque source-location handle: a byte range inside one input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Location {
    pub file: FileId,
    pub start: usize,
    pub end: usize,
}

impl Location {
    pub fn new(file: FileId, span: Span) -> Self {
        Self {
            file,
            start: span.start,
            end: span.end,
        }
    }
}

// ── Named types ──────────────────────────────────────────────────────────

/// Globally unique identity of a declared type.
///
/// Two `NamedType`s are equal iff they denote the same declaration: same
/// namespace, same simple name, same generic arity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamedType {
    pub namespace: String,
    pub name: String,
    pub arity: u32,
}

impl NamedType {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, arity: u32) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            arity,
        }
    }

    /// The undefined type: what a type-valued argument holds when the
    /// written value did not denote a type at all.
    pub fn empty() -> Self {
        Self::new("", "", 0)
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    /// `Namespace.Name`, or just `Name` in the global namespace.
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

impl fmt::Display for NamedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "<empty>");
        }
        write!(f, "{}", self.qualified_name())?;
        if self.arity > 0 {
            write!(f, "`{}", self.arity)?;
        }
        Ok(())
    }
}

impl Serialize for NamedType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ── Derivation signature ─────────────────────────────────────────────────

/// Ordered operand-unit types of a unit derivation (`Length × Time`).
///
/// Equality is sequence equality; `[A, B]` and `[B, A]` are different
/// signatures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DerivableSignature(pub Vec<NamedType>);

impl DerivableSignature {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NamedType> {
        self.0.iter()
    }
}

impl fmt::Display for DerivableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, t) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", t)?;
        }
        write!(f, ")")
    }
}

// ── Dimension inference ──────────────────────────────────────────────────

/// Dimension implied by a vector type's name: the run of ASCII digits at
/// the very end of the identifier (`Position3` → 3, `Velocity12` → 12).
///
/// Digits that are not at the end (`Position3D`) imply nothing.
pub fn infer_dimension(name: &str) -> Option<u32> {
    let digits = name
        .bytes()
        .rev()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 || digits == name.len() {
        return None;
    }
    name[name.len() - digits..].parse().ok()
}

/// The name with its trailing dimension digits removed (`Position3` → `Position`).
pub fn name_without_dimension(name: &str) -> &str {
    name.trim_end_matches(|c: char| c.is_ascii_digit())
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_type_display() {
        assert_eq!(NamedType::new("Physics", "Length", 0).to_string(), "Physics.Length");
        assert_eq!(NamedType::new("", "Length", 0).to_string(), "Length");
        assert_eq!(NamedType::new("A", "Box", 2).to_string(), "A.Box`2");
        assert_eq!(NamedType::empty().to_string(), "<empty>");
    }

    #[test]
    fn named_type_serializes_as_string() {
        let json = serde_json::to_string(&NamedType::new("Physics", "Length", 0)).unwrap();
        assert_eq!(json, "\"Physics.Length\"");
    }

    #[test]
    fn signature_is_order_sensitive() {
        let a = NamedType::new("", "A", 0);
        let b = NamedType::new("", "B", 0);
        let ab = DerivableSignature(vec![a.clone(), b.clone()]);
        let ba = DerivableSignature(vec![b, a]);
        assert_ne!(ab, ba);
        assert_eq!(ab, ab.clone());
    }

    #[test]
    fn infer_trailing_digits() {
        assert_eq!(infer_dimension("Position3"), Some(3));
        assert_eq!(infer_dimension("Velocity12"), Some(12));
        assert_eq!(infer_dimension("Position1"), Some(1));
        assert_eq!(infer_dimension("Position03"), Some(3));
    }

    #[test]
    fn infer_no_trailing_digits() {
        assert_eq!(infer_dimension("Position3D"), None);
        assert_eq!(infer_dimension("Position"), None);
        assert_eq!(infer_dimension(""), None);
    }

    #[test]
    fn infer_overflow_is_none() {
        assert_eq!(infer_dimension("Huge99999999999999999999"), None);
    }

    #[test]
    fn strip_dimension() {
        assert_eq!(name_without_dimension("Position3"), "Position");
        assert_eq!(name_without_dimension("Position3D"), "Position3D");
    }
}
