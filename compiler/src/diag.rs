// diag.rs — Unified diagnostics model
//
// Provides the shared diagnostic types used across all pipeline stages,
// the stable code table, and the source map used to render locations.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;
use std::path::PathBuf;

use serde::{Serialize, Serializer};

use crate::types::{FileId, Location};

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0001`, `W0402`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for DiagCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Related location ─────────────────────────────────────────────────────

/// A secondary source location providing context for a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RelatedLocation {
    pub location: Location,
    pub label: String,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A diagnostic emitted by any stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub location: Location,
    pub message: String,
    pub hint: Option<String>,
    pub related: Vec<RelatedLocation>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, hint, or related locations.
    pub fn new(level: DiagLevel, location: Location, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            location,
            message: message.into(),
            hint: None,
            related: Vec::new(),
        }
    }

    pub fn error(code: DiagCode, location: Location, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, location, message).with_code(code)
    }

    pub fn warning(code: DiagCode, location: Location, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, location, message).with_code(code)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach a related location.
    pub fn with_related(mut self, location: Location, label: impl Into<String>) -> Self {
        self.related.push(RelatedLocation {
            location,
            label: label.into(),
        });
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
    }

    /// Render with `path:line:col` prefixes resolved through `map`.
    pub fn render(&self, map: &SourceMap) -> String {
        let mut out = format!("{}: {}", map.describe(self.location), self);
        for rel in &self.related {
            out.push_str(&format!(
                "\n  note: {}: {}",
                map.describe(rel.location),
                rel.label
            ));
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

/// True if any diagnostic is error-level.
pub fn has_errors(diags: &[Diagnostic]) -> bool {
    diags.iter().any(Diagnostic::is_error)
}

// ── Source map ───────────────────────────────────────────────────────────

/// Maps `FileId`s back to their display path and text for rendering.
#[derive(Debug, Default, Clone)]
pub struct SourceMap {
    files: Vec<(PathBuf, String)>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file; ids are handed out in insertion order.
    pub fn add(&mut self, path: impl Into<PathBuf>, text: impl Into<String>) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push((path.into(), text.into()));
        id
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> impl Iterator<Item = (FileId, &str)> {
        self.files
            .iter()
            .enumerate()
            .map(|(i, (_, text))| (FileId(i as u32), text.as_str()))
    }

    pub fn text(&self, file: FileId) -> Option<&str> {
        self.files.get(file.0 as usize).map(|(_, t)| t.as_str())
    }

    /// 1-based line and column of a byte offset.
    pub fn line_col(&self, file: FileId, offset: usize) -> Option<(usize, usize)> {
        let text = self.text(file)?;
        let upto = &text[..offset.min(text.len())];
        let line = upto.bytes().filter(|&b| b == b'\n').count() + 1;
        let col = upto.rfind('\n').map_or(upto.len(), |nl| upto.len() - nl - 1) + 1;
        Some((line, col))
    }

    fn describe(&self, loc: Location) -> String {
        match (self.files.get(loc.file.0 as usize), self.line_col(loc.file, loc.start)) {
            (Some((path, _)), Some((line, col))) => {
                format!("{}:{}:{}", path.display(), line, col)
            }
            _ => format!("<file {}>:{}", loc.file.0, loc.start),
        }
    }
}

// ── Code table ───────────────────────────────────────────────────────────

/// Stable diagnostic codes.
///
/// `E00xx` scanning, `E01xx` unit processing, `E02xx` unit resolution,
/// `E03xx` scalars and unit lists, `E04xx` vectors, `E05xx` cross-kind
/// identity and references, `E06xx` constants, conversions and
/// specialization. `W` codes are warnings in the same ranges.
pub mod codes {
    use super::DiagCode;

    // Scanning
    pub const E0001: DiagCode = DiagCode("E0001"); // syntax error
    pub const E0002: DiagCode = DiagCode("E0002"); // unknown named argument
    pub const E0003: DiagCode = DiagCode("E0003"); // too many positional arguments
    pub const E0004: DiagCode = DiagCode("E0004"); // missing constructor argument
    pub const E0005: DiagCode = DiagCode("E0005"); // argument kind mismatch
    pub const E0006: DiagCode = DiagCode("E0006"); // argument given twice
    pub const E0007: DiagCode = DiagCode("E0007"); // non-repeatable attribute repeated
    pub const E0008: DiagCode = DiagCode("E0008"); // decorated type is not partial

    // Unit processing
    pub const E0101: DiagCode = DiagCode("E0101"); // invalid unit instance name
    pub const E0102: DiagCode = DiagCode("E0102"); // invalid unit instance plural form
    pub const E0103: DiagCode = DiagCode("E0103"); // duplicate unit instance name
    pub const E0104: DiagCode = DiagCode("E0104"); // duplicate unit instance plural form
    pub const E0105: DiagCode = DiagCode("E0105"); // invalid original unit instance
    pub const E0106: DiagCode = DiagCode("E0106"); // unit instance modifies itself
    pub const E0107: DiagCode = DiagCode("E0107"); // invalid scale
    pub const E0108: DiagCode = DiagCode("E0108"); // invalid bias
    pub const E0109: DiagCode = DiagCode("E0109"); // invalid unit instance list
    pub const E0110: DiagCode = DiagCode("E0110"); // unrecognized enum value
    pub const E0111: DiagCode = DiagCode("E0111"); // null type argument
    pub const E0112: DiagCode = DiagCode("E0112"); // invalid derivation expression
    pub const E0113: DiagCode = DiagCode("E0113"); // invalid derivation signature
    pub const E0114: DiagCode = DiagCode("E0114"); // expression references missing unit
    pub const E0115: DiagCode = DiagCode("E0115"); // expression omits a signature unit
    pub const E0116: DiagCode = DiagCode("E0116"); // duplicate derivation id
    pub const E0117: DiagCode = DiagCode("E0117"); // multiple derivations, unnamed
    pub const E0118: DiagCode = DiagCode("E0118"); // duplicate derivation signature
    pub const E0119: DiagCode = DiagCode("E0119"); // derivation on biased unit
    pub const W0120: DiagCode = DiagCode("W0120"); // redundant permutations

    // Unit resolution
    pub const E0201: DiagCode = DiagCode("E0201"); // unrecognized unit instance name
    pub const E0202: DiagCode = DiagCode("E0202"); // cyclic unit instance dependency
    pub const E0203: DiagCode = DiagCode("E0203"); // unit lacks bias term
    pub const E0204: DiagCode = DiagCode("E0204"); // unrecognized derivation id
    pub const E0205: DiagCode = DiagCode("E0205"); // ambiguous derivation
    pub const E0206: DiagCode = DiagCode("E0206"); // derived unit list size mismatch

    // Scalars and unit lists
    pub const W0301: DiagCode = DiagCode("W0301"); // difference disabled but specified
    pub const W0302: DiagCode = DiagCode("W0302"); // default unit name/symbol incomplete
    pub const W0303: DiagCode = DiagCode("W0303"); // invalid default unit instance
    pub const W0304: DiagCode = DiagCode("W0304"); // empty unit list
    pub const W0305: DiagCode = DiagCode("W0305"); // duplicate unit list entry
    pub const W0306: DiagCode = DiagCode("W0306"); // contradictory include/exclude

    // Vectors
    pub const E0400: DiagCode = DiagCode("E0400"); // invalid vector dimension
    pub const E0401: DiagCode = DiagCode("E0401"); // missing vector dimension
    pub const W0402: DiagCode = DiagCode("W0402"); // name and dimension conflict
    pub const E0410: DiagCode = DiagCode("E0410"); // invalid operation name
    pub const E0411: DiagCode = DiagCode("E0411"); // duplicate operation name
    pub const E0412: DiagCode = DiagCode("E0412"); // duplicate mirrored operation name
    pub const E0413: DiagCode = DiagCode("E0413"); // mirror disabled but name specified
    pub const W0414: DiagCode = DiagCode("W0414"); // operation not mirrorable
    pub const E0420: DiagCode = DiagCode("E0420"); // vector of other dimension
    pub const E0421: DiagCode = DiagCode("E0421"); // group lacks member of dimension
    pub const E0422: DiagCode = DiagCode("E0422"); // type is not a vector quantity
    pub const E0423: DiagCode = DiagCode("E0423"); // duplicate vector dimension in group
    pub const E0430: DiagCode = DiagCode("E0430"); // cross product yields scalar
    pub const E0431: DiagCode = DiagCode("E0431"); // operand is a scalar
    pub const E0432: DiagCode = DiagCode("E0432"); // result is not a quantity
    pub const E0433: DiagCode = DiagCode("E0433"); // other is not a vector
    pub const E0434: DiagCode = DiagCode("E0434"); // cross product needs dimension 3
    pub const E0435: DiagCode = DiagCode("E0435"); // dot product dimension mismatch
    pub const E0436: DiagCode = DiagCode("E0436"); // dot product yields vector

    // Identity and references
    pub const E0500: DiagCode = DiagCode("E0500"); // type defined twice as same kind
    pub const E0501: DiagCode = DiagCode("E0501"); // type already a unit
    pub const E0502: DiagCode = DiagCode("E0502"); // type already a scalar
    pub const E0503: DiagCode = DiagCode("E0503"); // type already a vector
    pub const E0504: DiagCode = DiagCode("E0504"); // type already a vector group
    pub const E0510: DiagCode = DiagCode("E0510"); // type is not a unit
    pub const E0511: DiagCode = DiagCode("E0511"); // type is not a scalar
    pub const E0512: DiagCode = DiagCode("E0512"); // type is not a vector group

    // Constants, conversions and specialization
    pub const E0600: DiagCode = DiagCode("E0600"); // invalid constant name
    pub const E0601: DiagCode = DiagCode("E0601"); // duplicate constant name
    pub const E0602: DiagCode = DiagCode("E0602"); // constant name reserved by multiples
    pub const E0603: DiagCode = DiagCode("E0603"); // invalid constant unit instance
    pub const E0604: DiagCode = DiagCode("E0604"); // invalid constant multiples
    pub const E0605: DiagCode = DiagCode("E0605"); // duplicate constant multiples
    pub const E0606: DiagCode = DiagCode("E0606"); // multiples reserved by a name
    pub const E0607: DiagCode = DiagCode("E0607"); // name and multiples identical
    pub const E0608: DiagCode = DiagCode("E0608"); // multiples disabled but named
    pub const E0609: DiagCode = DiagCode("E0609"); // invalid constant value
    pub const E0610: DiagCode = DiagCode("E0610"); // original is not of the same kind
    pub const E0611: DiagCode = DiagCode("E0611"); // root quantity not resolved
    pub const E0613: DiagCode = DiagCode("E0613"); // constant shares name with unit
    pub const E0614: DiagCode = DiagCode("E0614"); // constant redeclares inherited one
    pub const E0620: DiagCode = DiagCode("E0620"); // quantity convertible to itself
    pub const W0621: DiagCode = DiagCode("W0621"); // duplicate convertible quantity
}
