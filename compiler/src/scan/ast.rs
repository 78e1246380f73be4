// ast.rs — Syntax tree for the declaration subset
//
// Only the shape the scanner needs survives parsing: using directives,
// namespaces, type declarations with their attribute lists and modifiers.
// Type bodies are consumed but not represented.
//
// Preconditions: produced by the parser from a valid token stream.
// Postconditions: each node's span covers the source range of the construct.
// Failure modes: none (data-only module).
// Side effects: none.

use chumsky::span::SimpleSpan;

/// Byte-offset span (alias for chumsky's `SimpleSpan`).
pub type Span = SimpleSpan;

/// An identifier with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

/// Dotted name: `A.B.C`.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub segments: Vec<Ident>,
    pub span: Span,
}

impl Path {
    pub fn last(&self) -> &str {
        self.segments.last().map_or("", |s| s.name.as_str())
    }

    pub fn joined(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn is_simple(&self) -> bool {
        self.segments.len() == 1
    }
}

// ── Root ──

/// One parsed source file.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilationUnit {
    pub usings: Vec<UsingDirective>,
    pub items: Vec<Item>,
    pub span: Span,
}

/// `using A.B;`, `using static A.B;`, or `using X = A.B;`.
#[derive(Debug, Clone, PartialEq)]
pub struct UsingDirective {
    pub alias: Option<Ident>,
    pub target: TypeRef,
    pub is_static: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Namespace(NamespaceDecl),
    Type(TypeDecl),
}

/// A block namespace, or the file-scoped namespace owning the rest of the file.
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceDecl {
    pub name: Path,
    pub usings: Vec<UsingDirective>,
    pub items: Vec<Item>,
    pub span: Span,
}

// ── Type declarations ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Public,
    Internal,
    Private,
    Protected,
    Static,
    Partial,
    Sealed,
    Abstract,
    Readonly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKeyword {
    Class,
    Struct,
    Record,
    RecordStruct,
    Interface,
    Enum,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub attributes: Vec<Attribute>,
    pub modifiers: Vec<Modifier>,
    pub keyword: TypeKeyword,
    pub name: Ident,
    pub type_params: Vec<Ident>,
    pub span: Span,
}

impl TypeDecl {
    pub fn is_partial(&self) -> bool {
        self.modifiers.contains(&Modifier::Partial)
    }
}

// ── Attributes ──

/// `Name(args)` inside an attribute section.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: Path,
    pub args: Vec<AttributeArg>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgStyle {
    Positional,
    /// `name: value`, addressing a constructor parameter.
    Parameter,
    /// `Name = value`, assigning a property.
    Property,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeArg {
    pub style: ArgStyle,
    pub name: Option<Ident>,
    pub value: Expr,
    pub span: Span,
}

/// A referenced type as written: `A.B<C, D>`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRef {
    pub path: Path,
    pub args: Vec<TypeRef>,
    pub span: Span,
}

/// Attribute argument expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    TypeOf(TypeRef, Span),
    /// `nameof(A.B)` evaluates to the last segment.
    NameOf(Path, Span),
    Str(String, Span),
    Int(i64, Span),
    Float(f64, Span),
    Bool(bool, Span),
    Null(Span),
    /// Member access (`VectorOperatorType.Cross`) or a bare identifier.
    Member(Path),
    Array(Vec<Expr>, Span),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::TypeOf(_, s)
            | Expr::NameOf(_, s)
            | Expr::Str(_, s)
            | Expr::Int(_, s)
            | Expr::Float(_, s)
            | Expr::Bool(_, s)
            | Expr::Null(s)
            | Expr::Array(_, s) => *s,
            Expr::Member(p) => p.span,
        }
    }
}
