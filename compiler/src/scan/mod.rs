// scan — Declaration scanner
//
// Parses every input file, builds the declared-type table, and yields one
// `Candidate` per recognized marker attribute on a partial type declaration.
//
// Preconditions: `sources` holds every input file, in input order.
// Postconditions: candidates are ordered by file, then declaration, then
//   attribute position. Every `typeof` argument is bound.
// Failure modes: syntax errors (E0001) drop the whole file; binding errors
//   drop the attribute or the argument (see `schema::bind`).
// Side effects: none.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod schema;
pub mod symbols;

use crate::diag::{codes, Diagnostic, SourceMap};
use crate::types::{FileId, Location, NamedType};

use ast::{Attribute, Item, TypeDecl, TypeRef};
use schema::{AttributeKind, BoundArgs};
use symbols::{Scope, SymbolTable};

/// One marker-attribute occurrence on a declared type.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub ty: NamedType,
    pub type_location: Location,
    pub kind: AttributeKind,
    pub args: BoundArgs,
    pub attribute_location: Location,
}

#[derive(Debug)]
pub struct ScanResult {
    pub candidates: Vec<Candidate>,
    pub symbols: SymbolTable,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn scan(sources: &SourceMap) -> ScanResult {
    let mut diagnostics = Vec::new();
    let mut parsed = Vec::new();

    for (file, text) in sources.files() {
        let result = parser::parse(text);
        for err in &result.errors {
            diagnostics.push(Diagnostic::error(
                codes::E0001,
                Location::new(file, *err.span()),
                err.to_string(),
            ));
        }
        if let Some(unit) = result.unit {
            parsed.push((file, unit));
        }
    }

    let mut symbols = SymbolTable::new();
    for (_, unit) in &parsed {
        symbols.collect(unit);
    }

    let mut scanner = Scanner {
        symbols: &symbols,
        candidates: Vec::new(),
        diagnostics: &mut diagnostics,
    };
    for (file, unit) in &parsed {
        let mut scope = Scope::default();
        scope.import(&unit.usings);
        scanner.items(*file, &scope, &unit.items);
    }
    let candidates = scanner.candidates;

    ScanResult {
        candidates,
        symbols,
        diagnostics,
    }
}

struct Scanner<'a> {
    symbols: &'a SymbolTable,
    candidates: Vec<Candidate>,
    diagnostics: &'a mut Vec<Diagnostic>,
}

impl Scanner<'_> {
    fn items(&mut self, file: FileId, scope: &Scope, items: &[Item]) {
        for item in items {
            match item {
                Item::Type(decl) => self.declaration(file, scope, decl),
                Item::Namespace(ns) => {
                    let inner = scope.enter(&ns.name.joined(), &ns.usings);
                    self.items(file, &inner, &ns.items);
                }
            }
        }
    }

    fn declaration(&mut self, file: FileId, scope: &Scope, decl: &TypeDecl) {
        let marked: Vec<(&Attribute, AttributeKind)> = decl
            .attributes
            .iter()
            .filter_map(|a| AttributeKind::from_name(a.name.last()).map(|k| (a, k)))
            .collect();
        let Some((_, first_kind)) = marked.first() else {
            return;
        };

        let ty = NamedType::new(
            scope.namespace.clone(),
            decl.name.name.clone(),
            decl.type_params.len() as u32,
        );
        let type_location = Location::new(file, decl.name.span);

        if !decl.is_partial() {
            self.diagnostics.push(
                Diagnostic::error(
                    codes::E0008,
                    type_location,
                    format!(
                        "type '{}' is marked with '{}' but is not partial",
                        ty, first_kind
                    ),
                )
                .with_hint("add the `partial` modifier"),
            );
            return;
        }

        let symbols = self.symbols;
        let resolve = |t: &TypeRef| symbols.bind(scope, t);
        let mut applied: Vec<(AttributeKind, Location)> = Vec::new();

        for (attr, kind) in marked {
            let attribute_location = Location::new(file, attr.span);
            if !kind.is_repeatable() {
                if let Some((_, first)) = applied.iter().find(|(k, _)| *k == kind) {
                    self.diagnostics.push(
                        Diagnostic::error(
                            codes::E0007,
                            attribute_location,
                            format!("'{}' may only be applied once to '{}'", kind, ty),
                        )
                        .with_related(*first, "first applied here"),
                    );
                    continue;
                }
            }
            applied.push((kind, attribute_location));

            let binding = schema::bind(attr, kind, file, &resolve);
            self.diagnostics.extend(binding.diagnostics);
            if let Some(args) = binding.args {
                self.candidates.push(Candidate {
                    ty: ty.clone(),
                    type_location,
                    kind,
                    args,
                    attribute_location,
                });
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
