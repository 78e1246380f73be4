// symbols.rs — Declared-type table and `typeof` binding
//
// Collects every type declared across all input files, then binds written
// type references to declared identities using enclosing namespaces, using
// directives, and the global namespace.
//
// Preconditions: every compilation unit parsed successfully.
// Postconditions: `bind` always returns a `NamedType`. Names that denote no
//   declaration stay as written and fail population lookup downstream.
// Failure modes: none.
// Side effects: none.

use std::collections::{BTreeMap, BTreeSet};

use super::ast::{CompilationUnit, Item, TypeRef, UsingDirective};
use crate::types::NamedType;

/// Every type declared by the inputs, keyed by identity.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    types: BTreeSet<NamedType>,
}

/// Name-lookup context of one declaration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    /// Enclosing namespace, dotted; empty for the global namespace.
    pub namespace: String,
    /// Imported namespaces, innermost directives first.
    pub usings: Vec<String>,
    /// `using X = A.B;`, keyed by alias.
    pub aliases: BTreeMap<String, String>,
}

impl Scope {
    /// Extend with one namespace level and its directives.
    pub fn enter(&self, namespace: &str, usings: &[UsingDirective]) -> Scope {
        let mut inner = self.clone();
        inner.namespace = if self.namespace.is_empty() {
            namespace.to_string()
        } else {
            format!("{}.{}", self.namespace, namespace)
        };
        inner.import(usings);
        inner
    }

    /// Add directives; later (inner) ones take precedence.
    pub fn import(&mut self, usings: &[UsingDirective]) {
        let mut added = Vec::new();
        for using in usings {
            let target = using.target.path.joined();
            match &using.alias {
                Some(alias) => {
                    self.aliases.insert(alias.name.clone(), target);
                }
                None if !using.is_static => added.push(target),
                None => {}
            }
        }
        added.extend(std::mem::take(&mut self.usings));
        self.usings = added;
    }

    /// The namespace and each of its parents, innermost first, excluding global.
    fn chain(&self) -> impl Iterator<Item = &str> {
        let ns = self.namespace.as_str();
        let mut ends: Vec<usize> = ns.match_indices('.').map(|(i, _)| i).collect();
        ends.reverse();
        std::iter::once(ns)
            .filter(|s| !s.is_empty())
            .chain(ends.into_iter().map(move |i| &ns[..i]))
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every type declared in `unit`, including those in nested namespaces.
    pub fn collect(&mut self, unit: &CompilationUnit) {
        fn walk(table: &mut SymbolTable, namespace: &str, items: &[Item]) {
            for item in items {
                match item {
                    Item::Type(decl) => {
                        table.types.insert(NamedType::new(
                            namespace,
                            decl.name.name.clone(),
                            decl.type_params.len() as u32,
                        ));
                    }
                    Item::Namespace(ns) => {
                        let inner = if namespace.is_empty() {
                            ns.name.joined()
                        } else {
                            format!("{}.{}", namespace, ns.name.joined())
                        };
                        walk(table, &inner, &ns.items);
                    }
                }
            }
        }
        walk(self, "", &unit.items);
    }

    pub fn insert(&mut self, ty: NamedType) {
        self.types.insert(ty);
    }

    pub fn contains(&self, ty: &NamedType) -> bool {
        self.types.contains(ty)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    fn lookup(&self, namespace: &str, name: &str, arity: u32) -> Option<NamedType> {
        let ty = NamedType::new(namespace, name, arity);
        self.types.contains(&ty).then_some(ty)
    }

    /// Bind a written type reference within `scope`.
    pub fn bind(&self, scope: &Scope, written: &TypeRef) -> NamedType {
        let arity = written.args.len() as u32;
        let segments: Vec<&str> = written
            .path
            .segments
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        let Some((&name, prefix)) = segments.split_last() else {
            return NamedType::empty();
        };

        if prefix.is_empty() {
            return self.bind_simple(scope, name, arity);
        }

        // Qualified: an alias may stand for the leading namespace.
        let mut qualifier = prefix.join(".");
        if let Some(target) = scope.aliases.get(prefix[0]) {
            qualifier = std::iter::once(target.as_str())
                .chain(prefix[1..].iter().copied())
                .collect::<Vec<_>>()
                .join(".");
        }
        if let Some(ty) = self.lookup(&qualifier, name, arity) {
            return ty;
        }
        for ns in scope.chain() {
            if let Some(ty) = self.lookup(&format!("{}.{}", ns, qualifier), name, arity) {
                return ty;
            }
        }
        NamedType::new(qualifier, name, arity)
    }

    fn bind_simple(&self, scope: &Scope, name: &str, arity: u32) -> NamedType {
        if arity == 0 {
            if let Some(target) = scope.aliases.get(name) {
                let (ns, simple) = target.rsplit_once('.').unwrap_or(("", target.as_str()));
                return NamedType::new(ns, simple, 0);
            }
        }
        scope
            .chain()
            .chain(scope.usings.iter().map(String::as_str))
            .chain(std::iter::once(""))
            .find_map(|ns| self.lookup(ns, name, arity))
            .unwrap_or_else(|| NamedType::new("", name, arity))
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::ast::{Ident, Path};

    fn type_ref(text: &str, arity: usize) -> TypeRef {
        let span = (0..0).into();
        let segments = text
            .split('.')
            .map(|s| Ident {
                name: s.to_string(),
                span,
            })
            .collect();
        let arg = TypeRef {
            path: Path {
                segments: vec![Ident {
                    name: "int".into(),
                    span,
                }],
                span,
            },
            args: Vec::new(),
            span,
        };
        TypeRef {
            path: Path { segments, span },
            args: vec![arg; arity],
            span,
        }
    }

    fn table(types: &[(&str, &str)]) -> SymbolTable {
        let mut t = SymbolTable::new();
        for (ns, name) in types {
            t.insert(NamedType::new(*ns, *name, 0));
        }
        t
    }

    fn scope(namespace: &str, usings: &[&str]) -> Scope {
        Scope {
            namespace: namespace.to_string(),
            usings: usings.iter().map(|s| s.to_string()).collect(),
            aliases: BTreeMap::new(),
        }
    }

    #[test]
    fn enclosing_namespace_wins_over_usings() {
        let t = table(&[("A.B", "Length"), ("Lib", "Length")]);
        let bound = t.bind(&scope("A.B", &["Lib"]), &type_ref("Length", 0));
        assert_eq!(bound, NamedType::new("A.B", "Length", 0));
    }

    #[test]
    fn parent_namespace_is_searched() {
        let t = table(&[("A", "Length")]);
        let bound = t.bind(&scope("A.B.C", &[]), &type_ref("Length", 0));
        assert_eq!(bound, NamedType::new("A", "Length", 0));
    }

    #[test]
    fn using_then_global() {
        let t = table(&[("Lib", "Time"), ("", "Mass")]);
        let s = scope("App", &["Lib"]);
        assert_eq!(t.bind(&s, &type_ref("Time", 0)), NamedType::new("Lib", "Time", 0));
        assert_eq!(t.bind(&s, &type_ref("Mass", 0)), NamedType::new("", "Mass", 0));
    }

    #[test]
    fn unbound_simple_name_has_empty_namespace() {
        let t = table(&[]);
        let bound = t.bind(&scope("App", &[]), &type_ref("Nope", 0));
        assert_eq!(bound, NamedType::new("", "Nope", 0));
    }

    #[test]
    fn qualified_binds_exactly_or_relative() {
        let t = table(&[("App.Units", "Metre")]);
        let s = scope("App", &[]);
        assert_eq!(
            t.bind(&s, &type_ref("App.Units.Metre", 0)),
            NamedType::new("App.Units", "Metre", 0)
        );
        assert_eq!(
            t.bind(&s, &type_ref("Units.Metre", 0)),
            NamedType::new("App.Units", "Metre", 0)
        );
        assert_eq!(
            t.bind(&s, &type_ref("Other.Metre", 0)),
            NamedType::new("Other", "Metre", 0)
        );
    }

    #[test]
    fn arity_participates_in_identity() {
        let mut t = SymbolTable::new();
        t.insert(NamedType::new("G", "Box", 1));
        let s = scope("G", &[]);
        assert_eq!(t.bind(&s, &type_ref("Box", 1)), NamedType::new("G", "Box", 1));
        assert_eq!(t.bind(&s, &type_ref("Box", 0)), NamedType::new("", "Box", 0));
    }

    #[test]
    fn aliases() {
        let t = table(&[("Lib.Units", "Second")]);
        let mut s = scope("App", &[]);
        s.aliases.insert("Sec".into(), "Lib.Units.Second".into());
        s.aliases.insert("U".into(), "Lib.Units".into());
        assert_eq!(
            t.bind(&s, &type_ref("Sec", 0)),
            NamedType::new("Lib.Units", "Second", 0)
        );
        assert_eq!(
            t.bind(&s, &type_ref("U.Second", 0)),
            NamedType::new("Lib.Units", "Second", 0)
        );
    }

    #[test]
    fn chain_lists_parents() {
        let s = scope("A.B.C", &[]);
        assert_eq!(s.chain().collect::<Vec<_>>(), vec!["A.B.C", "A.B", "A"]);
        assert_eq!(scope("", &[]).chain().count(), 0);
    }
}
