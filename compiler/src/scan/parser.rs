// parser.rs — Declaration parser
//
// Parses a token stream (from the lexer) into a `CompilationUnit` using
// chumsky combinators. Only declarations are modelled; type headers past the
// generic parameter list and type bodies are consumed as balanced token runs.
//
// Preconditions: input is a token stream from `lexer::lex()`.
// Postconditions: returns an AST plus any parse errors.
// Failure modes: syntax errors produce `Rich` diagnostics. There is no
//   recovery: a file with a syntax error yields no AST.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use super::ast::*;
use super::lexer::{self, Token};

/// Result of parsing: AST plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub unit: Option<CompilationUnit>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Parse a source string. Lexes then parses.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = lexer::lex(source);
    let len = source.len();

    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(lex_result.tokens.into_iter()).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = unit_parser(source);
    let (unit, parse_errors) = parser.parse(stream).into_output_errors();

    // Merge lex errors + parse errors.
    let mut all_errors: Vec<Rich<'static, Token, SimpleSpan>> = lex_result
        .errors
        .into_iter()
        .map(|e| Rich::custom(e.span, e.message))
        .collect();
    all_errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    ParseResult {
        unit: if all_errors.is_empty() { unit } else { None },
        errors: all_errors,
    }
}

// ── Main parser builder ──
//
// All grammar rules are built inside `unit_parser` so that the `source`
// reference is captured once and shared by all combinators.

fn unit_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, CompilationUnit, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    // ── Identifier / path ──

    let ident = just(Token::Ident).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        Ident {
            name: source[span.start()..span.end()]
                .trim_start_matches('@')
                .to_string(),
            span,
        }
    });

    let path = ident
        .clone()
        .separated_by(just(Token::Dot))
        .at_least(1)
        .collect::<Vec<_>>()
        .map_with(|segments, e| Path {
            segments,
            span: e.span(),
        });

    // ── Type reference: path ('<' type_ref,* '>')? '?'? ──

    let type_ref = recursive({
        let path = path.clone();
        move |type_ref| {
            path.then(
                type_ref
                    .separated_by(just(Token::Comma))
                    .collect::<Vec<_>>()
                    .delimited_by(just(Token::Lt), just(Token::Gt))
                    .or_not(),
            )
            .then_ignore(just(Token::Question).or_not())
            .map_with(|(path, args), e| TypeRef {
                path,
                args: args.unwrap_or_default(),
                span: e.span(),
            })
        }
    });

    // ── Attribute argument expressions ──

    let expr = recursive({
        let path = path.clone();
        let type_ref = type_ref.clone();
        move |expr| {
            let literal = select! {
                Token::StringLit(s) = e => Expr::Str(s, e.span()),
                Token::Int(v) = e => Expr::Int(v, e.span()),
                Token::Float(v) = e => Expr::Float(v, e.span()),
                Token::True = e => Expr::Bool(true, e.span()),
                Token::False = e => Expr::Bool(false, e.span()),
                Token::Null = e => Expr::Null(e.span()),
            };

            let type_of = just(Token::TypeOf)
                .ignore_then(
                    type_ref
                        .clone()
                        .delimited_by(just(Token::LParen), just(Token::RParen)),
                )
                .map_with(|t, e| Expr::TypeOf(t, e.span()));

            let name_of = just(Token::NameOf)
                .ignore_then(
                    path.clone()
                        .delimited_by(just(Token::LParen), just(Token::RParen)),
                )
                .map_with(|p, e| Expr::NameOf(p, e.span()));

            // `new[] { .. }` or `new T[] { .. }`
            let array = just(Token::New)
                .ignore_then(type_ref.or_not())
                .then_ignore(just(Token::LBracket))
                .then_ignore(just(Token::RBracket))
                .ignore_then(
                    expr.separated_by(just(Token::Comma))
                        .allow_trailing()
                        .collect::<Vec<_>>()
                        .delimited_by(just(Token::LBrace), just(Token::RBrace)),
                )
                .map_with(|items, e| Expr::Array(items, e.span()));

            let member = path.map(Expr::Member);

            choice((type_of, name_of, array, literal, member))
        }
    });

    // ── Attribute: path ('(' arg,* ')')? ──

    let arg = {
        let property = ident
            .clone()
            .then_ignore(just(Token::Equals))
            .then(expr.clone())
            .map_with(|(name, value), e| AttributeArg {
                style: ArgStyle::Property,
                name: Some(name),
                value,
                span: e.span(),
            });

        let parameter = ident
            .clone()
            .then_ignore(just(Token::Colon))
            .then(expr.clone())
            .map_with(|(name, value), e| AttributeArg {
                style: ArgStyle::Parameter,
                name: Some(name),
                value,
                span: e.span(),
            });

        let positional = expr.map_with(|value, e| AttributeArg {
            style: ArgStyle::Positional,
            name: None,
            value,
            span: e.span(),
        });

        choice((property, parameter, positional))
    };

    let attribute = path
        .clone()
        .then(
            arg.separated_by(just(Token::Comma))
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LParen), just(Token::RParen))
                .or_not(),
        )
        .map_with(|(name, args), e| Attribute {
            name,
            args: args.unwrap_or_default(),
            span: e.span(),
        });

    let attributes = attribute
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .at_least(1)
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LBracket), just(Token::RBracket))
        .repeated()
        .collect::<Vec<_>>()
        .map(|sections| sections.into_iter().flatten().collect::<Vec<_>>());

    // ── Type declaration ──

    let modifier = select! {
        Token::Public => Modifier::Public,
        Token::Internal => Modifier::Internal,
        Token::Private => Modifier::Private,
        Token::Protected => Modifier::Protected,
        Token::Static => Modifier::Static,
        Token::Partial => Modifier::Partial,
        Token::Sealed => Modifier::Sealed,
        Token::Abstract => Modifier::Abstract,
        Token::Readonly => Modifier::Readonly,
    };

    let keyword = choice((
        just(Token::Record)
            .ignore_then(
                just(Token::Struct)
                    .to(TypeKeyword::RecordStruct)
                    .or(just(Token::Class).to(TypeKeyword::Record))
                    .or_not(),
            )
            .map(|k| k.unwrap_or(TypeKeyword::Record)),
        just(Token::Class).to(TypeKeyword::Class),
        just(Token::Struct).to(TypeKeyword::Struct),
        just(Token::Interface).to(TypeKeyword::Interface),
        just(Token::Enum).to(TypeKeyword::Enum),
    ));

    let type_params = ident
        .clone()
        .separated_by(just(Token::Comma))
        .at_least(1)
        .collect::<Vec<_>>()
        .delimited_by(just(Token::Lt), just(Token::Gt))
        .or_not()
        .map(Option::unwrap_or_default);

    // Base list, primary constructor, constraints: everything up to the body.
    let header_tail = any()
        .filter(|t: &Token| !matches!(t, Token::LBrace | Token::RBrace | Token::Semi))
        .repeated();

    let body = recursive(|body| {
        any()
            .filter(|t: &Token| !matches!(t, Token::LBrace | Token::RBrace))
            .ignored()
            .or(body)
            .repeated()
            .delimited_by(just(Token::LBrace), just(Token::RBrace))
            .ignored()
    });

    let terminator = body
        .then_ignore(just(Token::Semi).or_not())
        .or(just(Token::Semi).ignored());

    let type_decl = attributes
        .then(modifier.repeated().collect::<Vec<_>>())
        .then(keyword)
        .then(ident.clone())
        .then(type_params)
        .then_ignore(header_tail)
        .then_ignore(terminator)
        .map_with(
            |((((attributes, modifiers), keyword), name), type_params), e| TypeDecl {
                attributes,
                modifiers,
                keyword,
                name,
                type_params,
                span: e.span(),
            },
        );

    // ── Using directives ──

    let using = just(Token::Global)
        .or_not()
        .ignore_then(just(Token::Using))
        .ignore_then(just(Token::Static).or_not().map(|s| s.is_some()))
        .then(ident.then_ignore(just(Token::Equals)).or_not())
        .then(type_ref)
        .then_ignore(just(Token::Semi))
        .map_with(|((is_static, alias), target), e| UsingDirective {
            alias,
            target,
            is_static,
            span: e.span(),
        });

    let usings = using.repeated().collect::<Vec<_>>();

    // ── Namespaces ──

    let items = recursive({
        let path = path.clone();
        let usings = usings.clone();
        move |items| {
            let block_namespace = just(Token::Namespace)
                .ignore_then(path)
                .then(
                    usings
                        .then(items)
                        .delimited_by(just(Token::LBrace), just(Token::RBrace)),
                )
                .map_with(|(name, (usings, items)), e| {
                    Item::Namespace(NamespaceDecl {
                        name,
                        usings,
                        items,
                        span: e.span(),
                    })
                });

            block_namespace
                .or(type_decl.map(Item::Type))
                .repeated()
                .collect::<Vec<_>>()
        }
    });

    let file_scoped = just(Token::Namespace)
        .ignore_then(path)
        .then_ignore(just(Token::Semi))
        .then(usings.clone())
        .then(items.clone())
        .map_with(|((name, usings), items), e| {
            vec![Item::Namespace(NamespaceDecl {
                name,
                usings,
                items,
                span: e.span(),
            })]
        });

    // ── Compilation unit ──

    usings
        .then(file_scoped.or(items))
        .map_with(|(usings, items), e| CompilationUnit {
            usings,
            items,
            span: e.span(),
        })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> CompilationUnit {
        let result = parse(source);
        assert!(
            result.errors.is_empty(),
            "unexpected errors: {:#?}",
            result.errors
        );
        result.unit.expect("expected compilation unit")
    }

    fn parse_all(source: &str) -> (Option<CompilationUnit>, Vec<Rich<'static, Token, SimpleSpan>>) {
        let result = parse(source);
        (result.unit, result.errors)
    }

    fn only_type(unit: &CompilationUnit) -> &TypeDecl {
        fn walk<'a>(items: &'a [Item], out: &mut Vec<&'a TypeDecl>) {
            for item in items {
                match item {
                    Item::Type(t) => out.push(t),
                    Item::Namespace(ns) => walk(&ns.items, out),
                }
            }
        }
        let mut found = Vec::new();
        walk(&unit.items, &mut found);
        assert_eq!(found.len(), 1, "expected exactly one type");
        found[0]
    }

    #[test]
    fn empty_file() {
        let unit = parse_ok("");
        assert!(unit.usings.is_empty());
        assert!(unit.items.is_empty());
    }

    #[test]
    fn usings_and_aliases() {
        let unit = parse_ok("using System; using static A.B; global using L = Physics.Length;");
        assert_eq!(unit.usings.len(), 3);
        assert_eq!(unit.usings[0].target.path.joined(), "System");
        assert!(unit.usings[1].is_static);
        assert_eq!(unit.usings[2].alias.as_ref().map(|a| a.name.as_str()), Some("L"));
        assert_eq!(unit.usings[2].target.path.joined(), "Physics.Length");
    }

    #[test]
    fn file_scoped_namespace_owns_items() {
        let unit = parse_ok("namespace Physics.Units; public partial class UnitOfLength { }");
        let [Item::Namespace(ns)] = unit.items.as_slice() else {
            panic!("expected one namespace")
        };
        assert_eq!(ns.name.joined(), "Physics.Units");
        assert_eq!(ns.items.len(), 1);
    }

    #[test]
    fn nested_block_namespaces() {
        let unit = parse_ok("namespace A { using B; namespace C { partial struct D; } }");
        let [Item::Namespace(a)] = unit.items.as_slice() else {
            panic!("expected namespace A")
        };
        assert_eq!(a.usings.len(), 1);
        let [Item::Namespace(c)] = a.items.as_slice() else {
            panic!("expected namespace C")
        };
        assert_eq!(c.name.joined(), "C");
    }

    #[test]
    fn attribute_arguments() {
        let unit = parse_ok(
            r#"[VectorOperation(typeof(Area), typeof(Length3), OperatorType = VectorOperatorType.Cross, name: "X")]
               public partial record Foo;"#,
        );
        let decl = only_type(&unit);
        assert_eq!(decl.keyword, TypeKeyword::Record);
        let attr = &decl.attributes[0];
        assert_eq!(attr.name.last(), "VectorOperation");
        assert_eq!(attr.args.len(), 4);
        assert!(matches!(&attr.args[0].value, Expr::TypeOf(t, _) if t.path.last() == "Area"));
        assert_eq!(attr.args[2].style, ArgStyle::Property);
        assert!(matches!(&attr.args[2].value, Expr::Member(p) if p.joined() == "VectorOperatorType.Cross"));
        assert_eq!(attr.args[3].style, ArgStyle::Parameter);
    }

    #[test]
    fn arrays_and_literals() {
        let unit = parse_ok(
            r#"[DerivedUnitInstance("MetrePerSecond", new[] { "Metre", "Second" }, Scale = -1.5, X = null, Y = true)]
               partial class U { }"#,
        );
        let args = &only_type(&unit).attributes[0].args;
        assert!(matches!(&args[1].value, Expr::Array(items, _) if items.len() == 2));
        assert!(matches!(args[2].value, Expr::Float(v, _) if v == -1.5));
        assert!(matches!(args[3].value, Expr::Null(_)));
        assert!(matches!(args[4].value, Expr::Bool(true, _)));
    }

    #[test]
    fn typed_array_and_generic_typeof() {
        let unit = parse_ok("[A(new Type[] { typeof(X<int, Y>) })] partial class Z<T> where T : class { }");
        let decl = only_type(&unit);
        assert_eq!(decl.type_params.len(), 1);
        let Expr::Array(items, _) = &decl.attributes[0].args[0].value else {
            panic!("expected array")
        };
        let Expr::TypeOf(t, _) = &items[0] else {
            panic!("expected typeof")
        };
        assert_eq!(t.args.len(), 2);
    }

    #[test]
    fn multiple_sections_and_bare_attributes() {
        let unit = parse_ok("[A, B(1)] [C] public static partial class K { }");
        let decl = only_type(&unit);
        let names: Vec<_> = decl.attributes.iter().map(|a| a.name.last()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert!(decl.is_partial());
        assert!(decl.modifiers.contains(&Modifier::Static));
    }

    #[test]
    fn bodies_are_balanced_and_skipped() {
        let unit = parse_ok(
            r#"partial class Outer : Base<int>, IFace {
                   public double M(int x) { if (x > 0) { return '}' + "{"; } return 1.5; }
                   class Inner { }
               }
               partial record struct R(double Magnitude);"#,
        );
        assert_eq!(unit.items.len(), 2);
        let Item::Type(r) = &unit.items[1] else {
            panic!("expected record")
        };
        assert_eq!(r.keyword, TypeKeyword::RecordStruct);
    }

    #[test]
    fn unbalanced_body_is_error() {
        let (unit, errors) = parse_all("partial class A { { }");
        assert!(unit.is_none());
        assert!(!errors.is_empty());
    }

    #[test]
    fn lex_error_discards_unit() {
        let (unit, errors) = parse_all("partial class A { ` }");
        assert!(unit.is_none());
        assert_eq!(errors.len(), 1);
    }
}
