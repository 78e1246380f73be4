// lexer.rs — Tokenizer for the C#-like declaration subset
//
// Uses the `logos` crate for DFA-based lexing. Trivia (whitespace, line and
// block comments, preprocessor lines) is skipped. Block comments are scanned
// by a callback, since their body may hold any run of `*`. Any operator character the
// grammar does not care about lexes as `Punct`, so method bodies tokenize
// cleanly even though the parser only balances their braces.
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns all tokens with byte-offset spans, plus any lex errors.
// Failure modes: unrecognized characters produce `LexError`; lexing continues.
//   An unterminated block comment is one `LexError` spanning the rest of input.
// Side effects: none.

use logos::{FilterResult, Logos};
use std::fmt;

use super::ast::Span;

/// A lexer error with location.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

/// Result of lexing: tokens plus any errors (non-fatal).
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<(Token, Span)>,
    pub errors: Vec<LexError>,
}

/// Token types.
///
/// Identifiers carry no value; use the span to retrieve the text.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+|//[^\n]*|#[^\n]*")]
pub enum Token {
    // ── Keywords ──
    #[token("using")]
    Using,
    #[token("namespace")]
    Namespace,
    #[token("class")]
    Class,
    #[token("struct")]
    Struct,
    #[token("record")]
    Record,
    #[token("interface")]
    Interface,
    #[token("enum")]
    Enum,
    #[token("typeof")]
    TypeOf,
    #[token("nameof")]
    NameOf,
    #[token("new")]
    New,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,
    #[token("global")]
    Global,

    // ── Modifiers ──
    #[token("public")]
    Public,
    #[token("internal")]
    Internal,
    #[token("private")]
    Private,
    #[token("protected")]
    Protected,
    #[token("static")]
    Static,
    #[token("partial")]
    Partial,
    #[token("sealed")]
    Sealed,
    #[token("abstract")]
    Abstract,
    #[token("readonly")]
    Readonly,

    /// Never emitted; the callback skips the comment or reports it unterminated.
    #[token("/*", skip_block_comment)]
    BlockComment,

    // ── Symbols ──
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token(".")]
    Dot,
    #[token("=")]
    Equals,
    #[token(":")]
    Colon,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("?")]
    Question,

    /// Operator characters that only occur inside bodies and headers.
    #[regex(r"[+\-*/%&|^!~@$]")]
    Punct,

    // ── Literals ──
    //
    // Float must be tried on the longer match; logos prefers the longest
    // lexeme, so `1.5` is Float and `15` is Int.
    /// Real literal, with an optional `f`/`d`/`m` suffix.
    #[regex(
        r"-?[0-9]+(\.[0-9]+([eE][+-]?[0-9]+)?|[eE][+-]?[0-9]+)[fFdDmM]?",
        parse_float
    )]
    #[regex(r"-?[0-9]+[fFdDmM]", parse_float)]
    Float(f64),

    /// Integer literal, with an optional `u`/`l` suffix.
    #[regex(r"-?[0-9]+[uUlL]*", parse_int)]
    Int(i64),

    /// String literal with C-style escapes.
    #[regex(r#""([^"\\\n]|\\.)*""#, parse_string)]
    StringLit(String),

    #[regex(r"'([^'\\\n]|\\.)+'")]
    CharLit,

    // ── Identifier ──
    //
    // Placed after keywords; logos prioritises fixed `#[token]` matches
    // over regex for the same length, so `class` matches Class, not Ident.
    /// Identifier, optionally verbatim (`@class`).
    #[regex(r"@?[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Using => write!(f, "using"),
            Token::Namespace => write!(f, "namespace"),
            Token::Class => write!(f, "class"),
            Token::Struct => write!(f, "struct"),
            Token::Record => write!(f, "record"),
            Token::Interface => write!(f, "interface"),
            Token::Enum => write!(f, "enum"),
            Token::TypeOf => write!(f, "typeof"),
            Token::NameOf => write!(f, "nameof"),
            Token::New => write!(f, "new"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Null => write!(f, "null"),
            Token::Global => write!(f, "global"),
            Token::Public => write!(f, "public"),
            Token::Internal => write!(f, "internal"),
            Token::Private => write!(f, "private"),
            Token::Protected => write!(f, "protected"),
            Token::Static => write!(f, "static"),
            Token::Partial => write!(f, "partial"),
            Token::Sealed => write!(f, "sealed"),
            Token::Abstract => write!(f, "abstract"),
            Token::Readonly => write!(f, "readonly"),
            Token::BlockComment => write!(f, "/*"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Comma => write!(f, ","),
            Token::Semi => write!(f, ";"),
            Token::Dot => write!(f, "."),
            Token::Equals => write!(f, "="),
            Token::Colon => write!(f, ":"),
            Token::Lt => write!(f, "<"),
            Token::Gt => write!(f, ">"),
            Token::Question => write!(f, "?"),
            Token::Punct => write!(f, "<operator>"),
            Token::Float(v) => write!(f, "{v}"),
            Token::Int(v) => write!(f, "{v}"),
            Token::StringLit(s) => write!(f, "\"{s}\""),
            Token::CharLit => write!(f, "<char>"),
            Token::Ident => write!(f, "<ident>"),
        }
    }
}

// ── Callbacks ──

fn skip_block_comment(lex: &mut logos::Lexer<'_, Token>) -> FilterResult<(), ()> {
    match lex.remainder().find("*/") {
        Some(end) => {
            lex.bump(end + 2);
            FilterResult::Skip
        }
        None => {
            lex.bump(lex.remainder().len());
            FilterResult::Error(())
        }
    }
}

fn parse_float(lex: &mut logos::Lexer<'_, Token>) -> Option<f64> {
    lex.slice()
        .trim_end_matches(['f', 'F', 'd', 'D', 'm', 'M'])
        .parse()
        .ok()
}

fn parse_int(lex: &mut logos::Lexer<'_, Token>) -> Option<i64> {
    lex.slice()
        .trim_end_matches(['u', 'U', 'l', 'L'])
        .parse()
        .ok()
}

fn parse_string(lex: &mut logos::Lexer<'_, Token>) -> Option<String> {
    let slice = lex.slice();
    let inner = &slice[1..slice.len() - 1]; // strip quotes
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next()? {
            'n' => result.push('\n'),
            't' => result.push('\t'),
            'r' => result.push('\r'),
            '0' => result.push('\0'),
            // `\"`, `\\`, `\'`, and anything else stand for themselves.
            other => result.push(other),
        }
    }
    Some(result)
}

// ── Public API ──

/// Lex a source string into tokens.
///
/// Lexing is non-fatal: errors are collected and the lexer continues past
/// bad characters.
pub fn lex(source: &str) -> LexResult {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, range) in lexer.spanned() {
        let span: Span = range.into();
        let text = source.get(span.start..span.end).unwrap_or("?");
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) if text.starts_with("/*") => errors.push(LexError {
                span,
                message: "unterminated block comment".to_string(),
            }),
            Err(()) => errors.push(LexError {
                span,
                message: format!("unexpected character: {:?}", text),
            }),
        }
    }

    LexResult { tokens, errors }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: lex and assert no errors, return token list.
    fn lex_ok(source: &str) -> Vec<Token> {
        let result = lex(source);
        assert!(
            result.errors.is_empty(),
            "unexpected lex errors: {:?}",
            result.errors
        );
        result.tokens.into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn keywords_and_modifiers() {
        let tokens = lex_ok("using namespace public partial class record struct typeof new");
        assert_eq!(
            tokens,
            vec![
                Token::Using,
                Token::Namespace,
                Token::Public,
                Token::Partial,
                Token::Class,
                Token::Record,
                Token::Struct,
                Token::TypeOf,
                Token::New,
            ]
        );
    }

    #[test]
    fn keyword_vs_ident() {
        // `classes` is an identifier, not keyword `class` + `es`
        let tokens = lex_ok("class classes @class");
        assert_eq!(tokens, vec![Token::Class, Token::Ident, Token::Ident]);
    }

    #[test]
    fn numbers() {
        let tokens = lex_ok("3 -2 1.5 1e3 2.5f 10d 7L");
        assert_eq!(
            tokens,
            vec![
                Token::Int(3),
                Token::Int(-2),
                Token::Float(1.5),
                Token::Float(1000.0),
                Token::Float(2.5),
                Token::Float(10.0),
                Token::Int(7),
            ]
        );
    }

    #[test]
    fn string_escapes() {
        let tokens = lex_ok(r#""a\"b" "c\\d" "e\nf""#);
        assert_eq!(
            tokens,
            vec![
                Token::StringLit("a\"b".into()),
                Token::StringLit("c\\d".into()),
                Token::StringLit("e\nf".into()),
            ]
        );
    }

    #[test]
    fn trivia_is_skipped() {
        let src = "// line\n#nullable enable\n/* block\n * comment */ class";
        assert_eq!(lex_ok(src), vec![Token::Class]);
        assert_eq!(lex_ok("/** Units */ class /**/ X"), vec![Token::Class, Token::Ident]);
        assert_eq!(lex_ok("/*\n * Length.\n **/\nclass"), vec![Token::Class]);
        assert_eq!(lex_ok("/* a / b * c */ partial"), vec![Token::Partial]);
    }

    #[test]
    fn unterminated_block_comment_is_one_error() {
        let result = lex("class X /* open\n * still open");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].message, "unterminated block comment");
        assert_eq!(result.errors[0].span, Span::from(8..29));
        assert_eq!(result.tokens.len(), 2);
    }

    #[test]
    fn body_operators_lex_as_punct() {
        let tokens = lex_ok("a => b + c * 2;");
        assert_eq!(
            tokens,
            vec![
                Token::Ident,
                Token::Equals,
                Token::Gt,
                Token::Ident,
                Token::Punct,
                Token::Ident,
                Token::Punct,
                Token::Int(2),
                Token::Semi,
            ]
        );
    }

    #[test]
    fn char_literal() {
        assert_eq!(lex_ok(r"'{' '\n'"), vec![Token::CharLit, Token::CharLit]);
    }

    #[test]
    fn unknown_character_is_reported() {
        let result = lex("class ` X");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.tokens.len(), 2);
    }

    #[test]
    fn spans_are_byte_offsets() {
        let result = lex("  class Foo");
        assert_eq!(result.tokens[0].1, Span::from(2..7));
        assert_eq!(result.tokens[1].1, Span::from(8..11));
    }
}
