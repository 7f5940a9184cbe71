//! Tokenizer for script source text.
//!
//! Produces just enough structure for declaration matching: names, string
//! and number literals, brackets and operators. Comments and line
//! continuations are dropped. Anything a real parser would reject at the
//! lexical level (stray `$`, unterminated strings) is an error.

use logos::{Logos, Span};
use std::fmt;

/// Lexer error types.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LexerError {
    #[default]
    UnexpectedCharacter,
    UnterminatedString,
}

impl fmt::Display for LexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexerError::UnexpectedCharacter => write!(f, "unexpected character"),
            LexerError::UnterminatedString => write!(f, "unterminated string"),
        }
    }
}

/// Flavor of a string literal, decided by its prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrKind {
    /// Plain or `r`/`u` prefixed text.
    Text,
    /// `b` prefixed.
    Bytes,
    /// `f` prefixed; never a constant.
    Formatted,
}

/// A string literal with escapes already processed.
#[derive(Debug, Clone, PartialEq)]
pub struct StrLit {
    pub kind: StrKind,
    pub value: String,
}

/// A token together with its byte range in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = LexerError)]
#[logos(skip r"([ \t\f\r\n]|\\\r?\n)+")]
pub enum Token {
    // ═══════════════════════════════════════════════════════════════════
    // Literals
    // ═══════════════════════════════════════════════════════════════════

    /// String literal, any quoting style. The regex only matches the prefix
    /// and opening quote; the callback consumes the body.
    #[regex(r#"([rRbBuUfF]|[rR][bBfF]|[bBfF][rR])?["']"#, lex_string)]
    Str(StrLit),

    /// Integer literal. `None` when it does not fit in an i64.
    #[regex(r"[0-9][0-9_]*", |lex| parse_int(lex.slice(), 10))]
    #[regex(r"0[xX][0-9a-fA-F_]+", |lex| parse_int(&lex.slice()[2..], 16))]
    #[regex(r"0[oO][0-7_]+", |lex| parse_int(&lex.slice()[2..], 8))]
    #[regex(r"0[bB][01_]+", |lex| parse_int(&lex.slice()[2..], 2))]
    Int(Option<i64>),

    /// Float literal. `None` when the text does not convert.
    #[regex(r"[0-9][0-9_]*\.[0-9_]*([eE][+-]?[0-9_]+)?", lex_float)]
    #[regex(r"\.[0-9][0-9_]*([eE][+-]?[0-9_]+)?", lex_float)]
    #[regex(r"[0-9][0-9_]*[eE][+-]?[0-9_]+", lex_float)]
    Float(Option<f64>),

    /// Imaginary literal such as `3j`. Never an allow-listed constant.
    #[regex(r"([0-9][0-9_]*|[0-9][0-9_]*\.[0-9_]*|\.[0-9][0-9_]*)([eE][+-]?[0-9_]+)?[jJ]")]
    Imaginary,

    /// Identifier or keyword.
    #[regex(r"[\p{L}_][\p{L}\p{N}_]*", |lex| lex.slice().to_string())]
    Name(String),

    // ═══════════════════════════════════════════════════════════════════
    // Brackets
    // ═══════════════════════════════════════════════════════════════════
    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    // ═══════════════════════════════════════════════════════════════════
    // Operators the matcher cares about
    // ═══════════════════════════════════════════════════════════════════
    #[token(",")]
    Comma,

    #[token(".")]
    Dot,

    #[token("=")]
    Assign,

    #[token("*")]
    Star,

    #[token("**")]
    DoubleStar,

    #[token("-")]
    Minus,

    #[token("+")]
    Plus,

    #[token(":")]
    Colon,

    /// Every other operator or delimiter.
    #[token("==")]
    #[token("!=")]
    #[token("<")]
    #[token(">")]
    #[token("<=")]
    #[token(">=")]
    #[token("/")]
    #[token("//")]
    #[token("%")]
    #[token("@")]
    #[token("&")]
    #[token("|")]
    #[token("^")]
    #[token("~")]
    #[token("<<")]
    #[token(">>")]
    #[token("->")]
    #[token(":=")]
    #[token(";")]
    #[token("+=")]
    #[token("-=")]
    #[token("*=")]
    #[token("/=")]
    #[token("//=")]
    #[token("%=")]
    #[token("@=")]
    #[token("&=")]
    #[token("|=")]
    #[token("^=")]
    #[token("<<=")]
    #[token(">>=")]
    #[token("**=")]
    Operator,

    /// Comment: `# ...` to end of line. Filtered out by [`tokenize`].
    #[token("#", lex_comment)]
    Comment,
}

/// Tokenize `source`, dropping comments.
///
/// Stops at the first lexical error.
pub fn tokenize(source: &str) -> Result<Vec<Spanned<Token>>, Spanned<LexerError>> {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    for (result, span) in lexer.spanned() {
        match result {
            Ok(Token::Comment) => {}
            Ok(token) => tokens.push(Spanned::new(token, span)),
            Err(err) => return Err(Spanned::new(err, span)),
        }
    }

    Ok(tokens)
}

fn lex_comment(lex: &mut logos::Lexer<Token>) {
    let rest = lex.remainder();
    let end = rest.find(|c| c == '\n' || c == '\r').unwrap_or(rest.len());
    lex.bump(end);
}

fn parse_int(digits: &str, radix: u32) -> Result<Option<i64>, LexerError> {
    let clean: String = digits.chars().filter(|c| *c != '_').collect();
    Ok(i64::from_str_radix(&clean, radix).ok())
}

fn lex_float(lex: &mut logos::Lexer<Token>) -> Result<Option<f64>, LexerError> {
    let clean: String = lex.slice().chars().filter(|c| *c != '_').collect();
    Ok(clean.parse().ok())
}

/// Consume a string body after its opening quote.
///
/// Handles single- and triple-quoted forms. Single-quoted strings may not
/// span lines (except through a backslash-newline).
fn lex_string(lex: &mut logos::Lexer<Token>) -> Result<StrLit, LexerError> {
    let opening = lex.slice();
    let quote = opening.chars().last().ok_or(LexerError::UnterminatedString)?;
    let prefix = opening[..opening.len() - 1].to_ascii_lowercase();

    let raw = prefix.contains('r');
    let kind = if prefix.contains('b') {
        StrKind::Bytes
    } else if prefix.contains('f') {
        StrKind::Formatted
    } else {
        StrKind::Text
    };

    let rest = lex.remainder();
    let pair: String = [quote, quote].iter().collect();
    let triple = rest.starts_with(&pair);
    let delimiter: String = if triple {
        [quote, quote, quote].iter().collect()
    } else {
        quote.to_string()
    };

    // For a triple-quoted string the remaining two opening quotes are skipped.
    let mut i = if triple { 2 } else { 0 };
    let mut body = String::new();

    loop {
        let tail = &rest[i..];
        let c = tail.chars().next().ok_or(LexerError::UnterminatedString)?;

        if tail.starts_with(&delimiter) {
            lex.bump(i + delimiter.len());
            let value = if raw { body } else { unescape(&body) };
            return Ok(StrLit { kind, value });
        }

        if c == '\\' {
            let escaped = tail[1..]
                .chars()
                .next()
                .ok_or(LexerError::UnterminatedString)?;
            body.push('\\');
            body.push(escaped);
            i += 1 + escaped.len_utf8();
            continue;
        }

        if !triple && (c == '\n' || c == '\r') {
            return Err(LexerError::UnterminatedString);
        }

        body.push(c);
        i += c.len_utf8();
    }
}

/// Process backslash escapes in a non-raw string body.
///
/// Unknown escapes keep their backslash, as the source language does.
fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(next) = chars.next() else {
            out.push('\\');
            break;
        };
        match next {
            '\n' => {}
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0c}'),
            'v' => out.push('\u{0b}'),
            'x' => push_code(&mut out, &mut chars, 2, 16, "\\x"),
            'u' => push_code(&mut out, &mut chars, 4, 16, "\\u"),
            'U' => push_code(&mut out, &mut chars, 8, 16, "\\U"),
            '0'..='7' => {
                let mut digits = next.to_string();
                while digits.len() < 3 {
                    match chars.peek() {
                        Some(d @ '0'..='7') => {
                            digits.push(*d);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                match u32::from_str_radix(&digits, 8).ok().and_then(char::from_u32) {
                    Some(ch) => out.push(ch),
                    None => {
                        out.push('\\');
                        out.push_str(&digits);
                    }
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }

    out
}

fn push_code(
    out: &mut String,
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    width: usize,
    radix: u32,
    marker: &str,
) {
    let mut digits = String::with_capacity(width);
    while digits.len() < width {
        match chars.peek() {
            Some(d) if d.is_digit(radix) => {
                digits.push(*d);
                chars.next();
            }
            _ => break,
        }
    }
    let decoded = (digits.len() == width)
        .then(|| u32::from_str_radix(&digits, radix).ok())
        .flatten()
        .and_then(char::from_u32);
    match decoded {
        Some(ch) => out.push(ch),
        None => {
            out.push_str(marker);
            out.push_str(&digits);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .expect("tokenize")
            .into_iter()
            .map(|s| s.node)
            .collect()
    }

    fn text(value: &str) -> Token {
        Token::Str(StrLit {
            kind: StrKind::Text,
            value: value.to_string(),
        })
    }

    #[test]
    fn method_call_shape() {
        assert_eq!(
            kinds("p.add_argument('-f')"),
            vec![
                Token::Name("p".into()),
                Token::Dot,
                Token::Name("add_argument".into()),
                Token::LParen,
                text("-f"),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn comments_are_dropped() {
        assert_eq!(
            kinds("x = 1  # p.add_argument('--hidden')\n"),
            vec![Token::Name("x".into()), Token::Assign, Token::Int(Some(1))]
        );
    }

    #[test]
    fn string_prefixes_select_kind() {
        let toks = kinds(r#"b"x" f"y" rb'z' u"w" R"\d""#);
        let got: Vec<StrKind> = toks
            .iter()
            .map(|t| match t {
                Token::Str(s) => s.kind,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            got,
            vec![
                StrKind::Bytes,
                StrKind::Formatted,
                StrKind::Bytes,
                StrKind::Text,
                StrKind::Text
            ]
        );
        assert_eq!(toks[4], text(r"\d"));
    }

    #[test]
    fn triple_quoted_spans_lines_and_hides_quotes() {
        let toks = kinds("'''a\n'b' \"c\"\n''' + \"\"");
        assert_eq!(toks[0], text("a\n'b' \"c\"\n"));
        assert_eq!(toks[1], Token::Plus);
        assert_eq!(toks[2], text(""));
    }

    #[test]
    fn escapes_are_processed() {
        assert_eq!(kinds(r#""a\tb\"c\x41é""#), vec![text("a\tb\"cAé")]);
        assert_eq!(kinds(r#"'keep \d'"#), vec![text("keep \\d")]);
    }

    #[test]
    fn numbers() {
        assert_eq!(
            kinds("10 -3 0x1f 1_000 2.5 .5 1e3 3j 99999999999999999999"),
            vec![
                Token::Int(Some(10)),
                Token::Minus,
                Token::Int(Some(3)),
                Token::Int(Some(31)),
                Token::Int(Some(1000)),
                Token::Float(Some(2.5)),
                Token::Float(Some(0.5)),
                Token::Float(Some(1000.0)),
                Token::Imaginary,
                Token::Int(None),
            ]
        );
    }

    #[test]
    fn assignment_and_comparison_are_distinct() {
        assert_eq!(
            kinds("a=-1 == b"),
            vec![
                Token::Name("a".into()),
                Token::Assign,
                Token::Minus,
                Token::Int(Some(1)),
                Token::Operator,
                Token::Name("b".into()),
            ]
        );
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = tokenize("x = 'abc\ny = 2").unwrap_err();
        assert_eq!(err.node, LexerError::UnterminatedString);
        assert!(tokenize("s = \"\"\"never closed").is_err());
    }

    #[test]
    fn stray_characters_are_errors() {
        let err = tokenize("echo $HOME").unwrap_err();
        assert_eq!(err.node, LexerError::UnexpectedCharacter);
        assert_eq!(err.span.start, 5);
    }

    #[test]
    fn line_continuation_is_whitespace() {
        assert_eq!(
            kinds("a = \\\n  1"),
            vec![Token::Name("a".into()), Token::Assign, Token::Int(Some(1))]
        );
    }
}
