//! Declaration matching over the token stream.
//!
//! Source must first parse as a Python module; anything the parser rejects
//! has no interface. A declaration is any call of the form `<receiver>.add_argument(...)`,
//! where the receiver is whatever expression precedes the dot. Only literal
//! argument values (strings, numbers, booleans) are read; every other
//! expression is treated as absent.

use rustpython_parser::{ast, Parse};
use scriptq_core::types::{Literal, ParamType, ParameterSpec};
use serde::Serialize;
use tracing::debug;

use crate::{
    error::{IntrospectError, Result},
    lexer::{tokenize, Spanned, StrKind, Token},
};

/// Method name that declares a command-line argument.
pub const DECLARE_METHOD: &str = "add_argument";

/// Result of inspecting one script.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Introspection {
    /// Declared parameters in source order.
    pub parameters: Vec<ParameterSpec>,
    /// `true` if at least one declaration call was seen, even one whose
    /// flag could not be read.
    pub has_interface: bool,
}

/// Extract the parameter surface from `source`.
///
/// Never fails: source with a syntax error yields an empty, interface-less
/// result.
pub fn extract(source: &str) -> Introspection {
    match try_extract(source) {
        Ok(found) => found,
        Err(e) => {
            debug!(error = %e, "source not analyzable, reporting no parameters");
            Introspection::default()
        }
    }
}

/// Like [`extract`] but reports why the source could not be analyzed.
pub fn try_extract(source: &str) -> Result<Introspection> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    ast::Suite::parse(source, "<script>").map_err(|e| IntrospectError::Syntax(e.to_string()))?;
    let tokens = tokenize(source).map_err(|e| IntrospectError::Lex {
        offset: e.span.start,
        kind: e.node,
    })?;
    check_balanced(&tokens)?;

    let mut found = Introspection::default();
    for i in 0..tokens.len() {
        if !is_declaration(&tokens, i) {
            continue;
        }
        found.has_interface = true;

        let open = i + 2;
        // Balance was checked up front, so a closer always exists.
        let Some(close) = matching_close(&tokens, open) else {
            continue;
        };
        let args = split_args(&tokens[open + 1..close]);
        if let Some(spec) = declaration(&args) {
            found.parameters.push(spec);
        }
    }

    Ok(found)
}

/// `<expr> . add_argument (` starting at the dot.
fn is_declaration(tokens: &[Spanned<Token>], dot: usize) -> bool {
    if dot == 0 || dot + 2 >= tokens.len() {
        return false;
    }
    let receiver_ends = matches!(
        tokens[dot - 1].node,
        Token::Name(_) | Token::RParen | Token::RBracket
    );
    receiver_ends
        && tokens[dot].node == Token::Dot
        && matches!(&tokens[dot + 1].node, Token::Name(n) if n == DECLARE_METHOD)
        && tokens[dot + 2].node == Token::LParen
}

fn check_balanced(tokens: &[Spanned<Token>]) -> Result<()> {
    let mut stack: Vec<(char, usize)> = Vec::new();
    for t in tokens {
        let offset = t.span.start;
        match t.node {
            Token::LParen => stack.push(('(', offset)),
            Token::LBracket => stack.push(('[', offset)),
            Token::LBrace => stack.push(('{', offset)),
            Token::RParen | Token::RBracket | Token::RBrace => {
                let want = match t.node {
                    Token::RParen => '(',
                    Token::RBracket => '[',
                    _ => '{',
                };
                match stack.pop() {
                    Some((open, _)) if open == want => {}
                    _ => {
                        return Err(IntrospectError::Unbalanced {
                            delimiter: closing_char(&t.node),
                            offset,
                        })
                    }
                }
            }
            _ => {}
        }
    }
    match stack.pop() {
        Some((delimiter, offset)) => Err(IntrospectError::Unbalanced { delimiter, offset }),
        None => Ok(()),
    }
}

fn closing_char(token: &Token) -> char {
    match token {
        Token::RParen => ')',
        Token::RBracket => ']',
        _ => '}',
    }
}

fn is_open(token: &Token) -> bool {
    matches!(token, Token::LParen | Token::LBracket | Token::LBrace)
}

fn is_close(token: &Token) -> bool {
    matches!(token, Token::RParen | Token::RBracket | Token::RBrace)
}

/// Index of the bracket closing the one at `open`.
fn matching_close(tokens: &[Spanned<Token>], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, t) in tokens.iter().enumerate().skip(open) {
        if is_open(&t.node) {
            depth += 1;
        } else if is_close(&t.node) {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// One argument of a call.
#[derive(Debug)]
enum Arg<'a> {
    Positional(&'a [Spanned<Token>]),
    Keyword(&'a str, &'a [Spanned<Token>]),
    Unpacked,
}

/// Split a call's argument tokens on top-level commas.
fn split_args(tokens: &[Spanned<Token>]) -> Vec<Arg<'_>> {
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, t) in tokens.iter().enumerate() {
        if is_open(&t.node) {
            depth += 1;
        } else if is_close(&t.node) {
            depth = depth.saturating_sub(1);
        } else if t.node == Token::Comma && depth == 0 {
            args.extend(classify(&tokens[start..i]));
            start = i + 1;
        }
    }
    args.extend(classify(&tokens[start..]));
    args
}

fn classify(tokens: &[Spanned<Token>]) -> Option<Arg<'_>> {
    match tokens {
        [] => None,
        [first, second, rest @ ..] if second.node == Token::Assign => match &first.node {
            Token::Name(key) => Some(Arg::Keyword(key, rest)),
            _ => Some(Arg::Positional(tokens)),
        },
        [first, ..] if matches!(first.node, Token::Star | Token::DoubleStar) => {
            Some(Arg::Unpacked)
        }
        _ => Some(Arg::Positional(tokens)),
    }
}

/// Build a spec from a declaration's arguments, or `None` without a flag.
fn declaration(args: &[Arg<'_>]) -> Option<ParameterSpec> {
    let flag = args.iter().find_map(|arg| match arg {
        Arg::Positional(tokens) => match literal(tokens) {
            Some(Literal::Str(s)) => Some(s),
            _ => None,
        },
        _ => None,
    })?;

    let mut spec = ParameterSpec::new(flag);
    for arg in args {
        let Arg::Keyword(key, value) = arg else {
            continue;
        };
        match *key {
            "help" => {
                if let Some(Literal::Str(s)) = literal(value) {
                    spec.help = s;
                }
            }
            "type" => spec.param_type = type_of(value),
            "required" => {
                spec.required = matches!(literal(value), Some(Literal::Bool(true)));
            }
            "default" => spec.default = literal(value),
            _ => {}
        }
    }
    Some(spec)
}

/// `type=` must be a bare name to be recognized.
fn type_of(tokens: &[Spanned<Token>]) -> ParamType {
    match tokens {
        [only] => match &only.node {
            Token::Name(name) => ParamType::from_type_name(name),
            _ => ParamType::String,
        },
        _ => ParamType::String,
    }
}

/// Evaluate an allow-listed literal expression.
///
/// Accepts string literals (adjacent ones concatenate), numbers with at
/// most one sign, `True` and `False`, optionally wrapped in parentheses.
/// `None` and everything else evaluate to no value.
fn literal(tokens: &[Spanned<Token>]) -> Option<Literal> {
    let tokens = strip_parens(tokens);
    match tokens {
        [] => None,
        [only] => match &only.node {
            Token::Name(n) if n == "True" => Some(Literal::Bool(true)),
            Token::Name(n) if n == "False" => Some(Literal::Bool(false)),
            Token::Int(n) => n.map(Literal::Int),
            Token::Float(x) => x.map(Literal::Float),
            Token::Str(_) => concat_strings(tokens),
            _ => None,
        },
        [sign, number] => {
            let negate = match sign.node {
                Token::Minus => true,
                Token::Plus => false,
                _ => return concat_strings(tokens),
            };
            match number.node {
                Token::Int(Some(n)) if negate => n.checked_neg().map(Literal::Int),
                Token::Int(Some(n)) => Some(Literal::Int(n)),
                Token::Float(Some(x)) if negate => Some(Literal::Float(-x)),
                Token::Float(Some(x)) => Some(Literal::Float(x)),
                _ => None,
            }
        }
        _ => concat_strings(tokens),
    }
}

fn concat_strings(tokens: &[Spanned<Token>]) -> Option<Literal> {
    let mut out = String::new();
    for t in tokens {
        match &t.node {
            Token::Str(s) if s.kind == StrKind::Text => out.push_str(&s.value),
            _ => return None,
        }
    }
    Some(Literal::Str(out))
}

/// Drop parentheses that wrap the whole expression, unless they form a tuple.
fn strip_parens(mut tokens: &[Spanned<Token>]) -> &[Spanned<Token>] {
    while tokens.len() >= 2
        && tokens[0].node == Token::LParen
        && matching_close(tokens, 0) == Some(tokens.len() - 1)
    {
        let inner = &tokens[1..tokens.len() - 1];
        let mut depth = 0usize;
        let is_tuple = inner.is_empty()
            || inner.iter().any(|t| {
                if is_open(&t.node) {
                    depth += 1;
                } else if is_close(&t.node) {
                    depth = depth.saturating_sub(1);
                }
                depth == 0 && t.node == Token::Comma
            });
        if is_tuple {
            break;
        }
        tokens = inner;
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(source: &str) -> Vec<ParameterSpec> {
        let found = extract(source);
        assert!(found.has_interface, "expected an interface in {source:?}");
        found.parameters
    }

    #[test]
    fn file_and_count_scenario() {
        let source = r#"
import argparse
parser = argparse.ArgumentParser()
parser.add_argument('-f', '--file', type=str, required=True)
parser.add_argument('--count', default=10, type=int)
args = parser.parse_args()
"#;
        let found = extract(source);
        assert!(found.has_interface);
        assert_eq!(found.parameters.len(), 2);

        let file = &found.parameters[0];
        assert_eq!(file.flag, "-f");
        assert_eq!(file.name, "f");
        assert!(file.required);
        assert_eq!(file.default, None);
        assert_eq!(file.param_type, ParamType::String);

        let count = &found.parameters[1];
        assert_eq!(count.flag, "--count");
        assert_eq!(count.name, "count");
        assert!(!count.required);
        assert_eq!(count.default, Some(Literal::Int(10)));
        assert_eq!(count.param_type, ParamType::Integer);
    }

    #[test]
    fn no_declarations_means_no_interface() {
        let found = extract("import sys\nprint(sys.argv)\n");
        assert_eq!(found, Introspection::default());
    }

    #[test]
    fn unparsable_source_means_no_interface() {
        let broken = "parser.add_argument('--x'\nprint('oops'";
        assert_eq!(extract(broken), Introspection::default());
        assert!(try_extract(broken).is_err());

        let mismatched = "parser.add_argument('--x']";
        assert!(matches!(
            try_extract(mismatched),
            Err(IntrospectError::Syntax(_))
        ));
    }

    #[test]
    fn syntax_error_after_declarations_hides_them() {
        let missing_colon = "import argparse\n\
                             p = argparse.ArgumentParser()\n\
                             p.add_argument('--x')\n\
                             if True\n    pass\n";
        assert_eq!(extract(missing_colon), Introspection::default());
        assert!(matches!(
            try_extract(missing_colon),
            Err(IntrospectError::Syntax(_))
        ));
    }

    #[test]
    fn bad_indentation_hides_declarations() {
        let unindented = "p.add_argument('--x')\ndef run():\nreturn 1\n";
        assert_eq!(extract(unindented), Introspection::default());

        let stray = "p.add_argument('--x')\n    p.add_argument('--y')\n";
        assert_eq!(extract(stray), Introspection::default());
    }

    #[test]
    fn shell_text_is_not_python() {
        let shell = ": <<'EOF'\nparser.add_argument('--count')\nEOF\necho \"$*\"\n";
        assert_eq!(extract(shell), Introspection::default());
    }

    #[test]
    fn help_and_float_defaults() {
        let p = params(
            r#"parser.add_argument("-c", dest="center", help="Center of rotation", type=float, required=False, default=0.0)"#,
        );
        assert_eq!(p[0].help, "Center of rotation");
        assert_eq!(p[0].param_type, ParamType::Float);
        assert_eq!(p[0].default, Some(Literal::Float(0.0)));
        assert!(!p[0].required);
    }

    #[test]
    fn negative_and_string_defaults() {
        let p = params(
            "p.add_argument('--stop', type=int, default=-1)\n\
             p.add_argument('--ring', default='norm')\n",
        );
        assert_eq!(p[0].default, Some(Literal::Int(-1)));
        assert_eq!(p[1].default, Some(Literal::Str("norm".into())));
    }

    #[test]
    fn non_literal_default_is_absent_not_an_error() {
        let p = params("p.add_argument('--when', default=time.time(), type=str)");
        assert_eq!(p.len(), 1);
        assert_eq!(p[0].default, None);

        let p = params("p.add_argument('--items', default=[1, 2])");
        assert_eq!(p[0].default, None);

        let p = params("p.add_argument('--x', default=None)");
        assert_eq!(p[0].default, None);
    }

    #[test]
    fn declaration_without_string_flag_still_counts() {
        let found = extract("p.add_argument(FLAG, help='computed')\n");
        assert!(found.has_interface);
        assert!(found.parameters.is_empty());
    }

    #[test]
    fn first_string_positional_is_the_flag() {
        let p = params("p.add_argument(prefix, '--late', 'more')");
        assert_eq!(p[0].flag, "--late");
        assert_eq!(p[0].name, "late");
    }

    #[test]
    fn unknown_or_dotted_types_are_strings() {
        let p = params(
            "p.add_argument('--in', type=argparse.FileType('r'))\n\
             p.add_argument('--n', type=lambda s: int(s))\n\
             p.add_argument('--p', type=Path)\n",
        );
        assert!(p.iter().all(|s| s.param_type == ParamType::String));
        assert_eq!(p.len(), 3);
    }

    #[test]
    fn required_needs_a_boolean_literal() {
        let p = params(
            "p.add_argument('--a', required=1)\n\
             p.add_argument('--b', required=flag)\n\
             p.add_argument('--c', required=True)\n",
        );
        assert!(!p[0].required);
        assert!(!p[1].required);
        assert!(p[2].required);
    }

    #[test]
    fn formatted_help_is_not_a_literal() {
        let p = params("p.add_argument('--x', help=f'value {X}')");
        assert_eq!(p[0].help, "");
    }

    #[test]
    fn implicit_concatenation_and_parens() {
        let p = params("p.add_argument(('--name'), help='first ' \"second\")");
        assert_eq!(p[0].flag, "--name");
        assert_eq!(p[0].help, "first second");
    }

    #[test]
    fn commented_or_quoted_calls_are_ignored() {
        let source = "# parser.add_argument('--hidden')\n\
                      doc = \"parser.add_argument('--quoted')\"\n\
                      def add_argument(x):\n    pass\n";
        assert_eq!(extract(source), Introspection::default());
    }

    #[test]
    fn group_receivers_and_nested_calls() {
        let source = "group = parser.add_mutually_exclusive_group()\n\
                      group.add_argument('--fast', action='store_true')\n\
                      parser.add_subparsers().add_argument('--sub')\n\
                      cfg[0].add_argument('--indexed')\n";
        let p = params(source);
        let flags: Vec<&str> = p.iter().map(|s| s.flag.as_str()).collect();
        assert_eq!(flags, vec!["--fast", "--sub", "--indexed"]);
    }

    #[test]
    fn unpacked_kwargs_are_skipped() {
        let p = params("p.add_argument('--x', help='h', **extra)");
        assert_eq!(p[0].help, "h");
    }

    #[test]
    fn triple_quoted_usage_blocks_do_not_confuse_matching() {
        let source = "usage = \"\"\"\nRun with parser.add_argument('--nope')\n\"\"\"\n\
                      parser = argparse.ArgumentParser(description=usage)\n\
                      parser.add_argument('-p', dest='proj', type=int, required=True)\n";
        let p = params(source);
        assert_eq!(p.len(), 1);
        assert_eq!(p[0].flag, "-p");
        assert!(p[0].required);
    }
}
