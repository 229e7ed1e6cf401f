use anyhow::{bail, Result};
use logos::Logos;

/// Tokens of the jush command language.
///
/// Keywords are not tokenized; the parser recognizes them from the
/// first word of a statement, so that the same words stay usable as
/// command arguments.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    #[token("|")]
    Pipe,

    #[token("<")]
    Lt,

    #[token(">")]
    Gt,

    #[token("&")]
    Amp,

    #[token("=")]
    Equals,

    #[token("$(")]
    DollarParen,

    #[token(")")]
    RParen,

    #[regex(r"\$[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice()[1..].to_string())]
    Var(String),

    #[regex(r#""([^"\\]|\\.)*""#, unquote)]
    Str(String),

    // Kept as text: in argument position a number is just a word,
    // and only the parser knows whether a line number is expected.
    #[regex(r"[0-9]+", |lex| lex.slice().to_string(), priority = 3)]
    Number(String),

    #[regex(r#"[^ \t\r\n|<>&=$()"]+"#, |lex| lex.slice().to_string())]
    Word(String),
}

fn unquote(lex: &mut logos::Lexer<Token>) -> String {
    let inner = &lex.slice()[1..lex.slice().len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Tokenize a single input line.
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    for (result, span) in Token::lexer(input).spanned() {
        match result {
            Ok(token) => tokens.push(token),
            Err(()) => bail!(
                "unexpected input at column {}: {:?}",
                span.start + 1,
                &input[span]
            ),
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_pipeline() {
        let tokens = tokenize("cat file.txt | wc -l > out").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Word("cat".to_string()),
                Token::Word("file.txt".to_string()),
                Token::Pipe,
                Token::Word("wc".to_string()),
                Token::Word("-l".to_string()),
                Token::Gt,
                Token::Word("out".to_string()),
            ]
        );
    }

    #[test]
    fn test_tokenize_numbered_line() {
        let tokens = tokenize("10 echo hi").unwrap();
        assert_eq!(tokens[0], Token::Number("10".to_string()));
        assert_eq!(tokens[1], Token::Word("echo".to_string()));
    }

    #[test]
    fn test_tokenize_assignment_and_var() {
        let tokens = tokenize("x = $y").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Word("x".to_string()),
                Token::Equals,
                Token::Var("y".to_string()),
            ]
        );
    }

    #[test]
    fn test_tokenize_capture() {
        let tokens = tokenize("out = $(printf hi)").unwrap();
        assert_eq!(tokens[2], Token::DollarParen);
        assert_eq!(tokens[5], Token::RParen);
    }

    #[test]
    fn test_tokenize_quoted_string() {
        let tokens = tokenize(r#"echo "a \"b\" c""#).unwrap();
        assert_eq!(tokens[1], Token::Str("a \"b\" c".to_string()));
    }

    #[test]
    fn test_tokenize_rejects_stray_dollar() {
        assert!(tokenize("echo $").is_err());
    }

    #[test]
    fn test_empty_line() {
        assert!(tokenize("   ").unwrap().is_empty());
    }
}
