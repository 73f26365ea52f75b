// Copyright 2025 the VizIR Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dependency extraction for expression strings.
//!
//! The compiler does not evaluate expressions; it only needs to know which `datum` fields an
//! expression reads so the optimizer can decide whether two nodes may be reordered. This is a
//! small scanner that understands string literals, identifiers, `.name` member access and
//! `["name"]` computed access.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use crate::field::FieldSet;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Dot,
    LBracket,
    RBracket,
    Other,
}

fn tokenize(expr: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = expr.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' || c == '\'' {
            chars.next();
            let mut s = String::new();
            while let Some(ch) = chars.next() {
                if ch == '\\' {
                    if let Some(escaped) = chars.next() {
                        s.push(escaped);
                    }
                } else if ch == c {
                    break;
                } else {
                    s.push(ch);
                }
            }
            tokens.push(Token::Str(s));
        } else if c.is_alphabetic() || c == '_' || c == '$' {
            let mut s = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_alphanumeric() || ch == '_' || ch == '$' {
                    s.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Ident(s));
        } else if c.is_ascii_digit() {
            // Consume the whole literal so `1.5` does not read as a member access.
            while let Some(&ch) = chars.peek() {
                if ch.is_ascii_alphanumeric() || ch == '.' {
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Other);
        } else {
            chars.next();
            tokens.push(match c {
                '.' => Token::Dot,
                '[' => Token::LBracket,
                ']' => Token::RBracket,
                _ => Token::Other,
            });
        }
    }
    tokens
}

/// Returns the `datum` fields an expression reads, as dotted access paths.
///
/// `datum.a.b` and `datum["a"]["b"]` both yield `a.b`; computed accesses with a non-literal
/// key end the path at the last literal segment.
pub fn dependent_fields(expr: &str) -> FieldSet {
    let tokens = tokenize(expr);
    let mut out = FieldSet::new();
    let mut i = 0;
    while i < tokens.len() {
        let is_datum = matches!(&tokens[i], Token::Ident(name) if name == "datum");
        let after_dot = i > 0 && tokens[i - 1] == Token::Dot;
        if !is_datum || after_dot {
            i += 1;
            continue;
        }
        let mut path: Vec<String> = Vec::new();
        let mut j = i + 1;
        loop {
            match (tokens.get(j), tokens.get(j + 1), tokens.get(j + 2)) {
                (Some(Token::Dot), Some(Token::Ident(name)), _) => {
                    path.push(name.clone());
                    j += 2;
                }
                (Some(Token::LBracket), Some(Token::Str(name)), Some(Token::RBracket)) => {
                    path.push(name.clone());
                    j += 3;
                }
                _ => break,
            }
        }
        if !path.is_empty() {
            out.insert(path.join("."));
        }
        i = j.max(i + 1);
    }
    out
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;

    fn fields(expr: &str) -> Vec<String> {
        dependent_fields(expr).into_iter().collect()
    }

    #[test]
    fn dotted_and_bracketed_access() {
        assert_eq!(fields("datum.x > 0 && datum['y'] < 2"), ["x", "y"]);
        assert_eq!(fields(r#"datum["a"]["b"] + datum.c.d"#), ["a.b", "c.d"]);
    }

    #[test]
    fn ignores_strings_and_other_members() {
        assert_eq!(fields("'datum.x' + foo.datum.y"), Vec::<String>::new());
        assert_eq!(fields("datum.x * 1.5"), ["x"]);
    }

    #[test]
    fn computed_key_stops_the_path() {
        assert_eq!(fields("datum.a[key]"), ["a"]);
        assert_eq!(fields("datum[key]"), Vec::<String>::new());
    }
}
