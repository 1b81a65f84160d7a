#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Dependency pointer: `#/a`, `/a`, `../a`, `./a`
    Path(String),
    /// Identifiers and keywords -- distinguished in the parser
    Ident(String),
    /// Quoted string literal (content without quotes, escapes resolved)
    Str(String),
    Num(f64),
    // Punctuation
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Dot,
    // Comparison operators
    StrictEq, // ===
    StrictNe, // !==
    LooseEq,  // ==
    LooseNe,  // !=
    Lt,
    Lte,
    Gt,
    Gte,
    // Logical operators
    And,
    Or,
    Not,
    Minus,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub offset: usize,
    pub message: String,
}

fn is_segment_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '-' | '~' | '@')
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

pub fn lex(src: &str) -> Result<Vec<Spanned>, LexError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0usize;

    let at = |i: usize| chars.get(i).copied();

    while pos < chars.len() {
        let c = chars[pos];
        let start = pos;

        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        // Pointer: '#', '/', './', '../'
        let starts_path = c == '#'
            || c == '/'
            || (c == '.' && at(pos + 1) == Some('/'))
            || (c == '.' && at(pos + 1) == Some('.') && at(pos + 2) == Some('/'));
        if starts_path {
            pos = scan_path(&chars, pos);
            let text: String = chars[start..pos].iter().collect();
            tokens.push(Spanned {
                token: Token::Path(text),
                offset: start,
            });
            continue;
        }

        // String literal
        if c == '"' || c == '\'' {
            let quote = c;
            pos += 1;
            let mut s = String::new();
            loop {
                let Some(sc) = at(pos) else {
                    return Err(LexError {
                        offset: start,
                        message: "unterminated string literal".to_string(),
                    });
                };
                pos += 1;
                if sc == quote {
                    break;
                }
                if sc != '\\' {
                    s.push(sc);
                    continue;
                }
                let Some(esc) = at(pos) else {
                    return Err(LexError {
                        offset: start,
                        message: "unterminated escape in string".to_string(),
                    });
                };
                pos += 1;
                match esc {
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    'r' => s.push('\r'),
                    'b' => s.push('\u{8}'),
                    'f' => s.push('\u{c}'),
                    'u' => {
                        let hex: String = chars.get(pos..pos + 4).unwrap_or(&[]).iter().collect();
                        let decoded = u32::from_str_radix(&hex, 16)
                            .ok()
                            .filter(|_| hex.len() == 4)
                            .and_then(char::from_u32);
                        let Some(ch) = decoded else {
                            return Err(LexError {
                                offset: pos,
                                message: "invalid unicode escape".to_string(),
                            });
                        };
                        s.push(ch);
                        pos += 4;
                    }
                    other => s.push(other),
                }
            }
            tokens.push(Spanned {
                token: Token::Str(s),
                offset: start,
            });
            continue;
        }

        // Number literal
        if c.is_ascii_digit() {
            while at(pos).is_some_and(|d| d.is_ascii_digit()) {
                pos += 1;
            }
            if at(pos) == Some('.') && at(pos + 1).is_some_and(|d| d.is_ascii_digit()) {
                pos += 1;
                while at(pos).is_some_and(|d| d.is_ascii_digit()) {
                    pos += 1;
                }
            }
            if matches!(at(pos), Some('e') | Some('E')) {
                let mut look = pos + 1;
                if matches!(at(look), Some('+') | Some('-')) {
                    look += 1;
                }
                if at(look).is_some_and(|d| d.is_ascii_digit()) {
                    pos = look;
                    while at(pos).is_some_and(|d| d.is_ascii_digit()) {
                        pos += 1;
                    }
                }
            }
            let text: String = chars[start..pos].iter().collect();
            let n = text.parse::<f64>().map_err(|_| LexError {
                offset: start,
                message: format!("invalid number '{}'", text),
            })?;
            tokens.push(Spanned {
                token: Token::Num(n),
                offset: start,
            });
            continue;
        }

        if is_ident_start(c) {
            while at(pos).is_some_and(|d| d.is_alphanumeric() || d == '_' || d == '$') {
                pos += 1;
            }
            tokens.push(Spanned {
                token: Token::Ident(chars[start..pos].iter().collect()),
                offset: start,
            });
            continue;
        }

        let (token, width) = match (c, at(pos + 1), at(pos + 2)) {
            ('=', Some('='), Some('=')) => (Token::StrictEq, 3),
            ('!', Some('='), Some('=')) => (Token::StrictNe, 3),
            ('=', Some('='), _) => (Token::LooseEq, 2),
            ('!', Some('='), _) => (Token::LooseNe, 2),
            ('<', Some('='), _) => (Token::Lte, 2),
            ('>', Some('='), _) => (Token::Gte, 2),
            ('&', Some('&'), _) => (Token::And, 2),
            ('|', Some('|'), _) => (Token::Or, 2),
            ('<', _, _) => (Token::Lt, 1),
            ('>', _, _) => (Token::Gt, 1),
            ('!', _, _) => (Token::Not, 1),
            ('-', _, _) => (Token::Minus, 1),
            ('[', _, _) => (Token::LBracket, 1),
            (']', _, _) => (Token::RBracket, 1),
            ('(', _, _) => (Token::LParen, 1),
            (')', _, _) => (Token::RParen, 1),
            (',', _, _) => (Token::Comma, 1),
            ('.', _, _) => (Token::Dot, 1),
            (other, _, _) => {
                return Err(LexError {
                    offset: start,
                    message: format!("unexpected character '{}'", other),
                });
            }
        };
        pos += width;
        tokens.push(Spanned {
            token,
            offset: start,
        });
    }

    tokens.push(Spanned {
        token: Token::Eof,
        offset: chars.len(),
    });
    Ok(tokens)
}

/// Scan a pointer starting at `pos`; returns the position after it.
///
/// Segments are separated by `/`; `.` and `..` are accepted as whole
/// segments, so a `.` directly after a named segment ends the pointer
/// (member access such as `./items.length`).
fn scan_path(chars: &[char], mut pos: usize) -> usize {
    let at = |i: usize| chars.get(i).copied();
    if at(pos) == Some('#') {
        pos += 1;
    }
    loop {
        // Relative prefixes and dot segments
        if at(pos) == Some('.') && at(pos + 1) == Some('.') && matches!(at(pos + 2), Some('/') | None) {
            pos += 2;
        } else if at(pos) == Some('.') && matches!(at(pos + 1), Some('/')) {
            pos += 1;
        } else {
            while at(pos).is_some_and(is_segment_char) {
                pos += 1;
            }
        }
        if at(pos) == Some('/')
            && at(pos + 1).is_some_and(|c| is_segment_char(c) || c == '.')
        {
            pos += 1;
            continue;
        }
        if at(pos) == Some('/') {
            // trailing slash (e.g. a bare '/')
            pos += 1;
        }
        return pos;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        lex(src).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn lexes_comparison_of_relative_path() {
        assert_eq!(
            kinds("./mode === 'A'"),
            vec![
                Token::Path("./mode".into()),
                Token::StrictEq,
                Token::Str("A".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn lexes_parent_and_root_paths() {
        assert_eq!(
            kinds("../../a/b && #/c"),
            vec![
                Token::Path("../../a/b".into()),
                Token::And,
                Token::Path("#/c".into()),
                Token::Eof
            ]
        );
        assert_eq!(
            kinds("/root/x"),
            vec![Token::Path("/root/x".into()), Token::Eof]
        );
    }

    #[test]
    fn member_access_ends_path() {
        assert_eq!(
            kinds("./items.length > 0"),
            vec![
                Token::Path("./items".into()),
                Token::Dot,
                Token::Ident("length".into()),
                Token::Gt,
                Token::Num(0.0),
                Token::Eof
            ]
        );
    }

    #[test]
    fn lexes_array_membership() {
        assert_eq!(
            kinds(r#"["a", 1.5].includes(../k)"#),
            vec![
                Token::LBracket,
                Token::Str("a".into()),
                Token::Comma,
                Token::Num(1.5),
                Token::RBracket,
                Token::Dot,
                Token::Ident("includes".into()),
                Token::LParen,
                Token::Path("../k".into()),
                Token::RParen,
                Token::Eof
            ]
        );
    }

    #[test]
    fn decodes_json_escapes() {
        assert_eq!(
            kinds(r#""a\"bA""#),
            vec![Token::Str("a\"bA".into()), Token::Eof]
        );
    }

    #[test]
    fn rejects_unterminated_string() {
        let err = lex("'abc").unwrap_err();
        assert_eq!(err.offset, 0);
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn rejects_unknown_character() {
        assert!(lex("./a + 1").is_err());
    }
}
