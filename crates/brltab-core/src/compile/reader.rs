// Brltab Source Reader
// Line tokenizer for the key-table directive language

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReaderError {
    #[error("unterminated quoted operand")]
    UnterminatedQuote,

    #[error("unsupported escape sequence \\{0}")]
    BadEscape(char),
}

/// Split one source line into operands.
///
/// Operands are whitespace-separated; a double-quoted operand may contain
/// whitespace and the escapes `\"` and `\\`. An unquoted `#` starts a
/// comment running to the end of the line. Blank lines yield no operands.
pub fn tokenize(line: &str) -> Result<Vec<String>, ReaderError> {
    let mut operands = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.peek() {
            None => break,
            Some('#') => break,
            Some('"') => {
                chars.next();
                let mut operand = String::new();
                loop {
                    match chars.next() {
                        None => return Err(ReaderError::UnterminatedQuote),
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('"') => operand.push('"'),
                            Some('\\') => operand.push('\\'),
                            Some(other) => return Err(ReaderError::BadEscape(other)),
                            None => return Err(ReaderError::UnterminatedQuote),
                        },
                        Some(other) => operand.push(other),
                    }
                }
                operands.push(operand);
            }
            Some(_) => {
                let mut operand = String::new();
                while let Some(c) = chars.next_if(|c| !c.is_whitespace() && *c != '#') {
                    operand.push(c);
                }
                operands.push(operand);
            }
        }
    }

    Ok(operands)
}

/// Iterate a source's lines with 1-based numbers, skipping nothing; the
/// caller decides what an empty operand list means.
pub fn lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines().enumerate().map(|(i, line)| (i + 1, line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_operands() {
        assert_eq!(
            tokenize("bind Dot1+Dot2 HOME").unwrap(),
            vec!["bind", "Dot1+Dot2", "HOME"]
        );
    }

    #[test]
    fn test_comment_and_blank() {
        assert_eq!(tokenize("  # whole line comment").unwrap(), Vec::<String>::new());
        assert_eq!(tokenize("").unwrap(), Vec::<String>::new());
        assert_eq!(
            tokenize("bind Space HOME # trailing").unwrap(),
            vec!["bind", "Space", "HOME"]
        );
    }

    #[test]
    fn test_quoted_operand_with_escapes() {
        assert_eq!(
            tokenize(r#"title "Braille \"Pro\" 40" next"#).unwrap(),
            vec!["title", r#"Braille "Pro" 40"#, "next"]
        );
        assert_eq!(
            tokenize(r#"note "a \\ b""#).unwrap(),
            vec!["note", r"a \ b"]
        );
    }

    #[test]
    fn test_tokenize_errors() {
        assert_eq!(
            tokenize(r#"title "open"#),
            Err(ReaderError::UnterminatedQuote)
        );
        assert_eq!(tokenize(r#"note "\n""#), Err(ReaderError::BadEscape('n')));
    }

    #[test]
    fn test_hash_inside_quotes_is_literal() {
        assert_eq!(tokenize(r##"note "see #4""##).unwrap(), vec!["note", "see #4"]);
    }
}
