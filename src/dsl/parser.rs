//! Notation parser.

use std::fmt;
use thiserror::Error;

use super::{MAX_DEPTH, NotationChild, NotationTree, TIMES};

/// A notation that does not follow the grammar.
///
/// `position` is a character (not byte) offset into the input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at position {position}: expected {expected}, found {}", Found(.found))]
pub struct ParseError {
    /// Character offset of the offending token.
    pub position: usize,
    /// What the parser expected.
    pub expected: String,
    /// What it found instead (`None` at end of input).
    pub found: Option<char>,
}

struct Found<'a>(&'a Option<char>);

impl fmt::Display for Found<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(c) => write!(f, "'{c}'"),
            None => f.write_str("end of input"),
        }
    }
}

/// Letters, `_` and any non-ASCII character except `×` and whitespace.
fn is_symbol_char(c: char) -> bool {
    if c == TIMES || c.is_whitespace() {
        return false;
    }
    c.is_ascii_alphabetic() || c == '_' || !c.is_ascii()
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn skip_ws(&mut self) {
        while self.chars.get(self.pos).is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.get(self.pos).copied()
    }

    fn error(&self, expected: &str) -> ParseError {
        ParseError {
            position: self.pos,
            expected: expected.to_string(),
            found: self.chars.get(self.pos).copied(),
        }
    }

    fn symbol(&mut self) -> Result<String, ParseError> {
        self.skip_ws();
        let start = self.pos;
        while self.chars.get(self.pos).copied().is_some_and(is_symbol_char) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("symbol"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn tree(&mut self) -> Result<NotationTree, ParseError> {
        let symbol = self.symbol()?;
        let mut children = Vec::new();

        if self.peek() == Some('[') {
            if self.depth == MAX_DEPTH {
                return Err(self.error(&format!("at most {MAX_DEPTH} levels of nesting")));
            }
            self.pos += 1;
            self.depth += 1;
            if self.peek() == Some(']') {
                self.pos += 1;
            } else {
                loop {
                    children.push(self.child()?);
                    match self.peek() {
                        Some(',') => self.pos += 1,
                        Some(']') => {
                            self.pos += 1;
                            break;
                        },
                        _ => return Err(self.error("',' or ']'")),
                    }
                }
            }
            self.depth -= 1;
        }

        Ok(NotationTree { symbol, children })
    }

    fn child(&mut self) -> Result<NotationChild, ParseError> {
        let tree = self.tree()?;
        let multiplicity = if self.peek() == Some(TIMES) {
            self.pos += 1;
            self.count()?
        } else {
            1
        };
        Ok(NotationChild { tree, multiplicity })
    }

    fn count(&mut self) -> Result<u32, ParseError> {
        self.skip_ws();
        let start = self.pos;
        while self.chars.get(self.pos).is_some_and(char::is_ascii_digit) {
            self.pos += 1;
        }
        let digits: String = self.chars[start..self.pos].iter().collect();
        match digits.parse::<u32>() {
            Ok(n) if n >= 1 => Ok(n),
            _ => {
                self.pos = start;
                Err(self.error("multiplicity of at least 1"))
            },
        }
    }
}

/// Parses notation text into a tree.
///
/// # Errors
///
/// Returns a [`ParseError`] with the character position and the expected
/// token, including for brackets nested deeper than [`MAX_DEPTH`].
pub fn parse(notation: &str) -> Result<NotationTree, ParseError> {
    let mut parser = Parser {
        chars: notation.chars().collect(),
        pos: 0,
        depth: 0,
    };
    let tree = parser.tree()?;
    if parser.peek().is_some() {
        return Err(parser.error("end of input"));
    }
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_parse_single_child() {
        let tree = parse("§[δ]").unwrap();
        assert_eq!(tree.symbol, "§");
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].tree.symbol, "δ");
        assert_eq!(tree.children[0].multiplicity, 1);
    }

    #[test]
    fn test_parse_nested_with_multiplicity() {
        let tree = parse("§[δ, Ƀ[ᵬ×2]]").unwrap();
        assert_eq!(tree.children.len(), 2);
        let list = &tree.children[1].tree;
        assert_eq!(list.symbol, "Ƀ");
        assert_eq!(list.children[0].tree.symbol, "ᵬ");
        assert_eq!(list.children[0].multiplicity, 2);
        assert_eq!(tree.to_string(), "§[δ, Ƀ[ᵬ×2]]");
    }

    #[test]
    fn test_whitespace_and_empty_brackets() {
        let tree = parse("  §[ δ ,Ƀ [ ] ] ").unwrap();
        assert_eq!(tree.to_string(), "§[δ, Ƀ]");
    }

    #[test]
    fn test_multichar_symbols() {
        let tree = parse("ᴹϙ[ᴹμ×3]").unwrap();
        assert_eq!(tree.symbol, "ᴹϙ");
        assert_eq!(tree.children[0].tree.symbol, "ᴹμ");
        assert_eq!(tree.children[0].multiplicity, 3);
    }

    #[test_case("", 0, "symbol", None ; "empty input")]
    #[test_case("§[", 2, "symbol", None ; "unclosed bracket")]
    #[test_case("§[δ", 3, "',' or ']'", None ; "missing close")]
    #[test_case("§[δ;ǐ]", 3, "',' or ']'", Some(';') ; "bad separator")]
    #[test_case("§[δ×0]", 4, "multiplicity of at least 1", Some('0') ; "zero multiplicity")]
    #[test_case("§[δ×]", 4, "multiplicity of at least 1", Some(']') ; "missing count")]
    #[test_case("§[,δ]", 2, "symbol", Some(',') ; "leading comma")]
    #[test_case("§]", 1, "end of input", Some(']') ; "trailing garbage")]
    #[test_case("§[δ]×2", 4, "end of input", Some('×') ; "root multiplicity")]
    fn test_parse_errors(input: &str, position: usize, expected: &str, found: Option<char>) {
        let err = parse(input).unwrap_err();
        assert_eq!(err.position, position);
        assert_eq!(err.expected, expected);
        assert_eq!(err.found, found);
    }

    fn nested(depth: usize) -> String {
        format!("{}δ{}", "§[".repeat(depth), "]".repeat(depth))
    }

    #[test]
    fn test_nesting_limit() {
        let tree = parse(&nested(MAX_DEPTH)).unwrap();
        assert_eq!(tree.symbols().len(), MAX_DEPTH + 1);

        let err = parse(&nested(MAX_DEPTH + 1)).unwrap_err();
        assert_eq!(err.position, 2 * MAX_DEPTH + 1);
        assert_eq!(err.found, Some('['));
        assert!(err.expected.contains("levels of nesting"));
    }

    #[test]
    fn test_very_deep_input_is_an_error() {
        let err = parse(&nested(200_000)).unwrap_err();
        assert_eq!(err.found, Some('['));
    }

    #[test]
    fn test_error_display() {
        let err = parse("§[").unwrap_err();
        assert_eq!(
            err.to_string(),
            "parse error at position 2: expected symbol, found end of input"
        );
        let err = parse("§[δ;]").unwrap_err();
        assert!(err.to_string().ends_with("found ';'"));
    }
}
